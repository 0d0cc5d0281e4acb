use anyhow::{Context, Result};
use std::collections::HashMap;
use tonic::transport::Channel;
use tonic::Request;

use mockgps_common::proto::{
    mock_location_client::MockLocationClient,
    BroadcastUpdate,
    CommandReply,
    CommandRequest,
    WatchRequest,
};
use mockgps_common::{CommandAction, EXTRA_ALT, EXTRA_LAT, EXTRA_LON};

/// gRPC client for the mock location daemon
#[derive(Clone)]
pub struct DaemonClient {
    client: MockLocationClient<Channel>,
    sender: String,
}

impl DaemonClient {
    pub async fn connect(endpoint: &str, sender: String) -> Result<Self> {
        let channel = Channel::from_shared(endpoint.to_string())?
            .connect()
            .await
            .with_context(|| format!("Failed to connect to daemon at {}", endpoint))?;

        tracing::debug!("Connected to daemon at {}", endpoint);

        Ok(Self {
            client: MockLocationClient::new(channel),
            sender,
        })
    }

    /// Send a set command. Values go out verbatim; the daemon parses them.
    pub async fn set_location(&mut self, lat: &str, lon: &str, alt: Option<&str>) -> Result<CommandReply> {
        self.dispatch(CommandAction::SetLocation, set_extras(lat, lon, alt)).await
    }

    /// Returns the raw reply text: `lat,lon,alt` or `NA`
    pub async fn get_location(&mut self) -> Result<String> {
        let reply = self.dispatch(CommandAction::GetLocation, HashMap::new()).await?;
        if !reply.has_result {
            anyhow::bail!("Daemon returned no result for command {}", reply.command_id);
        }
        Ok(reply.result_data)
    }

    pub async fn stop(&mut self) -> Result<CommandReply> {
        self.dispatch(CommandAction::Stop, HashMap::new()).await
    }

    pub async fn watch(&mut self) -> Result<tonic::Streaming<BroadcastUpdate>> {
        let request = Request::new(WatchRequest {
            subscriber: self.sender.clone(),
        });
        let response = self.client.watch_broadcast(request).await?;
        Ok(response.into_inner())
    }

    async fn dispatch(&mut self, action: CommandAction, extras: HashMap<String, String>) -> Result<CommandReply> {
        let request = Request::new(CommandRequest {
            action: action.as_str().to_string(),
            extras,
            sender: self.sender.clone(),
        });

        let response = self.client.dispatch(request).await?;
        Ok(response.into_inner())
    }
}

fn set_extras(lat: &str, lon: &str, alt: Option<&str>) -> HashMap<String, String> {
    let mut extras = HashMap::new();
    extras.insert(EXTRA_LAT.to_string(), lat.to_string());
    extras.insert(EXTRA_LON.to_string(), lon.to_string());
    if let Some(alt) = alt {
        extras.insert(EXTRA_ALT.to_string(), alt.to_string());
    }
    extras
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_extras_omit_missing_altitude() {
        let extras = set_extras("40.7128", "-74.0060", None);
        assert_eq!(extras.len(), 2);
        assert_eq!(extras["lat"], "40.7128");
        assert_eq!(extras["lon"], "-74.0060");

        let extras = set_extras("1", "2", Some("0"));
        assert_eq!(extras["alt"], "0");
    }
}
