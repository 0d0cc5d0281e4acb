mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::DaemonClient;
use mockgps_common::proto::BroadcastUpdate;

#[derive(Parser, Debug)]
#[command(name = "mockgps-ctl")]
#[command(about = "Send commands to the mock location daemon", long_about = None)]
struct Args {
    /// Daemon gRPC endpoint
    #[arg(long, default_value = "http://127.0.0.1:50061")]
    endpoint: String,

    /// Sender name reported to the daemon
    #[arg(long, default_value = "mockgps-ctl")]
    sender: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set the mocked location and start injecting it
    Set {
        #[arg(long, allow_hyphen_values = true)]
        lat: String,
        #[arg(long, allow_hyphen_values = true)]
        lon: String,
        #[arg(long, allow_hyphen_values = true)]
        alt: Option<String>,
    },
    /// Print the last set location as `lat,lon,alt` or `NA`
    Get,
    /// Stop injecting and remove the mock providers
    Stop,
    /// Follow broadcast updates until interrupted
    Watch {
        /// Print one JSON object per update
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let mut client = DaemonClient::connect(&args.endpoint, args.sender).await?;

    match args.command {
        Command::Set { lat, lon, alt } => {
            let reply = client.set_location(&lat, &lon, alt.as_deref()).await?;
            println!("{}", reply.command_id);
        }
        Command::Get => {
            println!("{}", client.get_location().await?);
        }
        Command::Stop => {
            let reply = client.stop().await?;
            println!("{}", reply.command_id);
        }
        Command::Watch { json } => {
            let mut stream = client.watch().await?;
            while let Some(update) = stream.message().await? {
                if json {
                    println!("{}", update_json(&update));
                } else {
                    println!("{}", update_line(&update));
                }
            }
            tracing::info!("Broadcast stream closed by daemon");
        }
    }

    Ok(())
}

fn update_line(update: &BroadcastUpdate) -> String {
    if !update.present {
        return mockgps_common::NO_LOCATION.to_string();
    }
    let altitude = if update.has_altitude { update.altitude } else { 0.0 };
    format!(
        "[{}] {:?},{:?},{:?}",
        update.captured_at, update.latitude, update.longitude, altitude
    )
}

fn update_json(update: &BroadcastUpdate) -> serde_json::Value {
    if !update.present {
        return serde_json::json!({ "present": false });
    }
    serde_json::json!({
        "present": true,
        "latitude": update.latitude,
        "longitude": update.longitude,
        "altitude": update.has_altitude.then_some(update.altitude),
        "captured_at": update.captured_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_accept_negative_coordinates() {
        let args = Args::try_parse_from(["mockgps-ctl", "set", "--lat", "-33.8688", "--lon", "151.2093"]).unwrap();
        match args.command {
            Command::Set { lat, lon, alt } => {
                assert_eq!(lat, "-33.8688");
                assert_eq!(lon, "151.2093");
                assert!(alt.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.endpoint, "http://127.0.0.1:50061");
    }

    #[test]
    fn test_update_rendering() {
        let absent = BroadcastUpdate::default();
        assert_eq!(update_line(&absent), "NA");
        assert_eq!(update_json(&absent)["present"], false);

        let update = BroadcastUpdate {
            present: true,
            latitude: 40.7128,
            longitude: -74.006,
            has_altitude: false,
            altitude: 0.0,
            captured_at: "2024-01-01 12:00:00".to_string(),
        };
        assert_eq!(update_line(&update), "[2024-01-01 12:00:00] 40.7128,-74.006,0.0");
        assert!(update_json(&update)["altitude"].is_null());
    }
}
