//! Command and query receivers.
//!
//! Set and Stop return as soon as their work is queued on the worker pool.
//! Get reads the broadcast store and builds its reply before returning.

use futures::FutureExt;
use mockgps_common::{CommandAction, EXTRA_ALT, EXTRA_LAT, EXTRA_LON, NO_LOCATION};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

use super::injector::InjectorHandle;
use super::location::Coordinate;
use super::provider::ProviderRegistry;
use super::state::{BroadcastState, BroadcastStore};
use super::worker::{CompletionHandle, WorkerPool};
use crate::error::CommandError;

/// What the caller gets back from [`CommandHandler::dispatch`]
#[derive(Debug)]
pub enum Dispatched {
    /// Work queued; the handle resolves once a worker is done with it
    Queued(CompletionHandle),
    /// Synchronous reply text
    Reply(String),
    /// Unknown action, nothing done
    Ignored,
}

#[derive(Clone)]
pub struct CommandHandler {
    store: BroadcastStore,
    registry: Arc<ProviderRegistry>,
    injector: InjectorHandle,
    pool: Arc<WorkerPool>,
}

impl CommandHandler {
    pub fn new(
        store: BroadcastStore,
        registry: Arc<ProviderRegistry>,
        injector: InjectorHandle,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self { store, registry, injector, pool }
    }

    /// Route one command by action id. Never awaits.
    pub fn dispatch(
        &self,
        command_id: &str,
        action: &str,
        extras: HashMap<String, String>,
    ) -> Result<Dispatched, CommandError> {
        let action = match action.parse::<CommandAction>() {
            Ok(action) => action,
            Err(e) => {
                warn!(command_id, "{}", e);
                return Ok(Dispatched::Ignored);
            }
        };

        match action {
            CommandAction::SetLocation => self.submit_set(command_id, extras).map(Dispatched::Queued),
            CommandAction::GetLocation => Ok(Dispatched::Reply(self.get_location())),
            CommandAction::Stop => self.submit_stop(command_id).map(Dispatched::Queued),
        }
    }

    /// Queue a set command
    pub fn submit_set(
        &self,
        command_id: &str,
        extras: HashMap<String, String>,
    ) -> Result<CompletionHandle, CommandError> {
        let store = self.store.clone();
        let registry = self.registry.clone();
        let injector = self.injector.clone();
        let span = info_span!("set_location", command_id);

        let job = async move { handle_set(&store, &registry, &injector, &extras).await }
            .instrument(span)
            .boxed();

        self.pool.submit(command_id, job)
    }

    /// Queue a stop command
    pub fn submit_stop(&self, command_id: &str) -> Result<CompletionHandle, CommandError> {
        let injector = self.injector.clone();
        let span = info_span!("stop", command_id);

        let job = async move {
            info!("Stop requested, tearing down injection loop");
            injector.stop().await;
            Ok(())
        }
        .instrument(span)
        .boxed();

        self.pool.submit(command_id, job)
    }

    /// Reply to a get command from the current broadcast state
    pub fn get_location(&self) -> String {
        let reply = format_reply(self.store.read().as_ref());
        info!("Get location result: {}", reply);
        reply
    }
}

async fn handle_set(
    store: &BroadcastStore,
    registry: &ProviderRegistry,
    injector: &InjectorHandle,
    extras: &HashMap<String, String>,
) -> Result<(), String> {
    let coordinate = match parse_coordinate(extras) {
        Ok(coordinate) => coordinate,
        Err(e) => {
            warn!("Dropping set command: {}", e);
            return Err(e.to_string());
        }
    };
    info!("Received coordinates {}", coordinate);

    store.replace(BroadcastState::capture(coordinate));

    if let Err(e) = registry.ensure_all_registered().await {
        error!("Test providers not ready, location will not be injected: {}", e);
        return Err(e.to_string());
    }

    let sent = if injector.is_pulsing() {
        injector.update(coordinate).await
    } else {
        injector.start(coordinate).await
    };
    sent.map_err(|e| {
        error!("Cannot reach injection loop: {}", e);
        e.to_string()
    })
}

/// Build a coordinate from string extras.
///
/// `lat` and `lon` are required and must be finite. A malformed `alt` is
/// ignored, not fatal.
pub fn parse_coordinate(extras: &HashMap<String, String>) -> Result<Coordinate, CommandError> {
    let latitude = parse_required(extras, EXTRA_LAT)?;
    let longitude = parse_required(extras, EXTRA_LON)?;

    let altitude = extras.get(EXTRA_ALT).and_then(|raw| match parse_finite(raw) {
        Some(alt) => Some(alt),
        None => {
            warn!("Ignoring invalid altitude {:?}", raw);
            None
        }
    });

    Ok(Coordinate::new(latitude, longitude, altitude))
}

fn parse_required(extras: &HashMap<String, String>, field: &'static str) -> Result<f64, CommandError> {
    let raw = extras.get(field).ok_or(CommandError::MissingExtra(field))?;
    parse_finite(raw).ok_or_else(|| CommandError::InvalidCoordinate {
        field,
        value: raw.clone(),
    })
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `"lat,lon,alt"` at full precision, or `"NA"` before the first set.
///
/// A missing altitude reads as `0.0`, like a sample without one.
pub fn format_reply(state: Option<&BroadcastState>) -> String {
    match state {
        Some(state) => {
            let c = &state.coordinate;
            format!(
                "{},{},{}",
                format_component(c.latitude),
                format_component(c.longitude),
                format_component(c.altitude.unwrap_or(0.0))
            )
        }
        None => NO_LOCATION.to_string(),
    }
}

/// Shortest round-trip form, always with a fractional part ("10.0", not "10")
fn format_component(value: f64) -> String {
    format!("{:?}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extras(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_coordinate() {
        let c = parse_coordinate(&extras(&[("lat", "40.7128"), ("lon", "-74.0060"), ("alt", "10.0")])).unwrap();
        assert_eq!(c, Coordinate::new(40.7128, -74.006, Some(10.0)));

        let c = parse_coordinate(&extras(&[("lat", " 1.0 "), ("lon", "2")])).unwrap();
        assert_eq!(c, Coordinate::new(1.0, 2.0, None));

        let c = parse_coordinate(&extras(&[("lat", "1.0"), ("lon", "2.0"), ("alt", "0")])).unwrap();
        assert_eq!(c.altitude, Some(0.0));
    }

    #[test]
    fn test_parse_rejects_bad_lat_lon() {
        assert_eq!(
            parse_coordinate(&extras(&[("lat", "abc"), ("lon", "2.0")])),
            Err(CommandError::InvalidCoordinate { field: "lat", value: "abc".to_string() })
        );
        assert_eq!(
            parse_coordinate(&extras(&[("lat", "1.0")])),
            Err(CommandError::MissingExtra("lon"))
        );
        for bad in ["NaN", "inf", "-infinity", ""] {
            assert!(parse_coordinate(&extras(&[("lat", "1.0"), ("lon", bad)])).is_err());
        }
    }

    #[test]
    fn test_invalid_altitude_is_dropped() {
        let c = parse_coordinate(&extras(&[("lat", "1.0"), ("lon", "2.0"), ("alt", "high")])).unwrap();
        assert_eq!(c.altitude, None);

        let c = parse_coordinate(&extras(&[("lat", "1.0"), ("lon", "2.0"), ("alt", "NaN")])).unwrap();
        assert_eq!(c.altitude, None);
    }

    #[test]
    fn test_format_reply() {
        assert_eq!(format_reply(None), "NA");

        let state = BroadcastState::capture(Coordinate::new(40.7128, -74.006, Some(10.0)));
        assert_eq!(format_reply(Some(&state)), "40.7128,-74.006,10.0");

        let state = BroadcastState::capture(Coordinate::new(1.0, 2.0, None));
        assert_eq!(format_reply(Some(&state)), "1.0,2.0,0.0");

        let state = BroadcastState::capture(Coordinate::new(0.1 + 0.2, -33.868820123456789, Some(-12.5)));
        let reply = format_reply(Some(&state));
        let parts: Vec<f64> = reply.split(',').map(|p| p.parse().unwrap()).collect();
        assert_eq!(parts, vec![0.1 + 0.2, -33.868820123456789, -12.5]);
    }
}
