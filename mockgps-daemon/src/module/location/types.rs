//! Location data types

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Accuracy radius stamped on every injected sample, in meters
pub const MOCK_ACCURACY_METERS: f32 = 1.0;

/// A geographic position in decimal degrees.
///
/// `altitude` is `None` when the command did not carry one, which is not the
/// same thing as an altitude of zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64, altitude: Option<f64>) -> Self {
        Self { latitude, longitude, altitude }
    }

    /// Keep `previous`'s altitude when this coordinate has none.
    pub fn inherit_altitude(self, previous: Option<&Coordinate>) -> Self {
        Self {
            altitude: self.altitude.or_else(|| previous.and_then(|p| p.altitude)),
            ..self
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.altitude {
            Some(alt) => write!(f, "({}, {}, {}m)", self.latitude, self.longitude, alt),
            None => write!(f, "({}, {})", self.latitude, self.longitude),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerUsage {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    Fine,
    Coarse,
}

/// Capabilities a test provider is registered with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: String,
    pub requires_network: bool,
    pub requires_satellite: bool,
    pub requires_cell: bool,
    pub has_monetary_cost: bool,
    pub supports_altitude: bool,
    pub supports_speed: bool,
    pub supports_bearing: bool,
    pub power_usage: PowerUsage,
    pub accuracy: Accuracy,
}

impl ProviderSpec {
    /// A test provider that needs nothing and reports altitude, speed and bearing
    pub fn mock(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_network: false,
            requires_satellite: false,
            requires_cell: false,
            has_monetary_cost: false,
            supports_altitude: true,
            supports_speed: true,
            supports_bearing: true,
            power_usage: PowerUsage::Low,
            accuracy: Accuracy::Fine,
        }
    }
}

/// One location sample submitted to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub provider: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: f32,
    /// Wall-clock time of the sample
    pub time: DateTime<Utc>,
    /// Monotonic time since the daemon started
    pub elapsed_realtime: Duration,
}

impl LocationFix {
    pub fn new(
        provider: &str,
        coordinate: &Coordinate,
        time: DateTime<Utc>,
        elapsed_realtime: Duration,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            altitude: coordinate.altitude,
            accuracy: MOCK_ACCURACY_METERS,
            time,
            elapsed_realtime,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude, self.altitude)
    }
}
