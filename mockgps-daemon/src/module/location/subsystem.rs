use async_trait::async_trait;

use super::types::{LocationFix, ProviderSpec};
use crate::error::LocationError;

/// Name of the satellite-based provider
pub const GPS_PROVIDER: &str = "gps";
/// Name of the network-based provider
pub const NETWORK_PROVIDER: &str = "network";

/// The providers every set command registers and every pulse feeds.
pub fn default_providers() -> Vec<ProviderSpec> {
    vec![ProviderSpec::mock(GPS_PROVIDER), ProviderSpec::mock(NETWORK_PROVIDER)]
}

/// The OS location service, as seen by the daemon.
///
/// Calls may block for as long as the underlying service takes; callers
/// must not hold locks across them.
#[async_trait]
pub trait LocationSubsystem: Send + Sync {
    /// Register `spec` as a test provider.
    async fn add_provider(&self, spec: &ProviderSpec) -> Result<(), LocationError>;

    async fn remove_provider(&self, name: &str) -> Result<(), LocationError>;

    async fn set_provider_enabled(&self, name: &str, enabled: bool) -> Result<(), LocationError>;

    /// Push one sample into a registered test provider.
    async fn submit_location(&self, name: &str, fix: &LocationFix) -> Result<(), LocationError>;
}
