//! Error types of the mock location daemon.

use thiserror::Error;

/// Failures reported by the location subsystem.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    /// The mock location capability has not been granted to this process
    #[error("Mock location permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider {0} is disabled")]
    ProviderDisabled(String),

    /// Any other failure of the underlying location service
    #[error("Location subsystem error: {0}")]
    Subsystem(String),
}

impl LocationError {
    pub fn subsystem(msg: impl Into<String>) -> Self {
        Self::Subsystem(msg.into())
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Failures while accepting or dispatching a command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("Missing extra '{0}'")]
    MissingExtra(&'static str),

    #[error("Invalid {field}: {value:?}")]
    InvalidCoordinate { field: &'static str, value: String },

    #[error("Command queue is full")]
    QueueFull,

    #[error("Command worker pool is closed")]
    PoolClosed,

    #[error("Injection loop controller has shut down")]
    InjectorClosed,
}
