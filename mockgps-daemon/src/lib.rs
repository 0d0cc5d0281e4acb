//! Mock location daemon
//!
//! Accepts set/get/stop commands over gRPC, keeps the last commanded
//! position, and re-injects it into the mock providers of the location
//! subsystem at a fixed cadence.

pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod module;
pub mod service;

pub use daemon::MockGpsDaemon;
pub use error::{CommandError, LocationError};
