//! Location subsystem
//!
//! The trait the core drives, the sample types it submits, and the built-in
//! in-memory location manager.

mod types;
pub use types::{Accuracy, Coordinate, LocationFix, PowerUsage, ProviderSpec, MOCK_ACCURACY_METERS};

mod subsystem;
pub use subsystem::{default_providers, LocationSubsystem, GPS_PROVIDER, NETWORK_PROVIDER};

mod memory;
pub use memory::{InMemoryLocationManager, ProviderStats};
