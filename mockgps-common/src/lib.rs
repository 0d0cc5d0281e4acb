//! Wire contract shared by the mock location daemon and its controllers.

pub mod proto {
    tonic::include_proto!("mockgps");
}

mod types;
pub use types::*;
