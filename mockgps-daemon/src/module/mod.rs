pub mod handler;
pub mod injector;
pub mod location;
pub mod provider;
pub mod state;
pub mod worker;
