//! Composition root: builds every component once and hands out handles.

use std::sync::Arc;
use std::time::Instant;

use crate::config::DaemonConfig;
use crate::module::handler::CommandHandler;
use crate::module::injector::{InjectionLoop, InjectorHandle};
use crate::module::location::{default_providers, LocationSubsystem};
use crate::module::provider::ProviderRegistry;
use crate::module::state::BroadcastStore;
use crate::module::worker::WorkerPool;
use crate::service::MockLocationService;

pub struct MockGpsDaemon {
    store: BroadcastStore,
    registry: Arc<ProviderRegistry>,
    injector: InjectorHandle,
    pool: Arc<WorkerPool>,
    handler: CommandHandler,
}

impl MockGpsDaemon {
    /// Wire the store, providers, injection loop and worker pool together.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &DaemonConfig, subsystem: Arc<dyn LocationSubsystem>) -> Self {
        let store = BroadcastStore::new();
        let registry = Arc::new(ProviderRegistry::new(subsystem, default_providers()));
        // The controller task outlives this handle until every injector handle is dropped
        let (injector, _controller) =
            InjectionLoop::spawn(registry.clone(), config.pulse_interval(), Instant::now());
        let pool = Arc::new(WorkerPool::new(config.worker_count, config.queue_capacity));
        let handler = CommandHandler::new(store.clone(), registry.clone(), injector.clone(), pool.clone());

        Self {
            store,
            registry,
            injector,
            pool,
            handler,
        }
    }

    pub fn store(&self) -> &BroadcastStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn injector(&self) -> &InjectorHandle {
        &self.injector
    }

    pub fn handler(&self) -> &CommandHandler {
        &self.handler
    }

    /// gRPC front for the command channel
    pub fn service(&self) -> MockLocationService {
        MockLocationService::new(self.handler.clone(), self.store.clone())
    }

    /// Process teardown: stop taking commands, stop pulsing, remove providers.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down mock location daemon...");
        self.pool.shutdown().await;
        self.injector.stop().await;
        tracing::info!("Mock location daemon stopped");
    }
}
