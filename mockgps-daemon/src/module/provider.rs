//! Provider lifecycle manager
//!
//! Tracks one registration state per mock provider and performs the
//! remove/add/enable sequence against the location subsystem at most once
//! while a provider stays registered.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::location::{LocationSubsystem, ProviderSpec};
use crate::error::LocationError;

const UNREGISTERED: u8 = 0;
const REGISTERING: u8 = 1;
const REGISTERED: u8 = 2;
const FAILED: u8 = 3;

/// Registration state of one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered,
    RegistrationFailed,
}

struct ProviderSlot {
    spec: ProviderSpec,
    state: AtomicU8,
    settled: Notify,
}

impl ProviderSlot {
    fn settle(&self, state: u8) {
        self.state.store(state, Ordering::Release);
        self.settled.notify_waiters();
    }

    /// Settle only if the slot is still in `from`; returns whether it was.
    fn settle_from(&self, from: u8, state: u8) -> bool {
        let won = self
            .state
            .compare_exchange(from, state, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.settled.notify_waiters();
        won
    }
}

/// Marks a registration attempt failed if it is dropped before settling.
struct RegistrationAttempt<'a> {
    slot: &'a ProviderSlot,
    settled: bool,
}

impl RegistrationAttempt<'_> {
    /// False when an unregister reset the slot while the attempt was in flight
    fn finish(mut self, state: u8) -> bool {
        self.settled = true;
        self.slot.settle_from(REGISTERING, state)
    }
}

impl Drop for RegistrationAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.slot.settle_from(REGISTERING, FAILED);
        }
    }
}

pub struct ProviderRegistry {
    subsystem: Arc<dyn LocationSubsystem>,
    slots: Vec<ProviderSlot>,
}

impl ProviderRegistry {
    pub fn new(subsystem: Arc<dyn LocationSubsystem>, specs: Vec<ProviderSpec>) -> Self {
        let slots = specs
            .into_iter()
            .map(|spec| ProviderSlot {
                spec,
                state: AtomicU8::new(UNREGISTERED),
                settled: Notify::new(),
            })
            .collect();

        Self { subsystem, slots }
    }

    pub fn subsystem(&self) -> &Arc<dyn LocationSubsystem> {
        &self.subsystem
    }

    /// Current state of `name`; an attempt still in flight reads as unregistered
    pub fn state(&self, name: &str) -> Option<RegistrationState> {
        self.slot(name).map(|slot| match slot.state.load(Ordering::Acquire) {
            REGISTERED => RegistrationState::Registered,
            FAILED => RegistrationState::RegistrationFailed,
            _ => RegistrationState::Unregistered,
        })
    }

    /// Names of the providers currently registered
    pub fn registered(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|slot| slot.state.load(Ordering::Acquire) == REGISTERED)
            .map(|slot| slot.spec.name.as_str())
            .collect()
    }

    fn slot(&self, name: &str) -> Option<&ProviderSlot> {
        self.slots.iter().find(|slot| slot.spec.name == name)
    }

    /// Make sure `name` is registered and enabled.
    ///
    /// Returns immediately when already registered. Concurrent callers wait
    /// for the attempt in flight instead of starting their own.
    pub async fn ensure_registered(&self, name: &str) -> Result<(), LocationError> {
        let slot = self
            .slot(name)
            .ok_or_else(|| LocationError::UnknownProvider(name.to_string()))?;

        loop {
            let settled = slot.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            match slot.state.load(Ordering::Acquire) {
                REGISTERED => return Ok(()),
                REGISTERING => {
                    settled.await;
                    return match slot.state.load(Ordering::Acquire) {
                        REGISTERED => Ok(()),
                        _ => Err(LocationError::subsystem(format!(
                            "concurrent registration of {} did not succeed",
                            name
                        ))),
                    };
                }
                current => {
                    if slot
                        .state
                        .compare_exchange(current, REGISTERING, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                    {
                        continue;
                    }

                    let attempt = RegistrationAttempt { slot, settled: false };
                    return match self.register(&slot.spec).await {
                        Ok(()) => {
                            if attempt.finish(REGISTERED) {
                                info!("Test provider {} registered", name);
                                return Ok(());
                            }
                            if slot.state.load(Ordering::Acquire) == REGISTERED {
                                // A newer attempt registered it after ours was reset
                                return Ok(());
                            }
                            warn!("Test provider {} was unregistered while being set up", name);
                            if let Err(e) = self.subsystem.remove_provider(name).await {
                                debug!("Cleanup of test provider {} failed: {}", name, e);
                            }
                            Err(LocationError::subsystem(format!(
                                "registration of {} was cancelled by an unregister",
                                name
                            )))
                        }
                        Err(e) => {
                            attempt.finish(FAILED);
                            if e.is_permission_denied() {
                                error!("Mock location permission denied for {}: {}", name, e);
                            } else {
                                error!("Failed to set up test provider {}: {}", name, e);
                            }
                            Err(e)
                        }
                    };
                }
            }
        }
    }

    /// Register every provider in order, stopping at the first failure
    pub async fn ensure_all_registered(&self) -> Result<(), LocationError> {
        for slot in &self.slots {
            self.ensure_registered(&slot.spec.name).await?;
        }
        Ok(())
    }

    async fn register(&self, spec: &ProviderSpec) -> Result<(), LocationError> {
        // A stale provider from an earlier run may still be around
        match self.subsystem.remove_provider(&spec.name).await {
            Ok(()) => debug!("Removed existing test provider {}", spec.name),
            Err(e) => debug!("No existing test provider {} to remove: {}", spec.name, e),
        }

        self.subsystem.add_provider(spec).await?;
        self.subsystem.set_provider_enabled(&spec.name, true).await?;
        Ok(())
    }

    /// Remove `name` and reset it to unregistered. Failures are logged only.
    pub async fn unregister(&self, name: &str) {
        let Some(slot) = self.slot(name) else {
            warn!("Cannot unregister unknown provider {}", name);
            return;
        };

        // Let an attempt in flight settle first so it cannot re-add the provider behind us
        loop {
            let settled = slot.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            if slot.state.load(Ordering::Acquire) != REGISTERING {
                break;
            }
            debug!("Waiting for registration of {} to settle before removing it", name);
            settled.await;
        }

        match self.subsystem.remove_provider(name).await {
            Ok(()) => info!("Test provider {} removed", name),
            Err(LocationError::UnknownProvider(_)) => debug!("Test provider {} was already gone", name),
            Err(e) => warn!("Failed to remove test provider {}: {}", name, e),
        }

        slot.settle(UNREGISTERED);
    }

    /// Unregister every provider that is not already unregistered
    pub async fn unregister_all(&self) {
        for slot in &self.slots {
            if slot.state.load(Ordering::Acquire) != UNREGISTERED {
                self.unregister(&slot.spec.name).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::location::{
        default_providers, InMemoryLocationManager, LocationFix, GPS_PROVIDER, NETWORK_PROVIDER,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    /// Location manager whose enable call takes a while
    struct SlowEnable {
        inner: Arc<InMemoryLocationManager>,
        delay: Duration,
    }

    #[async_trait]
    impl LocationSubsystem for SlowEnable {
        async fn add_provider(&self, spec: &ProviderSpec) -> Result<(), LocationError> {
            self.inner.add_provider(spec).await
        }

        async fn remove_provider(&self, name: &str) -> Result<(), LocationError> {
            self.inner.remove_provider(name).await
        }

        async fn set_provider_enabled(&self, name: &str, enabled: bool) -> Result<(), LocationError> {
            let result = self.inner.set_provider_enabled(name, enabled).await;
            tokio::time::sleep(self.delay).await;
            result
        }

        async fn submit_location(&self, name: &str, fix: &LocationFix) -> Result<(), LocationError> {
            self.inner.submit_location(name, fix).await
        }
    }

    fn registry(allowed: bool) -> (Arc<InMemoryLocationManager>, ProviderRegistry) {
        let manager = Arc::new(InMemoryLocationManager::new(allowed));
        let registry = ProviderRegistry::new(manager.clone(), default_providers());
        (manager, registry)
    }

    #[tokio::test]
    async fn test_registered_is_sticky() {
        let (manager, registry) = registry(true);

        registry.ensure_registered(GPS_PROVIDER).await.unwrap();
        registry.ensure_registered(GPS_PROVIDER).await.unwrap();

        assert_eq!(registry.state(GPS_PROVIDER), Some(RegistrationState::Registered));
        assert_eq!(manager.stats(GPS_PROVIDER).await.additions, 1);
        assert!(manager.is_enabled(GPS_PROVIDER).await);
        assert_eq!(
            manager.provider_spec(GPS_PROVIDER).await,
            Some(ProviderSpec::mock(GPS_PROVIDER))
        );
    }

    #[tokio::test]
    async fn test_failure_allows_retry() {
        let (manager, registry) = registry(false);

        let err = registry.ensure_registered(GPS_PROVIDER).await.unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(registry.state(GPS_PROVIDER), Some(RegistrationState::RegistrationFailed));
        assert!(registry.registered().is_empty());

        manager.set_mock_location_allowed(true);
        registry.ensure_registered(GPS_PROVIDER).await.unwrap();
        assert_eq!(registry.state(GPS_PROVIDER), Some(RegistrationState::Registered));
    }

    #[tokio::test]
    async fn test_concurrent_registration_happens_once() {
        let (manager, registry) = registry(true);
        let registry = Arc::new(registry);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.ensure_all_registered().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(manager.stats(GPS_PROVIDER).await.additions, 1);
        assert_eq!(manager.stats(NETWORK_PROVIDER).await.additions, 1);
    }

    #[tokio::test]
    async fn test_unregister_resets_state() {
        let (manager, registry) = registry(true);
        registry.ensure_all_registered().await.unwrap();

        registry.unregister_all().await;
        assert_eq!(registry.state(GPS_PROVIDER), Some(RegistrationState::Unregistered));
        assert_eq!(registry.state(NETWORK_PROVIDER), Some(RegistrationState::Unregistered));
        assert!(manager.provider_names().await.is_empty());

        registry.ensure_registered(GPS_PROVIDER).await.unwrap();
        assert_eq!(manager.stats(GPS_PROVIDER).await.additions, 2);
    }

    #[tokio::test]
    async fn test_unregister_swallows_failures() {
        let (manager, registry) = registry(true);
        registry.ensure_all_registered().await.unwrap();

        manager.set_mock_location_allowed(false);
        registry.unregister(GPS_PROVIDER).await;
        assert_eq!(registry.state(GPS_PROVIDER), Some(RegistrationState::Unregistered));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let (_, registry) = registry(true);
        assert_eq!(
            registry.ensure_registered("fused").await,
            Err(LocationError::UnknownProvider("fused".to_string()))
        );
        assert_eq!(registry.state("fused"), None);
    }

    #[tokio::test]
    async fn test_unregister_during_registration_leaves_consistent_state() {
        let manager = Arc::new(InMemoryLocationManager::default());
        let slow = Arc::new(SlowEnable {
            inner: manager.clone(),
            delay: Duration::from_millis(50),
        });
        let registry = Arc::new(ProviderRegistry::new(slow, default_providers()));

        let attempt = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.ensure_registered(GPS_PROVIDER).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.unregister_all().await;
        let _ = attempt.await.unwrap();

        assert_eq!(registry.state(GPS_PROVIDER), Some(RegistrationState::Unregistered));
        assert!(manager.provider_names().await.is_empty());

        // The next attempt must really register again
        registry.ensure_registered(GPS_PROVIDER).await.unwrap();
        assert_eq!(registry.state(GPS_PROVIDER), Some(RegistrationState::Registered));
        assert_eq!(manager.provider_names().await, vec![GPS_PROVIDER.to_string()]);
        assert!(manager.is_enabled(GPS_PROVIDER).await);
    }
}
