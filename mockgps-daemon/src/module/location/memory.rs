//! Built-in location manager.
//!
//! Keeps a provider table and the last fix per provider in memory. It is the
//! daemon's default backend and doubles as the test double for the core.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::subsystem::LocationSubsystem;
use super::types::{LocationFix, ProviderSpec};
use crate::error::LocationError;

#[derive(Debug, Clone)]
struct ProviderEntry {
    spec: ProviderSpec,
    enabled: bool,
    last_fix: Option<LocationFix>,
}

/// Per-provider counters, kept across removals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    pub additions: u64,
    pub removals: u64,
    pub submissions: u64,
}

pub struct InMemoryLocationManager {
    mock_location_allowed: AtomicBool,
    providers: RwLock<HashMap<String, ProviderEntry>>,
    stats: RwLock<HashMap<String, ProviderStats>>,
    failing: RwLock<HashSet<String>>,
}

impl InMemoryLocationManager {
    pub fn new(mock_location_allowed: bool) -> Self {
        Self {
            mock_location_allowed: AtomicBool::new(mock_location_allowed),
            providers: RwLock::new(HashMap::new()),
            stats: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Grant or revoke the mock location capability
    pub fn set_mock_location_allowed(&self, allowed: bool) {
        self.mock_location_allowed.store(allowed, Ordering::SeqCst);
    }

    /// Make every submission to `name` fail until turned off again
    pub async fn fail_submissions_for(&self, name: &str, failing: bool) {
        let mut set = self.failing.write().await;
        if failing {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    pub async fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn is_enabled(&self, name: &str) -> bool {
        self.providers
            .read()
            .await
            .get(name)
            .map_or(false, |entry| entry.enabled)
    }

    pub async fn provider_spec(&self, name: &str) -> Option<ProviderSpec> {
        self.providers.read().await.get(name).map(|entry| entry.spec.clone())
    }

    pub async fn last_fix(&self, name: &str) -> Option<LocationFix> {
        self.providers
            .read()
            .await
            .get(name)
            .and_then(|entry| entry.last_fix.clone())
    }

    pub async fn stats(&self, name: &str) -> ProviderStats {
        self.stats.read().await.get(name).copied().unwrap_or_default()
    }

    pub async fn total_submissions(&self) -> u64 {
        self.stats.read().await.values().map(|s| s.submissions).sum()
    }

    fn check_permission(&self) -> Result<(), LocationError> {
        if self.mock_location_allowed.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LocationError::PermissionDenied(
                "mock location app not selected".to_string(),
            ))
        }
    }

    async fn bump(&self, name: &str, f: impl FnOnce(&mut ProviderStats)) {
        let mut stats = self.stats.write().await;
        f(stats.entry(name.to_string()).or_default());
    }
}

impl Default for InMemoryLocationManager {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl LocationSubsystem for InMemoryLocationManager {
    async fn add_provider(&self, spec: &ProviderSpec) -> Result<(), LocationError> {
        self.check_permission()?;

        {
            let mut providers = self.providers.write().await;
            if providers.contains_key(&spec.name) {
                return Err(LocationError::subsystem(format!(
                    "provider {} already exists",
                    spec.name
                )));
            }
            providers.insert(
                spec.name.clone(),
                ProviderEntry {
                    spec: spec.clone(),
                    enabled: false,
                    last_fix: None,
                },
            );
        }

        self.bump(&spec.name, |s| s.additions += 1).await;
        Ok(())
    }

    async fn remove_provider(&self, name: &str) -> Result<(), LocationError> {
        self.check_permission()?;

        if self.providers.write().await.remove(name).is_none() {
            return Err(LocationError::UnknownProvider(name.to_string()));
        }

        self.bump(name, |s| s.removals += 1).await;
        Ok(())
    }

    async fn set_provider_enabled(&self, name: &str, enabled: bool) -> Result<(), LocationError> {
        self.check_permission()?;

        let mut providers = self.providers.write().await;
        let entry = providers
            .get_mut(name)
            .ok_or_else(|| LocationError::UnknownProvider(name.to_string()))?;
        entry.enabled = enabled;
        Ok(())
    }

    async fn submit_location(&self, name: &str, fix: &LocationFix) -> Result<(), LocationError> {
        self.check_permission()?;

        if self.failing.read().await.contains(name) {
            return Err(LocationError::subsystem(format!(
                "location service rejected sample for {}",
                name
            )));
        }

        {
            let mut providers = self.providers.write().await;
            let entry = providers
                .get_mut(name)
                .ok_or_else(|| LocationError::UnknownProvider(name.to_string()))?;
            if !entry.enabled {
                return Err(LocationError::ProviderDisabled(name.to_string()));
            }
            entry.last_fix = Some(fix.clone());
        }

        self.bump(name, |s| s.submissions += 1).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::location::Coordinate;
    use chrono::Utc;
    use std::time::Duration;

    fn fix(provider: &str) -> LocationFix {
        LocationFix::new(
            provider,
            &Coordinate::new(1.5, 2.5, None),
            Utc::now(),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_provider_lifecycle() {
        let manager = InMemoryLocationManager::default();
        let spec = ProviderSpec::mock("gps");

        manager.add_provider(&spec).await.unwrap();
        assert!(manager.add_provider(&spec).await.is_err());
        assert_eq!(
            manager.submit_location("gps", &fix("gps")).await,
            Err(LocationError::ProviderDisabled("gps".to_string()))
        );

        manager.set_provider_enabled("gps", true).await.unwrap();
        manager.submit_location("gps", &fix("gps")).await.unwrap();
        assert_eq!(manager.last_fix("gps").await.unwrap().latitude, 1.5);
        assert_eq!(manager.stats("gps").await.submissions, 1);

        manager.remove_provider("gps").await.unwrap();
        assert!(manager.provider_names().await.is_empty());
        assert_eq!(
            manager.remove_provider("gps").await,
            Err(LocationError::UnknownProvider("gps".to_string()))
        );
        assert_eq!(manager.stats("gps").await.removals, 1);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let manager = InMemoryLocationManager::new(false);
        let err = manager.add_provider(&ProviderSpec::mock("gps")).await.unwrap_err();
        assert!(err.is_permission_denied());

        manager.set_mock_location_allowed(true);
        manager.add_provider(&ProviderSpec::mock("gps")).await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_submission_failure() {
        let manager = InMemoryLocationManager::default();
        manager.add_provider(&ProviderSpec::mock("network")).await.unwrap();
        manager.set_provider_enabled("network", true).await.unwrap();

        manager.fail_submissions_for("network", true).await;
        assert!(manager.submit_location("network", &fix("network")).await.is_err());

        manager.fail_submissions_for("network", false).await;
        manager.submit_location("network", &fix("network")).await.unwrap();
        assert_eq!(manager.total_submissions().await, 1);
    }
}
