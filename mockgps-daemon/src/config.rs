use anyhow::Context;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "MOCKGPS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Delay between two pulses of the injection loop
    #[serde(default = "default_pulse_interval_ms")]
    pub pulse_interval_ms: u64,

    /// Number of long-lived workers handling set/stop commands
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Commands queued beyond this are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Whether the built-in location manager grants the mock location capability
    #[serde(default = "default_mock_location_allowed")]
    pub mock_location_allowed: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    50061
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_pulse_interval_ms() -> u64 {
    1500
}

fn default_worker_count() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    64
}

fn default_mock_location_allowed() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            pulse_interval_ms: default_pulse_interval_ms(),
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            mock_location_allowed: default_mock_location_allowed(),
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file '{}'", path))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pulse_interval(&self) -> Duration {
        Duration::from_millis(self.pulse_interval_ms.max(1))
    }
}

pub static CONFIG: OnceLock<DaemonConfig> = OnceLock::new();

/// Load the config file once for the whole process.
///
/// A missing file is not an error: the daemon runs on defaults.
pub fn read_config() -> anyhow::Result<&'static DaemonConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = if std::path::Path::new(&path).exists() {
        DaemonConfig::from_file(&path)?
    } else {
        tracing::info!("Config file {} not found, using defaults", path);
        DaemonConfig::default()
    };

    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = DaemonConfig::from_toml("").unwrap();
        assert_eq!(config.server_address(), "127.0.0.1:50061");
        assert_eq!(config.pulse_interval(), Duration::from_millis(1500));
        assert_eq!(config.worker_count, 2);
        assert!(config.mock_location_allowed);
    }

    #[test]
    fn test_partial_override() {
        let config = DaemonConfig::from_toml(
            r#"
            port = 6000
            pulse_interval_ms = 250
            mock_location_allowed = false
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.pulse_interval(), Duration::from_millis(250));
        assert!(!config.mock_location_allowed);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(DaemonConfig::from_toml("port = \"not a number\"").is_err());
    }
}
