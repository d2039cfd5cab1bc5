//! Persistent application configuration
//!
//! Stores the instrument address, acquisition settings and engine timing in a
//! JSON file at `<data_dir>/pitayascope/config.json`.

use pitayascope_core::{AcquisitionConfig, EngineTiming};
use pitayascope_core::acquisition::trigger::PollPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_host() -> String {
    "169.254.195.129".to_string()
}

fn default_port() -> u16 {
    pitayascope_core::DEFAULT_SCPI_PORT
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_trigger_test_polls() -> u32 {
    30
}

fn default_capture_polls() -> u32 {
    50
}

fn default_free_run_settle_ms() -> u64 {
    500
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_command_settle_ms() -> u64 {
    100
}

fn default_continuous_interval_ms() -> u64 {
    500
}

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Instrument hostname or IP address
    #[serde(default = "default_host")]
    pub host: String,
    /// SCPI server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect and response timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Capture parameters
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Interval between trigger status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Poll budget of the interactive trigger test
    #[serde(default = "default_trigger_test_polls")]
    pub trigger_test_polls: u32,
    /// Poll budget of a full capture
    #[serde(default = "default_capture_polls")]
    pub capture_polls: u32,
    /// Wait for a free-running capture to fill
    #[serde(default = "default_free_run_settle_ms")]
    pub free_run_settle_ms: u64,
    /// Pause before retrying a failed data query
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Pause after reset/stop while arming
    #[serde(default = "default_command_settle_ms")]
    pub command_settle_ms: u64,
    /// Cadence of continuous mode
    #[serde(default = "default_continuous_interval_ms")]
    pub continuous_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            acquisition: AcquisitionConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            trigger_test_polls: default_trigger_test_polls(),
            capture_polls: default_capture_polls(),
            free_run_settle_ms: default_free_run_settle_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            command_settle_ms: default_command_settle_ms(),
            continuous_interval_ms: default_continuous_interval_ms(),
        }
    }
}

impl AppConfig {
    /// Config file path: `<data_dir>/pitayascope/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pitayascope")
            .join("config.json")
    }

    /// Load config from the default path
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Connect and response timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Cadence of continuous mode
    pub fn continuous_interval(&self) -> Duration {
        Duration::from_millis(self.continuous_interval_ms)
    }

    /// Engine waits derived from this config
    pub fn timing(&self) -> EngineTiming {
        let interval = Duration::from_millis(self.poll_interval_ms);
        EngineTiming {
            command_settle: Duration::from_millis(self.command_settle_ms),
            free_run_settle: Duration::from_millis(self.free_run_settle_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            trigger_test: PollPolicy::new(interval, self.trigger_test_polls),
            capture: PollPolicy::new(interval, self.capture_polls),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitayascope_core::{Decimation, TriggerSource};

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.host, "169.254.195.129");
        assert_eq!(config.port, 5000);
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.acquisition, AcquisitionConfig::default());
    }

    #[test]
    fn test_default_timing_matches_engine_default() {
        assert_eq!(AppConfig::default().timing(), EngineTiming::default());
    }

    #[test]
    fn test_round_trip() {
        let config = AppConfig {
            host: "rp-f0a1b2.local".to_string(),
            acquisition: AcquisitionConfig::new(
                Decimation::X1024,
                4096,
                512,
                TriggerSource::Ch2Ne,
                -1.5,
            )
            .unwrap(),
            capture_polls: 80,
            ..AppConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let loaded: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.timing().capture.max_polls, 80);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let json = r#"{"host": "10.0.0.7", "acquisition": {"decimation": 64}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.port, 5000);
        assert_eq!(config.acquisition.decimation, Decimation::X64);
        assert_eq!(config.acquisition.buffer_size, 16384);
        assert_eq!(config.continuous_interval_ms, 500);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_invalid_acquisition_falls_back_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"acquisition": {"buffer_size": 3}}"#).unwrap();

        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = AppConfig {
            port: 5025,
            trigger_test_polls: 10,
            ..AppConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.port, 5025);
        assert_eq!(loaded.trigger_test_polls, 10);
    }
}
