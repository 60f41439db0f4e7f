//! # Configuration
//!
//! TOML configuration for the `enocean-link` binary and for applications that
//! want the same file layout.
//!
//! - [`SerialConfig`] - transceiver port and baud rate
//! - [`LinkConfig`] - response timeout, attempts, cycle intervals
//! - [`TeachInConfig`] - default teach-in window and supported profiles
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ```rust,no_run
//! use enocean_link::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("enocean.toml").await?;
//!     let config = Config::load("enocean.toml").await?;
//!     println!("Serial port: {}", config.serial.port);
//!     Ok(())
//! }
//! ```
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 57600
//!
//! [link]
//! response_timeout_ms = 500
//! max_attempts = 3
//! unobserved = "drop"
//!
//! [teach_in]
//! default_timeout_secs = 60
//! profiles = ["F6-02-01", "A5-02-05"]
//! ```

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::device::{DeviceTable, EepId, KNOWN_PROFILES};
use crate::link::{LinkTuning, UnobservedPolicy};
use crate::teachin::MAX_TEACH_IN_WINDOW;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    57600
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Transmissions per low-priority packet, first send included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u8,
    #[serde(default = "default_cycle_ms")]
    pub tx_cycle_ms: u64,
    #[serde(default = "default_cycle_ms")]
    pub delivery_cycle_ms: u64,
    /// What to do with received packets while no listener is registered.
    #[serde(default)]
    pub unobserved: UnobservedPolicy,
}

fn default_response_timeout_ms() -> u64 {
    500
}

fn default_max_attempts() -> u8 {
    3
}

fn default_cycle_ms() -> u64 {
    20
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            max_attempts: default_max_attempts(),
            tx_cycle_ms: default_cycle_ms(),
            delivery_cycle_ms: default_cycle_ms(),
            unobserved: UnobservedPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeachInConfig {
    #[serde(default = "default_teach_in_secs")]
    pub default_timeout_secs: u64,
    /// Profiles accepted at teach-in. Empty means every known profile.
    #[serde(default)]
    pub profiles: Vec<EepId>,
}

fn default_teach_in_secs() -> u64 {
    60
}

impl Default for TeachInConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_teach_in_secs(),
            profiles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub serial: SerialConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub teach_in: TeachInConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.serial.port.trim().is_empty() {
            return Err(anyhow!("serial.port must not be empty"));
        }
        if self.link.max_attempts == 0 {
            return Err(anyhow!("link.max_attempts must be at least 1"));
        }
        if self.link.response_timeout_ms == 0 {
            return Err(anyhow!("link.response_timeout_ms must be positive"));
        }
        if self.link.tx_cycle_ms == 0 || self.link.delivery_cycle_ms == 0 {
            return Err(anyhow!("link cycle intervals must be positive"));
        }
        if self.teach_in.default_timeout_secs == 0
            || self.teach_in.default_timeout_secs > MAX_TEACH_IN_WINDOW.as_secs()
        {
            return Err(anyhow!(
                "teach_in.default_timeout_secs must be between 1 and {}",
                MAX_TEACH_IN_WINDOW.as_secs()
            ));
        }
        Ok(())
    }

    pub fn link_tuning(&self) -> LinkTuning {
        LinkTuning {
            response_timeout: Duration::from_millis(self.link.response_timeout_ms),
            max_attempts: self.link.max_attempts,
            tx_cycle: Duration::from_millis(self.link.tx_cycle_ms),
            delivery_cycle: Duration::from_millis(self.link.delivery_cycle_ms),
            unobserved: self.link.unobserved,
        }
    }

    pub fn teach_in_timeout(&self) -> Duration {
        Duration::from_secs(self.teach_in.default_timeout_secs)
    }

    /// Empty registry accepting the configured profiles.
    pub fn device_table(&self) -> DeviceTable {
        if self.teach_in.profiles.is_empty() {
            DeviceTable::new()
        } else {
            DeviceTable::with_profiles(self.teach_in.profiles.clone())
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            serial: SerialConfig {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: default_baud_rate(),
            },
            link: LinkConfig::default(),
            teach_in: TeachInConfig {
                default_timeout_secs: default_teach_in_secs(),
                profiles: KNOWN_PROFILES.iter().map(|p| p.eep).collect(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceRegistry;
    use std::io::Write;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("baud_rate = 57600"));
        assert!(text.contains("\"F6-02-01\""));
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_minimal_file_gets_defaults() {
        let text = r#"
            [serial]
            port = "/dev/ttyAMA0"

            [logging]
            level = "debug"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.serial.baud_rate, 57600);
        assert_eq!(config.link, LinkConfig::default());
        assert!(config.teach_in.profiles.is_empty());
        assert_eq!(config.teach_in_timeout(), Duration::from_secs(60));

        let tuning = config.link_tuning();
        assert_eq!(tuning, LinkTuning::default());
    }

    #[test]
    fn test_profiles_and_policy_parse() {
        let text = r#"
            [serial]
            port = "COM3"
            [link]
            max_attempts = 5
            unobserved = "retain"
            [teach_in]
            profiles = ["a5-02-05", "F6-02-01"]
            [logging]
            level = "info"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.link.unobserved, UnobservedPolicy::Retain);
        assert_eq!(config.link_tuning().max_attempts, 5);

        let table = config.device_table();
        assert!(table.is_profile_supported(EepId::new(0xA5, 0x02, 0x05)));
        assert!(!table.is_profile_supported(EepId::new(0xD5, 0x00, 0x01)));
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let mut config = Config::default();
        config.link.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bounds_teach_in_timeout() {
        let mut config = Config::default();
        config.teach_in.default_timeout_secs = u64::MAX;
        assert!(config.validate().is_err());
        config.teach_in.default_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.teach_in.default_timeout_secs = MAX_TEACH_IN_WINDOW.as_secs();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_and_create_default_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enocean.toml");
        let path = path.to_str().unwrap();

        tokio_test::block_on(Config::create_default(path)).unwrap();
        let loaded = tokio_test::block_on(Config::load(path)).unwrap();
        assert_eq!(loaded, Config::default());

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[serial]\nport = \"\"\n[logging]\nlevel = \"info\"").unwrap();
        let err = tokio_test::block_on(Config::load(bad.path().to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("serial.port"));
    }
}
