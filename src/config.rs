//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration pointing at the instrument's factory address.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{DfCompanionError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub udp: UdpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// DF instrument HTTP endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Polling store timing
#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub df_interval_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub compass_interval_ms: u64,

    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

/// Location acquisition configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LocationConfig {
    #[serde(default = "default_gnss_ports")]
    pub gnss_ports: Vec<String>,

    #[serde(default = "default_gnss_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_fix_timeout_ms")]
    pub fix_timeout_ms: u64,

    #[serde(default = "default_ip_fallback_url")]
    pub ip_fallback_url: String,
}

/// Persisted user settings location
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    #[serde(default = "default_settings_path")]
    pub path: String,
}

/// Datagram link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UdpConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_udp_port")]
    pub port: u16,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; stdout only when empty
    #[serde(default)]
    pub dir: String,

    #[serde(default = "default_status_interval_s")]
    pub status_interval_s: u64,
}

// Default value functions
fn default_base_url() -> String { "http://192.168.17.17:8087".to_string() }
fn default_request_timeout_ms() -> u64 { 3000 }

fn default_poll_interval_ms() -> u64 { 1000 }
fn default_stale_after_ms() -> u64 { 3000 }

fn default_gnss_ports() -> Vec<String> {
    vec!["/dev/ttyACM0".to_string(), "/dev/ttyUSB0".to_string()]
}
fn default_gnss_baud_rate() -> u32 { 9600 }
fn default_fix_timeout_ms() -> u64 { 10000 }
fn default_ip_fallback_url() -> String { "https://ipapi.co/json/".to_string() }

fn default_settings_path() -> String { "elangdf-config.json".to_string() }

fn default_udp_port() -> u16 { 8080 }

fn default_status_interval_s() -> u64 { 5 }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            df_interval_ms: default_poll_interval_ms(),
            compass_interval_ms: default_poll_interval_ms(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            gnss_ports: default_gnss_ports(),
            baud_rate: default_gnss_baud_rate(),
            fix_timeout_ms: default_fix_timeout_ms(),
            ip_fallback_url: default_ip_fallback_url(),
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self { path: default_settings_path() }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_udp_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: String::new(),
            status_interval_s: default_status_interval_s(),
        }
    }
}

impl PollingConfig {
    pub fn df_interval(&self) -> Duration {
        Duration::from_millis(self.df_interval_ms)
    }

    pub fn compass_interval(&self) -> Duration {
        Duration::from_millis(self.compass_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

impl DeviceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl LocationConfig {
    pub fn fix_timeout(&self) -> Duration {
        Duration::from_millis(self.fix_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use df_companion::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.device.base_url.is_empty() {
            return Err(invalid("device base_url cannot be empty"));
        }

        if !self.device.base_url.starts_with("http://") && !self.device.base_url.starts_with("https://") {
            return Err(invalid("device base_url must start with http:// or https://"));
        }

        if self.device.request_timeout_ms == 0 || self.device.request_timeout_ms > 60000 {
            return Err(invalid("request_timeout_ms must be between 1 and 60000"));
        }

        for (name, value) in [
            ("df_interval_ms", self.polling.df_interval_ms),
            ("compass_interval_ms", self.polling.compass_interval_ms),
            ("stale_after_ms", self.polling.stale_after_ms),
            ("fix_timeout_ms", self.location.fix_timeout_ms),
        ] {
            if value == 0 || value > 60000 {
                return Err(invalid(format!("{} must be between 1 and 60000", name)));
            }
        }

        if self.location.ip_fallback_url.is_empty() {
            return Err(invalid("ip_fallback_url cannot be empty"));
        }

        if ![4800, 9600, 19200, 38400, 57600, 115200].contains(&self.location.baud_rate) {
            return Err(invalid("baud_rate must be one of: 4800, 9600, 19200, 38400, 57600, 115200"));
        }

        if self.settings.path.is_empty() {
            return Err(invalid("settings path cannot be empty"));
        }

        if self.udp.enabled && self.udp.port == 0 {
            return Err(invalid("udp port cannot be 0 when enabled"));
        }

        if self.logging.status_interval_s == 0 {
            return Err(invalid("status_interval_s must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(msg: impl std::fmt::Display) -> DfCompanionError {
    DfCompanionError::Config(toml::de::Error::custom(msg))
}
