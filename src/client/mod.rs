//! # Telemetry Client Module
//!
//! Request/response access to the DF instrument's HTTP API.
//!
//! This module handles:
//! - Reading the bearing/polar sweep (`GET /df`)
//! - Reading the compass heading (`GET /api/compass`)
//! - Frequency, gain, antenna and station settings
//! - Device shutdown and restart
//!
//! The polling stores only depend on the [`TelemetryClient`] trait, so they can
//! be driven by a scripted client in tests.

pub mod df_parser;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use df_parser::POLAR_SAMPLES;

pub use http::HttpTelemetryClient;

/// Antenna spacing at or below which the UHF array is selected (meters)
pub const UHF_SPACING_THRESHOLD_M: f64 = 0.25;

/// One decoded bearing/polar sweep from the instrument
#[derive(Debug, Clone, PartialEq)]
pub struct BearingReading {
    /// Opaque token identifying the device-side sample
    pub timestamp: String,
    /// Clockwise heading in [0, 360)
    pub heading_degrees: f64,
    pub confidence: f64,
    pub power: f64,
    /// Magnitude per degree
    pub polar_samples: Box<[f64; POLAR_SAMPLES]>,
}

/// Body of `POST /api/settings/freq`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreqGainSettings {
    pub center_freq: f64,
    pub uniform_gain: f64,
    pub ant_spacing_meters: f64,
}

/// Subset of `GET /api/settings` shown to the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DfSettings {
    pub center_freq: Option<f64>,
    pub uniform_gain: Option<f64>,
    pub station_id: Option<String>,
}

/// Antenna array selected on the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntennaBand {
    Vhf,
    Uhf,
}

impl AntennaBand {
    /// Pick the array matching an element spacing
    pub fn for_spacing(spacing_meters: f64) -> Self {
        if spacing_meters <= UHF_SPACING_THRESHOLD_M {
            AntennaBand::Uhf
        } else {
            AntennaBand::Vhf
        }
    }

    /// Path segment used by `GET /api/ant/{band}`
    pub fn as_path(self) -> &'static str {
        match self {
            AntennaBand::Vhf => "vhf",
            AntennaBand::Uhf => "uhf",
        }
    }
}

/// Trait for DF instrument API operations
#[async_trait]
pub trait TelemetryClient: Send + Sync {
    /// Fetch and decode the latest bearing/polar sweep
    async fn read_df(&self) -> Result<BearingReading>;

    /// Fetch the compass heading in degrees
    async fn read_compass(&self) -> Result<f64>;

    /// Apply center frequency, gain and antenna spacing
    async fn set_freq_gain(&self, settings: &FreqGainSettings) -> Result<serde_json::Value>;

    /// Switch the antenna array for the given element spacing
    async fn set_antenna(&self, spacing_meters: f64) -> Result<serde_json::Value>;

    /// Read the current radio settings
    async fn df_settings(&self) -> Result<DfSettings>;

    /// Set the station identifier
    async fn set_station_id(&self, id: &str) -> Result<serde_json::Value>;

    /// Ask the instrument to power off; failures are logged only
    async fn shutdown(&self);

    /// Ask the instrument to restart; failures are logged only
    async fn restart(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_antenna_band_threshold() {
        assert_eq!(AntennaBand::for_spacing(0.1), AntennaBand::Uhf);
        assert_eq!(AntennaBand::for_spacing(0.25), AntennaBand::Uhf);
        assert_eq!(AntennaBand::for_spacing(0.2501), AntennaBand::Vhf);
        assert_eq!(AntennaBand::for_spacing(0.5), AntennaBand::Vhf);
    }

    #[test]
    fn test_antenna_band_path() {
        assert_eq!(AntennaBand::Uhf.as_path(), "uhf");
        assert_eq!(AntennaBand::Vhf.as_path(), "vhf");
    }

    #[test]
    fn test_df_settings_ignores_extra_fields() {
        let json = r#"{"center_freq": 433.0, "uniform_gain": 20.7, "station_id": "ALPHA", "ant_spacing_meters": 0.3}"#;
        let settings: DfSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.center_freq, Some(433.0));
        assert_eq!(settings.uniform_gain, Some(20.7));
        assert_eq!(settings.station_id.as_deref(), Some("ALPHA"));
    }
}
