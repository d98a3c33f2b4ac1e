//! # Location Module
//!
//! Device position with graceful degradation.
//!
//! This module handles:
//! - Continuous position updates from a hardware receiver ([`HardwareLocator`])
//! - IP-based geolocation when the hardware is missing or refuses ([`IpGeolocator`])
//! - The observable location state ([`LocationStore`])
//!
//! ## Providers
//!
//! - [`SerialGnss`]: NMEA 0183 receiver on a serial port
//! - [`IpApiClient`]: single HTTP lookup returning a city-level position

pub mod gnss;
pub mod ip;
pub mod nmea;
pub mod store;
pub mod watch;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::error::Result;

pub use gnss::SerialGnss;
pub use ip::IpApiClient;
pub use store::{LocationState, LocationStore, WatchPhase};
pub use watch::{PositionSender, PositionWatch};

/// Accuracy above which a reading counts as degraded (meters)
pub const DEGRADED_ACCURACY_M: f64 = 100.0;

/// Accuracy assigned to IP-based positions (meters)
pub const IP_FALLBACK_ACCURACY_M: f64 = 5000.0;

/// Where a [`LocationReading`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    Device,
    IpFallback,
}

/// Position published by the [`LocationStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct LocationReading {
    pub lat: f64,
    pub lon: f64,
    pub accuracy_meters: f64,
    /// Course over ground; 0 when unknown
    pub heading_degrees: f64,
    pub timestamp: DateTime<Utc>,
    pub source: LocationSource,
}

impl LocationReading {
    /// True when accuracy is worse than [`DEGRADED_ACCURACY_M`]
    pub fn is_degraded(&self) -> bool {
        self.accuracy_meters > DEGRADED_ACCURACY_M
    }
}

/// One fix delivered by a hardware watch
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFix {
    pub lat: f64,
    pub lon: f64,
    pub accuracy_meters: f64,
    pub heading_degrees: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Failure reported by a hardware watch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    PositionUnavailable(String),

    #[error("{0}")]
    Timeout(String),
}

impl HardwareError {
    /// Errors after which the IP lookup is attempted
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            HardwareError::PermissionDenied(_) | HardwareError::PositionUnavailable(_)
        )
    }
}

/// Body of the IP geolocation lookup
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IpLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
}

/// Hardware position capability
pub trait HardwareLocator: Send + Sync + 'static {
    /// Capability probe, checked on every `start()`
    fn is_available(&self) -> bool;

    /// Begin continuous updates
    ///
    /// Must be called inside a Tokio runtime. Dropping the returned watch
    /// ends the underlying task.
    fn watch(&self) -> PositionWatch;
}

/// One-shot IP geolocation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IpGeolocator: Send + Sync + 'static {
    async fn locate(&self) -> Result<IpLocation>;
}
