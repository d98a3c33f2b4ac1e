//! # Polling Module
//!
//! Timer-driven telemetry stores.
//!
//! This module handles:
//! - The generic fetch/cache/status loop ([`PollingStore`])
//! - Bearing/polar sweeps with staleness dedup
//! - Compass heading

pub mod bearing;
pub mod compass;
pub mod store;

pub use bearing::{bearing_store, BearingSource, BearingStore};
pub use compass::{compass_store, CompassSource, CompassStore};
pub use store::{
    CycleOutcome, PollingState, PollingStore, Source, Status, TelemetrySnapshot,
    DEFAULT_POLL_INTERVAL, NO_NEW_DATA,
};
