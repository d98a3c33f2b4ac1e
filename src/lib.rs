//! # DF Companion Library
//!
//! Telemetry acquisition for a radio direction-finding instrument.
//!
//! This library polls the instrument's bearing and compass endpoints, tracks
//! the operator's position with an IP-geolocation fallback, converts
//! coordinates between decimal and DMS notation, and persists user settings
//! with rollback on failed writes.

pub mod client;
pub mod config;
pub mod coords;
pub mod error;
pub mod location;
pub mod polling;
pub mod settings;
pub mod udp;
