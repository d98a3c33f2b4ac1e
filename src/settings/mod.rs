//! # Settings Module
//!
//! User settings persisted to a flat JSON key/value file.
//!
//! This module handles:
//! - The settings document and its wire keys
//! - Persistence backends ([`SettingsBackend`], [`JsonFileBackend`])
//! - Optimistic writes with rollback ([`SettingsStore`])

pub mod backend;
pub mod document;
pub mod store;

pub use backend::{JsonFileBackend, SettingsBackend, DEFAULT_SETTINGS_FILE};
pub use document::{GpsLocation, SettingsDocument, UtmLocation};
pub use store::{SettingsState, SettingsStore};
