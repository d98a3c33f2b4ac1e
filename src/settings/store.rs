//! # Settings Store
//!
//! In-memory [`SettingsDocument`] mirrored to a [`SettingsBackend`].
//!
//! Setters are optimistic: the new value is visible to readers at once and
//! rolled back if the backend refuses it. `load()`, the setters and `reset()`
//! take one async writer lock, so a load can never interleave with a pending
//! save. Readers never wait on the lock.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{error, info};

use super::backend::SettingsBackend;
use super::document::{
    GpsLocation, SettingsDocument, UtmLocation, KEY_COMPASS_OFFSET, KEY_GPS_LOCATION,
    KEY_UTM_LOCATION,
};
use crate::error::{DfCompanionError, Result};

/// Observable settings state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SettingsState {
    pub document: SettingsDocument,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Optimistic settings store
pub struct SettingsStore<B> {
    backend: B,
    state: watch::Sender<SettingsState>,
    writer: Mutex<()>,
}

impl<B: SettingsBackend> SettingsStore<B> {
    /// Store holding defaults until [`load`](Self::load) is called
    pub fn new(backend: B) -> Self {
        let (state, _) = watch::channel(SettingsState::default());
        Self {
            backend,
            state,
            writer: Mutex::new(()),
        }
    }

    /// Read all keys, applying defaults for absent ones
    ///
    /// The document is replaced only if every key was read and decoded.
    ///
    /// # Errors
    ///
    /// Returns the first read or decode failure; in-memory values are kept.
    pub async fn load(&self) -> Result<SettingsDocument> {
        let _writer = self.writer.lock().await;
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });

        match self.read_document().await {
            Ok(document) => {
                info!("Settings loaded: {:?}", document);
                self.state.send_modify(|s| {
                    s.document = document.clone();
                    s.is_loading = false;
                });
                Ok(document)
            }
            Err(e) => {
                error!("Failed to load settings: {}", e);
                self.state.send_modify(|s| {
                    s.error = Some(e.to_string());
                    s.is_loading = false;
                });
                Err(e)
            }
        }
    }

    async fn read_document(&self) -> Result<SettingsDocument> {
        Ok(SettingsDocument {
            compass_offset: self.read_key(KEY_COMPASS_OFFSET).await?.unwrap_or_default(),
            gps_location: self.read_key(KEY_GPS_LOCATION).await?.unwrap_or_default(),
            utm_location: self.read_key(KEY_UTM_LOCATION).await?.unwrap_or_default(),
        })
    }

    async fn read_key<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| DfCompanionError::Persistence(format!("Invalid {}: {}", key, e))),
        }
    }

    /// Set the compass offset in degrees
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a non-finite value (nothing changes), or the
    /// backend error after rolling back.
    pub async fn set_compass_offset(&self, degrees: f64) -> Result<()> {
        if !degrees.is_finite() {
            return Err(DfCompanionError::InvalidArgument(format!(
                "compass offset must be finite, got {}",
                degrees
            )));
        }
        self.save(KEY_COMPASS_OFFSET, serde_json::to_value(degrees)?, |d| {
            d.compass_offset = degrees
        })
        .await
    }

    /// Set the manual GPS position
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for non-finite coordinates, or the backend error
    /// after rolling back.
    pub async fn set_gps_location(&self, lat: f64, lng: f64) -> Result<()> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(DfCompanionError::InvalidArgument(format!(
                "GPS location must be finite, got ({}, {})",
                lat, lng
            )));
        }
        let location = GpsLocation { lat, lng };
        self.save(KEY_GPS_LOCATION, serde_json::to_value(location)?, |d| {
            d.gps_location = location
        })
        .await
    }

    /// Set the manual UTM position
    ///
    /// # Errors
    ///
    /// Returns the backend error after rolling back.
    pub async fn set_utm_location(
        &self,
        zone: impl Into<String>,
        easting: impl Into<String>,
        northing: impl Into<String>,
        co: impl Into<String>,
    ) -> Result<()> {
        let location = UtmLocation {
            zone: zone.into(),
            easting: easting.into(),
            northing: northing.into(),
            co: co.into(),
        };
        let value = serde_json::to_value(&location)?;
        self.save(KEY_UTM_LOCATION, value, move |d| d.utm_location = location)
            .await
    }

    /// Apply `mutate` immediately, persist `value` under `key`, undo on failure
    async fn save<F>(&self, key: &'static str, value: Value, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut SettingsDocument),
    {
        let _writer = self.writer.lock().await;
        let rollback = self.state.borrow().document.clone();
        self.state.send_modify(|s| mutate(&mut s.document));

        match self.backend.set(key, value).await {
            Ok(()) => {
                info!("{} saved", key);
                Ok(())
            }
            Err(e) => {
                error!("Failed to save {}, reverting: {}", key, e);
                self.state.send_modify(|s| {
                    s.document = rollback;
                    s.error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Restore defaults in memory, then clear the persistent document
    ///
    /// # Errors
    ///
    /// Returns the backend error; in-memory values stay at defaults.
    pub async fn reset(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.state
            .send_modify(|s| s.document = SettingsDocument::default());

        match self.backend.clear().await {
            Ok(()) => {
                info!("Settings reset to defaults");
                Ok(())
            }
            Err(e) => {
                error!("Failed to reset settings: {}", e);
                self.state.send_modify(|s| s.error = Some(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn compass_offset(&self) -> f64 {
        self.state.borrow().document.compass_offset
    }

    pub fn gps_location(&self) -> GpsLocation {
        self.state.borrow().document.gps_location
    }

    pub fn utm_location(&self) -> UtmLocation {
        self.state.borrow().document.utm_location.clone()
    }

    /// Snapshot of the whole document
    pub fn all_settings(&self) -> SettingsDocument {
        self.state.borrow().document.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    /// Last recorded load/save error
    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<SettingsState> {
        self.state.subscribe()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::backend::mocks::MemoryBackend;
    use crate::settings::backend::{JsonFileBackend, DEFAULT_SETTINGS_FILE};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn memory_store(entries: Vec<(&str, Value)>) -> (Arc<MemoryBackend>, SettingsStore<Arc<MemoryBackend>>) {
        let backend = Arc::new(MemoryBackend::with(entries));
        (Arc::clone(&backend), SettingsStore::new(backend))
    }

    #[tokio::test]
    async fn test_load_empty_applies_defaults() {
        let (_, store) = memory_store(vec![]);

        let doc = store.load().await.unwrap();

        assert_eq!(doc, SettingsDocument::default());
        assert!(!store.is_loading());
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn test_load_reads_all_keys() {
        let (_, store) = memory_store(vec![
            (KEY_COMPASS_OFFSET, json!(7.5)),
            (KEY_GPS_LOCATION, json!({"lat": -6.9, "lng": 107.6})),
            (
                KEY_UTM_LOCATION,
                json!({"zone": "48M", "easting": "789123", "northing": "9234567", "co": "X"}),
            ),
        ]);

        store.load().await.unwrap();

        assert_eq!(store.compass_offset(), 7.5);
        assert_eq!(store.gps_location(), GpsLocation { lat: -6.9, lng: 107.6 });
        assert_eq!(store.utm_location().zone, "48M");
    }

    #[tokio::test]
    async fn test_load_partial_document_defaults_missing_keys() {
        let (_, store) = memory_store(vec![(KEY_COMPASS_OFFSET, json!(3.0))]);

        store.load().await.unwrap();

        assert_eq!(store.compass_offset(), 3.0);
        assert_eq!(store.gps_location(), GpsLocation::default());
        assert_eq!(store.utm_location(), UtmLocation::default());
    }

    #[tokio::test]
    async fn test_load_decode_failure_applies_nothing() {
        let (backend, store) = memory_store(vec![(KEY_COMPASS_OFFSET, json!(4.0))]);
        store.load().await.unwrap();

        backend
            .map
            .lock()
            .unwrap()
            .insert(KEY_COMPASS_OFFSET.to_string(), json!(9.0));
        backend
            .map
            .lock()
            .unwrap()
            .insert(KEY_GPS_LOCATION.to_string(), json!("not an object"));

        assert!(store.load().await.is_err());
        assert_eq!(store.compass_offset(), 4.0);
        assert!(store.error().unwrap().contains(KEY_GPS_LOCATION));
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_load_read_failure_keeps_values() {
        let (backend, store) = memory_store(vec![]);
        store.set_compass_offset(5.0).await.unwrap();
        backend.fail_reads(true);

        let err = store.load().await.unwrap_err();

        assert_eq!(err.to_string(), "Persistence error: disk unreadable");
        assert_eq!(store.compass_offset(), 5.0);
        assert_eq!(store.error().as_deref(), Some("Persistence error: disk unreadable"));
    }

    #[tokio::test]
    async fn test_set_compass_offset_persists() {
        let (backend, store) = memory_store(vec![]);

        store.set_compass_offset(12.0).await.unwrap();

        assert_eq!(store.compass_offset(), 12.0);
        assert_eq!(backend.stored(KEY_COMPASS_OFFSET), Some(json!(12.0)));
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back() {
        let (backend, store) = memory_store(vec![]);
        store.set_compass_offset(5.0).await.unwrap();
        backend.fail_writes(true);

        let result = store.set_compass_offset(12.0).await;

        assert!(result.is_err());
        assert_eq!(store.compass_offset(), 5.0);
        assert_eq!(store.error().as_deref(), Some("Persistence error: disk full"));
        assert_eq!(backend.stored(KEY_COMPASS_OFFSET), Some(json!(5.0)));
    }

    #[tokio::test]
    async fn test_failed_gps_and_utm_saves_roll_back() {
        let (backend, store) = memory_store(vec![]);
        store.set_gps_location(1.0, 2.0).await.unwrap();
        store.set_utm_location("48M", "1", "2", "").await.unwrap();
        backend.fail_writes(true);

        assert!(store.set_gps_location(3.0, 4.0).await.is_err());
        assert!(store.set_utm_location("49N", "3", "4", "Y").await.is_err());

        assert_eq!(store.gps_location(), GpsLocation { lat: 1.0, lng: 2.0 });
        assert_eq!(store.utm_location().zone, "48M");
    }

    #[tokio::test]
    async fn test_optimistic_value_visible_during_save() {
        let (_, store) = memory_store(vec![]);
        let mut rx = store.subscribe();

        store.set_compass_offset(9.0).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().document.compass_offset, 9.0);
    }

    #[tokio::test]
    async fn test_non_finite_rejected_without_write() {
        let (backend, store) = memory_store(vec![]);

        assert!(matches!(
            store.set_compass_offset(f64::NAN).await,
            Err(DfCompanionError::InvalidArgument(_))
        ));
        assert!(store.set_gps_location(f64::INFINITY, 0.0).await.is_err());
        assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
        assert_eq!(store.compass_offset(), 0.0);
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let (backend, store) = memory_store(vec![]);
        store.set_compass_offset(5.0).await.unwrap();

        store.reset().await.unwrap();

        assert_eq!(store.all_settings(), SettingsDocument::default());
        assert_eq!(backend.stored(KEY_COMPASS_OFFSET), None);
    }

    #[tokio::test]
    async fn test_failed_reset_keeps_defaults_in_memory() {
        let (backend, store) = memory_store(vec![]);
        store.set_compass_offset(5.0).await.unwrap();
        backend.fail_writes(true);

        assert!(store.reset().await.is_err());

        assert_eq!(store.compass_offset(), 0.0);
        assert!(store.error().is_some());
        assert_eq!(backend.stored(KEY_COMPASS_OFFSET), Some(json!(5.0)));
    }

    #[tokio::test]
    async fn test_concurrent_setters_are_serialized() {
        let (backend, store) = memory_store(vec![]);

        let (a, b) = tokio::join!(store.set_compass_offset(1.0), store.set_compass_offset(2.0));
        assert!(a.is_ok() && b.is_ok());

        assert_eq!(store.compass_offset(), 2.0);
        assert_eq!(backend.stored(KEY_COMPASS_OFFSET), Some(json!(2.0)));
    }

    #[tokio::test]
    async fn test_file_backend_round_trip_through_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);

        let store = SettingsStore::new(JsonFileBackend::new(&path));
        store.load().await.unwrap();
        store.set_compass_offset(15.0).await.unwrap();
        store.set_gps_location(-6.9, 107.6).await.unwrap();

        let reopened = SettingsStore::new(JsonFileBackend::new(&path));
        let doc = reopened.load().await.unwrap();
        assert_eq!(doc.compass_offset, 15.0);
        assert_eq!(doc.gps_location, GpsLocation { lat: -6.9, lng: 107.6 });
        assert_eq!(doc.utm_location, UtmLocation::default());
    }

    #[tokio::test]
    async fn test_corrupt_file_load_fails_without_touching_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        std::fs::write(&path, "{\"compassOffset\": ").unwrap();

        let store = SettingsStore::new(JsonFileBackend::new(&path));

        assert!(store.load().await.is_err());
        assert_eq!(store.all_settings(), SettingsDocument::default());
        assert!(store.error().is_some());
    }

    #[tokio::test]
    async fn test_reset_recovers_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        std::fs::write(&path, "{\"compassOffset\": ").unwrap();

        let store = SettingsStore::new(JsonFileBackend::new(&path));
        assert!(store.load().await.is_err());
        assert!(store.set_compass_offset(5.0).await.is_err());

        store.reset().await.unwrap();

        let doc = store.load().await.unwrap();
        assert_eq!(doc, SettingsDocument::default());
        assert!(store.error().is_none());

        store.set_compass_offset(5.0).await.unwrap();
        let reopened = SettingsStore::new(JsonFileBackend::new(&path));
        assert_eq!(reopened.load().await.unwrap().compass_offset, 5.0);
    }
}
