//! # Settings Persistence
//!
//! Flat key/value storage behind the settings store.
//!
//! [`JsonFileBackend`] keeps the document as one JSON object in a file. The
//! file is read on first access; every change is written to a sibling
//! temporary file which is then renamed over the target, so a crash leaves
//! either the old or the new document. The in-memory copy is only updated
//! once the rename succeeded.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{DfCompanionError, Result};

/// Default settings file name
pub const DEFAULT_SETTINGS_FILE: &str = "elangdf-config.json";

/// Key/value persistence used by [`SettingsStore`](super::SettingsStore)
#[async_trait]
pub trait SettingsBackend: Send + Sync + 'static {
    /// Value stored under `key`, `None` if absent
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key` and commit
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove every key and commit
    async fn clear(&self) -> Result<()>;
}

/// JSON object file backend
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    cache: Mutex<Option<Map<String, Value>>>,
}

impl JsonFileBackend {
    /// Backend for `path`; nothing is read until first access
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<Map<String, Value>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, starting empty", self.path.display());
                return Ok(Map::new());
            }
            Err(e) => {
                return Err(DfCompanionError::Persistence(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if text.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(DfCompanionError::Persistence(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(DfCompanionError::Persistence(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_file(&self, map: &Map<String, Value>) -> Result<()> {
        let text = serde_json::to_string_pretty(map)?;
        let tmp = self.temp_path();
        let persistence = |e: std::io::Error| {
            DfCompanionError::Persistence(format!("Failed to write {}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(persistence)?;
        }
        tokio::fs::write(&tmp, text).await.map_err(persistence)?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(persistence(e));
        }

        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Run `f` on the loaded map, reading the file on first use
    async fn with_map<T>(&self, f: impl FnOnce(&mut Map<String, Value>) -> T) -> Result<T> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            let map = self.read_file().await?;
            info!("Loaded {} settings from {}", map.len(), self.path.display());
            *cache = Some(map);
        }
        match cache.as_mut() {
            Some(map) => Ok(f(map)),
            None => Err(DfCompanionError::Persistence("settings cache unavailable".to_string())),
        }
    }
}

#[async_trait]
impl SettingsBackend for JsonFileBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.with_map(|map| map.get(key).cloned()).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut next = self.with_map(|map| map.clone()).await?;
        next.insert(key.to_string(), value);
        self.write_file(&next).await?;
        *self.cache.lock().await = Some(next);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        // Overwrites without reading, so a corrupt file can still be reset
        let mut cache = self.cache.lock().await;
        let empty = Map::new();
        self.write_file(&empty).await?;
        *cache = Some(empty);
        Ok(())
    }
}
