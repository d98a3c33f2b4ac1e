//! # Compass Store
//!
//! Polls the instrument's compass heading.

use async_trait::async_trait;
use std::sync::Arc;

use super::store::{PollingStore, Source};
use crate::client::TelemetryClient;
use crate::error::Result;

/// [`Source`] reading the compass heading in degrees
pub struct CompassSource<C: ?Sized> {
    client: Arc<C>,
}

impl<C: TelemetryClient + ?Sized + 'static> CompassSource<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: TelemetryClient + ?Sized + 'static> Source for CompassSource<C> {
    type Value = f64;

    async fn fetch(&self) -> Result<f64> {
        self.client.read_compass().await
    }
}

/// Polling store for the compass heading
pub type CompassStore<C> = PollingStore<CompassSource<C>>;

/// Build a compass store
pub fn compass_store<C: TelemetryClient + ?Sized + 'static>(client: Arc<C>) -> CompassStore<C> {
    PollingStore::new("Compass", CompassSource::new(client))
}
