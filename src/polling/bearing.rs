//! # Bearing Store
//!
//! Polls the DF sweep endpoint with staleness dedup on the device's
//! timestamp token.

use async_trait::async_trait;
use std::sync::Arc;

use super::store::{PollingStore, Source};
use crate::client::{BearingReading, TelemetryClient};
use crate::error::Result;

/// [`Source`] reading the DF sweep through a [`TelemetryClient`]
pub struct BearingSource<C: ?Sized> {
    client: Arc<C>,
}

impl<C: TelemetryClient + ?Sized + 'static> BearingSource<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: TelemetryClient + ?Sized + 'static> Source for BearingSource<C> {
    type Value = BearingReading;

    async fn fetch(&self) -> Result<BearingReading> {
        self.client.read_df().await
    }
}

/// Polling store for bearing/polar sweeps
pub type BearingStore<C> = PollingStore<BearingSource<C>>;

fn bearing_token(reading: &BearingReading) -> &str {
    &reading.timestamp
}

/// Build a bearing store with staleness dedup
pub fn bearing_store<C: TelemetryClient + ?Sized + 'static>(client: Arc<C>) -> BearingStore<C> {
    PollingStore::deduplicated("DF", BearingSource::new(client), bearing_token)
}


#[cfg(test)]
mod tests {
    use super::mocks::ScriptedClient;
    use super::*;
    use crate::client::df_parser::{sample_payload, DF_MIN_FIELDS};
    use crate::polling::store::{CycleOutcome, Status, NO_NEW_DATA};

    #[tokio::test]
    async fn test_fresh_reading_heading() {
        let client = Arc::new(ScriptedClient::with_df(vec![Ok(sample_payload(
            "T1",
            90.0,
            DF_MIN_FIELDS,
        ))]));
        let store = bearing_store(client);

        assert_eq!(store.refresh().await, CycleOutcome::Fresh);

        let reading = store.state().snapshot.unwrap().value;
        assert_eq!(reading.timestamp, "T1");
        assert_eq!(reading.heading_degrees, 270.0);
    }

    #[tokio::test]
    async fn test_same_token_is_no_new_data() {
        let payload = sample_payload("T1", 90.0, DF_MIN_FIELDS);
        let client = Arc::new(ScriptedClient::with_df(vec![Ok(payload.clone()), Ok(payload)]));
        let store = bearing_store(client);

        store.refresh().await;
        assert_eq!(store.refresh().await, CycleOutcome::NoNewData);

        let state = store.state();
        assert!(state.snapshot.is_none());
        assert_eq!(state.last_error.as_deref(), Some(NO_NEW_DATA));
        assert_eq!(store.last_token().as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_short_payload_fails_and_keeps_token() {
        let client = Arc::new(ScriptedClient::with_df(vec![
            Ok(sample_payload("T1", 90.0, DF_MIN_FIELDS)),
            Ok(sample_payload("T2", 90.0, 300)),
        ]));
        let store = bearing_store(client);

        store.refresh().await;
        let outcome = store.refresh().await;
        assert!(matches!(outcome, CycleOutcome::Failed(ref msg) if msg.contains("incomplete")));

        let state = store.state();
        assert_eq!(state.status, Status::Errored);
        assert!(state.snapshot.is_none());
        assert_eq!(store.last_token().as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_transport_error_then_same_token() {
        let payload = sample_payload("T7", 0.0, DF_MIN_FIELDS);
        let client = Arc::new(ScriptedClient::with_df(vec![
            Ok(payload.clone()),
            Err("connection refused".to_string()),
            Ok(payload),
        ]));
        let store = bearing_store(client);

        store.refresh().await;
        assert_eq!(
            store.refresh().await,
            CycleOutcome::Failed("connection refused".to_string())
        );
        assert_eq!(store.refresh().await, CycleOutcome::NoNewData);
    }
}
