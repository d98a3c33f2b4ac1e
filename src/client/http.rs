//! # HTTP Telemetry Client
//!
//! [`TelemetryClient`] implementation over `reqwest`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::df_parser::parse_df_payload;
use super::{AntennaBand, BearingReading, DfSettings, FreqGainSettings, TelemetryClient};
use crate::error::{DfCompanionError, Result};

/// Reply of `GET /api/compass`
#[derive(Debug, Deserialize)]
struct CompassReply {
    heading: serde_json::Value,
}

/// Body of `POST /api/settings/station_id`
#[derive(Debug, serde::Serialize)]
struct StationId<'a> {
    id: &'a str,
}

/// HTTP client for the DF instrument
///
/// Holds one pooled `reqwest::Client`; cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct HttpTelemetryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTelemetryClient {
    /// Create a client for the instrument at `base_url`
    ///
    /// # Arguments
    ///
    /// * `base_url` - Instrument root, e.g. `http://192.168.17.17:8087`
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `Http` if the TLS backend cannot be initialized
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { http, base_url })
    }

    /// Instrument root URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_command(&self, path: &str) -> Result<()> {
        let response = self.http.post(self.url(path)).json(&serde_json::json!({})).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into `Status` carrying the body text
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DfCompanionError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl TelemetryClient for HttpTelemetryClient {
    async fn read_df(&self) -> Result<BearingReading> {
        let response = self.http.get(self.url("/df")).send().await?;
        let text = check_status(response).await?.text().await?;
        let reading = parse_df_payload(&text)?;

        debug!(
            token = %reading.timestamp,
            heading = reading.heading_degrees,
            "DF sweep received"
        );
        Ok(reading)
    }

    async fn read_compass(&self) -> Result<f64> {
        let response = self.http.get(self.url("/api/compass")).send().await?;
        let reply: CompassReply = check_status(response).await?.json().await?;

        let heading = match &reply.heading {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };

        heading.ok_or_else(|| {
            DfCompanionError::Parse(format!("Compass heading is not a number: {}", reply.heading))
        })
    }

    async fn set_freq_gain(&self, settings: &FreqGainSettings) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(self.url("/api/settings/freq"))
            .json(settings)
            .send()
            .await?;
        let reply = check_status(response).await?.json().await?;

        info!(
            center_freq = settings.center_freq,
            uniform_gain = settings.uniform_gain,
            "Frequency and gain applied"
        );
        Ok(reply)
    }

    async fn set_antenna(&self, spacing_meters: f64) -> Result<serde_json::Value> {
        let band = AntennaBand::for_spacing(spacing_meters);
        let response = self
            .http
            .get(self.url(&format!("/api/ant/{}", band.as_path())))
            .send()
            .await?;
        let reply = check_status(response).await?.json().await?;

        info!("Antenna switched to {}", band.as_path());
        Ok(reply)
    }

    async fn df_settings(&self) -> Result<DfSettings> {
        let response = self.http.get(self.url("/api/settings")).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn set_station_id(&self, id: &str) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(self.url("/api/settings/station_id"))
            .json(&StationId { id })
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn shutdown(&self) {
        match self.post_command("/api/shutdown").await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!("Shutdown request failed: {}", e),
        }
    }

    async fn restart(&self) {
        match self.post_command("/api/restart").await {
            Ok(()) => info!("Restart requested"),
            Err(e) => warn!("Restart request failed: {}", e),
        }
    }
}
