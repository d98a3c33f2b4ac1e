//! IP geolocation over HTTP

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{IpGeolocator, IpLocation};
use crate::client::http::check_status;
use crate::error::Result;

/// Default lookup endpoint
pub const DEFAULT_IP_LOOKUP_URL: &str = "https://ipapi.co/json/";

/// [`IpGeolocator`] backed by an ipapi-compatible JSON endpoint
#[derive(Debug, Clone)]
pub struct IpApiClient {
    http: reqwest::Client,
    url: String,
}

impl IpApiClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IpGeolocator for IpApiClient {
    async fn locate(&self) -> Result<IpLocation> {
        debug!("Fetching IP-based location from {}", self.url);
        let response = self.http.get(&self.url).send().await?;
        let location = check_status(response).await?.json().await?;
        Ok(location)
    }
}
