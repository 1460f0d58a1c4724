//! Telemetry fetching
//!
//! Both endpoints are requested concurrently and awaited jointly. Any failure
//! fails the whole fetch: callers keep their previous data rather than render
//! half a fleet. Retries are the poller's business.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::{Endpoint, FetchError};
use crate::models::{InventorySet, UsageSet};

/// Anything able to produce one inventory set and one usage set
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch_all(&self) -> Result<(InventorySet, UsageSet), FetchError>;
}

/// HTTP implementation over a pooled `reqwest` client
pub struct HttpFetcher {
    client: reqwest::Client,
    devices_url: String,
    usage_url: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(backend: &BackendConfig) -> reqwest::Result<Self> {
        let timeout = backend.request_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("remotewatch-viewer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            devices_url: backend.devices_url(),
            usage_url: backend.usage_url(),
            timeout,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: Endpoint, url: &str) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { endpoint, status: status.as_u16() });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        debug!("GET {} -> {} bytes", url, body.len());
        serde_json::from_slice(&body).map_err(|source| FetchError::Malformed { endpoint, source })
    }

    fn transport_error(&self, endpoint: Endpoint, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout { endpoint, deadline: self.timeout }
        } else {
            FetchError::Transport { endpoint, source: error }
        }
    }
}

#[async_trait]
impl TelemetrySource for HttpFetcher {
    async fn fetch_all(&self) -> Result<(InventorySet, UsageSet), FetchError> {
        tokio::try_join!(
            self.get_json::<InventorySet>(Endpoint::Inventory, &self.devices_url),
            self.get_json::<UsageSet>(Endpoint::Usage, &self.usage_url),
        )
    }
}
