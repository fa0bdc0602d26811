//! Telemetry source backed by a remote specdash (or compatible) HTTP endpoint.

use crate::error::{Result, SyncError};
use crate::metrics::{
    data::{Snapshot, VolatileSnapshot},
    traits::TelemetrySource,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Path of the full inventory endpoint.
pub const FULL_SNAPSHOT_PATH: &str = "/api/specs";

/// Path of the volatile subset endpoint.
pub const VOLATILE_SNAPSHOT_PATH: &str = "/api/specs/dynamic";

/// Reads telemetry over HTTP from `GET /api/specs` and `GET /api/specs/dynamic`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    /// Create a source for `base_url` (e.g. `http://localhost:5000`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SyncError::config_error(format!(
                "Source URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("specdash/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::config_error(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// The base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Fetching telemetry");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(map_request_error)?;

        let body = response.text().await.map_err(map_request_error)?;

        serde_json::from_str(&body)
            .map_err(|e| SyncError::schema_mismatch(format!("{}: {}", path, e)))
    }
}

fn map_request_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::timeout(err.to_string())
    } else {
        SyncError::source_unavailable(err.to_string())
    }
}

#[async_trait]
impl TelemetrySource for HttpSource {
    async fn full_snapshot(&self) -> Result<Snapshot> {
        self.get_json(FULL_SNAPSHOT_PATH).await
    }

    async fn volatile_snapshot(&self) -> Result<VolatileSnapshot> {
        self.get_json(VOLATILE_SNAPSHOT_PATH).await
    }
}
