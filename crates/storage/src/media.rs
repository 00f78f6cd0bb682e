//! Upload client for the public media endpoint that serves chart images.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{info, instrument, warn};

use crate::error::{StoreError, StoreResult};

/// Media endpoint connection settings.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Base URL; objects land at `<base>/<folder>/<file>`
    pub base_url: String,
    /// Value of the `AccessKey` header
    pub access_key: String,
    pub timeout: Duration,
}

/// Authenticated PUT uploads to the media endpoint.
pub struct MediaStorage {
    client: Client,
    config: MediaConfig,
}

impl MediaStorage {
    pub fn new(config: MediaConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Full URL of an object.
    pub fn url_for(&self, folder: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            folder,
            file_name
        )
    }

    /// Upload `data` and report whether the endpoint answered 201 Created.
    ///
    /// Any other status is logged and reported as `false`; transport
    /// failures are errors.
    #[instrument(skip(self, data), fields(folder = %folder, file = %file_name))]
    pub async fn put(&self, folder: &str, file_name: &str, data: Bytes) -> StoreResult<bool> {
        let url = self.url_for(folder, file_name);
        let size = data.len();

        let response = self
            .client
            .put(&url)
            .header("AccessKey", &self.config.access_key)
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| StoreError::Http(format!("PUT {} failed: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::CREATED {
            info!(size = size, "Uploaded media object");
            Ok(true)
        } else {
            warn!(status = %status, "Media upload rejected");
            Ok(false)
        }
    }
}
