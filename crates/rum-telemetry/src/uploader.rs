//! Delivery of batch payloads to the collector.
//!
//! [`HttpUploader`] posts a batch as one request and classifies the response
//! into an [`UploadStatus`]. It never fails: transport errors become
//! [`UploadStatus::NetworkError`]. Retrying is left to the upload worker.

use crate::batch::UploadStatus;
use crate::config::{Compression, UploaderConfig};
use crate::context::{Clock, SystemClock};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::io::Write;
use std::sync::Arc;

const CONTENT_TYPE: &str = "text/plain;charset=UTF-8";
const CLIENT_TOKEN_HEADER: &str = "DD-API-KEY";

/// Sends batch payloads.
#[async_trait]
pub trait DataUploader: Send + Sync {
    /// Sends `data` and classifies the outcome.
    async fn upload(&self, data: &[u8]) -> UploadStatus;
}

/// Error constructing an uploader.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    Client(#[from] reqwest::Error),

    /// No endpoint configured.
    #[error("no endpoint configured")]
    NoEndpoint,

    /// The configured endpoint is not a valid URL.
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
}

/// Uploads batches over HTTP.
pub struct HttpUploader {
    config: UploaderConfig,
    endpoint: Url,
    client: Client,
    clock: Arc<dyn Clock>,
}

impl HttpUploader {
    /// Creates an uploader from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no valid endpoint is configured or the HTTP client
    /// cannot be created.
    pub fn new(config: UploaderConfig) -> Result<Self, UploadError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an uploader stamping `batch_time` from a custom clock.
    ///
    /// # Errors
    ///
    /// Returns an error if no valid endpoint is configured or the HTTP client
    /// cannot be created.
    pub fn with_clock(config: UploaderConfig, clock: Arc<dyn Clock>) -> Result<Self, UploadError> {
        let raw = config.endpoint.as_deref().ok_or(UploadError::NoEndpoint)?;
        let endpoint =
            Url::parse(raw).map_err(|e| UploadError::InvalidEndpoint(format!("{raw}: {e}")))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(UploadError::Client)?;

        Ok(Self {
            config,
            endpoint,
            client,
            clock,
        })
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Builds the request URL for an upload happening now.
    fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("ddsource", &self.config.source)
            .append_pair(
                "batch_time",
                &self.clock.now().timestamp_millis().to_string(),
            );
        url
    }

    fn encode_body(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self.config.compression {
            Compression::Gzip => {
                use flate2::Compression as GzCompression;
                use flate2::write::GzEncoder;

                let mut encoder = GzEncoder::new(Vec::new(), GzCompression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            _ => Ok(data.to_vec()),
        }
    }
}

#[async_trait]
impl DataUploader for HttpUploader {
    async fn upload(&self, data: &[u8]) -> UploadStatus {
        let body = match self.encode_body(data) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode batch body");
                return UploadStatus::Unknown;
            }
        };

        let mut request = self
            .client
            .post(self.request_url())
            .header("Content-Type", CONTENT_TYPE)
            .body(body);

        if let Some(token) = &self.config.client_token {
            request = request.header(CLIENT_TOKEN_HEADER, token);
        }

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        if self.config.compression == Compression::Gzip {
            request = request.header("Content-Encoding", "gzip");
        }

        match request.send().await {
            Ok(response) => {
                let status = UploadStatus::from_http_status(response.status().as_u16());
                tracing::trace!(http_status = response.status().as_u16(), %status, "Upload response");
                status
            }
            Err(e) => {
                tracing::debug!(error = %e, "Upload request failed");
                UploadStatus::NetworkError
            }
        }
    }
}
