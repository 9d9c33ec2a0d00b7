//! Persisted batches and the classification of their upload attempts.

use std::fmt;

/// Identifier of a persisted batch.
///
/// For file-backed storage this is the batch file name, which encodes the
/// creation time in milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(String);

impl BatchId {
    /// Creates a batch identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One or more serialized records read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    id: BatchId,
    data: Vec<u8>,
}

impl Batch {
    /// Creates a batch from its identifier and payload.
    pub fn new(id: BatchId, data: Vec<u8>) -> Self {
        Self { id, data }
    }

    /// Returns the batch identifier.
    pub fn id(&self) -> &BatchId {
        &self.id
    }

    /// Returns the batch payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the payload size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStatus {
    /// The collector accepted the batch (2xx).
    Success,
    /// The collector redirected the request (3xx).
    Redirection,
    /// The collector rejected the payload (4xx).
    ClientError,
    /// The collector failed to process the request (5xx).
    ServerError,
    /// The request never reached the collector.
    NetworkError,
    /// The response could not be classified.
    Unknown,
}

impl UploadStatus {
    /// Classifies an HTTP response status code.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            300..=399 => Self::Redirection,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Returns whether the batch is considered handled after this outcome.
    ///
    /// Handled batches are removed from the store even when they were not
    /// delivered: a client error means the payload will never be accepted.
    pub fn is_acceptable(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Redirection | Self::ClientError | Self::Unknown
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Redirection => "redirection",
            Self::ClientError => "clientError",
            Self::ServerError => "serverError",
            Self::NetworkError => "networkError",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}
