//! Error types for the RUM telemetry pipeline.

use crate::storage::StorageError;
use crate::uploader::UploadError;
use thiserror::Error;

/// A specialised Result type for pipeline setup.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors that can occur while setting up the pipeline.
///
/// Nothing inside a running upload cycle or scope tree is surfaced here.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration error.
    #[error("configuration error")]
    Config(#[source] Box<figment::Error>),

    /// Batch storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Uploader construction error.
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl From<figment::Error> for TelemetryError {
    fn from(err: figment::Error) -> Self {
        TelemetryError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_storage_error_is_transparent() {
        let err: TelemetryError = StorageError::RecordTooLarge { size: 10, limit: 5 }.into();
        assert!(matches!(err, TelemetryError::Storage(_)));
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn test_config_error_keeps_source() {
        let err: TelemetryError = figment::Error::from("bad value".to_string()).into();
        assert_eq!(err.to_string(), "configuration error");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_inverted_file_ages_surface_as_storage_error() {
        let err: TelemetryError = StorageError::InvalidFileAges {
            max_for_write: std::time::Duration::from_secs(5),
            min_for_read: std::time::Duration::from_secs(1),
        }
        .into();
        assert!(err.to_string().contains("min_file_age_for_read"));
    }
}
