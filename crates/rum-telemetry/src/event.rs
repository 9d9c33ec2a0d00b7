//! Records emitted by the scope tree and the writers persisting them.

use crate::storage::{RecordWriter, StorageError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Kind of user action.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Tap or click.
    Tap,
    /// Scroll.
    Scroll,
    /// Swipe.
    Swipe,
    /// Anything else.
    Custom,
}

/// Kind of network resource.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// API call returning data.
    Xhr,
    /// Image.
    Image,
    /// Script.
    Js,
    /// Font.
    Font,
    /// Media.
    Media,
    /// Anything else.
    #[default]
    Other,
}

/// Origin of an error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    /// Raised by application code.
    Source,
    /// Network failure.
    Network,
    /// Reported by the host's logger.
    Logger,
    /// Process crash.
    Crash,
    /// Anything else.
    Custom,
}

/// Fields shared by every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    /// Event time in milliseconds since the Unix epoch.
    pub date: i64,
    /// RUM application identifier.
    pub application_id: String,
    /// Session identifier.
    pub session_id: Uuid,
    /// Identifier of the view the event belongs to.
    pub view_id: Uuid,
    /// URI of the view the event belongs to.
    pub view_url: String,
}

/// Finished view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewEvent {
    /// Shared fields.
    #[serde(flatten)]
    pub context: EventContext,
    /// Time the view was visible, in nanoseconds.
    pub time_spent_ns: i64,
    /// Number of user actions completed on the view.
    pub action_count: u64,
    /// Number of resources completed on the view.
    pub resource_count: u64,
    /// Number of errors raised on the view.
    pub error_count: u64,
}

/// Finished user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Shared fields.
    #[serde(flatten)]
    pub context: EventContext,
    /// Action identifier.
    pub action_id: Uuid,
    /// Kind of action.
    pub action_type: ActionType,
    /// Action name.
    pub name: String,
    /// Time from start to end of the action, in nanoseconds.
    pub loading_time_ns: i64,
    /// Number of resources attributed to the action.
    pub resource_count: u64,
    /// Number of errors attributed to the action.
    pub error_count: u64,
}

/// Finished resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    /// Shared fields.
    #[serde(flatten)]
    pub context: EventContext,
    /// Resource identifier.
    pub resource_id: Uuid,
    /// User action active when the resource started.
    pub action_id: Option<Uuid>,
    /// Resource URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Kind of resource.
    pub kind: ResourceKind,
    /// HTTP status code.
    pub status_code: Option<u16>,
    /// Response size in bytes.
    pub size: Option<u64>,
    /// Load duration in nanoseconds.
    pub duration_ns: i64,
}

/// Resource details attached to a network error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResource {
    /// Resource URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// HTTP status code.
    pub status_code: Option<u16>,
}

/// Error raised on a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Shared fields.
    #[serde(flatten)]
    pub context: EventContext,
    /// Error identifier.
    pub error_id: Uuid,
    /// User action active when the error happened.
    pub action_id: Option<Uuid>,
    /// Error message.
    pub message: String,
    /// Error origin.
    pub source: ErrorSource,
    /// Stack trace.
    pub stack: Option<String>,
    /// Failed resource, for network errors.
    pub resource: Option<ErrorResource>,
    /// Crash type tag, for crash reports.
    pub crash_type: Option<String>,
}

/// A record produced by the scope tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RumEvent {
    /// Finished view.
    View(ViewEvent),
    /// Finished user action.
    Action(ActionEvent),
    /// Finished resource.
    Resource(ResourceEvent),
    /// Error.
    Error(ErrorEvent),
}

impl RumEvent {
    /// Returns the shared fields of the record.
    pub fn context(&self) -> &EventContext {
        match self {
            Self::View(e) => &e.context,
            Self::Action(e) => &e.context,
            Self::Resource(e) => &e.context,
            Self::Error(e) => &e.context,
        }
    }
}

/// Sink for finished records.
pub trait EventWriter: Send + Sync {
    /// Persists a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record was not stored.
    fn try_write(&self, event: &RumEvent) -> Result<(), StorageError>;

    /// Persists a record, logging and dropping it on failure.
    fn write(&self, event: &RumEvent) {
        if let Err(e) = self.try_write(event) {
            tracing::warn!(error = %e, "Failed to persist RUM event, dropping it");
        }
    }
}

/// Serializes records as JSON lines into a [`RecordWriter`].
pub struct StoredEventWriter<W> {
    inner: W,
}

impl<W: RecordWriter> StoredEventWriter<W> {
    /// Wraps a record writer.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: RecordWriter> EventWriter for StoredEventWriter<W> {
    fn try_write(&self, event: &RumEvent) -> Result<(), StorageError> {
        let record = serde_json::to_vec(event).map_err(StorageError::Encode)?;
        self.inner.write(&record)
    }
}

/// Keeps records in memory, for tests and inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventWriter {
    events: Arc<Mutex<Vec<RumEvent>>>,
}

impl MemoryEventWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record written so far.
    pub fn events(&self) -> Vec<RumEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns every record written so far.
    pub fn take(&self) -> Vec<RumEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventWriter for MemoryEventWriter {
    fn try_write(&self, event: &RumEvent) -> Result<(), StorageError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> EventContext {
        EventContext {
            date: 1_700_000_000_000,
            application_id: "app".to_string(),
            session_id: Uuid::nil(),
            view_id: Uuid::nil(),
            view_url: "Home".to_string(),
        }
    }

    #[derive(Default)]
    struct CapturingWriter(Mutex<Vec<Vec<u8>>>);

    impl RecordWriter for &CapturingWriter {
        fn write(&self, record: &[u8]) -> Result<(), StorageError> {
            self.0.lock().push(record.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_event_is_tagged_and_flattened() {
        let event = RumEvent::View(ViewEvent {
            context: context(),
            time_spent_ns: 5,
            action_count: 1,
            resource_count: 2,
            error_count: 0,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "view");
        assert_eq!(json["view_url"], "Home");
        assert_eq!(json["resource_count"], 2);
    }

    #[test]
    fn test_stored_writer_emits_one_json_record() {
        let capture = CapturingWriter::default();
        let writer = StoredEventWriter::new(&capture);

        writer.write(&RumEvent::Error(ErrorEvent {
            context: context(),
            error_id: Uuid::nil(),
            action_id: None,
            message: "boom".to_string(),
            source: ErrorSource::Source,
            stack: None,
            resource: None,
            crash_type: None,
        }));

        let records = capture.0.lock();
        assert_eq!(records.len(), 1);
        let decoded: RumEvent = serde_json::from_slice(&records[0]).unwrap();
        assert!(matches!(decoded, RumEvent::Error(ref e) if e.message == "boom"));
    }

    #[test]
    fn test_memory_writer_take_drains() {
        let writer = MemoryEventWriter::new();
        writer.write(&RumEvent::View(ViewEvent {
            context: context(),
            time_spent_ns: 0,
            action_count: 0,
            resource_count: 0,
            error_count: 0,
        }));

        assert_eq!(writer.take().len(), 1);
        assert!(writer.events().is_empty());
    }

    struct FullWriter;

    impl RecordWriter for FullWriter {
        fn write(&self, record: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::RecordTooLarge {
                size: record.len() as u64 + 1,
                limit: 0,
            })
        }
    }

    #[test]
    fn test_stored_writer_reports_storage_failure() {
        let writer = StoredEventWriter::new(FullWriter);
        let event = RumEvent::View(ViewEvent {
            context: context(),
            time_spent_ns: 0,
            action_count: 0,
            resource_count: 0,
            error_count: 0,
        });

        assert!(matches!(
            writer.try_write(&event),
            Err(StorageError::RecordTooLarge { limit: 0, .. })
        ));
        writer.write(&event);
    }
}
