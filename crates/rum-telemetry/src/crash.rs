//! Bridge between a crash-reporting plugin and the record store.
//!
//! The monitor keeps the plugin supplied with the serialized [`RumContext`]
//! so a crash report carries the session and view it happened in. On the next
//! start the pending report is read back and written as a crash error record
//! attributed to that context.

use crate::context::{Clock, IdGenerator, RumContext};
use crate::event::{ErrorEvent, ErrorSource, EventWriter, RumEvent};
use crate::scope::event_context;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A crash captured by the plugin during a previous run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    /// When the crash happened, if known.
    pub date: Option<DateTime<Utc>>,
    /// Crash kind, such as a signal or exception name.
    pub type_tag: String,
    /// Human-readable reason.
    pub message: String,
    /// Unsymbolicated stack trace.
    pub stack_trace: String,
    /// Last context injected before the crash.
    pub context: Option<Vec<u8>>,
}

/// Callback receiving the pending report; returns whether it was consumed.
pub type CrashReportCompletion = Box<dyn FnOnce(Option<CrashReport>) -> bool + Send>;

/// Capabilities of a crash-reporting plugin.
///
/// Calls are serialized by the caller. `read_pending_crash_report` may invoke
/// the completion on any thread.
pub trait CrashReportingPlugin: Send + Sync {
    /// Reads the report left by a previous run, if any.
    fn read_pending_crash_report(&self, completion: CrashReportCompletion);

    /// Stores the latest context to attach to a future crash report.
    fn inject_context(&self, context: Vec<u8>);
}

/// Writes crash reports as error records.
pub struct CrashReportSender {
    writer: Arc<dyn EventWriter>,
    id_generator: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl CrashReportSender {
    /// Creates a sender writing into `writer`.
    pub fn new(
        writer: Arc<dyn EventWriter>,
        id_generator: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            writer,
            id_generator,
            clock,
        }
    }

    /// Asks `plugin` for its pending report and writes it.
    pub fn read_and_send(self, plugin: &dyn CrashReportingPlugin) {
        plugin.read_pending_crash_report(Box::new(move |report| match report {
            Some(report) => self.send(&report),
            None => {
                tracing::trace!("No pending crash report");
                false
            }
        }));
    }

    /// Writes `report` as a crash error record.
    ///
    /// Returns `false`, leaving the report with the plugin, when it carries no
    /// readable context or the record could not be stored.
    pub fn send(&self, report: &CrashReport) -> bool {
        let Some(bytes) = report.context.as_deref() else {
            tracing::debug!(type_tag = %report.type_tag, "Crash report has no RUM context, skipping");
            return false;
        };

        let context: RumContext = match serde_json::from_slice(bytes) {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode RUM context of crash report");
                return false;
            }
        };

        let date = report.date.unwrap_or_else(|| self.clock.now());
        let event = RumEvent::Error(ErrorEvent {
            context: event_context(&context, date),
            error_id: self.id_generator.generate(),
            action_id: context.active_user_action_id,
            message: report.message.clone(),
            source: ErrorSource::Crash,
            stack: Some(report.stack_trace.clone()),
            resource: None,
            crash_type: Some(report.type_tag.clone()),
        });
        match self.writer.try_write(&event) {
            Ok(()) => {
                tracing::debug!(session_id = %context.session_id, "Crash report sent");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to store crash report, keeping it pending");
                false
            }
        }
    }
}
