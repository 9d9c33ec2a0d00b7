//! Host-facing entry point of the scope tree.
//!
//! [`RumMonitor`] stamps host calls with the current time and queues them to a
//! single task owning the [`ApplicationScope`], so the tree is never mutated
//! concurrently. Each command is applied on tokio's blocking pool, since
//! writing finished records may block on storage. Host calls never block: when
//! the queue is full the command is dropped and a warning is logged.

use crate::command::{RumCommand, ViewIdentity};
use crate::config::{Config, SessionConfig};
use crate::context::{Clock, IdGenerator, RumContext, SystemClock, UuidGenerator};
use crate::crash::{CrashReportSender, CrashReportingPlugin};
use crate::event::{ActionType, ErrorSource, EventWriter, ResourceKind};
use crate::scope::{ApplicationScope, ScopeDependencies};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

enum Message {
    Command(RumCommand),
    Flush(oneshot::Sender<()>),
}

/// Records view, action, resource and error activity of the host application.
pub struct RumMonitor {
    messages: mpsc::Sender<Message>,
    context: watch::Receiver<RumContext>,
    clock: Arc<dyn Clock>,
    task: JoinHandle<()>,
}

impl RumMonitor {
    /// Returns a builder writing records into `writer`.
    pub fn builder(writer: Arc<dyn EventWriter>) -> RumMonitorBuilder {
        RumMonitorBuilder::new(writer)
    }

    /// Notifies that a view became visible.
    pub fn start_view(&self, identity: ViewIdentity, uri: impl Into<String>) {
        self.process(RumCommand::StartView {
            time: self.clock.now(),
            identity,
            uri: uri.into(),
        });
    }

    /// Notifies that a view is no longer visible.
    pub fn stop_view(&self, identity: ViewIdentity) {
        self.process(RumCommand::StopView {
            time: self.clock.now(),
            identity,
        });
    }

    /// Records an instant user action.
    pub fn add_user_action(&self, action_type: ActionType, name: impl Into<String>) {
        self.process(RumCommand::AddUserAction {
            time: self.clock.now(),
            action_type,
            name: name.into(),
        });
    }

    /// Starts a user action lasting until [`RumMonitor::stop_user_action`].
    pub fn start_user_action(&self, action_type: ActionType, name: impl Into<String>) {
        self.process(RumCommand::StartUserAction {
            time: self.clock.now(),
            action_type,
            name: name.into(),
        });
    }

    /// Stops the user action started with the same type.
    pub fn stop_user_action(&self, action_type: ActionType, name: Option<String>) {
        self.process(RumCommand::StopUserAction {
            time: self.clock.now(),
            action_type,
            name,
        });
    }

    /// Notifies that a resource started loading.
    pub fn start_resource(
        &self,
        resource_key: impl Into<String>,
        url: impl Into<String>,
        method: impl Into<String>,
    ) {
        self.process(RumCommand::StartResource {
            time: self.clock.now(),
            resource_key: resource_key.into(),
            url: url.into(),
            method: method.into(),
        });
    }

    /// Notifies that a resource finished loading.
    pub fn stop_resource(
        &self,
        resource_key: impl Into<String>,
        kind: ResourceKind,
        http_status_code: Option<u16>,
        size: Option<u64>,
    ) {
        self.process(RumCommand::StopResource {
            time: self.clock.now(),
            resource_key: resource_key.into(),
            kind,
            http_status_code,
            size,
        });
    }

    /// Notifies that a resource failed to load.
    pub fn stop_resource_with_error(
        &self,
        resource_key: impl Into<String>,
        message: impl Into<String>,
        http_status_code: Option<u16>,
    ) {
        self.process(RumCommand::StopResourceWithError {
            time: self.clock.now(),
            resource_key: resource_key.into(),
            message: message.into(),
            http_status_code,
        });
    }

    /// Records an error on the current view.
    pub fn add_error(&self, message: impl Into<String>, source: ErrorSource, stack: Option<String>) {
        self.process(RumCommand::AddError {
            time: self.clock.now(),
            message: message.into(),
            source,
            stack,
        });
    }

    /// Queues an already stamped command.
    pub fn process(&self, command: RumCommand) {
        match self.messages.try_send(Message::Command(command)) {
            Ok(()) => {}
            Err(TrySendError::Full(Message::Command(command))) => {
                tracing::warn!(command = command.name(), "RUM command queue full, dropping command");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("RUM monitor stopped, dropping command");
            }
            Err(TrySendError::Full(Message::Flush(_))) => {}
        }
    }

    /// Returns the context of the deepest active scope, as of the last
    /// processed command.
    pub fn context(&self) -> RumContext {
        self.context.borrow().clone()
    }

    /// Waits until every command queued before this call has been processed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.messages.send(Message::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Processes the queued commands and stops the scope task.
    pub async fn shutdown(self) {
        let Self { messages, task, .. } = self;
        drop(messages);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "RUM monitor task failed");
        }
    }
}

/// Builder for [`RumMonitor`].
#[must_use = "builders do nothing unless .build() is called"]
pub struct RumMonitorBuilder {
    application_id: String,
    session: SessionConfig,
    command_buffer_size: usize,
    writer: Arc<dyn EventWriter>,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
    crash_reporting: Option<Arc<dyn CrashReportingPlugin>>,
}

impl RumMonitorBuilder {
    /// Creates a builder with default settings.
    pub fn new(writer: Arc<dyn EventWriter>) -> Self {
        let config = Config::default();
        Self {
            application_id: config.rum.application_id,
            session: config.session,
            command_buffer_size: config.rum.command_buffer_size,
            writer,
            clock: Arc::new(SystemClock),
            id_generator: Arc::new(UuidGenerator),
            crash_reporting: None,
        }
    }

    /// Applies the `rum` and `session` sections of `config`.
    pub fn config(mut self, config: &Config) -> Self {
        self.application_id = config.rum.application_id.clone();
        self.command_buffer_size = config.rum.command_buffer_size;
        self.session = config.session.clone();
        self
    }

    /// Sets the RUM application identifier.
    pub fn application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = application_id.into();
        self
    }

    /// Sets session and action timing.
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Sets the command queue capacity.
    pub fn command_buffer_size(mut self, size: usize) -> Self {
        self.command_buffer_size = size;
        self
    }

    /// Sets the clock stamping host calls.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the identifier source.
    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// Enables crash reporting through `plugin`.
    pub fn crash_reporting(mut self, plugin: Arc<dyn CrashReportingPlugin>) -> Self {
        self.crash_reporting = Some(plugin);
        self
    }

    /// Spawns the scope task and returns the monitor.
    ///
    /// Must be called within a tokio runtime. A pending crash report is read
    /// from the plugin, if any, before the first command is processed.
    pub fn build(self) -> RumMonitor {
        if let Some(plugin) = &self.crash_reporting {
            CrashReportSender::new(
                Arc::clone(&self.writer),
                Arc::clone(&self.id_generator),
                Arc::clone(&self.clock),
            )
            .read_and_send(plugin.as_ref());
        }

        let dependencies = ScopeDependencies::new(self.writer, self.session)
            .with_id_generator(self.id_generator);
        let scope = ApplicationScope::new(self.application_id, Arc::new(dependencies));
        let (context_tx, context_rx) = watch::channel(scope.context());
        let (tx, rx) = mpsc::channel(self.command_buffer_size.max(1));

        let task = tokio::spawn(run_scope(scope, rx, context_tx, self.crash_reporting));

        RumMonitor {
            messages: tx,
            context: context_rx,
            clock: self.clock,
            task,
        }
    }
}

async fn run_scope(
    mut scope: ApplicationScope,
    mut messages: mpsc::Receiver<Message>,
    context: watch::Sender<RumContext>,
    crash_reporting: Option<Arc<dyn CrashReportingPlugin>>,
) {
    if let Some(plugin) = &crash_reporting {
        inject_context(plugin.as_ref(), &scope.context());
    }

    while let Some(message) = messages.recv().await {
        let command = match message {
            Message::Command(command) => command,
            Message::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        tracing::trace!(command = command.name(), "Processing RUM command");
        // Finished records are persisted with blocking file I/O.
        let processed = tokio::task::spawn_blocking(move || {
            scope.process(&command);
            scope
        })
        .await;
        scope = match processed {
            Ok(scope) => scope,
            Err(e) => {
                tracing::error!(error = %e, "RUM scope processing panicked, stopping monitor");
                return;
            }
        };

        let current = scope.context();
        let changed = context.send_if_modified(|published| {
            if *published == current {
                return false;
            }
            *published = current.clone();
            true
        });

        if changed && let Some(plugin) = &crash_reporting {
            inject_context(plugin.as_ref(), &current);
        }
    }

    tracing::debug!("RUM monitor stopped");
}

fn inject_context(plugin: &dyn CrashReportingPlugin, context: &RumContext) {
    match serde_json::to_vec(context) {
        Ok(bytes) => plugin.inject_context(bytes),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize RUM context"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use crate::crash::{CrashReport, CrashReportCompletion};
    use crate::event::{MemoryEventWriter, RumEvent};
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        ))
    }

    #[derive(Default)]
    struct RecordingPlugin {
        injected: Mutex<Vec<Vec<u8>>>,
        pending: Mutex<Option<CrashReport>>,
    }

    impl CrashReportingPlugin for RecordingPlugin {
        fn read_pending_crash_report(&self, completion: CrashReportCompletion) {
            completion(self.pending.lock().take());
        }

        fn inject_context(&self, context: Vec<u8>) {
            self.injected.lock().push(context);
        }
    }

    #[tokio::test]
    async fn test_view_lifecycle_produces_view_record() {
        let writer = MemoryEventWriter::new();
        let clock = clock();
        let monitor = RumMonitor::builder(Arc::new(writer.clone()))
            .application_id("app")
            .clock(clock.clone())
            .build();

        monitor.start_view(ViewIdentity::new("Home"), "HomeScreen");
        clock.advance(Duration::from_secs(3));
        monitor.stop_view(ViewIdentity::new("Home"));
        monitor.shutdown().await;

        let events = writer.events();
        let [RumEvent::View(view)] = events.as_slice() else {
            panic!("expected one view record, got {events:?}");
        };
        assert_eq!(view.context.application_id, "app");
        assert_eq!(view.context.view_url, "HomeScreen");
        assert_eq!(view.time_spent_ns, 3_000_000_000);
    }

    #[tokio::test]
    async fn test_context_follows_active_view() {
        let writer = MemoryEventWriter::new();
        let monitor = RumMonitor::builder(Arc::new(writer))
            .application_id("app")
            .clock(clock())
            .build();

        assert!(!monitor.context().has_session());

        monitor.start_view(ViewIdentity::new("Home"), "HomeScreen");
        monitor.flush().await;

        let context = monitor.context();
        assert!(context.has_session());
        assert_eq!(context.active_view_uri.as_deref(), Some("HomeScreen"));
        monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops_commands() {
        let writer = MemoryEventWriter::new();
        let monitor = RumMonitor::builder(Arc::new(writer.clone()))
            .clock(clock())
            .command_buffer_size(1)
            .build();

        // The scope task cannot run before this test yields.
        monitor.start_view(ViewIdentity::new("A"), "A");
        monitor.stop_view(ViewIdentity::new("A"));
        monitor.shutdown().await;

        assert!(writer.events().is_empty());
    }

    #[tokio::test]
    async fn test_context_is_injected_into_crash_plugin() {
        let plugin = Arc::new(RecordingPlugin::default());
        let monitor = RumMonitor::builder(Arc::new(MemoryEventWriter::new()))
            .application_id("app")
            .clock(clock())
            .crash_reporting(plugin.clone())
            .build();

        monitor.start_view(ViewIdentity::new("Home"), "HomeScreen");
        monitor.add_error("ignored for context", ErrorSource::Source, None);
        monitor.shutdown().await;

        let injected = plugin.injected.lock();
        assert_eq!(injected.len(), 2);
        let last: RumContext = serde_json::from_slice(&injected[1]).unwrap();
        assert_eq!(last.active_view_uri.as_deref(), Some("HomeScreen"));
    }

    #[tokio::test]
    async fn test_pending_crash_is_sent_at_start() {
        let writer = MemoryEventWriter::new();
        let plugin = Arc::new(RecordingPlugin::default());
        let mut context = RumContext::new("app");
        context.session_id = uuid::Uuid::from_u128(1);
        *plugin.pending.lock() = Some(CrashReport {
            date: None,
            type_tag: "SIGABRT".to_string(),
            message: "abort".to_string(),
            stack_trace: String::new(),
            context: Some(serde_json::to_vec(&context).unwrap()),
        });

        let monitor = RumMonitor::builder(Arc::new(writer.clone()))
            .clock(clock())
            .crash_reporting(plugin)
            .build();
        monitor.shutdown().await;

        let events = writer.events();
        assert!(matches!(
            events.as_slice(),
            [RumEvent::Error(error)] if error.crash_type.as_deref() == Some("SIGABRT")
        ));
    }
}
