//! Client-side RUM telemetry engine.
//!
//! Two actors cooperate through a batch directory on disk:
//!
//! - the scope tree ([`RumMonitor`] and the [`scope`] module) turns view,
//!   user action, resource and error notifications into finished records and
//!   appends them to batch files;
//! - the [`UploadWorker`] periodically picks the oldest readable batch, checks
//!   whether battery and network conditions allow sending it, uploads it and
//!   adapts its polling interval to the outcome.
//!
//! # Example
//!
//! ```no_run
//! use rum_telemetry::{
//!     Config, Delay, FileStorage, HttpUploader, RumMonitor, StaticSignalProvider,
//!     StoredEventWriter, UploadConditions, UploadCycle, UploadWorker, ViewIdentity,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> rum_telemetry::Result<()> {
//! let config = Config::builder()
//!     .application_id("my-app")
//!     .endpoint("https://intake.example.com/api/v2/rum")
//!     .build();
//!
//! let storage = FileStorage::open(config.storage.clone())?;
//! let monitor = RumMonitor::builder(Arc::new(StoredEventWriter::new(storage.writer())))
//!     .config(&config)
//!     .build();
//!
//! let cycle = UploadCycle::new(
//!     Box::new(storage.reader()),
//!     Box::new(HttpUploader::new(config.uploader.clone())?),
//!     UploadConditions::new(Arc::new(StaticSignalProvider::always_ready()), &config.conditions),
//!     Delay::new(&config.delay),
//!     &config.uploader.feature_name,
//! );
//! let mut worker = UploadWorker::spawn(cycle);
//!
//! monitor.start_view(ViewIdentity::new("home"), "HomeScreen");
//! monitor.shutdown().await;
//! worker.cancel_synchronously().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod command;
pub mod conditions;
pub mod config;
pub mod context;
pub mod crash;
pub mod delay;
pub mod error;
pub mod event;
pub mod monitor;
pub mod scope;
pub mod storage;
pub mod uploader;
pub mod worker;

pub use batch::{Batch, BatchId, UploadStatus};
pub use command::{RumCommand, ViewIdentity};
pub use conditions::{
    BatteryState, BatteryStatus, Blocker, BlockerList, Reachability, StaticSignalProvider,
    SystemSignalProvider, UploadConditions,
};
pub use config::{
    Compression, ConditionsConfig, Config, ConfigBuilder, DelayConfig, RumConfig, SessionConfig,
    StorageConfig, UploaderConfig,
};
pub use context::{Clock, IdGenerator, ManualClock, RumContext, SystemClock, UuidGenerator};
pub use crash::{CrashReport, CrashReportCompletion, CrashReportSender, CrashReportingPlugin};
pub use delay::Delay;
pub use error::{Result, TelemetryError};
pub use event::{
    ActionEvent, ActionType, ErrorEvent, ErrorResource, ErrorSource, EventContext, EventWriter,
    MemoryEventWriter, ResourceEvent, ResourceKind, RumEvent, StoredEventWriter, ViewEvent,
};
pub use monitor::{RumMonitor, RumMonitorBuilder};
pub use scope::{ApplicationScope, Scope, ScopeDependencies};
pub use storage::{BatchReader, FileReader, FileStorage, FileWriter, RecordWriter, StorageError};
pub use uploader::{DataUploader, HttpUploader, UploadError};
pub use worker::{CycleOutcome, UploadCycle, UploadWorker};
