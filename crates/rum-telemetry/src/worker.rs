//! Background upload loop.
//!
//! An [`UploadCycle`] performs one evaluate -> read -> upload -> reconcile pass
//! and adjusts its [`Delay`]. [`UploadWorker`] runs cycles on a single tokio
//! task, sleeping [`Delay::current`] between them, until cancelled.
//!
//! Cancellation is checked only at the scheduling boundary: the sleep races the
//! cancellation token, and the token is checked again after every cycle so a
//! cycle that was already running completes but does not reschedule.

use crate::batch::UploadStatus;
use crate::conditions::{Blocker, BlockerList, UploadConditions};
use crate::delay::Delay;
use crate::storage::BatchReader;
use crate::uploader::DataUploader;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Outcome of a single upload cycle.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// System conditions prevented the cycle from reading the store.
    Blocked(Vec<Blocker>),
    /// The store had no eligible batch.
    NoBatch,
    /// A batch was uploaded and removed from the store.
    Accepted(UploadStatus),
    /// A batch was uploaded but kept for a later retry.
    Retained(UploadStatus),
}

impl CycleOutcome {
    /// Returns whether the cycle sped up pacing.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// The collaborators and pacing state of one upload pipeline.
pub struct UploadCycle {
    reader: Box<dyn BatchReader>,
    uploader: Box<dyn DataUploader>,
    conditions: UploadConditions,
    delay: Delay,
    span: tracing::Span,
}

impl UploadCycle {
    /// Creates a cycle logging under the default `upload` span for `feature_name`.
    pub fn new(
        reader: Box<dyn BatchReader>,
        uploader: Box<dyn DataUploader>,
        conditions: UploadConditions,
        delay: Delay,
        feature_name: &str,
    ) -> Self {
        let span = tracing::debug_span!("upload", feature = %feature_name);
        Self::with_span(reader, uploader, conditions, delay, span)
    }

    /// Creates a cycle emitting its diagnostics inside `span`.
    pub fn with_span(
        reader: Box<dyn BatchReader>,
        uploader: Box<dyn DataUploader>,
        conditions: UploadConditions,
        delay: Delay,
        span: tracing::Span,
    ) -> Self {
        Self {
            reader,
            uploader,
            conditions,
            delay,
            span,
        }
    }

    /// Returns the pacing state.
    pub fn delay(&self) -> &Delay {
        &self.delay
    }

    /// Returns the interval to wait before the next cycle.
    pub fn next_delay(&self) -> Duration {
        self.delay.current()
    }

    /// Runs one cycle and updates the delay according to its outcome.
    pub async fn run_once(&mut self) -> CycleOutcome {
        let span = self.span.clone();
        self.run_cycle().instrument(span).await
    }

    async fn run_cycle(&mut self) -> CycleOutcome {
        let blockers = self.conditions.blockers_for_upload();
        if !blockers.is_empty() {
            tracing::debug!(
                batch = "NOT CHECKED",
                system = %BlockerList(&blockers),
                "No upload"
            );
            self.delay.increase();
            return CycleOutcome::Blocked(blockers);
        }

        let Some(batch) = self.reader.read_next_batch().await else {
            tracing::debug!(batch = "NO", system = %BlockerList(&[]), "No upload");
            self.delay.increase();
            return CycleOutcome::NoBatch;
        };

        tracing::debug!(batch = %batch.id(), size = batch.size_bytes(), "Uploading batch");
        let status = self.uploader.upload(batch.data()).await;

        if status.is_acceptable() {
            self.reader.mark_batch_as_read(&batch).await;
            self.delay.decrease();
            tracing::debug!(%status, "Accepted, won't be retransmitted");
            CycleOutcome::Accepted(status)
        } else {
            self.delay.increase();
            tracing::debug!(%status, "Not delivered, will be retransmitted");
            CycleOutcome::Retained(status)
        }
    }
}

/// Handle to a running upload loop.
///
/// Dropping the handle without calling [`UploadWorker::cancel_synchronously`]
/// still stops the loop at its next scheduling boundary.
pub struct UploadWorker {
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl UploadWorker {
    /// Spawns the upload loop on the current tokio runtime.
    ///
    /// The first cycle runs after the cycle's initial delay.
    pub fn spawn(cycle: UploadCycle) -> Self {
        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(run_loop(cycle, cancel_token.clone()));

        Self {
            cancel_token,
            task: Some(task),
        }
    }

    /// Returns whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Stops scheduling cycles and waits for the loop to exit.
    ///
    /// A cycle already in flight completes but does not schedule another.
    /// When this returns, no further cycle will run. Calling it again is a
    /// no-op.
    pub async fn cancel_synchronously(&mut self) {
        self.cancel_token.cancel();

        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Upload task ended abnormally");
        }
    }
}

impl Drop for UploadWorker {
    fn drop(&mut self) {
        if self.task.is_some() {
            tracing::warn!("Upload worker dropped without cancellation, stopping at next boundary");
            self.cancel_token.cancel();
        }
    }
}

async fn run_loop(mut cycle: UploadCycle, cancel_token: CancellationToken) {
    loop {
        let delay = cycle.next_delay();
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        cycle.run_once().await;

        if cancel_token.is_cancelled() {
            break;
        }
    }
    tracing::debug!("Upload loop stopped");
}
