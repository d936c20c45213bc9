//! Session loop — turns worker events into scheduler calls.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use testgrid_scheduler::{BroadcastScheduler, SchedulerError};

use crate::event::WorkerEvent;

/// Errors that abort a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The event stream violated the scheduler's protocol; this is a
    /// bug in the worker management layer, not a runtime condition.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Outcome of a session run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    /// Completions confirmed across all workers.
    pub items_completed: usize,
    /// Crash items in death order: one per worker that died with work
    /// in flight.
    pub crashed: Vec<String>,
    /// Every owed item was drained and no orphaned work remains.
    pub finished: bool,
}

/// Owns a scheduler and drives it from a stream of worker events.
pub struct Session {
    scheduler: BroadcastScheduler,
    summary: SessionSummary,
}

impl Session {
    pub fn new(scheduler: BroadcastScheduler) -> Self {
        Self {
            scheduler,
            summary: SessionSummary::default(),
        }
    }

    /// Consume events until the run finishes or stalls.
    ///
    /// The loop ends when every owed item has drained after collection
    /// completion, when no registered workers remain, or when the event
    /// channel closes. The summary's `finished` flag distinguishes a
    /// clean finish from a stall.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) -> SessionResult<SessionSummary> {
        while let Some(event) = events.recv().await {
            self.handle_event(event)?;
            if self.scheduler.tests_finished() && !self.scheduler.has_pending() {
                info!(items = self.summary.items_completed, "run complete");
                break;
            }
            if self.scheduler.collection_complete() && self.scheduler.workers().is_empty() {
                warn!("no workers left and the run is not finished");
                break;
            }
        }
        Ok(self.into_summary())
    }

    /// Apply one worker event to the scheduler.
    pub fn handle_event(&mut self, event: WorkerEvent) -> SessionResult<()> {
        debug!(?event, "worker event");
        match event {
            WorkerEvent::Joined(handle) => {
                // A mid-run joiner is a candidate replacement; it gets
                // work only after reporting a matching collection.
                self.scheduler.join(handle)?;
            }
            WorkerEvent::Collected { worker, collection } => {
                self.scheduler.report_collection(&worker, collection)?;
                if self.scheduler.collection_complete() {
                    self.scheduler.dispatch()?;
                }
            }
            WorkerEvent::ItemFinished { worker, index } => {
                self.scheduler.mark_complete(&worker, index)?;
                self.summary.items_completed += 1;
            }
            WorkerEvent::Died { worker } => {
                if let Some(item) = self.scheduler.remove(&worker)? {
                    warn!(worker = %worker, item = %item, "worker crashed while executing");
                    self.summary.crashed.push(item);
                }
            }
        }
        Ok(())
    }

    /// The scheduler being driven, for progress queries.
    pub fn scheduler(&self) -> &BroadcastScheduler {
        &self.scheduler
    }

    /// Finalize the summary from current scheduler state.
    pub fn into_summary(self) -> SessionSummary {
        let mut summary = self.summary;
        summary.finished = self.scheduler.tests_finished();
        summary
    }
}
