//! In-process simulated workers.
//!
//! [`SimWorker`] stands in for a remote worker process at the
//! `WorkerHandle` seam: the scheduler commands it, and a spawned task
//! replays the resulting completion events back into the session
//! channel. Used by the CLI runner and by integration tests.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use testgrid_core::WorkerSpec;
use testgrid_scheduler::WorkerHandle;

use crate::event::WorkerEvent;

#[derive(Debug, Clone)]
enum SimCommand {
    RunAll,
    RunSubset(Vec<usize>),
    Shutdown,
}

/// Handle side of a simulated worker.
///
/// Command sends are queued; the worker task consumes them in order and
/// emits `ItemFinished` / `Died` events into the session channel.
pub struct SimWorker {
    id: String,
    spec: WorkerSpec,
    commands: mpsc::UnboundedSender<SimCommand>,
}

impl SimWorker {
    /// Spawn a simulated worker task and return its handle.
    ///
    /// The worker announces itself (`Joined`), reports `collection`,
    /// then runs whatever it is commanded to run, completing items in
    /// order. With `fail_after = Some(n)` it dies after confirming n
    /// completions, leaving the rest unreported.
    pub fn spawn(
        id: &str,
        spec: WorkerSpec,
        collection: Vec<String>,
        fail_after: Option<usize>,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Arc<SimWorker> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let worker = Arc::new(SimWorker {
            id: id.to_string(),
            spec,
            commands: cmd_tx,
        });
        tokio::spawn(run_worker(
            worker.id.clone(),
            collection.len(),
            fail_after,
            cmd_rx,
            events.clone(),
        ));
        let _ = events.send(WorkerEvent::Joined(worker.clone()));
        let _ = events.send(WorkerEvent::Collected {
            worker: worker.id.clone(),
            collection,
        });
        worker
    }
}

impl WorkerHandle for SimWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    fn send_run_all(&self) {
        let _ = self.commands.send(SimCommand::RunAll);
    }

    fn send_run_subset(&self, indices: Vec<usize>) {
        let _ = self.commands.send(SimCommand::RunSubset(indices));
    }

    fn shutdown(&self) {
        let _ = self.commands.send(SimCommand::Shutdown);
    }
}

async fn run_worker(
    id: String,
    collection_len: usize,
    fail_after: Option<usize>,
    mut commands: mpsc::UnboundedReceiver<SimCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut completed = 0usize;
    while let Some(command) = commands.recv().await {
        let indices: Vec<usize> = match command {
            SimCommand::RunAll => (0..collection_len).collect(),
            SimCommand::RunSubset(indices) => indices,
            SimCommand::Shutdown => {
                debug!(worker = %id, "simulated worker shutting down");
                let _ = events.send(WorkerEvent::Died { worker: id });
                return;
            }
        };
        for index in indices {
            if fail_after.is_some_and(|limit| completed >= limit) {
                debug!(worker = %id, completed, "simulated worker crashing");
                let _ = events.send(WorkerEvent::Died { worker: id });
                return;
            }
            let _ = events.send(WorkerEvent::ItemFinished {
                worker: id.clone(),
                index,
            });
            completed += 1;
        }
    }
    // Command channel closed without a shutdown: the pool dropped this
    // worker's handle.
    let _ = events.send(WorkerEvent::Died { worker: id });
}
