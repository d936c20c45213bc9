//! Worker lifecycle events.

use std::fmt;
use std::sync::Arc;

use testgrid_scheduler::WorkerHandle;

/// A single worker lifecycle event, delivered to the session loop by
/// the worker management layer.
pub enum WorkerEvent {
    /// A worker process connected.
    Joined(Arc<dyn WorkerHandle>),
    /// A worker reported the test collection it discovered.
    Collected {
        worker: String,
        collection: Vec<String>,
    },
    /// A worker finished one collection index.
    ItemFinished { worker: String, index: usize },
    /// A worker disconnected, cleanly or not.
    Died { worker: String },
}

impl fmt::Debug for WorkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joined(handle) => f.debug_tuple("Joined").field(&handle.id()).finish(),
            Self::Collected { worker, collection } => f
                .debug_struct("Collected")
                .field("worker", worker)
                .field("items", &collection.len())
                .finish(),
            Self::ItemFinished { worker, index } => f
                .debug_struct("ItemFinished")
                .field("worker", worker)
                .field("index", index)
                .finish(),
            Self::Died { worker } => f.debug_struct("Died").field("worker", worker).finish(),
        }
    }
}
