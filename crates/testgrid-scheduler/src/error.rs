//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during scheduling operations.
///
/// Each variant indicates a protocol misuse by the driving loop; none
/// of them occur during a correctly sequenced run.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("worker already registered: {0}")]
    AlreadyRegistered(String),

    #[error("unknown worker: {0}")]
    UnknownWorker(String),

    #[error("item {index} is not pending on worker {worker}")]
    ItemNotPending { worker: String, index: usize },

    #[error("dispatch requested before all {expected} workers reported a collection")]
    CollectionIncomplete { expected: usize },

    #[error("no collection recorded for worker: {0}")]
    MissingCollection(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
