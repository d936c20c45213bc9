//! Core error types.

use thiserror::Error;

/// Errors from worker-spec and pool-entry parsing.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("empty worker spec")]
    EmptySpec,

    #[error("empty segment in worker spec: {0:?}")]
    EmptySegment(String),

    #[error("invalid multiplier in pool entry: {0:?}")]
    InvalidMultiplier(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
