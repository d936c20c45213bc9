//! Worker handle and diagnostics seams.
//!
//! The scheduler never owns worker lifecycle; it commands workers
//! through [`WorkerHandle`] and reports collection mismatches through
//! [`Diagnostics`]. Both are implemented by the surrounding session
//! machinery, or by test fixtures.

use testgrid_core::WorkerSpec;

/// Command surface of a connected worker.
///
/// Sends are fire-and-forget from the scheduler's point of view: a lost
/// worker surfaces later as a death event, not as a send error.
pub trait WorkerHandle: Send + Sync {
    /// Stable identity of this worker connection, e.g. `"w0"`.
    fn id(&self) -> &str;

    /// Launch configuration; the role identity used for replacement
    /// matching.
    fn spec(&self) -> &WorkerSpec;

    /// Command the worker to run its entire collection in order.
    fn send_run_all(&self);

    /// Command the worker to run exactly the given collection indices,
    /// in order.
    fn send_run_subset(&self, indices: Vec<usize>);

    /// Command the worker to exit once its queued work is done.
    fn shutdown(&self);
}

/// Sink for scheduler diagnostics.
pub trait Diagnostics: Send + Sync {
    fn report(&self, message: &str);
}

/// Default diagnostics sink: logs through `tracing`.
#[derive(Debug, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn report(&self, message: &str) {
        tracing::warn!("{message}");
    }
}
