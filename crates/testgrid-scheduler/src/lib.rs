//! testgrid-scheduler — broadcast test scheduling.
//!
//! Assigns a pre-enumerated test suite to a fixed pool of workers.
//! Every admitted worker runs the entire suite independently; the
//! scheduler's job is the bookkeeping around that:
//!
//! - Collects each worker's reported test collection and holds dispatch
//!   until every expected worker has reported
//! - Hands a dead worker's unfinished remainder to a replacement worker
//!   with an equal spec and an identical collection
//! - Shuts down workers excluded by a static allow-list without sending
//!   them work
//!
//! # Architecture
//!
//! ```text
//! Session loop (external, owns all waiting)
//!   └── BroadcastScheduler (synchronous state transitions)
//!       ├── WorkerHandle  (send_run_all / send_run_subset / shutdown)
//!       ├── AllowList     (static admission control)
//!       └── Diagnostics   (collection mismatch reports)
//! ```

pub mod error;
pub mod handle;
pub mod policy;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use handle::{Diagnostics, LogDiagnostics, WorkerHandle};
pub use policy::{ALLOWED_WORKERS_ENV, AllowList};
pub use scheduler::BroadcastScheduler;
