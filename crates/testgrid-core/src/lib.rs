//! testgrid-core — shared domain types for the TestGrid scheduler.
//!
//! - `WorkerSpec`: a worker's launch configuration, the "role" identity
//!   used to match a replacement worker to the worker it replaces
//! - pool configuration (`testgrid.toml`) and worker-spec expansion
//! - collection diff rendering for mismatch diagnostics

pub mod config;
pub mod diff;
pub mod error;
pub mod spec;

pub use config::GridConfig;
pub use diff::collection_diff_report;
pub use error::{CoreError, CoreResult};
pub use spec::{WorkerSpec, expand_worker_specs};
