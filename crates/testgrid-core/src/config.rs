//! testgrid.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::spec::{WorkerSpec, expand_worker_specs};

/// Top-level pool configuration.
///
/// ```toml
/// [pool]
/// workers = ["popen", "2*popen//python=python3"]
/// allowed = ["w0"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool entries, each an optional `N*` multiplier followed by a
    /// worker spec.
    pub workers: Vec<String>,
    /// Static allow-list of worker ids. Absent or empty: every worker
    /// may run tests.
    pub allowed: Option<Vec<String>>,
}

impl GridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GridConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Expand the pool entries into one spec per expected worker.
    pub fn worker_specs(&self) -> CoreResult<Vec<WorkerSpec>> {
        expand_worker_specs(&self.pool.workers)
    }
}
