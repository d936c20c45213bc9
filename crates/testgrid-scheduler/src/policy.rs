//! Admission control — static worker allow-list.

use std::collections::HashSet;

/// Environment variable naming the workers allowed to run tests,
/// comma-separated. Unset or blank means every worker is allowed.
pub const ALLOWED_WORKERS_ENV: &str = "TESTGRID_ALLOWED_WORKERS";

/// Static allow-list of worker ids, fixed at construction.
///
/// An empty list admits every worker. Excluded workers still join and
/// report collections; they are shut down at dispatch without being
/// sent any work, which keeps the expected-worker count intact.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: HashSet<String>,
}

impl AllowList {
    /// Allow every worker.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Build from an explicit id list.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma-separated id list; blank means allow all.
    pub fn from_list(raw: &str) -> Self {
        Self::from_ids(
            raw.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        )
    }

    /// Build from [`ALLOWED_WORKERS_ENV`].
    pub fn from_env() -> Self {
        std::env::var(ALLOWED_WORKERS_ENV)
            .map(|raw| Self::from_list(&raw))
            .unwrap_or_default()
    }

    pub fn is_allowed(&self, worker_id: &str) -> bool {
        self.ids.is_empty() || self.ids.contains(worker_id)
    }

    /// True when no restriction is configured.
    pub fn is_unrestricted(&self) -> bool {
        self.ids.is_empty()
    }
}
