//! Worker launch specifications.
//!
//! A worker spec is a `//`-separated string of `key[=value]` segments,
//! e.g. `popen`, `popen//python=python3`, `ssh=host//chdir=/tmp`. The
//! first segment names the backend. Two workers with equal specs fill
//! the same role: a replacement worker is matched to a dead one by spec
//! equality, never by id.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A worker's launch configuration.
///
/// Equality and hashing are on the full raw string; the spec is a role
/// identity, not a parsed structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerSpec(String);

impl WorkerSpec {
    /// Parse a spec string, validating its segments.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CoreError::EmptySpec);
        }
        for segment in raw.split("//") {
            if segment.is_empty() || segment.starts_with('=') {
                return Err(CoreError::EmptySegment(raw.to_string()));
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// The backend name: the key of the first segment.
    pub fn backend(&self) -> &str {
        let first = self.0.split("//").next().unwrap_or_default();
        first.split('=').next().unwrap_or_default()
    }

    /// The raw spec string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Expand pool entries into one spec per worker slot.
///
/// An entry may carry a multiplier prefix: `4*popen` expands to four
/// identical `popen` specs. The expanded length is the number of
/// workers the pool expects to report a collection.
pub fn expand_worker_specs(entries: &[String]) -> CoreResult<Vec<WorkerSpec>> {
    let mut specs = Vec::new();
    for entry in entries {
        let entry = entry.trim();
        let (count, raw) = match entry.split_once('*') {
            Some((n, rest)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => {
                let count: usize = n
                    .parse()
                    .map_err(|_| CoreError::InvalidMultiplier(entry.to_string()))?;
                if count == 0 {
                    return Err(CoreError::InvalidMultiplier(entry.to_string()));
                }
                (count, rest)
            }
            _ => (1, entry),
        };
        let spec = WorkerSpec::parse(raw)?;
        specs.extend(std::iter::repeat_n(spec, count));
    }
    Ok(specs)
}
