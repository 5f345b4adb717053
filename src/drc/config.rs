//! Run configuration: error caps, severities, exclusions and tuning knobs

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

use super::error::{DrcError, Result};
use super::types::{ErrorKind, Severity};

/// DRC run configuration. Every field has a default so partial JSON works.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrcConfig {
    /// Cap applied to every error kind without an explicit entry
    pub default_error_limit: Option<usize>,
    /// Per-kind caps; once reached, that kind is no longer reported
    pub error_limits: IndexMap<ErrorKind, usize>,
    /// Severity for kinds that are not driven by a rule
    pub severities: IndexMap<ErrorKind, Severity>,
    /// Items between progress/cancellation checkpoints
    pub progress_granularity: usize,
    /// Wait slice of the cache builder's completion loop
    pub cache_poll_interval_ms: u64,
    /// Rule-area outlines are shrunk by this much so touching is not colliding
    pub area_epsilon_mm: f64,
    /// Allowed relative area loss of outline glyphs after deflate/inflate
    pub thickness_area_tolerance: f64,
    /// Provider names to skip
    pub disabled_providers: Vec<String>,
    /// Fingerprints of user-excluded violations
    pub exclusions: Vec<String>,
    /// Keep excluded violations in the result, flagged as excluded
    pub report_excluded: bool,
    /// Run the footprint/netlist comparison
    pub test_footprints: bool,
    /// Worker threads for the cache builder; `None` uses the global pool
    pub worker_threads: Option<usize>,
}

impl Default for DrcConfig {
    fn default() -> Self {
        Self {
            default_error_limit: None,
            error_limits: IndexMap::new(),
            severities: IndexMap::new(),
            progress_granularity: 250,
            cache_poll_interval_ms: 250,
            area_epsilon_mm: 0.001,
            thickness_area_tolerance: 0.1,
            disabled_providers: Vec::new(),
            exclusions: Vec::new(),
            report_excluded: false,
            test_footprints: true,
            worker_threads: None,
        }
    }
}

impl DrcConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DrcError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Apply `DRC_ERROR_LIMIT` and `DRC_THREADS` from the environment
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(limit) = env_usize("DRC_ERROR_LIMIT") {
            self.default_error_limit = Some(limit);
        }
        if let Some(threads) = env_usize("DRC_THREADS") {
            self.worker_threads = Some(threads.max(1));
        }
        self
    }

    pub fn with_error_limit(mut self, kind: ErrorKind, limit: usize) -> Self {
        self.error_limits.insert(kind, limit);
        self
    }

    pub fn error_limit(&self, kind: ErrorKind) -> Option<usize> {
        self.error_limits.get(&kind).copied().or(self.default_error_limit)
    }

    pub fn severity(&self, kind: ErrorKind) -> Severity {
        self.severities.get(&kind).copied().unwrap_or_default()
    }

    pub fn is_provider_enabled(&self, name: &str) -> bool {
        !self.disabled_providers.iter().any(|n| n == name)
    }
}

fn env_usize(name: &str) -> Option<usize> {
    match std::env::var(name) {
        Ok(val) => match val.trim().parse::<usize>() {
            Ok(n) => Some(n),
            Err(_) => {
                tracing::warn!("[DRC] ignoring {}={:?}: not a number", name, val);
                None
            }
        },
        Err(_) => None,
    }
}
