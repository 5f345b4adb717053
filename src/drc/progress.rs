//! Progress reporting and cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Caller-supplied progress sink. Returning `false` from either method
/// asks the run to stop.
pub trait ProgressReporter {
    fn phase(&mut self, name: &str) -> bool;

    fn advance(&mut self, done: usize, total: usize, granularity: usize) -> bool;
}

/// Ignores progress, never cancels
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn phase(&mut self, _name: &str) -> bool {
        true
    }

    fn advance(&mut self, _done: usize, _total: usize, _granularity: usize) -> bool {
        true
    }
}

/// Logs phases and checkpoints through `tracing`
#[derive(Debug)]
pub struct LogProgress {
    phase: String,
    started: Instant,
}

impl Default for LogProgress {
    fn default() -> Self {
        Self { phase: String::new(), started: Instant::now() }
    }
}

impl ProgressReporter for LogProgress {
    fn phase(&mut self, name: &str) -> bool {
        if !self.phase.is_empty() {
            tracing::debug!("[DRC] {} finished in {:?}", self.phase, self.started.elapsed());
        }
        self.phase = name.to_string();
        self.started = Instant::now();
        tracing::info!("[DRC] {}", name);
        true
    }

    fn advance(&mut self, done: usize, total: usize, _granularity: usize) -> bool {
        if total > 0 {
            tracing::debug!(
                "[DRC] {}: {}/{} ({:.0}%)",
                self.phase,
                done,
                total,
                done as f64 * 100.0 / total as f64
            );
        }
        true
    }
}
