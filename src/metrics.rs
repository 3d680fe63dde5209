// Run metrics
//
// Lightweight counters for PitStop Server invocations. Execution time is
// recorded here rather than in ExecutionResult.

use crate::models::ExecutionResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by every run that is handed the same instance.
///
/// Atomic operations only, so an `Arc<RunMetrics>` can be shared across
/// tasks without locking.
#[derive(Debug)]
pub struct RunMetrics {
    /// Runs that reached the external process
    pub runs_started: AtomicU64,

    /// Runs whose process exited with code 0
    pub runs_succeeded: AtomicU64,

    /// Runs whose process exited with a non-zero code
    pub runs_failed: AtomicU64,

    /// Runs whose process could not be launched or was killed
    pub launch_failures: AtomicU64,

    /// Total execution time in milliseconds
    pub total_execution_time_ms: AtomicU64,

    /// Execution time of the most recent run in milliseconds
    pub last_execution_time_ms: AtomicU64,

    start_time: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            launch_failures: AtomicU64::new(0),
            total_execution_time_ms: AtomicU64::new(0),
            last_execution_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome and duration of a finished run
    pub fn record_finished(&self, result: &ExecutionResult, duration: Duration) {
        if result.is_success() {
            self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else if result.is_launch_failure() {
            self.launch_failures.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }

        let millis = duration.as_millis() as u64;
        self.total_execution_time_ms
            .fetch_add(millis, Ordering::Relaxed);
        self.last_execution_time_ms.store(millis, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average execution time per finished run in milliseconds
    pub fn avg_execution_time_ms(&self) -> f64 {
        let total = self.total_execution_time_ms.load(Ordering::Relaxed);
        let count = self.runs_succeeded.load(Ordering::Relaxed)
            + self.runs_failed.load(Ordering::Relaxed)
            + self.launch_failures.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            "Runs: {} started, {} succeeded, {} failed, {} launch failures",
            self.runs_started.load(Ordering::Relaxed),
            self.runs_succeeded.load(Ordering::Relaxed),
            self.runs_failed.load(Ordering::Relaxed),
            self.launch_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Execution time: {:.2}s total, {:.2}ms average, uptime {:.2}s",
            self.total_execution_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_execution_time_ms(),
            self.uptime().as_secs_f64()
        );
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}
