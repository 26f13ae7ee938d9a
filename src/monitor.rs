use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::trace;

use crate::error::Result;

/// Accumulated timings for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationStats {
    /// Number of recorded calls
    pub count: u64,

    /// Sum of all durations
    pub total_time: Duration,

    /// Shortest call
    pub min_time: Duration,

    /// Longest call
    pub max_time: Duration,
}

impl OperationStats {
    fn first(elapsed: Duration) -> Self {
        Self {
            count: 1,
            total_time: elapsed,
            min_time: elapsed,
            max_time: elapsed,
        }
    }

    fn add(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total_time += elapsed;
        self.min_time = self.min_time.min(elapsed);
        self.max_time = self.max_time.max(elapsed);
    }

    /// Mean duration (`total_time / count`)
    pub fn average_time(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.total_time.as_nanos() / self.count as u128) as u64)
    }
}

/// One operation in a [`PerformanceReport`], in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationReport {
    pub count: u64,
    pub total_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub average_ms: f64,
}

impl From<&OperationStats> for OperationReport {
    fn from(stats: &OperationStats) -> Self {
        Self {
            count: stats.count,
            total_ms: millis(stats.total_time),
            min_ms: millis(stats.min_time),
            max_ms: millis(stats.max_time),
            average_ms: millis(stats.average_time()),
        }
    }
}

/// Snapshot of every tracked operation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub operations: BTreeMap<String, OperationReport>,
}

impl PerformanceReport {
    /// Render the report as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Collects wall-clock timings per operation name
///
/// Statistics only grow until [`clear`](Self::clear) is called.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    operations: RwLock<FxHashMap<String, OperationStats>>,
}

impl PerformanceMonitor {
    /// Create an empty monitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one timing to `name`
    pub fn record(&self, name: &str, elapsed: Duration) {
        {
            let mut operations = self.operations.write();
            match operations.get_mut(name) {
                Some(stats) => stats.add(elapsed),
                None => {
                    operations.insert(name.to_string(), OperationStats::first(elapsed));
                }
            }
        }

        metrics::histogram!("tiered_cache_operation_seconds", elapsed.as_secs_f64(), "operation" => name.to_string());
        trace!(operation = name, elapsed_us = elapsed.as_micros() as u64, "recorded timing");
    }

    /// Run `f` and record how long it took
    pub fn time<R, F: FnOnce() -> R>(&self, name: &str, f: F) -> R {
        let start = Instant::now();
        let result = f();
        self.record(name, start.elapsed());
        result
    }

    /// Wrap `func` so every call is timed under `name`
    pub fn timed<F>(self: &Arc<Self>, name: impl Into<String>, func: F) -> Timed<F> {
        Timed {
            monitor: self.clone(),
            name: name.into(),
            func,
        }
    }

    /// Statistics for `name`, if it was ever recorded
    pub fn stats(&self, name: &str) -> Option<OperationStats> {
        self.operations.read().get(name).copied()
    }

    /// Mean duration of `name` (zero if unknown)
    pub fn average_time(&self, name: &str) -> Duration {
        self.stats(name)
            .map(|stats| stats.average_time())
            .unwrap_or(Duration::ZERO)
    }

    /// Number of recorded calls of `name` (zero if unknown)
    pub fn execution_count(&self, name: &str) -> u64 {
        self.stats(name).map(|stats| stats.count).unwrap_or(0)
    }

    /// Shortest recorded call of `name`
    pub fn min_time(&self, name: &str) -> Option<Duration> {
        self.stats(name).map(|stats| stats.min_time)
    }

    /// Longest recorded call of `name`
    pub fn max_time(&self, name: &str) -> Option<Duration> {
        self.stats(name).map(|stats| stats.max_time)
    }

    /// Names of all tracked operations, sorted
    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operations.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of all tracked operations
    pub fn report(&self) -> PerformanceReport {
        // Copy under the lock, convert outside it
        let snapshot: Vec<(String, OperationStats)> = self
            .operations
            .read()
            .iter()
            .map(|(name, stats)| (name.clone(), *stats))
            .collect();

        PerformanceReport {
            operations: snapshot
                .iter()
                .map(|(name, stats)| (name.clone(), OperationReport::from(stats)))
                .collect(),
        }
    }

    /// Forget every recorded timing
    pub fn clear(&self) {
        self.operations.write().clear();
    }
}

/// A function wrapped with timing
pub struct Timed<F> {
    monitor: Arc<PerformanceMonitor>,
    name: String,
    func: F,
}

impl<F> Timed<F> {
    /// Operation name timings are recorded under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the wrapped function and record its duration
    ///
    /// Every call is recorded, including ones that return an error.
    pub fn call<A, R>(&self, args: A) -> R
    where
        F: Fn(A) -> R,
    {
        self.monitor.time(&self.name, || (self.func)(args))
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}
