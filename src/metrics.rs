//! Process metrics registry.
//!
//! A handful of monotonic counters shared by every request task. The registry
//! is constructed explicitly and handed to the middleware that updates it, so
//! tests get a fresh one each and nothing hides behind a global.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for the lifetime of the process. Never reset.
#[derive(Debug, Default)]
pub struct Metrics {
    requests: AtomicU64,
    errors: AtomicU64,
    panics: AtomicU64,
    goroutines: AtomicU64,
}

/// Point-in-time copy of the counters, serialized with their exported names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub panics: u64,
    pub goroutines: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_panics(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Request-rate proxy bumped alongside `requests`. It does not measure
    /// how many tasks are running.
    pub fn add_goroutines(&self) {
        self.goroutines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            goroutines: self.goroutines.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        const TASKS: u64 = 64;
        const PER_TASK: u64 = 250;

        let metrics = Arc::new(Metrics::new());
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..TASKS {
            let metrics = Arc::clone(&metrics);
            tasks.spawn(async move {
                for _ in 0..PER_TASK {
                    metrics.add_requests();
                    tokio::task::yield_now().await;
                }
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }

        assert_eq!(metrics.snapshot().requests, TASKS * PER_TASK);
    }

    #[test]
    fn snapshot_uses_exported_counter_names() {
        let metrics = Metrics::new();
        metrics.add_requests();
        metrics.add_goroutines();
        metrics.add_errors();

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "requests": 1, "errors": 1, "panics": 0, "goroutines": 1 })
        );
    }
}
