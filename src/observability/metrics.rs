//! Query metrics
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe but lock-minimal

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Counters covering planning and multi-query iteration
///
/// All counters use Relaxed ordering; values are exact once the
/// recording threads have finished.
#[derive(Debug, Default)]
pub struct QueryMetrics {
    queries_planned: AtomicU64,
    queries_rejected: AtomicU64,
    branches_issued: AtomicU64,
    records_merged: AtomicU64,
    duplicates_dropped: AtomicU64,
    post_filter_rejections: AtomicU64,
    store_failures: AtomicU64,
}

static GLOBAL: OnceLock<QueryMetrics> = OnceLock::new();

impl QueryMetrics {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance that planners and iterators record into
    pub fn global() -> &'static QueryMetrics {
        GLOBAL.get_or_init(QueryMetrics::new)
    }

    pub fn increment_queries_planned(&self) {
        self.queries_planned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_branches_issued(&self, count: u64) {
        self.branches_issued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_records_merged(&self) {
        self.records_merged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_duplicates_dropped(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_post_filter_rejections(&self) {
        self.post_filter_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_store_failures(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all counters as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_planned: self.queries_planned.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            branches_issued: self.branches_issued.load(Ordering::Relaxed),
            records_merged: self.records_merged.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            post_filter_rejections: self.post_filter_rejections.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }

    /// Snapshot rendered as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub queries_planned: u64,
    pub queries_rejected: u64,
    pub branches_issued: u64,
    pub records_merged: u64,
    pub duplicates_dropped: u64,
    pub post_filter_rejections: u64,
    pub store_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let metrics = QueryMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let metrics = QueryMetrics::new();

        metrics.increment_queries_planned();
        metrics.increment_queries_planned();
        metrics.increment_queries_rejected();
        metrics.add_branches_issued(3);
        metrics.increment_records_merged();
        metrics.increment_duplicates_dropped();
        metrics.increment_post_filter_rejections();
        metrics.increment_store_failures();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queries_planned, 2);
        assert_eq!(snapshot.queries_rejected, 1);
        assert_eq!(snapshot.branches_issued, 3);
        assert_eq!(snapshot.records_merged, 1);
        assert_eq!(snapshot.duplicates_dropped, 1);
        assert_eq!(snapshot.post_filter_rejections, 1);
        assert_eq!(snapshot.store_failures, 1);
    }

    #[test]
    fn test_to_json() {
        let metrics = QueryMetrics::new();
        metrics.add_branches_issued(2);

        let parsed: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(parsed["branches_issued"], 2);
        assert_eq!(parsed["store_failures"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(QueryMetrics::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let m = Arc::clone(&metrics);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m.increment_records_merged();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot().records_merged, 1000);
    }

    #[test]
    fn test_global_is_shared() {
        let before = QueryMetrics::global().snapshot().store_failures;
        QueryMetrics::global().increment_store_failures();
        assert!(QueryMetrics::global().snapshot().store_failures > before);
    }
}
