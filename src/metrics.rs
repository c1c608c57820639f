//! In-process call metrics.
//!
//! Every mutating operation takes the single internal lock for a short, non-async critical
//! section, and recovers from poisoning, so recording a metric can never fail or panic the
//! caller.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Highest latency tracked by the histograms (one hour, in milliseconds).
const MAX_TRACKED_LATENCY_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Default)]
struct OperationStats {
    count: u64,
    errors: u64,
    total_latency_ms: f64,
    histogram: Option<Histogram<u64>>,
}

impl OperationStats {
    fn record(&mut self, latency: Duration, success: bool) {
        self.count += 1;
        if !success {
            self.errors += 1;
        }
        let millis = latency.as_secs_f64() * 1000.0;
        self.total_latency_ms += millis;
        if self.histogram.is_none() {
            self.histogram = Histogram::new_with_bounds(1, MAX_TRACKED_LATENCY_MS, 3).ok();
        }
        if let Some(histogram) = self.histogram.as_mut() {
            let whole = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX).max(1);
            histogram.saturating_record(whole);
        }
    }

    fn snapshot(&self) -> OperationSnapshot {
        let mean_latency_ms =
            if self.count == 0 { 0.0 } else { self.total_latency_ms / self.count as f64 };
        let (p50, p99, max) = match &self.histogram {
            Some(h) if !h.is_empty() => (h.value_at_quantile(0.5), h.value_at_quantile(0.99), h.max()),
            _ => (0, 0, 0),
        };
        OperationSnapshot {
            count: self.count,
            errors: self.errors,
            mean_latency_ms,
            p50_latency_ms: p50,
            p99_latency_ms: p99,
            max_latency_ms: max,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    operations: HashMap<String, OperationStats>,
    endpoint_usage: HashMap<String, u64>,
    cache_hits: u64,
    cache_misses: u64,
    breaker_trips: u64,
}

/// Thread-safe counters shared by every component of a client.
#[derive(Debug, Default)]
pub struct Metrics {
    state: Mutex<State>,
}

/// Per-operation figures inside a [`MetricsSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSnapshot {
    pub count: u64,
    pub errors: u64,
    pub mean_latency_ms: f64,
    pub p50_latency_ms: u64,
    pub p99_latency_ms: u64,
    pub max_latency_ms: u64,
}

/// Immutable copy of all counters at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub operations: BTreeMap<String, OperationSnapshot>,
    pub endpoint_usage: BTreeMap<String, u64>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// `hits / (hits + misses)`, 0 when nothing was looked up.
    pub cache_hit_ratio: f64,
    pub breaker_trips: u64,
}

impl MetricsSnapshot {
    pub fn total_requests(&self) -> u64 {
        self.operations.values().map(|op| op.count).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.operations.values().map(|op| op.errors).sum()
    }

    pub fn operation(&self, name: &str) -> Option<&OperationSnapshot> {
        self.operations.get(name)
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one transport attempt for `operation` against `endpoint`.
    pub fn record_call(&self, operation: &str, latency: Duration, success: bool, endpoint: &str) {
        let mut state = self.lock();
        state.operations.entry(operation.to_string()).or_default().record(latency, success);
        *state.endpoint_usage.entry(endpoint.to_string()).or_insert(0) += 1;
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.lock().cache_misses += 1;
    }

    pub fn record_breaker_trip(&self) {
        self.lock().breaker_trips += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.lock();
        let lookups = state.cache_hits + state.cache_misses;
        let cache_hit_ratio =
            if lookups == 0 { 0.0 } else { state.cache_hits as f64 / lookups as f64 };
        MetricsSnapshot {
            operations: state.operations.iter().map(|(k, v)| (k.clone(), v.snapshot())).collect(),
            endpoint_usage: state.endpoint_usage.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            cache_hits: state.cache_hits,
            cache_misses: state.cache_misses,
            cache_hit_ratio,
            breaker_trips: state.breaker_trips,
        }
    }

    /// Zero every counter in one step.
    pub fn reset(&self) {
        *self.lock() = State::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_snapshot_has_zero_ratio() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.cache_hit_ratio, 0.0);
        assert_eq!(snapshot.total_requests(), 0);
        assert!(snapshot.operations.is_empty());
    }

    #[test]
    fn records_calls_per_operation_and_endpoint() {
        let metrics = Metrics::new();
        metrics.record_call("eth_blockNumber", Duration::from_millis(10), true, "https://a");
        metrics.record_call("eth_blockNumber", Duration::from_millis(30), false, "https://a");
        metrics.record_call("eth_chainId", Duration::from_millis(5), true, "https://b");

        let snapshot = metrics.snapshot();
        let block = snapshot.operation("eth_blockNumber").expect("recorded");
        assert_eq!(block.count, 2);
        assert_eq!(block.errors, 1);
        assert!((block.mean_latency_ms - 20.0).abs() < 1e-9);
        assert_eq!(block.max_latency_ms, 30);
        assert_eq!(snapshot.endpoint_usage.get("https://a"), Some(&2));
        assert_eq!(snapshot.endpoint_usage.get("https://b"), Some(&1));
        assert_eq!(snapshot.total_requests(), 3);
        assert_eq!(snapshot.total_errors(), 1);
    }

    #[test]
    fn cache_ratio_and_trips() {
        let metrics = Metrics::new();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_breaker_trip();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 3);
        assert_eq!(snapshot.cache_misses, 1);
        assert!((snapshot.cache_hit_ratio - 0.75).abs() < 1e-9);
        assert_eq!(snapshot.breaker_trips, 1);
    }

    #[test]
    fn reset_clears_everything() {
        let metrics = Metrics::new();
        metrics.record_call("eth_gasPrice", Duration::from_millis(1), true, "https://a");
        metrics.record_cache_miss();
        metrics.record_breaker_trip();
        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn concurrent_recording_loses_nothing() {
        let metrics = Arc::new(Metrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        metrics.record_call("eth_call", Duration::from_millis(2), true, "https://a");
                        metrics.record_cache_hit();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread finished");
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.operation("eth_call").map(|op| op.count), Some(2000));
        assert_eq!(snapshot.cache_hits, 2000);
    }

    #[test]
    fn snapshot_serializes() {
        let metrics = Metrics::new();
        metrics.record_call("eth_chainId", Duration::from_millis(3), true, "https://a");
        let json = serde_json::to_value(metrics.snapshot()).expect("serializable");
        assert_eq!(json["operations"]["eth_chainId"]["count"], 1);
        assert_eq!(json["cache_hit_ratio"], 0.0);
    }
}
