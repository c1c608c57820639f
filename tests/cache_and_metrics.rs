mod common;

use common::{config, harness, A};
use lifeline::{CacheKey, ManualClock, Metrics, TtlCache};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn entry_is_served_within_ttl_and_expires_after() {
    let clock = ManualClock::new();
    let cache = TtlCache::new(Duration::from_secs(5), Arc::new(clock.clone()));
    let metrics = Metrics::new();
    let key = CacheKey::new("k", &json!([]));
    cache.set(key.clone(), 42);

    clock.advance(Duration::from_secs(1));
    match cache.get(&key) {
        Some(value) => {
            metrics.record_cache_hit();
            assert_eq!(value, 42);
        }
        None => panic!("entry expired early"),
    }

    clock.advance(Duration::from_secs(5));
    assert_eq!(cache.get(&key), None);
    metrics.record_cache_miss();

    let snapshot = metrics.snapshot();
    assert_eq!((snapshot.cache_hits, snapshot.cache_misses), (1, 1));
    assert!((snapshot.cache_hit_ratio - 0.5).abs() < f64::EPSILON);
    assert!(cache.is_empty(), "expired entries are evicted on lookup");
}

#[tokio::test]
async fn client_cache_honours_ttl() {
    let h = harness(config(&[A]).cache_ttl(Duration::from_secs(5)));
    h.transport.always(A, Ok(json!("0x2105")));

    assert_eq!(h.client.chain_id().await, Ok(8453));
    h.clock.advance(Duration::from_secs(1));
    assert_eq!(h.client.chain_id().await, Ok(8453));
    assert_eq!(h.transport.calls_to(A), 1);

    h.clock.advance(Duration::from_secs(5));
    assert_eq!(h.client.chain_id().await, Ok(8453));
    assert_eq!(h.transport.calls_to(A), 2);

    let metrics = h.client.metrics_snapshot();
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 2);
}

#[tokio::test]
async fn different_arguments_are_cached_separately() {
    let h = harness(config(&[A]));
    h.transport.always(A, Ok(json!("0x1")));

    h.client.call("eth_getBalance", json!(["0xaa", "latest"]), true).await.expect("ok");
    h.client.call("eth_getBalance", json!(["0xbb", "latest"]), true).await.expect("ok");
    h.client.call("eth_getBalance", json!(["0xaa", "latest"]), true).await.expect("ok");
    assert_eq!(h.transport.calls_to(A), 2);
}

#[tokio::test]
async fn clear_cache_forces_a_refetch() {
    let h = harness(config(&[A]));
    h.transport.always(A, Ok(json!("0x2105")));
    h.client.chain_id().await.expect("ok");
    h.client.clear_cache();
    h.client.chain_id().await.expect("ok");
    assert_eq!(h.transport.calls_to(A), 2);
}

#[tokio::test]
async fn metrics_track_operations_and_endpoints_until_reset() {
    let h = harness(config(&[A]).max_retries(0).rotate_after(10));
    h.transport
        .respond_to(A, "eth_blockNumber", Ok(json!("0x10")))
        .respond_to(A, "eth_gasPrice", Err(lifeline::TransportError::Connect("down".into())));

    h.client.block_number().await.expect("ok");
    h.client.block_number().await.expect("ok");
    assert!(h.client.gas_price().await.is_err());

    let snapshot = h.client.metrics_snapshot();
    assert_eq!(snapshot.total_requests(), 3);
    assert_eq!(snapshot.total_errors(), 1);
    assert_eq!(snapshot.operation("eth_blockNumber").map(|op| op.count), Some(2));
    assert_eq!(snapshot.operation("eth_gasPrice").map(|op| op.errors), Some(1));
    assert_eq!(snapshot.endpoint_usage.get(A), Some(&3));

    let json = serde_json::to_value(&snapshot).expect("serializable");
    assert_eq!(json["operations"]["eth_blockNumber"]["count"], 2);

    h.client.reset_metrics();
    assert_eq!(h.client.metrics_snapshot(), lifeline::MetricsSnapshot::default());
}
