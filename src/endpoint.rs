//! Ordered endpoint list, the active-endpoint pointer, and failover.

use crate::call::RpcCall;
use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::config::ConfigError;
use crate::error::{RpcError, TransportError};
use crate::timeout::RequestTimeout;
use crate::transport::Transport;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One configured JSON-RPC service address. Immutable once configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    url: String,
    ordinal: usize,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, ordinal: usize) -> Self {
        Self { url: url.into(), ordinal }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Position in the configured list.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Owns the endpoint list and decides which endpoint calls are routed to.
///
/// The active pointer only moves during [`rotate`](Self::rotate) or [`connect`](Self::connect),
/// and only onto an endpoint whose liveness probe just succeeded through its circuit breaker.
#[derive(Debug)]
pub struct EndpointManager {
    endpoints: Vec<Endpoint>,
    active: AtomicUsize,
    breakers: Arc<CircuitBreakerRegistry>,
    transport: Arc<dyn Transport>,
    timeout: RequestTimeout,
}

impl EndpointManager {
    pub fn new(
        urls: &[String],
        breakers: Arc<CircuitBreakerRegistry>,
        transport: Arc<dyn Transport>,
        timeout: RequestTimeout,
    ) -> Result<Self, ConfigError> {
        if urls.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        let endpoints =
            urls.iter().enumerate().map(|(ordinal, url)| Endpoint::new(url.clone(), ordinal)).collect();
        Ok(Self { endpoints, active: AtomicUsize::new(0), breakers, transport, timeout })
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    fn at(&self, index: usize) -> &Endpoint {
        &self.endpoints[index % self.endpoints.len()]
    }

    pub fn current_endpoint(&self) -> Endpoint {
        self.at(self.active.load(Ordering::Acquire)).clone()
    }

    /// Probe `endpoint` through its breaker. An open breaker rejects without a live probe.
    async fn verify(&self, endpoint: &Endpoint) -> Result<(), RpcError> {
        let probe = || async {
            if self.timeout.probe(self.transport.probe(endpoint)).await {
                Ok(())
            } else {
                Err(RpcError::Transport {
                    endpoint: endpoint.url().to_string(),
                    source: TransportError::Connect("liveness probe failed".into()),
                })
            }
        };
        match self.breakers.get(endpoint.url()) {
            Some(breaker) => breaker.call(probe).await,
            None => probe().await,
        }
    }

    /// Advance to the next endpoint that answers a liveness probe, wrapping around the list.
    ///
    /// Candidates are tried in order starting after the active one; the active endpoint itself
    /// is tried last. The pointer is only updated on a verified endpoint. If a concurrent
    /// rotation already moved the pointer, its choice is kept.
    pub async fn rotate(&self) -> Result<Endpoint, RpcError> {
        let start = self.active.load(Ordering::Acquire);
        let len = self.endpoints.len();
        let from = self.at(start).clone();
        let mut last_tried = from.url().to_string();

        for step in 1..=len {
            let index = (start + step) % len;
            let candidate = &self.endpoints[index];
            last_tried = candidate.url().to_string();
            match self.verify(candidate).await {
                Ok(()) => {
                    return match self.active.compare_exchange(
                        start,
                        index,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            tracing::info!(from = %from, to = %candidate, "Rotated endpoint");
                            Ok(candidate.clone())
                        }
                        Err(current) => {
                            let current = self.at(current).clone();
                            tracing::debug!(endpoint = %current, "Concurrent rotation won");
                            Ok(current)
                        }
                    };
                }
                Err(error) => {
                    tracing::debug!(endpoint = %candidate, error = %error, "Skipping endpoint");
                }
            }
        }

        tracing::error!(tried = len, "No reachable endpoint");
        Err(RpcError::NoReachableEndpoint { tried: len, last_endpoint: last_tried })
    }

    /// Rotate away from `expected`, unless another caller already did.
    pub async fn rotate_from(&self, expected: &Endpoint) -> Result<Endpoint, RpcError> {
        let current = self.current_endpoint();
        if current != *expected {
            return Ok(current);
        }
        self.rotate().await
    }

    /// Start on the first endpoint, in configured order, that answers a liveness probe.
    pub async fn connect(&self) -> Result<Endpoint, RpcError> {
        let mut last_tried = String::new();
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            last_tried = endpoint.url().to_string();
            match self.verify(endpoint).await {
                Ok(()) => {
                    self.active.store(index, Ordering::Release);
                    tracing::info!(endpoint = %endpoint, "Connected");
                    return Ok(endpoint.clone());
                }
                Err(error) => {
                    tracing::warn!(endpoint = %endpoint, error = %error, "Failed to connect");
                }
            }
        }
        Err(RpcError::NoReachableEndpoint { tried: self.endpoints.len(), last_endpoint: last_tried })
    }

    /// Send `call` to the active endpoint bypassing breakers, bounded by the request timeout.
    pub(crate) async fn perform_direct(&self, call: &RpcCall) -> Result<serde_json::Value, RpcError> {
        let endpoint = self.current_endpoint();
        self.timeout
            .run(self.transport.perform(&endpoint, call))
            .await
            .map_err(|e| RpcError::from_transport(endpoint.url(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::clock::ManualClock;
    use crate::metrics::Metrics;
    use crate::testing::ScriptedTransport;
    use std::time::Duration;

    const A: &str = "https://a.example";
    const B: &str = "https://b.example";
    const C: &str = "https://c.example";

    fn manager(urls: &[&str], threshold: usize) -> (EndpointManager, ScriptedTransport) {
        let urls: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
        let config = CircuitBreakerConfig::new(threshold, Duration::from_secs(60), 1)
            .expect("valid config");
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            urls.iter().map(String::as_str),
            &config,
            Arc::new(ManualClock::new()),
            Arc::new(Metrics::new()),
        ));
        let transport = ScriptedTransport::new();
        let manager = EndpointManager::new(
            &urls,
            breakers,
            Arc::new(transport.clone()),
            RequestTimeout::new(Duration::from_secs(30)).expect("valid timeout"),
        )
        .expect("non-empty list");
        (manager, transport)
    }

    #[test]
    fn empty_list_is_rejected() {
        let config = CircuitBreakerConfig::default();
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            [],
            &config,
            Arc::new(ManualClock::new()),
            Arc::new(Metrics::new()),
        ));
        let result = EndpointManager::new(
            &[],
            breakers,
            Arc::new(ScriptedTransport::new()),
            RequestTimeout::new(Duration::from_secs(1)).expect("valid timeout"),
        );
        assert!(matches!(result, Err(ConfigError::NoEndpoints)));
    }

    #[tokio::test]
    async fn rotate_moves_to_next_reachable_endpoint() {
        let (manager, transport) = manager(&[A, B, C], 5);
        assert_eq!(manager.current_endpoint().url(), A);

        transport.set_reachable(B, false);
        let next = manager.rotate().await.expect("C is reachable");
        assert_eq!(next.url(), C);
        assert_eq!(next.ordinal(), 2);
        assert_eq!(manager.current_endpoint().url(), C);
        assert_eq!(transport.probe_count(B), 1);
    }

    #[tokio::test]
    async fn rotate_wraps_around() {
        let (manager, _transport) = manager(&[A, B], 5);
        manager.rotate().await.expect("B reachable");
        let back = manager.rotate().await.expect("A reachable");
        assert_eq!(back.url(), A);
    }

    #[tokio::test]
    async fn open_candidate_is_skipped_without_a_probe() {
        let (manager, transport) = manager(&[A, B, C], 1);
        transport.set_reachable(B, false);
        manager.rotate().await.expect("C reachable");
        assert_eq!(
            manager.breakers().get(B).map(|b| b.state()),
            Some(CircuitState::Open),
            "failed probe counts against the candidate's breaker"
        );

        // From C, the next candidate is A, which is fine; rotate again to reach B's turn.
        manager.rotate().await.expect("A reachable");
        let probes_before = transport.probe_count(B);
        let next = manager.rotate().await.expect("C reachable");
        assert_eq!(next.url(), C);
        assert_eq!(transport.probe_count(B), probes_before);
    }

    #[tokio::test]
    async fn unreachable_cycle_reports_connection_failure() {
        let (manager, transport) = manager(&[A, B], 5);
        transport.set_reachable(A, false).set_reachable(B, false);
        match manager.rotate().await {
            Err(RpcError::NoReachableEndpoint { tried, last_endpoint }) => {
                assert_eq!(tried, 2);
                assert_eq!(last_endpoint, A);
            }
            other => panic!("expected NoReachableEndpoint, got {other:?}"),
        }
        assert_eq!(manager.current_endpoint().url(), A, "pointer unchanged on failure");
    }

    #[tokio::test]
    async fn connect_picks_first_reachable_in_order() {
        let (manager, transport) = manager(&[A, B, C], 5);
        transport.set_reachable(A, false);
        let endpoint = manager.connect().await.expect("B reachable");
        assert_eq!(endpoint.url(), B);
        assert_eq!(manager.current_endpoint().url(), B);
        assert_eq!(transport.probe_count(C), 0);
    }
}
