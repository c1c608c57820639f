//! The client façade every public operation funnels through.
//!
//! A call passes through the layers in a fixed order:
//!
//! 1. **Cache**: cacheable reads are answered from the TTL cache when possible.
//! 2. **Rate limiter**: one token per call that reaches the network, denied immediately when
//!    the bucket is empty.
//! 3. **Circuit breaker** of the active endpoint: rejects without a network attempt while open.
//! 4. **Retry policy**: repeats transient failures on the same endpoint with backoff. Writes are
//!    only resent when the request provably never left the client.
//! 5. **Transport**, bounded by the request timeout, with one metrics record per attempt.
//!
//! After the call settles the client decides about failover: an open breaker on the active
//! endpoint, or `rotate_after` consecutive exhausted calls against it, rotate to the next
//! reachable endpoint. The failed call is not replayed; the next call uses the new endpoint.

use crate::cache::TtlCache;
use crate::call::RpcCall;
use crate::circuit_breaker::{BreakerSnapshot, CircuitState};
use crate::circuit_breaker_registry::{BreakerRegistryError, CircuitBreakerRegistry};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{ClientConfig, ConfigError};
use crate::endpoint::{Endpoint, EndpointManager};
use crate::error::RpcError;
use crate::eth;
use crate::logging::{self, LoggingError};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::rate_limit::{Decision, RateLimiter, TokenBucket};
use crate::retry::RetryPolicy;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::timeout::RequestTimeout;
use crate::transport::Transport;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tower_service::Service;
use tracing_subscriber::filter::LevelFilter;

/// Errors from [`RpcClientBuilder::connect`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Overall health derived from connectivity and breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Connected and every breaker closed.
    Healthy,
    /// Connected, but at least one endpoint's breaker is not closed.
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub connected: bool,
    pub status: HealthStatus,
    pub chain_id: Option<u64>,
    pub active_endpoint: String,
    pub block_number: Option<u64>,
    /// Wall-clock time of the snapshot, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub breakers: Vec<BreakerSnapshot>,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Default)]
struct ExhaustionStreak {
    ordinal: usize,
    count: usize,
}

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    cache: TtlCache<Value>,
    limiter: Arc<dyn RateLimiter>,
    endpoints: EndpointManager,
    breakers: Arc<CircuitBreakerRegistry>,
    retry: RetryPolicy,
    write_retry: RetryPolicy,
    transport: Arc<dyn Transport>,
    timeout: RequestTimeout,
    metrics: Arc<Metrics>,
    streak: Mutex<ExhaustionStreak>,
}

/// Resilient JSON-RPC client. Clones share all state.
#[derive(Debug, Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

/// Builder for [`RpcClient`]. Collaborators default to production implementations.
pub struct RpcClientBuilder {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    clock: Option<Arc<dyn Clock>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    metrics: Option<Arc<Metrics>>,
}

impl RpcClientBuilder {
    /// Time source for the cache, the token bucket and the breakers.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Sleeper for retry backoff.
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Some(Arc::new(sleeper));
        self
    }

    /// Replace the token bucket built from the config.
    pub fn with_rate_limiter<L: RateLimiter + 'static>(mut self, limiter: L) -> Self {
        self.rate_limiter = Some(Arc::new(limiter));
        self
    }

    /// Share a metrics sink with other clients.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Assemble the client without touching the network. Calls start on the first endpoint.
    pub fn build(self) -> Result<RpcClient, ConfigError> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::default()));
        let sleeper = self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper));
        let metrics = self.metrics.unwrap_or_default();
        let limiter: Arc<dyn RateLimiter> = match self.rate_limiter {
            Some(limiter) => limiter,
            None => Arc::new(TokenBucket::with_clock(
                config.rate_limit_requests(),
                config.rate_limit_window(),
                clock.clone(),
            )?),
        };

        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.endpoints().iter().map(String::as_str),
            config.breaker(),
            clock.clone(),
            metrics.clone(),
        ));
        let timeout = config.request_timeout();
        let endpoints = EndpointManager::new(
            config.endpoints(),
            breakers.clone(),
            self.transport.clone(),
            timeout,
        )?;
        let retry = RetryPolicy::builder()
            .max_retries(config.max_retries())
            .backoff(config.backoff().clone())
            .with_jitter(config.jitter())
            .with_shared_sleeper(sleeper)
            .build();
        let write_retry = retry.for_writes();

        tracing::debug!(
            chain_id = config.chain_id(),
            endpoints = config.endpoints().len(),
            "Client built"
        );
        Ok(RpcClient {
            inner: Arc::new(Inner {
                cache: TtlCache::new(config.cache_ttl(), clock),
                config,
                limiter,
                endpoints,
                breakers,
                retry,
                write_retry,
                transport: self.transport,
                timeout,
                metrics,
                streak: Mutex::new(ExhaustionStreak::default()),
            }),
        })
    }

    /// Build, then start on the first endpoint in configured order that answers a probe.
    pub async fn connect(self) -> Result<RpcClient, ConnectError> {
        let client = self.build()?;
        client.inner.endpoints.connect().await?;
        Ok(client)
    }
}

impl RpcClient {
    pub fn builder<T: Transport + 'static>(config: ClientConfig, transport: T) -> RpcClientBuilder {
        Self::builder_shared(config, Arc::new(transport))
    }

    pub fn builder_shared(config: ClientConfig, transport: Arc<dyn Transport>) -> RpcClientBuilder {
        RpcClientBuilder {
            config,
            transport,
            clock: None,
            sleeper: None,
            rate_limiter: None,
            metrics: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn current_endpoint(&self) -> Endpoint {
        self.inner.endpoints.current_endpoint()
    }

    /// Call `method` as a read; `cacheable` says whether its result may be cached.
    pub async fn call(&self, method: &str, params: Value, cacheable: bool) -> Result<Value, RpcError> {
        self.execute(RpcCall::read(method, params).with_cacheable(cacheable)).await
    }

    /// Run `call` through cache, rate limiter, breaker, retry and transport.
    pub async fn execute(&self, call: RpcCall) -> Result<Value, RpcError> {
        self.execute_decoded(&call, |value| Ok(value.clone())).await
    }

    /// Like [`execute`](Self::execute), decoding the answer with `decode` before it is cached.
    ///
    /// Answers that fail to decode are never cached; they surface as
    /// [`RpcError::MalformedResponse`] naming the endpoint that sent them. A cached answer that
    /// no longer decodes is dropped and fetched again.
    pub(crate) async fn execute_decoded<T, F>(&self, call: &RpcCall, decode: F) -> Result<T, RpcError>
    where
        F: Fn(&Value) -> Result<T, String>,
    {
        if !call.is_cacheable() {
            let (value, endpoint) = self.protected(call).await?;
            return decode(&value).map_err(|message| malformed(&endpoint, call, message));
        }
        let key = call.fingerprint();
        if let Some(value) = self.inner.cache.get(&key) {
            if let Ok(decoded) = decode(&value) {
                self.inner.metrics.record_cache_hit();
                tracing::trace!(method = call.method(), "Cache hit");
                return Ok(decoded);
            }
            self.inner.cache.remove(&key);
        }
        self.inner.metrics.record_cache_miss();
        let (value, endpoint) = self.protected(call).await?;
        let decoded = decode(&value).map_err(|message| malformed(&endpoint, call, message))?;
        self.inner.cache.set(key, value);
        Ok(decoded)
    }

    async fn protected(&self, call: &RpcCall) -> Result<(Value, Endpoint), RpcError> {
        if let Decision::Denied { wait } = self.inner.limiter.try_acquire() {
            return Err(RpcError::RateLimited { wait });
        }

        let endpoint = self.inner.endpoints.current_endpoint();
        let policy = if call.is_write() { &self.inner.write_retry } else { &self.inner.retry };
        let run = || policy.execute(|| self.attempt(&endpoint, call));
        let result = match self.inner.breakers.get(endpoint.url()) {
            Some(breaker) => breaker.call(run).await,
            None => run().await,
        };
        let value = self.settle(&endpoint, result).await?;
        Ok((value, endpoint))
    }

    async fn attempt(&self, endpoint: &Endpoint, call: &RpcCall) -> Result<Value, RpcError> {
        let start = Instant::now();
        let result = self
            .inner
            .timeout
            .run(self.inner.transport.perform(endpoint, call))
            .await
            .map_err(|e| RpcError::from_transport(endpoint.url(), e));
        self.inner.metrics.record_call(call.method(), start.elapsed(), result.is_ok(), endpoint.url());
        result
    }

    /// Failover bookkeeping after a protected call against `endpoint` finished.
    async fn settle(
        &self,
        endpoint: &Endpoint,
        result: Result<Value, RpcError>,
    ) -> Result<Value, RpcError> {
        let rotate = match &result {
            Ok(_) => {
                self.record_streak(endpoint, false);
                false
            }
            Err(RpcError::CircuitOpen { .. }) => {
                // The breaker-open error is surfaced even when no other endpoint is reachable.
                if let Err(error) = self.inner.endpoints.rotate_from(endpoint).await {
                    tracing::warn!(endpoint = %endpoint, error = %error, "Rotation after open breaker failed");
                }
                false
            }
            Err(error) if error.is_retryable() => self.record_streak(endpoint, true),
            // The endpoint answered, so it is alive.
            Err(RpcError::Rejected { .. } | RpcError::MalformedResponse { .. }) => {
                self.record_streak(endpoint, false);
                false
            }
            Err(_) => false,
        };
        if rotate {
            self.inner.endpoints.rotate_from(endpoint).await?;
        }
        result
    }

    /// Track consecutive exhausted calls on `endpoint`; true when it is time to rotate away.
    fn record_streak(&self, endpoint: &Endpoint, exhausted: bool) -> bool {
        let mut streak = self.inner.streak.lock().unwrap_or_else(PoisonError::into_inner);
        if streak.ordinal != endpoint.ordinal() {
            *streak = ExhaustionStreak { ordinal: endpoint.ordinal(), count: 0 };
        }
        if !exhausted {
            streak.count = 0;
            return false;
        }
        streak.count += 1;
        if streak.count >= self.inner.config.rotate_after() {
            tracing::warn!(
                endpoint = %endpoint,
                exhaustions = streak.count,
                "Consecutive failures, rotating endpoint"
            );
            streak.count = 0;
            return true;
        }
        false
    }

    /// Move to the next reachable endpoint now.
    pub async fn rotate_endpoint(&self) -> Result<Endpoint, RpcError> {
        self.inner.endpoints.rotate().await
    }

    /// Probe the active endpoint directly, bypassing cache, rate limiter and breakers.
    pub async fn health_snapshot(&self) -> HealthSnapshot {
        let endpoints = &self.inner.endpoints;
        let active_endpoint = endpoints.current_endpoint().url().to_string();
        let chain_id = endpoints
            .perform_direct(&eth::chain_id())
            .await
            .map(|value| eth::parse_quantity(&value).ok().and_then(|id| u64::try_from(id).ok()));
        let connected = chain_id.is_ok();
        let block_number = if connected {
            endpoints
                .perform_direct(&eth::block_number())
                .await
                .ok()
                .and_then(|value| eth::parse_quantity(&value).ok())
                .and_then(|n| u64::try_from(n).ok())
        } else {
            None
        };
        let breakers = self.inner.breakers.snapshot();
        let status = if !connected {
            HealthStatus::Unhealthy
        } else if breakers.iter().all(|b| b.state == CircuitState::Closed) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        if !connected {
            tracing::warn!(endpoint = %active_endpoint, "Health check failed");
        }
        HealthSnapshot {
            connected,
            status,
            chain_id: chain_id.ok().flatten(),
            active_endpoint,
            block_number,
            timestamp_ms,
            breakers,
            metrics: self.inner.metrics.snapshot(),
        }
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.inner.metrics.reset();
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    pub fn breaker_snapshot(&self) -> Vec<BreakerSnapshot> {
        self.inner.breakers.snapshot()
    }

    pub fn reset_breaker(&self, endpoint: &str) -> Result<(), BreakerRegistryError> {
        self.inner.breakers.reset(endpoint)
    }

    pub fn reset_breakers(&self) {
        self.inner.breakers.reset_all();
    }

    /// See [`logging::set_log_level`].
    pub fn set_log_level(&self, level: LevelFilter) -> Result<(), LoggingError> {
        logging::set_log_level(level)
    }

    /// See [`logging::enable_verbose_logging`].
    pub fn enable_verbose_logging(&self) -> Result<(), LoggingError> {
        logging::enable_verbose_logging()
    }
}

fn malformed(endpoint: &Endpoint, call: &RpcCall, message: String) -> RpcError {
    tracing::warn!(endpoint = %endpoint, method = call.method(), %message, "Malformed response");
    RpcError::MalformedResponse {
        endpoint: endpoint.url().to_string(),
        method: call.method().to_string(),
        message,
    }
}

impl Service<RpcCall> for RpcClient {
    type Response = Value;
    type Error = RpcError;
    type Future = BoxFuture<'static, Result<Value, RpcError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Back-pressure is the rate limiter's job, and it answers per call.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: RpcCall) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.execute(call).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TransportError;
    use crate::sleeper::InstantSleeper;
    use crate::testing::ScriptedTransport;
    use serde_json::json;
    use std::time::Duration;

    const A: &str = "https://a.example";
    const B: &str = "https://b.example";

    fn client(config: ClientConfig) -> (RpcClient, ScriptedTransport, ManualClock) {
        let transport = ScriptedTransport::new();
        let clock = ManualClock::new();
        let client = RpcClient::builder(config, transport.clone())
            .with_clock(clock.clone())
            .with_sleeper(InstantSleeper)
            .build()
            .expect("valid client");
        (client, transport, clock)
    }

    fn config() -> crate::config::ClientConfigBuilder {
        ClientConfig::builder().endpoints([A, B]).max_retries(1)
    }

    #[tokio::test]
    async fn cache_hit_skips_the_network() {
        let (client, transport, clock) = client(config().build().expect("valid config"));
        transport.always(A, Ok(json!("0x2105")));

        assert_eq!(client.call("eth_chainId", json!([]), true).await, Ok(json!("0x2105")));
        assert_eq!(client.call("eth_chainId", json!([]), true).await, Ok(json!("0x2105")));
        assert_eq!(transport.calls_to(A), 1);

        let metrics = client.metrics_snapshot();
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.operation("eth_chainId").map(|op| op.count), Some(1));

        clock.advance(Duration::from_secs(10));
        client.call("eth_chainId", json!([]), true).await.expect("refetched");
        assert_eq!(transport.calls_to(A), 2);
    }

    #[tokio::test]
    async fn uncacheable_reads_always_hit_the_network() {
        let (client, transport, _clock) = client(config().build().expect("valid config"));
        transport.always(A, Ok(json!("0x10")));
        client.call("eth_blockNumber", json!([]), false).await.expect("ok");
        client.call("eth_blockNumber", json!([]), false).await.expect("ok");
        assert_eq!(transport.calls_to(A), 2);
        assert_eq!(client.metrics_snapshot().cache_misses, 0);
    }

    #[tokio::test]
    async fn failed_reads_are_not_cached() {
        let (client, transport, _clock) = client(config().max_retries(0).build().expect("valid"));
        transport
            .push(A, Err(TransportError::Rejected { code: -32000, message: "nope".into() }))
            .always(A, Ok(json!("0x1")));
        assert!(client.call("eth_gasPrice", json!([]), true).await.is_err());
        assert_eq!(client.call("eth_gasPrice", json!([]), true).await, Ok(json!("0x1")));
    }

    #[tokio::test]
    async fn rotates_after_consecutive_exhaustions() {
        let (client, transport, _clock) = client(config().build().expect("valid config"));
        transport.always(B, Ok(json!("0x1")));

        let first = client.call("eth_gasPrice", json!([]), false).await.unwrap_err();
        assert_eq!(first.endpoint(), Some(A));
        assert_eq!(client.current_endpoint().url(), A);

        let second = client.call("eth_gasPrice", json!([]), false).await.unwrap_err();
        assert!(second.is_retryable(), "the exhausted call still fails: {second:?}");
        assert_eq!(client.current_endpoint().url(), B);

        assert_eq!(client.call("eth_gasPrice", json!([]), false).await, Ok(json!("0x1")));
        assert_eq!(transport.calls_to(A), 4, "two calls, two attempts each");
    }

    #[tokio::test]
    async fn success_resets_the_exhaustion_streak() {
        let (client, transport, _clock) = client(config().build().expect("valid config"));
        transport
            .push(A, Err(TransportError::Connect("down".into())))
            .push(A, Err(TransportError::Connect("down".into())))
            .push(A, Ok(json!("0x1")))
            .push(A, Err(TransportError::Connect("down".into())))
            .push(A, Err(TransportError::Connect("down".into())));

        assert!(client.call("eth_gasPrice", json!([]), false).await.is_err());
        assert!(client.call("eth_gasPrice", json!([]), false).await.is_ok());
        assert!(client.call("eth_gasPrice", json!([]), false).await.is_err());
        assert_eq!(client.current_endpoint().url(), A);
    }

    #[tokio::test]
    async fn failed_rotation_surfaces_no_reachable_endpoint() {
        let (client, transport, _clock) =
            client(config().max_retries(0).rotate_after(1).build().expect("valid"));
        transport.set_reachable(A, false).set_reachable(B, false);
        match client.call("eth_gasPrice", json!([]), false).await {
            Err(RpcError::NoReachableEndpoint { tried, .. }) => assert_eq!(tried, 2),
            other => panic!("expected NoReachableEndpoint, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejections_neither_retry_nor_rotate() {
        let (client, transport, _clock) =
            client(config().max_retries(3).rotate_after(1).build().expect("valid"));
        transport.always(
            A,
            Err(TransportError::Rejected { code: 3, message: "execution reverted".into() }),
        );
        let err = client.call("eth_call", json!([]), false).await.unwrap_err();
        assert_eq!(
            err,
            RpcError::Rejected {
                endpoint: A.into(),
                code: 3,
                message: "execution reverted".into()
            }
        );
        assert_eq!(transport.calls_to(A), 1);
        assert_eq!(client.current_endpoint().url(), A);
    }

    #[tokio::test]
    async fn answered_calls_reset_the_exhaustion_streak() {
        let (client, transport, _clock) =
            client(config().max_retries(0).rotate_after(2).build().expect("valid"));
        transport
            .push(A, Err(TransportError::Connect("down".into())))
            .push(A, Err(TransportError::Rejected { code: 3, message: "reverted".into() }))
            .push(A, Err(TransportError::Connect("down".into())))
            .push(A, Ok(json!("garbage")))
            .push(A, Err(TransportError::Connect("down".into())))
            .always(B, Ok(json!("0x1")));

        assert!(client.call("eth_gasPrice", json!([]), false).await.is_err());
        assert!(matches!(
            client.call("eth_call", json!([]), false).await,
            Err(RpcError::Rejected { .. })
        ));
        assert!(client.call("eth_gasPrice", json!([]), false).await.is_err());
        assert_eq!(client.current_endpoint().url(), A);

        assert!(matches!(client.chain_id().await, Err(RpcError::MalformedResponse { .. })));
        assert!(client.call("eth_gasPrice", json!([]), false).await.is_err());
        assert_eq!(client.current_endpoint().url(), A);
        assert_eq!(transport.calls_to(B), 0);
    }

    #[tokio::test]
    async fn malformed_answers_are_not_cached() {
        let (client, transport, _clock) = client(config().build().expect("valid config"));
        transport.push(A, Ok(json!("garbage"))).always(A, Ok(json!("0x2105")));

        assert!(matches!(client.chain_id().await, Err(RpcError::MalformedResponse { .. })));
        assert_eq!(client.chain_id().await, Ok(8453));
        assert_eq!(transport.calls_to(A), 2);

        assert_eq!(client.chain_id().await, Ok(8453));
        assert_eq!(transport.calls_to(A), 2, "the good answer is cached");
        assert_eq!(client.metrics_snapshot().cache_hits, 1);
    }

    #[tokio::test]
    async fn undecodable_cached_value_is_refetched() {
        let (client, transport, _clock) = client(config().build().expect("valid config"));
        transport.push(A, Ok(json!("garbage"))).always(A, Ok(json!("0x2105")));

        // The untyped path caches whatever the node said.
        assert_eq!(client.call("eth_chainId", json!([]), true).await, Ok(json!("garbage")));
        assert_eq!(client.chain_id().await, Ok(8453));
        assert_eq!(transport.calls_to(A), 2);
        assert_eq!(client.call("eth_chainId", json!([]), true).await, Ok(json!("0x2105")));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_response_names_the_endpoint_that_answered() {
        let (client, transport, _clock) = client(config().build().expect("valid config"));
        transport.set_latency(A, Duration::from_secs(1)).always(A, Ok(json!("garbage")));

        let in_flight = tokio::spawn({
            let client = client.clone();
            async move { client.chain_id().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let rotated = client.rotate_endpoint().await.expect("B reachable");
        assert_eq!(rotated.url(), B);

        match in_flight.await.expect("task") {
            Err(RpcError::MalformedResponse { endpoint, method, .. }) => {
                assert_eq!(endpoint, A);
                assert_eq!(method, "eth_chainId");
            }
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
        assert_eq!(client.current_endpoint().url(), B);
    }

    #[tokio::test]
    async fn service_call_runs_the_pipeline() {
        use tower::ServiceExt;

        let (client, transport, _clock) = client(config().build().expect("valid config"));
        transport.always(A, Ok(json!("0x2105")));
        let value = client.clone().oneshot(eth::chain_id()).await.expect("ok");
        assert_eq!(value, json!("0x2105"));
        assert_eq!(client.metrics_snapshot().cache_misses, 1);
    }

    #[tokio::test]
    async fn connect_starts_on_first_reachable_endpoint() {
        let transport = ScriptedTransport::new();
        transport.set_reachable(A, false);
        let client = RpcClient::builder(config().build().expect("valid"), transport.clone())
            .with_sleeper(InstantSleeper)
            .connect()
            .await
            .expect("B reachable");
        assert_eq!(client.current_endpoint().url(), B);

        transport.set_reachable(B, false);
        let err = RpcClient::builder(config().build().expect("valid"), transport)
            .connect()
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Rpc(RpcError::NoReachableEndpoint { .. })));
    }
}
