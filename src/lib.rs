#![forbid(unsafe_code)]
#![cfg_attr(not(test), warn(clippy::all))]

//! # lifeline
//!
//! Resilient JSON-RPC client core for Base and other EVM chains: a TTL result cache, a
//! client-wide token bucket, per-endpoint circuit breakers, bounded retry with backoff, and
//! endpoint failover, all in front of a pluggable [`Transport`].
//!
//! ## Features
//!
//! - **TTL cache** keyed by a SHA-256 fingerprint of method and canonical arguments
//! - **Token bucket** rate limiting that fails fast instead of queueing
//! - **Circuit breakers** per endpoint with half-open recovery
//! - **Retry policies** with power backoff and optional jitter; writes are never blindly resent
//! - **Failover** across an ordered endpoint list, verified by liveness probes
//! - **Metrics** with per-operation latency percentiles and cache hit ratio
//!
//! ## Quick Start
//!
//! [`testing::ScriptedTransport`] is available with the `testing` feature.
//!
//! ```rust
//! use lifeline::testing::ScriptedTransport;
//! use lifeline::{ClientConfig, RpcClient};
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let transport = ScriptedTransport::new();
//! transport.always("https://rpc.example", Ok(json!("0x2105")));
//!
//! let config = ClientConfig::builder().endpoints(["https://rpc.example"]).build().unwrap();
//! let client = RpcClient::builder(config, transport).build().unwrap();
//!
//! assert_eq!(client.chain_id().await.unwrap(), 8453);
//! # });
//! ```

pub mod backoff;
pub mod cache;
pub mod call;
pub mod circuit_breaker;
pub mod circuit_breaker_registry;
pub mod client;
pub mod clock;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod eth;
pub mod jitter;
pub mod logging;
pub mod metrics;
pub mod prelude;
pub mod rate_limit;
pub mod retry;
pub mod sleeper;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod timeout;
pub mod transport;

// Re-exports
pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use cache::{CacheKey, TtlCache};
pub use call::{CallKind, RpcCall};
pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
};
pub use circuit_breaker_registry::{BreakerRegistryError, CircuitBreakerRegistry};
pub use client::{ConnectError, HealthSnapshot, HealthStatus, RpcClient, RpcClientBuilder};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError, Network};
pub use endpoint::{Endpoint, EndpointManager};
pub use error::{ErrorKind, RpcError, TransportError};
pub use eth::BlockTag;
pub use jitter::Jitter;
pub use logging::{enable_verbose_logging, set_log_level, LoggingError};
pub use metrics::{Metrics, MetricsSnapshot, OperationSnapshot};
pub use rate_limit::{Decision, RateLimitError, RateLimiter, TokenBucket};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use timeout::{RequestTimeout, TimeoutError};
pub use transport::Transport;
pub use tracing_subscriber::filter::LevelFilter;
