//! Per-endpoint circuit breaker.
//!
//! Each configured endpoint gets its own breaker so that one unhealthy endpoint never blocks
//! calls routed to another. All transitions happen under the breaker's own lock, and the
//! admit/reject decision is taken in the same critical section that updates the state, so two
//! callers can never both claim the same half-open trial slot.
//!
//! Outcome classification:
//! - transient transport failures ([`RpcError::is_retryable`]) count as failures;
//! - successes, remote rejections and malformed responses prove the endpoint is alive and
//!   count as successes;
//! - anything else (validation, rate limiting) leaves the breaker untouched.

use crate::clock::Clock;
use crate::error::RpcError;
use crate::metrics::Metrics;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Short-circuits calls until the recovery timeout elapses.
    Open,
    /// Trial mode allowing a limited number of calls to test recovery.
    HalfOpen,
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("failure_threshold must be > 0 (got {provided})")]
    InvalidFailureThreshold { provided: usize },
    #[error("recovery_timeout must be > 0 (got {0:?})")]
    InvalidRecoveryTimeout(Duration),
    #[error("half_open_max_calls must be > 0 (got {provided})")]
    InvalidHalfOpenLimit { provided: usize },
}

/// Validated configuration for the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    failure_threshold: usize,
    recovery_timeout: Duration,
    half_open_max_calls: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a config with validation.
    ///
    /// `half_open_max_calls = 1` is the strict single-trial policy. Larger values relax it and
    /// let that many trial calls run concurrently while half-open.
    pub fn new(
        failure_threshold: usize,
        recovery_timeout: Duration,
        half_open_max_calls: usize,
    ) -> Result<Self, CircuitBreakerError> {
        if failure_threshold == 0 {
            return Err(CircuitBreakerError::InvalidFailureThreshold { provided: 0 });
        }
        if recovery_timeout.is_zero() {
            return Err(CircuitBreakerError::InvalidRecoveryTimeout(recovery_timeout));
        }
        if half_open_max_calls == 0 {
            return Err(CircuitBreakerError::InvalidHalfOpenLimit { provided: 0 });
        }
        Ok(Self { failure_threshold, recovery_timeout, half_open_max_calls })
    }

    /// Threshold before opening from Closed.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// Duration to stay Open before a half-open trial.
    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }

    /// Maximum concurrent calls while Half-Open.
    pub fn half_open_max_calls(&self) -> usize {
        self.half_open_max_calls
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub endpoint: String,
    pub state: CircuitState,
    pub failure_count: usize,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: usize,
    last_failure_ms: u64,
    trials_in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Neutral,
}

impl Outcome {
    fn of<T>(result: &Result<T, RpcError>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) if e.is_retryable() => Outcome::Failure,
            Err(RpcError::Rejected { .. } | RpcError::MalformedResponse { .. }) => Outcome::Success,
            Err(_) => Outcome::Neutral,
        }
    }
}

/// Circuit breaker guarding calls to a single endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

/// Admission ticket. Releases a half-open trial slot if the call is dropped mid-flight.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
}

impl Admission<'_> {
    fn complete(mut self, outcome: Outcome) {
        let trial = std::mem::replace(&mut self.trial, false);
        self.breaker.settle(outcome, trial);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.trial {
            let mut inner = self.breaker.lock();
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }
}

impl CircuitBreaker {
    pub fn new(
        endpoint: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_ms: 0,
                trials_in_flight: 0,
            }),
            clock,
            metrics,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> usize {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            endpoint: self.endpoint.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
        }
    }

    /// Force the breaker back to Closed with a zero failure count.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_ms = 0;
        tracing::info!(endpoint = %self.endpoint, "Circuit breaker reset");
    }

    /// Whether a call issued now would be rejected without reaching the endpoint.
    pub fn would_reject(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => !self.recovery_elapsed(&inner),
            CircuitState::HalfOpen => inner.trials_in_flight >= self.config.half_open_max_calls,
        }
    }

    /// Executes `operation` under breaker protection.
    ///
    /// # Behavior
    /// - **Closed**: runs the operation; consecutive failures increment the failure count and
    ///   the breaker opens once it reaches the threshold.
    /// - **Open**: rejects with [`RpcError::CircuitOpen`] until strictly more than the
    ///   recovery timeout has passed since the last failure, then moves to half-open.
    /// - **HalfOpen**: admits up to `half_open_max_calls` trials. Success closes the breaker,
    ///   failure reopens it.
    pub async fn call<T, Fut, Op>(&self, operation: Op) -> Result<T, RpcError>
    where
        Fut: Future<Output = Result<T, RpcError>>,
        Op: FnOnce() -> Fut,
    {
        let admission = self.admit()?;
        let result = operation().await;
        admission.complete(Outcome::of(&result));
        result
    }

    fn recovery_elapsed(&self, inner: &Inner) -> bool {
        let elapsed = self.clock.now_millis().saturating_sub(inner.last_failure_ms);
        u128::from(elapsed) > self.config.recovery_timeout.as_millis()
    }

    fn open_error(&self, inner: &Inner) -> RpcError {
        let elapsed = self.clock.now_millis().saturating_sub(inner.last_failure_ms);
        RpcError::CircuitOpen {
            endpoint: self.endpoint.clone(),
            failure_count: inner.failure_count,
            retry_in: self.config.recovery_timeout.saturating_sub(Duration::from_millis(elapsed)),
        }
    }

    fn admit(&self) -> Result<Admission<'_>, RpcError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission { breaker: self, trial: false }),
            CircuitState::Open => {
                if !self.recovery_elapsed(&inner) {
                    return Err(self.open_error(&inner));
                }
                inner.state = CircuitState::HalfOpen;
                inner.trials_in_flight = 1;
                tracing::info!(endpoint = %self.endpoint, "Circuit breaker → half-open");
                Ok(Admission { breaker: self, trial: true })
            }
            CircuitState::HalfOpen => {
                if inner.trials_in_flight >= self.config.half_open_max_calls {
                    return Err(self.open_error(&inner));
                }
                inner.trials_in_flight += 1;
                tracing::debug!(
                    endpoint = %self.endpoint,
                    in_flight = inner.trials_in_flight,
                    max = self.config.half_open_max_calls,
                    "Circuit breaker: half-open trial"
                );
                Ok(Admission { breaker: self, trial: true })
            }
        }
    }

    fn settle(&self, outcome: Outcome, trial: bool) {
        let mut tripped = false;
        {
            let mut inner = self.lock();
            if trial {
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
            }
            match (inner.state, outcome) {
                (_, Outcome::Neutral) => {}
                (CircuitState::HalfOpen, Outcome::Success) => {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    tracing::info!(endpoint = %self.endpoint, "Circuit breaker → closed");
                }
                (CircuitState::Closed, Outcome::Success) => inner.failure_count = 0,
                (CircuitState::HalfOpen, Outcome::Failure) => {
                    inner.state = CircuitState::Open;
                    inner.failure_count += 1;
                    inner.last_failure_ms = self.clock.now_millis();
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        failures = inner.failure_count,
                        "Circuit breaker: trial failed → open"
                    );
                }
                (CircuitState::Closed, Outcome::Failure) => {
                    inner.failure_count += 1;
                    inner.last_failure_ms = self.clock.now_millis();
                    if inner.failure_count >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        tripped = true;
                        tracing::error!(
                            endpoint = %self.endpoint,
                            failures = inner.failure_count,
                            threshold = self.config.failure_threshold,
                            "Circuit breaker → open"
                        );
                    }
                }
                // A call admitted while closed finished after another caller opened the breaker.
                (CircuitState::Open, Outcome::Failure) => {
                    inner.failure_count += 1;
                    inner.last_failure_ms = self.clock.now_millis();
                }
                (CircuitState::Open, Outcome::Success) => {}
            }
        }
        if tripped {
            self.metrics.record_breaker_trip();
        }
    }
}
