//! Retry policy for a single logical call against one endpoint.
//!
//! Semantics:
//! - `max_retries` counts retries, so a permanently failing call is attempted
//!   `max_retries + 1` times.
//! - Between attempt `i` and `i + 1` (zero-indexed) the policy sleeps `backoff.delay(i)`, passed
//!   through the configured jitter.
//! - `should_retry` decides whether an error is worth another attempt; by default only transient
//!   transport failures are. Anything else propagates immediately, without sleeping.
//! - After the last attempt the final error propagates unchanged.
//!
//! Retries never leave the current endpoint. Rotation is decided by the client.
//!
//! ```rust
//! use std::time::Duration;
//! use lifeline::{Backoff, InstantSleeper, RetryPolicy, RpcError};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let policy = RetryPolicy::builder()
//!     .max_retries(2)
//!     .backoff(Backoff::constant(Duration::from_millis(100)))
//!     .with_sleeper(InstantSleeper)
//!     .build();
//! let result: Result<(), RpcError> =
//!     policy.execute(|| async { Err(RpcError::Validation("nope".into())) }).await;
//! assert!(result.is_err());
//! # });
//! ```

use crate::backoff::Backoff;
use crate::error::RpcError;
use crate::jitter::Jitter;
use crate::sleeper::{Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

type RetryPredicate = Arc<dyn Fn(&RpcError) -> bool + Send + Sync>;

/// Retry policy combining backoff, jitter, predicate, and sleeper.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: RetryPredicate,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("sleeper", &self.sleeper)
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicyBuilder::new().build()
    }
}

impl RetryPolicy {
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Same schedule, but only failures that provably never reached the endpoint are retried.
    /// Used for state-mutating calls, which must not be broadcast twice.
    pub fn for_writes(&self) -> Self {
        Self { should_retry: Arc::new(RpcError::is_safe_to_resend), ..self.clone() }
    }

    /// Execute an async operation with retry semantics.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, RpcError>
    where
        Fut: Future<Output = Result<T, RpcError>>,
        Op: FnMut() -> Fut,
    {
        let mut attempt = 0usize;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !(self.should_retry)(&error) {
                return Err(error);
            }
            if attempt >= self.max_retries {
                tracing::warn!(
                    attempts = attempt + 1,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(error);
            }

            let delay = self.jitter.apply(self.backoff.delay(attempt));
            tracing::debug!(
                attempt = attempt + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Retrying after transient failure"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder {
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: RetryPredicate,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicyBuilder {
    /// Three retries, `2^i` seconds apart, no jitter, transient transport failures only.
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::power(2.0)
                .unwrap_or_else(|_| Backoff::constant(Duration::from_secs(1))),
            jitter: Jitter::None,
            should_retry: Arc::new(RpcError::is_retryable),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Retries after the first attempt. Zero disables retrying.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Predicate to decide if an error is retryable.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RpcError) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_shared_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
        }
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
