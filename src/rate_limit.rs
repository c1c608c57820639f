//! Client-wide token bucket.
//!
//! The bucket holds up to `capacity` tokens and refills continuously at `capacity / window`.
//! Acquisition never waits: when less than one token is available the caller gets
//! [`Decision::Denied`] with the time until the next token, and decides what to do with it.

use crate::clock::{Clock, MonotonicClock};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The request may proceed.
    Allowed {
        /// Whole tokens left after this acquisition.
        remaining: u32,
    },
    /// The request is denied.
    Denied {
        /// Time until one token is available again.
        wait: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Errors produced when validating limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit capacity must be > 0")]
    ZeroCapacity,
    #[error("rate limit window must be > 0")]
    ZeroWindow,
}

/// Core interface for rate limiting logic.
pub trait RateLimiter: Send + Sync + std::fmt::Debug {
    /// Take one permit, atomically with respect to other callers.
    fn try_acquire(&self) -> Decision;
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill_ms: u64,
}

/// Token bucket that starts full.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    window: Duration,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// `capacity` requests per `window`.
    pub fn new(capacity: u32, window: Duration) -> Result<Self, RateLimitError> {
        Self::with_clock(capacity, window, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(
        capacity: u32,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RateLimitError> {
        if capacity == 0 {
            return Err(RateLimitError::ZeroCapacity);
        }
        if window.is_zero() {
            return Err(RateLimitError::ZeroWindow);
        }
        let capacity = f64::from(capacity);
        let state = BucketState { tokens: capacity, last_refill_ms: clock.now_millis() };
        Ok(Self { capacity, window, state: Mutex::new(state), clock })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Tokens currently available, after refill.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = self.clock.now_millis();
        let elapsed_ms = now.saturating_sub(state.last_refill_ms) as f64;
        let window_ms = self.window.as_secs_f64() * 1000.0;
        state.tokens = (state.tokens + elapsed_ms / window_ms * self.capacity).min(self.capacity);
        state.last_refill_ms = now.max(state.last_refill_ms);
    }
}

impl RateLimiter for TokenBucket {
    fn try_acquire(&self) -> Decision {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Decision::Allowed { remaining: state.tokens as u32 }
        } else {
            let missing = 1.0 - state.tokens;
            let wait_secs = missing * self.window.as_secs_f64() / self.capacity;
            let wait = Duration::try_from_secs_f64(wait_secs).unwrap_or(self.window);
            tracing::warn!(wait_ms = wait.as_millis() as u64, "Rate limit exceeded");
            Decision::Denied { wait }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn bucket(capacity: u32, window: Duration) -> (TokenBucket, ManualClock) {
        let clock = ManualClock::new();
        let bucket = TokenBucket::with_clock(capacity, window, Arc::new(clock.clone()))
            .expect("valid bucket");
        (bucket, clock)
    }

    #[test]
    fn third_immediate_acquire_is_denied() {
        let (bucket, _clock) = bucket(2, Duration::from_secs(60));
        assert_eq!(bucket.try_acquire(), Decision::Allowed { remaining: 1 });
        assert_eq!(bucket.try_acquire(), Decision::Allowed { remaining: 0 });
        match bucket.try_acquire() {
            Decision::Denied { wait } => assert_eq!(wait, Duration::from_secs(30)),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn refills_proportionally_to_elapsed_time() {
        let (bucket, clock) = bucket(2, Duration::from_secs(60));
        assert!(bucket.try_acquire().is_allowed());
        assert!(bucket.try_acquire().is_allowed());
        clock.advance(Duration::from_secs(29));
        assert!(!bucket.try_acquire().is_allowed());
        clock.advance(Duration::from_secs(2));
        assert!(bucket.try_acquire().is_allowed());
        assert!(!bucket.try_acquire().is_allowed());
    }

    #[test]
    fn never_exceeds_capacity() {
        let (bucket, clock) = bucket(3, Duration::from_secs(1));
        clock.advance(Duration::from_secs(3600));
        assert!((bucket.available() - 3.0).abs() < f64::EPSILON);
        let allowed = (0..10).filter(|_| bucket.try_acquire().is_allowed()).count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn concurrent_acquirers_cannot_overdraw() {
        let (bucket, _clock) = bucket(50, Duration::from_secs(60));
        let bucket = Arc::new(bucket);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = bucket.clone();
                std::thread::spawn(move || {
                    (0..20).filter(|_| bucket.try_acquire().is_allowed()).count()
                })
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().expect("thread finished")).sum();
        assert_eq!(total, 50);
        assert!(bucket.available() >= 0.0);
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert_eq!(
            TokenBucket::new(0, Duration::from_secs(1)).unwrap_err(),
            RateLimitError::ZeroCapacity
        );
        assert_eq!(TokenBucket::new(1, Duration::ZERO).unwrap_err(), RateLimitError::ZeroWindow);
    }
}
