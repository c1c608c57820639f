//! Backoff schedules for retry policies.
//!
//! Retry index semantics: `delay(i)` is the pause between attempt `i` and attempt `i + 1`, with
//! `i` zero-indexed. The default power schedule therefore sleeps `unit · base^0`, then
//! `unit · base^1`, and so on:
//!
//! ```rust
//! use std::time::Duration;
//! use lifeline::Backoff;
//!
//! let backoff = Backoff::power(2.0).unwrap();
//! assert_eq!(backoff.delay(0), Duration::from_secs(1));
//! assert_eq!(backoff.delay(1), Duration::from_secs(2));
//! assert_eq!(backoff.delay(2), Duration::from_secs(4));
//! ```
//!
//! Computations that overflow or produce non-finite values saturate to `MAX_BACKOFF`.

use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackoffError {
    #[error("backoff base must be finite and > 0 (got {0})")]
    InvalidBase(f64),
    #[error("with_max is only valid for power backoff")]
    ConstantDoesNotSupportMax,
    #[error("max must be greater than zero")]
    MaxMustBePositive,
}

#[derive(Debug, Clone, PartialEq)]
enum BackoffKind {
    Constant { delay: Duration },
    Power { base: f64, unit: Duration, max: Option<Duration> },
}

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant { delay } }
    }

    /// `base^i` seconds before retry `i`.
    pub fn power(base: f64) -> Result<Self, BackoffError> {
        if !base.is_finite() || base <= 0.0 {
            return Err(BackoffError::InvalidBase(base));
        }
        Ok(Self { kind: BackoffKind::Power { base, unit: Duration::from_secs(1), max: None } })
    }

    /// Scale a power schedule by `unit` instead of one second. Ignored for constant schedules.
    pub fn with_unit(mut self, unit: Duration) -> Self {
        if let BackoffKind::Power { unit: existing, .. } = &mut self.kind {
            *existing = unit;
        }
        self
    }

    /// Cap a power schedule at `max`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Power { max: existing, .. } => {
                *existing = Some(max);
                Ok(self)
            }
            BackoffKind::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMax),
        }
    }

    /// Delay after the failed attempt `retry` (zero-indexed).
    pub fn delay(&self, retry: usize) -> Duration {
        match &self.kind {
            BackoffKind::Constant { delay } => (*delay).min(MAX_BACKOFF),
            BackoffKind::Power { base, unit, max } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let secs = unit.as_secs_f64() * base.powi(exponent);
                let delay = Duration::try_from_secs_f64(secs).unwrap_or(MAX_BACKOFF);
                let capped = max.map(|m| delay.min(m)).unwrap_or(delay);
                capped.min(MAX_BACKOFF)
            }
        }
    }
}
