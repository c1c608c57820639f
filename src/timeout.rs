//! Per-request timeout applied to every transport call and probe.

use crate::error::TransportError;
use std::future::Future;
use std::time::{Duration, Instant};

/// Errors from timeout construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("request timeout must be non-zero and finite (got {0:?})")]
    InvalidDuration(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct RequestTimeout {
    duration: Duration,
}

impl RequestTimeout {
    pub fn new(duration: Duration) -> Result<Self, TimeoutError> {
        if duration.is_zero() || duration == Duration::MAX {
            return Err(TimeoutError::InvalidDuration(duration));
        }
        Ok(Self { duration })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run `fut`, turning expiry into `TransportError::Timeout`.
    pub async fn run<T, Fut>(&self, fut: Fut) -> Result<T, TransportError>
    where
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let start = Instant::now();
        match tokio::time::timeout(self.duration, fut).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout { elapsed: start.elapsed() }),
        }
    }

    /// Like [`run`](Self::run) for probes: expiry reads as unreachable.
    pub async fn probe<Fut>(&self, fut: Fut) -> bool
    where
        Fut: Future<Output = bool>,
    {
        tokio::time::timeout(self.duration, fut).await.unwrap_or(false)
    }
}
