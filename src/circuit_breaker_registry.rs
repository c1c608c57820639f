//! Registry of the per-endpoint circuit breakers.
//!
//! The endpoint list is fixed when the client is built, so the registry is created once with one
//! breaker per endpoint and never grows. Lookups, resets and snapshots are keyed by URL.

use std::collections::HashMap;
use std::sync::Arc;

use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use crate::clock::Clock;
use crate::metrics::Metrics;

/// Errors from breaker registries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakerRegistryError {
    #[error("no circuit breaker for endpoint '{endpoint}'")]
    NotFound { endpoint: String },
}

#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// One breaker per URL in `endpoints`, all sharing `config`, `clock` and `metrics`.
    pub fn new<'a>(
        endpoints: impl IntoIterator<Item = &'a str>,
        config: &CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let breakers = endpoints
            .into_iter()
            .map(|url| {
                let breaker =
                    CircuitBreaker::new(url, config.clone(), clock.clone(), metrics.clone());
                (url.to_string(), Arc::new(breaker))
            })
            .collect();
        Self { breakers }
    }

    pub fn get(&self, endpoint: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(endpoint).cloned()
    }

    pub fn reset(&self, endpoint: &str) -> Result<(), BreakerRegistryError> {
        match self.breakers.get(endpoint) {
            Some(breaker) => {
                breaker.reset();
                Ok(())
            }
            None => Err(BreakerRegistryError::NotFound { endpoint: endpoint.to_string() }),
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.values() {
            breaker.reset();
        }
    }

    /// Breaker states sorted by endpoint.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut entries: Vec<BreakerSnapshot> =
            self.breakers.values().map(|breaker| breaker.snapshot()).collect();
        entries.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        entries
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
