//! Client configuration.
//!
//! Every tunable lives on an explicit, validated [`ClientConfig`]; there are no process-wide
//! settings. Build one with [`ClientConfig::builder`], from a known chain with
//! [`ClientConfig::for_chain`], or from `LIFELINE_*` environment variables with
//! [`ClientConfig::from_env`].

use crate::backoff::{Backoff, BackoffError};
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerError};
use crate::jitter::Jitter;
use crate::rate_limit::RateLimitError;
use crate::timeout::{RequestTimeout, TimeoutError};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

/// Prefix shared by every environment variable read by [`ClientConfig::from_env`].
pub const ENV_PREFIX: &str = "LIFELINE_";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one endpoint is required")]
    NoEndpoints,
    #[error("endpoint url must not be empty")]
    EmptyEndpoint,
    #[error("endpoint '{0}' is configured more than once")]
    DuplicateEndpoint(String),
    #[error("no default endpoints for chain id {0}; configure endpoints explicitly")]
    UnknownChain(u64),
    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("cannot parse {var}={value:?}")]
    InvalidEnv { var: String, value: String },
    #[error(transparent)]
    Backoff(#[from] BackoffError),
    #[error(transparent)]
    CircuitBreaker(#[from] CircuitBreakerError),
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

/// Networks with a built-in public endpoint list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    BaseMainnet,
    BaseSepolia,
}

impl Network {
    pub fn chain_id(self) -> u64 {
        match self {
            Network::BaseMainnet => 8453,
            Network::BaseSepolia => 84532,
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            8453 => Some(Network::BaseMainnet),
            84532 => Some(Network::BaseSepolia),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Network::BaseMainnet => "Base Mainnet",
            Network::BaseSepolia => "Base Sepolia",
        }
    }

    /// Public endpoints, in failover order.
    pub fn default_endpoints(self) -> &'static [&'static str] {
        match self {
            Network::BaseMainnet => &[
                "https://mainnet.base.org",
                "https://base.gateway.tenderly.co",
                "https://base.publicnode.com",
            ],
            Network::BaseSepolia => &[
                "https://sepolia.base.org",
                "https://base-sepolia.gateway.tenderly.co",
                "https://base-sepolia.publicnode.com",
            ],
        }
    }
}

/// Validated client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    endpoints: Vec<String>,
    chain_id: u64,
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    cache_ttl: Duration,
    rate_limit_requests: u32,
    rate_limit_window: Duration,
    breaker: CircuitBreakerConfig,
    request_timeout: RequestTimeout,
    rotate_after: usize,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Defaults for a known chain, using its built-in endpoint list.
    pub fn for_chain(chain_id: u64) -> Result<Self, ConfigError> {
        Self::builder().chain_id(chain_id).build()
    }

    /// Read `LIFELINE_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup. Unset variables keep
    /// their defaults; set but unparsable ones are errors.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(urls) = read(&lookup, "RPC_URLS") {
            builder = builder.endpoints(
                urls.split(',').map(str::trim).filter(|u| !u.is_empty()).map(String::from),
            );
        }
        if let Some(id) = parse::<u64, _>(&lookup, "CHAIN_ID")? {
            builder = builder.chain_id(id);
        }
        if let Some(n) = parse::<usize, _>(&lookup, "MAX_RETRIES")? {
            builder = builder.max_retries(n);
        }
        if let Some(base) = parse::<f64, _>(&lookup, "BACKOFF_BASE")? {
            builder = builder.backoff_base(base);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "CACHE_TTL_SECS")? {
            builder = builder.cache_ttl(Duration::from_secs(secs));
        }
        if let Some(n) = parse::<u32, _>(&lookup, "RATE_LIMIT_REQUESTS")? {
            builder = builder.rate_limit_requests(n);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "RATE_LIMIT_WINDOW_SECS")? {
            builder = builder.rate_limit_window(Duration::from_secs(secs));
        }
        if let Some(n) = parse::<usize, _>(&lookup, "BREAKER_THRESHOLD")? {
            builder = builder.breaker_threshold(n);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "BREAKER_TIMEOUT_SECS")? {
            builder = builder.breaker_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "REQUEST_TIMEOUT_SECS")? {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn network(&self) -> Option<Network> {
        Network::from_chain_id(self.chain_id)
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn rate_limit_requests(&self) -> u32 {
        self.rate_limit_requests
    }

    pub fn rate_limit_window(&self) -> Duration {
        self.rate_limit_window
    }

    pub fn breaker(&self) -> &CircuitBreakerConfig {
        &self.breaker
    }

    pub fn request_timeout(&self) -> RequestTimeout {
        self.request_timeout
    }

    /// Consecutive retry exhaustions on one endpoint before the client rotates away from it.
    pub fn rotate_after(&self) -> usize {
        self.rotate_after
    }
}

fn read<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<String> {
    lookup(&format!("{ENV_PREFIX}{name}"))
}

fn parse<T: FromStr, F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match read(lookup, name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| ConfigError::InvalidEnv {
            var: format!("{ENV_PREFIX}{name}"),
            value: raw,
        }),
    }
}

/// Builder for [`ClientConfig`]. Unset fields keep their defaults.
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    endpoints: Option<Vec<String>>,
    chain_id: u64,
    max_retries: usize,
    backoff_base: f64,
    backoff_unit: Duration,
    backoff_max: Option<Duration>,
    jitter: Jitter,
    cache_ttl: Duration,
    rate_limit_requests: u32,
    rate_limit_window: Duration,
    breaker_threshold: usize,
    breaker_timeout: Duration,
    half_open_max_calls: usize,
    request_timeout: Duration,
    rotate_after: usize,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            endpoints: None,
            chain_id: Network::BaseMainnet.chain_id(),
            max_retries: 3,
            backoff_base: 2.0,
            backoff_unit: Duration::from_secs(1),
            backoff_max: None,
            jitter: Jitter::None,
            cache_ttl: Duration::from_secs(10),
            rate_limit_requests: 100,
            rate_limit_window: Duration::from_secs(60),
            breaker_threshold: 5,
            breaker_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
            request_timeout: Duration::from_secs(30),
            rotate_after: 2,
        }
    }
}

impl ClientConfigBuilder {
    /// Endpoints in failover order. Without this, the chain's built-in list is used.
    pub fn endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = Some(endpoints.into_iter().map(Into::into).collect());
        self
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff_base(mut self, base: f64) -> Self {
        self.backoff_base = base;
        self
    }

    /// Scale of the backoff schedule: retry `i` waits `unit · base^i`.
    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn backoff_max(mut self, max: Duration) -> Self {
        self.backoff_max = Some(max);
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn rate_limit_requests(mut self, requests: u32) -> Self {
        self.rate_limit_requests = requests;
        self
    }

    pub fn rate_limit_window(mut self, window: Duration) -> Self {
        self.rate_limit_window = window;
        self
    }

    pub fn breaker_threshold(mut self, threshold: usize) -> Self {
        self.breaker_threshold = threshold;
        self
    }

    pub fn breaker_timeout(mut self, timeout: Duration) -> Self {
        self.breaker_timeout = timeout;
        self
    }

    pub fn half_open_max_calls(mut self, calls: usize) -> Self {
        self.half_open_max_calls = calls;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn rotate_after(mut self, exhaustions: usize) -> Self {
        self.rotate_after = exhaustions;
        self
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let endpoints = match self.endpoints {
            Some(list) => list.into_iter().map(|u| u.trim().to_string()).collect::<Vec<_>>(),
            None => Network::from_chain_id(self.chain_id)
                .ok_or(ConfigError::UnknownChain(self.chain_id))?
                .default_endpoints()
                .iter()
                .map(|u| u.to_string())
                .collect(),
        };
        if endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        let mut seen = HashSet::new();
        for url in &endpoints {
            if url.is_empty() {
                return Err(ConfigError::EmptyEndpoint);
            }
            if !seen.insert(url.as_str()) {
                return Err(ConfigError::DuplicateEndpoint(url.clone()));
            }
        }

        let mut backoff = Backoff::power(self.backoff_base)?.with_unit(self.backoff_unit);
        if let Some(max) = self.backoff_max {
            backoff = backoff.with_max(max)?;
        }
        let breaker = CircuitBreakerConfig::new(
            self.breaker_threshold,
            self.breaker_timeout,
            self.half_open_max_calls,
        )?;
        if self.rate_limit_requests == 0 {
            return Err(RateLimitError::ZeroCapacity.into());
        }
        if self.rate_limit_window.is_zero() {
            return Err(RateLimitError::ZeroWindow.into());
        }
        let request_timeout = RequestTimeout::new(self.request_timeout)?;
        if self.rotate_after == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rotate_after",
                reason: "must be > 0".into(),
            });
        }

        Ok(ClientConfig {
            endpoints,
            chain_id: self.chain_id,
            max_retries: self.max_retries,
            backoff,
            jitter: self.jitter,
            cache_ttl: self.cache_ttl,
            rate_limit_requests: self.rate_limit_requests,
            rate_limit_window: self.rate_limit_window,
            breaker,
            request_timeout,
            rotate_after: self.rotate_after,
        })
    }
}
