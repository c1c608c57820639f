//! Error taxonomy for the client.
//!
//! `TransportError` is what a [`Transport`](crate::Transport) reports for a single attempt.
//! `RpcError` is what callers of [`RpcClient`](crate::RpcClient) see; it always says which kind
//! of failure happened and, for endpoint-related failures, which endpoint was last attempted.

use std::time::Duration;

/// Failure of a single transport attempt against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request never left the client (connection refused, DNS failure, ...).
    #[error("connection failed: {0}")]
    Connect(String),
    /// The connection dropped after the request was sent.
    #[error("connection interrupted: {0}")]
    Interrupted(String),
    /// No response within the request timeout.
    #[error("request timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    /// The endpoint answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rejected { code: i64, message: String },
}

impl TransportError {
    /// Transient failures that say nothing about the request itself.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Rejected { .. })
    }

    /// True only when the request provably did not reach the endpoint.
    pub fn is_safe_to_resend(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

/// Coarse classification of [`RpcError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transport,
    RateLimited,
    CircuitOpen,
    Rejected,
}

/// Error returned by every client operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    /// Malformed input detected before any network call.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("transport failure on {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: TransportError,
    },

    /// Local token bucket is empty.
    #[error("rate limit exceeded, retry in {wait:?}")]
    RateLimited { wait: Duration },

    #[error("circuit breaker open for {endpoint} ({failure_count} failures, retry in {retry_in:?})")]
    CircuitOpen { endpoint: String, failure_count: usize, retry_in: Duration },

    #[error("{endpoint} rejected the request ({code}): {message}")]
    Rejected { endpoint: String, code: i64, message: String },

    /// The endpoint answered but the result could not be decoded.
    #[error("malformed {method} response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, method: String, message: String },

    #[error("no reachable endpoint after trying {tried} (last: {last_endpoint})")]
    NoReachableEndpoint { tried: usize, last_endpoint: String },
}

impl RpcError {
    /// Lift a transport failure observed on `endpoint`.
    pub fn from_transport(endpoint: &str, error: TransportError) -> Self {
        match error {
            TransportError::Rejected { code, message } => {
                RpcError::Rejected { endpoint: endpoint.to_string(), code, message }
            }
            other => RpcError::Transport { endpoint: endpoint.to_string(), source: other },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Validation(_) => ErrorKind::Validation,
            RpcError::Transport { .. } | RpcError::NoReachableEndpoint { .. } => {
                ErrorKind::Transport
            }
            RpcError::RateLimited { .. } => ErrorKind::RateLimited,
            RpcError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            RpcError::Rejected { .. } | RpcError::MalformedResponse { .. } => ErrorKind::Rejected,
        }
    }

    /// Transient transport failures; the only errors the retry loop repeats.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Transport { source, .. } if source.is_transient())
    }

    /// Retryable on the write path: the request never left the client.
    pub fn is_safe_to_resend(&self) -> bool {
        matches!(self, RpcError::Transport { source, .. } if source.is_safe_to_resend())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RpcError::RateLimited { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RpcError::CircuitOpen { .. })
    }

    /// Endpoint last attempted, when the failure is tied to one.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcError::Transport { endpoint, .. }
            | RpcError::CircuitOpen { endpoint, .. }
            | RpcError::Rejected { endpoint, .. }
            | RpcError::MalformedResponse { endpoint, .. } => Some(endpoint),
            RpcError::NoReachableEndpoint { last_endpoint, .. } => Some(last_endpoint),
            RpcError::Validation(_) | RpcError::RateLimited { .. } => None,
        }
    }
}
