//! Convenient re-exports for common lifeline types.
pub use crate::{
    eth::BlockTag,
    BreakerSnapshot, CircuitState, ClientConfig, ErrorKind, HealthSnapshot, HealthStatus,
    MetricsSnapshot, RpcCall, RpcClient, RpcError, Transport, TransportError,
};
