//! The seam between the resilience core and the wire.
//!
//! A [`Transport`] sends one call to one endpoint and reports exactly what happened. It does no
//! retrying, caching or failover of its own; the client layers those on top.

use crate::call::RpcCall;
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send `call` to `endpoint` and return the JSON-RPC `result` value.
    ///
    /// Implementations must keep these cases apart: the request never left the client
    /// ([`TransportError::Connect`]), the connection broke after sending
    /// ([`TransportError::Interrupted`]), no answer in time ([`TransportError::Timeout`]), and
    /// the endpoint answered with an error object ([`TransportError::Rejected`]).
    async fn perform(&self, endpoint: &Endpoint, call: &RpcCall) -> Result<Value, TransportError>;

    /// Cheap liveness check used during rotation. Defaults to an `eth_chainId` round trip.
    async fn probe(&self, endpoint: &Endpoint) -> bool {
        let call = RpcCall::read("eth_chainId", Value::Array(Vec::new()));
        self.perform(endpoint, &call).await.is_ok()
    }
}
