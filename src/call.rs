//! Descriptor of one JSON-RPC call as it flows through the client.

use crate::cache::CacheKey;
use serde::Serialize;
use serde_json::Value;

/// Whether a call only reads chain state or mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// Idempotent read. `cacheable` says whether the result may be served from the cache.
    Read { cacheable: bool },
    /// State-mutating call. Never cached, and only resent when it provably never left the client.
    Write,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcCall {
    method: String,
    params: Value,
    kind: CallKind,
}

impl RpcCall {
    /// A cacheable read.
    pub fn read(method: impl Into<String>, params: Value) -> Self {
        Self { method: method.into(), params, kind: CallKind::Read { cacheable: true } }
    }

    pub fn write(method: impl Into<String>, params: Value) -> Self {
        Self { method: method.into(), params, kind: CallKind::Write }
    }

    /// Mark a read as (un)cacheable. Has no effect on writes.
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        if let CallKind::Read { .. } = self.kind {
            self.kind = CallKind::Read { cacheable };
        }
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn is_write(&self) -> bool {
        self.kind == CallKind::Write
    }

    pub fn is_cacheable(&self) -> bool {
        matches!(self.kind, CallKind::Read { cacheable: true })
    }

    pub fn fingerprint(&self) -> CacheKey {
        CacheKey::new(&self.method, &self.params)
    }
}
