//! In-memory transport for tests and benchmarks, behind the `testing` feature.
//!
//! Responses are resolved per endpoint in this order: the next queued one-shot response, a
//! response registered for the call's method, the endpoint's standing response, and finally a
//! `Connect` error. Probes never consume responses; endpoints are reachable unless marked
//! otherwise.

use crate::call::RpcCall;
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::transport::Transport;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type Reply = Result<Value, TransportError>;

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<String, VecDeque<Reply>>,
    by_method: HashMap<(String, String), Reply>,
    standing: HashMap<String, Reply>,
    latency: HashMap<String, Duration>,
    unreachable: HashSet<String>,
    calls: HashMap<String, Vec<String>>,
    probes: HashMap<String, usize>,
}

/// Scripted [`Transport`]. Clones share the same script and counters.
#[derive(Debug, Default, Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a one-shot reply for the next call to `url`.
    pub fn push(&self, url: &str, reply: Reply) -> &Self {
        self.lock().queued.entry(url.to_string()).or_default().push_back(reply);
        self
    }

    /// Reply used for every call to `url` once its queue is empty.
    pub fn always(&self, url: &str, reply: Reply) -> &Self {
        self.lock().standing.insert(url.to_string(), reply);
        self
    }

    /// Reply used for `method` on `url` once its queue is empty.
    pub fn respond_to(&self, url: &str, method: &str, reply: Reply) -> &Self {
        self.lock().by_method.insert((url.to_string(), method.to_string()), reply);
        self
    }

    /// Delay every call to `url` by `latency` before replying.
    pub fn set_latency(&self, url: &str, latency: Duration) -> &Self {
        self.lock().latency.insert(url.to_string(), latency);
        self
    }

    pub fn set_reachable(&self, url: &str, reachable: bool) -> &Self {
        let mut script = self.lock();
        if reachable {
            script.unreachable.remove(url);
        } else {
            script.unreachable.insert(url.to_string());
        }
        self
    }

    /// Number of `perform` calls that reached `url`.
    pub fn calls_to(&self, url: &str) -> usize {
        self.lock().calls.get(url).map_or(0, Vec::len)
    }

    /// Methods sent to `url`, in order.
    pub fn methods_sent_to(&self, url: &str) -> Vec<String> {
        self.lock().calls.get(url).cloned().unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().map(Vec::len).sum()
    }

    pub fn probe_count(&self, url: &str) -> usize {
        self.lock().probes.get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform(&self, endpoint: &Endpoint, call: &RpcCall) -> Result<Value, TransportError> {
        let (reply, latency) = {
            let mut script = self.lock();
            let url = endpoint.url();
            script.calls.entry(url.to_string()).or_default().push(call.method().to_string());
            let queued = script.queued.get_mut(url).and_then(VecDeque::pop_front);
            let reply = queued
                .or_else(|| {
                    script.by_method.get(&(url.to_string(), call.method().to_string())).cloned()
                })
                .or_else(|| script.standing.get(url).cloned())
                .unwrap_or_else(|| {
                    Err(TransportError::Connect(format!("no scripted reply for {url}")))
                });
            (reply, script.latency.get(url).copied())
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        reply
    }

    async fn probe(&self, endpoint: &Endpoint) -> bool {
        let mut script = self.lock();
        *script.probes.entry(endpoint.url().to_string()).or_insert(0) += 1;
        !script.unreachable.contains(endpoint.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn queued_replies_take_precedence() {
        let transport = ScriptedTransport::new();
        let endpoint = Endpoint::new("https://a", 0);
        let call = RpcCall::read("eth_blockNumber", json!([]));
        transport
            .always("https://a", Ok(json!("0x2")))
            .push("https://a", Err(TransportError::Connect("refused".into())));

        assert!(transport.perform(&endpoint, &call).await.is_err());
        assert_eq!(transport.perform(&endpoint, &call).await, Ok(json!("0x2")));
        assert_eq!(transport.calls_to("https://a"), 2);
        assert_eq!(transport.methods_sent_to("https://a"), vec!["eth_blockNumber"; 2]);
    }

    #[tokio::test]
    async fn method_replies_beat_standing_replies() {
        let transport = ScriptedTransport::new();
        let endpoint = Endpoint::new("https://a", 0);
        transport
            .always("https://a", Ok(json!("0x1")))
            .respond_to("https://a", "eth_chainId", Ok(json!("0x2105")));
        let chain = transport.perform(&endpoint, &RpcCall::read("eth_chainId", json!([]))).await;
        assert_eq!(chain, Ok(json!("0x2105")));
        let other = transport.perform(&endpoint, &RpcCall::read("eth_gasPrice", json!([]))).await;
        assert_eq!(other, Ok(json!("0x1")));
    }

    #[tokio::test]
    async fn unscripted_endpoint_refuses_connections() {
        let transport = ScriptedTransport::new();
        let result =
            transport.perform(&Endpoint::new("https://b", 1), &RpcCall::read("x", json!([]))).await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn probes_follow_reachability_flags() {
        let transport = ScriptedTransport::new();
        let endpoint = Endpoint::new("https://a", 0);
        assert!(transport.probe(&endpoint).await);
        transport.set_reachable("https://a", false);
        assert!(!transport.probe(&endpoint).await);
        assert_eq!(transport.probe_count("https://a"), 2);
        assert_eq!(transport.total_calls(), 0);
    }
}
