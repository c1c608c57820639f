//! Time-bounded result cache keyed by call fingerprints.

use crate::clock::Clock;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Fixed-length fingerprint of an operation name and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `operation` called with `args`.
    ///
    /// JSON objects are serialized with sorted keys, so argument maps that differ only in
    /// insertion order produce the same key.
    pub fn new(operation: &str, args: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_json(args).as_bytes());
        CacheKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stored_at_ms: u64,
}

/// Best-effort TTL cache. No operation can fail.
///
/// Expired entries are evicted when read, and swept from the whole map by the first `set` of
/// every TTL interval, so keys that are never read again do not accumulate.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, Entry<V>>>,
    last_sweep_ms: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let last_sweep_ms = AtomicU64::new(clock.now_millis());
        Self { ttl, entries: Mutex::new(HashMap::new()), last_sweep_ms, clock }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh value for `key`; an expired entry is evicted and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now_millis();
        let ttl_ms = self.ttl_ms();
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => now.saturating_sub(entry.stored_at_ms) >= ttl_ms,
        };
        if expired {
            entries.remove(key);
            None
        } else {
            entries.get(key).map(|entry| entry.value.clone())
        }
    }

    pub fn set(&self, key: CacheKey, value: V) {
        let now = self.clock.now_millis();
        let ttl_ms = self.ttl_ms();
        let mut entries = self.lock();
        if now.saturating_sub(self.last_sweep_ms.load(Ordering::Relaxed)) >= ttl_ms {
            let before = entries.len();
            entries.retain(|_, entry| now.saturating_sub(entry.stored_at_ms) < ttl_ms);
            self.last_sweep_ms.store(now, Ordering::Relaxed);
            tracing::trace!(evicted = before - entries.len(), "Swept expired cache entries");
        }
        entries.insert(key, Entry { value, stored_at_ms: now });
    }

    /// Drop the entry for `key`, fresh or not.
    pub fn remove(&self, key: &CacheKey) {
        self.lock().remove(key);
    }

    fn ttl_ms(&self) -> u64 {
        u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
