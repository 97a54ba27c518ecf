//! Response cache for the content-query path.
//!
//! Answers are memoized under a fingerprint of (normalized query, scope,
//! answer length) with TTL expiry and a bounded LRU in-memory tier.
//! Concurrent identical misses are collapsed to a single computation
//! (single-flight): followers wait on the leader's per-key lock and then
//! re-read the cache instead of invoking the generator again.
//!
//! Errors and insufficient-evidence results are never cached, so a
//! transient gap in the data does not poison future queries. A disabled
//! cache degrades to always-miss; the pipeline still functions, only
//! slower.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::models::{AnswerLength, AnswerResult, QueryScope};

/// Compute the deterministic cache key.
///
/// The query is lowercased, trimmed, and whitespace-collapsed; scope IDs
/// are sorted — identical (query, scope, length) always resolves to the
/// same key regardless of request ordering.
pub fn fingerprint(query: &str, scope: &QueryScope, length: AnswerLength) -> String {
    let normalized_query = query
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut hasher = Sha256::new();
    hasher.update(normalized_query.as_bytes());
    hasher.update([0u8]);
    for id in scope.sorted_ids() {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(length.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}

struct Entry {
    value: AnswerResult,
    created_at: Instant,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    use_counter: u64,
}

/// TTL + LRU response cache with a single-flight guard.
pub struct ResponseCache {
    enabled: bool,
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<Inner>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries,
            inner: Mutex::new(Inner::default()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a key. Expired entries are removed on read.
    pub async fn get(&self, key: &str) -> Option<AnswerResult> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.inner.lock().await;
        inner.use_counter += 1;
        let counter = inner.use_counter;

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if entry.created_at.elapsed() < self.ttl => {
                entry.last_used = counter;
                let mut value = entry.value.clone();
                value.cached = true;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.remove(key);
        }
        None
    }

    /// Store a value. Evicts the least-recently-read entry when the
    /// bound is exceeded.
    pub async fn set(&self, key: &str, value: AnswerResult) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock().await;
        inner.use_counter += 1;
        let counter = inner.use_counter;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                created_at: Instant::now(),
                last_used: counter,
            },
        );

        while inner.entries.len() > self.max_entries {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&oldest);
                debug!(key = %oldest, "evicted cache entry (LRU bound)");
            } else {
                break;
            }
        }
    }

    /// Number of live entries (expired entries may still be counted
    /// until their next read).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Run `compute` at most once per key across concurrent callers.
    ///
    /// The first caller (leader) computes; followers block on the
    /// per-key lock, then re-read the cache and return the leader's
    /// answer. Only results for which `cacheable` returns true are
    /// stored — a failed or insufficient-evidence computation leaves the
    /// key empty and the next caller retries.
    pub async fn get_or_compute<F, Fut, P>(
        &self,
        key: &str,
        compute: F,
        cacheable: P,
    ) -> Result<AnswerResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AnswerResult>>,
        P: Fn(&AnswerResult) -> bool,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }

        if !self.enabled {
            return compute().await;
        }

        let gate = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let _guard = gate.lock().await;

        // A leader may have finished while we waited on the gate.
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }

        let result = compute().await;

        if let Ok(ref value) = result {
            if cacheable(value) {
                self.set(key, value.clone()).await;
            }
        }

        {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.remove(key);
        }

        result
    }
}
