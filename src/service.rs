//! Whole-response cache shared by the HTTP handlers.
//!
//! Read handlers look up the encoded response body by key before touching
//! the store and populate it afterwards. Every successful write clears the
//! whole cache, so a cached body is never older than the last mutation.
//!
//! A read that overlaps a write must not re-populate the cache with what it
//! read before the write committed. Each clear bumps a [`Generation`]; readers
//! take one before querying the store and [`ResponseCache::store`] drops the
//! body when a clear has happened since.

use crate::backend::CacheBackend;
use crate::error::Result;
use crate::observability::{CacheMetrics, LogMetrics, TtlPolicy};
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Number of cache clears seen when a read started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Generation(u64);

struct Inner<B> {
    backend: B,
    metrics: Box<dyn CacheMetrics>,
    ttl_policy: TtlPolicy,
    generation: AtomicU64,
}

/// Response cache handle. Cloning is cheap (Arc increment).
#[derive(Clone)]
pub struct ResponseCache<B: CacheBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: CacheBackend> ResponseCache<B> {
    pub fn new(backend: B, ttl_policy: TtlPolicy) -> Self {
        Self::with_metrics(backend, ttl_policy, Box::new(LogMetrics))
    }

    /// Create a cache reporting to a custom metrics handler.
    pub fn with_metrics(backend: B, ttl_policy: TtlPolicy, metrics: Box<dyn CacheMetrics>) -> Self {
        ResponseCache {
            inner: Arc::new(Inner {
                backend,
                metrics,
                ttl_policy,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current generation. Take it before reading the store.
    pub fn generation(&self) -> Generation {
        Generation(self.inner.generation.load(Ordering::SeqCst))
    }

    /// Cached body for `key`, if any.
    ///
    /// Entries that fail envelope validation are evicted and reported as a
    /// miss; backend failures are logged and also treated as a miss.
    pub async fn fetch(&self, key: &str) -> Option<Value> {
        let timer = Instant::now();
        let inner = &self.inner;

        let bytes = match inner.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                inner.metrics.record_miss(key, timer.elapsed());
                return None;
            }
            Err(e) => {
                inner.metrics.record_error(key, &e.to_string());
                return None;
            }
        };

        match deserialize_from_cache::<Value>(&bytes) {
            Ok(body) => {
                inner.metrics.record_hit(key, timer.elapsed());
                Some(body)
            }
            Err(e) => {
                inner.metrics.record_error(key, &e.to_string());
                if let Err(e) = inner.backend.delete(key).await {
                    inner.metrics.record_error(key, &e.to_string());
                }
                inner.metrics.record_miss(key, timer.elapsed());
                None
            }
        }
    }

    /// Cache `body` under `key` for the configured lifetime, unless the cache
    /// was cleared after `seen` was taken. Returns whether the body was kept.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the body cannot be encoded or the backend fails.
    pub async fn store(&self, key: &str, body: &Value, seen: Generation) -> Result<bool> {
        let timer = Instant::now();
        let inner = &self.inner;
        if self.generation() != seen {
            debug!("Skipping cache SET for {}: cleared since read", key);
            return Ok(false);
        }

        let bytes = serialize_for_cache(body)?;
        inner.backend.set(key, bytes, inner.ttl_policy.get_ttl()).await?;

        // A clear that bumped the generation during `set` may have run before
        // the entry landed.
        if self.generation() != seen {
            inner.backend.delete(key).await?;
            debug!("Dropped cache SET for {}: cleared during write", key);
            return Ok(false);
        }
        inner.metrics.record_set(key, timer.elapsed());
        Ok(true)
    }

    /// Drop every cached response. `reason` names the triggering operation.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the backend cannot be cleared.
    pub async fn invalidate_all(&self, reason: &str) -> Result<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.backend.clear_all().await?;
        self.inner.metrics.record_clear(reason);
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        self.inner.backend.health_check().await.unwrap_or(false)
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }
}
