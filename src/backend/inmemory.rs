//! In-memory cache backend.
//!
//! Uses DashMap for concurrent access with per-key sharding. TTL expiration
//! is checked on access.

use super::CacheBackend;
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-memory cache entry with optional expiration.
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|d| Instant::now() + d);
        CacheEntry { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }
}

/// Thread-safe in-memory response store shared by all workers.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let total_bytes: usize = self.store.iter().map(|entry| entry.data.len()).sum();
        let expired_entries = self.store.iter().filter(|entry| entry.is_expired()).count();

        CacheStats {
            total_entries: self.store.len(),
            expired_entries,
            total_bytes,
        }
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(entry.data.clone()));
            }
        }

        // Drop the expired entry, if any.
        self.store.remove(key);
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.store
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        debug!("✓ InMemory SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let dropped = self.store.len();
        self.store.clear();
        warn!("⚠ InMemory CLEAR_ALL executed - {} entries dropped", dropped);
        Ok(())
    }
}

/// Cache statistics reported by the health endpoint.
#[derive(Clone, Debug, serde::Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmemory_backend_set_get() {
        let backend = InMemoryBackend::new();
        backend
            .set("list:type=room", b"page".to_vec(), None)
            .await
            .expect("Failed to set");

        let result = backend.get("list:type=room").await.expect("Failed to get");
        assert_eq!(result, Some(b"page".to_vec()));
        assert_eq!(backend.get("missing").await.expect("Failed to get"), None);
    }

    #[tokio::test]
    async fn test_inmemory_backend_delete() {
        let backend = InMemoryBackend::new();
        backend.set("k", b"v".to_vec(), None).await.unwrap();
        assert_eq!(backend.len(), 1);

        backend.delete("k").await.unwrap();
        assert!(backend.get("k").await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_inmemory_backend_ttl_expiration() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", b"v".to_vec(), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(backend.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(backend.get("k").await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_inmemory_backend_clear_all() {
        let backend = InMemoryBackend::new();
        backend.set("a", b"1".to_vec(), None).await.unwrap();
        backend.set("b", b"22".to_vec(), None).await.unwrap();

        let stats = backend.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_bytes, 3);

        backend.clear_all().await.unwrap();
        assert_eq!(backend.len(), 0);
    }

    #[tokio::test]
    async fn test_inmemory_backend_clone_shares_store() {
        let first = InMemoryBackend::new();
        let second = first.clone();
        first.set("k", b"v".to_vec(), None).await.unwrap();
        assert_eq!(second.get("k").await.unwrap(), Some(b"v".to_vec()));
    }
}
