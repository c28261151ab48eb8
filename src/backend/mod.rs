//! Response cache storage.

use crate::error::Result;
use std::time::Duration;

pub mod inmemory;

pub use inmemory::{CacheStats, InMemoryBackend};

/// Storage for encoded response bodies.
///
/// All methods take `&self`; implementations use interior mutability so one
/// handle can be shared by every worker.
#[allow(async_fn_in_trait)]
pub trait CacheBackend: Send + Sync + Clone {
    /// Retrieve value by key.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))` - Value found and not expired
    /// - `Ok(None)` - Cache miss
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store value with optional TTL. `None` keeps it until removed.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Health check - verify backend is accessible.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Remove every entry. Called after each successful write.
    async fn clear_all(&self) -> Result<()>;
}
