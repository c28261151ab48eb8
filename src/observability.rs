//! Cache metrics hooks and TTL policy.
//!
//! [`CacheMetrics`] receives every cache lifecycle event. The default method
//! bodies log through the `log` crate; [`NoOpMetrics`] silences them.

use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    fn record_set(&self, key: &str, duration: Duration) {
        debug!("Cache SET: {} took {:?}", key, duration);
    }

    /// A write invalidated the whole cache.
    fn record_clear(&self, reason: &str) {
        info!("Cache CLEAR after {}", reason);
    }

    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Metrics handler that logs through the trait defaults.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}

/// Metrics handler that discards every event.
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _duration: Duration) {}
    fn record_clear(&self, _reason: &str) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// TTL (Time-to-Live) policy for cache entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Fixed duration for all entries
    Fixed(Duration),

    /// Entries live until the next write clears them
    Infinite,
}

impl TtlPolicy {
    /// Policy for a configured lifetime; `None` means no expiry.
    pub fn from_setting(ttl: Option<Duration>) -> Self {
        ttl.map_or(TtlPolicy::Infinite, TtlPolicy::Fixed)
    }

    pub fn get_ttl(&self) -> Option<Duration> {
        match self {
            TtlPolicy::Fixed(d) => Some(*d),
            TtlPolicy::Infinite => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handlers() {
        let metrics = NoOpMetrics;
        metrics.record_hit("key", Duration::from_secs(1));
        metrics.record_clear("CREATE");

        let metrics = LogMetrics;
        metrics.record_miss("key", Duration::from_millis(2));
        metrics.record_error("key", "boom");
    }

    #[test]
    fn test_ttl_policy_from_setting() {
        let fixed = TtlPolicy::from_setting(Some(Duration::from_secs(900)));
        assert_eq!(fixed, TtlPolicy::Fixed(Duration::from_secs(900)));
        assert_eq!(fixed.get_ttl(), Some(Duration::from_secs(900)));

        let infinite = TtlPolicy::from_setting(None);
        assert_eq!(infinite, TtlPolicy::Infinite);
        assert_eq!(infinite.get_ttl(), None);
    }
}
