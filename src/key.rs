//! Cache key construction.
//!
//! Read responses are cached under the request path plus its raw query
//! string, so every distinct combination of `type`, filters and paging gets
//! its own entry.

/// Prefix shared by every response entry.
pub const RESPONSE_PREFIX: &str = "response";

/// Builder for cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Key for a GET response.
    pub fn response(path: &str, query_string: &str) -> String {
        if query_string.is_empty() {
            Self::build_composite(&[RESPONSE_PREFIX, path])
        } else {
            format!("{}?{}", Self::build_composite(&[RESPONSE_PREFIX, path]), query_string)
        }
    }

    /// Build composite key from multiple parts.
    pub fn build_composite(parts: &[&str]) -> String {
        parts.join(":")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_key_includes_query() {
        assert_eq!(
            CacheKeyBuilder::response("/api/data/", "type=room&page=2"),
            "response:/api/data/?type=room&page=2"
        );
        assert_eq!(
            CacheKeyBuilder::response("/api/data/4/", ""),
            "response:/api/data/4/"
        );
    }

    #[test]
    fn test_distinct_queries_get_distinct_keys() {
        assert_ne!(
            CacheKeyBuilder::response("/api/data/", "type=room"),
            CacheKeyBuilder::response("/api/data/", "type=building")
        );
    }
}
