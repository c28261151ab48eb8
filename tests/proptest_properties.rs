//! Property-based tests for the cache envelope and page arithmetic.
//!
//! # Properties Tested
//!
//! 1. **Roundtrip Property**: cached JSON bodies decode to what was stored
//! 2. **Envelope Property**: every entry starts with magic + version
//! 3. **Corruption Property**: a damaged header is rejected, never decoded
//! 4. **Window Property**: in-range pages tile the listing exactly once

use proptest::prelude::*;
use residents_api::error::Error;
use residents_api::pagination::PageRequest;
use residents_api::serialization::{
    deserialize_from_cache, serialize_for_cache, CACHE_MAGIC, CURRENT_SCHEMA_VERSION,
};
use serde_json::{json, Value};

// ============================================================================
// Strategies
// ============================================================================

fn building_strategy() -> impl Strategy<Value = Value> {
    (1i64..10_000, "[a-zA-Z ]{1,40}", "[a-zA-Z0-9 ,.]{1,80}")
        .prop_map(|(id, name, address)| json!({ "id": id, "name": name, "address": address }))
}

fn page_body_strategy() -> impl Strategy<Value = Value> {
    prop::collection::vec(building_strategy(), 0..20).prop_map(|results| {
        json!({
            "count": results.len(),
            "next": null,
            "previous": null,
            "results": results,
        })
    })
}

// ============================================================================
// Envelope
// ============================================================================

proptest! {
    #[test]
    fn prop_page_body_roundtrip(body in page_body_strategy()) {
        let bytes = serialize_for_cache(&body).expect("Serialization failed");
        let decoded: Value = deserialize_from_cache(&bytes).expect("Deserialization failed");
        prop_assert_eq!(decoded, body);
    }

    #[test]
    fn prop_envelope_header(body in building_strategy()) {
        let bytes = serialize_for_cache(&body).expect("Serialization failed");
        prop_assert_eq!(&bytes[0..4], &CACHE_MAGIC[..]);
        prop_assert_eq!(&bytes[4..8], &CURRENT_SCHEMA_VERSION.to_le_bytes()[..]);
    }

    #[test]
    fn prop_corrupted_magic_rejected(body in building_strategy(), index in 0usize..4, flip in 1u8..=255) {
        let mut bytes = serialize_for_cache(&body).expect("Serialization failed");
        bytes[index] ^= flip;
        let result = deserialize_from_cache::<Value>(&bytes);
        prop_assert!(matches!(result, Err(Error::InvalidCacheEntry(_))));
    }

    #[test]
    fn prop_other_version_rejected(body in building_strategy(), version in any::<u32>()) {
        prop_assume!(version != CURRENT_SCHEMA_VERSION);
        let mut bytes = serialize_for_cache(&body).expect("Serialization failed");
        bytes[4..8].copy_from_slice(&version.to_le_bytes());
        let result = deserialize_from_cache::<Value>(&bytes);
        let is_version_mismatch = matches!(result, Err(Error::VersionMismatch { found, .. }) if found == version);
        prop_assert!(is_version_mismatch);
    }

    #[test]
    fn prop_truncated_entry_rejected(len in 0usize..8) {
        let bytes = serialize_for_cache(&json!({})).expect("Serialization failed");
        prop_assert!(deserialize_from_cache::<Value>(&bytes[..len]).is_err());
    }
}

// ============================================================================
// Pagination
// ============================================================================

proptest! {
    #[test]
    fn prop_pages_tile_listing(count in 0u64..500, size in 1u64..50) {
        let size_param = size.to_string();
        let first = PageRequest::from_params(None, Some(&size_param), 10, 100)
            .window(count)
            .expect("First page always exists");

        let mut seen = 0u64;
        for number in 1..=first.num_pages {
            let page_param = number.to_string();
            let window = PageRequest::from_params(Some(&page_param), Some(&size_param), 10, 100)
                .window(count)
                .expect("In-range page");
            prop_assert_eq!(window.offset(), seen);
            let items: Vec<u64> = (0..count).collect();
            seen += window.slice(items).len() as u64;
            prop_assert_eq!(window.has_next(), number < first.num_pages);
            prop_assert_eq!(window.has_previous(), number > 1);
        }
        prop_assert_eq!(seen, count);

        let past_end = (first.num_pages + 1).to_string();
        let beyond = PageRequest::from_params(Some(&past_end), Some(&size_param), 10, 100)
            .window(count);
        prop_assert!(matches!(beyond, Err(Error::NotFound(_))));
    }

    #[test]
    fn prop_page_size_is_bounded(raw in ".{0,8}", default in 1u64..20, max in 20u64..200) {
        let request = PageRequest::from_params(None, Some(&raw), default, max);
        prop_assert!(request.page_size >= 1);
        prop_assert!(request.page_size <= max);
    }
}
