//! Tests for the in-process tier of TieredCache: bounds, LRU eviction, TTL.
//!
//! Tests verify:
//! - Entry-count and byte bounds trigger eviction
//! - The least recently accessed entry is the one evicted
//! - Expired entries read as misses
//! - Statistics track hits, misses and evictions
//! - Concurrent access keeps the bound

use classifier::cache::{CacheTier, Lookup, TierSettings, TieredCache};
use classifier::types::now_ms;
use std::sync::Arc;
use std::time::Duration;

fn bounded(max_entries: usize) -> TieredCache<String> {
    TieredCache::in_memory(
        TierSettings::new("test:", Duration::from_secs(60)).with_max_entries(max_entries),
    )
}

// ============================================================================
// BASIC FUNCTIONALITY
// ============================================================================

#[tokio::test]
async fn test_set_then_get() {
    let cache = bounded(10);
    cache.set("k", "v".to_string(), None).await;

    assert_eq!(cache.get("k").await, Some("v".to_string()));
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.entries, 1);
}

#[tokio::test]
async fn test_overwrite_does_not_grow_or_evict() {
    let cache = bounded(2);
    cache.set("a", "1".to_string(), None).await;
    cache.set("b", "2".to_string(), None).await;
    cache.set("a", "3".to_string(), None).await;

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 0);
    assert_eq!(cache.get("a").await, Some("3".to_string()));
}

#[tokio::test]
async fn test_traced_lookup_reports_memory_tier() {
    let cache = bounded(4);
    cache.set("k", "v".to_string(), None).await;

    let hit = cache.get_traced("k").await;
    assert_eq!(hit.tier(), Some(CacheTier::Memory));
    assert_eq!(cache.get_traced("other").await, Lookup::Miss);
}

// ============================================================================
// LRU EVICTION
// ============================================================================

#[tokio::test]
async fn test_third_insert_evicts_least_recently_accessed() {
    let cache = bounded(2);
    cache.set("first", "1".to_string(), None).await;
    cache.set("second", "2".to_string(), None).await;

    // touching "first" makes "second" the LRU entry
    assert!(cache.get("first").await.is_some());
    cache.set("third", "3".to_string(), None).await;

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 1);
    assert!(cache.get("first").await.is_some());
    assert!(cache.get("third").await.is_some());
    assert!(cache.get("second").await.is_none());
}

#[tokio::test]
async fn test_untouched_entries_evicted_in_insertion_order() {
    let cache = bounded(3);
    for key in ["a", "b", "c"] {
        cache.set(key, key.to_string(), None).await;
    }
    cache.set("d", "d".to_string(), None).await;
    cache.set("e", "e".to_string(), None).await;

    assert!(cache.peek("a").is_none());
    assert!(cache.peek("b").is_none());
    for key in ["c", "d", "e"] {
        assert!(cache.peek(key).is_some(), "{} should survive", key);
    }
    assert_eq!(cache.stats().evictions, 2);
}

#[tokio::test]
async fn test_byte_bound_evicts() {
    // each 10-char string serializes to 12 bytes
    let cache: TieredCache<String> = TieredCache::in_memory(
        TierSettings::new("test:", Duration::from_secs(60)).with_max_memory_bytes(25),
    );
    cache.set("a", "aaaaaaaaaa".to_string(), None).await;
    cache.set("b", "bbbbbbbbbb".to_string(), None).await;
    assert_eq!(cache.stats().memory_usage, 24);

    cache.set("c", "cccccccccc".to_string(), None).await;
    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.memory_usage, 24);
    assert!(cache.peek("a").is_none());
}

#[tokio::test]
async fn test_peek_does_not_refresh_recency() {
    let cache = bounded(2);
    cache.set("old", "1".to_string(), None).await;
    cache.set("new", "2".to_string(), None).await;

    assert!(cache.peek("old").is_some());
    cache.set("newest", "3".to_string(), None).await;

    assert!(cache.peek("old").is_none());
    assert!(cache.peek("new").is_some());
}

// ============================================================================
// TTL
// ============================================================================

#[tokio::test]
async fn test_expired_entry_reads_as_miss() {
    let cache = bounded(10);
    cache
        .set("short", "v".to_string(), Some(Duration::from_millis(20)))
        .await;
    assert!(cache.get("short").await.is_some());

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(cache.get("short").await.is_none());

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_access_count_and_remaining_ttl() {
    let cache = bounded(10);
    cache.set("k", "v".to_string(), None).await;
    cache.get("k").await;
    cache.get("k").await;

    let entry = cache.peek("k").unwrap();
    let remaining = entry.remaining_ttl(now_ms());
    assert_eq!(entry.access_count, 3);
    assert!(remaining <= Duration::from_secs(60));
    assert!(remaining > Duration::from_secs(50));
}

// ============================================================================
// INVALIDATION & STATS
// ============================================================================

#[tokio::test]
async fn test_invalidate_and_clear() {
    let cache = bounded(10);
    cache.set("a", "1".to_string(), None).await;
    cache.set("b", "2".to_string(), None).await;
    cache.get("a").await;

    assert!(cache.invalidate("a").await);
    assert!(!cache.invalidate("a").await);
    assert_eq!(cache.invalidate_by_pattern("b").await, 1);
    assert_eq!(cache.invalidate_by_pattern("b*").await, 0);

    cache.set("c", "3".to_string(), None).await;
    cache.clear().await;
    let stats = cache.stats();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.memory_usage, 0);
}

#[tokio::test]
async fn test_hit_ratio() {
    let cache = bounded(10);
    assert_eq!(cache.hit_ratio(), 0.0);

    cache.set("k", "v".to_string(), None).await;
    cache.get("k").await;
    cache.get("k").await;
    cache.get("k").await;
    cache.get("missing").await;

    assert!((cache.hit_ratio() - 0.75).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_disabled_cache_ignores_everything() {
    let cache: TieredCache<String> =
        TieredCache::in_memory(TierSettings::new("test:", Duration::from_secs(60)).disabled());
    cache.set("k", "v".to_string(), None).await;

    assert!(cache.get("k").await.is_none());
    assert!(cache.is_empty());
    assert_eq!(cache.stats().misses, 0);
    assert!(cache.is_healthy().await);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_respect_bound() {
    let cache = Arc::new(bounded(50));

    let mut tasks = Vec::new();
    for worker in 0..4 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move {
            for i in 0..100 {
                let key = format!("w{}-{}", worker, i);
                cache.set(&key, key.clone(), None).await;
                cache.get(&key).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stats = cache.stats();
    assert!(stats.entries <= 50);
    assert_eq!(stats.evictions, 400 - stats.entries as u64);
}
