//! Cache of resource reads (rule catalogue pages and similar), with
//! per-resource-type TTLs and ETags.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::entry::CacheStats;
use super::store::DistributedStore;
use super::tiered::{TierSettings, TieredCache};
use crate::types::now_ms;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedResource {
    pub uri: String,
    pub resource_type: String,
    pub content: Value,
    /// SHA-256 hex of the serialized content
    pub etag: String,
    pub cached_at: u64,
}

/// Listing entry returned by [`ResourceCache::list_cached`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedResourceInfo {
    pub uri: String,
    pub resource_type: String,
    pub etag: String,
    pub cached_at: u64,
    pub expires_at: u64,
    pub access_count: u64,
}

pub fn compute_etag(content: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

pub struct ResourceCache {
    inner: TieredCache<CachedResource>,
    resource_ttls: HashMap<String, Duration>,
}

impl ResourceCache {
    pub fn new(
        settings: TierSettings,
        resource_ttls: HashMap<String, Duration>,
        distributed: Option<Arc<dyn DistributedStore>>,
    ) -> Self {
        info!(
            "Resource cache initialised (enabled: {}, ttl: {:?}, {} type overrides)",
            settings.enabled,
            settings.default_ttl,
            resource_ttls.len()
        );
        Self {
            inner: TieredCache::new(settings, distributed),
            resource_ttls,
        }
    }

    /// TTL for a resource type: its override if configured, else the default.
    pub fn ttl_for(&self, resource_type: &str) -> Duration {
        self.resource_ttls
            .get(resource_type)
            .copied()
            .unwrap_or(self.inner.settings().default_ttl)
    }

    /// Lookup when the resource type is unknown. Hits are counted under the
    /// stored type; a miss only reaches the overall counters.
    pub async fn get(&self, uri: &str) -> Option<CachedResource> {
        let resource = self.inner.get(uri).await?;
        self.inner.record_category_hit(&resource.resource_type);
        Some(resource)
    }

    /// Lookup that counts the hit or miss under `resource_type`.
    pub async fn get_typed(&self, uri: &str, resource_type: &str) -> Option<CachedResource> {
        self.inner.get_categorized(uri, resource_type).await
    }

    /// Whether a live copy of `uri` is held in memory. Touches no statistics.
    pub fn contains(&self, uri: &str) -> bool {
        self.inner.peek(uri).is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    /// Cache `content`; returns the ETag it was stored under.
    pub async fn set(&self, uri: &str, resource_type: &str, content: Value) -> String {
        let ttl = self.ttl_for(resource_type);
        self.set_with_ttl(uri, resource_type, content, ttl).await
    }

    pub async fn set_with_ttl(
        &self,
        uri: &str,
        resource_type: &str,
        content: Value,
        ttl: Duration,
    ) -> String {
        let etag = compute_etag(&content);
        let resource = CachedResource {
            uri: uri.to_string(),
            resource_type: resource_type.to_string(),
            content,
            etag: etag.clone(),
            cached_at: now_ms(),
        };
        self.inner
            .set_categorized(uri, resource, Some(ttl), resource_type)
            .await;
        etag
    }

    /// Conditional write. Skipped (returns `false`) when a live cached copy
    /// already carries `if_none_match` as its ETag.
    pub async fn set_if_modified(
        &self,
        uri: &str,
        resource_type: &str,
        content: Value,
        if_none_match: Option<&str>,
    ) -> bool {
        if let Some(expected) = if_none_match {
            let current = self.inner.peek(uri).map(|entry| entry.value.etag);
            if current.as_deref() == Some(expected) {
                debug!("Resource {} not modified (etag {})", uri, expected);
                return false;
            }
        }
        self.set(uri, resource_type, content).await;
        true
    }

    pub fn list_cached(&self) -> Vec<CachedResourceInfo> {
        let mut listing: Vec<CachedResourceInfo> = self
            .inner
            .entries()
            .into_iter()
            .map(|(uri, entry)| CachedResourceInfo {
                uri,
                resource_type: entry.value.resource_type,
                etag: entry.value.etag,
                cached_at: entry.value.cached_at,
                expires_at: entry.expires_at,
                access_count: entry.access_count,
            })
            .collect();
        listing.sort_by(|a, b| a.uri.cmp(&b.uri));
        listing
    }

    pub async fn invalidate(&self, uri: &str) -> bool {
        self.inner.invalidate(uri).await
    }

    /// Exact-match on the URI.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        self.inner.invalidate_by_pattern(pattern).await
    }

    pub async fn clear(&self) {
        self.inner.clear().await;
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn hit_ratio(&self) -> f64 {
        self.inner.hit_ratio()
    }

    pub async fn is_healthy(&self) -> bool {
        self.inner.is_healthy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> ResourceCache {
        let mut ttls = HashMap::new();
        ttls.insert("rule".to_string(), Duration::from_millis(30));
        ResourceCache::new(
            TierSettings::new("acmg:cache:resource:", Duration::from_secs(1800)),
            ttls,
            None,
        )
    }

    #[tokio::test]
    async fn test_type_ttl_override() {
        let cache = cache();
        assert_eq!(cache.ttl_for("rule"), Duration::from_millis(30));
        assert_eq!(cache.ttl_for("rules"), Duration::from_secs(1800));

        cache.set("acmg://rules/PVS1", "rule", json!({"code": "PVS1"})).await;
        cache.set("acmg://rules", "rules", json!([1, 2, 3])).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cache.get("acmg://rules/PVS1").await.is_none());
        assert!(cache.get("acmg://rules").await.is_some());
    }

    #[tokio::test]
    async fn test_etag_and_conditional_write() {
        let cache = cache();
        let content = json!({"rules": 28});
        let etag = cache.set("acmg://rules", "rules", content.clone()).await;
        assert_eq!(etag, compute_etag(&content));

        assert!(!cache
            .set_if_modified("acmg://rules", "rules", content.clone(), Some(&etag))
            .await);
        assert!(cache
            .set_if_modified("acmg://rules", "rules", json!({"rules": 29}), Some(&etag))
            .await);
        assert_ne!(cache.get("acmg://rules").await.unwrap().etag, etag);
    }

    #[tokio::test]
    async fn test_list_and_type_counters() {
        let cache = cache();
        cache.set("acmg://rules/benign", "rules", json!([])).await;
        cache.set("acmg://rules", "rules", json!([])).await;
        cache.get("acmg://rules").await;

        let listing = cache.list_cached();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].uri, "acmg://rules");
        assert_eq!(listing[0].access_count, 2);

        let stats = cache.stats();
        assert_eq!(stats.categories["rules"].sets, 2);
        assert_eq!(stats.categories["rules"].hits, 1);
    }

    #[tokio::test]
    async fn test_typed_lookup_counts_misses() {
        let cache = cache();
        cache.set("acmg://rules", "rules", json!([])).await;

        assert!(cache.get_typed("acmg://rules", "rules").await.is_some());
        assert!(cache.get_typed("acmg://rules/benign", "rules").await.is_none());
        assert!(cache.get_typed("acmg://rules/PVS1", "rule").await.is_none());

        let stats = cache.stats();
        assert_eq!(stats.categories["rules"].hits, 1);
        assert_eq!(stats.categories["rules"].misses, 1);
        assert_eq!(stats.categories["rule"].misses, 1);
        assert_eq!(stats.misses, 2);
        assert!(cache.contains("acmg://rules"));
        assert!(!cache.contains("acmg://rules/benign"));
    }
}
