//! Cache of tool execution results keyed by a digest of (tool, parameters).

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use super::entry::CacheStats;
use super::store::DistributedStore;
use super::tiered::{TierSettings, TieredCache};
use crate::types::now_ms;

/// One cached tool execution, successful or failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedToolResult {
    pub tool: String,
    pub result: Option<Value>,
    /// Set for cached failures
    pub error_code: Option<String>,
    pub cached_at: u64,
}

impl CachedToolResult {
    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }
}

/// Deterministic cache key: SHA-256 hex of `tool + "::" + canonical JSON`.
///
/// Object keys are sorted at every depth, so two parameter maps with the same
/// pairs in a different insertion order produce the same key.
pub fn generate_key(tool: &str, params: &Value) -> String {
    let canonical = canonicalize(params);
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update(b"::");
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

pub struct ToolResultCache {
    inner: TieredCache<CachedToolResult>,
}

impl ToolResultCache {
    pub fn new(settings: TierSettings, distributed: Option<Arc<dyn DistributedStore>>) -> Self {
        info!(
            "Tool result cache initialised (enabled: {}, ttl: {:?}, distributed: {})",
            settings.enabled,
            settings.default_ttl,
            distributed.is_some()
        );
        Self {
            inner: TieredCache::new(settings, distributed),
        }
    }

    pub async fn get(&self, tool: &str, params: &Value) -> Option<CachedToolResult> {
        let key = generate_key(tool, params);
        self.inner.get_categorized(&key, tool).await
    }

    pub async fn set(&self, tool: &str, params: &Value, result: Value, ttl: Option<Duration>) {
        let key = generate_key(tool, params);
        let entry = CachedToolResult {
            tool: tool.to_string(),
            result: Some(result),
            error_code: None,
            cached_at: now_ms(),
        };
        self.inner.set_categorized(&key, entry, ttl, tool).await;
    }

    /// Cache a failed execution for a quarter of the default TTL.
    pub async fn set_error(&self, tool: &str, params: &Value, error_code: &str) {
        let key = generate_key(tool, params);
        let ttl = self.inner.settings().default_ttl / 4;
        let entry = CachedToolResult {
            tool: tool.to_string(),
            result: None,
            error_code: Some(error_code.to_string()),
            cached_at: now_ms(),
        };
        self.inner.set_categorized(&key, entry, Some(ttl), tool).await;
    }

    pub async fn invalidate(&self, tool: &str, params: &Value) -> bool {
        self.inner.invalidate(&generate_key(tool, params)).await
    }

    /// Drop every in-process result of `tool`.
    pub async fn invalidate_by_tool(&self, tool: &str) -> usize {
        let removed = self
            .inner
            .invalidate_where(|_, entry| entry.category.as_deref() == Some(tool))
            .await;
        info!("Invalidated {} cached results for tool {}", removed, tool);
        removed
    }

    /// Exact-match on a full cache key.
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

    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }
}
