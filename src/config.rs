//! Configuration for the classifier and its caches.
//!
//! Every struct has a `Default` carrying production values, so a config file
//! only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::tiered::TierSettings;
use crate::error::{ClassifierError, Result};

// ================================================================================================
// CACHE CONFIGURATION
// ================================================================================================

/// Tool-result cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCacheConfig {
    pub enabled: bool,
    pub default_ttl_secs: u64,
    pub max_memory_bytes: u64,
    pub max_entries: Option<usize>,
    /// Distributed payloads above this size are gzip-compressed
    pub compression_threshold: usize,
}

impl Default for ToolCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 15 * 60,
            max_memory_bytes: 100 * 1024 * 1024,
            max_entries: None,
            compression_threshold: 1024,
        }
    }
}

impl ToolCacheConfig {
    pub fn tier_settings(&self, store_timeout: Duration) -> TierSettings {
        TierSettings {
            namespace: "acmg:cache:tool:".to_string(),
            enabled: self.enabled,
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            max_entries: self.max_entries,
            max_memory_bytes: Some(self.max_memory_bytes),
            compression_threshold: self.compression_threshold,
            store_timeout,
        }
    }
}

/// Resource cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceCacheConfig {
    pub enabled: bool,
    pub default_ttl_secs: u64,
    pub max_memory_bytes: u64,
    pub max_entries: Option<usize>,
    /// resource type → TTL override in seconds
    pub resource_ttls_secs: HashMap<String, u64>,
    /// Resources warmed into the cache at startup
    pub preload_uris: Vec<String>,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 30 * 60,
            max_memory_bytes: 200 * 1024 * 1024,
            max_entries: None,
            resource_ttls_secs: HashMap::new(),
            preload_uris: vec![
                "acmg://rules".to_string(),
                "acmg://rules/pathogenic".to_string(),
                "acmg://rules/benign".to_string(),
            ],
        }
    }
}

impl ResourceCacheConfig {
    pub fn tier_settings(&self, store_timeout: Duration) -> TierSettings {
        TierSettings {
            namespace: "acmg:cache:resource:".to_string(),
            enabled: self.enabled,
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            max_entries: self.max_entries,
            max_memory_bytes: Some(self.max_memory_bytes),
            compression_threshold: 1024,
            store_timeout,
        }
    }

    pub fn resource_ttls(&self) -> HashMap<String, Duration> {
        self.resource_ttls_secs
            .iter()
            .map(|(k, v)| (k.clone(), Duration::from_secs(*v)))
            .collect()
    }
}

/// Periodic clean-up policy of the evidence cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Entries older than this are always removed
    pub max_age_secs: u64,
    /// Entries accessed fewer times than this ...
    pub min_access_count: u64,
    /// ... and idle for longer than this are removed
    pub stale_after_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60 * 60,
            max_age_secs: 48 * 60 * 60,
            min_access_count: 2,
            stale_after_secs: 6 * 60 * 60,
        }
    }
}

/// Evidence cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceCacheConfig {
    pub enabled: bool,
    /// TTL of a cached evidence bundle
    pub max_age_secs: u64,
    pub max_entries: usize,
    pub sweep: SweepConfig,
}

impl Default for EvidenceCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_secs: 24 * 60 * 60,
            max_entries: 10_000,
            sweep: SweepConfig::default(),
        }
    }
}

impl EvidenceCacheConfig {
    pub fn tier_settings(&self, store_timeout: Duration) -> TierSettings {
        TierSettings {
            namespace: "acmg:cache:evidence:".to_string(),
            enabled: self.enabled,
            default_ttl: Duration::from_secs(self.max_age_secs),
            max_entries: Some(self.max_entries),
            max_memory_bytes: None,
            compression_threshold: 1024,
            store_timeout,
        }
    }
}

// ================================================================================================
// RESOLVER & DISTRIBUTED TIER
// ================================================================================================

/// Transcript resolver configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub memory_ttl_secs: u64,
    pub distributed_ttl_secs: u64,
    pub max_memory_entries: usize,
    /// Upper bound on simultaneous external lookups
    pub max_concurrency: usize,
    pub lookup_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            memory_ttl_secs: 15 * 60,
            distributed_ttl_secs: 24 * 60 * 60,
            max_memory_entries: 1000,
            max_concurrency: 5,
            lookup_timeout_ms: 10_000,
        }
    }
}

impl ResolverConfig {
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_secs)
    }

    pub fn distributed_ttl(&self) -> Duration {
        Duration::from_secs(self.distributed_ttl_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn tier_settings(&self, store_timeout: Duration) -> TierSettings {
        TierSettings {
            namespace: "acmg:cache:transcript:".to_string(),
            enabled: true,
            default_ttl: self.memory_ttl(),
            max_entries: Some(self.max_memory_entries),
            max_memory_bytes: None,
            compression_threshold: 1024,
            store_timeout,
        }
    }
}

/// Optional second cache tier shared between processes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedConfig {
    pub sqlite_path: PathBuf,
    pub timeout_ms: u64,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("./var/data/acmg_cache.db"),
            timeout_ms: 2_000,
        }
    }
}

// ================================================================================================
// TOP-LEVEL
// ================================================================================================

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClassifierConfig {
    pub tool_cache: ToolCacheConfig,
    pub resource_cache: ResourceCacheConfig,
    pub evidence_cache: EvidenceCacheConfig,
    pub resolver: ResolverConfig,
    /// `None` keeps every cache in-process only
    pub distributed: Option<DistributedConfig>,
}

impl ClassifierConfig {
    /// Load from a JSON file; absent fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ClassifierError::validation("config", format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: ClassifierConfig = serde_json::from_str(&raw).map_err(|e| {
            ClassifierError::validation("config", format!("invalid JSON in {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Override selected values from `ACMG_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse::<usize>("ACMG_RESOLVER_MAX_CONCURRENCY") {
            self.resolver.max_concurrency = v;
        }
        if let Some(v) = env_parse::<u64>("ACMG_TOOL_CACHE_TTL_SECS") {
            self.tool_cache.default_ttl_secs = v;
        }
        if let Some(v) = env_parse::<u64>("ACMG_SWEEP_INTERVAL_SECS") {
            self.evidence_cache.sweep.interval_secs = v;
        }
        if let Ok(path) = std::env::var("ACMG_CACHE_DB") {
            let mut distributed = self.distributed.clone().unwrap_or_default();
            distributed.sqlite_path = PathBuf::from(path);
            self.distributed = Some(distributed);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolver.max_concurrency == 0 {
            return Err(ClassifierError::validation(
                "resolver.max_concurrency",
                "must be at least 1",
            ));
        }
        if self.evidence_cache.sweep.enabled && self.evidence_cache.sweep.interval_secs == 0 {
            return Err(ClassifierError::validation(
                "evidence_cache.sweep.interval_secs",
                "must be positive when the sweep is enabled",
            ));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        self.distributed
            .as_ref()
            .map(|d| Duration::from_millis(d.timeout_ms))
            .unwrap_or(Duration::from_millis(DistributedConfig::default().timeout_ms))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
