//! Cache of aggregated evidence bundles, keyed by variant identity.
//!
//! The only actively swept cache; see [`super::sweeper`].

use log::{debug, info};
use std::sync::Arc;

use super::entry::CacheStats;
use super::store::DistributedStore;
use super::tiered::{TierSettings, TieredCache};
use crate::config::SweepConfig;
use crate::types::{now_ms, AggregatedEvidence, StandardizedVariant};

pub struct EvidenceCache {
    inner: TieredCache<AggregatedEvidence>,
    sweep: SweepConfig,
}

impl EvidenceCache {
    pub fn new(
        settings: TierSettings,
        sweep: SweepConfig,
        distributed: Option<Arc<dyn DistributedStore>>,
    ) -> Self {
        info!(
            "Evidence cache initialised (enabled: {}, max age: {:?}, max entries: {:?})",
            settings.enabled, settings.default_ttl, settings.max_entries
        );
        Self {
            inner: TieredCache::new(settings, distributed),
            sweep,
        }
    }

    /// Preferred HGVS form, else `gene:<SYMBOL>` for gene-only input. A
    /// variant with neither has no stable identity and is never cached.
    pub fn key_for(variant: &StandardizedVariant) -> Option<String> {
        if let Some(hgvs) = variant.preferred_hgvs() {
            return Some(hgvs.to_string());
        }
        let gene = variant.gene_symbol.trim();
        if gene.is_empty() {
            None
        } else {
            Some(format!("gene:{}", gene.to_uppercase()))
        }
    }

    pub async fn get(&self, variant: &StandardizedVariant) -> Option<AggregatedEvidence> {
        let key = Self::key_for(variant)?;
        self.inner.get(&key).await
    }

    pub async fn set(&self, variant: &StandardizedVariant, evidence: AggregatedEvidence) {
        match Self::key_for(variant) {
            Some(key) => self.inner.set(&key, evidence, None).await,
            None => debug!("Not caching evidence for {}: no stable key", variant.id),
        }
    }

    pub async fn invalidate(&self, variant: &StandardizedVariant) -> bool {
        match Self::key_for(variant) {
            Some(key) => self.inner.invalidate(&key).await,
            None => false,
        }
    }

    /// Exact-match on the cache key (see [`Self::key_for`]).
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

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn sweep_config(&self) -> &SweepConfig {
        &self.sweep
    }

    /// Remove in-process entries that are expired, older than the maximum
    /// age, or rarely read and idle past the stale threshold. Returns the
    /// number removed.
    pub fn sweep(&self) -> usize {
        let now = now_ms();
        let max_age_ms = self.sweep.max_age_secs.saturating_mul(1000);
        let stale_ms = self.sweep.stale_after_secs.saturating_mul(1000);
        let min_access = self.sweep.min_access_count;

        self.inner.purge_memory_where(|_, entry| {
            entry.is_expired_at(now)
                || entry.age_ms(now) > max_age_ms
                || (entry.access_count < min_access && entry.idle_ms(now) > stale_ms)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PopulationData;
    use std::time::Duration;

    fn variant(coding: &str) -> StandardizedVariant {
        StandardizedVariant {
            id: format!("id-{}", coding),
            hgvs_coding: coding.to_string(),
            ..Default::default()
        }
    }

    fn evidence(af: f64) -> AggregatedEvidence {
        AggregatedEvidence {
            population: Some(PopulationData {
                allele_frequency: af,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn cache() -> EvidenceCache {
        EvidenceCache::new(
            TierSettings::new("acmg:cache:evidence:", Duration::from_secs(3600)),
            SweepConfig::default(),
            None,
        )
    }

    #[test]
    fn test_key_prefers_hgvs() {
        assert_eq!(
            EvidenceCache::key_for(&variant("NM_000492.3:c.1A>G")).as_deref(),
            Some("NM_000492.3:c.1A>G")
        );

        let gene_only = StandardizedVariant {
            id: "v-9".into(),
            gene_symbol: "brca1".into(),
            ..Default::default()
        };
        assert_eq!(EvidenceCache::key_for(&gene_only).as_deref(), Some("gene:BRCA1"));

        let bare = StandardizedVariant {
            id: "v-10".into(),
            ..Default::default()
        };
        assert_eq!(EvidenceCache::key_for(&bare), None);
    }

    #[tokio::test]
    async fn test_variant_without_identity_not_cached() {
        let cache = cache();
        let bare = StandardizedVariant {
            id: "v-10".into(),
            ..Default::default()
        };
        cache.set(&bare, evidence(0.1)).await;
        assert!(cache.is_empty());
        assert!(cache.get(&bare).await.is_none());
        assert!(!cache.invalidate(&bare).await);
    }

    #[tokio::test]
    async fn test_invalidate_by_pattern_is_exact() {
        let cache = cache();
        cache.set(&variant("NM_000492.3:c.1A>G"), evidence(0.1)).await;
        cache.set(&variant("NM_000492.3:c.2A>G"), evidence(0.2)).await;

        assert_eq!(cache.invalidate_by_pattern("NM_000492.3:*").await, 0);
        assert_eq!(cache.invalidate_by_pattern("NM_000492.3:c.1A>G").await, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&variant("NM_000492.3:c.2A>G")).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_removes_rarely_read_stale_entries() {
        let sweep = SweepConfig {
            stale_after_secs: 0,
            ..Default::default()
        };
        let cache = EvidenceCache::new(
            TierSettings::new("acmg:cache:evidence:", Duration::from_secs(3600)),
            sweep,
            None,
        );

        let cold = variant("c.1A>G");
        let hot = variant("c.2A>G");
        cache.set(&cold, evidence(0.1)).await;
        cache.set(&hot, evidence(0.2)).await;
        // second read lifts access_count to the minimum
        assert!(cache.get(&hot).await.is_some());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.sweep(), 1);
        assert!(cache.get(&hot).await.is_some());
        assert!(cache.get(&cold).await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_entries_past_max_age() {
        let sweep = SweepConfig {
            max_age_secs: 0,
            ..Default::default()
        };
        let cache = EvidenceCache::new(
            TierSettings::new("acmg:cache:evidence:", Duration::from_secs(3600)),
            sweep,
            None,
        );
        cache.set(&variant("c.1A>G"), evidence(0.1)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }
}
