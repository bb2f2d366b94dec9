//! Gene symbol → canonical transcript resolution.
//!
//! Two cache tiers in front of a slow, rate-limited external lookup. Every
//! external call holds a permit from one counting semaphore, so no more than
//! `max_concurrency` lookups are ever in flight, whether they come from single
//! requests or from a batch.
//!
//! Per request:
//! memory → distributed → (permit → external call → populate both tiers).

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheStats, DistributedStore, Lookup, TieredCache};
use crate::config::ResolverConfig;
use crate::error::{ClassifierError, Result};
use crate::types::TranscriptInfo;

/// External gene/transcript API. Rate limiting and retries are the
/// implementor's business.
#[async_trait]
pub trait GeneTranscriptLookup: Send + Sync {
    async fn lookup_canonical_transcript(&self, gene_symbol: &str) -> Result<TranscriptInfo>;
}

/// Trim and uppercase, so `"brca1"` and `" BRCA1 "` are one cache entity.
pub fn normalize_gene_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    distributed_hits: AtomicU64,
    distributed_misses: AtomicU64,
    external_calls: AtomicU64,
    total_requests: AtomicU64,
    error_count: AtomicU64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverStats {
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub distributed_hits: u64,
    pub distributed_misses: u64,
    pub external_calls: u64,
    pub total_requests: u64,
    pub error_count: u64,
    /// Underlying cache counters (evictions, memory usage)
    pub cache: CacheStats,
}

impl ResolverStats {
    /// Share of requests answered by either cache tier.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.memory_hits + self.distributed_hits;
        let lookups = self.memory_hits + self.memory_misses;
        if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        }
    }
}

/// Result of [`TranscriptResolver::batch_resolve_detailed`].
#[derive(Debug, Default)]
pub struct BatchResolution {
    /// Keyed by the symbol as given by the caller
    pub resolved: HashMap<String, TranscriptInfo>,
    pub failed: HashMap<String, ClassifierError>,
}

pub struct TranscriptResolver {
    lookup: Arc<dyn GeneTranscriptLookup>,
    cache: TieredCache<TranscriptInfo>,
    permits: Semaphore,
    config: ResolverConfig,
    counters: Counters,
}

impl TranscriptResolver {
    pub fn new(
        lookup: Arc<dyn GeneTranscriptLookup>,
        config: ResolverConfig,
        distributed: Option<Arc<dyn DistributedStore>>,
        store_timeout: Duration,
    ) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        info!(
            "Transcript resolver initialised (max concurrency: {}, memory ttl: {:?}, distributed: {})",
            max_concurrency,
            config.memory_ttl(),
            distributed.is_some()
        );
        Self {
            lookup,
            cache: TieredCache::new(config.tier_settings(store_timeout), distributed),
            permits: Semaphore::new(max_concurrency),
            config,
            counters: Counters::default(),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.config.max_concurrency.max(1)
    }

    /// Permits currently free for external lookups.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn resolve(&self, gene_symbol: &str, token: &CancellationToken) -> Result<TranscriptInfo> {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);

        let symbol = normalize_gene_symbol(gene_symbol);
        if symbol.is_empty() {
            self.counters.error_count.fetch_add(1, Ordering::Relaxed);
            return Err(ClassifierError::validation(
                "gene_symbol",
                "gene symbol cannot be empty",
            ));
        }
        if token.is_cancelled() {
            return Err(ClassifierError::Cancelled);
        }

        match self.cache.get_traced(&symbol).await {
            Lookup::Memory(info) => {
                self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                debug!("Transcript cache hit in memory for {}: {}", symbol, info.refseq_id);
                return Ok(info);
            }
            Lookup::Distributed(info) => {
                self.counters.memory_misses.fetch_add(1, Ordering::Relaxed);
                self.counters.distributed_hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Transcript cache hit in distributed tier for {}: {}",
                    symbol, info.refseq_id
                );
                return Ok(info);
            }
            Lookup::Miss => {
                self.counters.memory_misses.fetch_add(1, Ordering::Relaxed);
                if self.cache.has_distributed() {
                    self.counters.distributed_misses.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        match self.fetch_external(&symbol, token).await {
            Ok(info) => {
                self.cache
                    .set_with_tiers(
                        &symbol,
                        info.clone(),
                        self.config.memory_ttl(),
                        self.config.distributed_ttl(),
                    )
                    .await;
                info!(
                    "Resolved transcript for {} from {}: {}",
                    symbol, info.source, info.refseq_id
                );
                Ok(info)
            }
            Err(e) => {
                self.counters.error_count.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to resolve transcript for gene {}: {}", symbol, e);
                Err(e)
            }
        }
    }

    async fn fetch_external(&self, symbol: &str, token: &CancellationToken) -> Result<TranscriptInfo> {
        let _permit = tokio::select! {
            _ = token.cancelled() => return Err(ClassifierError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| {
                ClassifierError::external("transcript-lookup", "resolver is shut down")
            })?,
        };

        self.counters.external_calls.fetch_add(1, Ordering::Relaxed);
        let timeout = self.config.lookup_timeout();
        tokio::select! {
            _ = token.cancelled() => Err(ClassifierError::Cancelled),
            outcome = tokio::time::timeout(timeout, self.lookup.lookup_canonical_transcript(symbol)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(ClassifierError::Timeout {
                        operation: "transcript lookup",
                        after: timeout,
                    }),
                }
            }
        }
    }

    /// RefSeq id of the canonical transcript.
    pub async fn canonical_transcript(&self, gene_symbol: &str, token: &CancellationToken) -> Result<String> {
        self.resolve(gene_symbol, token).await.map(|t| t.refseq_id)
    }

    /// Known transcripts of a gene. Only the canonical one is tracked.
    pub async fn all_transcripts(
        &self,
        gene_symbol: &str,
        token: &CancellationToken,
    ) -> Result<Vec<TranscriptInfo>> {
        self.resolve(gene_symbol, token).await.map(|t| vec![t])
    }

    /// Resolve every symbol concurrently. Failed symbols are left out of the
    /// map; use [`Self::batch_resolve_detailed`] to see why.
    pub async fn batch_resolve<S: AsRef<str>>(
        &self,
        symbols: &[S],
        token: &CancellationToken,
    ) -> HashMap<String, TranscriptInfo> {
        self.batch_resolve_detailed(symbols, token).await.resolved
    }

    pub async fn batch_resolve_detailed<S: AsRef<str>>(
        &self,
        symbols: &[S],
        token: &CancellationToken,
    ) -> BatchResolution {
        if symbols.is_empty() {
            return BatchResolution::default();
        }
        info!("Starting batch transcript resolution of {} symbols", symbols.len());

        let pending = symbols.iter().map(|symbol| async move {
            let symbol = symbol.as_ref();
            let outcome = if token.is_cancelled() {
                Err(ClassifierError::Cancelled)
            } else {
                self.resolve(symbol, token).await
            };
            (symbol.to_string(), outcome)
        });

        let mut batch = BatchResolution::default();
        for (symbol, outcome) in join_all(pending).await {
            match outcome {
                Ok(info) => {
                    batch.resolved.insert(symbol, info);
                }
                Err(e) => {
                    batch.failed.insert(symbol, e);
                }
            }
        }

        info!(
            "Completed batch transcript resolution: {} resolved, {} failed",
            batch.resolved.len(),
            batch.failed.len()
        );
        batch
    }

    /// Drop the cached entry for one symbol; the distributed copy is removed
    /// best-effort.
    pub async fn invalidate(&self, gene_symbol: &str) -> Result<bool> {
        let symbol = normalize_gene_symbol(gene_symbol);
        if symbol.is_empty() {
            return Err(ClassifierError::validation(
                "gene_symbol",
                "gene symbol cannot be empty",
            ));
        }
        let removed = self.cache.invalidate(&symbol).await;
        info!("Invalidated transcript cache for {}", symbol);
        Ok(removed)
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            memory_misses: self.counters.memory_misses.load(Ordering::Relaxed),
            distributed_hits: self.counters.distributed_hits.load(Ordering::Relaxed),
            distributed_misses: self.counters.distributed_misses.load(Ordering::Relaxed),
            external_calls: self.counters.external_calls.load(Ordering::Relaxed),
            total_requests: self.counters.total_requests.load(Ordering::Relaxed),
            error_count: self.counters.error_count.load(Ordering::Relaxed),
            cache: self.cache.stats(),
        }
    }

    pub async fn is_healthy(&self) -> bool {
        self.cache.is_healthy().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now_ms;

    struct Fixed;

    #[async_trait]
    impl GeneTranscriptLookup for Fixed {
        async fn lookup_canonical_transcript(&self, gene_symbol: &str) -> Result<TranscriptInfo> {
            Ok(TranscriptInfo {
                refseq_id: format!("NM_{}.1", gene_symbol),
                gene_symbol: gene_symbol.to_string(),
                source: "fixed".to_string(),
                last_updated: now_ms(),
            })
        }
    }

    fn resolver() -> TranscriptResolver {
        TranscriptResolver::new(
            Arc::new(Fixed),
            ResolverConfig::default(),
            None,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_gene_symbol(" brca1 "), "BRCA1");
        assert_eq!(normalize_gene_symbol("\t"), "");
    }

    #[tokio::test]
    async fn test_empty_symbol_rejected() {
        let resolver = resolver();
        let err = resolver
            .resolve("   ", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifierError::Validation { .. }));
        assert_eq!(resolver.stats().error_count, 1);
        assert_eq!(resolver.stats().external_calls, 0);
    }

    #[tokio::test]
    async fn test_second_request_served_from_memory() {
        let resolver = resolver();
        let token = CancellationToken::new();
        let first = resolver.resolve("tp53", &token).await.unwrap();
        let second = resolver.resolve("TP53 ", &token).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.refseq_id, "NM_TP53.1");

        let stats = resolver.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.external_calls, 1);
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.memory_misses, 1);
        assert_eq!(stats.distributed_misses, 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let resolver = resolver();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(
            resolver.resolve("BRCA1", &token).await.unwrap_err(),
            ClassifierError::Cancelled
        );
        assert_eq!(resolver.stats().external_calls, 0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let resolver = resolver();
        let token = CancellationToken::new();
        resolver.resolve("BRCA2", &token).await.unwrap();
        assert!(resolver.invalidate("brca2").await.unwrap());
        resolver.resolve("BRCA2", &token).await.unwrap();
        assert_eq!(resolver.stats().external_calls, 2);
        assert!(resolver.invalidate(" ").await.is_err());
    }
}
