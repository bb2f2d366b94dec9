//! Integration tests for TranscriptResolver.
//!
//! Tests verify:
//! - External lookups never exceed the configured concurrency
//! - Batch resolution omits failed symbols
//! - Timeouts and cancellation surface as errors without poisoning the cache
//! - A shared distributed tier saves a second process the external call

use async_trait::async_trait;
use classifier::cache::{DistributedStore, SqliteStore};
use classifier::config::ResolverConfig;
use classifier::resolver::{GeneTranscriptLookup, TranscriptResolver};
use classifier::types::{now_ms, TranscriptInfo};
use classifier::{ClassifierError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fake upstream that records how many calls overlap.
struct SlowLookup {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowLookup {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GeneTranscriptLookup for SlowLookup {
    async fn lookup_canonical_transcript(&self, gene_symbol: &str) -> Result<TranscriptInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if gene_symbol == "INVALID" {
            return Err(ClassifierError::external(
                "gene-api",
                format!("gene not found: {}", gene_symbol),
            ));
        }
        Ok(TranscriptInfo {
            refseq_id: format!("NM_{}.1", gene_symbol),
            gene_symbol: gene_symbol.to_string(),
            source: "fake".to_string(),
            last_updated: now_ms(),
        })
    }
}

fn resolver_with(lookup: Arc<SlowLookup>, max_concurrency: usize) -> TranscriptResolver {
    let config = ResolverConfig {
        max_concurrency,
        lookup_timeout_ms: 1_000,
        ..Default::default()
    };
    TranscriptResolver::new(lookup, config, None, Duration::from_secs(1))
}

// ============================================================================
// CONCURRENCY BOUND
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_batch_never_exceeds_max_concurrency() {
    let lookup = Arc::new(SlowLookup::new(Duration::from_millis(20)));
    let resolver = resolver_with(Arc::clone(&lookup), 3);

    let symbols: Vec<String> = (0..20).map(|i| format!("GENE{}", i)).collect();
    let resolved = resolver
        .batch_resolve(&symbols, &CancellationToken::new())
        .await;

    assert_eq!(resolved.len(), 20);
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 20);
    assert!(lookup.peak.load(Ordering::SeqCst) <= 3);
    assert!(lookup.peak.load(Ordering::SeqCst) >= 2);
    assert_eq!(resolver.available_permits(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_requests_share_the_bound() {
    let lookup = Arc::new(SlowLookup::new(Duration::from_millis(20)));
    let resolver = Arc::new(resolver_with(Arc::clone(&lookup), 2));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let resolver = Arc::clone(&resolver);
        tasks.push(tokio::spawn(async move {
            resolver
                .resolve(&format!("SYM{}", i), &CancellationToken::new())
                .await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    assert!(lookup.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(resolver.stats().external_calls, 8);
}

// ============================================================================
// BATCH RESOLUTION
// ============================================================================

#[tokio::test]
async fn test_batch_drops_failed_symbols() {
    let lookup = Arc::new(SlowLookup::new(Duration::from_millis(1)));
    let resolver = resolver_with(lookup, 5);

    let resolved = resolver
        .batch_resolve(&["BRCA1", "INVALID"], &CancellationToken::new())
        .await;

    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved["BRCA1"].refseq_id, "NM_BRCA1.1");
    assert!(!resolved.contains_key("INVALID"));
    assert_eq!(resolver.stats().error_count, 1);
}

#[tokio::test]
async fn test_detailed_batch_reports_failures() {
    let lookup = Arc::new(SlowLookup::new(Duration::from_millis(1)));
    let resolver = resolver_with(lookup, 5);

    let batch = resolver
        .batch_resolve_detailed(&["brca1", "INVALID", " "], &CancellationToken::new())
        .await;

    // keyed by the symbol as given
    assert!(batch.resolved.contains_key("brca1"));
    assert!(matches!(
        batch.failed["INVALID"],
        ClassifierError::ExternalService { .. }
    ));
    assert!(matches!(batch.failed[" "], ClassifierError::Validation { .. }));
}

#[tokio::test]
async fn test_empty_batch() {
    let lookup = Arc::new(SlowLookup::new(Duration::from_millis(1)));
    let resolver = resolver_with(Arc::clone(&lookup), 5);
    let empty: [&str; 0] = [];

    assert!(resolver
        .batch_resolve(&empty, &CancellationToken::new())
        .await
        .is_empty());
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_lookup_timeout() {
    let lookup = Arc::new(SlowLookup::new(Duration::from_millis(200)));
    let config = ResolverConfig {
        lookup_timeout_ms: 20,
        ..Default::default()
    };
    let resolver = TranscriptResolver::new(lookup, config, None, Duration::from_secs(1));

    let err = resolver
        .resolve("BRCA1", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClassifierError::Timeout { .. }));
    assert_eq!(resolver.stats().error_count, 1);
    assert_eq!(resolver.stats().cache.entries, 0);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_permit() {
    let lookup = Arc::new(SlowLookup::new(Duration::from_millis(200)));
    let resolver = Arc::new(resolver_with(Arc::clone(&lookup), 1));

    let holder = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move {
            resolver
                .resolve("HOLDER", &CancellationToken::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(resolver.available_permits(), 0);

    let token = CancellationToken::new();
    let waiter = {
        let resolver = Arc::clone(&resolver);
        let token = token.clone();
        tokio::spawn(async move { resolver.resolve("WAITER", &token).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    assert_eq!(waiter.await.unwrap().unwrap_err(), ClassifierError::Cancelled);
    assert!(holder.await.unwrap().is_ok());
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// DISTRIBUTED TIER
// ============================================================================

#[tokio::test]
async fn test_second_resolver_hits_shared_tier() {
    let store: Arc<dyn DistributedStore> = Arc::new(SqliteStore::open_in_memory().unwrap());

    let first_lookup = Arc::new(SlowLookup::new(Duration::from_millis(1)));
    let first = TranscriptResolver::new(
        Arc::clone(&first_lookup) as Arc<dyn GeneTranscriptLookup>,
        ResolverConfig::default(),
        Some(Arc::clone(&store)),
        Duration::from_secs(1),
    );
    let second_lookup = Arc::new(SlowLookup::new(Duration::from_millis(1)));
    let second = TranscriptResolver::new(
        Arc::clone(&second_lookup) as Arc<dyn GeneTranscriptLookup>,
        ResolverConfig::default(),
        Some(store),
        Duration::from_secs(1),
    );

    let token = CancellationToken::new();
    let a = first.resolve("CFTR", &token).await.unwrap();
    let b = second.resolve("cftr", &token).await.unwrap();

    assert_eq!(a, b);
    assert_eq!(second_lookup.calls.load(Ordering::SeqCst), 0);
    let stats = second.stats();
    assert_eq!(stats.distributed_hits, 1);
    assert_eq!(stats.memory_misses, 1);
    assert!(second.is_healthy().await);

    // now promoted into the second resolver's memory tier
    second.resolve("CFTR", &token).await.unwrap();
    assert_eq!(second.stats().memory_hits, 1);
}
