//! Classification service: the surface exposed to the tool layer.
//!
//! Ties the parser, knowledge base, transcript resolver, rule engine and the
//! three caches together. Only malformed input and unknown rule codes come
//! back as errors; every upstream or cache failure degrades the report
//! instead.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::{
    CacheStats, CachedResource, DistributedStore, EvidenceCache, EvidenceSweeper, ResourceCache,
    SqliteStore, SweepHandle, ToolResultCache,
};
use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Result};
use crate::knowledge::{
    BasicVariantParser, KnowledgeBase, OfflineKnowledgeBase, StaticTranscriptTable, VariantParser,
};
use crate::resolver::{GeneTranscriptLookup, ResolverStats, TranscriptResolver};
use crate::rules::{
    CombinationOutcome, EvidenceCombiner, RuleEngine, RuleResult,
};
use crate::types::{
    now_ms, AggregatedEvidence, Classification, ConfidenceLevel, RuleCategory,
    StandardizedVariant,
};

/// Tool name under which whole reports are memoized.
pub const CLASSIFY_TOOL: &str = "classify_variant";

const RULES_RESOURCE_TYPE: &str = "acmg_rules";
const RULES_URI: &str = "acmg://rules";

// ================================================================================================
// REQUEST / RESPONSE TYPES
// ================================================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyOptions {
    /// Transcript to use instead of the resolved canonical one
    pub preferred_isoform: Option<String>,
    pub clinical_context: Option<String>,
    /// Attach every rule result and the raw evidence to the report
    pub include_evidence: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub variant_id: String,
    /// Notation the classification was run on
    pub input_notation: String,
    pub gene_symbol: String,
    pub transcript_id: String,
    pub classification: Classification,
    pub confidence: ConfidenceLevel,
    pub applied_rules: Vec<RuleResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_results: Option<Vec<RuleResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<AggregatedEvidence>,
    pub evidence_summary: String,
    pub recommendations: Vec<String>,
    pub combination_rule: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_context: Option<String>,
    /// Collaborators that failed while building this report
    #[serde(default)]
    pub degraded_sources: Vec<String>,
    pub processing_time_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HgvsValidation {
    pub is_valid: bool,
    pub normalized_hgvs: Option<String>,
    pub gene_symbol: Option<String>,
    pub transcript_id: Option<String>,
    pub genomic_position: Option<String>,
    pub predicted_protein: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub tool_cache: CacheStats,
    pub resource_cache: CacheStats,
    pub evidence_cache: CacheStats,
    pub resolver: ResolverStats,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub tool_cache: bool,
    pub resource_cache: bool,
    pub evidence_cache: bool,
    pub resolver: bool,
}

/// Outcome of [`ClassifierService::preload_resources`].
#[derive(Debug, Default)]
pub struct PreloadReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: HashMap<String, ClassifierError>,
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        self.tool_cache && self.resource_cache && self.evidence_cache && self.resolver
    }
}

// ================================================================================================
// SERVICE
// ================================================================================================

pub struct ClassifierService {
    parser: Arc<dyn VariantParser>,
    knowledge: Arc<dyn KnowledgeBase>,
    resolver: Arc<TranscriptResolver>,
    engine: RuleEngine,
    combiner: EvidenceCombiner,
    tool_cache: Arc<ToolResultCache>,
    resource_cache: Arc<ResourceCache>,
    evidence_cache: Arc<EvidenceCache>,
}

impl ClassifierService {
    /// Build the service, opening the SQLite tier when one is configured.
    /// A store that cannot be opened leaves every cache in-process only.
    pub fn new(
        config: &ClassifierConfig,
        parser: Arc<dyn VariantParser>,
        knowledge: Arc<dyn KnowledgeBase>,
        lookup: Arc<dyn GeneTranscriptLookup>,
    ) -> Result<Self> {
        let store: Option<Arc<dyn DistributedStore>> = match &config.distributed {
            Some(distributed) => match SqliteStore::open(&distributed.sqlite_path) {
                Ok(store) => {
                    info!(
                        "Distributed cache tier opened at {}",
                        distributed.sqlite_path.display()
                    );
                    Some(Arc::new(store))
                }
                Err(e) => {
                    warn!(
                        "Distributed cache tier unavailable ({}), continuing in-process only",
                        e
                    );
                    None
                }
            },
            None => None,
        };
        Self::with_store(config, parser, knowledge, lookup, store)
    }

    pub fn with_store(
        config: &ClassifierConfig,
        parser: Arc<dyn VariantParser>,
        knowledge: Arc<dyn KnowledgeBase>,
        lookup: Arc<dyn GeneTranscriptLookup>,
        store: Option<Arc<dyn DistributedStore>>,
    ) -> Result<Self> {
        config.validate()?;
        let timeout = config.store_timeout();

        let service = Self {
            parser,
            knowledge,
            resolver: Arc::new(TranscriptResolver::new(
                lookup,
                config.resolver.clone(),
                store.clone(),
                timeout,
            )),
            engine: RuleEngine::acmg_2015(),
            combiner: EvidenceCombiner::new(),
            tool_cache: Arc::new(ToolResultCache::new(
                config.tool_cache.tier_settings(timeout),
                store.clone(),
            )),
            resource_cache: Arc::new(ResourceCache::new(
                config.resource_cache.tier_settings(timeout),
                config.resource_cache.resource_ttls(),
                store.clone(),
            )),
            evidence_cache: Arc::new(EvidenceCache::new(
                config.evidence_cache.tier_settings(timeout),
                config.evidence_cache.sweep.clone(),
                store,
            )),
        };
        info!(
            "Classifier service ready with {} ACMG/AMP rules",
            service.engine.registry().len()
        );
        Ok(service)
    }

    /// Service wired to the bundled parser and offline collaborators.
    pub fn offline(config: &ClassifierConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(BasicVariantParser::new()?),
            Arc::new(OfflineKnowledgeBase::new()),
            Arc::new(StaticTranscriptTable::with_defaults()),
        )
    }

    // --------------------------------------------------------------------------------------------
    // Classification
    // --------------------------------------------------------------------------------------------

    /// Full workflow: parse → prepare → gather evidence → evaluate → combine.
    pub async fn classify_variant(
        &self,
        input: &str,
        options: &ClassifyOptions,
        token: &CancellationToken,
    ) -> Result<ClassificationReport> {
        let started = Instant::now();
        if token.is_cancelled() {
            return Err(ClassifierError::Cancelled);
        }

        let mut variant = self.parser.parse(input)?;
        info!(
            "Starting variant classification for {} ({})",
            input.trim(),
            variant.id
        );

        let mut degraded = Vec::new();
        let notation = self
            .prepare_variant(&mut variant, input.trim(), options, token, &mut degraded)
            .await?;

        let evidence = self.evidence_for(&variant, token, &mut degraded).await?;

        let results = self.engine.evaluate_all(&variant, &evidence);
        let outcome = self.combiner.combine(&results);
        let recommendations =
            recommendations(outcome.classification, outcome.confidence, &evidence);
        let evidence_summary = evidence_summary(&results, &evidence);
        let applied_rules: Vec<RuleResult> =
            results.iter().filter(|r| r.is_applied()).cloned().collect();

        let report = ClassificationReport {
            variant_id: variant.id.clone(),
            input_notation: notation,
            gene_symbol: variant.gene_symbol.clone(),
            transcript_id: variant.transcript_id.clone(),
            classification: outcome.classification,
            confidence: outcome.confidence,
            applied_rules,
            rule_results: options.include_evidence.then(|| results.clone()),
            evidence: options.include_evidence.then(|| evidence.clone()),
            evidence_summary,
            recommendations,
            combination_rule: outcome.combination_rule,
            summary: outcome.summary,
            clinical_context: options.clinical_context.clone(),
            degraded_sources: degraded,
            processing_time_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            "Variant classification completed: {} is {} ({} confidence, {} rules applied, {}ms)",
            report.variant_id,
            report.classification,
            report.confidence,
            report.applied_rules.len(),
            report.processing_time_ms
        );
        Ok(report)
    }

    /// [`Self::classify_variant`] memoized in the tool-result cache. Parse
    /// failures are cached too, for a shorter TTL.
    pub async fn classify_variant_cached(
        &self,
        input: &str,
        options: &ClassifyOptions,
        token: &CancellationToken,
    ) -> Result<ClassificationReport> {
        let params = json!({
            "input": input.trim(),
            "preferred_isoform": options.preferred_isoform,
            "clinical_context": options.clinical_context,
            "include_evidence": options.include_evidence,
        });

        if let Some(cached) = self.tool_cache.get(CLASSIFY_TOOL, &params).await {
            if let Some(code) = cached.error_code {
                debug!("Cached parse failure for {}", input.trim());
                return Err(ClassifierError::Parse(code));
            }
            if let Some(value) = cached.result {
                match serde_json::from_value::<ClassificationReport>(value) {
                    Ok(report) => return Ok(report),
                    Err(e) => warn!("Discarding unreadable cached report for {}: {}", input.trim(), e),
                }
            }
        }

        match self.classify_variant(input, options, token).await {
            Ok(report) => {
                match serde_json::to_value(&report) {
                    Ok(value) => self.tool_cache.set(CLASSIFY_TOOL, &params, value, None).await,
                    Err(e) => warn!("Could not cache report for {}: {}", input.trim(), e),
                }
                Ok(report)
            }
            Err(ClassifierError::Parse(message)) => {
                self.tool_cache
                    .set_error(CLASSIFY_TOOL, &params, &message)
                    .await;
                Err(ClassifierError::Parse(message))
            }
            Err(e) => Err(e),
        }
    }

    /// Fill in the transcript and choose the working notation.
    async fn prepare_variant(
        &self,
        variant: &mut StandardizedVariant,
        input: &str,
        options: &ClassifyOptions,
        token: &CancellationToken,
        degraded: &mut Vec<String>,
    ) -> Result<String> {
        let mut notation = variant
            .preferred_hgvs()
            .map(str::to_string)
            .unwrap_or_default();

        if !variant.gene_symbol.is_empty() && variant.transcript_id.is_empty() {
            match self.resolver.resolve(&variant.gene_symbol, token).await {
                Ok(transcript) => {
                    debug!(
                        "Resolved {} to transcript {}",
                        variant.gene_symbol, transcript.refseq_id
                    );
                    if notation.is_empty() {
                        notation = format!("{}:c.?", transcript.refseq_id);
                    }
                    variant.transcript_id = transcript.refseq_id;
                }
                Err(ClassifierError::Cancelled) => return Err(ClassifierError::Cancelled),
                Err(e) => {
                    warn!(
                        "Transcript resolution failed for {}, continuing without it: {}",
                        variant.gene_symbol, e
                    );
                    degraded.push("transcript-resolver".to_string());
                }
            }
        }

        if notation.is_empty() {
            notation = input.to_string();
        }

        if let Some(isoform) = options.preferred_isoform.as_deref().map(str::trim) {
            if !isoform.is_empty() {
                debug!("Applying preferred isoform {}", isoform);
                variant.transcript_id = isoform.to_string();
                if let Some((_, change)) = input.split_once(':') {
                    if change.contains('.') {
                        notation = format!("{}:{}", isoform, change);
                    }
                }
            }
        }

        Ok(notation)
    }

    /// Evidence from the cache, or from the knowledge base on a miss. An
    /// upstream failure yields empty evidence.
    async fn evidence_for(
        &self,
        variant: &StandardizedVariant,
        token: &CancellationToken,
        degraded: &mut Vec<String>,
    ) -> Result<AggregatedEvidence> {
        if let Some(evidence) = self.evidence_cache.get(variant).await {
            debug!(
                "Evidence cache hit for {}",
                EvidenceCache::key_for(variant).unwrap_or_default()
            );
            return Ok(evidence);
        }

        let gathered = tokio::select! {
            _ = token.cancelled() => return Err(ClassifierError::Cancelled),
            result = self.knowledge.gather_evidence(variant) => result,
        };

        match gathered {
            Ok(evidence) => {
                self.evidence_cache.set(variant, evidence.clone()).await;
                Ok(evidence)
            }
            Err(e) => {
                warn!(
                    "Failed to gather evidence for {}, proceeding with available data: {}",
                    variant.id, e
                );
                degraded.push("knowledge-base".to_string());
                Ok(AggregatedEvidence::default())
            }
        }
    }

    // --------------------------------------------------------------------------------------------
    // Rules
    // --------------------------------------------------------------------------------------------

    /// Evaluate one criterion against a known variant and evidence.
    pub fn apply_rule(
        &self,
        code: &str,
        variant: &StandardizedVariant,
        evidence: &AggregatedEvidence,
    ) -> Result<RuleResult> {
        self.engine.evaluate_one(code, variant, evidence)
    }

    /// Parse `input` and evaluate one criterion, gathering evidence when none
    /// is supplied.
    pub async fn apply_rule_to_notation(
        &self,
        code: &str,
        input: &str,
        evidence: Option<AggregatedEvidence>,
        token: &CancellationToken,
    ) -> Result<RuleResult> {
        if self.engine.registry().get(&code.trim().to_uppercase()).is_none() {
            return Err(ClassifierError::UnknownRule(code.trim().to_string()));
        }
        let variant = self.parser.parse(input)?;
        let evidence = match evidence {
            Some(evidence) => evidence,
            None => {
                let mut degraded = Vec::new();
                self.evidence_for(&variant, token, &mut degraded).await?
            }
        };
        self.apply_rule(code, &variant, &evidence)
    }

    pub fn combine_evidence(&self, results: &[RuleResult]) -> CombinationOutcome {
        debug!("Combining evidence from {} rule results", results.len());
        self.combiner.combine(results)
    }

    /// Never fails; problems are reported in the returned record.
    pub fn validate_hgvs(&self, input: &str) -> HgvsValidation {
        let variant = match self
            .parser
            .validate_hgvs(input)
            .and_then(|_| self.parser.parse(input))
        {
            Ok(variant) => variant,
            Err(e) => {
                return HgvsValidation {
                    is_valid: false,
                    error_message: Some(e.to_string()),
                    ..Default::default()
                }
            }
        };

        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        HgvsValidation {
            is_valid: true,
            normalized_hgvs: variant.preferred_hgvs().map(str::to_string),
            gene_symbol: non_empty(&variant.gene_symbol),
            transcript_id: non_empty(&variant.transcript_id),
            genomic_position: (!variant.chromosome.is_empty())
                .then(|| format!("chr{}:g.{}", variant.chromosome, variant.position)),
            predicted_protein: non_empty(&variant.hgvs_protein),
            error_message: None,
        }
    }

    // --------------------------------------------------------------------------------------------
    // Resources
    // --------------------------------------------------------------------------------------------

    /// Serve an `acmg://rules…` resource through the resource cache.
    pub async fn read_resource(&self, uri: &str) -> Result<CachedResource> {
        let uri = uri.trim();
        if let Some(resource) = self.resource_cache.get_typed(uri, RULES_RESOURCE_TYPE).await {
            return Ok(resource);
        }
        self.load_resource(uri).await
    }

    /// Warm the resource cache. URIs with a live cached copy are skipped;
    /// a failing URI is reported without stopping the rest.
    pub async fn preload_resources<S: AsRef<str>>(&self, uris: &[S]) -> PreloadReport {
        let mut report = PreloadReport::default();
        if !self.resource_cache.is_enabled() {
            debug!("Resource cache disabled; skipping preload");
            return report;
        }

        for uri in uris {
            let uri = uri.as_ref().trim();
            if self.resource_cache.contains(uri) {
                report.skipped.push(uri.to_string());
                continue;
            }
            match self.load_resource(uri).await {
                Ok(_) => report.loaded.push(uri.to_string()),
                Err(e) => {
                    warn!("Failed to preload resource {}: {}", uri, e);
                    report.failed.insert(uri.to_string(), e);
                }
            }
        }
        info!(
            "Preloaded {} resources ({} already cached, {} failed)",
            report.loaded.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    async fn load_resource(&self, uri: &str) -> Result<CachedResource> {
        let content = self.render_rules_resource(uri)?;
        let etag = self
            .resource_cache
            .set(uri, RULES_RESOURCE_TYPE, content.clone())
            .await;
        Ok(CachedResource {
            uri: uri.to_string(),
            resource_type: RULES_RESOURCE_TYPE.to_string(),
            content,
            etag,
            cached_at: now_ms(),
        })
    }

    fn render_rules_resource(&self, uri: &str) -> Result<Value> {
        let registry = self.engine.registry();
        let describe = |category: Option<RuleCategory>| -> Vec<Value> {
            registry
                .iter()
                .filter(|rule| category.map_or(true, |c| rule.category == c))
                .map(|rule| {
                    json!({
                        "code": rule.code,
                        "name": rule.name,
                        "category": rule.category,
                        "strength": rule.strength,
                    })
                })
                .collect()
        };

        let rest = uri
            .strip_prefix(RULES_URI)
            .ok_or_else(|| unsupported_uri(uri))?;
        let content = match rest {
            "" => json!({
                "guideline": "ACMG/AMP 2015",
                "total_rules": registry.len(),
                "rules": describe(None),
            }),
            "/pathogenic" => json!({
                "category": RuleCategory::Pathogenic,
                "rules": describe(Some(RuleCategory::Pathogenic)),
            }),
            "/benign" => json!({
                "category": RuleCategory::Benign,
                "rules": describe(Some(RuleCategory::Benign)),
            }),
            other => {
                let code = other
                    .strip_prefix('/')
                    .map(str::to_uppercase)
                    .ok_or_else(|| unsupported_uri(uri))?;
                let rule = registry.get(&code).ok_or_else(|| unsupported_uri(uri))?;
                json!({
                    "code": rule.code,
                    "name": rule.name,
                    "category": rule.category,
                    "strength": rule.strength,
                })
            }
        };
        Ok(content)
    }

    // --------------------------------------------------------------------------------------------
    // Admin
    // --------------------------------------------------------------------------------------------

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn resolver(&self) -> &Arc<TranscriptResolver> {
        &self.resolver
    }

    pub fn tool_cache(&self) -> &Arc<ToolResultCache> {
        &self.tool_cache
    }

    pub fn resource_cache(&self) -> &Arc<ResourceCache> {
        &self.resource_cache
    }

    pub fn evidence_cache(&self) -> &Arc<EvidenceCache> {
        &self.evidence_cache
    }

    /// Start the periodic evidence sweep. `None` when disabled.
    pub fn start_sweeper(&self) -> Option<SweepHandle> {
        Arc::new(EvidenceSweeper::new(Arc::clone(&self.evidence_cache))).start()
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            tool_cache: self.tool_cache.stats(),
            resource_cache: self.resource_cache.stats(),
            evidence_cache: self.evidence_cache.stats(),
            resolver: self.resolver.stats(),
        }
    }

    pub async fn health(&self) -> ServiceHealth {
        let (tool_cache, resource_cache, evidence_cache, resolver) = tokio::join!(
            self.tool_cache.is_healthy(),
            self.resource_cache.is_healthy(),
            self.evidence_cache.is_healthy(),
            self.resolver.is_healthy(),
        );
        ServiceHealth {
            tool_cache,
            resource_cache,
            evidence_cache,
            resolver,
        }
    }
}

fn unsupported_uri(uri: &str) -> ClassifierError {
    ClassifierError::validation("uri", format!("unsupported ACMG rules URI: {}", uri))
}

// ================================================================================================
// REPORT TEXT
// ================================================================================================

pub fn recommendations(
    classification: Classification,
    confidence: ConfidenceLevel,
    evidence: &AggregatedEvidence,
) -> Vec<String> {
    let mut out: Vec<&str> = Vec::new();

    match classification {
        Classification::Pathogenic | Classification::LikelyPathogenic => {
            out.push("Consider genetic counseling for the patient and family");
            out.push("Evaluate for medical management based on associated condition");
            if classification == Classification::Pathogenic {
                out.push("Consider cascade testing for at-risk family members");
            }
        }
        Classification::Benign | Classification::LikelyBenign => {
            out.push("No specific follow-up required for this variant");
            if classification == Classification::LikelyBenign {
                out.push("Consider periodic re-evaluation as new evidence emerges");
            }
        }
        Classification::Vus => {
            out.push("Consider functional studies if clinically indicated");
            out.push("Evaluate family segregation if possible");
            out.push("Periodic re-evaluation as new evidence becomes available");
            if evidence
                .population
                .as_ref()
                .is_some_and(|p| p.allele_frequency == 0.0)
            {
                out.push("Consider population frequency studies in relevant ethnic groups");
            }
        }
    }

    if confidence == ConfidenceLevel::Low {
        out.push("Low confidence classification - consider additional evidence");
    }

    out.into_iter().map(str::to_string).collect()
}

pub fn evidence_summary(results: &[RuleResult], evidence: &AggregatedEvidence) -> String {
    let applied: Vec<&str> = results
        .iter()
        .filter(|r| r.is_applied())
        .map(|r| r.code.as_str())
        .collect();

    let mut summary = if applied.is_empty() {
        "Applied ACMG/AMP criteria: none".to_string()
    } else {
        format!("Applied ACMG/AMP criteria: {}", applied.join(", "))
    };

    if let Some(clinvar) = evidence
        .clinvar
        .as_ref()
        .filter(|c| !c.clinical_significance.is_empty())
    {
        summary.push_str(&format!(
            ". ClinVar classification: {}",
            clinvar.clinical_significance
        ));
    }
    if let Some(population) = &evidence.population {
        summary.push_str(&format!(
            ". Population frequency: {:.6}",
            population.allele_frequency
        ));
    }
    summary
}
