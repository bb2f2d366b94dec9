//! Boundaries to the collaborators the classifier depends on, plus small
//! offline implementations of each.
//!
//! - [`VariantParser`]: text → [`StandardizedVariant`]
//! - [`KnowledgeBase`]: variant → [`AggregatedEvidence`]
//! - [`GeneTranscriptLookup`] (in [`crate::resolver`]): gene → transcript

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{ClassifierError, Result};
use crate::resolver::GeneTranscriptLookup;
use crate::types::{now_ms, AggregatedEvidence, StandardizedVariant, TranscriptInfo};

// ================================================================================================
// BOUNDARY TRAITS
// ================================================================================================

pub trait VariantParser: Send + Sync {
    /// Fails with `Parse` or `Validation` on malformed input.
    fn parse(&self, text: &str) -> Result<StandardizedVariant>;

    fn validate_hgvs(&self, text: &str) -> Result<()>;
}

/// Evidence gathering across ClinVar, gnomAD and friends. Implementations
/// return partial evidence rather than failing where they can.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn gather_evidence(&self, variant: &StandardizedVariant) -> Result<AggregatedEvidence>;
}

// ================================================================================================
// BASIC PARSER
// ================================================================================================

/// Well-known RefSeq accessions and their genes.
const KNOWN_TRANSCRIPTS: [(&str, &str, &str); 8] = [
    ("BRCA1", "NM_007294", "NM_007294.4"),
    ("BRCA2", "NM_000059", "NM_000059.4"),
    ("TP53", "NM_000546", "NM_000546.6"),
    ("CFTR", "NM_000492", "NM_000492.4"),
    ("MLH1", "NM_000249", "NM_000249.4"),
    ("MSH2", "NM_000251", "NM_000251.3"),
    ("ATM", "NM_000051", "NM_000051.4"),
    ("PTEN", "NM_000314", "NM_000314.8"),
];

const MAX_GENE_SYMBOL_LEN: usize = 15;

/// Recognizes the common notations:
/// - RefSeq HGVS: `NM_000492.3:c.1521_1523delCTT`, `NC_000017.11:g.43045712G>A`
/// - chromosome shorthand: `chr17:g.43045712G>A`
/// - gene-relative: `BRCA1:c.5266dupC`, `TP53 p.R273H`
/// - bare HUGO symbols: `BRCA1`
pub struct BasicVariantParser {
    hgvs: Regex,
    chromosome: Regex,
    gene_with_variant: Regex,
    gene_with_protein: Regex,
    gene_symbol: Regex,
}

impl BasicVariantParser {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ClassifierError::Parse(format!("bad pattern: {}", e)))
        };
        Ok(Self {
            hgvs: compile(r"^(NC_|NM_|NP_|NG_|NR_|XM_|XR_)(\d+)\.(\d+):([cgmnrp])\.(.+)$")?,
            chromosome: compile(r"^(?i:chr)([0-9]{1,2}|X|Y|M|MT):g\.(\d+)([ACGT]+)>([ACGT]+)$")?,
            gene_with_variant: compile(r"^([A-Z][A-Z0-9-]*[A-Z0-9]):([cgp]\..+)$")?,
            gene_with_protein: compile(r"^([A-Z][A-Z0-9-]*[A-Z0-9])\s+(p\..+)$")?,
            gene_symbol: compile(r"^[A-Z][A-Z0-9-]*[A-Z0-9]$|^[A-Z]$")?,
        })
    }

    fn parse_refseq(&self, input: &str) -> Option<StandardizedVariant> {
        let caps = self.hgvs.captures(input)?;
        let prefix = &caps[1];
        let accession = &caps[2];
        let version = &caps[3];
        let change = &caps[5];

        let mut variant = StandardizedVariant {
            id: Uuid::new_v4().to_string(),
            gene_symbol: gene_for_accession(input).unwrap_or_default().to_string(),
            ..Default::default()
        };

        match &caps[4] {
            "c" | "n" | "r" => {
                variant.hgvs_coding = input.to_string();
                variant.transcript_id = format!("{}{}.{}", prefix, accession, version);
            }
            "p" => variant.hgvs_protein = input.to_string(),
            _ => {
                variant.hgvs_genomic = input.to_string();
                if prefix == "NC_" {
                    variant.chromosome = chromosome_for_accession(accession);
                }
                variant.position = leading_position(change).unwrap_or(0);
                if let Some((reference, alternative)) = substitution(change) {
                    variant.reference = reference;
                    variant.alternative = alternative;
                }
            }
        }
        Some(variant)
    }

    fn parse_chromosome(&self, input: &str) -> Option<StandardizedVariant> {
        let caps = self.chromosome.captures(input)?;
        Some(StandardizedVariant {
            id: Uuid::new_v4().to_string(),
            chromosome: caps[1].to_uppercase(),
            position: caps[2].parse().ok()?,
            reference: caps[3].to_string(),
            alternative: caps[4].to_string(),
            hgvs_genomic: input.to_string(),
            ..Default::default()
        })
    }

    fn validate_gene_symbol(&self, symbol: &str) -> Result<()> {
        if symbol.is_empty() {
            return Err(ClassifierError::validation(
                "gene_symbol",
                "gene symbol cannot be empty",
            ));
        }
        if !self.gene_symbol.is_match(symbol) {
            return Err(ClassifierError::validation(
                "gene_symbol",
                format!("invalid gene symbol format: {}", symbol),
            ));
        }
        if symbol.len() > MAX_GENE_SYMBOL_LEN {
            return Err(ClassifierError::validation(
                "gene_symbol",
                format!("gene symbol too long: {}", symbol),
            ));
        }
        Ok(())
    }
}

impl VariantParser for BasicVariantParser {
    fn parse(&self, text: &str) -> Result<StandardizedVariant> {
        let input = text.trim();
        if input.is_empty() {
            return Err(ClassifierError::validation(
                "input",
                "variant notation cannot be empty",
            ));
        }

        if let Some(variant) = self.parse_refseq(input) {
            return Ok(variant);
        }
        if let Some(variant) = self.parse_chromosome(input) {
            return Ok(variant);
        }

        if let Some(caps) = self.gene_with_variant.captures(input) {
            let gene = &caps[1];
            let change = &caps[2];
            self.validate_gene_symbol(gene)?;
            let mut variant = StandardizedVariant {
                id: Uuid::new_v4().to_string(),
                gene_symbol: gene.to_string(),
                ..Default::default()
            };
            if change.starts_with("p.") {
                variant.hgvs_protein = change.to_string();
            } else if change.starts_with("g.") {
                variant.hgvs_genomic = input.to_string();
            } else {
                variant.hgvs_coding = input.to_string();
            }
            return Ok(variant);
        }

        if let Some(caps) = self.gene_with_protein.captures(input) {
            self.validate_gene_symbol(&caps[1])?;
            return Ok(StandardizedVariant {
                id: Uuid::new_v4().to_string(),
                gene_symbol: caps[1].to_string(),
                hgvs_protein: caps[2].to_string(),
                ..Default::default()
            });
        }

        let symbol = input.to_uppercase();
        if self.gene_symbol.is_match(&symbol) {
            self.validate_gene_symbol(&symbol)?;
            return Ok(StandardizedVariant {
                id: Uuid::new_v4().to_string(),
                gene_symbol: symbol,
                ..Default::default()
            });
        }

        Err(ClassifierError::Parse(format!(
            "unrecognized input format: {}",
            input
        )))
    }

    fn validate_hgvs(&self, text: &str) -> Result<()> {
        let input = text.trim();
        if input.is_empty() {
            return Err(ClassifierError::validation(
                "hgvs",
                "HGVS notation cannot be empty",
            ));
        }
        if self.hgvs.is_match(input)
            || self.chromosome.is_match(input)
            || self.gene_with_variant.is_match(input)
        {
            Ok(())
        } else {
            Err(ClassifierError::validation(
                "hgvs",
                format!("invalid HGVS format: {}", input),
            ))
        }
    }
}

fn gene_for_accession(hgvs: &str) -> Option<&'static str> {
    KNOWN_TRANSCRIPTS
        .iter()
        .find(|(_, accession, _)| hgvs.contains(accession))
        .map(|(gene, _, _)| *gene)
}

/// `000017` → `17`, `000023` → `X`, `000024` → `Y`, `012920` → `MT`.
fn chromosome_for_accession(accession: &str) -> String {
    match accession.trim_start_matches('0') {
        "23" => "X".to_string(),
        "24" => "Y".to_string(),
        "12920" => "MT".to_string(),
        other => other.to_string(),
    }
}

fn leading_position(change: &str) -> Option<u64> {
    let digits: String = change
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// `43045712G>A` → (`G`, `A`)
fn substitution(change: &str) -> Option<(String, String)> {
    let (left, right) = change.split_once('>')?;
    let reference: String = left
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if reference.is_empty() || right.is_empty() {
        return None;
    }
    Some((reference, right.to_string()))
}

// ================================================================================================
// OFFLINE COLLABORATORS
// ================================================================================================

/// Gene → canonical transcript from a fixed table.
pub struct StaticTranscriptTable {
    transcripts: HashMap<String, String>,
}

impl StaticTranscriptTable {
    pub fn new(transcripts: HashMap<String, String>) -> Self {
        let transcripts = transcripts
            .into_iter()
            .map(|(gene, refseq)| (gene.trim().to_uppercase(), refseq))
            .collect();
        Self { transcripts }
    }

    /// Table of well-known clinical genes.
    pub fn with_defaults() -> Self {
        Self::new(
            KNOWN_TRANSCRIPTS
                .iter()
                .map(|(gene, _, refseq)| (gene.to_string(), refseq.to_string()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }
}

#[async_trait]
impl GeneTranscriptLookup for StaticTranscriptTable {
    async fn lookup_canonical_transcript(&self, gene_symbol: &str) -> Result<TranscriptInfo> {
        let symbol = gene_symbol.trim().to_uppercase();
        let refseq = self.transcripts.get(&symbol).ok_or_else(|| {
            ClassifierError::external(
                "transcript-table",
                format!("no canonical transcript for gene {}", symbol),
            )
        })?;
        Ok(TranscriptInfo {
            refseq_id: refseq.clone(),
            gene_symbol: symbol,
            source: "static-table".to_string(),
            last_updated: now_ms(),
        })
    }
}

/// Knowledge base with no upstream access. Returns fixture evidence when one
/// is registered for the variant's HGVS, otherwise an empty bundle.
#[derive(Default)]
pub struct OfflineKnowledgeBase {
    fixtures: RwLock<HashMap<String, AggregatedEvidence>>,
}

impl OfflineKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evidence(self, hgvs: impl Into<String>, evidence: AggregatedEvidence) -> Self {
        self.fixtures.write().insert(hgvs.into(), evidence);
        self
    }
}

#[async_trait]
impl KnowledgeBase for OfflineKnowledgeBase {
    async fn gather_evidence(&self, variant: &StandardizedVariant) -> Result<AggregatedEvidence> {
        let fixture = variant
            .preferred_hgvs()
            .and_then(|hgvs| self.fixtures.read().get(hgvs).cloned());
        let mut evidence = fixture.unwrap_or_default();
        evidence.gathered_at = now_ms();
        Ok(evidence)
    }
}
