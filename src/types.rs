//! Core domain types shared by the rule engine, the caches and the classifier.
//!
//! Classifications and rule strengths follow the ACMG/AMP 2015 guidelines
//! (Richards et al., Genet Med 17(5):405-24).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ================================================================================================
// RULE TAXONOMY
// ================================================================================================

/// Direction of an ACMG/AMP criterion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCategory {
    Pathogenic,
    Benign,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            RuleCategory::Pathogenic => "PATHOGENIC",
            RuleCategory::Benign => "BENIGN",
        })
    }
}

/// Weight of an ACMG/AMP criterion.
///
/// For benign criteria `VeryStrong` is the stand-alone level (BA1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStrength {
    VeryStrong,
    Strong,
    Moderate,
    Supporting,
}

impl fmt::Display for RuleStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleStrength::VeryStrong => "VERY_STRONG",
            RuleStrength::Strong => "STRONG",
            RuleStrength::Moderate => "MODERATE",
            RuleStrength::Supporting => "SUPPORTING",
        };
        f.pad(s)
    }
}

/// Final ACMG/AMP classification of a variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Pathogenic,
    LikelyPathogenic,
    #[default]
    Vus,
    LikelyBenign,
    Benign,
}

impl Classification {
    /// Human-readable description for clinical reporting.
    pub fn clinical_significance(&self) -> &'static str {
        match self {
            Classification::Pathogenic => "Pathogenic - Disease-causing variant",
            Classification::LikelyPathogenic => {
                "Likely Pathogenic - Probably disease-causing variant"
            }
            Classification::Vus => {
                "Variant of Uncertain Significance - Clinical significance unknown"
            }
            Classification::LikelyBenign => "Likely Benign - Probably not disease-causing",
            Classification::Benign => "Benign - Not disease-causing",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Pathogenic => "PATHOGENIC",
            Classification::LikelyPathogenic => "LIKELY_PATHOGENIC",
            Classification::Vus => "VUS",
            Classification::LikelyBenign => "LIKELY_BENIGN",
            Classification::Benign => "BENIGN",
        };
        f.pad(s)
    }
}

/// Confidence attached to a classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConfidenceLevel {
    High,
    Medium,
    #[default]
    Low,
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::Low => "Low",
        };
        f.pad(s)
    }
}

// ================================================================================================
// VARIANT
// ================================================================================================

/// Germline or somatic origin of a variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantType {
    #[default]
    Germline,
    Somatic,
}

/// A variant after parsing and standardization.
///
/// Built once by the parser and never mutated by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct StandardizedVariant {
    pub id: String,
    pub chromosome: String,
    pub position: u64,
    pub reference: String,
    pub alternative: String,
    pub hgvs_genomic: String,
    pub hgvs_coding: String,
    pub hgvs_protein: String,
    pub gene_symbol: String,
    pub transcript_id: String,
    pub variant_type: VariantType,
}

impl StandardizedVariant {
    /// The most specific HGVS description available (coding, then genomic,
    /// then protein), or `None` for a gene-only record.
    pub fn preferred_hgvs(&self) -> Option<&str> {
        [&self.hgvs_coding, &self.hgvs_genomic, &self.hgvs_protein]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
    }
}

// ================================================================================================
// EVIDENCE
// ================================================================================================

/// Everything gathered from the knowledge bases for one variant.
///
/// Any sub-record may be missing; a missing record means "no evidence".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct AggregatedEvidence {
    pub clinvar: Option<ClinVarData>,
    pub population: Option<PopulationData>,
    pub functional: Option<FunctionalData>,
    pub somatic: Option<SomaticData>,
    pub computational: Option<ComputationalData>,
    /// When the evidence was gathered (ms since epoch), 0 if unknown
    #[serde(default)]
    pub gathered_at: u64,
}

impl AggregatedEvidence {
    /// True when no sub-record is present.
    pub fn is_empty(&self) -> bool {
        self.clinvar.is_none()
            && self.population.is_none()
            && self.functional.is_none()
            && self.somatic.is_none()
            && self.computational.is_none()
    }
}

/// ClinVar aggregate record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct ClinVarData {
    pub variation_id: String,
    pub clinical_significance: String,
    pub review_status: String,
    #[serde(default)]
    pub conditions: Vec<String>,
}

/// Population allele frequency data (gnomAD).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct PopulationData {
    pub allele_frequency: f64,
    pub allele_count: u64,
    pub allele_number: u64,
    pub homozygote_count: u64,
    #[serde(default)]
    pub population_frequencies: HashMap<String, f64>,
}

/// Functional study results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct FunctionalData {
    pub assay: String,
    /// Free-text outcome as reported ("damaging", "no effect", ...)
    pub outcome: String,
    #[serde(default)]
    pub pubmed_ids: Vec<String>,
}

/// Somatic observations (COSMIC).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct SomaticData {
    pub cosmic_id: String,
    #[serde(default)]
    pub tumor_types: Vec<String>,
    pub sample_count: u64,
}

/// In-silico prediction scores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct ComputationalData {
    pub sift_score: Option<f64>,
    pub polyphen_score: Option<f64>,
    pub cadd_score: Option<f64>,
}

// ================================================================================================
// TRANSCRIPTS
// ================================================================================================

/// Canonical transcript of a gene as returned by the gene/transcript API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptInfo {
    pub refseq_id: String,
    pub gene_symbol: String,
    pub source: String,
    /// ms since epoch
    pub last_updated: u64,
}
