//! ACMG/AMP rule evaluation and evidence combination.
//!
//! - [`registry`]: the fixed table of 28 criteria
//! - [`evaluators`]: one evaluator function per criterion
//! - [`engine`]: runs evaluators, never aborting a batch on a single failure
//! - [`combiner`]: Table 5 decision logic from applied-rule tallies

pub mod combiner;
pub mod engine;
pub mod evaluators;
pub mod registry;

pub use combiner::{CombinationOutcome, EvidenceCombiner, RuleTally};
pub use engine::RuleEngine;
pub use registry::{AcmgRule, RuleRegistry};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{AggregatedEvidence, RuleCategory, RuleStrength, StandardizedVariant};

/// Signature every criterion evaluator implements.
pub type Evaluator = fn(&StandardizedVariant, &AggregatedEvidence) -> Result<Finding>;

/// What happened when a criterion was evaluated.
///
/// `NotApplicable` is a real negative; `NotImplemented` means the criterion
/// has no evaluator logic yet and says nothing about the variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Applied,
    NotApplicable,
    NotImplemented,
    EvaluationFailed,
}

/// Raw output of an evaluator, before rule metadata is attached.
#[derive(Clone, Debug, PartialEq)]
pub struct Finding {
    pub outcome: RuleOutcome,
    pub confidence: f64,
    pub evidence: String,
    pub reasoning: String,
}

impl Finding {
    pub fn applied(
        confidence: f64,
        evidence: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            outcome: RuleOutcome::Applied,
            confidence: confidence.clamp(0.0, 1.0),
            evidence: evidence.into(),
            reasoning: reasoning.into(),
        }
    }

    pub fn not_applicable(reasoning: impl Into<String>) -> Self {
        Self {
            outcome: RuleOutcome::NotApplicable,
            confidence: 0.0,
            evidence: String::new(),
            reasoning: reasoning.into(),
        }
    }

    pub fn not_implemented() -> Self {
        Self {
            outcome: RuleOutcome::NotImplemented,
            confidence: 0.0,
            evidence: String::new(),
            reasoning: "Rule evaluation not yet implemented".to_string(),
        }
    }
}

/// Result of evaluating one criterion against one variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub code: String,
    pub name: String,
    pub category: RuleCategory,
    pub strength: RuleStrength,
    pub outcome: RuleOutcome,
    pub confidence: f64,
    pub evidence: String,
    pub reasoning: String,
}

impl RuleResult {
    /// Attach rule metadata to an evaluator finding.
    pub fn from_finding(rule: &AcmgRule, finding: Finding) -> Self {
        Self {
            code: rule.code.to_string(),
            name: rule.name.to_string(),
            category: rule.category,
            strength: rule.strength,
            outcome: finding.outcome,
            confidence: finding.confidence,
            evidence: finding.evidence,
            reasoning: finding.reasoning,
        }
    }

    /// Result for an evaluator that returned an error.
    pub fn failed(rule: &AcmgRule, message: &str) -> Self {
        Self {
            code: rule.code.to_string(),
            name: rule.name.to_string(),
            category: rule.category,
            strength: rule.strength,
            outcome: RuleOutcome::EvaluationFailed,
            confidence: 0.0,
            evidence: String::new(),
            reasoning: format!("Rule evaluation failed: {}", message),
        }
    }

    /// Convenience constructor for results supplied by callers of
    /// `combine_evidence`.
    pub fn new(
        code: impl Into<String>,
        category: RuleCategory,
        strength: RuleStrength,
        applied: bool,
        confidence: f64,
    ) -> Self {
        Self {
            code: code.into(),
            name: String::new(),
            category,
            strength,
            outcome: if applied {
                RuleOutcome::Applied
            } else {
                RuleOutcome::NotApplicable
            },
            confidence: if applied { confidence.clamp(0.0, 1.0) } else { 0.0 },
            evidence: String::new(),
            reasoning: String::new(),
        }
    }

    #[inline]
    pub fn is_applied(&self) -> bool {
        self.outcome == RuleOutcome::Applied
    }
}
