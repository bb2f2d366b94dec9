//! Evidence combination per ACMG/AMP Table 5.
//!
//! Everything here is a pure function of the applied-rule tallies. Only
//! results with outcome `Applied` count; not-applicable, not-implemented and
//! failed rules are ignored alike.

use serde::{Deserialize, Serialize};

use super::RuleResult;
use crate::types::{Classification, ConfidenceLevel, RuleCategory, RuleStrength};

// ================================================================================================
// TALLY
// ================================================================================================

/// Applied-rule counts keyed by (category, strength).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleTally {
    pub pvs: u32,
    pub ps: u32,
    pub pm: u32,
    pub pp: u32,
    /// Stand-alone benign (BA1)
    pub ba1: u32,
    pub bs: u32,
    pub bp: u32,
}

impl RuleTally {
    pub fn from_results(results: &[RuleResult]) -> Self {
        let mut tally = RuleTally::default();
        for result in results.iter().filter(|r| r.is_applied()) {
            let slot = match (result.category, result.strength) {
                (RuleCategory::Pathogenic, RuleStrength::VeryStrong) => &mut tally.pvs,
                (RuleCategory::Pathogenic, RuleStrength::Strong) => &mut tally.ps,
                (RuleCategory::Pathogenic, RuleStrength::Moderate) => &mut tally.pm,
                (RuleCategory::Pathogenic, RuleStrength::Supporting) => &mut tally.pp,
                (RuleCategory::Benign, RuleStrength::VeryStrong) => &mut tally.ba1,
                (RuleCategory::Benign, RuleStrength::Strong) => &mut tally.bs,
                // no benign-moderate tier exists; treated as supporting
                (RuleCategory::Benign, RuleStrength::Moderate)
                | (RuleCategory::Benign, RuleStrength::Supporting) => &mut tally.bp,
            };
            *slot += 1;
        }
        tally
    }

    /// First matching row wins; the order of the checks is significant.
    pub fn classify(&self) -> Classification {
        let RuleTally {
            pvs,
            ps,
            pm,
            pp,
            ba1,
            bs,
            bp,
        } = *self;

        if (pvs >= 1 && (ps >= 1 || pm >= 2 || (pm >= 1 && pp >= 1) || pp >= 2))
            || ps >= 2
            || (ps >= 1 && (pm >= 3 || (pm >= 2 && pp >= 2) || (pm >= 1 && pp >= 4)))
        {
            return Classification::Pathogenic;
        }

        if (pvs >= 1 && pm >= 1)
            || (pvs >= 1 && pp >= 2)
            || (ps >= 1 && (pm >= 1 || pp >= 2))
            || pm >= 3
            || (pm >= 2 && pp >= 2)
            || (pm >= 1 && pp >= 4)
        {
            return Classification::LikelyPathogenic;
        }

        if ba1 >= 1 || bs >= 2 {
            return Classification::Benign;
        }

        if (bs >= 1 && bp >= 1) || bp >= 2 {
            return Classification::LikelyBenign;
        }

        Classification::Vus
    }
}

// ================================================================================================
// COMBINER
// ================================================================================================

/// Output of [`EvidenceCombiner::combine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinationOutcome {
    pub classification: Classification,
    pub confidence: ConfidenceLevel,
    pub tally: RuleTally,
    pub combination_rule: String,
    pub summary: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EvidenceCombiner;

impl EvidenceCombiner {
    pub fn new() -> Self {
        EvidenceCombiner
    }

    pub fn combine(&self, results: &[RuleResult]) -> CombinationOutcome {
        let tally = RuleTally::from_results(results);
        let classification = tally.classify();
        let confidence = confidence_level(classification, results);

        log::info!(
            "Combined evidence: {} ({} confidence) from {:?}",
            classification,
            confidence,
            tally
        );

        CombinationOutcome {
            classification,
            confidence,
            tally,
            combination_rule: combination_rule(&tally).to_string(),
            summary: format!(
                "Classification '{}' based on {} applied ACMG/AMP criteria",
                classification,
                applied_count(results)
            ),
        }
    }

    pub fn classify(&self, results: &[RuleResult]) -> Classification {
        RuleTally::from_results(results).classify()
    }
}

fn applied_count(results: &[RuleResult]) -> usize {
    results.iter().filter(|r| r.is_applied()).count()
}

/// Mean confidence of applied rules; 0.0 when none applied.
pub fn mean_applied_confidence(results: &[RuleResult]) -> f64 {
    let (sum, count) = results
        .iter()
        .filter(|r| r.is_applied())
        .fold((0.0, 0usize), |(sum, count), r| (sum + r.confidence, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn confidence_level(classification: Classification, results: &[RuleResult]) -> ConfidenceLevel {
    let applied = applied_count(results);
    let mean = mean_applied_confidence(results);

    let definitive = matches!(
        classification,
        Classification::Pathogenic | Classification::Benign
    );
    if definitive && applied >= 2 && mean >= 0.8 {
        ConfidenceLevel::High
    } else if applied >= 1 && mean >= 0.6 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// Short label for the strongest pathogenic combination present.
pub fn combination_rule(tally: &RuleTally) -> &'static str {
    if tally.pvs >= 1 {
        "PVS1 + other criteria"
    } else if tally.ps >= 2 {
        "Two strong pathogenic criteria"
    } else if tally.ps >= 1 && tally.pm >= 1 {
        "One strong + one moderate pathogenic criteria"
    } else {
        "Standard ACMG/AMP combination rules"
    }
}
