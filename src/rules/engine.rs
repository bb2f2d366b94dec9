//! Rule engine: evaluates registered criteria against one variant.

use log::{debug, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::{AcmgRule, RuleOutcome, RuleRegistry, RuleResult};
use crate::error::{ClassifierError, Result};
use crate::types::{AggregatedEvidence, StandardizedVariant};

/// Evaluates the fixed rule table. Holds no mutable state, so one instance
/// can be shared freely between tasks.
#[derive(Clone, Debug)]
pub struct RuleEngine {
    registry: Arc<RuleRegistry>,
}

impl RuleEngine {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self { registry }
    }

    /// Engine over the standard 2015 table.
    pub fn acmg_2015() -> Self {
        let registry = RuleRegistry::acmg_2015();
        info!("ACMG/AMP rule registry initialised with {} rules", registry.len());
        Self::new(Arc::new(registry))
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Run every registered evaluator. Always yields one result per rule; a
    /// failing or panicking evaluator becomes an `EvaluationFailed` result.
    pub fn evaluate_all(
        &self,
        variant: &StandardizedVariant,
        evidence: &AggregatedEvidence,
    ) -> Vec<RuleResult> {
        let results: Vec<RuleResult> = self
            .registry
            .iter()
            .map(|rule| match run_evaluator(rule, variant, evidence) {
                Ok(result) => result,
                Err(message) => {
                    warn!(
                        "Rule {} failed for variant {}: {}",
                        rule.code, variant.id, message
                    );
                    RuleResult::failed(rule, &message)
                }
            })
            .collect();

        let applied = results.iter().filter(|r| r.is_applied()).count();
        let failed = results
            .iter()
            .filter(|r| r.outcome == RuleOutcome::EvaluationFailed)
            .count();
        info!(
            "Evaluated {} ACMG/AMP rules for variant {}: {} applied, {} failed",
            results.len(),
            variant.id,
            applied,
            failed
        );

        results
    }

    /// Evaluate a single rule by code. The code is matched case-insensitively
    /// after trimming. Only an unregistered code is an error; evaluator
    /// failures come back as `EvaluationFailed` results.
    pub fn evaluate_one(
        &self,
        code: &str,
        variant: &StandardizedVariant,
        evidence: &AggregatedEvidence,
    ) -> Result<RuleResult> {
        let normalized = code.trim().to_uppercase();
        let rule = self
            .registry
            .get(&normalized)
            .ok_or_else(|| ClassifierError::UnknownRule(code.trim().to_string()))?;

        debug!("Evaluating rule {} for variant {}", rule.code, variant.id);
        Ok(run_evaluator(rule, variant, evidence).unwrap_or_else(|message| {
            warn!(
                "Rule {} failed for variant {}: {}",
                rule.code, variant.id, message
            );
            RuleResult::failed(rule, &message)
        }))
    }
}

fn run_evaluator(
    rule: &AcmgRule,
    variant: &StandardizedVariant,
    evidence: &AggregatedEvidence,
) -> std::result::Result<RuleResult, String> {
    let evaluator = rule.evaluator;
    match panic::catch_unwind(AssertUnwindSafe(|| evaluator(variant, evidence))) {
        Ok(Ok(finding)) => Ok(RuleResult::from_finding(rule, finding)),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("evaluator panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("evaluator panicked: {}", s)
    } else {
        "evaluator panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{evaluators, Finding};
    use crate::types::{PopulationData, RuleCategory, RuleStrength};

    fn brca1_stop_gain() -> StandardizedVariant {
        StandardizedVariant {
            id: "var-1".into(),
            hgvs_coding: "NM_007294.4:c.5266dupC".into(),
            hgvs_protein: "p.Gln1756Profs*74".into(),
            gene_symbol: "BRCA1".into(),
            ..Default::default()
        }
    }

    fn rare() -> AggregatedEvidence {
        AggregatedEvidence {
            population: Some(PopulationData {
                allele_frequency: 0.00001,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn failing(_: &StandardizedVariant, _: &AggregatedEvidence) -> Result<Finding> {
        Err(ClassifierError::external("gnomad", "connection reset"))
    }

    fn panicking(_: &StandardizedVariant, _: &AggregatedEvidence) -> Result<Finding> {
        panic!("boom")
    }

    #[test]
    fn test_evaluate_all_returns_one_result_per_rule() {
        let engine = RuleEngine::acmg_2015();
        let results = engine.evaluate_all(&brca1_stop_gain(), &rare());
        assert_eq!(results.len(), 28);

        let applied: Vec<&str> = results
            .iter()
            .filter(|r| r.is_applied())
            .map(|r| r.code.as_str())
            .collect();
        assert_eq!(applied, vec!["PVS1", "PM2"]);

        let not_implemented = results
            .iter()
            .filter(|r| r.outcome == RuleOutcome::NotImplemented)
            .count();
        assert_eq!(not_implemented, 24);
    }

    #[test]
    fn test_failures_do_not_abort_batch() {
        let rules = vec![
            AcmgRule {
                code: "PM2",
                name: "rarity",
                category: RuleCategory::Pathogenic,
                strength: RuleStrength::Moderate,
                evaluator: evaluators::pm2,
            },
            AcmgRule {
                code: "PS3",
                name: "broken",
                category: RuleCategory::Pathogenic,
                strength: RuleStrength::Strong,
                evaluator: failing,
            },
            AcmgRule {
                code: "PP1",
                name: "panics",
                category: RuleCategory::Pathogenic,
                strength: RuleStrength::Supporting,
                evaluator: panicking,
            },
        ];
        let engine = RuleEngine::new(Arc::new(RuleRegistry::from_rules(rules)));
        let results = engine.evaluate_all(&brca1_stop_gain(), &rare());

        assert_eq!(results.len(), 3);
        assert!(results[0].is_applied());

        assert_eq!(results[1].outcome, RuleOutcome::EvaluationFailed);
        assert!(!results[1].is_applied());
        assert_eq!(results[1].confidence, 0.0);
        assert!(results[1]
            .reasoning
            .starts_with("Rule evaluation failed: "));
        assert!(results[1].reasoning.contains("connection reset"));

        assert_eq!(results[2].outcome, RuleOutcome::EvaluationFailed);
        assert!(results[2].reasoning.contains("boom"));
    }

    #[test]
    fn test_evaluate_one() {
        let engine = RuleEngine::acmg_2015();
        let result = engine
            .evaluate_one(" pm2 ", &brca1_stop_gain(), &rare())
            .unwrap();
        assert_eq!(result.code, "PM2");
        assert!(result.is_applied());

        let err = engine
            .evaluate_one("XYZ9", &brca1_stop_gain(), &rare())
            .unwrap_err();
        assert_eq!(err, ClassifierError::UnknownRule("XYZ9".into()));
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let engine = RuleEngine::acmg_2015();
        let variant = brca1_stop_gain();
        let evidence = rare();
        for code in ["PVS1", "PS1", "PM2", "BA1", "BP7"] {
            let first = engine.evaluate_one(code, &variant, &evidence).unwrap();
            let second = engine.evaluate_one(code, &variant, &evidence).unwrap();
            assert_eq!(first, second, "rule {} not deterministic", code);
        }
    }
}
