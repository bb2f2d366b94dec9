//! The fixed table of ACMG/AMP 2015 criteria.
//!
//! Built once at start-up and shared by reference; nothing is added or removed
//! afterwards.

use std::collections::HashMap;

use super::evaluators;
use super::Evaluator;
use crate::types::{RuleCategory, RuleStrength};

/// One criterion: identity, weight and the function that evaluates it.
#[derive(Clone, Debug)]
pub struct AcmgRule {
    pub code: &'static str,
    pub name: &'static str,
    pub category: RuleCategory,
    pub strength: RuleStrength,
    pub evaluator: Evaluator,
}

/// Immutable rule table with lookup by code.
#[derive(Debug)]
pub struct RuleRegistry {
    rules: Vec<AcmgRule>,
    by_code: HashMap<&'static str, usize>,
}

impl RuleRegistry {
    /// The 28 criteria of the 2015 guideline.
    pub fn acmg_2015() -> Self {
        use RuleCategory::{Benign, Pathogenic};
        use RuleStrength::{Moderate, Strong, Supporting, VeryStrong};

        let table: [(&'static str, &'static str, RuleCategory, RuleStrength, Evaluator); 28] = [
            // Pathogenic very strong
            ("PVS1", "Null variant in a gene where LoF is a known mechanism", Pathogenic, VeryStrong, evaluators::pvs1),
            // Pathogenic strong
            ("PS1", "Same amino acid change as established pathogenic variant", Pathogenic, Strong, evaluators::ps1),
            ("PS2", "De novo in patient with disease and no family history", Pathogenic, Strong, evaluators::not_implemented),
            ("PS3", "Well-established functional studies supportive of damaging effect", Pathogenic, Strong, evaluators::not_implemented),
            ("PS4", "Variant prevalence in affecteds significantly higher than controls", Pathogenic, Strong, evaluators::not_implemented),
            // Pathogenic moderate
            ("PM1", "Located in mutational hot spot or functional domain", Pathogenic, Moderate, evaluators::not_implemented),
            ("PM2", "Absent from controls or extremely low frequency", Pathogenic, Moderate, evaluators::pm2),
            ("PM3", "For recessive disorders, detected in trans with pathogenic variant", Pathogenic, Moderate, evaluators::not_implemented),
            ("PM4", "Protein length changes as a result of in-frame deletions/insertions", Pathogenic, Moderate, evaluators::not_implemented),
            ("PM5", "Novel missense change at amino acid residue where different pathogenic change has been seen", Pathogenic, Moderate, evaluators::not_implemented),
            ("PM6", "Assumed de novo, but without confirmation of paternity and maternity", Pathogenic, Moderate, evaluators::not_implemented),
            // Pathogenic supporting
            ("PP1", "Cosegregation with disease in multiple affected family members", Pathogenic, Supporting, evaluators::not_implemented),
            ("PP2", "Missense variant in gene with low rate of benign missense variation", Pathogenic, Supporting, evaluators::not_implemented),
            ("PP3", "Multiple lines of computational evidence support deleterious effect", Pathogenic, Supporting, evaluators::not_implemented),
            ("PP4", "Patient's phenotype or family history highly specific for disease", Pathogenic, Supporting, evaluators::not_implemented),
            ("PP5", "Reputable source recently reports variant as pathogenic", Pathogenic, Supporting, evaluators::not_implemented),
            // Benign stand-alone
            ("BA1", "Allele frequency >5% in population", Benign, VeryStrong, evaluators::ba1),
            // Benign strong
            ("BS1", "Allele frequency greater than expected for disorder", Benign, Strong, evaluators::not_implemented),
            ("BS2", "Observed in healthy adult individual for recessive disorder", Benign, Strong, evaluators::not_implemented),
            ("BS3", "Well-established functional studies show no damaging effect", Benign, Strong, evaluators::not_implemented),
            ("BS4", "Lack of segregation in affected members of a family", Benign, Strong, evaluators::not_implemented),
            // Benign supporting
            ("BP1", "Missense variant in gene for which truncating variants cause disease", Benign, Supporting, evaluators::not_implemented),
            ("BP2", "Observed in trans with pathogenic variant for fully penetrant dominant gene", Benign, Supporting, evaluators::not_implemented),
            ("BP3", "In-frame deletions/insertions in repetitive region", Benign, Supporting, evaluators::not_implemented),
            ("BP4", "Multiple lines of computational evidence suggest no impact", Benign, Supporting, evaluators::not_implemented),
            ("BP5", "Variant found in case with alternate molecular basis", Benign, Supporting, evaluators::not_implemented),
            ("BP6", "Reputable source recently reports variant as benign", Benign, Supporting, evaluators::not_implemented),
            ("BP7", "Synonymous variant with no predicted impact on splicing", Benign, Supporting, evaluators::not_implemented),
        ];

        let rules: Vec<AcmgRule> = table
            .into_iter()
            .map(|(code, name, category, strength, evaluator)| AcmgRule {
                code,
                name,
                category,
                strength,
                evaluator,
            })
            .collect();

        Self::from_rules(rules)
    }

    /// Build a registry from an explicit rule list. Later duplicates of a code
    /// are ignored.
    pub fn from_rules(rules: Vec<AcmgRule>) -> Self {
        let mut by_code = HashMap::with_capacity(rules.len());
        let mut unique = Vec::with_capacity(rules.len());
        for rule in rules {
            if by_code.contains_key(rule.code) {
                continue;
            }
            by_code.insert(rule.code, unique.len());
            unique.push(rule);
        }
        Self {
            rules: unique,
            by_code,
        }
    }

    pub fn get(&self, code: &str) -> Option<&AcmgRule> {
        self.by_code.get(code).map(|&idx| &self.rules[idx])
    }

    /// Rules in table order.
    pub fn iter(&self) -> impl Iterator<Item = &AcmgRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
