//! Criterion evaluators.
//!
//! PVS1, PS1, PM2 and BA1 carry real logic. Every other criterion reports
//! `NotImplemented` so missing coverage is never mistaken for a negative.

use super::Finding;
use crate::error::Result;
use crate::types::{AggregatedEvidence, StandardizedVariant};

/// PM2 applies below this allele frequency (1 in 10,000).
pub const PM2_MAX_FREQUENCY: f64 = 0.0001;

/// BA1 applies above this allele frequency (5%).
pub const BA1_MIN_FREQUENCY: f64 = 0.05;

const NULL_VARIANT_MARKERS: [&str; 3] = ["nonsense", "frameshift", "splice"];

/// PVS1: null variant (nonsense, frameshift, canonical splice site, stop gain).
pub fn pvs1(variant: &StandardizedVariant, _evidence: &AggregatedEvidence) -> Result<Finding> {
    let coding = variant.hgvs_coding.to_lowercase();
    let protein = variant.hgvs_protein.to_lowercase();

    let marker = NULL_VARIANT_MARKERS
        .iter()
        .find(|m| coding.contains(**m) || protein.contains(**m))
        .copied()
        .or_else(|| protein.contains('*').then_some("terminator"));

    Ok(match marker {
        Some(marker) => Finding::applied(
            0.9,
            "Variant predicted to result in loss of function",
            format!("Null variant (nonsense/frameshift/splice) detected: {} marker", marker),
        ),
        None => Finding::not_applicable("Variant is not predicted to be null"),
    })
}

/// PS1: same amino acid change as an established pathogenic variant.
pub fn ps1(_variant: &StandardizedVariant, evidence: &AggregatedEvidence) -> Result<Finding> {
    let clinvar = match &evidence.clinvar {
        Some(c) => c,
        None => {
            return Ok(Finding::not_applicable(
                "No ClinVar data available; no established pathogenic variant found",
            ))
        }
    };

    if clinvar
        .clinical_significance
        .to_lowercase()
        .contains("pathogenic")
    {
        Ok(Finding::applied(
            0.8,
            format!(
                "ClinVar reports pathogenic variant: {}",
                clinvar.clinical_significance
            ),
            "Same amino acid change found in ClinVar as pathogenic",
        ))
    } else {
        Ok(Finding::not_applicable(
            "No established pathogenic variant at same amino acid position found",
        ))
    }
}

/// PM2: absent from controls or at extremely low frequency.
pub fn pm2(_variant: &StandardizedVariant, evidence: &AggregatedEvidence) -> Result<Finding> {
    let Some(population) = &evidence.population else {
        return Ok(Finding::not_applicable(
            "No population frequency data available",
        ));
    };

    let frequency = population.allele_frequency;
    if frequency < PM2_MAX_FREQUENCY {
        Ok(Finding::applied(
            0.7,
            format!("Population frequency: {:.6}", frequency),
            format!(
                "Variant absent or extremely rare in population databases (frequency {:.6} < {})",
                frequency, PM2_MAX_FREQUENCY
            ),
        ))
    } else {
        Ok(Finding::not_applicable(format!(
            "Population frequency too high: {:.6}",
            frequency
        )))
    }
}

/// BA1: allele frequency above 5%, stand-alone benign.
pub fn ba1(_variant: &StandardizedVariant, evidence: &AggregatedEvidence) -> Result<Finding> {
    let Some(population) = &evidence.population else {
        return Ok(Finding::not_applicable(
            "No population frequency data available",
        ));
    };

    let frequency = population.allele_frequency;
    if frequency > BA1_MIN_FREQUENCY {
        Ok(Finding::applied(
            0.95,
            format!("Population frequency: {:.4}", frequency),
            "Variant frequency exceeds 5% threshold in population",
        ))
    } else {
        Ok(Finding::not_applicable(format!(
            "Population frequency below threshold: {:.6}",
            frequency
        )))
    }
}

pub fn not_implemented(
    _variant: &StandardizedVariant,
    _evidence: &AggregatedEvidence,
) -> Result<Finding> {
    Ok(Finding::not_implemented())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleOutcome;
    use crate::types::{ClinVarData, PopulationData};

    fn variant(coding: &str, protein: &str) -> StandardizedVariant {
        StandardizedVariant {
            id: "v1".into(),
            hgvs_coding: coding.into(),
            hgvs_protein: protein.into(),
            gene_symbol: "BRCA1".into(),
            ..Default::default()
        }
    }

    fn with_frequency(af: f64) -> AggregatedEvidence {
        AggregatedEvidence {
            population: Some(PopulationData {
                allele_frequency: af,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_pvs1_markers() {
        let none = AggregatedEvidence::default();

        let stop = pvs1(&variant("NM_007294.4:c.5266dupC", "p.Gln1756*"), &none).unwrap();
        assert_eq!(stop.outcome, RuleOutcome::Applied);
        assert_eq!(stop.confidence, 0.9);
        assert!(stop.reasoning.to_lowercase().contains("null"));

        let fs = pvs1(&variant("c.68_69del FRAMESHIFT", ""), &none).unwrap();
        assert_eq!(fs.outcome, RuleOutcome::Applied);
        assert!(fs.reasoning.contains("frameshift"));

        let missense = pvs1(&variant("NM_000492.3:c.1521T>G", "p.Phe508Cys"), &none).unwrap();
        assert_eq!(missense.outcome, RuleOutcome::NotApplicable);
        assert_eq!(missense.confidence, 0.0);
    }

    #[test]
    fn test_pvs1_ignores_utr_asterisk_in_coding() {
        let none = AggregatedEvidence::default();
        let utr = pvs1(&variant("NM_000546.6:c.*100A>G", ""), &none).unwrap();
        assert_eq!(utr.outcome, RuleOutcome::NotApplicable);
    }

    #[test]
    fn test_pm2_threshold() {
        let v = variant("c.1A>G", "");
        let rare = pm2(&v, &with_frequency(0.00005)).unwrap();
        assert_eq!(rare.outcome, RuleOutcome::Applied);
        assert_eq!(rare.confidence, 0.7);
        assert!(rare.reasoning.contains("rare"));

        let boundary = pm2(&v, &with_frequency(0.0001)).unwrap();
        assert_eq!(boundary.outcome, RuleOutcome::NotApplicable);

        let missing = pm2(&v, &AggregatedEvidence::default()).unwrap();
        assert_eq!(missing.outcome, RuleOutcome::NotApplicable);
        assert!(missing.reasoning.contains("No population frequency"));
    }

    #[test]
    fn test_ba1_threshold() {
        let v = variant("c.1A>G", "");
        let common = ba1(&v, &with_frequency(0.06)).unwrap();
        assert_eq!(common.outcome, RuleOutcome::Applied);
        assert_eq!(common.confidence, 0.95);
        assert!(common.reasoning.contains("5%"));

        let boundary = ba1(&v, &with_frequency(0.05)).unwrap();
        assert_eq!(boundary.outcome, RuleOutcome::NotApplicable);
    }

    #[test]
    fn test_ps1_clinvar() {
        let v = variant("c.1A>G", "");
        let evidence = AggregatedEvidence {
            clinvar: Some(ClinVarData {
                clinical_significance: "Likely Pathogenic".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = ps1(&v, &evidence).unwrap();
        assert_eq!(result.outcome, RuleOutcome::Applied);
        assert_eq!(result.confidence, 0.8);
        assert!(result.evidence.contains("Likely Pathogenic"));

        let benign = AggregatedEvidence {
            clinvar: Some(ClinVarData {
                clinical_significance: "Benign".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            ps1(&v, &benign).unwrap().outcome,
            RuleOutcome::NotApplicable
        );
    }

    #[test]
    fn test_not_implemented_is_distinguishable() {
        let result = not_implemented(&variant("", ""), &AggregatedEvidence::default()).unwrap();
        assert_eq!(result.outcome, RuleOutcome::NotImplemented);
        assert!(result.reasoning.contains("not yet implemented"));
    }
}
