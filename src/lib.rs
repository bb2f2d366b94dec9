//! # ACMG/AMP Variant Classifier
//!
//! Classifies genetic variants per the ACMG/AMP 2015 guidelines:
//! - **Rule engine**: 28 criteria evaluated against gathered evidence
//! - **Evidence combiner**: Table 5 decision logic → classification + confidence
//! - **Tiered caches**: in-process tier plus an optional shared SQLite tier
//! - **Transcript resolver**: gene → canonical transcript with bounded concurrency
//!
//! [`ClassifierService`] is the entry point for callers.

pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod resolver;
pub mod rules;
pub mod types;

pub use classifier::{ClassificationReport, ClassifierService, ClassifyOptions};
pub use config::ClassifierConfig;
pub use error::{ClassifierError, Result};
pub use resolver::TranscriptResolver;
pub use rules::{EvidenceCombiner, RuleEngine, RuleResult};
pub use types::{AggregatedEvidence, Classification, ConfidenceLevel, StandardizedVariant};
