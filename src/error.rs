//! Error taxonomy for classification, rule evaluation and caching.

use std::time::Duration;
use thiserror::Error;

use crate::cache::store::StoreError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ClassifierError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    /// Empty or malformed input
    #[error("validation error for field '{field}': {message}")]
    Validation { field: String, message: String },

    /// HGVS / gene-symbol text could not be parsed
    #[error("failed to parse variant: {0}")]
    Parse(String),

    /// Rule code not present in the registry
    #[error("unknown ACMG/AMP rule: {0}")]
    UnknownRule(String),

    /// A single rule evaluator failed
    #[error("failed to evaluate rule {code}: {message}")]
    Evaluation { code: String, message: String },

    /// Evidence gathering or transcript lookup failed upstream
    #[error("{service} error: {message}")]
    ExternalService { service: String, message: String },

    /// Distributed cache tier unreachable or returned garbage
    #[error("cache backend error: {0}")]
    CacheBackend(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl ClassifierError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ClassifierError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        ClassifierError::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Errors that are returned to callers as-is. Every other kind is
    /// absorbed and only shows up as reduced confidence or metadata.
    pub fn is_hard_failure(&self) -> bool {
        matches!(
            self,
            ClassifierError::Validation { .. }
                | ClassifierError::Parse(_)
                | ClassifierError::UnknownRule(_)
        )
    }
}

impl From<StoreError> for ClassifierError {
    fn from(err: StoreError) -> Self {
        ClassifierError::CacheBackend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_failures() {
        assert!(ClassifierError::validation("gene_symbol", "empty").is_hard_failure());
        assert!(ClassifierError::UnknownRule("XX9".into()).is_hard_failure());
        assert!(ClassifierError::Parse("bad".into()).is_hard_failure());
        assert!(!ClassifierError::external("ensembl", "503").is_hard_failure());
        assert!(!ClassifierError::CacheBackend("down".into()).is_hard_failure());
        assert!(!ClassifierError::Cancelled.is_hard_failure());
    }

    #[test]
    fn test_display_messages() {
        let err = ClassifierError::validation("gene_symbol", "gene symbol cannot be empty");
        assert_eq!(
            err.to_string(),
            "validation error for field 'gene_symbol': gene symbol cannot be empty"
        );
        assert_eq!(
            ClassifierError::UnknownRule("PX1".into()).to_string(),
            "unknown ACMG/AMP rule: PX1"
        );
    }
}
