//! Rule validation errors.

use crate::routing::rule::{BackendRef, RuleId};

/// A single problem found while compiling or validating rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid host pattern {pattern:?}: {reason}")]
    InvalidHost { pattern: String, reason: String },

    #[error("invalid path pattern {pattern:?}: {reason}")]
    InvalidPath { pattern: String, reason: String },

    #[error("invalid header predicate {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid allow-list entry {value:?}: {reason}")]
    InvalidCidr { value: String, reason: String },

    #[error("rule {rule}: invalid rate limit: {reason}")]
    InvalidRateLimit { rule: RuleId, reason: String },

    #[error("duplicate rule id {id}")]
    DuplicateId { id: RuleId },

    #[error("rules {first} and {second} match the same host, path and headers")]
    DuplicateRule { first: RuleId, second: RuleId },

    #[error("rule {rule} references unknown backend {backend}")]
    UnknownBackend { rule: RuleId, backend: BackendRef },
}

/// A rule set that failed validation. Carries every error found, not just the
/// first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rule set rejected ({} error(s)): {}", .errors.len(), join(.errors))]
pub struct RuleSetRejected {
    errors: Vec<ValidationError>,
}

impl RuleSetRejected {
    pub fn new(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}

impl From<ValidationError> for RuleSetRejected {
    fn from(error: ValidationError) -> Self {
        Self::new(vec![error])
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
