//! Error types for E2E scenarios

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Element not found: {selector}")]
    NotFound { selector: String },

    #[error("Timeout after {after_ms} ms waiting for: {what}")]
    Timeout { what: String, after_ms: u64 },

    #[error("Interaction failed on {selector}: {reason}")]
    InteractionFailed { selector: String, reason: String },

    #[error("Assertion failed on {selector}[{handle_index}]: expected {expected}, got {actual}")]
    AssertionMismatch {
        selector: String,
        handle_index: usize,
        expected: String,
        actual: String,
    },

    #[error("Fixture not found: {}", .0.display())]
    FixtureNotFound(PathBuf),

    #[error("Fixture malformed: {0}")]
    FixtureMalformed(String),

    #[error("Unknown alias: @{0}")]
    UnknownAlias(String),

    #[error("Scenario spec parse error: {0}")]
    SpecParse(String),

    #[error("Invalid selector '{input}': {reason}")]
    InvalidSelector { input: String, reason: String },

    #[error("Invalid step state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Target not reachable after {0} attempts")]
    Unreachable(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Failure classification carried into reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Timeout,
    InteractionFailed,
    AssertionMismatch,
    FixtureNotFound,
    FixtureMalformed,
    Internal,
}

impl FailureKind {
    /// Hard failures abort the rest of the sub-chain they occur in.
    pub fn is_hard(self) -> bool {
        !matches!(self, FailureKind::AssertionMismatch)
    }
}

impl E2eError {
    pub fn kind(&self) -> FailureKind {
        match self {
            E2eError::NotFound { .. } | E2eError::UnknownAlias(_) => FailureKind::NotFound,
            E2eError::Timeout { .. } => FailureKind::Timeout,
            E2eError::InteractionFailed { .. } => FailureKind::InteractionFailed,
            E2eError::AssertionMismatch { .. } => FailureKind::AssertionMismatch,
            E2eError::FixtureNotFound(_) => FailureKind::FixtureNotFound,
            E2eError::FixtureMalformed(_) => FailureKind::FixtureMalformed,
            _ => FailureKind::Internal,
        }
    }

    pub(crate) fn interaction(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        E2eError::InteractionFailed {
            selector: selector.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_is_soft() {
        assert!(!FailureKind::AssertionMismatch.is_hard());
        assert!(FailureKind::NotFound.is_hard());
        assert!(FailureKind::Timeout.is_hard());
        assert!(FailureKind::InteractionFailed.is_hard());
    }

    #[test]
    fn test_unknown_alias_counts_as_not_found() {
        let err = E2eError::UnknownAlias("ticket".into());
        assert_eq!(err.kind(), FailureKind::NotFound);
        assert_eq!(err.to_string(), "Unknown alias: @ticket");
    }
}
