use crate::path::PathError;
use crate::pivot::FanOutMismatch;
use thiserror::Error;

/// Failure of a GetSet invocation. No partial output accompanies an error.
#[derive(Debug, Error)]
pub enum ReshapeError {
    #[error("rules must be valid JSON: {0}")]
    InvalidRules(#[source] serde_json::Error),
    #[error("rules must be a JSON array, found {found}")]
    RulesNotArray { found: &'static str },
    #[error("invalid JSON document: {0}")]
    InvalidDocument(#[source] serde_json::Error),
    #[error("rule {index} ({src:?} -> {dst:?}): {source}")]
    Rule {
        index: usize,
        src: String,
        dst: String,
        #[source]
        source: PathError,
    },
    #[error("array key '{outer}' contains array key '{inner}'")]
    OverlappingArrayKeys { outer: String, inner: String },
    #[error("regroup at '{key}': {source}")]
    Regroup {
        key: String,
        #[source]
        source: FanOutMismatch,
    },
    #[error("regroup at '{key}': {source}")]
    RegroupWrite {
        key: String,
        #[source]
        source: PathError,
    },
    #[error("failed to render output: {0}")]
    Render(#[source] serde_json::Error),
}

impl ReshapeError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRules(_) | Self::RulesNotArray { .. } => "RESHAPE_E_RULES",
            Self::InvalidDocument(_) => "RESHAPE_E_DOCUMENT",
            Self::Rule { .. } => "RESHAPE_E_RULE",
            Self::OverlappingArrayKeys { .. } => "RESHAPE_E_ARRAY_KEY",
            Self::Regroup { .. } | Self::RegroupWrite { .. } => "RESHAPE_E_REGROUP",
            Self::Render(_) => "RESHAPE_E_RENDER",
        }
    }
}
