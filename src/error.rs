//! Error types for the rule engine.

use crate::rule::ProcessorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    // Definition errors, raised while loading rules
    #[error("Invalid filter definition: {0}")]
    InvalidFilterDefinition(String),
    #[error("Invalid {kind} rule definition for '{field}': {reason}")]
    InvalidRuleDefinition {
        kind: ProcessorKind,
        field: String,
        reason: String,
    },
    #[error("Rule #{index} in {origin}: {error}")]
    RuleLoad {
        origin: String,
        index: usize,
        error: Box<EngineError>,
    },
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    // Field access errors
    #[error("Invalid field path: {0}")]
    InvalidFieldPath(String),
    #[error("Path conflict at '{path}': '{segment}' does not hold a mapping")]
    PathConflict { path: String, segment: String },
    #[error("Cannot replace '{0}': parent mapping does not exist")]
    MissingParent(String),
    #[error("Field extraction error: {0}")]
    FieldExtraction(String),

    // Normalization failure, fatal for the current document
    #[error("{processor}: Could not parse source timestamp \"{value}\" with formats {formats:?}")]
    TimestampParse {
        processor: String,
        value: String,
        formats: Vec<String>,
        /// Fields left unwritten by conflicts before the failure
        conflicts: Vec<String>,
    },

    // Input and configuration errors
    #[error("IO error: {0}")]
    Io(String),
    #[error("YAML parsing error: {0}")]
    Yaml(String),
    #[error("JSON parsing error: {0}")]
    Json(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether the error aborts the pass over the current document.
    ///
    /// Every other error raised while applying a rule is isolated to that rule.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::TimestampParse { .. })
    }

    /// Whether the error was raised while loading rule definitions.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidFilterDefinition(_)
                | EngineError::InvalidRuleDefinition { .. }
                | EngineError::RuleLoad { .. }
                | EngineError::InvalidRegex { .. }
        )
    }

    pub(crate) fn rule_definition(
        kind: ProcessorKind,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::InvalidRuleDefinition {
            kind,
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Record the conflicting fields of the pass a fatal error aborted.
    pub(crate) fn with_conflicts(mut self, fields: Vec<String>) -> Self {
        if let EngineError::TimestampParse { conflicts, .. } = &mut self {
            *conflicts = fields;
        }
        self
    }

    pub(crate) fn in_origin(self, origin: impl Into<String>, index: usize) -> Self {
        EngineError::RuleLoad {
            origin: origin.into(),
            index,
            error: Box::new(self),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Yaml(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Json(err.to_string())
    }
}
