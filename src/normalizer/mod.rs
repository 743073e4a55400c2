//! Normalization of matched documents: grok extraction, timestamp conversion
//! and field substitution, written with first-writer-wins conflict checks.

pub mod conflict;
pub mod grok;
pub mod regex_mapping;
pub mod timestamp;

pub use conflict::{write_checked, write_field, ConflictSet, DuplicationWarning};
pub use grok::{GrokLibrary, GrokPattern};
pub use regex_mapping::RegexMapping;
pub use timestamp::{convert_timestamp, TimestampFormat};

use crate::error::{EngineError, Result};
use crate::field::{Document, FieldPath};
use crate::rule::{NormalizeAction, TargetSpec, TimestampSpec};
use serde_json::Value;

/// Inputs shared by every rule application of one normalization pass.
pub struct NormalizeContext<'a> {
    /// Name reported in timestamp errors, e.g. `Normalizer (windows)`.
    pub processor: &'a str,
    pub regex_mapping: &'a RegexMapping,
    pub current_year: i32,
}

/// Apply one rule's normalization to `doc`.
///
/// Write conflicts go to `conflicts`. An error stops the remaining steps of
/// this rule; only [`EngineError::TimestampParse`] is fatal for the document.
pub fn apply_normalize(
    doc: &mut Document,
    action: &NormalizeAction,
    ctx: &NormalizeContext<'_>,
    conflicts: &mut ConflictSet,
) -> Result<()> {
    for (source, patterns) in &action.grok {
        let Some(text) = source.get(doc).and_then(text_of) else {
            continue;
        };
        if let Some(fields) = grok::extract_first(patterns, &text) {
            for (target, value) in fields {
                if !value.is_null() {
                    write_checked(doc, &target, value, conflicts);
                }
            }
        }
    }

    for (source, spec) in &action.timestamps {
        normalize_timestamp(doc, source, spec, ctx, conflicts)?;
    }

    for (source, target) in &action.substitutions {
        substitute(doc, source, target, ctx.regex_mapping, conflicts);
    }

    Ok(())
}

fn normalize_timestamp(
    doc: &mut Document,
    source: &FieldPath,
    spec: &TimestampSpec,
    ctx: &NormalizeContext<'_>,
    conflicts: &mut ConflictSet,
) -> Result<()> {
    let raw = match source.get(doc) {
        Some(Value::String(raw)) => raw.clone(),
        Some(other) => {
            return Err(EngineError::FieldExtraction(format!(
                "timestamp source '{source}' is not a string: {other}"
            )))
        }
        None => {
            return Err(EngineError::FieldExtraction(format!(
                "timestamp source '{source}' does not exist"
            )))
        }
    };

    let converted = convert_timestamp(&raw, spec, ctx.current_year)
        .ok_or_else(|| timestamp::exhausted(ctx.processor, &raw, spec))?;

    if spec.allow_override {
        spec.destination.replace(doc, Value::String(converted))
    } else {
        write_checked(doc, &spec.destination, Value::String(converted), conflicts);
        Ok(())
    }
}

fn substitute(
    doc: &mut Document,
    source: &FieldPath,
    target: &TargetSpec,
    mapping: &RegexMapping,
    conflicts: &mut ConflictSet,
) {
    if let Some(value) = source.get(doc).cloned() {
        write_field(doc, target, value, mapping, conflicts);
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
