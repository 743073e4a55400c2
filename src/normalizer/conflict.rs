//! Conflict-checked writes and the per-document duplication report.

use crate::field::{Document, FieldPath};
use crate::normalizer::regex_mapping::RegexMapping;
use crate::rule::TargetSpec;
use indexmap::IndexSet;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

/// Fields whose write was refused while processing one document.
#[derive(Debug, Clone, Default)]
pub struct ConflictSet {
    fields: IndexSet<String>,
}

impl ConflictSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: &FieldPath) {
        self.fields.insert(path.as_str().to_string());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Turn the accumulated conflicts into a warning, if there are any.
    pub fn into_warning(self, processor: impl Into<String>) -> Option<DuplicationWarning> {
        if self.fields.is_empty() {
            return None;
        }
        Some(DuplicationWarning {
            processor: processor.into(),
            fields: self.fields.into_iter().collect(),
        })
    }
}

/// Recoverable report listing fields that already held a different value.
/// The document keeps every write that did not conflict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{processor}: The following fields already existed and were not overwritten: {}",
    .fields.join(", ")
)]
pub struct DuplicationWarning {
    pub processor: String,
    pub fields: Vec<String>,
}

/// Write `value` to the target, applying its regex transform first.
pub fn write_field(
    doc: &mut Document,
    target: &TargetSpec,
    value: Value,
    mapping: &RegexMapping,
    conflicts: &mut ConflictSet,
) {
    let value = match &target.transform {
        Some(transform) => mapping.transform(transform, value),
        None => value,
    };
    write_checked(doc, &target.path, value, conflicts);
}

/// First writer wins: an existing different value is kept and the path is
/// recorded, an equal value is a no-op. A path blocked by a non-mapping
/// intermediate is recorded as well.
pub fn write_checked(
    doc: &mut Document,
    path: &FieldPath,
    value: Value,
    conflicts: &mut ConflictSet,
) {
    match path.get(doc) {
        Some(existing) if *existing == value => {}
        Some(_) => {
            trace!(field = %path, "field already holds a different value");
            conflicts.record(path);
        }
        None => {
            if let Err(error) = path.set(doc, value) {
                trace!(field = %path, %error, "field is not writable");
                conflicts.record(path);
            }
        }
    }
}
