//! Key presence checks.

use crate::error::Result;
use crate::field::Document;
use crate::rule::KeyCheckerAction;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::trace;

/// Record the listed keys missing from `doc` under the rule's output field.
///
/// Missing keys are merged with a list already stored there and written
/// sorted and without duplicates. Nothing is written when every key exists.
/// Returns the keys found missing by this rule.
pub fn apply_key_check(doc: &mut Document, action: &KeyCheckerAction) -> Result<Vec<String>> {
    let missing: Vec<String> = action
        .key_list
        .iter()
        .filter(|path| !path.exists(doc))
        .map(|path| path.as_str().to_string())
        .collect();

    if missing.is_empty() {
        return Ok(missing);
    }

    let mut merged: BTreeSet<String> = match action.output_field.get(doc) {
        Some(Value::Array(existing)) => existing
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => BTreeSet::new(),
    };
    merged.extend(missing.iter().cloned());

    trace!(field = %action.output_field, missing = missing.len(), "writing missing keys");
    action.output_field.set(
        doc,
        Value::Array(merged.into_iter().map(Value::String).collect()),
    )?;
    Ok(missing)
}
