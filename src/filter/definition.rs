//! Structured filter descriptions.
//!
//! Besides the string form, a rule's `filter` may be a single-key object:
//!
//! ```yaml
//! filter:
//!   and:
//!     - equals: { field: winlog.event_id, value: 4624 }
//!     - not: { exists: user.domain }
//!     - wildcard: { field: process.name, pattern: "power*" }
//! ```
//!
//! Nested entries may themselves be strings in the Lucene-style syntax.

use crate::error::{EngineError, Result};
use crate::field::FieldPath;
use crate::filter::{parse_filter, FilterExpression, WildcardPattern};
use serde_json::{Map, Value};

/// Build a [`FilterExpression`] from a string or structured description.
pub fn filter_from_value(value: &Value) -> Result<FilterExpression> {
    match value {
        Value::String(text) => parse_filter(text),
        Value::Object(map) => filter_from_object(map),
        other => Err(invalid(format!(
            "expected a string or an object, found {other}"
        ))),
    }
}

fn filter_from_object(map: &Map<String, Value>) -> Result<FilterExpression> {
    let mut entries = map.iter();
    let (operator, operand) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        (None, _) => return Err(invalid("empty filter object")),
        (Some(_), Some(_)) => {
            return Err(invalid(format!(
                "filter object must have exactly one operator, found {:?}",
                map.keys().collect::<Vec<_>>()
            )))
        }
    };

    match operator.as_str() {
        "and" => Ok(FilterExpression::And(operand_list(operator, operand)?)),
        "or" => Ok(FilterExpression::Or(operand_list(operator, operand)?)),
        "not" => Ok(filter_from_value(operand)?.negate()),
        "exists" => {
            let path = operand
                .as_str()
                .ok_or_else(|| invalid("'exists' expects a field path string"))?;
            Ok(FilterExpression::FieldExists(path_from(path)?))
        }
        "equals" => {
            let args = operand_object(operator, operand)?;
            let path = field_argument(operator, args)?;
            let expected = args
                .get("value")
                .ok_or_else(|| invalid("'equals' requires a 'value'"))?;
            Ok(FilterExpression::FieldEquals(path, expected.clone()))
        }
        "wildcard" => {
            let args = operand_object(operator, operand)?;
            let path = field_argument(operator, args)?;
            let pattern = args
                .get("pattern")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("'wildcard' requires a string 'pattern'"))?;
            Ok(FilterExpression::FieldWildcard(
                path,
                WildcardPattern::new(pattern)?,
            ))
        }
        "match_all" => match operand {
            Value::Bool(true) | Value::Null => Ok(FilterExpression::MatchAll),
            _ => Err(invalid("'match_all' expects true")),
        },
        unknown => Err(invalid(format!("unknown filter operator '{unknown}'"))),
    }
}

fn operand_list(operator: &str, operand: &Value) -> Result<Vec<FilterExpression>> {
    let items = operand
        .as_array()
        .ok_or_else(|| invalid(format!("'{operator}' expects a list of filters")))?;
    if items.is_empty() {
        return Err(invalid(format!("'{operator}' requires at least one filter")));
    }
    items.iter().map(filter_from_value).collect()
}

fn operand_object<'a>(operator: &str, operand: &'a Value) -> Result<&'a Map<String, Value>> {
    operand
        .as_object()
        .ok_or_else(|| invalid(format!("'{operator}' expects an object")))
}

fn field_argument(operator: &str, args: &Map<String, Value>) -> Result<FieldPath> {
    let raw = args
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("'{operator}' requires a string 'field'")))?;
    path_from(raw)
}

fn path_from(raw: &str) -> Result<FieldPath> {
    FieldPath::parse(raw).map_err(|e| invalid(e.to_string()))
}

fn invalid(reason: impl Into<String>) -> EngineError {
    EngineError::InvalidFilterDefinition(reason.into())
}
