//! Boolean filter expressions selecting the documents a rule applies to.
//!
//! Filters are built once at rule-load time, either from a Lucene-style string
//! ([`parse_filter`]) or from a structured description ([`filter_from_value`]),
//! and are immutable afterwards.
//!
//! ```rust
//! use logrule_engine::filter::parse_filter;
//! use serde_json::json;
//!
//! let filter = parse_filter(r#"winlog.event_id: 4624 AND NOT user.name: "SYSTEM""#)?;
//! let doc = json!({"winlog": {"event_id": 4624}, "user": {"name": "alice"}});
//!
//! assert!(filter.evaluate(doc.as_object().unwrap()));
//! # Ok::<(), logrule_engine::EngineError>(())
//! ```

pub mod definition;
pub mod parser;
pub mod wildcard;

pub use definition::filter_from_value;
pub use parser::parse_filter;
pub use wildcard::WildcardPattern;

use crate::field::{Document, FieldPath};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// Predicate tree evaluated against a [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    /// `*`, matches every document.
    MatchAll,
    /// The path resolves in the document.
    FieldExists(FieldPath),
    /// The value at the path equals the expected value.
    FieldEquals(FieldPath, Value),
    /// The value at the path matches a `*` glob.
    FieldWildcard(FieldPath, WildcardPattern),
    And(Vec<FilterExpression>),
    Or(Vec<FilterExpression>),
    Not(Box<FilterExpression>),
}

impl FilterExpression {
    pub fn equals(path: FieldPath, value: impl Into<Value>) -> Self {
        FilterExpression::FieldEquals(path, value.into())
    }

    pub fn negate(self) -> Self {
        FilterExpression::Not(Box::new(self))
    }

    /// Evaluate the predicate. `And` and `Or` short-circuit.
    pub fn evaluate(&self, doc: &Document) -> bool {
        match self {
            FilterExpression::MatchAll => true,
            FilterExpression::FieldExists(path) => path.exists(doc),
            FilterExpression::FieldEquals(path, expected) => path
                .get(doc)
                .map(|actual| values_match(actual, expected))
                .unwrap_or(false),
            FilterExpression::FieldWildcard(path, pattern) => path
                .get(doc)
                .map(|actual| pattern.matches_value(actual))
                .unwrap_or(false),
            FilterExpression::And(children) => children.iter().all(|child| child.evaluate(doc)),
            FilterExpression::Or(children) => children.iter().any(|child| child.evaluate(doc)),
            FilterExpression::Not(child) => !child.evaluate(doc),
        }
    }

    /// Whether the expression is a leaf predicate on a single field.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            FilterExpression::FieldExists(_)
                | FilterExpression::FieldEquals(..)
                | FilterExpression::FieldWildcard(..)
        )
    }

    /// Field path tested by a leaf predicate.
    pub fn leaf_path(&self) -> Option<&FieldPath> {
        match self {
            FilterExpression::FieldExists(path)
            | FilterExpression::FieldEquals(path, _)
            | FilterExpression::FieldWildcard(path, _) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpression::MatchAll => f.write_str("*"),
            FilterExpression::FieldExists(path) => write!(f, "{path}"),
            FilterExpression::FieldEquals(path, value) => write!(f, "{path}: {value}"),
            FilterExpression::FieldWildcard(path, pattern) => write!(f, "{path}: {pattern}"),
            FilterExpression::And(children) => write_joined(f, children, " AND "),
            FilterExpression::Or(children) => write_joined(f, children, " OR "),
            FilterExpression::Not(child) => write!(f, "NOT ({child})"),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    children: &[FilterExpression],
    separator: &str,
) -> fmt::Result {
    f.write_str("(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}

/// Textual form of a scalar, used for lenient equality and index lookups.
///
/// Returns `None` for null, sequences and mappings.
pub(crate) fn scalar_key(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(true) => Some(Cow::Borrowed("true")),
        Value::Bool(false) => Some(Cow::Borrowed("false")),
        _ => None,
    }
}

/// Equality used by `FieldEquals`.
///
/// Scalars compare by their textual form, so `"4624"` equals `4624`. A
/// sequence matches when any of its elements matches.
pub(crate) fn values_match(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    if let Value::Array(items) = actual {
        return items.iter().any(|item| values_match(item, expected));
    }
    match (scalar_key(actual), scalar_key(expected)) {
        (Some(lhs), Some(rhs)) => lhs == rhs,
        _ => false,
    }
}
