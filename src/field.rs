//! Dotted field paths into nested event documents.
//!
//! A [`Document`] is a JSON object. A [`FieldPath`] such as `winlog.event_data.User`
//! addresses a value by walking one mapping per segment. Only mappings are
//! descended into: a path that runs into a string, number or sequence before its
//! last segment does not resolve.
//!
//! ```rust
//! use logrule_engine::field::{Document, FieldPath};
//! use serde_json::json;
//!
//! let mut doc: Document = serde_json::from_value(json!({"a": {"b": 1}})).unwrap();
//! let path = FieldPath::parse("a.c.d")?;
//!
//! path.set(&mut doc, json!("x"))?;
//! assert_eq!(doc["a"]["c"]["d"], json!("x"));
//! # Ok::<(), logrule_engine::EngineError>(())
//! ```

use crate::error::{EngineError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Structured event record processed by the rules.
pub type Document = Map<String, Value>;

/// Pre-split dotted path into a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted path, rejecting empty paths and empty segments.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(EngineError::InvalidFieldPath("empty path".to_string()));
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(EngineError::InvalidFieldPath(format!(
                "'{path}' contains an empty segment"
            )));
        }
        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments in the path.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// True iff every segment resolves.
    pub fn exists(&self, doc: &Document) -> bool {
        self.get(doc).is_some()
    }

    /// Value at the end of the path, or `None` when any segment is missing
    /// or an intermediate value is not a mapping.
    pub fn get<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
        let (last, parents) = self.segments.split_last()?;
        let mut current = doc;
        for segment in parents {
            current = current.get(segment)?.as_object()?;
        }
        current.get(last)
    }

    /// Write `value` at the path, creating missing intermediate mappings.
    ///
    /// The last segment is always overwritten. When an existing intermediate
    /// value is not a mapping the document is left untouched and
    /// [`EngineError::PathConflict`] is returned.
    pub fn set(&self, doc: &mut Document, value: Value) -> Result<()> {
        let (last, parents) = self
            .segments
            .split_last()
            .ok_or_else(|| EngineError::InvalidFieldPath(self.raw.clone()))?;

        let mut current = doc;
        for (depth, segment) in parents.iter().enumerate() {
            let entry = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(map) => current = map,
                _ => return Err(self.conflict_at(depth)),
            }
        }
        current.insert(last.clone(), value);
        Ok(())
    }

    /// Overwrite the value at the path. Every parent mapping must already exist.
    pub fn replace(&self, doc: &mut Document, value: Value) -> Result<()> {
        let (last, parents) = self
            .segments
            .split_last()
            .ok_or_else(|| EngineError::InvalidFieldPath(self.raw.clone()))?;

        let mut current = doc;
        for (depth, segment) in parents.iter().enumerate() {
            match current.get_mut(segment) {
                Some(Value::Object(map)) => current = map,
                Some(_) => return Err(self.conflict_at(depth)),
                None => return Err(EngineError::MissingParent(self.raw.clone())),
            }
        }
        current.insert(last.clone(), value);
        Ok(())
    }

    /// Remove and return the value at the path.
    pub fn delete(&self, doc: &mut Document) -> Option<Value> {
        let (last, parents) = self.segments.split_last()?;
        let mut current = doc;
        for segment in parents {
            current = current.get_mut(segment)?.as_object_mut()?;
        }
        current.remove(last)
    }

    fn conflict_at(&self, depth: usize) -> EngineError {
        EngineError::PathConflict {
            path: self.raw.clone(),
            segment: self.segments[..=depth].join("."),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for FieldPath {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        FieldPath::parse(s)
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FieldPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Convert a JSON value into a [`Document`], rejecting non-objects.
pub fn document_from_value(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(EngineError::FieldExtraction(format!(
            "expected a JSON object as document, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        document_from_value(value).unwrap()
    }

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse(".a").is_err());
        assert!(FieldPath::parse("a.").is_err());
        assert_eq!(path("a.b.c").depth(), 3);
        assert_eq!(path("@timestamp").segments(), &["@timestamp".to_string()]);
    }

    #[test]
    fn test_exists_and_get() {
        let event = doc(json!({"a": {"b": {"c": 1}}, "s": "text"}));

        assert!(path("a").exists(&event));
        assert!(path("a.b.c").exists(&event));
        assert!(!path("a.b.x").exists(&event));
        assert!(!path("s.x").exists(&event));
        assert_eq!(path("a.b.c").get(&event), Some(&json!(1)));
        assert_eq!(path("a.x.c").get(&event), None);
    }

    #[test]
    fn test_get_does_not_descend_into_sequences() {
        let event = doc(json!({"list": [{"a": 1}]}));
        assert_eq!(path("list.0.a").get(&event), None);
        assert!(path("list").exists(&event));
    }

    #[test]
    fn test_set_creates_intermediate_mappings() {
        let mut event = doc(json!({"a": {"b": 1}}));
        path("a.c.d").set(&mut event, json!("x")).unwrap();
        path("top").set(&mut event, json!(true)).unwrap();

        assert_eq!(
            Value::Object(event),
            json!({"a": {"b": 1, "c": {"d": "x"}}, "top": true})
        );
    }

    #[test]
    fn test_set_overwrites_last_segment() {
        let mut event = doc(json!({"a": {"b": 1}}));
        path("a.b").set(&mut event, json!(2)).unwrap();
        assert_eq!(event["a"]["b"], json!(2));
    }

    #[test]
    fn test_set_conflict_leaves_document_unchanged() {
        let mut event = doc(json!({"a": 1}));
        let err = path("a.b").set(&mut event, json!("x")).unwrap_err();

        assert_eq!(
            err,
            EngineError::PathConflict {
                path: "a.b".to_string(),
                segment: "a".to_string(),
            }
        );
        assert_eq!(Value::Object(event), json!({"a": 1}));
    }

    #[test]
    fn test_replace_requires_parents() {
        let mut event = doc(json!({"a": {"b": 1}, "s": "x"}));
        path("a.b").replace(&mut event, json!(5)).unwrap();
        assert_eq!(event["a"]["b"], json!(5));

        assert_eq!(
            path("x.y").replace(&mut event, json!(1)),
            Err(EngineError::MissingParent("x.y".to_string()))
        );
        assert!(matches!(
            path("s.y").replace(&mut event, json!(1)),
            Err(EngineError::PathConflict { .. })
        ));
    }

    #[test]
    fn test_delete() {
        let mut event = doc(json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(path("a.b").delete(&mut event), Some(json!(1)));
        assert_eq!(path("a.b").delete(&mut event), None);
        assert_eq!(Value::Object(event), json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let parsed: FieldPath = serde_json::from_value(json!("a.b")).unwrap();
        assert_eq!(parsed.as_str(), "a.b");
        assert!(serde_json::from_value::<FieldPath>(json!("a..b")).is_err());
    }

    #[test]
    fn test_document_from_value_rejects_scalars() {
        assert!(document_from_value(json!([1, 2])).is_err());
        assert!(document_from_value(json!({})).is_ok());
    }
}
