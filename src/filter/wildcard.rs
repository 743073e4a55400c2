//! Glob-style `*` matching of field values.

use crate::error::{EngineError, Result};
use crate::filter::scalar_key;
use regex::Regex;
use serde_json::Value;
use std::fmt;

/// Compiled `*` glob. A backslash escapes the next character, so `\*` matches
/// a literal asterisk.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    pattern: String,
    regex: Regex,
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut translated = String::with_capacity(pattern.len() + 8);
        translated.push('^');

        let mut chars = pattern.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '*' => translated.push_str(".*"),
                '\\' => match chars.next() {
                    Some(escaped) => translated.push_str(&regex::escape(&escaped.to_string())),
                    None => translated.push_str(&regex::escape("\\")),
                },
                other => translated.push_str(&regex::escape(&other.to_string())),
            }
        }
        translated.push('$');

        let regex = Regex::new(&translated).map_err(|e| EngineError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// `*` alone matches any value.
    pub fn is_universal(&self) -> bool {
        self.pattern == "*"
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    /// Match a document value. Sequences match when any element does.
    pub fn matches_value(&self, value: &Value) -> bool {
        if self.is_universal() {
            return true;
        }
        match value {
            Value::Array(items) => items.iter().any(|item| self.matches_value(item)),
            other => scalar_key(other)
                .map(|text| self.matches(&text))
                .unwrap_or(false),
        }
    }
}

impl PartialEq for WildcardPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl fmt::Display for WildcardPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
