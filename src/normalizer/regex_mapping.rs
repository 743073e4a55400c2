//! Named regular expressions used to rewrite values before they are written.

use crate::error::{EngineError, Result};
use crate::rule::RegexTransform;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// Table from a short identifier to a compiled regex, supplied once when the
/// processor is built.
#[derive(Debug, Clone, Default)]
pub struct RegexMapping {
    patterns: HashMap<String, Regex>,
}

impl RegexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every entry, failing on the first invalid pattern.
    pub fn from_patterns<I, K, V>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut mapping = Self::new();
        for (id, pattern) in patterns {
            mapping.insert(id, pattern.as_ref())?;
        }
        Ok(mapping)
    }

    pub fn insert(&mut self, id: impl Into<String>, pattern: &str) -> Result<()> {
        let regex = Regex::new(pattern).map_err(|e| EngineError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.patterns.insert(id.into(), regex);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Regex> {
        self.patterns.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.patterns.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Rewrite a string value with every match of the identified regex
    /// replaced. Unknown identifiers and non-string values pass through.
    pub fn transform(&self, transform: &RegexTransform, value: Value) -> Value {
        match (self.patterns.get(&transform.regex_id), value) {
            (Some(regex), Value::String(text)) => Value::String(
                regex
                    .replace_all(&text, transform.replacement())
                    .into_owned(),
            ),
            (_, value) => value,
        }
    }
}

/// Translate `\1`, `\g<1>` and `\g<name>` group references into `${..}` form.
///
/// Literal `$` is escaped, `\\` yields a backslash, `\n` and `\t` yield the
/// control characters. Any other escape is kept as written.
pub(crate) fn translate_substitution(substitution: &str) -> String {
    let mut out = String::with_capacity(substitution.len() + 4);
    let mut chars = substitution.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(&d) = chars.peek() {
                        if d.is_ascii_digit() && group.len() < 2 {
                            group.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let mut name = String::new();
                        let mut closed = false;
                        for c in chars.by_ref() {
                            if c == '>' {
                                closed = true;
                                break;
                            }
                            name.push(c);
                        }
                        if closed {
                            out.push_str(&format!("${{{name}}}"));
                        } else {
                            out.push_str("\\g<");
                            out.push_str(&name);
                        }
                    } else {
                        out.push_str("\\g");
                    }
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                _ => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}
