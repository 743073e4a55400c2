//! Grok patterns: named regular-expression templates that extract fields.
//!
//! A pattern such as `%{IP:client.ip} %{WORD:http.method} %{INT:status:int}`
//! expands every `%{NAME}` reference from a [`GrokLibrary`]. References with a
//! target become capture groups whose text is written to that field, optionally
//! converted to an integer or a float.

use crate::error::{EngineError, Result};
use crate::field::FieldPath;
use regex::Regex;
use serde_json::{Number, Value};
use std::collections::HashMap;

const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    ("USERNAME", r"[a-zA-Z0-9._-]+"),
    ("USER", r"%{USERNAME}"),
    ("INT", r"(?:[+-]?(?:[0-9]+))"),
    ("BASE10NUM", r"(?:[+-]?(?:[0-9]+(?:\.[0-9]+)?|\.[0-9]+))"),
    ("NUMBER", r"(?:%{BASE10NUM})"),
    ("POSINT", r"\b(?:[1-9][0-9]*)\b"),
    ("NONNEGINT", r"\b(?:[0-9]+)\b"),
    ("WORD", r"\b\w+\b"),
    ("NOTSPACE", r"\S+"),
    ("SPACE", r"\s*"),
    ("DATA", r".*?"),
    ("GREEDYDATA", r".*"),
    ("QUOTEDSTRING", r#""(?:[^"\\]|\\.)*""#),
    ("UUID", r"[A-Fa-f0-9]{8}-(?:[A-Fa-f0-9]{4}-){3}[A-Fa-f0-9]{12}"),
    ("MAC", r"(?:(?:[A-Fa-f0-9]{2}[:-]){5}[A-Fa-f0-9]{2})"),
    (
        "IPV4",
        r"(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)",
    ),
    ("IPV6", r"(?:[A-Fa-f0-9]{0,4}:){2,7}[A-Fa-f0-9]{0,4}"),
    ("IP", r"(?:%{IPV4}|%{IPV6})"),
    (
        "HOSTNAME",
        r"\b(?:[0-9A-Za-z][0-9A-Za-z-]{0,62})(?:\.(?:[0-9A-Za-z][0-9A-Za-z-]{0,62}))*(?:\.?|\b)",
    ),
    ("IPORHOST", r"(?:%{IP}|%{HOSTNAME})"),
    ("HOSTPORT", r"%{IPORHOST}:%{POSINT}"),
    ("UNIXPATH", r"(?:/[\w%!$@:.,+~-]*)+"),
    ("WINPATH", r"(?:[A-Za-z]+:|\\)(?:\\[^\\?*]*)+"),
    ("PATH", r"(?:%{UNIXPATH}|%{WINPATH})"),
    ("MONTHNUM", r"(?:0?[1-9]|1[0-2])"),
    ("MONTHDAY", r"(?:(?:0[1-9])|(?:[12][0-9])|(?:3[01])|[1-9])"),
    ("YEAR", r"(?:\d\d){1,2}"),
    ("HOUR", r"(?:2[0123]|[01]?[0-9])"),
    ("MINUTE", r"(?:[0-5][0-9])"),
    ("SECOND", r"(?:(?:[0-5]?[0-9]|60)(?:[:.,][0-9]+)?)"),
    ("TIME", r"%{HOUR}:%{MINUTE}(?::%{SECOND})?"),
    (
        "MONTH",
        r"\b(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?|Jul(?:y)?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\b",
    ),
    ("ISO8601_TIMEZONE", r"(?:Z|[+-]%{HOUR}(?::?%{MINUTE}))"),
    (
        "TIMESTAMP_ISO8601",
        r"%{YEAR}-%{MONTHNUM}-%{MONTHDAY}[T ]%{HOUR}:?%{MINUTE}(?::?%{SECOND})?%{ISO8601_TIMEZONE}?",
    ),
    ("SYSLOGTIMESTAMP", r"%{MONTH} +%{MONTHDAY} %{TIME}"),
    (
        "LOGLEVEL",
        r"(?:[Aa]lert|ALERT|[Tt]race|TRACE|[Dd]ebug|DEBUG|[Nn]otice|NOTICE|[Ii]nfo|INFO|[Ww]arn?(?:ing)?|WARN?(?:ING)?|[Ee]rr?(?:or)?|ERR?(?:OR)?|[Cc]rit?(?:ical)?|CRIT?(?:ICAL)?|[Ff]atal|FATAL|[Ss]evere|SEVERE|EMERG(?:ENCY)?|[Ee]merg(?:ency)?)",
    ),
];

/// Named pattern definitions available to grok expressions.
#[derive(Debug, Clone)]
pub struct GrokLibrary {
    patterns: HashMap<String, String>,
}

impl Default for GrokLibrary {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS
                .iter()
                .map(|(name, definition)| (name.to_string(), definition.to_string()))
                .collect(),
        }
    }
}

impl GrokLibrary {
    /// Default patterns extended (or overridden) by `extra`.
    pub fn with_patterns<I, K, V>(extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut library = Self::default();
        for (name, definition) in extra {
            library.add_pattern(name, definition);
        }
        library
    }

    pub fn add_pattern(&mut self, name: impl Into<String>, definition: impl Into<String>) {
        self.patterns.insert(name.into(), definition.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.patterns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Expand and compile a grok expression.
    pub fn compile(&self, expression: &str) -> Result<GrokPattern> {
        let mut captures = Vec::new();
        let mut stack = Vec::new();
        let expanded = self.expand(expression, &mut stack, &mut captures)?;

        let regex = Regex::new(&expanded).map_err(|e| EngineError::InvalidRegex {
            pattern: expression.to_string(),
            reason: e.to_string(),
        })?;

        Ok(GrokPattern {
            source: expression.to_string(),
            regex,
            captures,
        })
    }

    fn expand(
        &self,
        text: &str,
        stack: &mut Vec<String>,
        captures: &mut Vec<GrokCapture>,
    ) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("%{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| {
                EngineError::FieldExtraction(format!("unterminated grok reference in '{text}'"))
            })?;
            let reference = GrokReference::parse(&after[..end])?;

            let definition = self.patterns.get(reference.name).ok_or_else(|| {
                EngineError::FieldExtraction(format!("unknown grok pattern '{}'", reference.name))
            })?;
            if stack.iter().any(|name| name == reference.name) {
                return Err(EngineError::FieldExtraction(format!(
                    "recursive grok pattern '{}'",
                    reference.name
                )));
            }

            stack.push(reference.name.to_string());
            let body = self.expand(definition, stack, captures)?;
            stack.pop();

            match reference.target {
                Some(target) => {
                    let group = format!("_g{}", captures.len());
                    out.push_str(&format!("(?P<{group}>{body})"));
                    captures.push(GrokCapture {
                        group,
                        target,
                        conversion: reference.conversion,
                    });
                }
                None => out.push_str(&format!("(?:{body})")),
            }

            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

struct GrokReference<'a> {
    name: &'a str,
    target: Option<FieldPath>,
    conversion: Option<Conversion>,
}

impl<'a> GrokReference<'a> {
    fn parse(reference: &'a str) -> Result<Self> {
        let mut parts = reference.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(EngineError::FieldExtraction(
                "empty grok pattern name".to_string(),
            ));
        }
        let target = parts.next().map(FieldPath::parse).transpose()?;
        let conversion = match parts.next() {
            None => None,
            Some("int") => Some(Conversion::Int),
            Some("float") => Some(Conversion::Float),
            Some(other) => {
                return Err(EngineError::FieldExtraction(format!(
                    "unsupported grok conversion '{other}'"
                )))
            }
        };
        Ok(Self {
            name,
            target,
            conversion,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Int,
    Float,
}

#[derive(Debug, Clone)]
struct GrokCapture {
    group: String,
    target: FieldPath,
    conversion: Option<Conversion>,
}

impl GrokCapture {
    fn value(&self, text: &str) -> Value {
        let converted = match self.conversion {
            Some(Conversion::Int) => text.parse::<i64>().ok().map(Value::from),
            Some(Conversion::Float) => text
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            None => None,
        };
        converted.unwrap_or_else(|| Value::String(text.to_string()))
    }
}

/// Compiled grok expression.
#[derive(Debug, Clone)]
pub struct GrokPattern {
    source: String,
    regex: Regex,
    captures: Vec<GrokCapture>,
}

impl GrokPattern {
    /// The expression as written in the rule.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Fields written when the pattern matches.
    pub fn targets(&self) -> impl Iterator<Item = &FieldPath> {
        self.captures.iter().map(|capture| &capture.target)
    }

    /// Search `text` and return the captured fields, or `None` without a match.
    /// Groups that did not participate in the match are left out.
    pub fn extract(&self, text: &str) -> Option<Vec<(FieldPath, Value)>> {
        let found = self.regex.captures(text)?;
        Some(
            self.captures
                .iter()
                .filter_map(|capture| {
                    found
                        .name(&capture.group)
                        .map(|m| (capture.target.clone(), capture.value(m.as_str())))
                })
                .collect(),
        )
    }
}

impl PartialEq for GrokPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Run patterns in order and return the captures of the first that matches.
pub fn extract_first(patterns: &[GrokPattern], text: &str) -> Option<Vec<(FieldPath, Value)>> {
    patterns.iter().find_map(|pattern| pattern.extract(text))
}
