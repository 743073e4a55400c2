//! Building rules from declarative descriptions.
//!
//! A description is a mapping with a `filter` and the action key of the
//! processor kind it is loaded for. Normalize rules use either one combined
//! `normalize` mapping:
//!
//! ```yaml
//! filter: "winlog.event_id: 4624"
//! normalize:
//!   winlog.event_data.IpAddress: client.ip
//!   winlog.event_data.TargetUserName: [user.name, RE_DOMAIN_BACKSLASH_USERNAME, '\1']
//!   message:
//!     grok: "%{IP:source.ip} %{WORD:http.method}"
//!   winlog.event_data.SystemTime:
//!     timestamp:
//!       destination: "@timestamp"
//!       source_formats: [ISO8601]
//!       source_timezone: UTC
//!       destination_timezone: UTC
//! ```
//!
//! or separate `grok`, `timestamps` and `substitutions` mappings with the same
//! entry shapes. An optional free-text `description` key is ignored.

use crate::error::{EngineError, Result};
use crate::field::FieldPath;
use crate::filter::filter_from_value;
use crate::normalizer::grok::{GrokLibrary, GrokPattern};
use crate::normalizer::timestamp::TimestampFormat;
use crate::rule::{
    ActionPayload, DeleteAction, KeyCheckerAction, NormalizeAction, ProcessorKind, Rule,
    TargetSpec, TimestampSpec,
};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

const SPLIT_NORMALIZE_KEYS: [&str; 3] = ["grok", "timestamps", "substitutions"];

/// Build one rule for `kind` from its description.
pub fn parse_rule(kind: ProcessorKind, description: &Value, grok: &GrokLibrary) -> Result<Rule> {
    let map = description.as_object().ok_or_else(|| {
        EngineError::rule_definition(kind, "rule", "description must be a mapping")
    })?;

    for key in map.keys() {
        if !is_allowed_key(kind, key) {
            return Err(EngineError::rule_definition(
                kind,
                key.as_str(),
                "unexpected key for this rule kind",
            ));
        }
    }

    let filter = map
        .get("filter")
        .ok_or_else(|| EngineError::rule_definition(kind, "filter", "missing filter"))?;
    let filter = filter_from_value(filter)?;

    let action = match kind {
        ProcessorKind::Normalize => ActionPayload::Normalize(parse_normalize(map, grok)?),
        ProcessorKind::KeyChecker => ActionPayload::KeyCheck(parse_key_checker(map)?),
        ProcessorKind::Delete => ActionPayload::Delete(parse_delete(map)?),
    };

    Ok(Rule::new(filter, action))
}

/// Build rules from a single description or a sequence of them.
pub fn rules_from_value(
    kind: ProcessorKind,
    value: &Value,
    origin: &str,
    grok: &GrokLibrary,
) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();
    push_rules(kind, value, origin, grok, &mut rules)?;
    Ok(rules)
}

pub fn rules_from_json_str(
    kind: ProcessorKind,
    text: &str,
    origin: &str,
    grok: &GrokLibrary,
) -> Result<Vec<Rule>> {
    let value: Value = serde_json::from_str(text)?;
    let rules = rules_from_value(kind, &value, origin, grok)?;
    debug!(origin, %kind, rules = rules.len(), "loaded rule definitions");
    Ok(rules)
}

/// Every YAML document may hold one description or a sequence of them.
/// Rule indices in errors count across documents.
pub fn rules_from_yaml_str(
    kind: ProcessorKind,
    text: &str,
    origin: &str,
    grok: &GrokLibrary,
) -> Result<Vec<Rule>> {
    let mut rules = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        push_rules(kind, &value, origin, grok, &mut rules)?;
    }
    debug!(origin, %kind, rules = rules.len(), "loaded rule definitions");
    Ok(rules)
}

/// Read rules from a `.json`, `.yml` or `.yaml` file.
pub fn rules_from_file(
    kind: ProcessorKind,
    path: impl AsRef<Path>,
    grok: &GrokLibrary,
) -> Result<Vec<Rule>> {
    let path = path.as_ref();
    let origin = path.display().to_string();
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Io(format!("{origin}: {e}")))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yml") | Some("yaml") => rules_from_yaml_str(kind, &text, &origin, grok),
        _ => rules_from_json_str(kind, &text, &origin, grok),
    }
}

fn push_rules(
    kind: ProcessorKind,
    value: &Value,
    origin: &str,
    grok: &GrokLibrary,
    rules: &mut Vec<Rule>,
) -> Result<()> {
    let descriptions = match value {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        other => vec![other],
    };
    for description in descriptions {
        let index = rules.len();
        let rule =
            parse_rule(kind, description, grok).map_err(|e| e.in_origin(origin, index))?;
        rules.push(rule);
    }
    Ok(())
}

fn is_allowed_key(kind: ProcessorKind, key: &str) -> bool {
    match key {
        "filter" | "description" => true,
        "normalize" => kind == ProcessorKind::Normalize,
        key if SPLIT_NORMALIZE_KEYS.contains(&key) => kind == ProcessorKind::Normalize,
        "key_checker" => kind == ProcessorKind::KeyChecker,
        "delete" => kind == ProcessorKind::Delete,
        _ => false,
    }
}

fn normalize_error(field: impl Into<String>, reason: impl Into<String>) -> EngineError {
    EngineError::rule_definition(ProcessorKind::Normalize, field, reason)
}

fn parse_normalize(map: &Map<String, Value>, grok: &GrokLibrary) -> Result<NormalizeAction> {
    let combined = map.get("normalize");
    let split = SPLIT_NORMALIZE_KEYS.iter().any(|key| map.contains_key(*key));

    let mut action = NormalizeAction::default();
    match (combined, split) {
        (Some(_), true) => {
            return Err(normalize_error(
                "normalize",
                "cannot be combined with grok, timestamps or substitutions",
            ))
        }
        (None, false) => return Err(normalize_error("normalize", "missing normalization")),
        (Some(entries), false) => {
            for (source, entry) in entries_of("normalize", entries)? {
                let path = source_path(source)?;
                parse_combined_entry(&mut action, path, source, entry, grok)?;
            }
        }
        (None, true) => {
            if let Some(entries) = map.get("grok") {
                for (source, patterns) in entries_of("grok", entries)? {
                    let compiled = parse_grok_patterns(source, patterns, grok)?;
                    action.grok.insert(source_path(source)?, compiled);
                }
            }
            if let Some(entries) = map.get("timestamps") {
                for (source, spec) in entries_of("timestamps", entries)? {
                    let spec = spec.get("timestamp").unwrap_or(spec);
                    let parsed = parse_timestamp_spec(source, spec)?;
                    action.timestamps.insert(source_path(source)?, parsed);
                }
            }
            if let Some(entries) = map.get("substitutions") {
                for (source, target) in entries_of("substitutions", entries)? {
                    let parsed = parse_target(source, target)?;
                    action.substitutions.insert(source_path(source)?, parsed);
                }
            }
        }
    }

    if action.is_empty() {
        return Err(normalize_error("normalize", "no normalization defined"));
    }
    Ok(action)
}

fn parse_combined_entry(
    action: &mut NormalizeAction,
    source_path: FieldPath,
    source: &str,
    entry: &Value,
    grok: &GrokLibrary,
) -> Result<()> {
    match entry {
        Value::Object(object) if object.contains_key("grok") => {
            let patterns = parse_grok_patterns(source, &object["grok"], grok)?;
            action.grok.insert(source_path, patterns);
        }
        Value::Object(object) if object.contains_key("timestamp") => {
            let spec = parse_timestamp_spec(source, &object["timestamp"])?;
            action.timestamps.insert(source_path, spec);
        }
        Value::Object(_) => {
            return Err(normalize_error(
                source,
                "expected a 'grok' or 'timestamp' normalization",
            ))
        }
        target => {
            let target = parse_target(source, target)?;
            action.substitutions.insert(source_path, target);
        }
    }
    Ok(())
}

fn entries_of<'a>(key: &str, value: &'a Value) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| normalize_error(key, "expected a mapping from source fields"))
}

fn source_path(source: &str) -> Result<FieldPath> {
    FieldPath::parse(source).map_err(|e| normalize_error(source, e.to_string()))
}

fn field_path(source: &str, raw: &str) -> Result<FieldPath> {
    FieldPath::parse(raw).map_err(|e| normalize_error(source, e.to_string()))
}

fn parse_target(source: &str, target: &Value) -> Result<TargetSpec> {
    match target {
        Value::String(path) => Ok(TargetSpec::plain(field_path(source, path)?)),
        Value::Array(parts) => match parts.as_slice() {
            [Value::String(path), Value::String(regex_id), Value::String(substitution)] => {
                Ok(TargetSpec::with_transform(
                    field_path(source, path)?,
                    regex_id.as_str(),
                    substitution.as_str(),
                ))
            }
            _ => Err(normalize_error(
                source,
                "expected [target, regex id, substitution]",
            )),
        },
        other => Err(normalize_error(
            source,
            format!("invalid target {other}"),
        )),
    }
}

fn parse_grok_patterns(
    source: &str,
    patterns: &Value,
    grok: &GrokLibrary,
) -> Result<Vec<GrokPattern>> {
    let expressions: Vec<&str> = match patterns {
        Value::String(expression) => vec![expression.as_str()],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| normalize_error(source, "grok patterns must be strings"))
            })
            .collect::<Result<_>>()?,
        _ => {
            return Err(normalize_error(
                source,
                "grok expects a pattern or a list of patterns",
            ))
        }
    };
    if expressions.is_empty() {
        return Err(normalize_error(source, "grok pattern list is empty"));
    }

    expressions
        .into_iter()
        .map(|expression| {
            grok.compile(expression)
                .map_err(|e| normalize_error(source, e.to_string()))
        })
        .collect()
}

fn parse_timestamp_spec(source: &str, spec: &Value) -> Result<TimestampSpec> {
    let spec = spec
        .as_object()
        .ok_or_else(|| normalize_error(source, "timestamp must be a mapping"))?;

    let destination = field_path(source, required_str(source, spec, "destination")?)?;
    let source_timezone = parse_timezone(source, required_str(source, spec, "source_timezone")?)?;
    let destination_timezone =
        parse_timezone(source, required_str(source, spec, "destination_timezone")?)?;

    let formats = spec
        .get("source_formats")
        .and_then(Value::as_array)
        .filter(|formats| !formats.is_empty())
        .ok_or_else(|| {
            normalize_error(source, "timestamp requires a non-empty 'source_formats' list")
        })?;
    let source_formats = formats
        .iter()
        .map(|format| {
            format
                .as_str()
                .ok_or_else(|| normalize_error(source, "source formats must be strings"))
                .and_then(|raw| {
                    TimestampFormat::parse(raw).map_err(|e| normalize_error(source, e.to_string()))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let allow_override = match spec.get("allow_override") {
        None => true,
        Some(Value::Bool(flag)) => *flag,
        Some(other) => {
            return Err(normalize_error(
                source,
                format!("allow_override value {other} is not a boolean"),
            ))
        }
    };

    Ok(TimestampSpec {
        destination,
        source_formats,
        source_timezone,
        destination_timezone,
        allow_override,
    })
}

fn required_str<'a>(source: &str, spec: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    spec.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| normalize_error(source, format!("timestamp requires a string '{key}'")))
}

fn parse_timezone(source: &str, name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| normalize_error(source, format!("unknown timezone '{name}'")))
}

fn parse_key_checker(map: &Map<String, Value>) -> Result<KeyCheckerAction> {
    let kind = ProcessorKind::KeyChecker;
    let config = map
        .get("key_checker")
        .ok_or_else(|| EngineError::rule_definition(kind, "key_checker", "missing key_checker"))?
        .as_object()
        .ok_or_else(|| EngineError::rule_definition(kind, "key_checker", "must be a mapping"))?;

    let keys = config
        .get("key_list")
        .ok_or_else(|| EngineError::rule_definition(kind, "key_list", "missing key_list"))?
        .as_array()
        .filter(|keys| !keys.is_empty())
        .ok_or_else(|| {
            EngineError::rule_definition(kind, "key_list", "must be a non-empty list of fields")
        })?;

    let key_list = keys
        .iter()
        .map(|key| {
            let raw = key.as_str().ok_or_else(|| {
                EngineError::rule_definition(kind, "key_list", format!("{key} is not a string"))
            })?;
            FieldPath::parse(raw)
                .map_err(|e| EngineError::rule_definition(kind, "key_list", e.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    let output_field = config
        .get("output_field")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            EngineError::rule_definition(kind, "output_field", "missing output_field string")
        })?;
    let output_field = FieldPath::parse(output_field)
        .map_err(|e| EngineError::rule_definition(kind, "output_field", e.to_string()))?;

    Ok(KeyCheckerAction {
        key_list,
        output_field,
    })
}

fn parse_delete(map: &Map<String, Value>) -> Result<DeleteAction> {
    match map.get("delete") {
        Some(Value::Bool(delete)) => Ok(DeleteAction { delete: *delete }),
        Some(other) => Err(EngineError::rule_definition(
            ProcessorKind::Delete,
            "delete",
            format!("value {other} is not a boolean"),
        )),
        None => Err(EngineError::rule_definition(
            ProcessorKind::Delete,
            "delete",
            "missing delete flag",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterExpression;
    use serde_json::json;

    fn grok() -> GrokLibrary {
        GrokLibrary::default()
    }

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_combined_normalize_rule() {
        let rule = parse_rule(
            ProcessorKind::Normalize,
            &json!({
                "filter": "winlog.event_id: 4624",
                "normalize": {
                    "winlog.event_data.IpAddress": "client.ip",
                    "winlog.event_data.TargetUserName": ["user.name", "RE_USER", "\\1"],
                    "message": {"grok": "%{IP:source.ip}"},
                    "winlog.event_data.SystemTime": {"timestamp": {
                        "destination": "@timestamp",
                        "source_formats": ["ISO8601"],
                        "source_timezone": "UTC",
                        "destination_timezone": "Europe/Berlin"
                    }}
                }
            }),
            &grok(),
        )
        .unwrap();

        let ActionPayload::Normalize(action) = rule.action() else {
            panic!("Expected a normalize action");
        };
        assert_eq!(action.substitutions.len(), 2);
        assert_eq!(action.grok.len(), 1);
        let spec = &action.timestamps[&path("winlog.event_data.SystemTime")];
        assert!(spec.allow_override);
        assert_eq!(spec.destination_timezone, chrono_tz::Europe::Berlin);

        let target = &action.substitutions[&path("winlog.event_data.TargetUserName")];
        let transform = target.transform.as_ref().unwrap();
        assert_eq!(transform.regex_id, "RE_USER");
        assert_eq!(transform.replacement(), "${1}");
    }

    #[test]
    fn test_parse_split_normalize_rule() {
        let rule = parse_rule(
            ProcessorKind::Normalize,
            &json!({
                "filter": "*",
                "grok": {"message": ["%{INT:code:int}", "%{WORD:word}"]},
                "timestamps": {"time": {
                    "destination": "@timestamp",
                    "source_formats": ["%d.%m.%Y"],
                    "source_timezone": "UTC",
                    "destination_timezone": "UTC",
                    "allow_override": false
                }},
                "substitutions": {"a": "b"}
            }),
            &grok(),
        )
        .unwrap();

        assert_eq!(rule.filter(), &FilterExpression::MatchAll);
        let ActionPayload::Normalize(action) = rule.action() else {
            panic!("Expected a normalize action");
        };
        assert_eq!(action.grok[&path("message")].len(), 2);
        assert!(!action.timestamps[&path("time")].allow_override);
        assert_eq!(action.substitutions[&path("a")], TargetSpec::plain(path("b")));
    }

    #[test]
    fn test_normalize_rule_errors_name_the_field() {
        let cases = [
            (json!({"filter": "*"}), "normalize"),
            (json!({"filter": "*", "normalize": {}}), "normalize"),
            (json!({"filter": "*", "normalize": {"a": 1}}), "'a'"),
            (json!({"filter": "*", "normalize": {"a": ["x", "y"]}}), "'a'"),
            (json!({"filter": "*", "normalize": {"src": {"grok": "%{NOPE:x}"}}}), "'src'"),
            (
                json!({"filter": "*", "normalize": {"t": {"timestamp": {
                    "destination": "@timestamp",
                    "source_formats": ["ISO8601"],
                    "source_timezone": "Mars/Olympus",
                    "destination_timezone": "UTC"
                }}}}),
                "Mars/Olympus",
            ),
            (
                json!({"filter": "*", "normalize": {"t": {"timestamp": {
                    "destination": "@timestamp",
                    "source_formats": [],
                    "source_timezone": "UTC",
                    "destination_timezone": "UTC"
                }}}}),
                "source_formats",
            ),
            (
                json!({"filter": "*", "normalize": {"a": "b"}, "substitutions": {"c": "d"}}),
                "cannot be combined",
            ),
        ];

        for (description, expected) in cases {
            let error = parse_rule(ProcessorKind::Normalize, &description, &grok()).unwrap_err();
            assert!(
                matches!(error, EngineError::InvalidRuleDefinition { kind: ProcessorKind::Normalize, .. }),
                "{description}: {error}"
            );
            assert!(
                error.to_string().contains(expected),
                "{description}: {error} should mention {expected}"
            );
        }
    }

    #[test]
    fn test_parse_key_checker_rule() {
        let rule = parse_rule(
            ProcessorKind::KeyChecker,
            &json!({
                "filter": "*",
                "key_checker": {"key_list": ["a.b", "a.c"], "output_field": "missing_fields"}
            }),
            &grok(),
        )
        .unwrap();

        assert_eq!(
            rule.action(),
            &ActionPayload::KeyCheck(KeyCheckerAction {
                key_list: vec![path("a.b"), path("a.c")],
                output_field: path("missing_fields"),
            })
        );
    }

    #[test]
    fn test_key_checker_missing_key_list() {
        let error = parse_rule(
            ProcessorKind::KeyChecker,
            &json!({"filter": "*", "key_checker": {"output_field": "missing"}}),
            &grok(),
        )
        .unwrap_err();
        assert_eq!(
            error,
            EngineError::rule_definition(ProcessorKind::KeyChecker, "key_list", "missing key_list")
        );

        let error = parse_rule(
            ProcessorKind::KeyChecker,
            &json!({"filter": "*", "key_checker": {"key_list": [], "output_field": "m"}}),
            &grok(),
        )
        .unwrap_err();
        assert!(error.to_string().contains("'key_list'"));
    }

    #[test]
    fn test_delete_flag_must_be_boolean() {
        let rule = parse_rule(
            ProcessorKind::Delete,
            &json!({"filter": "event.code: 4", "delete": true}),
            &grok(),
        )
        .unwrap();
        assert_eq!(rule.action(), &ActionPayload::Delete(DeleteAction { delete: true }));

        let error = parse_rule(
            ProcessorKind::Delete,
            &json!({"filter": "*", "delete": "yes"}),
            &grok(),
        )
        .unwrap_err();
        assert!(matches!(
            error,
            EngineError::InvalidRuleDefinition { kind: ProcessorKind::Delete, ref field, .. } if field == "delete"
        ));
    }

    #[test]
    fn test_foreign_action_keys_are_rejected() {
        let error = parse_rule(
            ProcessorKind::Delete,
            &json!({"filter": "*", "delete": true, "normalize": {"a": "b"}}),
            &grok(),
        )
        .unwrap_err();
        assert!(error.to_string().contains("'normalize'"));

        let error = parse_rule(ProcessorKind::Delete, &json!({"delete": true}), &grok())
            .unwrap_err();
        assert!(error.to_string().contains("'filter'"));
    }

    #[test]
    fn test_filter_errors_propagate() {
        let error = parse_rule(
            ProcessorKind::Delete,
            &json!({"filter": {"near": "a"}, "delete": true}),
            &grok(),
        )
        .unwrap_err();
        assert!(matches!(error, EngineError::InvalidFilterDefinition(_)));
    }

    #[test]
    fn test_json_sources_carry_origin_and_index() {
        let text = r#"[
            {"filter": "a", "delete": true},
            {"filter": "b", "delete": 1}
        ]"#;
        let error = rules_from_json_str(ProcessorKind::Delete, text, "delete.json", &grok())
            .unwrap_err();

        match error {
            EngineError::RuleLoad { origin, index, error } => {
                assert_eq!(origin, "delete.json");
                assert_eq!(index, 1);
                assert!(error.is_definition_error());
            }
            other => panic!("Expected RuleLoad, got {other:?}"),
        }

        let single =
            rules_from_json_str(ProcessorKind::Delete, r#"{"filter": "*", "delete": false}"#, "x", &grok())
                .unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_yaml_multi_document_sources() {
        let text = "filter: a\ndelete: true\n---\n- filter: b\n  delete: false\n- filter: c\n  delete: true\n";
        let rules = rules_from_yaml_str(ProcessorKind::Delete, text, "rules.yml", &grok()).unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(
            rules[1].action(),
            &ActionPayload::Delete(DeleteAction { delete: false })
        );

        let invalid = "filter: a\ndelete: true\n---\nfilter: b\ndelete: yes\n";
        let error = rules_from_yaml_str(ProcessorKind::Delete, invalid, "rules.yml", &grok())
            .unwrap_err();
        assert!(matches!(error, EngineError::RuleLoad { index: 1, .. }));
    }

    #[test]
    fn test_malformed_json_source() {
        let error =
            rules_from_json_str(ProcessorKind::Delete, "[{", "broken.json", &grok()).unwrap_err();
        assert!(matches!(error, EngineError::Json(_)));
    }
}
