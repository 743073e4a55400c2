//! Rule files and rule description validation.

use logrule_engine::rule::{rules_from_file, rules_from_yaml_str};
use logrule_engine::{
    ActionPayload, EngineConfig, EngineError, GrokLibrary, ProcessorKind, RuleProcessor,
};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_yaml_and_json_rule_files() {
    let dir = TempDir::new().unwrap();
    let generic = write(
        &dir,
        "generic.yml",
        r#"
filter: "*"
normalize:
  host.name: observer.hostname
---
filter: "event.code: 4624"
normalize:
  winlog.event_data.TargetUserName: user.name
"#,
    );
    let specific = write(
        &dir,
        "specific.json",
        r#"[{"filter": "event.code: 4624", "normalize": {"winlog.event_data.IpAddress": "client.ip"}}]"#,
    );

    let processor =
        RuleProcessor::new("files", ProcessorKind::Normalize, EngineConfig::default()).unwrap();
    let generation = processor.load_rule_files(&[generic], &[specific]).unwrap();
    assert_eq!(generation, 1);
    assert_eq!(processor.rule_count(), 3);

    let mut event = json!({
        "host": {"name": "dc01"},
        "event": {"code": 4624},
        "winlog": {"event_data": {"TargetUserName": "alice", "IpAddress": "10.0.0.1"}}
    })
    .as_object()
    .cloned()
    .unwrap();
    let outcome = processor.process(&mut event).unwrap();

    assert_eq!(outcome.matched_rules.len(), 3);
    assert_eq!(event["observer"]["hostname"], json!("dc01"));
    assert_eq!(event["user"]["name"], json!("alice"));
    assert_eq!(event["client"]["ip"], json!("10.0.0.1"));
}

#[test]
fn test_error_names_file_and_rule_index() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "deleter.json",
        r#"[{"filter": "*", "delete": true}, {"filter": "*", "delete": "yes"}]"#,
    );

    let error = rules_from_file(ProcessorKind::Delete, &path, &GrokLibrary::default()).unwrap_err();

    match &error {
        EngineError::RuleLoad {
            origin,
            index,
            error: inner,
        } => {
            assert!(origin.ends_with("deleter.json"));
            assert_eq!(*index, 1);
            assert!(matches!(
                **inner,
                EngineError::InvalidRuleDefinition {
                    kind: ProcessorKind::Delete,
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(error.is_definition_error());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let error = rules_from_file(
        ProcessorKind::Delete,
        dir.path().join("absent.json"),
        &GrokLibrary::default(),
    )
    .unwrap_err();

    assert!(matches!(error, EngineError::Io(_)));
}

#[test]
fn test_invalid_filters_are_rejected() {
    for filter in [
        json!("a: [1 TO 5]"),
        json!("(a AND b"),
        json!({"xor": ["a", "b"]}),
        json!("a..b"),
    ] {
        let yaml = serde_yaml::to_string(&json!({"filter": filter, "delete": true})).unwrap();
        let error =
            rules_from_yaml_str(ProcessorKind::Delete, &yaml, "inline", &GrokLibrary::default())
                .unwrap_err();
        assert!(error.is_definition_error(), "{filter}: {error}");
    }
}

#[test]
fn test_action_key_of_other_processor_is_rejected() {
    let error = rules_from_yaml_str(
        ProcessorKind::Delete,
        "filter: '*'\nkey_checker:\n  key_list: [a]\n  output_field: out\n",
        "inline",
        &GrokLibrary::default(),
    )
    .unwrap_err();

    assert!(error.is_definition_error());
}

#[test]
fn test_unknown_grok_pattern_is_definition_error() {
    let error = rules_from_yaml_str(
        ProcessorKind::Normalize,
        "filter: message\nnormalize:\n  message:\n    grok: '%{NOT_A_PATTERN:x}'\n",
        "inline",
        &GrokLibrary::default(),
    )
    .unwrap_err();

    assert!(error.is_definition_error());
}

#[test]
fn test_split_normalize_form() {
    let rules = rules_from_yaml_str(
        ProcessorKind::Normalize,
        r#"
filter: message
grok:
  message: "%{WORD:first}"
substitutions:
  first: copy
"#,
        "inline",
        &GrokLibrary::default(),
    )
    .unwrap();

    assert_eq!(rules.len(), 1);
    match rules[0].action() {
        ActionPayload::Normalize(action) => {
            assert_eq!(action.grok.len(), 1);
            assert_eq!(action.substitutions.len(), 1);
        }
        other => panic!("unexpected action: {other:?}"),
    }
}

#[test]
fn test_configuration_file() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "engine.yml",
        "index:\n  strategy: tree\nregex_mapping:\n  RE_ALL: '^(.*)$'\n",
    );

    let config = EngineConfig::from_file(&path).unwrap();
    assert!(config.regex_mapping.contains_key("RE_ALL"));
    assert!(RuleProcessor::new("cfg", ProcessorKind::Normalize, config).is_ok());
}
