//! Normalizing Windows logon events.
//!
//! Loads generic and specific normalizer rules, a key checker and a deleter,
//! then runs a few events through them. Set `RUST_LOG=debug` to see which
//! rules matched.

use logrule_engine::rule::{rules_from_json_str, rules_from_yaml_str};
use logrule_engine::{Document, EngineConfig, ProcessorKind, RuleProcessor};
use serde_json::json;

const GENERIC_RULES: &str = r#"
filter: "*"
normalize:
  host.name: observer.hostname
"#;

const SPECIFIC_RULES: &str = r#"
filter: "winlog.event_id: 4624 OR winlog.event_id: 4625"
normalize:
  winlog.event_data.IpAddress: source.ip
  winlog.event_data.TargetUserName:
    - user.name
    - RE_DOMAIN_BACKSLASH_USERNAME
    - '\1'
  winlog.event_data.SystemTime:
    timestamp:
      destination: "@timestamp"
      source_formats: ["%Y %m %d - %H:%M:%S", ISO8601]
      source_timezone: Europe/Berlin
      destination_timezone: UTC
---
filter: "message"
normalize:
  message:
    grok: "%{WORD:event.action} from %{IP:source.ip} port %{INT:source.port:int}"
"#;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Event Normalization Examples");
    println!("============================\n");

    let config = EngineConfig::new().with_regex("RE_DOMAIN_BACKSLASH_USERNAME", r"^[^\\]+\\(.+)$");

    let normalizer = RuleProcessor::new("windows", ProcessorKind::Normalize, config.clone())?;
    let generic = rules_from_yaml_str(
        ProcessorKind::Normalize,
        GENERIC_RULES,
        "generic.yml",
        normalizer.grok_library(),
    )?;
    let specific = rules_from_yaml_str(
        ProcessorKind::Normalize,
        SPECIFIC_RULES,
        "specific.yml",
        normalizer.grok_library(),
    )?;
    normalizer.reload(generic, specific)?;

    let key_checker = RuleProcessor::new("required", ProcessorKind::KeyChecker, config.clone())?;
    key_checker.reload(
        Vec::new(),
        rules_from_json_str(
            ProcessorKind::KeyChecker,
            r#"{"filter": "*", "key_checker": {"key_list": ["@timestamp", "user.name"], "output_field": "missing_fields"}}"#,
            "key_checker.json",
            key_checker.grok_library(),
        )?,
    )?;

    let deleter = RuleProcessor::new("noise", ProcessorKind::Delete, config)?;
    deleter.reload(
        Vec::new(),
        rules_from_json_str(
            ProcessorKind::Delete,
            r#"{"filter": "winlog.event_id: 4634", "delete": true}"#,
            "deleter.json",
            deleter.grok_library(),
        )?,
    )?;

    let events = vec![
        json!({
            "host": {"name": "dc01"},
            "winlog": {"event_id": 4624, "event_data": {
                "IpAddress": "10.0.0.5",
                "TargetUserName": "CORP\\alice",
                "SystemTime": "2021 06 01 - 12:00:00"
            }}
        }),
        json!({
            "host": {"name": "dc01"},
            "observer": {"hostname": "relay"},
            "message": "Accepted from 192.168.1.20 port 2222"
        }),
        json!({"host": {"name": "dc02"}, "winlog": {"event_id": 4634}}),
    ];

    for (n, event) in events.into_iter().enumerate() {
        let mut doc: Document = serde_json::from_value(event)?;
        println!("=== Event {n} ===");

        let removed = deleter.process(&mut doc)?;
        if removed.deleted {
            println!("dropped by {}\n", deleter.describe());
            continue;
        }

        if let Some(warning) = normalizer.apply(&mut doc)? {
            println!("warning: {warning}");
        }
        key_checker.apply(&mut doc)?;

        println!("{}\n", serde_json::to_string_pretty(&doc)?);
    }

    let (generic, specific) = normalizer.index_statistics();
    tracing::info!(
        generic_rules = generic.rule_count,
        specific_rules = specific.rule_count,
        events = normalizer.events_processed(),
        "done"
    );
    Ok(())
}
