//! # logrule-engine
//!
//! A rule-driven matching and field-normalization engine for structured log
//! events. Documents (nested JSON objects) are matched against declarative
//! filter rules and mutated in place: fields are extracted with grok
//! patterns, copied, rewritten through named regexes, timestamps are
//! reparsed and converted between timezones, missing keys are reported, or
//! the document is dropped.
//!
//! ## Quick Start
//!
//! ### Normalizing events
//!
//! ```rust
//! use logrule_engine::{EngineConfig, ProcessorKind, RuleProcessor};
//! use logrule_engine::rule::rules_from_yaml_str;
//! use serde_json::json;
//!
//! let processor = RuleProcessor::new("windows", ProcessorKind::Normalize, EngineConfig::default())?;
//!
//! let rules = rules_from_yaml_str(
//!     ProcessorKind::Normalize,
//!     r#"
//! filter: "winlog.event_id: 4624"
//! normalize:
//!   winlog.event_data.IpAddress: client.ip
//!   winlog.event_data.SystemTime:
//!     timestamp:
//!       destination: "@timestamp"
//!       source_formats: [ISO8601]
//!       source_timezone: UTC
//!       destination_timezone: UTC
//! "#,
//!     "windows.yml",
//!     processor.grok_library(),
//! )?;
//! processor.reload(Vec::new(), rules)?;
//!
//! let mut event = json!({
//!     "winlog": {
//!         "event_id": 4624,
//!         "event_data": {"IpAddress": "10.0.0.1", "SystemTime": "2021-06-01T10:00:00"}
//!     }
//! })
//! .as_object()
//! .cloned()
//! .unwrap();
//!
//! let warning = processor.apply(&mut event)?;
//! assert!(warning.is_none());
//! assert_eq!(event["client"]["ip"], json!("10.0.0.1"));
//! assert_eq!(event["@timestamp"], json!("2021-06-01T10:00:00Z"));
//! # Ok::<(), logrule_engine::EngineError>(())
//! ```
//!
//! ### Matching only
//!
//! ```rust
//! use logrule_engine::filter::parse_filter;
//! use serde_json::json;
//!
//! let filter = parse_filter("process.name: *.exe AND NOT user.name: SYSTEM")?;
//! let event = json!({"process": {"name": "cmd.exe"}, "user": {"name": "alice"}});
//! assert!(filter.evaluate(event.as_object().unwrap()));
//! # Ok::<(), logrule_engine::EngineError>(())
//! ```
//!
//! ## Write conflicts
//!
//! Normalization never overwrites a field holding a different value: the
//! first writer wins and the refused fields are reported once per document
//! as a [`DuplicationWarning`]. Writes that did not conflict are kept.

pub mod config;
pub mod error;
pub mod field;
pub mod filter;
pub mod index;
pub mod normalizer;
pub mod processor;
pub mod rule;

// Processors and configuration
pub use config::{EngineConfig, IndexConfig, IndexStrategy, ParallelConfig};
pub use processor::{MatchedRule, ProcessOutcome, RuleFailure, RuleProcessor};

// Core types and errors
pub use error::{EngineError, Result};
pub use field::{Document, FieldPath};
pub use filter::{FilterExpression, WildcardPattern};
pub use rule::{ActionPayload, ProcessorKind, Rule, RulePartition};

// Matching and normalization building blocks
pub use index::{CompiledRuleSet, IndexStatistics, RuleIndex, SharedRuleSet};
pub use normalizer::{ConflictSet, DuplicationWarning, GrokLibrary, RegexMapping};
