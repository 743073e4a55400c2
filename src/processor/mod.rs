//! Rule-based processors.
//!
//! A [`RuleProcessor`] owns the published rule set of one processor kind and
//! applies it to documents: generic rules first, then specific rules, each
//! partition's matches in declaration order. Rule actions dispatch on
//! [`ActionPayload`], one handler per processor kind.
//!
//! ```rust
//! use logrule_engine::{EngineConfig, ProcessorKind, RuleProcessor};
//! use logrule_engine::rule::rules_from_json_str;
//! use serde_json::json;
//!
//! let processor = RuleProcessor::new("winlog", ProcessorKind::Normalize, EngineConfig::default())?;
//! let rules = rules_from_json_str(
//!     ProcessorKind::Normalize,
//!     r#"[{"filter": "winlog.event_id: 4624",
//!          "normalize": {"winlog.event_data.TargetUserName": "user.name"}}]"#,
//!     "inline",
//!     processor.grok_library(),
//! )?;
//! processor.reload(Vec::new(), rules)?;
//!
//! let mut doc = json!({"winlog": {"event_id": 4624, "event_data": {"TargetUserName": "alice"}}})
//!     .as_object()
//!     .cloned()
//!     .unwrap();
//! let outcome = processor.process(&mut doc)?;
//!
//! assert_eq!(doc["user"]["name"], json!("alice"));
//! assert!(outcome.warning.is_none());
//! # Ok::<(), logrule_engine::EngineError>(())
//! ```

pub mod deleter;
pub mod key_checker;

pub use deleter::apply_delete;
pub use key_checker::apply_key_check;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::field::Document;
use crate::index::{CompiledRuleSet, IndexStatistics, RuleId, SharedRuleSet};
use crate::normalizer::{
    apply_normalize, ConflictSet, DuplicationWarning, GrokLibrary, NormalizeContext, RegexMapping,
};
use crate::rule::{rules_from_file, ActionPayload, ProcessorKind, Rule, RulePartition};
use chrono::Datelike;
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A rule that matched during one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedRule {
    pub partition: RulePartition,
    /// Position of the rule in its partition
    pub index: RuleId,
}

/// A rule whose action failed without aborting the pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFailure {
    pub partition: RulePartition,
    pub index: RuleId,
    pub error: EngineError,
}

/// Result of processing one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutcome {
    pub matched_rules: Vec<MatchedRule>,
    /// The document was cleared by a delete rule.
    pub deleted: bool,
    /// Fields that were not overwritten because they already held a value.
    pub warning: Option<DuplicationWarning>,
    pub rule_errors: Vec<RuleFailure>,
    /// Generation of the rule set the document was processed with.
    pub generation: u64,
}

enum RuleEffect {
    Applied,
    Deleted,
}

/// Processor applying the rules of one [`ProcessorKind`].
///
/// `process` takes `&self` and may be called from many threads at once; a
/// concurrent [`reload`](RuleProcessor::reload) never affects a document
/// already being processed.
#[derive(Debug)]
pub struct RuleProcessor {
    name: String,
    kind: ProcessorKind,
    config: EngineConfig,
    rules: Arc<SharedRuleSet>,
    regex_mapping: RegexMapping,
    grok: GrokLibrary,
    events_processed: AtomicU64,
}

impl RuleProcessor {
    /// Create a processor with an empty rule set.
    pub fn new(name: impl Into<String>, kind: ProcessorKind, config: EngineConfig) -> Result<Self> {
        Self::with_shared_rules(name, kind, config, Arc::new(SharedRuleSet::new()))
    }

    /// Create a processor reading rules from an existing slot, so several
    /// processors observe the same publications.
    pub fn with_shared_rules(
        name: impl Into<String>,
        kind: ProcessorKind,
        config: EngineConfig,
        rules: Arc<SharedRuleSet>,
    ) -> Result<Self> {
        config.validate()?;
        let regex_mapping = config.regex_mapping()?;
        let grok = config.grok_library();

        Ok(Self {
            name: name.into(),
            kind,
            config,
            rules,
            regex_mapping,
            grok,
            events_processed: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProcessorKind {
        self.kind
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shared_rules(&self) -> &Arc<SharedRuleSet> {
        &self.rules
    }

    /// Grok library rule descriptions for this processor are compiled with.
    pub fn grok_library(&self) -> &GrokLibrary {
        &self.grok
    }

    pub fn describe(&self) -> String {
        format!("{} ({})", self.kind.processor_name(), self.name)
    }

    /// Build indexes for new rule partitions and publish them.
    ///
    /// Fails without publishing if a rule belongs to another processor kind.
    /// Returns the generation of the published set.
    pub fn reload(&self, generic: Vec<Rule>, specific: Vec<Rule>) -> Result<u64> {
        let generic = self.prepare(generic)?;
        let specific = self.prepare(specific)?;
        let (generic_count, specific_count) = (generic.len(), specific.len());

        let set = CompiledRuleSet::build(generic, specific, &self.config.index);
        let generation = self.rules.publish(set);

        debug!(
            processor = %self.describe(),
            generic = generic_count,
            specific = specific_count,
            generation,
            "published rule set"
        );
        Ok(generation)
    }

    /// Read rule files for both partitions and publish them.
    pub fn load_rule_files<G, S>(&self, generic: &[G], specific: &[S]) -> Result<u64>
    where
        G: AsRef<Path>,
        S: AsRef<Path>,
    {
        let mut generic_rules = Vec::new();
        for path in generic {
            generic_rules.extend(rules_from_file(self.kind, path, &self.grok)?);
        }
        let mut specific_rules = Vec::new();
        for path in specific {
            specific_rules.extend(rules_from_file(self.kind, path, &self.grok)?);
        }

        debug!(
            processor = %self.describe(),
            generic = generic_rules.len(),
            specific = specific_rules.len(),
            "loaded rule files"
        );
        self.reload(generic_rules, specific_rules)
    }

    fn prepare(&self, rules: Vec<Rule>) -> Result<Vec<Arc<Rule>>> {
        rules
            .into_iter()
            .enumerate()
            .map(|(index, rule)| {
                if rule.kind() != self.kind {
                    return Err(EngineError::rule_definition(
                        self.kind,
                        rule.kind().action_key(),
                        "action belongs to another processor",
                    )
                    .in_origin(self.describe(), index));
                }
                Ok(Arc::new(rule))
            })
            .collect()
    }

    /// Apply the matching rules to `doc`.
    ///
    /// Write conflicts are collected into the outcome's warning and failures
    /// of single rules into `rule_errors`. A fatal error (unparseable
    /// timestamp) stops the pass and is returned; changes made before it
    /// remain in the document.
    pub fn process(&self, doc: &mut Document) -> Result<ProcessOutcome> {
        let snapshot = self.rules.snapshot();
        self.events_processed.fetch_add(1, Ordering::Relaxed);

        let processor = self.describe();
        let ctx = NormalizeContext {
            processor: &processor,
            regex_mapping: &self.regex_mapping,
            current_year: chrono::Local::now().year(),
        };
        let mut conflicts = ConflictSet::new();
        let mut outcome = ProcessOutcome {
            generation: snapshot.generation(),
            ..Default::default()
        };

        'partitions: for partition in RulePartition::ALL {
            let index = snapshot.partition(partition);
            for id in index.matching_ids(doc) {
                let rule = &index.rules()[id as usize];
                debug!(processor = %processor, %partition, rule = id, "rule matched");
                outcome.matched_rules.push(MatchedRule {
                    partition,
                    index: id,
                });

                match self.apply_rule(doc, rule, &ctx, &mut conflicts) {
                    Ok(RuleEffect::Applied) => {}
                    Ok(RuleEffect::Deleted) => {
                        outcome.deleted = true;
                        break 'partitions;
                    }
                    Err(error) if error.is_fatal() => {
                        let unwritten: Vec<String> =
                            conflicts.iter().map(str::to_string).collect();
                        if !unwritten.is_empty() {
                            warn!(
                                processor = %processor,
                                fields = ?unwritten,
                                "pass aborted after write conflicts"
                            );
                        }
                        return Err(error.with_conflicts(unwritten));
                    }
                    Err(error) => {
                        warn!(processor = %processor, %partition, rule = id, %error, "rule failed");
                        outcome.rule_errors.push(RuleFailure {
                            partition,
                            index: id,
                            error,
                        });
                    }
                }
            }
        }

        outcome.warning = conflicts.into_warning(processor);
        if let Some(warning) = &outcome.warning {
            debug!(%warning, "fields not overwritten");
        }
        Ok(outcome)
    }

    /// Apply the rules and return only the duplication warning.
    pub fn apply(&self, doc: &mut Document) -> Result<Option<DuplicationWarning>> {
        self.process(doc).map(|outcome| outcome.warning)
    }

    /// Process every document of a batch, each with its own conflict set.
    ///
    /// Uses the rayon pool when event parallelism is enabled and the batch
    /// is large enough.
    pub fn process_batch(&self, docs: &mut [Document]) -> Vec<Result<ProcessOutcome>> {
        let parallel = &self.config.parallel;
        if parallel.enable_event_parallelism && docs.len() >= parallel.min_batch_size_for_parallelism
        {
            docs.par_iter_mut().map(|doc| self.process(doc)).collect()
        } else {
            docs.iter_mut().map(|doc| self.process(doc)).collect()
        }
    }

    fn apply_rule(
        &self,
        doc: &mut Document,
        rule: &Rule,
        ctx: &NormalizeContext<'_>,
        conflicts: &mut ConflictSet,
    ) -> Result<RuleEffect> {
        match rule.action() {
            ActionPayload::Normalize(action) => {
                apply_normalize(doc, action, ctx, conflicts)?;
                Ok(RuleEffect::Applied)
            }
            ActionPayload::KeyCheck(action) => {
                apply_key_check(doc, action)?;
                Ok(RuleEffect::Applied)
            }
            ActionPayload::Delete(action) => {
                if apply_delete(doc, action) {
                    Ok(RuleEffect::Deleted)
                } else {
                    Ok(RuleEffect::Applied)
                }
            }
        }
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.snapshot().rule_count()
    }

    pub fn generation(&self) -> u64 {
        self.rules.generation()
    }

    /// Statistics of the generic and specific indexes.
    pub fn index_statistics(&self) -> (IndexStatistics, IndexStatistics) {
        let snapshot = self.rules.snapshot();
        (
            snapshot.generic().statistics(),
            snapshot.specific().statistics(),
        )
    }
}
