//! Published rule sets shared between processors.
//!
//! A reload builds a complete [`CompiledRuleSet`] off to the side and swaps it
//! in under a short write lock. Readers take an `Arc` snapshot and keep using
//! it for the whole document, so they never see a half-built set.

use super::RuleIndex;
use crate::config::IndexConfig;
use crate::rule::{Rule, RulePartition};
use parking_lot::RwLock;
use std::sync::Arc;

/// Indexes of both partitions, immutable once published.
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    generic: RuleIndex,
    specific: RuleIndex,
    generation: u64,
}

impl CompiledRuleSet {
    pub fn empty() -> Self {
        Self {
            generic: RuleIndex::flat(Vec::new()),
            specific: RuleIndex::flat(Vec::new()),
            generation: 0,
        }
    }

    pub fn build(generic: Vec<Arc<Rule>>, specific: Vec<Arc<Rule>>, config: &IndexConfig) -> Self {
        Self {
            generic: RuleIndex::build(generic, config),
            specific: RuleIndex::build(specific, config),
            generation: 0,
        }
    }

    pub fn partition(&self, partition: RulePartition) -> &RuleIndex {
        match partition {
            RulePartition::Generic => &self.generic,
            RulePartition::Specific => &self.specific,
        }
    }

    pub fn generic(&self) -> &RuleIndex {
        &self.generic
    }

    pub fn specific(&self) -> &RuleIndex {
        &self.specific
    }

    /// Number of publications before this set, 0 for a set never published.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rule_count(&self) -> usize {
        self.generic.len() + self.specific.len()
    }
}

impl Default for CompiledRuleSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Slot holding the currently published rule set.
#[derive(Debug, Default)]
pub struct SharedRuleSet {
    current: RwLock<Arc<CompiledRuleSet>>,
}

impl SharedRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rule set. Later publications do not affect the snapshot.
    pub fn snapshot(&self) -> Arc<CompiledRuleSet> {
        Arc::clone(&self.current.read())
    }

    /// Replace the current set and return its generation.
    pub fn publish(&self, mut set: CompiledRuleSet) -> u64 {
        let mut current = self.current.write();
        set.generation = current.generation + 1;
        let generation = set.generation;
        *current = Arc::new(set);
        generation
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterExpression;
    use crate::rule::{ActionPayload, DeleteAction};

    fn rule() -> Arc<Rule> {
        Arc::new(Rule::new(
            FilterExpression::MatchAll,
            ActionPayload::Delete(DeleteAction { delete: true }),
        ))
    }

    #[test]
    fn test_publish_swaps_and_counts_generations() {
        let shared = SharedRuleSet::new();
        assert_eq!(shared.generation(), 0);
        assert_eq!(shared.snapshot().rule_count(), 0);

        let before = shared.snapshot();
        let generation = shared.publish(CompiledRuleSet::build(
            vec![rule()],
            vec![rule(), rule()],
            &IndexConfig::default(),
        ));

        assert_eq!(generation, 1);
        assert_eq!(shared.generation(), 1);
        assert_eq!(before.rule_count(), 0);

        let after = shared.snapshot();
        assert_eq!(after.partition(RulePartition::Generic).len(), 1);
        assert_eq!(after.partition(RulePartition::Specific).len(), 2);
    }

    #[test]
    fn test_snapshot_outlives_publication() {
        let shared = SharedRuleSet::new();
        shared.publish(CompiledRuleSet::build(vec![rule()], Vec::new(), &IndexConfig::default()));
        let snapshot = shared.snapshot();

        shared.publish(CompiledRuleSet::empty());

        assert_eq!(snapshot.generic().len(), 1);
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(shared.generation(), 2);
    }
}
