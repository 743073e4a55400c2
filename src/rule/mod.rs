//! Rules: a filter paired with the action of one processor kind.

pub mod actions;
pub mod loader;

pub use actions::{
    DeleteAction, KeyCheckerAction, NormalizeAction, RegexTransform, TargetSpec, TimestampSpec,
};
pub use loader::{
    parse_rule, rules_from_file, rules_from_json_str, rules_from_value, rules_from_yaml_str,
};

use crate::field::Document;
use crate::filter::FilterExpression;
use std::fmt;

/// Processor kinds that consume rules. Each owns exactly one action key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorKind {
    Normalize,
    KeyChecker,
    Delete,
}

impl ProcessorKind {
    /// Key of the action in a rule description.
    pub fn action_key(self) -> &'static str {
        match self {
            ProcessorKind::Normalize => "normalize",
            ProcessorKind::KeyChecker => "key_checker",
            ProcessorKind::Delete => "delete",
        }
    }

    /// Name used when the processor describes itself.
    pub fn processor_name(self) -> &'static str {
        match self {
            ProcessorKind::Normalize => "Normalizer",
            ProcessorKind::KeyChecker => "KeyChecker",
            ProcessorKind::Delete => "Deleter",
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action_key())
    }
}

/// The two rule groups of a processor. Generic rules run before specific ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RulePartition {
    Generic,
    Specific,
}

impl RulePartition {
    pub const ALL: [RulePartition; 2] = [RulePartition::Generic, RulePartition::Specific];
}

impl fmt::Display for RulePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulePartition::Generic => f.write_str("generic"),
            RulePartition::Specific => f.write_str("specific"),
        }
    }
}

/// Typed action of a rule, one variant per processor kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    Normalize(NormalizeAction),
    KeyCheck(KeyCheckerAction),
    Delete(DeleteAction),
}

impl ActionPayload {
    pub fn kind(&self) -> ProcessorKind {
        match self {
            ActionPayload::Normalize(_) => ProcessorKind::Normalize,
            ActionPayload::KeyCheck(_) => ProcessorKind::KeyChecker,
            ActionPayload::Delete(_) => ProcessorKind::Delete,
        }
    }
}

/// A filter and the action applied to documents it matches.
///
/// Rules compare by value. Their position in a rule set is tracked by the set.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    filter: FilterExpression,
    action: ActionPayload,
}

impl Rule {
    pub fn new(filter: FilterExpression, action: ActionPayload) -> Self {
        Self { filter, action }
    }

    pub fn filter(&self) -> &FilterExpression {
        &self.filter
    }

    pub fn action(&self) -> &ActionPayload {
        &self.action
    }

    pub fn kind(&self) -> ProcessorKind {
        self.action.kind()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filter.evaluate(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldPath;
    use serde_json::json;

    #[test]
    fn test_processor_kind_names() {
        assert_eq!(ProcessorKind::Normalize.to_string(), "normalize");
        assert_eq!(ProcessorKind::KeyChecker.to_string(), "key_checker");
        assert_eq!(ProcessorKind::Delete.action_key(), "delete");
        assert_eq!(ProcessorKind::Normalize.processor_name(), "Normalizer");
    }

    #[test]
    fn test_rule_equality_is_by_value() {
        let filter = FilterExpression::FieldExists(FieldPath::parse("a").unwrap());
        let first = Rule::new(
            filter.clone(),
            ActionPayload::Delete(DeleteAction { delete: true }),
        );
        let second = Rule::new(
            filter.clone(),
            ActionPayload::Delete(DeleteAction { delete: true }),
        );
        let different = Rule::new(filter, ActionPayload::Delete(DeleteAction { delete: false }));

        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.kind(), ProcessorKind::Delete);
    }

    #[test]
    fn test_rule_matches_uses_filter() {
        let rule = Rule::new(
            FilterExpression::equals(FieldPath::parse("event.code").unwrap(), 4624),
            ActionPayload::Delete(DeleteAction { delete: true }),
        );
        let hit = json!({"event": {"code": "4624"}});
        let miss = json!({"event": {"code": 4625}});

        assert!(rule.matches(hit.as_object().unwrap()));
        assert!(!rule.matches(miss.as_object().unwrap()));
    }

    #[test]
    fn test_partition_order() {
        assert_eq!(
            RulePartition::ALL,
            [RulePartition::Generic, RulePartition::Specific]
        );
        assert_eq!(RulePartition::Specific.to_string(), "specific");
    }
}
