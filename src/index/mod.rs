//! Rule index: answers which rules of a partition match a document.
//!
//! Two structures produce identical results:
//!
//! - **Flat**: every rule's filter is evaluated in declaration order.
//! - **Tree**: filters are expanded into clauses of shared leaf conditions and
//!   merged into a discrimination tree. Equality tests are dispatched through
//!   hash tables and every other leaf is evaluated at most once per document.
//!
//! ```rust
//! use logrule_engine::index::RuleIndex;
//! use logrule_engine::rule::{ActionPayload, DeleteAction, Rule};
//! use logrule_engine::filter::parse_filter;
//! use logrule_engine::config::IndexConfig;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let rules = ["event.code: 4624", "*"]
//!     .iter()
//!     .map(|filter| {
//!         let action = ActionPayload::Delete(DeleteAction { delete: true });
//!         Ok(Arc::new(Rule::new(parse_filter(filter)?, action)))
//!     })
//!     .collect::<logrule_engine::Result<Vec<_>>>()?;
//!
//! let index = RuleIndex::build(rules, &IndexConfig::default());
//! let doc = json!({"event": {"code": 4624}});
//! assert_eq!(index.matching_ids(doc.as_object().unwrap()), vec![0, 1]);
//! # Ok::<(), logrule_engine::EngineError>(())
//! ```

pub mod builder;
pub mod shared;
pub mod tree;
pub mod types;

pub use builder::TreeBuilder;
pub use shared::{CompiledRuleSet, SharedRuleSet};
pub use tree::DiscriminationTree;
pub use types::{IndexStatistics, Literal, NodeId, Primitive, PrimitiveId, RuleId, TreeNode};

use crate::config::{IndexConfig, IndexStrategy};
use crate::field::Document;
use crate::rule::Rule;
use std::sync::Arc;
use tracing::debug;

/// Determine whether a partition of `rule_count` rules gets a tree.
///
/// Below the threshold the per-document bookkeeping of the tree costs more
/// than evaluating the filters directly.
pub fn should_use_tree(rule_count: usize, threshold: usize) -> bool {
    match rule_count {
        0 => false,
        n => n >= threshold,
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Flat,
    Tree(DiscriminationTree),
}

/// Ordered rules of one partition plus the structure matching them.
#[derive(Debug, Clone)]
pub struct RuleIndex {
    rules: Vec<Arc<Rule>>,
    matcher: Matcher,
}

impl RuleIndex {
    /// Build the index selected by `config`. Never fails; an empty rule list
    /// yields an index that matches nothing.
    pub fn build(rules: Vec<Arc<Rule>>, config: &IndexConfig) -> Self {
        let use_tree = match config.strategy {
            IndexStrategy::Flat => false,
            IndexStrategy::Tree => true,
            IndexStrategy::Auto => should_use_tree(rules.len(), config.tree_threshold),
        };

        let index = if use_tree {
            Self::tree(rules, config.max_dnf_clauses)
        } else {
            Self::flat(rules)
        };

        let stats = index.statistics();
        debug!(
            strategy = ?stats.strategy,
            rules = stats.rule_count,
            nodes = stats.node_count,
            shared = stats.shared_primitives,
            opaque = stats.opaque_rules,
            "built rule index"
        );
        index
    }

    /// Linear scan over the rules.
    pub fn flat(rules: Vec<Arc<Rule>>) -> Self {
        Self {
            rules,
            matcher: Matcher::Flat,
        }
    }

    /// Discrimination tree over the rules.
    pub fn tree(rules: Vec<Arc<Rule>>, max_dnf_clauses: usize) -> Self {
        let mut builder = TreeBuilder::new(max_dnf_clauses);
        for (id, rule) in rules.iter().enumerate() {
            builder.add_rule(id as RuleId, rule.filter());
        }
        Self {
            matcher: Matcher::Tree(builder.build()),
            rules,
        }
    }

    /// Positions of the matching rules, in declaration order.
    pub fn matching_ids(&self, doc: &Document) -> Vec<RuleId> {
        match &self.matcher {
            Matcher::Flat => self
                .rules
                .iter()
                .enumerate()
                .filter(|(_, rule)| rule.matches(doc))
                .map(|(id, _)| id as RuleId)
                .collect(),
            Matcher::Tree(tree) => tree.matching_ids(doc),
        }
    }

    /// Matching rules, in declaration order.
    pub fn matching(&self, doc: &Document) -> Vec<&Arc<Rule>> {
        self.matching_ids(doc)
            .into_iter()
            .map(|id| &self.rules[id as usize])
            .collect()
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Structure in use, `Flat` or `Tree`.
    pub fn strategy(&self) -> IndexStrategy {
        match self.matcher {
            Matcher::Flat => IndexStrategy::Flat,
            Matcher::Tree(_) => IndexStrategy::Tree,
        }
    }

    pub fn statistics(&self) -> IndexStatistics {
        match &self.matcher {
            Matcher::Flat => IndexStatistics::flat(self.rules.len()),
            Matcher::Tree(tree) => tree.statistics().clone(),
        }
    }
}
