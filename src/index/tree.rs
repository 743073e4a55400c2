//! Discrimination tree evaluation.

use super::types::{IndexStatistics, NodeId, Primitive, PrimitiveId, RuleId, TreeNode};
use crate::config::IndexStrategy;
use crate::field::Document;
use crate::filter::scalar_key;
use serde_json::Value;
use std::borrow::Cow;

/// Tree of shared literal tests built by [`TreeBuilder`](super::TreeBuilder).
///
/// Immutable after construction and safe to share between threads. Per
/// document state lives on the stack of [`DiscriminationTree::matching_ids`].
#[derive(Debug, Clone)]
pub struct DiscriminationTree {
    nodes: Vec<TreeNode>,
    primitives: Vec<Primitive>,
    statistics: IndexStatistics,
}

impl DiscriminationTree {
    pub(crate) fn new(
        nodes: Vec<TreeNode>,
        primitives: Vec<Primitive>,
        rule_count: usize,
        shared_primitives: usize,
        opaque_rules: usize,
        unsatisfiable_rules: usize,
    ) -> Self {
        let equality_tables = nodes.iter().map(|node| node.equality.len()).sum();
        let statistics = IndexStatistics {
            strategy: IndexStrategy::Tree,
            rule_count,
            node_count: nodes.len(),
            primitive_count: primitives.len(),
            shared_primitives,
            opaque_rules,
            unsatisfiable_rules,
            equality_tables,
        };
        Self {
            nodes,
            primitives,
            statistics,
        }
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[0]
    }

    pub fn statistics(&self) -> &IndexStatistics {
        &self.statistics
    }

    /// Ids of the rules matching `doc`, ascending.
    pub fn matching_ids(&self, doc: &Document) -> Vec<RuleId> {
        let mut cache: Vec<Option<bool>> = vec![None; self.primitives.len()];
        let mut matched = Vec::new();
        let mut stack: Vec<NodeId> = vec![0];

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            matched.extend_from_slice(&node.rules);

            for &child in &node.children {
                if self.holds(child, doc, &mut cache) {
                    stack.push(child);
                }
            }

            for (path, table) in &node.equality {
                let Some(value) = path.get(doc) else {
                    continue;
                };
                let mut keys = Vec::new();
                collect_keys(value, &mut keys);
                keys.sort_unstable();
                keys.dedup();
                for key in keys {
                    if let Some(children) = table.get(&*key) {
                        stack.extend_from_slice(children);
                    }
                }
            }
        }

        matched.sort_unstable();
        matched.dedup();
        matched
    }

    fn holds(&self, node: NodeId, doc: &Document, cache: &mut [Option<bool>]) -> bool {
        let Some(literal) = self.nodes[node as usize].literal else {
            return true;
        };
        self.primitive_value(literal.primitive, doc, cache) != literal.negated
    }

    fn primitive_value(
        &self,
        primitive: PrimitiveId,
        doc: &Document,
        cache: &mut [Option<bool>],
    ) -> bool {
        let slot = &mut cache[primitive as usize];
        match *slot {
            Some(value) => value,
            None => {
                let value = self.primitives[primitive as usize].evaluate(doc);
                *slot = Some(value);
                value
            }
        }
    }
}

/// Textual forms under which `value` satisfies a scalar equality test.
fn collect_keys<'a>(value: &'a Value, keys: &mut Vec<Cow<'a, str>>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_keys(item, keys);
            }
        }
        other => keys.extend(scalar_key(other)),
    }
}
