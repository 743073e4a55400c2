//! Core index types: interned leaf conditions, tree nodes and statistics.

use crate::config::IndexStrategy;
use crate::field::{Document, FieldPath};
use crate::filter::{values_match, FilterExpression, WildcardPattern};
use serde_json::Value;
use std::collections::HashMap;

/// Position of a rule in its partition.
pub type RuleId = u32;

/// Identifier of an interned leaf condition.
pub type PrimitiveId = u32;

/// Unique identifier for tree nodes.
pub type NodeId = u32;

/// Leaf condition shared by every rule that tests it.
#[derive(Debug, Clone)]
pub enum Primitive {
    Exists(FieldPath),
    Equals(FieldPath, Value),
    Wildcard(FieldPath, WildcardPattern),
    /// Whole filter kept intact because its clause expansion exceeds the cap.
    Opaque(FilterExpression),
}

/// Interning key. Opaque primitives are never shared and have no key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum PrimitiveKey {
    Exists(FieldPath),
    Equals(FieldPath, String),
    Wildcard(FieldPath, String),
}

impl Primitive {
    pub(crate) fn key(&self) -> Option<PrimitiveKey> {
        match self {
            Primitive::Exists(path) => Some(PrimitiveKey::Exists(path.clone())),
            Primitive::Equals(path, value) => {
                Some(PrimitiveKey::Equals(path.clone(), value.to_string()))
            }
            Primitive::Wildcard(path, pattern) => Some(PrimitiveKey::Wildcard(
                path.clone(),
                pattern.as_str().to_string(),
            )),
            Primitive::Opaque(_) => None,
        }
    }

    pub fn evaluate(&self, doc: &Document) -> bool {
        match self {
            Primitive::Exists(path) => path.exists(doc),
            Primitive::Equals(path, expected) => path
                .get(doc)
                .map(|actual| values_match(actual, expected))
                .unwrap_or(false),
            Primitive::Wildcard(path, pattern) => path
                .get(doc)
                .map(|actual| pattern.matches_value(actual))
                .unwrap_or(false),
            Primitive::Opaque(filter) => filter.evaluate(doc),
        }
    }

    /// Placement preference inside a clause. Lower ranks sit closer to the
    /// root, so equality tests get dispatched and shared first.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Primitive::Equals(..) => 0,
            Primitive::Exists(_) => 1,
            Primitive::Wildcard(..) => 2,
            Primitive::Opaque(_) => 3,
        }
    }
}

/// A primitive or its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    pub primitive: PrimitiveId,
    pub negated: bool,
}

impl Literal {
    pub fn new(primitive: PrimitiveId, negated: bool) -> Self {
        Self {
            primitive,
            negated,
        }
    }

    pub fn complement(self) -> Self {
        Self {
            primitive: self.primitive,
            negated: !self.negated,
        }
    }
}

/// A node of the discrimination tree.
///
/// Every literal on the way from the root to a node holds for a document
/// that reaches it, and the rules stored at the node match that document.
#[derive(Debug, Clone, Default)]
pub struct TreeNode {
    /// Literal tested on entry. `None` for the root.
    pub literal: Option<Literal>,
    /// Children whose literal is evaluated per document
    pub children: Vec<NodeId>,
    /// Children testing `path == value`, keyed by the textual form of the value
    pub equality: HashMap<FieldPath, HashMap<String, Vec<NodeId>>>,
    pub rules: Vec<RuleId>,
}

impl TreeNode {
    pub fn new(literal: Option<Literal>) -> Self {
        Self {
            literal,
            ..Default::default()
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && self.equality.is_empty()
    }
}

/// Statistics about a built index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatistics {
    /// Structure actually built, never `Auto`.
    pub strategy: IndexStrategy,
    pub rule_count: usize,
    pub node_count: usize,
    pub primitive_count: usize,
    /// Primitives referenced by more than one rule
    pub shared_primitives: usize,
    /// Rules indexed as a single opaque condition
    pub opaque_rules: usize,
    /// Rules whose filter can never match
    pub unsatisfiable_rules: usize,
    pub equality_tables: usize,
}

impl IndexStatistics {
    pub(crate) fn flat(rule_count: usize) -> Self {
        Self {
            strategy: IndexStrategy::Flat,
            rule_count,
            node_count: 0,
            primitive_count: 0,
            shared_primitives: 0,
            opaque_rules: 0,
            unsatisfiable_rules: 0,
            equality_tables: 0,
        }
    }
}
