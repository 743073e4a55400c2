//! Builder turning rule filters into a discrimination tree.
//!
//! Each filter is expanded into disjunctive normal form: a list of clauses,
//! each a conjunction of literals over interned primitives. Every clause is
//! inserted as a path from the root, so rules whose clauses start with the
//! same literals share the nodes (and the evaluation) for that prefix.

use super::tree::DiscriminationTree;
use super::types::{Literal, NodeId, Primitive, PrimitiveId, PrimitiveKey, RuleId, TreeNode};
use crate::filter::{scalar_key, FilterExpression};
use std::collections::{HashMap, HashSet};

type Clause = Vec<Literal>;

/// Builder for a [`DiscriminationTree`].
pub struct TreeBuilder {
    nodes: Vec<TreeNode>,
    primitives: Vec<Primitive>,
    /// Mapping from primitive keys to their interned ids
    primitive_ids: HashMap<PrimitiveKey, PrimitiveId>,
    /// Child lookup used while inserting clauses
    edges: HashMap<(NodeId, Literal), NodeId>,
    /// Rules referencing each primitive
    primitive_rules: Vec<HashSet<RuleId>>,
    max_clauses: usize,
    opaque_rules: usize,
    unsatisfiable_rules: usize,
    rule_count: usize,
}

impl TreeBuilder {
    /// Create a builder that expands a filter into at most `max_clauses` clauses.
    pub fn new(max_clauses: usize) -> Self {
        Self {
            nodes: vec![TreeNode::new(None)],
            primitives: Vec::new(),
            primitive_ids: HashMap::new(),
            edges: HashMap::new(),
            primitive_rules: Vec::new(),
            max_clauses: max_clauses.max(1),
            opaque_rules: 0,
            unsatisfiable_rules: 0,
            rule_count: 0,
        }
    }

    /// Add the filter of the rule at position `rule_id`.
    pub fn add_rule(&mut self, rule_id: RuleId, filter: &FilterExpression) {
        self.rule_count += 1;

        let clauses = match self.expand(filter, false) {
            Some(clauses) => clauses,
            None => {
                self.opaque_rules += 1;
                let primitive = self.opaque_primitive(filter.clone());
                vec![vec![Literal::new(primitive, false)]]
            }
        };

        let clauses = self.normalize(clauses);
        if clauses.is_empty() {
            self.unsatisfiable_rules += 1;
            return;
        }

        for clause in clauses {
            for literal in &clause {
                self.primitive_rules[literal.primitive as usize].insert(rule_id);
            }
            let node = self.insert_clause(&clause);
            self.nodes[node as usize].rules.push(rule_id);
        }
    }

    /// Finalize the tree, moving equality children into dispatch tables.
    pub fn build(mut self) -> DiscriminationTree {
        for node_index in 0..self.nodes.len() {
            let children = std::mem::take(&mut self.nodes[node_index].children);
            let mut generic = Vec::with_capacity(children.len());

            for child in children {
                match self.dispatch_key(child) {
                    Some((path, key)) => self.nodes[node_index]
                        .equality
                        .entry(path)
                        .or_default()
                        .entry(key)
                        .or_default()
                        .push(child),
                    None => generic.push(child),
                }
            }

            let node = &mut self.nodes[node_index];
            node.children = generic;
            node.rules.sort_unstable();
            node.rules.dedup();
        }

        let shared_primitives = self
            .primitive_rules
            .iter()
            .filter(|rules| rules.len() > 1)
            .count();

        DiscriminationTree::new(
            self.nodes,
            self.primitives,
            self.rule_count,
            shared_primitives,
            self.opaque_rules,
            self.unsatisfiable_rules,
        )
    }

    /// Expand into DNF, pushing negations down to the leaves.
    ///
    /// Returns `None` when the expansion exceeds the clause cap. An empty
    /// result means the filter is unsatisfiable; a clause without literals
    /// is always true.
    fn expand(&mut self, expr: &FilterExpression, negated: bool) -> Option<Vec<Clause>> {
        match expr {
            FilterExpression::MatchAll => {
                if negated {
                    Some(Vec::new())
                } else {
                    Some(vec![Vec::new()])
                }
            }
            FilterExpression::FieldExists(path) => {
                Some(self.leaf(Primitive::Exists(path.clone()), negated))
            }
            FilterExpression::FieldEquals(path, value) => {
                Some(self.leaf(Primitive::Equals(path.clone(), value.clone()), negated))
            }
            FilterExpression::FieldWildcard(path, pattern) => {
                if pattern.is_universal() {
                    // `field: *` holds exactly when the field exists
                    Some(self.leaf(Primitive::Exists(path.clone()), negated))
                } else {
                    Some(self.leaf(Primitive::Wildcard(path.clone(), pattern.clone()), negated))
                }
            }
            FilterExpression::Not(child) => self.expand(child, !negated),
            FilterExpression::And(children) if !negated => self.conjunction(children, false),
            FilterExpression::Or(children) if negated => self.conjunction(children, true),
            FilterExpression::And(children) | FilterExpression::Or(children) => {
                let mut clauses = Vec::new();
                for child in children {
                    clauses.extend(self.expand(child, negated)?);
                    if clauses.len() > self.max_clauses {
                        return None;
                    }
                }
                Some(clauses)
            }
        }
    }

    fn conjunction(&mut self, children: &[FilterExpression], negated: bool) -> Option<Vec<Clause>> {
        let mut clauses: Vec<Clause> = vec![Vec::new()];
        for child in children {
            let child_clauses = self.expand(child, negated)?;
            if clauses.len().saturating_mul(child_clauses.len()) > self.max_clauses {
                return None;
            }
            let mut product = Vec::with_capacity(clauses.len() * child_clauses.len());
            for left in &clauses {
                for right in &child_clauses {
                    let mut clause = left.clone();
                    clause.extend_from_slice(right);
                    product.push(clause);
                }
            }
            clauses = product;
        }
        Some(clauses)
    }

    fn leaf(&mut self, primitive: Primitive, negated: bool) -> Vec<Clause> {
        let id = self.ensure_primitive(primitive);
        vec![vec![Literal::new(id, negated)]]
    }

    /// Get or create the interned id of a primitive.
    fn ensure_primitive(&mut self, primitive: Primitive) -> PrimitiveId {
        let Some(key) = primitive.key() else {
            return self.push_primitive(primitive);
        };
        if let Some(&id) = self.primitive_ids.get(&key) {
            return id;
        }
        let id = self.push_primitive(primitive);
        self.primitive_ids.insert(key, id);
        id
    }

    fn opaque_primitive(&mut self, filter: FilterExpression) -> PrimitiveId {
        self.push_primitive(Primitive::Opaque(filter))
    }

    fn push_primitive(&mut self, primitive: Primitive) -> PrimitiveId {
        let id = self.primitives.len() as PrimitiveId;
        self.primitives.push(primitive);
        self.primitive_rules.push(HashSet::new());
        id
    }

    /// Sort and dedup literals, drop contradictory and repeated clauses.
    fn normalize(&self, clauses: Vec<Clause>) -> Vec<Clause> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(clauses.len());

        for mut clause in clauses {
            clause.sort_unstable_by_key(|literal| {
                (
                    literal.negated,
                    self.primitives[literal.primitive as usize].rank(),
                    literal.primitive,
                )
            });
            clause.dedup();

            let literals: HashSet<Literal> = clause.iter().copied().collect();
            if clause
                .iter()
                .any(|literal| literals.contains(&literal.complement()))
            {
                continue;
            }
            if seen.insert(clause.clone()) {
                normalized.push(clause);
            }
        }

        normalized
    }

    fn insert_clause(&mut self, clause: &[Literal]) -> NodeId {
        let mut current: NodeId = 0;
        for &literal in clause {
            current = match self.edges.get(&(current, literal)) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len() as NodeId;
                    self.nodes.push(TreeNode::new(Some(literal)));
                    self.nodes[current as usize].children.push(child);
                    self.edges.insert((current, literal), child);
                    child
                }
            };
        }
        current
    }

    fn dispatch_key(&self, node: NodeId) -> Option<(crate::field::FieldPath, String)> {
        let literal = self.nodes[node as usize].literal?;
        if literal.negated {
            return None;
        }
        match &self.primitives[literal.primitive as usize] {
            Primitive::Equals(path, value) => {
                scalar_key(value).map(|key| (path.clone(), key.into_owned()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldPath;
    use crate::filter::parse_filter;

    fn build(filters: &[&str], max_clauses: usize) -> DiscriminationTree {
        let mut builder = TreeBuilder::new(max_clauses);
        for (id, filter) in filters.iter().enumerate() {
            builder.add_rule(id as RuleId, &parse_filter(filter).unwrap());
        }
        builder.build()
    }

    #[test]
    fn test_shared_prefix_reuses_nodes() {
        let tree = build(
            &[
                "event.code: 4624 AND user.name: alice",
                "event.code: 4624 AND user.name: bob",
            ],
            64,
        );
        let stats = tree.statistics();

        // root, event.code, two user.name nodes
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.primitive_count, 3);
        assert_eq!(stats.shared_primitives, 1);
        assert_eq!(stats.equality_tables, 2);
    }

    #[test]
    fn test_match_all_is_stored_at_root() {
        let tree = build(&["*"], 64);
        assert_eq!(tree.statistics().node_count, 1);
        assert_eq!(tree.root().rules, vec![0]);
    }

    #[test]
    fn test_contradiction_is_unsatisfiable() {
        let tree = build(&["a AND NOT a", "NOT *"], 64);
        let stats = tree.statistics();
        assert_eq!(stats.unsatisfiable_rules, 2);
        assert!(tree.root().rules.is_empty());
    }

    #[test]
    fn test_negated_or_becomes_conjunction() {
        let mut builder = TreeBuilder::new(64);
        let clauses = builder
            .expand(&parse_filter("NOT (a OR b)").unwrap(), false)
            .unwrap();
        assert_eq!(clauses.len(), 1);
        assert!(clauses[0].iter().all(|literal| literal.negated));
    }

    #[test]
    fn test_clause_cap_falls_back_to_opaque() {
        let filter = "(a OR b) AND (c OR d) AND (e OR f)";
        let tree = build(&[filter], 4);
        let stats = tree.statistics();
        assert_eq!(stats.opaque_rules, 1);
        assert_eq!(stats.node_count, 2);

        let expanded = build(&[filter], 8);
        assert_eq!(expanded.statistics().opaque_rules, 0);
    }

    #[test]
    fn test_universal_wildcard_is_existence() {
        let mut builder = TreeBuilder::new(64);
        builder.add_rule(0, &parse_filter("a: *").unwrap());
        builder.add_rule(1, &parse_filter("a").unwrap());
        let tree = builder.build();
        assert_eq!(tree.statistics().primitive_count, 1);
        assert_eq!(tree.statistics().shared_primitives, 1);
    }

    #[test]
    fn test_equality_children_are_dispatched() {
        let tree = build(&["code: 1", "code: 2", "NOT code: 3"], 64);
        let root = tree.root();
        let table = &root.equality[&FieldPath::parse("code").unwrap()];

        assert_eq!(table.len(), 2);
        assert!(table.contains_key("1"));
        assert_eq!(root.children.len(), 1);
    }
}
