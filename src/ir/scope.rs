//! Placeholder resolution.
//!
//! A placeholder refers to the nearest enclosing producer with its id, provided
//! the placeholder sits inside that producer's scope child (the recursive step
//! of a recursion, the main plan of a materialization or multi-output scan).
//! The table is rebuilt from scratch whenever a pass needs it.

use super::{NodeId, PlanNode};
use std::collections::HashMap;

/// Position of a node: child indices from the root
pub type Path = Vec<usize>;

/// Side table mapping every placeholder to its producer
#[derive(Debug, Clone, Default)]
pub struct ScopeTable {
    bindings: HashMap<Path, Path>,
    unresolved: Vec<Path>,
}

impl ScopeTable {
    /// Resolve every placeholder of `root`
    pub fn build(root: &PlanNode) -> Self {
        let mut table = ScopeTable::default();
        let mut scopes: Vec<(NodeId, Path)> = Vec::new();
        let mut path = Vec::new();
        table.walk(root, &mut path, &mut scopes);
        table
    }

    fn walk(&mut self, node: &PlanNode, path: &mut Path, scopes: &mut Vec<(NodeId, Path)>) {
        if let PlanNode::Placeholder { producer, .. } = node {
            match scopes.iter().rev().find(|(id, _)| id == producer) {
                Some((_, producer_path)) => {
                    self.bindings.insert(path.clone(), producer_path.clone());
                }
                None => self.unresolved.push(path.clone()),
            }
            return;
        }

        let scope = node.producer_id().zip(node.scope_child());
        for (i, child) in node.children().into_iter().enumerate() {
            let entered = match scope {
                Some((id, scope_child)) if scope_child == i => {
                    scopes.push((id, path.clone()));
                    true
                }
                _ => false,
            };
            path.push(i);
            self.walk(child, path, scopes);
            path.pop();
            if entered {
                scopes.pop();
            }
        }
    }

    /// Path of the producer bound to the placeholder at `placeholder`
    pub fn producer_of(&self, placeholder: &[usize]) -> Option<&[usize]> {
        self.bindings.get(placeholder).map(Vec::as_slice)
    }

    /// Placeholders that have no enclosing producer
    pub fn unresolved(&self) -> &[Path] {
        &self.unresolved
    }

    /// All resolved (placeholder, producer) path pairs
    pub fn bindings(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Longest path shared by all of `paths`; the lowest common ancestor
pub fn common_prefix(paths: &[Path]) -> Path {
    let Some(first) = paths.first() else {
        return Vec::new();
    };
    let mut len = first.len();
    for path in &paths[1..] {
        len = len.min(path.len());
        len = first[..len]
            .iter()
            .zip(path)
            .take_while(|(a, b)| a == b)
            .count();
    }
    first[..len].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{PlaceholderRole, ReuseCount};

    fn delta(id: u32) -> PlanNode {
        PlanNode::placeholder(NodeId(id), PlaceholderRole::Delta, 2)
    }

    #[test]
    fn test_resolves_to_enclosing_recursion() {
        let rec = PlanNode::recursion(
            NodeId(0),
            PlanNode::table("edge", 2),
            delta(0).join(PlanNode::table("edge", 2), vec![1], vec![0]),
        );
        let table = ScopeTable::build(&rec);
        assert_eq!(table.len(), 1);
        assert_eq!(table.producer_of(&[1, 0]), Some(&[][..]));
        assert!(table.unresolved().is_empty());
    }

    #[test]
    fn test_placeholder_in_exit_plan_is_unresolved() {
        let rec = PlanNode::recursion(NodeId(0), delta(0), PlanNode::table("edge", 2));
        let table = ScopeTable::build(&rec);
        assert_eq!(table.unresolved(), &[vec![0]]);
    }

    #[test]
    fn test_duplicated_producers_resolve_to_nearest() {
        let rec = PlanNode::recursion(NodeId(0), PlanNode::table("edge", 2), delta(0));
        let plan = rec.clone().join(rec, vec![1], vec![0]);
        let table = ScopeTable::build(&plan);
        assert_eq!(table.producer_of(&[0, 1]), Some(&[0][..]));
        assert_eq!(table.producer_of(&[1, 1]), Some(&[1][..]));
    }

    #[test]
    fn test_reuse_placeholder_bound_in_main_only() {
        let reuse = PlanNode::placeholder(NodeId(3), PlaceholderRole::Reuse, 2);
        let mat = PlanNode::Materialization {
            id: NodeId(3),
            reused: Box::new(PlanNode::table("edge", 2)),
            main: Box::new(reuse.clone().union(reuse)),
            reuse: ReuseCount::Finite(2),
        };
        let table = ScopeTable::build(&mat);
        assert_eq!(table.len(), 2);
        assert_eq!(table.producer_of(&[1, 1]), Some(&[][..]));
    }

    #[test]
    fn test_common_prefix() {
        assert_eq!(common_prefix(&[vec![0, 1, 2], vec![0, 1, 0]]), vec![0, 1]);
        assert_eq!(common_prefix(&[vec![1], vec![0]]), Vec::<usize>::new());
        assert_eq!(common_prefix(&[vec![0, 1]]), vec![0, 1]);
    }
}
