//! # Recursion Support
//!
//! Dependency graphs and SCC detection (Tarjan's) for Datalog programs, plus
//! the lowering of abstract fixpoints to semi-naive sorted iteration.
//!
//! A rule is recursive if its head relation appears in its body:
//! ```datalog
//! tc(x, z) :- tc(x, y), edge(y, z).
//! ```
//!
//! Relations in one strongly connected component are computed together by a
//! single fixpoint. Negation inside a component is rejected: the negated
//! relation must be complete before it is read.
//!
//! ## Semi-naive iteration
//!
//! `full` and `delta` start as the exit rows. Each round evaluates the
//! recursive step, subtracts `full` to get the new `delta`, stops when it is
//! empty, and otherwise merges `delta` into `full`. The result is `full`.

use crate::ast::{BodyPredicate, Program, Rule};
use crate::ir::PlanNode;
use std::collections::{BTreeMap, BTreeSet};

/// Type of dependency between relations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyType {
    /// head depends on relation via a positive atom
    Positive,
    /// head depends on relation via a negated atom; the relation must be
    /// computed in an earlier component
    Negative,
}

/// Relation dependency graph with typed edges, keyed by `name/arity`
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Map from relation to its dependencies with types
    pub edges: BTreeMap<String, BTreeSet<(String, DependencyType)>>,
    /// All relations in the graph
    pub relations: BTreeSet<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph of `program`; builtins add no edges
    pub fn from_program(program: &Program) -> Self {
        let mut graph = DependencyGraph::new();
        for rule in &program.rules {
            let head = rule.head.signature();
            graph.relations.insert(head.clone());
            for pred in &rule.body {
                match pred {
                    BodyPredicate::Positive(atom) => {
                        graph.add_edge(&head, &atom.signature(), DependencyType::Positive)
                    }
                    BodyPredicate::Negated(atom) => {
                        graph.add_edge(&head, &atom.signature(), DependencyType::Negative)
                    }
                    BodyPredicate::Builtin(_) => {}
                }
            }
        }
        graph
    }

    /// Add a dependency edge
    pub fn add_edge(&mut self, from: &str, to: &str, dep_type: DependencyType) {
        self.relations.insert(from.to_string());
        self.relations.insert(to.to_string());
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert((to.to_string(), dep_type));
    }

    /// Relations `relation` depends on, either way
    pub fn dependencies(&self, relation: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(relation)
            .into_iter()
            .flat_map(|deps| deps.iter().map(|(to, _)| to.as_str()))
    }

    /// First negative edge with both ends in `scc`, in sorted order
    pub fn negative_edge_in_scc(&self, scc: &[String]) -> Option<(String, String)> {
        let members: BTreeSet<&String> = scc.iter().collect();
        for from in &members {
            let Some(edges) = self.edges.get(*from) else {
                continue;
            };
            for (to, dep_type) in edges {
                if *dep_type == DependencyType::Negative && members.contains(to) {
                    return Some(((*from).clone(), to.clone()));
                }
            }
        }
        None
    }

    /// Strongly connected components, dependencies before dependents
    ///
    /// Uses Tarjan's algorithm: depth-first search with discovery indices,
    /// low-link tracking and a stack of open nodes. Nodes and edges are
    /// visited in sorted order, so the result is deterministic.
    pub fn find_sccs(&self) -> Vec<Vec<String>> {
        let mut state = Tarjan::default();
        for node in &self.relations {
            if !state.indices.contains_key(node.as_str()) {
                state.strongconnect(node, self);
            }
        }
        state.sccs
    }

    /// Whether the component is a cycle (including a self loop)
    pub fn is_recursive(&self, scc: &[String]) -> bool {
        scc.len() > 1
            || scc
                .first()
                .is_some_and(|r| self.dependencies(r).any(|d| d == r.as_str()))
    }
}

#[derive(Default)]
struct Tarjan<'a> {
    index: usize,
    stack: Vec<&'a str>,
    indices: BTreeMap<&'a str, usize>,
    lowlinks: BTreeMap<&'a str, usize>,
    on_stack: BTreeSet<&'a str>,
    sccs: Vec<Vec<String>>,
}

impl<'a> Tarjan<'a> {
    fn strongconnect(&mut self, v: &'a str, graph: &'a DependencyGraph) {
        self.indices.insert(v, self.index);
        self.lowlinks.insert(v, self.index);
        self.index += 1;
        self.stack.push(v);
        self.on_stack.insert(v);

        for w in graph.dependencies(v) {
            if !self.indices.contains_key(w) {
                self.strongconnect(w, graph);
                let low = self.lowlinks[v].min(self.lowlinks[w]);
                self.lowlinks.insert(v, low);
            } else if self.on_stack.contains(w) {
                let low = self.lowlinks[v].min(self.indices[w]);
                self.lowlinks.insert(v, low);
            }
        }

        if self.lowlinks[v] == self.indices[v] {
            let mut scc = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack.remove(w);
                scc.push(w.to_string());
                if w == v {
                    break;
                }
            }
            scc.sort();
            self.sccs.push(scc);
        }
    }
}

/// Check if a single rule is recursive
pub fn is_recursive_rule(rule: &Rule) -> bool {
    rule.is_recursive()
}

/// Check if a program contains any recursive rules
pub fn has_recursion(program: &Program) -> bool {
    let graph = DependencyGraph::from_program(program);
    graph
        .find_sccs()
        .iter()
        .any(|scc| graph.is_recursive(scc))
}

// Lowering

/// Replace every abstract fixpoint with a sorted semi-naive one
pub fn lower_recursion(plan: PlanNode) -> PlanNode {
    plan.transform_up(&mut |node| match node {
        PlanNode::Recursion {
            id,
            exit,
            recursive,
        } => PlanNode::SortRecursion {
            id,
            exit: Box::new((*exit).into_sorted_unique()),
            recursive: Box::new((*recursive).into_sorted_unique()),
        },
        other => other,
    })
}

/// Row of text values
pub type Row = Vec<String>;

/// Rows of one recursion step that are not in `full` yet
pub fn new_delta(step: &BTreeSet<Row>, full: &BTreeSet<Row>) -> BTreeSet<Row> {
    step.difference(full).cloned().collect()
}

/// Merge `delta` into `full`
pub fn merge_delta(full: &mut BTreeSet<Row>, delta: &BTreeSet<Row>) {
    full.extend(delta.iter().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::RuleBuilder;
    use crate::ir::{NodeId, PlaceholderRole};

    fn rows(pairs: &[(&str, &str)]) -> BTreeSet<Row> {
        pairs
            .iter()
            .map(|(a, b)| vec![a.to_string(), b.to_string()])
            .collect()
    }

    fn path_program() -> Program {
        Program {
            rules: vec![
                RuleBuilder::new("path")
                    .head_vars(["x", "y"])
                    .body_atom("edge", ["x", "y"])
                    .build(),
                RuleBuilder::new("path")
                    .head_vars(["x", "z"])
                    .body_atom("path", ["x", "y"])
                    .body_atom("edge", ["y", "z"])
                    .build(),
                RuleBuilder::new("lonely")
                    .head_vars(["x"])
                    .body_atom("node", ["x"])
                    .negated_atom("path", ["x", "_"])
                    .build(),
            ],
        }
    }

    #[test]
    fn test_is_recursive_rule() {
        let program = path_program();
        assert!(!is_recursive_rule(&program.rules[0]));
        assert!(is_recursive_rule(&program.rules[1]));
        assert!(has_recursion(&program));
    }

    #[test]
    fn test_sccs_in_dependency_order() {
        let graph = DependencyGraph::from_program(&path_program());
        let sccs = graph.find_sccs();
        let position = |rel: &str| sccs.iter().position(|s| s.iter().any(|r| r == rel));
        assert!(position("edge/2") < position("path/2"));
        assert!(position("path/2") < position("lonely/1"));
        assert!(graph.is_recursive(&["path/2".to_string()]));
        assert!(!graph.is_recursive(&["lonely/1".to_string()]));
    }

    #[test]
    fn test_mutual_recursion_is_one_scc() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("even/1", "odd/1", DependencyType::Positive);
        graph.add_edge("odd/1", "even/1", DependencyType::Positive);
        graph.add_edge("even/1", "zero/1", DependencyType::Positive);
        let sccs = graph.find_sccs();
        assert_eq!(sccs.len(), 2);
        assert_eq!(sccs[0], vec!["zero/1"]);
        assert_eq!(sccs[1], vec!["even/1", "odd/1"]);
    }

    #[test]
    fn test_negation_inside_scc_detected() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("p/1", "q/1", DependencyType::Positive);
        graph.add_edge("q/1", "p/1", DependencyType::Negative);
        let scc = vec!["p/1".to_string(), "q/1".to_string()];
        assert_eq!(
            graph.negative_edge_in_scc(&scc),
            Some(("q/1".to_string(), "p/1".to_string()))
        );
    }

    #[test]
    fn test_new_delta() {
        let step = rows(&[("1", "2"), ("2", "3"), ("3", "4")]);
        let full = rows(&[("1", "2"), ("2", "3")]);
        assert_eq!(new_delta(&step, &full), rows(&[("3", "4")]));
    }

    #[test]
    fn test_merge_delta() {
        let mut full = rows(&[("1", "2")]);
        merge_delta(&mut full, &rows(&[("1", "2"), ("2", "3")]));
        assert_eq!(full, rows(&[("1", "2"), ("2", "3")]));
    }

    #[test]
    fn test_lower_recursion_sorts_both_inputs() {
        let delta = PlanNode::placeholder(NodeId(0), PlaceholderRole::Delta, 2);
        let step = delta
            .join(PlanNode::table("edge", 2), vec![1], vec![0])
            .project_columns(&[0, 3]);
        let rec = PlanNode::recursion(NodeId(0), PlanNode::table("edge", 2), step.clone());
        let lowered = lower_recursion(rec);
        assert_eq!(
            lowered,
            PlanNode::SortRecursion {
                id: NodeId(0),
                exit: Box::new(PlanNode::table("edge", 2).sort(None)),
                recursive: Box::new(step.sort(None)),
            }
        );
        assert_eq!(lower_recursion(lowered.clone()), lowered);
    }
}
