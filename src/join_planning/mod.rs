//! # Join Planning
//!
//! Reorders chains of equi-joins into a left-deep tree.
//!
//! 1. Lift filters and projects sitting on join inputs above the join, so
//!    nested joins become adjacent (`push_down_joins`)
//! 2. Flatten every maximal join tree into a join graph: nodes are the
//!    non-join inputs, edges the column equalities between them
//! 3. Greedily build a left-deep order: start with the cheapest input, then
//!    repeatedly add the cheapest input connected to what is already joined
//!    (any input when none is connected); ties go to the lowest index
//! 4. Rebuild the joins and restore the original column order with a project
//!
//! ```text
//! PlanNode with Joins -> [Join Planning] -> Reordered PlanNode -> push-down
//! ```
//!
//! Any order yields the same rows; the cost function only decides which.

use crate::ir::{columns, PlaceholderRole, PlanNode, ProjectItem};

/// Relative size estimate of a plan's output
///
/// Base relations count 1000 and recursion deltas 100 (one round is usually
/// much smaller than the relation). A constant filter divides by 10, a column
/// equality by 2. A keyed join is as large as its larger input, a cross
/// product multiplies. Recursions count ten times their exit and step plans.
pub fn estimate_cost(plan: &PlanNode) -> u64 {
    match plan {
        PlanNode::Table { .. } | PlanNode::File { .. } | PlanNode::Builtin { .. } => 1000,
        PlanNode::Placeholder {
            role: PlaceholderRole::Delta,
            ..
        } => 100,
        PlanNode::Placeholder { .. } => 1000,
        PlanNode::Union { inputs, .. } => inputs
            .iter()
            .map(estimate_cost)
            .fold(0, u64::saturating_add),
        PlanNode::ConstEq { input, .. } => (estimate_cost(input) / 10).max(1),
        PlanNode::VarEq { input, .. } => (estimate_cost(input) / 2).max(1),
        PlanNode::Project { input, .. }
        | PlanNode::Sort { input, .. }
        | PlanNode::CombinedColumn { input, .. }
        | PlanNode::MultiFilter { input, .. } => estimate_cost(input),
        PlanNode::Join {
            left,
            right,
            left_keys,
            ..
        } => {
            let (l, r) = (estimate_cost(left), estimate_cost(right));
            if left_keys.is_empty() {
                l.saturating_mul(r)
            } else {
                l.max(r)
            }
        }
        PlanNode::SortJoin { left, right, .. } => estimate_cost(left).max(estimate_cost(right)),
        PlanNode::AntiJoin { left, .. } | PlanNode::SortAntiJoin { left, .. } => {
            estimate_cost(left)
        }
        PlanNode::MultiOutput { main, .. } | PlanNode::Materialization { main, .. } => {
            estimate_cost(main)
        }
        PlanNode::Recursion {
            exit, recursive, ..
        }
        | PlanNode::SortRecursion {
            exit, recursive, ..
        } => estimate_cost(exit)
            .saturating_add(estimate_cost(recursive))
            .saturating_mul(10),
    }
}

/// Input of a flattened join tree
#[derive(Debug, Clone)]
pub struct JoinGraphNode {
    /// The non-join plan
    pub plan: PlanNode,
    /// Position of its first column in the flattened output
    pub offset: usize,
    pub cost: u64,
}

impl JoinGraphNode {
    fn columns(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.plan.arity()
    }
}

/// Equality between two columns of the flattened output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinGraphEdge {
    pub left: usize,
    pub right: usize,
}

/// Join graph of one maximal join tree
#[derive(Debug, Clone, Default)]
pub struct JoinGraph {
    pub nodes: Vec<JoinGraphNode>,
    pub edges: Vec<JoinGraphEdge>,
    arity: usize,
}

impl JoinGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten the join tree rooted at `plan`
    pub fn from_plan(plan: PlanNode) -> Self {
        let mut graph = JoinGraph::new();
        graph.add(plan);
        graph
    }

    fn add(&mut self, plan: PlanNode) {
        match plan {
            PlanNode::Join {
                left,
                right,
                left_keys,
                right_keys,
            } => {
                let left_offset = self.arity;
                let right_offset = left_offset + left.arity();
                self.add(*left);
                self.add(*right);
                for (l, r) in left_keys.into_iter().zip(right_keys) {
                    self.edges.push(JoinGraphEdge {
                        left: left_offset + l,
                        right: right_offset + r,
                    });
                }
            }
            other => {
                let offset = self.arity;
                self.arity += other.arity();
                self.nodes.push(JoinGraphNode {
                    cost: estimate_cost(&other),
                    plan: other,
                    offset,
                });
            }
        }
    }

    /// Output arity of the whole join tree
    pub fn arity(&self) -> usize {
        self.arity
    }

    fn node_of(&self, column: usize) -> Option<usize> {
        self.nodes.iter().position(|n| n.columns().contains(&column))
    }

    fn connected(&self, a: usize, b: usize) -> bool {
        self.edges.iter().any(|e| {
            let (x, y) = (self.node_of(e.left), self.node_of(e.right));
            (x == Some(a) && y == Some(b)) || (x == Some(b) && y == Some(a))
        })
    }

    /// Whether every input is reachable from the first through equalities
    pub fn is_connected(&self) -> bool {
        if self.nodes.is_empty() {
            return true;
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![0];
        seen[0] = true;
        while let Some(n) = stack.pop() {
            for m in 0..self.nodes.len() {
                if !seen[m] && self.connected(n, m) {
                    seen[m] = true;
                    stack.push(m);
                }
            }
        }
        seen.into_iter().all(|s| s)
    }

    /// Greedy left-deep order of node indices
    pub fn greedy_order(&self) -> Vec<usize> {
        let n = self.nodes.len();
        let mut order: Vec<usize> = Vec::with_capacity(n);
        let mut remaining: Vec<usize> = (0..n).collect();
        while !remaining.is_empty() {
            let connected: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&c| order.iter().any(|&o| self.connected(o, c)))
                .collect();
            let candidates = if connected.is_empty() {
                &remaining
            } else {
                &connected
            };
            let Some(&next) = candidates
                .iter()
                .min_by_key(|&&c| (self.nodes[c].cost, c))
            else {
                break;
            };
            order.push(next);
            remaining.retain(|&c| c != next);
        }
        order
    }

    /// Rebuild the joins in `order`, projecting back to the flattened column
    /// order
    pub fn build(self, order: &[usize]) -> PlanNode {
        let mut nodes: Vec<Option<JoinGraphNode>> = self.nodes.into_iter().map(Some).collect();
        let mut layout: Vec<usize> = Vec::new();
        let mut current: Option<PlanNode> = None;

        for &index in order {
            let Some(node) = nodes.get_mut(index).and_then(Option::take) else {
                continue;
            };
            let range = node.columns();
            current = Some(match current {
                None => node.plan,
                Some(joined) => {
                    let mut pairs: Vec<(usize, usize)> = self
                        .edges
                        .iter()
                        .filter_map(|e| {
                            let pair = |a: usize, b: usize| {
                                let pos = layout.iter().position(|&c| c == a)?;
                                range.contains(&b).then(|| (pos, b - range.start))
                            };
                            pair(e.left, e.right).or_else(|| pair(e.right, e.left))
                        })
                        .collect();
                    pairs.sort_unstable();
                    pairs.dedup();
                    let (left_keys, right_keys) = pairs.into_iter().unzip();
                    joined.join(node.plan, left_keys, right_keys)
                }
            });
            layout.extend(range);
        }

        let plan = current.unwrap_or_else(|| PlanNode::empty(self.arity));
        let restore: Vec<usize> = (0..self.arity)
            .map(|g| layout.iter().position(|&c| c == g).unwrap_or(g))
            .collect();
        if restore.iter().enumerate().all(|(i, &c)| i == c) {
            plan
        } else {
            plan.project(columns(&restore))
        }
    }
}

/// Join planner for reordering join chains
#[derive(Debug, Clone)]
pub struct JoinPlanner {
    /// Whether to enable join reordering
    enable_reordering: bool,
}

impl Default for JoinPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl JoinPlanner {
    pub fn new() -> Self {
        JoinPlanner {
            enable_reordering: true,
        }
    }

    /// Enable or disable join reordering
    pub fn set_reordering(&mut self, enable: bool) {
        self.enable_reordering = enable;
    }

    /// Reorder every join tree in `plan`
    pub fn plan_joins(&self, plan: PlanNode) -> PlanNode {
        if !self.enable_reordering {
            return plan;
        }
        match plan {
            join @ PlanNode::Join { .. } => {
                let mut graph = JoinGraph::from_plan(join);
                for node in &mut graph.nodes {
                    let inner = std::mem::replace(&mut node.plan, PlanNode::empty(0));
                    node.plan = self.plan_joins(inner);
                    node.cost = estimate_cost(&node.plan);
                }
                if graph.nodes.len() <= 2 {
                    let identity: Vec<usize> = (0..graph.nodes.len()).collect();
                    return graph.build(&identity);
                }
                let order = graph.greedy_order();
                tracing::trace!(
                    inputs = graph.nodes.len(),
                    connected = graph.is_connected(),
                    ?order,
                    "join order chosen"
                );
                graph.build(&order)
            }
            other => other.map_children(|child| self.plan_joins(child)),
        }
    }
}

/// Reorder every join chain with the default planner
pub fn reorder_joins(plan: PlanNode) -> PlanNode {
    JoinPlanner::new().plan_joins(plan)
}

/// Lift filters and projects off join inputs so nested joins become adjacent
pub fn push_down_joins(plan: PlanNode) -> PlanNode {
    plan.transform_up(&mut |node| match node {
        PlanNode::Join {
            left,
            right,
            left_keys,
            right_keys,
        } => lift_join(*left, *right, left_keys, right_keys),
        other => other,
    })
}

fn lift_join(
    left: PlanNode,
    right: PlanNode,
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
) -> PlanNode {
    let keys_are_columns =
        |items: &[ProjectItem], keys: &[usize]| keys.iter().all(|k| items.get(*k).and_then(ProjectItem::column).is_some());

    let left = match left {
        PlanNode::ConstEq {
            input,
            column,
            value,
        } => return lift_join(*input, right, left_keys, right_keys).filter_const(column, value),
        PlanNode::VarEq {
            input,
            left: a,
            right: b,
        } => return lift_join(*input, right, left_keys, right_keys).filter_columns(a, b),
        PlanNode::Project { input, items } if keys_are_columns(&items, &left_keys) => {
            let inner_arity = input.arity();
            let left_keys = left_keys
                .iter()
                .filter_map(|k| items[*k].column())
                .collect();
            let mut out = items;
            out.extend((0..right.arity()).map(|j| ProjectItem::Column(inner_arity + j)));
            return lift_join(*input, right, left_keys, right_keys).project(out);
        }
        other => other,
    };

    let offset = left.arity();
    match right {
        PlanNode::ConstEq {
            input,
            column,
            value,
        } => lift_join(left, *input, left_keys, right_keys).filter_const(offset + column, value),
        PlanNode::VarEq {
            input,
            left: a,
            right: b,
        } => lift_join(left, *input, left_keys, right_keys).filter_columns(offset + a, offset + b),
        PlanNode::Project { input, items } if keys_are_columns(&items, &right_keys) => {
            let right_keys = right_keys
                .iter()
                .filter_map(|k| items[*k].column())
                .collect();
            let mut out = columns(&(0..offset).collect::<Vec<_>>());
            out.extend(items.into_iter().map(|item| match item {
                ProjectItem::Column(c) => ProjectItem::Column(offset + c),
                literal => literal,
            }));
            lift_join(left, *input, left_keys, right_keys).project(out)
        }
        other => left.join(other, left_keys, right_keys),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeId;

    fn table(name: &str) -> PlanNode {
        PlanNode::table(name, 2)
    }

    fn delta() -> PlanNode {
        PlanNode::placeholder(NodeId(0), PlaceholderRole::Delta, 2)
    }

    #[test]
    fn test_estimate_cost() {
        assert_eq!(estimate_cost(&table("a")), 1000);
        assert_eq!(estimate_cost(&table("a").filter_const(0, "x")), 100);
        assert_eq!(estimate_cost(&table("a").filter_columns(0, 1)), 500);
        assert_eq!(estimate_cost(&delta()), 100);
        assert_eq!(estimate_cost(&PlanNode::empty(2)), 0);
        assert_eq!(
            estimate_cost(&table("a").join(table("b"), vec![], vec![])),
            1_000_000
        );
        assert_eq!(
            estimate_cost(&table("a").join(table("b"), vec![0], vec![0])),
            1000
        );
    }

    #[test]
    fn test_join_graph_construction() {
        let plan = table("r")
            .join(table("s"), vec![1], vec![0])
            .join(table("t"), vec![3], vec![0]);
        let graph = JoinGraph::from_plan(plan);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.arity(), 6);
        assert_eq!(
            graph.edges,
            vec![
                JoinGraphEdge { left: 1, right: 2 },
                JoinGraphEdge { left: 3, right: 4 }
            ]
        );
        assert!(graph.is_connected());
    }

    #[test]
    fn test_disconnected_graph() {
        let plan = table("r")
            .join(table("s"), vec![], vec![])
            .join(table("t"), vec![3], vec![0]);
        assert!(!JoinGraph::from_plan(plan).is_connected());
    }

    #[test]
    fn test_single_join_unchanged() {
        let plan = table("r").join(table("s"), vec![1], vec![0]);
        assert_eq!(reorder_joins(plan.clone()), plan);
    }

    #[test]
    fn test_delta_joined_first() {
        let plan = table("r")
            .join(table("s"), vec![1], vec![0])
            .join(delta(), vec![3], vec![0]);
        let expected = delta()
            .join(table("s"), vec![0], vec![1])
            .join(table("r"), vec![2], vec![1])
            .project_columns(&[4, 5, 2, 3, 0, 1]);
        assert_eq!(reorder_joins(plan), expected);
    }

    #[test]
    fn test_connected_inputs_before_cross_product() {
        // r and t share nothing; s links both
        let plan = table("r")
            .filter_const(0, "x")
            .join(table("t").filter_const(0, "y"), vec![], vec![])
            .join(table("s"), vec![1, 3], vec![0, 1]);
        let reordered = reorder_joins(plan);
        let PlanNode::Project { input, .. } = &reordered else {
            panic!("expected a restoring project");
        };
        let PlanNode::Join { left, right, .. } = input.as_ref() else {
            panic!("expected a join");
        };
        // r (cost 100, index 0) starts, s is the only connected input next
        assert_eq!(**right, table("t").filter_const(0, "y"));
        assert!(matches!(left.as_ref(), PlanNode::Join { right, .. } if **right == table("s")));
    }

    #[test]
    fn test_reordering_can_be_disabled() {
        let plan = table("r")
            .join(table("s"), vec![1], vec![0])
            .join(delta(), vec![3], vec![0]);
        let mut planner = JoinPlanner::new();
        planner.set_reordering(false);
        assert_eq!(planner.plan_joins(plan.clone()), plan);
    }

    #[test]
    fn test_lift_filters_and_projects_over_join() {
        let plan = table("a").filter_const(0, "x").join(
            table("b").project_columns(&[1, 0]),
            vec![1],
            vec![0],
        );
        let expected = table("a")
            .join(table("b"), vec![1], vec![1])
            .project_columns(&[0, 1, 3, 2])
            .filter_const(0, "x");
        assert_eq!(push_down_joins(plan), expected);
    }

    #[test]
    fn test_project_with_literal_key_stays() {
        let literal = table("b").project(vec![
            ProjectItem::Literal("k".into()),
            ProjectItem::Column(0),
        ]);
        let plan = table("a").join(literal, vec![0], vec![0]);
        assert_eq!(push_down_joins(plan.clone()), plan);
    }
}
