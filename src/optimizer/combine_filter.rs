//! Filter combination.
//!
//! Several rule bodies often scan the same relation with different filters.
//! Union siblings that only filter and project one input become a single
//! [`PlanNode::MultiFilter`]. Filter/project chains over the same base
//! relation elsewhere in the tree are served by one [`PlanNode::MultiOutput`]
//! scan placed at their lowest common ancestor; each chain is replaced by a
//! branch placeholder.

use crate::ir::scope::{common_prefix, Path};
use crate::ir::{Condition, FilterBranch, IdGenerator, PlaceholderRole, PlanNode};

/// Merge filter/project branches that share an input
pub fn combine_filters(plan: PlanNode) -> PlanNode {
    let plan = plan.transform_up(&mut |node| match node {
        PlanNode::Union { inputs, arity } if inputs.len() > 1 => combine_union(inputs, arity),
        other => other,
    });
    combine_scans(plan)
}

/// Split a filter/project chain into its source and the branch applied to it
pub(crate) fn split_chain(node: &PlanNode) -> (&PlanNode, FilterBranch) {
    let (mut current, projection) = match node {
        PlanNode::Project { input, items } => (input.as_ref(), Some(items.clone())),
        other => (other, None),
    };
    let mut conditions = Vec::new();
    loop {
        match current {
            PlanNode::ConstEq {
                input,
                column,
                value,
            } => {
                conditions.push(Condition::Const {
                    column: *column,
                    value: value.clone(),
                });
                current = input;
            }
            PlanNode::VarEq { input, left, right } => {
                conditions.push(Condition::Columns {
                    left: *left,
                    right: *right,
                });
                current = input;
            }
            _ => break,
        }
    }
    conditions.reverse();
    (
        current,
        FilterBranch {
            conditions,
            projection,
        },
    )
}

fn combine_union(inputs: Vec<PlanNode>, arity: usize) -> PlanNode {
    let mut groups: Vec<(PlanNode, Vec<(PlanNode, FilterBranch)>)> = Vec::new();
    for input in inputs {
        let (source, branch) = split_chain(&input);
        let source = source.clone();
        match groups.iter_mut().find(|(s, _)| *s == source) {
            Some((_, members)) => members.push((input, branch)),
            None => groups.push((source, vec![(input, branch)])),
        }
    }

    let mut combined: Vec<PlanNode> = groups
        .into_iter()
        .map(|(source, mut members)| {
            if members.len() == 1 {
                members.remove(0).0
            } else {
                PlanNode::MultiFilter {
                    input: Box::new(source),
                    branches: members.into_iter().map(|(_, b)| b).collect(),
                    arity,
                }
            }
        })
        .collect();

    if combined.len() == 1 {
        combined.remove(0)
    } else {
        PlanNode::Union {
            inputs: combined,
            arity,
        }
    }
}

fn is_chain_head(node: &PlanNode) -> bool {
    matches!(
        node,
        PlanNode::Project { .. } | PlanNode::ConstEq { .. } | PlanNode::VarEq { .. }
    )
}

/// Filter/project chains reading a table or file directly
fn collect_scans(node: &PlanNode, path: &mut Path, out: &mut Vec<(Path, PlanNode, FilterBranch)>) {
    if is_chain_head(node) {
        let (source, branch) = split_chain(node);
        if matches!(source, PlanNode::Table { .. } | PlanNode::File { .. }) {
            out.push((path.clone(), source.clone(), branch));
            return;
        }
    }
    for (i, child) in node.children().into_iter().enumerate() {
        path.push(i);
        collect_scans(child, path, out);
        path.pop();
    }
}

fn combine_scans(mut plan: PlanNode) -> PlanNode {
    let mut ids = IdGenerator::after(&plan);
    loop {
        let mut scans = Vec::new();
        collect_scans(&plan, &mut Vec::new(), &mut scans);

        let mut groups: Vec<(PlanNode, Vec<(Path, FilterBranch)>)> = Vec::new();
        for (path, source, branch) in scans {
            match groups.iter_mut().find(|(s, _)| *s == source) {
                Some((_, members)) => members.push((path, branch)),
                None => groups.push((source, vec![(path, branch)])),
            }
        }

        let shared = groups.into_iter().find_map(|(source, members)| {
            let mut branches: Vec<FilterBranch> = Vec::new();
            for (_, branch) in &members {
                if !branches.contains(branch) {
                    branches.push(branch.clone());
                }
            }
            (branches.len() > 1).then_some((source, members, branches))
        });
        let Some((source, members, branches)) = shared else {
            return plan;
        };

        let id = ids.fresh();
        let input_arity = source.arity();
        let paths: Vec<Path> = members.iter().map(|(p, _)| p.clone()).collect();
        let anchor = common_prefix(&paths);
        tracing::debug!(
            source = %source.kind(),
            branches = branches.len(),
            readers = members.len(),
            "combining scans into one multi-output pass"
        );

        plan = plan.replace_at(&anchor, |mut main| {
            for (path, branch) in &members {
                let index = branches.iter().position(|b| b == branch).unwrap_or(0);
                let arity = branches[index].arity(input_arity);
                main = main.replace_at(&path[anchor.len()..], |_| {
                    PlanNode::placeholder(id, PlaceholderRole::Branch(index), arity)
                });
            }
            PlanNode::MultiOutput {
                id,
                input: Box::new(source),
                branches,
                main: Box::new(main),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{NodeId, ProjectItem};

    fn edge() -> PlanNode {
        PlanNode::table("edge", 2)
    }

    #[test]
    fn test_union_siblings_become_multi_filter() {
        let plan = edge()
            .filter_const(0, "a")
            .project_columns(&[1, 0])
            .union(edge().filter_columns(0, 1));
        let combined = combine_filters(plan);
        let PlanNode::MultiFilter {
            input,
            branches,
            arity,
        } = combined
        else {
            panic!("expected MultiFilter");
        };
        assert_eq!(*input, edge());
        assert_eq!(arity, 2);
        assert_eq!(branches.len(), 2);
        assert_eq!(
            branches[0].conditions,
            vec![Condition::Const {
                column: 0,
                value: "a".into()
            }]
        );
        assert_eq!(
            branches[0].projection,
            Some(vec![ProjectItem::Column(1), ProjectItem::Column(0)])
        );
        assert_eq!(
            branches[1].conditions,
            vec![Condition::Columns { left: 0, right: 1 }]
        );
        assert_eq!(branches[1].projection, None);
    }

    #[test]
    fn test_union_with_different_sources_keeps_other_branches() {
        let plan = PlanNode::union_all(
            vec![
                edge().filter_const(0, "a"),
                PlanNode::table("arc", 2),
                edge().filter_const(0, "b"),
            ],
            2,
        );
        let PlanNode::Union { inputs, .. } = combine_filters(plan) else {
            panic!("expected Union");
        };
        assert_eq!(inputs.len(), 2);
        assert!(matches!(inputs[0], PlanNode::MultiFilter { .. }));
        assert_eq!(inputs[1], PlanNode::table("arc", 2));
    }

    #[test]
    fn test_shared_scan_becomes_multi_output() {
        let a = edge().filter_const(0, "a").project_columns(&[1]);
        let b = edge().filter_const(0, "b").project_columns(&[1]);
        let plan = a.join(b, vec![0], vec![0]);

        let PlanNode::MultiOutput {
            id,
            input,
            branches,
            main,
        } = combine_filters(plan)
        else {
            panic!("expected MultiOutput");
        };
        assert_eq!(id, NodeId(0));
        assert_eq!(*input, edge());
        assert_eq!(branches.len(), 2);
        assert_eq!(
            *main,
            PlanNode::placeholder(id, PlaceholderRole::Branch(0), 1).join(
                PlanNode::placeholder(id, PlaceholderRole::Branch(1), 1),
                vec![0],
                vec![0]
            )
        );
    }

    #[test]
    fn test_identical_chains_are_left_alone() {
        let a = edge().filter_const(0, "a");
        let plan = a.clone().join(a, vec![1], vec![0]);
        assert_eq!(combine_filters(plan.clone()), plan);
    }
}
