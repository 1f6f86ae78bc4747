//! Filter and projection push-down.
//!
//! Filters move below unions, projects, joins and the left side of
//! anti-joins; a constant filter on a join key is applied to both join
//! inputs, and an equality between a left and a right column becomes an
//! extra join key. Projects move below unions and narrow both inputs of a
//! join to the columns that are still needed. Filters never pass each other,
//! so re-running the pass leaves its output unchanged.

use super::simplify::compose;
use crate::ir::{columns, PlanNode, ProjectItem};
use std::collections::BTreeSet;

/// Push filters and projects towards the leaves
pub fn push_down(plan: PlanNode) -> PlanNode {
    match plan {
        PlanNode::ConstEq {
            input,
            column,
            value,
        } => push_const(push_down(*input), column, value),
        PlanNode::VarEq { input, left, right } => push_columns(push_down(*input), left, right),
        PlanNode::Project { input, items } => push_project(push_down(*input), items),
        other => other.map_children(push_down),
    }
}

fn keep_const(input: PlanNode, column: usize, value: String) -> PlanNode {
    PlanNode::ConstEq {
        input: Box::new(input),
        column,
        value,
    }
}

/// `input` filtered on `column = value`, pushed as far down as possible
fn push_const(input: PlanNode, column: usize, value: String) -> PlanNode {
    match input {
        PlanNode::Union { inputs, arity } => PlanNode::Union {
            inputs: inputs
                .into_iter()
                .map(|i| push_const(i, column, value.clone()))
                .collect(),
            arity,
        },
        PlanNode::Project { input, items } => match items.get(column) {
            Some(ProjectItem::Column(c)) => {
                let c = *c;
                PlanNode::Project {
                    input: Box::new(push_const(*input, c, value)),
                    items,
                }
            }
            Some(ProjectItem::Literal(literal)) if *literal == value => {
                PlanNode::Project { input, items }
            }
            Some(ProjectItem::Literal(_)) => PlanNode::empty(items.len()),
            None => keep_const(PlanNode::Project { input, items }, column, value),
        },
        PlanNode::Join {
            left,
            right,
            left_keys,
            right_keys,
        } => {
            let left_arity = left.arity();
            let (left, right) = if column < left_arity {
                let right = match left_keys.iter().position(|&k| k == column) {
                    Some(pos) => push_const(*right, right_keys[pos], value.clone()),
                    None => *right,
                };
                (push_const(*left, column, value), right)
            } else {
                let column = column - left_arity;
                let left = match right_keys.iter().position(|&k| k == column) {
                    Some(pos) => push_const(*left, left_keys[pos], value.clone()),
                    None => *left,
                };
                (left, push_const(*right, column, value))
            };
            left.join(right, left_keys, right_keys)
        }
        PlanNode::AntiJoin {
            left,
            right,
            left_keys,
            right_keys,
        } => push_const(*left, column, value).anti_join(*right, left_keys, right_keys),
        other => keep_const(other, column, value),
    }
}

/// `input` filtered on `left = right`, pushed as far down as possible
fn push_columns(input: PlanNode, left: usize, right: usize) -> PlanNode {
    if left == right {
        return input;
    }
    match input {
        PlanNode::Union { inputs, arity } => PlanNode::Union {
            inputs: inputs
                .into_iter()
                .map(|i| push_columns(i, left, right))
                .collect(),
            arity,
        },
        PlanNode::Project { input, items } => match (items.get(left), items.get(right)) {
            (Some(ProjectItem::Column(a)), Some(ProjectItem::Column(b))) => {
                let (a, b) = (*a, *b);
                PlanNode::Project {
                    input: Box::new(push_columns(*input, a, b)),
                    items,
                }
            }
            (Some(ProjectItem::Literal(x)), Some(ProjectItem::Literal(y))) => {
                if x == y {
                    PlanNode::Project { input, items }
                } else {
                    PlanNode::empty(items.len())
                }
            }
            (Some(ProjectItem::Column(c)), Some(ProjectItem::Literal(v)))
            | (Some(ProjectItem::Literal(v)), Some(ProjectItem::Column(c))) => {
                let (c, v) = (*c, v.clone());
                PlanNode::Project {
                    input: Box::new(push_const(*input, c, v)),
                    items,
                }
            }
            _ => PlanNode::VarEq {
                input: Box::new(PlanNode::Project { input, items }),
                left,
                right,
            },
        },
        PlanNode::Join {
            left: l,
            right: r,
            mut left_keys,
            mut right_keys,
        } => {
            let left_arity = l.arity();
            let (lo, hi) = (left.min(right), left.max(right));
            if hi < left_arity {
                push_columns(*l, lo, hi).join(*r, left_keys, right_keys)
            } else if lo >= left_arity {
                (*l).join(
                    push_columns(*r, lo - left_arity, hi - left_arity),
                    left_keys,
                    right_keys,
                )
            } else {
                let pair = (lo, hi - left_arity);
                let known = left_keys
                    .iter()
                    .zip(&right_keys)
                    .any(|(&lk, &rk)| (lk, rk) == pair);
                if !known {
                    left_keys.push(pair.0);
                    right_keys.push(pair.1);
                }
                (*l).join(*r, left_keys, right_keys)
            }
        }
        PlanNode::AntiJoin {
            left: l,
            right: r,
            left_keys,
            right_keys,
        } => push_columns(*l, left, right).anti_join(*r, left_keys, right_keys),
        other => PlanNode::VarEq {
            input: Box::new(other),
            left,
            right,
        },
    }
}

/// `input` projected on `items`, narrowing join inputs where possible
fn push_project(input: PlanNode, items: Vec<ProjectItem>) -> PlanNode {
    match input {
        PlanNode::Union { inputs, .. } => {
            let arity = items.len();
            PlanNode::Union {
                inputs: inputs
                    .into_iter()
                    .map(|i| push_project(i, items.clone()))
                    .collect(),
                arity,
            }
        }
        PlanNode::Project {
            input,
            items: inner,
        } => push_project(*input, compose(&inner, &items)),
        PlanNode::Join {
            left,
            right,
            left_keys,
            right_keys,
        } => {
            let left_arity = left.arity();
            let right_arity = right.arity();
            let used: Vec<usize> = items.iter().filter_map(ProjectItem::column).collect();

            let left_needed = needed(
                used.iter().copied().filter(|&c| c < left_arity),
                &left_keys,
                left_arity,
            );
            let right_needed = needed(
                used.iter()
                    .filter(|&&c| c >= left_arity)
                    .map(|&c| c - left_arity),
                &right_keys,
                right_arity,
            );
            if left_needed.len() == left_arity && right_needed.len() == right_arity {
                return PlanNode::Project {
                    input: Box::new((*left).join(*right, left_keys, right_keys)),
                    items,
                };
            }

            let (left, left_map) = narrow(*left, &left_needed);
            let (right, right_map) = narrow(*right, &right_needed);
            let new_left_arity = left.arity();
            let left_keys = left_keys.iter().map(|k| left_map[*k]).collect();
            let right_keys = right_keys.iter().map(|k| right_map[*k]).collect();
            let items = items
                .into_iter()
                .map(|item| match item {
                    ProjectItem::Column(c) if c < left_arity => ProjectItem::Column(left_map[c]),
                    ProjectItem::Column(c) => {
                        ProjectItem::Column(new_left_arity + right_map[c - left_arity])
                    }
                    literal => literal,
                })
                .collect();
            PlanNode::Project {
                input: Box::new(left.join(right, left_keys, right_keys)),
                items,
            }
        }
        PlanNode::AntiJoin {
            left,
            right,
            left_keys,
            right_keys,
        } => {
            let left_arity = left.arity();
            let left_needed = needed(
                items.iter().filter_map(ProjectItem::column),
                &left_keys,
                left_arity,
            );
            if left_needed.len() == left_arity {
                return PlanNode::Project {
                    input: Box::new((*left).anti_join(*right, left_keys, right_keys)),
                    items,
                };
            }
            let (left, left_map) = narrow(*left, &left_needed);
            let left_keys = left_keys.iter().map(|k| left_map[*k]).collect();
            let items = items
                .into_iter()
                .map(|item| match item {
                    ProjectItem::Column(c) => ProjectItem::Column(left_map[c]),
                    literal => literal,
                })
                .collect();
            PlanNode::Project {
                input: Box::new(left.anti_join(*right, left_keys, right_keys)),
                items,
            }
        }
        other => PlanNode::Project {
            input: Box::new(other),
            items,
        },
    }
}

/// Columns of an input that must survive: used ones plus join keys, never
/// none at all
fn needed(used: impl Iterator<Item = usize>, keys: &[usize], arity: usize) -> Vec<usize> {
    let mut set: BTreeSet<usize> = used.chain(keys.iter().copied()).collect();
    if set.is_empty() && arity > 0 {
        set.insert(0);
    }
    set.into_iter().collect()
}

/// Project `input` on `keep` when that drops columns; returns the new plan
/// and the old-to-new column map
fn narrow(input: PlanNode, keep: &[usize]) -> (PlanNode, Vec<usize>) {
    let arity = input.arity();
    if keep.len() == arity {
        return (input, (0..arity).collect());
    }
    let mut map = vec![0; arity];
    for (new, &old) in keep.iter().enumerate() {
        map[old] = new;
    }
    (push_project(input, columns(keep)), map)
}
