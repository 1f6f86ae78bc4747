//! Algebraic simplification.
//!
//! - `Project(x, id)` -> `x`, `Project(Project(x, p1), p2)` -> `Project(x, p1 . p2)`
//! - empty inputs propagate through filters, projects, joins and sorts
//! - unions are flattened, lose empty and duplicate branches, and collapse
//!   when one branch is left
//! - a recursion that never reads its placeholders becomes a union; bare
//!   `delta`/`full` branches of a recursive union are dropped (they never
//!   contribute new rows); a recursion with an empty exit plan whose first
//!   round is statically empty is empty

use crate::ir::{is_identity_projection, NodeId, PlaceholderRole, PlanNode, ProjectItem};

/// Simplify a whole tree bottom-up
pub fn simplify(plan: PlanNode) -> PlanNode {
    plan.transform_up(&mut simplify_node)
}

/// Simplify one node whose children are already simplified
fn simplify_node(node: PlanNode) -> PlanNode {
    match node {
        PlanNode::Project { input, items } => {
            if input.is_empty_relation() {
                return PlanNode::empty(items.len());
            }
            if is_identity_projection(&items, input.arity()) {
                return *input;
            }
            match *input {
                PlanNode::Project {
                    input: inner,
                    items: inner_items,
                } => {
                    let composed = compose(&inner_items, &items);
                    simplify_node(PlanNode::Project {
                        input: inner,
                        items: composed,
                    })
                }
                other => PlanNode::Project {
                    input: Box::new(other),
                    items,
                },
            }
        }

        PlanNode::ConstEq {
            input,
            column,
            value,
        } => {
            if input.is_empty_relation() {
                return *input;
            }
            let repeated = match input.as_ref() {
                PlanNode::ConstEq {
                    column: c, value: v, ..
                } if *c == column => Some(*v == value),
                _ => None,
            };
            match repeated {
                Some(true) => *input,
                Some(false) => PlanNode::empty(input.arity()),
                None => PlanNode::ConstEq {
                    input,
                    column,
                    value,
                },
            }
        }

        PlanNode::VarEq { input, left, right } => {
            if input.is_empty_relation() || left == right {
                *input
            } else {
                PlanNode::VarEq { input, left, right }
            }
        }

        PlanNode::Join {
            left,
            right,
            left_keys,
            right_keys,
        } => {
            if left.is_empty_relation() || right.is_empty_relation() {
                PlanNode::empty(left.arity() + right.arity())
            } else {
                PlanNode::Join {
                    left,
                    right,
                    left_keys,
                    right_keys,
                }
            }
        }

        PlanNode::AntiJoin {
            left,
            right,
            left_keys,
            right_keys,
        } => {
            if left.is_empty_relation() || right.is_empty_relation() {
                *left
            } else {
                PlanNode::AntiJoin {
                    left,
                    right,
                    left_keys,
                    right_keys,
                }
            }
        }

        PlanNode::Union { inputs, arity } => simplify_union(inputs, arity),

        PlanNode::Sort { input, columns } => {
            if input.is_empty_relation() {
                *input
            } else {
                PlanNode::Sort { input, columns }
            }
        }

        PlanNode::Recursion {
            id,
            exit,
            recursive,
        } => simplify_recursion(id, *exit, *recursive),

        PlanNode::Materialization {
            id,
            reused,
            main,
            reuse,
        } => {
            if !main.references(id) {
                *main
            } else if reused.is_empty_relation() {
                let arity = reused.arity();
                simplify(substitute(*main, id, &|_| Some(PlanNode::empty(arity))))
            } else {
                PlanNode::Materialization {
                    id,
                    reused,
                    main,
                    reuse,
                }
            }
        }

        PlanNode::MultiOutput {
            id,
            input,
            branches,
            main,
        } => {
            if !main.references(id) {
                *main
            } else if input.is_empty_relation() {
                let input_arity = input.arity();
                let empty_branch = |role: PlaceholderRole| match role {
                    PlaceholderRole::Branch(i) => branches
                        .get(i)
                        .map(|b| PlanNode::empty(b.arity(input_arity))),
                    _ => None,
                };
                simplify(substitute(*main, id, &empty_branch))
            } else {
                PlanNode::MultiOutput {
                    id,
                    input,
                    branches,
                    main,
                }
            }
        }

        other => other,
    }
}

/// `outer` applied to the output of `inner`
pub(crate) fn compose(inner: &[ProjectItem], outer: &[ProjectItem]) -> Vec<ProjectItem> {
    outer
        .iter()
        .map(|item| match item {
            ProjectItem::Column(c) => inner[*c].clone(),
            ProjectItem::Literal(v) => ProjectItem::Literal(v.clone()),
        })
        .collect()
}

fn simplify_union(inputs: Vec<PlanNode>, arity: usize) -> PlanNode {
    let mut flat: Vec<PlanNode> = Vec::with_capacity(inputs.len());
    for input in inputs {
        let nested = match input {
            PlanNode::Union { inputs, .. } => inputs,
            other => vec![other],
        };
        for child in nested {
            if !child.is_empty_relation() && !flat.contains(&child) {
                flat.push(child);
            }
        }
    }
    match flat.len() {
        1 => flat.pop().unwrap_or_else(|| PlanNode::empty(arity)),
        _ => PlanNode::Union {
            inputs: flat,
            arity,
        },
    }
}

fn is_own_placeholder(node: &PlanNode, id: NodeId) -> bool {
    matches!(
        node,
        PlanNode::Placeholder { producer, role: PlaceholderRole::Delta | PlaceholderRole::Full, .. }
            if *producer == id
    )
}

fn simplify_recursion(id: NodeId, exit: PlanNode, recursive: PlanNode) -> PlanNode {
    let arity = exit.arity();
    let recursive = match recursive {
        node if is_own_placeholder(&node, id) => PlanNode::empty(arity),
        PlanNode::Union { inputs, arity } => simplify_union(
            inputs
                .into_iter()
                .filter(|input| !is_own_placeholder(input, id))
                .collect(),
            arity,
        ),
        other => other,
    };

    if !recursive.references(id) {
        return simplify_union(vec![exit, recursive], arity);
    }

    if exit.is_empty_relation() {
        let first_round = simplify(substitute(recursive.clone(), id, &|role| match role {
            PlaceholderRole::Delta | PlaceholderRole::Full => Some(PlanNode::empty(arity)),
            _ => None,
        }));
        if first_round.is_empty_relation() {
            return PlanNode::empty(arity);
        }
    }

    PlanNode::Recursion {
        id,
        exit: Box::new(exit),
        recursive: Box::new(recursive),
    }
}

/// Replace the placeholders of producer `id` visible from `node`
///
/// Nested producers with the same id shadow the outer one.
fn substitute(
    node: PlanNode,
    id: NodeId,
    replacement: &dyn Fn(PlaceholderRole) -> Option<PlanNode>,
) -> PlanNode {
    match node {
        PlanNode::Placeholder { producer, role, .. } if producer == id => {
            replacement(role).unwrap_or(node)
        }
        shadowing if shadowing.producer_id() == Some(id) => {
            let mut index = 0;
            shadowing.map_children(|child| {
                let i = index;
                index += 1;
                if i == 0 {
                    substitute(child, id, replacement)
                } else {
                    child
                }
            })
        }
        other => other.map_children(|child| substitute(child, id, replacement)),
    }
}
