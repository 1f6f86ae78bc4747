//! Plan validator.
//!
//! Checks arity bookkeeping and placeholder scoping. It never changes the
//! tree; the pipeline only logs what it reports.

use super::scope::{Path, ScopeTable};
use super::{PlaceholderRole, PlanNode, ProjectItem};

/// A structural problem found in a plan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationViolation {
    #[error("{kind} at {path:?} reads column {column} of an arity-{arity} input")]
    ColumnOutOfRange {
        path: Path,
        kind: &'static str,
        column: usize,
        arity: usize,
    },

    #[error("{kind} at {path:?} has {left} left keys but {right} right keys")]
    KeyCountMismatch {
        path: Path,
        kind: &'static str,
        left: usize,
        right: usize,
    },

    #[error("{kind} at {path:?} expects arity {expected}, child has {found}")]
    ArityMismatch {
        path: Path,
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("placeholder at {path:?} has no enclosing producer")]
    UnresolvedPlaceholder { path: Path },

    #[error("placeholder at {path:?} does not match its producer: {reason}")]
    PlaceholderMismatch { path: Path, reason: String },
}

/// Validate `plan`, returning every violation found
pub fn validate_plan(plan: &PlanNode) -> Vec<ValidationViolation> {
    let mut violations = Vec::new();
    let mut path = Vec::new();
    check_node(plan, &mut path, &mut violations);

    let scopes = ScopeTable::build(plan);
    for path in scopes.unresolved() {
        violations.push(ValidationViolation::UnresolvedPlaceholder { path: path.clone() });
    }
    let mut bindings: Vec<_> = scopes.bindings().collect();
    bindings.sort();
    for (placeholder_path, producer_path) in bindings {
        if let (Some(placeholder), Some(producer)) =
            (plan.at_path(placeholder_path), plan.at_path(producer_path))
        {
            if let Some(reason) = placeholder_mismatch(placeholder, producer) {
                violations.push(ValidationViolation::PlaceholderMismatch {
                    path: placeholder_path.clone(),
                    reason,
                });
            }
        }
    }
    violations
}

fn placeholder_mismatch(placeholder: &PlanNode, producer: &PlanNode) -> Option<String> {
    let PlanNode::Placeholder { role, arity, .. } = placeholder else {
        return None;
    };
    let expected = match (role, producer) {
        (
            PlaceholderRole::Delta | PlaceholderRole::Full,
            PlanNode::Recursion { exit, .. } | PlanNode::SortRecursion { exit, .. },
        ) => exit.arity(),
        (PlaceholderRole::Reuse, PlanNode::Materialization { reused, .. }) => reused.arity(),
        (PlaceholderRole::Branch(i), PlanNode::MultiOutput { input, branches, .. }) => {
            match branches.get(*i) {
                Some(branch) => branch.arity(input.arity()),
                None => return Some(format!("branch {i} of {} does not exist", branches.len())),
            }
        }
        (role, producer) => {
            return Some(format!("role {role} cannot refer to {}", producer.kind()));
        }
    };
    (expected != *arity).then(|| format!("arity {arity}, producer yields {expected}"))
}

fn check_node(node: &PlanNode, path: &mut Path, out: &mut Vec<ValidationViolation>) {
    let kind = node.kind();
    let column = |column: usize, arity: usize, out: &mut Vec<ValidationViolation>| {
        if column >= arity {
            out.push(ValidationViolation::ColumnOutOfRange {
                path: path.clone(),
                kind,
                column,
                arity,
            });
        }
    };

    match node {
        PlanNode::Project { input, items } => {
            for item in items {
                if let ProjectItem::Column(c) = item {
                    column(*c, input.arity(), out);
                }
            }
        }
        PlanNode::ConstEq { input, column: c, .. } => column(*c, input.arity(), out),
        PlanNode::VarEq { input, left, right } => {
            column(*left, input.arity(), out);
            column(*right, input.arity(), out);
        }
        PlanNode::Join {
            left,
            right,
            left_keys,
            right_keys,
        }
        | PlanNode::AntiJoin {
            left,
            right,
            left_keys,
            right_keys,
        } => {
            if left_keys.len() != right_keys.len() {
                out.push(ValidationViolation::KeyCountMismatch {
                    path: path.clone(),
                    kind,
                    left: left_keys.len(),
                    right: right_keys.len(),
                });
            }
            for k in left_keys {
                column(*k, left.arity(), out);
            }
            for k in right_keys {
                column(*k, right.arity(), out);
            }
        }
        PlanNode::SortJoin {
            left,
            right,
            left_key,
            right_key,
            output,
        } => {
            column(*left_key, left.arity(), out);
            column(*right_key, right.arity(), out);
            for c in output {
                let arity = match c.side {
                    super::Side::Left => left.arity(),
                    super::Side::Right => right.arity(),
                };
                column(c.column, arity, out);
            }
        }
        PlanNode::SortAntiJoin {
            left,
            right,
            left_key,
            right_key,
        } => {
            column(*left_key, left.arity(), out);
            column(*right_key, right.arity(), out);
        }
        PlanNode::Union { inputs, arity } => {
            for input in inputs {
                if input.arity() != *arity {
                    out.push(ValidationViolation::ArityMismatch {
                        path: path.clone(),
                        kind,
                        expected: *arity,
                        found: input.arity(),
                    });
                }
            }
        }
        PlanNode::Sort {
            input,
            columns: Some(cols),
        } => {
            for c in cols {
                column(*c, input.arity(), out);
            }
        }
        PlanNode::CombinedColumn { input, columns } => {
            for c in columns {
                column(*c, input.arity(), out);
            }
        }
        PlanNode::MultiFilter {
            input,
            branches,
            arity,
        } => {
            for branch in branches {
                if branch.arity(input.arity()) != *arity {
                    out.push(ValidationViolation::ArityMismatch {
                        path: path.clone(),
                        kind,
                        expected: *arity,
                        found: branch.arity(input.arity()),
                    });
                }
            }
        }
        PlanNode::Recursion {
            exit, recursive, ..
        }
        | PlanNode::SortRecursion {
            exit, recursive, ..
        } => {
            if exit.arity() != recursive.arity() {
                out.push(ValidationViolation::ArityMismatch {
                    path: path.clone(),
                    kind,
                    expected: exit.arity(),
                    found: recursive.arity(),
                });
            }
        }
        _ => {}
    }

    for (i, child) in node.children().into_iter().enumerate() {
        path.push(i);
        check_node(child, path, out);
        path.pop();
    }
}
