//! Backend lowering.
//!
//! Rewrites the abstract nodes the shell tools cannot run into their sorted
//! counterparts:
//!
//! - `Table` reads `{input_dir}/{name}.tsv`; a `cat <file>` builtin becomes a
//!   file leaf
//! - `Join`/`AntiJoin` become merge joins over inputs sorted on exactly one
//!   key column per side. Several keys are folded into one combined column;
//!   no keys joins on a constant column (cross product)
//! - every union child is sorted and unique so `sort -m` can merge them
//! - the root is sorted and unique
//!
//! Must run after recursion lowering.

use crate::ir::{columns, JoinColumn, PlanNode, ProjectItem};

/// Lower `plan` for the shell backend
pub fn lower_backend(plan: PlanNode, input_dir: &str) -> PlanNode {
    plan.transform_up(&mut |node| lower_node(node, input_dir))
        .into_sorted_unique()
}

fn lower_node(node: PlanNode, input_dir: &str) -> PlanNode {
    match node {
        PlanNode::Table { name, arity } => PlanNode::file(table_path(input_dir, &name), arity),
        PlanNode::Builtin { command, arity } => match cat_file(&command) {
            Some(path) => PlanNode::file(path, arity),
            None => PlanNode::Builtin { command, arity },
        },
        PlanNode::Join {
            left,
            right,
            left_keys,
            right_keys,
        } => lower_join(*left, *right, &left_keys, &right_keys),
        PlanNode::AntiJoin {
            left,
            right,
            left_keys,
            right_keys,
        } => lower_anti_join(*left, *right, &left_keys, &right_keys),
        PlanNode::Union { inputs, arity } => PlanNode::Union {
            inputs: inputs
                .into_iter()
                .map(PlanNode::into_sorted_unique)
                .collect(),
            arity,
        },
        PlanNode::Sort { input, columns } => drop_redundant_sort(*input, columns),
        other => other,
    }
}

fn table_path(input_dir: &str, name: &str) -> String {
    let dir = input_dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("{name}.tsv")
    } else {
        format!("{dir}/{name}.tsv")
    }
}

/// File read by a command of the form `cat <file>`, optionally quoted
pub fn cat_file(command: &str) -> Option<String> {
    let rest = command.strip_prefix("cat ")?.trim_start();
    let (path, tail) = match rest.chars().next()? {
        quote @ ('"' | '\'') => {
            let end = rest[1..].find(quote)? + 1;
            (&rest[1..end], &rest[end + 1..])
        }
        _ => {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            (&rest[..end], &rest[end..])
        }
    };
    (tail.trim().is_empty() && !path.is_empty()).then(|| path.to_string())
}

/// Sort `input` on `keys` for a merge join, returning the join column
fn join_input(input: PlanNode, keys: &[usize]) -> (PlanNode, usize) {
    let arity = input.arity();
    match keys {
        [key] => (input.sort(Some(vec![*key])), *key),
        [] => {
            let mut items = columns(&(0..arity).collect::<Vec<_>>());
            items.push(ProjectItem::Literal("_".to_string()));
            (input.project(items).sort(Some(vec![arity])), arity)
        }
        _ => {
            let combined = PlanNode::CombinedColumn {
                input: Box::new(input),
                columns: keys.to_vec(),
            };
            (combined.sort(Some(vec![arity])), arity)
        }
    }
}

fn lower_join(left: PlanNode, right: PlanNode, left_keys: &[usize], right_keys: &[usize]) -> PlanNode {
    let output: Vec<JoinColumn> = (0..left.arity())
        .map(JoinColumn::left)
        .chain((0..right.arity()).map(JoinColumn::right))
        .collect();
    let (left, left_key) = join_input(left, left_keys);
    let (right, right_key) = join_input(right, right_keys);
    PlanNode::SortJoin {
        left: Box::new(left),
        right: Box::new(right),
        left_key,
        right_key,
        output,
    }
}

fn lower_anti_join(
    left: PlanNode,
    right: PlanNode,
    left_keys: &[usize],
    right_keys: &[usize],
) -> PlanNode {
    let arity = left.arity();
    let extended = left_keys.len() != 1;
    let (left, left_key) = join_input(left, left_keys);
    let (right, right_key) = join_input(right, right_keys);
    let anti = PlanNode::SortAntiJoin {
        left: Box::new(left),
        right: Box::new(right),
        left_key,
        right_key,
    };
    if extended {
        anti.project_columns(&(0..arity).collect::<Vec<_>>())
    } else {
        anti
    }
}

fn drop_redundant_sort(input: PlanNode, columns: Option<Vec<usize>>) -> PlanNode {
    match (input, columns) {
        (PlanNode::Sort { input, .. }, columns) => drop_redundant_sort(*input, columns),
        (input, None) if input.is_sorted_unique() => input,
        (input, columns) => input.sort(columns),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::validate::validate_plan;

    fn edge() -> PlanNode {
        PlanNode::table("edge", 2)
    }

    fn edge_file() -> PlanNode {
        PlanNode::file("data/edge.tsv", 2)
    }

    #[test]
    fn test_table_reads_input_dir() {
        let lowered = lower_backend(edge(), "data/");
        assert_eq!(lowered, edge_file().sort(None));
        assert_eq!(
            lower_backend(edge(), ""),
            PlanNode::file("edge.tsv", 2).sort(None)
        );
    }

    #[test]
    fn test_cat_builtin_becomes_file() {
        assert_eq!(cat_file("cat data/a.tsv"), Some("data/a.tsv".to_string()));
        assert_eq!(cat_file("cat 'my file.tsv'"), Some("my file.tsv".to_string()));
        assert_eq!(cat_file("cat a.tsv | head"), None);
        assert_eq!(cat_file("grep x a.tsv"), None);
        assert_eq!(cat_file("cat "), None);
    }

    #[test]
    fn test_single_key_join() {
        let plan = edge().join(edge(), vec![1], vec![0]);
        let lowered = lower_backend(plan, "data");
        let expected = PlanNode::SortJoin {
            left: Box::new(edge_file().sort(Some(vec![1]))),
            right: Box::new(edge_file().sort(Some(vec![0]))),
            left_key: 1,
            right_key: 0,
            output: vec![
                JoinColumn::left(0),
                JoinColumn::left(1),
                JoinColumn::right(0),
                JoinColumn::right(1),
            ],
        }
        .sort(None);
        assert_eq!(lowered, expected);
    }

    #[test]
    fn test_multi_key_join_uses_combined_column() {
        let plan = edge().join(edge(), vec![0, 1], vec![1, 0]);
        let lowered = lower_backend(plan, "data");
        let PlanNode::Sort { input, .. } = &lowered else {
            panic!("expected root sort");
        };
        let PlanNode::SortJoin {
            left,
            left_key,
            right_key,
            output,
            ..
        } = input.as_ref()
        else {
            panic!("expected sort join");
        };
        assert_eq!((*left_key, *right_key), (2, 2));
        assert_eq!(output.len(), 4);
        assert!(matches!(left.as_ref(), PlanNode::Sort { input, .. }
            if matches!(input.as_ref(), PlanNode::CombinedColumn { .. })));
        assert!(validate_plan(&lowered).is_empty());
    }

    #[test]
    fn test_cross_product_joins_on_constant_column() {
        let plan = edge().join(PlanNode::table("node", 1), vec![], vec![]);
        let lowered = lower_backend(plan, "data");
        assert_eq!(lowered.arity(), 3);
        assert!(lowered.contains(
            &PlanNode::file("data/node.tsv", 1)
                .project(vec![
                    ProjectItem::Column(0),
                    ProjectItem::Literal("_".into())
                ])
                .sort(Some(vec![1]))
        ));
        assert!(validate_plan(&lowered).is_empty());
    }

    #[test]
    fn test_multi_key_anti_join_projects_back() {
        let plan = edge().anti_join(edge(), vec![0, 1], vec![1, 0]);
        let lowered = lower_backend(plan, "data");
        assert_eq!(lowered.arity(), 2);
        let PlanNode::Sort { input, .. } = &lowered else {
            panic!("expected root sort");
        };
        assert!(matches!(input.as_ref(), PlanNode::Project { input, .. }
            if matches!(input.as_ref(), PlanNode::SortAntiJoin { .. })));
    }

    #[test]
    fn test_union_children_sorted_once() {
        let plan = edge().union(edge().filter_const(0, "a").sort(None));
        let lowered = lower_backend(plan, "data");
        assert_eq!(
            lowered,
            PlanNode::union_all(
                vec![
                    edge_file().sort(None),
                    edge_file().filter_const(0, "a").sort(None)
                ],
                2
            )
        );
    }

    #[test]
    fn test_nested_sorts_collapse() {
        let plan = edge().sort(Some(vec![0])).sort(None);
        assert_eq!(lower_backend(plan, "data"), edge_file().sort(None));
    }
}
