//! awk program text for filter, projection and multi-branch scans.
//!
//! Programs are passed to `$awk -v FS=$'\t'` inside single quotes, so string
//! constants are escaped for awk first and for the shell second.

use crate::ir::{Condition, FilterBranch, ProjectItem};
use crate::script::Command;
use std::collections::BTreeMap;

/// `$awk -v FS=<tab> '<program>'`
pub fn awk(program: &str) -> Command {
    Command::new("$awk")
        .arg("-v FS=$'\\t'")
        .arg(format!("'{program}'"))
}

/// Escape `value` for an awk string literal inside a single-quoted program
pub fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\'', "'\\''")
}

/// awk string literal
pub fn literal(value: &str) -> String {
    format!("\"{}\"", escape(value))
}

/// awk field reference for a 0-based column
pub fn field(column: usize) -> String {
    format!("${}", column + 1)
}

pub fn condition(cond: &Condition) -> String {
    match cond {
        Condition::Const { column, value } => format!("{} == {}", field(*column), literal(value)),
        // concatenating "" forces a string comparison
        Condition::Columns { left, right } => {
            format!("{} \"\" == {} \"\"", field(*left), field(*right))
        }
    }
}

/// Output expression of a projection; `None` prints the whole row
pub fn projection(items: Option<&[ProjectItem]>) -> String {
    match items {
        None => "$0".to_string(),
        Some([]) => "\"\"".to_string(),
        Some(items) => items
            .iter()
            .map(|item| match item {
                ProjectItem::Column(c) => field(*c),
                ProjectItem::Literal(v) => literal(v),
            })
            .collect::<Vec<_>>()
            .join(" FS "),
    }
}

/// `(cond && ...) { print out [> "file"] }`
pub fn branch_line(branch: &FilterBranch, target: Option<&str>) -> String {
    let mut line = String::new();
    if !branch.conditions.is_empty() {
        let conds: Vec<String> = branch.conditions.iter().map(condition).collect();
        line.push_str(&format!("({}) ", conds.join(" && ")));
    }
    line.push_str(&print_statement(
        &projection(branch.projection.as_deref()),
        target,
    ));
    line
}

fn print_statement(output: &str, target: Option<&str>) -> String {
    match target {
        Some(file) => format!("{{ print {output} > {} }}", literal(file)),
        None => format!("{{ print {output} }}"),
    }
}

/// Program for a filter/project chain
pub fn chain_program(branch: &FilterBranch) -> String {
    branch_line(branch, None)
}

/// `{ print $0 FS $a "\002" $b }`
pub fn combined_column_program(columns: &[usize]) -> String {
    let key: Vec<String> = columns.iter().map(|c| field(*c)).collect();
    format!("{{ print $0 FS {} }}", key.join(" \"\\002\" "))
}

/// Constant filters of a branch by column, or `None` if it has other
/// conditions or contradicts itself
fn constant_filters(branch: &FilterBranch) -> Option<BTreeMap<usize, &str>> {
    let mut filters = BTreeMap::new();
    for cond in &branch.conditions {
        let Condition::Const { column, value } = cond else {
            return None;
        };
        match filters.insert(*column, value.as_str()) {
            Some(previous) if previous != value.as_str() => return None,
            _ => {}
        }
    }
    (!filters.is_empty()).then_some(filters)
}

/// One scan printing every matching branch to stdout
///
/// Branches that only compare the same columns against constants and print
/// the same projection are answered by one associative-array lookup keyed by
/// those columns.
pub fn multi_filter_program(branches: &[FilterBranch]) -> String {
    type GroupKey<'b> = (Option<&'b [ProjectItem]>, Vec<usize>);
    let mut groups: Vec<(GroupKey<'_>, Vec<Vec<&str>>)> = Vec::new();
    let mut simple: Vec<&FilterBranch> = Vec::new();

    for branch in branches {
        let Some(filters) = constant_filters(branch) else {
            simple.push(branch);
            continue;
        };
        let key: GroupKey<'_> = (
            branch.projection.as_deref(),
            filters.keys().copied().collect(),
        );
        let values: Vec<&str> = filters.values().copied().collect();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(values),
            None => groups.push((key, vec![values])),
        }
    }

    let mut begin = Vec::new();
    let mut lines = Vec::new();
    let mut table = 0;
    for ((output, filter_columns), members) in groups {
        if members.len() < 2 {
            let conditions = filter_columns
                .iter()
                .zip(&members[0])
                .map(|(column, value)| Condition::Const {
                    column: *column,
                    value: (*value).to_string(),
                })
                .collect();
            lines.push(branch_line(
                &FilterBranch {
                    conditions,
                    projection: output.map(<[ProjectItem]>::to_vec),
                },
                None,
            ));
            continue;
        }
        let name = format!("sel{table}");
        table += 1;
        for values in &members {
            let key: Vec<String> = values.iter().map(|v| literal(v)).collect();
            begin.push(format!("{name}[{}] = 1;", key.join(" FS ")));
        }
        let lookup: Vec<String> = filter_columns.iter().map(|c| field(*c)).collect();
        lines.push(format!(
            "(({}) in {name}) {}",
            lookup.join(" FS "),
            print_statement(&projection(output), None)
        ));
    }
    lines.extend(simple.into_iter().map(|b| branch_line(b, None)));

    if begin.is_empty() {
        lines.join(" ")
    } else {
        format!("BEGIN {{ {} }} {}", begin.join(" "), lines.join(" "))
    }
}

/// One scan writing branch `i` to `files[i]`; every file is created even when
/// no row matches
pub fn multi_output_program(branches: &[FilterBranch], files: &[String]) -> String {
    let create: Vec<String> = files
        .iter()
        .map(|f| format!("printf \"\" > {};", literal(f)))
        .collect();
    let lines: Vec<String> = branches
        .iter()
        .zip(files)
        .map(|(b, f)| branch_line(b, Some(f)))
        .collect();
    format!("BEGIN {{ {} }} {}", create.join(" "), lines.join(" "))
}
