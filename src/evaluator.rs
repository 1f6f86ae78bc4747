//! # Reference Evaluator
//!
//! In-memory interpreter of every plan node with set semantics. It is the
//! oracle the compiled scripts are checked against and lets library users run
//! a plan without a shell.
//!
//! Sorts are no-ops on sets; lowered joins use their single key columns and
//! output mapping exactly like `join` does. Recursions run the same semi-naive
//! protocol as the generated loop ([`new_delta`] / [`merge_delta`]).

use crate::error::{CompileError, CompileResult};
use crate::ir::{JoinColumn, NodeId, PlaceholderRole, PlanNode, ProjectItem, ReuseCount, Side};
use crate::recursion::{merge_delta, new_delta, Row};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Set of rows
pub type Relation = BTreeSet<Row>;

/// Base data for the leaves of a plan
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    tables: HashMap<String, Relation>,
    files: HashMap<String, Relation>,
    commands: HashMap<String, Relation>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of the base relation `name`
    pub fn with_table<R, V>(mut self, name: &str, rows: R) -> Self
    where
        R: IntoIterator<Item = Vec<V>>,
        V: Into<String>,
    {
        self.tables.insert(name.to_string(), to_relation(rows));
        self
    }

    /// Rows stored in the file at `path`
    pub fn with_file<R, V>(mut self, path: &str, rows: R) -> Self
    where
        R: IntoIterator<Item = Vec<V>>,
        V: Into<String>,
    {
        self.files.insert(path.to_string(), to_relation(rows));
        self
    }

    /// Rows printed by the shell command `command`
    pub fn with_command<R, V>(mut self, command: &str, rows: R) -> Self
    where
        R: IntoIterator<Item = Vec<V>>,
        V: Into<String>,
    {
        self.commands.insert(command.to_string(), to_relation(rows));
        self
    }

    /// Register every table also as the file `{input_dir}/{name}.tsv`, the
    /// path lowering gives it
    pub fn with_table_files(mut self, input_dir: &str) -> Self {
        let dir = input_dir.trim_end_matches('/');
        for (name, rows) in &self.tables {
            let path = if dir.is_empty() {
                format!("{name}.tsv")
            } else {
                format!("{dir}/{name}.tsv")
            };
            self.files.insert(path, rows.clone());
        }
        self
    }

    pub fn tables(&self) -> impl Iterator<Item = (&String, &Relation)> {
        self.tables.iter()
    }
}

fn to_relation<R, V>(rows: R) -> Relation
where
    R: IntoIterator<Item = Vec<V>>,
    V: Into<String>,
{
    rows.into_iter()
        .map(|row| row.into_iter().map(Into::into).collect())
        .collect()
}

/// Work done while evaluating one plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalStats {
    /// Nodes evaluated, counting re-evaluations inside recursions
    pub node_evaluations: usize,
    /// Fixpoint rounds, summed over all recursions
    pub iterations: usize,
    /// Times each materialized plan was computed
    pub materialized: BTreeMap<NodeId, usize>,
    /// Reads of each materialized plan
    pub reads: BTreeMap<NodeId, usize>,
}

#[derive(Debug, Clone)]
enum Binding {
    Recursion { delta: Relation, full: Relation },
    Materialized(Relation),
    Branches(Vec<Relation>),
}

/// Plan interpreter
#[derive(Debug)]
pub struct Evaluator<'i> {
    inputs: &'i Inputs,
    scopes: HashMap<NodeId, Vec<Binding>>,
    stats: EvalStats,
}

impl<'i> Evaluator<'i> {
    pub fn new(inputs: &'i Inputs) -> Self {
        Evaluator {
            inputs,
            scopes: HashMap::new(),
            stats: EvalStats::default(),
        }
    }

    pub fn stats(&self) -> &EvalStats {
        &self.stats
    }

    /// Rows of `plan`
    pub fn eval(&mut self, plan: &PlanNode) -> CompileResult<Relation> {
        self.stats.node_evaluations += 1;
        match plan {
            PlanNode::Table { name, .. } => {
                Ok(self.inputs.tables.get(name).cloned().unwrap_or_default())
            }
            PlanNode::File { path, .. } => Ok(self.inputs.files.get(path).cloned().unwrap_or_default()),
            PlanNode::Builtin { command, .. } => self
                .inputs
                .commands
                .get(command)
                .cloned()
                .ok_or_else(|| CompileError::UnsupportedBuiltin(command.clone())),
            PlanNode::Project { input, items } => {
                let rows = self.eval(input)?;
                Ok(rows.iter().map(|row| project(row, items)).collect())
            }
            PlanNode::ConstEq {
                input,
                column,
                value,
            } => {
                let rows = self.eval(input)?;
                Ok(rows
                    .into_iter()
                    .filter(|row| row.get(*column) == Some(value))
                    .collect())
            }
            PlanNode::VarEq { input, left, right } => {
                let rows = self.eval(input)?;
                Ok(rows
                    .into_iter()
                    .filter(|row| row.get(*left) == row.get(*right))
                    .collect())
            }
            PlanNode::Join {
                left,
                right,
                left_keys,
                right_keys,
            } => {
                let (l, r) = (self.eval(left)?, self.eval(right)?);
                let index = index_by(&r, right_keys);
                let mut out = Relation::new();
                for row in &l {
                    for other in index.get(&key(row, left_keys)).into_iter().flatten() {
                        out.insert(row.iter().chain(other.iter()).cloned().collect());
                    }
                }
                Ok(out)
            }
            PlanNode::AntiJoin {
                left,
                right,
                left_keys,
                right_keys,
            } => {
                let (l, r) = (self.eval(left)?, self.eval(right)?);
                let index = index_by(&r, right_keys);
                Ok(l.into_iter()
                    .filter(|row| !index.contains_key(&key(row, left_keys)))
                    .collect())
            }
            PlanNode::Union { inputs, .. } => {
                let mut out = Relation::new();
                for input in inputs {
                    out.extend(self.eval(input)?);
                }
                Ok(out)
            }
            PlanNode::Sort { input, .. } => self.eval(input),
            PlanNode::CombinedColumn { input, columns } => {
                let rows = self.eval(input)?;
                Ok(rows
                    .into_iter()
                    .map(|mut row| {
                        let combined = key(&row, columns).join("\u{2}");
                        row.push(combined);
                        row
                    })
                    .collect())
            }
            PlanNode::SortJoin {
                left,
                right,
                left_key,
                right_key,
                output,
            } => {
                let (l, r) = (self.eval(left)?, self.eval(right)?);
                let index = index_by(&r, &[*right_key]);
                let mut out = Relation::new();
                for row in &l {
                    for other in index.get(&key(row, &[*left_key])).into_iter().flatten() {
                        out.insert(join_output(row, other, output));
                    }
                }
                Ok(out)
            }
            PlanNode::SortAntiJoin {
                left,
                right,
                left_key,
                right_key,
            } => {
                let (l, r) = (self.eval(left)?, self.eval(right)?);
                let index = index_by(&r, &[*right_key]);
                Ok(l.into_iter()
                    .filter(|row| !index.contains_key(&key(row, &[*left_key])))
                    .collect())
            }
            PlanNode::MultiFilter {
                input, branches, ..
            } => {
                let rows = self.eval(input)?;
                Ok(rows
                    .iter()
                    .flat_map(|row| branches.iter().filter_map(|b| b.apply(row)))
                    .collect())
            }
            PlanNode::MultiOutput {
                id,
                input,
                branches,
                main,
            } => {
                let rows = self.eval(input)?;
                let outputs = branches
                    .iter()
                    .map(|b| rows.iter().filter_map(|row| b.apply(row)).collect())
                    .collect();
                self.scoped(*id, Binding::Branches(outputs), main)
            }
            PlanNode::Recursion {
                id,
                exit,
                recursive,
            }
            | PlanNode::SortRecursion {
                id,
                exit,
                recursive,
            } => self.fixpoint(*id, exit, recursive),
            PlanNode::Materialization {
                id, reused, main, ..
            } => {
                let rows = self.eval(reused)?;
                *self.stats.materialized.entry(*id).or_insert(0) += 1;
                self.scoped(*id, Binding::Materialized(rows), main)
            }
            PlanNode::Placeholder { producer, role, .. } => self.placeholder(*producer, *role),
        }
    }

    fn scoped(&mut self, id: NodeId, binding: Binding, plan: &PlanNode) -> CompileResult<Relation> {
        self.scopes.entry(id).or_default().push(binding);
        let result = self.eval(plan);
        if let Some(stack) = self.scopes.get_mut(&id) {
            stack.pop();
        }
        result
    }

    fn fixpoint(&mut self, id: NodeId, exit: &PlanNode, recursive: &PlanNode) -> CompileResult<Relation> {
        let mut full = self.eval(exit)?;
        let mut delta = full.clone();
        loop {
            self.stats.iterations += 1;
            let binding = Binding::Recursion {
                delta,
                full: full.clone(),
            };
            let step = self.scoped(id, binding, recursive)?;
            let fresh = new_delta(&step, &full);
            if fresh.is_empty() {
                return Ok(full);
            }
            merge_delta(&mut full, &fresh);
            delta = fresh;
        }
    }

    fn placeholder(&mut self, producer: NodeId, role: PlaceholderRole) -> CompileResult<Relation> {
        let binding = self
            .scopes
            .get(&producer)
            .and_then(|stack| stack.last())
            .ok_or_else(|| {
                CompileError::MalformedPlan(format!("placeholder {producer} ({role}) is unbound"))
            })?;
        let rows = match (binding, role) {
            (Binding::Recursion { delta, .. }, PlaceholderRole::Delta) => delta.clone(),
            (Binding::Recursion { full, .. }, PlaceholderRole::Full) => full.clone(),
            (Binding::Materialized(rows), PlaceholderRole::Reuse) => rows.clone(),
            (Binding::Branches(outputs), PlaceholderRole::Branch(i)) => {
                outputs.get(i).cloned().ok_or_else(|| {
                    CompileError::MalformedPlan(format!("placeholder {producer} reads missing branch {i}"))
                })?
            }
            (_, role) => {
                return Err(CompileError::MalformedPlan(format!(
                    "placeholder {producer} has role {role}, which its producer does not provide"
                )))
            }
        };
        if role == PlaceholderRole::Reuse {
            *self.stats.reads.entry(producer).or_insert(0) += 1;
        }
        Ok(rows)
    }
}

/// Evaluate `plan` over `inputs`
pub fn evaluate(plan: &PlanNode, inputs: &Inputs) -> CompileResult<Relation> {
    Evaluator::new(inputs).eval(plan)
}

fn project(row: &[String], items: &[ProjectItem]) -> Row {
    items
        .iter()
        .map(|item| match item {
            ProjectItem::Column(c) => row.get(*c).cloned().unwrap_or_default(),
            ProjectItem::Literal(v) => v.clone(),
        })
        .collect()
}

fn key(row: &[String], columns: &[usize]) -> Vec<String> {
    columns
        .iter()
        .map(|c| row.get(*c).cloned().unwrap_or_default())
        .collect()
}

fn index_by<'r>(rows: &'r Relation, columns: &[usize]) -> HashMap<Vec<String>, Vec<&'r Row>> {
    let mut index: HashMap<Vec<String>, Vec<&Row>> = HashMap::new();
    for row in rows {
        index.entry(key(row, columns)).or_default().push(row);
    }
    index
}

fn join_output(left: &[String], right: &[String], output: &[JoinColumn]) -> Row {
    output
        .iter()
        .map(|c| {
            let row = match c.side {
                Side::Left => left,
                Side::Right => right,
            };
            row.get(c.column).cloned().unwrap_or_default()
        })
        .collect()
}

/// Whether every materialization in `plan` was read as its reuse count says.
/// An unbounded one is computed once per evaluation of its enclosing
/// recursion (once overall at top level) and read at least once each time.
pub fn reads_match_counts(plan: &PlanNode, stats: &EvalStats) -> bool {
    counts_match(plan, stats, 0)
}

fn counts_match(plan: &PlanNode, stats: &EvalStats, loops: usize) -> bool {
    let ok = match plan {
        PlanNode::Materialization { id, reuse, .. } => {
            let computed = stats.materialized.get(id).copied().unwrap_or(0);
            let reads = stats.reads.get(id).copied().unwrap_or(0);
            match reuse {
                // a producer inside a loop is recomputed each round
                ReuseCount::Finite(n) => computed == 0 || reads == n * computed,
                ReuseCount::Unbounded if loops == 0 => computed == 1 && reads >= 1,
                ReuseCount::Unbounded => computed >= 1 && reads >= computed,
            }
        }
        _ => true,
    };
    let loops = match plan {
        PlanNode::Recursion { .. } | PlanNode::SortRecursion { .. } => loops + 1,
        _ => loops,
    };
    ok && plan
        .children()
        .into_iter()
        .all(|child| counts_match(child, stats, loops))
}
