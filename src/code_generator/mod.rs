//! # Code Generator
//!
//! Converts a lowered plan into a bash script over `sort`, `join`, `comm` and
//! `awk`.
//!
//! ## Pipeline Position
//!
//! ```text
//! Lowered PlanNode -> [Code Generator] -> Script AST -> bash text
//! ```
//!
//! ## Translation
//!
//! - file leaves are passed by path; filter/project chains become one awk line
//! - `MultiFilter`/`MultiOutput` scan their input once with one awk program
//! - sorts and merge joins map to `$sort` and `join`, unions to `$sort -u -m`
//! - a sorted recursion seeds `full`/`delta` files and loops on
//!   `comm -23` until no new rows appear
//! - a materialization writes its reused plan to a scratch file once; in
//!   background mode readers wait on a `flock` held by the producer
//!
//! Producer artifacts are bound in a [`GenContext`] while their scope child is
//! emitted, so every placeholder reads the artifact of its own producer.

pub mod awk;
pub mod lowering;

pub use lowering::lower_backend;

use crate::config::{CompilerConfig, Config};
use crate::error::{CompileError, CompileResult};
use crate::ir::{JoinColumn, NodeId, PlaceholderRole, PlanNode, Side};
use crate::optimizer::combine_filter::split_chain;
use crate::script::{shell_word, Command, Script, Snippet};
use std::collections::{BTreeMap, HashMap};

/// Where a producer's rows live while its scope is emitted
#[derive(Debug, Clone, PartialEq, Eq)]
enum Artifact {
    Recursion { delta: String, full: String },
    Materialized { file: String, lock: Option<String> },
    Branches(Vec<String>),
}

/// Generation state threaded through one script
#[derive(Debug, Default)]
pub struct GenContext {
    /// Next scratch file index
    counter: usize,
    /// Artifacts of the producers in scope, innermost last
    scopes: HashMap<NodeId, Vec<Artifact>>,
    /// Readers emitted per materialization
    reads: BTreeMap<NodeId, usize>,
    /// Materializations started as background jobs
    background_jobs: usize,
}

impl GenContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_index(&mut self) -> usize {
        let index = self.counter;
        self.counter += 1;
        index
    }

    fn bind(&mut self, id: NodeId, artifact: Artifact) {
        self.scopes.entry(id).or_default().push(artifact);
    }

    fn unbind(&mut self, id: NodeId) {
        if let Some(stack) = self.scopes.get_mut(&id) {
            stack.pop();
        }
    }

    fn artifact(&self, id: NodeId) -> Option<&Artifact> {
        self.scopes.get(&id).and_then(|stack| stack.last())
    }

    /// Number of scratch artifacts allocated so far
    pub fn artifacts(&self) -> usize {
        self.counter
    }

    /// Readers emitted for each materialization
    pub fn reads(&self) -> &BTreeMap<NodeId, usize> {
        &self.reads
    }

    pub fn background_jobs(&self) -> usize {
        self.background_jobs
    }
}

/// Bash code generator
#[derive(Debug, Clone)]
pub struct BashGenerator {
    config: CompilerConfig,
    /// Minimum cost of a background materialization, if enabled
    background_min_cost: Option<usize>,
}

impl BashGenerator {
    pub fn new(config: CompilerConfig) -> Self {
        BashGenerator {
            config,
            background_min_cost: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut generator = BashGenerator::new(config.compiler.clone());
        if config.optimization.background_materialization {
            generator.background_min_cost = Some(config.optimization.background_min_cost);
        }
        generator
    }

    /// Run materializations costing at least `min_cost` in the background
    pub fn with_background(mut self, min_cost: usize) -> Self {
        self.background_min_cost = Some(min_cost);
        self
    }

    /// Script header: strict mode, error propagation and tool selection
    pub fn prologue(&self) -> Vec<String> {
        vec![
            "#!/usr/bin/env bash".to_string(),
            "# generated by bashlog".to_string(),
            "set -eEo pipefail".to_string(),
            "trap 'kill -TERM $$' ERR".to_string(),
            "export LC_ALL=C".to_string(),
            format!("mkdir -p {}", shell_word(&self.config.scratch_dir)),
            "if [ -z \"${awk:-}\" ]; then if type mawk > /dev/null 2>&1; then awk=\"mawk\"; else awk=\"awk\"; fi; fi"
                .to_string(),
            format!("sort={}", shell_word(&self.config.sort_command)),
        ]
    }

    /// Generate the script printing the rows of `plan`
    pub fn generate(&self, plan: &PlanNode) -> CompileResult<Script> {
        let mut ctx = GenContext::new();
        let script = self.generate_with(plan, &mut ctx)?;
        tracing::debug!(
            artifacts = ctx.artifacts(),
            materializations = ctx.reads().len(),
            background = ctx.background_jobs(),
            "script generated"
        );
        Ok(script)
    }

    /// Generate with a caller-provided context, e.g. to inspect read counts
    pub fn generate_with(&self, plan: &PlanNode, ctx: &mut GenContext) -> CompileResult<Script> {
        let mut body = self.compile_node(plan, ctx)?;
        if ctx.background_jobs > 0 {
            body = Snippet::Sequence(vec![body, Snippet::text("wait")]);
        }
        Ok(Script::new(self.prologue(), body))
    }

    fn scratch(&self, name: &str) -> String {
        let dir = self.config.scratch_dir.trim_end_matches('/');
        format!("{dir}/{name}")
    }

    fn comment(&self, items: &mut Vec<Snippet>, text: impl FnOnce() -> String) {
        if self.config.comments {
            items.push(Snippet::Comment(text()));
        }
    }

    /// Translate one node
    pub fn compile_node(&self, plan: &PlanNode, ctx: &mut GenContext) -> CompileResult<Snippet> {
        match plan {
            PlanNode::File { path, .. } => Ok(Snippet::file(path.clone())),
            PlanNode::Builtin { command, .. } => Ok(Snippet::text(command.clone())),
            PlanNode::Project { .. } | PlanNode::ConstEq { .. } | PlanNode::VarEq { .. } => {
                let (source, branch) = split_chain(plan);
                let input = self.compile_node(source, ctx)?;
                Ok(input.pipe_into(awk::awk(&awk::chain_program(&branch))))
            }
            PlanNode::Sort { input, columns } => {
                let arity = input.arity();
                let input = self.compile_node(input, ctx)?;
                Ok(input.pipe_into(sort_command(columns.as_deref(), arity)))
            }
            PlanNode::CombinedColumn { input, columns } => {
                let input = self.compile_node(input, ctx)?;
                Ok(input.pipe_into(awk::awk(&awk::combined_column_program(columns))))
            }
            PlanNode::SortJoin {
                left,
                right,
                left_key,
                right_key,
                output,
            } => {
                let out = if output.is_empty() {
                    "0".to_string()
                } else {
                    join_output(output)
                };
                let join = Command::new("join")
                    .arg("-t $'\\t'")
                    .arg(format!("-1 {}", left_key + 1))
                    .arg(format!("-2 {}", right_key + 1))
                    .arg(format!("-o {out}"))
                    .input(self.compile_node(left, ctx)?)
                    .input(self.compile_node(right, ctx)?);
                let join = Snippet::from(join);
                if output.is_empty() {
                    Ok(join.pipe_into(awk::awk("{ print \"\" }")))
                } else {
                    Ok(join)
                }
            }
            PlanNode::SortAntiJoin {
                left,
                right,
                left_key,
                right_key,
            } => {
                let out: Vec<String> = (1..=left.arity()).map(|c| format!("1.{c}")).collect();
                let join = Command::new("join")
                    .arg("-t $'\\t'")
                    .arg("-v 1")
                    .arg(format!("-1 {}", left_key + 1))
                    .arg(format!("-2 {}", right_key + 1))
                    .arg(format!("-o {}", out.join(",")))
                    .input(self.compile_node(left, ctx)?)
                    .input(self.compile_node(right, ctx)?);
                Ok(join.into())
            }
            PlanNode::Union { inputs, .. } if inputs.is_empty() => Ok(Snippet::text("true")),
            PlanNode::Union { inputs, .. } => {
                let mut merge = Command::new("$sort").arg("-u").arg("-m");
                for input in inputs {
                    merge = merge.input(self.compile_node(input, ctx)?);
                }
                Ok(merge.into())
            }
            PlanNode::MultiFilter {
                input, branches, ..
            } => {
                let input = self.compile_node(input, ctx)?;
                Ok(input.pipe_into(awk::awk(&awk::multi_filter_program(branches))))
            }
            PlanNode::MultiOutput {
                id,
                input,
                branches,
                main,
            } => self.multi_output(*id, input, branches, main, ctx),
            PlanNode::SortRecursion {
                id,
                exit,
                recursive,
            } => self.recursion(*id, exit, recursive, ctx),
            PlanNode::Materialization {
                id,
                reused,
                main,
                reuse,
            } => {
                let mut items = Vec::new();
                self.comment(&mut items, || format!("materialization {id}, read {reuse}"));
                self.materialization(*id, reused, main, items, ctx)
            }
            PlanNode::Placeholder { producer, role, .. } => self.placeholder(*producer, *role, ctx),
            PlanNode::Table { .. }
            | PlanNode::Join { .. }
            | PlanNode::AntiJoin { .. }
            | PlanNode::Recursion { .. } => Err(CompileError::Unlowered {
                node: plan.kind().to_string(),
            }),
        }
    }

    fn multi_output(
        &self,
        id: NodeId,
        input: &PlanNode,
        branches: &[crate::ir::FilterBranch],
        main: &PlanNode,
        ctx: &mut GenContext,
    ) -> CompileResult<Snippet> {
        let index = ctx.next_index();
        let files: Vec<String> = (0..branches.len())
            .map(|k| self.scratch(&format!("mo{index}_{k}")))
            .collect();
        let scan = self
            .compile_node(input, ctx)?
            .pipe_into(awk::awk(&awk::multi_output_program(branches, &files)));

        ctx.bind(id, Artifact::Branches(files));
        let main = self.compile_node(main, ctx);
        ctx.unbind(id);

        let mut items = Vec::new();
        self.comment(&mut items, || format!("one scan for {} branches {id}", branches.len()));
        items.push(scan);
        items.push(main?);
        Ok(Snippet::Sequence(items))
    }

    fn recursion(
        &self,
        id: NodeId,
        exit: &PlanNode,
        recursive: &PlanNode,
        ctx: &mut GenContext,
    ) -> CompileResult<Snippet> {
        let index = ctx.next_index();
        let full = self.scratch(&format!("full{index}"));
        let delta = self.scratch(&format!("delta{index}"));
        let new = self.scratch(&format!("new{index}"));

        let exit = self.compile_node(exit, ctx)?;
        ctx.bind(
            id,
            Artifact::Recursion {
                delta: delta.clone(),
                full: full.clone(),
            },
        );
        let step = self.compile_node(recursive, ctx);
        ctx.unbind(id);
        let step = step?;

        let (full_w, delta_w, new_w) = (shell_word(&full), shell_word(&delta), shell_word(&new));
        let seed = stream(exit, Command::new("tee").arg(full_w.clone())).redirect_to(&delta);
        let difference = Snippet::from(
            Command::new("comm")
                .arg("--nocheck-order")
                .arg("-23")
                .input(step)
                .input(Snippet::file(full.clone())),
        )
        .redirect_to(&new);
        let body = Snippet::Sequence(vec![
            difference,
            Snippet::text(format!("if [ ! -s {new_w} ]; then break; fi")),
            Snippet::text(format!("mv {new_w} {delta_w}")),
            Snippet::text(format!("$sort -u --merge -o {full_w} {full_w} {delta_w}")),
        ]);

        let mut items = Vec::new();
        self.comment(&mut items, || format!("recursion {id}"));
        items.push(seed);
        items.push(Snippet::Block {
            header: "while true; do".to_string(),
            body: Box::new(body),
            footer: "done".to_string(),
        });
        items.push(Snippet::text(format!("rm -f {delta_w} {new_w}")));
        items.push(Snippet::file(full));
        Ok(Snippet::Sequence(items))
    }

    fn materialization(
        &self,
        id: NodeId,
        reused: &PlanNode,
        main: &PlanNode,
        mut items: Vec<Snippet>,
        ctx: &mut GenContext,
    ) -> CompileResult<Snippet> {
        let index = ctx.next_index();
        let file = self.scratch(&format!("mat{index}"));
        let background = self
            .background_min_cost
            .is_some_and(|min| background_cost(reused) >= min);

        let produce = self.compile_node(reused, ctx)?.redirect_to(&file);
        let lock = if background {
            let lock = format!("{file}.lock");
            let fd = format!("mat{index}_lock");
            items.push(Snippet::text(format!("exec {{{fd}}}> {}", shell_word(&lock))));
            items.push(Snippet::text(format!("flock -x \"${fd}\"")));
            // braces keep the job a bash subshell running the ERR trap; a
            // bare command would be exec'd and fail silently
            items.push(Snippet::Wrap {
                prefix: "{ ".to_string(),
                body: Box::new(produce),
                suffix: "; } &".to_string(),
            });
            items.push(Snippet::text(format!("exec {{{fd}}}>&-")));
            ctx.background_jobs += 1;
            Some(lock)
        } else {
            items.push(produce);
            None
        };

        ctx.reads.entry(id).or_insert(0);
        ctx.bind(id, Artifact::Materialized { file, lock });
        let main = self.compile_node(main, ctx);
        ctx.unbind(id);
        items.push(main?);
        Ok(Snippet::Sequence(items))
    }

    fn placeholder(
        &self,
        producer: NodeId,
        role: PlaceholderRole,
        ctx: &mut GenContext,
    ) -> CompileResult<Snippet> {
        let Some(artifact) = ctx.artifact(producer).cloned() else {
            return Err(CompileError::MalformedPlan(format!(
                "placeholder {producer} ({role}) outside the scope of its producer"
            )));
        };
        match (artifact, role) {
            (Artifact::Recursion { delta, .. }, PlaceholderRole::Delta) => Ok(Snippet::file(delta)),
            (Artifact::Recursion { full, .. }, PlaceholderRole::Full) => Ok(Snippet::file(full)),
            (Artifact::Materialized { file, lock }, PlaceholderRole::Reuse) => {
                *ctx.reads.entry(producer).or_insert(0) += 1;
                Ok(match lock {
                    Some(lock) => Command::new("flock")
                        .arg("-s")
                        .arg(shell_word(&lock))
                        .arg("cat")
                        .arg(shell_word(&file))
                        .into(),
                    None => Snippet::file(file),
                })
            }
            (Artifact::Branches(files), PlaceholderRole::Branch(i)) => files
                .get(i)
                .map(|f| Snippet::file(f.clone()))
                .ok_or_else(|| {
                    CompileError::MalformedPlan(format!(
                        "placeholder {producer} reads branch {i} of {}",
                        files.len()
                    ))
                }),
            (_, role) => Err(CompileError::MalformedPlan(format!(
                "placeholder {producer} has role {role}, which its producer does not provide"
            ))),
        }
    }
}

/// Feed `snippet` to `command` on standard input
fn stream(snippet: Snippet, command: Command) -> Snippet {
    match snippet {
        Snippet::Pipe(mut stages) => {
            stages.push(command.into());
            Snippet::Pipe(stages)
        }
        other => Snippet::Pipe(vec![other, command.into()]),
    }
}

/// `$sort` on `columns`; unique only when the keys span every column
fn sort_command(columns: Option<&[usize]>, arity: usize) -> Command {
    let sort = Command::new("$sort");
    let Some(columns) = columns else {
        return sort.arg("-u");
    };
    let mut sort = sort.arg("-t $'\\t'");
    for c in columns {
        sort = sort.arg(format!("-k {0},{0}", c + 1));
    }
    if (0..arity).all(|c| columns.contains(&c)) {
        sort = sort.arg("-u");
    }
    sort
}

/// `join -o` list
fn join_output(output: &[JoinColumn]) -> String {
    output
        .iter()
        .map(|c| match c.side {
            Side::Left => format!("1.{}", c.column + 1),
            Side::Right => format!("2.{}", c.column + 1),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Sorts and merge joins in `plan`, the work a background job saves
pub fn background_cost(plan: &PlanNode) -> usize {
    let own = usize::from(matches!(
        plan,
        PlanNode::Sort { .. }
            | PlanNode::SortJoin { .. }
            | PlanNode::SortAntiJoin { .. }
            | PlanNode::SortRecursion { .. }
    ));
    own + plan
        .children()
        .into_iter()
        .map(background_cost)
        .sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ReuseCount;

    fn generator() -> BashGenerator {
        BashGenerator::new(CompilerConfig::default())
    }

    fn edge() -> PlanNode {
        PlanNode::file("data/edge.tsv", 2)
    }

    fn body(plan: &PlanNode) -> String {
        let mut ctx = GenContext::new();
        generator().compile_node(plan, &mut ctx).unwrap().render()
    }

    #[test]
    fn test_prologue() {
        let header = generator().prologue();
        assert_eq!(header[0], "#!/usr/bin/env bash");
        assert!(header.contains(&"set -eEo pipefail".to_string()));
        assert!(header.contains(&"trap 'kill -TERM $$' ERR".to_string()));
        assert!(header.contains(&"export LC_ALL=C".to_string()));
        assert!(header.contains(&"mkdir -p tmp".to_string()));
        assert!(header.contains(&"sort='sort -S64M --parallel=2'".to_string()));
    }

    #[test]
    fn test_filter_project_chain_is_one_awk_line() {
        let plan = edge().filter_const(0, "a").project_columns(&[1]);
        assert_eq!(
            body(&plan),
            "$awk -v FS=$'\\t' '($1 == \"a\") { print $2 }' data/edge.tsv"
        );
    }

    #[test]
    fn test_sort_flags() {
        assert_eq!(body(&edge().sort(None)), "$sort -u data/edge.tsv");
        assert_eq!(
            body(&edge().sort(Some(vec![1]))),
            "$sort -t $'\\t' -k 2,2 data/edge.tsv"
        );
        assert_eq!(
            body(&edge().sort(Some(vec![1, 0]))),
            "$sort -t $'\\t' -k 2,2 -k 1,1 -u data/edge.tsv"
        );
    }

    #[test]
    fn test_sort_join() {
        let plan = PlanNode::SortJoin {
            left: Box::new(edge().sort(Some(vec![1]))),
            right: Box::new(edge().sort(Some(vec![0]))),
            left_key: 1,
            right_key: 0,
            output: vec![JoinColumn::left(0), JoinColumn::right(1)],
        };
        assert_eq!(
            body(&plan),
            "join -t $'\\t' -1 2 -2 1 -o 1.1,2.2 \\\n  <($sort -t $'\\t' -k 2,2 data/edge.tsv) \\\n  <($sort -t $'\\t' -k 1,1 data/edge.tsv)"
        );
    }

    #[test]
    fn test_sort_anti_join_keeps_left_columns() {
        let plan = PlanNode::SortAntiJoin {
            left: Box::new(edge()),
            right: Box::new(PlanNode::file("bad.tsv", 1)),
            left_key: 0,
            right_key: 0,
        };
        assert_eq!(
            body(&plan),
            "join -t $'\\t' -v 1 -1 1 -2 1 -o 1.1,1.2 data/edge.tsv bad.tsv"
        );
    }

    #[test]
    fn test_union() {
        assert_eq!(body(&PlanNode::empty(2)), "true");
        let plan = PlanNode::union_all(vec![edge(), PlanNode::file("b.tsv", 2)], 2);
        assert_eq!(body(&plan), "$sort -u -m data/edge.tsv b.tsv");
    }

    #[test]
    fn test_recursion_loop() {
        let step = PlanNode::placeholder(NodeId(0), PlaceholderRole::Delta, 2).sort(None);
        let plan = PlanNode::SortRecursion {
            id: NodeId(0),
            exit: Box::new(edge().sort(None)),
            recursive: Box::new(step),
        };
        let text = body(&plan);
        let expected = "$sort -u data/edge.tsv |\n  tee tmp/full0 > tmp/delta0\n\
            while true; do\n  \
            comm --nocheck-order -23 \\\n    <($sort -u tmp/delta0) tmp/full0 > tmp/new0\n  \
            if [ ! -s tmp/new0 ]; then break; fi\n  \
            mv tmp/new0 tmp/delta0\n  \
            $sort -u --merge -o tmp/full0 tmp/full0 tmp/delta0\n\
            done\n\
            rm -f tmp/delta0 tmp/new0\n\
            cat tmp/full0";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_materialization_reads_file() {
        let reuse = PlanNode::placeholder(NodeId(3), PlaceholderRole::Reuse, 2);
        let plan = PlanNode::Materialization {
            id: NodeId(3),
            reused: Box::new(edge().sort(None)),
            main: Box::new(PlanNode::union_all(vec![reuse.clone(), reuse], 2)),
            reuse: ReuseCount::Finite(2),
        };
        let mut ctx = GenContext::new();
        let text = generator().compile_node(&plan, &mut ctx).unwrap().render();
        assert_eq!(
            text,
            "$sort -u data/edge.tsv > tmp/mat0\n$sort -u -m tmp/mat0 tmp/mat0"
        );
        assert_eq!(ctx.reads()[&NodeId(3)], 2);
    }

    #[test]
    fn test_background_materialization_uses_lock() {
        let reuse = PlanNode::placeholder(NodeId(1), PlaceholderRole::Reuse, 2);
        let plan = PlanNode::Materialization {
            id: NodeId(1),
            reused: Box::new(edge().sort(None)),
            main: Box::new(reuse),
            reuse: ReuseCount::Finite(1),
        };
        let generator = generator().with_background(1);
        let script = generator.generate(&plan).unwrap().render();
        assert!(script.contains("exec {mat0_lock}> tmp/mat0.lock\n"));
        assert!(script.contains("flock -x \"$mat0_lock\"\n"));
        assert!(script.contains("$sort -u data/edge.tsv > tmp/mat0 &\n"));
        assert!(script.contains("exec {mat0_lock}>&-\n"));
        assert!(script.contains("flock -s tmp/mat0.lock cat tmp/mat0\n"));
        assert!(script.trim_end().ends_with("wait"));
    }

    #[test]
    fn test_multi_output_binds_branch_files() {
        let branch = |v: &str| crate::ir::FilterBranch {
            conditions: vec![crate::ir::Condition::Const {
                column: 0,
                value: v.to_string(),
            }],
            projection: None,
        };
        let plan = PlanNode::MultiOutput {
            id: NodeId(0),
            input: Box::new(edge()),
            branches: vec![branch("a"), branch("b")],
            main: Box::new(PlanNode::union_all(
                vec![
                    PlanNode::placeholder(NodeId(0), PlaceholderRole::Branch(0), 2),
                    PlanNode::placeholder(NodeId(0), PlaceholderRole::Branch(1), 2),
                ],
                2,
            )),
        };
        let text = body(&plan);
        assert!(text.contains("> \"tmp/mo0_0\""));
        assert!(text.ends_with("$sort -u -m tmp/mo0_0 tmp/mo0_1"));
    }

    #[test]
    fn test_unlowered_node_is_named() {
        let plan = PlanNode::table("edge", 2);
        let mut ctx = GenContext::new();
        assert_eq!(
            generator().compile_node(&plan, &mut ctx),
            Err(CompileError::Unlowered {
                node: "Table".to_string()
            })
        );
        let join = edge().join(edge(), vec![0], vec![0]);
        assert!(matches!(
            generator().compile_node(&join, &mut ctx),
            Err(CompileError::Unlowered { node }) if node == "Join"
        ));
    }

    #[test]
    fn test_placeholder_outside_scope_is_malformed() {
        let plan = PlanNode::placeholder(NodeId(7), PlaceholderRole::Delta, 2);
        let mut ctx = GenContext::new();
        assert!(matches!(
            generator().compile_node(&plan, &mut ctx),
            Err(CompileError::MalformedPlan(_))
        ));
    }

    #[test]
    fn test_comments_when_enabled() {
        let config = CompilerConfig {
            comments: true,
            ..CompilerConfig::default()
        };
        let plan = PlanNode::SortRecursion {
            id: NodeId(2),
            exit: Box::new(edge().sort(None)),
            recursive: Box::new(PlanNode::placeholder(NodeId(2), PlaceholderRole::Delta, 2)),
        };
        let mut ctx = GenContext::new();
        let text = BashGenerator::new(config)
            .compile_node(&plan, &mut ctx)
            .unwrap()
            .render();
        assert!(text.starts_with("# recursion #2\n"));
    }

    #[test]
    fn test_background_cost_counts_sorts_and_joins() {
        let plan = PlanNode::SortJoin {
            left: Box::new(edge().sort(Some(vec![0]))),
            right: Box::new(edge().sort(Some(vec![0]))),
            left_key: 0,
            right_key: 0,
            output: vec![JoinColumn::left(0)],
        };
        assert_eq!(background_cost(&plan), 3);
        assert_eq!(background_cost(&edge()), 0);
    }
}
