//! # Bashlog
//!
//! Compiles Datalog programs, recursive rules included, into standalone bash
//! scripts. The generated script uses `sort`, `join`, `comm` and `awk` as its
//! execution engine; no runtime is shipped.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Program (rules)
//!     ↓
//! [IR Builder]              → PlanNode (Recursion, Join, Table, ...)
//!     ↓
//! [Optimizer]               → simplify, push-down, join planning,
//!     ↓                       filter combination
//! [Recursion Lowering]      → SortRecursion
//!     ↓
//! [Backend Lowering]        → SortJoin, SortAntiJoin, File leaves, root sort
//!     ↓
//! [Subplan Sharing]         → Materialization + Placeholder(Reuse)
//!     ↓
//! [Code Generator]          → Script AST
//!     ↓
//! bash script
//! ```
//!
//! Every stage takes a plan and returns a new one. [`Compiler`] runs them in
//! order and records each intermediate plan in a [`PipelineTrace`].
//!
//! ## Usage
//!
//! ```rust
//! use bashlog::ast::builders::RuleBuilder;
//! use bashlog::{Compiler, Config, Program};
//!
//! let mut program = Program::new();
//! program.add_rule(
//!     RuleBuilder::new("path")
//!         .head_vars(["x", "y"])
//!         .body_atom("edge", ["x", "y"])
//!         .build(),
//! );
//! program.add_rule(
//!     RuleBuilder::new("path")
//!         .head_vars(["x", "z"])
//!         .body_atom("path", ["x", "y"])
//!         .body_atom("edge", ["y", "z"])
//!         .build(),
//! );
//!
//! let compiled = Compiler::new(Config::default())
//!     .compile_program(&program, "path")
//!     .unwrap();
//! assert!(compiled.script.starts_with("#!/usr/bin/env bash"));
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `ast` | Rules, atoms and programs |
//! | `ir` | `PlanNode` algebra, placeholder scoping, validator |
//! | `ir_builder` | Rules → initial plan for one query |
//! | `recursion` | Dependency graph, SCCs, recursion lowering |
//! | `optimizer` | Simplify, push-down, filter combination |
//! | `join_planning` | Join lifting and greedy reordering |
//! | `subplan_sharing` | Common subplan materialization |
//! | `code_generator` | Backend lowering and bash generation |
//! | `script` | Script AST and printer |
//! | `evaluator` | In-memory reference semantics |
//! | `pipeline_trace` | Per-stage plan dumps |

// Plan representation
pub mod ast;
pub mod ir;

// Front end
pub mod ir_builder; // rules → PlanNode
pub mod recursion; // SCCs, stratification, semi-naive lowering

// Optimization
pub mod join_planning;
pub mod optimizer;
pub mod subplan_sharing; // materialization / reuse analysis

// Back end
pub mod code_generator;
pub mod script;

// Tooling
pub mod config;
pub mod error;
pub mod evaluator;
pub mod pipeline_trace;

pub use crate::ast::{Atom, BodyPredicate, Program, Rule, Term};
pub use crate::code_generator::BashGenerator;
pub use crate::config::Config;
pub use crate::error::{CompileError, CompileResult};
pub use crate::ir::{NodeId, PlanNode};
pub use crate::optimizer::Optimizer;
pub use crate::pipeline_trace::PipelineTrace;

use crate::code_generator::lower_backend;
use crate::ir::validate::validate_plan;
use crate::ir_builder::IRBuilder;
use crate::recursion::lower_recursion;
use crate::subplan_sharing::SubplanSharer;

/// Output of one compilation
#[derive(Debug, Clone)]
pub struct CompiledScript {
    /// The bash script
    pub script: String,
    /// Plan the script was generated from
    pub plan: PlanNode,
    /// Plan after every stage
    pub trace: PipelineTrace,
}

impl CompiledScript {
    /// The script with the stage trace as comments below the shebang
    pub fn with_plan_comments(&self) -> String {
        let (shebang, rest) = match self.script.split_once('\n') {
            Some((first, rest)) if first.starts_with("#!") => (Some(first), rest),
            _ => (None, self.script.as_str()),
        };
        let mut out = String::new();
        if let Some(line) = shebang {
            out.push_str(line);
            out.push('\n');
        }
        for comment in self.trace.to_comments() {
            out.push_str(&comment);
            out.push('\n');
        }
        out.push_str(rest);
        out
    }
}

/// Compiler driver
///
/// Stateless apart from its configuration; one instance can compile any
/// number of queries.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: Config,
}

impl Compiler {
    pub fn new(config: Config) -> Self {
        Compiler { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Compile the script printing the rows of `query` (`name/arity` or a
    /// bare name)
    pub fn compile_program(&self, program: &Program, query: &str) -> CompileResult<CompiledScript> {
        let plan = IRBuilder::new(program).build_query(query)?;
        tracing::info!(query, nodes = plan.node_count(), "query plan built");
        self.compile_from("build", plan)
    }

    /// Compile a hand-built plan
    pub fn compile_plan(&self, plan: PlanNode) -> CompileResult<CompiledScript> {
        self.compile_from("input", plan)
    }

    /// Run every plan stage without generating code
    pub fn lower(&self, plan: PlanNode, trace: &mut PipelineTrace) -> PlanNode {
        let optimization = &self.config.optimization;
        let optimizer = Optimizer::from_config(optimization);
        let mut plan = optimizer.optimize_with(plan, |stage, current| {
            self.record(trace, stage, current);
        });

        plan = lower_recursion(plan);
        self.record(trace, "lower_recursion", &plan);

        plan = lower_backend(plan, &self.config.compiler.input_dir);
        self.record(trace, "lower_backend", &plan);

        if optimization.enable_materialization {
            let (shared, stats) = SubplanSharer::new().analyze(plan);
            tracing::debug!(
                candidates = stats.candidates,
                materializations = stats.materializations,
                unbounded = stats.unbounded,
                "subplan sharing done"
            );
            plan = shared;
            self.record(trace, "materialize", &plan);
        }
        plan
    }

    fn compile_from(&self, first_stage: &str, plan: PlanNode) -> CompileResult<CompiledScript> {
        let mut trace = PipelineTrace::new();
        self.record(&mut trace, first_stage, &plan);

        let plan = self.lower(plan, &mut trace);
        let script = BashGenerator::from_config(&self.config)
            .generate(&plan)?
            .render();

        let stats = trace.stats();
        tracing::info!(
            nodes_before = stats.nodes_before,
            nodes_after = stats.nodes_after,
            stages_changed = stats.stages_changed,
            bytes = script.len(),
            "compiled"
        );
        Ok(CompiledScript {
            script,
            plan,
            trace,
        })
    }

    fn record(&self, trace: &mut PipelineTrace, stage: &str, plan: &PlanNode) {
        let violations = if self.config.optimization.validate_stages {
            validate_plan(plan)
        } else {
            Vec::new()
        };
        for violation in &violations {
            tracing::warn!(stage, %violation, "plan validation failed");
        }
        trace.record(stage, plan, violations);
    }
}

/// Compile `query` with the default configuration
pub fn compile(program: &Program, query: &str) -> CompileResult<String> {
    Compiler::default()
        .compile_program(program, query)
        .map(|compiled| compiled.script)
}
