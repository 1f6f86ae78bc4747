//! Materialization tests.
//!
//! Caching a subplan must not change what a plan computes, only how often
//! each subplan is evaluated, and every reuse count must match the readers
//! the generated script contains.

use bashlog::ast::builders::RuleBuilder;
use bashlog::code_generator::{BashGenerator, GenContext};
use bashlog::config::CompilerConfig;
use bashlog::evaluator::{evaluate, reads_match_counts, Evaluator, Inputs};
use bashlog::ir::validate::validate_plan;
use bashlog::ir::{JoinColumn, NodeId, PlaceholderRole, ReuseCount};
use bashlog::subplan_sharing::{materialize, SubplanSharer};
use bashlog::{Compiler, PlanNode, Program};
use std::collections::BTreeMap;

fn edge() -> PlanNode {
    PlanNode::file("edge.tsv", 2)
}

fn inputs() -> Inputs {
    Inputs::new().with_file(
        "edge.tsv",
        vec![
            vec!["a", "b"],
            vec!["a", "c"],
            vec!["b", "c"],
            vec!["c", "a"],
            vec!["c", "d"],
        ],
    )
}

fn reuse_counts(plan: &PlanNode, counts: &mut BTreeMap<NodeId, ReuseCount>) {
    if let PlanNode::Materialization { id, reuse, .. } = plan {
        counts.insert(*id, *reuse);
    }
    for child in plan.children() {
        reuse_counts(child, counts);
    }
}

/// Check a materialized plan against the plan it came from
fn assert_transparent(original: &PlanNode, materialized: &PlanNode) {
    assert!(validate_plan(materialized).is_empty(), "{materialized}");

    let inputs = inputs();
    let expected = evaluate(original, &inputs).unwrap();
    let mut evaluator = Evaluator::new(&inputs);
    let actual = evaluator.eval(materialized).unwrap();
    assert_eq!(actual, expected);
    assert!(reads_match_counts(materialized, evaluator.stats()));

    let mut counts = BTreeMap::new();
    reuse_counts(materialized, &mut counts);
    let mut ctx = GenContext::new();
    BashGenerator::new(CompilerConfig::default())
        .generate_with(materialized, &mut ctx)
        .unwrap();
    for (id, count) in counts {
        let readers = ctx.reads().get(&id).copied().unwrap_or(0);
        match count {
            ReuseCount::Finite(n) => assert_eq!(readers, n, "readers of {id}"),
            ReuseCount::Unbounded => assert!(readers >= 1, "readers of {id}"),
        }
    }
}

fn shared() -> PlanNode {
    edge().filter_const(0, "a").sort(None)
}

#[test]
fn test_repeated_subplan() {
    let plan = PlanNode::union_all(
        vec![
            shared(),
            shared().project_columns(&[1, 0]).sort(None),
            edge().sort(None),
        ],
        2,
    );
    let (result, stats) = SubplanSharer::new().analyze(plan.clone());
    assert_eq!(stats.materializations, 1);
    assert!(matches!(
        result,
        PlanNode::Materialization {
            reuse: ReuseCount::Finite(2),
            ..
        }
    ));
    assert_transparent(&plan, &result);
}

#[test]
fn test_three_readers() {
    let plan = PlanNode::union_all(
        vec![
            shared(),
            shared().project_columns(&[1, 0]).sort(None),
            shared().filter_columns(0, 1).sort(None),
        ],
        2,
    );
    let result = materialize(plan.clone());
    let PlanNode::Materialization { reuse, .. } = &result else {
        panic!("expected materialization, got {result}");
    };
    assert_eq!(*reuse, ReuseCount::Finite(3));
    assert_transparent(&plan, &result);
}

#[test]
fn test_loop_invariant_join_input() {
    let delta = PlanNode::placeholder(NodeId(0), PlaceholderRole::Delta, 2);
    let invariant = edge().filter_const(1, "c").sort(Some(vec![0]));
    let step = PlanNode::SortJoin {
        left: Box::new(delta.sort(Some(vec![1]))),
        right: Box::new(invariant),
        left_key: 1,
        right_key: 0,
        output: vec![JoinColumn::left(0), JoinColumn::right(1)],
    }
    .sort(None);
    let plan = PlanNode::SortRecursion {
        id: NodeId(0),
        exit: Box::new(edge().sort(None)),
        recursive: Box::new(step),
    };
    let (result, stats) = SubplanSharer::new().analyze(plan.clone());
    assert_eq!(stats.unbounded, 1);
    assert!(matches!(
        result,
        PlanNode::Materialization {
            reuse: ReuseCount::Unbounded,
            ..
        }
    ));
    assert_transparent(&plan, &result);
}

#[test]
fn test_sharing_disabled_is_identity() {
    let plan = PlanNode::union_all(
        vec![shared(), shared().project_columns(&[1, 0]).sort(None)],
        2,
    );
    let mut sharer = SubplanSharer::new();
    sharer.set_sharing(false);
    assert_eq!(sharer.materialize(plan.clone()), plan);
}

#[test]
fn test_materialization_is_idempotent() {
    let plan = PlanNode::union_all(
        vec![shared(), shared().project_columns(&[1, 0]).sort(None)],
        2,
    );
    let once = materialize(plan);
    assert_eq!(materialize(once.clone()), once);
}

#[test]
fn test_compiled_plans_keep_counts_consistent() {
    let mut program = Program::new();
    program.add_rule(
        RuleBuilder::new("two_hop")
            .head_vars(["x", "z"])
            .body_atom("edge", ["x", "y"])
            .body_atom("edge", ["y", "z"])
            .build(),
    );
    program.add_rule(
        RuleBuilder::new("four_hop")
            .head_vars(["x", "z"])
            .body_atom("two_hop", ["x", "y"])
            .body_atom("two_hop", ["y", "z"])
            .build(),
    );
    program.add_rule(
        RuleBuilder::new("path")
            .head_vars(["x", "y"])
            .body_atom("four_hop", ["x", "y"])
            .build(),
    );
    program.add_rule(
        RuleBuilder::new("path")
            .head_vars(["x", "z"])
            .body_atom("path", ["x", "y"])
            .body_atom("two_hop", ["y", "z"])
            .build(),
    );

    let mut config = bashlog::Config::default();
    config.compiler.input_dir = String::new();
    let compiler = Compiler::new(config);

    for query in ["four_hop", "path"] {
        let compiled = compiler.compile_program(&program, query).unwrap();
        let unshared = compiled
            .trace
            .stage("lower_backend")
            .cloned()
            .unwrap_or_else(|| panic!("no lower_backend stage for {query}"));
        assert_transparent(&unshared, &compiled.plan);
    }
}
