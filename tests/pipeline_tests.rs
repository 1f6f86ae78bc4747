//! End-to-end compilation tests.
//!
//! Every program is compiled with several configurations; the final plan must
//! compute, under the reference evaluator, the same rows as the plan the rule
//! builder produced.

use bashlog::ast::builders::RuleBuilder;
use bashlog::evaluator::{evaluate, Inputs, Relation};
use bashlog::ir_builder::IRBuilder;
use bashlog::{CompileError, Compiler, Config, Program, Rule};

fn program(rules: Vec<Rule>) -> Program {
    let mut program = Program::new();
    for rule in rules {
        program.add_rule(rule);
    }
    program
}

fn rows(values: &[&[&str]]) -> Relation {
    values
        .iter()
        .map(|row| row.iter().map(|v| (*v).to_string()).collect())
        .collect()
}

fn path_program() -> Program {
    program(vec![
        RuleBuilder::new("path")
            .head_vars(["x", "y"])
            .body_atom("edge", ["x", "y"])
            .build(),
        RuleBuilder::new("path")
            .head_vars(["x", "z"])
            .body_atom("path", ["x", "y"])
            .body_atom("edge", ["y", "z"])
            .build(),
    ])
}

fn chain_edges() -> Inputs {
    Inputs::new().with_table("edge", vec![vec!["1", "2"], vec!["2", "3"], vec!["3", "4"]])
}

fn configs() -> Vec<(&'static str, Config)> {
    let default = Config::default();

    let mut plain = Config::default();
    plain.optimization.enable_join_reordering = false;
    plain.optimization.enable_filter_combination = false;
    plain.optimization.enable_materialization = false;

    let mut background = Config::default();
    background.optimization.background_materialization = true;
    background.optimization.background_min_cost = 0;

    vec![
        ("default", default),
        ("plain", plain),
        ("background", background),
    ]
}

/// Rows of `query` before and after compilation, for every configuration
fn assert_preserved(program: &Program, query: &str, inputs: Inputs) -> Relation {
    let built = IRBuilder::new(program).build_query(query).unwrap();
    let expected = evaluate(&built, &inputs).unwrap();

    for (name, config) in configs() {
        let input_dir = config.compiler.input_dir.clone();
        let compiled = Compiler::new(config)
            .compile_program(program, query)
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        let files = inputs.clone().with_table_files(&input_dir);
        let actual = evaluate(&compiled.plan, &files).unwrap();
        assert_eq!(actual, expected, "configuration {name}");
        assert_eq!(compiled.trace.stats().violations, 0, "configuration {name}");
    }
    expected
}

#[test]
fn test_transitive_closure() {
    let result = assert_preserved(&path_program(), "path", chain_edges());
    assert_eq!(
        result,
        rows(&[
            &["1", "2"],
            &["1", "3"],
            &["1", "4"],
            &["2", "3"],
            &["2", "4"],
            &["3", "4"],
        ])
    );
}

#[test]
fn test_transitive_closure_of_cycle() {
    let inputs = Inputs::new().with_table("edge", vec![vec!["a", "b"], vec!["b", "a"]]);
    let result = assert_preserved(&path_program(), "path/2", inputs);
    assert_eq!(
        result,
        rows(&[&["a", "a"], &["a", "b"], &["b", "a"], &["b", "b"]])
    );
}

#[test]
fn test_nonlinear_closure() {
    let p = program(vec![
        RuleBuilder::new("tc")
            .head_vars(["x", "y"])
            .body_atom("edge", ["x", "y"])
            .build(),
        RuleBuilder::new("tc")
            .head_vars(["x", "z"])
            .body_atom("tc", ["x", "y"])
            .body_atom("tc", ["y", "z"])
            .build(),
    ]);
    let result = assert_preserved(&p, "tc", chain_edges());
    assert_eq!(result.len(), 6);
}

#[test]
fn test_same_generation() {
    let p = program(vec![
        RuleBuilder::new("sg")
            .head_vars(["x", "y"])
            .body_atom("par", ["x", "p"])
            .body_atom("par", ["y", "p"])
            .build(),
        RuleBuilder::new("sg")
            .head_vars(["x", "y"])
            .body_atom("par", ["x", "a"])
            .body_atom("sg", ["a", "b"])
            .body_atom("par", ["y", "b"])
            .build(),
    ]);
    let inputs = Inputs::new().with_table(
        "par",
        vec![
            vec!["b1", "r"],
            vec!["b2", "r"],
            vec!["c1", "b1"],
            vec!["c2", "b2"],
        ],
    );
    let result = assert_preserved(&p, "sg", inputs);
    assert!(result.contains(&vec!["c1".to_string(), "c2".to_string()]));
    assert!(!result.contains(&vec!["b1".to_string(), "c2".to_string()]));
}

#[test]
fn test_mutual_recursion() {
    let p = program(vec![
        RuleBuilder::new("even")
            .head_vars(["x"])
            .body_atom("zero", ["x"])
            .build(),
        RuleBuilder::new("even")
            .head_vars(["y"])
            .body_atom("odd", ["x"])
            .body_atom("succ", ["x", "y"])
            .build(),
        RuleBuilder::new("odd")
            .head_vars(["y"])
            .body_atom("even", ["x"])
            .body_atom("succ", ["x", "y"])
            .build(),
    ]);
    let inputs = Inputs::new()
        .with_table("zero", vec![vec!["0"]])
        .with_table(
            "succ",
            vec![
                vec!["0", "1"],
                vec!["1", "2"],
                vec!["2", "3"],
                vec!["3", "4"],
            ],
        );
    let result = assert_preserved(&p, "even", inputs.clone());
    assert_eq!(result, rows(&[&["0"], &["2"], &["4"]]));
    let result = assert_preserved(&p, "odd", inputs);
    assert_eq!(result, rows(&[&["1"], &["3"]]));
}

#[test]
fn test_stratified_negation() {
    let mut p = path_program();
    p.add_rule(
        RuleBuilder::new("node")
            .head_vars(["x"])
            .body_atom("edge", ["x", "_"])
            .build(),
    );
    p.add_rule(
        RuleBuilder::new("node")
            .head_vars(["y"])
            .body_atom("edge", ["_", "y"])
            .build(),
    );
    p.add_rule(
        RuleBuilder::new("unreachable")
            .head_vars(["x", "y"])
            .body_atom("node", ["x"])
            .body_atom("node", ["y"])
            .negated_atom("path", ["x", "y"])
            .build(),
    );
    let result = assert_preserved(&p, "unreachable", chain_edges());
    // 16 pairs over four nodes, 6 of them reachable
    assert_eq!(result.len(), 10);
    assert!(result.contains(&vec!["4".to_string(), "1".to_string()]));
}

#[test]
fn test_constants_in_body_and_head() {
    let mut p = path_program();
    p.add_rule(
        RuleBuilder::new("from_one")
            .head_vars(["'src", "y"])
            .body_atom("path", ["'1", "y"])
            .build(),
    );
    let result = assert_preserved(&p, "from_one", chain_edges());
    assert_eq!(
        result,
        rows(&[&["src", "2"], &["src", "3"], &["src", "4"]])
    );
}

#[test]
fn test_union_of_selections_over_one_table() {
    let p = program(vec![
        RuleBuilder::new("picked")
            .head_vars(["y"])
            .body_atom("edge", ["'1", "y"])
            .build(),
        RuleBuilder::new("picked")
            .head_vars(["y"])
            .body_atom("edge", ["'3", "y"])
            .build(),
        RuleBuilder::new("picked")
            .head_vars(["x"])
            .body_atom("edge", ["x", "x"])
            .build(),
    ]);
    let inputs = Inputs::new().with_table(
        "edge",
        vec![vec!["1", "2"], vec!["2", "3"], vec!["3", "4"], vec!["5", "5"]],
    );
    let result = assert_preserved(&p, "picked", inputs);
    assert_eq!(result, rows(&[&["2"], &["4"], &["5"]]));
}

#[test]
fn test_cat_builtin_reads_file() {
    let p = program(vec![RuleBuilder::new("second")
        .head_vars(["y"])
        .bash_command("cat data/pairs.tsv", ["_", "y"])
        .build()]);
    let compiled = Compiler::default().compile_program(&p, "second").unwrap();
    assert!(compiled.script.contains("data/pairs.tsv"));
    let inputs = Inputs::new().with_file("data/pairs.tsv", vec![vec!["a", "b"], vec!["c", "d"]]);
    let result = evaluate(&compiled.plan, &inputs).unwrap();
    assert_eq!(result, rows(&[&["b"], &["d"]]));
}

#[test]
fn test_other_builtin_kept_verbatim() {
    let p = program(vec![RuleBuilder::new("numbers")
        .head_vars(["x"])
        .bash_command("seq 3", ["x"])
        .build()]);
    let compiled = Compiler::default().compile_program(&p, "numbers").unwrap();
    assert!(compiled.script.contains("seq 3"));
}

#[test]
fn test_empty_relation_compiles() {
    let p = program(vec![RuleBuilder::new("none")
        .head_vars(["x"])
        .body_atom("edge", ["x", "'a"])
        .body_atom("edge", ["x", "'b"])
        .body_atom("edge", ["'z", "x"])
        .build()]);
    let result = assert_preserved(&p, "none", chain_edges());
    assert!(result.is_empty());
}

#[test]
fn test_errors_surface_from_driver() {
    let p = path_program();
    let compiler = Compiler::default();
    assert_eq!(
        compiler.compile_program(&p, "missing").unwrap_err(),
        CompileError::UnknownRelation("missing".to_string())
    );
    assert!(matches!(
        compiler.compile_program(&p, "path/3"),
        Err(CompileError::UnknownRelation(_))
    ));
}
