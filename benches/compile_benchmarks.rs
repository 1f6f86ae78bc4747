//! Compilation benchmarks: join chains, recursion and the reference evaluator.

use bashlog::ast::builders::RuleBuilder;
use bashlog::evaluator::{evaluate, Inputs};
use bashlog::subplan_sharing::materialize;
use bashlog::{Compiler, Config, Program};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::time::Duration;

/// `hop{n}(x0, xn) :- edge(x0, x1), ..., edge(x{n-1}, xn)`
fn chain_program(length: usize) -> Program {
    let vars: Vec<String> = (0..=length).map(|i| format!("x{i}")).collect();
    let mut builder = RuleBuilder::new("hop").head_vars([vars[0].as_str(), vars[length].as_str()]);
    for i in 0..length {
        builder = builder.body_atom("edge", [vars[i].as_str(), vars[i + 1].as_str()]);
    }
    let mut program = Program::new();
    program.add_rule(builder.build());
    program
}

/// `size` relations, each the transitive closure over the previous one
fn layered_closure(size: usize) -> Program {
    let mut program = Program::new();
    for layer in 0..size {
        let name = format!("reach{layer}");
        let base = if layer == 0 {
            "edge".to_string()
        } else {
            format!("reach{}", layer - 1)
        };
        program.add_rule(
            RuleBuilder::new(&name)
                .head_vars(["x", "y"])
                .body_atom(&base, ["x", "y"])
                .build(),
        );
        program.add_rule(
            RuleBuilder::new(&name)
                .head_vars(["x", "z"])
                .body_atom(&name, ["x", "y"])
                .body_atom(&base, ["y", "z"])
                .build(),
        );
    }
    program
}

fn bench_join_chain(c: &mut Criterion) {
    let compiler = Compiler::new(Config::default());
    let mut group = c.benchmark_group("compile_join_chain");
    for length in [2usize, 4, 8] {
        let program = chain_program(length);
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, _| {
            b.iter(|| compiler.compile_program(black_box(&program), "hop").unwrap());
        });
    }
    group.finish();
}

fn bench_layered_recursion(c: &mut Criterion) {
    let compiler = Compiler::new(Config::default());
    let mut group = c.benchmark_group("compile_layered_recursion");
    for size in [1usize, 3, 6] {
        let program = layered_closure(size);
        let query = format!("reach{}", size - 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| compiler.compile_program(black_box(&program), &query).unwrap());
        });
    }
    group.finish();
}

fn bench_materialization(c: &mut Criterion) {
    let compiler = Compiler::new(Config::default());
    let program = layered_closure(4);
    let lowered = compiler
        .compile_program(&program, "reach3")
        .unwrap()
        .trace
        .stage("lower_backend")
        .cloned()
        .unwrap();
    c.bench_function("materialize_layered_recursion", |b| {
        b.iter(|| materialize(black_box(lowered.clone())));
    });
}

fn bench_evaluate_closure(c: &mut Criterion) {
    let compiler = Compiler::new(Config::default());
    let plan = compiler
        .compile_program(&layered_closure(1), "reach0")
        .unwrap()
        .plan;
    let mut group = c.benchmark_group("evaluate_closure");
    for size in [20u32, 60] {
        let edges: Vec<Vec<String>> = (1..size)
            .map(|i| vec![i.to_string(), (i + 1).to_string()])
            .collect();
        let inputs = Inputs::new().with_table("edge", edges).with_table_files(".");
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| evaluate(black_box(&plan), &inputs).unwrap());
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1));
    targets = bench_join_chain, bench_layered_recursion, bench_materialization, bench_evaluate_closure
}
criterion_main!(benches);
