//! Config loading, TOML parsing, and env var override tests.
//!
//! Tests that set `BASHLOG_*` variables only touch fields no other test in
//! this file asserts on.

use bashlog::{Compiler, Config, PlanNode};
use std::env;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, text: &str) -> String {
    let path = dir.path().join("bashlog.toml");
    fs::write(&path, text).unwrap();
    path.to_string_lossy().into_owned()
}

// Default Configuration Tests
#[test]
fn test_config_default_compiler() {
    let config = Config::default();
    assert_eq!(config.compiler.scratch_dir, "tmp");
    assert_eq!(config.compiler.input_dir, ".");
    assert_eq!(config.compiler.sort_command, "sort -S64M --parallel=2");
}

#[test]
fn test_config_default_optimizations_enabled() {
    let config = Config::default();
    assert!(config.optimization.enable_join_reordering);
    assert!(config.optimization.enable_filter_combination);
    assert!(config.optimization.enable_materialization);
    assert!(!config.optimization.background_materialization);
}

// File Loading Tests
#[test]
fn test_config_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[compiler]
scratch_dir = "/scratch/bashlog"
input_dir = "facts"
comments = true

[optimization]
background_materialization = true
background_min_cost = 2

[logging]
level = "debug"
format = "json"
"#,
    );
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.compiler.scratch_dir, "/scratch/bashlog");
    assert_eq!(config.compiler.input_dir, "facts");
    assert!(config.compiler.comments);
    assert!(config.optimization.background_materialization);
    assert_eq!(config.optimization.background_min_cost, 2);
    assert!(config.optimization.enable_materialization);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_config_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let config = Config::from_file(&path.to_string_lossy()).unwrap();
    assert_eq!(config.compiler.input_dir, ".");
    assert!(config.optimization.validate_stages);
}

#[test]
fn test_config_invalid_value_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[optimization]\nbackground_min_cost = \"many\"\n");
    assert!(Config::from_file(&path).is_err());
}

// Environment Override Tests
#[test]
fn test_config_env_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[compiler]\nsort_command = \"sort\"\n");
    env::set_var("BASHLOG_COMPILER__SORT_COMMAND", "gsort -S1G");
    let config = Config::from_file(&path);
    env::remove_var("BASHLOG_COMPILER__SORT_COMMAND");
    assert_eq!(config.unwrap().compiler.sort_command, "gsort -S1G");
}

// Config flows into the compiler
#[test]
fn test_config_shapes_script() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[compiler]\ninput_dir = \"facts\"\nscratch_dir = \"work\"\n");
    let config = Config::from_file(&path).unwrap();
    let compiled = Compiler::new(config)
        .compile_plan(PlanNode::table("edge", 2).filter_const(0, "x"))
        .unwrap();
    assert!(compiled.script.contains("facts/edge.tsv"));
    assert!(compiled.script.contains("mkdir -p work"));
}
