//! # bashlog
//!
//! Compiles one query of a Datalog program into a bash script.
//!
//! ## Usage
//!
//! ```bash
//! # Print the script computing path/2
//! bashlog --program tc.json --query path/2 > path.sh
//!
//! # Include the plan after every compilation stage as comments
//! bashlog --program tc.json --query path --plan --output path.sh
//! ```
//!
//! The program is the JSON form of `bashlog::Program`. Configuration comes
//! from `bashlog.toml`, `bashlog.local.toml` and `BASHLOG_*` variables, or
//! from the file given with `--config`.

use anyhow::Context;
use bashlog::config::LoggingConfig;
use bashlog::{Compiler, Config, Program};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "bashlog", version, about = "Compile Datalog queries to bash scripts")]
struct Args {
    /// Program as JSON
    #[arg(long, short)]
    program: PathBuf,

    /// Relation to compute, as `name/arity` or a bare name
    #[arg(long, short)]
    query: String,

    /// Prepend the plan after every stage as comments
    #[arg(long)]
    plan: bool,

    /// Configuration file (replaces bashlog.toml and bashlog.local.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Write the script here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(&path.to_string_lossy())
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load().context("loading configuration")?,
    };
    init_tracing(&config.logging);

    let text = std::fs::read_to_string(&args.program)
        .with_context(|| format!("reading {}", args.program.display()))?;
    let program = Program::from_json(&text)
        .with_context(|| format!("parsing {}", args.program.display()))?;
    tracing::debug!(rules = program.rules.len(), "program loaded");

    let compiled = Compiler::new(config)
        .compile_program(&program, &args.query)
        .with_context(|| format!("compiling query {}", args.query))?;

    let script = if args.plan {
        compiled.with_plan_comments()
    } else {
        compiled.script
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, script)
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "script written");
        }
        None => print!("{script}"),
    }
    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    // BASHLOG_LOG takes precedence over the configured level
    let level = std::env::var("BASHLOG_LOG").unwrap_or_else(|_| logging_config.level.clone());
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter.clone())
            .with_writer(std::io::stderr)
            .with_target(false)
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if logging_config.format == "json" {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
