//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - bashlog.toml (default configuration)
//! - bashlog.local.toml (git-ignored local overrides)
//! - Environment variables (BASHLOG_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # bashlog.toml
//! [compiler]
//! scratch_dir = "/tmp/bashlog"
//! input_dir = "data"
//!
//! [optimization]
//! background_materialization = true
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! BASHLOG_COMPILER__SCRATCH_DIR=/custom/path
//! BASHLOG_OPTIMIZATION__ENABLE_MATERIALIZATION=false
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub optimization: OptimizationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings that shape the generated script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Directory for intermediate artifacts, created by the script
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,

    /// Directory holding `<relation>.tsv` for every base relation
    #[serde(default = "default_input_dir")]
    pub input_dir: String,

    /// Sort invocation, stored in `$sort` by the script prologue
    #[serde(default = "default_sort_command")]
    pub sort_command: String,

    /// Emit `#` comments naming the plan node behind each fragment
    #[serde(default)]
    pub comments: bool,
}

/// Optimization toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Greedy left-deep join reordering
    #[serde(default = "default_true")]
    pub enable_join_reordering: bool,

    /// Merge filter/project branches over one input into a single scan
    #[serde(default = "default_true")]
    pub enable_filter_combination: bool,

    /// Cache repeated subplans
    #[serde(default = "default_true")]
    pub enable_materialization: bool,

    /// Run expensive materializations as background jobs guarded by a lock
    #[serde(default)]
    pub background_materialization: bool,

    /// Minimum cost (sorts plus joins in the cached plan) for a background job
    #[serde(default = "default_background_min_cost")]
    pub background_min_cost: usize,

    /// Run the plan validator after every stage and log its findings
    #[serde(default = "default_true")]
    pub validate_stages: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_scratch_dir() -> String {
    "tmp".to_string()
}
fn default_input_dir() -> String {
    ".".to_string()
}
fn default_sort_command() -> String {
    "sort -S64M --parallel=2".to_string()
}
fn default_background_min_cost() -> usize {
    4
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. bashlog.toml (base configuration)
    /// 2. bashlog.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (BASHLOG_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("bashlog.toml"))
            .merge(Toml::file("bashlog.local.toml"))
            .merge(Env::prefixed("BASHLOG_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("BASHLOG_").split("__"))
            .extract()
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            scratch_dir: default_scratch_dir(),
            input_dir: default_input_dir(),
            sort_command: default_sort_command(),
            comments: false,
        }
    }
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        OptimizationConfig {
            enable_join_reordering: true,
            enable_filter_combination: true,
            enable_materialization: true,
            background_materialization: false,
            background_min_cost: default_background_min_cost(),
            validate_stages: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
