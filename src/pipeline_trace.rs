//! # Pipeline Trace
//!
//! Records the plan after every compilation stage, for debugging how a query
//! is rewritten on its way to the script.
//!
//! The trace can be rendered on its own or as `#` comments prepended to the
//! generated script (`bashlog --plan`).

use crate::ir::validate::ValidationViolation;
use crate::ir::PlanNode;
use std::fmt;

/// Plan after one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: String,
    pub plan: PlanNode,
    /// What the validator reported for `plan`, if it ran
    pub violations: Vec<ValidationViolation>,
}

/// Statistics about the whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationStats {
    /// Nodes in the first recorded plan
    pub nodes_before: usize,
    /// Nodes in the last recorded plan
    pub nodes_after: usize,
    /// Stages whose output changed the plan
    pub stages_changed: usize,
    /// Validator findings over all stages
    pub violations: usize,
}

/// Trace of pipeline stages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineTrace {
    pub stages: Vec<StageRecord>,
}

impl PipelineTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the plan produced by `stage`
    pub fn record(&mut self, stage: &str, plan: &PlanNode, violations: Vec<ValidationViolation>) {
        self.stages.push(StageRecord {
            stage: stage.to_string(),
            plan: plan.clone(),
            violations,
        });
    }

    /// Plan after the last run of `stage`
    pub fn stage(&self, stage: &str) -> Option<&PlanNode> {
        self.stages
            .iter()
            .rev()
            .find(|r| r.stage == stage)
            .map(|r| &r.plan)
    }

    pub fn final_plan(&self) -> Option<&PlanNode> {
        self.stages.last().map(|r| &r.plan)
    }

    pub fn stats(&self) -> OptimizationStats {
        let changed = self
            .stages
            .windows(2)
            .filter(|pair| pair[0].plan != pair[1].plan)
            .count();
        OptimizationStats {
            nodes_before: self.stages.first().map_or(0, |r| r.plan.node_count()),
            nodes_after: self.stages.last().map_or(0, |r| r.plan.node_count()),
            stages_changed: changed,
            violations: self.stages.iter().map(|r| r.violations.len()).sum(),
        }
    }

    /// Format the trace for display
    pub fn format_trace(&self) -> String {
        let mut output = String::new();
        for (i, record) in self.stages.iter().enumerate() {
            output.push_str(&format!(
                "== {}. {} ({} nodes) ==\n",
                i + 1,
                record.stage,
                record.plan.node_count()
            ));
            for line in record.plan.pretty_print(0).lines() {
                output.push_str(line);
                output.push('\n');
            }
            for violation in &record.violations {
                output.push_str(&format!("!! {violation}\n"));
            }
        }
        let stats = self.stats();
        output.push_str(&format!(
            "== {} -> {} nodes, {} stages changed the plan ==\n",
            stats.nodes_before, stats.nodes_after, stats.stages_changed
        ));
        output
    }

    /// The trace as shell comment lines
    pub fn to_comments(&self) -> Vec<String> {
        self.format_trace()
            .lines()
            .map(|line| format!("# {line}").trim_end().to_string())
            .collect()
    }
}

impl fmt::Display for PipelineTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_trace())
    }
}
