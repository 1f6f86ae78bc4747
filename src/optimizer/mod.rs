//! # Plan Optimizer
//!
//! A fixed, finite sequence of tree-to-tree stages:
//!
//! - simplify, push filters and projects down
//! - lift filters above joins, reorder join chains, simplify, push down
//! - simplify, push down
//! - combine filter branches that scan the same input
//!
//! ```text
//! PlanNode (from IR Builder) -> [Optimizer] -> PlanNode -> Lowering -> Code Gen
//! ```
//!
//! Every stage assumes the ones before it ran; none of them validates its
//! input.

pub mod combine_filter;
pub mod push_down;
pub mod simplify;

pub use combine_filter::combine_filters;
pub use push_down::push_down;
pub use simplify::simplify;

use crate::config::OptimizationConfig;
use crate::ir::PlanNode;
use crate::join_planning::{push_down_joins, reorder_joins};

/// A named plan rewrite
pub type Stage = (&'static str, fn(PlanNode) -> PlanNode);

/// Plan optimizer running a fixed stage list
#[derive(Debug, Clone)]
pub struct Optimizer {
    /// Greedy join reordering
    join_reordering: bool,
    /// MultiFilter / MultiOutput combination
    filter_combination: bool,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    /// Create an optimizer with every stage enabled
    pub fn new() -> Self {
        Optimizer {
            join_reordering: true,
            filter_combination: true,
        }
    }

    /// Create an optimizer honoring the configured toggles
    pub fn from_config(config: &OptimizationConfig) -> Self {
        Optimizer {
            join_reordering: config.enable_join_reordering,
            filter_combination: config.enable_filter_combination,
        }
    }

    /// Stages in the order they run
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = Vec::new();
        stages.push(("simplify", simplify));
        stages.push(("push_down", push_down));
        if self.join_reordering {
            stages.push(("push_down_joins", push_down_joins));
            stages.push(("reorder_joins", reorder_joins));
        }
        for _ in 0..2 {
            stages.push(("simplify", simplify));
            stages.push(("push_down", push_down));
        }
        if self.filter_combination {
            stages.push(("combine_filters", combine_filters));
        }
        stages
    }

    /// Run every stage
    pub fn optimize(&self, plan: PlanNode) -> PlanNode {
        self.optimize_with(plan, |_, _| {})
    }

    /// Run every stage, handing each intermediate plan to `observe`
    pub fn optimize_with(
        &self,
        plan: PlanNode,
        mut observe: impl FnMut(&'static str, &PlanNode),
    ) -> PlanNode {
        let mut current = plan;
        for (name, stage) in self.stages() {
            current = stage(current);
            tracing::trace!(stage = name, nodes = current.node_count(), "optimizer stage done");
            observe(name, &current);
        }
        current
    }
}
