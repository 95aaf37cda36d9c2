use crate::ir::Flow;
use serde::Serialize;
use std::collections::BTreeSet;

/// Relative cost of one step kind.
pub fn step_cost(tag: &str) -> u32 {
    match tag {
        "let" => 1,
        "set" => 2,
        "if" => 2,
        "forEach" => 4,
        "map" => 6,
        "try" => 3,
        "assert" => 2,
        "log" => 1,
        "call" => 5,
        "return" => 1,
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCost {
    pub index: usize,
    pub tag: &'static str,
    pub cost: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostReport {
    /// Sum over the distinct step kinds present at the top level.
    pub total: u32,
    pub per_step: Vec<StepCost>,
}

/// Estimates the cost of a flow from its top-level steps only.
pub fn estimate_cost(flow: &Flow) -> CostReport {
    let per_step: Vec<StepCost> = flow
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| StepCost {
            index,
            tag: step.tag(),
            cost: step_cost(step.tag()),
        })
        .collect();
    let kinds: BTreeSet<&str> = per_step.iter().map(|s| s.tag).collect();
    let total = kinds.into_iter().map(step_cost).sum();
    CostReport { total, per_step }
}
