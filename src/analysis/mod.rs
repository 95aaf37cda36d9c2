//! Passes that run over a flow before it is executed or compiled.
//!
//! All three look at the top-level steps only; bodies nested inside `if`,
//! `forEach`, `map` or `try` are not visited. Results are side tables keyed by
//! step position and never modify the flow.

mod cost;
mod determinism;
mod whitelist;

pub use cost::{CostReport, StepCost, estimate_cost, step_cost};
pub use determinism::{Determinism, NONDETERMINISTIC_OPS, is_deterministic, tag_determinism};
pub use whitelist::{OpsWhitelist, used_ops, validate_ops};

use crate::ir::Flow;
use serde::Serialize;

/// Every pass over one flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub cost: CostReport,
    pub determinism: Vec<Determinism>,
    pub used_ops: Vec<&'static str>,
    /// Backends whose whitelist rejects the flow, with the tags each rejects.
    pub unsupported: Vec<(String, Vec<String>)>,
}

/// Runs the cost, determinism and whitelist passes against the built-in backends.
pub fn analyze(flow: &Flow) -> AnalysisReport {
    analyze_with(flow, &OpsWhitelist::builtin())
}

pub fn analyze_with(flow: &Flow, whitelist: &OpsWhitelist) -> AnalysisReport {
    let unsupported = crate::backend::Lang::ALL
        .into_iter()
        .filter_map(|lang| match whitelist.check(flow, lang) {
            Err(crate::error::FlowError::BackendUnsupported { backend, ops }) => {
                Some((backend, ops))
            }
            _ => None,
        })
        .collect();
    AnalysisReport {
        cost: estimate_cost(flow),
        determinism: tag_determinism(flow),
        used_ops: used_ops(flow).into_iter().collect(),
        unsupported,
    }
}
