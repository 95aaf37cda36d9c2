use crate::ir::Flow;
use serde::Serialize;

/// Step tags whose outcome may differ between runs with the same inputs.
pub const NONDETERMINISTIC_OPS: [&str; 3] = ["random", "timestamp", "call"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Determinism {
    pub index: usize,
    pub tag: &'static str,
    pub deterministic: bool,
}

/// Tags each top-level step by its tag alone. Nested bodies are not inspected.
pub fn tag_determinism(flow: &Flow) -> Vec<Determinism> {
    flow.steps
        .iter()
        .enumerate()
        .map(|(index, step)| Determinism {
            index,
            tag: step.tag(),
            deterministic: !NONDETERMINISTIC_OPS.contains(&step.tag()),
        })
        .collect()
}

pub fn is_deterministic(flow: &Flow) -> bool {
    tag_determinism(flow).iter().all(|d| d.deterministic)
}
