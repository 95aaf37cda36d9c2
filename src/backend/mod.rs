//! Target-language code generators.
//!
//! Each backend renders a whole flow into one self-contained unit of source text:
//! a Python module, an ES module, a Rust module or a Solidity contract. Expression
//! text always comes from the shared [`ExprCompiler`](crate::compiler::ExprCompiler);
//! a backend only decides statement syntax.

use crate::compiler::Unit;
use crate::error::FlowError;
use crate::ir::{Flow, STEP_TAGS, Step, Type};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod javascript;
mod python;
mod rust;
mod solidity;

pub use javascript::JavascriptBackend;
pub use python::PythonBackend;
pub use rust::RustBackend;
pub use solidity::SolidityBackend;

/// The target languages a flow can be compiled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Python,
    Javascript,
    Rust,
    Solidity,
}

impl Lang {
    pub const ALL: [Lang; 4] = [Lang::Python, Lang::Javascript, Lang::Rust, Lang::Solidity];

    pub fn as_str(self) -> &'static str {
        match self {
            Lang::Python => "python",
            Lang::Javascript => "javascript",
            Lang::Rust => "rust",
            Lang::Solidity => "solidity",
        }
    }

    /// The file extension generated source is usually saved with.
    pub fn extension(self) -> &'static str {
        match self {
            Lang::Python => "py",
            Lang::Javascript => "js",
            Lang::Rust => "rs",
            Lang::Solidity => "sol",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lang {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Lang::Python),
            "javascript" | "js" => Ok(Lang::Javascript),
            "rust" | "rs" => Ok(Lang::Rust),
            "solidity" | "sol" => Ok(Lang::Solidity),
            other => Err(FlowError::UnsupportedOperation(format!(
                "unknown target language '{}'",
                other
            ))),
        }
    }
}

/// A code generator for one target language.
pub trait Backend: Send + Sync {
    fn lang(&self) -> Lang;

    /// Step tags this backend compiles unless the compiler is configured otherwise.
    fn default_allowed_ops(&self) -> Vec<&'static str> {
        STEP_TAGS.to_vec()
    }

    /// Renders the flow held by `unit` into a complete source file.
    fn generate(&self, unit: &mut Unit<'_>) -> Result<String, FlowError>;
}

/// The four built-in generators.
pub fn default_backends() -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(PythonBackend),
        Box::new(JavascriptBackend),
        Box::new(RustBackend),
        Box::new(SolidityBackend),
    ]
}

/// Whether `pred` holds for any step in `steps` or nested below them.
pub(crate) fn contains_step(steps: &[Step], pred: &dyn Fn(&Step) -> bool) -> bool {
    steps.iter().any(|step| {
        pred(step)
            || step
                .children()
                .into_iter()
                .any(|body| contains_step(body, pred))
    })
}

/// Whether a `map` body has to be awaited rather than fanned out on threads.
pub(crate) fn is_async_map(body: &[Step]) -> bool {
    body.iter().any(Step::has_async_call)
}

/// Whether a top-level write to `name` appends instead of overwriting.
pub(crate) fn appends(flow: &Flow, name: &str) -> bool {
    flow.schema.declared(name) == Some(Type::Array)
}

/// Host functions the flow calls, each once, with the argument names of their first call.
pub(crate) fn host_functions(flow: &Flow) -> IndexMap<&str, &crate::ir::CallSpec> {
    let mut functions = IndexMap::new();
    for call in flow.calls() {
        functions.entry(call.function.as_str()).or_insert(call);
    }
    functions
}
