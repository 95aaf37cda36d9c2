//! # JSONFlow - an IR for small imperative flows
//!
//! **JSONFlow** describes a piece of business logic (assignments, branches,
//! loops, parallel maps, assertions, logging, host calls and recoverable
//! `try` blocks) as a JSON document. The same document can be run directly
//! by the [`Interpreter`](interpreter::Interpreter) or compiled to Python,
//! JavaScript, Rust or Solidity source that behaves the same way.
//!
//! ## Core Workflow
//!
//! 1.  **Load**: parse a document with [`Flow::from_json`](ir::Flow::from_json). Unknown
//!     tags and malformed shapes are rejected before anything runs.
//! 2.  **Analyze** (optional): [`analysis::analyze`] estimates cost, tags
//!     nondeterministic steps and reports which backends would refuse the flow.
//! 3.  **Execute** with [`execute`], or **compile** with [`compile`]. Both have
//!     configurable forms through [`Interpreter::builder`](interpreter::Interpreter::builder)
//!     and [`Compiler::builder`](compiler::Compiler::builder).
//!
//! ## Quick Start
//!
//! ```rust
//! use jsonflow::prelude::*;
//!
//! # fn main() -> Result<(), FlowError> {
//! let flow = Flow::from_json(r#"{
//!     "name": "Square",
//!     "schema": {"context": {"x": "integer", "result": "integer"}},
//!     "steps": [
//!         {"set": {"target": "result", "value": {"mul": [{"get": "x"}, {"get": "x"}]}}},
//!         {"return": {"get": "result"}}
//!     ]
//! }"#)?;
//!
//! let mut inputs = IndexMap::new();
//! inputs.insert("x".to_string(), Value::Integer(5));
//! let run = jsonflow::execute(&flow, inputs)?;
//! assert_eq!(run.result, Some(Value::Integer(25)));
//!
//! let python = jsonflow::compile(&flow, Lang::Python)?;
//! assert!(python.contains("def square(x=0, result=0):"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Diagnostics
//!
//! `log` steps and engine warnings go to a [`DiagnosticSink`](diagnostics::DiagnosticSink).
//! The default sink forwards to `tracing`, so install a subscriber to see them.

pub mod analysis;
pub mod backend;
pub mod compiler;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod evaluator;
pub mod interpreter;
pub mod ir;
pub mod prelude;
pub mod resolver;

use backend::Lang;
use error::FlowError;
use indexmap::IndexMap;
use interpreter::{Execution, Interpreter};
use ir::{Flow, Value};

/// Runs `flow` with the default interpreter: no host functions, diagnostics to `tracing`.
pub fn execute(flow: &Flow, inputs: IndexMap<String, Value>) -> Result<Execution, FlowError> {
    Interpreter::default().execute(flow, inputs)
}

/// Compiles `flow` for `lang` with the default backends and whitelists.
pub fn compile(flow: &Flow, lang: Lang) -> Result<String, FlowError> {
    compiler::Compiler::default().compile(flow, lang)
}
