//! Prelude module for convenient imports
//!
//! Re-exports the types needed to load, run, analyze and compile flows.
//!
//! # Example
//!
//! ```rust
//! use jsonflow::prelude::*;
//!
//! # fn main() -> Result<(), FlowError> {
//! let flow = Flow::from_json(r#"{"steps": [{"return": {"add": [1, 2]}}]}"#)?;
//! let run = Interpreter::default().execute(&flow, IndexMap::new())?;
//! assert_eq!(run.result, Some(Value::Integer(3)));
//! # Ok(())
//! # }
//! ```

// Loading
pub use crate::ir::{Expr, Flow, Path, Schema, Step, Type, Value};

// Running
pub use crate::context::Context;
pub use crate::interpreter::{Execution, Interpreter, InterpreterBuilder};
pub use crate::resolver::{FnResolver, FunctionResolver, NoResolver};

// Analysis and compilation
pub use crate::analysis::{AnalysisReport, OpsWhitelist, analyze};
pub use crate::backend::{Backend, Lang};
pub use crate::compiler::{Compiler, CompilerBuilder};

// Diagnostics and errors
pub use crate::diagnostics::{DiagnosticSink, LogLevel, MemorySink, TracingSink};
pub use crate::error::{ErrorKind, ExternalCallError, FlowError};

pub use indexmap::IndexMap;
