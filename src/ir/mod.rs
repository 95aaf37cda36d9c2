//! The flow IR: documents, steps, expressions and the values they produce.
//!
//! Everything in this module is plain data. Behaviour lives in the
//! [`interpreter`](crate::interpreter), the [`analysis`](crate::analysis) passes
//! and the code generators under [`backend`](crate::backend).

mod expression;
mod flow;
mod path;
mod step;
mod types;
mod value;

pub use expression::{ArithOp, CallSpec, CompareOp, Expr, LogicalOp};
pub use flow::{ERROR_BINDING, Flow, Schema};
pub use path::{Path, Segment};
pub use step::{CallStep, LogPart, STEP_TAGS, Step};
pub use types::Type;
pub use value::Value;
