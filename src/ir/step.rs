use super::{CallSpec, Expr, Path, Value};
use crate::diagnostics::LogLevel;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// One IR instruction. Serialized as a single-key object whose key is the step tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Let(IndexMap<String, Expr>),
    Set {
        target: Path,
        value: Expr,
    },
    If {
        condition: Expr,
        #[serde(default, deserialize_with = "one_or_many")]
        then: Vec<Step>,
        #[serde(default, rename = "else", deserialize_with = "one_or_many")]
        otherwise: Vec<Step>,
    },
    ForEach {
        source: Path,
        #[serde(alias = "as")]
        alias: String,
        #[serde(default, deserialize_with = "one_or_many")]
        body: Vec<Step>,
    },
    Map {
        source: Path,
        #[serde(alias = "as")]
        alias: String,
        #[serde(default, deserialize_with = "one_or_many")]
        body: Vec<Step>,
        target: String,
    },
    Try {
        #[serde(default, deserialize_with = "one_or_many")]
        body: Vec<Step>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "optional_one_or_many"
        )]
        catch: Option<Vec<Step>>,
    },
    Assert {
        condition: Expr,
        message: String,
    },
    Log {
        #[serde(default)]
        level: LogLevel,
        message: Vec<LogPart>,
    },
    Call(CallStep),
    Return(Expr),
}

/// A `call` step: a host function invocation whose result is optionally bound to `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStep {
    #[serde(flatten)]
    pub call: CallSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// A piece of a `log` message: either an expression or literal text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogPart {
    Expr(Expr),
    Text(Value),
}

/// Nested bodies may be written as a single step object instead of a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Step>),
    One(Box<Step>),
}

impl From<OneOrMany> for Vec<Step> {
    fn from(steps: OneOrMany) -> Self {
        match steps {
            OneOrMany::Many(steps) => steps,
            OneOrMany::One(step) => vec![*step],
        }
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Step>, D::Error> {
    OneOrMany::deserialize(deserializer).map(Into::into)
}

fn optional_one_or_many<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<Step>>, D::Error> {
    Option::<OneOrMany>::deserialize(deserializer).map(|steps| steps.map(Into::into))
}

/// Tags accepted for step objects in a flow document.
pub const STEP_TAGS: [&str; 10] = [
    "let", "set", "if", "forEach", "map", "try", "assert", "log", "call", "return",
];

impl Step {
    /// The document tag of this step, as used by the analysis passes and backend whitelists.
    pub fn tag(&self) -> &'static str {
        match self {
            Step::Let(_) => "let",
            Step::Set { .. } => "set",
            Step::If { .. } => "if",
            Step::ForEach { .. } => "forEach",
            Step::Map { .. } => "map",
            Step::Try { .. } => "try",
            Step::Assert { .. } => "assert",
            Step::Log { .. } => "log",
            Step::Call(_) => "call",
            Step::Return(_) => "return",
        }
    }

    /// Direct child step sequences (branch, loop and try bodies).
    pub fn children(&self) -> Vec<&[Step]> {
        match self {
            Step::If {
                then, otherwise, ..
            } => vec![then.as_slice(), otherwise.as_slice()],
            Step::ForEach { body, .. } | Step::Map { body, .. } => vec![body.as_slice()],
            Step::Try { body, catch } => {
                let mut seqs = vec![body.as_slice()];
                if let Some(catch) = catch {
                    seqs.push(catch.as_slice());
                }
                seqs
            }
            _ => Vec::new(),
        }
    }

    /// Expressions evaluated directly by this step (not by nested steps).
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            Step::Let(bindings) => bindings.values().collect(),
            Step::Set { value, .. } => vec![value],
            Step::If { condition, .. } | Step::Assert { condition, .. } => vec![condition],
            Step::Log { message, .. } => message
                .iter()
                .filter_map(|part| match part {
                    LogPart::Expr(e) => Some(e),
                    LogPart::Text(_) => None,
                })
                .collect(),
            Step::Call(step) => step.call.args.values().collect(),
            Step::Return(value) => vec![value],
            Step::ForEach { .. } | Step::Map { .. } | Step::Try { .. } => Vec::new(),
        }
    }

    /// Whether this step, or any step nested in it, may suspend on an asynchronous call.
    pub fn has_async_call(&self) -> bool {
        if let Step::Call(step) = self {
            if step.call.is_async {
                return true;
            }
        }
        self.expressions().into_iter().any(Expr::has_async_call)
            || self
                .children()
                .into_iter()
                .any(|steps| steps.iter().any(Step::has_async_call))
    }

    /// Every call made by this step and its nested steps, in document order.
    pub fn collect_calls<'a>(&'a self, calls: &mut Vec<&'a CallSpec>) {
        for expr in self.expressions() {
            expr.collect_calls(calls);
        }
        if let Step::Call(step) = self {
            calls.push(&step.call);
        }
        for steps in self.children() {
            for step in steps {
                step.collect_calls(calls);
            }
        }
    }
}
