//! Direct execution of a flow against a [`Context`].

use crate::context::Context;
use crate::diagnostics::{DiagnosticSink, LogLevel};
use crate::error::FlowError;
use crate::evaluator::Evaluator;
use crate::ir::{ERROR_BINDING, Expr, Flow, LogPart, Path, Step, Type, Value};
use crate::resolver::FunctionResolver;
use indexmap::IndexMap;
use std::sync::Arc;

mod builder;
mod parallel;

pub use builder::InterpreterBuilder;

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// The value of the `return` step that ended the run, if one did.
    pub result: Option<Value>,
    /// The context as the run left it.
    pub context: Context,
}

/// How a step sequence finished.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Control {
    Continue,
    Return(Value),
}

/// Executes flows step by step.
///
/// An interpreter holds no per-run state and can be shared between threads;
/// each call to [`execute`](Self::execute) gets its own context.
pub struct Interpreter {
    resolver: Arc<dyn FunctionResolver>,
    sink: Arc<dyn DiagnosticSink>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Interpreter {
    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder::default()
    }

    /// Runs `flow` with the given inputs layered over its initial context.
    pub fn execute(
        &self,
        flow: &Flow,
        inputs: IndexMap<String, Value>,
    ) -> Result<Execution, FlowError> {
        flow.validate()?;
        let mut context = Context::seeded(flow, inputs);
        tracing::debug!(flow = %flow.name, steps = flow.steps.len(), "starting run");

        let result = match self.run(&flow.steps, &mut context)? {
            Control::Return(value) => Some(value),
            Control::Continue => None,
        };
        tracing::debug!(flow = %flow.name, returned = result.is_some(), "run finished");
        Ok(Execution { result, context })
    }

    pub(crate) fn run(&self, steps: &[Step], context: &mut Context) -> Result<Control, FlowError> {
        for step in steps {
            if let Control::Return(value) = self.run_step(step, context)? {
                return Ok(Control::Return(value));
            }
        }
        Ok(Control::Continue)
    }

    fn run_step(&self, step: &Step, context: &mut Context) -> Result<Control, FlowError> {
        tracing::trace!(step = step.tag(), "executing step");
        match step {
            Step::Let(bindings) => {
                for (name, expr) in bindings {
                    let (value, _) = self.evaluator(context).evaluate(expr)?;
                    context.assign(name, value)?;
                }
            }
            Step::Set { target, value } => {
                let (value, _) = self.evaluator(context).evaluate(value)?;
                context.set(target, value)?;
            }
            Step::If {
                condition,
                then,
                otherwise,
            } => {
                let branch = if self.condition(condition, context)? {
                    then
                } else {
                    otherwise
                };
                return self.run(branch, context);
            }
            Step::ForEach {
                source,
                alias,
                body,
            } => return self.run_for_each(source, alias, body, context),
            Step::Map {
                source,
                alias,
                body,
                target,
            } => {
                let results = self.run_map(source, alias, body, context)?;
                context.bind(target, Value::Array(results));
            }
            Step::Try { body, catch } => return self.run_try(body, catch.as_deref(), context),
            Step::Assert { condition, message } => {
                if !self.evaluator(context).evaluate_bool(condition, "assert")? {
                    return Err(FlowError::AssertionFailed(message.clone()));
                }
            }
            Step::Log { level, message } => {
                let line = self.render_log(message, context)?;
                self.sink.emit(*level, &line);
            }
            Step::Call(step) => {
                let (value, _) = self.evaluator(context).call(&step.call)?;
                if let Some(target) = &step.target {
                    context.assign(target, value)?;
                }
            }
            Step::Return(value) => {
                let (value, _) = self.evaluator(context).evaluate(value)?;
                return Ok(Control::Return(value));
            }
        }
        Ok(Control::Continue)
    }

    fn evaluator<'a>(&'a self, context: &'a Context) -> Evaluator<'a> {
        Evaluator::new(context, self.resolver.as_ref())
    }

    /// `if` accepts any value, falling back to truthiness with a warning.
    fn condition(&self, condition: &Expr, context: &Context) -> Result<bool, FlowError> {
        match self.evaluator(context).evaluate(condition)? {
            (Value::Bool(b), _) => Ok(b),
            (other, _) => {
                self.sink.emit(
                    LogLevel::Warn,
                    &format!(
                        "condition evaluated to {} '{}', not a boolean; using its truthiness",
                        Type::of(&other),
                        other
                    ),
                );
                Ok(other.is_truthy())
            }
        }
    }

    fn run_for_each(
        &self,
        source: &Path,
        alias: &str,
        body: &[Step],
        context: &mut Context,
    ) -> Result<Control, FlowError> {
        let items = array_at(source, context, "forEach")?;
        let previous = context.get(alias).cloned();

        let mut outcome = Ok(Control::Continue);
        for item in items {
            context.bind(alias, item);
            outcome = self.run(body, context);
            if !matches!(outcome, Ok(Control::Continue)) {
                break;
            }
        }
        context.restore(alias, previous);
        outcome
    }

    fn run_try(
        &self,
        body: &[Step],
        catch: Option<&[Step]>,
        context: &mut Context,
    ) -> Result<Control, FlowError> {
        let mut failure = None;
        for (index, step) in body.iter().enumerate() {
            match self.run_step(step, context) {
                Ok(Control::Continue) => {}
                Ok(Control::Return(value)) => return Ok(Control::Return(value)),
                Err(e) => {
                    failure = Some((index, e));
                    break;
                }
            }
        }

        let Some((index, error)) = failure else {
            return Ok(Control::Continue);
        };
        let Some(catch) = catch else {
            return Err(error);
        };

        tracing::debug!(kind = %error.kind(), step_index = index, "caught error: {}", error);
        context.bind(ERROR_BINDING, caught_error(&error, index));
        self.run(catch, context)
    }

    fn render_log(&self, parts: &[LogPart], context: &Context) -> Result<String, FlowError> {
        let evaluator = self.evaluator(context);
        let rendered = parts
            .iter()
            .map(|part| match part {
                LogPart::Expr(expr) => evaluator.evaluate(expr).map(|(value, _)| value.to_string()),
                LogPart::Text(value) => Ok(value.to_string()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered.join(" "))
    }
}

/// The value bound to `error` on a catch path.
fn caught_error(error: &FlowError, step_index: usize) -> Value {
    let mut fields = IndexMap::new();
    fields.insert("message".to_string(), Value::String(error.to_string()));
    fields.insert("stepIndex".to_string(), Value::Integer(step_index as i64));
    fields.insert("kind".to_string(), Value::from(error.kind().as_str()));
    Value::Object(fields)
}

/// Resolves a loop source, which must hold an array. The returned items are a snapshot.
fn array_at(source: &Path, context: &Context, step: &str) -> Result<Vec<Value>, FlowError> {
    match context.lookup(source)? {
        Value::Array(items) => Ok(items.clone()),
        other => Err(FlowError::type_mismatch(
            format!("{} over {}", step, source),
            Type::Array.as_str(),
            Type::of(other),
        )),
    }
}
