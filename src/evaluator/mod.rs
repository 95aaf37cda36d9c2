use crate::context::Context;
use crate::error::FlowError;
use crate::ir::{CallSpec, Expr, LogicalOp, Type, Value};
use crate::resolver::FunctionResolver;
use futures::executor::block_on;

mod ops;

/// A value together with the type the evaluator assigned to it.
pub type Typed = (Value, Type);

/// Evaluates expressions against a borrowed context.
///
/// Evaluation never writes to the context. The only side effects are the host
/// calls made through the resolver.
pub struct Evaluator<'a> {
    context: &'a Context,
    resolver: &'a dyn FunctionResolver,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a Context, resolver: &'a dyn FunctionResolver) -> Self {
        Self { context, resolver }
    }

    /// Evaluates `expr` and returns its value and type.
    ///
    /// `get` reports the declared schema type of a top-level name when there is one;
    /// every other value is typed by its structure.
    pub fn evaluate(&self, expr: &Expr) -> Result<Typed, FlowError> {
        match expr {
            Expr::Get(path) => {
                let value = self.context.resolve(path)?;
                let ty = path
                    .is_simple()
                    .then(|| self.context.declared_type(path.root()))
                    .flatten()
                    .unwrap_or_else(|| Type::of(&value));
                Ok((value, ty))
            }
            Expr::Literal(value) => Ok((value.clone(), Type::of(value))),
            Expr::Arith { op, operands } => {
                let operands = operands
                    .iter()
                    .map(|operand| self.evaluate(operand))
                    .collect::<Result<Vec<_>, _>>()?;
                ops::arithmetic(*op, &operands)
            }
            Expr::Compare { left, op, right } => {
                let (left, _) = self.evaluate(left)?;
                let (right, _) = self.evaluate(right)?;
                Ok((Value::Bool(ops::compare(*op, &left, &right)?), Type::Boolean))
            }
            Expr::Logical { op, operands } => self.eval_logical(*op, operands),
            Expr::Not(inner) => {
                let b = self.evaluate_bool(inner, "not")?;
                Ok((Value::Bool(!b), Type::Boolean))
            }
            Expr::Abs(inner) => {
                let (value, ty) = self.evaluate(inner)?;
                ops::absolute(&value, ty)
            }
            Expr::Length(inner) => {
                let (value, _) = self.evaluate(inner)?;
                Ok((ops::length(&value)?, Type::Integer))
            }
            Expr::In { item, array } => {
                let (item, _) = self.evaluate(item)?;
                let (array, _) = self.evaluate(array)?;
                Ok((Value::Bool(ops::contains(&item, &array)?), Type::Boolean))
            }
            Expr::Call(spec) => self.call(spec),
        }
    }

    /// Evaluates an expression that must produce a boolean.
    pub fn evaluate_bool(&self, expr: &Expr, operation: &str) -> Result<bool, FlowError> {
        match self.evaluate(expr)? {
            (Value::Bool(b), _) => Ok(b),
            (other, _) => Err(FlowError::type_mismatch(
                operation,
                Type::Boolean.as_str(),
                Type::of(&other),
            )),
        }
    }

    // Stops at the first operand that decides the result.
    fn eval_logical(&self, op: LogicalOp, operands: &[Expr]) -> Result<Typed, FlowError> {
        let deciding = op == LogicalOp::Or;
        for operand in operands {
            if self.evaluate_bool(operand, op.keyword())? == deciding {
                return Ok((Value::Bool(deciding), Type::Boolean));
            }
        }
        Ok((Value::Bool(!deciding), Type::Boolean))
    }

    /// Invokes the resolver with the call's arguments in declaration order.
    /// Asynchronous calls block the current thread until the host's future resolves.
    pub fn call(&self, spec: &CallSpec) -> Result<Typed, FlowError> {
        let args = spec
            .args
            .values()
            .map(|arg| self.evaluate(arg).map(|(value, _)| value))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            function = %spec.function,
            arity = args.len(),
            is_async = spec.is_async,
            "calling host function"
        );
        let value = if spec.is_async {
            block_on(self.resolver.call_async(&spec.function, args))?
        } else {
            self.resolver.call(&spec.function, &args)?
        };
        let ty = spec.return_type.unwrap_or_else(|| Type::of(&value));
        Ok((value, ty))
    }
}
