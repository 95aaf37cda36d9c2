use crate::error::FlowError;
use crate::ir::{ArithOp, CompareOp, Type, Value};

// Folds two integers with a checked operation, reporting overflow as an arithmetic error.
macro_rules! checked {
    ($a:expr, $b:expr, $method:ident, $op:expr) => {
        $a.$method($b)
            .ok_or_else(|| FlowError::Arithmetic(format!("integer overflow in '{}'", $op)))
    };
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_operand(op: ArithOp, value: &Value, ty: Type) -> Result<Num, FlowError> {
        match value {
            Value::Integer(i) => Ok(Num::Int(*i)),
            Value::Number(n) => Ok(Num::Float(*n)),
            _ => Err(FlowError::type_mismatch(
                op.symbol(),
                "integer or number",
                if ty.is_numeric() { Type::of(value) } else { ty },
            )),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(n) => n,
        }
    }
}

/// N-ary arithmetic, folded left to right.
///
/// The result is `number` when any operand is a `number` or the operator is `div`,
/// otherwise `integer` computed with overflow checks.
pub(crate) fn arithmetic(op: ArithOp, operands: &[(Value, Type)]) -> Result<(Value, Type), FlowError> {
    let nums = operands
        .iter()
        .map(|(value, ty)| Num::from_operand(op, value, *ty))
        .collect::<Result<Vec<_>, _>>()?;
    let Some((&first, rest)) = nums.split_first() else {
        return Err(FlowError::MalformedIR(format!(
            "'{}' has no operands",
            op.symbol()
        )));
    };

    let floating = op == ArithOp::Div
        || operands.iter().any(|(_, ty)| *ty == Type::Number)
        || nums.iter().any(|n| matches!(n, Num::Float(_)));

    if floating {
        let mut acc = first.as_f64();
        for n in rest {
            let rhs = n.as_f64();
            acc = match op {
                ArithOp::Add => acc + rhs,
                ArithOp::Sub => acc - rhs,
                ArithOp::Mul => acc * rhs,
                ArithOp::Div | ArithOp::Mod if rhs == 0.0 => {
                    return Err(division_by_zero(op));
                }
                ArithOp::Div => acc / rhs,
                ArithOp::Mod => acc % rhs,
            };
        }
        return Ok((Value::Number(acc), Type::Number));
    }

    let as_int = |n: Num| match n {
        Num::Int(i) => i,
        Num::Float(f) => f as i64,
    };
    let mut acc = as_int(first);
    for &n in rest {
        let rhs = as_int(n);
        acc = match op {
            ArithOp::Add => checked!(acc, rhs, checked_add, "add")?,
            ArithOp::Sub => checked!(acc, rhs, checked_sub, "sub")?,
            ArithOp::Mul => checked!(acc, rhs, checked_mul, "mul")?,
            ArithOp::Div | ArithOp::Mod if rhs == 0 => return Err(division_by_zero(op)),
            ArithOp::Div => checked!(acc, rhs, checked_div, "div")?,
            // Truncated remainder: the sign follows the dividend.
            ArithOp::Mod => checked!(acc, rhs, checked_rem, "mod")?,
        };
    }
    Ok((Value::Integer(acc), Type::Integer))
}

fn division_by_zero(op: ArithOp) -> FlowError {
    let what = if op == ArithOp::Div { "division" } else { "modulo" };
    FlowError::Arithmetic(format!("{} by zero", what))
}

/// Ordering compares numbers (mixing integer and number) or strings;
/// equality compares any two values.
pub(crate) fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, FlowError> {
    use std::cmp::Ordering;

    if op.is_equality() {
        let equal = left.strict_eq(right);
        return Ok(if op == CompareOp::Eq { equal } else { !equal });
    }

    let ordering = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            (None, _) => {
                return Err(FlowError::type_mismatch(
                    op.symbol(),
                    "number or string",
                    Type::of(left),
                ));
            }
            (Some(_), None) => {
                return Err(FlowError::type_mismatch(
                    op.symbol(),
                    "number",
                    Type::of(right),
                ));
            }
        },
    };
    // NaN never orders.
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Gte => ordering != Ordering::Less,
        CompareOp::Lte => ordering != Ordering::Greater,
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Neq => ordering != Ordering::Equal,
    })
}

/// Absolute value, keeping the operand's numeric type.
pub(crate) fn absolute(value: &Value, ty: Type) -> Result<(Value, Type), FlowError> {
    match value {
        Value::Integer(i) => i
            .checked_abs()
            .map(|abs| (Value::Integer(abs), Type::Integer))
            .ok_or_else(|| FlowError::Arithmetic("integer overflow in 'abs'".to_string())),
        Value::Number(n) => Ok((Value::Number(n.abs()), Type::Number)),
        _ => Err(FlowError::type_mismatch(
            "abs",
            "integer or number",
            if ty.is_numeric() { Type::of(value) } else { ty },
        )),
    }
}

/// Element count of an array or character count of a string.
pub(crate) fn length(value: &Value) -> Result<Value, FlowError> {
    let len = match value {
        Value::Array(items) => items.len(),
        Value::String(s) => s.chars().count(),
        other => {
            return Err(FlowError::type_mismatch(
                "length",
                "array or string",
                Type::of(other),
            ));
        }
    };
    Ok(Value::Integer(len as i64))
}

pub(crate) fn contains(item: &Value, array: &Value) -> Result<bool, FlowError> {
    match array {
        Value::Array(items) => Ok(items.iter().any(|candidate| candidate.strict_eq(item))),
        other => Err(FlowError::type_mismatch("in", "array", Type::of(other))),
    }
}
