//! Generated from flow "Square".

#[allow(unused_imports)]
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum FlowError {
    AssertionFailed(String),
    Arithmetic(String),
    UnknownVariable(String),
    ExternalCall(String),
}

impl FlowError {
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::AssertionFailed(_) => "AssertionFailed",
            FlowError::Arithmetic(_) => "ArithmeticError",
            FlowError::UnknownVariable(_) => "UnknownVariable",
            FlowError::ExternalCall(_) => "ExternalCallError",
        }
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::AssertionFailed(message) => write!(f, "{}", message),
            FlowError::Arithmetic(message) => write!(f, "Arithmetic error: {}", message),
            FlowError::UnknownVariable(name) => write!(f, "Unknown variable '{}'", name),
            FlowError::ExternalCall(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for FlowError {}

/// The value bound to `error` when a `try` body fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaughtError {
    pub message: String,
    pub step_index: i32,
    pub kind: String,
}

impl CaughtError {
    pub fn new(error: &FlowError, step_index: i32) -> Self {
        Self {
            message: error.to_string(),
            step_index,
            kind: error.kind().to_string(),
        }
    }
}

impl fmt::Display for CaughtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{\"message\": {:?}, \"stepIndex\": {}, \"kind\": {:?}}}",
            self.message, self.step_index, self.kind
        )
    }
}

fn flow_div(a: f64, b: f64) -> Result<f64, FlowError> {
    if b == 0.0 {
        return Err(FlowError::Arithmetic("division by zero".to_string()));
    }
    Ok(a / b)
}

fn flow_rem<T>(a: T, b: T) -> Result<T, FlowError>
where
    T: std::ops::Rem<Output = T> + PartialEq + Default + Copy,
{
    if b == T::default() {
        return Err(FlowError::Arithmetic("modulo by zero".to_string()));
    }
    Ok(a % b)
}

#[allow(unused_mut, unused_variables, unused_assignments, unreachable_code, non_snake_case)]
pub fn square(mut x: i32, mut result: i32) -> Result<Option<i32>, FlowError> {
    result = (x * x);
    return Ok(Some(result));
    Ok(None)
}
