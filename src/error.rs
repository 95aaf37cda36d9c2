use crate::ir::Type;
use std::fmt;
use thiserror::Error;

/// Every failure the engine can surface, from IR loading through execution and code generation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("Malformed flow: {0}")]
    MalformedIR(String),

    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("Type mismatch during '{operation}': expected {expected}, but found {found}")]
    TypeMismatch {
        operation: String,
        expected: String,
        found: String,
    },

    #[error("Unsupported operation '{0}'")]
    UnsupportedOperation(String),

    #[error("{0}")]
    AssertionFailed(String),

    #[error(transparent)]
    ExternalCall(#[from] ExternalCallError),

    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    #[error("Backend '{backend}' does not allow: {}", ops.join(", "))]
    BackendUnsupported { backend: String, ops: Vec<String> },

    #[error("Cannot compile for '{backend}': {message}")]
    CompileError { backend: String, message: String },
}

/// Failure reported by a host-supplied function resolver.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Call to '{function}' failed: {message}")]
pub struct ExternalCallError {
    pub function: String,
    pub message: String,
}

impl ExternalCallError {
    pub fn new(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            message: message.into(),
        }
    }
}

/// The stable classification of a `FlowError`, as written into `error.kind` by a `try` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedIR,
    UnknownVariable,
    TypeMismatch,
    UnsupportedOperation,
    AssertionFailed,
    ExternalCallError,
    ArithmeticError,
    BackendUnsupported,
    CompileError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedIR => "MalformedIR",
            ErrorKind::UnknownVariable => "UnknownVariable",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::UnsupportedOperation => "UnsupportedOperation",
            ErrorKind::AssertionFailed => "AssertionFailed",
            ErrorKind::ExternalCallError => "ExternalCallError",
            ErrorKind::ArithmeticError => "ArithmeticError",
            ErrorKind::BackendUnsupported => "BackendUnsupported",
            ErrorKind::CompileError => "CompileError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::MalformedIR(_) => ErrorKind::MalformedIR,
            FlowError::UnknownVariable(_) => ErrorKind::UnknownVariable,
            FlowError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            FlowError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            FlowError::AssertionFailed(_) => ErrorKind::AssertionFailed,
            FlowError::ExternalCall(_) => ErrorKind::ExternalCallError,
            FlowError::Arithmetic(_) => ErrorKind::ArithmeticError,
            FlowError::BackendUnsupported { .. } => ErrorKind::BackendUnsupported,
            FlowError::CompileError { .. } => ErrorKind::CompileError,
        }
    }

    /// Shorthand used throughout the evaluator for operand type failures.
    pub(crate) fn type_mismatch(
        operation: impl Into<String>,
        expected: impl Into<String>,
        found: Type,
    ) -> Self {
        FlowError::TypeMismatch {
            operation: operation.into(),
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    pub(crate) fn compile(backend: impl fmt::Display, message: impl Into<String>) -> Self {
        FlowError::CompileError {
            backend: backend.to_string(),
            message: message.into(),
        }
    }
}
