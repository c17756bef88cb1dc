//! Runtime error types

use std::time::Duration;
use thiserror::Error;

/// Every failure the engine can raise. Return/Break/Continue are not errors;
/// they travel as [`Control`](super::types::Control) values.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("undefined variable: {0}")]
    UndefinedBinding(String),

    #[error("{0}")]
    TypeMismatch(String),

    #[error("{0}")]
    ArityMismatch(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("array index out of bounds: {index} (length: {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("{0}")]
    ValidationFailure(String),

    #[error("assertion failed: {0}")]
    AssertionFailure(String),

    #[error("maximum call depth exceeded ({0})")]
    RecursionLimitExceeded(usize),

    #[error("loop exceeded maximum iterations ({0})")]
    IterationLimitExceeded(usize),

    #[error("cannot reassign constant: {0}")]
    ConstantReassignment(String),

    #[error("future cancelled")]
    Cancellation,

    #[error("future timed out after {0:?}")]
    Timeout(Duration),

    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("variable already declared in this scope: {0}")]
    DuplicateBinding(String),

    #[error("integer overflow in {0}")]
    IntegerOverflow(&'static str),

    #[error("all futures rejected: [{}]", join_errors(.errors))]
    AllRejected { errors: Vec<RuntimeError> },

    #[error("{0}")]
    Macro(String),

    #[error("{0}")]
    Load(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn join_errors(errors: &[RuntimeError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl RuntimeError {
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        RuntimeError::TypeMismatch(msg.into())
    }

    pub fn arity(msg: impl Into<String>) -> Self {
        RuntimeError::ArityMismatch(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        RuntimeError::ValidationFailure(msg.into())
    }

    /// Stable error code for embedders
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::UndefinedBinding(_) => "UndefinedBinding",
            RuntimeError::TypeMismatch(_) => "TypeMismatch",
            RuntimeError::ArityMismatch(_) => "ArityMismatch",
            RuntimeError::DivisionByZero => "DivisionByZero",
            RuntimeError::IndexOutOfBounds { .. } => "IndexOutOfBounds",
            RuntimeError::ValidationFailure(_) => "ValidationFailure",
            RuntimeError::AssertionFailure(_) => "AssertionFailure",
            RuntimeError::RecursionLimitExceeded(_) => "RecursionLimitExceeded",
            RuntimeError::IterationLimitExceeded(_) => "IterationLimitExceeded",
            RuntimeError::ConstantReassignment(_) => "ConstantReassignment",
            RuntimeError::Cancellation => "CancellationError",
            RuntimeError::Timeout(_) => "TimeoutError",
            RuntimeError::CapabilityUnavailable(_) => "CapabilityUnavailable",
            RuntimeError::DuplicateBinding(_) => "DuplicateBinding",
            RuntimeError::IntegerOverflow(_) => "IntegerOverflow",
            RuntimeError::AllRejected { .. } => "AllRejected",
            RuntimeError::Macro(_) => "MacroError",
            RuntimeError::Load(_) => "LoadError",
            RuntimeError::Internal(_) => "InternalError",
        }
    }

    /// Prefix the message with context, keeping the error kind
    pub fn context(self, prefix: &str) -> Self {
        match self {
            RuntimeError::TypeMismatch(msg) => {
                RuntimeError::TypeMismatch(format!("{}: {}", prefix, msg))
            }
            RuntimeError::ValidationFailure(msg) => {
                RuntimeError::ValidationFailure(format!("{}: {}", prefix, msg))
            }
            other => other,
        }
    }
}
