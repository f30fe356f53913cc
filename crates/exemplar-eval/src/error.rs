//! Runtime error types for the exemplar evaluator.

use crate::value::Value;
use thiserror::Error;

/// Evaluation error: thrown values, runtime faults, assertion failures.
///
/// Everything except [`EvalError::GasExhausted`] is catchable by a
/// `try`/`catch` in the evaluated program.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// A value thrown with `throw`.
    #[error("{}", .0.describe_thrown())]
    Thrown(Value),

    /// Unknown variable.
    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    /// Calling a non-function, reading a property of `undefined`, etc.
    #[error("TypeError: {0}")]
    Type(String),

    /// Call depth exceeded, invalid lengths.
    #[error("RangeError: {0}")]
    Range(String),

    /// A construct the evaluator does not execute, or source that failed to
    /// parse.
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// A binding imported from a module nothing resolved was used.
    #[error("unresolved import: {0}")]
    UnresolvedImport(String),

    /// `assert` or an `expect(...)` matcher failed.
    #[error("{0}")]
    AssertionFailed(String),

    /// The evaluation step budget ran out.
    #[error("gas exhausted")]
    GasExhausted,
}

impl EvalError {
    /// `false` for errors a `catch` clause must not intercept.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, EvalError::GasExhausted)
    }

    /// The error class name a caught error object reports.
    pub fn class_name(&self) -> &'static str {
        match self {
            EvalError::Thrown(_) => "Error",
            EvalError::Reference(_) => "ReferenceError",
            EvalError::Type(_) => "TypeError",
            EvalError::Range(_) => "RangeError",
            EvalError::Syntax(_) => "SyntaxError",
            EvalError::UnresolvedImport(_) => "ReferenceError",
            EvalError::AssertionFailed(_) => "AssertionError",
            EvalError::GasExhausted => "Error",
        }
    }

    /// The message without the class prefix.
    pub fn message(&self) -> String {
        match self {
            EvalError::Thrown(value) => value.error_message(),
            EvalError::Reference(name) => format!("{name} is not defined"),
            EvalError::Type(msg)
            | EvalError::Range(msg)
            | EvalError::Syntax(msg)
            | EvalError::AssertionFailed(msg) => msg.clone(),
            EvalError::UnresolvedImport(name) => format!("unresolved import: {name}"),
            EvalError::GasExhausted => "gas exhausted".into(),
        }
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;
