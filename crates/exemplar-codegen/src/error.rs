//! Codegen error types.

use exemplar_types::{Diagnostic, ErrorCode, SourceFile, Span};
use thiserror::Error;

/// Errors raised while emitting host source or an instruction tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    /// A construct outside the agent subset.
    #[error("{message}")]
    Rejected {
        code: ErrorCode,
        message: String,
        /// A concrete alternative the author can use instead.
        suggestion: Option<String>,
        span: Span,
    },

    /// An internal consistency check failed.
    #[error("internal codegen error: {0}")]
    Internal(String),
}

impl CodegenError {
    pub fn rejected(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        CodegenError::Rejected {
            code,
            message: message.into(),
            suggestion: None,
            span,
        }
    }

    /// Attach a suggestion to a rejection. Other variants are unchanged.
    pub fn suggest(self, text: impl Into<String>) -> Self {
        match self {
            CodegenError::Rejected {
                code,
                message,
                span,
                ..
            } => CodegenError::Rejected {
                code,
                message,
                suggestion: Some(text.into()),
                span,
            },
            other => other,
        }
    }

    /// Convert to a diagnostic positioned in `source`.
    pub fn to_diagnostic(&self, source: &SourceFile) -> Diagnostic {
        match self {
            CodegenError::Rejected {
                code,
                message,
                suggestion,
                span,
            } => {
                let diag = Diagnostic::at_span(*code, message.clone(), source, *span);
                match suggestion {
                    Some(s) => diag.with_suggestion(s.clone()),
                    None => diag,
                }
            }
            CodegenError::Internal(msg) => {
                Diagnostic::new(ErrorCode::UNSUPPORTED_STATEMENT, msg.clone(), 1, 1)
                    .with_filename(source.name.clone())
            }
        }
    }
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;
