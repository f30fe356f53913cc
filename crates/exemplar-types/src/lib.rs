//! Shared types for the exemplar compiler.
//!
//! This crate defines the source spans, diagnostics, the statement/expression
//! AST of the host-language subset, the annotation AST of the statically
//! annotated dialect, and the [`TypeDescriptor`] model both inference paths
//! produce.

mod descriptor;
mod error;
mod span;
pub mod annotation;
pub mod ast;
pub mod visit;

pub use descriptor::{
    FunctionSignature, ParameterDescriptor, ReturnMode, TypeDescriptor, TypeKind,
};
pub use error::{Diagnostic, DiagnosticKind, Diagnostics, ErrorCode, MAX_ERRORS};
pub use span::{SourceFile, Span};

/// Result type used throughout the exemplar compiler.
pub type Result<T> = std::result::Result<T, Diagnostic>;
