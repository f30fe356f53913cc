use crate::{SourceFile, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of errors collected before the lexer/parser stop.
pub const MAX_ERRORS: usize = 20;

/// The diagnostic taxonomy, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Malformed or disallowed construct. Fatal.
    SyntaxError,
    /// Structurally invalid type-position value. Fatal.
    TypeError,
    /// Parameter-list policy violation. Fatal.
    TranspileError,
    /// Non-fatal; collected and returned, never thrown.
    Warning,
}

impl DiagnosticKind {
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::Warning)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyntaxError => write!(f, "SyntaxError"),
            Self::TypeError => write!(f, "TypeError"),
            Self::TranspileError => write!(f, "TranspileError"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// Numeric diagnostic code (E100–E499, W900–W999).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax errors (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNCLOSED_DELIMITER: Self = Self(101);
    pub const UNTERMINATED_LITERAL: Self = Self(102);
    pub const INVALID_RETURN_TYPE: Self = Self(103);
    pub const MALFORMED_DECLARATION: Self = Self(104);
    pub const INVALID_PARAMETER: Self = Self(105);
    pub const NESTING_TOO_DEEP: Self = Self(106);

    // ── Type errors (E200–E299) ──
    pub const INVALID_EXAMPLE: Self = Self(200);
    pub const UNKNOWN_TYPE: Self = Self(201);

    // ── Transpile errors (E300–E399) ──
    pub const REQUIRED_AFTER_OPTIONAL: Self = Self(300);
    pub const DUPLICATE_PARAMETER: Self = Self(301);
    pub const AMBIGUOUS_OVERLOAD: Self = Self(302);
    pub const MIXED_ASYNC_OVERLOAD: Self = Self(303);
    pub const REST_IN_OVERLOAD: Self = Self(304);
    pub const DUPLICATE_EXTENSION: Self = Self(305);

    // ── Agent-subset rejections (E400–E499) ──
    pub const CONSTRUCTION_NOT_ALLOWED: Self = Self(400);
    pub const FORBIDDEN_GLOBAL: Self = Self(401);
    pub const THROW_NOT_ALLOWED: Self = Self(402);
    pub const UNSUPPORTED_STATEMENT: Self = Self(403);
    pub const UNSUPPORTED_EXPRESSION: Self = Self(404);
    pub const UNKNOWN_ATOM: Self = Self(405);
    pub const NO_ENTRY_FUNCTION: Self = Self(406);

    // ── Warnings (W900–W999) ──
    pub const IMPLICIT_ANY: Self = Self(900);
    pub const UNUSED_LOCAL: Self = Self(901);
    pub const NO_OP_EXPRESSION: Self = Self(902);

    /// Get the diagnostic kind for this code.
    pub fn kind(self) -> DiagnosticKind {
        match self.0 {
            100..=199 => DiagnosticKind::SyntaxError,
            200..=299 => DiagnosticKind::TypeError,
            300..=399 => DiagnosticKind::TranspileError,
            400..=499 => DiagnosticKind::SyntaxError,
            900..=999 => DiagnosticKind::Warning,
            _ => DiagnosticKind::SyntaxError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            DiagnosticKind::Warning => write!(f, "W{}", self.0),
            _ => write!(f, "E{}", self.0),
        }
    }
}

/// A structured compiler diagnostic.
///
/// Every diagnostic carries `{ name, message, line, column, filename? }`;
/// the rest is optional detail for tools and re-prompting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub name: DiagnosticKind,
    pub code: ErrorCode,
    pub message: String,
    pub line: u32,
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Rendered context window (syntax errors only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Diagnostic {
    /// Create a diagnostic at an explicit position.
    pub fn new(code: ErrorCode, message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            name: code.kind(),
            code,
            message: message.into(),
            line,
            column,
            filename: None,
            expected: None,
            received: None,
            suggestion: None,
            context: None,
        }
    }

    /// Create a diagnostic at a byte offset of `source`.
    ///
    /// Syntax errors also capture the context window shown by [`render`].
    ///
    /// [`render`]: Diagnostic::render
    pub fn at(code: ErrorCode, message: impl Into<String>, source: &SourceFile, offset: usize) -> Self {
        let (line, column) = source.position(offset);
        let mut diag = Self::new(code, message, line, column);
        diag.filename = Some(source.name.clone());
        if diag.name == DiagnosticKind::SyntaxError {
            diag.context = Some(context_window(source, line, column));
        }
        diag
    }

    /// Create a diagnostic at a span of `source`.
    pub fn at_span(code: ErrorCode, message: impl Into<String>, source: &SourceFile, span: Span) -> Self {
        Self::at(code, message, source, span.start)
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_received(mut self, received: impl Into<String>) -> Self {
        self.received = Some(received.into());
        self
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_warning(&self) -> bool {
        self.name == DiagnosticKind::Warning
    }

    /// Render the diagnostic with its context window, if any.
    pub fn render(&self) -> String {
        let mut out = self.to_string();
        if let Some(suggestion) = &self.suggestion {
            out.push_str("\n  suggestion: ");
            out.push_str(suggestion);
        }
        if let Some(context) = &self.context {
            out.push('\n');
            out.push_str(context);
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.name, self.code, self.message)?;
        match &self.filename {
            Some(name) => write!(f, " ({}:{}:{})", name, self.line, self.column),
            None => write!(f, " ({}:{})", self.line, self.column),
        }
    }
}

impl std::error::Error for Diagnostic {}

/// Up to two lines of leading context, the failing line, and a caret.
fn context_window(source: &SourceFile, line: u32, column: u32) -> String {
    let first = line.saturating_sub(2).max(1);
    let width = line.to_string().len();
    let mut out = String::new();
    for n in first..=line {
        let text = source.line(n).unwrap_or("");
        out.push_str(&format!("{n:>width$} | {text}\n"));
    }
    out.push_str(&format!(
        "{:>width$} | {}^",
        "",
        " ".repeat(column.saturating_sub(1) as usize)
    ));
    out
}

/// Collected diagnostics, used by stages that recover and keep going.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl Diagnostics {
    /// Create an empty collection.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// `true` once the error cap has been reached.
    pub fn is_full(&self) -> bool {
        self.total_errors >= MAX_ERRORS
    }

    /// Add a diagnostic, routing warnings separately and respecting the
    /// [`MAX_ERRORS`] limit for errors.
    pub fn push(&mut self, diag: Diagnostic) {
        if diag.is_warning() {
            self.warnings.push(diag);
            self.total_warnings += 1;
        } else {
            if self.errors.len() < MAX_ERRORS {
                self.errors.push(diag);
            }
            self.total_errors += 1;
        }
    }

    /// The first collected error, the one reported as fatal.
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.errors.first()
    }

    /// Convert into `Err(first error)` when any error was collected.
    pub fn into_result(self) -> Result<Vec<Diagnostic>, Diagnostic> {
        match self.errors.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(self.warnings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_kind() {
        assert_eq!(ErrorCode::UNEXPECTED_TOKEN.kind(), DiagnosticKind::SyntaxError);
        assert_eq!(ErrorCode::INVALID_EXAMPLE.kind(), DiagnosticKind::TypeError);
        assert_eq!(ErrorCode::AMBIGUOUS_OVERLOAD.kind(), DiagnosticKind::TranspileError);
        assert_eq!(ErrorCode::FORBIDDEN_GLOBAL.kind(), DiagnosticKind::SyntaxError);
        assert_eq!(ErrorCode::UNUSED_LOCAL.kind(), DiagnosticKind::Warning);
    }

    #[test]
    fn test_code_display() {
        assert_eq!(ErrorCode::DUPLICATE_PARAMETER.to_string(), "E301");
        assert_eq!(ErrorCode::IMPLICIT_ANY.to_string(), "W900");
    }

    #[test]
    fn test_diagnostic_at_offset() {
        let src = SourceFile::new("mod.ex", "let a = 1\nlet b = ?\n");
        let diag = Diagnostic::at(ErrorCode::UNEXPECTED_TOKEN, "unexpected '?'", &src, 18);
        assert_eq!(diag.line, 2);
        assert_eq!(diag.column, 9);
        assert_eq!(diag.filename.as_deref(), Some("mod.ex"));
        let rendered = diag.render();
        assert!(rendered.contains("2 | let b = ?"), "{rendered}");
        assert!(rendered.ends_with("|         ^"), "{rendered}");
    }

    #[test]
    fn test_type_error_has_no_context() {
        let src = SourceFile::new("mod.ex", "x");
        let diag = Diagnostic::at(ErrorCode::INVALID_EXAMPLE, "bad", &src, 0);
        assert!(diag.context.is_none());
    }

    #[test]
    fn test_json_shape() {
        let diag = Diagnostic::new(ErrorCode::DUPLICATE_PARAMETER, "duplicate parameter 'a'", 3, 14)
            .with_filename("f.ex")
            .with_suggestion("rename one of them");
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["name"], "TranspileError");
        assert_eq!(json["line"], 3);
        assert_eq!(json["column"], 14);
        assert_eq!(json["filename"], "f.ex");
        assert!(json.get("expected").is_none());
    }

    #[test]
    fn test_diagnostics_cap_and_routing() {
        let mut diags = Diagnostics::empty();
        for i in 0..25 {
            diags.push(Diagnostic::new(ErrorCode::UNEXPECTED_TOKEN, format!("e{i}"), 1, 1));
        }
        diags.push(Diagnostic::new(ErrorCode::UNUSED_LOCAL, "unused", 1, 1));
        assert_eq!(diags.errors.len(), MAX_ERRORS);
        assert_eq!(diags.total_errors, 25);
        assert_eq!(diags.total_warnings, 1);
        assert!(diags.is_full());
        assert_eq!(diags.into_result().unwrap_err().message, "e0");
    }
}
