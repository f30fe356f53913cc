//! Core parser infrastructure: token cursor, error reporting, helpers.

use exemplar_lexer::token::{Token, TokenKind};
use exemplar_types::ast::{Ident, Program};
use exemplar_types::{Diagnostic, Diagnostics, ErrorCode, SourceFile, Span, MAX_ERRORS};

/// The parser.
///
/// Consumes a token stream produced by the lexer and builds an AST.
/// Collects errors and attempts recovery when possible.
pub struct Parser<'src> {
    /// The token stream.
    tokens: Vec<Token>,
    /// Current index into `tokens`.
    pos: usize,
    /// Source file for error context.
    source_file: &'src SourceFile,
    /// Collected errors.
    errors: Diagnostics,
    /// `in` is not a binary operator (head of a `for` statement).
    pub(crate) no_in: bool,
    /// Current function nesting depth.
    pub(crate) function_depth: u32,
    /// Current expression nesting depth.
    pub(crate) expr_depth: u32,
}

/// Result of parsing.
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Diagnostics,
}

impl<'src> Parser<'src> {
    /// Create a new parser from a token stream and source file.
    pub fn new(tokens: Vec<Token>, source_file: &'src SourceFile) -> Self {
        Self {
            tokens,
            pos: 0,
            source_file,
            errors: Diagnostics::empty(),
            no_in: false,
            function_depth: 0,
            expr_depth: 0,
        }
    }

    /// Parse a whole module.
    pub fn parse(mut self) -> ParseResult {
        let mut body = Vec::new();
        while !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            match self.parse_statement() {
                Some(stmt) => body.push(stmt),
                None => self.synchronize(),
            }
        }
        let span = Span::new(0, self.source_file.source.len(), 1, 1);
        let program = if self.errors.has_errors() {
            None
        } else {
            Some(Program { body, span })
        };
        ParseResult {
            program,
            errors: self.errors,
        }
    }

    /// Consume the remaining errors, used by sub-parsers.
    pub(crate) fn into_errors(self) -> Diagnostics {
        self.errors
    }

    pub(crate) fn source(&self) -> &'src SourceFile {
        self.source_file
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &Token {
        match self.tokens.get(self.pos) {
            Some(token) => token,
            None => &self.tokens[self.tokens.len() - 1],
        }
    }

    /// Returns the kind of the current token.
    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::point(0, 1, 1)
        }
    }

    /// Returns the previously consumed token's kind.
    pub(crate) fn previous_kind(&self) -> Option<&TokenKind> {
        self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)).map(|t| &t.kind)
    }

    /// Consume one `>` closing a type argument list, splitting `>>`, `>>>`,
    /// `>=` and `>>=`-like tokens the lexer produced greedily.
    pub(crate) fn eat_type_close(&mut self) -> bool {
        let rest = match self.peek_kind() {
            TokenKind::Gt => {
                self.advance();
                return true;
            }
            TokenKind::Shr => TokenKind::Gt,
            TokenKind::UShr => TokenKind::Shr,
            TokenKind::GtEq => TokenKind::Eq,
            _ => return false,
        };
        if let Some(token) = self.tokens.get_mut(self.pos) {
            token.kind = rest;
            token.span.start += 1;
            token.span.column += 1;
            token.newline_before = false;
        }
        true
    }

    /// Returns the span of the current token.
    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    /// A span from `start` through the previously consumed token.
    pub(crate) fn span_from(&self, start: Span) -> Span {
        let end = self.previous_span().end.max(start.start);
        Span::new(start.start, end, start.line, start.column)
    }

    /// Returns `true` if the current token is `Eof`.
    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    /// Check if the current token matches the given kind exactly.
    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// `true` if the current token is the identifier `name`.
    pub(crate) fn check_ident(&self, name: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Identifier(n) if n == name)
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Eat the contextual keyword `name`.
    pub(crate) fn eat_ident(&mut self, name: &str) -> bool {
        if self.check_ident(name) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Look ahead by `n` tokens from current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    /// `true` if the token `n` ahead is preceded by a line break.
    pub(crate) fn newline_before_ahead(&self, n: usize) -> bool {
        self.tokens.get(self.pos + n).is_some_and(|t| t.newline_before)
    }

    /// End offset of the token `n` ahead.
    pub(crate) fn token_end_ahead(&self, n: usize) -> usize {
        self.tokens
            .get(self.pos + n)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.span.end)
    }

    /// Snapshot the cursor for a speculative parse.
    pub(crate) fn save(&self) -> (usize, Diagnostics) {
        (self.pos, self.errors.clone())
    }

    /// Rewind to a snapshot taken with [`Parser::save`].
    pub(crate) fn restore(&mut self, (pos, errors): (usize, Diagnostics)) {
        self.pos = pos;
        self.errors = errors;
    }

    /// From an opening delimiter `offset` tokens ahead, the distance (in
    /// tokens, from that delimiter) to the token just past its matching closer.
    pub(crate) fn past_matching(&self, offset: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut n = offset;
        loop {
            match self.look_ahead(n) {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::InterpolationStart => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(n + 1 - offset);
                    }
                }
                TokenKind::InterpolationEnd => depth = depth.saturating_sub(1),
                TokenKind::Eof => return None,
                _ => {}
            }
            n += 1;
        }
    }

    // ── Statement termination ─────────────────────────────────────────────────

    /// Consume a statement terminator.
    ///
    /// A `;` is eaten if present. Otherwise a line break, a closing `}`, or
    /// end of input ends the statement.
    pub(crate) fn consume_semicolon(&mut self) {
        if self.eat(&TokenKind::Semicolon) {
            return;
        }
        if self.at_end() || self.check(&TokenKind::RBrace) || self.peek().newline_before {
            return;
        }
        self.error_at_current(
            ErrorCode::UNEXPECTED_TOKEN,
            format!("expected ';', got '{}'", self.peek_kind()),
        );
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token kind. Returns the token if matched, or emits an error.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Token> {
        if self.check(expected) {
            Some(self.advance())
        } else {
            let code = if self.at_end() {
                ErrorCode::UNCLOSED_DELIMITER
            } else {
                ErrorCode::UNEXPECTED_TOKEN
            };
            let diag = self
                .diagnostic_at_current(
                    code,
                    format!("expected '{}', got '{}'", expected, self.peek_kind()),
                )
                .with_expected(expected.to_string())
                .with_received(self.peek_kind().to_string());
            self.errors.push(diag);
            None
        }
    }

    /// Expect an identifier token.
    pub(crate) fn expect_identifier(&mut self) -> Option<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected identifier, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    /// Expect an identifier OR any keyword, as used for member and property
    /// names: `promise.catch`, `{ default: 1 }`.
    pub(crate) fn expect_property_name(&mut self) -> Option<Ident> {
        let kind = self.peek_kind().clone();
        match &kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            _ if kind.is_keyword() => {
                let name = kind.to_string();
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected property name, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    /// Expect a string literal token. Returns the string value.
    pub(crate) fn expect_string_literal(&mut self) -> Option<String> {
        match self.peek_kind().clone() {
            TokenKind::String(s) => {
                self.advance();
                Some(s)
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected string literal, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    fn diagnostic_at_current(&self, code: ErrorCode, message: impl Into<String>) -> Diagnostic {
        Diagnostic::at(code, message, self.source_file, self.current_span().start)
    }

    /// Report an error at the current token position.
    pub(crate) fn error_at_current(&mut self, code: ErrorCode, message: impl Into<String>) {
        let diag = self.diagnostic_at_current(code, message);
        self.errors.push(diag);
    }

    /// Report an error at a specific span.
    pub(crate) fn error_at(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let diag = Diagnostic::at(code, message, self.source_file, span.start);
        self.errors.push(diag);
    }

    /// Push a pre-built diagnostic.
    pub(crate) fn push_error(&mut self, diag: Diagnostic) {
        self.errors.push(diag);
    }

    /// Returns `true` if we've hit the error limit and should stop.
    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.total_errors >= MAX_ERRORS
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip tokens until we reach a synchronization point.
    /// Used after an error to resume at a known-good position.
    pub(crate) fn synchronize(&mut self) {
        let start = self.pos;
        while !self.at_end() {
            if self.eat(&TokenKind::Semicolon) {
                return;
            }
            // A statement keyword on a fresh line starts the next statement.
            if self.pos > start && self.peek().newline_before {
                match self.peek_kind() {
                    TokenKind::Var
                    | TokenKind::Let
                    | TokenKind::Const
                    | TokenKind::Function
                    | TokenKind::Class
                    | TokenKind::If
                    | TokenKind::For
                    | TokenKind::While
                    | TokenKind::Return
                    | TokenKind::Import
                    | TokenKind::Export
                    | TokenKind::Try => return,
                    _ => {}
                }
            }
            if self.check(&TokenKind::RBrace) && self.pos > start {
                self.advance();
                return;
            }
            self.advance();
        }
    }
}
