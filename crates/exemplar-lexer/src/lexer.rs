//! Token lexer for the host-language subset.
//!
//! Features:
//! - Keywords, punctuation, and longest-match operators
//! - Template literals with `${expr}` interpolation via a mode stack
//! - Pattern literals, told apart from division by the previous token
//! - Line and block comments skipped; line breaks recorded on the next token
//! - Error recovery: collects up to 20 errors instead of stopping at the first

use exemplar_types::{Diagnostic, Diagnostics, ErrorCode, SourceFile, Span, MAX_ERRORS};

use crate::balance::{is_ident_char as is_ident_continue, is_ident_start_char as is_ident_start};
use crate::token::{Token, TokenKind};

/// Lexer mode: top-level code, template text, or an interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    /// Inside a template literal, scanning text until `` ` `` or `${`.
    Template,
    /// Inside `${...}`. Tracks brace depth so the closing `}` is found.
    Interpolation { brace_depth: u32 },
}

/// The lexer.
///
/// Converts source text into a vector of [`Token`]s, collecting up to
/// [`MAX_ERRORS`] errors along the way.
pub struct Lexer<'src> {
    source: &'src str,
    source_file: &'src SourceFile,
    pos: usize,
    line: u32,
    col: u32,
    errors: Diagnostics,
    mode_stack: Vec<Mode>,
    newline_pending: bool,
    /// Kind of the last emitted token, used to disambiguate `/`.
    last_kind: Option<TokenKind>,
}

/// Result of lexing: tokens + any errors collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: Diagnostics,
}

impl<'src> Lexer<'src> {
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            source: &source_file.source,
            source_file,
            pos: 0,
            line: 1,
            col: 1,
            errors: Diagnostics::empty(),
            mode_stack: vec![Mode::Normal],
            newline_pending: false,
            last_kind: None,
        }
    }

    /// Lex the entire source file into a token stream.
    pub fn lex(mut self) -> LexResult {
        let mut tokens = Vec::new();

        loop {
            if self.errors.total_errors >= MAX_ERRORS {
                break;
            }

            let mut token = match self.current_mode() {
                Mode::Template => self.scan_template(),
                Mode::Normal | Mode::Interpolation { .. } => self.scan_normal(),
            };
            token.newline_before = std::mem::take(&mut self.newline_pending);
            self.last_kind = Some(token.kind.clone());

            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            tokens.push(Token::new(TokenKind::Eof, self.point_span()));
        }

        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Mode stack helpers
    // ─────────────────────────────────────────────────────────────

    fn current_mode(&self) -> Mode {
        *self.mode_stack.last().unwrap_or(&Mode::Normal)
    }

    fn push_mode(&mut self, mode: Mode) {
        self.mode_stack.push(mode);
    }

    fn pop_mode(&mut self) {
        if self.mode_stack.len() > 1 {
            self.mode_stack.pop();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(n)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.source[self.pos..].starts_with(s)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn point_span(&self) -> Span {
        Span::point(self.pos, self.line, self.col)
    }

    fn span_from(&self, start: usize, line: u32, col: u32) -> Span {
        Span::new(start, self.pos, line, col)
    }

    fn emit_error(&mut self, code: ErrorCode, message: impl Into<String>, offset: usize) {
        let diag = Diagnostic::at(code, message, self.source_file, offset);
        self.errors.push(diag);
    }

    // ─────────────────────────────────────────────────────────────
    // Whitespace & comments
    // ─────────────────────────────────────────────────────────────

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some('\n') => {
                    self.newline_pending = true;
                    self.advance();
                }
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.pos;
                    self.advance_n(2);
                    loop {
                        if self.starts_with("*/") {
                            self.advance_n(2);
                            break;
                        }
                        match self.advance() {
                            Some('\n') => self.newline_pending = true,
                            Some(_) => {}
                            None => {
                                self.emit_error(
                                    ErrorCode::UNTERMINATED_LITERAL,
                                    "unterminated block comment",
                                    start,
                                );
                                return;
                            }
                        }
                    }
                }
                _ => return,
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Normal mode
    // ─────────────────────────────────────────────────────────────

    fn scan_normal(&mut self) -> Token {
        self.skip_trivia();

        let (start, line, col) = (self.pos, self.line, self.col);
        let Some(c) = self.peek() else {
            if self.current_mode() != Mode::Normal {
                self.emit_error(
                    ErrorCode::UNTERMINATED_LITERAL,
                    "unterminated template literal",
                    start,
                );
                self.mode_stack.truncate(1);
            }
            return Token::new(TokenKind::Eof, self.point_span());
        };

        let kind = if is_ident_start(c) {
            self.scan_identifier()
        } else if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            self.scan_number()
        } else if c == '\'' || c == '"' {
            self.scan_string(c)
        } else if c == '`' {
            self.advance();
            self.push_mode(Mode::Template);
            TokenKind::TemplateStart
        } else if c == '/' && !self.last_kind.as_ref().is_some_and(|k| k.ends_value()) {
            self.scan_regex()
        } else {
            self.scan_punct(c)
        };

        Token::new(kind, self.span_from(start, line, col))
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                self.advance();
            } else {
                break;
            }
        }
        let word = &self.source[start..self.pos];
        TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Identifier(word.to_string()))
    }

    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;
        let radix = match (self.peek(), self.peek_at(1)) {
            (Some('0'), Some('x' | 'X')) => 16,
            (Some('0'), Some('b' | 'B')) => 2,
            (Some('0'), Some('o' | 'O')) => 8,
            _ => 10,
        };
        if radix != 10 {
            self.advance_n(2);
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                self.advance();
            }
            let digits: String = self.source[digits_start..self.pos]
                .chars()
                .filter(|&c| c != '_' && c != 'n')
                .collect();
            return match u64::from_str_radix(&digits, radix) {
                Ok(n) => TokenKind::Number(n as f64),
                Err(_) => {
                    self.emit_error(ErrorCode::UNEXPECTED_TOKEN, "invalid number literal", start);
                    TokenKind::Number(0.0)
                }
            };
        }

        let digits = |lexer: &mut Self| {
            while lexer.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                lexer.advance();
            }
        };
        digits(self);
        if self.peek() == Some('.') && self.peek_at(1).is_none_or(|c| c != '.') {
            self.advance();
            digits(self);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.advance_n(digit_at);
                digits(self);
            }
        }
        let text: String = self.source[start..self.pos].chars().filter(|&c| c != '_').collect();
        // BigInt suffix is accepted and dropped.
        if self.peek() == Some('n') {
            self.advance();
        }
        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => {
                self.emit_error(ErrorCode::UNEXPECTED_TOKEN, "invalid number literal", start);
                TokenKind::Number(0.0)
            }
        }
    }

    /// Read one escape sequence after the backslash has been consumed.
    fn read_escape(&mut self) -> Option<String> {
        let c = self.advance()?;
        Some(match c {
            'n' => "\n".into(),
            't' => "\t".into(),
            'r' => "\r".into(),
            'b' => "\u{8}".into(),
            'f' => "\u{c}".into(),
            'v' => "\u{b}".into(),
            '0' => "\0".into(),
            // Line continuation.
            '\n' => String::new(),
            'x' => {
                let hex: String = (0..2).filter_map(|_| self.advance()).collect();
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_default()
            }
            'u' => {
                let hex: String = if self.peek() == Some('{') {
                    self.advance();
                    let mut h = String::new();
                    while let Some(c) = self.advance() {
                        if c == '}' {
                            break;
                        }
                        h.push(c);
                    }
                    h
                } else {
                    (0..4).filter_map(|_| self.advance()).collect()
                };
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_default()
            }
            other => other.to_string(),
        })
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let start = self.pos;
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    let diag = Diagnostic::at(
                        ErrorCode::UNTERMINATED_LITERAL,
                        "unterminated string literal",
                        self.source_file,
                        start,
                    )
                    .with_suggestion(format!("close the string with {quote}"));
                    self.errors.push(diag);
                    break;
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    if let Some(esc) = self.read_escape() {
                        value.push_str(&esc);
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        TokenKind::String(value)
    }

    fn scan_regex(&mut self) -> TokenKind {
        let start = self.pos;
        self.advance();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.emit_error(
                        ErrorCode::UNTERMINATED_LITERAL,
                        "unterminated pattern literal",
                        start,
                    );
                    break;
                }
                Some('\\') => {
                    pattern.push('\\');
                    self.advance();
                    if let Some(c) = self.advance() {
                        pattern.push(c);
                    }
                }
                Some('/') if !in_class => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    if c == '[' {
                        in_class = true;
                    } else if c == ']' {
                        in_class = false;
                    }
                    pattern.push(c);
                    self.advance();
                }
            }
        }
        let flags_start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.advance();
        }
        TokenKind::Regex {
            pattern,
            flags: self.source[flags_start..self.pos].to_string(),
        }
    }

    fn scan_punct(&mut self, c: char) -> TokenKind {
        // Longest match first.
        const OPERATORS: &[(&str, TokenKind)] = &[
            (">>>", TokenKind::UShr),
            ("===", TokenKind::EqEqEq),
            ("!==", TokenKind::BangEqEq),
            ("**=", TokenKind::StarStarEq),
            ("&&=", TokenKind::AmpAmpEq),
            ("||=", TokenKind::PipePipeEq),
            ("??=", TokenKind::QuestionQuestionEq),
            ("...", TokenKind::Ellipsis),
            ("=>", TokenKind::Arrow),
            ("==", TokenKind::EqEq),
            ("!=", TokenKind::BangEq),
            ("<=", TokenKind::LtEq),
            (">=", TokenKind::GtEq),
            ("<<", TokenKind::Shl),
            (">>", TokenKind::Shr),
            ("&&", TokenKind::AmpAmp),
            ("||", TokenKind::PipePipe),
            ("??", TokenKind::QuestionQuestion),
            ("**", TokenKind::StarStar),
            ("++", TokenKind::PlusPlus),
            ("--", TokenKind::MinusMinus),
            ("+=", TokenKind::PlusEq),
            ("-=", TokenKind::MinusEq),
            ("*=", TokenKind::StarEq),
            ("/=", TokenKind::SlashEq),
            ("%=", TokenKind::PercentEq),
        ];

        if c == '?' && self.peek_at(1) == Some('.') && !self.peek_at(2).is_some_and(|d| d.is_ascii_digit()) {
            self.advance_n(2);
            return TokenKind::QuestionDot;
        }
        for (text, kind) in OPERATORS {
            if self.starts_with(text) {
                self.advance_n(text.chars().count());
                return kind.clone();
            }
        }

        let start = self.pos;
        self.advance();
        match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => {
                if let Some(Mode::Interpolation { brace_depth }) = self.mode_stack.last_mut() {
                    *brace_depth += 1;
                }
                TokenKind::LBrace
            }
            '}' => match self.current_mode() {
                Mode::Interpolation { brace_depth: 0 } => {
                    self.pop_mode();
                    TokenKind::InterpolationEnd
                }
                _ => {
                    if let Some(Mode::Interpolation { brace_depth }) = self.mode_stack.last_mut() {
                        *brace_depth -= 1;
                    }
                    TokenKind::RBrace
                }
            },
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '!' => TokenKind::Bang,
            '~' => TokenKind::Tilde,
            '&' => TokenKind::Amp,
            '|' => TokenKind::Pipe,
            '^' => TokenKind::Caret,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '=' => TokenKind::Eq,
            other => {
                self.emit_error(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("unexpected character '{other}'"),
                    start,
                );
                if self.errors.total_errors >= MAX_ERRORS {
                    return TokenKind::Eof;
                }
                return self.scan_normal().kind;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Template mode
    // ─────────────────────────────────────────────────────────────

    fn scan_template(&mut self) -> Token {
        let (start, line, col) = (self.pos, self.line, self.col);
        let mut chunk = String::new();
        loop {
            match self.peek() {
                None => {
                    self.emit_error(
                        ErrorCode::UNTERMINATED_LITERAL,
                        "unterminated template literal",
                        start,
                    );
                    self.mode_stack.truncate(1);
                    if chunk.is_empty() {
                        return Token::new(TokenKind::Eof, self.point_span());
                    }
                    break;
                }
                Some('`') | Some('$') if !chunk.is_empty() && self.at_template_delimiter() => break,
                Some('`') => {
                    self.advance();
                    self.pop_mode();
                    return Token::new(TokenKind::TemplateEnd, self.span_from(start, line, col));
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.advance_n(2);
                    self.push_mode(Mode::Interpolation { brace_depth: 0 });
                    return Token::new(
                        TokenKind::InterpolationStart,
                        self.span_from(start, line, col),
                    );
                }
                Some('\\') => {
                    self.advance();
                    if let Some(esc) = self.read_escape() {
                        chunk.push_str(&esc);
                    }
                }
                Some(c) => {
                    chunk.push(c);
                    self.advance();
                }
            }
        }
        Token::new(TokenKind::TemplateChunk(chunk), self.span_from(start, line, col))
    }

    fn at_template_delimiter(&self) -> bool {
        self.starts_with("`") || self.starts_with("${")
    }
}

/// Lex a source file in one call.
pub fn lex(source_file: &SourceFile) -> LexResult {
    Lexer::new(source_file).lex()
}
