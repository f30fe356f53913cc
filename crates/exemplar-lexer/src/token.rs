//! Token types for the host-language subset.
//!
//! Defines [`TokenKind`] covering every lexeme the parser consumes and
//! [`Token`], which pairs a kind with a source [`Span`].

use exemplar_types::Span;
use std::fmt;

/// Reserved words the lexer turns into keyword tokens.
///
/// Contextual words (`of`, `from`, `as`, `async`, `await`, `get`, `set`,
/// `static`, `unsafe`) stay identifiers; the parser recognizes them by name.
pub const ALL_KEYWORDS: &[&str] = &[
    "var", "let", "const", "function", "return", "if", "else", "while", "do", "for", "break",
    "continue", "throw", "try", "catch", "finally", "switch", "case", "default", "new",
    "delete", "typeof", "instanceof", "void", "in", "class", "extends", "super", "this", "null",
    "true", "false", "import", "export",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

/// A single token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line break separates this token from the previous one.
    pub newline_before: bool,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self {
            kind,
            span,
            newline_before: false,
        }
    }

    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    Number(f64),
    /// Cooked string contents.
    String(String),
    Regex { pattern: String, flags: String },

    // ── Templates ─────────────────────────────────────────────
    /// Opening backtick.
    TemplateStart,
    /// Cooked literal text between interpolations.
    TemplateChunk(String),
    /// `${`
    InterpolationStart,
    /// The `}` closing an interpolation.
    InterpolationEnd,
    /// Closing backtick.
    TemplateEnd,

    Identifier(String),

    // ── Keywords ──────────────────────────────────────────────
    Var,
    Let,
    Const,
    Function,
    Return,
    If,
    Else,
    While,
    Do,
    For,
    Break,
    Continue,
    Throw,
    Try,
    Catch,
    Finally,
    Switch,
    Case,
    Default,
    New,
    Delete,
    Typeof,
    Instanceof,
    Void,
    In,
    Class,
    Extends,
    Super,
    This,
    Null,
    True,
    False,
    Import,
    Export,

    // ── Punctuation ───────────────────────────────────────────
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    Ellipsis,
    Colon,
    Question,
    QuestionDot,
    Arrow,

    // ── Operators ─────────────────────────────────────────────
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Bang,
    Tilde,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    QuestionQuestion,
    Shl,
    Shr,
    UShr,
    Lt,
    LtEq,
    Gt,
    GtEq,
    EqEq,
    EqEqEq,
    BangEq,
    BangEqEq,

    // ── Assignment ────────────────────────────────────────────
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    StarStarEq,
    SlashEq,
    PercentEq,
    AmpAmpEq,
    PipePipeEq,
    QuestionQuestionEq,

    Eof,
}

impl TokenKind {
    /// Map a word to its keyword token, if it is reserved.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "var" => TokenKind::Var,
            "let" => TokenKind::Let,
            "const" => TokenKind::Const,
            "function" => TokenKind::Function,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "throw" => TokenKind::Throw,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "finally" => TokenKind::Finally,
            "switch" => TokenKind::Switch,
            "case" => TokenKind::Case,
            "default" => TokenKind::Default,
            "new" => TokenKind::New,
            "delete" => TokenKind::Delete,
            "typeof" => TokenKind::Typeof,
            "instanceof" => TokenKind::Instanceof,
            "void" => TokenKind::Void,
            "in" => TokenKind::In,
            "class" => TokenKind::Class,
            "extends" => TokenKind::Extends,
            "super" => TokenKind::Super,
            "this" => TokenKind::This,
            "null" => TokenKind::Null,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "import" => TokenKind::Import,
            "export" => TokenKind::Export,
            _ => return None,
        })
    }

    pub fn is_keyword(&self) -> bool {
        self.keyword_text().is_some()
    }

    /// The source spelling of a keyword token.
    pub fn keyword_text(&self) -> Option<&'static str> {
        Some(match self {
            TokenKind::Var => "var",
            TokenKind::Let => "let",
            TokenKind::Const => "const",
            TokenKind::Function => "function",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Do => "do",
            TokenKind::For => "for",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Throw => "throw",
            TokenKind::Try => "try",
            TokenKind::Catch => "catch",
            TokenKind::Finally => "finally",
            TokenKind::Switch => "switch",
            TokenKind::Case => "case",
            TokenKind::Default => "default",
            TokenKind::New => "new",
            TokenKind::Delete => "delete",
            TokenKind::Typeof => "typeof",
            TokenKind::Instanceof => "instanceof",
            TokenKind::Void => "void",
            TokenKind::In => "in",
            TokenKind::Class => "class",
            TokenKind::Extends => "extends",
            TokenKind::Super => "super",
            TokenKind::This => "this",
            TokenKind::Null => "null",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Import => "import",
            TokenKind::Export => "export",
            _ => return None,
        })
    }

    /// `true` if a `/` after this token divides rather than opens a pattern.
    pub fn ends_value(&self) -> bool {
        matches!(
            self,
            TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Regex { .. }
                | TokenKind::TemplateEnd
                | TokenKind::Identifier(_)
                | TokenKind::This
                | TokenKind::Super
                | TokenKind::Null
                | TokenKind::True
                | TokenKind::False
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::PlusPlus
                | TokenKind::MinusMinus
        )
    }

    /// `true` for `=` and the compound assignment operators.
    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::StarStarEq
                | TokenKind::SlashEq
                | TokenKind::PercentEq
                | TokenKind::AmpAmpEq
                | TokenKind::PipePipeEq
                | TokenKind::QuestionQuestionEq
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.keyword_text() {
            return f.write_str(text);
        }
        match self {
            TokenKind::Number(n) => write!(f, "{n}"),
            TokenKind::String(s) => write!(f, "'{s}'"),
            TokenKind::Regex { pattern, flags } => write!(f, "/{pattern}/{flags}"),
            TokenKind::TemplateStart | TokenKind::TemplateEnd => write!(f, "`"),
            TokenKind::TemplateChunk(s) => write!(f, "{s}"),
            TokenKind::InterpolationStart => write!(f, "${{"),
            TokenKind::InterpolationEnd => write!(f, "}}"),
            TokenKind::Identifier(name) => write!(f, "{name}"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Ellipsis => write!(f, "..."),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::QuestionDot => write!(f, "?."),
            TokenKind::Arrow => write!(f, "=>"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::StarStar => write!(f, "**"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::PlusPlus => write!(f, "++"),
            TokenKind::MinusMinus => write!(f, "--"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::Tilde => write!(f, "~"),
            TokenKind::Amp => write!(f, "&"),
            TokenKind::AmpAmp => write!(f, "&&"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::PipePipe => write!(f, "||"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::QuestionQuestion => write!(f, "??"),
            TokenKind::Shl => write!(f, "<<"),
            TokenKind::Shr => write!(f, ">>"),
            TokenKind::UShr => write!(f, ">>>"),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::LtEq => write!(f, "<="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::GtEq => write!(f, ">="),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::EqEqEq => write!(f, "==="),
            TokenKind::BangEq => write!(f, "!="),
            TokenKind::BangEqEq => write!(f, "!=="),
            TokenKind::Eq => write!(f, "="),
            TokenKind::PlusEq => write!(f, "+="),
            TokenKind::MinusEq => write!(f, "-="),
            TokenKind::StarEq => write!(f, "*="),
            TokenKind::StarStarEq => write!(f, "**="),
            TokenKind::SlashEq => write!(f, "/="),
            TokenKind::PercentEq => write!(f, "%="),
            TokenKind::AmpAmpEq => write!(f, "&&="),
            TokenKind::PipePipeEq => write!(f, "||="),
            TokenKind::QuestionQuestionEq => write!(f, "??="),
            TokenKind::Eof => write!(f, "end of input"),
            _ => Ok(()),
        }
    }
}
