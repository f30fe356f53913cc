//! Lexer tests.
//!
//! Covers: keywords vs contextual words, operators (longest match),
//! literals (number, string, template, pattern), comments, line-break
//! tracking, error recovery, and determinism.

use exemplar_lexer::{Lexer, TokenKind};
use exemplar_types::SourceFile;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Lex source text and return just the token kinds (excluding final Eof).
fn kinds(source: &str) -> Vec<TokenKind> {
    let sf = SourceFile::new("test.ex", source);
    let result = Lexer::new(&sf).lex();
    result
        .tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

/// Lex and return the error count.
fn error_count(source: &str) -> usize {
    let sf = SourceFile::new("test.ex", source);
    Lexer::new(&sf).lex().errors.total_errors
}

/// Lex and return the first error message.
fn first_error(source: &str) -> String {
    let sf = SourceFile::new("test.ex", source);
    let result = Lexer::new(&sf).lex();
    result
        .errors
        .errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_default()
}

fn ident(name: &str) -> TokenKind {
    TokenKind::Identifier(name.to_string())
}

// ─────────────────────────────────────────────────────────────────────
// Keywords
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_reserved_keywords() {
    for word in exemplar_lexer::ALL_KEYWORDS {
        let toks = kinds(word);
        assert_eq!(toks.len(), 1, "{word}");
        assert!(toks[0].is_keyword(), "{word} should lex as a keyword");
        assert_eq!(toks[0].to_string(), *word);
    }
}

#[test]
fn test_contextual_words_are_identifiers() {
    for word in ["of", "from", "as", "async", "await", "get", "set", "static", "unsafe"] {
        assert_eq!(kinds(word), vec![ident(word)], "{word}");
    }
}

#[test]
fn test_identifier_characters() {
    assert_eq!(kinds("$el _x a1 name$2"), vec![ident("$el"), ident("_x"), ident("a1"), ident("name$2")]);
    assert_eq!(kinds("größe"), vec![ident("größe")]);
}

// ─────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_longest_match_operators() {
    assert_eq!(
        kinds("=== !== == != => ... ?? ?. >>> **="),
        vec![
            TokenKind::EqEqEq,
            TokenKind::BangEqEq,
            TokenKind::EqEq,
            TokenKind::BangEq,
            TokenKind::Arrow,
            TokenKind::Ellipsis,
            TokenKind::QuestionQuestion,
            TokenKind::QuestionDot,
            TokenKind::UShr,
            TokenKind::StarStarEq,
        ]
    );
}

#[test]
fn test_optional_chain_vs_conditional_number() {
    // `a?.5:1` is a conditional with `.5`, not optional chaining.
    assert_eq!(
        kinds("a?.5:1"),
        vec![ident("a"), TokenKind::Question, TokenKind::Number(0.5), TokenKind::Colon, TokenKind::Number(1.0)]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Literals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_numbers() {
    assert_eq!(
        kinds("0 42 3.14 .5 1e3 2.5E-2 0xff 0b101 0o17 1_000"),
        vec![
            TokenKind::Number(0.0),
            TokenKind::Number(42.0),
            TokenKind::Number(3.14),
            TokenKind::Number(0.5),
            TokenKind::Number(1000.0),
            TokenKind::Number(0.025),
            TokenKind::Number(255.0),
            TokenKind::Number(5.0),
            TokenKind::Number(15.0),
            TokenKind::Number(1000.0),
        ]
    );
}

#[test]
fn test_strings_and_escapes() {
    assert_eq!(
        kinds(r#"'a\'b' "line\n" 'A\x42' "\u{1F600}""#),
        vec![
            TokenKind::String("a'b".into()),
            TokenKind::String("line\n".into()),
            TokenKind::String("AB".into()),
            TokenKind::String("😀".into()),
        ]
    );
}

#[test]
fn test_template_with_interpolation() {
    assert_eq!(
        kinds("`a ${b} c`"),
        vec![
            TokenKind::TemplateStart,
            TokenKind::TemplateChunk("a ".into()),
            TokenKind::InterpolationStart,
            ident("b"),
            TokenKind::InterpolationEnd,
            TokenKind::TemplateChunk(" c".into()),
            TokenKind::TemplateEnd,
        ]
    );
}

#[test]
fn test_template_with_object_in_interpolation() {
    let toks = kinds("`${ {x: 1}.x }`");
    assert_eq!(toks[0], TokenKind::TemplateStart);
    assert_eq!(toks[1], TokenKind::InterpolationStart);
    assert_eq!(toks[2], TokenKind::LBrace);
    assert!(toks.contains(&TokenKind::RBrace));
    assert_eq!(toks[toks.len() - 2], TokenKind::InterpolationEnd);
    assert_eq!(toks[toks.len() - 1], TokenKind::TemplateEnd);
}

#[test]
fn test_nested_template() {
    let toks = kinds("`a${`b${c}`}`");
    let starts = toks.iter().filter(|k| **k == TokenKind::TemplateStart).count();
    let ends = toks.iter().filter(|k| **k == TokenKind::TemplateEnd).count();
    assert_eq!((starts, ends), (2, 2));
    assert_eq!(error_count("`a${`b${c}`}`"), 0);
}

#[test]
fn test_pattern_literal_vs_division() {
    assert_eq!(
        kinds("x = /ab+c/gi"),
        vec![
            ident("x"),
            TokenKind::Eq,
            TokenKind::Regex {
                pattern: "ab+c".into(),
                flags: "gi".into()
            },
        ]
    );
    assert_eq!(
        kinds("a / b"),
        vec![ident("a"), TokenKind::Slash, ident("b")]
    );
    assert_eq!(
        kinds("(1) / 2"),
        vec![TokenKind::LParen, TokenKind::Number(1.0), TokenKind::RParen, TokenKind::Slash, TokenKind::Number(2.0)]
    );
}

#[test]
fn test_pattern_with_slash_in_class() {
    assert_eq!(
        kinds("/[/]x/"),
        vec![TokenKind::Regex {
            pattern: "[/]x".into(),
            flags: String::new()
        }]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Comments & line breaks
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_comments_skipped() {
    assert_eq!(kinds("a // b\n/* c */ d"), vec![ident("a"), ident("d")]);
}

#[test]
fn test_newline_before_flag() {
    let sf = SourceFile::new("test.ex", "a\nb c /*\n*/ d");
    let tokens = Lexer::new(&sf).lex().tokens;
    let flags: Vec<bool> = tokens.iter().map(|t| t.newline_before).collect();
    assert_eq!(flags, vec![false, true, false, true, false]);
}

#[test]
fn test_spans() {
    let sf = SourceFile::new("test.ex", "let x\n  = 10");
    let tokens = Lexer::new(&sf).lex().tokens;
    let ten = &tokens[3];
    assert_eq!(ten.kind, TokenKind::Number(10.0));
    assert_eq!((ten.span.line, ten.span.column), (2, 5));
    assert_eq!(&sf.source[ten.span.start..ten.span.end], "10");
}

// ─────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unterminated_string() {
    assert_eq!(first_error("'abc\nx"), "unterminated string literal");
}

#[test]
fn test_unterminated_template() {
    assert_eq!(first_error("`abc"), "unterminated template literal");
}

#[test]
fn test_unterminated_block_comment() {
    assert_eq!(first_error("a /* b"), "unterminated block comment");
}

#[test]
fn test_unexpected_character_recovers() {
    let toks = kinds("a # b");
    assert_eq!(toks, vec![ident("a"), ident("b")]);
    assert_eq!(first_error("a # b"), "unexpected character '#'");
}

#[test]
fn test_error_cap() {
    let source = "#".repeat(50);
    assert_eq!(error_count(&source), exemplar_types::MAX_ERRORS);
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_determinism_100_iterations() {
    let source = "function f(a = 0, b = '') { return `${a}:${b}`.split(/:/) }";
    let first = kinds(source);
    for _ in 0..100 {
        assert_eq!(kinds(source), first);
    }
}
