//! Exemplar parser: converts a token stream into an AST.
//!
//! Two grammars are served from one token cursor: the host-language subset
//! that rewritten modules are written in ([`parse`], [`parse_expression`])
//! and the declaration signatures of the statically-annotated dialect
//! ([`parse_annotated`]).

mod parse_decl;
mod parse_expr;
mod parse_stmt;
mod parse_type;
mod parser;

pub use parser::{ParseResult, Parser};

use exemplar_lexer::Lexer;
use exemplar_types::annotation::AnnotatedModule;
use exemplar_types::ast::Expr;
use exemplar_types::{Diagnostics, ErrorCode, SourceFile};

/// Lex and parse a whole module.
///
/// Lexer errors are reported first; the parser still runs so that a single
/// call surfaces as many problems as possible.
pub fn parse(source: &SourceFile) -> ParseResult {
    let lexed = Lexer::new(source).lex();
    let mut result = Parser::new(lexed.tokens, source).parse();
    if lexed.errors.has_errors() {
        let mut errors = lexed.errors;
        for diag in result.errors.errors.drain(..) {
            errors.push(diag);
        }
        result.errors = errors;
        result.program = None;
    }
    result
}

/// Parse a standalone expression (an example value, a default literal).
pub fn parse_expression(source: &SourceFile) -> Result<Expr, Diagnostics> {
    let lexed = Lexer::new(source).lex();
    if lexed.errors.has_errors() {
        return Err(lexed.errors);
    }
    let mut parser = Parser::new(lexed.tokens, source);
    let expr = parser.parse_expression();
    if expr.is_some() && !parser.at_end() {
        parser.error_at_current(
            ErrorCode::UNEXPECTED_TOKEN,
            format!("unexpected '{}' after expression", parser.peek_kind()),
        );
    }
    let errors = parser.into_errors();
    match expr {
        Some(expr) if !errors.has_errors() => Ok(expr),
        _ => Err(errors),
    }
}

/// Scan a module written in the statically-annotated dialect.
///
/// Returns every declaration signature that could be read together with the
/// collected diagnostics. Unparseable regions are skipped, not fatal.
pub fn parse_annotated(source: &SourceFile) -> (AnnotatedModule, Diagnostics) {
    let lexed = Lexer::new(source).lex();
    let mut parser = Parser::new(lexed.tokens, source);
    let module = parser.parse_annotated_module();
    let mut errors = lexed.errors;
    for diag in parser.into_errors().errors {
        errors.push(diag);
    }
    (module, errors)
}
