//! Ordered source-to-source rewrite passes.
//!
//! Each pass takes the current module text and the [`CompileContext`] and
//! returns new text. A pass leaves text it does not recognize untouched and
//! never changes the number of lines, so a diagnostic computed on any
//! intermediate text points at the right surface line.
//!
//! Order: [`tests`] → [`declarations`] → [`params`] → [`safety`] →
//! [`operators`] → [`terminators`] → [`polymorphic`].
//!
//! [`CompileContext`]: crate::context::CompileContext

pub mod declarations;
pub mod operators;
pub mod params;
pub mod polymorphic;
pub mod safety;
pub mod terminators;
pub mod tests;

use exemplar_lexer::balance::{find_matching, ident_at, is_ident_byte, is_ident_char, prev_significant, skip_trivia};
use exemplar_lexer::{CodeMask, ScanState};
use exemplar_types::ast::Program;
use exemplar_types::{Diagnostic, ErrorCode, SourceFile};

/// Reserved words never treated as names by the passes.
pub(crate) const KEYWORDS: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "export", "extends", "false", "finally", "for", "function", "if",
    "import", "in", "instanceof", "let", "new", "null", "of", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void", "while",
    "with", "yield",
];

pub(crate) fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Byte that can end an expression operand.
pub(crate) fn ends_operand(b: u8) -> bool {
    is_ident_byte(b) || matches!(b, b')' | b']' | b'\'' | b'"' | b'`')
}

/// The identifier ending exactly at `end` (exclusive), with its start.
pub(crate) fn word_before(text: &str, end: usize) -> Option<(&str, usize)> {
    let head = text.get(..end)?;
    let start = head
        .char_indices()
        .rev()
        .take_while(|&(_, c)| is_ident_char(c))
        .last()
        .map(|(i, _)| i)?;
    Some((&text[start..end], start))
}

/// `true` if `at` begins a statement: nothing but a statement boundary or
/// a line break after a complete operand precedes it.
pub(crate) fn at_statement_start(text: &str, mask: &CodeMask, at: usize) -> bool {
    let bytes = text.as_bytes();
    let Some(prev) = prev_significant(text, mask, at) else {
        return true;
    };
    if let Some((word, start)) = word_before(text, prev + 1) {
        if word == "export" {
            return at_statement_start(text, mask, start);
        }
    }
    match bytes[prev] {
        b';' | b'{' | b'}' => true,
        b => ends_operand(b) && text[prev + 1..at].contains('\n'),
    }
}

/// `true` if the text at `at` continues the expression of the line above.
pub(crate) fn begins_continuation(text: &str, at: usize) -> bool {
    let rest = &text[at.min(text.len())..];
    let Some(&first) = rest.as_bytes().first() else {
        return false;
    };
    if rest.starts_with("!=") {
        return true;
    }
    if matches!(
        first,
        b'.' | b'?' | b')' | b']' | b'}' | b',' | b':' | b'+' | b'-' | b'*' | b'/' | b'%' | b'='
            | b'<' | b'>' | b'&' | b'|' | b'^' | b'{'
    ) {
        return true;
    }
    ["else", "catch", "finally", "instanceof", "in"]
        .iter()
        .any(|w| exemplar_lexer::balance::is_word_at(text, at, w))
}

/// `true` if a line ending in byte `b` cannot end a statement.
fn ends_with_operator(b: u8) -> bool {
    matches!(
        b,
        b'=' | b'+' | b'-' | b'*' | b'/' | b'%' | b'|' | b'&' | b',' | b'(' | b'[' | b'{' | b':'
            | b'?' | b'<' | b'>' | b'!'
    )
}

/// End (exclusive, whitespace trimmed) of the statement starting at `from`.
///
/// Stops at a `;`, at a closing bracket of an enclosing construct, or at a
/// line break that neither the line above nor the line below continues.
pub(crate) fn statement_end(text: &str, mask: &CodeMask, from: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = from;
    let end = loop {
        if i >= bytes.len() {
            break bytes.len();
        }
        if !mask.is_code(i) {
            i += 1;
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => match find_matching(text, mask, i) {
                Ok(close) => i = close + 1,
                Err(_) => break bytes.len(),
            },
            b';' | b')' | b']' | b'}' => break i,
            b'\n' => {
                let next = skip_trivia(text, mask, i);
                let prev = prev_significant(text, mask, i);
                let continued = next < bytes.len() && begins_continuation(text, next)
                    && !matches!(bytes[next], b')' | b']' | b'}');
                let open = prev.is_some_and(|p| p >= from && ends_with_operator(bytes[p]));
                if continued || open {
                    i += 1;
                } else {
                    break i;
                }
            }
            _ => i += 1,
        }
    };
    let mut end = end;
    while end > from && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    end
}

/// A string literal starting at `at`: its unquoted content and end offset.
pub(crate) fn string_literal_at(text: &str, mask: &CodeMask, at: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let quote = *bytes.get(at)?;
    let state = match quote {
        b'\'' => ScanState::SingleQuote,
        b'"' => ScanState::DoubleQuote,
        _ => return None,
    };
    let mut end = at + 1;
    while end < bytes.len() && mask.state(end) == state {
        if bytes[end] == quote && bytes[end - 1] != b'\\' {
            end += 1;
            return Some((text[at + 1..end - 1].to_string(), end));
        }
        end += 1;
    }
    None
}

/// End of the literal or pattern whose first byte is at `at`.
pub(crate) fn literal_end(text: &str, mask: &CodeMask, at: usize) -> usize {
    let bytes = text.as_bytes();
    let state = mask.state(at);
    let mut end = at + 1;
    match state {
        ScanState::Template => {
            while end < bytes.len()
                && matches!(mask.state(end), ScanState::Template | ScanState::TemplateInterpolation)
            {
                // Closing backtick ends the template.
                if bytes[end] == b'`' && mask.state(end) == ScanState::Template {
                    return end + 1;
                }
                end += 1;
            }
            end
        }
        ScanState::SingleQuote | ScanState::DoubleQuote => {
            string_literal_at(text, mask, at).map_or(bytes.len(), |(_, e)| e)
        }
        ScanState::Pattern => {
            while end < bytes.len() && mask.state(end) == ScanState::Pattern {
                end += 1;
            }
            // Flags.
            ident_at(text, end).map_or(end, |(_, e)| e)
        }
        _ => end,
    }
}

/// Parse rewritten module text; the first parse error is fatal.
pub(crate) fn parse_program(source: &SourceFile) -> Result<Program, Diagnostic> {
    let parsed = exemplar_parser::parse(source);
    match (parsed.program, parsed.errors.into_result()) {
        (_, Err(first)) => Err(first),
        (Some(program), Ok(_)) => Ok(program),
        (None, Ok(_)) => Err(Diagnostic::at(
            ErrorCode::UNEXPECTED_TOKEN,
            "module could not be parsed",
            source,
            0,
        )),
    }
}

/// Normalize a type expression: a single `|` or `&` becomes `||` / `&&`.
pub(crate) fn double_separators(text: &str) -> String {
    let mask = CodeMask::new(text);
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + 4);
    for (i, ch) in text.char_indices() {
        out.push(ch);
        if (ch == '|' || ch == '&') && mask.is_code(i) {
            let prev = i.checked_sub(1).map(|p| bytes[p]);
            let next = bytes.get(i + 1).copied();
            if prev != Some(bytes[i]) && next != Some(bytes[i]) {
                out.push(ch);
            }
        }
    }
    out
}
