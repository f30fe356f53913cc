//! Statement terminators.
//!
//! A `;` is inserted at a line end when the innermost open bracket is a
//! block (or there is none), the line ends an expression and the next
//! line does not continue it.

use super::{begins_continuation, word_before};
use crate::context::CompileContext;
use exemplar_lexer::balance::{find_matching_backward, is_ident_byte, prev_significant, skip_trivia};
use exemplar_lexer::{CodeMask, ScanState, Splicer};
use exemplar_types::Diagnostic;

/// Trailing words after which a statement cannot end.
const OPEN_WORDS: &[&str] = &[
    "else", "do", "try", "finally", "case", "default", "typeof", "new", "void", "delete", "await",
    "in", "of", "instanceof", "extends", "async", "function", "class", "const", "let", "var",
    "static", "get", "set",
];

/// Words whose parenthesized head is followed by a body, not a `;`.
const HEAD_WORDS: &[&str] = &["if", "while", "for", "switch", "catch", "with", "function"];

pub fn run(text: &str, _ctx: &mut CompileContext) -> Result<String, Diagnostic> {
    let out = terminate(text);
    tracing::debug!(inserted = out.len() - text.len(), "inserted statement terminators");
    Ok(out)
}

pub fn terminate(text: &str) -> String {
    let mask = CodeMask::new(text);
    let bytes = text.as_bytes();
    let mut splicer = Splicer::new();
    let mut stack: Vec<u8> = Vec::new();
    let mut line_start = 0;

    for i in 0..=bytes.len() {
        let at_end = i == bytes.len();
        if !at_end && mask.is_code(i) {
            match bytes[i] {
                b'(' | b'[' | b'{' => stack.push(bytes[i]),
                b')' | b']' | b'}' => {
                    stack.pop();
                }
                _ => {}
            }
        }
        let line_break = at_end || (bytes[i] == b'\n' && mask.is_code(i));
        if !line_break {
            continue;
        }
        let this_line = line_start;
        line_start = i + 1;
        if !matches!(stack.last(), None | Some(b'{')) {
            continue;
        }
        let Some(last) = prev_significant(text, &mask, i) else {
            continue;
        };
        if last < this_line || !ends_statement(text, &mask, last) {
            continue;
        }
        if !at_end {
            let next = skip_trivia(text, &mask, i);
            if next < bytes.len() && begins_continuation(text, next) {
                continue;
            }
        }
        splicer.insert(last + 1, ";");
    }
    splicer.apply(text)
}

/// `true` if a statement may end right after byte `last`.
fn ends_statement(text: &str, mask: &CodeMask, last: usize) -> bool {
    let bytes = text.as_bytes();
    match mask.state(last) {
        ScanState::SingleQuote | ScanState::DoubleQuote | ScanState::Template | ScanState::Pattern => {
            return true;
        }
        state if !state.is_code() => return false,
        _ => {}
    }
    match bytes[last] {
        b if is_ident_byte(b) => {
            !word_before(text, last + 1).is_some_and(|(word, _)| OPEN_WORDS.contains(&word))
        }
        b']' => true,
        b')' => !closes_head(text, mask, last),
        b'+' | b'-' => last >= 1 && bytes[last - 1] == bytes[last],
        _ => false,
    }
}

/// `true` if the `)` at `close` ends a control or function head.
fn closes_head(text: &str, mask: &CodeMask, close: usize) -> bool {
    let Some(open) = find_matching_backward(text, mask, close) else {
        return false;
    };
    let Some(before) = prev_significant(text, mask, open) else {
        return false;
    };
    let Some((word, start)) = word_before(text, before + 1) else {
        return false;
    };
    if HEAD_WORDS.contains(&word) {
        return true;
    }
    // `function name(...)`
    prev_significant(text, mask, start)
        .and_then(|p| word_before(text, p + 1))
        .is_some_and(|(w, _)| w == "function")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_statements() {
        assert_eq!(terminate("const a = 1\nconst b = a + 1\n"), "const a = 1;\nconst b = a + 1;\n");
    }

    #[test]
    fn test_last_line_without_newline() {
        assert_eq!(terminate("const a = 1 // one\nconst b = 2"), "const a = 1; // one\nconst b = 2;");
    }

    #[test]
    fn test_continuations_are_joined() {
        assert_eq!(terminate("const x = foo()\n  .bar()\n"), "const x = foo()\n  .bar();\n");
        assert_eq!(terminate("const y = a\n  || b\n"), "const y = a\n  || b;\n");
    }

    #[test]
    fn test_control_heads_not_terminated() {
        assert_eq!(terminate("if (x)\n  y()\n"), "if (x)\n  y();\n");
        assert_eq!(terminate("function f(a)\n{\n  a++\n  return a\n}\n"), "function f(a)\n{\n  a++;\n  return a\n}\n");
    }

    #[test]
    fn test_inside_parens_untouched() {
        assert_eq!(terminate("call(a,\n  b)\n"), "call(a,\n  b);\n");
    }

    #[test]
    fn test_closing_brace_and_else_continue() {
        assert_eq!(
            terminate("if (a) {\n  b()\n  d()\n} else {\n  c()\n}\n"),
            "if (a) {\n  b();\n  d()\n} else {\n  c()\n}\n"
        );
    }

    #[test]
    fn test_multiline_template() {
        assert_eq!(terminate("const t = `a\nb`\n"), "const t = `a\nb`;\n");
    }

    #[test]
    fn test_open_words_and_updates() {
        assert_eq!(terminate("let x = a instanceof\n  B\n"), "let x = a instanceof\n  B;\n");
        assert_eq!(terminate("x++\ny--\n"), "x++;\ny--;\n");
    }
}
