//! Structural equality: `a == b` → `Is(a, b)`, `a != b` → `IsNot(a, b)`.
//!
//! Operand extents are found by scanning outward from the operator over
//! literals, names, bracketed groups, member and call chains, unary
//! prefixes and any binary operator that binds tighter than equality.
//! Strict `===` and `!==` are left alone.

use super::{ends_operand, literal_end, word_before};
use crate::context::CompileContext;
use exemplar_lexer::balance::{
    find_matching, find_matching_backward, ident_at, is_ident_byte, is_ident_start_byte,
    preserve_lines, prev_significant, skip_trivia,
};
use exemplar_lexer::{CodeMask, ScanState, Splicer};
use exemplar_types::Diagnostic;

/// Binary operators with higher precedence than equality.
const TIGHTER: &[&str] = &["+", "-", "*", "/", "%", "**", "<<", ">>", ">>>", "<", ">", "<=", ">="];

/// Prefix keywords that bind tighter than equality.
const PREFIX_WORDS: &[&str] = &["typeof", "void", "await", "delete", "new"];

/// Keywords usable as operand values.
const VALUE_WORDS: &[&str] = &["this", "super", "true", "false", "null", "undefined"];

/// Nested comparisons are rewritten one level per round.
const MAX_ROUNDS: usize = 32;

pub fn run(text: &str, _ctx: &mut CompileContext) -> Result<String, Diagnostic> {
    let out = rewrite(text);
    tracing::debug!(bytes = out.len(), "rewrote equality operators");
    Ok(out)
}

/// Rewrite every loose equality in `text`, nested ones included.
pub fn rewrite(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_ROUNDS {
        let (next, changed) = rewrite_round(&current);
        current = next;
        if changed == 0 {
            break;
        }
    }
    current
}

fn rewrite_round(text: &str) -> (String, usize) {
    let mask = CodeMask::new(text);
    let bytes = text.as_bytes();
    let mut splicer = Splicer::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        let Some(helper) = equality_at(bytes, &mask, i) else {
            i += 1;
            continue;
        };
        let right_from = i + 2;
        if let (Some(ls), Some(re)) = (operand_start(text, &mask, i), operand_end(text, &mask, right_from)) {
            let left = text[ls..i].trim_end();
            let right = text[right_from..re].trim_start();
            let call = format!("{helper}({left}, {right})");
            splicer.replace(ls, re, preserve_lines(&text[ls..re], &call));
        }
        i = right_from;
    }
    let changed = splicer.len();
    (splicer.apply(text), changed)
}

fn equality_at(bytes: &[u8], mask: &CodeMask, i: usize) -> Option<&'static str> {
    if !mask.is_code(i) || !mask.is_code(i + 1) || bytes[i + 1] != b'=' || bytes.get(i + 2) == Some(&b'=') {
        return None;
    }
    match bytes[i] {
        b'=' if i == 0 || !matches!(bytes[i - 1], b'=' | b'!' | b'<' | b'>') => Some("Is"),
        b'!' => Some("IsNot"),
        _ => None,
    }
}

fn is_operator_byte(b: u8) -> bool {
    matches!(b, b'+' | b'-' | b'*' | b'/' | b'%' | b'<' | b'>' | b'!' | b'~' | b'&' | b'|' | b'^' | b'=' | b'?' | b':')
}

// ── Left operand ──

#[derive(Clone, Copy, PartialEq)]
enum Want {
    Operand,
    Operator,
}

fn operand_start(text: &str, mask: &CodeMask, op: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut want = Want::Operand;
    let mut start = None;
    let mut bracketed = false;
    let mut at = op;

    while let Some(p) = prev_significant(text, mask, at) {
        match want {
            Want::Operand => {
                // Postfix `++` / `--`.
                if p >= 1 && mask.is_code(p - 1) && matches!(&text[p - 1..=p], "++" | "--") {
                    at = p - 1;
                    continue;
                }
                let Some((s, opened)) = unit_start(text, mask, p) else {
                    break;
                };
                start = Some(s);
                bracketed = opened;
                at = s;
                want = Want::Operator;
            }
            Want::Operator => {
                let b = bytes[p];
                if !mask.is_code(p) {
                    break;
                }
                if b == b'.' {
                    if p >= 1 && bytes[p - 1] == b'.' {
                        break;
                    }
                    at = if p >= 1 && bytes[p - 1] == b'?' { p - 1 } else { p };
                    want = Want::Operand;
                    continue;
                }
                if is_ident_byte(b) {
                    let Some((word, ws)) = word_before(text, p + 1) else {
                        break;
                    };
                    if PREFIX_WORDS.contains(&word) {
                        start = Some(ws);
                        at = ws;
                    } else if word == "instanceof" || word == "in" {
                        at = ws;
                        want = Want::Operand;
                    } else if bracketed && (!super::is_keyword(word) || VALUE_WORDS.contains(&word)) {
                        // Callee of a call or indexed object.
                        at = p + 1;
                        want = Want::Operand;
                    } else {
                        break;
                    }
                    continue;
                }
                if bracketed && matches!(b, b')' | b']') {
                    at = p + 1;
                    want = Want::Operand;
                    continue;
                }
                let mut q = p;
                while q > 0 && mask.is_code(q - 1) && is_operator_byte(bytes[q - 1]) {
                    q -= 1;
                }
                let op_text = &text[q..=p];
                let binary = prev_significant(text, mask, q).is_some_and(|r| ends_operand(bytes[r]));
                if matches!(op_text, "+" | "-") && !binary || matches!(op_text, "!" | "~" | "!!") {
                    start = Some(q);
                    at = q;
                } else if TIGHTER.contains(&op_text) {
                    at = q;
                    want = Want::Operand;
                } else {
                    break;
                }
            }
        }
    }
    start
}

/// Start of the operand unit ending at `p`, and whether it is a bracketed
/// group.
fn unit_start(text: &str, mask: &CodeMask, p: usize) -> Option<(usize, bool)> {
    let bytes = text.as_bytes();
    match mask.state(p) {
        ScanState::SingleQuote | ScanState::DoubleQuote => {
            let state = mask.state(p);
            let mut j = p;
            while j > 0 && mask.state(j - 1) == state {
                j -= 1;
            }
            Some((j, false))
        }
        ScanState::Template => {
            let mut j = p;
            while j > 0 && matches!(mask.state(j - 1), ScanState::Template | ScanState::TemplateInterpolation) {
                j -= 1;
            }
            Some((j, false))
        }
        state if state.is_code() => match bytes[p] {
            b')' | b']' | b'}' => find_matching_backward(text, mask, p).map(|open| (open, bytes[p] != b'}')),
            b if is_ident_byte(b) => {
                let (word, s) = word_before(text, p + 1)?;
                let keyword = super::is_keyword(word) && !VALUE_WORDS.contains(&word);
                (!keyword).then_some((s, false))
            }
            _ => None,
        },
        _ => None,
    }
}

// ── Right operand ──

fn operand_end(text: &str, mask: &CodeMask, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut at = from;
    let mut end = None;
    loop {
        at = skip_prefixes(text, mask, at);
        let Some(unit) = unit_end(text, mask, at) else {
            return end;
        };
        let e = postfix_end(text, mask, unit);
        end = Some(e);

        let n = skip_trivia(text, mask, e);
        if n >= bytes.len() {
            return end;
        }
        if let Some((word, word_end)) = ident_at(text, n) {
            if word == "instanceof" || word == "in" {
                at = word_end;
                continue;
            }
            return end;
        }
        let mut q = n;
        while q < bytes.len() && mask.is_code(q) && is_operator_byte(bytes[q]) {
            q += 1;
        }
        if TIGHTER.contains(&&text[n..q]) {
            at = q;
        } else {
            return end;
        }
    }
}

fn skip_prefixes(text: &str, mask: &CodeMask, mut at: usize) -> usize {
    let bytes = text.as_bytes();
    loop {
        at = skip_trivia(text, mask, at);
        let rest = &text[at.min(text.len())..];
        if rest.starts_with("++") || rest.starts_with("--") {
            at += 2;
        } else if matches!(bytes.get(at), Some(b'!' | b'~' | b'-' | b'+')) {
            at += 1;
        } else if let Some((_, end)) = ident_at(text, at).filter(|(w, _)| PREFIX_WORDS.contains(w)) {
            at = end;
        } else {
            return at;
        }
    }
}

fn unit_end(text: &str, mask: &CodeMask, at: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let b = *bytes.get(at)?;
    if !mask.is_code(at) {
        return match mask.state(at) {
            ScanState::SingleQuote | ScanState::DoubleQuote | ScanState::Template | ScanState::Pattern => {
                Some(literal_end(text, mask, at))
            }
            _ => None,
        };
    }
    match b {
        b'(' | b'[' | b'{' => find_matching(text, mask, at).ok().map(|c| c + 1),
        b'0'..=b'9' => {
            let mut end = at;
            while end < bytes.len()
                && (is_ident_byte(bytes[end])
                    || bytes[end] == b'.' && bytes.get(end + 1).is_some_and(u8::is_ascii_digit))
            {
                end += 1;
            }
            Some(end)
        }
        _ if is_ident_start_byte(b) => {
            let (word, end) = ident_at(text, at)?;
            let keyword = super::is_keyword(word) && !VALUE_WORDS.contains(&word);
            (!keyword).then_some(end)
        }
        _ => None,
    }
}

fn postfix_end(text: &str, mask: &CodeMask, mut end: usize) -> usize {
    let bytes = text.as_bytes();
    loop {
        let n = skip_trivia(text, mask, end);
        let rest = &text[n.min(text.len())..];
        if rest.starts_with("?.") {
            let after = n + 2;
            match bytes.get(after) {
                Some(b'(' | b'[') => match find_matching(text, mask, after) {
                    Ok(close) => end = close + 1,
                    Err(_) => return end,
                },
                _ => match ident_at(text, after) {
                    Some((_, e)) => end = e,
                    None => return end,
                },
            }
        } else if rest.starts_with('.') && !rest.starts_with("...") {
            match ident_at(text, n + 1) {
                Some((_, e)) => end = e,
                None => return end,
            }
        } else if matches!(bytes.get(n), Some(b'(' | b'[')) && !text[end..n].contains('\n') {
            match find_matching(text, mask, n) {
                Ok(close) => end = close + 1,
                Err(_) => return end,
            }
        } else if n == end && (rest.starts_with("++") || rest.starts_with("--")) {
            end += 2;
        } else {
            return end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_equality() {
        assert_eq!(rewrite("const same = a == b"), "const same = Is(a, b)");
        assert_eq!(rewrite("if (a != b) {}"), "if (IsNot(a, b)) {}");
    }

    #[test]
    fn test_strict_operators_untouched() {
        let src = "if (a === b || c !== d) {}";
        assert_eq!(rewrite(src), src);
    }

    #[test]
    fn test_member_chains_and_calls() {
        assert_eq!(rewrite("x.y[0] != f(1, 2)"), "IsNot(x.y[0], f(1, 2))");
        assert_eq!(rewrite("const ok = a.b?.c == null"), "const ok = Is(a.b?.c, null)");
    }

    #[test]
    fn test_tighter_operators_are_crossed() {
        assert_eq!(
            rewrite("if (a + 1 == b * 2 && c == 'x') {}"),
            "if (Is(a + 1, b * 2) && Is(c, 'x')) {}"
        );
    }

    #[test]
    fn test_unary_prefixes() {
        assert_eq!(rewrite("return typeof x == 'string'"), "return Is(typeof x, 'string')");
        assert_eq!(rewrite("!x == y"), "Is(!x, y)");
    }

    #[test]
    fn test_chained_comparisons_nest() {
        assert_eq!(rewrite("a == b == c"), "Is(Is(a, b), c)");
    }

    #[test]
    fn test_strings_and_comments_untouched() {
        let src = "const s = \"a == b\" // c == d\n";
        assert_eq!(rewrite(src), src);
    }

    #[test]
    fn test_object_literals_compare_structurally() {
        assert_eq!(rewrite("[1, 2] == [1, 2]"), "Is([1, 2], [1, 2])");
    }
}
