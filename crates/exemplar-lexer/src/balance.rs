//! Balanced-delimiter extraction and small text helpers built on [`CodeMask`].
//!
//! Every helper only considers bytes the mask reports as code, so brackets
//! and keywords inside strings, comments and pattern literals are ignored.

use crate::scan::CodeMask;
use exemplar_types::{Diagnostic, ErrorCode, SourceFile};
use thiserror::Error;

/// Failure to find a matching delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("unclosed '{open}'")]
    Unclosed { open: char, offset: usize },
    #[error("expected '{expected}' to close '{open}', found '{found}'")]
    Mismatched {
        open: char,
        expected: char,
        found: char,
        offset: usize,
    },
    #[error("no opening delimiter at offset {0}")]
    NotADelimiter(usize),
}

impl BalanceError {
    /// Offset the error should be reported at.
    pub fn offset(&self) -> usize {
        match self {
            BalanceError::Unclosed { offset, .. }
            | BalanceError::Mismatched { offset, .. }
            | BalanceError::NotADelimiter(offset) => *offset,
        }
    }

    pub fn to_diagnostic(&self, source: &SourceFile) -> Diagnostic {
        let code = match self {
            BalanceError::Unclosed { .. } => ErrorCode::UNCLOSED_DELIMITER,
            _ => ErrorCode::UNEXPECTED_TOKEN,
        };
        let diag = Diagnostic::at(code, self.to_string(), source, self.offset());
        match self {
            BalanceError::Mismatched {
                expected, found, ..
            } => diag
                .with_expected(expected.to_string())
                .with_received(found.to_string()),
            _ => diag,
        }
    }
}

fn closer_for(open: u8) -> Option<u8> {
    match open {
        b'(' => Some(b')'),
        b'[' => Some(b']'),
        b'{' => Some(b'}'),
        _ => None,
    }
}

/// Find the delimiter closing the one at `open`.
pub fn find_matching(text: &str, mask: &CodeMask, open: usize) -> Result<usize, BalanceError> {
    let bytes = text.as_bytes();
    let first = *bytes.get(open).ok_or(BalanceError::NotADelimiter(open))?;
    let first_closer = closer_for(first).ok_or(BalanceError::NotADelimiter(open))?;
    let mut stack = vec![(first, first_closer, open)];
    let mut i = open + 1;
    while i < bytes.len() {
        if mask.is_code(i) {
            let b = bytes[i];
            if let Some(closer) = closer_for(b) {
                stack.push((b, closer, i));
            } else if matches!(b, b')' | b']' | b'}') {
                let (opener, expected, _) = stack.pop().ok_or(BalanceError::NotADelimiter(i))?;
                if b != expected {
                    return Err(BalanceError::Mismatched {
                        open: opener as char,
                        expected: expected as char,
                        found: b as char,
                        offset: i,
                    });
                }
                if stack.is_empty() {
                    return Ok(i);
                }
            }
        }
        i += 1;
    }
    let (opener, _, at) = stack.pop().unwrap_or((first, first_closer, open));
    Err(BalanceError::Unclosed {
        open: opener as char,
        offset: at,
    })
}

/// Find the delimiter opening the one at `close`, scanning backward.
pub fn find_matching_backward(text: &str, mask: &CodeMask, close: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let opener = match *bytes.get(close)? {
        b')' => b'(',
        b']' => b'[',
        b'}' => b'{',
        _ => return None,
    };
    let closer = bytes[close];
    let mut depth = 0usize;
    let mut i = close;
    loop {
        if mask.is_code(i) {
            if bytes[i] == closer {
                depth += 1;
            } else if bytes[i] == opener {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        if i == 0 {
            return None;
        }
        i -= 1;
    }
}

/// Bracket depth (all kinds combined) of code at each byte offset.
///
/// `depths[i]` is the depth *before* byte `i` is applied.
pub fn depth_map(text: &str, mask: &CodeMask) -> Vec<u32> {
    let mut depths = Vec::with_capacity(text.len() + 1);
    let mut depth: u32 = 0;
    for (i, b) in text.bytes().enumerate() {
        depths.push(depth);
        if mask.is_code(i) {
            match b {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }
    depths.push(depth);
    depths
}

/// Split `start..end` at top-level commas that are code.
///
/// Returns trimmed `(start, end)` ranges; empty segments are dropped.
pub fn split_top_level(text: &str, mask: &CodeMask, start: usize, end: usize) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut seg_start = start;
    for i in start..end {
        if !mask.is_code(i) {
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                push_trimmed(text, seg_start, i, &mut parts);
                seg_start = i + 1;
            }
            _ => {}
        }
    }
    push_trimmed(text, seg_start, end, &mut parts);
    parts
}

fn push_trimmed(text: &str, start: usize, end: usize, parts: &mut Vec<(usize, usize)>) {
    let (s, e) = trim_range(text, start, end);
    if s < e {
        parts.push((s, e));
    }
}

/// Shrink `start..end` to exclude surrounding whitespace.
pub fn trim_range(text: &str, mut start: usize, mut end: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    while start < end && bytes[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    (start, end)
}

/// Find the first code occurrence of `needle` at or after `from`.
pub fn find_code(text: &str, mask: &CodeMask, needle: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(rel) = text.get(search..)?.find(needle) {
        let at = search + rel;
        if mask.is_code(at) {
            return Some(at);
        }
        search = at + needle.len().max(1);
    }
    None
}

/// Find the first code occurrence of the whole word `word` at or after `from`.
pub fn find_word(text: &str, mask: &CodeMask, word: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(at) = find_code(text, mask, word, search) {
        if is_word_at(text, at, word) {
            return Some(at);
        }
        search = at + word.len();
    }
    None
}

/// `true` if `word` appears at `at` with identifier boundaries on both sides.
pub fn is_word_at(text: &str, at: usize, word: &str) -> bool {
    if !text.get(at..).is_some_and(|rest| rest.starts_with(word)) {
        return false;
    }
    // A preceding `.` makes it a member name, not the word.
    let before_ok = text[..at].chars().next_back().map_or(true, |c| !is_ident_char(c) && c != '.');
    let after_ok = text[at + word.len()..].chars().next().map_or(true, |c| !is_ident_char(c));
    before_ok && after_ok
}

pub fn is_ident_start_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$' || (!c.is_ascii() && c.is_alphabetic())
}

pub fn is_ident_char(c: char) -> bool {
    is_ident_start_char(c) || c.is_ascii_digit() || (!c.is_ascii() && c.is_alphanumeric())
}

/// Byte-level screen for identifiers. Every byte of a multi-byte character
/// passes, so a scan stepping over these bytes always stops on a character
/// boundary; [`ident_at`] decides exactly.
pub fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || !b.is_ascii()
}

pub fn is_ident_start_byte(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || !b.is_ascii()
}

/// Read an identifier starting exactly at `at`. Returns it and its end.
pub fn ident_at(text: &str, at: usize) -> Option<(&str, usize)> {
    let rest = text.get(at..)?;
    let mut chars = rest.char_indices();
    if !chars.next().is_some_and(|(_, c)| is_ident_start_char(c)) {
        return None;
    }
    let len = chars.find(|&(_, c)| !is_ident_char(c)).map_or(rest.len(), |(i, _)| i);
    Some((&rest[..len], at + len))
}

/// Skip whitespace (newlines included) forward from `at`.
pub fn skip_ws(text: &str, mut at: usize) -> usize {
    let bytes = text.as_bytes();
    while at < bytes.len() && bytes[at].is_ascii_whitespace() {
        at += 1;
    }
    at
}

/// Skip whitespace and comments forward from `at`.
pub fn skip_trivia(text: &str, mask: &CodeMask, mut at: usize) -> usize {
    let bytes = text.as_bytes();
    while at < bytes.len() {
        if bytes[at].is_ascii_whitespace() || mask.state(at).is_comment() {
            at += 1;
        } else {
            break;
        }
    }
    at
}

/// Offset of the last non-whitespace, non-comment byte before `at`.
pub fn prev_significant(text: &str, mask: &CodeMask, at: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = at;
    while i > 0 {
        i -= 1;
        if !bytes[i].is_ascii_whitespace() && !mask.state(i).is_comment() {
            return Some(i);
        }
    }
    None
}

/// Replace every character except newlines with spaces, byte for byte.
///
/// The result has the same byte length and line structure as the input, so
/// offsets and line numbers computed on it stay valid.
pub fn blank_out(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' => c.to_string(),
            _ => " ".repeat(c.len_utf8()),
        })
        .collect()
}

/// Pad `replacement` with trailing newlines so it spans as many lines as
/// `original` did.
pub fn preserve_lines(original: &str, replacement: &str) -> String {
    let want = original.matches('\n').count();
    let have = replacement.matches('\n').count();
    let mut out = replacement.to_string();
    for _ in have..want {
        out.push('\n');
    }
    out
}

/// Collapse a body onto one line: comments removed, newlines folded.
pub fn collapse_lines(text: &str) -> String {
    let mask = CodeMask::new(text);
    let mut out = String::with_capacity(text.len());
    for (i, ch) in text.char_indices() {
        if mask.state(i).is_comment() {
            continue;
        }
        if ch == '\n' || ch == '\r' {
            if !out.ends_with(' ') {
                out.push(' ');
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_matching_skips_strings() {
        let text = "f(a, ')', [1, 2]) + 1";
        let mask = CodeMask::new(text);
        assert_eq!(find_matching(text, &mask, 1), Ok(16));
    }

    #[test]
    fn test_find_matching_errors() {
        let text = "{ a: (1 }";
        let mask = CodeMask::new(text);
        let err = find_matching(text, &mask, 0).unwrap_err();
        assert!(matches!(err, BalanceError::Mismatched { expected: ')', found: '}', .. }));

        let text = "{ [1, 2]";
        let mask = CodeMask::new(text);
        let err = find_matching(text, &mask, 0).unwrap_err();
        assert_eq!(err, BalanceError::Unclosed { open: '{', offset: 0 });
    }

    #[test]
    fn test_ident_at_unicode() {
        assert_eq!(ident_at("é = 1", 0), Some(("é", 2)));
        assert_eq!(ident_at("Type Näme = 'x'", 5), Some(("Näme", 10)));
        assert_eq!(ident_at("a$_9 b", 0), Some(("a$_9", 4)));
        assert_eq!(ident_at("9a", 0), None);
        assert_eq!(ident_at("— x", 0), None);
        // Inside a multi-byte character.
        assert_eq!(ident_at("é", 1), None);
    }

    #[test]
    fn test_word_boundaries_unicode() {
        assert!(is_word_at("const ü", 0, "const"));
        assert!(!is_word_at("éconst x", 2, "const"));
        assert!(!is_word_at("constß", 0, "const"));
        assert!(!is_word_at("a.const", 2, "const"));
    }

    #[test]
    fn test_find_matching_backward() {
        let text = "a[b(1)](2)";
        let mask = CodeMask::new(text);
        assert_eq!(find_matching_backward(text, &mask, 9), Some(7));
        assert_eq!(find_matching_backward(text, &mask, 6), Some(1));
    }

    #[test]
    fn test_split_top_level() {
        let text = "(a = [1, 2], b = { x: 1, y: ',' }, c)";
        let mask = CodeMask::new(text);
        let parts: Vec<&str> = split_top_level(text, &mask, 1, text.len() - 1)
            .into_iter()
            .map(|(s, e)| &text[s..e])
            .collect();
        assert_eq!(parts, vec!["a = [1, 2]", "b = { x: 1, y: ',' }", "c"]);
    }

    #[test]
    fn test_find_word() {
        let text = "const s = 'Type X'; Type Y = 1; xType";
        let mask = CodeMask::new(text);
        assert_eq!(find_word(text, &mask, "Type", 0), Some(20));
        assert_eq!(find_word(text, &mask, "Type", 21), None);
    }

    #[test]
    fn test_member_access_is_not_word() {
        let text = "a.test(1)";
        assert!(!is_word_at(text, 2, "test"));
    }

    #[test]
    fn test_blank_out_keeps_layout() {
        let text = "ab\ncé\n";
        let blank = blank_out(text);
        assert_eq!(blank.len(), text.len());
        assert_eq!(blank, "  \n   \n");
    }

    #[test]
    fn test_preserve_lines() {
        assert_eq!(preserve_lines("a\nb\nc", "x"), "x\n\n");
        assert_eq!(preserve_lines("a", "x\ny"), "x\ny");
    }

    #[test]
    fn test_collapse_lines() {
        assert_eq!(collapse_lines("a // c\n  b"), "a   b");
    }
}
