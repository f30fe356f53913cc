//! Finite-state lexical scanner shared by every rewrite pass.
//!
//! The scanner walks source text one character at a time and reports the
//! lexical state each character belongs to, so passes can tell code apart
//! from the inside of strings, comments, templates and pattern literals
//! without re-deriving the rules themselves.

use crate::balance::is_ident_char;

/// The lexical state of a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanState {
    /// Plain code.
    Normal,
    /// `'...'`, quotes included.
    SingleQuote,
    /// `"..."`, quotes included.
    DoubleQuote,
    /// Literal text of a template, backticks and `${`/`}` included.
    Template,
    /// Code inside a template's `${ ... }`.
    TemplateInterpolation,
    /// `// ...` up to (not including) the newline.
    LineComment,
    /// `/* ... */`, delimiters included.
    BlockComment,
    /// `/pattern/`, slashes included. Flags scan as code.
    Pattern,
}

impl ScanState {
    /// `true` for states whose characters are code.
    pub fn is_code(self) -> bool {
        matches!(self, ScanState::Normal | ScanState::TemplateInterpolation)
    }

    pub fn is_comment(self) -> bool {
        matches!(self, ScanState::LineComment | ScanState::BlockComment)
    }
}

/// One scanned character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scanned {
    pub offset: usize,
    pub ch: char,
    pub state: ScanState,
}

/// Code nesting: top level, template text, or a template interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Template,
    Interpolation { brace_depth: u32 },
}

/// Words after which a `/` starts a pattern literal rather than a division.
const PATTERN_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw",
    "instanceof", "yield", "await",
];

/// Character-level scanner. Iterate it to get a [`Scanned`] per character.
pub struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    mode_stack: Vec<Mode>,
    /// A string, comment or pattern literal in progress.
    inner: Option<ScanState>,
    /// Offset where the current `inner` literal began.
    inner_start: usize,
    escape: bool,
    /// The previous block-comment character was a `*`.
    star: bool,
    /// The next character is the `*` of `/*`.
    opening_star: bool,
    /// Inside `[...]` of a pattern literal.
    in_class: bool,
    /// The `{` of a `${` is still to come.
    pending_interpolation: bool,
    /// Offset of the last significant code character, and the character.
    last_significant: Option<(usize, char)>,
    template_starts: Vec<usize>,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            mode_stack: vec![Mode::Normal],
            inner: None,
            inner_start: 0,
            escape: false,
            star: false,
            opening_star: false,
            in_class: false,
            pending_interpolation: false,
            last_significant: None,
            template_starts: Vec::new(),
        }
    }

    /// The literal left open at the current position, with its start offset.
    ///
    /// After the iterator is exhausted this reports unterminated strings,
    /// block comments, pattern literals and templates.
    pub fn unterminated(&self) -> Option<(ScanState, usize)> {
        if let Some(state) = self.inner {
            if state != ScanState::LineComment {
                return Some((state, self.inner_start));
            }
        }
        match self.mode() {
            Mode::Normal => None,
            _ => self
                .template_starts
                .last()
                .map(|&start| (ScanState::Template, start)),
        }
    }

    fn mode(&self) -> Mode {
        *self.mode_stack.last().unwrap_or(&Mode::Normal)
    }

    fn code_state(&self) -> ScanState {
        match self.mode() {
            Mode::Interpolation { .. } => ScanState::TemplateInterpolation,
            _ => ScanState::Normal,
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn enter(&mut self, state: ScanState, offset: usize) -> ScanState {
        self.inner = Some(state);
        self.inner_start = offset;
        self.escape = false;
        self.in_class = false;
        state
    }

    /// Decide whether a `/` at the current position opens a pattern literal.
    fn pattern_allowed(&self) -> bool {
        let Some((offset, last)) = self.last_significant else {
            return true;
        };
        match last {
            ')' | ']' | '\'' | '"' | '`' | '/' => false,
            c if is_ident_char(c) => {
                let start = self.text[..offset]
                    .char_indices()
                    .rev()
                    .take_while(|&(_, c)| is_ident_char(c))
                    .last()
                    .map_or(offset, |(i, _)| i);
                let word = &self.text[start..offset + c.len_utf8()];
                PATTERN_KEYWORDS.contains(&word)
            }
            _ => true,
        }
    }

    fn step_inner(&mut self, inner: ScanState, offset: usize, ch: char) -> ScanState {
        match inner {
            ScanState::SingleQuote | ScanState::DoubleQuote => {
                let quote = if inner == ScanState::SingleQuote { '\'' } else { '"' };
                if self.escape {
                    self.escape = false;
                } else if ch == '\\' {
                    self.escape = true;
                } else if ch == quote {
                    self.inner = None;
                    self.last_significant = Some((offset, quote));
                } else if ch == '\n' {
                    // Unterminated on this line; resume scanning code.
                    self.inner = None;
                    return self.code_state();
                }
                inner
            }
            ScanState::LineComment => {
                if ch == '\n' {
                    self.inner = None;
                    return self.code_state();
                }
                inner
            }
            ScanState::BlockComment => {
                if self.opening_star {
                    self.opening_star = false;
                    self.star = false;
                    return inner;
                }
                if ch == '/' && self.star {
                    self.inner = None;
                }
                self.star = ch == '*';
                inner
            }
            ScanState::Pattern => {
                if self.escape {
                    self.escape = false;
                } else if ch == '\\' {
                    self.escape = true;
                } else if ch == '[' {
                    self.in_class = true;
                } else if ch == ']' {
                    self.in_class = false;
                } else if ch == '/' && !self.in_class {
                    self.inner = None;
                    self.last_significant = Some((offset, '/'));
                } else if ch == '\n' {
                    self.inner = None;
                    return self.code_state();
                }
                inner
            }
            _ => inner,
        }
    }

    fn step_template(&mut self, offset: usize, ch: char) -> ScanState {
        if self.pending_interpolation {
            // The `{` of `${`.
            self.pending_interpolation = false;
            self.mode_stack.push(Mode::Interpolation { brace_depth: 0 });
            self.last_significant = Some((offset, '{'));
            return ScanState::Template;
        }
        if self.escape {
            self.escape = false;
        } else if ch == '\\' {
            self.escape = true;
        } else if ch == '`' {
            self.mode_stack.pop();
            self.template_starts.pop();
            self.last_significant = Some((offset, '`'));
        } else if ch == '$' && self.peek_byte() == Some(b'{') {
            self.pending_interpolation = true;
        }
        ScanState::Template
    }

    fn step_code(&mut self, offset: usize, ch: char) -> ScanState {
        match ch {
            '/' if self.peek_byte() == Some(b'/') => {
                return self.enter(ScanState::LineComment, offset);
            }
            '/' if self.peek_byte() == Some(b'*') => {
                self.opening_star = true;
                return self.enter(ScanState::BlockComment, offset);
            }
            '/' if self.pattern_allowed() => {
                return self.enter(ScanState::Pattern, offset);
            }
            '\'' => return self.enter(ScanState::SingleQuote, offset),
            '"' => return self.enter(ScanState::DoubleQuote, offset),
            '`' => {
                self.mode_stack.push(Mode::Template);
                self.template_starts.push(offset);
                self.escape = false;
                return ScanState::Template;
            }
            '{' => {
                if let Some(Mode::Interpolation { brace_depth }) = self.mode_stack.last_mut() {
                    *brace_depth += 1;
                }
            }
            '}' => {
                if let Some(Mode::Interpolation { brace_depth }) = self.mode_stack.last_mut() {
                    if *brace_depth == 0 {
                        self.mode_stack.pop();
                        return ScanState::Template;
                    }
                    *brace_depth -= 1;
                }
            }
            _ => {}
        }
        if !ch.is_whitespace() {
            self.last_significant = Some((offset, ch));
        }
        self.code_state()
    }
}

impl Iterator for Scanner<'_> {
    type Item = Scanned;

    fn next(&mut self) -> Option<Scanned> {
        let ch = self.text[self.pos..].chars().next()?;
        let offset = self.pos;
        self.pos += ch.len_utf8();

        let state = match self.inner {
            Some(inner) => self.step_inner(inner, offset, ch),
            None => match self.mode() {
                Mode::Template => self.step_template(offset, ch),
                Mode::Normal | Mode::Interpolation { .. } => self.step_code(offset, ch),
            },
        };
        Some(Scanned { offset, ch, state })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Code Mask
// ══════════════════════════════════════════════════════════════════════════════

/// Per-byte lexical states of a text, computed once by a full [`Scanner`] run.
///
/// Passes consult the mask instead of rescanning to decide whether an offset
/// is code.
#[derive(Debug, Clone)]
pub struct CodeMask {
    states: Vec<ScanState>,
    unterminated: Option<(ScanState, usize)>,
}

impl CodeMask {
    pub fn new(text: &str) -> Self {
        let mut states = vec![ScanState::Normal; text.len()];
        let mut scanner = Scanner::new(text);
        for scanned in scanner.by_ref() {
            let end = scanned.offset + scanned.ch.len_utf8();
            for slot in &mut states[scanned.offset..end] {
                *slot = scanned.state;
            }
        }
        Self {
            states,
            unterminated: scanner.unterminated(),
        }
    }

    /// State of the byte at `offset`. Out-of-range offsets read as code.
    pub fn state(&self, offset: usize) -> ScanState {
        self.states.get(offset).copied().unwrap_or(ScanState::Normal)
    }

    pub fn is_code(&self, offset: usize) -> bool {
        self.state(offset).is_code()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The literal still open at end of input, if any.
    pub fn unterminated(&self) -> Option<(ScanState, usize)> {
        self.unterminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(text: &str) -> Vec<ScanState> {
        Scanner::new(text).map(|s| s.state).collect()
    }

    fn code_only(text: &str) -> String {
        Scanner::new(text)
            .map(|s| if s.state.is_code() { s.ch } else { '_' })
            .collect()
    }

    #[test]
    fn test_strings_are_not_code() {
        assert_eq!(code_only("a = 'x == y' + \"z\""), "a = ________ + ___");
    }

    #[test]
    fn test_escaped_quote() {
        assert_eq!(code_only(r"a('it\'s') + b"), "a(_______) + b");
    }

    #[test]
    fn test_comments() {
        assert_eq!(code_only("a // b == c\nd"), "a _________\nd");
        assert_eq!(code_only("a /* b */ c"), "a _______ c");
        assert_eq!(code_only("a /*/ b */ c"), "a ________ c");
    }

    #[test]
    fn test_template_interpolation_is_code() {
        let out = code_only("`a ${b + `c${d}`} e` + f");
        assert_eq!(out, "_____b + ____d______ + f");
    }

    #[test]
    fn test_interpolation_with_braces() {
        let out = code_only("`${ {a: 1}.a }`");
        assert_eq!(out, "___ {a: 1}.a __");
    }

    #[test]
    fn test_pattern_vs_division() {
        assert_eq!(code_only("x = /a\\/b/g"), "x = ______g");
        assert_eq!(code_only("x = a / b / c"), "x = a / b / c");
        assert_eq!(code_only("return /[/]/.test(s)"), "return _____.test(s)");
        assert_eq!(code_only("f(x) / 2"), "f(x) / 2");
    }

    #[test]
    fn test_pattern_after_unicode_identifier() {
        assert_eq!(code_only("ö / 2 / x"), "ö / 2 / x");
        assert_eq!(code_only("größe / 2"), "größe / 2");
    }

    #[test]
    fn test_state_kinds() {
        let s = states("'a'");
        assert!(s.iter().all(|&st| st == ScanState::SingleQuote));
        let s = states("/* */");
        assert!(s.iter().all(|&st| st == ScanState::BlockComment));
    }

    #[test]
    fn test_unterminated() {
        let mut scanner = Scanner::new("a = `abc");
        scanner.by_ref().for_each(drop);
        assert_eq!(scanner.unterminated(), Some((ScanState::Template, 4)));

        let mask = CodeMask::new("x /* open");
        assert_eq!(mask.unterminated(), Some((ScanState::BlockComment, 2)));
        assert_eq!(CodeMask::new("// fine").unterminated(), None);
    }

    #[test]
    fn test_mask_multibyte() {
        let mask = CodeMask::new("'é' + 1");
        assert_eq!(mask.len(), 8);
        assert!(!mask.is_code(1));
        assert!(!mask.is_code(2));
        assert!(mask.is_code(5));
    }
}
