//! Parameter normalization and return-type extraction.
//!
//! For every `function` head and every class method or constructor head:
//!
//! ```text
//! name: example    → name = example     required
//! name?: example   → name = example     optional
//! name = default   → unchanged          optional
//! name             → unchanged          optional, implicit any
//! ...rest: [0]     → ...rest            rest
//! { a: 'x', b = 1 } → { a = 'x', b = 1 } = {}
//! ```
//!
//! A leading `!` in the list marks the declaration unsafe. After the list an
//! optional `->`, `-?` or `-!` marker introduces a return example; marker
//! and example are blanked out and recorded. Every head becomes a
//! [`DeclRecord`] in the context.

use super::{double_separators, is_keyword, literal_end, word_before};
use crate::context::{CompileContext, DeclRecord, DeclRole, ParamRecord, ReturnRecord};
use exemplar_lexer::balance::{
    blank_out, collapse_lines, depth_map, find_code, find_matching, find_word, ident_at,
    is_ident_byte, is_ident_start_byte, preserve_lines, prev_significant, skip_trivia,
    split_top_level, trim_range,
};
use exemplar_lexer::{CodeMask, ScanState, Splicer};
use exemplar_types::{Diagnostic, ErrorCode, ReturnMode, SourceFile};
use std::collections::HashSet;

/// Words that may precede a class member name.
const MEMBER_MODIFIERS: &[&str] = &["static", "async", "get", "set"];

pub fn run(text: &str, ctx: &mut CompileContext) -> Result<String, Diagnostic> {
    let mask = CodeMask::new(text);
    let source = ctx.source_file(text);
    let mut heads = find_heads(text, &mask, &source)?;
    heads.sort_by_key(|h| h.params_open);

    let mut splicer = Splicer::new();
    for head in &heads {
        let record = Normalizer {
            text,
            mask: &mask,
            source: &source,
            splicer: &mut splicer,
            warnings: Vec::new(),
        }
        .head(head)?;
        ctx.record(record.0);
        for warning in record.1 {
            ctx.warn(warning);
        }
    }

    tracing::debug!(heads = heads.len(), "normalized parameter lists");
    Ok(splicer.apply(text))
}

// ══════════════════════════════════════════════════════════════════════════════
// Head Discovery
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct Head {
    name: String,
    role: DeclRole,
    owner: Option<String>,
    /// First byte of the declaration, modifiers included.
    start: usize,
    name_at: usize,
    params_open: usize,
    params_close: usize,
    is_async: bool,
    top_level: bool,
}

fn find_heads(text: &str, mask: &CodeMask, source: &SourceFile) -> Result<Vec<Head>, Diagnostic> {
    let depth = depth_map(text, mask);
    let mut heads = Vec::new();
    function_heads(text, mask, source, &depth, &mut heads)?;
    member_heads(text, mask, source, &depth, &mut heads)?;
    Ok(heads)
}

/// The word right before `at`, skipping trivia: `(word, start)`.
fn previous_word<'t>(text: &'t str, mask: &CodeMask, at: usize) -> Option<(&'t str, usize)> {
    let prev = prev_significant(text, mask, at)?;
    word_before(text, prev + 1)
}

fn function_heads(
    text: &str,
    mask: &CodeMask,
    source: &SourceFile,
    depth: &[u32],
    heads: &mut Vec<Head>,
) -> Result<(), Diagnostic> {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(at) = find_word(text, mask, "function", from) {
        from = at + "function".len();
        let mut start = at;
        let mut is_async = false;
        if let Some(("async", s)) = previous_word(text, mask, start) {
            is_async = true;
            start = s;
        }
        if let Some(("default", s)) = previous_word(text, mask, start) {
            start = s;
        }
        if let Some(("export", s)) = previous_word(text, mask, start) {
            start = s;
        }

        let mut cursor = skip_trivia(text, mask, from);
        if bytes.get(cursor) == Some(&b'*') {
            cursor = skip_trivia(text, mask, cursor + 1);
        }
        let (name, name_at) = match ident_at(text, cursor) {
            Some((name, end)) if !is_keyword(name) => {
                let name_at = cursor;
                cursor = skip_trivia(text, mask, end);
                (name.to_string(), name_at)
            }
            _ => (String::new(), at),
        };
        if bytes.get(cursor) != Some(&b'(') {
            continue;
        }
        let close = find_matching(text, mask, cursor).map_err(|e| e.to_diagnostic(source))?;
        heads.push(Head {
            name,
            role: DeclRole::Function,
            owner: None,
            start,
            name_at,
            params_open: cursor,
            params_close: close,
            is_async,
            top_level: depth[at] == 0,
        });
    }
    Ok(())
}

/// Method and constructor heads inside class bodies.
fn member_heads(
    text: &str,
    mask: &CodeMask,
    source: &SourceFile,
    depth: &[u32],
    heads: &mut Vec<Head>,
) -> Result<(), Diagnostic> {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(class_at) = find_word(text, mask, "class", from) {
        from = class_at + "class".len();
        let after = skip_trivia(text, mask, from);
        let owner = ident_at(text, after)
            .filter(|(name, _)| !is_keyword(name))
            .map(|(name, _)| name.to_string());
        let Some(open) = find_code(text, mask, "{", from) else {
            continue;
        };
        let close = find_matching(text, mask, open).map_err(|e| e.to_diagnostic(source))?;
        let body_depth = depth[open] + 1;

        let mut i = open + 1;
        while i < close {
            let boundary = i == 0 || !is_ident_byte(bytes[i - 1]);
            if !(mask.is_code(i) && depth[i] == body_depth && boundary && is_ident_start_byte(bytes[i])) {
                i += 1;
                continue;
            }
            let Some((word, word_end)) = ident_at(text, i) else {
                i += 1;
                continue;
            };
            let paren = skip_trivia(text, mask, word_end);
            if bytes.get(paren) != Some(&b'(') || is_keyword(word) {
                i = word_end;
                continue;
            }
            let (start, is_async) = member_start(text, mask, i);
            if !opens_member(text, mask, start, open) {
                i = word_end;
                continue;
            }
            let params_close = find_matching(text, mask, paren).map_err(|e| e.to_diagnostic(source))?;
            let next = skip_trivia(text, mask, params_close + 1);
            let has_body = matches!(bytes.get(next), Some(b'{'))
                || ["->", "-?", "-!"].iter().any(|m| text[next..].starts_with(m));
            if !has_body {
                i = word_end;
                continue;
            }
            let role = if word == "constructor" {
                DeclRole::Constructor
            } else {
                DeclRole::Method
            };
            heads.push(Head {
                name: word.to_string(),
                role,
                owner: owner.clone(),
                start,
                name_at: i,
                params_open: paren,
                params_close,
                is_async,
                top_level: false,
            });
            i = params_close + 1;
        }
        from = from.max(open + 1);
    }
    Ok(())
}

/// Walk back over member modifiers: (first modifier offset, saw `async`).
fn member_start(text: &str, mask: &CodeMask, name_at: usize) -> (usize, bool) {
    let bytes = text.as_bytes();
    let mut start = name_at;
    let mut is_async = false;
    loop {
        let Some(prev) = prev_significant(text, mask, start) else {
            return (start, is_async);
        };
        if bytes[prev] == b'*' {
            start = prev;
            continue;
        }
        match word_before(text, prev + 1) {
            Some((word, s)) if MEMBER_MODIFIERS.contains(&word) => {
                is_async |= word == "async";
                start = s;
            }
            _ => return (start, is_async),
        }
    }
}

/// `true` if a class member may begin at `at`.
fn opens_member(text: &str, mask: &CodeMask, at: usize, body_open: usize) -> bool {
    let bytes = text.as_bytes();
    match prev_significant(text, mask, at) {
        Some(p) if p == body_open => true,
        Some(p) => match bytes[p] {
            b'}' | b';' => true,
            b => super::ends_operand(b) && text[p + 1..at].contains('\n'),
        },
        None => false,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Normalization
// ══════════════════════════════════════════════════════════════════════════════

struct Normalizer<'a> {
    text: &'a str,
    mask: &'a CodeMask,
    source: &'a SourceFile,
    splicer: &'a mut Splicer,
    warnings: Vec<Diagnostic>,
}

impl Normalizer<'_> {
    fn error(&self, code: ErrorCode, message: impl Into<String>, at: usize) -> Diagnostic {
        Diagnostic::at(code, message, self.source, at)
    }

    fn byte(&self, at: usize) -> Option<u8> {
        self.text.as_bytes().get(at).copied()
    }

    fn head(mut self, head: &Head) -> Result<(DeclRecord, Vec<Diagnostic>), Diagnostic> {
        let mut begin = skip_trivia(self.text, self.mask, head.params_open + 1);
        let mut is_unsafe = false;
        if begin < head.params_close && self.byte(begin) == Some(b'!') {
            is_unsafe = true;
            self.splicer.replace(begin, begin + 1, " ");
            begin += 1;
        }

        let named = !head.name.is_empty();
        let mut params = Vec::new();
        for (s, e) in split_top_level(self.text, self.mask, begin, head.params_close) {
            params.push(self.param(s, e, named)?);
        }
        self.check_list(&params)?;

        let returns = self.returns(head.params_close + 1)?;
        let (line, column) = self.source.position(head.name_at);
        let record = DeclRecord {
            name: head.name.clone(),
            role: head.role,
            owner: head.owner.clone(),
            params,
            returns,
            is_async: head.is_async,
            is_unsafe,
            top_level: head.top_level,
            description: doc_comment(self.text, self.mask, head.start),
            line,
            column,
        };
        Ok((record, self.warnings))
    }

    /// Required-after-optional and duplicate names.
    fn check_list(&self, params: &[ParamRecord]) -> Result<(), Diagnostic> {
        let mut seen = HashSet::new();
        let mut optional: Option<&str> = None;
        for p in params {
            let names: Vec<&str> = if p.is_destructured() {
                p.members.iter().map(|m| m.name.as_str()).collect()
            } else {
                vec![p.name.as_str()]
            };
            for name in names {
                if !seen.insert(name) {
                    return Err(Diagnostic::new(
                        ErrorCode::DUPLICATE_PARAMETER,
                        format!("duplicate parameter '{name}'"),
                        p.line,
                        p.column,
                    )
                    .with_filename(self.source.name.clone()));
                }
            }
            if p.rest {
                continue;
            }
            match optional {
                Some(before) if p.required => {
                    return Err(Diagnostic::new(
                        ErrorCode::REQUIRED_AFTER_OPTIONAL,
                        format!("required parameter '{}' follows optional parameter '{before}'", p.name),
                        p.line,
                        p.column,
                    )
                    .with_filename(self.source.name.clone())
                    .with_suggestion(format!("write '{}?:' or move it before '{before}'", p.name)));
                }
                None if !p.required => optional = Some(p.name.as_str()),
                _ => {}
            }
        }
        Ok(())
    }

    fn param(&mut self, s: usize, e: usize, named: bool) -> Result<ParamRecord, Diagnostic> {
        let segment = &self.text[s..e];
        if segment.starts_with("...") {
            return self.rest_param(s, e);
        }
        match self.byte(s) {
            Some(b'{') => self.object_param(s, e, named),
            Some(b'[') => self.array_param(s, e),
            _ => self.binding(s, e, named),
        }
    }

    fn rest_param(&mut self, s: usize, e: usize) -> Result<ParamRecord, Diagnostic> {
        let name_at = skip_trivia(self.text, self.mask, s + 3);
        let (name, name_end) = ident_at(self.text, name_at)
            .ok_or_else(|| self.error(ErrorCode::INVALID_PARAMETER, "expected a rest parameter name", name_at))?;
        let (line, column) = self.source.position(s);
        let mut record = ParamRecord::new(name, line, column);
        record.rest = true;
        let after = skip_trivia(self.text, self.mask, name_end);
        if after < e && self.byte(after) == Some(b':') {
            let example_at = skip_trivia(self.text, self.mask, after + 1);
            record.example = Some(double_separators(&self.text[example_at..e]));
            self.splicer.replace(name_end, e, blank_out(&self.text[name_end..e]));
        }
        Ok(record)
    }

    /// `name`, `name: ex`, `name?: ex`, `name?`, `name = d`.
    fn binding(&mut self, s: usize, e: usize, named: bool) -> Result<ParamRecord, Diagnostic> {
        let (name, name_end) = ident_at(self.text, s)
            .filter(|(name, _)| !is_keyword(name))
            .ok_or_else(|| {
                self.error(
                    ErrorCode::INVALID_PARAMETER,
                    format!("expected a parameter name, found '{}'", &self.text[s..e]),
                    s,
                )
            })?;
        let (line, column) = self.source.position(s);
        let mut record = ParamRecord::new(name, line, column);
        let after = skip_trivia(self.text, self.mask, name_end);

        if after >= e {
            if named {
                self.implicit_any(name, s);
            }
            return Ok(record);
        }
        match self.byte(after) {
            Some(b'?') => {
                let colon = skip_trivia(self.text, self.mask, after + 1);
                if colon >= e {
                    self.splicer.replace(after, after + 1, " ");
                    if named {
                        self.implicit_any(name, s);
                    }
                    return Ok(record);
                }
                if self.byte(colon) != Some(b':') {
                    return Err(self.unexpected(name, colon));
                }
                record.example = Some(self.example(name, name_end, colon + 1, e)?);
            }
            Some(b':') => {
                record.required = true;
                record.example = Some(self.example(name, name_end, after + 1, e)?);
            }
            Some(b'=') => {
                let (ds, de) = trim_range(self.text, after + 1, e);
                if ds >= de {
                    return Err(self.error(ErrorCode::INVALID_PARAMETER, format!("'{name}' has an empty default"), after));
                }
                record.has_default = true;
                record.example = Some(self.text[ds..de].to_string());
            }
            _ => return Err(self.unexpected(name, after)),
        }
        Ok(record)
    }

    fn unexpected(&self, name: &str, at: usize) -> Diagnostic {
        let found = self.text[at..].chars().next().unwrap_or(' ');
        self.error(
            ErrorCode::INVALID_PARAMETER,
            format!("unexpected '{found}' after parameter '{name}'"),
            at,
        )
        .with_expected("':', '?:' or '='")
    }

    /// Rewrite `name<marker> example` to `name = example`; returns the
    /// example text with single separators doubled.
    fn example(&mut self, name: &str, name_end: usize, from: usize, e: usize) -> Result<String, Diagnostic> {
        let (es, ee) = trim_range(self.text, from, e);
        if es >= ee {
            return Err(self
                .error(ErrorCode::INVALID_PARAMETER, format!("'{name}' has no example value"), from)
                .with_suggestion(format!("write '{name}: <example>'")));
        }
        let example = double_separators(&self.text[es..ee]);
        let original = &self.text[name_end..ee];
        self.splicer
            .replace(name_end, ee, preserve_lines(original, &format!(" = {example}")));
        Ok(example)
    }

    fn implicit_any(&mut self, name: &str, at: usize) {
        self.warnings.push(Diagnostic::at(
            ErrorCode::IMPLICIT_ANY,
            format!("parameter '{name}' has no example; its type is any"),
            self.source,
            at,
        ));
    }

    fn object_param(&mut self, s: usize, e: usize, named: bool) -> Result<ParamRecord, Diagnostic> {
        let close = find_matching(self.text, self.mask, s).map_err(|err| err.to_diagnostic(self.source))?;
        let mut members = Vec::new();
        for (ms, me) in split_top_level(self.text, self.mask, s + 1, close) {
            if self.text[ms..me].starts_with("...") {
                continue;
            }
            members.push(self.binding(ms, me, named)?);
        }
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        let (line, column) = self.source.position(s);
        let mut record = ParamRecord::new(format!("{{ {} }}", names.join(", ")), line, column);

        let after = skip_trivia(self.text, self.mask, close + 1);
        if after < e && self.byte(after) == Some(b'=') {
            let (ds, de) = trim_range(self.text, after + 1, e);
            record.has_default = true;
            record.example = Some(self.text[ds..de].to_string());
        } else if after < e {
            return Err(self.error(
                ErrorCode::INVALID_PARAMETER,
                "a destructuring parameter takes examples per member",
                after,
            ));
        } else {
            self.splicer.insert(close + 1, " = {}");
        }
        record.members = members;
        Ok(record)
    }

    fn array_param(&mut self, s: usize, e: usize) -> Result<ParamRecord, Diagnostic> {
        let close = find_matching(self.text, self.mask, s).map_err(|err| err.to_diagnostic(self.source))?;
        let (line, column) = self.source.position(s);
        let mut record = ParamRecord::new(collapse_lines(&self.text[s..close + 1]), line, column);
        let after = skip_trivia(self.text, self.mask, close + 1);
        if after < e && self.byte(after) == Some(b'=') {
            let (ds, de) = trim_range(self.text, after + 1, e);
            record.has_default = true;
            record.example = Some(self.text[ds..de].to_string());
        }
        Ok(record)
    }

    // ── Returns ──

    fn returns(&mut self, after_params: usize) -> Result<Option<ReturnRecord>, Diagnostic> {
        let at = skip_trivia(self.text, self.mask, after_params);
        let rest = &self.text[at.min(self.text.len())..];
        let mode = if rest.starts_with("->") {
            ReturnMode::Default
        } else if rest.starts_with("-?") {
            ReturnMode::TestAgainstExample
        } else if rest.starts_with("-!") {
            ReturnMode::SkipTest
        } else {
            return Ok(None);
        };
        let from = at + 2;
        let end = type_extent(self.text, self.mask, from);
        let (es, ee) = trim_range(self.text, from, end);
        if es >= ee {
            return Err(self
                .error(ErrorCode::INVALID_RETURN_TYPE, format!("'{}' needs a return example", &rest[..2]), at)
                .with_suggestion(format!("write '{} <example>' before the body", &rest[..2])));
        }
        let body = skip_trivia(self.text, self.mask, end);
        if self.byte(body) != Some(b'{') {
            return Err(self
                .error(ErrorCode::INVALID_RETURN_TYPE, "expected a function body after the return example", body)
                .with_expected("'{'"));
        }
        self.splicer.replace(at, ee, blank_out(&self.text[at..ee]));
        Ok(Some(ReturnRecord {
            example: double_separators(&self.text[es..ee]),
            mode,
        }))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Type Extent
// ══════════════════════════════════════════════════════════════════════════════

/// End of the return type expression starting at `from`.
///
/// Primaries are literals, names, bracketed groups and object types, each
/// with member, call and index postfixes; `|`, `||`, `&`, `&&` and `??`
/// continue the expression. A `{` is an object type only when the next
/// token looks like `key:`; otherwise it opens the body and ends the scan.
pub(crate) fn type_extent(text: &str, mask: &CodeMask, from: usize) -> usize {
    let bytes = text.as_bytes();
    let mut end = from;
    let mut at = from;
    loop {
        at = skip_trivia(text, mask, at);
        while matches!(bytes.get(at), Some(b'+' | b'-' | b'!')) {
            at = skip_trivia(text, mask, at + 1);
        }
        let Some(primary_end) = primary(text, mask, at) else {
            return end;
        };
        end = postfix(text, mask, primary_end);

        let next = skip_trivia(text, mask, end);
        let rest = &text[next.min(text.len())..];
        if rest.starts_with("||") || rest.starts_with("&&") || rest.starts_with("??") {
            at = next + 2;
        } else if rest.starts_with('|') || rest.starts_with('&') {
            at = next + 1;
        } else {
            return end;
        }
    }
}

fn primary(text: &str, mask: &CodeMask, at: usize) -> Option<usize> {
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
        b'(' | b'[' => find_matching(text, mask, at).ok().map(|c| c + 1),
        b'{' if looks_like_object_type(text, mask, at) => find_matching(text, mask, at).ok().map(|c| c + 1),
        b'{' => None,
        b'0'..=b'9' | b'.' => {
            let mut end = at;
            while end < bytes.len() && (is_ident_byte(bytes[end]) || bytes[end] == b'.') {
                end += 1;
            }
            Some(end)
        }
        _ if is_ident_start_byte(b) => {
            let (word, end) = ident_at(text, at)?;
            if word == "new" || word == "typeof" {
                let inner = skip_trivia(text, mask, end);
                return primary(text, mask, inner);
            }
            Some(end)
        }
        _ => None,
    }
}

fn postfix(text: &str, mask: &CodeMask, mut end: usize) -> usize {
    let bytes = text.as_bytes();
    loop {
        let next = skip_trivia(text, mask, end);
        match bytes.get(next) {
            Some(b'.') if !text[next..].starts_with("...") => match ident_at(text, next + 1) {
                Some((_, e)) => end = e,
                None => return end,
            },
            Some(b'?') if text[next..].starts_with("?.") => match ident_at(text, next + 2) {
                Some((_, e)) => end = e,
                None => return end,
            },
            Some(b'(' | b'[') if next == end => match find_matching(text, mask, next) {
                Ok(close) => end = close + 1,
                Err(_) => return end,
            },
            _ => return end,
        }
    }
}

/// `{` followed by `key:`, `key?:` or `'key':`.
fn looks_like_object_type(text: &str, mask: &CodeMask, open: usize) -> bool {
    let bytes = text.as_bytes();
    let at = skip_trivia(text, mask, open + 1);
    let key_end = if matches!(bytes.get(at), Some(b'\'' | b'"')) {
        literal_end(text, mask, at)
    } else {
        match ident_at(text, at) {
            Some((_, end)) => end,
            None => return false,
        }
    };
    let mut next = skip_trivia(text, mask, key_end);
    if bytes.get(next) == Some(&b'?') {
        next = skip_trivia(text, mask, next + 1);
    }
    bytes.get(next) == Some(&b':')
}

// ══════════════════════════════════════════════════════════════════════════════
// Doc Comments
// ══════════════════════════════════════════════════════════════════════════════

/// Text of a `/** ... */` comment directly before `start`.
fn doc_comment(text: &str, mask: &CodeMask, start: usize) -> Option<String> {
    let bytes = text.as_bytes();
    let mut end = start;
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    if end < 2 || !text[..end].ends_with("*/") || mask.state(end - 1) != ScanState::BlockComment {
        return None;
    }
    let mut begin = end - 1;
    while begin > 0 && mask.state(begin - 1) == ScanState::BlockComment && !text[..begin].ends_with("*/") {
        begin -= 1;
    }
    let comment = &text[begin..end];
    let inner = comment.strip_prefix("/**")?.strip_suffix("*/")?;
    let lines: Vec<&str> = inner
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty() && !l.starts_with('@'))
        .collect();
    (!lines.is_empty()).then(|| lines.join(" "))
}
