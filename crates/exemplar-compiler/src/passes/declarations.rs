//! Declarative block lowering.
//!
//! `Type`, `Union`, `Enum`, `Generic` and `extend` blocks at the top level
//! become calls of the runtime helpers of the same names:
//!
//! ```text
//! Type Name 'desc' = example      → const Name = Type('Name', example, 'desc')
//! Type Name { example: …, … }     → const Name = Type('Name', { example: …, … })
//! Union Name 'desc' a | b | c     → const Name = Union('Name', 'desc', [a, b, c])
//! Enum Name { A, B = 'b', C }     → const Name = Enum('Name', { A: 0, B: 'b', C: 1 })
//! Generic Name<T> { … }           → const Name = Generic('Name', ['T'], { … })
//! extend Target { m(…) { … } }    → __extend('Target', { m: function (…) { … } })
//! ```
//!
//! Only the head of each block is rewritten where possible, so multi-line
//! bodies keep their lines; fully rebuilt blocks are padded with
//! [`preserve_lines`].

use super::{at_statement_start, statement_end, string_literal_at};
use crate::context::CompileContext;
use exemplar_lexer::balance::{
    collapse_lines, depth_map, find_matching, ident_at, is_ident_start_byte, is_word_at,
    preserve_lines, skip_trivia, split_top_level, trim_range,
};
use exemplar_lexer::{CodeMask, Splicer};
use exemplar_types::{Diagnostic, ErrorCode, SourceFile};

/// Targets that live on the global object and are extended by name.
const BUILTIN_TARGETS: &[&str] = &[
    "String", "Array", "Number", "Object", "Boolean", "Function", "Date", "Map", "Set", "RegExp",
    "Promise", "Error",
];

const BLOCK_WORDS: &[&str] = &["Type", "Union", "Enum", "Generic", "extend"];

pub fn run(text: &str, ctx: &mut CompileContext) -> Result<String, Diagnostic> {
    let mask = CodeMask::new(text);
    let depth = depth_map(text, &mask);
    let source = ctx.source_file(text);
    let bytes = text.as_bytes();
    let mut splicer = Splicer::new();
    let mut at = 0;

    while at < bytes.len() {
        let is_candidate = mask.is_code(at)
            && depth[at] == 0
            && is_ident_start_byte(bytes[at])
            && (at == 0 || !exemplar_lexer::balance::is_ident_byte(bytes[at - 1]));
        if !is_candidate {
            at += 1;
            continue;
        }
        let Some((word, word_end)) = ident_at(text, at) else {
            at += 1;
            continue;
        };
        if !BLOCK_WORDS.contains(&word) || !at_statement_start(text, &mask, at) {
            at = word_end;
            continue;
        }
        // `Type(...)` and `Type.x` are plain uses of the helper.
        let name_at = skip_trivia(text, &mask, word_end);
        let Some((name, name_end)) = ident_at(text, name_at) else {
            at = word_end;
            continue;
        };
        let block = Block {
            text,
            mask: &mask,
            source: &source,
            start: at,
            name,
            after_name: name_end,
        };
        let end = match word {
            "Type" => block.lower_type(&mut splicer)?,
            "Union" => block.lower_union(&mut splicer)?,
            "Enum" => block.lower_enum(&mut splicer)?,
            "Generic" => block.lower_generic(&mut splicer)?,
            _ => block.lower_extend(&mut splicer, ctx)?,
        };
        if word != "extend" {
            ctx.type_names.insert(name.to_string());
        }
        at = end.max(word_end);
    }

    tracing::debug!(types = ctx.type_names.len(), "lowered declarative blocks");
    Ok(splicer.apply(text))
}

/// One declarative block being lowered.
struct Block<'a> {
    text: &'a str,
    mask: &'a CodeMask,
    source: &'a SourceFile,
    start: usize,
    name: &'a str,
    after_name: usize,
}

impl<'a> Block<'a> {
    fn error(&self, offset: usize, message: impl Into<String>) -> Diagnostic {
        Diagnostic::at(ErrorCode::MALFORMED_DECLARATION, message, self.source, offset)
    }

    fn byte(&self, at: usize) -> Option<u8> {
        self.text.as_bytes().get(at).copied()
    }

    /// Optional `'description'` after the name: (quoted literal, end).
    fn description(&self, from: usize) -> (Option<&'a str>, usize) {
        let at = skip_trivia(self.text, self.mask, from);
        match string_literal_at(self.text, self.mask, at) {
            Some((_, end)) => (Some(&self.text[at..end]), end),
            None => (None, from),
        }
    }

    fn matching(&self, open: usize) -> Result<usize, Diagnostic> {
        find_matching(self.text, self.mask, open).map_err(|e| e.to_diagnostic(self.source))
    }

    // ── Type ──

    fn lower_type(&self, splicer: &mut Splicer) -> Result<usize, Diagnostic> {
        let (description, after) = self.description(self.after_name);
        let at = skip_trivia(self.text, self.mask, after);
        let name = self.name;
        let tail = match description {
            Some(d) => format!(", {d})"),
            None => ")".to_string(),
        };
        match self.byte(at) {
            Some(b'=') => {
                let value_at = skip_trivia(self.text, self.mask, at + 1);
                let end = statement_end(self.text, self.mask, value_at);
                if end <= value_at {
                    return Err(self.error(at, format!("Type {name} has no example value")));
                }
                splicer.replace(self.start, value_at, format!("const {name} = Type('{name}', "));
                splicer.insert(end, tail);
                Ok(end)
            }
            Some(b'{') => {
                let close = self.matching(at)?;
                splicer.replace(self.start, at, format!("const {name} = Type('{name}', "));
                splicer.insert(close + 1, tail);
                Ok(close + 1)
            }
            _ => Err(self.error(at, format!("expected '=' or '{{' after Type {name}"))),
        }
    }

    // ── Union ──

    fn lower_union(&self, splicer: &mut Splicer) -> Result<usize, Diagnostic> {
        let (description, after) = self.description(self.after_name);
        let mut members_at = skip_trivia(self.text, self.mask, after);
        if self.byte(members_at) == Some(b'=') {
            members_at = skip_trivia(self.text, self.mask, members_at + 1);
        }
        let end = statement_end(self.text, self.mask, members_at);
        let members = split_members(self.text, self.mask, members_at, end);
        if members.is_empty() {
            return Err(self.error(members_at, format!("Union {} has no members", self.name)));
        }
        let name = self.name;
        let list = members.join(", ");
        let call = match description {
            Some(d) => format!("const {name} = Union('{name}', {d}, [{list}])"),
            None => format!("const {name} = Union('{name}', [{list}])"),
        };
        splicer.replace(self.start, end, preserve_lines(&self.text[self.start..end], &call));
        Ok(end)
    }

    // ── Enum ──

    fn lower_enum(&self, splicer: &mut Splicer) -> Result<usize, Diagnostic> {
        let (description, after) = self.description(self.after_name);
        let open = skip_trivia(self.text, self.mask, after);
        if self.byte(open) != Some(b'{') {
            return Err(self.error(open, format!("expected '{{' after Enum {}", self.name)));
        }
        let close = self.matching(open)?;
        let mut next_value = 0f64;
        let mut entries = Vec::new();
        for (s, e) in split_top_level(self.text, self.mask, open + 1, close) {
            let entry = &self.text[s..e];
            let (key, value) = match entry.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (entry.trim(), None),
            };
            if ident_at(key, 0).map(|(k, _)| k.len()) != Some(key.len()) {
                return Err(self.error(s, format!("invalid Enum member '{key}'")));
            }
            let value = match value {
                Some(v) => {
                    if let Ok(n) = v.parse::<f64>() {
                        next_value = n + 1.0;
                    }
                    collapse_lines(v)
                }
                None => {
                    let v = format_number(next_value);
                    next_value += 1.0;
                    v
                }
            };
            entries.push(format!("{key}: {value}"));
        }
        let name = self.name;
        let object = format!("{{ {} }}", entries.join(", "));
        let call = match description {
            Some(d) => format!("const {name} = Enum('{name}', {d}, {object})"),
            None => format!("const {name} = Enum('{name}', {object})"),
        };
        splicer.replace(self.start, close + 1, preserve_lines(&self.text[self.start..close + 1], &call));
        Ok(close + 1)
    }

    // ── Generic ──

    fn lower_generic(&self, splicer: &mut Splicer) -> Result<usize, Diagnostic> {
        let lt = skip_trivia(self.text, self.mask, self.after_name);
        if self.byte(lt) != Some(b'<') {
            return Err(self.error(lt, format!("expected '<' after Generic {}", self.name)));
        }
        let gt = self.text[lt..]
            .find('>')
            .map(|rel| lt + rel)
            .ok_or_else(|| self.error(lt, "unclosed type parameter list"))?;
        let params: Vec<String> = self.text[lt + 1..gt]
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("'{p}'"))
            .collect();
        let (description, after) = self.description(gt + 1);
        let open = skip_trivia(self.text, self.mask, after);
        if self.byte(open) != Some(b'{') {
            return Err(self.error(open, format!("expected '{{' after Generic {}", self.name)));
        }
        let close = self.matching(open)?;
        let name = self.name;
        let params = params.join(", ");
        // The helper reads the description off the declaration object.
        let (head, tail) = match description {
            Some(d) => (
                format!("const {name} = Generic('{name}', [{params}], Object.assign("),
                format!(", {{ description: {d} }}))"),
            ),
            None => (format!("const {name} = Generic('{name}', [{params}], "), ")".to_string()),
        };
        splicer.replace(self.start, open, preserve_lines(&self.text[self.start..open], &head));
        splicer.insert(close + 1, tail);
        Ok(close + 1)
    }

    // ── extend ──

    fn lower_extend(&self, splicer: &mut Splicer, ctx: &mut CompileContext) -> Result<usize, Diagnostic> {
        let open = skip_trivia(self.text, self.mask, self.after_name);
        if self.byte(open) != Some(b'{') {
            return Err(self.error(open, format!("expected '{{' after extend {}", self.name)));
        }
        let close = self.matching(open)?;
        let target = if BUILTIN_TARGETS.contains(&self.name) {
            format!("'{}'", self.name)
        } else {
            self.name.to_string()
        };
        splicer.replace(self.start, open + 1, format!("__extend({target}, {{"));

        let mut at = skip_trivia(self.text, self.mask, open + 1);
        let mut first = true;
        while at < close {
            let member_start = at;
            let is_async = is_word_at(self.text, at, "async");
            let name_at = if is_async {
                skip_trivia(self.text, self.mask, at + 5)
            } else {
                at
            };
            let Some((method, method_end)) = ident_at(self.text, name_at) else {
                return Err(self.error(at, format!("expected a method in extend {}", self.name)));
            };
            let paren = skip_trivia(self.text, self.mask, method_end);
            if self.byte(paren) != Some(b'(') {
                return Err(self.error(paren, format!("expected '(' after '{method}'")));
            }
            let params_close = self.matching(paren)?;
            let body = self.text[params_close + 1..close]
                .find('{')
                .map(|rel| params_close + 1 + rel)
                .filter(|&b| self.mask.is_code(b))
                .ok_or_else(|| self.error(params_close, format!("'{method}' has no body")))?;
            let body_close = self.matching(body)?;

            let (line, column) = self.source.position(name_at);
            ctx.register_extension(self.name, method, line, column)?;

            let keyword = if is_async { "async function" } else { "function" };
            let separator = if first { "" } else { ", " };
            splicer.replace(member_start, method_end, format!("{separator}{method}: {keyword} "));
            first = false;
            at = skip_trivia(self.text, self.mask, body_close + 1);
            if self.byte(at) == Some(b',') {
                splicer.replace(at, at + 1, " ");
                at = skip_trivia(self.text, self.mask, at + 1);
            }
        }
        splicer.insert(close + 1, ")");
        Ok(close + 1)
    }
}

/// Members of a `Union`, split at top-level `|` or `||`.
fn split_members(text: &str, mask: &CodeMask, start: usize, end: usize) -> Vec<String> {
    let bytes = text.as_bytes();
    let depth = depth_map(&text[..end], mask);
    let mut members = Vec::new();
    let mut from = start;
    let mut i = start;
    while i < end {
        if bytes[i] == b'|' && mask.is_code(i) && depth[i] == depth[start] {
            push_member(text, from, i, &mut members);
            i += if bytes.get(i + 1) == Some(&b'|') { 2 } else { 1 };
            from = i;
        } else {
            i += 1;
        }
    }
    push_member(text, from, end, &mut members);
    members
}

fn push_member(text: &str, start: usize, end: usize, out: &mut Vec<String>) {
    let (s, e) = trim_range(text, start, end);
    if s < e {
        out.push(collapse_lines(&text[s..e]));
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(src: &str) -> String {
        let mut ctx = CompileContext::new("t.ex");
        run(src, &mut ctx).unwrap_or_else(|d| panic!("{}", d.render()))
    }

    fn lower_err(src: &str) -> Diagnostic {
        let mut ctx = CompileContext::new("t.ex");
        run(src, &mut ctx).expect_err("expected a diagnostic")
    }

    #[test]
    fn test_type_with_example_and_description() {
        assert_eq!(lower("Type Email = ''\n"), "const Email = Type('Email', '')\n");
        assert_eq!(
            lower("Type Age 'years' = +0\n"),
            "const Age = Type('Age', +0, 'years')\n"
        );
    }

    #[test]
    fn test_unicode_type_name() {
        assert_eq!(lower("Type Näme = 'x'\n"), "const Näme = Type('Näme', 'x')\n");
    }

    #[test]
    fn test_type_block_keeps_lines() {
        let src = "Type Even {\n  example: 0,\n  predicate(x) { return x % 2 === 0 }\n}\nf()\n";
        let out = lower(src);
        assert!(out.starts_with("const Even = Type('Even', {\n  example: 0,"));
        assert!(out.contains("}\n})\nf()"));
        assert_eq!(out.lines().count(), src.lines().count());
    }

    #[test]
    fn test_union_members() {
        let out = lower("Union Color 'ui colors' 'red' | 'green'\n  | 'blue'\nx()\n");
        assert!(out.starts_with("const Color = Union('Color', 'ui colors', ['red', 'green', 'blue'])\n\n"));
        assert!(out.ends_with("x()\n"));
    }

    #[test]
    fn test_enum_auto_values() {
        let out = lower("Enum Level { Low, Mid = 'm', High }\n");
        assert_eq!(out, "const Level = Enum('Level', { Low: 0, Mid: 'm', High: 1 })\n");
        let numbered = lower("Enum Code 'status' { Ok = 200, Created }\n");
        assert_eq!(numbered, "const Code = Enum('Code', 'status', { Ok: 200, Created: 201 })\n");
    }

    #[test]
    fn test_generic_params() {
        let out = lower("Generic Box<T, U> {\n  example: { value: 0 }\n}\n");
        assert_eq!(out, "const Box = Generic('Box', ['T', 'U'], {\n  example: { value: 0 }\n})\n");
    }

    #[test]
    fn test_extend_builtin_and_class() {
        let out = lower("extend String {\n  shout(s) { return s + '!' }\n  async twice(s) { return s + s }\n}\n");
        assert!(out.starts_with("__extend('String', {\n  shout: function (s)"));
        assert!(out.contains(", twice: async function (s)"));
        assert!(out.trim_end().ends_with("})"));

        let class = lower("extend Point { norm() { return 1 } }\n");
        assert!(class.starts_with("__extend(Point, { norm: function ()"));
    }

    #[test]
    fn test_duplicate_extension_is_error() {
        let err = lower_err("extend Array { a() {} }\nextend Array { a() {} }\n");
        assert_eq!(err.code, ErrorCode::DUPLICATE_EXTENSION);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_helper_calls_untouched() {
        let src = "const T = Type('T', 0)\nType.check(1)\n";
        assert_eq!(lower(src), src);
    }

    #[test]
    fn test_type_names_recorded() {
        let mut ctx = CompileContext::new("t.ex");
        run("Type A = 0\nEnum B { X }\n", &mut ctx).unwrap();
        assert!(ctx.type_names.contains("A"));
        assert!(ctx.type_names.contains("B"));
    }
}
