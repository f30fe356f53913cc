//! Safety rewrites.
//!
//! A `try` block with neither `catch` nor `finally` turns every escaping
//! exception into a tagged error value. A `wasm { ... }` block is lifted
//! into the context for the alternate compute path; its keyword is blanked
//! so the braces stay behind as the fallback block.

use super::{at_statement_start, is_keyword};
use crate::context::{CompileContext, InlineBlock};
use exemplar_lexer::balance::{
    blank_out, depth_map, find_matching, find_word, ident_at, is_ident_byte, is_ident_start_byte,
    is_word_at, skip_trivia,
};
use exemplar_lexer::{CodeMask, Splicer};
use exemplar_types::Diagnostic;
use std::collections::BTreeSet;

const CATCH_RETURN: &str =
    " catch (__err) { return { $error: true, message: String(__err && __err.message || __err) } }";
const CATCH_SWALLOW: &str = " catch (__err) { void __err; }";

pub fn run(text: &str, ctx: &mut CompileContext) -> Result<String, Diagnostic> {
    let mask = CodeMask::new(text);
    let depth = depth_map(text, &mask);
    let source = ctx.source_file(text);
    let bytes = text.as_bytes();
    let mut splicer = Splicer::new();

    // ── try without handlers ──
    let mut from = 0;
    let mut wrapped = 0;
    while let Some(at) = find_word(text, &mask, "try", from) {
        from = at + 3;
        let open = skip_trivia(text, &mask, from);
        if bytes.get(open) != Some(&b'{') {
            continue;
        }
        let close = find_matching(text, &mask, open).map_err(|e| e.to_diagnostic(&source))?;
        let next = skip_trivia(text, &mask, close + 1);
        if is_word_at(text, next, "catch") || is_word_at(text, next, "finally") {
            continue;
        }
        // A `return` outside a function is not allowed, so top-level blocks
        // swallow instead.
        let handler = if depth[at] == 0 { CATCH_SWALLOW } else { CATCH_RETURN };
        splicer.insert(close + 1, handler);
        wrapped += 1;
    }

    // ── wasm blocks ──
    let mut from = 0;
    while let Some(at) = find_word(text, &mask, "wasm", from) {
        from = at + 4;
        if !at_statement_start(text, &mask, at) {
            continue;
        }
        let open = skip_trivia(text, &mask, from);
        if bytes.get(open) != Some(&b'{') {
            continue;
        }
        let close = find_matching(text, &mask, open).map_err(|e| e.to_diagnostic(&source))?;
        let body = &text[open + 1..close];
        let (line, _) = source.position(at);
        let id = format!("wasm${}", ctx.inline_blocks.len() + 1);
        tracing::debug!(%id, line, "lifted inline block");
        ctx.inline_blocks.push(InlineBlock {
            id,
            body: body.to_string(),
            line,
            captures: captures(body),
        });
        splicer.replace(at, at + 4, blank_out("wasm"));
        from = close + 1;
    }

    tracing::debug!(wrapped, "applied safety rewrites");
    Ok(splicer.apply(text))
}

/// Free identifiers read by `body`: not keywords, not member names and not
/// declared inside the block. Sorted, unique.
pub(crate) fn captures(body: &str) -> Vec<String> {
    let mask = CodeMask::new(body);
    let bytes = body.as_bytes();
    let mut declared = BTreeSet::new();
    let mut used = BTreeSet::new();
    let mut declaring = false;

    let mut i = 0;
    while i < bytes.len() {
        let boundary = i == 0 || !is_ident_byte(bytes[i - 1]);
        if !(mask.is_code(i) && boundary && is_ident_start_byte(bytes[i])) {
            i += 1;
            continue;
        }
        let Some((word, end)) = ident_at(body, i) else {
            i += 1;
            continue;
        };
        let after_dot = super::word_before(body, i).is_none()
            && exemplar_lexer::balance::prev_significant(body, &mask, i).is_some_and(|p| bytes[p] == b'.');
        if matches!(word, "let" | "const" | "var") {
            declaring = true;
        } else if declaring {
            declared.insert(word.to_string());
            declaring = false;
        } else if !after_dot && !is_keyword(word) {
            used.insert(word.to_string());
        }
        i = end;
    }
    used.difference(&declared).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(src: &str) -> (String, CompileContext) {
        let mut ctx = CompileContext::new("t.ex");
        let out = run(src, &mut ctx).unwrap_or_else(|d| panic!("{}", d.render()));
        (out, ctx)
    }

    #[test]
    fn test_bare_try_gets_error_value_handler() {
        let (out, _) = rewrite("function f() {\n  try { risky() }\n}");
        assert!(out.contains("try { risky() } catch (__err) { return { $error: true"));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_try_with_handler_untouched() {
        let src = "function f() {\n  try { a() } catch (e) { b() }\n  try { c() }\n  finally { d() }\n}";
        let (out, _) = rewrite(src);
        assert_eq!(out, src);
    }

    #[test]
    fn test_top_level_try_swallows() {
        let (out, _) = rewrite("try { setup() }\n");
        assert!(out.contains("catch (__err) { void __err; }"));
    }

    #[test]
    fn test_wasm_block_lifted() {
        let src = "function sum(xs: [0]) {\n  let total = 0\n  wasm {\n    let i = 0\n    total = xs.length + i\n  }\n  return total\n}";
        let (out, ctx) = rewrite(src);
        assert!(!out.contains("wasm"));
        assert!(out.contains("    {\n    let i = 0"));
        let block = &ctx.inline_blocks[0];
        assert_eq!(block.id, "wasm$1");
        assert_eq!(block.line, 3);
        assert_eq!(block.captures, vec!["total", "xs"]);
    }

    #[test]
    fn test_wasm_as_name_untouched() {
        let src = "const wasm = {}\nuse(wasm)\n";
        let (out, ctx) = rewrite(src);
        assert_eq!(out, src);
        assert!(ctx.inline_blocks.is_empty());
    }
}
