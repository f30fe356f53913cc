//! Inline test extraction.
//!
//! `test 'description' { ... }` and `test { ... }` at the top level are
//! recorded in the context and blanked out of the module.

use super::{at_statement_start, string_literal_at};
use crate::context::CompileContext;
use exemplar_eval::TestCase;
use exemplar_lexer::balance::{blank_out, depth_map, find_word, skip_trivia};
use exemplar_lexer::{CodeMask, Splicer};
use exemplar_types::Diagnostic;

pub fn run(text: &str, ctx: &mut CompileContext) -> Result<String, Diagnostic> {
    let mask = CodeMask::new(text);
    let depth = depth_map(text, &mask);
    let bytes = text.as_bytes();
    let mut splicer = Splicer::new();
    let mut from = 0;

    while let Some(at) = find_word(text, &mask, "test", from) {
        from = at + 4;
        if depth[at] != 0 || !at_statement_start(text, &mask, at) {
            continue;
        }
        let mut cursor = skip_trivia(text, &mask, at + 4);
        let description = match string_literal_at(text, &mask, cursor) {
            Some((content, end)) => {
                cursor = skip_trivia(text, &mask, end);
                Some(content)
            }
            None => None,
        };
        if bytes.get(cursor) != Some(&b'{') {
            continue;
        }
        let close = exemplar_lexer::balance::find_matching(text, &mask, cursor)
            .map_err(|e| e.to_diagnostic(&ctx.source_file(text)))?;

        let (line, _) = ctx.source_file(text).position(at);
        let number = ctx.tests.len() + 1;
        ctx.tests.push(TestCase {
            description: description.unwrap_or_else(|| format!("test {number}")),
            body: text[cursor + 1..close].to_string(),
            line,
        });
        splicer.replace(at, close + 1, blank_out(&text[at..close + 1]));
        from = close + 1;
    }

    tracing::debug!(tests = ctx.tests.len(), "extracted inline tests");
    Ok(splicer.apply(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(src: &str) -> (String, CompileContext) {
        let mut ctx = CompileContext::new("t.ex");
        let out = run(src, &mut ctx).unwrap();
        (out, ctx)
    }

    #[test]
    fn test_block_recorded_and_blanked() {
        let src = "function f() { return 1 }\ntest 'f works' {\n  expect(f()).toBe(1)\n}\nconst x = 2\n";
        let (out, ctx) = extract(src);
        assert_eq!(out.lines().count(), src.lines().count());
        assert!(!out.contains("expect"));
        assert!(out.contains("const x = 2"));
        assert_eq!(ctx.tests.len(), 1);
        assert_eq!(ctx.tests[0].description, "f works");
        assert_eq!(ctx.tests[0].line, 2);
        assert!(ctx.tests[0].body.contains("expect(f()).toBe(1)"));
    }

    #[test]
    fn test_description_optional() {
        let (_, ctx) = extract("test {\n  assert(true)\n}\ntest {\n}\n");
        let names: Vec<&str> = ctx.tests.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(names, vec!["test 1", "test 2"]);
    }

    #[test]
    fn test_nested_and_identifier_uses_ignored() {
        let src = "function g() {\n  test {\n  }\n}\nconst test = { a: 1 }\ntest(1)\n";
        let (out, ctx) = extract(src);
        assert!(ctx.tests.is_empty());
        assert_eq!(out, src);
    }

    #[test]
    fn test_in_string_ignored() {
        let (_, ctx) = extract("const s = \"test 'x' { }\"\n");
        assert!(ctx.tests.is_empty());
    }
}
