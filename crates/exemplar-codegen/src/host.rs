//! Host-source generator.
//!
//! Takes the rewritten module text and the AST parsed from it, then:
//! 1. rewrites every `unsafe { ... }` block into a guarded `try`/`catch`
//!    whose failure degrades to a tagged error value,
//! 2. in strict mode, inserts argument guards at the start of each safe
//!    declaration and checks `-?` return values,
//! 3. appends `__meta` records and the runtime helper prelude.
//!
//! Every edit is spliced within a line, so the emitted module keeps the
//! line structure of the surface source.

use crate::error::CodegenResult;
use crate::meta::{render_assignments, ClassMeta};
use crate::prelude;
use crate::source_map::{source_url_comment, DeclKind, SourceMap};
use exemplar_lexer::Splicer;
use exemplar_types::ast::{Function, FunctionBody, Program, Stmt, StmtKind};
use exemplar_types::visit::{walk_function, walk_stmt, AstVisitor};
use exemplar_types::{FunctionSignature, ReturnMode, Span};
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// Host generator settings.
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    /// Emit argument guards and `-?` return checks.
    pub strict: bool,
    /// Build a [`SourceMap`] and append a `sourceURL` comment.
    pub source_maps: bool,
    pub filename: String,
}

/// Everything the generator needs about one rewritten module.
#[derive(Debug, Clone, Copy)]
pub struct HostInput<'a> {
    /// Rewritten module text; `program` spans point into it.
    pub source: &'a str,
    pub program: &'a Program,
    /// Signature per top-level declaration, keyed by emitted name.
    pub signatures: &'a IndexMap<String, FunctionSignature>,
    /// Dispatcher name → emitted variant names.
    pub overloads: &'a IndexMap<String, Vec<String>>,
    pub classes: &'a [ClassMeta],
    /// Declarations written with the `!` marker: no guards.
    pub unsafe_functions: &'a BTreeSet<String>,
}

/// Generated host source.
#[derive(Debug, Clone, PartialEq)]
pub struct HostOutput {
    /// Module, metadata and prelude.
    pub code: String,
    /// The module alone: what tests execute against.
    pub module_source: String,
    pub source_map: Option<SourceMap>,
    /// Prelude helpers that were appended.
    pub helpers: Vec<&'static str>,
}

/// Generate host source for one module.
pub fn emit_host(input: &HostInput<'_>, options: &HostOptions) -> CodegenResult<HostOutput> {
    let mut splicer = Splicer::new();

    let mut unsafe_blocks = UnsafeRewriter {
        splicer: &mut splicer,
        function_depth: 0,
    };
    for stmt in &input.program.body {
        unsafe_blocks.visit_stmt(stmt);
    }

    if options.strict {
        for (func, _) in input.program.functions() {
            let Some(name) = func.name() else { continue };
            if input.unsafe_functions.contains(name) {
                continue;
            }
            if let Some(sig) = input.signatures.get(name) {
                insert_guards(&mut splicer, func, sig);
            }
        }
    }

    let module_source = splicer.apply(input.source);
    let mut code = module_source.clone();
    if !code.ends_with('\n') {
        code.push('\n');
    }
    code.push_str(&render_assignments(input.signatures, input.overloads, input.classes));
    let helpers = prelude::referenced_helpers(&module_source);
    code.push_str(&prelude::render(&helpers));

    let source_map = options.source_maps.then(|| build_source_map(input));
    if options.source_maps {
        code.push_str(&source_url_comment(&options.filename));
        code.push('\n');
    }

    Ok(HostOutput {
        code,
        module_source,
        source_map,
        helpers,
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Unsafe blocks
// ══════════════════════════════════════════════════════════════════════════════

struct UnsafeRewriter<'s> {
    splicer: &'s mut Splicer,
    function_depth: usize,
}

impl AstVisitor for UnsafeRewriter<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let StmtKind::Unsafe(block) = &stmt.kind {
            self.splicer.replace(stmt.span.start, block.span.start, "try ");
            let handler = if self.function_depth > 0 {
                " catch (__e) { return { $error: true, op: 'unsafe', message: String(__e && __e.message || __e) }; }"
            } else {
                " catch (__e) { void __e; }"
            };
            self.splicer.insert(block.span.end, handler);
        }
        walk_stmt(self, stmt);
    }

    fn visit_function(&mut self, func: &Function) {
        self.function_depth += 1;
        walk_function(self, func);
        self.function_depth -= 1;
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Strict-mode guards
// ══════════════════════════════════════════════════════════════════════════════

fn descriptor_literal(sig: &FunctionSignature, param: &str) -> Option<String> {
    let ty = &sig.params.get(param)?.ty;
    if ty.is_any() && ty.reference.is_none() {
        return None;
    }
    serde_json::to_string(ty).ok()
}

fn error_literal(message: &str, param: &str) -> String {
    let message = serde_json::to_string(message).unwrap_or_else(|_| "\"invalid argument\"".into());
    format!("{{ $error: true, message: {message}, param: '{param}' }}")
}

/// One line of guards, inserted right after the body's `{`.
fn guard_line(sig: &FunctionSignature) -> String {
    let mut out = String::new();
    for (i, (name, param)) in sig.params.iter().enumerate() {
        if param.rest {
            break;
        }
        if param.required {
            out.push_str(&format!(
                " if (arguments.length <= {i} || arguments[{i}] === undefined) return {};",
                error_literal(&format!("missing required argument '{name}'"), name)
            ));
        }
        if let Some(ty) = descriptor_literal(sig, name) {
            out.push_str(&format!(
                " if (arguments[{i}] !== undefined && !__checkType(arguments[{i}], {ty})) return {};",
                error_literal(&format!("argument '{name}' does not match its example"), name)
            ));
        }
    }
    out
}

fn insert_guards(splicer: &mut Splicer, func: &Function, sig: &FunctionSignature) {
    let FunctionBody::Block(block) = &func.body else {
        return;
    };
    let guards = guard_line(sig);
    if !guards.is_empty() {
        splicer.insert(block.span.start + 1, guards);
    }

    if sig.return_mode != ReturnMode::TestAgainstExample {
        return;
    }
    let Some(ty) = sig.returns.as_ref().and_then(|t| serde_json::to_string(t).ok()) else {
        return;
    };
    let mut returns = ReturnCollector(Vec::new());
    for stmt in &block.body {
        returns.visit_stmt(stmt);
    }
    for span in returns.0 {
        splicer.insert(span.start, "__checkReturn(");
        splicer.insert(span.end, format!(", {ty}, '{}')", sig.name));
    }
}

/// Spans of returned expressions, not descending into nested functions.
struct ReturnCollector(Vec<Span>);

impl AstVisitor for ReturnCollector {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let StmtKind::Return(Some(value)) = &stmt.kind {
            self.0.push(value.span);
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, _: &exemplar_types::ast::Expr) {}

    fn visit_function(&mut self, _: &Function) {}

    fn visit_class(&mut self, _: &exemplar_types::ast::ClassDecl) {}
}

// ══════════════════════════════════════════════════════════════════════════════
// Source map
// ══════════════════════════════════════════════════════════════════════════════

fn build_source_map(input: &HostInput<'_>) -> SourceMap {
    let variants: BTreeSet<&str> = input
        .overloads
        .values()
        .flatten()
        .map(String::as_str)
        .collect();
    let mut map = SourceMap::new();
    for (func, _) in input.program.functions() {
        let Some(name) = func.name() else { continue };
        let kind = if input.overloads.contains_key(name) {
            DeclKind::Dispatcher
        } else if variants.contains(name) {
            DeclKind::Variant
        } else if name.contains("$ctor") || name.ends_with("$new") {
            DeclKind::Constructor
        } else {
            DeclKind::Function
        };
        map.push(name, kind, func.span.line, func.span.column);
    }
    for class in input.program.classes() {
        map.push(&class.name.name, DeclKind::Class, class.span.line, class.span.column);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use exemplar_types::{ParameterDescriptor, SourceFile, TypeDescriptor};

    fn parse(source: &str) -> Program {
        let sf = SourceFile::new("test.ex", source);
        let result = exemplar_parser::parse(&sf);
        match result.program {
            Some(p) if !result.errors.has_errors() => p,
            _ => panic!("parse failed: {:?}", result.errors.errors),
        }
    }

    fn number_param(name: &str, required: bool) -> ParameterDescriptor {
        let mut p = ParameterDescriptor::new(name, TypeDescriptor::number(), required);
        p.example = Some("0".into());
        p
    }

    #[test]
    fn test_guard_line_required_and_typed() {
        let mut sig = FunctionSignature::new("add");
        sig.params.insert("a".into(), number_param("a", true));
        sig.params.insert("b".into(), number_param("b", false));
        let line = guard_line(&sig);
        assert!(line.contains("arguments.length <= 0"));
        assert!(!line.contains("arguments.length <= 1"));
        assert!(line.contains(r#"__checkType(arguments[1], {"kind":"number"})"#));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_unsafe_in_function_returns_tagged_error() {
        let src = "function f() {\n  unsafe {\n    g();\n  }\n}\n";
        let program = parse(src);
        let sigs = IndexMap::new();
        let out = emit_host(
            &HostInput {
                source: src,
                program: &program,
                signatures: &sigs,
                overloads: &IndexMap::new(),
                classes: &[],
                unsafe_functions: &BTreeSet::new(),
            },
            &HostOptions::default(),
        )
        .unwrap();
        assert!(out.module_source.contains("  try {"));
        assert!(out.module_source.contains("op: 'unsafe'"));
        assert_eq!(out.module_source.lines().count(), src.lines().count());
    }
}
