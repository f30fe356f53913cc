//! Non-fatal lints over the rewritten module.
//!
//! - `W901` a local declared inside a function and never read. Names
//!   starting with `_` are exempt.
//! - `W902` an expression statement with no effect.
//!
//! Implicit `any` (`W900`) is reported by the parameter pass, which sees the
//! parameter as written.

use crate::env::{LintEnv, ScopeKind};
use exemplar_types::ast::{Expr, ExprKind, Function, FunctionBody, Pattern, Program, Stmt, StmtKind, UnaryOp};
use exemplar_types::visit::{walk_expr, walk_pattern, walk_program, walk_stmt, AstVisitor};
use exemplar_types::{Diagnostic, ErrorCode, SourceFile};

/// Run every lint over `program`, warnings ordered by position.
pub fn lint(program: &Program, source: &SourceFile) -> Vec<Diagnostic> {
    let mut linter = Linter {
        env: LintEnv::new(),
        source,
        warnings: Vec::new(),
    };
    walk_program(&mut linter, program);
    linter.warnings.sort_by_key(|d| (d.line, d.column));
    tracing::debug!(warnings = linter.warnings.len(), "linted module");
    linter.warnings
}

struct Linter<'a> {
    env: LintEnv,
    source: &'a SourceFile,
    warnings: Vec<Diagnostic>,
}

impl Linter<'_> {
    fn close_scope(&mut self) {
        for binding in self.env.pop_scope() {
            if binding.name.starts_with('_') {
                continue;
            }
            self.warnings.push(
                Diagnostic::at_span(
                    ErrorCode::UNUSED_LOCAL,
                    format!("'{}' is declared but never read", binding.name),
                    self.source,
                    binding.span,
                )
                .with_suggestion(format!("remove it or rename it to '_{}'", binding.name)),
            );
        }
    }

    fn declare(&mut self, pattern: &Pattern) {
        for ident in pattern.bound_names() {
            self.env.define(&ident.name, ident.span);
        }
        // Defaults inside a destructuring pattern are reads.
        walk_pattern(self, pattern);
    }
}

/// `true` if evaluating `expr` can have no observable effect.
fn is_inert(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Number(_)
        | ExprKind::String(_)
        | ExprKind::Bool(_)
        | ExprKind::Null
        | ExprKind::Ident(_)
        | ExprKind::This
        | ExprKind::Regex { .. } => true,
        ExprKind::Template(t) => t.exprs.iter().all(is_inert),
        ExprKind::Paren(inner) => is_inert(inner),
        ExprKind::Array(items) => items.iter().all(is_inert),
        ExprKind::Binary { left, right, .. } => is_inert(left) && is_inert(right),
        ExprKind::Unary { op, operand } => *op != UnaryOp::Delete && is_inert(operand),
        _ => false,
    }
}

impl AstVisitor for Linter<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Var(decl) => {
                for d in &decl.declarations {
                    if let Some(init) = &d.init {
                        self.visit_expr(init);
                    }
                    self.declare(&d.target);
                }
            }
            StmtKind::Function(func) => {
                if let Some(name) = &func.name {
                    self.env.define(&name.name, name.span);
                }
                self.visit_function(func);
            }
            StmtKind::Block(_) => {
                self.env.push_scope(ScopeKind::Block);
                walk_stmt(self, stmt);
                self.close_scope();
            }
            StmtKind::Expr(expr) => {
                let directive = matches!(&expr.kind, ExprKind::String(s) if s == "use strict");
                if is_inert(expr) && !directive {
                    self.warnings.push(
                        Diagnostic::at_span(
                            ErrorCode::NO_OP_EXPRESSION,
                            "this expression statement has no effect",
                            self.source,
                            stmt.span,
                        )
                        .with_suggestion("assign or return the value, or remove the statement"),
                    );
                }
                walk_stmt(self, stmt);
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_function(&mut self, func: &Function) {
        self.env.push_scope(ScopeKind::Function);
        // Parameters belong to the signature and are never reported.
        for param in &func.params {
            self.visit_pattern(&param.target);
            if let Some(default) = &param.default {
                self.visit_expr(default);
            }
        }
        match &func.body {
            FunctionBody::Block(block) => {
                for stmt in &block.body {
                    self.visit_stmt(stmt);
                }
            }
            FunctionBody::Expr(expr) => self.visit_expr(expr),
        }
        self.close_scope();
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => self.env.read(name),
            ExprKind::Assign { target, value, .. } => {
                // `x = v` only writes `x`; member targets still read.
                if !matches!(target.kind, ExprKind::Ident(_)) {
                    self.visit_expr(target);
                }
                self.visit_expr(value);
                return;
            }
            _ => {}
        }
        walk_expr(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warnings(src: &str) -> Vec<Diagnostic> {
        let source = SourceFile::new("t.ex", src);
        let parsed = exemplar_parser::parse(&source);
        if let Some(d) = parsed.errors.first_error() {
            panic!("{}", d.render());
        }
        lint(&parsed.program.expect("program"), &source)
    }

    #[test]
    fn test_unused_local_reported() {
        let w = warnings("function f() {\n  const unused = 1;\n  const used = 2;\n  return used;\n}\n");
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].code, ErrorCode::UNUSED_LOCAL);
        assert_eq!(w[0].line, 2);
        assert!(w[0].message.contains("'unused'"));
    }

    #[test]
    fn test_underscore_exempt() {
        assert!(warnings("function f() {\n  const _scratch = 1;\n}\n").is_empty());
    }

    #[test]
    fn test_read_from_closure_before_declaration() {
        let src = "function f() {\n  const g = function () { return later; };\n  const later = 1;\n  return g();\n}\n";
        assert!(warnings(src).is_empty());
    }

    #[test]
    fn test_written_but_never_read() {
        let w = warnings("function f() {\n  let x = 0;\n  x = 2;\n}\n");
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].code, ErrorCode::UNUSED_LOCAL);
    }

    #[test]
    fn test_params_and_module_bindings_not_reported() {
        assert!(warnings("const top = 1;\nfunction f(a, b) {\n  return 1;\n}\n").is_empty());
    }

    #[test]
    fn test_no_op_expression() {
        let w = warnings("function f(a) {\n  a + 1;\n  a;\n  call(a);\n}\n");
        let lines: Vec<u32> = w.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![2, 3]);
        assert!(w.iter().all(|d| d.code == ErrorCode::NO_OP_EXPRESSION));
        assert!(w[0].is_warning());
    }

    #[test]
    fn test_use_strict_directive_allowed() {
        assert!(warnings("'use strict';\n").is_empty());
    }
}
