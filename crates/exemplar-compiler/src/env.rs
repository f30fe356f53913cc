//! Lexically scoped bindings for the lint pass.
//!
//! [`LintEnv`] manages a stack of scopes. Each scope records the locals it
//! declares and every name read while it was open, so a local read before
//! its declaration (hoisting, closures) still counts as used.

use std::collections::HashSet;

use exemplar_types::Span;

// ══════════════════════════════════════════════════════════════════════════════
// Scope Kind
// ══════════════════════════════════════════════════════════════════════════════

/// What kind of code context a scope represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Top-level module scope: bindings may be imported elsewhere.
    Module,
    /// A function body, parameters included.
    Function,
    /// A nested block.
    Block,
}

// ══════════════════════════════════════════════════════════════════════════════
// Scope
// ══════════════════════════════════════════════════════════════════════════════

/// A declared local.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub span: Span,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    declared: Vec<Binding>,
    reads: HashSet<String>,
}

// ══════════════════════════════════════════════════════════════════════════════
// LintEnv
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct LintEnv {
    scopes: Vec<Scope>,
}

impl LintEnv {
    /// Create an environment with the module scope open.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Module,
                declared: Vec::new(),
                reads: HashSet::new(),
            }],
        }
    }

    pub fn push_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind,
            declared: Vec::new(),
            reads: HashSet::new(),
        });
    }

    /// Close the innermost scope and return its locals that were never
    /// read. The module scope is never closed and never reports.
    pub fn pop_scope(&mut self) -> Vec<Binding> {
        if self.scopes.len() <= 1 {
            return Vec::new();
        }
        let Some(scope) = self.scopes.pop() else {
            return Vec::new();
        };
        scope
            .declared
            .into_iter()
            .filter(|b| !scope.reads.contains(&b.name))
            .collect()
    }

    /// Declare a local in the innermost scope.
    pub fn define(&mut self, name: &str, span: Span) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.kind != ScopeKind::Module && !scope.declared.iter().any(|b| b.name == name) {
                scope.declared.push(Binding {
                    name: name.to_string(),
                    span,
                });
            }
        }
    }

    /// Record a read of `name` in every open scope.
    pub fn read(&mut self, name: &str) {
        for scope in &mut self.scopes {
            if !scope.reads.contains(name) {
                scope.reads.insert(name.to_string());
            }
        }
    }

    pub fn current_scope_kind(&self) -> ScopeKind {
        self.scopes.last().map_or(ScopeKind::Module, |s| s.kind)
    }

    /// `true` when inside any function.
    pub fn in_function(&self) -> bool {
        self.scopes.iter().any(|s| s.kind == ScopeKind::Function)
    }
}

impl Default for LintEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unread_local_reported_on_pop() {
        let mut env = LintEnv::new();
        env.push_scope(ScopeKind::Function);
        env.define("a", Span::default());
        env.define("b", Span::default());
        env.read("b");
        let unused: Vec<String> = env.pop_scope().into_iter().map(|b| b.name).collect();
        assert_eq!(unused, vec!["a"]);
    }

    #[test]
    fn test_read_before_declaration_counts() {
        let mut env = LintEnv::new();
        env.push_scope(ScopeKind::Function);
        env.read("later");
        env.define("later", Span::default());
        assert!(env.pop_scope().is_empty());
    }

    #[test]
    fn test_read_in_inner_scope_reaches_outer() {
        let mut env = LintEnv::new();
        env.push_scope(ScopeKind::Function);
        env.define("x", Span::default());
        env.push_scope(ScopeKind::Block);
        env.read("x");
        assert!(env.pop_scope().is_empty());
        assert!(env.pop_scope().is_empty());
        assert_eq!(env.current_scope_kind(), ScopeKind::Module);
    }

    #[test]
    fn test_module_scope_never_reports() {
        let mut env = LintEnv::new();
        env.define("exported", Span::default());
        assert!(env.pop_scope().is_empty());
        assert!(!env.in_function());
    }
}
