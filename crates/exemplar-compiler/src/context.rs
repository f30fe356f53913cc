//! Per-call compile context threaded through every pass.
//!
//! Passes run in a fixed order and several of them read what an earlier one
//! recorded: the parameter pass records required-ness and examples that the
//! polymorphic pass classifies and signature building turns into
//! descriptors; the declaration pass records type names that example
//! inference resolves. Everything lives here, owned by one compile call.

use exemplar_eval::TestCase;
use exemplar_types::{Diagnostic, ErrorCode, FunctionSignature, ReturnMode, SourceFile};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ══════════════════════════════════════════════════════════════════════════════
// Declaration Records
// ══════════════════════════════════════════════════════════════════════════════

/// Where a recorded declaration lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclRole {
    Function,
    Method,
    Constructor,
}

/// One parameter as written in the surface source.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRecord {
    pub name: String,
    /// Written with `name: example`.
    pub required: bool,
    /// Example or default text, as written.
    pub example: Option<String>,
    /// Written with `name = value` rather than an example marker.
    pub has_default: bool,
    pub rest: bool,
    /// Members of an object-destructuring parameter.
    pub members: Vec<ParamRecord>,
    pub line: u32,
    pub column: u32,
}

impl ParamRecord {
    pub fn new(name: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            name: name.into(),
            required: false,
            example: None,
            has_default: false,
            rest: false,
            members: Vec::new(),
            line,
            column,
        }
    }

    pub fn is_destructured(&self) -> bool {
        self.name.starts_with('{')
    }
}

/// The `-> example` after a parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnRecord {
    /// Type expression text, single `|`/`&` already doubled.
    pub example: String,
    pub mode: ReturnMode,
}

/// A function, method or constructor head seen by the parameter pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclRecord {
    /// Emitted name; empty for anonymous function expressions.
    pub name: String,
    pub role: DeclRole,
    /// Enclosing class for methods and constructors.
    pub owner: Option<String>,
    pub params: Vec<ParamRecord>,
    pub returns: Option<ReturnRecord>,
    pub is_async: bool,
    pub is_unsafe: bool,
    pub top_level: bool,
    pub description: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl DeclRecord {
    pub fn param(&self, name: &str) -> Option<&ParamRecord> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Names written with the required marker, in order.
    pub fn required_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Number of leading parameters a call must supply.
    pub fn required_count(&self) -> usize {
        self.params.iter().take_while(|p| p.required).count()
    }
}

/// A `wasm { ... }` block lifted out for the alternate compute path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineBlock {
    pub id: String,
    /// Block text, braces excluded.
    pub body: String,
    pub line: u32,
    /// Free identifiers the block reads from its surroundings.
    pub captures: Vec<String>,
}

// ══════════════════════════════════════════════════════════════════════════════
// CompileContext
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct CompileContext {
    pub filename: String,
    pub warnings: Vec<Diagnostic>,
    /// Every annotated head, in source order.
    pub declarations: Vec<DeclRecord>,
    /// Declarations written with the `!` marker.
    pub unsafe_functions: BTreeSet<String>,
    /// Target → methods added by `extend` blocks.
    pub extensions: IndexMap<String, Vec<String>>,
    pub inline_blocks: Vec<InlineBlock>,
    pub tests: Vec<TestCase>,
    /// Names declared with `Type`, `Union`, `Enum` or `Generic`.
    pub type_names: BTreeSet<String>,
    /// Dispatcher → variant names, filled by the polymorphic merge.
    pub overloads: IndexMap<String, Vec<String>>,
    /// Classes whose constructors were merged.
    pub overloaded_classes: BTreeSet<String>,
    /// Signatures built from static annotations; they replace the
    /// example-derived ones for the same names.
    pub signature_overrides: IndexMap<String, FunctionSignature>,
}

impl CompileContext {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            warnings: Vec::new(),
            declarations: Vec::new(),
            unsafe_functions: BTreeSet::new(),
            extensions: IndexMap::new(),
            inline_blocks: Vec::new(),
            tests: Vec::new(),
            type_names: BTreeSet::new(),
            overloads: IndexMap::new(),
            overloaded_classes: BTreeSet::new(),
            signature_overrides: IndexMap::new(),
        }
    }

    /// A [`SourceFile`] over pass-local text, for positioning diagnostics.
    pub fn source_file(&self, text: &str) -> SourceFile {
        SourceFile::new(self.filename.clone(), text)
    }

    pub fn warn(&mut self, diag: Diagnostic) {
        self.warnings.push(diag);
    }

    pub fn record(&mut self, decl: DeclRecord) {
        if decl.is_unsafe && !decl.name.is_empty() {
            self.unsafe_functions.insert(decl.name.clone());
        }
        self.declarations.push(decl);
    }

    /// The top-level function record emitted under `name`.
    pub fn function(&self, name: &str) -> Option<&DeclRecord> {
        self.declarations
            .iter()
            .find(|d| d.role == DeclRole::Function && d.top_level && d.name == name)
    }

    /// The record whose head sits on `line`, for anonymous declarations.
    pub fn function_at_line(&self, line: u32) -> Option<&DeclRecord> {
        self.declarations
            .iter()
            .find(|d| d.role == DeclRole::Function && d.line == line)
    }

    /// Top-level function records, in source order.
    pub fn top_level_functions(&self) -> impl Iterator<Item = &DeclRecord> {
        self.declarations
            .iter()
            .filter(|d| d.role == DeclRole::Function && d.top_level && !d.name.is_empty())
    }

    /// Rename the `k`-th top-level record of `name` (1-based) to `to`.
    pub fn rename_function(&mut self, name: &str, k: usize, to: &str) {
        let record = self
            .declarations
            .iter_mut()
            .filter(|d| d.role == DeclRole::Function && d.top_level && d.name == name)
            .nth(k - 1);
        if let Some(record) = record {
            record.name = to.to_string();
            if record.is_unsafe {
                self.unsafe_functions.insert(to.to_string());
            }
        }
        let still_unsafe = self.declarations.iter().any(|d| d.is_unsafe && d.name == name);
        if !still_unsafe {
            self.unsafe_functions.remove(name);
        }
    }

    /// Turn the `k`-th constructor of `class` (1-based) into a free function.
    pub fn detach_constructor(&mut self, class: &str, k: usize, to: &str) {
        let record = self
            .declarations
            .iter_mut()
            .filter(|d| d.role == DeclRole::Constructor && d.owner.as_deref() == Some(class))
            .nth(k - 1);
        if let Some(record) = record {
            record.name = to.to_string();
        }
    }

    /// Register `method` on `target`; a second registration is an error.
    pub fn register_extension(
        &mut self,
        target: &str,
        method: &str,
        line: u32,
        column: u32,
    ) -> Result<(), Diagnostic> {
        let methods = self.extensions.entry(target.to_string()).or_default();
        if methods.iter().any(|m| m == method) {
            return Err(Diagnostic::new(
                ErrorCode::DUPLICATE_EXTENSION,
                format!("'{method}' is already an extension of {target}"),
                line,
                column,
            )
            .with_filename(self.filename.clone()));
        }
        methods.push(method.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> DeclRecord {
        DeclRecord {
            name: name.into(),
            role: DeclRole::Function,
            owner: None,
            params: Vec::new(),
            returns: None,
            is_async: false,
            is_unsafe: false,
            top_level: true,
            description: None,
            line: 1,
            column: 1,
        }
    }

    #[test]
    fn test_rename_targets_nth_record() {
        let mut ctx = CompileContext::new("t.ex");
        ctx.record(record("greet"));
        ctx.record(record("greet"));
        ctx.rename_function("greet", 2, "greet$2");
        let names: Vec<&str> = ctx.declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["greet", "greet$2"]);
    }

    #[test]
    fn test_duplicate_extension_rejected() {
        let mut ctx = CompileContext::new("t.ex");
        ctx.register_extension("String", "shout", 1, 1).unwrap();
        let err = ctx.register_extension("String", "shout", 4, 3).unwrap_err();
        assert_eq!(err.code, ErrorCode::DUPLICATE_EXTENSION);
        assert_eq!(err.line, 4);
        assert!(ctx.register_extension("Array", "shout", 5, 1).is_ok());
    }

    #[test]
    fn test_unsafe_set_follows_rename() {
        let mut ctx = CompileContext::new("t.ex");
        let mut r = record("f");
        r.is_unsafe = true;
        ctx.record(r);
        ctx.rename_function("f", 1, "f$1");
        assert!(ctx.unsafe_functions.contains("f$1"));
        assert!(!ctx.unsafe_functions.contains("f"));
    }
}
