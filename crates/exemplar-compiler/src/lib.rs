//! Exemplar compiler: orchestrates the full compilation pipeline.
//!
//! ```text
//! Surface source → Rewrite passes → Parser → Lints → Signatures
//!                → Host emitter (+ tests)  |  Agent emitter
//! ```
//!
//! The compiler holds no state between calls: every entry point is a pure
//! function of the source text and [`CompileOptions`]. Per-call side tables
//! live in a [`CompileContext`] threaded through the passes.

pub mod annotation;
pub mod context;
pub mod env;
pub mod infer;
pub mod lint;
pub mod passes;
pub mod signature;

pub use context::{CompileContext, DeclRecord, DeclRole, InlineBlock, ParamRecord};

use annotation::AnnotationResolver;
use exemplar_codegen::{emit_agent, emit_host, ClassMeta, HostInput, HostOptions, SourceMap};
use exemplar_eval::{run_tests, TestCase, TestRunSummary};
use exemplar_lexer::balance::{blank_out, preserve_lines};
use exemplar_lexer::Splicer;
use exemplar_types::annotation::AnnotatedFunction;
use exemplar_types::ast::{ExportDecl, ExprKind, Function, Program, StmtKind};
use exemplar_types::{
    Diagnostic, Diagnostics, ErrorCode, FunctionSignature, ParameterDescriptor, ReturnMode, SourceFile,
    TypeDescriptor,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ══════════════════════════════════════════════════════════════════════════════
// Options & Outputs
// ══════════════════════════════════════════════════════════════════════════════

/// Options for one compile call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    /// Name used in diagnostics and the `sourceURL` comment.
    pub filename: String,
    /// Atom names agent-subset calls are validated against.
    pub atoms: Option<BTreeSet<String>>,
    pub strict: bool,
    pub source_maps: bool,
    /// Run inline tests and signature tests after emitting.
    pub run_tests: bool,
    /// Rewrite `==`/`!=` to structural equality helpers.
    pub structural_equality: bool,
    /// Evaluation step budget for test execution.
    pub gas_limit: u64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            filename: "<input>".into(),
            atoms: None,
            strict: false,
            source_maps: false,
            run_tests: true,
            structural_equality: true,
            gas_limit: exemplar_eval::DEFAULT_GAS_LIMIT,
        }
    }
}

impl CompileOptions {
    pub fn with_filename(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }
}

/// Host-source compilation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOutput {
    /// Module, metadata assignments and runtime prelude.
    pub code: String,
    /// Signature per top-level declaration, keyed by emitted name.
    pub metadata: IndexMap<String, FunctionSignature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<ClassMeta>,
    /// Dispatcher name → variant names.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub overloads: IndexMap<String, Vec<String>>,
    /// Runtime helpers appended to `code`.
    #[serde(default)]
    pub helpers: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline_blocks: Vec<InlineBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestRunSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map: Option<SourceMap>,
}

/// Agent-subset compilation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutput {
    /// `{ op: 'seq', steps, inputSchema }`
    pub tree: serde_json::Value,
    pub signature: FunctionSignature,
    #[serde(default)]
    pub warnings: Vec<Diagnostic>,
}

/// Result of compilation, suitable for serialization across a binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    pub output: Option<CompileOutput>,
    pub errors: Diagnostics,
}

// ══════════════════════════════════════════════════════════════════════════════
// Entry Points
// ══════════════════════════════════════════════════════════════════════════════

/// Compile surface source to host source with metadata.
pub fn compile_host(source: &str, options: &CompileOptions) -> Result<CompileOutput, Diagnostic> {
    let _span = tracing::debug_span!("compile_host", filename = %options.filename).entered();
    let mut ctx = CompileContext::new(options.filename.clone());
    compile_host_in(source, options, &mut ctx)
}

/// Compile the entry function of `source` to an agent instruction tree.
///
/// The entry is the `export default` function, else the first exported
/// function, else the first top-level function.
pub fn compile_agent(source: &str, options: &CompileOptions) -> Result<AgentOutput, Diagnostic> {
    let _span = tracing::debug_span!("compile_agent", filename = %options.filename).entered();
    let mut ctx = CompileContext::new(options.filename.clone());
    let text = rewrite(source, options, &mut ctx, Backend::Agent)?;
    let file = ctx.source_file(&text);
    let program = passes::parse_program(&file)?;
    ctx.warnings.extend(lint::lint(&program, &file));

    let entry = entry_function(&program).ok_or_else(|| {
        Diagnostic::new(ErrorCode::NO_ENTRY_FUNCTION, "no function to compile as the agent entry", 1, 1)
            .with_filename(options.filename.clone())
            .with_suggestion("declare 'export default function run(...) { ... }'")
    })?;
    let (line, _) = file.position(entry.span.start);
    let record = match entry.name() {
        Some(name) => ctx.function(name),
        None => ctx.function_at_line(line),
    };
    let signature = match record {
        Some(record) => signature::build_signature(record, &ctx)?,
        None => FunctionSignature::new(entry.name().unwrap_or("default")),
    };
    let tree = emit_agent(entry, &signature, options.atoms.as_ref()).map_err(|e| e.to_diagnostic(&file))?;
    tracing::debug!(entry = %signature.name, "lowered agent entry");
    Ok(AgentOutput {
        tree,
        signature,
        warnings: ctx.warnings,
    })
}

/// Compile a module written in the statically-annotated dialect.
///
/// Annotations are resolved to descriptors, rendered back to examples and
/// the resulting native source goes through [`compile_host`]. Metadata
/// comes from the annotations, generic parameters included.
pub fn compile_annotated(source: &str, options: &CompileOptions) -> Result<CompileOutput, Diagnostic> {
    let _span = tracing::debug_span!("compile_annotated", filename = %options.filename).entered();
    let file = SourceFile::new(options.filename.clone(), source);
    let (module, errors) = exemplar_parser::parse_annotated(&file);
    if let Some(first) = errors.first_error() {
        return Err(first.clone());
    }

    let mut resolver = AnnotationResolver::new(&module);
    let mut splicer = Splicer::new();
    let mut overrides = IndexMap::new();
    for decl in module.interfaces.iter().map(|i| i.span).chain(module.aliases.iter().map(|a| a.span)) {
        splicer.replace(decl.start, decl.end, blank_out(&source[decl.start..decl.end]));
    }
    for span in &module.erasures {
        splicer.replace(span.start, span.end, blank_out(&source[span.start..span.end]));
    }
    for function in &module.functions {
        let sig = annotated_signature(function, &mut resolver, source);
        native_head(function, &sig, source, &mut splicer);
        overrides.insert(sig.name.clone(), sig);
    }
    let native = splicer.apply(source);
    tracing::debug!(functions = overrides.len(), "lowered annotations to examples");

    let mut ctx = CompileContext::new(options.filename.clone());
    ctx.signature_overrides = overrides;
    compile_host_in(&native, options, &mut ctx)
}

/// Compile and wrap the outcome for serialization.
pub fn compile_to_result(source: &str, options: &CompileOptions) -> CompileResult {
    let mut errors = Diagnostics::empty();
    match compile_host(source, options) {
        Ok(output) => {
            for warning in &output.warnings {
                errors.push(warning.clone());
            }
            CompileResult {
                success: true,
                output: Some(output),
                errors,
            }
        }
        Err(diag) => {
            errors.push(diag);
            CompileResult {
                success: false,
                output: None,
                errors,
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Pipeline
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Host,
    Agent,
}

type Pass = fn(&str, &mut CompileContext) -> Result<String, Diagnostic>;

/// Run the rewrite passes in order.
fn rewrite(
    source: &str,
    options: &CompileOptions,
    ctx: &mut CompileContext,
    backend: Backend,
) -> Result<String, Diagnostic> {
    let mut pipeline: Vec<(&str, Pass)> = vec![
        ("tests", passes::tests::run),
        ("declarations", passes::declarations::run),
        ("params", passes::params::run),
        ("safety", passes::safety::run),
    ];
    // The agent tree keeps `==` as an operator node.
    if options.structural_equality && backend == Backend::Host {
        pipeline.push(("operators", passes::operators::run));
    }
    pipeline.push(("terminators", passes::terminators::run));
    if backend == Backend::Host {
        pipeline.push(("polymorphic", passes::polymorphic::run));
    }

    let mut text = source.to_string();
    for (name, pass) in pipeline {
        let before = text.len();
        text = pass(&text, ctx)?;
        tracing::debug!(pass = name, before, after = text.len(), "rewrite pass complete");
    }
    Ok(text)
}

fn compile_host_in(
    source: &str,
    options: &CompileOptions,
    ctx: &mut CompileContext,
) -> Result<CompileOutput, Diagnostic> {
    let text = rewrite(source, options, ctx, Backend::Host)?;
    let file = ctx.source_file(&text);
    let program = passes::parse_program(&file)?;
    let lints = lint::lint(&program, &file);
    ctx.warnings.extend(lints);

    let class_names: Vec<&str> = program
        .classes()
        .map(|c| c.name.name.as_str())
        .map(|name| match name.strip_suffix("$class") {
            Some(base) if ctx.overloaded_classes.contains(base) => base,
            _ => name,
        })
        .collect();
    let (signatures, classes) = signature::build_signatures(ctx, &class_names)?;

    let input = HostInput {
        source: &text,
        program: &program,
        signatures: &signatures,
        overloads: &ctx.overloads,
        classes: &classes,
        unsafe_functions: &ctx.unsafe_functions,
    };
    let host_options = HostOptions {
        strict: options.strict,
        source_maps: options.source_maps,
        filename: options.filename.clone(),
    };
    let host = emit_host(&input, &host_options).map_err(|e| e.to_diagnostic(&file))?;

    let tests = if options.run_tests {
        let inline: Vec<TestCase> = ctx
            .tests
            .iter()
            .map(|t| TestCase {
                body: rewrite_test_body(&t.body, options),
                ..t.clone()
            })
            .collect();
        let signature_tests = signature::signature_tests(ctx);
        let summary = run_tests(&host.module_source, &inline, &signature_tests, options.gas_limit);
        tracing::debug!(passed = summary.passed, failed = summary.failed, "ran tests");
        Some(summary)
    } else {
        None
    };

    Ok(CompileOutput {
        code: host.code,
        metadata: signatures,
        classes,
        overloads: ctx.overloads.clone(),
        helpers: host.helpers.iter().map(|h| h.to_string()).collect(),
        warnings: std::mem::take(&mut ctx.warnings),
        inline_blocks: std::mem::take(&mut ctx.inline_blocks),
        tests,
        source_map: host.source_map,
    })
}

/// Test bodies get the same expression rewrites as the module.
fn rewrite_test_body(body: &str, options: &CompileOptions) -> String {
    let body = if options.structural_equality {
        passes::operators::rewrite(body)
    } else {
        body.to_string()
    };
    passes::terminators::terminate(&body)
}

fn entry_function(program: &Program) -> Option<&Function> {
    let default_export = program.body.iter().find_map(|stmt| match &stmt.kind {
        StmtKind::Export(ExportDecl::Default(expr)) => match &expr.unparen().kind {
            ExprKind::Function(f) => Some(f.as_ref()),
            _ => None,
        },
        _ => None,
    });
    default_export
        .or_else(|| program.functions().find(|(_, exported)| *exported).map(|(f, _)| f))
        .or_else(|| program.functions().next().map(|(f, _)| f))
}

// ══════════════════════════════════════════════════════════════════════════════
// Annotated Dialect
// ══════════════════════════════════════════════════════════════════════════════

fn annotated_signature(
    function: &AnnotatedFunction,
    resolver: &mut AnnotationResolver<'_>,
    source: &str,
) -> FunctionSignature {
    resolver.with_type_params(&function.type_params);
    let mut sig = FunctionSignature::new(function.name.name.clone());
    sig.type_params = function.type_params.clone();
    sig.is_async = function.is_async;
    sig.span = function.span;
    for param in &function.params {
        let ty = param
            .annotation
            .as_ref()
            .map(|a| resolver.resolve(a))
            .unwrap_or_else(TypeDescriptor::any);
        let required = !param.optional && !param.rest && param.default.is_none();
        let mut desc = ParameterDescriptor::new(param.name.clone(), ty, required);
        desc.example = desc.ty.example_source();
        desc.default = param.default.map(|d| source[d.start..d.end].to_string());
        desc.rest = param.rest;
        desc.span = param.span;
        sig.params.insert(param.name.clone(), desc);
    }
    if let Some(returns) = &function.returns {
        let ty = resolver.resolve(returns);
        sig.return_example = ty.example_source();
        sig.returns = Some(ty);
        sig.return_mode = ReturnMode::SkipTest;
    }
    sig
}

/// Replace the annotations of one head with examples.
fn native_head(function: &AnnotatedFunction, sig: &FunctionSignature, source: &str, splicer: &mut Splicer) {
    let mut replace = |start: usize, end: usize, text: String| {
        splicer.replace(start, end, preserve_lines(&source[start..end], &text));
    };
    if let Some(span) = function.type_params_span {
        replace(span.start, span.end, String::new());
    }
    for param in &function.params {
        let Some(desc) = sig.params.get(&param.name) else {
            continue;
        };
        let text = if param.rest || param.default.is_some() {
            param.name.clone()
        } else {
            match (&desc.example, param.optional) {
                (Some(example), false) => format!("{}: {example}", param.name),
                (Some(example), true) => format!("{}?: {example}", param.name),
                (None, true) => format!("{}?", param.name),
                (None, false) => param.name.clone(),
            }
        };
        replace(param.span.start, param.span.end, text);
    }
    if let Some(span) = function.returns_span {
        // `{}` right after a return marker reads as the body.
        let text = match &sig.return_example {
            Some(example) if !example.starts_with("{}") => format!(" -! {example}"),
            _ => String::new(),
        };
        replace(span.start, span.end, text);
    }
}
