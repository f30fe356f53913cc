//! Integration tests for the exemplar code generators.
//!
//! Tests validate:
//! - Host output keeps the module's line structure
//! - Strict guards reject missing and mistyped arguments at runtime
//! - `-?` return checks wrap returned values
//! - `__meta` / `__overloads` records are attached and readable
//! - Only referenced prelude helpers are appended
//! - Agent trees for a realistic entry function
//! - Rejections convert to positioned diagnostics with suggestions

use exemplar_codegen::{emit_agent, emit_host, CodegenError, HostInput, HostOptions, HostOutput};
use exemplar_eval::{ModuleInstance, Value};
use exemplar_types::ast::Program;
use exemplar_types::{
    ErrorCode, FunctionSignature, ParameterDescriptor, ReturnMode, SourceFile, TypeDescriptor,
};
use indexmap::IndexMap;
use std::collections::BTreeSet;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Parse source into a Program AST (panics on parse errors).
fn parse(source: &str) -> Program {
    let sf = SourceFile::new("test.ex", source);
    let result = exemplar_parser::parse(&sf);
    if result.errors.has_errors() {
        panic!(
            "parse errors:\n{}",
            result
                .errors
                .errors
                .iter()
                .map(|e| format!("  [{}] {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }
    result.program.expect("no program after successful parse")
}

fn param(name: &str, ty: TypeDescriptor, example: &str, required: bool) -> ParameterDescriptor {
    let mut p = ParameterDescriptor::new(name, ty, required);
    p.example = Some(example.into());
    p
}

/// `add(a, b = 0)` over numbers.
fn add_signature() -> FunctionSignature {
    let mut sig = FunctionSignature::new("add");
    sig.params.insert("a".into(), param("a", TypeDescriptor::number(), "0", true));
    sig.params.insert("b".into(), param("b", TypeDescriptor::number(), "0", false));
    sig.returns = Some(TypeDescriptor::number());
    sig
}

fn host(source: &str, signatures: &IndexMap<String, FunctionSignature>, strict: bool) -> HostOutput {
    let program = parse(source);
    let input = HostInput {
        source,
        program: &program,
        signatures,
        overloads: &IndexMap::new(),
        classes: &[],
        unsafe_functions: &BTreeSet::new(),
    };
    let options = HostOptions {
        strict,
        source_maps: true,
        filename: "test.ex".into(),
    };
    emit_host(&input, &options).unwrap_or_else(|e| panic!("host codegen failed: {e}"))
}

fn load(code: &str) -> ModuleInstance {
    ModuleInstance::load(code).unwrap_or_else(|e| panic!("emitted module failed to load: {e}\n{code}"))
}

// ══════════════════════════════════════════════════════════════════════════════
// Host source
// ══════════════════════════════════════════════════════════════════════════════

const ADD: &str = "function add(a, b = 0) {\n  return a + b;\n}\n";

#[test]
fn module_lines_are_preserved() {
    let mut sigs = IndexMap::new();
    sigs.insert("add".to_string(), add_signature());
    let out = host(ADD, &sigs, true);
    assert_eq!(out.module_source.lines().count(), ADD.lines().count());
    assert!(out.code.starts_with(out.module_source.trim_end()));
    assert!(out.code.contains("add.__meta = {"));
    assert!(out.code.trim_end().ends_with("//# sourceURL=test.ex"));
}

#[test]
fn strict_guards_run() {
    let mut sigs = IndexMap::new();
    sigs.insert("add".to_string(), add_signature());
    let out = host(ADD, &sigs, true);
    let mut m = load(&out.code);

    assert_eq!(m.eval_source("add(1, 2)").unwrap(), Value::Number(3.0));
    assert_eq!(m.eval_source("add(1)").unwrap(), Value::Number(1.0));
    assert_eq!(m.eval_source("add().$error").unwrap(), Value::Bool(true));
    assert_eq!(m.eval_source("add().param").unwrap(), Value::string("a"));
    assert_eq!(m.eval_source("add('x', 1).$error").unwrap(), Value::Bool(true));
}

#[test]
fn lax_mode_has_no_guards() {
    let mut sigs = IndexMap::new();
    sigs.insert("add".to_string(), add_signature());
    let out = host(ADD, &sigs, false);
    assert!(!out.module_source.contains("__checkType"));
    let mut m = load(&out.code);
    assert_eq!(m.eval_source("add('x', 1)").unwrap(), Value::string("x1"));
}

#[test]
fn meta_is_readable_at_runtime() {
    let mut sigs = IndexMap::new();
    sigs.insert("add".to_string(), add_signature());
    let out = host(ADD, &sigs, false);
    let mut m = load(&out.code);
    assert_eq!(
        m.eval_source("add.__meta.params.a.type.kind").unwrap(),
        Value::string("number")
    );
    assert_eq!(m.eval_source("add.__meta.params.b.required").unwrap(), Value::Bool(false));
}

#[test]
fn checked_returns_are_wrapped() {
    let src = "function label(n) {\n  if (n > 0) return 'pos';\n  return n;\n}\n";
    let mut sig = FunctionSignature::new("label");
    sig.params.insert("n".into(), param("n", TypeDescriptor::number(), "0", true));
    sig.returns = Some(TypeDescriptor::string());
    sig.return_mode = ReturnMode::TestAgainstExample;
    let mut sigs = IndexMap::new();
    sigs.insert("label".to_string(), sig);

    let out = host(src, &sigs, true);
    assert_eq!(out.module_source.matches("__checkReturn(").count(), 2);
    assert!(out.helpers.contains(&"__checkReturn"));

    let mut m = load(&out.code);
    assert_eq!(m.eval_source("label(1)").unwrap(), Value::string("pos"));
    assert_eq!(m.eval_source("label(-1).$error").unwrap(), Value::Bool(true));
}

#[test]
fn unreferenced_helpers_are_not_appended() {
    let out = host("const x = 1;\n", &IndexMap::new(), true);
    assert!(out.helpers.is_empty());
    let out = host("const same = Is(0.1 + 0.2, 0.3);\n", &IndexMap::new(), true);
    assert_eq!(out.helpers, vec!["__deepEqual", "Is"]);
    let mut m = load(&out.code);
    assert_eq!(m.eval_source("same").unwrap(), Value::Bool(true));
}

#[test]
fn source_map_records_declarations() {
    let out = host("const x = 1;\n\nfunction f() {}\n", &IndexMap::new(), false);
    let map = out.source_map.expect("source map requested");
    assert_eq!(map.find("f").map(|e| e.line), Some(3));
}

// ══════════════════════════════════════════════════════════════════════════════
// Agent trees
// ══════════════════════════════════════════════════════════════════════════════

const SUMMARIZE: &str = r#"
export async function summarize(orders) {
  const paid = orders.filter(o => o.status == 'paid');
  const total = paid.reduce((sum, o) => sum + o.amount, 0);
  if (total > 1000) {
    await notify({ channel: 'sales', text: `big day: ${total}` });
  }
  return { count: paid.length, total };
}
"#;

fn summarize_signature() -> FunctionSignature {
    let mut sig = FunctionSignature::new("summarize");
    let orders = TypeDescriptor::array(TypeDescriptor::any());
    sig.params.insert("orders".into(), param("orders", orders, "[]", true));
    sig
}

#[test]
fn agent_tree_for_entry_function() {
    let program = parse(SUMMARIZE);
    let (func, _) = program.functions().next().expect("entry function");
    let atoms: BTreeSet<String> = ["notify".to_string()].into_iter().collect();
    let tree = emit_agent(func, &summarize_signature(), Some(&atoms)).expect("lowering failed");

    let steps = tree["steps"].as_array().expect("steps");
    let ops: Vec<&str> = steps.iter().filter_map(|s| s["op"].as_str()).collect();
    assert_eq!(ops, vec!["filter", "reduce", "if", "return"]);
    assert_eq!(steps[0]["condition"]["op"], "==");
    assert_eq!(steps[1]["accumulator"], "sum");
    assert_eq!(steps[1]["initial"]["value"], 0);
    assert_eq!(steps[2]["then"][0]["op"], "notify");
    assert_eq!(steps[2]["then"][0]["text"]["$expr"], "template");
    assert_eq!(tree["inputSchema"]["required"][0], "orders");
}

#[test]
fn agent_rejection_becomes_diagnostic() {
    let src = "function main() {\n  return new Map();\n}\n";
    let program = parse(src);
    let (func, _) = program.functions().next().expect("function");
    let err = emit_agent(func, &FunctionSignature::new("main"), None).unwrap_err();
    assert!(matches!(err, CodegenError::Rejected { code: ErrorCode::CONSTRUCTION_NOT_ALLOWED, .. }));

    let diag = err.to_diagnostic(&SourceFile::new("main.ex", src));
    assert_eq!(diag.line, 2);
    assert!(diag.suggestion.as_deref().unwrap_or("").contains("plain object"));
}
