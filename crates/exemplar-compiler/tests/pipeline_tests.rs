//! End-to-end pipeline tests.
//!
//! Tests verify the full pipeline: source → rewrite passes → parse → lints →
//! signatures → host emitter → test execution, plus the agent and annotated
//! entry points and the serialized result shape.

use exemplar_compiler::{compile_agent, compile_annotated, compile_host, compile_to_result, CompileOptions, CompileResult};
use exemplar_eval::{ModuleInstance, Value};
use exemplar_types::{ErrorCode, TypeKind};
use serde_json::json;
use std::collections::BTreeSet;

// ══════════════════════════════════════════════════════════════════════════════
// Sources
// ══════════════════════════════════════════════════════════════════════════════

const ADD: &str = r#"
/** Sum of two numbers. */
export function add(a: 0, b: 0) -> 0 {
  return a + b
}

test 'adds small numbers' {
  assert(add(2, 3) == 5)
}
"#;

const GREET: &str = r#"
function greet(name: '') -> '' {
  return 'hi ' + name
}

function greet(n: +0, name: '') -> '' {
  return name.repeat(n)
}
"#;

const FILTER: &str = r#"
export default function run(items: [0]) {
  return items.filter(x => x > 5)
}
"#;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn options() -> CompileOptions {
    CompileOptions::with_filename("test.ex")
}

fn host(source: &str) -> exemplar_compiler::CompileOutput {
    compile_host(source, &options()).unwrap_or_else(|d| panic!("{}", d.render()))
}

fn host_err(source: &str) -> exemplar_types::Diagnostic {
    match compile_host(source, &options()) {
        Ok(out) => panic!("expected a diagnostic, got:\n{}", out.code),
        Err(d) => d,
    }
}

fn load(code: &str) -> ModuleInstance {
    ModuleInstance::load(code).unwrap_or_else(|e| panic!("emitted module failed to load: {e}\n{code}"))
}

// ══════════════════════════════════════════════════════════════════════════════
// Host path
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_add_compiles_with_metadata() {
    let out = host(ADD);
    let add = &out.metadata["add"];
    assert_eq!(add.description.as_deref(), Some("Sum of two numbers."));
    assert_eq!(add.params["a"].ty.kind, TypeKind::Number);
    assert!(add.params["a"].required);
    assert!(add.params["b"].required);
    assert_eq!(add.returns.as_ref().unwrap().kind, TypeKind::Number);
    assert!(out.code.contains("add.__meta = {"));
}

#[test]
fn test_add_runs_and_tests_pass() {
    let out = host(ADD);
    let mut m = load(&out.code);
    assert_eq!(m.eval_source("add(2, 3)").unwrap(), Value::Number(5.0));

    let tests = out.tests.expect("tests run by default");
    assert_eq!(tests.results.len(), 2, "{tests}");
    assert!(tests.all_passed(), "{tests}");
    assert_eq!(tests.results[0].description, "adds small numbers");
    assert_eq!(tests.results[1].description, "add(0, 0) matches 0");
}

#[test]
fn test_failing_inline_test_is_reported() {
    let src = "function add(a: 0, b: 0) { return a + b }\n\ntest 'wrong' {\n  assert(add(1, 2) == 4)\n}\n";
    let tests = host(src).tests.unwrap();
    assert_eq!(tests.failed, 1);
    assert!(!tests.results[0].passed);
    assert_eq!(tests.results[0].line, 3);
}

#[test]
fn test_tests_can_be_disabled() {
    let opts = CompileOptions {
        run_tests: false,
        ..options()
    };
    let out = compile_host(ADD, &opts).unwrap();
    assert!(out.tests.is_none());
}

#[test]
fn test_line_structure_preserved() {
    let out = host(ADD);
    let module_lines = out.code.lines().take(ADD.lines().count()).count();
    assert_eq!(module_lines, ADD.lines().count());
    assert!(out.code.lines().nth(3).unwrap().contains("return a + b"));
}

#[test]
fn test_nullable_parameter_metadata() {
    let out = host("function maybe(s: '' | null) -> '' {\n  return s || ''\n}\n");
    let s = &out.metadata["maybe"].params["s"].ty;
    assert_eq!(s.kind, TypeKind::String);
    assert!(s.nullable);
}

#[test]
fn test_overloads_dispatch() {
    let out = host(GREET);
    assert_eq!(out.overloads["greet"], vec!["greet$1", "greet$2"]);
    assert!(out.metadata.contains_key("greet$1"));
    assert!(out.metadata.contains_key("greet$2"));

    let mut m = load(&out.code);
    assert_eq!(m.eval_source("greet('bob')").unwrap(), Value::string("hi bob"));
    assert_eq!(m.eval_source("greet(2, 'ab')").unwrap(), Value::string("abab"));
    assert!(m.eval_source("greet(true)").is_err());
}

#[test]
fn test_defaulted_overloads_dispatch_by_arity() {
    let src = "function greet(name = '') { return 'one:' + name }\nfunction greet(first = '', last = '') { return 'two:' + first + last }\n";
    let out = host(src);
    let mut m = load(&out.code);
    assert_eq!(m.eval_source("greet('a')").unwrap(), Value::string("one:a"));
    assert_eq!(m.eval_source("greet('a', 'b')").unwrap(), Value::string("two:ab"));
}

#[test]
fn test_double_pipe_nullable_example() {
    let out = host("function maybe(s: '' || null) { return s }\n");
    let s = &out.metadata["maybe"].params["s"];
    assert!(s.required);
    assert_eq!(s.ty.kind, TypeKind::String);
    assert!(s.ty.nullable);
}

#[test]
fn test_union_and_nullable_returns_pass_signature_tests() {
    let src = "function pick(x: 0) -> 0 | '' {\n  return x\n}\n\nfunction none(a: 0) -> 'ü' | null {\n  return null\n}\n";
    let out = host(src);
    assert_eq!(out.metadata["pick"].returns.as_ref().unwrap().kind, TypeKind::Union);
    let none = out.metadata["none"].returns.as_ref().unwrap();
    assert_eq!(none.kind, TypeKind::String);
    assert!(none.nullable);

    let tests = out.tests.unwrap();
    assert_eq!(tests.results.len(), 2, "{tests}");
    assert!(tests.all_passed(), "{tests}");
}

#[test]
fn test_union_return_outside_alternatives_fails() {
    let src = "function pick(x: 0) -> 0 | '' {\n  return x > 0\n}\n";
    let tests = host(src).tests.unwrap();
    assert_eq!(tests.failed, 1, "{tests}");
}

#[test]
fn test_float_and_integer_overloads_dispatch() {
    let src = "function h(a: 1.5) -> '' {\n  return 'float'\n}\n\nfunction h(a: 1) -> '' {\n  return 'int'\n}\n";
    let out = host(src);
    assert_eq!(out.overloads["h"], vec!["h$1", "h$2"]);
    assert!(out.tests.unwrap().all_passed());

    let mut m = load(&out.code);
    assert_eq!(m.eval_source("h(2)").unwrap(), Value::string("int"));
    assert_eq!(m.eval_source("h(-3)").unwrap(), Value::string("int"));
    assert_eq!(m.eval_source("h(2.5)").unwrap(), Value::string("float"));
    assert!(m.eval_source("h('2')").is_err());
}

#[test]
fn test_unicode_identifiers_in_heads() {
    let src = "Type Näme = 'x'\n\nfunction grüß(é: 'ü') -> 'ß' {\n  return é + Näme.name\n}\n";
    let out = host(src);
    let f = &out.metadata["grüß"];
    assert_eq!(f.params["é"].ty.kind, TypeKind::String);
    assert!(f.params["é"].required);
    assert_eq!(f.returns.as_ref().unwrap().kind, TypeKind::String);
    assert!(out.tests.unwrap().all_passed());

    let mut m = load(&out.code);
    assert_eq!(m.eval_source("grüß('a')").unwrap(), Value::string("aNäme"));
}

#[test]
fn test_strict_guards_reject_missing_argument() {
    let opts = CompileOptions {
        strict: true,
        ..options()
    };
    let out = compile_host("function twice(n: 0) -> 0 { return n * 2 }\n", &opts).unwrap();
    let mut m = load(&out.code);
    assert_eq!(m.eval_source("twice(4)").unwrap(), Value::Number(8.0));
    assert_eq!(m.eval_source("twice().$error").unwrap(), Value::Bool(true));
}

#[test]
fn test_warnings_collected() {
    let out = host("function f(a) {\n  const unused = 1\n  return a\n}\n");
    let codes: Vec<ErrorCode> = out.warnings.iter().map(|w| w.code).collect();
    assert!(codes.contains(&ErrorCode::IMPLICIT_ANY));
    assert!(codes.contains(&ErrorCode::UNUSED_LOCAL));
    assert!(out.warnings.iter().all(|w| w.is_warning()));
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_required_after_optional() {
    let err = host_err("function f(a = 1, b: 2) {}\n");
    assert_eq!(err.code, ErrorCode::REQUIRED_AFTER_OPTIONAL);
    assert_eq!(err.filename.as_deref(), Some("test.ex"));
}

#[test]
fn test_duplicate_parameter() {
    let err = host_err("function f(a: 1,\n  a: 2) {}\n");
    assert_eq!(err.code, ErrorCode::DUPLICATE_PARAMETER);
    assert_eq!(err.line, 2);
}

#[test]
fn test_ambiguous_overload() {
    let err = host_err("function f(a: 1) {}\nfunction f(b: 2) {}\n");
    assert_eq!(err.code, ErrorCode::AMBIGUOUS_OVERLOAD);
    assert_eq!(err.line, 2);
}

#[test]
fn test_invalid_example() {
    let err = host_err("function f(a: load()) { return a }\n");
    assert_eq!(err.code, ErrorCode::INVALID_EXAMPLE);
    assert!(err.suggestion.is_some());
}

// ══════════════════════════════════════════════════════════════════════════════
// Agent path
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_agent_filter_lowering() {
    let out = compile_agent(FILTER, &options()).unwrap_or_else(|d| panic!("{}", d.render()));
    assert_eq!(out.tree["op"], "seq");
    let step = &out.tree["steps"][0];
    assert_eq!(step["op"], "filter");
    assert_eq!(step["as"], "x");
    assert_eq!(step["condition"]["$expr"], "binary");
    assert_eq!(step["condition"]["op"], ">");
    assert_eq!(out.signature.name, "run");
    assert_eq!(out.signature.params["items"].ty.kind, TypeKind::Array);
}

#[test]
fn test_agent_unknown_atom() {
    let mut atoms = BTreeSet::new();
    atoms.insert("search".to_string());
    let opts = CompileOptions {
        atoms: Some(atoms),
        ..options()
    };
    let src = "export function run(q: '') {\n  const r = lookup(q)\n  return r\n}\n";
    let err = compile_agent(src, &opts).unwrap_err();
    assert_eq!(err.code, ErrorCode::UNKNOWN_ATOM);
    assert_eq!(err.line, 2);
}

#[test]
fn test_agent_without_function() {
    let err = compile_agent("const x = 1\n", &options()).unwrap_err();
    assert_eq!(err.code, ErrorCode::NO_ENTRY_FUNCTION);
}

// ══════════════════════════════════════════════════════════════════════════════
// Annotated dialect
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_annotated_compile() {
    let src = "interface Point { x: number; y: number }\n\nexport function norm(p: Point, scale?: number): number {\n  return p.x * p.x + p.y * p.y\n}\n";
    let out = compile_annotated(src, &options()).unwrap_or_else(|d| panic!("{}", d.render()));
    let norm = &out.metadata["norm"];
    let p = &norm.params["p"];
    assert!(p.required);
    assert_eq!(p.ty.kind, TypeKind::Object);
    assert_eq!(p.ty.shape.as_ref().unwrap().len(), 2);
    assert!(!norm.params["scale"].required);
    assert_eq!(norm.returns.as_ref().unwrap().kind, TypeKind::Number);
    assert!(!out.code.contains("interface"));
    assert_eq!(out.code.lines().nth(2).map(|l| l.contains("function norm(")), Some(true));
}

#[test]
fn test_annotated_generic_params_recorded() {
    let src = "function first<T>(items: T[]): T {\n  return items[0]\n}\n";
    let out = compile_annotated(src, &options()).unwrap_or_else(|d| panic!("{}", d.render()));
    assert_eq!(out.metadata["first"].type_params, vec!["T"]);
    let mut m = load(&out.code);
    assert_eq!(m.eval_source("first([7, 8])").unwrap(), Value::Number(7.0));
}

// ══════════════════════════════════════════════════════════════════════════════
// Serialization & determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_compile_result_roundtrip() {
    let result = compile_to_result(ADD, &options());
    assert!(result.success);
    let json = serde_json::to_string(&result).unwrap();
    let back: CompileResult = serde_json::from_str(&json).unwrap();
    assert!(back.success);
    // Source spans are not part of the serialized form.
    assert_eq!(serde_json::to_string(&back).unwrap(), json);

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["output"]["metadata"]["add"]["params"]["a"]["required"], json!(true));
}

#[test]
fn test_failed_result_has_no_output() {
    let result = compile_to_result("function f(a = 1, b: 2) {}\n", &options());
    assert!(!result.success);
    assert!(result.output.is_none());
    assert_eq!(result.errors.total_errors, 1);
}

#[test]
fn test_options_deserialize_camel_case() {
    let opts: CompileOptions = serde_json::from_str(r#"{"filename":"a.ex","sourceMaps":true,"runTests":false}"#).unwrap();
    assert!(opts.source_maps);
    assert!(!opts.run_tests);
    assert!(opts.structural_equality);
}

#[test]
fn test_determinism() {
    for src in [ADD, GREET, FILTER] {
        let a = compile_host(src, &options()).unwrap();
        let b = compile_host(src, &options()).unwrap();
        assert_eq!(a.code, b.code);
        assert_eq!(
            serde_json::to_string(&a.metadata).unwrap(),
            serde_json::to_string(&b.metadata).unwrap()
        );
    }
}
