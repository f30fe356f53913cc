//! Integration tests for the exemplar tree-walking evaluator.
//!
//! Tests key evaluator features:
//! - module execution & bindings
//! - closures, classes, destructuring, control flow
//! - builtin objects and methods
//! - runtime helpers (Is, Type, Union, Enum, __extend, __overloadClass)
//! - unsafe blocks
//! - gas metering
//! - the test runner (inline tests, signature tests, skip rules)

use exemplar_eval::{
    run_tests, EvalError, ModuleInstance, SignatureTest, TestCase, Value, DEFAULT_GAS_LIMIT,
};
use exemplar_types::TypeDescriptor;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Load a module (panics on failure).
fn module(source: &str) -> ModuleInstance {
    match ModuleInstance::load(source) {
        Ok(m) => m,
        Err(e) => panic!("module failed to load: {e}"),
    }
}

/// Load `source` and evaluate `expr` against it.
fn eval_in(source: &str, expr: &str) -> Value {
    let mut m = module(source);
    match m.eval_source(expr) {
        Ok(v) => v,
        Err(e) => panic!("evaluating `{expr}` failed: {e}"),
    }
}

/// Evaluate a single expression with no module around it.
fn eval(expr: &str) -> Value {
    eval_in("", expr)
}

fn num(n: f64) -> Value {
    Value::Number(n)
}

fn s(v: &str) -> Value {
    Value::string(v)
}

fn b(v: bool) -> Value {
    Value::Bool(v)
}

fn test_case(description: &str, body: &str) -> TestCase {
    TestCase {
        description: description.into(),
        body: body.into(),
        line: 1,
    }
}

fn signature(function: &str, args: &[&str], returns: &str) -> SignatureTest {
    SignatureTest {
        function: function.into(),
        args: args.iter().map(|a| a.to_string()).collect(),
        returns: returns.into(),
        returns_type: None,
        is_async: false,
        line: 1,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(eval("1 + 2 * 3"), num(7.0));
    assert_eq!(eval("(1 + 2) * 3"), num(9.0));
    assert_eq!(eval("2 ** 10"), num(1024.0));
    assert_eq!(eval("7 % 3"), num(1.0));
    assert_eq!(eval("-5 >> 1"), num(-3.0));
}

#[test]
fn string_concatenation_coerces() {
    assert_eq!(eval("'a' + 1"), s("a1"));
    assert_eq!(eval("1 + '1'"), s("11"));
    assert_eq!(eval("`sum: ${1 + 2}`"), s("sum: 3"));
}

#[test]
fn equality_operators() {
    assert_eq!(eval("1 == '1'"), b(true));
    assert_eq!(eval("1 === '1'"), b(false));
    assert_eq!(eval("null == undefined"), b(true));
    assert_eq!(eval("[1] === [1]"), b(false));
}

#[test]
fn logical_and_nullish() {
    assert_eq!(eval("null ?? 'd'"), s("d"));
    assert_eq!(eval("0 ?? 'd'"), num(0.0));
    assert_eq!(eval("0 || 'd'"), s("d"));
    assert_eq!(eval("1 && 2"), num(2.0));
}

#[test]
fn optional_chaining_short_circuits() {
    let src = "const o = { a: { b: 1 } }; const n = null;";
    assert_eq!(eval_in(src, "o.a?.b"), num(1.0));
    assert_eq!(eval_in(src, "n?.a.b.c"), Value::Undefined);
    assert_eq!(eval_in(src, "n?.f()"), Value::Undefined);
}

#[test]
fn typeof_undeclared_is_undefined() {
    assert_eq!(eval("typeof nothingHere"), s("undefined"));
    assert_eq!(eval("typeof null"), s("object"));
    assert_eq!(eval("typeof (() => 1)"), s("function"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements & functions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn function_hoisting_and_closures() {
    let src = r#"
const total = add(2, 3);
function add(a, b) { return a + b; }
function counter() {
  let n = 0;
  return () => ++n;
}
const next = counter();
next();
"#;
    assert_eq!(eval_in(src, "total"), num(5.0));
    assert_eq!(eval_in(src, "next()"), num(2.0));
}

#[test]
fn default_and_rest_parameters() {
    let src = r#"
function greet(name = 'world', ...rest) { return `hi ${name} ${rest.length}`; }
"#;
    assert_eq!(eval_in(src, "greet()"), s("hi world 0"));
    assert_eq!(eval_in(src, "greet('a', 1, 2)"), s("hi a 2"));
}

#[test]
fn destructuring_bindings() {
    let src = r#"
const { a, b: { c = 5 } = {}, ...others } = { a: 1, x: 2, y: 3 };
const [first, , third = 9, ...tail] = [1, 2, undefined, 4, 5];
"#;
    assert_eq!(eval_in(src, "a"), num(1.0));
    assert_eq!(eval_in(src, "c"), num(5.0));
    assert_eq!(eval_in(src, "Object.keys(others).join()"), s("x,y"));
    assert_eq!(eval_in(src, "first + third"), num(10.0));
    assert_eq!(eval_in(src, "tail.length"), num(2.0));
}

#[test]
fn loops_and_labels() {
    let src = r#"
let out = [];
outer: for (let i = 0; i < 3; i++) {
  for (const j of [0, 1, 2]) {
    if (j === 1) continue outer;
    out.push(`${i}${j}`);
  }
}
let k = 0;
while (true) { k++; if (k > 4) break; }
let keys = [];
for (const key in { p: 1, q: 2 }) keys.push(key);
"#;
    assert_eq!(eval_in(src, "out.join(',')"), s("00,10,20"));
    assert_eq!(eval_in(src, "k"), num(5.0));
    assert_eq!(eval_in(src, "keys.join('')"), s("pq"));
}

#[test]
fn switch_falls_through_until_break() {
    let src = r#"
function kind(n) {
  let r = '';
  switch (n) {
    case 1: r += 'one';
    case 2: r += 'two'; break;
    default: r = 'other';
  }
  return r;
}
"#;
    assert_eq!(eval_in(src, "kind(1)"), s("onetwo"));
    assert_eq!(eval_in(src, "kind(2)"), s("two"));
    assert_eq!(eval_in(src, "kind(3)"), s("other"));
}

#[test]
fn try_catch_finally() {
    let src = r#"
let log = [];
function risky() {
  try { throw new RangeError('bad'); }
  catch (e) { log.push(e.name + ':' + e.message); return 'caught'; }
  finally { log.push('finally'); }
}
const r = risky();
"#;
    assert_eq!(eval_in(src, "r"), s("caught"));
    assert_eq!(eval_in(src, "log.join('|')"), s("RangeError:bad|finally"));
}

#[test]
fn runtime_faults_are_catchable() {
    let src = r#"
let msg = '';
try { const o = undefined; o.x; } catch (e) { msg = e.name; }
"#;
    assert_eq!(eval_in(src, "msg"), s("TypeError"));
}

#[test]
fn unsafe_block_returns_tagged_error() {
    let src = r#"
function parse(text) {
  unsafe {
    return JSON.parse(text);
  }
}
"#;
    let mut m = module(src);
    let ok = m.eval_source("parse('[1]').length").unwrap();
    assert_eq!(ok, num(1.0));
    let err = m.eval_source("parse('{').$error").unwrap();
    assert_eq!(err, b(true));
    assert_eq!(m.eval_source("parse('{').op").unwrap(), s("unsafe"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Classes
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn classes_fields_getters_and_inheritance() {
    let src = r#"
class Shape {
  sides = 0;
  constructor(name) { this.name = name; }
  describe() { return `${this.name}/${this.sides}`; }
  static create() { return new Shape('anon'); }
}
class Square extends Shape {
  sides = 4;
  constructor(size) { super('square'); this.size = size; }
  get area() { return this.size * this.size; }
  describe() { return 'sq ' + super.describe(); }
}
const sq = new Square(3);
"#;
    assert_eq!(eval_in(src, "sq.area"), num(9.0));
    assert_eq!(eval_in(src, "sq.describe()"), s("sq square/4"));
    assert_eq!(eval_in(src, "sq instanceof Shape"), b(true));
    assert_eq!(eval_in(src, "Shape.create().describe()"), s("anon/0"));
}

#[test]
fn custom_error_subclass() {
    let src = r#"
class NotFound extends Error {
  constructor(what) { super(`${what} not found`); this.name = 'NotFound'; }
}
let caught;
try { throw new NotFound('key'); } catch (e) { caught = e; }
"#;
    assert_eq!(eval_in(src, "caught.message"), s("key not found"));
    assert_eq!(eval_in(src, "caught instanceof Error"), b(true));
}

#[test]
fn overloaded_class_dispatches_construction() {
    let src = r#"
class Point$class {
  constructor(x, y) { this.x = x; this.y = y; }
  sum() { return this.x + this.y; }
}
function Point$ctor2(...__args) {
  const __self = Object.create(Point$class.prototype);
  (function (s) { const [x, y] = s.split(','); this.x = +x; this.y = +y; }).apply(__self, __args);
  return __self;
}
function Point$new(...args) {
  if (args.length === 1 && typeof args[0] === 'string') return Point$ctor2(...args);
  return new Point$class(...args);
}
const Point = __overloadClass(Point$class, Point$new);
"#;
    assert_eq!(eval_in(src, "new Point(1, 2).sum()"), num(3.0));
    assert_eq!(eval_in(src, "new Point('3,4').sum()"), num(7.0));
    assert_eq!(eval_in(src, "new Point('3,4') instanceof Point"), b(true));
}

// ══════════════════════════════════════════════════════════════════════════════
// Builtins
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn array_methods() {
    assert_eq!(eval("[3, 1, 2].sort().join()"), s("1,2,3"));
    assert_eq!(eval("[10, 9, 1].sort((a, b) => a - b).join()"), s("1,9,10"));
    assert_eq!(eval("[1, 2, 3].map(x => x * 2).filter(x => x > 2).join()"), s("4,6"));
    assert_eq!(eval("[1, 2, 3].reduce((a, x) => a + x, 0)"), num(6.0));
    assert_eq!(eval("[[1], [2, [3]]].flat().length"), num(3.0));
    assert_eq!(eval("[1, 2, 3].findIndex(x => x === 2)"), num(1.0));
    assert_eq!(eval("[1, 2, 3].slice(-2).join()"), s("2,3"));
}

#[test]
fn string_methods() {
    assert_eq!(eval("'a-b-c'.split('-').length"), num(3.0));
    assert_eq!(eval("'Hello'.toUpperCase()"), s("HELLO"));
    assert_eq!(eval("'  x '.trim()"), s("x"));
    assert_eq!(eval("'abc'.slice(1)"), s("bc"));
    assert_eq!(eval("'5'.padStart(3, '0')"), s("005"));
    assert_eq!(eval("'a1b2'.replace(/\\d/g, '#')"), s("a#b#"));
    assert_eq!(eval("/^h/i.test('Hi')"), b(true));
}

#[test]
fn json_and_object_helpers() {
    assert_eq!(eval("JSON.stringify({ a: 1, b: [true, null] })"), s(r#"{"a":1,"b":[true,null]}"#));
    assert_eq!(eval("JSON.parse('{\"x\": 2}').x"), num(2.0));
    assert_eq!(eval("Object.entries({ a: 1 })[0].join('=')"), s("a=1"));
    assert_eq!(eval("Object.assign({}, { a: 1 }, { b: 2 }).b"), num(2.0));
}

#[test]
fn frozen_objects_reject_writes() {
    let src = r#"
const o = Object.freeze({ a: 1 });
let msg = '';
try { o.a = 2; } catch (e) { msg = e.name; }
"#;
    assert_eq!(eval_in(src, "msg"), s("TypeError"));
    assert_eq!(eval_in(src, "o.a"), num(1.0));
}

#[test]
fn console_log_is_captured() {
    let m = module("console.log('hello', 1, [2]);");
    assert_eq!(m.log_output(), &["hello 1 [2]".to_string()]);
}

#[test]
fn math_random_is_deterministic() {
    let first = eval("Math.random()");
    let second = eval("Math.random()");
    assert_eq!(first, second);
}

// ══════════════════════════════════════════════════════════════════════════════
// Runtime helpers
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn is_uses_deep_equality_with_epsilon() {
    assert_eq!(eval("Is(0.1 + 0.2, 0.3)"), b(true));
    assert_eq!(eval("Is({ a: [1] }, { a: [1] })"), b(true));
    assert_eq!(eval("IsNot(1, 2)"), b(true));
    assert_eq!(eval("Is(NaN, NaN)"), b(true));
}

#[test]
fn type_helper_checks_examples_and_predicates() {
    let src = r#"
const Email = Type('Email', { example: 'a@b.c', predicate(s) { return s.includes('@'); } });
const Age = Type('Age', 0, 'years');
"#;
    assert_eq!(eval_in(src, "Email.check('x@y')"), b(true));
    assert_eq!(eval_in(src, "Email.check('nope')"), b(false));
    assert_eq!(eval_in(src, "Email.check(3)"), b(false));
    assert_eq!(eval_in(src, "Age.description"), s("years"));
    assert_eq!(eval_in(src, "Age.check(4)"), b(true));
}

#[test]
fn union_and_enum_helpers() {
    let src = r#"
const Color = Union('Color', 'primary colors', ['red', 'green']);
const Level = Enum('Level', 'levels', { Low: 0, High: 1 });
"#;
    assert_eq!(eval_in(src, "Color.check('red')"), b(true));
    assert_eq!(eval_in(src, "Color.check('blue')"), b(false));
    assert_eq!(eval_in(src, "Level.High"), num(1.0));
    assert_eq!(eval_in(src, "Object.isFrozen(Level)"), b(true));
}

#[test]
fn extend_adds_methods_to_builtins() {
    let src = r#"
__extend('String', { shout: function () { return this.toUpperCase() + '!'; } });
__extend('Array', { second: function () { return this[1]; } });
"#;
    assert_eq!(eval_in(src, "'hey'.shout()"), s("HEY!"));
    assert_eq!(eval_in(src, "[1, 2].second()"), num(2.0));
}

// ══════════════════════════════════════════════════════════════════════════════
// Gas metering
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn gas_exhaustion_stops_infinite_loop() {
    match ModuleInstance::load_with_gas_limit("while (true) {}", 1_000) {
        Err(EvalError::GasExhausted) => {}
        Err(e) => panic!("expected gas exhaustion, got {e}"),
        Ok(_) => panic!("expected gas exhaustion"),
    }
}

#[test]
fn gas_exhaustion_is_not_catchable() {
    let src = "try { while (true) {} } catch (e) {}";
    assert!(matches!(
        ModuleInstance::load_with_gas_limit(src, 1_000),
        Err(EvalError::GasExhausted)
    ));
}

#[test]
fn deep_recursion_is_a_range_error() {
    let src = "function f(n) { return f(n + 1); }";
    let mut m = module(src);
    match m.call("f", vec![num(0.0)]) {
        Err(EvalError::Range(msg)) => assert!(msg.contains("call stack")),
        other => panic!("expected RangeError, got {other:?}"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Test runner
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn runner_reports_each_test_independently() {
    let src = "function double(n) { return n * 2; }";
    let tests = vec![
        test_case("doubles", "expect(double(2)).toBe(4);"),
        test_case("wrong", "expect(double(2)).toBe(5);"),
        test_case("equal", "expect([double(1)]).toEqual([2]);"),
    ];
    let summary = run_tests(src, &tests, &[], DEFAULT_GAS_LIMIT);
    assert_eq!(summary.passed, 2);
    assert_eq!(summary.failed, 1);
    let failure = summary.results[1].error.as_deref().unwrap();
    assert!(failure.contains("expected 4 to be 5"), "{failure}");
}

#[test]
fn runner_shares_one_module_instantiation() {
    let src = "let count = 0; function bump() { return ++count; }";
    let tests = vec![
        test_case("first", "expect(bump()).toBe(1);"),
        test_case("second", "expect(bump()).toBe(2);"),
    ];
    let summary = run_tests(src, &tests, &[], DEFAULT_GAS_LIMIT);
    assert!(summary.all_passed(), "{summary}");
}

#[test]
fn runner_module_failure_fails_every_test() {
    let tests = vec![test_case("a", "assert(true);"), test_case("b", "assert(true);")];
    let summary = run_tests("throw new Error('boom');", &tests, &[], DEFAULT_GAS_LIMIT);
    assert_eq!(summary.failed, 2);
    for r in &summary.results {
        assert!(r.error.as_deref().unwrap().starts_with("module execution failed"));
    }
}

#[test]
fn runner_skips_on_unresolved_import() {
    let src = "import { fetchUser } from './api';\nconst u = fetchUser(1);";
    let tests = vec![test_case("uses import", "assert(u);")];
    let summary = run_tests(src, &tests, &[], DEFAULT_GAS_LIMIT);
    assert!(summary.results[0].passed);
    assert!(summary.results[0].skipped);
}

#[test]
fn signature_tests_use_structural_matching() {
    let src = r#"
function pair(name, n) { return { name: name + '!', values: [n, n + 1] }; }
function wrong(x) { return 'nope'; }
"#;
    let sigs = vec![
        signature("pair", &["'a'", "0"], "{ name: '', values: [0] }"),
        signature("wrong", &["0"], "0"),
    ];
    let summary = run_tests(src, &[], &sigs, DEFAULT_GAS_LIMIT);
    assert!(summary.results[0].passed, "{summary}");
    assert!(!summary.results[1].passed);
    assert!(summary.results[1].error.as_deref().unwrap().contains("expected number, received string"));
}

#[test]
fn async_signature_tests_are_skipped() {
    let mut sig = signature("load", &[], "0");
    sig.is_async = true;
    let summary = run_tests("async function load() { return 'x'; }", &[], &[sig], DEFAULT_GAS_LIMIT);
    assert!(summary.results[0].passed && summary.results[0].skipped);
}

#[test]
fn union_and_nullable_returns_check_every_alternative() {
    let src = "function id(x) { return x; }\nfunction none() { return null; }\n";
    let mut either = signature("id", &["0"], "0 || ''");
    either.returns_type = Some(TypeDescriptor::union(vec![TypeDescriptor::number(), TypeDescriptor::string()]));
    let mut maybe = signature("none", &[], "'ü' || null");
    maybe.returns_type = Some(TypeDescriptor::string().into_nullable());
    let mut strict = signature("id", &["true"], "0 || ''");
    strict.returns_type = either.returns_type.clone();

    let summary = run_tests(src, &[], &[either, maybe, strict], DEFAULT_GAS_LIMIT);
    assert!(summary.results[0].passed, "{summary}");
    assert!(summary.results[1].passed, "{summary}");
    assert!(!summary.results[2].passed);
}

#[test]
fn to_throw_and_to_match() {
    let src = "function fail() { throw new TypeError('bad input'); }";
    let tests = vec![
        test_case("throws", "expect(fail).toThrow('bad');"),
        test_case("shape", "expect({ a: 1, b: 'x' }).toMatch({ a: 0 });"),
        test_case("not throws", "expect(() => 1).not.toThrow();"),
    ];
    let summary = run_tests(src, &tests, &[], DEFAULT_GAS_LIMIT);
    assert!(summary.all_passed(), "{summary}");
}

#[test]
fn runaway_test_fails_without_hanging() {
    let tests = vec![test_case("spin", "while (true) {}"), test_case("after", "assert(true);")];
    let summary = run_tests("", &tests, &[], 10_000);
    assert!(!summary.results[0].passed);
    assert_eq!(summary.results[0].error.as_deref(), Some("gas exhausted"));
    assert!(summary.results[1].passed);
}
