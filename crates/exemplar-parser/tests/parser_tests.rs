//! Parser tests.
//!
//! Covers: statements, expressions (precedence, arrows, templates, optional
//! chaining), declarations (functions, patterns, classes, modules), automatic
//! statement termination, error recovery, the annotated dialect, and
//! determinism.

use exemplar_parser::{parse_annotated, parse_expression, ParseResult};
use exemplar_types::annotation::*;
use exemplar_types::ast::*;
use exemplar_types::SourceFile;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Parse source and return the result (program + errors).
fn parse(source: &str) -> ParseResult {
    let sf = SourceFile::new("test.ex", source);
    exemplar_parser::parse(&sf)
}

/// Parse source and return the program, panicking if there are errors.
fn parse_ok(source: &str) -> Program {
    let result = parse(source);
    if result.errors.has_errors() {
        for e in &result.errors.errors {
            eprintln!("  ERROR: {e}");
        }
        panic!("unexpected parse errors (see above)");
    }
    result.program.expect("no program returned")
}

/// Parse a single expression, panicking on errors.
fn expr(source: &str) -> Expr {
    let sf = SourceFile::new("test.ex", source);
    match parse_expression(&sf) {
        Ok(e) => e,
        Err(errors) => panic!("unexpected errors: {:?}", errors.errors),
    }
}

/// Parse source and return the error count.
fn error_count(source: &str) -> usize {
    parse(source).errors.total_errors
}

fn first_function(program: &Program) -> &Function {
    program.functions().next().expect("no function").0
}

fn text<'a>(source: &'a str, span: exemplar_types::Span) -> &'a str {
    &source[span.start..span.end]
}

// ─────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_precedence_mul_over_add() {
    let e = expr("1 + 2 * 3");
    match e.kind {
        ExprKind::Binary { op: BinaryOp::Add, right, .. } => {
            assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
        }
        other => panic!("expected addition, got {other:?}"),
    }
}

#[test]
fn test_exponent_is_right_associative() {
    let e = expr("2 ** 3 ** 2");
    match e.kind {
        ExprKind::Binary { op: BinaryOp::Exp, left, right } => {
            assert_eq!(left.kind, ExprKind::Number(2.0));
            assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Exp, .. }));
        }
        other => panic!("expected exponent, got {other:?}"),
    }
}

#[test]
fn test_logical_or_null_example() {
    let e = expr("'' || null");
    match e.kind {
        ExprKind::Logical { op: LogicalOp::Or, left, right } => {
            assert_eq!(left.kind, ExprKind::String(String::new()));
            assert_eq!(right.kind, ExprKind::Null);
        }
        other => panic!("expected logical or, got {other:?}"),
    }
}

#[test]
fn test_equality_binds_tighter_than_and() {
    let e = expr("a == b && c != d");
    match e.kind {
        ExprKind::Logical { op: LogicalOp::And, left, right } => {
            assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
            assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::NotEq, .. }));
        }
        other => panic!("expected &&, got {other:?}"),
    }
}

#[test]
fn test_conditional_and_assignment() {
    let e = expr("x = a ? b : c");
    match e.kind {
        ExprKind::Assign { op: AssignOp::Assign, value, .. } => {
            assert!(matches!(value.kind, ExprKind::Conditional { .. }));
        }
        other => panic!("expected assignment, got {other:?}"),
    }
}

#[test]
fn test_invalid_assignment_target() {
    let sf = SourceFile::new("test.ex", "1 = 2");
    assert!(parse_expression(&sf).is_err());
}

#[test]
fn test_arrow_functions() {
    let e = expr("x => x > 5");
    match e.kind {
        ExprKind::Function(f) => {
            assert!(f.is_arrow);
            assert_eq!(f.params.len(), 1);
            assert!(matches!(f.body, FunctionBody::Expr(_)));
        }
        other => panic!("expected arrow, got {other:?}"),
    }

    let e = expr("async (a, { b }) => { return a }");
    match e.kind {
        ExprKind::Function(f) => {
            assert!(f.is_async && f.is_arrow);
            assert_eq!(f.params.len(), 2);
            assert!(matches!(f.params[1].target, Pattern::Object { .. }));
            assert!(f.block().is_some());
        }
        other => panic!("expected arrow, got {other:?}"),
    }
}

#[test]
fn test_parenthesized_expression_is_not_arrow() {
    let e = expr("(a + b) * c");
    assert!(matches!(e.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn test_member_call_chain_and_optional() {
    let e = expr("items.filter(x => x)?.length");
    match e.kind {
        ExprKind::Member { property, optional, object } => {
            assert_eq!(property, "length");
            assert!(optional);
            assert!(matches!(object.kind, ExprKind::Call { .. }));
        }
        other => panic!("expected member, got {other:?}"),
    }
}

#[test]
fn test_keyword_property_names() {
    let e = expr("promise.catch(handler).default");
    assert!(matches!(e.kind, ExprKind::Member { ref property, .. } if property == "default"));
}

#[test]
fn test_new_expression() {
    let e = expr("new Map([[1, 2]])");
    match e.kind {
        ExprKind::New { callee, args } => {
            assert_eq!(callee.as_ident(), Some("Map"));
            assert_eq!(args.len(), 1);
        }
        other => panic!("expected new, got {other:?}"),
    }
}

#[test]
fn test_template_literal() {
    let e = expr("`a${b}c${d}`");
    match e.kind {
        ExprKind::Template(t) => {
            assert_eq!(t.quasis, vec!["a", "c", ""]);
            assert_eq!(t.exprs.len(), 2);
        }
        other => panic!("expected template, got {other:?}"),
    }
}

#[test]
fn test_object_literal_forms() {
    let e = expr("{ a, 'b c': 1, [k]: 2, ...rest, m(x) { return x }, 3: 'three' }");
    match e.kind {
        ExprKind::Object(props) => {
            assert_eq!(props.len(), 6);
            assert!(matches!(&props[0], ObjectProp::Property { shorthand: true, .. }));
            assert!(matches!(&props[1], ObjectProp::Property { key: PropKey::Named(k), .. } if k == "b c"));
            assert!(matches!(&props[2], ObjectProp::Property { key: PropKey::Computed(_), .. }));
            assert!(matches!(&props[3], ObjectProp::Spread(_)));
            assert!(matches!(&props[4], ObjectProp::Property { value: Expr { kind: ExprKind::Function(_), .. }, .. }));
            assert!(matches!(&props[5], ObjectProp::Property { key: PropKey::Named(k), .. } if k == "3"));
        }
        other => panic!("expected object, got {other:?}"),
    }
}

#[test]
fn test_array_with_holes_and_spread() {
    let e = expr("[1, , ...xs]");
    match e.kind {
        ExprKind::Array(items) => {
            assert_eq!(items.len(), 3);
            assert_eq!(items[1].as_ident(), Some("undefined"));
            assert!(matches!(items[2].kind, ExprKind::Spread(_)));
        }
        other => panic!("expected array, got {other:?}"),
    }
}

#[test]
fn test_unary_plus_literal() {
    let e = expr("+(-1)");
    match e.kind {
        ExprKind::Unary { op: UnaryOp::Plus, operand } => {
            assert!(matches!(operand.kind, ExprKind::Paren(_)));
        }
        other => panic!("expected unary plus, got {other:?}"),
    }
}

#[test]
fn test_update_and_await() {
    let program = parse_ok("async function f() { i++; --j; await g() }");
    let body = &first_function(&program).block().unwrap().body;
    assert!(matches!(
        &body[0].kind,
        StmtKind::Expr(Expr { kind: ExprKind::Update { prefix: false, op: UpdateOp::Increment, .. }, .. })
    ));
    assert!(matches!(
        &body[1].kind,
        StmtKind::Expr(Expr { kind: ExprKind::Update { prefix: true, op: UpdateOp::Decrement, .. }, .. })
    ));
    assert!(matches!(&body[2].kind, StmtKind::Expr(Expr { kind: ExprKind::Await(_), .. })));
}

#[test]
fn test_expression_spans_cover_source() {
    let source = "foo.bar(1, 2)";
    let e = expr(source);
    assert_eq!(text(source, e.span), source);
}

// ─────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_variable_declarations_with_patterns() {
    let program = parse_ok("const { a, b: [c, d = 1] } = obj, e = 2;");
    match &program.body[0].kind {
        StmtKind::Var(decl) => {
            assert_eq!(decl.kind, VarKind::Const);
            assert_eq!(decl.declarations.len(), 2);
            let names: Vec<&str> = decl.declarations[0]
                .target
                .bound_names()
                .iter()
                .map(|i| i.name.as_str())
                .collect();
            assert_eq!(names, vec!["a", "c", "d"]);
        }
        other => panic!("expected var, got {other:?}"),
    }
}

#[test]
fn test_loops() {
    let program = parse_ok(
        "for (let i = 0; i < n; i++) {}\n\
         for (const x of xs) {}\n\
         for (const k in obj) {}\n\
         while (a) { break }\n\
         do { continue } while (b)",
    );
    assert!(matches!(program.body[0].kind, StmtKind::For { .. }));
    assert!(matches!(program.body[1].kind, StmtKind::ForOf { .. }));
    assert!(matches!(program.body[2].kind, StmtKind::ForIn { .. }));
    assert!(matches!(program.body[3].kind, StmtKind::While { .. }));
    assert!(matches!(program.body[4].kind, StmtKind::DoWhile { .. }));
}

#[test]
fn test_for_in_head_does_not_consume_in() {
    let program = parse_ok("for (k in obj) { use(k) }");
    match &program.body[0].kind {
        StmtKind::ForIn { head, object, .. } => {
            assert_eq!(head.kind, None);
            assert_eq!(head.target.as_ident(), Some("k"));
            assert_eq!(object.as_ident(), Some("obj"));
        }
        other => panic!("expected for-in, got {other:?}"),
    }
}

#[test]
fn test_try_catch_finally_and_switch() {
    let program = parse_ok(
        "try { a() } catch (e) { b(e) } finally { c() }\n\
         switch (x) { case 1: y(); break; default: z() }",
    );
    match &program.body[0].kind {
        StmtKind::Try { handler, finalizer, .. } => {
            assert!(handler.as_ref().is_some_and(|h| h.param.is_some()));
            assert!(finalizer.is_some());
        }
        other => panic!("expected try, got {other:?}"),
    }
    match &program.body[1].kind {
        StmtKind::Switch { cases, .. } => {
            assert_eq!(cases.len(), 2);
            assert_eq!(cases[0].body.len(), 2);
            assert!(cases[1].test.is_none());
        }
        other => panic!("expected switch, got {other:?}"),
    }
}

#[test]
fn test_try_without_handler_is_error() {
    assert!(error_count("try { a() }") > 0);
}

#[test]
fn test_unsafe_block_and_label() {
    let program = parse_ok("function f() { unsafe { risky() } }\nouter: for (;;) { break outer }");
    let body = &first_function(&program).block().unwrap().body;
    assert!(matches!(body[0].kind, StmtKind::Unsafe(_)));
    assert!(matches!(program.body[1].kind, StmtKind::Labeled { .. }));
}

#[test]
fn test_unsafe_as_identifier() {
    let program = parse_ok("let unsafe = 1\nunsafe + 1");
    assert_eq!(program.body.len(), 2);
}

#[test]
fn test_newline_terminates_statements() {
    let program = parse_ok("let a = 1\nlet b = a\nb");
    assert_eq!(program.body.len(), 3);
}

#[test]
fn test_return_newline_ends_statement() {
    let program = parse_ok("function f() { return\n1 }");
    let body = &first_function(&program).block().unwrap().body;
    assert!(matches!(body[0].kind, StmtKind::Return(None)));
}

#[test]
fn test_return_outside_function() {
    assert!(error_count("return 1") > 0);
}

#[test]
fn test_missing_semicolon_same_line() {
    assert!(error_count("let a = 1 let b = 2") > 0);
}

// ─────────────────────────────────────────────────────────────────────
// Declarations
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_function_declaration_parts() {
    let source = "export async function load(id = 0, { force = false } = {}, ...rest) { return id }";
    let program = parse_ok(source);
    let (f, exported) = program.functions().next().unwrap();
    assert!(exported);
    assert!(f.is_async);
    assert_eq!(f.name(), Some("load"));
    assert_eq!(f.params.len(), 3);
    assert!(f.params[0].default.is_some());
    assert!(f.params[2].rest);
    assert_eq!(text(source, f.params_span), "(id = 0, { force = false } = {}, ...rest)");
    assert!(text(source, f.span).starts_with("async function load"));
}

#[test]
fn test_rest_parameter_must_be_last() {
    assert!(error_count("function f(...a, b) {}") > 0);
}

#[test]
fn test_class_members() {
    let program = parse_ok(
        "class Point extends Base {\n\
           x = 0\n\
           static origin() { return new Point() }\n\
           constructor(x) { super(); this.x = x }\n\
           constructor(x, y) { this.x = x + y }\n\
           get size() { return 1 }\n\
           async load() {}\n\
         }",
    );
    let class = program.classes().next().unwrap();
    assert_eq!(class.name.name, "Point");
    assert!(class.superclass.is_some());
    assert_eq!(class.constructors().count(), 2);
    let methods: Vec<(&str, bool)> = class.methods().map(|(k, _, s)| (k, s)).collect();
    assert_eq!(methods, vec![("origin", true), ("load", false)]);
    assert!(matches!(class.members[0].kind, ClassMemberKind::Field(Some(_))));
    assert!(class.members.iter().any(|m| matches!(m.kind, ClassMemberKind::Getter(_))));
}

#[test]
fn test_imports_and_exports() {
    let program = parse_ok(
        "import fs from 'fs'\n\
         import * as path from 'path'\n\
         import { a, b as c } from './m'\n\
         export const x = 1\n\
         export { x as y }\n\
         export default x",
    );
    match &program.body[2].kind {
        StmtKind::Import(decl) => {
            assert_eq!(decl.source, "./m");
            assert_eq!(decl.named[1].1.name, "c");
        }
        other => panic!("expected import, got {other:?}"),
    }
    assert!(matches!(program.body[3].kind, StmtKind::Export(ExportDecl::Decl(_))));
    assert!(matches!(program.body[4].kind, StmtKind::Export(ExportDecl::Named(_))));
    assert!(matches!(program.body[5].kind, StmtKind::Export(ExportDecl::Default(_))));
}

// ─────────────────────────────────────────────────────────────────────
// Error recovery
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_recovery_reports_multiple_errors() {
    let result = parse("let = 1;\nlet b = ;\nlet c = 3;");
    assert!(result.program.is_none());
    assert!(result.errors.total_errors >= 2);
}

#[test]
fn test_unclosed_brace_reports_unclosed_delimiter() {
    let result = parse("function f() {");
    let first = result.errors.first_error().unwrap();
    assert_eq!(first.code, exemplar_types::ErrorCode::UNCLOSED_DELIMITER);
}

#[test]
fn test_error_carries_position() {
    let result = parse("let a = 1\nlet b = )");
    let first = result.errors.first_error().unwrap();
    assert_eq!(first.line, 2);
    assert_eq!(first.column, 9);
}

#[test]
fn test_deep_nesting_is_rejected() {
    let source = format!("{}1{}", "(".repeat(100), ")".repeat(100));
    let sf = SourceFile::new("test.ex", &source);
    let err = parse_expression(&sf).unwrap_err();
    assert_eq!(err.errors[0].code, exemplar_types::ErrorCode::NESTING_TOO_DEEP);
}

// ─────────────────────────────────────────────────────────────────────
// Annotated dialect
// ─────────────────────────────────────────────────────────────────────

fn annotated(source: &str) -> AnnotatedModule {
    let sf = SourceFile::new("test.ts", source);
    let (module, errors) = parse_annotated(&sf);
    assert!(!errors.has_errors(), "unexpected errors: {:?}", errors.errors);
    module
}

#[test]
fn test_annotated_interface_and_alias() {
    let m = annotated(
        "interface User extends Base {\n  name: string;\n  age?: number\n  tags: string[]\n}\n\
         type Id = string | number\n\
         type Pair<T> = [T, T];",
    );
    assert_eq!(m.interfaces.len(), 1);
    let user = &m.interfaces[0];
    assert_eq!(user.name.name, "User");
    assert_eq!(user.extends.len(), 1);
    assert_eq!(user.members.len(), 3);
    assert!(user.members[1].optional);
    assert!(matches!(user.members[2].annotation.kind, AnnotationKind::Array(_)));

    assert_eq!(m.aliases.len(), 2);
    assert!(matches!(m.aliases[0].annotation.kind, AnnotationKind::Union(ref ms) if ms.len() == 2));
    assert_eq!(m.aliases[1].type_params, vec!["T"]);
}

#[test]
fn test_annotated_function_signature() {
    let source = "export function pick<T>(items: Array<Array<T>>, n?: number, flag: boolean = true): T | null {\n  const x: number = 1\n  return (items as any)[x]\n}";
    let m = annotated(source);
    assert_eq!(m.functions.len(), 1);
    let f = &m.functions[0];
    assert_eq!(f.name.name, "pick");
    assert!(f.exported);
    assert_eq!(f.type_params, vec!["T"]);
    assert_eq!(f.params.len(), 3);
    assert!(f.params[1].optional);
    assert!(f.params[2].default.is_some());
    assert_eq!(text(source, f.params[2].span), "flag: boolean");
    assert_eq!(text(source, f.returns_span.unwrap()), ": T | null");
    assert_eq!(text(source, f.type_params_span.unwrap()), "<T>");
    assert!(text(source, f.body_span).starts_with('{') && text(source, f.body_span).ends_with('}'));

    let erased: Vec<&str> = m.erasures.iter().map(|s| text(source, *s)).collect();
    assert_eq!(erased, vec![": number", "as any"]);
}

#[test]
fn test_annotated_nested_functions_are_erased() {
    let source = "function outer(a: number) {\n  const f = (x: string): number => x.length\n  return f('a')\n}";
    let m = annotated(source);
    assert_eq!(m.functions.len(), 1);
    let erased: Vec<&str> = m.erasures.iter().map(|s| text(source, *s)).collect();
    assert_eq!(erased, vec![": string", ": number"]);
}

#[test]
fn test_annotated_overload_signatures_erased() {
    let source = "function f(a: string): string;\nfunction f(a: any) { return a }";
    let m = annotated(source);
    assert_eq!(m.functions.len(), 1);
    assert_eq!(m.erasures.len(), 1);
    assert_eq!(text(source, m.erasures[0]), "function f(a: string): string;");
}

#[test]
fn test_annotated_function_type_and_object_literal() {
    let m = annotated("type Handler = (event: { kind: 'a' | 'b' }, n: -1) => void");
    match &m.aliases[0].annotation.kind {
        AnnotationKind::Function { params, returns } => {
            assert_eq!(params.len(), 2);
            assert!(matches!(params[0].annotation.as_ref().unwrap().kind, AnnotationKind::Object(_)));
            assert!(matches!(params[1].annotation.as_ref().unwrap().kind, AnnotationKind::NumberLiteral(n) if n == -1.0));
            assert_eq!(returns.kind, AnnotationKind::Keyword(Keyword::Void));
        }
        other => panic!("expected function type, got {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_determinism_100_iterations() {
    let source = "function f(a = 0, b = '') {\n  const xs = [a, b].map(x => `${x}`)\n  return xs.join(',')\n}";
    let first = parse_ok(source);
    for _ in 0..100 {
        assert_eq!(parse_ok(source), first);
    }
}
