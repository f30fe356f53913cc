//! Polymorphic merge.
//!
//! Top-level functions sharing a name become variants `name$1..name$N`
//! behind a dispatcher that picks one by argument count and runtime type.
//! Classes with several constructors keep the first; the others move out as
//! free functions and construction goes through a `Name$new` dispatcher.
//!
//! Everything generated is appended on the line that closes the last
//! variant, so no line moves.

use super::parse_program;
use crate::context::{CompileContext, DeclRole};
use exemplar_lexer::balance::{blank_out, collapse_lines};
use exemplar_lexer::Splicer;
use exemplar_types::ast::{
    ClassDecl, ClassMemberKind, ExportDecl, ExprKind, Function, FunctionBody, Param, Pattern,
    Program, StmtKind, UnaryOp,
};
use exemplar_types::{Diagnostic, ErrorCode, SourceFile};
use indexmap::IndexMap;

pub fn run(text: &str, ctx: &mut CompileContext) -> Result<String, Diagnostic> {
    let source = ctx.source_file(text);
    let program = parse_program(&source)?;
    let mut splicer = Splicer::new();
    merge_functions(&program, &source, ctx, &mut splicer)?;
    merge_constructors(&program, text, &source, ctx, &mut splicer)?;
    tracing::debug!(
        dispatchers = ctx.overloads.len(),
        classes = ctx.overloaded_classes.len(),
        "merged polymorphic declarations"
    );
    Ok(splicer.apply(text))
}

// ══════════════════════════════════════════════════════════════════════════════
// Parameter Classes
// ══════════════════════════════════════════════════════════════════════════════

/// Runtime class of a parameter's example, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParamClass {
    NonNegativeInteger,
    Integer,
    Float,
    String,
    Boolean,
    Null,
    Undefined,
    Array,
    Object,
    Number,
    Any,
}

impl ParamClass {
    pub fn of(param: &Param) -> Self {
        match &param.target {
            Pattern::Object { .. } => return ParamClass::Object,
            Pattern::Array { .. } => return ParamClass::Array,
            Pattern::Ident(_) => {}
        }
        let Some(default) = &param.default else {
            return ParamClass::Any;
        };
        match &default.unparen().kind {
            ExprKind::String(_) | ExprKind::Template(_) => ParamClass::String,
            ExprKind::Bool(_) => ParamClass::Boolean,
            ExprKind::Null => ParamClass::Null,
            ExprKind::Ident(name) if name == "undefined" => ParamClass::Undefined,
            ExprKind::Array(_) => ParamClass::Array,
            ExprKind::Object(_) => ParamClass::Object,
            ExprKind::Number(n) => Self::literal(*n),
            ExprKind::Unary { op: UnaryOp::Neg, operand } => match operand.unparen().kind {
                ExprKind::Number(n) => Self::literal(n),
                _ => ParamClass::Any,
            },
            ExprKind::Unary { op: UnaryOp::Plus, operand } => match &operand.unparen().kind {
                ExprKind::Number(n) if n.fract() == 0.0 => ParamClass::NonNegativeInteger,
                ExprKind::Number(_) => ParamClass::Number,
                ExprKind::Unary { op: UnaryOp::Neg, operand } => match operand.unparen().kind {
                    ExprKind::Number(n) if n.fract() == 0.0 => ParamClass::Integer,
                    ExprKind::Number(_) => ParamClass::Number,
                    _ => ParamClass::Any,
                },
                _ => ParamClass::Any,
            },
            _ => ParamClass::Any,
        }
    }

    /// Bare numeric literal: `1` is an integer, `1.5` a float.
    fn literal(n: f64) -> Self {
        if n.fract() == 0.0 {
            ParamClass::Integer
        } else {
            ParamClass::Float
        }
    }

    /// Runtime test of `arg`; `None` accepts anything.
    pub fn predicate(self, arg: &str) -> Option<String> {
        Some(match self {
            ParamClass::String => format!("typeof {arg} === 'string'"),
            ParamClass::Boolean => format!("typeof {arg} === 'boolean'"),
            ParamClass::Null => format!("{arg} === null"),
            ParamClass::Undefined => format!("{arg} === undefined"),
            ParamClass::Array => format!("Array.isArray({arg})"),
            ParamClass::Object => {
                format!("({arg} !== null && typeof {arg} === 'object' && !Array.isArray({arg}))")
            }
            ParamClass::NonNegativeInteger => format!("(Number.isInteger({arg}) && {arg} >= 0)"),
            ParamClass::Integer => format!("Number.isInteger({arg})"),
            ParamClass::Float => format!("(typeof {arg} === 'number' && !Number.isInteger({arg}))"),
            ParamClass::Number => format!("typeof {arg} === 'number'"),
            ParamClass::Any => return None,
        })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Dispatchers
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Exact(usize),
    /// `min <= args.length < max`
    Range { min: usize, max: usize },
}

#[derive(Debug, Clone)]
struct Arm {
    arity: Arity,
    classes: Vec<ParamClass>,
    call: String,
}

impl Arm {
    fn render(&self) -> String {
        let mut conditions = Vec::new();
        match self.arity {
            Arity::Exact(n) => {
                conditions.push(format!("args.length === {n}"));
                for (i, class) in self.classes.iter().enumerate() {
                    conditions.extend(class.predicate(&format!("args[{i}]")));
                }
            }
            Arity::Range { min, max } => {
                conditions.push(format!("args.length >= {min} && args.length < {max}"));
                for (i, class) in self.classes.iter().enumerate() {
                    if let Some(pred) = class.predicate(&format!("args[{i}]")) {
                        conditions.push(format!("(args.length <= {i} || {pred})"));
                    }
                }
            }
        }
        format!("if ({}) return {};", conditions.join(" && "), self.call)
    }
}

#[derive(Debug, Clone)]
struct Dispatcher {
    name: String,
    is_async: bool,
    exported: bool,
    arms: Vec<Arm>,
}

impl Dispatcher {
    fn new(name: impl Into<String>, variants: &[Variant]) -> Self {
        let mut exact: Vec<Arm> = variants
            .iter()
            .map(|v| Arm {
                arity: Arity::Exact(v.classes.len()),
                classes: v.classes.clone(),
                call: v.call.clone(),
            })
            .collect();
        exact.sort_by(|a, b| {
            let key = |arm: &Arm| match arm.arity {
                Arity::Exact(n) => n,
                Arity::Range { max, .. } => max,
            };
            key(a).cmp(&key(b)).then_with(|| a.classes.cmp(&b.classes))
        });
        let ranged = variants.iter().filter(|v| v.required < v.classes.len()).map(|v| Arm {
            arity: Arity::Range {
                min: v.required,
                max: v.classes.len(),
            },
            classes: v.classes.clone(),
            call: v.call.clone(),
        });
        Self {
            name: name.into(),
            is_async: false,
            exported: false,
            arms: exact.into_iter().chain(ranged).collect(),
        }
    }

    /// One line of host source.
    fn render(&self) -> String {
        let mut out = String::new();
        if self.exported {
            out.push_str("export ");
        }
        if self.is_async {
            out.push_str("async ");
        }
        out.push_str(&format!("function {}(...args) {{", self.name));
        for arm in &self.arms {
            out.push(' ');
            out.push_str(&arm.render());
        }
        out.push_str(&format!(
            " throw new TypeError('No overload of {} matches (' + args.map(function (a) {{ return a === null ? 'null' : Array.isArray(a) ? 'array' : typeof a; }}).join(', ') + ')'); }}",
            self.name
        ));
        out
    }
}

#[derive(Debug, Clone)]
struct Variant {
    classes: Vec<ParamClass>,
    required: usize,
    call: String,
}

fn ambiguity(name: &str, variants: &[Variant], functions: &[&Function], source: &SourceFile) -> Option<Diagnostic> {
    for (k, later) in variants.iter().enumerate() {
        for (j, earlier) in variants[..k].iter().enumerate() {
            if earlier.classes == later.classes {
                return Some(
                    Diagnostic::at_span(
                        ErrorCode::AMBIGUOUS_OVERLOAD,
                        format!(
                            "declarations {} and {} of '{name}' take the same number and types of arguments",
                            j + 1,
                            k + 1
                        ),
                        source,
                        functions[k].span,
                    )
                    .with_suggestion("give one of them a different parameter example"),
                );
            }
        }
    }
    None
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions
// ══════════════════════════════════════════════════════════════════════════════

fn merge_functions(
    program: &Program,
    source: &SourceFile,
    ctx: &mut CompileContext,
    splicer: &mut Splicer,
) -> Result<(), Diagnostic> {
    let mut groups: IndexMap<&str, Vec<(&Function, Option<usize>)>> = IndexMap::new();
    for stmt in &program.body {
        let entry = match &stmt.kind {
            StmtKind::Function(f) => Some((f, None)),
            StmtKind::Export(ExportDecl::Decl(inner)) => match &inner.kind {
                StmtKind::Function(f) => Some((f, Some(stmt.span.start))),
                _ => None,
            },
            _ => None,
        };
        if let Some((f, export_at)) = entry {
            if let Some(name) = f.name() {
                groups.entry(name).or_default().push((f, export_at));
            }
        }
    }

    for (name, members) in groups.into_iter().filter(|(_, m)| m.len() > 1) {
        let functions: Vec<&Function> = members.iter().map(|(f, _)| *f).collect();
        if let Some(f) = functions.iter().find(|f| f.params.iter().any(|p| p.rest)) {
            return Err(Diagnostic::at_span(
                ErrorCode::REST_IN_OVERLOAD,
                format!("'{name}' is declared more than once, so none of its declarations may take a rest parameter"),
                source,
                f.span,
            ));
        }
        let is_async = functions[0].is_async;
        if let Some(f) = functions.iter().find(|f| f.is_async != is_async) {
            return Err(Diagnostic::at_span(
                ErrorCode::MIXED_ASYNC_OVERLOAD,
                format!("declarations of '{name}' must be all async or all synchronous"),
                source,
                f.span,
            ));
        }

        let records: Vec<usize> = ctx
            .declarations
            .iter()
            .filter(|d| d.role == DeclRole::Function && d.top_level && d.name == name)
            .map(|d| d.required_count())
            .collect();
        let variants: Vec<Variant> = functions
            .iter()
            .enumerate()
            .map(|(k, f)| Variant {
                classes: f.params.iter().map(ParamClass::of).collect(),
                required: records.get(k).copied().unwrap_or(0),
                call: format!("{name}${}(...args)", k + 1),
            })
            .collect();
        if let Some(diag) = ambiguity(name, &variants, &functions, source) {
            return Err(diag);
        }

        let mut targets = Vec::new();
        for (k, (f, export_at)) in members.iter().enumerate() {
            let target = format!("{name}${}", k + 1);
            if let Some(ident) = &f.name {
                splicer.replace(ident.span.start, ident.span.end, target.clone());
            }
            if let Some(at) = export_at {
                splicer.replace(*at, at + "export".len(), blank_out("export"));
            }
            targets.push(target);
        }

        let mut dispatcher = Dispatcher::new(name, &variants);
        dispatcher.is_async = is_async;
        dispatcher.exported = members.iter().any(|(_, e)| e.is_some());
        let last = functions[functions.len() - 1];
        splicer.insert(last.span.end, format!(" {}", dispatcher.render()));

        for target in &targets {
            ctx.rename_function(name, 1, target);
        }
        tracing::debug!(name, variants = targets.len(), "built dispatcher");
        ctx.overloads.insert(name.to_string(), targets);
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Constructors
// ══════════════════════════════════════════════════════════════════════════════

fn merge_constructors(
    program: &Program,
    text: &str,
    source: &SourceFile,
    ctx: &mut CompileContext,
    splicer: &mut Splicer,
) -> Result<(), Diagnostic> {
    for stmt in &program.body {
        let (class, export_at): (&ClassDecl, Option<usize>) = match &stmt.kind {
            StmtKind::Class(c) => (c, None),
            StmtKind::Export(ExportDecl::Decl(inner)) => match &inner.kind {
                StmtKind::Class(c) => (c, Some(stmt.span.start)),
                _ => continue,
            },
            _ => continue,
        };
        let ctors: Vec<(usize, usize, &Function)> = class
            .members
            .iter()
            .filter_map(|m| match &m.kind {
                ClassMemberKind::Constructor(f) => Some((m.span.start, m.span.end, f)),
                _ => None,
            })
            .collect();
        if ctors.len() < 2 {
            continue;
        }

        let name = class.name.name.as_str();
        let class_name = format!("{name}$class");
        let records: Vec<usize> = ctx
            .declarations
            .iter()
            .filter(|d| d.role == DeclRole::Constructor && d.owner.as_deref() == Some(name))
            .map(|d| d.required_count())
            .collect();

        let mut variants = Vec::new();
        let mut moved = Vec::new();
        for (k, (start, end, f)) in ctors.iter().enumerate() {
            let call = if k == 0 {
                format!("new {class_name}(...args)")
            } else {
                let ctor = format!("{name}$ctor{}", k + 1);
                let FunctionBody::Block(body) = &f.body else {
                    continue;
                };
                let params = collapse_lines(&text[f.params_span.start..f.params_span.end]);
                let body_text = collapse_lines(&text[body.span.start..body.span.end]);
                moved.push(format!(
                    "function {ctor}(...__args) {{ const __self = Object.create({class_name}.prototype); (function {params} {body_text}).apply(__self, __args); return __self; }}"
                ));
                splicer.replace(*start, *end, blank_out(&text[*start..*end]));
                ctx.detach_constructor(name, k + 1, &ctor);
                format!("{ctor}(...args)")
            };
            variants.push(Variant {
                classes: f.params.iter().map(ParamClass::of).collect(),
                required: records.get(k).copied().unwrap_or(0),
                call,
            });
        }
        let functions: Vec<&Function> = ctors.iter().map(|(_, _, f)| *f).collect();
        if let Some(diag) = ambiguity(name, &variants, &functions, source) {
            return Err(diag);
        }

        splicer.replace(class.name.span.start, class.name.span.end, class_name.clone());
        if let Some(at) = export_at {
            splicer.replace(at, at + "export".len(), blank_out("export"));
        }
        let dispatcher = Dispatcher::new(format!("{name}$new"), &variants);
        let export = if export_at.is_some() { "export " } else { "" };
        splicer.insert(
            class.span.end,
            format!(
                " {} {} {export}const {name} = __overloadClass({class_name}, {name}$new);",
                moved.join(" "),
                dispatcher.render()
            ),
        );
        tracing::debug!(class = name, constructors = ctors.len(), "merged constructors");
        ctx.overloaded_classes.insert(name.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge(src: &str) -> (String, CompileContext) {
        let mut ctx = CompileContext::new("t.ex");
        let normalized = crate::passes::params::run(src, &mut ctx).unwrap_or_else(|d| panic!("{}", d.render()));
        let out = run(&normalized, &mut ctx).unwrap_or_else(|d| panic!("{}", d.render()));
        (out, ctx)
    }

    fn merge_err(src: &str) -> Diagnostic {
        let mut ctx = CompileContext::new("t.ex");
        let normalized = crate::passes::params::run(src, &mut ctx).unwrap_or_else(|d| panic!("{}", d.render()));
        run(&normalized, &mut ctx).expect_err("expected a diagnostic")
    }

    // ══════════════════════════════════════════════════════════════════════
    // Functions
    // ══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_variants_renamed_and_dispatched() {
        let src = "function greet(name: '') { return 'hi ' + name }\nfunction greet(n: +0, name: '') { return name.repeat(n) }\n";
        let (out, ctx) = merge(src);
        assert_eq!(out.lines().count(), src.lines().count());
        assert!(out.contains("function greet$1(name = '')"));
        assert!(out.contains("function greet$2(n = +0, name = '')"));
        assert!(out.contains("function greet(...args) {"));
        assert!(out.contains("if (args.length === 1 && typeof args[0] === 'string') return greet$1(...args);"));
        assert!(out.contains(
            "if (args.length === 2 && (Number.isInteger(args[0]) && args[0] >= 0) && typeof args[1] === 'string') return greet$2(...args);"
        ));
        assert!(out.contains("throw new TypeError('No overload of greet matches ('"));
        assert_eq!(ctx.overloads["greet"], vec!["greet$1", "greet$2"]);
        assert!(ctx.function("greet$2").is_some());
    }

    #[test]
    fn test_export_moves_to_dispatcher() {
        let (out, _) = merge("export function f(a: '') {}\nexport function f(a: 0) {}\n");
        assert!(out.starts_with("       function f$1"));
        assert!(out.contains("export function f(...args)"));
    }

    #[test]
    fn test_specific_arms_first() {
        let (out, _) = merge("function g(x: 0) {}\nfunction g(x: +0) {}\n");
        let specific = out.find("(Number.isInteger(args[0]) && args[0] >= 0)) return g$2").unwrap();
        let general = out.find("Number.isInteger(args[0])) return g$1").unwrap();
        assert!(specific < general);
    }

    #[test]
    fn test_float_and_integer_examples_are_distinct() {
        let (out, _) = merge("function h(a: 1.5) { return 'f' }\nfunction h(a: 1) { return 'i' }\n");
        let integer = out
            .find("if (args.length === 1 && Number.isInteger(args[0])) return h$2(...args);")
            .unwrap();
        let float = out
            .find("if (args.length === 1 && (typeof args[0] === 'number' && !Number.isInteger(args[0]))) return h$1(...args);")
            .unwrap();
        assert!(integer < float);
    }

    #[test]
    fn test_negative_literals_classified() {
        let (out, _) = merge("function k(a: -2) {}\nfunction k(a: -0.5) {}\nfunction k(a: '') {}\n");
        assert!(out.contains("Number.isInteger(args[0])) return k$1"));
        assert!(out.contains("!Number.isInteger(args[0]))) return k$2"));
    }

    #[test]
    fn test_optional_tail_gets_ranged_arm() {
        let (out, _) = merge("function h(a: '', b?: 0) {}\nfunction h(a: 0) {}\n");
        assert!(out.contains("args.length >= 1 && args.length < 2 && (args.length <= 0 || typeof args[0] === 'string')"));
    }

    #[test]
    fn test_ambiguous_overload_rejected() {
        let err = merge_err("function f(a: 1) {}\nfunction f(b: 2) {}\n");
        assert_eq!(err.code, ErrorCode::AMBIGUOUS_OVERLOAD);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_mixed_async_rejected() {
        let err = merge_err("async function f(a: 1) {}\nfunction f(a: '') {}\n");
        assert_eq!(err.code, ErrorCode::MIXED_ASYNC_OVERLOAD);
    }

    #[test]
    fn test_rest_rejected() {
        let err = merge_err("function f(a: 1) {}\nfunction f(...xs: [0]) {}\n");
        assert_eq!(err.code, ErrorCode::REST_IN_OVERLOAD);
    }

    #[test]
    fn test_single_declaration_untouched() {
        let (out, ctx) = merge("function once(a: 1) { return a }\n");
        assert_eq!(out, "function once(a = 1) { return a }\n");
        assert!(ctx.overloads.is_empty());
    }

    #[test]
    fn test_param_class_order() {
        assert!(ParamClass::NonNegativeInteger < ParamClass::Integer);
        assert!(ParamClass::Integer < ParamClass::Float);
        assert!(ParamClass::Float < ParamClass::Number);
        assert!(ParamClass::Number < ParamClass::Any);
    }

    // ══════════════════════════════════════════════════════════════════════
    // Constructors
    // ══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_constructors_merged() {
        let src = "class Point {\n  constructor(x: 0, y: 0) { this.x = x; this.y = y }\n  constructor(p: { x: 0, y: 0 }) { this.x = p.x; this.y = p.y }\n}\n";
        let (out, ctx) = merge(src);
        assert_eq!(out.lines().count(), src.lines().count());
        assert!(out.contains("class Point$class {"));
        assert!(!out.contains("constructor(p"));
        assert!(out.contains("function Point$ctor2(...__args) { const __self = Object.create(Point$class.prototype);"));
        assert!(out.contains("function Point$new(...args) {"));
        assert!(out.contains("return new Point$class(...args);"));
        assert!(out.contains("const Point = __overloadClass(Point$class, Point$new);"));
        assert!(ctx.overloaded_classes.contains("Point"));
        assert!(ctx.declarations.iter().any(|d| d.name == "Point$ctor2"));
    }

    #[test]
    fn test_single_constructor_untouched() {
        let src = "class A {\n  constructor(x: 0) { this.x = x }\n}\n";
        let (out, ctx) = merge(src);
        assert!(out.contains("class A {"));
        assert!(ctx.overloaded_classes.is_empty());
    }
}
