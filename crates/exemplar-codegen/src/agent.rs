//! Agent-subset instruction emitter.
//!
//! Lowers one entry function to a JSON op tree for an external sandbox
//! interpreter:
//!
//! ```text
//! { op: 'seq', steps: [...], inputSchema }
//! ```
//!
//! Every step is `{ op, ...fields }`; every expression is one uniform
//! `{ $expr: kind, ...fields }` node so the sandbox never re-parses source.
//! Helper calls (`filter`, `map`, ...) and atom calls nested inside an
//! expression are hoisted into preceding steps bound to `$t<n>`
//! temporaries. Anything outside the subset is rejected with a diagnostic
//! that names an alternative.

use crate::error::{CodegenError, CodegenResult};
use exemplar_types::ast::{
    AssignOp, BinaryOp, Expr, ExprKind, Function, FunctionBody, ObjectProp, Pattern, PropKey,
    Stmt, StmtKind, UnaryOp, UpdateOp, VarDecl,
};
use exemplar_types::{ErrorCode, FunctionSignature, Span};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Array helpers lowered to dedicated ops carrying an inline lambda.
pub const HELPER_OPS: &[&str] = &[
    "filter", "find", "findIndex", "some", "every", "map", "flatMap", "forEach", "reduce", "sort",
];

/// Pure string/array methods available as `method` expressions.
pub const PURE_METHODS: &[&str] = &[
    "includes", "indexOf", "lastIndexOf", "slice", "join", "concat", "at", "toUpperCase",
    "toLowerCase", "trim", "trimStart", "trimEnd", "split", "startsWith", "endsWith", "replace",
    "replaceAll", "padStart", "padEnd", "repeat", "charAt", "charCodeAt", "substring", "toFixed",
    "toString", "flat",
];

/// Pure global functions available as `call` expressions.
const PURE_FUNCTIONS: &[&str] = &[
    "Number", "String", "Boolean", "parseInt", "parseFloat", "isNaN", "isFinite",
];

/// Pure namespaced builtins available as `call` expressions.
const PURE_STATICS: &[(&str, &[&str])] = &[
    (
        "Math",
        &[
            "abs", "ceil", "floor", "round", "max", "min", "pow", "sqrt", "sign", "trunc", "log",
            "exp",
        ],
    ),
    ("JSON", &["stringify", "parse"]),
    ("Object", &["keys", "values", "entries", "assign", "fromEntries"]),
    ("Array", &["isArray"]),
    ("Number", &["isInteger", "isFinite", "parseFloat", "parseInt"]),
    ("String", &["fromCharCode"]),
];

/// Host globals the subset never exposes, each with an alternative.
const DENY_LIST: &[(&str, &str)] = &[
    ("Date", "pass timestamps in as inputs or call a time atom"),
    ("process", "pass configuration in as inputs"),
    ("eval", "write the logic directly"),
    ("Function", "write the logic directly"),
    ("fetch", "call a network atom instead"),
    ("XMLHttpRequest", "call a network atom instead"),
    ("WebSocket", "call a network atom instead"),
    ("require", "declare the capability as an atom"),
    ("import", "declare the capability as an atom"),
    ("setTimeout", "the sandbox has no timers; call a scheduling atom"),
    ("setInterval", "the sandbox has no timers; call a scheduling atom"),
    ("Reflect", "access properties directly"),
    ("Proxy", "use a plain object"),
    ("globalThis", "reference inputs and locals directly"),
    ("window", "reference inputs and locals directly"),
];

/// Lower `func` to an instruction tree.
///
/// `atoms`, when given, is the set of atom names calls are validated
/// against; without it every unknown call is treated as an atom.
pub fn emit_agent(
    func: &Function,
    signature: &FunctionSignature,
    atoms: Option<&BTreeSet<String>>,
) -> CodegenResult<Value> {
    let mut lowerer = Lowerer { atoms, temps: 0 };
    let steps = match &func.body {
        FunctionBody::Block(block) => lowerer.lower_stmts(&block.body)?,
        FunctionBody::Expr(expr) => {
            let mut steps = Vec::new();
            let value = lowerer.lower_expr(expr, &mut steps)?;
            steps.push(json!({ "op": "return", "value": value }));
            steps
        }
    };
    Ok(json!({
        "op": "seq",
        "steps": steps,
        "inputSchema": signature.input_schema(),
    }))
}

fn reject(code: ErrorCode, message: impl Into<String>, span: Span, suggestion: &str) -> CodegenError {
    CodegenError::rejected(code, message, span).suggest(suggestion)
}

fn denied(name: &str) -> Option<&'static str> {
    DENY_LIST.iter().find(|(n, _)| *n == name).map(|(_, alt)| *alt)
}

fn is_pure_static(object: &str, method: &str) -> bool {
    PURE_STATICS
        .iter()
        .any(|(o, methods)| *o == object && methods.contains(&method))
}

fn literal(value: Value) -> Value {
    json!({ "$expr": "literal", "value": value })
}

fn ident(name: &str) -> Value {
    json!({ "$expr": "ident", "name": name })
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// `a`, `a.b.c`: the key a `varSet`/`push` writes to.
fn key_path(expr: &Expr) -> Option<String> {
    match &expr.unparen().kind {
        ExprKind::Ident(name) => Some(name.clone()),
        ExprKind::Member {
            object,
            property,
            optional: false,
        } => Some(format!("{}.{property}", key_path(object)?)),
        _ => None,
    }
}

/// Strip `await` and parentheses; both are transparent in the subset.
fn strip(expr: &Expr) -> &Expr {
    match &expr.kind {
        ExprKind::Await(inner) | ExprKind::Paren(inner) => strip(inner),
        _ => expr,
    }
}

/// A lowered lambda: either a single value expression, or steps that end
/// in `return`.
enum LambdaBody {
    Value(Value),
    Steps(Vec<Value>),
}

struct Lowerer<'a> {
    atoms: Option<&'a BTreeSet<String>>,
    temps: usize,
}

impl Lowerer<'_> {
    fn temp(&mut self) -> String {
        let name = format!("$t{}", self.temps);
        self.temps += 1;
        name
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    fn lower_stmts(&mut self, stmts: &[Stmt]) -> CodegenResult<Vec<Value>> {
        let mut out = Vec::new();
        for stmt in stmts {
            self.lower_stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    /// A nested statement position: blocks flatten into their steps.
    fn lower_body(&mut self, stmt: &Stmt) -> CodegenResult<Vec<Value>> {
        let mut out = Vec::new();
        self.lower_stmt(stmt, &mut out)?;
        Ok(out)
    }

    fn lower_stmt(&mut self, stmt: &Stmt, out: &mut Vec<Value>) -> CodegenResult<()> {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Var(decl) => self.lower_var(decl, out),
            StmtKind::Expr(expr) => self.lower_expr_stmt(expr, out),
            StmtKind::Block(block) => {
                for s in &block.body {
                    self.lower_stmt(s, out)?;
                }
                Ok(())
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                let condition = self.lower_expr(test, out)?;
                let then = self.lower_body(consequent)?;
                let mut step = json!({ "op": "if", "condition": condition, "then": then });
                if let Some(alt) = alternate {
                    step["else"] = Value::Array(self.lower_body(alt)?);
                }
                out.push(step);
                Ok(())
            }
            StmtKind::While { test, body } => {
                let mut hoisted = Vec::new();
                let condition = self.lower_expr(test, &mut hoisted)?;
                let body = self.lower_body(body)?;
                if hoisted.is_empty() {
                    out.push(json!({ "op": "while", "condition": condition, "body": body }));
                } else {
                    // The hoisted steps must rerun before every test.
                    hoisted.push(json!({
                        "op": "if",
                        "condition": { "$expr": "unary", "op": "!", "argument": condition },
                        "then": [{ "op": "break" }],
                    }));
                    hoisted.extend(body);
                    out.push(json!({ "op": "while", "condition": literal(json!(true)), "body": hoisted }));
                }
                Ok(())
            }
            StmtKind::ForOf {
                head,
                iterable,
                body,
            } => {
                let Some(name) = head.target.as_ident() else {
                    return Err(reject(
                        ErrorCode::UNSUPPORTED_STATEMENT,
                        "destructuring in a for-of head is not supported",
                        span,
                        "bind the element to a name and read its fields in the body",
                    ));
                };
                let items = self.lower_expr(iterable, out)?;
                let body = self.lower_body(body)?;
                out.push(json!({ "op": "for", "as": name, "items": items, "body": body }));
                Ok(())
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(v) => self.lower_expr(v, out)?,
                    None => literal(Value::Null),
                };
                out.push(json!({ "op": "return", "value": value }));
                Ok(())
            }
            StmtKind::Break(None) => {
                out.push(json!({ "op": "break" }));
                Ok(())
            }
            StmtKind::Continue(None) => {
                out.push(json!({ "op": "continue" }));
                Ok(())
            }
            StmtKind::Break(Some(_)) | StmtKind::Continue(Some(_)) | StmtKind::Labeled { .. } => {
                Err(reject(
                    ErrorCode::UNSUPPORTED_STATEMENT,
                    "labeled statements are not supported",
                    span,
                    "restructure the loop with a flag variable",
                ))
            }
            StmtKind::Throw(_) => Err(reject(
                ErrorCode::THROW_NOT_ALLOWED,
                "throw is not allowed: the agent subset has no exception propagation",
                span,
                "return the failure as data, e.g. return { error: 'message' }",
            )),
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => {
                if finalizer.is_some() {
                    return Err(reject(
                        ErrorCode::UNSUPPORTED_STATEMENT,
                        "finally blocks are not supported",
                        span,
                        "move the cleanup after the try/catch",
                    ));
                }
                let try_steps = self.lower_stmts(&block.body)?;
                let (param, catch_steps) = match handler {
                    Some(h) => {
                        let param = match &h.param {
                            None => None,
                            Some(Pattern::Ident(id)) => Some(id.name.clone()),
                            Some(_) => {
                                return Err(reject(
                                    ErrorCode::UNSUPPORTED_STATEMENT,
                                    "destructuring a caught error is not supported",
                                    span,
                                    "catch (err) and read err.message",
                                ))
                            }
                        };
                        (param, self.lower_stmts(&h.body.body)?)
                    }
                    None => (None, Vec::new()),
                };
                out.push(json!({
                    "op": "try",
                    "try": try_steps,
                    "catchParam": param,
                    "catch": catch_steps,
                }));
                Ok(())
            }
            StmtKind::Unsafe(block) => {
                let try_steps = self.lower_stmts(&block.body)?;
                let message = json!({ "$expr": "member", "object": ident("__e"), "property": "message" });
                let error = json!({
                    "$expr": "object",
                    "properties": [
                        { "key": "$error", "value": literal(json!(true)) },
                        { "key": "op", "value": literal(json!("unsafe")) },
                        { "key": "message", "value": message },
                    ],
                });
                out.push(json!({
                    "op": "try",
                    "try": try_steps,
                    "catchParam": "__e",
                    "catch": [{ "op": "return", "value": error }],
                }));
                Ok(())
            }
            StmtKind::Empty => Ok(()),
            StmtKind::Function(_) => Err(reject(
                ErrorCode::UNSUPPORTED_STATEMENT,
                "nested function declarations are not supported",
                span,
                "inline the logic, or pass a lambda to filter/map/reduce",
            )),
            StmtKind::Class(_) => Err(reject(
                ErrorCode::CONSTRUCTION_NOT_ALLOWED,
                "classes are not supported",
                span,
                "use plain object literals",
            )),
            StmtKind::For { .. } => Err(reject(
                ErrorCode::UNSUPPORTED_STATEMENT,
                "C-style for loops are not supported",
                span,
                "use for (const x of items) or a while loop",
            )),
            StmtKind::ForIn { .. } => Err(reject(
                ErrorCode::UNSUPPORTED_STATEMENT,
                "for-in loops are not supported",
                span,
                "use for (const key of Object.keys(obj))",
            )),
            StmtKind::Switch { .. } => Err(reject(
                ErrorCode::UNSUPPORTED_STATEMENT,
                "switch is not supported",
                span,
                "use an if / else if chain",
            )),
            StmtKind::DoWhile { .. } => Err(reject(
                ErrorCode::UNSUPPORTED_STATEMENT,
                "do...while is not supported",
                span,
                "use a while loop",
            )),
            StmtKind::Import(_) | StmtKind::Export(_) => Err(reject(
                ErrorCode::UNSUPPORTED_STATEMENT,
                "imports and exports are only allowed at the top level",
                span,
                "move the statement out of the function body",
            )),
        }
    }

    fn lower_var(&mut self, decl: &VarDecl, out: &mut Vec<Value>) -> CodegenResult<()> {
        for d in &decl.declarations {
            match (&d.target, &d.init) {
                (Pattern::Ident(id), None) => {
                    out.push(json!({ "op": "varSet", "key": id.name, "value": literal(Value::Null) }));
                }
                (Pattern::Ident(id), Some(init)) => {
                    if self.try_call_step(init, Some(&id.name), out)? {
                        continue;
                    }
                    let value = self.lower_expr(init, out)?;
                    out.push(json!({ "op": "varSet", "key": id.name, "value": value }));
                }
                (pattern, Some(init)) => {
                    let source = match key_path(init) {
                        Some(path) if !path.contains('.') => path,
                        _ => {
                            let t = self.temp();
                            if !self.try_call_step(init, Some(&t), out)? {
                                let value = self.lower_expr(init, out)?;
                                out.push(json!({ "op": "varSet", "key": t, "value": value }));
                            }
                            t
                        }
                    };
                    self.lower_destructure(pattern, &source, out)?;
                }
                (_, None) => {
                    return Err(reject(
                        ErrorCode::UNSUPPORTED_STATEMENT,
                        "a destructuring declaration needs an initializer",
                        d.span,
                        "add `= value`",
                    ))
                }
            }
        }
        Ok(())
    }

    fn lower_destructure(&mut self, pattern: &Pattern, source: &str, out: &mut Vec<Value>) -> CodegenResult<()> {
        match pattern {
            Pattern::Ident(_) => Err(CodegenError::Internal("identifier reached destructuring".into())),
            Pattern::Object { props, rest, span } => {
                if rest.is_some() {
                    return Err(nested_pattern(*span));
                }
                for prop in props {
                    let property = json!(prop.key);
                    self.bind_element(&prop.value, source, property, false, prop.default.as_ref(), out)?;
                }
                Ok(())
            }
            Pattern::Array { elements, rest, span } => {
                if rest.is_some() {
                    return Err(nested_pattern(*span));
                }
                for (i, elem) in elements.iter().enumerate() {
                    if let Some(elem) = elem {
                        let property = literal(json!(i));
                        self.bind_element(&elem.target, source, property, true, elem.default.as_ref(), out)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// `varSet name = source[property] ?? default`
    fn bind_element(
        &mut self,
        target: &Pattern,
        source: &str,
        property: Value,
        computed: bool,
        default: Option<&Expr>,
        out: &mut Vec<Value>,
    ) -> CodegenResult<()> {
        let Some(name) = target.as_ident() else {
            return Err(nested_pattern(target.span()));
        };
        let mut value = json!({ "$expr": "member", "object": ident(source), "property": property });
        if computed {
            value["computed"] = Value::Bool(true);
        }
        if let Some(default) = default {
            let fallback = self.lower_conditional_operand(default)?;
            value = json!({ "$expr": "logical", "op": "??", "left": value, "right": fallback });
        }
        out.push(json!({ "op": "varSet", "key": name, "value": value }));
        Ok(())
    }

    fn lower_expr_stmt(&mut self, expr: &Expr, out: &mut Vec<Value>) -> CodegenResult<()> {
        let expr = strip(expr);
        let span = expr.span;
        match &expr.kind {
            ExprKind::Call { callee, args, .. } => {
                if let ExprKind::Member { object, property, .. } = &callee.unparen().kind {
                    if property == "push" {
                        let Some(key) = key_path(object) else {
                            return Err(reject(
                                ErrorCode::UNSUPPORTED_STATEMENT,
                                "push target must be a variable or property path",
                                span,
                                "push onto a named array",
                            ));
                        };
                        for arg in args {
                            let value = self.lower_expr(arg, out)?;
                            out.push(json!({ "op": "push", "key": key, "value": value }));
                        }
                        return Ok(());
                    }
                    if property == "sort" {
                        if let Some(key) = key_path(object) {
                            if self.try_call_step(expr, Some(&key), out)? {
                                return Ok(());
                            }
                        }
                    }
                }
                if self.try_call_step(expr, None, out)? {
                    return Ok(());
                }
                // A pure call with its result unused.
                self.lower_expr(expr, out)?;
                Ok(())
            }
            ExprKind::Assign { op, target, value } => {
                let Some(key) = key_path(target) else {
                    return Err(reject(
                        ErrorCode::UNSUPPORTED_STATEMENT,
                        "assignment target must be a variable or property path",
                        target.span,
                        "assign to a named variable",
                    ));
                };
                if *op == AssignOp::Assign && self.try_call_step(value, Some(&key), out)? {
                    return Ok(());
                }
                let rhs = self.lower_expr(value, out)?;
                let current = self.lower_expr(target, out)?;
                let value = match op {
                    AssignOp::Assign => rhs,
                    AssignOp::And | AssignOp::Or | AssignOp::Nullish => {
                        let logical = match op {
                            AssignOp::And => "&&",
                            AssignOp::Or => "||",
                            _ => "??",
                        };
                        json!({ "$expr": "logical", "op": logical, "left": current, "right": rhs })
                    }
                    other => {
                        let bin = other.binary().map(|b| b.as_str()).unwrap_or("+");
                        json!({ "$expr": "binary", "op": bin, "left": current, "right": rhs })
                    }
                };
                out.push(json!({ "op": "varSet", "key": key, "value": value }));
                Ok(())
            }
            ExprKind::Update { op, target, .. } => {
                let Some(key) = key_path(target) else {
                    return Err(reject(
                        ErrorCode::UNSUPPORTED_STATEMENT,
                        "update target must be a variable or property path",
                        target.span,
                        "use x = x + 1 on a named variable",
                    ));
                };
                let current = self.lower_expr(target, out)?;
                let bin = match op {
                    UpdateOp::Increment => "+",
                    UpdateOp::Decrement => "-",
                };
                out.push(json!({
                    "op": "varSet",
                    "key": key,
                    "value": { "$expr": "binary", "op": bin, "left": current, "right": literal(json!(1)) },
                }));
                Ok(())
            }
            _ => Err(reject(
                ErrorCode::UNSUPPORTED_STATEMENT,
                "expression statement has no effect",
                span,
                "assign the value to a variable or return it",
            )),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Helper & atom steps
    // ══════════════════════════════════════════════════════════════════════

    /// Emit `expr` as a step if it is a helper or atom call. The step's
    /// result is bound to `result` when given.
    fn try_call_step(&mut self, expr: &Expr, result: Option<&str>, out: &mut Vec<Value>) -> CodegenResult<bool> {
        let expr = strip(expr);
        let ExprKind::Call { callee, args, .. } = &expr.kind else {
            return Ok(false);
        };
        match &callee.unparen().kind {
            ExprKind::Member { object, property, .. } if HELPER_OPS.contains(&property.as_str()) => {
                if property != "sort" && !matches!(args.first().map(|a| &a.unparen().kind), Some(ExprKind::Function(_))) {
                    return Ok(false);
                }
                let step = self.lower_helper(property, object, args, result, expr.span, out)?;
                out.push(step);
                Ok(true)
            }
            ExprKind::Ident(name) if !PURE_FUNCTIONS.contains(&name.as_str()) => {
                if let Some(alternative) = denied(name) {
                    return Err(reject(
                        ErrorCode::FORBIDDEN_GLOBAL,
                        format!("'{name}' is not available in the agent subset"),
                        callee.span,
                        alternative,
                    ));
                }
                let step = self.lower_atom(name, args, result, callee.span, out)?;
                out.push(step);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn lower_atom(
        &mut self,
        name: &str,
        args: &[Expr],
        result: Option<&str>,
        span: Span,
        out: &mut Vec<Value>,
    ) -> CodegenResult<Value> {
        if let Some(atoms) = self.atoms {
            if !atoms.contains(name) {
                let known: Vec<&str> = atoms.iter().map(String::as_str).take(8).collect();
                return Err(reject(
                    ErrorCode::UNKNOWN_ATOM,
                    format!("unknown atom '{name}'"),
                    span,
                    &format!("available atoms: {}", known.join(", ")),
                ));
            }
        }
        let mut step = Map::new();
        step.insert("op".into(), json!(name));

        let named_fields = match args {
            [only] => match &only.unparen().kind {
                ExprKind::Object(props) => props.iter().all(|p| {
                    matches!(p, ObjectProp::Property { key: PropKey::Named(k), .. } if k != "op" && k != "result")
                }),
                _ => false,
            },
            _ => false,
        };
        if named_fields {
            if let ExprKind::Object(props) = &args[0].unparen().kind {
                for prop in props {
                    if let ObjectProp::Property {
                        key: PropKey::Named(key),
                        value,
                        ..
                    } = prop
                    {
                        let value = self.lower_expr(value, out)?;
                        step.insert(key.clone(), value);
                    }
                }
            }
        } else {
            let args = self.lower_args(args, out)?;
            step.insert("args".into(), Value::Array(args));
        }
        if let Some(result) = result {
            step.insert("result".into(), json!(result));
        }
        Ok(Value::Object(step))
    }

    fn lower_helper(
        &mut self,
        op: &str,
        object: &Expr,
        args: &[Expr],
        result: Option<&str>,
        span: Span,
        out: &mut Vec<Value>,
    ) -> CodegenResult<Value> {
        let items = self.lower_expr(object, out)?;
        let mut step = Map::new();
        step.insert("op".into(), json!(op));
        step.insert("items".into(), items);

        let lambda = match args.first().map(|a| &a.unparen().kind) {
            Some(ExprKind::Function(f)) => Some(f.as_ref()),
            _ => None,
        };
        let params = match lambda {
            Some(f) => lambda_params(f)?,
            None => Vec::new(),
        };
        let param = |i: usize| params.get(i).cloned();

        match op {
            "reduce" => {
                let Some(f) = lambda else {
                    return Err(CodegenError::Internal("reduce without a callback".into()));
                };
                let Some(initial) = args.get(1) else {
                    return Err(reject(
                        ErrorCode::UNSUPPORTED_EXPRESSION,
                        "reduce needs an initial value",
                        span,
                        "pass the initial accumulator as the second argument",
                    ));
                };
                let initial = self.lower_expr(initial, out)?;
                step.insert("as".into(), json!(param(1).unwrap_or_else(|| "_".into())));
                step.insert("accumulator".into(), json!(param(0).unwrap_or_else(|| "_acc".into())));
                step.insert("initial".into(), initial);
                self.insert_lambda(&mut step, "value", f)?;
            }
            "sort" => {
                match lambda {
                    Some(f) => {
                        step.insert(
                            "as".into(),
                            json!([param(0).unwrap_or_else(|| "a".into()), param(1).unwrap_or_else(|| "b".into())]),
                        );
                        self.insert_lambda(&mut step, "value", f)?;
                    }
                    None if args.is_empty() => {
                        step.insert("as".into(), json!(["a", "b"]));
                        step.insert("value".into(), Value::Null);
                    }
                    None => {
                        return Err(reject(
                            ErrorCode::UNSUPPORTED_EXPRESSION,
                            "sort takes an inline comparator",
                            span,
                            "write items.sort((a, b) => a - b)",
                        ))
                    }
                }
            }
            "forEach" => {
                let Some(f) = lambda else {
                    return Err(CodegenError::Internal("forEach without a callback".into()));
                };
                step.insert("as".into(), json!(param(0).unwrap_or_else(|| "_".into())));
                if let Some(index) = param(1) {
                    step.insert("index".into(), json!(index));
                }
                let body = match &f.body {
                    FunctionBody::Block(block) => self.lower_stmts(&block.body)?,
                    FunctionBody::Expr(e) => {
                        let mut steps = Vec::new();
                        self.lower_expr_stmt(e, &mut steps)?;
                        steps
                    }
                };
                step.insert("body".into(), Value::Array(body));
            }
            _ => {
                let Some(f) = lambda else {
                    return Err(CodegenError::Internal(format!("{op} without a callback")));
                };
                step.insert("as".into(), json!(param(0).unwrap_or_else(|| "_".into())));
                if let Some(index) = param(1) {
                    step.insert("index".into(), json!(index));
                }
                let field = match op {
                    "map" | "flatMap" => "value",
                    _ => "condition",
                };
                self.insert_lambda(&mut step, field, f)?;
            }
        }
        if let Some(result) = result {
            step.insert("result".into(), json!(result));
        }
        Ok(Value::Object(step))
    }

    /// Insert a lambda as `field` (single expression) or `body` (steps).
    fn insert_lambda(&mut self, step: &mut Map<String, Value>, field: &str, f: &Function) -> CodegenResult<()> {
        match self.lower_lambda(f)? {
            LambdaBody::Value(value) => {
                step.insert(field.into(), value);
            }
            LambdaBody::Steps(steps) => {
                step.insert("body".into(), Value::Array(steps));
            }
        }
        Ok(())
    }

    fn lower_lambda(&mut self, f: &Function) -> CodegenResult<LambdaBody> {
        let single = match &f.body {
            FunctionBody::Expr(e) => Some(e.as_ref()),
            FunctionBody::Block(block) => match block.body.as_slice() {
                [Stmt {
                    kind: StmtKind::Return(Some(e)),
                    ..
                }] => Some(e),
                _ => None,
            },
        };
        if let Some(expr) = single {
            let mut steps = Vec::new();
            let value = self.lower_expr(expr, &mut steps)?;
            if steps.is_empty() {
                return Ok(LambdaBody::Value(value));
            }
            steps.push(json!({ "op": "return", "value": value }));
            return Ok(LambdaBody::Steps(steps));
        }
        match &f.body {
            FunctionBody::Block(block) => Ok(LambdaBody::Steps(self.lower_stmts(&block.body)?)),
            FunctionBody::Expr(_) => Err(CodegenError::Internal("lambda body".into())),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    fn lower_args(&mut self, args: &[Expr], out: &mut Vec<Value>) -> CodegenResult<Vec<Value>> {
        args.iter()
            .map(|arg| match &arg.kind {
                ExprKind::Spread(_) => Err(reject(
                    ErrorCode::UNSUPPORTED_EXPRESSION,
                    "spread arguments are not supported",
                    arg.span,
                    "pass the array itself",
                )),
                _ => self.lower_expr(arg, out),
            })
            .collect()
    }

    /// Lower an expression that must not hoist steps (it may not run).
    fn lower_conditional_operand(&mut self, expr: &Expr) -> CodegenResult<Value> {
        let mut hoisted = Vec::new();
        let value = self.lower_expr(expr, &mut hoisted)?;
        if hoisted.is_empty() {
            Ok(value)
        } else {
            Err(reject(
                ErrorCode::UNSUPPORTED_EXPRESSION,
                "helper and atom calls cannot appear in a conditionally evaluated operand",
                expr.span,
                "compute the value in an if statement first",
            ))
        }
    }

    fn lower_expr(&mut self, expr: &Expr, out: &mut Vec<Value>) -> CodegenResult<Value> {
        let span = expr.span;
        Ok(match &expr.kind {
            ExprKind::Number(n) => literal(number(*n)),
            ExprKind::String(s) => literal(json!(s)),
            ExprKind::Bool(b) => literal(json!(b)),
            ExprKind::Null => literal(Value::Null),
            ExprKind::Ident(name) if name == "undefined" => literal(Value::Null),
            ExprKind::Ident(name) => {
                if let Some(alternative) = denied(name) {
                    return Err(reject(
                        ErrorCode::FORBIDDEN_GLOBAL,
                        format!("'{name}' is not available in the agent subset"),
                        span,
                        alternative,
                    ));
                }
                ident(name)
            }
            ExprKind::Template(t) => {
                let mut parts = Vec::new();
                for (i, quasi) in t.quasis.iter().enumerate() {
                    if !quasi.is_empty() {
                        parts.push(json!(quasi));
                    }
                    if let Some(e) = t.exprs.get(i) {
                        parts.push(self.lower_expr(e, out)?);
                    }
                }
                json!({ "$expr": "template", "parts": parts })
            }
            ExprKind::Array(items) => {
                let elements = self.lower_args(items, out)?;
                json!({ "$expr": "array", "elements": elements })
            }
            ExprKind::Object(props) => {
                let mut properties = Vec::new();
                for prop in props {
                    match prop {
                        ObjectProp::Property {
                            key: PropKey::Named(key),
                            value,
                            ..
                        } => {
                            let value = self.lower_expr(value, out)?;
                            properties.push(json!({ "key": key, "value": value }));
                        }
                        ObjectProp::Property { span, .. } => {
                            return Err(reject(
                                ErrorCode::UNSUPPORTED_EXPRESSION,
                                "computed property keys are not supported",
                                *span,
                                "build the object with Object.fromEntries([[key, value]])",
                            ))
                        }
                        ObjectProp::Spread(e) => {
                            return Err(reject(
                                ErrorCode::UNSUPPORTED_EXPRESSION,
                                "object spread is not supported",
                                e.span,
                                "use Object.assign({}, a, b)",
                            ))
                        }
                    }
                }
                json!({ "$expr": "object", "properties": properties })
            }
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let object = self.lower_expr(object, out)?;
                let mut node = json!({ "$expr": "member", "object": object, "property": property });
                if *optional {
                    node["optional"] = Value::Bool(true);
                }
                node
            }
            ExprKind::Index {
                object,
                index,
                optional,
            } => {
                let object = self.lower_expr(object, out)?;
                let property = self.lower_expr(index, out)?;
                let mut node = json!({ "$expr": "member", "object": object, "property": property, "computed": true });
                if *optional {
                    node["optional"] = Value::Bool(true);
                }
                node
            }
            ExprKind::Call { callee, args, .. } => self.lower_call(expr, callee, args, out)?,
            ExprKind::New { callee, .. } => {
                let alternative = match callee.as_ident() {
                    Some("Date") => "pass timestamps in as inputs or call a time atom",
                    Some("Map") | Some("Set") => "use a plain object or array",
                    Some("Error") | Some("TypeError") | Some("RangeError") => {
                        "return the failure as data, e.g. { error: 'message' }"
                    }
                    _ => "use an object literal",
                };
                return Err(reject(
                    ErrorCode::CONSTRUCTION_NOT_ALLOWED,
                    "object construction with `new` is not allowed",
                    span,
                    alternative,
                ));
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Delete | UnaryOp::Void => {
                    return Err(reject(
                        ErrorCode::UNSUPPORTED_EXPRESSION,
                        format!("`{}` is not supported", op.as_str()),
                        span,
                        "build a new object without the property",
                    ))
                }
                _ => {
                    let argument = self.lower_expr(operand, out)?;
                    json!({ "$expr": "unary", "op": op.as_str(), "argument": argument })
                }
            },
            ExprKind::Binary { op, left, right } => {
                if *op == BinaryOp::InstanceOf {
                    return Err(reject(
                        ErrorCode::UNSUPPORTED_EXPRESSION,
                        "instanceof is not supported",
                        span,
                        "check a discriminating property or typeof",
                    ));
                }
                let left = self.lower_expr(left, out)?;
                let right = self.lower_expr(right, out)?;
                json!({ "$expr": "binary", "op": op.as_str(), "left": left, "right": right })
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.lower_expr(left, out)?;
                let right = self.lower_conditional_operand(right)?;
                json!({ "$expr": "logical", "op": op.as_str(), "left": left, "right": right })
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = self.lower_expr(test, out)?;
                let consequent = self.lower_conditional_operand(consequent)?;
                let alternate = self.lower_conditional_operand(alternate)?;
                json!({ "$expr": "conditional", "test": test, "consequent": consequent, "alternate": alternate })
            }
            ExprKind::Await(inner) | ExprKind::Paren(inner) => self.lower_expr(inner, out)?,
            ExprKind::Assign { .. } | ExprKind::Update { .. } => {
                return Err(reject(
                    ErrorCode::UNSUPPORTED_EXPRESSION,
                    "assignment inside an expression is not supported",
                    span,
                    "move the assignment to its own statement",
                ))
            }
            ExprKind::Function(_) => {
                return Err(reject(
                    ErrorCode::UNSUPPORTED_EXPRESSION,
                    "function values are only allowed as the callback of an array helper",
                    span,
                    "inline the logic, or pass the lambda directly to filter/map/reduce",
                ))
            }
            ExprKind::This => {
                return Err(reject(
                    ErrorCode::UNSUPPORTED_EXPRESSION,
                    "`this` is not available in the agent subset",
                    span,
                    "pass the value in as an input",
                ))
            }
            ExprKind::Regex { .. } => {
                return Err(reject(
                    ErrorCode::UNSUPPORTED_EXPRESSION,
                    "pattern literals are not supported",
                    span,
                    "use includes/startsWith/endsWith or a matching atom",
                ))
            }
            ExprKind::Spread(_) => {
                return Err(reject(
                    ErrorCode::UNSUPPORTED_EXPRESSION,
                    "spread is not supported",
                    span,
                    "use concat or Object.assign",
                ))
            }
            ExprKind::Sequence(_) => {
                return Err(reject(
                    ErrorCode::UNSUPPORTED_EXPRESSION,
                    "comma expressions are not supported",
                    span,
                    "split into separate statements",
                ))
            }
        })
    }

    fn lower_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr], out: &mut Vec<Value>) -> CodegenResult<Value> {
        let t = self.temp();
        if self.try_call_step(expr, Some(&t), out)? {
            return Ok(ident(&t));
        }
        // Not a step: give the temporary back.
        self.temps -= 1;

        match &callee.unparen().kind {
            ExprKind::Ident(name) => {
                // try_call_step handles every non-pure identifier callee.
                let args = self.lower_args(args, out)?;
                Ok(json!({ "$expr": "call", "callee": name, "args": args }))
            }
            ExprKind::Member { object, property, .. } => {
                if let Some(root) = object.as_ident() {
                    if let Some(alternative) = denied(root) {
                        return Err(reject(
                            ErrorCode::FORBIDDEN_GLOBAL,
                            format!("'{root}' is not available in the agent subset"),
                            object.span,
                            alternative,
                        ));
                    }
                    if is_pure_static(root, property) {
                        let args = self.lower_args(args, out)?;
                        return Ok(json!({ "$expr": "call", "callee": format!("{root}.{property}"), "args": args }));
                    }
                    if root == "Math" && property == "random" {
                        return Err(reject(
                            ErrorCode::FORBIDDEN_GLOBAL,
                            "Math.random is not deterministic",
                            callee.span,
                            "call a random-number atom",
                        ));
                    }
                }
                if PURE_METHODS.contains(&property.as_str()) {
                    let object = self.lower_expr(object, out)?;
                    let args = self.lower_args(args, out)?;
                    return Ok(json!({ "$expr": "method", "object": object, "method": property, "args": args }));
                }
                let suggestion = if property == "push" {
                    "call push as its own statement"
                } else {
                    "only pure string/array methods are available; call an atom for anything else"
                };
                Err(reject(
                    ErrorCode::UNSUPPORTED_EXPRESSION,
                    format!("method '{property}' is not available in the agent subset"),
                    callee.span,
                    suggestion,
                ))
            }
            _ => Err(reject(
                ErrorCode::UNSUPPORTED_EXPRESSION,
                "only named atoms, array helpers and pure builtins can be called",
                callee.span,
                "call an atom by name",
            )),
        }
    }
}

fn nested_pattern(span: Span) -> CodegenError {
    reject(
        ErrorCode::UNSUPPORTED_STATEMENT,
        "nested or rest destructuring is not supported",
        span,
        "destructure one level at a time",
    )
}

fn lambda_params(f: &Function) -> CodegenResult<Vec<String>> {
    f.params
        .iter()
        .map(|p| match (p.name(), p.rest, &p.default) {
            (Some(name), false, None) => Ok(name.to_string()),
            _ => Err(reject(
                ErrorCode::UNSUPPORTED_EXPRESSION,
                "helper callbacks take plain named parameters",
                p.span,
                "write (x) => ... or (acc, x) => ...",
            )),
        })
        .collect()
}
