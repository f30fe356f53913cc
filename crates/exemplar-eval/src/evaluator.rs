//! Core expression and statement evaluator.

use crate::builtins;
use crate::env::{AssignError, Environment};
use crate::equality::{loose_equals, strict_equals};
use crate::error::{EvalError, EvalResult};
use crate::value::{
    format_number, ClassValue, Closure, FunctionKind, Object, ObjectRef, RegexValue, Value,
};
use exemplar_types::ast::*;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Default evaluation step budget.
pub const DEFAULT_GAS_LIMIT: u64 = 1_000_000;

/// Maximum nesting of user function calls.
pub const MAX_CALL_DEPTH: u32 = 64;

/// How a statement completed.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
}

/// What a loop does with its body's completion.
enum LoopStep {
    Next,
    Exit(Flow),
}

fn loop_control(flow: Flow, label: Option<&str>) -> LoopStep {
    match flow {
        Flow::Normal | Flow::Continue(None) => LoopStep::Next,
        Flow::Continue(Some(l)) if Some(l.as_str()) == label => LoopStep::Next,
        Flow::Break(None) => LoopStep::Exit(Flow::Normal),
        Flow::Break(Some(l)) if Some(l.as_str()) == label => LoopStep::Exit(Flow::Normal),
        other => LoopStep::Exit(other),
    }
}

/// An assignable location.
enum Reference {
    Binding(String),
    Property(Value, String),
}

/// The tree-walking evaluator: walks AST nodes and produces values.
pub struct Evaluator {
    /// Builtins and runtime helpers. Module scopes are children of it.
    pub globals: Environment,
    gas: u64,
    gas_limit: u64,
    depth: u32,
    /// Captured `console.log` output.
    pub log_output: Vec<String>,
    pub(crate) error_protos: BTreeMap<String, ObjectRef>,
    /// Methods added to builtin types by `__extend`.
    pub(crate) extensions: BTreeMap<String, IndexMap<String, Value>>,
    pub(crate) random_state: u64,
}

impl Evaluator {
    /// Create a new evaluator with the given gas limit.
    pub fn new(gas_limit: u64) -> Self {
        let mut eval = Self {
            globals: Environment::new(),
            gas: 0,
            gas_limit,
            depth: 0,
            log_output: Vec::new(),
            error_protos: BTreeMap::new(),
            extensions: BTreeMap::new(),
            random_state: 0x2545_f491_4f6c_dd1d,
        };
        builtins::install(&mut eval);
        eval
    }

    /// Consume one unit of gas. Returns error if exhausted.
    fn tick(&mut self) -> EvalResult<()> {
        self.gas += 1;
        if self.gas > self.gas_limit {
            Err(EvalError::GasExhausted)
        } else {
            Ok(())
        }
    }

    pub fn gas_used(&self) -> u64 {
        self.gas
    }

    /// Give the next unit of work a fresh budget.
    pub fn reset_gas(&mut self) {
        self.gas = 0;
    }

    // ══════════════════════════════════════════════════════════════════════
    // Programs & statements
    // ══════════════════════════════════════════════════════════════════════

    /// Execute a module body in `env`.
    pub fn run_program(&mut self, program: &Program, env: &Environment) -> EvalResult<()> {
        match self.exec_stmts(&program.body, env)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(EvalError::Syntax("Illegal return statement".into())),
            Flow::Break(_) | Flow::Continue(_) => {
                Err(EvalError::Syntax("Illegal break or continue statement".into()))
            }
        }
    }

    /// Execute statements in `env`, hoisting function declarations first.
    pub fn exec_stmts(&mut self, stmts: &[Stmt], env: &Environment) -> EvalResult<Flow> {
        self.hoist(stmts, env);
        for stmt in stmts {
            let flow = self.exec_stmt(stmt, env)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn hoist(&mut self, stmts: &[Stmt], env: &Environment) {
        for stmt in stmts {
            let func = match &stmt.kind {
                StmtKind::Function(f) => f,
                StmtKind::Export(ExportDecl::Decl(inner)) => match &inner.kind {
                    StmtKind::Function(f) => f,
                    _ => continue,
                },
                _ => continue,
            };
            if let Some(name) = func.name() {
                let closure = self.make_closure(func, env, name);
                env.define(name, closure);
            }
        }
    }

    fn exec_block(&mut self, block: &Block, env: &Environment) -> EvalResult<Flow> {
        self.exec_stmts(&block.body, &env.child())
    }

    /// Execute a single statement.
    pub fn exec_stmt(&mut self, stmt: &Stmt, env: &Environment) -> EvalResult<Flow> {
        self.exec_labeled(stmt, env, None)
    }

    fn exec_labeled(&mut self, stmt: &Stmt, env: &Environment, label: Option<&str>) -> EvalResult<Flow> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Var(decl) => {
                self.exec_var(decl, env)?;
                Ok(Flow::Normal)
            }
            StmtKind::Function(_) | StmtKind::Empty => Ok(Flow::Normal),
            StmtKind::Class(decl) => {
                let class = self.eval_class(decl, env)?;
                env.define(&decl.name.name, class);
                Ok(Flow::Normal)
            }
            StmtKind::Expr(expr) => {
                self.eval_expr(expr, env)?;
                Ok(Flow::Normal)
            }
            StmtKind::Block(block) => self.exec_block(block, env),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_expr(test, env)?.is_truthy() {
                    self.exec_stmt(consequent, env)
                } else if let Some(alt) = alternate {
                    self.exec_stmt(alt, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { test, body } => {
                while self.eval_expr(test, env)?.is_truthy() {
                    self.tick()?;
                    if let LoopStep::Exit(flow) = loop_control(self.exec_stmt(body, env)?, label) {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::DoWhile { body, test } => {
                loop {
                    self.tick()?;
                    if let LoopStep::Exit(flow) = loop_control(self.exec_stmt(body, env)?, label) {
                        return Ok(flow);
                    }
                    if !self.eval_expr(test, env)?.is_truthy() {
                        return Ok(Flow::Normal);
                    }
                }
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_ref(), test.as_ref(), update.as_ref(), body, env, label),
            StmtKind::ForOf {
                head,
                iterable,
                body,
            } => {
                let iterable = self.eval_expr(iterable, env)?;
                let items = self.iterate(&iterable)?;
                self.exec_for_each(head, items, body, env, label)
            }
            StmtKind::ForIn { head, object, body } => {
                let object = self.eval_expr(object, env)?;
                let keys = builtins::own_keys(&object)
                    .into_iter()
                    .map(Value::string)
                    .collect();
                self.exec_for_each(head, keys, body, env, label)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Break(l) => Ok(Flow::Break(l.as_ref().map(|l| l.name.clone()))),
            StmtKind::Continue(l) => Ok(Flow::Continue(l.as_ref().map(|l| l.name.clone()))),
            StmtKind::Throw(expr) => {
                let value = self.eval_expr(expr, env)?;
                Err(EvalError::Thrown(value))
            }
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => {
                let mut result = self.exec_block(block, env);
                if let Some(handler) = handler {
                    let caught = match &result {
                        Err(err) if err.is_catchable() => Some(self.error_value(err)),
                        _ => None,
                    };
                    if let Some(caught) = caught {
                        let scope = env.child();
                        if let Some(param) = &handler.param {
                            self.bind_pattern(param, caught, &scope, false)?;
                        }
                        result = self.exec_stmts(&handler.body.body, &scope);
                    }
                }
                if let Some(finalizer) = finalizer {
                    let flow = self.exec_block(finalizer, env)?;
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
                result
            }
            StmtKind::Switch {
                discriminant,
                cases,
            } => self.exec_switch(discriminant, cases, env, label),
            StmtKind::Labeled { label, body } => {
                match self.exec_labeled(body, env, Some(&label.name))? {
                    Flow::Break(Some(l)) if l == label.name => Ok(Flow::Normal),
                    flow => Ok(flow),
                }
            }
            StmtKind::Import(decl) => {
                self.exec_import(decl, env);
                Ok(Flow::Normal)
            }
            StmtKind::Export(export) => match export {
                ExportDecl::Decl(inner) => self.exec_stmt(inner, env),
                ExportDecl::Default(expr) => {
                    let value = self.eval_expr(expr, env)?;
                    env.define("default", value);
                    Ok(Flow::Normal)
                }
                ExportDecl::Named(_) => Ok(Flow::Normal),
            },
            StmtKind::Unsafe(block) => match self.exec_block(block, env) {
                Err(err) if err.is_catchable() => Ok(Flow::Return(unsafe_error(&err))),
                other => other,
            },
        }
    }

    fn exec_var(&mut self, decl: &VarDecl, env: &Environment) -> EvalResult<()> {
        for d in &decl.declarations {
            let value = match &d.init {
                Some(init) => self.eval_named(init, env, d.target.as_ident())?,
                None => Value::Undefined,
            };
            self.bind_pattern(&d.target, value, env, decl.kind == VarKind::Const)?;
        }
        Ok(())
    }

    fn exec_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        env: &Environment,
        label: Option<&str>,
    ) -> EvalResult<Flow> {
        let scope = env.child();
        match init {
            Some(ForInit::Var(decl)) => self.exec_var(decl, &scope)?,
            Some(ForInit::Expr(expr)) => {
                self.eval_expr(expr, &scope)?;
            }
            None => {}
        }
        loop {
            self.tick()?;
            if let Some(test) = test {
                if !self.eval_expr(test, &scope)?.is_truthy() {
                    return Ok(Flow::Normal);
                }
            }
            if let LoopStep::Exit(flow) = loop_control(self.exec_stmt(body, &scope)?, label) {
                return Ok(flow);
            }
            if let Some(update) = update {
                self.eval_expr(update, &scope)?;
            }
        }
    }

    fn exec_for_each(
        &mut self,
        head: &ForHead,
        items: Vec<Value>,
        body: &Stmt,
        env: &Environment,
        label: Option<&str>,
    ) -> EvalResult<Flow> {
        for item in items {
            self.tick()?;
            let scope = env.child();
            match head.kind {
                Some(kind) => self.bind_pattern(&head.target, item, &scope, kind == VarKind::Const)?,
                None => match &head.target {
                    Pattern::Ident(id) => self.write_binding(&id.name, item, env)?,
                    other => self.bind_pattern(other, item, &scope, false)?,
                },
            }
            if let LoopStep::Exit(flow) = loop_control(self.exec_stmt(body, &scope)?, label) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_switch(
        &mut self,
        discriminant: &Expr,
        cases: &[SwitchCase],
        env: &Environment,
        label: Option<&str>,
    ) -> EvalResult<Flow> {
        let value = self.eval_expr(discriminant, env)?;
        let scope = env.child();
        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let candidate = self.eval_expr(test, &scope)?;
                if strict_equals(&value, &candidate) {
                    start = Some(i);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));
        let Some(start) = start else {
            return Ok(Flow::Normal);
        };
        for case in &cases[start..] {
            match self.exec_stmts(&case.body, &scope)? {
                Flow::Normal => {}
                Flow::Break(None) => return Ok(Flow::Normal),
                Flow::Break(Some(l)) if Some(l.as_str()) == label => return Ok(Flow::Normal),
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    /// Bind every imported name to a placeholder that fails when used.
    fn exec_import(&mut self, decl: &ImportDecl, env: &Environment) {
        let mut locals: Vec<&Ident> = decl.named.iter().map(|(_, local)| local).collect();
        locals.extend(decl.default.iter());
        locals.extend(decl.namespace.iter());
        for local in locals {
            let placeholder = Value::function(
                local.name.clone(),
                FunctionKind::Unresolved {
                    module: decl.source.clone(),
                },
            );
            env.define_const(&local.name, placeholder);
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Patterns & assignment
    // ══════════════════════════════════════════════════════════════════════

    /// Bind a pattern to a value by defining new variables in `env`.
    pub fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        env: &Environment,
        constant: bool,
    ) -> EvalResult<()> {
        match pattern {
            Pattern::Ident(id) => {
                if constant {
                    env.define_const(&id.name, value);
                } else {
                    env.define(&id.name, value);
                }
                Ok(())
            }
            Pattern::Object { props, rest, .. } => {
                if value.is_nullish() {
                    return Err(EvalError::Type(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.to_display_string(),
                        value.to_display_string()
                    )));
                }
                for prop in props {
                    let mut item = self.get_property(&value, &prop.key)?;
                    if matches!(item, Value::Undefined) {
                        if let Some(default) = &prop.default {
                            item = self.eval_named(default, env, prop.value.as_ident())?;
                        }
                    }
                    self.bind_pattern(&prop.value, item, env, constant)?;
                }
                if let Some(rest) = rest {
                    let taken: Vec<&str> = props.iter().map(|p| p.key.as_str()).collect();
                    let remaining: IndexMap<String, Value> = builtins::own_entries(&value)
                        .into_iter()
                        .filter(|(k, _)| !taken.contains(&k.as_str()))
                        .collect();
                    self.bind_pattern(&Pattern::Ident(rest.clone()), Value::object(remaining), env, constant)?;
                }
                Ok(())
            }
            Pattern::Array { elements, rest, .. } => {
                let items = self.iterate(&value)?;
                for (i, elem) in elements.iter().enumerate() {
                    let Some(elem) = elem else { continue };
                    let mut item = items.get(i).cloned().unwrap_or(Value::Undefined);
                    if matches!(item, Value::Undefined) {
                        if let Some(default) = &elem.default {
                            item = self.eval_expr(default, env)?;
                        }
                    }
                    self.bind_pattern(&elem.target, item, env, constant)?;
                }
                if let Some(rest) = rest {
                    let tail = items.get(elements.len()..).unwrap_or_default().to_vec();
                    self.bind_pattern(rest, Value::array(tail), env, constant)?;
                }
                Ok(())
            }
        }
    }

    fn reference(&mut self, target: &Expr, env: &Environment) -> EvalResult<Reference> {
        match &target.kind {
            ExprKind::Ident(name) => Ok(Reference::Binding(name.clone())),
            ExprKind::Member {
                object, property, ..
            } => {
                let object = self.eval_expr(object, env)?;
                Ok(Reference::Property(object, property.clone()))
            }
            ExprKind::Index { object, index, .. } => {
                let object = self.eval_expr(object, env)?;
                let key = self.eval_expr(index, env)?;
                Ok(Reference::Property(object, property_key(&key)))
            }
            ExprKind::Paren(inner) => self.reference(inner, env),
            _ => Err(EvalError::Syntax("Invalid assignment target".into())),
        }
    }

    fn read_ref(&mut self, reference: &Reference, env: &Environment) -> EvalResult<Value> {
        match reference {
            Reference::Binding(name) => self.lookup(name, env),
            Reference::Property(object, key) => self.get_property(object, key),
        }
    }

    fn write_ref(&mut self, reference: &Reference, value: Value, env: &Environment) -> EvalResult<()> {
        match reference {
            Reference::Binding(name) => self.write_binding(name, value, env),
            Reference::Property(object, key) => self.set_property(object, key, value),
        }
    }

    fn write_binding(&mut self, name: &str, value: Value, env: &Environment) -> EvalResult<()> {
        match env.set(name, value) {
            Ok(()) => Ok(()),
            Err(AssignError::Constant) => {
                Err(EvalError::Type("Assignment to constant variable.".into()))
            }
            Err(AssignError::Undeclared) => Err(EvalError::Reference(name.to_string())),
        }
    }

    /// Destructuring assignment: `[a, b] = [b, a]`, `({ x } = point)`.
    fn assign_to(&mut self, target: &Expr, value: Value, env: &Environment) -> EvalResult<()> {
        match &target.kind {
            ExprKind::Array(elements) => {
                let items = self.iterate(&value)?;
                for (i, elem) in elements.iter().enumerate() {
                    if let ExprKind::Spread(inner) = &elem.kind {
                        let tail = items.get(i..).unwrap_or_default().to_vec();
                        return self.assign_to(inner, Value::array(tail), env);
                    }
                    if elem.as_ident() == Some("undefined") {
                        continue;
                    }
                    let item = items.get(i).cloned().unwrap_or(Value::Undefined);
                    self.assign_to(elem, item, env)?;
                }
                Ok(())
            }
            ExprKind::Object(props) => {
                for prop in props {
                    let ObjectProp::Property { key, value: sub, .. } = prop else {
                        return Err(EvalError::Syntax("rest in assignment pattern".into()));
                    };
                    let key = match key {
                        PropKey::Named(name) => name.clone(),
                        PropKey::Computed(expr) => property_key(&self.eval_expr(expr, env)?),
                    };
                    let item = self.get_property(&value, &key)?;
                    self.assign_to(sub, item, env)?;
                }
                Ok(())
            }
            ExprKind::Assign {
                op: AssignOp::Assign,
                target,
                value: default,
            } => {
                let item = if matches!(value, Value::Undefined) {
                    self.eval_expr(default, env)?
                } else {
                    value
                };
                self.assign_to(target, item, env)
            }
            _ => {
                let reference = self.reference(target, env)?;
                self.write_ref(&reference, value, env)
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate an expression to a value.
    pub fn eval_expr(&mut self, expr: &Expr, env: &Environment) -> EvalResult<Value> {
        self.tick()?;
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::String(s) => Ok(Value::string(s)),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Template(template) => self.eval_template(template, env),
            ExprKind::Regex { pattern, flags } => make_regex(pattern, flags),
            ExprKind::Ident(name) => self.lookup(name, env),
            ExprKind::This => Ok(env.get("this").unwrap_or(Value::Undefined)),
            ExprKind::Array(elements) => {
                let items = self.eval_list(elements, env)?;
                Ok(Value::array(items))
            }
            ExprKind::Object(props) => self.eval_object(props, env),
            ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Call { .. } => {
                Ok(self.eval_chain(expr, env)?.unwrap_or(Value::Undefined))
            }
            ExprKind::New { callee, args } => {
                let callee = self.eval_expr(callee, env)?;
                let args = self.eval_list(args, env)?;
                self.construct(&callee, args)
            }
            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand, env),
            ExprKind::Update { op, prefix, target } => {
                let reference = self.reference(target, env)?;
                let old = self.read_ref(&reference, env)?.to_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.write_ref(&reference, Value::Number(new), env)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                self.binary_op(*op, &l, &r)
            }
            ExprKind::Logical { op, left, right } => {
                let l = self.eval_expr(left, env)?;
                let short = match op {
                    LogicalOp::And => !l.is_truthy(),
                    LogicalOp::Or => l.is_truthy(),
                    LogicalOp::Nullish => !l.is_nullish(),
                };
                if short {
                    Ok(l)
                } else {
                    self.eval_expr(right, env)
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_expr(test, env)?.is_truthy() {
                    self.eval_expr(consequent, env)
                } else {
                    self.eval_expr(alternate, env)
                }
            }
            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value, env),
            ExprKind::Function(func) => {
                let name = func.name().unwrap_or("");
                if !func.is_arrow && func.name.is_some() {
                    let scope = env.child();
                    let closure = self.make_closure(func, &scope, name);
                    scope.define(name, closure.clone());
                    Ok(closure)
                } else {
                    Ok(self.make_closure(func, env, name))
                }
            }
            ExprKind::Spread(_) => Err(EvalError::Syntax("Unexpected spread".into())),
            ExprKind::Await(inner) | ExprKind::Paren(inner) => self.eval_expr(inner, env),
            ExprKind::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for e in exprs {
                    last = self.eval_expr(e, env)?;
                }
                Ok(last)
            }
        }
    }

    /// Evaluate, giving an anonymous function the binding's name.
    fn eval_named(&mut self, expr: &Expr, env: &Environment, name: Option<&str>) -> EvalResult<Value> {
        match (&expr.kind, name) {
            (ExprKind::Function(func), Some(name)) if func.name.is_none() => {
                Ok(self.make_closure(func, env, name))
            }
            _ => self.eval_expr(expr, env),
        }
    }

    fn lookup(&mut self, name: &str, env: &Environment) -> EvalResult<Value> {
        match env.get(name) {
            Some(value) => Ok(value),
            None if name == "undefined" => Ok(Value::Undefined),
            None => Err(EvalError::Reference(name.to_string())),
        }
    }

    fn eval_template(&mut self, template: &Template, env: &Environment) -> EvalResult<Value> {
        let mut out = String::new();
        for (i, quasi) in template.quasis.iter().enumerate() {
            out.push_str(quasi);
            if let Some(expr) = template.exprs.get(i) {
                out.push_str(&self.eval_expr(expr, env)?.to_display_string());
            }
        }
        Ok(Value::string(out))
    }

    /// Evaluate a list of elements or arguments, expanding spreads.
    fn eval_list(&mut self, exprs: &[Expr], env: &Environment) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            match &expr.kind {
                ExprKind::Spread(inner) => {
                    let value = self.eval_expr(inner, env)?;
                    out.extend(self.iterate(&value)?);
                }
                _ => out.push(self.eval_expr(expr, env)?),
            }
        }
        Ok(out)
    }

    fn eval_object(&mut self, props: &[ObjectProp], env: &Environment) -> EvalResult<Value> {
        let mut map = IndexMap::new();
        for prop in props {
            match prop {
                ObjectProp::Property { key, value, .. } => {
                    let key = match key {
                        PropKey::Named(name) => name.clone(),
                        PropKey::Computed(expr) => property_key(&self.eval_expr(expr, env)?),
                    };
                    let value = self.eval_named(value, env, Some(&key))?;
                    map.insert(key, value);
                }
                ObjectProp::Spread(expr) => {
                    let value = self.eval_expr(expr, env)?;
                    map.extend(builtins::own_entries(&value));
                }
            }
        }
        Ok(Value::object(map))
    }

    /// Member, index and call chains. `None` means an optional link
    /// short-circuited the rest of the chain.
    fn eval_chain(&mut self, expr: &Expr, env: &Environment) -> EvalResult<Option<Value>> {
        match &expr.kind {
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                if object.as_ident() == Some("super") {
                    return self.super_property(env, property).map(Some);
                }
                let Some(target) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                self.get_property(&target, property).map(Some)
            }
            ExprKind::Index {
                object,
                index,
                optional,
            } => {
                let Some(target) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.eval_expr(index, env)?;
                self.get_property(&target, &property_key(&key)).map(Some)
            }
            ExprKind::Call {
                callee,
                args,
                optional,
            } => self.eval_call(callee, args, *optional, env),
            _ => self.eval_expr(expr, env).map(Some),
        }
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        optional: bool,
        env: &Environment,
    ) -> EvalResult<Option<Value>> {
        if callee.as_ident() == Some("super") {
            let args = self.eval_list(args, env)?;
            self.call_super(env, args)?;
            return Ok(Some(Value::Undefined));
        }
        let (func, this) = match &callee.kind {
            ExprKind::Member {
                object,
                property,
                optional: link_optional,
            } => {
                if object.as_ident() == Some("super") {
                    let this = env.get("this").unwrap_or(Value::Undefined);
                    (self.super_property(env, property)?, this)
                } else {
                    let Some(target) = self.eval_chain(object, env)? else {
                        return Ok(None);
                    };
                    if *link_optional && target.is_nullish() {
                        return Ok(None);
                    }
                    (self.get_property(&target, property)?, target)
                }
            }
            ExprKind::Index {
                object,
                index,
                optional: link_optional,
            } => {
                let Some(target) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *link_optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.eval_expr(index, env)?;
                (self.get_property(&target, &property_key(&key))?, target)
            }
            _ => match self.eval_chain(callee, env)? {
                Some(func) => (func, Value::Undefined),
                None => return Ok(None),
            },
        };
        if optional && func.is_nullish() {
            return Ok(None);
        }
        if !matches!(func, Value::Function(_)) {
            return Err(EvalError::Type(format!("{} is not a function", expr_label(callee))));
        }
        let args = self.eval_list(args, env)?;
        self.call_function(&func, this, args).map(Some)
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, env: &Environment) -> EvalResult<Value> {
        match op {
            UnaryOp::Typeof => {
                if let ExprKind::Ident(name) = &operand.kind {
                    if env.get(name).is_none() {
                        return Ok(Value::string("undefined"));
                    }
                }
                let value = self.eval_expr(operand, env)?;
                Ok(Value::string(value.type_of()))
            }
            UnaryOp::Delete => match &operand.unparen().kind {
                ExprKind::Member {
                    object, property, ..
                } => {
                    let target = self.eval_expr(object, env)?;
                    Ok(Value::Bool(delete_property(&target, property)))
                }
                ExprKind::Index { object, index, .. } => {
                    let target = self.eval_expr(object, env)?;
                    let key = self.eval_expr(index, env)?;
                    Ok(Value::Bool(delete_property(&target, &property_key(&key))))
                }
                _ => Ok(Value::Bool(true)),
            },
            _ => {
                let value = self.eval_expr(operand, env)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::BitNot => Value::Number(f64::from(!to_int32(value.to_number()))),
                    _ => Value::Undefined,
                })
            }
        }
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        env: &Environment,
    ) -> EvalResult<Value> {
        match op {
            AssignOp::Assign => {
                if matches!(target.kind, ExprKind::Array(_) | ExprKind::Object(_)) {
                    let value = self.eval_expr(value, env)?;
                    self.assign_to(target, value.clone(), env)?;
                    return Ok(value);
                }
                let reference = self.reference(target, env)?;
                let value = self.eval_named(value, env, target.as_ident())?;
                self.write_ref(&reference, value.clone(), env)?;
                Ok(value)
            }
            AssignOp::And | AssignOp::Or | AssignOp::Nullish => {
                let reference = self.reference(target, env)?;
                let current = self.read_ref(&reference, env)?;
                let proceed = match op {
                    AssignOp::And => current.is_truthy(),
                    AssignOp::Or => !current.is_truthy(),
                    _ => current.is_nullish(),
                };
                if !proceed {
                    return Ok(current);
                }
                let value = self.eval_expr(value, env)?;
                self.write_ref(&reference, value.clone(), env)?;
                Ok(value)
            }
            _ => {
                let Some(bin) = op.binary() else {
                    return Err(EvalError::Syntax(format!("unsupported operator {}", op.as_str())));
                };
                let reference = self.reference(target, env)?;
                let current = self.read_ref(&reference, env)?;
                let rhs = self.eval_expr(value, env)?;
                let result = self.binary_op(bin, &current, &rhs)?;
                self.write_ref(&reference, result.clone(), env)?;
                Ok(result)
            }
        }
    }

    /// Apply a binary operator to two evaluated operands.
    pub fn binary_op(&mut self, op: BinaryOp, l: &Value, r: &Value) -> EvalResult<Value> {
        let num = |v: f64| Ok(Value::Number(v));
        match op {
            BinaryOp::Add => {
                if is_stringy(l) || is_stringy(r) {
                    let mut s = l.to_display_string();
                    s.push_str(&r.to_display_string());
                    Ok(Value::string(s))
                } else {
                    num(l.to_number() + r.to_number())
                }
            }
            BinaryOp::Sub => num(l.to_number() - r.to_number()),
            BinaryOp::Mul => num(l.to_number() * r.to_number()),
            BinaryOp::Div => num(l.to_number() / r.to_number()),
            BinaryOp::Mod => num(l.to_number() % r.to_number()),
            BinaryOp::Exp => num(l.to_number().powf(r.to_number())),
            BinaryOp::Eq => Ok(Value::Bool(loose_equals(l, r))),
            BinaryOp::NotEq => Ok(Value::Bool(!loose_equals(l, r))),
            BinaryOp::StrictEq => Ok(Value::Bool(strict_equals(l, r))),
            BinaryOp::StrictNotEq => Ok(Value::Bool(!strict_equals(l, r))),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                let ord = match (l, r) {
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    _ => l.to_number().partial_cmp(&r.to_number()),
                };
                let Some(ord) = ord else {
                    return Ok(Value::Bool(false));
                };
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::LtEq => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                }))
            }
            BinaryOp::In => {
                let key = property_key(l);
                match r {
                    Value::Object(_) | Value::Array(_) | Value::Function(_) => {
                        Ok(Value::Bool(self.has_property(r, &key)))
                    }
                    _ => Err(EvalError::Type(format!(
                        "Cannot use 'in' operator to search for '{key}' in {}",
                        r.to_display_string()
                    ))),
                }
            }
            BinaryOp::InstanceOf => Ok(Value::Bool(self.instance_of(l, r)?)),
            BinaryOp::BitAnd => num(f64::from(to_int32(l.to_number()) & to_int32(r.to_number()))),
            BinaryOp::BitOr => num(f64::from(to_int32(l.to_number()) | to_int32(r.to_number()))),
            BinaryOp::BitXor => num(f64::from(to_int32(l.to_number()) ^ to_int32(r.to_number()))),
            BinaryOp::Shl => num(f64::from(
                to_int32(l.to_number()).wrapping_shl(to_int32(r.to_number()) as u32 & 31),
            )),
            BinaryOp::Shr => num(f64::from(
                to_int32(l.to_number()).wrapping_shr(to_int32(r.to_number()) as u32 & 31),
            )),
            BinaryOp::UShr => num(f64::from(
                (to_int32(l.to_number()) as u32).wrapping_shr(to_int32(r.to_number()) as u32 & 31),
            )),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Functions & classes
    // ══════════════════════════════════════════════════════════════════════

    fn make_closure(&self, func: &Function, env: &Environment, name: &str) -> Value {
        let value = Value::function(
            name,
            FunctionKind::Closure(Closure {
                func: Rc::new(func.clone()),
                env: env.clone(),
                parent: None,
                class: None,
            }),
        );
        if !func.is_arrow {
            if let Value::Function(f) = &value {
                let proto = Value::object_with_proto(None);
                proto_set(&proto, "constructor", value.clone());
                f.props.borrow_mut().insert("prototype".into(), proto);
            }
        }
        value
    }

    /// Call a function value with an explicit `this` and arguments.
    pub fn call_function(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        self.tick()?;
        let Value::Function(func) = callee else {
            return Err(EvalError::Type(format!("{} is not a function", callee.inspect())));
        };
        match &func.kind {
            FunctionKind::Native { f, bound } => {
                let f = *f;
                let this = bound.clone().unwrap_or(this);
                f(self, &this, &args)
            }
            FunctionKind::Closure(closure) => self.invoke(closure, this, args),
            FunctionKind::Class(_) => Err(EvalError::Type(format!(
                "Class constructor {} cannot be invoked without 'new'",
                func.name
            ))),
            FunctionKind::OverloadedClass { dispatch, .. } => {
                let dispatch = dispatch.clone();
                self.call_function(&dispatch, Value::Undefined, args)
            }
            FunctionKind::Unresolved { module } => Err(EvalError::UnresolvedImport(format!(
                "'{}' from '{module}'",
                func.name
            ))),
        }
    }

    fn invoke(&mut self, closure: &Closure, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::Range("Maximum call stack size exceeded".into()));
        }
        self.depth += 1;
        let result = self.invoke_inner(closure, this, args);
        self.depth -= 1;
        result
    }

    fn invoke_inner(&mut self, closure: &Closure, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        let func = Rc::clone(&closure.func);
        let scope = closure.env.child();
        if !func.is_arrow {
            scope.define("this", this);
            scope.define("arguments", Value::array(args.clone()));
            if let Some(parent) = &closure.parent {
                scope.define_const("super", parent.clone());
            }
            if let Some(class) = &closure.class {
                scope.define_const("%class", class.clone());
            }
        }
        self.bind_params(&func.params, args, &scope)?;
        match &func.body {
            FunctionBody::Block(block) => match self.exec_stmts(&block.body, &scope)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
            FunctionBody::Expr(expr) => self.eval_expr(expr, &scope),
        }
    }

    fn bind_params(&mut self, params: &[Param], args: Vec<Value>, scope: &Environment) -> EvalResult<()> {
        let mut args = args.into_iter();
        for param in params {
            if param.rest {
                let rest: Vec<Value> = args.by_ref().collect();
                self.bind_pattern(&param.target, Value::array(rest), scope, false)?;
                continue;
            }
            let mut value = args.next().unwrap_or(Value::Undefined);
            if matches!(value, Value::Undefined) {
                if let Some(default) = &param.default {
                    value = self.eval_named(default, scope, param.name())?;
                }
            }
            self.bind_pattern(&param.target, value, scope, false)?;
        }
        Ok(())
    }

    /// `new callee(...args)`
    pub fn construct(&mut self, callee: &Value, args: Vec<Value>) -> EvalResult<Value> {
        self.tick()?;
        let Value::Function(func) = callee else {
            return Err(EvalError::Type(format!("{} is not a constructor", callee.inspect())));
        };
        match &func.kind {
            FunctionKind::Class(_) => {
                let this = Value::object_with_proto(self.prototype_of(callee));
                self.init_instance(callee, &this, args)?;
                Ok(this)
            }
            FunctionKind::Closure(closure) if !closure.func.is_arrow => {
                let this = Value::object_with_proto(self.prototype_of(callee));
                let result = self.invoke(closure, this.clone(), args)?;
                Ok(match result {
                    Value::Object(_) | Value::Array(_) => result,
                    _ => this,
                })
            }
            FunctionKind::Native { f, bound } => {
                let f = *f;
                let this = bound.clone().unwrap_or(Value::Undefined);
                f(self, &this, &args)
            }
            FunctionKind::OverloadedClass { dispatch, .. } => {
                let dispatch = dispatch.clone();
                self.call_function(&dispatch, Value::Undefined, args)
            }
            FunctionKind::Unresolved { module } => Err(EvalError::UnresolvedImport(format!(
                "'{}' from '{module}'",
                func.name
            ))),
            FunctionKind::Closure(_) => {
                Err(EvalError::Type(format!("{} is not a constructor", func.name)))
            }
        }
    }

    /// The `prototype` object of a constructor.
    pub fn prototype_of(&self, ctor: &Value) -> Option<ObjectRef> {
        let Value::Function(func) = ctor else {
            return None;
        };
        if let FunctionKind::OverloadedClass { class, .. } = &func.kind {
            return self.prototype_of(class);
        }
        match func.props.borrow().get("prototype") {
            Some(Value::Object(proto)) => Some(Rc::clone(proto)),
            _ => None,
        }
    }

    fn eval_class(&mut self, decl: &ClassDecl, env: &Environment) -> EvalResult<Value> {
        let parent = match &decl.superclass {
            Some(expr) => {
                let parent = self.eval_expr(expr, env)?;
                if !matches!(parent, Value::Function(_)) {
                    return Err(EvalError::Type(format!(
                        "Class extends value {} is not a constructor",
                        parent.inspect()
                    )));
                }
                Some(parent)
            }
            None => None,
        };
        let proto = Rc::new(RefCell::new(Object::with_proto(
            parent.as_ref().and_then(|p| self.prototype_of(p)),
        )));
        let scope = env.child();
        let decl = Rc::new(decl.clone());
        let class = Value::function(
            decl.name.name.clone(),
            FunctionKind::Class(ClassValue {
                decl: Rc::clone(&decl),
                env: scope.clone(),
                parent: parent.clone(),
            }),
        );
        scope.define_const(&decl.name.name, class.clone());
        let Value::Function(class_fn) = &class else {
            return Ok(class);
        };
        class_fn
            .props
            .borrow_mut()
            .insert("prototype".into(), Value::Object(Rc::clone(&proto)));
        proto.borrow_mut().props.insert("constructor".into(), class.clone());

        for member in &decl.members {
            let method = |f: &Function| {
                Value::function(
                    member.key.clone(),
                    FunctionKind::Closure(Closure {
                        func: Rc::new(f.clone()),
                        env: scope.clone(),
                        parent: parent.clone(),
                        class: Some(class.clone()),
                    }),
                )
            };
            match &member.kind {
                ClassMemberKind::Constructor(_) => {}
                ClassMemberKind::Method(f) => {
                    let value = method(f);
                    if member.is_static {
                        class_fn.props.borrow_mut().insert(member.key.clone(), value);
                    } else {
                        proto.borrow_mut().props.insert(member.key.clone(), value);
                    }
                }
                ClassMemberKind::Getter(f) => {
                    let value = method(f);
                    proto.borrow_mut().getters.insert(member.key.clone(), value);
                }
                ClassMemberKind::Setter(f) => {
                    let value = method(f);
                    proto.borrow_mut().setters.insert(member.key.clone(), value);
                }
                ClassMemberKind::Field(init) if member.is_static => {
                    let field_scope = scope.child();
                    field_scope.define("this", class.clone());
                    let value = match init {
                        Some(expr) => self.eval_expr(expr, &field_scope)?,
                        None => Value::Undefined,
                    };
                    class_fn.props.borrow_mut().insert(member.key.clone(), value);
                }
                ClassMemberKind::Field(_) => {}
            }
        }
        Ok(class)
    }

    /// Run the constructor chain of `class` against a fresh `this`.
    fn init_instance(&mut self, class: &Value, this: &Value, args: Vec<Value>) -> EvalResult<()> {
        let Value::Function(func) = class else {
            return Ok(());
        };
        match &func.kind {
            FunctionKind::Class(cv) => {
                let parent = cv.parent.clone();
                let ctor = cv.decl.constructors().next().cloned();
                let env = cv.env.clone();
                match ctor {
                    Some(ctor) => {
                        if parent.is_none() {
                            self.init_fields(class, this)?;
                        }
                        let closure = Closure {
                            func: Rc::new(ctor),
                            env,
                            parent,
                            class: Some(class.clone()),
                        };
                        self.invoke(&closure, this.clone(), args)?;
                    }
                    None => {
                        if let Some(parent) = &parent {
                            self.init_instance(parent, this, args)?;
                        }
                        self.init_fields(class, this)?;
                    }
                }
                Ok(())
            }
            FunctionKind::Closure(closure) => {
                self.invoke(closure, this.clone(), args)?;
                Ok(())
            }
            FunctionKind::Native { f, bound } => {
                // Builtin bases (errors) build their own object; adopt its fields.
                let f = *f;
                let receiver = bound.clone().unwrap_or(Value::Undefined);
                let built = f(self, &receiver, &args)?;
                for (key, value) in builtins::own_entries(&built) {
                    self.set_property(this, &key, value)?;
                }
                Ok(())
            }
            _ => Err(EvalError::Type(format!("{} is not a constructor", func.name))),
        }
    }

    fn init_fields(&mut self, class: &Value, this: &Value) -> EvalResult<()> {
        let Value::Function(func) = class else {
            return Ok(());
        };
        let FunctionKind::Class(cv) = &func.kind else {
            return Ok(());
        };
        let decl = Rc::clone(&cv.decl);
        let scope = cv.env.child();
        scope.define("this", this.clone());
        for member in &decl.members {
            if let (ClassMemberKind::Field(init), false) = (&member.kind, member.is_static) {
                let value = match init {
                    Some(expr) => self.eval_expr(expr, &scope)?,
                    None => Value::Undefined,
                };
                self.set_property(this, &member.key, value)?;
            }
        }
        Ok(())
    }

    fn call_super(&mut self, env: &Environment, args: Vec<Value>) -> EvalResult<()> {
        let parent = env
            .get("super")
            .ok_or_else(|| EvalError::Syntax("'super' keyword unexpected here".into()))?;
        let this = env.get("this").unwrap_or(Value::Undefined);
        self.init_instance(&parent, &this, args)?;
        if let Some(class) = env.get("%class") {
            self.init_fields(&class, &this)?;
        }
        Ok(())
    }

    fn super_property(&mut self, env: &Environment, key: &str) -> EvalResult<Value> {
        let parent = env
            .get("super")
            .ok_or_else(|| EvalError::Syntax("'super' keyword unexpected here".into()))?;
        let this = env.get("this").unwrap_or(Value::Undefined);
        match self.prototype_of(&parent) {
            Some(proto) => self.lookup_in_chain(Some(proto), key, &this),
            None => Ok(Value::Undefined),
        }
    }

    fn instance_of(&mut self, value: &Value, ctor: &Value) -> EvalResult<bool> {
        let Value::Function(func) = ctor else {
            return Err(EvalError::Type("Right-hand side of 'instanceof' is not callable".into()));
        };
        if let FunctionKind::Native { .. } = func.kind {
            match func.name.as_str() {
                "Array" => return Ok(matches!(value, Value::Array(_))),
                "Object" => {
                    return Ok(matches!(
                        value,
                        Value::Object(_) | Value::Array(_) | Value::Function(_) | Value::Regex(_)
                    ))
                }
                "Function" => return Ok(matches!(value, Value::Function(_))),
                "RegExp" => return Ok(matches!(value, Value::Regex(_))),
                _ => {}
            }
        }
        let Some(proto) = self.prototype_of(ctor) else {
            return Ok(false);
        };
        let mut current = match value {
            Value::Object(obj) => obj.borrow().proto.clone(),
            _ => return Ok(false),
        };
        while let Some(p) = current {
            if Rc::ptr_eq(&p, &proto) {
                return Ok(true);
            }
            current = p.borrow().proto.clone();
        }
        Ok(false)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Properties
    // ══════════════════════════════════════════════════════════════════════

    /// Read `object[key]`, walking prototypes and builtin methods.
    pub fn get_property(&mut self, object: &Value, key: &str) -> EvalResult<Value> {
        match object {
            Value::Undefined | Value::Null => Err(EvalError::Type(format!(
                "Cannot read properties of {} (reading '{key}')",
                object.to_display_string()
            ))),
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(i)
                        .map(|c| Value::string(c.to_string()))
                        .unwrap_or(Value::Undefined));
                }
                Ok(self.builtin_method("String", key, builtins::string_method(key)))
            }
            Value::Number(_) => Ok(self.builtin_method("Number", key, builtins::number_method(key))),
            Value::Bool(_) => Ok(self.builtin_method("Boolean", key, None)),
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(items.borrow().get(i).cloned().unwrap_or(Value::Undefined));
                }
                Ok(self.builtin_method("Array", key, builtins::array_method(key)))
            }
            Value::Object(obj) => {
                let found = self.lookup_in_chain(Some(Rc::clone(obj)), key, object)?;
                if !matches!(found, Value::Undefined) || has_in_chain(obj, key) {
                    return Ok(found);
                }
                if let Some(ext) = self.class_extension(obj, key) {
                    return Ok(ext);
                }
                Ok(self.builtin_method("Object", key, builtins::object_method(key)))
            }
            Value::Function(func) => {
                if let Some(value) = func.props.borrow().get(key).cloned() {
                    return Ok(value);
                }
                match &func.kind {
                    FunctionKind::OverloadedClass { class, .. } => {
                        let class = class.clone();
                        return self.get_property(&class, key);
                    }
                    FunctionKind::Unresolved { module } => {
                        return Err(EvalError::UnresolvedImport(format!(
                            "'{}' from '{module}'",
                            func.name
                        )))
                    }
                    FunctionKind::Class(cv) => {
                        if let Some(parent) = cv.parent.clone() {
                            let inherited = self.get_property(&parent, key)?;
                            if !matches!(inherited, Value::Undefined) {
                                return Ok(inherited);
                            }
                        }
                    }
                    _ => {}
                }
                Ok(match key {
                    "name" => Value::string(&func.name),
                    "length" => Value::Number(match &func.kind {
                        FunctionKind::Closure(c) => {
                            c.func.params.iter().take_while(|p| p.default.is_none() && !p.rest).count() as f64
                        }
                        _ => 0.0,
                    }),
                    _ => builtins::function_method(key)
                        .map(|f| Value::native(key, f))
                        .unwrap_or(Value::Undefined),
                })
            }
            Value::Regex(re) => Ok(match key {
                "source" => Value::string(&re.source),
                "flags" => Value::string(&re.flags),
                "global" => Value::Bool(re.flags.contains('g')),
                _ => builtins::regex_method(key)
                    .map(|f| Value::native(key, f))
                    .unwrap_or(Value::Undefined),
            }),
        }
    }

    fn builtin_method(&self, type_name: &str, key: &str, native: Option<crate::value::NativeFn>) -> Value {
        if let Some(ext) = self.extensions.get(type_name).and_then(|m| m.get(key)) {
            return ext.clone();
        }
        match native {
            Some(f) => Value::native(key, f),
            None => Value::Undefined,
        }
    }

    /// A method `__extend` attached to the instance's class.
    fn class_extension(&self, obj: &ObjectRef, key: &str) -> Option<Value> {
        let mut current = obj.borrow().proto.clone();
        while let Some(proto) = current {
            let p = proto.borrow();
            if let Some(Value::Function(ctor)) = p.props.get("constructor") {
                let name = ctor.name.trim_end_matches("$class");
                if let Some(ext) = self.extensions.get(name).and_then(|m| m.get(key)) {
                    return Some(ext.clone());
                }
            }
            current = p.proto.clone();
        }
        None
    }

    fn lookup_in_chain(&mut self, start: Option<ObjectRef>, key: &str, this: &Value) -> EvalResult<Value> {
        let mut current = start;
        while let Some(obj) = current {
            let (value, getter, next) = {
                let o = obj.borrow();
                (o.props.get(key).cloned(), o.getters.get(key).cloned(), o.proto.clone())
            };
            if let Some(value) = value {
                return Ok(value);
            }
            if let Some(getter) = getter {
                return self.call_function(&getter, this.clone(), Vec::new());
            }
            current = next;
        }
        Ok(Value::Undefined)
    }

    fn has_property(&mut self, object: &Value, key: &str) -> bool {
        match object {
            Value::Object(obj) => has_in_chain(obj, key),
            Value::Array(items) => {
                key == "length" || array_index(key).is_some_and(|i| i < items.borrow().len())
            }
            Value::Function(func) => func.props.borrow().contains_key(key),
            _ => false,
        }
    }

    /// Write `object[key] = value`.
    pub fn set_property(&mut self, object: &Value, key: &str, value: Value) -> EvalResult<()> {
        match object {
            Value::Undefined | Value::Null => Err(EvalError::Type(format!(
                "Cannot set properties of {} (setting '{key}')",
                object.to_display_string()
            ))),
            Value::Object(obj) => {
                let setter = find_setter(obj, key);
                if let Some(setter) = setter {
                    self.call_function(&setter, object.clone(), vec![value])?;
                    return Ok(());
                }
                let mut o = obj.borrow_mut();
                if o.frozen {
                    return Err(EvalError::Type(format!(
                        "Cannot assign to read only property '{key}' of object"
                    )));
                }
                o.props.insert(key.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if key == "length" {
                    let len = value.to_number();
                    if len < 0.0 || len.fract() != 0.0 {
                        return Err(EvalError::Range("Invalid array length".into()));
                    }
                    items.resize(len as usize, Value::Undefined);
                } else if let Some(i) = array_index(key) {
                    if i >= items.len() {
                        items.resize(i + 1, Value::Undefined);
                    }
                    items[i] = value;
                }
                Ok(())
            }
            Value::Function(func) => {
                func.props.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Values produced by iterating `value` (`for...of`, spread).
    pub fn iterate(&mut self, value: &Value) -> EvalResult<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
            other => Err(EvalError::Type(format!("{} is not iterable", other.inspect()))),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Errors
    // ══════════════════════════════════════════════════════════════════════

    /// The value a `catch` clause receives for an error.
    pub fn error_value(&self, err: &EvalError) -> Value {
        match err {
            EvalError::Thrown(value) => value.clone(),
            other => self.make_error(other.class_name(), &other.message()),
        }
    }

    /// Build an error object of the given class.
    pub fn make_error(&self, class: &str, message: &str) -> Value {
        let proto = self
            .error_protos
            .get(class)
            .or_else(|| self.error_protos.get("Error"))
            .cloned();
        let error = Value::object_with_proto(proto);
        proto_set(&error, "name", Value::string(class));
        proto_set(&error, "message", Value::string(message));
        error
    }
}

/// The tagged error value an `unsafe` block degrades to.
fn unsafe_error(err: &EvalError) -> Value {
    Value::object(IndexMap::from([
        ("$error".to_string(), Value::Bool(true)),
        ("op".to_string(), Value::string("unsafe")),
        ("message".to_string(), Value::string(err.message())),
    ]))
}

fn proto_set(object: &Value, key: &str, value: Value) {
    if let Value::Object(obj) = object {
        obj.borrow_mut().props.insert(key.to_string(), value);
    }
}

fn has_in_chain(obj: &ObjectRef, key: &str) -> bool {
    let o = obj.borrow();
    o.props.contains_key(key)
        || o.getters.contains_key(key)
        || o.proto.as_ref().is_some_and(|p| has_in_chain(p, key))
}

fn find_setter(obj: &ObjectRef, key: &str) -> Option<Value> {
    let o = obj.borrow();
    if o.props.contains_key(key) {
        return None;
    }
    match o.setters.get(key) {
        Some(setter) => Some(setter.clone()),
        None => o.proto.as_ref().and_then(|p| find_setter(p, key)),
    }
}

fn delete_property(target: &Value, key: &str) -> bool {
    match target {
        Value::Object(obj) => {
            let mut o = obj.borrow_mut();
            if o.frozen {
                return false;
            }
            o.props.shift_remove(key);
            true
        }
        Value::Array(items) => {
            if let Some(i) = array_index(key) {
                if let Some(slot) = items.borrow_mut().get_mut(i) {
                    *slot = Value::Undefined;
                }
            }
            true
        }
        Value::Function(func) => {
            func.props.borrow_mut().shift_remove(key);
            true
        }
        _ => true,
    }
}

fn is_stringy(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Regex(_)
    )
}

/// Convert a computed key to its property name.
pub fn property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        other => other.to_display_string(),
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if key.bytes().all(|b| b.is_ascii_digit()) {
        key.parse().ok()
    } else {
        None
    }
}

/// ECMAScript `ToInt32`.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4_294_967_296.0);
    if m >= 2_147_483_648.0 {
        (m - 4_294_967_296.0) as i32
    } else {
        m as i32
    }
}

/// Compile a pattern literal with the `regex` crate.
pub fn make_regex(pattern: &str, flags: &str) -> EvalResult<Value> {
    let mut prefix = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' => prefix.push(flag),
            'g' | 'y' | 'u' | 'd' => {}
            other => return Err(EvalError::Syntax(format!("Invalid regular expression flags '{other}'"))),
        }
    }
    let source = if prefix.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{prefix}){pattern}")
    };
    let regex = regex::Regex::new(&source)
        .map_err(|e| EvalError::Syntax(format!("Invalid regular expression /{pattern}/: {e}")))?;
    Ok(Value::Regex(Rc::new(RegexValue {
        source: pattern.to_string(),
        flags: flags.to_string(),
        regex,
    })))
}

/// Short source-like label for an expression, used in error messages.
fn expr_label(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Ident(name) => name.clone(),
        ExprKind::This => "this".into(),
        ExprKind::Member {
            object, property, ..
        } => format!("{}.{property}", expr_label(object)),
        ExprKind::Index { object, .. } => format!("{}[...]", expr_label(object)),
        ExprKind::Call { callee, .. } => format!("{}(...)", expr_label(callee)),
        ExprKind::Paren(inner) => expr_label(inner),
        _ => "expression".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_int32() {
        assert_eq!(to_int32(1.9), 1);
        assert_eq!(to_int32(-1.9), -1);
        assert_eq!(to_int32(4_294_967_296.0 + 5.0), 5);
        assert_eq!(to_int32(2_147_483_648.0), -2_147_483_648);
        assert_eq!(to_int32(f64::NAN), 0);
    }

    #[test]
    fn test_array_index() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("length"), None);
    }

    #[test]
    fn test_regex_flags() {
        let Value::Regex(re) = make_regex("ab+c", "gi").unwrap() else {
            panic!("expected a pattern value");
        };
        assert!(re.regex.is_match("xABBC"));
        assert!(make_regex("a", "q").is_err());
    }
}
