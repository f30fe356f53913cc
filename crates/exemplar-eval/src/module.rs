//! ModuleInstance: one executed module and the bindings it left behind.
//!
//! A module body runs exactly once. Tests, signature checks and host calls
//! are all evaluated against that single instantiation, so state the body
//! sets up is observed consistently by everything that runs afterwards.

use crate::env::Environment;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::{Evaluator, Flow, DEFAULT_GAS_LIMIT};
use crate::value::Value;
use exemplar_types::ast::Program;
use exemplar_types::SourceFile;

/// Runtime instance of an executed module.
pub struct ModuleInstance {
    eval: Evaluator,
    /// Module scope, a child of the evaluator's globals.
    scope: Environment,
}

impl ModuleInstance {
    /// Parse and execute `source` with the default gas limit.
    pub fn load(source: &str) -> EvalResult<Self> {
        Self::load_with_gas_limit(source, DEFAULT_GAS_LIMIT)
    }

    /// Parse and execute `source`.
    pub fn load_with_gas_limit(source: &str, gas_limit: u64) -> EvalResult<Self> {
        let program = parse_program(source, "<module>")?;
        Self::from_program(&program, gas_limit)
    }

    /// Execute an already-parsed module.
    pub fn from_program(program: &Program, gas_limit: u64) -> EvalResult<Self> {
        let mut eval = Evaluator::new(gas_limit);
        let scope = eval.globals.child();
        eval.run_program(program, &scope)?;
        Ok(Self { eval, scope })
    }

    // ══════════════════════════════════════════════════════════════════════
    // Bindings
    // ══════════════════════════════════════════════════════════════════════

    /// Read a module-level (or global) binding.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.scope.get(name)
    }

    /// `true` if the module itself defined `name`.
    pub fn defines(&self, name: &str) -> bool {
        self.scope.has_own(name)
    }

    /// Call a module-level function by name.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let func = self
            .get(name)
            .ok_or_else(|| EvalError::Reference(name.to_string()))?;
        self.eval.call_function(&func, Value::Undefined, args)
    }

    /// Evaluate a standalone expression (an example value) in module scope.
    pub fn eval_source(&mut self, source: &str) -> EvalResult<Value> {
        let file = SourceFile::new("<expression>", source);
        let expr = exemplar_parser::parse_expression(&file).map_err(|errors| {
            let message = errors
                .first_error()
                .map(|d| d.message.clone())
                .unwrap_or_else(|| "invalid expression".into());
            EvalError::Syntax(message)
        })?;
        self.eval.eval_expr(&expr, &self.scope)
    }

    /// Run a statement list (a test body) in a fresh child of module scope.
    pub fn run_block_source(&mut self, source: &str) -> EvalResult<()> {
        let program = parse_program(source, "<test>")?;
        let scope = self.scope.child();
        match self.eval.exec_stmts(&program.body, &scope)? {
            Flow::Break(_) | Flow::Continue(_) => {
                Err(EvalError::Syntax("Illegal break or continue statement".into()))
            }
            Flow::Normal | Flow::Return(_) => Ok(()),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Gas & output
    // ══════════════════════════════════════════════════════════════════════

    /// Give the next test a fresh evaluation budget.
    pub fn reset_gas(&mut self) {
        self.eval.reset_gas();
    }

    pub fn gas_used(&self) -> u64 {
        self.eval.gas_used()
    }

    /// Captured `console.log` output.
    pub fn log_output(&self) -> &[String] {
        &self.eval.log_output
    }

    pub fn clear_log(&mut self) {
        self.eval.log_output.clear();
    }
}

fn parse_program(source: &str, name: &str) -> EvalResult<Program> {
    let file = SourceFile::new(name, source);
    let result = exemplar_parser::parse(&file);
    match (result.program, result.errors.first_error()) {
        (Some(program), None) => Ok(program),
        (_, Some(diag)) => Err(EvalError::Syntax(format!(
            "{} ({}:{})",
            diag.message, diag.line, diag.column
        ))),
        (None, None) => Err(EvalError::Syntax("could not parse module".into())),
    }
}
