//! Scoped variable environment for the exemplar evaluator.

use crate::value::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    mutable: bool,
}

/// A single scope level.
#[derive(Debug, Default)]
struct Scope {
    bindings: BTreeMap<String, Binding>,
    parent: Option<Environment>,
}

/// Scoped variable environment.
///
/// Scopes form a parent chain so closures can keep the scope they were
/// created in alive. Variables are looked up from the innermost scope
/// outward; `define` always creates in the current scope; `set` updates
/// the first scope where the variable exists. Cloning is cheap and shares
/// the scope.
#[derive(Debug, Clone, Default)]
pub struct Environment(Rc<RefCell<Scope>>);

/// Failure to assign to a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignError {
    Undeclared,
    Constant,
}

impl Environment {
    /// Create a new environment with one global scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new innermost scope whose parent is `self`.
    pub fn child(&self) -> Self {
        Environment(Rc::new(RefCell::new(Scope {
            bindings: BTreeMap::new(),
            parent: Some(self.clone()),
        })))
    }

    /// Define a mutable variable in the current scope.
    pub fn define(&self, name: &str, value: Value) {
        self.insert(name, value, true);
    }

    /// Define a constant in the current scope.
    pub fn define_const(&self, name: &str, value: Value) {
        self.insert(name, value, false);
    }

    fn insert(&self, name: &str, value: Value, mutable: bool) {
        self.0
            .borrow_mut()
            .bindings
            .insert(name.to_string(), Binding { value, mutable });
    }

    /// Look up a variable, searching from innermost to outermost scope.
    pub fn get(&self, name: &str) -> Option<Value> {
        let scope = self.0.borrow();
        match scope.bindings.get(name) {
            Some(binding) => Some(binding.value.clone()),
            None => scope.parent.as_ref()?.get(name),
        }
    }

    /// `true` if the name is bound in this scope itself.
    pub fn has_own(&self, name: &str) -> bool {
        self.0.borrow().bindings.contains_key(name)
    }

    /// Update a variable in the first scope where it exists.
    pub fn set(&self, name: &str, value: Value) -> Result<(), AssignError> {
        let mut scope = self.0.borrow_mut();
        match scope.bindings.get_mut(name) {
            Some(binding) if !binding.mutable => Err(AssignError::Constant),
            Some(binding) => {
                binding.value = value;
                Ok(())
            }
            None => match &scope.parent {
                Some(parent) => parent.set(name, value),
                None => Err(AssignError::Undeclared),
            },
        }
    }

    /// Names bound in the outermost scope.
    pub fn global_names(&self) -> Vec<String> {
        let scope = self.0.borrow();
        match &scope.parent {
            Some(parent) => parent.global_names(),
            None => scope.bindings.keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing_and_set() {
        let global = Environment::new();
        global.define("x", Value::Number(1.0));
        let inner = global.child();
        inner.define("x", Value::Number(2.0));
        assert_eq!(inner.get("x"), Some(Value::Number(2.0)));
        assert_eq!(global.get("x"), Some(Value::Number(1.0)));

        let other = global.child();
        other.set("x", Value::Number(3.0)).unwrap();
        assert_eq!(global.get("x"), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_const_and_undeclared() {
        let env = Environment::new();
        env.define_const("k", Value::Null);
        assert_eq!(env.set("k", Value::Null), Err(AssignError::Constant));
        assert_eq!(env.set("nope", Value::Null), Err(AssignError::Undeclared));
    }
}
