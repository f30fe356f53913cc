//! Runtime values of the host-language subset.
//!
//! Arrays and objects are shared, mutable references, the way the host
//! language treats them; primitives are copied. Cycles are possible and every
//! recursive walk here carries a depth limit.

use crate::env::Environment;
use crate::error::EvalResult;
use crate::evaluator::Evaluator;
use exemplar_types::ast::{ClassDecl, Function};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value as Json};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Depth at which printing and conversion stop descending.
const MAX_INSPECT_DEPTH: usize = 8;

pub type ObjectRef = Rc<RefCell<Object>>;
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// A native function: `(evaluator, this, args) -> value`.
pub type NativeFn = fn(&mut Evaluator, &Value, &[Value]) -> EvalResult<Value>;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<FunctionValue>),
    Regex(Rc<RegexValue>),
}

/// A plain object: own properties, accessors, and a prototype link.
#[derive(Default)]
pub struct Object {
    pub props: IndexMap<String, Value>,
    pub getters: IndexMap<String, Value>,
    pub setters: IndexMap<String, Value>,
    pub proto: Option<ObjectRef>,
    pub frozen: bool,
}

impl Object {
    pub fn with_proto(proto: Option<ObjectRef>) -> Self {
        Self {
            proto,
            ..Self::default()
        }
    }
}

/// A callable value. Functions carry their own properties (statics,
/// `prototype`, attached metadata).
pub struct FunctionValue {
    pub name: String,
    pub kind: FunctionKind,
    pub props: RefCell<IndexMap<String, Value>>,
}

pub enum FunctionKind {
    Closure(Closure),
    Native {
        f: NativeFn,
        /// Replaces `this` when set; natives built per call carry their data
        /// here (`expect(x)` matchers, type checks).
        bound: Option<Value>,
    },
    Class(ClassValue),
    /// A class whose construction and plain calls go through a dispatcher.
    OverloadedClass { class: Value, dispatch: Value },
    /// A binding imported from a module that was never resolved.
    Unresolved { module: String },
}

/// A user function together with the scope it closes over.
pub struct Closure {
    pub func: Rc<Function>,
    pub env: Environment,
    /// Parent class for `super` inside methods.
    pub parent: Option<Value>,
    /// Owning class for methods and constructors.
    pub class: Option<Value>,
}

pub struct ClassValue {
    pub decl: Rc<ClassDecl>,
    pub env: Environment,
    pub parent: Option<Value>,
}

pub struct RegexValue {
    pub source: String,
    pub flags: String,
    pub regex: regex::Regex,
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(props: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(Object {
            props,
            ..Object::default()
        })))
    }

    pub fn object_with_proto(proto: Option<ObjectRef>) -> Self {
        Value::Object(Rc::new(RefCell::new(Object::with_proto(proto))))
    }

    pub fn native(name: impl Into<String>, f: NativeFn) -> Self {
        Self::native_bound(name, f, None)
    }

    pub fn native_bound(name: impl Into<String>, f: NativeFn, bound: Option<Value>) -> Self {
        Value::Function(Rc::new(FunctionValue {
            name: name.into(),
            kind: FunctionKind::Native { f, bound },
            props: RefCell::new(IndexMap::new()),
        }))
    }

    pub fn function(name: impl Into<String>, kind: FunctionKind) -> Self {
        Value::Function(Rc::new(FunctionValue {
            name: name.into(),
            kind,
            props: RefCell::new(IndexMap::new()),
        }))
    }

    /// The result of the `typeof` operator.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) | Value::Regex(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric conversion (`+value`).
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
                    i64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN)
                } else {
                    match t {
                        "Infinity" | "+Infinity" => f64::INFINITY,
                        "-Infinity" => f64::NEG_INFINITY,
                        _ => t.parse::<f64>().unwrap_or(f64::NAN),
                    }
                }
            }
            Value::Array(items) => {
                let items = items.borrow();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// String conversion (`String(value)`, template interpolation).
    pub fn to_display_string(&self) -> String {
        self.display_at(0)
    }

    fn display_at(&self, depth: usize) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => {
                if depth > MAX_INSPECT_DEPTH {
                    return String::new();
                }
                items
                    .borrow()
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.display_at(depth + 1) })
                    .collect::<Vec<_>>()
                    .join(",")
            }
            Value::Object(_) => {
                if self.is_error_object() {
                    let name = self.get_own("name").map(|v| v.to_display_string()).unwrap_or_default();
                    let message = self.error_message();
                    if message.is_empty() {
                        name
                    } else {
                        format!("{name}: {message}")
                    }
                } else {
                    "[object Object]".into()
                }
            }
            Value::Function(f) => format!("function {}() {{ [code] }}", f.name),
            Value::Regex(re) => format!("/{}/{}", re.source, re.flags),
        }
    }

    /// A readable rendering for test failure messages: strings quoted,
    /// arrays and objects expanded.
    pub fn inspect(&self) -> String {
        self.inspect_at(0)
    }

    fn inspect_at(&self, depth: usize) -> String {
        if depth > MAX_INSPECT_DEPTH {
            return "…".into();
        }
        match self {
            Value::String(s) => format!("'{}'", s.replace('\'', "\\'")),
            Value::Array(items) => {
                let parts: Vec<String> =
                    items.borrow().iter().map(|v| v.inspect_at(depth + 1)).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Object(obj) => {
                let obj = obj.borrow();
                if obj.props.is_empty() {
                    return "{}".into();
                }
                let parts: Vec<String> = obj
                    .props
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.inspect_at(depth + 1)))
                    .collect();
                format!("{{ {} }}", parts.join(", "))
            }
            Value::Function(f) if f.name.is_empty() => "[Function]".into(),
            Value::Function(f) => format!("[Function: {}]", f.name),
            other => other.display_at(depth),
        }
    }

    /// Read an own property of an object or function without walking
    /// prototypes.
    pub fn get_own(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(obj) => obj.borrow().props.get(key).cloned(),
            Value::Function(f) => f.props.borrow().get(key).cloned(),
            _ => None,
        }
    }

    /// `true` for objects built by an error constructor or a caught runtime
    /// fault: they carry string `name` and `message` properties.
    pub fn is_error_object(&self) -> bool {
        match self {
            Value::Object(obj) => {
                let obj = obj.borrow();
                matches!(obj.props.get("message"), Some(Value::String(_)))
                    && matches!(obj.props.get("name"), Some(Value::String(n)) if n.ends_with("Error"))
            }
            _ => false,
        }
    }

    /// The message of a thrown value.
    pub fn error_message(&self) -> String {
        if self.is_error_object() {
            self.get_own("message").map(|m| m.to_display_string()).unwrap_or_default()
        } else {
            self.to_display_string()
        }
    }

    /// How an uncaught thrown value is reported.
    pub fn describe_thrown(&self) -> String {
        if self.is_error_object() {
            self.to_display_string()
        } else {
            format!("Uncaught {}", self.inspect())
        }
    }

    /// Identity comparison for reference values.
    pub fn same_reference(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Regex(a), Value::Regex(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    // ── JSON interop ─────────────────────────────────────────────────────

    /// Convert to JSON the way `JSON.stringify` would: functions and
    /// `undefined` properties are dropped, non-finite numbers become `null`.
    pub fn to_json(&self) -> Option<Json> {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> Option<Json> {
        if depth > MAX_INSPECT_DEPTH * 4 {
            return Some(Json::Null);
        }
        Some(match self {
            Value::Undefined | Value::Function(_) => return None,
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => Json::String(s.to_string()),
            Value::Array(items) => Json::Array(
                items
                    .borrow()
                    .iter()
                    .map(|v| v.to_json_at(depth + 1).unwrap_or(Json::Null))
                    .collect(),
            ),
            Value::Object(obj) => {
                let mut map = Map::new();
                for (k, v) in &obj.borrow().props {
                    if let Some(json) = v.to_json_at(depth + 1) {
                        map.insert(k.clone(), json);
                    }
                }
                Json::Object(map)
            }
            Value::Regex(_) => Json::Object(Map::new()),
        })
    }

    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::string(s),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::object(
                map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> Json {
    if !n.is_finite() {
        return Json::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return Json::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
}

/// Render a number the way the host language prints it.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n == 0.0 {
        "0".into()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let s = format!("{n:e}");
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => s,
        }
    } else {
        n.to_string()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl PartialEq for Value {
    /// Strict equality (`===`), except that `NaN` equals itself so values
    /// can be compared in tests.
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            _ => self.same_reference(other),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(1e21), "1e+21");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("0").is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(Value::array(vec![]).is_truthy());
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::string(" 42 ").to_number(), 42.0);
        assert_eq!(Value::string("").to_number(), 0.0);
        assert!(Value::string("abc").to_number().is_nan());
        assert_eq!(Value::Null.to_number(), 0.0);
        assert_eq!(Value::string("0x10").to_number(), 16.0);
    }

    #[test]
    fn test_display_and_inspect() {
        let arr = Value::array(vec![Value::Number(1.0), Value::Null, Value::string("a")]);
        assert_eq!(arr.to_display_string(), "1,,a");
        assert_eq!(arr.inspect(), "[1, null, 'a']");
        let obj = Value::object(IndexMap::from([("k".to_string(), Value::Bool(true))]));
        assert_eq!(obj.inspect(), "{ k: true }");
    }

    #[test]
    fn test_json_round_trip_drops_functions() {
        let obj = Value::object(IndexMap::from([
            ("a".to_string(), Value::Number(2.0)),
            ("f".to_string(), Value::native("f", |_, _, _| Ok(Value::Undefined))),
        ]));
        assert_eq!(obj.to_json().unwrap(), serde_json::json!({ "a": 2 }));
    }
}
