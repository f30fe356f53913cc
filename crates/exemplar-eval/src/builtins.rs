//! Global objects, builtin methods and the runtime helpers compiled code
//! calls (`Is`, `Type`, `Union`, `Enum`, `Generic`, `__extend`,
//! `__overloadClass`, the test API).

use crate::equality::{deep_equal, numbers_equal, strict_equals};
use crate::error::{EvalError, EvalResult};
use crate::evaluator::{make_regex, property_key, Evaluator};
use crate::matcher::{check_type, is_type_object, type_matches, TYPE_MARKER};
use crate::value::{format_number, ArrayRef, FunctionKind, NativeFn, Object, Value};
use exemplar_types::TypeDescriptor;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// Error classes installed as globals. `Error` must come first: the others
/// inherit its prototype.
const ERROR_CLASSES: &[&str] = &["Error", "TypeError", "RangeError", "ReferenceError", "SyntaxError"];

/// Keys a `Type` spec object may carry.
const TYPE_SPEC_KEYS: &[&str] = &["example", "predicate", "description", "default"];

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn namespace(entries: &[(&str, NativeFn)]) -> Value {
    let props = entries
        .iter()
        .map(|(name, f)| (name.to_string(), Value::native(*name, *f)))
        .collect();
    Value::object(props)
}

fn with_statics(ctor: Value, entries: &[(&str, NativeFn)]) -> Value {
    if let Value::Function(func) = &ctor {
        let mut props = func.props.borrow_mut();
        for (name, f) in entries {
            props.insert(name.to_string(), Value::native(*name, *f));
        }
    }
    ctor
}

fn set_static(ctor: &Value, key: &str, value: Value) {
    if let Value::Function(func) = ctor {
        func.props.borrow_mut().insert(key.to_string(), value);
    }
}

/// Install every global into the evaluator's global scope.
pub(crate) fn install(eval: &mut Evaluator) {
    let g = eval.globals.clone();

    g.define_const("console", namespace(&[("log", console_log)]));
    let math = namespace(&[
        ("abs", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().abs()))),
        ("floor", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().floor()))),
        ("ceil", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().ceil()))),
        ("round", |_, _, a| Ok(Value::Number((arg(a, 0).to_number() + 0.5).floor()))),
        ("trunc", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().trunc()))),
        ("sign", math_sign),
        ("sqrt", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().sqrt()))),
        ("cbrt", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().cbrt()))),
        ("pow", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().powf(arg(a, 1).to_number())))),
        ("log", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().ln()))),
        ("log2", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().log2()))),
        ("log10", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().log10()))),
        ("exp", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().exp()))),
        ("sin", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().sin()))),
        ("cos", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().cos()))),
        ("tan", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().tan()))),
        ("atan2", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().atan2(arg(a, 1).to_number())))),
        ("hypot", |_, _, a| Ok(Value::Number(a.iter().map(|v| v.to_number().powi(2)).sum::<f64>().sqrt()))),
        ("min", |_, _, a| Ok(Value::Number(fold_numbers(a, f64::INFINITY, f64::min)))),
        ("max", |_, _, a| Ok(Value::Number(fold_numbers(a, f64::NEG_INFINITY, f64::max)))),
        ("random", math_random),
    ]);
    if let Value::Object(obj) = &math {
        let mut obj = obj.borrow_mut();
        obj.props.insert("PI".into(), Value::Number(std::f64::consts::PI));
        obj.props.insert("E".into(), Value::Number(std::f64::consts::E));
    }
    g.define_const("Math", math);
    g.define_const("JSON", namespace(&[("stringify", json_stringify), ("parse", json_parse)]));

    g.define_const(
        "Object",
        with_statics(
            Value::native("Object", object_ctor),
            &[
                ("keys", |_, _, a| Ok(Value::array(own_keys(&arg(a, 0)).into_iter().map(Value::string).collect()))),
                ("values", |_, _, a| Ok(Value::array(own_entries(&arg(a, 0)).into_iter().map(|(_, v)| v).collect()))),
                ("entries", object_entries),
                ("assign", object_assign),
                ("freeze", object_freeze),
                ("isFrozen", |_, _, a| Ok(Value::Bool(match arg(a, 0) {
                    Value::Object(obj) => obj.borrow().frozen,
                    _ => true,
                }))),
                ("fromEntries", object_from_entries),
                ("create", object_create),
                ("getPrototypeOf", object_get_prototype_of),
            ],
        ),
    );
    let array = with_statics(
        Value::native("Array", array_ctor),
        &[
            ("isArray", |_, _, a| Ok(Value::Bool(matches!(arg(a, 0), Value::Array(_))))),
            ("from", array_from),
            ("of", |_, _, a| Ok(Value::array(a.to_vec()))),
        ],
    );
    g.define_const("Array", array);
    let number = with_statics(
        Value::native("Number", |_, _, a| Ok(Value::Number(if a.is_empty() { 0.0 } else { a[0].to_number() }))),
        &[
            ("isInteger", |_, _, a| Ok(Value::Bool(matches!(arg(a, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)))),
            ("isFinite", |_, _, a| Ok(Value::Bool(matches!(arg(a, 0), Value::Number(n) if n.is_finite())))),
            ("isNaN", |_, _, a| Ok(Value::Bool(matches!(arg(a, 0), Value::Number(n) if n.is_nan())))),
            ("isSafeInteger", |_, _, a| Ok(Value::Bool(matches!(arg(a, 0), Value::Number(n) if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0)))),
            ("parseFloat", parse_float),
            ("parseInt", parse_int),
        ],
    );
    set_static(&number, "MAX_SAFE_INTEGER", Value::Number(9_007_199_254_740_991.0));
    set_static(&number, "MIN_SAFE_INTEGER", Value::Number(-9_007_199_254_740_991.0));
    set_static(&number, "EPSILON", Value::Number(f64::EPSILON));
    set_static(&number, "POSITIVE_INFINITY", Value::Number(f64::INFINITY));
    set_static(&number, "NEGATIVE_INFINITY", Value::Number(f64::NEG_INFINITY));
    g.define_const("Number", number);
    g.define_const(
        "String",
        with_statics(
            Value::native("String", |_, _, a| {
                Ok(Value::string(if a.is_empty() { String::new() } else { a[0].to_display_string() }))
            }),
            &[("fromCharCode", |_, _, a| {
                Ok(Value::string(
                    a.iter()
                        .filter_map(|v| char::from_u32(v.to_number() as u32))
                        .collect::<String>(),
                ))
            })],
        ),
    );
    g.define_const("Boolean", Value::native("Boolean", |_, _, a| Ok(Value::Bool(arg(a, 0).is_truthy()))));
    g.define_const("RegExp", Value::native("RegExp", |_, _, a| {
        let flags = match arg(a, 1) {
            Value::Undefined => String::new(),
            other => other.to_display_string(),
        };
        make_regex(&arg(a, 0).to_display_string(), &flags)
    }));
    g.define_const("Function", Value::native("Function", |_, _, _| {
        Err(EvalError::Type("Function constructor is not supported".into()))
    }));
    g.define_const("parseInt", Value::native("parseInt", parse_int));
    g.define_const("parseFloat", Value::native("parseFloat", parse_float));
    g.define_const("isNaN", Value::native("isNaN", |_, _, a| Ok(Value::Bool(arg(a, 0).to_number().is_nan()))));
    g.define_const("isFinite", Value::native("isFinite", |_, _, a| Ok(Value::Bool(arg(a, 0).to_number().is_finite()))));
    g.define_const("NaN", Value::Number(f64::NAN));
    g.define_const("Infinity", Value::Number(f64::INFINITY));

    for class in ERROR_CLASSES {
        let parent = eval.error_protos.get("Error").cloned();
        let proto = Rc::new(RefCell::new(Object::with_proto(parent)));
        let ctor = Value::native_bound(*class, construct_error, Some(Value::string(class)));
        set_static(&ctor, "prototype", Value::Object(Rc::clone(&proto)));
        proto.borrow_mut().props.insert("constructor".into(), ctor.clone());
        eval.error_protos.insert(class.to_string(), proto);
        g.define_const(class, ctor);
    }

    // Test API.
    g.define_const("expect", Value::native("expect", expect));
    g.define_const("assert", Value::native("assert", assert));

    // Runtime helpers emitted by the rewrite passes.
    g.define_const("Is", Value::native("Is", |_, _, a| Ok(Value::Bool(deep_equal(&arg(a, 0), &arg(a, 1))))));
    g.define_const("IsNot", Value::native("IsNot", |_, _, a| Ok(Value::Bool(!deep_equal(&arg(a, 0), &arg(a, 1))))));
    g.define_const("Type", Value::native("Type", type_helper));
    g.define_const("Union", Value::native("Union", union_helper));
    g.define_const("Enum", Value::native("Enum", enum_helper));
    g.define_const("Generic", Value::native("Generic", generic_helper));
    g.define_const("__extend", Value::native("__extend", extend_helper));
    g.define_const("__overloadClass", Value::native("__overloadClass", overload_class_helper));
    g.define_const("__checkType", Value::native("__checkType", |_, _, a| {
        let desc = descriptor_arg(&arg(a, 1))?;
        Ok(Value::Bool(check_type(&arg(a, 0), &desc).is_ok()))
    }));
    g.define_const("__checkReturn", Value::native("__checkReturn", check_return_helper));
}

// ── Property enumeration ─────────────────────────────────────────────────────

/// Own enumerable keys in insertion order (`Object.keys`).
pub fn own_keys(value: &Value) -> Vec<String> {
    own_entries(value).into_iter().map(|(k, _)| k).collect()
}

/// Own enumerable entries in insertion order (`Object.entries`).
pub fn own_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(obj) => obj.borrow().props.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::Function(func) => func
            .props
            .borrow()
            .iter()
            .filter(|(k, _)| k.as_str() != "prototype")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        Value::String(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::string(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

// ── Globals ──────────────────────────────────────────────────────────────────

fn console_log(eval: &mut Evaluator, _this: &Value, args: &[Value]) -> EvalResult<Value> {
    let line = args
        .iter()
        .map(|v| match v {
            Value::String(s) => s.to_string(),
            other => other.inspect(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    tracing::trace!(target: "exemplar_eval::console", "{line}");
    eval.log_output.push(line);
    Ok(Value::Undefined)
}

fn fold_numbers(args: &[Value], init: f64, f: fn(f64, f64) -> f64) -> f64 {
    let mut acc = init;
    for v in args {
        let n = v.to_number();
        if n.is_nan() {
            return f64::NAN;
        }
        acc = f(acc, n);
    }
    acc
}

fn math_sign(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let n = arg(a, 0).to_number();
    Ok(Value::Number(if n.is_nan() || n == 0.0 { n } else { n.signum() }))
}

/// xorshift64*: deterministic across runs so test results are reproducible.
fn math_random(eval: &mut Evaluator, _: &Value, _: &[Value]) -> EvalResult<Value> {
    let mut x = eval.random_state;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    eval.random_state = x;
    let bits = x.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 11;
    Ok(Value::Number(bits as f64 / (1u64 << 53) as f64))
}

fn json_stringify(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let Some(json) = arg(a, 0).to_json() else {
        return Ok(Value::Undefined);
    };
    let indent = match arg(a, 2) {
        Value::Number(n) if n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    let text = if indent.is_empty() {
        serde_json::to_string(&json)
    } else {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        serde::Serialize::serialize(&json, &mut ser)
            .map(|()| String::from_utf8_lossy(&buf).into_owned())
    };
    text.map(Value::string)
        .map_err(|e| EvalError::Type(format!("JSON.stringify failed: {e}")))
}

fn json_parse(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let text = arg(a, 0).to_display_string();
    serde_json::from_str::<serde_json::Value>(&text)
        .map(|json| Value::from_json(&json))
        .map_err(|e| EvalError::Syntax(format!("Unexpected token in JSON: {e}")))
}

fn parse_int(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let text = arg(a, 0).to_display_string();
    let mut s = text.trim_start();
    let negative = s.starts_with('-');
    s = s.trim_start_matches(['-', '+']);
    let mut radix = match arg(a, 1) {
        Value::Undefined => 10,
        other => match other.to_number() as u32 {
            0 => 10,
            r => r,
        },
    };
    if (radix == 16 || radix == 10 && arg(a, 1).is_nullish()) && (s.starts_with("0x") || s.starts_with("0X")) {
        s = &s[2..];
        radix = 16;
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let mut n = 0.0;
    for c in digits.chars() {
        n = n * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or(0));
    }
    Ok(Value::Number(if negative { -n } else { n }))
}

fn parse_float(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let text = arg(a, 0).to_display_string();
    let s = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    for (i, c) in s.char_indices() {
        let ok = match c {
            '0'..='9' => true,
            '+' | '-' => i == 0 || s[..i].ends_with(['e', 'E']),
            '.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            'e' | 'E' if !seen_exp && i > 0 => {
                seen_exp = true;
                true
            }
            _ => false,
        };
        if !ok {
            break;
        }
        end = i + c.len_utf8();
    }
    if s.starts_with("Infinity") || s.starts_with("+Infinity") {
        return Ok(Value::Number(f64::INFINITY));
    }
    if s.starts_with("-Infinity") {
        return Ok(Value::Number(f64::NEG_INFINITY));
    }
    // Back off a dangling exponent or sign: "1e" parses as 1.
    let mut candidate = &s[..end];
    while !candidate.is_empty() && candidate.parse::<f64>().is_err() {
        candidate = &candidate[..candidate.len() - 1];
    }
    Ok(Value::Number(candidate.parse().unwrap_or(f64::NAN)))
}

fn construct_error(eval: &mut Evaluator, this: &Value, a: &[Value]) -> EvalResult<Value> {
    let class = this.as_str().unwrap_or("Error").to_string();
    let message = match arg(a, 0) {
        Value::Undefined => String::new(),
        other => other.to_display_string(),
    };
    Ok(eval.make_error(&class, &message))
}

// ── Object ───────────────────────────────────────────────────────────────────

fn object_ctor(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    Ok(match arg(a, 0) {
        Value::Undefined | Value::Null => Value::object(IndexMap::new()),
        other => other,
    })
}

fn object_entries(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    Ok(Value::array(
        own_entries(&arg(a, 0))
            .into_iter()
            .map(|(k, v)| Value::array(vec![Value::string(k), v]))
            .collect(),
    ))
}

fn object_assign(eval: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let target = arg(a, 0);
    for source in a.iter().skip(1) {
        for (key, value) in own_entries(source) {
            eval.set_property(&target, &key, value)?;
        }
    }
    Ok(target)
}

fn object_freeze(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let target = arg(a, 0);
    if let Value::Object(obj) = &target {
        obj.borrow_mut().frozen = true;
    }
    Ok(target)
}

fn object_from_entries(eval: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let mut props = IndexMap::new();
    for entry in eval.iterate(&arg(a, 0))? {
        let key = eval.get_property(&entry, "0")?;
        let value = eval.get_property(&entry, "1")?;
        props.insert(property_key(&key), value);
    }
    Ok(Value::object(props))
}

fn object_create(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    match arg(a, 0) {
        Value::Object(proto) => Ok(Value::object_with_proto(Some(proto))),
        Value::Null => Ok(Value::object_with_proto(None)),
        other => Err(EvalError::Type(format!(
            "Object prototype may only be an Object or null: {}",
            other.inspect()
        ))),
    }
}

fn object_get_prototype_of(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    Ok(match arg(a, 0) {
        Value::Object(obj) => obj.borrow().proto.clone().map(Value::Object).unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

/// Methods every plain object responds to.
pub fn object_method(key: &str) -> Option<NativeFn> {
    Some(match key {
        "hasOwnProperty" => |_, this, a| {
            let key = property_key(&arg(a, 0));
            Ok(Value::Bool(match this {
                Value::Object(obj) => obj.borrow().props.contains_key(&key),
                other => own_keys(other).contains(&key),
            }))
        },
        "toString" => |_, this, _| Ok(Value::string(this.to_display_string())),
        _ => return None,
    })
}

// ── Functions ────────────────────────────────────────────────────────────────

/// `call`, `apply` and `bind` on function values.
pub fn function_method(key: &str) -> Option<NativeFn> {
    Some(match key {
        "call" => |eval, this, a| {
            let rest = a.get(1..).unwrap_or_default().to_vec();
            eval.call_function(this, arg(a, 0), rest)
        },
        "apply" => |eval, this, a| {
            let args = match arg(a, 1) {
                Value::Undefined | Value::Null => Vec::new(),
                list => eval.iterate(&list)?,
            };
            eval.call_function(this, arg(a, 0), args)
        },
        "bind" => |_, this, a| {
            let mut bound = vec![this.clone()];
            bound.extend(a.iter().cloned());
            if bound.len() == 1 {
                bound.push(Value::Undefined);
            }
            let name = match this {
                Value::Function(f) => format!("bound {}", f.name),
                _ => "bound".into(),
            };
            Ok(Value::native_bound(name, call_bound, Some(Value::array(bound))))
        },
        "toString" => |_, this, _| Ok(Value::string(this.to_display_string())),
        _ => return None,
    })
}

fn call_bound(eval: &mut Evaluator, this: &Value, a: &[Value]) -> EvalResult<Value> {
    let Value::Array(bound) = this else {
        return Ok(Value::Undefined);
    };
    let bound = bound.borrow().clone();
    let func = arg(&bound, 0);
    let bound_this = arg(&bound, 1);
    let mut args: Vec<Value> = bound.get(2..).unwrap_or_default().to_vec();
    args.extend(a.iter().cloned());
    eval.call_function(&func, bound_this, args)
}

// ── Strings ──────────────────────────────────────────────────────────────────

fn this_string(this: &Value) -> Rc<str> {
    match this {
        Value::String(s) => Rc::clone(s),
        other => Rc::from(other.to_display_string()),
    }
}

/// Clamp a relative index (`slice`, `at`) into `0..=len`.
fn relative_index(n: f64, len: usize) -> usize {
    if n.is_nan() {
        0
    } else if n < 0.0 {
        (len as f64 + n.trunc()).max(0.0) as usize
    } else {
        n.trunc().min(len as f64) as usize
    }
}

fn index_arg(a: &[Value], i: usize, default: usize, len: usize) -> usize {
    match arg(a, i) {
        Value::Undefined => default,
        other => relative_index(other.to_number(), len),
    }
}

fn char_slice(chars: &[char], start: usize, end: usize) -> Value {
    if start >= end {
        return Value::string("");
    }
    Value::string(chars[start..end].iter().collect::<String>())
}

fn find_chars(hay: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(hay.len()));
    }
    (from..hay.len().saturating_sub(needle.len()) + 1).find(|&i| hay[i..].starts_with(needle))
}

/// Methods on string values.
pub fn string_method(key: &str) -> Option<NativeFn> {
    Some(match key {
        "charAt" => |_, this, a| {
            let chars: Vec<char> = this_string(this).chars().collect();
            let i = arg(a, 0).to_number();
            let i = if i.is_nan() { 0.0 } else { i };
            Ok(Value::string(
                if i >= 0.0 { chars.get(i as usize).map(|c| c.to_string()) } else { None }.unwrap_or_default(),
            ))
        },
        "charCodeAt" => |_, this, a| {
            let chars: Vec<char> = this_string(this).chars().collect();
            let i = arg(a, 0).to_number();
            let i = if i.is_nan() { 0.0 } else { i };
            Ok(Value::Number(match chars.get(i as usize) {
                Some(c) if i >= 0.0 => f64::from(u32::from(*c)),
                _ => f64::NAN,
            }))
        },
        "at" => |_, this, a| {
            let chars: Vec<char> = this_string(this).chars().collect();
            let n = arg(a, 0).to_number();
            let i = if n < 0.0 { chars.len() as f64 + n } else { n };
            Ok(if i >= 0.0 {
                chars.get(i as usize).map(|c| Value::string(c.to_string())).unwrap_or(Value::Undefined)
            } else {
                Value::Undefined
            })
        },
        "indexOf" => |_, this, a| {
            let chars: Vec<char> = this_string(this).chars().collect();
            let needle: Vec<char> = arg(a, 0).to_display_string().chars().collect();
            let from = index_arg(a, 1, 0, chars.len());
            Ok(Value::Number(find_chars(&chars, &needle, from).map_or(-1.0, |i| i as f64)))
        },
        "lastIndexOf" => |_, this, a| {
            let chars: Vec<char> = this_string(this).chars().collect();
            let needle: Vec<char> = arg(a, 0).to_display_string().chars().collect();
            let found = (0..=chars.len().saturating_sub(needle.len()))
                .rev()
                .find(|&i| chars[i..].starts_with(&needle));
            Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
        },
        "includes" => |_, this, a| {
            Ok(Value::Bool(this_string(this).contains(&*arg(a, 0).to_display_string())))
        },
        "startsWith" => |_, this, a| {
            Ok(Value::Bool(this_string(this).starts_with(&*arg(a, 0).to_display_string())))
        },
        "endsWith" => |_, this, a| {
            Ok(Value::Bool(this_string(this).ends_with(&*arg(a, 0).to_display_string())))
        },
        "slice" => |_, this, a| {
            let chars: Vec<char> = this_string(this).chars().collect();
            let start = index_arg(a, 0, 0, chars.len());
            let end = index_arg(a, 1, chars.len(), chars.len());
            Ok(char_slice(&chars, start, end))
        },
        "substring" => |_, this, a| {
            let chars: Vec<char> = this_string(this).chars().collect();
            let clamp = |v: Value, default: usize| match v {
                Value::Undefined => default,
                other => {
                    let n = other.to_number();
                    if n.is_nan() || n < 0.0 { 0 } else { (n as usize).min(chars.len()) }
                }
            };
            let (s, e) = (clamp(arg(a, 0), 0), clamp(arg(a, 1), chars.len()));
            Ok(char_slice(&chars, s.min(e), s.max(e)))
        },
        "toUpperCase" => |_, this, _| Ok(Value::string(this_string(this).to_uppercase())),
        "toLowerCase" => |_, this, _| Ok(Value::string(this_string(this).to_lowercase())),
        "trim" => |_, this, _| Ok(Value::string(this_string(this).trim())),
        "trimStart" => |_, this, _| Ok(Value::string(this_string(this).trim_start())),
        "trimEnd" => |_, this, _| Ok(Value::string(this_string(this).trim_end())),
        "repeat" => |_, this, a| {
            let n = arg(a, 0).to_number();
            if n < 0.0 || n.is_infinite() {
                return Err(EvalError::Range(format!("Invalid count value: {}", format_number(n))));
            }
            Ok(Value::string(this_string(this).repeat(if n.is_nan() { 0 } else { n as usize })))
        },
        "padStart" => |_, this, a| pad(this, a, true),
        "padEnd" => |_, this, a| pad(this, a, false),
        "concat" => |_, this, a| {
            let mut s = this_string(this).to_string();
            for v in a {
                s.push_str(&v.to_display_string());
            }
            Ok(Value::string(s))
        },
        "split" => string_split,
        "replace" => |eval, this, a| string_replace(eval, this, a, false),
        "replaceAll" => |eval, this, a| string_replace(eval, this, a, true),
        "match" => |_, this, a| {
            let s = this_string(this);
            let Value::Regex(re) = arg(a, 0) else {
                let needle = arg(a, 0).to_display_string();
                return Ok(if s.contains(&*needle) {
                    Value::array(vec![Value::string(needle)])
                } else {
                    Value::Null
                });
            };
            if re.flags.contains('g') {
                let all: Vec<Value> = re.regex.find_iter(&s).map(|m| Value::string(m.as_str())).collect();
                return Ok(if all.is_empty() { Value::Null } else { Value::array(all) });
            }
            Ok(regex_exec(&re.regex, &s))
        },
        "localeCompare" => |_, this, a| {
            let other = arg(a, 0).to_display_string();
            Ok(Value::Number(match (*this_string(this)).cmp(other.as_str()) {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            }))
        },
        "toString" | "valueOf" => |_, this, _| Ok(Value::String(this_string(this))),
        _ => return None,
    })
}

fn pad(this: &Value, a: &[Value], start: bool) -> EvalResult<Value> {
    let s = this_string(this);
    let target = arg(a, 0).to_number();
    let fill = match arg(a, 1) {
        Value::Undefined => " ".to_string(),
        other => other.to_display_string(),
    };
    let len = s.chars().count();
    if target.is_nan() || (target as usize) <= len || fill.is_empty() {
        return Ok(Value::String(s));
    }
    let padding: String = fill.chars().cycle().take(target as usize - len).collect();
    Ok(Value::string(if start {
        format!("{padding}{s}")
    } else {
        format!("{s}{padding}")
    }))
}

fn string_split(_: &mut Evaluator, this: &Value, a: &[Value]) -> EvalResult<Value> {
    let s = this_string(this);
    let limit = match arg(a, 1) {
        Value::Undefined => usize::MAX,
        other => other.to_number().max(0.0) as usize,
    };
    let parts: Vec<Value> = match arg(a, 0) {
        Value::Undefined => vec![Value::String(Rc::clone(&s))],
        Value::Regex(re) => re.regex.split(&s).map(Value::string).collect(),
        sep => {
            let sep = sep.to_display_string();
            if sep.is_empty() {
                s.chars().map(|c| Value::string(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::string).collect()
            }
        }
    };
    Ok(Value::array(parts.into_iter().take(limit).collect()))
}

fn string_replace(eval: &mut Evaluator, this: &Value, a: &[Value], all: bool) -> EvalResult<Value> {
    let s = this_string(this);
    let replacement = arg(a, 1);
    let (regex, global) = match arg(a, 0) {
        Value::Regex(re) => (re.regex.clone(), all || re.flags.contains('g')),
        other => {
            let literal = regex::escape(&other.to_display_string());
            let regex = regex::Regex::new(&literal)
                .map_err(|e| EvalError::Syntax(e.to_string()))?;
            (regex, all)
        }
    };
    let mut out = String::new();
    let mut last = 0;
    for caps in regex.captures_iter(&s) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&s[last..whole.start()]);
        if let Value::Function(_) = replacement {
            let mut args: Vec<Value> = caps
                .iter()
                .map(|m| m.map_or(Value::Undefined, |m| Value::string(m.as_str())))
                .collect();
            args.push(Value::Number(s[..whole.start()].chars().count() as f64));
            args.push(Value::String(Rc::clone(&s)));
            let result = eval.call_function(&replacement, Value::Undefined, args)?;
            out.push_str(&result.to_display_string());
        } else {
            let template = replacement.to_display_string();
            let mut expanded = String::new();
            caps.expand(&template.replace("$&", "${0}"), &mut expanded);
            out.push_str(&expanded);
        }
        last = whole.end();
        if !global {
            break;
        }
    }
    out.push_str(&s[last..]);
    Ok(Value::string(out))
}

// ── Numbers & patterns ───────────────────────────────────────────────────────

/// Methods on number values.
pub fn number_method(key: &str) -> Option<NativeFn> {
    Some(match key {
        "toFixed" => |_, this, a| {
            let n = this.to_number();
            let digits = arg(a, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
            if !n.is_finite() {
                return Ok(Value::string(format_number(n)));
            }
            Ok(Value::string(format!("{n:.digits$}")))
        },
        "toString" => |_, this, a| {
            let n = this.to_number();
            match arg(a, 0) {
                Value::Undefined => Ok(Value::string(format_number(n))),
                radix => {
                    let radix = radix.to_number() as u32;
                    if !(2..=36).contains(&radix) {
                        return Err(EvalError::Range("toString() radix must be between 2 and 36".into()));
                    }
                    Ok(Value::string(to_radix(n, radix)))
                }
            }
        },
        "valueOf" => |_, this, _| Ok(Value::Number(this.to_number())),
        _ => return None,
    })
}

fn to_radix(n: f64, radix: u32) -> String {
    if !n.is_finite() || n.fract() != 0.0 || radix == 10 {
        return format_number(n);
    }
    let negative = n < 0.0;
    let mut m = n.abs() as u64;
    if m == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while m > 0 {
        digits.push(std::char::from_digit((m % u64::from(radix)) as u32, radix).unwrap_or('0'));
        m /= u64::from(radix);
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn regex_exec(regex: &regex::Regex, s: &str) -> Value {
    match regex.captures(s) {
        Some(caps) => Value::array(
            caps.iter()
                .map(|m| m.map_or(Value::Undefined, |m| Value::string(m.as_str())))
                .collect(),
        ),
        None => Value::Null,
    }
}

/// Methods on pattern values.
pub fn regex_method(key: &str) -> Option<NativeFn> {
    Some(match key {
        "test" => |_, this, a| {
            let Value::Regex(re) = this else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(re.regex.is_match(&arg(a, 0).to_display_string())))
        },
        "exec" => |_, this, a| {
            let Value::Regex(re) = this else {
                return Ok(Value::Null);
            };
            Ok(regex_exec(&re.regex, &arg(a, 0).to_display_string()))
        },
        "toString" => |_, this, _| Ok(Value::string(this.to_display_string())),
        _ => return None,
    })
}

// ── Arrays ───────────────────────────────────────────────────────────────────

fn this_array(this: &Value) -> EvalResult<ArrayRef> {
    match this {
        Value::Array(items) => Ok(Rc::clone(items)),
        other => Err(EvalError::Type(format!("{} is not an array", other.inspect()))),
    }
}

fn callback(a: &[Value], method: &str) -> EvalResult<Value> {
    match arg(a, 0) {
        f @ Value::Function(_) => Ok(f),
        other => Err(EvalError::Type(format!("{} is not a function (in {method})", other.inspect()))),
    }
}

fn array_ctor(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    match a {
        [Value::Number(n)] => {
            if *n < 0.0 || n.fract() != 0.0 {
                return Err(EvalError::Range("Invalid array length".into()));
            }
            Ok(Value::array(vec![Value::Undefined; *n as usize]))
        }
        _ => Ok(Value::array(a.to_vec())),
    }
}

fn array_from(eval: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let source = arg(a, 0);
    let items = match &source {
        Value::Object(_) => {
            let len = eval.get_property(&source, "length")?.to_number();
            let len = if len.is_nan() { 0 } else { len.max(0.0) as usize };
            vec![Value::Undefined; len]
        }
        Value::Undefined | Value::Null => {
            return Err(EvalError::Type("Array.from requires an array-like object".into()))
        }
        other => eval.iterate(other)?,
    };
    match arg(a, 1) {
        f @ Value::Function(_) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(eval.call_function(&f, Value::Undefined, vec![item, Value::Number(i as f64)])?);
            }
            Ok(Value::array(out))
        }
        _ => Ok(Value::array(items)),
    }
}

/// Run `f(item, index, array)` for each element, stopping when `visit`
/// returns `Some`.
fn each<T>(
    eval: &mut Evaluator,
    this: &Value,
    f: &Value,
    mut visit: impl FnMut(usize, &Value, Value) -> Option<T>,
) -> EvalResult<Option<T>> {
    let items = this_array(this)?.borrow().clone();
    for (i, item) in items.into_iter().enumerate() {
        let result = eval.call_function(f, Value::Undefined, vec![item.clone(), Value::Number(i as f64), this.clone()])?;
        if let Some(out) = visit(i, &item, result) {
            return Ok(Some(out));
        }
    }
    Ok(None)
}

/// Methods on array values.
pub fn array_method(key: &str) -> Option<NativeFn> {
    Some(match key {
        "push" => |_, this, a| {
            let items = this_array(this)?;
            let mut items = items.borrow_mut();
            items.extend(a.iter().cloned());
            Ok(Value::Number(items.len() as f64))
        },
        "pop" => |_, this, _| Ok(this_array(this)?.borrow_mut().pop().unwrap_or(Value::Undefined)),
        "shift" => |_, this, _| {
            let items = this_array(this)?;
            let mut items = items.borrow_mut();
            Ok(if items.is_empty() { Value::Undefined } else { items.remove(0) })
        },
        "unshift" => |_, this, a| {
            let items = this_array(this)?;
            let mut items = items.borrow_mut();
            for (i, v) in a.iter().enumerate() {
                items.insert(i, v.clone());
            }
            Ok(Value::Number(items.len() as f64))
        },
        "slice" => |_, this, a| {
            let items = this_array(this)?.borrow().clone();
            let start = index_arg(a, 0, 0, items.len());
            let end = index_arg(a, 1, items.len(), items.len());
            Ok(Value::array(if start < end { items[start..end].to_vec() } else { Vec::new() }))
        },
        "splice" => |_, this, a| {
            let items = this_array(this)?;
            let mut items = items.borrow_mut();
            let len = items.len();
            let start = index_arg(a, 0, len, len);
            let count = match arg(a, 1) {
                Value::Undefined if a.len() < 2 => len - start,
                other => {
                    let n = other.to_number();
                    if n.is_nan() { 0 } else { (n.max(0.0) as usize).min(len - start) }
                }
            };
            let removed: Vec<Value> = items
                .splice(start..start + count, a.iter().skip(2).cloned())
                .collect();
            Ok(Value::array(removed))
        },
        "concat" => |_, this, a| {
            let mut out = this_array(this)?.borrow().clone();
            for v in a {
                match v {
                    Value::Array(more) => out.extend(more.borrow().iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::array(out))
        },
        "join" => |_, this, a| {
            let sep = match arg(a, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_display_string(),
            };
            let items = this_array(this)?.borrow().clone();
            Ok(Value::string(
                items
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
                    .collect::<Vec<_>>()
                    .join(&sep),
            ))
        },
        "indexOf" => |_, this, a| {
            let items = this_array(this)?.borrow().clone();
            let needle = arg(a, 0);
            let from = index_arg(a, 1, 0, items.len());
            Ok(Value::Number(
                items.iter().skip(from).position(|v| strict_equals(v, &needle)).map_or(-1.0, |i| (i + from) as f64),
            ))
        },
        "lastIndexOf" => |_, this, a| {
            let items = this_array(this)?.borrow().clone();
            let needle = arg(a, 0);
            Ok(Value::Number(items.iter().rposition(|v| strict_equals(v, &needle)).map_or(-1.0, |i| i as f64)))
        },
        "includes" => |_, this, a| {
            let items = this_array(this)?.borrow().clone();
            let needle = arg(a, 0);
            Ok(Value::Bool(items.iter().any(|v| v == &needle)))
        },
        "at" => |_, this, a| {
            let items = this_array(this)?.borrow().clone();
            let n = arg(a, 0).to_number();
            let i = if n < 0.0 { items.len() as f64 + n } else { n };
            Ok(if i >= 0.0 { items.get(i as usize).cloned().unwrap_or(Value::Undefined) } else { Value::Undefined })
        },
        "reverse" => |_, this, _| {
            this_array(this)?.borrow_mut().reverse();
            Ok(this.clone())
        },
        "fill" => |_, this, a| {
            let items = this_array(this)?;
            let len = items.borrow().len();
            let start = index_arg(a, 1, 0, len);
            let end = index_arg(a, 2, len, len);
            for slot in items.borrow_mut().iter_mut().take(end).skip(start) {
                *slot = arg(a, 0);
            }
            Ok(this.clone())
        },
        "flat" => |_, this, a| {
            let depth = match arg(a, 0) {
                Value::Undefined => 1,
                other => other.to_number().max(0.0) as usize,
            };
            let items = this_array(this)?.borrow().clone();
            Ok(Value::array(flatten(items, depth)))
        },
        "map" => |eval, this, a| {
            let f = callback(a, "map")?;
            let mut out = Vec::new();
            each::<()>(eval, this, &f, |_, _, r| {
                out.push(r);
                None
            })?;
            Ok(Value::array(out))
        },
        "flatMap" => |eval, this, a| {
            let f = callback(a, "flatMap")?;
            let mut out = Vec::new();
            each::<()>(eval, this, &f, |_, _, r| {
                out.push(r);
                None
            })?;
            Ok(Value::array(flatten(out, 1)))
        },
        "filter" => |eval, this, a| {
            let f = callback(a, "filter")?;
            let mut out = Vec::new();
            each::<()>(eval, this, &f, |_, item, r| {
                if r.is_truthy() {
                    out.push(item.clone());
                }
                None
            })?;
            Ok(Value::array(out))
        },
        "forEach" => |eval, this, a| {
            let f = callback(a, "forEach")?;
            each::<()>(eval, this, &f, |_, _, _| None)?;
            Ok(Value::Undefined)
        },
        "find" => |eval, this, a| {
            let f = callback(a, "find")?;
            let found = each(eval, this, &f, |_, item, r| r.is_truthy().then(|| item.clone()))?;
            Ok(found.unwrap_or(Value::Undefined))
        },
        "findIndex" => |eval, this, a| {
            let f = callback(a, "findIndex")?;
            let found = each(eval, this, &f, |i, _, r| r.is_truthy().then_some(i))?;
            Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
        },
        "some" => |eval, this, a| {
            let f = callback(a, "some")?;
            let found = each(eval, this, &f, |_, _, r| r.is_truthy().then_some(()))?;
            Ok(Value::Bool(found.is_some()))
        },
        "every" => |eval, this, a| {
            let f = callback(a, "every")?;
            let failed = each(eval, this, &f, |_, _, r| (!r.is_truthy()).then_some(()))?;
            Ok(Value::Bool(failed.is_none()))
        },
        "reduce" => |eval, this, a| {
            let f = callback(a, "reduce")?;
            let items = this_array(this)?.borrow().clone();
            let mut iter = items.into_iter().enumerate();
            let mut acc = if a.len() >= 2 {
                a[1].clone()
            } else {
                match iter.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(EvalError::Type("Reduce of empty array with no initial value".into()))
                    }
                }
            };
            for (i, item) in iter {
                acc = eval.call_function(&f, Value::Undefined, vec![acc, item, Value::Number(i as f64), this.clone()])?;
            }
            Ok(acc)
        },
        "sort" => |eval, this, a| {
            let items = this_array(this)?;
            let values = items.borrow().clone();
            let sorted = merge_sort(eval, values, &arg(a, 0))?;
            *items.borrow_mut() = sorted;
            Ok(this.clone())
        },
        "toString" => |_, this, _| Ok(Value::string(this.to_display_string())),
        _ => return None,
    })
}

fn flatten(items: Vec<Value>, depth: usize) -> Vec<Value> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => out.extend(flatten(inner.borrow().clone(), depth - 1)),
            other => out.push(other),
        }
    }
    out
}

/// Stable merge sort with a fallible comparator. `undefined` sorts last;
/// without a comparator values compare as strings.
fn merge_sort(eval: &mut Evaluator, values: Vec<Value>, compare: &Value) -> EvalResult<Vec<Value>> {
    let (mut defined, undefined): (Vec<Value>, Vec<Value>) =
        values.into_iter().partition(|v| !matches!(v, Value::Undefined));
    let mut buf = defined.clone();
    let len = defined.len();
    let mut width = 1;
    while width < len {
        let mut start = 0;
        while start < len {
            let mid = (start + width).min(len);
            let end = (start + 2 * width).min(len);
            let (mut i, mut j, mut k) = (start, mid, start);
            while i < mid && j < end {
                if compare_values(eval, &defined[j], &defined[i], compare)? == Ordering::Less {
                    buf[k] = defined[j].clone();
                    j += 1;
                } else {
                    buf[k] = defined[i].clone();
                    i += 1;
                }
                k += 1;
            }
            buf[k..k + (mid - i)].clone_from_slice(&defined[i..mid]);
            k += mid - i;
            buf[k..k + (end - j)].clone_from_slice(&defined[j..end]);
            start = end;
        }
        std::mem::swap(&mut defined, &mut buf);
        width *= 2;
    }
    defined.extend(undefined);
    Ok(defined)
}

fn compare_values(eval: &mut Evaluator, a: &Value, b: &Value, compare: &Value) -> EvalResult<Ordering> {
    match compare {
        Value::Function(_) => {
            let n = eval.call_function(compare, Value::Undefined, vec![a.clone(), b.clone()])?.to_number();
            Ok(if n < 0.0 {
                Ordering::Less
            } else if n > 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            })
        }
        _ => Ok(a.to_display_string().cmp(&b.to_display_string())),
    }
}

// ── Test API ─────────────────────────────────────────────────────────────────

const MATCHERS: &[(&str, NativeFn)] = &[
    ("toBe", matcher_to_be),
    ("toEqual", matcher_to_equal),
    ("toBeTruthy", |_, s, _| verdict(s, |v| v.is_truthy(), "to be truthy", None)),
    ("toBeFalsy", |_, s, _| verdict(s, |v| !v.is_truthy(), "to be falsy", None)),
    ("toBeNull", |_, s, _| verdict(s, |v| matches!(v, Value::Null), "to be null", None)),
    ("toBeUndefined", |_, s, _| verdict(s, |v| matches!(v, Value::Undefined), "to be undefined", None)),
    ("toBeDefined", |_, s, _| verdict(s, |v| !matches!(v, Value::Undefined), "to be defined", None)),
    ("toMatch", matcher_to_match),
    ("toContain", matcher_to_contain),
    ("toHaveLength", matcher_to_have_length),
    ("toBeGreaterThan", |_, s, a| {
        let n = arg(a, 0).to_number();
        verdict(s, |v| v.to_number() > n, "to be greater than", Some(&arg(a, 0)))
    }),
    ("toBeLessThan", |_, s, a| {
        let n = arg(a, 0).to_number();
        verdict(s, |v| v.to_number() < n, "to be less than", Some(&arg(a, 0)))
    }),
    ("toThrow", matcher_to_throw),
];

fn expect(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let actual = arg(a, 0);
    let build = |negated: bool| {
        let subject = Value::array(vec![actual.clone(), Value::Bool(negated)]);
        MATCHERS
            .iter()
            .map(|(name, f)| (name.to_string(), Value::native_bound(*name, *f, Some(subject.clone()))))
            .collect::<IndexMap<String, Value>>()
    };
    let mut props = build(false);
    props.insert("not".into(), Value::object(build(true)));
    Ok(Value::object(props))
}

/// The `(actual, negated)` pair an `expect(...)` matcher is bound to.
fn subject(bound: &Value) -> (Value, bool) {
    match bound {
        Value::Array(pair) => {
            let pair = pair.borrow();
            (arg(&pair, 0), arg(&pair, 1).is_truthy())
        }
        _ => (Value::Undefined, false),
    }
}

fn verdict(
    bound: &Value,
    check: impl FnOnce(&Value) -> bool,
    what: &str,
    expected: Option<&Value>,
) -> EvalResult<Value> {
    let (actual, negated) = subject(bound);
    if check(&actual) != negated {
        return Ok(Value::Undefined);
    }
    let not = if negated { "not " } else { "" };
    let tail = expected.map(|e| format!(" {}", e.inspect())).unwrap_or_default();
    Err(EvalError::AssertionFailed(format!("expected {} {not}{what}{tail}", actual.inspect())))
}

fn matcher_to_be(_: &mut Evaluator, bound: &Value, a: &[Value]) -> EvalResult<Value> {
    let expected = arg(a, 0);
    verdict(
        bound,
        |v| match (v, &expected) {
            (Value::Number(x), Value::Number(y)) => numbers_equal(*x, *y),
            _ => strict_equals(v, &expected),
        },
        "to be",
        Some(&expected),
    )
}

fn matcher_to_equal(_: &mut Evaluator, bound: &Value, a: &[Value]) -> EvalResult<Value> {
    let expected = arg(a, 0);
    verdict(bound, |v| deep_equal(v, &expected), "to equal", Some(&expected))
}

fn matcher_to_match(_: &mut Evaluator, bound: &Value, a: &[Value]) -> EvalResult<Value> {
    let pattern = arg(a, 0);
    let (actual, negated) = subject(bound);
    let result = match (&actual, &pattern) {
        (Value::String(s), Value::Regex(re)) => {
            if re.regex.is_match(s) {
                Ok(())
            } else {
                Err(format!("expected {} to match /{}/", actual.inspect(), re.source))
            }
        }
        _ => type_matches(&actual, &pattern)
            .map_err(|m| format!("expected {} to match {}: {m}", actual.inspect(), pattern.inspect())),
    };
    match (result, negated) {
        (Ok(()), false) | (Err(_), true) => Ok(Value::Undefined),
        (Err(msg), false) => Err(EvalError::AssertionFailed(msg)),
        (Ok(()), true) => Err(EvalError::AssertionFailed(format!(
            "expected {} not to match {}",
            actual.inspect(),
            pattern.inspect()
        ))),
    }
}

fn matcher_to_contain(_: &mut Evaluator, bound: &Value, a: &[Value]) -> EvalResult<Value> {
    let needle = arg(a, 0);
    verdict(
        bound,
        |v| match v {
            Value::Array(items) => items.borrow().iter().any(|x| deep_equal(x, &needle)),
            Value::String(s) => s.contains(&*needle.to_display_string()),
            _ => false,
        },
        "to contain",
        Some(&needle),
    )
}

fn matcher_to_have_length(eval: &mut Evaluator, bound: &Value, a: &[Value]) -> EvalResult<Value> {
    let (actual, _) = subject(bound);
    let len = match &actual {
        Value::Array(_) | Value::String(_) | Value::Object(_) => eval.get_property(&actual, "length")?,
        _ => Value::Undefined,
    };
    let expected = arg(a, 0);
    verdict(bound, |_| strict_equals(&len, &expected), "to have length", Some(&expected))
}

fn matcher_to_throw(eval: &mut Evaluator, bound: &Value, a: &[Value]) -> EvalResult<Value> {
    let (actual, negated) = subject(bound);
    if !matches!(actual, Value::Function(_)) {
        return Err(EvalError::AssertionFailed(format!(
            "expected a function, received {}",
            actual.inspect()
        )));
    }
    let thrown = match eval.call_function(&actual, Value::Undefined, Vec::new()) {
        Ok(_) => None,
        Err(err) if err.is_catchable() => Some(err.message()),
        Err(err) => return Err(err),
    };
    let expected = arg(a, 0);
    let matches = match (&thrown, &expected) {
        (None, _) => false,
        (Some(_), Value::Undefined) => true,
        (Some(msg), Value::Regex(re)) => re.regex.is_match(msg),
        (Some(msg), other) => msg.contains(&*other.to_display_string()),
    };
    if matches != negated {
        return Ok(Value::Undefined);
    }
    Err(EvalError::AssertionFailed(match (thrown, negated) {
        (None, _) => "expected function to throw".to_string(),
        (Some(msg), true) => format!("expected function not to throw, but it threw '{msg}'"),
        (Some(msg), false) => format!("expected function to throw {}, but it threw '{msg}'", expected.inspect()),
    }))
}

fn assert(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    if arg(a, 0).is_truthy() {
        return Ok(Value::Undefined);
    }
    Err(EvalError::AssertionFailed(match arg(a, 1) {
        Value::Undefined => "assertion failed".to_string(),
        msg => msg.to_display_string(),
    }))
}

// ── Runtime helpers ──────────────────────────────────────────────────────────

fn type_object(name: &Value, description: Value, fields: Vec<(&str, Value)>) -> Value {
    let mut props = IndexMap::new();
    props.insert(TYPE_MARKER.to_string(), Value::Bool(true));
    props.insert("name".to_string(), name.clone());
    props.insert("description".to_string(), description);
    for (key, value) in fields {
        props.insert(key.to_string(), value);
    }
    props.insert("check".to_string(), Value::native("check", type_check));
    Value::object(props)
}

/// `true` when `value` is a plain object whose keys are a non-empty subset
/// of the `Type` spec keys.
fn is_type_spec(value: &Value) -> bool {
    if is_type_object(value) {
        return false;
    }
    let Value::Object(obj) = value else {
        return false;
    };
    let obj = obj.borrow();
    !obj.props.is_empty() && obj.props.keys().all(|k| TYPE_SPEC_KEYS.contains(&k.as_str()))
}

/// `Type(name, example, description?)` or `Type(name, { example, predicate, ... })`.
fn type_helper(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let name = arg(a, 0);
    let second = arg(a, 1);
    if is_type_spec(&second) {
        let field = |k: &str| second.get_own(k).unwrap_or(Value::Undefined);
        let description = match arg(a, 2) {
            Value::Undefined => field("description"),
            d => d,
        };
        let example = match field("example") {
            Value::Undefined => field("default"),
            e => e,
        };
        return Ok(type_object(
            &name,
            description,
            vec![("example", example), ("predicate", field("predicate"))],
        ));
    }
    Ok(type_object(&name, arg(a, 2), vec![("example", second)]))
}

/// `Union(name, description, members)` or `Union(name, members)`.
fn union_helper(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let (description, members) = match (arg(a, 1), arg(a, 2)) {
        (list @ Value::Array(_), Value::Undefined) => (Value::Undefined, list),
        (d, list @ Value::Array(_)) => (d, list),
        (_, other) => {
            return Err(EvalError::Type(format!("Union members must be an array, got {}", other.inspect())))
        }
    };
    let Value::Array(list) = &members else {
        return Ok(Value::Undefined);
    };
    let first = list.borrow().first().cloned().unwrap_or(Value::Undefined);
    let example = if is_type_object(&first) {
        first.get_own("example").unwrap_or(Value::Undefined)
    } else {
        first
    };
    Ok(type_object(&arg(a, 0), description, vec![("members", members), ("example", example)]))
}

/// `Name.check(value)`
fn type_check(eval: &mut Evaluator, this: &Value, a: &[Value]) -> EvalResult<Value> {
    let value = arg(a, 0);
    if type_matches(&value, this).is_err() {
        return Ok(Value::Bool(false));
    }
    match this.get_own("predicate") {
        Some(predicate @ Value::Function(_)) => {
            let ok = eval.call_function(&predicate, Value::Undefined, vec![value])?;
            Ok(Value::Bool(ok.is_truthy()))
        }
        _ => Ok(Value::Bool(true)),
    }
}

/// `Enum(name, description, entries)` or `Enum(name, entries)`: a frozen
/// copy of the entries.
fn enum_helper(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let entries = match (arg(a, 1), arg(a, 2)) {
        (e @ Value::Object(_), Value::Undefined) => e,
        (_, e) => e,
    };
    let props = own_entries(&entries).into_iter().collect();
    let result = Value::object(props);
    if let Value::Object(obj) = &result {
        obj.borrow_mut().frozen = true;
    }
    Ok(result)
}

/// `Generic(name, params, declaration)`
fn generic_helper(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let declaration = arg(a, 2);
    let example = declaration.get_own("example").unwrap_or(Value::Undefined);
    Ok(type_object(
        &arg(a, 0),
        declaration.get_own("description").unwrap_or(Value::Undefined),
        vec![("params", arg(a, 1)), ("declaration", declaration), ("example", example)],
    ))
}

/// `__extend(target, methods)`: attach methods to a builtin type or class.
fn extend_helper(eval: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let target = match arg(a, 0) {
        Value::String(s) => s.to_string(),
        Value::Function(f) => f.name.clone(),
        other => return Err(EvalError::Type(format!("cannot extend {}", other.inspect()))),
    };
    let table = eval.extensions.entry(target).or_default();
    for (name, method) in own_entries(&arg(a, 1)) {
        table.insert(name, method);
    }
    Ok(Value::Undefined)
}

/// `__overloadClass(Name$class, Name$new)`: construction and plain calls
/// go through the dispatcher; statics and `instanceof` see the class.
fn overload_class_helper(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let class = arg(a, 0);
    let dispatch = arg(a, 1);
    let name = match &class {
        Value::Function(f) => f.name.trim_end_matches("$class").to_string(),
        _ => String::new(),
    };
    Ok(Value::function(name, FunctionKind::OverloadedClass { class, dispatch }))
}

/// Read a serialized [`TypeDescriptor`] passed to a strict-mode guard.
fn descriptor_arg(value: &Value) -> EvalResult<TypeDescriptor> {
    value
        .to_json()
        .and_then(|json| serde_json::from_value(json).ok())
        .ok_or_else(|| EvalError::Type(format!("{} is not a type descriptor", value.inspect())))
}

/// `__checkReturn(value, type, name)`: the value itself, or a tagged error
/// when it does not satisfy the declared return type.
fn check_return_helper(_: &mut Evaluator, _: &Value, a: &[Value]) -> EvalResult<Value> {
    let value = arg(a, 0);
    let desc = descriptor_arg(&arg(a, 1))?;
    match check_type(&value, &desc) {
        Ok(()) => Ok(value),
        Err(mismatch) => {
            let mut props = IndexMap::new();
            props.insert("$error".to_string(), Value::Bool(true));
            props.insert(
                "message".to_string(),
                Value::string(format!(
                    "return value of {} does not match example: {mismatch}",
                    arg(a, 2).to_display_string()
                )),
            );
            props.insert("returns".to_string(), Value::Bool(true));
            Ok(Value::object(props))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::DEFAULT_GAS_LIMIT;

    fn eval() -> Evaluator {
        Evaluator::new(DEFAULT_GAS_LIMIT)
    }

    fn nums(values: &[f64]) -> Vec<Value> {
        values.iter().map(|n| Value::Number(*n)).collect()
    }

    #[test]
    fn test_merge_sort_default_is_string_order() {
        let mut e = eval();
        let sorted = merge_sort(&mut e, nums(&[10.0, 9.0, 1.0, 100.0]), &Value::Undefined).unwrap();
        assert_eq!(sorted, nums(&[1.0, 10.0, 100.0, 9.0]));
    }

    #[test]
    fn test_merge_sort_with_comparator_is_stable() {
        let mut e = eval();
        let cmp = Value::native("cmp", |_, _, a| Ok(Value::Number(arg(a, 0).to_number().floor() - arg(a, 1).to_number().floor())));
        let sorted = merge_sort(&mut e, nums(&[2.5, 1.0, 2.1, 0.5, 2.9]), &cmp).unwrap();
        assert_eq!(sorted, nums(&[0.5, 1.0, 2.5, 2.1, 2.9]));
    }

    #[test]
    fn test_parse_int_and_float() {
        let mut e = eval();
        let int = |e: &mut Evaluator, s: &str| parse_int(e, &Value::Undefined, &[Value::string(s)]).unwrap();
        assert_eq!(int(&mut e, "42px"), Value::Number(42.0));
        assert_eq!(int(&mut e, "-0x1f"), Value::Number(-31.0));
        assert_eq!(int(&mut e, "abc"), Value::Number(f64::NAN));
        let float = parse_float(&mut e, &Value::Undefined, &[Value::string("3.5e2x")]).unwrap();
        assert_eq!(float, Value::Number(350.0));
    }

    #[test]
    fn test_type_spec_detection() {
        let spec = Value::object(IndexMap::from([("example".to_string(), Value::Number(0.0))]));
        assert!(is_type_spec(&spec));
        let plain = Value::object(IndexMap::from([("x".to_string(), Value::Number(0.0))]));
        assert!(!is_type_spec(&plain));
        assert!(!is_type_spec(&Value::object(IndexMap::new())));
    }

    #[test]
    fn test_to_radix() {
        assert_eq!(to_radix(255.0, 16), "ff");
        assert_eq!(to_radix(-5.0, 2), "-101");
        assert_eq!(to_radix(1.5, 2), "1.5");
    }
}
