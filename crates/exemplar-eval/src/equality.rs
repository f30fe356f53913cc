//! Value equality: strict, loose, and the deep structural equality used by
//! `Is`/`IsNot` and by `toEqual`.

use crate::value::Value;

/// Relative tolerance applied when a compared number is non-integer.
pub const RELATIVE_EPSILON: f64 = 1e-9;

const MAX_DEPTH: usize = 64;

/// `===`
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        _ => a == b,
    }
}

/// `==`: strict equality plus `null == undefined` and number/string/boolean
/// coercion.
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        _ if a.is_nullish() && b.is_nullish() => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            a.to_number() == b.to_number()
        }
        (Value::Bool(_), _) => loose_equals(&Value::Number(a.to_number()), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Number(b.to_number())),
        _ => strict_equals(a, b),
    }
}

/// Compare two numbers: exact for integers, relative epsilon otherwise;
/// `NaN` equals `NaN`.
pub fn numbers_equal(x: f64, y: f64) -> bool {
    if x.is_nan() || y.is_nan() {
        return x.is_nan() && y.is_nan();
    }
    if x == y {
        return true;
    }
    if x.fract() == 0.0 && y.fract() == 0.0 {
        return false;
    }
    if !x.is_finite() || !y.is_finite() {
        return false;
    }
    (x - y).abs() <= RELATIVE_EPSILON * x.abs().max(y.abs())
}

/// Deep structural equality.
///
/// Arrays compare element-wise, objects compare by key set and value,
/// functions and patterns by identity.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    deep_equal_at(a, b, 0)
}

fn deep_equal_at(a: &Value, b: &Value, depth: usize) -> bool {
    if depth > MAX_DEPTH {
        return a.same_reference(b);
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(*x, *y),
        (Value::Array(x), Value::Array(y)) => {
            if std::rc::Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| deep_equal_at(l, r, depth + 1))
        }
        (Value::Object(x), Value::Object(y)) => {
            if std::rc::Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.props.len() == y.props.len()
                && x.props.iter().all(|(key, l)| {
                    y.props.get(key).is_some_and(|r| deep_equal_at(l, r, depth + 1))
                })
        }
        (Value::Regex(x), Value::Regex(y)) => x.source == y.source && x.flags == y.flags,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_epsilon_only_for_non_integers() {
        assert!(deep_equal(&num(0.1 + 0.2), &num(0.3)));
        assert!(!deep_equal(&num(1.0), &num(2.0)));
        assert!(!deep_equal(&num(1e15), &num(1e15 + 1.0)));
        assert!(deep_equal(&num(f64::NAN), &num(f64::NAN)));
    }

    #[test]
    fn test_structures() {
        let a = Value::array(vec![num(1.0), Value::string("x")]);
        let b = Value::array(vec![num(1.0), Value::string("x")]);
        assert!(deep_equal(&a, &b));
        assert!(!strict_equals(&a, &b));

        let o1 = Value::object(IndexMap::from([("a".into(), num(1.0)), ("b".into(), Value::Null)]));
        let o2 = Value::object(IndexMap::from([("b".into(), Value::Null), ("a".into(), num(1.0))]));
        let o3 = Value::object(IndexMap::from([("a".into(), num(1.0))]));
        assert!(deep_equal(&o1, &o2));
        assert!(!deep_equal(&o1, &o3));
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(loose_equals(&num(1.0), &Value::string("1")));
        assert!(loose_equals(&Value::Bool(true), &num(1.0)));
        assert!(!loose_equals(&Value::Null, &num(0.0)));
        assert!(!strict_equals(&num(f64::NAN), &num(f64::NAN)));
    }
}
