//! Structural type compatibility.
//!
//! This is not value equality: an example value stands for every value of
//! its shape. [`type_matches`] compares a value against an example,
//! [`check_type`] against a [`TypeDescriptor`]. Both report the first
//! mismatch with a path such as `.items[2].name`.

use crate::equality::deep_equal;
use crate::value::Value;
use exemplar_types::{TypeDescriptor, TypeKind};
use indexmap::IndexMap;
use thiserror::Error;

const MAX_DEPTH: usize = 64;

/// Property marking objects built by the `Type`/`Union` runtime helpers.
pub const TYPE_MARKER: &str = "__exemplarType";

/// The first structural mismatch found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}expected {expected}, received {received}", at_path(.path))]
pub struct Mismatch {
    /// Path from the root, empty for the root itself.
    pub path: String,
    pub expected: String,
    pub received: String,
}

fn at_path(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("at {path}: ")
    }
}

impl Mismatch {
    fn new(path: &str, expected: impl Into<String>, received: &Value) -> Self {
        Self {
            path: path.to_string(),
            expected: expected.into(),
            received: received_name(received),
        }
    }
}

fn received_name(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Array(_) => "array".into(),
        other => other.type_of().into(),
    }
}

/// Does `value` have the shape of the example `pattern`?
///
/// - `null` matches only `null`; `undefined` matches anything.
/// - A primitive matches by dynamic type.
/// - `[]` matches any array; `[p]` requires every element to match `p`.
/// - An object requires every pattern key, each recursively compatible;
///   extra keys are ignored.
/// - A value built by the `Type`/`Union` helpers matches through the
///   example it carries.
pub fn type_matches(value: &Value, pattern: &Value) -> Result<(), Mismatch> {
    matches_at(value, pattern, "", 0)
}

fn matches_at(value: &Value, pattern: &Value, path: &str, depth: usize) -> Result<(), Mismatch> {
    if depth > MAX_DEPTH {
        return Ok(());
    }
    match pattern {
        Value::Undefined => Ok(()),
        Value::Null => match value {
            Value::Null => Ok(()),
            _ => Err(Mismatch::new(path, "null", value)),
        },
        Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Function(_) => {
            if value.type_of() == pattern.type_of() && !matches!(value, Value::Null) {
                Ok(())
            } else {
                Err(Mismatch::new(path, pattern.type_of(), value))
            }
        }
        Value::Regex(re) => match value {
            Value::String(s) if re.regex.is_match(s) => Ok(()),
            Value::String(_) => Err(Mismatch::new(path, format!("string matching /{}/", re.source), value)),
            _ => Err(Mismatch::new(path, "string", value)),
        },
        Value::Array(items) => {
            let Value::Array(actual) = value else {
                return Err(Mismatch::new(path, "array", value));
            };
            let Some(first) = items.borrow().first().cloned() else {
                return Ok(());
            };
            for (i, item) in actual.borrow().iter().enumerate() {
                matches_at(item, &first, &format!("{path}[{i}]"), depth + 1)?;
            }
            Ok(())
        }
        Value::Object(obj) => {
            if is_type_object(pattern) {
                if let Some(Value::Array(members)) = pattern.get_own("members") {
                    let members = members.borrow().clone();
                    let found = members.iter().any(|m| {
                        if is_type_object(m) {
                            matches_at(value, m, path, depth + 1).is_ok()
                        } else {
                            deep_equal(value, m)
                        }
                    });
                    return if found {
                        Ok(())
                    } else {
                        let name = pattern.get_own("name").map(|n| n.to_display_string());
                        Err(Mismatch::new(path, name.unwrap_or_else(|| "union member".into()), value))
                    };
                }
                let example = pattern.get_own("example").unwrap_or(Value::Undefined);
                return matches_at(value, &example, path, depth + 1);
            }
            if !matches!(value, Value::Object(_)) {
                return Err(Mismatch::new(path, "object", value));
            }
            let expected: Vec<(String, Value)> = obj
                .borrow()
                .props
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, sub) in expected {
                let child = format!("{path}.{key}");
                match value.get_own(&key) {
                    Some(actual) => matches_at(&actual, &sub, &child, depth + 1)?,
                    None if matches!(sub, Value::Undefined) => {}
                    None => {
                        return Err(Mismatch {
                            path: child,
                            expected: received_name(&sub),
                            received: "missing property".into(),
                        })
                    }
                }
            }
            Ok(())
        }
    }
}

/// `true` for objects built by the `Type`/`Union`/`Generic` helpers.
pub fn is_type_object(value: &Value) -> bool {
    matches!(value.get_own(TYPE_MARKER), Some(Value::Bool(true)))
}

/// Does `value` satisfy the descriptor?
pub fn check_type(value: &Value, desc: &TypeDescriptor) -> Result<(), Mismatch> {
    check_at(value, desc, "", 0)
}

fn check_at(value: &Value, desc: &TypeDescriptor, path: &str, depth: usize) -> Result<(), Mismatch> {
    if depth > MAX_DEPTH {
        return Ok(());
    }
    if desc.nullable && value.is_nullish() {
        return Ok(());
    }
    let ok = match desc.kind {
        TypeKind::Any => true,
        TypeKind::String => matches!(value, Value::String(_)),
        TypeKind::Number => matches!(value, Value::Number(_)),
        TypeKind::Integer => matches!(value, Value::Number(n) if n.fract() == 0.0),
        TypeKind::NonNegativeInteger => {
            matches!(value, Value::Number(n) if n.fract() == 0.0 && *n >= 0.0)
        }
        TypeKind::Boolean => matches!(value, Value::Bool(_)),
        TypeKind::Null => matches!(value, Value::Null),
        TypeKind::Undefined => matches!(value, Value::Undefined),
        TypeKind::Union => {
            let members = desc.members.as_deref().unwrap_or_default();
            if members.iter().any(|m| check_at(value, m, path, depth + 1).is_ok()) {
                return Ok(());
            }
            return Err(Mismatch::new(path, desc.to_string(), value));
        }
        TypeKind::Array => {
            let Value::Array(items) = value else {
                return Err(Mismatch::new(path, desc.to_string(), value));
            };
            if let Some(item_desc) = &desc.items {
                for (i, item) in items.borrow().iter().enumerate() {
                    check_at(item, item_desc, &format!("{path}[{i}]"), depth + 1)?;
                }
            }
            return Ok(());
        }
        TypeKind::Object => {
            if !matches!(value, Value::Object(_)) {
                return Err(Mismatch::new(path, "object", value));
            }
            if let Some(params) = &desc.destructured_params {
                for (key, param) in params {
                    check_property(value, key, &param.ty, param.required, path, depth)?;
                }
            } else if let Some(shape) = &desc.shape {
                for (key, sub) in shape {
                    let required = !sub.nullable && !matches!(sub.kind, TypeKind::Undefined | TypeKind::Any);
                    check_property(value, key, sub, required, path, depth)?;
                }
            }
            return Ok(());
        }
    };
    if ok {
        Ok(())
    } else {
        Err(Mismatch::new(path, desc.to_string(), value))
    }
}

fn check_property(
    value: &Value,
    key: &str,
    desc: &TypeDescriptor,
    required: bool,
    path: &str,
    depth: usize,
) -> Result<(), Mismatch> {
    let child = format!("{path}.{key}");
    match value.get_own(key) {
        Some(Value::Undefined) | None if !required => Ok(()),
        Some(actual) => check_at(&actual, desc, &child, depth + 1),
        None => Err(Mismatch {
            path: child,
            expected: desc.to_string(),
            received: "missing property".into(),
        }),
    }
}

/// Infer a descriptor from a runtime value, as the example path would from
/// the literal that produced it.
pub fn infer_type_from_value(value: &Value) -> TypeDescriptor {
    infer_at(value, 0)
}

fn infer_at(value: &Value, depth: usize) -> TypeDescriptor {
    if depth > MAX_DEPTH {
        return TypeDescriptor::any();
    }
    match value {
        Value::Undefined => TypeDescriptor::undefined(),
        Value::Null => TypeDescriptor::null(),
        Value::Bool(_) => TypeDescriptor::boolean(),
        Value::Number(_) => TypeDescriptor::number(),
        Value::String(_) => TypeDescriptor::string(),
        Value::Array(items) => TypeDescriptor::array(
            items
                .borrow()
                .first()
                .map(|v| infer_at(v, depth + 1))
                .unwrap_or_else(TypeDescriptor::any),
        ),
        Value::Object(obj) => {
            let shape: IndexMap<String, TypeDescriptor> = obj
                .borrow()
                .props
                .iter()
                .map(|(k, v)| (k.clone(), infer_at(v, depth + 1)))
                .collect();
            TypeDescriptor::object(shape)
        }
        Value::Function(_) | Value::Regex(_) => TypeDescriptor::any(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(items: Vec<Value>) -> Value {
        Value::array(items)
    }

    fn obj(fields: &[(&str, Value)]) -> Value {
        Value::object(fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn test_empty_array_pattern_matches_any_array() {
        let pattern = arr(vec![]);
        assert!(type_matches(&arr(vec![Value::string("x"), Value::Null]), &pattern).is_ok());
        assert!(type_matches(&Value::Number(1.0), &pattern).is_err());
    }

    #[test]
    fn test_array_elements_match_first_element() {
        let pattern = arr(vec![Value::Number(0.0)]);
        assert!(type_matches(&arr(vec![]), &pattern).is_ok());
        let err = type_matches(&arr(vec![Value::Number(1.0), Value::string("x")]), &pattern)
            .unwrap_err();
        assert_eq!(err.path, "[1]");
        assert_eq!(err.to_string(), "at [1]: expected number, received string");
    }

    #[test]
    fn test_null_pattern_only_matches_null() {
        assert!(type_matches(&Value::Null, &Value::Null).is_ok());
        assert!(type_matches(&Value::Number(0.0), &Value::Null).is_err());
        assert!(type_matches(&Value::Null, &Value::Number(0.0)).is_err());
    }

    #[test]
    fn test_object_pattern_ignores_extra_keys() {
        let pattern = obj(&[("name", Value::string("")), ("tags", arr(vec![Value::string("")]))]);
        let value = obj(&[
            ("name", Value::string("a")),
            ("tags", arr(vec![Value::string("t")])),
            ("extra", Value::Bool(true)),
        ]);
        assert!(type_matches(&value, &pattern).is_ok());

        let missing = obj(&[("name", Value::string("a"))]);
        let err = type_matches(&missing, &pattern).unwrap_err();
        assert_eq!(err.path, ".tags");
    }

    #[test]
    fn test_check_type_numeric_kinds() {
        let nn = TypeDescriptor::of(TypeKind::NonNegativeInteger);
        assert!(check_type(&Value::Number(3.0), &nn).is_ok());
        assert!(check_type(&Value::Number(-3.0), &nn).is_err());
        assert!(check_type(&Value::Number(1.5), &TypeDescriptor::of(TypeKind::Integer)).is_err());
    }

    #[test]
    fn test_check_type_nullable_and_union() {
        let desc = TypeDescriptor::string().into_nullable();
        assert!(check_type(&Value::Null, &desc).is_ok());
        assert!(check_type(&Value::Number(1.0), &desc).is_err());

        let union = TypeDescriptor::union(vec![TypeDescriptor::string(), TypeDescriptor::number()]);
        assert!(check_type(&Value::Number(1.0), &union).is_ok());
        assert!(check_type(&Value::Bool(true), &union).is_err());
    }

    #[test]
    fn test_inferred_type_checks_its_value() {
        let values = vec![
            Value::Null,
            Value::string("s"),
            Value::Number(2.5),
            Value::Bool(false),
            arr(vec![]),
            arr(vec![obj(&[("a", Value::Number(1.0))])]),
            obj(&[("x", Value::Null), ("y", arr(vec![Value::string("")]))]),
        ];
        for value in values {
            let desc = infer_type_from_value(&value);
            assert!(check_type(&value, &desc).is_ok(), "{value:?} vs {desc}");
        }
    }
}
