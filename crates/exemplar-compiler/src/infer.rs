//! Example inference: a parsed example value → [`TypeDescriptor`].
//!
//! | Example              | Descriptor                         |
//! |----------------------|------------------------------------|
//! | `''`, `` `t` ``      | string                             |
//! | `0`, `-1.5`          | number                             |
//! | `+0`                 | non-negative-integer               |
//! | `+(-1)`              | integer                            |
//! | `false`              | boolean                            |
//! | `null`, `undefined`  | null, undefined                    |
//! | `[x, ...]`           | array of the type of `x`           |
//! | `{ k: v }`           | object with one shape entry per key |
//! | `a \|\| null`        | `a` nullable                       |
//! | `a \|\| b`           | union of `a` and `b`               |
//! | `a && b`, `a ?? b`   | type of `b`                        |
//! | any other identifier | any (a declared type name is kept as a reference) |

use exemplar_types::ast::{Expr, ExprKind, LogicalOp, ObjectProp, PropKey, UnaryOp};
use exemplar_types::{Diagnostic, ErrorCode, SourceFile, TypeDescriptor, TypeKind};
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// Infer the descriptor of an example expression.
///
/// `type_names` are names declared by `Type`/`Union`/`Enum`/`Generic`
/// blocks; using one as an example yields `any` with the name noted.
pub fn infer_from_example(expr: &Expr, type_names: &BTreeSet<String>) -> TypeDescriptor {
    match &expr.kind {
        ExprKind::Null => TypeDescriptor::null(),
        ExprKind::String(_) | ExprKind::Template(_) => TypeDescriptor::string(),
        ExprKind::Number(_) => TypeDescriptor::number(),
        ExprKind::Bool(_) => TypeDescriptor::boolean(),
        ExprKind::Ident(name) if name == "undefined" => TypeDescriptor::undefined(),
        ExprKind::Ident(name) if type_names.contains(name) => TypeDescriptor::reference(name.clone()),
        ExprKind::Ident(_) => TypeDescriptor::any(),
        ExprKind::Paren(inner) => infer_from_example(inner, type_names),
        ExprKind::Unary { op: UnaryOp::Plus, operand } => match &operand.unparen().kind {
            ExprKind::Number(n) if n.fract() == 0.0 => TypeDescriptor::of(TypeKind::NonNegativeInteger),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } if matches!(operand.unparen().kind, ExprKind::Number(n) if n.fract() == 0.0) => {
                TypeDescriptor::of(TypeKind::Integer)
            }
            _ => TypeDescriptor::number(),
        },
        ExprKind::Unary { op: UnaryOp::Neg, .. } => TypeDescriptor::number(),
        ExprKind::Array(items) => match items.first() {
            Some(first) if !matches!(first.kind, ExprKind::Spread(_)) => {
                TypeDescriptor::array(infer_from_example(first, type_names))
            }
            _ => TypeDescriptor::array(TypeDescriptor::any()),
        },
        ExprKind::Object(props) => {
            let mut shape = IndexMap::new();
            for prop in props {
                if let ObjectProp::Property {
                    key: PropKey::Named(key),
                    value,
                    ..
                } = prop
                {
                    shape.insert(key.clone(), infer_from_example(value, type_names));
                }
            }
            TypeDescriptor::object(shape)
        }
        ExprKind::Logical { op, left, right } => match op {
            LogicalOp::Or => {
                let l = infer_from_example(left, type_names);
                let r = infer_from_example(right, type_names);
                if r.kind == TypeKind::Null {
                    l.into_nullable()
                } else if l.kind == TypeKind::Null {
                    r.into_nullable()
                } else {
                    TypeDescriptor::union(vec![l, r])
                }
            }
            LogicalOp::And | LogicalOp::Nullish => infer_from_example(right, type_names),
        },
        _ => TypeDescriptor::any(),
    }
}

/// The first part of `expr` that is not a value, described for a message.
pub fn non_value(expr: &Expr) -> Option<&'static str> {
    match &expr.kind {
        ExprKind::Null
        | ExprKind::String(_)
        | ExprKind::Number(_)
        | ExprKind::Bool(_)
        | ExprKind::Ident(_) => None,
        ExprKind::Template(t) => t.exprs.iter().find_map(non_value),
        ExprKind::Paren(inner) => non_value(inner),
        ExprKind::Unary {
            op: UnaryOp::Plus | UnaryOp::Neg,
            operand,
        } => non_value(operand),
        ExprKind::Member { object, .. } => non_value(object),
        ExprKind::Array(items) => items.iter().find_map(|item| match &item.kind {
            ExprKind::Spread(_) => Some("a spread element"),
            _ => non_value(item),
        }),
        ExprKind::Object(props) => props.iter().find_map(|prop| match prop {
            ObjectProp::Property { value, .. } => non_value(value),
            ObjectProp::Spread(_) => Some("a spread element"),
        }),
        ExprKind::Logical { left, right, .. } => non_value(left).or_else(|| non_value(right)),
        ExprKind::Call { .. } => Some("a call"),
        ExprKind::New { .. } => Some("an object construction"),
        ExprKind::Function(_) => Some("a function"),
        ExprKind::Assign { .. } | ExprKind::Update { .. } => Some("an assignment"),
        ExprKind::Await(_) => Some("an await"),
        ExprKind::This => Some("'this'"),
        ExprKind::Regex { .. } => Some("a regular expression"),
        _ => Some("an operator expression"),
    }
}

/// Where an example was written, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ExampleSite<'a> {
    pub filename: &'a str,
    pub line: u32,
    pub column: u32,
}

impl ExampleSite<'_> {
    fn error(&self, message: String, example: &str) -> Diagnostic {
        Diagnostic::new(ErrorCode::INVALID_EXAMPLE, message, self.line, self.column)
            .with_filename(self.filename)
            .with_received(example)
    }
}

/// Parse `example` and infer its descriptor.
///
/// With `strict`, the example must be a value (literals and literal
/// composites); a default expression is instead allowed to be anything and
/// infers `any` when it is not a value.
pub fn describe_example(
    example: &str,
    site: ExampleSite<'_>,
    strict: bool,
    type_names: &BTreeSet<String>,
) -> Result<TypeDescriptor, Diagnostic> {
    let source = SourceFile::new(site.filename, example);
    let expr = match exemplar_parser::parse_expression(&source) {
        Ok(expr) => expr,
        Err(errors) if strict => {
            let reason = errors
                .first_error()
                .map(|d| d.message.clone())
                .unwrap_or_else(|| "it does not parse".into());
            return Err(site.error(format!("'{example}' is not a valid example: {reason}"), example));
        }
        Err(_) => return Ok(TypeDescriptor::any()),
    };
    match non_value(&expr) {
        Some(what) if strict => Err(site
            .error(format!("'{example}' cannot be used as an example: it contains {what}"), example)
            .with_suggestion("use a literal value such as '', 0, false, [] or {}")),
        Some(_) => Ok(TypeDescriptor::any()),
        None => Ok(infer_from_example(&expr, type_names)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infer(src: &str) -> TypeDescriptor {
        let source = SourceFile::new("t.ex", src);
        let expr = exemplar_parser::parse_expression(&source)
            .unwrap_or_else(|d| panic!("{}", d.first_error().map(|e| e.render()).unwrap_or_default()));
        infer_from_example(&expr, &BTreeSet::new())
    }

    fn site() -> ExampleSite<'static> {
        ExampleSite {
            filename: "t.ex",
            line: 3,
            column: 14,
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Literals
    // ══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_literal_kinds() {
        assert_eq!(infer("''").kind, TypeKind::String);
        assert_eq!(infer("`x`").kind, TypeKind::String);
        assert_eq!(infer("0").kind, TypeKind::Number);
        assert_eq!(infer("-2.5").kind, TypeKind::Number);
        assert_eq!(infer("true").kind, TypeKind::Boolean);
        assert_eq!(infer("null").kind, TypeKind::Null);
        assert_eq!(infer("undefined").kind, TypeKind::Undefined);
        assert_eq!(infer("someName").kind, TypeKind::Any);
    }

    #[test]
    fn test_integer_markers() {
        assert_eq!(infer("+0").kind, TypeKind::NonNegativeInteger);
        assert_eq!(infer("+(-1)").kind, TypeKind::Integer);
        assert_eq!(infer("+1.5").kind, TypeKind::Number);
    }

    // ══════════════════════════════════════════════════════════════════════
    // Composites
    // ══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_array_uses_first_element() {
        let desc = infer("[1, 'a']");
        assert_eq!(desc.kind, TypeKind::Array);
        assert_eq!(desc.items.unwrap().kind, TypeKind::Number);
        assert_eq!(infer("[]").items.unwrap().kind, TypeKind::Any);
    }

    #[test]
    fn test_object_shape_in_order() {
        let desc = infer("{ name: '', tags: [''], age: 0 || null }");
        let shape = desc.shape.unwrap();
        let keys: Vec<&str> = shape.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "tags", "age"]);
        assert!(shape["age"].nullable);
    }

    #[test]
    fn test_or_with_null_is_nullable() {
        let desc = infer("'' || null");
        assert_eq!(desc.kind, TypeKind::String);
        assert!(desc.nullable);
        let desc = infer("null || 0");
        assert_eq!(desc.kind, TypeKind::Number);
        assert!(desc.nullable);
    }

    #[test]
    fn test_or_without_null_is_union() {
        let desc = infer("'' || 0");
        assert_eq!(desc.kind, TypeKind::Union);
        assert_eq!(desc.members.unwrap().len(), 2);
    }

    #[test]
    fn test_and_and_nullish_take_right() {
        assert_eq!(infer("'' && 0").kind, TypeKind::Number);
        assert_eq!(infer("null ?? false").kind, TypeKind::Boolean);
    }

    #[test]
    fn test_declared_type_name_is_reference() {
        let source = SourceFile::new("t.ex", "Email");
        let expr = exemplar_parser::parse_expression(&source).unwrap();
        let names: BTreeSet<String> = ["Email".to_string()].into();
        let desc = infer_from_example(&expr, &names);
        assert!(desc.is_any());
        assert_eq!(desc.reference.as_deref(), Some("Email"));
    }

    // ══════════════════════════════════════════════════════════════════════
    // Validation
    // ══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_call_rejected_as_example() {
        let err = describe_example("load()", site(), true, &BTreeSet::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_EXAMPLE);
        assert_eq!((err.line, err.column), (3, 14));
        assert!(err.message.contains("a call"));
    }

    #[test]
    fn test_default_expression_infers_any() {
        let desc = describe_example("Date.now()", site(), false, &BTreeSet::new()).unwrap();
        assert!(desc.is_any());
    }

    #[test]
    fn test_unparseable_example_rejected() {
        let err = describe_example("{ a: }", site(), true, &BTreeSet::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_EXAMPLE);
    }
}
