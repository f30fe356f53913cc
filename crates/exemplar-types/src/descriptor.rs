//! The shared type model.
//!
//! Both inference paths (from an example value and from a static annotation)
//! produce [`TypeDescriptor`]s. Descriptors are built fresh per inference call
//! and combined copy-and-extend; nothing mutates one after construction.

use crate::Span;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// The base kind of a [`TypeDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypeKind {
    String,
    Number,
    Integer,
    NonNegativeInteger,
    Boolean,
    Null,
    Undefined,
    Array,
    Object,
    Union,
    Any,
}

impl TypeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeKind::String => "string",
            TypeKind::Number => "number",
            TypeKind::Integer => "integer",
            TypeKind::NonNegativeInteger => "non-negative-integer",
            TypeKind::Boolean => "boolean",
            TypeKind::Null => "null",
            TypeKind::Undefined => "undefined",
            TypeKind::Array => "array",
            TypeKind::Object => "object",
            TypeKind::Union => "union",
            TypeKind::Any => "any",
        }
    }

    /// `null` or `undefined`.
    pub fn is_nullish(self) -> bool {
        matches!(self, TypeKind::Null | TypeKind::Undefined)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recursive type description.
///
/// `nullable` is only ever set on a non-union base; a union keeps `null`
/// as a member instead, and no member of a union carries `nullable`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<TypeDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<IndexMap<String, TypeDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<TypeDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destructured_params: Option<IndexMap<String, ParameterDescriptor>>,
    /// Name of the user type declaration an example referred to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl TypeDescriptor {
    /// A bare descriptor of the given kind.
    pub fn of(kind: TypeKind) -> Self {
        Self {
            kind,
            nullable: false,
            items: None,
            shape: None,
            members: None,
            destructured_params: None,
            reference: None,
        }
    }

    pub fn string() -> Self {
        Self::of(TypeKind::String)
    }

    pub fn number() -> Self {
        Self::of(TypeKind::Number)
    }

    pub fn boolean() -> Self {
        Self::of(TypeKind::Boolean)
    }

    pub fn null() -> Self {
        Self::of(TypeKind::Null)
    }

    pub fn undefined() -> Self {
        Self::of(TypeKind::Undefined)
    }

    pub fn any() -> Self {
        Self::of(TypeKind::Any)
    }

    pub fn array(items: TypeDescriptor) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of(TypeKind::Array)
        }
    }

    pub fn object(shape: IndexMap<String, TypeDescriptor>) -> Self {
        Self {
            shape: Some(shape),
            ..Self::of(TypeKind::Object)
        }
    }

    /// A descriptor that refers to a named user declaration.
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            reference: Some(name.into()),
            ..Self::of(TypeKind::Any)
        }
    }

    /// Copy of `self` with `nullable` set.
    ///
    /// A union gains a `null` member instead.
    pub fn into_nullable(self) -> Self {
        match self.kind {
            TypeKind::Union => Self::union(vec![self, Self::null()]),
            TypeKind::Null | TypeKind::Undefined | TypeKind::Any => self,
            _ => Self {
                nullable: true,
                ..self
            },
        }
    }

    /// Build a normalized union.
    ///
    /// Nested unions are flattened, nullable members are split into their
    /// base plus `null`, duplicates are dropped, and `any` absorbs the rest.
    /// When exactly one non-nullish member remains alongside `null` or
    /// `undefined`, the result is that member marked nullable.
    pub fn union(members: Vec<TypeDescriptor>) -> Self {
        let mut flat: Vec<TypeDescriptor> = Vec::new();
        let push = |desc: TypeDescriptor, flat: &mut Vec<TypeDescriptor>| {
            if !flat.contains(&desc) {
                flat.push(desc);
            }
        };
        for member in members {
            match member.kind {
                TypeKind::Union => {
                    for inner in member.members.unwrap_or_default() {
                        push(inner, &mut flat);
                    }
                }
                _ if member.nullable => {
                    push(
                        Self {
                            nullable: false,
                            ..member
                        },
                        &mut flat,
                    );
                    push(Self::null(), &mut flat);
                }
                _ => push(member, &mut flat),
            }
        }

        if flat.iter().any(|m| m.kind == TypeKind::Any && m.reference.is_none()) {
            return Self::any();
        }
        let has_nullish = flat.iter().any(|m| m.kind.is_nullish());
        let mut non_null: Vec<TypeDescriptor> =
            flat.iter().filter(|m| !m.kind.is_nullish()).cloned().collect();

        match (non_null.len(), has_nullish) {
            (0, _) => flat.into_iter().next().unwrap_or_else(Self::any),
            (1, false) => non_null.remove(0),
            (1, true) => Self {
                nullable: true,
                ..non_null.remove(0)
            },
            _ => {
                // Keep a single `null` member for every nullish flavor.
                let mut members = non_null;
                if has_nullish {
                    members.push(Self::null());
                }
                Self {
                    members: Some(members),
                    ..Self::of(TypeKind::Union)
                }
            }
        }
    }

    /// Merge the shapes of several object descriptors; later keys win.
    pub fn intersect(parts: Vec<TypeDescriptor>) -> Self {
        let mut shape = IndexMap::new();
        for part in parts {
            if let Some(part_shape) = part.shape {
                for (key, value) in part_shape {
                    shape.insert(key, value);
                }
            }
        }
        Self::object(shape)
    }

    pub fn is_any(&self) -> bool {
        self.kind == TypeKind::Any
    }

    /// Infer a descriptor from a JSON value.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::null(),
            Value::Bool(_) => Self::boolean(),
            Value::Number(_) => Self::number(),
            Value::String(_) => Self::string(),
            Value::Array(items) => Self::array(items.first().map(Self::from_json).unwrap_or_else(Self::any)),
            Value::Object(map) => Self::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    // ── Schema export ──────────────────────────────────────────────────────

    /// Convert to a JSON-Schema-like value. One-way and lossy.
    pub fn to_json_schema(&self) -> Value {
        let mut schema = match self.kind {
            TypeKind::String => json!({ "type": "string" }),
            TypeKind::Number => json!({ "type": "number" }),
            TypeKind::Integer => json!({ "type": "integer" }),
            TypeKind::NonNegativeInteger => json!({ "type": "integer", "minimum": 0 }),
            TypeKind::Boolean => json!({ "type": "boolean" }),
            TypeKind::Null | TypeKind::Undefined => json!({ "type": "null" }),
            TypeKind::Any => json!({}),
            TypeKind::Array => {
                let items = self
                    .items
                    .as_ref()
                    .map(|i| i.to_json_schema())
                    .unwrap_or_else(|| json!({}));
                json!({ "type": "array", "items": items })
            }
            TypeKind::Object => self.object_schema(),
            TypeKind::Union => {
                let members: Vec<Value> = self
                    .members
                    .iter()
                    .flatten()
                    .map(|m| m.to_json_schema())
                    .collect();
                json!({ "oneOf": members })
            }
        };
        if self.nullable {
            if let Some(Value::String(ty)) = schema.get("type").cloned() {
                schema["type"] = json!([ty, "null"]);
            }
        }
        schema
    }

    fn object_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        if let Some(params) = &self.destructured_params {
            for (name, param) in params {
                properties.insert(name.clone(), param.to_json_schema());
                if param.required {
                    required.push(Value::String(name.clone()));
                }
            }
        } else if let Some(shape) = &self.shape {
            for (name, desc) in shape {
                properties.insert(name.clone(), desc.to_json_schema());
                if !desc.nullable && desc.kind != TypeKind::Undefined {
                    required.push(Value::String(name.clone()));
                }
            }
        }
        json!({ "type": "object", "properties": properties, "required": required })
    }

    // ── Example synthesis ──────────────────────────────────────────────────

    /// Render a representative example literal in the surface language.
    ///
    /// `any` has no representative value and yields `None`.
    pub fn example_source(&self) -> Option<String> {
        let base = match self.kind {
            TypeKind::Any => return None,
            TypeKind::String => "''".to_string(),
            TypeKind::Number => "0".to_string(),
            TypeKind::Integer => "+(-1)".to_string(),
            TypeKind::NonNegativeInteger => "+0".to_string(),
            TypeKind::Boolean => "false".to_string(),
            TypeKind::Null => "null".to_string(),
            TypeKind::Undefined => "undefined".to_string(),
            TypeKind::Array => match self.items.as_ref().and_then(|i| i.example_source()) {
                Some(item) => format!("[{item}]"),
                None => "[]".to_string(),
            },
            TypeKind::Object => {
                let fields: Vec<String> = self
                    .shape
                    .iter()
                    .flatten()
                    .map(|(key, desc)| {
                        let value = desc.example_source().unwrap_or_else(|| "undefined".into());
                        format!("{}: {}", render_key(key), value)
                    })
                    .collect();
                if fields.is_empty() {
                    "{}".to_string()
                } else {
                    format!("{{ {} }}", fields.join(", "))
                }
            }
            TypeKind::Union => {
                let parts: Option<Vec<String>> = self
                    .members
                    .iter()
                    .flatten()
                    .map(|m| m.example_source())
                    .collect();
                parts?.join(" || ")
            }
        };
        Some(if self.nullable {
            format!("{base} || null")
        } else {
            base
        })
    }
}

fn render_key(key: &str) -> String {
    let plain = key
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if plain {
        key.to_string()
    } else {
        format!("'{}'", key.replace('\'', "\\'"))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::Array => match &self.items {
                Some(items) => write!(f, "{items}[]")?,
                None => write!(f, "any[]")?,
            },
            TypeKind::Object => {
                write!(f, "{{")?;
                for (i, (key, desc)) in self.shape.iter().flatten().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {key}: {desc}")?;
                }
                write!(f, " }}")?;
            }
            TypeKind::Union => {
                for (i, member) in self.members.iter().flatten().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{member}")?;
                }
            }
            _ => match &self.reference {
                Some(name) => write!(f, "{name}")?,
                None => write!(f, "{}", self.kind)?,
            },
        }
        if self.nullable {
            write!(f, "?")?;
        }
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Parameters & Signatures
// ══════════════════════════════════════════════════════════════════════════════

/// One declared parameter.
///
/// `required` is true iff the parameter was written with the required
/// marker, regardless of whether a default literal is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    pub required: bool,
    /// Default literal, as source text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Example literal, as source text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub rest: bool,
    #[serde(skip)]
    pub span: Span,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor, required: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            required,
            default: None,
            example: None,
            description: None,
            rest: false,
            span: Span::default(),
        }
    }

    pub fn to_json_schema(&self) -> Value {
        let mut schema = self.ty.to_json_schema();
        if let (Some(desc), Value::Object(map)) = (&self.description, &mut schema) {
            map.insert("description".into(), Value::String(desc.clone()));
        }
        schema
    }
}

/// How a declaration's return example is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReturnMode {
    /// `->`: signature test runs.
    #[default]
    Default,
    /// `-?`: signature test runs and strict output checks the value.
    TestAgainstExample,
    /// `-!`: no signature test.
    SkipTest,
}

impl ReturnMode {
    pub fn marker(self) -> &'static str {
        match self {
            ReturnMode::Default => "->",
            ReturnMode::TestAgainstExample => "-?",
            ReturnMode::SkipTest => "-!",
        }
    }
}

/// Signature metadata for one compiled declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSignature {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub params: IndexMap<String, ParameterDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<TypeDescriptor>,
    #[serde(default)]
    pub return_mode: ReturnMode,
    /// Return example, as source text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_example: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_params: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_async: bool,
    #[serde(skip)]
    pub span: Span,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            params: IndexMap::new(),
            returns: None,
            return_mode: ReturnMode::Default,
            return_example: None,
            type_params: Vec::new(),
            is_async: false,
            span: Span::default(),
        }
    }

    pub fn required_params(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.params.values().filter(|p| p.required)
    }

    /// JSON-Schema object describing the parameters.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, param) in &self.params {
            properties.insert(name.clone(), param.to_json_schema());
            if param.required {
                required.push(Value::String(name.clone()));
            }
        }
        let mut schema = json!({ "type": "object", "properties": properties, "required": required });
        if let Some(desc) = &self.description {
            schema["description"] = Value::String(desc.clone());
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(fields: &[(&str, TypeDescriptor)]) -> IndexMap<String, TypeDescriptor> {
        fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_union_collapses_single_member_with_null() {
        let desc = TypeDescriptor::union(vec![TypeDescriptor::string(), TypeDescriptor::null()]);
        assert_eq!(desc.kind, TypeKind::String);
        assert!(desc.nullable);
        assert!(desc.members.is_none());
    }

    #[test]
    fn test_union_hoists_nullable_out_of_members() {
        let desc = TypeDescriptor::union(vec![
            TypeDescriptor::string().into_nullable(),
            TypeDescriptor::number(),
        ]);
        assert_eq!(desc.kind, TypeKind::Union);
        assert!(!desc.nullable);
        let members = desc.members.unwrap();
        assert_eq!(members.len(), 3);
        assert!(members.iter().all(|m| !m.nullable));
        assert!(members.iter().any(|m| m.kind == TypeKind::Null));
    }

    #[test]
    fn test_union_flattens_and_dedupes() {
        let inner = TypeDescriptor::union(vec![TypeDescriptor::string(), TypeDescriptor::number()]);
        let desc = TypeDescriptor::union(vec![inner, TypeDescriptor::string()]);
        assert_eq!(desc.members.unwrap().len(), 2);
    }

    #[test]
    fn test_union_any_absorbs() {
        let desc = TypeDescriptor::union(vec![TypeDescriptor::any(), TypeDescriptor::number()]);
        assert!(desc.is_any());
    }

    #[test]
    fn test_serialized_shape() {
        let desc = TypeDescriptor::string().into_nullable();
        assert_eq!(
            serde_json::to_value(&desc).unwrap(),
            json!({ "kind": "string", "nullable": true })
        );
        let nn = TypeDescriptor::of(TypeKind::NonNegativeInteger);
        assert_eq!(serde_json::to_value(&nn).unwrap(), json!({ "kind": "non-negative-integer" }));
    }

    #[test]
    fn test_schema_export() {
        let desc = TypeDescriptor::object(shape(&[
            ("name", TypeDescriptor::string()),
            ("tags", TypeDescriptor::array(TypeDescriptor::string())),
            ("age", TypeDescriptor::number().into_nullable()),
        ]));
        let schema = desc.to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["tags"]["items"]["type"], "string");
        assert_eq!(schema["properties"]["age"]["type"], json!(["number", "null"]));
        assert_eq!(schema["required"], json!(["name", "tags"]));
    }

    #[test]
    fn test_union_schema_uses_one_of() {
        let desc = TypeDescriptor::union(vec![TypeDescriptor::string(), TypeDescriptor::number()]);
        let schema = desc.to_json_schema();
        assert_eq!(schema["oneOf"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_example_source() {
        let desc = TypeDescriptor::object(shape(&[
            ("id", TypeDescriptor::number()),
            ("label", TypeDescriptor::string().into_nullable()),
            ("items", TypeDescriptor::array(TypeDescriptor::boolean())),
        ]));
        assert_eq!(
            desc.example_source().unwrap(),
            "{ id: 0, label: '' || null, items: [false] }"
        );
        assert_eq!(TypeDescriptor::any().example_source(), None);
    }

    #[test]
    fn test_from_json() {
        let desc = TypeDescriptor::from_json(&json!({ "a": [1, 2], "b": null }));
        let s = desc.shape.unwrap();
        assert_eq!(s["a"].items.as_ref().unwrap().kind, TypeKind::Number);
        assert_eq!(s["b"].kind, TypeKind::Null);
    }

    #[test]
    fn test_display() {
        let desc = TypeDescriptor::array(TypeDescriptor::string().into_nullable());
        assert_eq!(desc.to_string(), "string?[]");
    }

    #[test]
    fn test_input_schema_required() {
        let mut sig = FunctionSignature::new("f");
        sig.params.insert("a".into(), ParameterDescriptor::new("a", TypeDescriptor::number(), true));
        sig.params.insert("b".into(), ParameterDescriptor::new("b", TypeDescriptor::string(), false));
        let schema = sig.input_schema();
        assert_eq!(schema["required"], json!(["a"]));
        assert_eq!(schema["properties"]["b"]["type"], "string");
    }
}
