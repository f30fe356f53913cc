//! Runtime metadata attached to emitted declarations.
//!
//! Every top-level declaration gets `name.__meta = { params, returns,
//! typeParams? }`; polymorphic dispatchers get `name.__overloads = [...]`
//! and classes `Name.__meta = { constructors, methods }`. The records are
//! JSON, which is also a valid object literal in the host language.

use exemplar_types::FunctionSignature;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Signatures of one class's constructors and methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMeta {
    pub name: String,
    pub constructors: Vec<FunctionSignature>,
    pub methods: IndexMap<String, FunctionSignature>,
}

/// The `__meta` record of one declaration.
pub fn signature_meta(sig: &FunctionSignature) -> Value {
    let mut params = Map::new();
    for (name, param) in &sig.params {
        let mut entry = Map::new();
        entry.insert("type".into(), json!(param.ty));
        entry.insert("required".into(), Value::Bool(param.required));
        if let Some(default) = &param.default {
            entry.insert("default".into(), Value::String(default.clone()));
        }
        if let Some(example) = &param.example {
            entry.insert("example".into(), Value::String(example.clone()));
        }
        if param.rest {
            entry.insert("rest".into(), Value::Bool(true));
        }
        params.insert(name.clone(), Value::Object(entry));
    }

    let mut meta = Map::new();
    meta.insert("params".into(), Value::Object(params));
    meta.insert(
        "returns".into(),
        match &sig.returns {
            Some(ty) => json!({ "type": ty }),
            None => Value::Null,
        },
    );
    if !sig.type_params.is_empty() {
        meta.insert("typeParams".into(), json!(sig.type_params));
    }
    if let Some(desc) = &sig.description {
        meta.insert("description".into(), Value::String(desc.clone()));
    }
    if sig.is_async {
        meta.insert("async".into(), Value::Bool(true));
    }
    Value::Object(meta)
}

/// The `__meta` record of a class.
pub fn class_meta(class: &ClassMeta) -> Value {
    let constructors: Vec<Value> = class.constructors.iter().map(signature_meta).collect();
    let methods: Map<String, Value> = class
        .methods
        .iter()
        .map(|(name, sig)| (name.clone(), signature_meta(sig)))
        .collect();
    json!({ "constructors": constructors, "methods": methods })
}

/// Render the metadata assignments appended after the module body.
///
/// Order is deterministic: declarations first, then dispatchers, then
/// classes, each in the order given.
pub fn render_assignments(
    signatures: &IndexMap<String, FunctionSignature>,
    overloads: &IndexMap<String, Vec<String>>,
    classes: &[ClassMeta],
) -> String {
    let mut out = String::new();
    for (name, sig) in signatures {
        out.push_str(&format!("{name}.__meta = {};\n", literal(&signature_meta(sig))));
    }
    for (name, variants) in overloads {
        let metas: Vec<Value> = variants
            .iter()
            .filter_map(|v| signatures.get(v))
            .map(signature_meta)
            .collect();
        out.push_str(&format!("{name}.__overloads = {};\n", literal(&Value::Array(metas))));
    }
    for class in classes {
        out.push_str(&format!("{}.__meta = {};\n", class.name, literal(&class_meta(class))));
    }
    out
}

fn literal(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use exemplar_types::{ParameterDescriptor, TypeDescriptor};

    fn add_signature() -> FunctionSignature {
        let mut sig = FunctionSignature::new("add");
        for name in ["a", "b"] {
            let mut p = ParameterDescriptor::new(name, TypeDescriptor::number(), true);
            p.example = Some("0".into());
            sig.params.insert(name.into(), p);
        }
        sig.returns = Some(TypeDescriptor::number());
        sig
    }

    #[test]
    fn test_signature_meta_shape() {
        let meta = signature_meta(&add_signature());
        assert_eq!(meta["params"]["a"]["type"]["kind"], "number");
        assert_eq!(meta["params"]["b"]["required"], true);
        assert_eq!(meta["returns"]["type"]["kind"], "number");
        assert!(meta.get("typeParams").is_none());
    }

    #[test]
    fn test_type_params_included_when_generic() {
        let mut sig = add_signature();
        sig.type_params = vec!["T".into()];
        assert_eq!(signature_meta(&sig)["typeParams"], json!(["T"]));
    }

    #[test]
    fn test_render_assignments() {
        let mut sigs = IndexMap::new();
        sigs.insert("add".to_string(), add_signature());
        let mut variant = add_signature();
        variant.name = "sum$1".into();
        sigs.insert("sum$1".to_string(), variant);
        let mut overloads = IndexMap::new();
        overloads.insert("sum".to_string(), vec!["sum$1".to_string()]);

        let out = render_assignments(&sigs, &overloads, &[]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("add.__meta = {\"params\":"));
        assert!(lines[2].starts_with("sum.__overloads = [{"));
    }
}
