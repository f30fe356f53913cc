//! Signature building from the parameter pass's records.
//!
//! Every recorded head becomes a [`FunctionSignature`]: parameter examples
//! are parsed and inferred through [`crate::infer`], `required` is copied
//! from the record unchanged. Signature tests are derived from the same
//! records.

use crate::context::{CompileContext, DeclRecord, DeclRole, ParamRecord};
use crate::infer::{describe_example, ExampleSite};
use exemplar_codegen::ClassMeta;
use exemplar_eval::SignatureTest;
use exemplar_types::{
    Diagnostic, FunctionSignature, ParameterDescriptor, ReturnMode, Span, TypeDescriptor,
};
use indexmap::IndexMap;

/// Build the signature of one recorded head.
pub fn build_signature(record: &DeclRecord, ctx: &CompileContext) -> Result<FunctionSignature, Diagnostic> {
    let mut sig = FunctionSignature::new(record.name.clone());
    sig.description = record.description.clone();
    sig.is_async = record.is_async;
    sig.span = Span::point(0, record.line, record.column);
    for param in &record.params {
        let desc = parameter(param, ctx)?;
        sig.params.insert(desc.name.clone(), desc);
    }
    if let Some(ret) = &record.returns {
        let site = ExampleSite {
            filename: &ctx.filename,
            line: record.line,
            column: record.column,
        };
        sig.returns = Some(describe_example(&ret.example, site, true, &ctx.type_names)?);
        sig.return_mode = ret.mode;
        sig.return_example = Some(ret.example.clone());
    }
    Ok(sig)
}

fn parameter(param: &ParamRecord, ctx: &CompileContext) -> Result<ParameterDescriptor, Diagnostic> {
    let site = ExampleSite {
        filename: &ctx.filename,
        line: param.line,
        column: param.column,
    };
    let ty = if param.is_destructured() {
        let mut members = IndexMap::new();
        let mut shape = IndexMap::new();
        for member in &param.members {
            let desc = parameter(member, ctx)?;
            shape.insert(desc.name.clone(), desc.ty.clone());
            members.insert(desc.name.clone(), desc);
        }
        TypeDescriptor {
            destructured_params: Some(members),
            ..TypeDescriptor::object(shape)
        }
    } else {
        match &param.example {
            // Marker examples must be values; defaults may be any expression.
            Some(example) => describe_example(example, site, !param.has_default, &ctx.type_names)?,
            None => TypeDescriptor::any(),
        }
    };
    let ty = if param.rest && ty.kind != exemplar_types::TypeKind::Array {
        TypeDescriptor::array(ty)
    } else {
        ty
    };

    let mut desc = ParameterDescriptor::new(param.name.clone(), ty, param.required);
    desc.example = param.example.clone();
    if !param.required && !param.rest {
        desc.default = param.example.clone();
    }
    desc.rest = param.rest;
    desc.span = Span::point(0, param.line, param.column);
    Ok(desc)
}

/// Signatures of top-level functions keyed by emitted name, plus class
/// metadata for the classes named in `top_level_classes`.
///
/// A signature built from a static annotation replaces the one built
/// from examples.
pub fn build_signatures(
    ctx: &CompileContext,
    top_level_classes: &[&str],
) -> Result<(IndexMap<String, FunctionSignature>, Vec<ClassMeta>), Diagnostic> {
    let mut signatures = IndexMap::new();
    for record in ctx.top_level_functions() {
        let sig = match ctx.signature_overrides.get(&record.name) {
            Some(sig) => sig.clone(),
            None => build_signature(record, ctx)?,
        };
        signatures.insert(record.name.clone(), sig);
    }

    let mut classes: IndexMap<&str, ClassMeta> = IndexMap::new();
    for record in &ctx.declarations {
        let Some(owner) = record.owner.as_deref() else {
            continue;
        };
        if !top_level_classes.contains(&owner) {
            continue;
        }
        let meta = classes.entry(owner).or_insert_with(|| ClassMeta {
            name: owner.to_string(),
            constructors: Vec::new(),
            methods: IndexMap::new(),
        });
        let sig = build_signature(record, ctx)?;
        match record.role {
            DeclRole::Constructor => meta.constructors.push(sig),
            DeclRole::Method => {
                meta.methods.insert(record.name.clone(), sig);
            }
            DeclRole::Function => {}
        }
    }
    Ok((signatures, classes.into_values().collect()))
}

/// The implicit test of a top-level declaration, when it has one: a return
/// example not marked `-!` and an example for every parameter.
pub fn signature_test(record: &DeclRecord, ctx: &CompileContext) -> Option<SignatureTest> {
    let ret = record.returns.as_ref()?;
    if ret.mode == ReturnMode::SkipTest || record.name.is_empty() {
        return None;
    }
    let args = record
        .params
        .iter()
        .map(argument)
        .collect::<Option<Vec<String>>>()?;
    let site = ExampleSite {
        filename: &ctx.filename,
        line: record.line,
        column: record.column,
    };
    Some(SignatureTest {
        function: record.name.clone(),
        args,
        returns: ret.example.clone(),
        returns_type: describe_example(&ret.example, site, false, &ctx.type_names).ok(),
        is_async: record.is_async,
        line: record.line,
    })
}

fn argument(param: &ParamRecord) -> Option<String> {
    if param.rest {
        return None;
    }
    if param.is_destructured() && param.example.is_none() {
        let fields = param
            .members
            .iter()
            .map(|m| Some(format!("{}: {}", m.name, m.example.as_deref()?)))
            .collect::<Option<Vec<String>>>()?;
        return Some(format!("{{ {} }}", fields.join(", ")));
    }
    param.example.clone()
}

/// Signature tests for every top-level function, in source order.
pub fn signature_tests(ctx: &CompileContext) -> Vec<SignatureTest> {
    ctx.top_level_functions()
        .filter_map(|record| signature_test(record, ctx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use exemplar_types::TypeKind;

    fn records(src: &str) -> CompileContext {
        let mut ctx = CompileContext::new("t.ex");
        crate::passes::params::run(src, &mut ctx).unwrap_or_else(|d| panic!("{}", d.render()));
        ctx
    }

    fn signature(src: &str, name: &str) -> FunctionSignature {
        let ctx = records(src);
        let record = ctx.function(name).expect("record");
        build_signature(record, &ctx).unwrap_or_else(|d| panic!("{}", d.render()))
    }

    #[test]
    fn test_required_follows_marker() {
        let sig = signature("function f(a: 0, b?: '', c = true) -> 0 { return a }", "f");
        let required: Vec<&str> = sig.required_params().map(|p| p.name.as_str()).collect();
        assert_eq!(required, vec!["a"]);
        assert_eq!(sig.params["b"].ty.kind, TypeKind::String);
        assert_eq!(sig.params["b"].default.as_deref(), Some("''"));
        assert_eq!(sig.params["c"].ty.kind, TypeKind::Boolean);
        assert_eq!(sig.returns.unwrap().kind, TypeKind::Number);
    }

    #[test]
    fn test_nullable_parameter() {
        let sig = signature("function maybe(s: '' || null) { return s }", "maybe");
        let s = &sig.params["s"].ty;
        assert_eq!(s.kind, TypeKind::String);
        assert!(s.nullable);
    }

    #[test]
    fn test_destructured_parameter() {
        let sig = signature("function draw({ x: 0, y?: 0 }) { return x }", "draw");
        let (_, param) = sig.params.first().unwrap();
        assert_eq!(param.ty.kind, TypeKind::Object);
        let members = param.ty.destructured_params.as_ref().unwrap();
        assert!(members["x"].required);
        assert!(!members["y"].required);
    }

    #[test]
    fn test_rest_parameter_is_array() {
        let sig = signature("function sum(...xs: [0]) { return 0 }", "sum");
        let xs = &sig.params["xs"];
        assert!(xs.rest);
        assert_eq!(xs.ty.items.as_ref().unwrap().kind, TypeKind::Number);
    }

    #[test]
    fn test_invalid_marker_example_rejected() {
        let ctx = records("function f(a: load()) { return a }");
        let err = build_signature(ctx.function("f").unwrap(), &ctx).unwrap_err();
        assert_eq!(err.code, exemplar_types::ErrorCode::INVALID_EXAMPLE);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_default_expression_allowed() {
        let sig = signature("function f(a = Date.now()) { return a }", "f");
        assert!(sig.params["a"].ty.is_any());
    }

    // ══════════════════════════════════════════════════════════════════════
    // Signature tests
    // ══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_signature_test_derived() {
        let ctx = records("function add(a: 0, b: 0) -> 0 { return a + b }\nfunction skip(a: 0) -! 0 { return a }\nfunction none(a: 0) { return a }\n");
        let tests = signature_tests(&ctx);
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].function, "add");
        assert_eq!(tests[0].args, vec!["0", "0"]);
        assert_eq!(tests[0].returns, "0");
        assert_eq!(tests[0].returns_type.as_ref().unwrap().kind, TypeKind::Number);
    }

    #[test]
    fn test_union_return_carries_descriptor() {
        let ctx = records("function u(x: 0) -> 0 | '' { return x }\n");
        let tests = signature_tests(&ctx);
        assert_eq!(tests[0].returns, "0 || ''");
        assert_eq!(tests[0].returns_type.as_ref().unwrap().kind, TypeKind::Union);
    }

    #[test]
    fn test_bare_parameter_blocks_signature_test() {
        let ctx = records("function f(a) -> 0 { return 1 }\n");
        assert!(signature_tests(&ctx).is_empty());
    }

    #[test]
    fn test_destructured_argument_rendered() {
        let ctx = records("function area({ w: 1, h: 2 }) -> 0 { return w * h }\n");
        let tests = signature_tests(&ctx);
        assert_eq!(tests[0].args, vec!["{ w: 1, h: 2 }"]);
    }
}
