//! Exemplar compiler as a WASM module for host-language runtimes.
//!
//! This crate exposes the compilation pipeline via `wasm-bindgen`. Every
//! function takes the source text and an options JSON string and returns a
//! JSON string.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { compile, compile_agent } from 'exemplar-wasm';
//!
//! await init();
//!
//! const result = JSON.parse(compile("function add(a: 0, b: 0) -> 0 { return a + b }", '{"filename":"add.ex"}'));
//! // { success: true, output: { code: "...", metadata: { add: { ... } } }, errors: { ... } }
//! ```

use exemplar_compiler::CompileOptions;
use exemplar_types::{Diagnostic, Diagnostics, ErrorCode};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Outcome of one call, in the shape every binding returns.
#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    output: Option<T>,
    errors: Diagnostics,
}

impl<T: Serialize> Envelope<T> {
    fn from_result(result: Result<T, Diagnostic>) -> Self {
        let mut errors = Diagnostics::empty();
        match result {
            Ok(output) => Self {
                success: true,
                output: Some(output),
                errors,
            },
            Err(diag) => {
                errors.push(diag);
                Self {
                    success: false,
                    output: None,
                    errors,
                }
            }
        }
    }
}

fn options(json: &str) -> Result<CompileOptions, Diagnostic> {
    if json.trim().is_empty() {
        return Ok(CompileOptions::default());
    }
    serde_json::from_str(json).map_err(|e| {
        Diagnostic::new(ErrorCode::UNEXPECTED_TOKEN, format!("invalid options: {e}"), e.line() as u32, e.column() as u32)
            .with_filename("<options>")
    })
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        format!(
            r#"{{"success":false,"output":null,"errors":{{"errors":[{{"message":"Serialization error: {}"}}],"warnings":[],"total_errors":1,"total_warnings":0}}}}"#,
            e
        )
    })
}

/// Compile surface source to host source.
///
/// Returns a JSON string containing a `CompileResult`:
/// ```json
/// {
///   "success": true,
///   "output": { "code": "...", "metadata": { ... }, "warnings": [] },
///   "errors": { "errors": [], "warnings": [], "total_errors": 0, "total_warnings": 0 }
/// }
/// ```
///
/// On failure, `success` is `false`, `output` is `null`, and `errors`
/// contains the fatal diagnostic.
#[wasm_bindgen]
pub fn compile(source: &str, options_json: &str) -> String {
    match options(options_json) {
        Ok(opts) => to_json(&exemplar_compiler::compile_to_result(source, &opts)),
        Err(diag) => to_json(&Envelope::<()>::from_result(Err(diag))),
    }
}

/// Compile the entry function to an agent instruction tree.
///
/// `output` is `{ tree, signature, warnings }`.
#[wasm_bindgen]
pub fn compile_agent(source: &str, options_json: &str) -> String {
    let result = options(options_json).and_then(|opts| exemplar_compiler::compile_agent(source, &opts));
    to_json(&Envelope::from_result(result))
}

/// Compile a module in the statically-annotated dialect to host source.
#[wasm_bindgen]
pub fn compile_annotated(source: &str, options_json: &str) -> String {
    let result = options(options_json).and_then(|opts| exemplar_compiler::compile_annotated(source, &opts));
    to_json(&Envelope::from_result(result))
}

/// Return the compiler version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_compile_returns_success_json() {
        let json = compile("function add(a: 0, b: 0) -> 0 { return a + b }\n", r#"{"filename":"add.ex"}"#);
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["output"]["metadata"]["add"]["params"]["a"]["required"], true);
    }

    #[test]
    fn test_empty_options_use_defaults() {
        let json = compile("const x = 1\n", "");
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["success"], true);
    }

    #[test]
    fn test_invalid_options_reported() {
        let json = compile_agent("function f() { return 1 }", "{not json");
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["success"], false);
        assert!(parsed["errors"]["errors"][0]["message"]
            .as_str()
            .unwrap()
            .starts_with("invalid options"));
    }

    #[test]
    fn test_agent_tree_returned() {
        let json = compile_agent("export default function run(n: 0) { return n + 1 }\n", "{}");
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["output"]["tree"]["op"], "seq");
    }

    #[test]
    fn test_version_matches_package() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
