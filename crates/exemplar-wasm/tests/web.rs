//! Browser-side smoke tests for the bindings, run with `wasm-pack test`.

#![cfg(target_arch = "wasm32")]

use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn compile_returns_metadata() {
    let json = exemplar_wasm::compile("function add(a: 0, b: 0) -> 0 { return a + b }\n", "{}");
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["output"]["metadata"]["add"]["returns"]["kind"], "number");
}

#[wasm_bindgen_test]
fn compile_reports_fatal_error() {
    let json = exemplar_wasm::compile("function f(a = 1, b: 2) {}\n", "{}");
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["success"], false);
    assert_eq!(parsed["errors"]["errors"][0]["code"], 300);
}
