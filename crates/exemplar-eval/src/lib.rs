//! Exemplar tree-walking evaluator.
//!
//! Executes rewritten modules directly from the AST. The compiler uses it
//! to run extracted tests and signature tests; the structural matcher and
//! deep equality it exposes are the same predicates the emitted runtime
//! helpers implement.

mod builtins;
pub mod env;
pub mod equality;
pub mod error;
pub mod evaluator;
pub mod matcher;
pub mod module;
pub mod test_runner;
pub mod value;

pub use env::Environment;
pub use equality::{deep_equal, numbers_equal, RELATIVE_EPSILON};
pub use error::{EvalError, EvalResult};
pub use evaluator::{Evaluator, DEFAULT_GAS_LIMIT};
pub use matcher::{check_type, infer_type_from_value, type_matches, Mismatch};
pub use module::ModuleInstance;
pub use test_runner::{run_tests, SignatureTest, TestCase, TestResult, TestRunSummary};
pub use value::Value;
