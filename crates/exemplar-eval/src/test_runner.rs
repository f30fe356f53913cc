//! Exemplar test runner: executes extracted `test` blocks and signature
//! tests.
//!
//! The module body runs once in an isolated scope. Every test then runs
//! against that single [`ModuleInstance`]; each result is captured
//! independently so one failing test never hides the rest.

use crate::error::EvalError;
use crate::matcher::{check_type, type_matches};
use crate::module::ModuleInstance;
use exemplar_types::{TypeDescriptor, TypeKind};
use serde::{Deserialize, Serialize};

/// An inline `test 'description' { ... }` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub description: String,
    /// Statement text of the block, braces excluded.
    pub body: String,
    /// 1-indexed line of the `test` keyword.
    pub line: u32,
}

/// An implicit test derived from a declaration's own examples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureTest {
    pub function: String,
    /// Example source text per parameter, in order.
    pub args: Vec<String>,
    /// Example source text of the return value.
    pub returns: String,
    /// Descriptor inferred from `returns`. A union or nullable example
    /// evaluates to one of its alternatives, so the result is checked
    /// against this instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns_type: Option<TypeDescriptor>,
    pub is_async: bool,
    pub line: u32,
}

impl SignatureTest {
    pub fn description(&self) -> String {
        format!("{}({}) matches {}", self.function, self.args.join(", "), self.returns)
    }
}

/// Result of running a single test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub description: String,
    pub passed: bool,
    /// Passed without executing (async declaration, unresolved import).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub line: u32,
}

impl TestResult {
    fn pass(description: String, line: u32) -> Self {
        Self {
            description,
            passed: true,
            skipped: false,
            error: None,
            line,
        }
    }

    fn skip(description: String, line: u32, reason: impl Into<String>) -> Self {
        Self {
            description,
            passed: true,
            skipped: true,
            error: Some(reason.into()),
            line,
        }
    }

    fn fail(description: String, line: u32, error: impl Into<String>) -> Self {
        Self {
            description,
            passed: false,
            skipped: false,
            error: Some(error.into()),
            line,
        }
    }
}

impl std::fmt::Display for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.skipped {
            write!(f, "  - {} (skipped)", self.description)
        } else if self.passed {
            write!(f, "  ✓ {}", self.description)
        } else {
            write!(
                f,
                "  ✗ {}: {}",
                self.description,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// Summary of running every test of one module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunSummary {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TestRunSummary {
    fn from_results(results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = results.len() - passed;
        let skipped = results.iter().filter(|r| r.skipped).count();
        Self {
            results,
            passed,
            failed,
            skipped,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

impl std::fmt::Display for TestRunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for r in &self.results {
            writeln!(f, "{r}")?;
        }
        writeln!(
            f,
            "\n{} passed, {} failed, {} skipped",
            self.passed, self.failed, self.skipped
        )
    }
}

/// Execute `module_source` once, then every test against it.
pub fn run_tests(
    module_source: &str,
    tests: &[TestCase],
    signature_tests: &[SignatureTest],
    gas_limit: u64,
) -> TestRunSummary {
    let _span = tracing::debug_span!("run_tests", tests = tests.len(), signatures = signature_tests.len()).entered();
    let labels: Vec<(String, u32)> = tests
        .iter()
        .map(|t| (t.description.clone(), t.line))
        .chain(signature_tests.iter().map(|s| (s.description(), s.line)))
        .collect();

    let mut module = match ModuleInstance::load_with_gas_limit(module_source, gas_limit) {
        Ok(module) => module,
        Err(EvalError::UnresolvedImport(what)) => {
            tracing::debug!(%what, "module body uses an unresolved import; skipping tests");
            let reason = format!("skipped: unresolved import {what}");
            return TestRunSummary::from_results(
                labels
                    .into_iter()
                    .map(|(d, line)| TestResult::skip(d, line, reason.clone()))
                    .collect(),
            );
        }
        Err(err) => {
            let message = format!("module execution failed: {err}");
            return TestRunSummary::from_results(
                labels
                    .into_iter()
                    .map(|(d, line)| TestResult::fail(d, line, message.clone()))
                    .collect(),
            );
        }
    };

    let mut results = Vec::with_capacity(labels.len());
    for case in tests {
        results.push(run_test_case(&mut module, case));
    }
    for sig in signature_tests {
        results.push(run_signature_test(&mut module, sig));
    }
    TestRunSummary::from_results(results)
}

fn run_test_case(module: &mut ModuleInstance, case: &TestCase) -> TestResult {
    module.reset_gas();
    let outcome = module.run_block_source(&case.body);
    tracing::trace!(test = %case.description, ok = outcome.is_ok(), gas = module.gas_used());
    match outcome {
        Ok(()) => TestResult::pass(case.description.clone(), case.line),
        Err(EvalError::UnresolvedImport(what)) => TestResult::skip(
            case.description.clone(),
            case.line,
            format!("skipped: unresolved import {what}"),
        ),
        Err(EvalError::AssertionFailed(msg)) => TestResult::fail(case.description.clone(), case.line, msg),
        Err(err) => TestResult::fail(case.description.clone(), case.line, err.to_string()),
    }
}

fn has_alternatives(desc: &TypeDescriptor) -> bool {
    desc.nullable || desc.kind == TypeKind::Union
}

fn run_signature_test(module: &mut ModuleInstance, sig: &SignatureTest) -> TestResult {
    let description = sig.description();
    if sig.is_async {
        return TestResult::skip(description, sig.line, "skipped: async declaration");
    }
    module.reset_gas();
    let outcome = (|| {
        let mut args = Vec::with_capacity(sig.args.len());
        for example in &sig.args {
            args.push(module.eval_source(example)?);
        }
        let actual = module.call(&sig.function, args)?;
        let verdict = match sig.returns_type.as_ref().filter(|d| has_alternatives(d)) {
            Some(desc) => check_type(&actual, desc),
            None => type_matches(&actual, &module.eval_source(&sig.returns)?),
        };
        Ok::<_, EvalError>((actual, verdict))
    })();
    tracing::trace!(test = %description, ok = outcome.is_ok());
    match outcome {
        Ok((actual, verdict)) => match verdict {
            Ok(()) => TestResult::pass(description, sig.line),
            Err(mismatch) => TestResult::fail(
                description,
                sig.line,
                format!("return value {} does not match example: {mismatch}", actual.inspect()),
            ),
        },
        Err(EvalError::UnresolvedImport(what)) => {
            TestResult::skip(description, sig.line, format!("skipped: unresolved import {what}"))
        }
        Err(err) => TestResult::fail(description, sig.line, err.to_string()),
    }
}
