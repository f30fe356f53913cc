//! Exemplar code generators.
//!
//! # Architecture
//!
//! Two back ends consume the rewritten module and its inferred
//! [`exemplar_types::FunctionSignature`]s:
//!
//! ## Host source ([`host`])
//! - unsafe blocks become guarded `try`/`catch` returning a tagged error
//! - strict mode inserts argument guards and `-?` return checks
//! - every declaration gets a `__meta` record ([`meta`])
//! - only the runtime helpers the module references are appended
//!   ([`prelude`])
//!
//! Edits never add lines, so host line numbers equal surface line numbers
//! and a per-declaration [`SourceMap`] is enough for debugging.
//!
//! ## Agent instruction tree ([`agent`])
//! One entry function is lowered to a JSON op tree
//! `{ op: 'seq', steps, inputSchema }` for a sandbox interpreter. Constructs
//! outside the subset fail with a [`CodegenError::Rejected`] carrying a
//! suggested alternative.

pub mod agent;
pub mod error;
pub mod host;
pub mod meta;
pub mod prelude;
pub mod source_map;

pub use agent::emit_agent;
pub use error::{CodegenError, CodegenResult};
pub use host::{emit_host, HostInput, HostOptions, HostOutput};
pub use meta::ClassMeta;
pub use source_map::{DeclKind, SourceMap, SourceMapEntry};
