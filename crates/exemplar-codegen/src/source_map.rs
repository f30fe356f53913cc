//! Source mapping: emitted declaration → surface source location.
//!
//! Each entry maps a top-level declaration of the emitted module to the
//! line and column it was written at. Rewrites never add or remove lines,
//! so positions in the emitted code and in the surface source coincide.
//!
//! Granularity is per declaration.

use serde::{Deserialize, Serialize};

/// A complete source map for one emitted module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    pub entries: Vec<SourceMapEntry>,
}

/// A single source map entry: one declaration → one source position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// Declaration name as it appears in the emitted code (`add`, `add$2`,
    /// `Point`).
    pub name: String,
    pub kind: DeclKind,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

/// Classification of an emitted declaration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeclKind {
    Function,
    /// One renamed variant of a polymorphic declaration.
    Variant,
    /// A synthesized polymorphic dispatcher.
    Dispatcher,
    Class,
    /// A free function holding a moved constructor variant.
    Constructor,
}

impl SourceMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Push a new entry.
    pub fn push(&mut self, name: impl Into<String>, kind: DeclKind, line: u32, column: u32) {
        self.entries.push(SourceMapEntry {
            name: name.into(),
            kind,
            line,
            column,
        });
    }

    /// Look up the entry for a declaration name.
    pub fn find(&self, name: &str) -> Option<&SourceMapEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// The innermost declaration starting at or before `line`.
    pub fn enclosing(&self, line: u32) -> Option<&SourceMapEntry> {
        self.entries
            .iter()
            .filter(|e| e.line <= line)
            .max_by_key(|e| (e.line, e.column))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(data: &str) -> Option<Self> {
        serde_json::from_str(data).ok()
    }
}

/// The trailing comment naming the emitted module for host debuggers.
pub fn source_url_comment(filename: &str) -> String {
    let name: String = filename.chars().filter(|c| !c.is_whitespace()).collect();
    format!("//# sourceURL={name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_json() {
        let mut sm = SourceMap::new();
        sm.push("add", DeclKind::Function, 1, 1);
        sm.push("greet$1", DeclKind::Variant, 3, 1);
        sm.push("greet", DeclKind::Dispatcher, 6, 2);

        let sm2 = SourceMap::from_json(&sm.to_json()).expect("parse failed");
        assert_eq!(sm2.entries.len(), 3);
        assert_eq!(sm2.entries[0].name, "add");
        assert_eq!(sm2.entries[2].kind, DeclKind::Dispatcher);
    }

    #[test]
    fn find_and_enclosing() {
        let mut sm = SourceMap::new();
        sm.push("a", DeclKind::Function, 1, 1);
        sm.push("b", DeclKind::Function, 10, 1);

        assert_eq!(sm.find("b").map(|e| e.line), Some(10));
        assert!(sm.find("c").is_none());
        assert_eq!(sm.enclosing(5).map(|e| e.name.as_str()), Some("a"));
        assert_eq!(sm.enclosing(12).map(|e| e.name.as_str()), Some("b"));
        assert!(sm.enclosing(0).is_none());
    }

    #[test]
    fn source_url_strips_whitespace() {
        assert_eq!(source_url_comment("my file.ex"), "//# sourceURL=myfile.ex");
    }
}
