//! Offset-based text editing.
//!
//! Passes record edits against the text they scanned and apply them in one
//! go, so every offset they computed stays valid until the edit is applied.

/// A single replacement of `start..end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Collected edits against one source text.
#[derive(Debug, Clone, Default)]
pub struct Splicer {
    edits: Vec<Edit>,
}

impl Splicer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, start: usize, end: usize, text: impl Into<String>) {
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
        });
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.replace(at, at, text);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Apply every edit to `source`.
    ///
    /// Edits are applied in offset order; insertions at the same offset keep
    /// the order they were recorded in. An edit overlapping an earlier one is
    /// dropped.
    pub fn apply(mut self, source: &str) -> String {
        // Stable sort keeps same-offset insertions in recording order.
        self.edits.sort_by_key(|e| (e.start, e.end));
        let mut out = String::with_capacity(source.len() + 64);
        let mut cursor = 0;
        for edit in self.edits {
            if edit.start < cursor || edit.end > source.len() {
                continue;
            }
            out.push_str(&source[cursor..edit.start]);
            out.push_str(&edit.text);
            cursor = edit.end;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_in_offset_order() {
        let mut s = Splicer::new();
        s.replace(6, 11, "there");
        s.insert(0, ">> ");
        assert_eq!(s.apply("hello world"), ">> hello there");
    }

    #[test]
    fn test_same_offset_insertions_keep_order() {
        let mut s = Splicer::new();
        s.insert(1, "a");
        s.insert(1, "b");
        assert_eq!(s.apply("xy"), "xaby");
    }

    #[test]
    fn test_overlap_dropped() {
        let mut s = Splicer::new();
        s.replace(0, 4, "A");
        s.replace(2, 6, "B");
        assert_eq!(s.apply("abcdefg"), "Aefg");
    }
}
