use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location span.
///
/// `start`/`end` are byte offsets into the text the node was parsed from;
/// `line`/`column` are 1-based and describe `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Create a zero-width span at a single position.
    pub fn point(offset: usize, line: u32, column: u32) -> Self {
        Self::new(offset, offset, line, column)
    }

    /// Merge two spans into one that covers both.
    ///
    /// The line/column of the merged span is taken from whichever span
    /// starts first.
    pub fn merge(self, other: Span) -> Span {
        let (line, column) = if self.start <= other.start {
            (self.line, self.column)
        } else {
            (other.line, other.column)
        };
        Span::new(
            self.start.min(other.start),
            self.end.max(other.end),
            line,
            column,
        )
    }

    /// Length of the covered text in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Holds the source text for error reporting.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    /// Cached line start byte offsets for fast line lookup.
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Create a new source file.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Extract a source line by 1-based line number.
    ///
    /// Returns `None` if the line number is out of range.
    pub fn line(&self, line_number: u32) -> Option<&str> {
        let idx = line_number.checked_sub(1)? as usize;
        if idx >= self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[idx];
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&s| s.saturating_sub(1)) // strip the \n
            .unwrap_or(self.source.len());
        let line = &self.source[start..end];
        // Also strip trailing \r for CRLF
        Some(line.trim_end_matches('\r'))
    }

    /// Get the total number of lines.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Map a byte offset to a 1-based `(line, column)` pair.
    ///
    /// Columns count characters, not bytes. Offsets past the end clamp to
    /// the final position.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.source.len());
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let start = self.line_starts[idx];
        let column = self
            .source
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - start);
        (idx as u32 + 1, column as u32 + 1)
    }

    /// Build a zero-width span at a byte offset.
    pub fn span_at(&self, offset: usize) -> Span {
        let (line, column) = self.position(offset);
        Span::point(offset, line, column)
    }

    /// Build a span covering `start..end`.
    pub fn span(&self, start: usize, end: usize) -> Span {
        let (line, column) = self.position(start);
        Span::new(start, end, line, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let a = Span::new(4, 10, 1, 5);
        let b = Span::new(14, 20, 2, 3);
        let merged = a.merge(b);
        assert_eq!(merged.start, 4);
        assert_eq!(merged.end, 20);
        assert_eq!(merged.line, 1);
        assert_eq!(merged.column, 5);
    }

    #[test]
    fn test_span_merge_reversed() {
        let a = Span::new(14, 20, 2, 3);
        let b = Span::new(4, 10, 1, 5);
        let merged = a.merge(b);
        assert_eq!((merged.line, merged.column), (1, 5));
        assert_eq!(merged.len(), 16);
    }

    #[test]
    fn test_span_display() {
        let s = Span::new(0, 3, 3, 7);
        assert_eq!(format!("{s}"), "3:7");
    }

    #[test]
    fn test_source_file_line_extraction() {
        let src = SourceFile::new("test.ex", "line one\nline two\nline three");
        assert_eq!(src.line(1), Some("line one"));
        assert_eq!(src.line(2), Some("line two"));
        assert_eq!(src.line(3), Some("line three"));
        assert_eq!(src.line(0), None);
        assert_eq!(src.line(4), None);
    }

    #[test]
    fn test_source_file_crlf() {
        let src = SourceFile::new("test.ex", "line one\r\nline two\r\n");
        assert_eq!(src.line(1), Some("line one"));
        assert_eq!(src.line(2), Some("line two"));
    }

    #[test]
    fn test_position_mapping() {
        let src = SourceFile::new("test.ex", "ab\ncde\n\nf");
        assert_eq!(src.position(0), (1, 1));
        assert_eq!(src.position(1), (1, 2));
        assert_eq!(src.position(3), (2, 1));
        assert_eq!(src.position(5), (2, 3));
        assert_eq!(src.position(7), (3, 1));
        assert_eq!(src.position(8), (4, 1));
        assert_eq!(src.position(100), (4, 2));
    }

    #[test]
    fn test_position_counts_chars() {
        let src = SourceFile::new("test.ex", "é = 1");
        // 'é' is two bytes but one column
        assert_eq!(src.position(2), (1, 2));
    }

    #[test]
    fn test_source_file_empty() {
        let src = SourceFile::new("test.ex", "");
        assert_eq!(src.line_count(), 1);
        assert_eq!(src.line(1), Some(""));
        assert_eq!(src.position(0), (1, 1));
    }
}
