use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of a node inside a source file.
///
/// `start`/`end` are byte offsets; lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
            end_line: line,
            end_column: column + (end.saturating_sub(start)) as u32,
        }
    }

    /// Compute a span from byte offsets into `text`.
    pub fn from_offsets(text: &str, start: usize, end: usize) -> Self {
        let (line, column) = line_column(text, start);
        let (end_line, end_column) = line_column(text, end);
        Self {
            start,
            end,
            line,
            column,
            end_line,
            end_column,
        }
    }

    pub fn dummy() -> Self {
        Self::default()
    }
}

fn line_column(text: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(text.len());
    let before = &text[..offset];
    let line = before.matches('\n').count() as u32 + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count(),
        None => before.chars().count(),
    };
    (line, column as u32 + 1)
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_offsets_second_line() {
        let text = "first\nsecond line";
        let span = Span::from_offsets(text, 6, 12);
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 1);
        assert_eq!(span.end_line, 2);
        assert_eq!(span.end_column, 7);
    }

    #[test]
    fn test_display() {
        let span = Span::new(0, 3, 4, 9);
        assert_eq!(span.to_string(), "4:9");
    }
}
