//! Source location mapping for statements and diagnostics

use serde::Serialize;

/// Span inside a source text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    /// Byte offset of the start
    pub byte_start: usize,
    /// Byte offset of the end
    pub byte_end: usize,
    /// Line number (1-indexed)
    pub start_line: usize,
    /// Column number (1-indexed, in UTF-8 characters)
    pub start_column: usize,
    /// End line number
    pub end_line: usize,
    /// End column number
    pub end_column: usize,
}

impl SourceLocation {
    /// Convert byte offsets to line/column
    pub fn from_bytes(source: &str, byte_start: usize, byte_end: usize) -> Self {
        let (start_line, start_column) = byte_to_line_column(source, byte_start);
        let (end_line, end_column) = byte_to_line_column(source, byte_end);

        Self {
            byte_start,
            byte_end,
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Shift columns on the first line left by `chars` (used when a prefix was
    /// spliced onto line 1 before parsing)
    pub fn unshift_first_line(mut self, chars: usize) -> Self {
        if self.start_line == 1 {
            self.start_column = self.start_column.saturating_sub(chars).max(1);
        }
        if self.end_line == 1 {
            self.end_column = self.end_column.saturating_sub(chars).max(1);
        }
        self
    }

    /// `line:col-line:col`
    pub fn display(&self) -> String {
        format!(
            "{}:{}-{}:{}",
            self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

/// Convert byte offset to line and column (1-indexed)
pub fn byte_to_line_column(source: &str, byte_offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    let mut current_byte = 0;

    for ch in source.chars() {
        if current_byte >= byte_offset {
            break;
        }

        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }

        current_byte += ch.len_utf8();
    }

    (line, column)
}

/// Text of a 1-indexed line without its terminator
pub fn line_text(source: &str, line: usize) -> Option<&str> {
    source
        .lines()
        .nth(line.checked_sub(1)?)
        .map(|l| l.trim_end_matches('\r'))
}
