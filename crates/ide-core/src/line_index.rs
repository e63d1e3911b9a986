//! Position index over a document snapshot.
//!
//! Converts zero-based `(line, column)` coordinates into absolute character offsets and back.
//! Columns count Unicode scalar values (`char`), never bytes. Only `'\n'` terminates a line:
//! documents are kept LF-normalized in memory (see [`crate::line_ending`]), so a stray `'\r'`
//! is ordinary line content.
//!
//! The index is the document's storage itself (a [`Rope`]), so it is always current with
//! respect to the last applied edit.

use crate::error::OutOfRangeError;
use ropey::Rope;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A zero-based `(line, column)` coordinate. Columns are counted in characters.
///
/// Serialized as a two-element array `[line, column]`. The derived ordering is document order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Position {
    /// Zero-based line.
    pub line: usize,
    /// Zero-based column in characters.
    pub column: usize,
}

impl Position {
    /// Create a new position.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl From<(usize, usize)> for Position {
    fn from((line, column): (usize, usize)) -> Self {
        Self { line, column }
    }
}

impl From<Position> for (usize, usize) {
    fn from(pos: Position) -> Self {
        (pos.line, pos.column)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.line, self.column)
    }
}

/// How out-of-range coordinates are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionPolicy {
    /// Reject with [`OutOfRangeError`].
    #[default]
    Strict,
    /// Clamp to the nearest valid location.
    Clamp,
}

/// Rope-backed line index.
#[derive(Debug, Clone)]
pub struct LineIndex {
    rope: Rope,
}

impl LineIndex {
    /// Create an index for an empty document.
    pub fn new() -> Self {
        Self { rope: Rope::new() }
    }

    /// Build an index from LF-normalized text.
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// Number of lines. An empty document has one (empty) line; a trailing `'\n'` opens a new one.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Total character count.
    pub fn char_count(&self) -> usize {
        self.rope.len_chars()
    }

    /// Length of `line` in characters, excluding its newline.
    pub fn line_len(&self, line: usize) -> Option<usize> {
        if line >= self.rope.len_lines() {
            return None;
        }
        let start = self.rope.line_to_char(line);
        let end = if line + 1 < self.rope.len_lines() {
            self.rope.line_to_char(line + 1) - 1
        } else {
            self.rope.len_chars()
        };
        Some(end - start)
    }

    /// Text of `line` without its newline.
    pub fn line_text(&self, line: usize) -> Option<String> {
        let len = self.line_len(line)?;
        let start = self.rope.line_to_char(line);
        Some(self.rope.slice(start..start + len).to_string())
    }

    /// The whole document text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Text between two character offsets. Offsets are clamped to the document.
    pub fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.rope.len_chars());
        let start = start.min(end);
        self.rope.slice(start..end).to_string()
    }

    /// Position just past the last character.
    pub fn end_position(&self) -> Position {
        let last = self.line_count().saturating_sub(1);
        Position::new(last, self.line_len(last).unwrap_or(0))
    }

    /// Convert a position into an absolute character offset.
    pub fn position_to_offset(
        &self,
        pos: Position,
        policy: PositionPolicy,
    ) -> Result<usize, OutOfRangeError> {
        let line_count = self.line_count();
        if pos.line >= line_count {
            return match policy {
                PositionPolicy::Strict => Err(OutOfRangeError::Line {
                    line: pos.line,
                    line_count,
                }),
                PositionPolicy::Clamp => Ok(self.rope.len_chars()),
            };
        }

        let line_len = self.line_len(pos.line).unwrap_or(0);
        let column = if pos.column > line_len {
            match policy {
                PositionPolicy::Strict => {
                    return Err(OutOfRangeError::Column {
                        line: pos.line,
                        column: pos.column,
                        line_len,
                    });
                }
                PositionPolicy::Clamp => line_len,
            }
        } else {
            pos.column
        };

        Ok(self.rope.line_to_char(pos.line) + column)
    }

    /// Convert an absolute character offset into a position.
    pub fn offset_to_position(
        &self,
        offset: usize,
        policy: PositionPolicy,
    ) -> Result<Position, OutOfRangeError> {
        let char_count = self.rope.len_chars();
        let offset = if offset > char_count {
            match policy {
                PositionPolicy::Strict => {
                    return Err(OutOfRangeError::Offset { offset, char_count });
                }
                PositionPolicy::Clamp => char_count,
            }
        } else {
            offset
        };

        let line = self.rope.char_to_line(offset);
        Ok(Position::new(line, offset - self.rope.line_to_char(line)))
    }

    /// Position of `offset`, clamped to the end of the document.
    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.rope.len_chars());
        let line = self.rope.char_to_line(offset);
        Position::new(line, offset - self.rope.line_to_char(line))
    }

    pub(crate) fn insert(&mut self, offset: usize, text: &str) {
        if !text.is_empty() {
            self.rope.insert(offset.min(self.rope.len_chars()), text);
        }
    }

    pub(crate) fn remove(&mut self, start: usize, end: usize) {
        let end = end.min(self.rope.len_chars());
        if start < end {
            self.rope.remove(start..end);
        }
    }
}

impl Default for LineIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_has_one_line() {
        let index = LineIndex::new();
        assert_eq!(index.line_count(), 1);
        assert_eq!(index.char_count(), 0);
        assert_eq!(index.line_len(0), Some(0));
        assert_eq!(index.end_position(), Position::new(0, 0));
    }

    #[test]
    fn trailing_newline_opens_a_line() {
        let index = LineIndex::from_text("x = 1\n");
        assert_eq!(index.line_count(), 2);
        assert_eq!(index.line_text(0).as_deref(), Some("x = 1"));
        assert_eq!(index.line_text(1).as_deref(), Some(""));
        assert_eq!(index.end_position(), Position::new(1, 0));
    }

    #[test]
    fn position_to_offset_counts_chars() {
        let index = LineIndex::from_text("你好\n世界!");
        assert_eq!(
            index.position_to_offset(Position::new(0, 2), PositionPolicy::Strict),
            Ok(2)
        );
        assert_eq!(
            index.position_to_offset(Position::new(1, 0), PositionPolicy::Strict),
            Ok(3)
        );
        assert_eq!(
            index.position_to_offset(Position::new(1, 3), PositionPolicy::Strict),
            Ok(6)
        );
    }

    #[test]
    fn strict_rejects_past_line_end() {
        let index = LineIndex::from_text("abc\nde");
        assert_eq!(
            index.position_to_offset(Position::new(1, 3), PositionPolicy::Strict),
            Err(OutOfRangeError::Column {
                line: 1,
                column: 3,
                line_len: 2
            })
        );
        assert_eq!(
            index.position_to_offset(Position::new(2, 0), PositionPolicy::Strict),
            Err(OutOfRangeError::Line {
                line: 2,
                line_count: 2
            })
        );
    }

    #[test]
    fn clamp_snaps_to_nearest_valid_position() {
        let index = LineIndex::from_text("abc\nde");
        assert_eq!(
            index.position_to_offset(Position::new(0, 99), PositionPolicy::Clamp),
            Ok(3)
        );
        assert_eq!(
            index.position_to_offset(Position::new(9, 0), PositionPolicy::Clamp),
            Ok(6)
        );
        assert_eq!(
            index.offset_to_position(42, PositionPolicy::Clamp),
            Ok(Position::new(1, 2))
        );
    }

    #[test]
    fn carriage_return_is_not_a_line_break() {
        let index = LineIndex::from_text("a\rb\nc");
        assert_eq!(index.line_count(), 2);
        assert_eq!(index.line_len(0), Some(3));
    }

    #[test]
    fn round_trip_every_valid_position() {
        let index = LineIndex::from_text("fn main() {\n    println!(\"héllo 🌍\");\n}\n");
        for line in 0..index.line_count() {
            let len = index.line_len(line).unwrap();
            for column in 0..=len {
                let pos = Position::new(line, column);
                let offset = index
                    .position_to_offset(pos, PositionPolicy::Strict)
                    .unwrap();
                assert_eq!(
                    index.offset_to_position(offset, PositionPolicy::Strict),
                    Ok(pos)
                );
            }
        }
    }

    #[test]
    fn position_serializes_as_pair() {
        let pos: Position = serde_json::from_str("[3, 7]").unwrap();
        assert_eq!(pos, Position::new(3, 7));
        assert_eq!(serde_json::to_string(&pos).unwrap(), "[3,7]");
    }
}
