//! Error types shared by the position index and the text model.

use crate::line_index::Position;
use thiserror::Error;

/// A coordinate or offset that does not address a valid location in the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutOfRangeError {
    /// The line does not exist.
    #[error("line {line} is out of range (document has {line_count} lines)")]
    Line {
        /// Requested line.
        line: usize,
        /// Lines in the document.
        line_count: usize,
    },
    /// The column lies past the end of its line.
    #[error("column {column} is out of range for line {line} (line length {line_len})")]
    Column {
        /// Requested line.
        line: usize,
        /// Requested column.
        column: usize,
        /// Length of the line in characters, excluding the newline.
        line_len: usize,
    },
    /// The character offset lies past the end of the document.
    #[error("offset {offset} is out of range (document has {char_count} characters)")]
    Offset {
        /// Requested offset.
        offset: usize,
        /// Characters in the document.
        char_count: usize,
    },
}

/// Reasons an edit batch is rejected. A rejected batch never mutates the document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextModelError {
    /// The batch contains no edits.
    #[error("edit batch is empty")]
    EmptyBatch,
    /// One edit addresses a position outside the document.
    #[error("edit #{index} is out of range: {source}")]
    OutOfRange {
        /// Index of the offending edit in the submitted batch.
        index: usize,
        /// Underlying position error.
        #[source]
        source: OutOfRangeError,
    },
    /// One edit ends before it starts.
    #[error("edit #{index} starts at {start} but ends at {end}")]
    ReversedRange {
        /// Index of the offending edit in the submitted batch.
        index: usize,
        /// Start position as submitted.
        start: Position,
        /// End position as submitted.
        end: Position,
    },
    /// Two edits in the same batch touch overlapping text.
    #[error("edits #{first} and #{second} overlap")]
    OverlappingEdits {
        /// Index of the earlier edit in document order.
        first: usize,
        /// Index of the later edit in document order.
        second: usize,
    },
}

impl TextModelError {
    /// Returns `true` for errors caused by an invalid edit range, as opposed to a malformed batch.
    pub fn is_range_error(&self) -> bool {
        !matches!(self, Self::EmptyBatch)
    }
}
