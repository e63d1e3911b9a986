//! Structured change deltas.
//!
//! Every mutation of a [`crate::TextModel`] (edit batch, undo, redo) produces one [`TextDelta`].
//! Consumers such as language-server synchronization replay it without diffing old and new text.
//! Offsets are **character offsets** (Unicode scalar values).

/// A single replacement expressed in character offsets.
///
/// `start` is an offset in the document **at the time this edit is applied**. The deleted span is
/// the length of `deleted_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDeltaEdit {
    /// Start character offset of the edit.
    pub start: usize,
    /// Exact deleted text (may be empty).
    pub deleted_text: String,
    /// Exact inserted text (may be empty).
    pub inserted_text: String,
}

impl TextDeltaEdit {
    /// Length of `deleted_text` in characters.
    pub fn deleted_len(&self) -> usize {
        self.deleted_text.chars().count()
    }

    /// Length of `inserted_text` in characters.
    pub fn inserted_len(&self) -> usize {
        self.inserted_text.chars().count()
    }

    /// Exclusive end character offset in the pre-edit document.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.deleted_len())
    }
}

/// One atomic document change.
///
/// Edits are stored in descending `start` order, so applying them one after another keeps every
/// remaining `start` valid against the pre-change document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDelta {
    /// Document version before the change.
    pub version_before: u64,
    /// Document version after the change.
    pub version_after: u64,
    /// Character count before applying `edits`.
    pub before_char_count: usize,
    /// Character count after applying `edits`.
    pub after_char_count: usize,
    /// Edits in application order (descending start offsets).
    pub edits: Vec<TextDeltaEdit>,
}

impl TextDelta {
    /// Returns `true` if this delta contains no edits.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply the delta to a plain string holding the pre-change text.
    pub fn apply_to(&self, text: &str) -> String {
        let mut chars: Vec<char> = text.chars().collect();
        for edit in &self.edits {
            let start = edit.start.min(chars.len());
            let end = edit.end().min(chars.len());
            chars.splice(start..end, edit.inserted_text.chars());
        }
        chars.into_iter().collect()
    }
}
