//! Position-addressed text model with undo/redo.
//!
//! A [`TextModel`] owns one document's text, version and history. Edits arrive as batches of
//! `[start, end)` position ranges. A batch is validated as a whole before anything is touched,
//! applied in descending offset order, and recorded as a single history entry holding the exact
//! edits needed to revert it.
//!
//! Versions: every applied batch bumps the version by one. Undo restores the version that existed
//! before the batch, redo the one after it.

use crate::delta::{TextDelta, TextDeltaEdit};
use crate::error::TextModelError;
use crate::line_index::{LineIndex, Position, PositionPolicy};
use serde::{Deserialize, Serialize};

/// Default number of history entries retained per document.
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// A half-open `[start_position, end_position)` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextRange {
    /// Inclusive start.
    pub start_position: Position,
    /// Exclusive end.
    pub end_position: Position,
}

impl TextRange {
    /// Create a new range.
    pub fn new(start_position: Position, end_position: Position) -> Self {
        Self {
            start_position,
            end_position,
        }
    }

    /// An empty range at `pos` (pure insertion point).
    pub fn at(pos: Position) -> Self {
        Self::new(pos, pos)
    }
}

/// A range replacement.
///
/// On the wire both fields are required; a deletion carries `"text": ""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Edit {
    /// Replaced range.
    pub range: TextRange,
    /// Replacement text (empty for deletions).
    pub text: String,
}

impl Edit {
    /// Create a new edit.
    pub fn new(range: TextRange, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    /// Insert `text` at `pos`.
    pub fn insert(pos: Position, text: impl Into<String>) -> Self {
        Self::new(TextRange::at(pos), text)
    }
}

/// Size of an applied batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DiffSummary {
    /// Number of edits in the batch.
    pub edits_applied: usize,
    /// Characters inserted.
    pub chars_inserted: usize,
    /// Characters deleted.
    pub chars_deleted: usize,
    /// First line touched, in post-edit coordinates.
    pub first_line: usize,
    /// Last line touched, in post-edit coordinates.
    pub last_line: usize,
}

/// Outcome of a successful [`TextModel::apply_edits`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditResult {
    /// Version before the batch.
    pub previous_version: u64,
    /// Version after the batch.
    pub version: u64,
    /// Edits that revert the batch when applied to the new content.
    pub inverse_edits: Vec<Edit>,
    /// Size of the change.
    pub summary: DiffSummary,
}

#[derive(Debug, Clone)]
struct AppliedEdit {
    start_before: usize,
    start_after: usize,
    deleted_text: String,
    inserted_text: String,
}

impl AppliedEdit {
    fn deleted_len(&self) -> usize {
        self.deleted_text.chars().count()
    }

    fn inserted_len(&self) -> usize {
        self.inserted_text.chars().count()
    }
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    version_before: u64,
    version_after: u64,
    /// Ascending by `start_before`.
    edits: Vec<AppliedEdit>,
}

#[derive(Debug)]
struct History {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_depth: usize,
    /// Saved position in the linear history, as an `undo_stack.len()` value.
    /// May exceed `undo_stack.len()` while the saved state sits on the redo side.
    clean_index: Option<usize>,
}

impl History {
    fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
            clean_index: Some(0),
        }
    }

    fn is_clean(&self) -> bool {
        self.clean_index == Some(self.undo_stack.len())
    }

    fn mark_clean(&mut self) {
        self.clean_index = Some(self.undo_stack.len());
    }

    fn push(&mut self, entry: HistoryEntry) {
        if !self.redo_stack.is_empty() {
            // The saved state becomes unreachable once the redo branch is dropped.
            if let Some(clean_index) = self.clean_index
                && clean_index > self.undo_stack.len()
            {
                self.clean_index = None;
            }
            self.redo_stack.clear();
        }

        if self.undo_stack.len() >= self.max_depth {
            self.undo_stack.remove(0);
            self.clean_index = match self.clean_index {
                Some(0) | None => None,
                Some(idx) => Some(idx - 1),
            };
        }

        self.undo_stack.push(entry);
    }
}

/// One document's content, version and history.
#[derive(Debug)]
pub struct TextModel {
    index: LineIndex,
    version: u64,
    history: History,
    last_delta: Option<TextDelta>,
}

impl TextModel {
    /// Create a model at version 0 from LF-normalized text.
    pub fn new(text: &str) -> Self {
        Self::with_history_limit(text, DEFAULT_MAX_HISTORY)
    }

    /// Create a model keeping at most `max_history` undo entries.
    pub fn with_history_limit(text: &str, max_history: usize) -> Self {
        Self {
            index: LineIndex::from_text(text),
            version: 0,
            history: History::new(max_history),
            last_delta: None,
        }
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Full text.
    pub fn text(&self) -> String {
        self.index.text()
    }

    /// The position index of the current content.
    pub fn index(&self) -> &LineIndex {
        &self.index
    }

    /// A cheap copy of the current content, unaffected by later edits.
    pub fn snapshot(&self) -> LineIndex {
        self.index.clone()
    }

    /// `true` if the content differs from the last saved (or opened) state.
    pub fn is_dirty(&self) -> bool {
        !self.history.is_clean()
    }

    /// Record the current state as persisted.
    pub fn mark_saved(&mut self) {
        self.history.mark_clean();
    }

    /// Number of entries that can be undone.
    pub fn undo_depth(&self) -> usize {
        self.history.undo_stack.len()
    }

    /// Number of entries that can be redone.
    pub fn redo_depth(&self) -> usize {
        self.history.redo_stack.len()
    }

    /// Take the delta produced by the most recent mutation, if not taken yet.
    pub fn take_last_delta(&mut self) -> Option<TextDelta> {
        self.last_delta.take()
    }

    /// Read up to `limit` characters starting at `offset`.
    ///
    /// Out-of-range offsets produce an empty string.
    pub fn read(&self, offset: Option<usize>, limit: Option<usize>) -> String {
        let char_count = self.index.char_count();
        let start = offset.unwrap_or(0);
        if start > char_count {
            return String::new();
        }
        let end = match limit {
            Some(limit) => start.saturating_add(limit).min(char_count),
            None => char_count,
        };
        self.index.slice(start, end)
    }

    /// Apply a batch of non-overlapping edits atomically.
    ///
    /// All positions refer to the content before the batch. On error nothing changes.
    pub fn apply_edits(
        &mut self,
        edits: &[Edit],
        policy: PositionPolicy,
    ) -> Result<EditResult, TextModelError> {
        if edits.is_empty() {
            return Err(TextModelError::EmptyBatch);
        }

        // (start, end, batch index)
        let mut resolved = Vec::with_capacity(edits.len());
        for (index, edit) in edits.iter().enumerate() {
            let TextRange {
                start_position,
                end_position,
            } = edit.range;
            if end_position < start_position {
                return Err(TextModelError::ReversedRange {
                    index,
                    start: start_position,
                    end: end_position,
                });
            }
            let start = self
                .index
                .position_to_offset(start_position, policy)
                .map_err(|source| TextModelError::OutOfRange { index, source })?;
            let end = self
                .index
                .position_to_offset(end_position, policy)
                .map_err(|source| TextModelError::OutOfRange { index, source })?;
            resolved.push((start, end.max(start), index));
        }

        resolved.sort();
        for pair in resolved.windows(2) {
            let (_, prev_end, prev_index) = pair[0];
            let (next_start, _, next_index) = pair[1];
            if prev_end > next_start {
                return Err(TextModelError::OverlappingEdits {
                    first: prev_index,
                    second: next_index,
                });
            }
        }

        let mut applied = Vec::with_capacity(resolved.len());
        let mut inserted_so_far = 0usize;
        let mut deleted_so_far = 0usize;
        for &(start, end, index) in &resolved {
            let deleted_text = self.index.slice(start, end);
            let inserted_text = edits[index].text.clone();
            let edit = AppliedEdit {
                start_before: start,
                start_after: start + inserted_so_far - deleted_so_far,
                deleted_text,
                inserted_text,
            };
            inserted_so_far += edit.inserted_len();
            deleted_so_far += edit.deleted_len();
            applied.push(edit);
        }

        let previous_version = self.version;
        let version = previous_version + 1;
        let entry = HistoryEntry {
            version_before: previous_version,
            version_after: version,
            edits: applied,
        };

        self.redo_entry(&entry);
        let inverse_edits = self.inverse_edits(&entry);
        let summary = self.summarize(&entry, inserted_so_far, deleted_so_far);
        self.history.push(entry);

        Ok(EditResult {
            previous_version,
            version,
            inverse_edits,
            summary,
        })
    }

    /// Revert the most recent batch. Returns `false` if there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.history.undo_stack.pop() else {
            return false;
        };

        let before_char_count = self.index.char_count();
        let mut delta_edits = Vec::with_capacity(entry.edits.len());
        for edit in entry.edits.iter().rev() {
            self.index
                .remove(edit.start_after, edit.start_after + edit.inserted_len());
            self.index.insert(edit.start_after, &edit.deleted_text);
            delta_edits.push(TextDeltaEdit {
                start: edit.start_after,
                deleted_text: edit.inserted_text.clone(),
                inserted_text: edit.deleted_text.clone(),
            });
        }

        self.last_delta = Some(TextDelta {
            version_before: self.version,
            version_after: entry.version_before,
            before_char_count,
            after_char_count: self.index.char_count(),
            edits: delta_edits,
        });
        self.version = entry.version_before;
        self.history.redo_stack.push(entry);
        true
    }

    /// Re-apply the most recently undone batch. Returns `false` if there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.history.redo_stack.pop() else {
            return false;
        };

        self.redo_entry(&entry);
        self.history.undo_stack.push(entry);
        true
    }

    fn redo_entry(&mut self, entry: &HistoryEntry) {
        let before_char_count = self.index.char_count();
        let mut delta_edits = Vec::with_capacity(entry.edits.len());
        for edit in entry.edits.iter().rev() {
            self.index
                .remove(edit.start_before, edit.start_before + edit.deleted_len());
            self.index.insert(edit.start_before, &edit.inserted_text);
            delta_edits.push(TextDeltaEdit {
                start: edit.start_before,
                deleted_text: edit.deleted_text.clone(),
                inserted_text: edit.inserted_text.clone(),
            });
        }

        self.last_delta = Some(TextDelta {
            version_before: self.version,
            version_after: entry.version_after,
            before_char_count,
            after_char_count: self.index.char_count(),
            edits: delta_edits,
        });
        self.version = entry.version_after;
    }

    fn inverse_edits(&self, entry: &HistoryEntry) -> Vec<Edit> {
        entry
            .edits
            .iter()
            .map(|edit| {
                let start = self.index.position_at(edit.start_after);
                let end = self
                    .index
                    .position_at(edit.start_after + edit.inserted_len());
                Edit::new(TextRange::new(start, end), edit.deleted_text.clone())
            })
            .collect()
    }

    fn summarize(&self, entry: &HistoryEntry, inserted: usize, deleted: usize) -> DiffSummary {
        let first_line = entry
            .edits
            .first()
            .map(|edit| self.index.position_at(edit.start_after).line)
            .unwrap_or(0);
        let last_line = entry
            .edits
            .last()
            .map(|edit| {
                self.index
                    .position_at(edit.start_after + edit.inserted_len())
                    .line
            })
            .unwrap_or(first_line);

        DiffSummary {
            edits_applied: entry.edits.len(),
            chars_inserted: inserted,
            chars_deleted: deleted,
            first_line,
            last_line,
        }
    }

    /// Render lines `first..=last` (clamped), optionally prefixed with `"{line:<5}|"`.
    pub fn render_lines(&self, first: usize, last: usize, with_line_numbers: bool) -> String {
        let line_count = self.index.line_count();
        let last = last.min(line_count.saturating_sub(1));
        let mut out = String::new();
        for line in first..=last {
            let text = self.index.line_text(line).unwrap_or_default();
            if with_line_numbers {
                out.push_str(&format!("{line:<5}|{text}"));
            } else {
                out.push_str(&text);
            }
            if line < last {
                out.push('\n');
            }
        }
        out
    }
}

impl Default for TextModel {
    fn default() -> Self {
        Self::new("")
    }
}
