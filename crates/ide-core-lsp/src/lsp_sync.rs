//! Coordinate conversion and change translation.
//!
//! Local positions count characters (Unicode scalar values). LSP positions count code units of
//! the negotiated `positionEncoding`: UTF-16 unless the server picked `utf-32` (identical to
//! local columns) or `utf-8`.

use ide_core::{LineIndex, Position, TextDelta};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// An LSP position in the negotiated encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspPosition {
    /// Line number (0-based).
    pub line: u32,
    /// Code-unit offset within the line.
    pub character: u32,
}

impl LspPosition {
    /// Create a new LSP position.
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// An LSP range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspRange {
    /// Range start position (inclusive).
    pub start: LspPosition,
    /// Range end position (exclusive).
    pub end: LspPosition,
}

impl LspRange {
    /// Create a new LSP range.
    pub fn new(start: LspPosition, end: LspPosition) -> Self {
        Self { start, end }
    }

    /// Parse a `{start, end}` JSON object.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// One `contentChanges` item of `textDocument/didChange`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChange {
    /// Replaced range, in the document state produced by the previous change.
    pub range: LspRange,
    /// Replacement text.
    pub text: String,
}

/// The unit LSP `character` offsets are counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionEncoding {
    /// UTF-8 code units (bytes).
    Utf8,
    /// UTF-16 code units (the protocol default).
    #[default]
    Utf16,
    /// Unicode code points.
    Utf32,
}

impl PositionEncoding {
    /// Encodings offered in `initialize`, most preferred first.
    pub const OFFERED: [&'static str; 2] = ["utf-32", "utf-16"];

    /// Read `capabilities.positionEncoding` from an `initialize` result.
    pub fn from_capabilities(capabilities: &Value) -> Self {
        match capabilities.get("positionEncoding").and_then(Value::as_str) {
            Some("utf-32") => Self::Utf32,
            Some("utf-8") => Self::Utf8,
            _ => Self::Utf16,
        }
    }

    fn units(self, ch: char) -> usize {
        match self {
            Self::Utf8 => ch.len_utf8(),
            Self::Utf16 => ch.len_utf16(),
            Self::Utf32 => 1,
        }
    }
}

/// How the server wants `didChange` content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// The server does not track changes.
    None,
    /// Whole document on every change.
    Full,
    /// Changed ranges only.
    Incremental,
}

impl SyncKind {
    /// Read `capabilities.textDocumentSync` (number or options object).
    ///
    /// Servers that omit it are treated as incremental.
    pub fn from_capabilities(capabilities: &Value) -> Self {
        let sync = capabilities.get("textDocumentSync");
        let kind = sync
            .and_then(Value::as_u64)
            .or_else(|| sync.and_then(|s| s.get("change")).and_then(Value::as_u64));
        match kind {
            Some(0) => Self::None,
            Some(1) => Self::Full,
            _ => Self::Incremental,
        }
    }
}

/// Column conversions between local characters and LSP code units.
pub struct LspCoordinateConverter;

impl LspCoordinateConverter {
    /// Code units occupied by the first `column` characters of `line_text`.
    pub fn column_to_lsp(line_text: &str, column: usize, encoding: PositionEncoding) -> u32 {
        line_text
            .chars()
            .take(column)
            .map(|ch| encoding.units(ch))
            .sum::<usize>() as u32
    }

    /// Characters covered by `character` code units of `line_text`.
    ///
    /// An offset that falls inside a character rounds down to its start.
    pub fn lsp_to_column(line_text: &str, character: u32, encoding: PositionEncoding) -> usize {
        let target = character as usize;
        let mut units = 0usize;
        let mut column = 0usize;
        for ch in line_text.chars() {
            let next = units + encoding.units(ch);
            if next > target {
                break;
            }
            units = next;
            column += 1;
        }
        column
    }

    /// Convert a local position using the document's line text.
    pub fn position_to_lsp(
        index: &LineIndex,
        pos: Position,
        encoding: PositionEncoding,
    ) -> LspPosition {
        let line_text = index.line_text(pos.line).unwrap_or_default();
        LspPosition::new(
            pos.line as u32,
            Self::column_to_lsp(&line_text, pos.column, encoding),
        )
    }

    /// Convert an LSP position into a local one, clamped to the line.
    pub fn position_from_lsp(line_text: &str, pos: LspPosition, encoding: PositionEncoding) -> Position {
        Position::new(
            pos.line as usize,
            Self::lsp_to_column(line_text, pos.character, encoding),
        )
    }
}

/// Translate a local change delta into ordered `contentChanges`.
///
/// `before` must be the content the delta was produced from. Delta edits are in descending offset
/// order, so every edit's coordinates are still valid in `before` when the server applies the
/// changes one after another.
pub fn content_changes_for_delta(
    before: &LineIndex,
    delta: &TextDelta,
    encoding: PositionEncoding,
) -> Vec<TextChange> {
    delta
        .edits
        .iter()
        .map(|edit| {
            let start = before.position_at(edit.start);
            let end = before.position_at(edit.end());
            TextChange {
                range: LspRange::new(
                    LspCoordinateConverter::position_to_lsp(before, start, encoding),
                    LspCoordinateConverter::position_to_lsp(before, end, encoding),
                ),
                text: edit.inserted_text.clone(),
            }
        })
        .collect()
}

/// JSON for a `textDocument/didChange` notification.
pub fn did_change_params(uri: &str, version: i32, changes: &[TextChange]) -> Value {
    json!({
        "textDocument": { "uri": uri, "version": version },
        "contentChanges": changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ide_core::{Edit, PositionPolicy, TextModel, TextRange};
    use pretty_assertions::assert_eq;

    #[test]
    fn utf16_counts_surrogate_pairs() {
        let line = "a🌍b";
        assert_eq!(
            LspCoordinateConverter::column_to_lsp(line, 2, PositionEncoding::Utf16),
            3
        );
        assert_eq!(
            LspCoordinateConverter::lsp_to_column(line, 3, PositionEncoding::Utf16),
            2
        );
        // Inside the surrogate pair rounds down.
        assert_eq!(
            LspCoordinateConverter::lsp_to_column(line, 2, PositionEncoding::Utf16),
            1
        );
    }

    #[test]
    fn utf32_matches_local_columns() {
        let line = "你好🌍";
        for column in 0..=3 {
            let lsp = LspCoordinateConverter::column_to_lsp(line, column, PositionEncoding::Utf32);
            assert_eq!(lsp as usize, column);
        }
        assert_eq!(
            LspCoordinateConverter::column_to_lsp(line, 2, PositionEncoding::Utf8),
            6
        );
    }

    #[test]
    fn capabilities_select_encoding_and_sync_kind() {
        let caps = json!({"positionEncoding": "utf-32", "textDocumentSync": {"openClose": true, "change": 2}});
        assert_eq!(
            PositionEncoding::from_capabilities(&caps),
            PositionEncoding::Utf32
        );
        assert_eq!(SyncKind::from_capabilities(&caps), SyncKind::Incremental);
        assert_eq!(
            SyncKind::from_capabilities(&json!({"textDocumentSync": 1})),
            SyncKind::Full
        );
        assert_eq!(
            PositionEncoding::from_capabilities(&json!({})),
            PositionEncoding::Utf16
        );
    }

    #[test]
    fn delta_becomes_descending_changes_in_pre_edit_coordinates() {
        let mut model = TextModel::new("let 🌍 = 1;\nlet b = 2;\n");
        let before = model.snapshot();
        model
            .apply_edits(
                &[
                    Edit::new(
                        TextRange::new(Position::new(0, 6), Position::new(0, 9)),
                        "42",
                    ),
                    Edit::new(
                        TextRange::new(Position::new(1, 4), Position::new(1, 5)),
                        "beta",
                    ),
                ],
                PositionPolicy::Strict,
            )
            .unwrap();
        let delta = model.take_last_delta().unwrap();

        let changes = content_changes_for_delta(&before, &delta, PositionEncoding::Utf16);
        assert_eq!(
            changes,
            vec![
                TextChange {
                    range: LspRange::new(LspPosition::new(1, 4), LspPosition::new(1, 5)),
                    text: "beta".to_string(),
                },
                TextChange {
                    range: LspRange::new(LspPosition::new(0, 7), LspPosition::new(0, 10)),
                    text: "42".to_string(),
                },
            ]
        );
    }
}
