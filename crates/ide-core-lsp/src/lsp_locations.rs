//! Normalization of "go to" results.
//!
//! `textDocument/definition` and `textDocument/references` answer with a `Location`, a
//! `LocationLink`, arrays of either, or `null`. This module flattens those shapes into
//! `(uri, range)` pairs and resolves them into [`SymbolReference`] snapshots.

use crate::lsp_sync::{LspCoordinateConverter, LspPosition, LspRange, PositionEncoding};
use ide_core::{Position, SymbolReference};
use serde_json::Value;

/// A normalized LSP location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LspLocation {
    /// Target document URI (e.g. `file:///...`).
    pub uri: String,
    /// Target range within the document, in server coordinates.
    pub range: LspRange,
}

fn location_from_value(value: &Value) -> Option<LspLocation> {
    // Location: { uri, range }
    if let (Some(uri), Some(range)) = (
        value.get("uri").and_then(Value::as_str),
        value.get("range").and_then(LspRange::from_value),
    ) {
        return Some(LspLocation {
            uri: uri.to_string(),
            range,
        });
    }

    // LocationLink: { targetUri, targetRange, targetSelectionRange }
    let uri = value.get("targetUri").and_then(Value::as_str)?;
    let range = value
        .get("targetSelectionRange")
        .and_then(LspRange::from_value)
        .or_else(|| value.get("targetRange").and_then(LspRange::from_value))?;

    Some(LspLocation {
        uri: uri.to_string(),
        range,
    })
}

/// Normalize `Location | Location[] | LocationLink | LocationLink[] | null`.
pub fn locations_from_value(value: &Value) -> Vec<LspLocation> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter_map(location_from_value).collect(),
        other => location_from_value(other).into_iter().collect(),
    }
}

/// Resolve server locations into local positions.
///
/// `line_text(uri, line)` supplies the text needed to convert code-unit columns; when it returns
/// `None` (e.g. unreadable file) the server column is used as-is.
pub fn resolve_locations<F>(
    locations: &[LspLocation],
    encoding: PositionEncoding,
    mut line_text: F,
) -> Vec<SymbolReference>
where
    F: FnMut(&str, usize) -> Option<String>,
{
    locations
        .iter()
        .map(|loc| {
            let mut convert = |pos: LspPosition| match line_text(&loc.uri, pos.line as usize) {
                Some(text) => LspCoordinateConverter::position_from_lsp(&text, pos, encoding),
                None => Position::new(pos.line as usize, pos.character as usize),
            };
            let start = convert(loc.range.start);
            let end = convert(loc.range.end);
            SymbolReference::location(loc.uri.clone(), start, Some(end))
        })
        .collect()
}
