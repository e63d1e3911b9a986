//! Symbol payload parsing.
//!
//! This module avoids `lsp-types` and parses the subset needed for:
//! - `textDocument/documentSymbol` → flat outline with container names
//! - `workspace/symbol` → cross-file symbol references

use crate::lsp_sync::{LspCoordinateConverter, LspPosition, LspRange, PositionEncoding};
use ide_core::{LineIndex, Position, SymbolKind, SymbolReference};
use serde_json::Value;

fn kind_of(value: &Value) -> Option<SymbolKind> {
    value
        .get("kind")
        .and_then(Value::as_u64)
        .map(|kind| SymbolKind::from_lsp_kind(kind as u32))
}

fn local_position(index: &LineIndex, pos: LspPosition, encoding: PositionEncoding) -> Position {
    let line_text = index.line_text(pos.line as usize).unwrap_or_default();
    LspCoordinateConverter::position_from_lsp(&line_text, pos, encoding)
}

fn push_document_symbol(
    uri: &str,
    index: &LineIndex,
    encoding: PositionEncoding,
    value: &Value,
    container: Option<&str>,
    out: &mut Vec<SymbolReference>,
) {
    let Some(name) = value.get("name").and_then(Value::as_str) else {
        return;
    };

    // DocumentSymbol carries `selectionRange`; SymbolInformation carries `location.range`.
    let range = value
        .get("selectionRange")
        .and_then(LspRange::from_value)
        .or_else(|| value.get("range").and_then(LspRange::from_value))
        .or_else(|| {
            value
                .get("location")
                .and_then(|loc| loc.get("range"))
                .and_then(LspRange::from_value)
        });
    let Some(range) = range else {
        return;
    };

    let container_name = container.map(str::to_string).or_else(|| {
        value
            .get("containerName")
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    out.push(SymbolReference {
        uri: uri.to_string(),
        position: local_position(index, range.start, encoding),
        end: Some(local_position(index, range.end, encoding)),
        name: Some(name.to_string()),
        kind: kind_of(value),
        container_name,
    });

    if let Some(children) = value.get("children").and_then(Value::as_array) {
        for child in children {
            push_document_symbol(uri, index, encoding, child, Some(name), out);
        }
    }
}

/// Flatten a `textDocument/documentSymbol` result in pre-order.
///
/// Accepts both `DocumentSymbol[]` (hierarchical) and `SymbolInformation[]` (flat).
pub fn document_symbols_from_value(
    uri: &str,
    index: &LineIndex,
    encoding: PositionEncoding,
    result: &Value,
) -> Vec<SymbolReference> {
    let mut out = Vec::new();
    if let Some(items) = result.as_array() {
        for item in items {
            push_document_symbol(uri, index, encoding, item, None, &mut out);
        }
    }
    out
}

/// Convert a `workspace/symbol` result.
///
/// `line_text(uri, line)` supplies text for column conversion; see
/// [`crate::lsp_locations::resolve_locations`]. Symbols whose location has no range (allowed
/// for `WorkspaceSymbol`) point at the start of the file.
pub fn workspace_symbols_from_value<F>(
    result: &Value,
    encoding: PositionEncoding,
    mut line_text: F,
) -> Vec<SymbolReference>
where
    F: FnMut(&str, usize) -> Option<String>,
{
    let Some(items) = result.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?;
            let location = item.get("location")?;
            let uri = location.get("uri")?.as_str()?;
            let range = location.get("range").and_then(LspRange::from_value);

            let mut convert = |pos: LspPosition| match line_text(uri, pos.line as usize) {
                Some(text) => LspCoordinateConverter::position_from_lsp(&text, pos, encoding),
                None => Position::new(pos.line as usize, pos.character as usize),
            };
            let (position, end) = match range {
                Some(range) => (convert(range.start), Some(convert(range.end))),
                None => (Position::default(), None),
            };

            Some(SymbolReference {
                uri: uri.to_string(),
                position,
                end,
                name: Some(name.to_string()),
                kind: kind_of(item),
                container_name: item
                    .get("containerName")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn range(sl: u32, sc: u32, el: u32, ec: u32) -> Value {
        json!({ "start": { "line": sl, "character": sc }, "end": { "line": el, "character": ec } })
    }

    #[test]
    fn hierarchical_symbols_flatten_with_containers() {
        let index = LineIndex::from_text("class A:\n    def run(self):\n        pass\n");
        let result = json!([{
            "name": "A",
            "kind": 5,
            "range": range(0, 0, 2, 12),
            "selectionRange": range(0, 6, 0, 7),
            "children": [{
                "name": "run",
                "kind": 6,
                "range": range(1, 4, 2, 12),
                "selectionRange": range(1, 8, 1, 11)
            }]
        }]);

        let symbols =
            document_symbols_from_value("file:///a.py", &index, PositionEncoding::Utf16, &result);
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name.as_deref(), Some("A"));
        assert_eq!(symbols[0].kind, Some(SymbolKind::Class));
        assert_eq!(symbols[0].container_name, None);
        assert_eq!(symbols[1].name.as_deref(), Some("run"));
        assert_eq!(symbols[1].position, Position::new(1, 8));
        assert_eq!(symbols[1].container_name.as_deref(), Some("A"));
    }

    #[test]
    fn symbol_information_is_accepted() {
        let index = LineIndex::from_text("x = 1\n");
        let result = json!([{
            "name": "x",
            "kind": 13,
            "location": { "uri": "file:///a.py", "range": range(0, 0, 0, 1) },
            "containerName": "a"
        }]);
        let symbols =
            document_symbols_from_value("file:///a.py", &index, PositionEncoding::Utf16, &result);
        assert_eq!(symbols[0].kind, Some(SymbolKind::Variable));
        assert_eq!(symbols[0].container_name.as_deref(), Some("a"));
    }

    #[test]
    fn workspace_symbols_allow_missing_range() {
        let result = json!([
            { "name": "main", "kind": 12, "location": { "uri": "file:///m.py", "range": range(3, 4, 3, 8) } },
            { "name": "Cfg", "kind": 23, "location": { "uri": "file:///c.py" }, "containerName": "cfg" }
        ]);
        let symbols = workspace_symbols_from_value(&result, PositionEncoding::Utf32, |_, _| None);
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].position, Position::new(3, 4));
        assert_eq!(symbols[1].position, Position::new(0, 0));
        assert_eq!(symbols[1].end, None);
        assert_eq!(symbols[1].kind, Some(SymbolKind::Struct));
    }
}
