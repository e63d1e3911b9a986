//! `textDocument/publishDiagnostics` handling.
//!
//! Diagnostics arrive asynchronously, in server coordinates. They are stored as published and
//! converted to local positions against the document content at the time they are read.

use crate::lsp_sync::{LspCoordinateConverter, LspRange, PositionEncoding};
use ide_core::{Diagnostic, DiagnosticSeverity, LineIndex};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// One published diagnostic, still in server coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LspDiagnostic {
    /// Flagged range.
    pub range: LspRange,
    /// Optional severity.
    pub severity: Option<DiagnosticSeverity>,
    /// Optional code (number or string), stringified.
    pub code: Option<String>,
    /// Optional source.
    pub source: Option<String>,
    /// Message.
    pub message: String,
}

/// Parameters of one `textDocument/publishDiagnostics` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedDiagnostics {
    /// Document URI.
    pub uri: String,
    /// Server-side document version the diagnostics refer to, if reported.
    pub version: Option<i64>,
    /// Diagnostics for the document (replaces any earlier set).
    pub diagnostics: Vec<LspDiagnostic>,
}

fn diagnostic_from_value(value: &Value) -> Option<LspDiagnostic> {
    Some(LspDiagnostic {
        range: LspRange::from_value(value.get("range")?)?,
        severity: value
            .get("severity")
            .and_then(Value::as_u64)
            .and_then(DiagnosticSeverity::from_lsp),
        code: value.get("code").and_then(|code| match code {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        source: value
            .get("source")
            .and_then(Value::as_str)
            .map(str::to_string),
        message: value.get("message")?.as_str()?.to_string(),
    })
}

impl PublishedDiagnostics {
    /// Parse notification params. Returns `None` if the URI is missing.
    pub fn from_params(params: &Value) -> Option<Self> {
        let uri = params.get("uri")?.as_str()?.to_string();
        let diagnostics = params
            .get("diagnostics")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(diagnostic_from_value).collect())
            .unwrap_or_default();
        Some(Self {
            uri,
            version: params.get("version").and_then(Value::as_i64),
            diagnostics,
        })
    }
}

/// Latest published diagnostics per URI.
#[derive(Debug, Default)]
pub struct DiagnosticsStore {
    by_uri: Mutex<HashMap<String, PublishedDiagnostics>>,
}

impl DiagnosticsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a publication, replacing the previous set for that URI.
    pub fn publish(&self, published: PublishedDiagnostics) {
        self.by_uri.lock().insert(published.uri.clone(), published);
    }

    /// Forget a document's diagnostics.
    pub fn clear(&self, uri: &str) {
        self.by_uri.lock().remove(uri);
    }

    /// Current diagnostics for `uri` in local coordinates.
    pub fn resolve(
        &self,
        uri: &str,
        index: &LineIndex,
        encoding: PositionEncoding,
    ) -> Vec<Diagnostic> {
        let guard = self.by_uri.lock();
        let Some(published) = guard.get(uri) else {
            return Vec::new();
        };

        published
            .diagnostics
            .iter()
            .map(|diag| {
                let start_line = index
                    .line_text(diag.range.start.line as usize)
                    .unwrap_or_default();
                let end_line = index
                    .line_text(diag.range.end.line as usize)
                    .unwrap_or_default();
                Diagnostic {
                    start: LspCoordinateConverter::position_from_lsp(
                        &start_line,
                        diag.range.start,
                        encoding,
                    ),
                    end: LspCoordinateConverter::position_from_lsp(
                        &end_line,
                        diag.range.end,
                        encoding,
                    ),
                    severity: diag.severity,
                    code: diag.code.clone(),
                    source: diag.source.clone(),
                    message: diag.message.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ide_core::Position;
    use serde_json::json;

    #[test]
    fn publish_replaces_previous_set() {
        let store = DiagnosticsStore::new();
        let params = json!({
            "uri": "file:///a.py",
            "version": 3,
            "diagnostics": [{
                "range": { "start": { "line": 0, "character": 2 }, "end": { "line": 0, "character": 4 } },
                "severity": 1,
                "code": 401,
                "source": "pyright",
                "message": "undefined name"
            }]
        });
        store.publish(PublishedDiagnostics::from_params(&params).unwrap());

        let index = LineIndex::from_text("🌍xy\n");
        let diags = store.resolve("file:///a.py", &index, PositionEncoding::Utf16);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].start, Position::new(0, 1));
        assert_eq!(diags[0].end, Position::new(0, 3));
        assert_eq!(diags[0].code.as_deref(), Some("401"));
        assert_eq!(diags[0].severity, Some(DiagnosticSeverity::Error));

        store.publish(
            PublishedDiagnostics::from_params(&json!({"uri": "file:///a.py", "diagnostics": []}))
                .unwrap(),
        );
        assert!(store
            .resolve("file:///a.py", &index, PositionEncoding::Utf16)
            .is_empty());
    }
}
