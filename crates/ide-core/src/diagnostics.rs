//! Diagnostics data model.
//!
//! Diagnostics are advisory: they are attached to edit and open results so the caller can see
//! what the language server reported, but they never block saving.

use crate::line_index::Position;
use serde::Serialize;

/// Diagnostic severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// Error diagnostics.
    Error,
    /// Warning diagnostics.
    Warning,
    /// Informational diagnostics.
    Information,
    /// Hint diagnostics.
    Hint,
}

impl DiagnosticSeverity {
    /// Convert the numeric LSP `DiagnosticSeverity`.
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }
}

/// A single diagnostic for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Start of the flagged span.
    pub start: Position,
    /// End of the flagged span.
    pub end: Position,
    /// Optional severity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<DiagnosticSeverity>,
    /// Optional diagnostic code (stringified).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Optional source (e.g. `"pyright"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Diagnostic message.
    pub message: String,
}

impl Diagnostic {
    /// Returns `true` if the diagnostic span intersects lines `first..=last`.
    pub fn touches_lines(&self, first: usize, last: usize) -> bool {
        self.start.line <= last && self.end.line >= first
    }
}
