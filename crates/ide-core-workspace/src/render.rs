//! Text views of documents for observations.

use crate::config::{RenderConfig, RenderMode};
use ide_core::{Diagnostic, DiffSummary, LineIndex, TextDelta, TextModel};
use serde::Serialize;

/// A rendered slice of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedView {
    /// First rendered line (0-based).
    pub first_line: usize,
    /// Last rendered line (0-based, inclusive).
    pub last_line: usize,
    /// Lines in the document.
    pub total_lines: usize,
    /// The lines, optionally prefixed with `"{line:<5}|"`.
    pub text: String,
    /// The requested span was cut to the line cap.
    pub truncated: bool,
}

/// Render lines `first..=last`, clamped to the document and capped at `max_lines`.
pub fn render_span(
    model: &TextModel,
    first: usize,
    last: usize,
    max_lines: Option<usize>,
    with_line_numbers: bool,
) -> RenderedView {
    let total_lines = model.index().line_count();
    let first = first.min(total_lines.saturating_sub(1));
    let mut last = last.clamp(first, total_lines.saturating_sub(1));
    let mut truncated = false;
    if let Some(max) = max_lines.filter(|max| *max > 0)
        && last - first + 1 > max
    {
        last = first + max - 1;
        truncated = true;
    }

    RenderedView {
        first_line: first,
        last_line: last,
        total_lines,
        text: model.render_lines(first, last, with_line_numbers),
        truncated,
    }
}

/// The whole document, subject to the line cap.
pub fn render_full(model: &TextModel, config: &RenderConfig, with_line_numbers: bool) -> RenderedView {
    render_span(model, 0, usize::MAX, config.max_lines, with_line_numbers)
}

/// The view returned after a change: the whole document or a window around the changed lines.
pub fn render_change(model: &TextModel, summary: &DiffSummary, config: &RenderConfig) -> RenderedView {
    match config.mode {
        RenderMode::Full => render_full(model, config, true),
        RenderMode::Window => render_span(
            model,
            summary.first_line.saturating_sub(config.context_lines),
            summary.last_line.saturating_add(config.context_lines),
            config.max_lines,
            true,
        ),
    }
}

/// Describe a delta the way an edit batch is summarized, in the coordinates of `after`.
///
/// Delta edits are in descending order with starts in pre-change coordinates.
pub fn summarize_delta(delta: &TextDelta, after: &LineIndex) -> DiffSummary {
    let mut summary = DiffSummary {
        edits_applied: delta.edits.len(),
        ..DiffSummary::default()
    };
    let mut shift: isize = 0;
    let mut span: Option<(usize, usize)> = None;
    for edit in delta.edits.iter().rev() {
        let start = edit.start.saturating_add_signed(shift);
        let end = start + edit.inserted_len();
        let first = after.position_at(start).line;
        let last = after.position_at(end).line;
        span = Some(match span {
            Some((lo, hi)) => (lo.min(first), hi.max(last)),
            None => (first, last),
        });
        summary.chars_inserted += edit.inserted_len();
        summary.chars_deleted += edit.deleted_len();
        shift += edit.inserted_len() as isize - edit.deleted_len() as isize;
    }
    if let Some((first, last)) = span {
        summary.first_line = first;
        summary.last_line = last;
    }
    summary
}

/// One diagnostic per line, `"line:col severity: message"`.
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|diag| {
            let severity = diag
                .severity
                .map(|s| format!("{s:?}").to_lowercase())
                .unwrap_or_else(|| "note".to_string());
            let source = diag
                .source
                .as_deref()
                .map(|s| format!(" [{s}]"))
                .unwrap_or_default();
            format!(
                "{}:{} {severity}{source}: {}",
                diag.start.line, diag.start.column, diag.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ide_core::{DiagnosticSeverity, Edit, Position, PositionPolicy};
    use pretty_assertions::assert_eq;

    fn model(lines: usize) -> TextModel {
        let text: String = (0..lines).map(|i| format!("line {i}\n")).collect();
        TextModel::new(&text)
    }

    #[test]
    fn window_is_clamped_to_the_document() {
        let model = model(10);
        let summary = DiffSummary {
            edits_applied: 1,
            chars_inserted: 1,
            chars_deleted: 0,
            first_line: 1,
            last_line: 1,
        };
        let view = render_change(&model, &summary, &RenderConfig::default());
        assert_eq!(view.first_line, 0);
        assert_eq!(view.last_line, 4);
        assert_eq!(view.total_lines, 11);
        assert!(view.text.starts_with("0    |line 0\n1    |line 1"));
        assert!(!view.truncated);
    }

    #[test]
    fn long_views_are_truncated() {
        let model = model(50);
        let config = RenderConfig {
            mode: RenderMode::Full,
            context_lines: 3,
            max_lines: Some(5),
        };
        let view = render_full(&model, &config, false);
        assert_eq!(view.last_line, 4);
        assert!(view.truncated);
        assert_eq!(view.text.lines().count(), 5);
    }

    #[test]
    fn delta_lines_are_reported_after_the_change() {
        let mut model = model(6);
        model
            .apply_edits(
                &[
                    Edit::insert(Position::new(1, 0), "a\nb\n"),
                    Edit::insert(Position::new(4, 0), "c\n"),
                ],
                PositionPolicy::Strict,
            )
            .unwrap();
        let delta = model.take_last_delta().unwrap();
        let summary = summarize_delta(&delta, model.index());
        assert_eq!(summary.edits_applied, 2);
        assert_eq!(summary.chars_inserted, 6);
        assert_eq!(summary.first_line, 1);
        assert_eq!(summary.last_line, 7);
    }

    #[test]
    fn diagnostics_render_one_per_line() {
        let diags = vec![Diagnostic {
            start: Position::new(3, 4),
            end: Position::new(3, 5),
            severity: Some(DiagnosticSeverity::Error),
            code: None,
            source: Some("pyright".into()),
            message: "undefined name".into(),
        }];
        assert_eq!(format_diagnostics(&diags), "3:4 error [pyright]: undefined name");
    }
}
