//! Newline conventions.
//!
//! Documents are stored with LF (`'\n'`) newlines. A file that uses CRLF (`"\r\n"`) is normalized
//! on load and its convention is restored when it is saved.
//!
//! A file mixing both is normalized the same way and saved with its dominant convention (CRLF on a
//! tie). [`crate::Document`] writes such a file back byte for byte while its content is unchanged.

use serde::{Deserialize, Serialize};

/// The newline sequence a document is persisted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// Unix-style LF (`'\n'`).
    #[default]
    Lf,
    /// Windows-style CRLF (`"\r\n"`).
    Crlf,
}

impl LineEnding {
    /// Detect the dominant convention of a source text; CRLF wins ties.
    pub fn detect_in_text(text: &str) -> Self {
        let crlf = text.matches("\r\n").count();
        let lf = text.matches('\n').count() - crlf;
        if crlf > 0 && crlf >= lf {
            Self::Crlf
        } else {
            Self::Lf
        }
    }

    /// `true` if `raw` contains both conventions, so saving cannot reproduce it exactly.
    pub fn is_mixed(raw: &str) -> bool {
        let crlf = raw.matches("\r\n").count();
        crlf > 0 && raw.matches('\n').count() > crlf
    }

    /// Split raw file content into LF-normalized text and its detected convention.
    pub fn normalize(raw: &str) -> (String, Self) {
        let ending = Self::detect_in_text(raw);
        if raw.contains("\r\n") {
            (raw.replace("\r\n", "\n"), ending)
        } else {
            (raw.to_string(), ending)
        }
    }

    /// Convert LF-normalized text to this convention for saving.
    pub fn apply_to_text(self, text: &str) -> String {
        match self {
            Self::Lf => text.to_string(),
            Self::Crlf => text.replace('\n', "\r\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_round_trips_through_normalize() {
        let (text, ending) = LineEnding::normalize("a\r\nb\r\n");
        assert_eq!(text, "a\nb\n");
        assert_eq!(ending, LineEnding::Crlf);
        assert_eq!(ending.apply_to_text(&text), "a\r\nb\r\n");
    }

    #[test]
    fn mixed_endings_follow_the_majority() {
        let (text, ending) = LineEnding::normalize("a\r\nb\nc\n");
        assert_eq!(text, "a\nb\nc\n");
        assert_eq!(ending, LineEnding::Lf);
        assert!(LineEnding::is_mixed("a\r\nb\nc\n"));

        assert_eq!(LineEnding::detect_in_text("a\r\nb\n"), LineEnding::Crlf);
        assert!(!LineEnding::is_mixed("a\r\nb\r\n"));
    }

    #[test]
    fn lone_carriage_return_stays_lf() {
        let (text, ending) = LineEnding::normalize("a\rb\n");
        assert_eq!(text, "a\rb\n");
        assert_eq!(ending, LineEnding::Lf);
    }
}
