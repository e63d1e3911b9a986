//! Text search over a document.
//!
//! Queries run over a UTF-8 `&str`; all results are **character offsets**. Literal queries are
//! escaped and compiled into a regex so both modes share one matcher.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use thiserror::Error;

/// Options that control how a search is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Case-sensitive matching.
    pub case_sensitive: bool,
    /// Only match whole words (alphanumeric and `_`).
    pub whole_word: bool,
    /// Treat the query as a regex pattern.
    pub regex: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            whole_word: false,
            regex: false,
        }
    }
}

/// A half-open character range `[start, end)` matched by a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    /// Inclusive start character offset.
    pub start: usize,
    /// Exclusive end character offset.
    pub end: usize,
}

impl SearchMatch {
    /// Length of the match in characters.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` if the match is empty.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Search errors.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The pattern failed to compile.
    #[error("invalid search pattern: {0}")]
    InvalidRegex(#[from] regex::Error),
}

struct CharIndex {
    char_to_byte: Vec<usize>,
    text_len: usize,
}

impl CharIndex {
    fn new(text: &str) -> Self {
        let mut char_to_byte: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        char_to_byte.push(text.len());
        Self {
            char_to_byte,
            text_len: text.len(),
        }
    }

    fn char_count(&self) -> usize {
        self.char_to_byte.len().saturating_sub(1)
    }

    fn byte_to_char(&self, byte_offset: usize) -> usize {
        let clamped = byte_offset.min(self.text_len);
        match self.char_to_byte.binary_search(&clamped) {
            Ok(idx) | Err(idx) => idx,
        }
    }

    fn char_at(&self, text: &str, char_offset: usize) -> Option<char> {
        if char_offset >= self.char_count() {
            return None;
        }
        let start = self.char_to_byte[char_offset];
        let end = self.char_to_byte[char_offset + 1];
        text.get(start..end)?.chars().next()
    }
}

fn compile(query: &str, options: SearchOptions) -> Result<Regex, SearchError> {
    let pattern = if options.regex {
        query.to_string()
    } else {
        regex::escape(query)
    };

    Ok(RegexBuilder::new(&pattern)
        .case_insensitive(!options.case_sensitive)
        .multi_line(true)
        .build()?)
}

fn is_word_char(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

fn is_whole_word(text: &str, index: &CharIndex, m: SearchMatch) -> bool {
    let before = m
        .start
        .checked_sub(1)
        .and_then(|offset| index.char_at(text, offset));
    let after = index.char_at(text, m.end);

    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

/// Find every non-empty, non-overlapping occurrence of `query` in `text`.
///
/// Returns an empty list for an empty query.
pub fn find_all(
    text: &str,
    query: &str,
    options: SearchOptions,
) -> Result<Vec<SearchMatch>, SearchError> {
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let re = compile(query, options)?;
    let index = CharIndex::new(text);

    let mut matches = Vec::new();
    for m in re.find_iter(text) {
        let candidate = SearchMatch {
            start: index.byte_to_char(m.start()),
            end: index.byte_to_char(m.end()),
        };
        if candidate.is_empty() {
            continue;
        }
        if options.whole_word && !is_whole_word(text, &index, candidate) {
            continue;
        }
        matches.push(candidate);
    }

    Ok(matches)
}
