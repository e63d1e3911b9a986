//! An open document: a [`TextModel`] plus the identity needed to persist and synchronize it.

use crate::line_ending::LineEnding;
use crate::text_model::TextModel;

/// One open file.
#[derive(Debug)]
pub struct Document {
    uri: String,
    language_id: Option<String>,
    line_ending: LineEnding,
    /// Raw and normalized load content of a mixed-newline file.
    mixed_source: Option<(String, String)>,
    model: TextModel,
}

impl Document {
    /// Build a document at version 0 from raw file content. CRLF content is normalized.
    pub fn from_raw(uri: impl Into<String>, language_id: Option<String>, raw: &str) -> Self {
        let (text, line_ending) = LineEnding::normalize(raw);
        let mixed_source = LineEnding::is_mixed(raw).then(|| (raw.to_string(), text.clone()));
        Self {
            uri: uri.into(),
            language_id,
            line_ending,
            mixed_source,
            model: TextModel::new(&text),
        }
    }

    /// Document URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Language id used for language-server routing, if the file type is known.
    pub fn language_id(&self) -> Option<&str> {
        self.language_id.as_deref()
    }

    /// Newline convention the document is saved with.
    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// The text model.
    pub fn model(&self) -> &TextModel {
        &self.model
    }

    /// Mutable access to the text model.
    pub fn model_mut(&mut self) -> &mut TextModel {
        &mut self.model
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.model.version()
    }

    /// `true` if there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.model.is_dirty()
    }

    /// Content as it should be written to disk.
    ///
    /// A mixed-newline file whose content still equals what was loaded is returned unchanged;
    /// otherwise every newline takes the dominant convention.
    pub fn persisted_text(&self) -> String {
        let text = self.model.text();
        match &self.mixed_source {
            Some((raw, loaded)) if *loaded == text => raw.clone(),
            _ => self.line_ending.apply_to_text(&text),
        }
    }
}
