use crate::config::ConfigError;
use ide_core::{OutOfRangeError, SearchError, TextModelError};
use ide_core_lsp::LspError;
use ide_core_terminal::TerminalError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Workspace failures.
///
/// Every variant maps onto a stable code through [`WorkspaceError::kind`]; response envelopes carry
/// that code next to the message.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Malformed request; nothing was changed.
    #[error("{0}")]
    Validation(String),

    /// A path resolves outside the workspace root.
    #[error("`{path}` is outside the workspace root")]
    OutsideRoot {
        /// Requested path or URI.
        path: String,
    },

    /// The document is not open.
    #[error("`{uri}` is not open")]
    NotOpen {
        /// Document URI.
        uri: String,
    },

    /// A query position does not exist in the document.
    #[error(transparent)]
    OutOfRange(#[from] OutOfRangeError),

    /// An edit batch was rejected; the document is unchanged.
    #[error("edit rejected for `{uri}`: {source}")]
    Edit {
        /// Document URI.
        uri: String,
        /// Why the batch was rejected.
        #[source]
        source: TextModelError,
    },

    /// The open-document cap is reached and every open document has unsaved changes.
    #[error(
        "too many open documents (limit {limit}); save or close a modified document first"
    )]
    TooManyOpenDocuments {
        /// Configured cap.
        limit: usize,
    },

    /// `create_file` without `overwrite` on an existing path.
    #[error("`{}` already exists", path.display())]
    AlreadyExists {
        /// Existing path.
        path: PathBuf,
    },

    /// Invalid search pattern.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// No language server handles this document.
    #[error("no language server configured for `{uri}`")]
    NoLanguageServer {
        /// Document URI.
        uri: String,
    },

    /// Language-server failure other than a timeout.
    #[error("language server error: {0}")]
    LanguageServer(#[from] LspError),

    /// Terminal failure.
    #[error(transparent)]
    Terminal(#[from] TerminalError),

    /// Filesystem failure.
    #[error("{}: {source}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable snake_case error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_)
            | Self::OutsideRoot { .. }
            | Self::AlreadyExists { .. }
            | Self::Search(_)
            | Self::Config(_) => "validation_error",
            Self::NotOpen { .. } => "not_open",
            Self::OutOfRange(_) => "out_of_range",
            Self::Edit { source, .. } => match source {
                TextModelError::EmptyBatch => "validation_error",
                TextModelError::OutOfRange { .. } => "out_of_range",
                TextModelError::ReversedRange { .. } | TextModelError::OverlappingEdits { .. } => {
                    "invalid_range"
                }
            },
            Self::TooManyOpenDocuments { .. } => "too_many_open_documents",
            Self::NoLanguageServer { .. } => "language_server_error",
            Self::LanguageServer(err) => match err {
                LspError::Timeout { .. } => "language_server_timeout",
                LspError::Desync { .. } => "language_server_desync",
                _ => "language_server_error",
            },
            Self::Terminal(err) => match err {
                TerminalError::CommandNotAllowed { .. } => "command_not_allowed",
                TerminalError::EmptyCommand | TerminalError::UnknownHandle(_) => "validation_error",
                TerminalError::Spawn { .. } | TerminalError::Io(_) => "io_error",
            },
            Self::Io { .. } => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ide_core::Position;
    use std::time::Duration;

    #[test]
    fn kinds_follow_the_taxonomy() {
        let overlap = WorkspaceError::Edit {
            uri: "file:///a.py".into(),
            source: TextModelError::OverlappingEdits { first: 0, second: 1 },
        };
        assert_eq!(overlap.kind(), "invalid_range");

        let reversed = WorkspaceError::Edit {
            uri: "file:///a.py".into(),
            source: TextModelError::ReversedRange {
                index: 0,
                start: Position::new(1, 0),
                end: Position::new(0, 0),
            },
        };
        assert_eq!(reversed.kind(), "invalid_range");

        let timeout = WorkspaceError::from(LspError::Timeout {
            method: "textDocument/definition".into(),
            timeout: Duration::from_secs(1),
        });
        assert_eq!(timeout.kind(), "language_server_timeout");

        let denied = WorkspaceError::from(TerminalError::CommandNotAllowed {
            program: "rm".into(),
            reason: "in the deny list".into(),
        });
        assert_eq!(denied.kind(), "command_not_allowed");
        assert_eq!(
            WorkspaceError::TooManyOpenDocuments { limit: 1 }.kind(),
            "too_many_open_documents"
        );
    }
}
