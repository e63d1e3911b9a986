//! Errors raised by the language-server layer.

use std::time::Duration;
use thiserror::Error;

/// JSON-RPC error code a server returns when a request raced with a document change.
pub const CONTENT_MODIFIED: i64 = -32801;

/// Language-server failures.
#[derive(Debug, Error)]
pub enum LspError {
    /// The server could not be started.
    #[error("failed to start language server `{command}`: {source}")]
    Spawn {
        /// Program that failed to start.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A request did not complete within its bound.
    #[error("language server did not answer `{method}` within {timeout:?}")]
    Timeout {
        /// Request method.
        method: String,
        /// The bound that expired.
        timeout: Duration,
    },
    /// The server answered with a JSON-RPC error.
    #[error("language server rejected `{method}` ({code}): {message}")]
    Response {
        /// Request method.
        method: String,
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// The connection is gone (process exited or pipes closed).
    #[error("language server connection closed: {0}")]
    Closed(String),
    /// The server's view of a document could not be brought back in line with local state.
    #[error("language server lost sync with {uri}: {reason}")]
    Desync {
        /// Affected document.
        uri: String,
        /// Why resynchronization failed.
        reason: String,
    },
    /// Framing or encoding failure on the wire.
    #[error("language server transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl LspError {
    /// `true` for a bounded wait that expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// `true` when the server reported the document changed under the request.
    pub fn is_content_modified(&self) -> bool {
        matches!(self, Self::Response { code, .. } if *code == CONTENT_MODIFIED)
    }
}
