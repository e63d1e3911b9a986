#![warn(missing_docs)]
//! `ide-core-lsp` - language-server integration for `ide-core` documents.
//!
//! This crate keeps external language servers in sync with locally edited documents and answers
//! navigation queries through them:
//!
//! - JSON-RPC framing over stdio ([`lsp_transport`]) and an id-routed client ([`lsp_client`])
//! - coordinate conversion between code-point columns and the negotiated position encoding
//!   ([`lsp_sync`])
//! - result normalization for definitions, references, symbols and diagnostics
//! - [`LanguageServerSession`]: lazy start, incremental `didChange`, resync and restart

pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake_server;
pub mod lsp_client;
pub mod lsp_diagnostics;
pub mod lsp_locations;
pub mod lsp_symbols;
pub mod lsp_sync;
pub mod lsp_transport;
pub mod lsp_uri;
pub mod session;

pub use error::{CONTENT_MODIFIED, LspError};
pub use lsp_client::{LspClient, LspConnection, LspInbound, LspServerEnd, NotificationHandler};
pub use lsp_diagnostics::{DiagnosticsStore, LspDiagnostic, PublishedDiagnostics};
pub use lsp_locations::{LspLocation, locations_from_value, resolve_locations};
pub use lsp_symbols::{document_symbols_from_value, workspace_symbols_from_value};
pub use lsp_sync::{
    LspCoordinateConverter, LspPosition, LspRange, PositionEncoding, SyncKind, TextChange,
    content_changes_for_delta, did_change_params,
};
pub use lsp_uri::{file_uri_to_path, path_to_file_uri};
pub use session::{
    LanguageServerSession, LspConnector, NavigationTargets, ProcessConnector, SessionOptions,
};
