#![warn(missing_docs)]
//! `ide-core-workspace` - the workspace and the action protocol on top of it.
//!
//! # Overview
//!
//! A [`Workspace`] owns the open documents under one root and the language-server sessions that
//! mirror them. An [`ActionDispatcher`] accepts `{category, action_name, action_args}` requests,
//! resolves them through the [`ActionTable`], runs them against the workspace or a
//! [`Terminal`](ide_core_terminal::Terminal), and answers with an [`Envelope`].
//!
//! ```text
//! request ─► ActionTable ─► ActionDispatcher ─┬─► Workspace ─┬─► TextModel (per document)
//!                                             │              └─► LanguageServerSession
//!                                             └─► Terminal
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ide_core_workspace::{ActionDispatcher, Workspace, WorkspaceConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let workspace = Arc::new(Workspace::new(WorkspaceConfig::for_root(".")).unwrap());
//! let terminal = Arc::new(workspace.local_terminal());
//! let dispatcher = ActionDispatcher::new(workspace, terminal).unwrap();
//!
//! let reply = dispatcher.dispatch_value(json!({
//!     "category": "workspace",
//!     "action_name": "open_file",
//!     "action_args": { "uri": "src/main.py" }
//! }));
//! println!("{}", serde_json::to_string(&reply).unwrap());
//! ```

pub mod action;
pub mod config;
pub mod dispatcher;
mod error;
pub mod fs;
pub mod paths;
pub mod render;
pub mod workspace;

pub use action::{
    ACTIONS, Action, ActionCategory, ActionRequest, ActionSpec, ActionTable, ActionTableError,
};
pub use config::{
    ConfigError, LanguageServerConfig, LspConfig, RenderConfig, RenderMode, TerminalConfig,
    WorkspaceConfig,
};
pub use dispatcher::{ActionDispatcher, Envelope, ErrorInfo, Info, Status};
pub use error::WorkspaceError;
pub use fs::{DirectoryListing, FileEntry, FileSearch, ListedEntry};
pub use paths::{ResolvedPath, WorkspaceRoot};
pub use render::RenderedView;
pub use workspace::{
    CloseOutcome, DeleteOutcome, DocumentHandle, DocumentInfo, EditOutcome, FindOutcome,
    FoundMatch, HistoryOutcome, OpenOutcome, PathMatch, PathSearchOutcome, ReadOutcome,
    RenameOutcome, ReplaceOutcome, SaveOutcome, SymbolOutcome, Workspace,
};
