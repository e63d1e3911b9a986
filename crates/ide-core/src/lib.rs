#![warn(missing_docs)]
//! IDE Core - position-addressed documents for agent-driven workspaces
//!
//! # Overview
//!
//! `ide-core` is the I/O-free layer of the workspace engine. It owns the text of open documents
//! and everything needed to address it safely by `(line, column)`:
//!
//! - **Position Index**: zero-based `(line, column)` ⇄ character offset, columns in code points
//! - **Text Model**: atomic edit batches, exact inverse edits, undo/redo with version lineage
//! - **Change Deltas**: structured per-mutation edits for language-server synchronization
//! - **Search**: literal/regex find over document text
//! - **Diagnostics / Symbols**: serializable result types shared with the LSP layer
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Document (uri, line ending, language id)   │
//! ├─────────────────────────────────────────────┤
//! │  TextModel (version, history, deltas)       │
//! ├─────────────────────────────────────────────┤
//! │  LineIndex (Rope-based position index)      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use ide_core::{Edit, Position, PositionPolicy, TextModel};
//!
//! let mut model = TextModel::new("");
//! let result = model
//!     .apply_edits(&[Edit::insert(Position::new(0, 0), "x = 1\n")], PositionPolicy::Strict)
//!     .unwrap();
//! assert_eq!(result.version, 1);
//! assert_eq!(model.text(), "x = 1\n");
//!
//! assert!(model.undo());
//! assert_eq!(model.version(), 0);
//! assert_eq!(model.text(), "");
//! ```
//!
//! # Module Description
//!
//! - [`line_index`] - Rope based position index
//! - [`text_model`] - edit batches and undo/redo history
//! - [`document`] - open document identity and persistence form
//! - [`delta`] - structured change deltas
//! - [`line_ending`] - newline conventions
//! - [`search`] - text search
//! - [`diagnostics`] - diagnostics data model
//! - [`symbols`] - symbol references
//! - [`error`] - error types

pub mod delta;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod line_ending;
pub mod line_index;
pub mod search;
pub mod symbols;
pub mod text_model;

pub use delta::{TextDelta, TextDeltaEdit};
pub use diagnostics::{Diagnostic, DiagnosticSeverity};
pub use document::Document;
pub use error::{OutOfRangeError, TextModelError};
pub use line_ending::LineEnding;
pub use line_index::{LineIndex, Position, PositionPolicy};
pub use search::{SearchError, SearchMatch, SearchOptions, find_all};
pub use symbols::{SymbolKind, SymbolReference};
pub use text_model::{DiffSummary, Edit, EditResult, TextModel, TextRange};
