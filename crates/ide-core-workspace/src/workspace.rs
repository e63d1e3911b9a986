//! The workspace: open documents, their language servers and the files under the root.
//!
//! A [`Workspace`] is the single registry of open documents for one root. Each document lives in
//! its own slot behind a read/write lock, so mutations of one URI are serialized (and forwarded to
//! the language server in the order they were applied) while operations on different URIs run in
//! parallel. Read-only queries take the read side and therefore wait behind an in-flight edit.
//!
//! The number of open documents is capped; opening beyond the cap evicts the least recently used
//! clean document, and fails with [`WorkspaceError::TooManyOpenDocuments`] when every candidate
//! has unsaved changes.

use crate::config::WorkspaceConfig;
use crate::error::WorkspaceError;
use crate::fs::{
    DirectoryListing, FileSearch, MAX_SEARCH_RESULTS, list_directory, search_files, walk_files,
};
use crate::paths::{ResolvedPath, WorkspaceRoot};
use crate::render::{RenderedView, render_change, render_full, render_span, summarize_delta};
use ide_core::{
    Diagnostic, DiffSummary, Document, Edit, LineEnding, LineIndex, OutOfRangeError, Position,
    PositionPolicy, SearchOptions, SymbolKind, SymbolReference, TextRange, find_all,
};
use ide_core_lsp::{
    LanguageServerSession, LspConnector, LspError, NavigationTargets, ProcessConnector,
    SessionOptions, file_uri_to_path,
};
use ide_core_terminal::LocalTerminal;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

struct LanguageEntry {
    language_id: String,
    extensions: Vec<String>,
    connector: Arc<dyn LspConnector>,
}

struct DocumentSlot {
    uri: String,
    path: PathBuf,
    session: Option<Arc<LanguageServerSession>>,
    document: RwLock<Document>,
    last_used: AtomicU64,
    closed: AtomicBool,
}

/// A reference to an open document.
///
/// Handles stay valid after the document is closed, but then report the state it was closed in.
#[derive(Clone)]
pub struct DocumentHandle {
    slot: Arc<DocumentSlot>,
}

impl DocumentHandle {
    /// Document URI.
    pub fn uri(&self) -> &str {
        &self.slot.uri
    }

    /// Language id, if a language server handles the file type.
    pub fn language_id(&self) -> Option<String> {
        self.slot.document.read().language_id().map(str::to_string)
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.slot.document.read().version()
    }

    /// Unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.slot.document.read().is_dirty()
    }

    /// Current text.
    pub fn text(&self) -> String {
        self.slot.document.read().model().text()
    }

    /// Whether the document is still registered in its workspace.
    pub fn is_open(&self) -> bool {
        !self.slot.closed.load(Ordering::Acquire)
    }

    /// `true` if both handles refer to the same open document.
    pub fn same_document(&self, other: &DocumentHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl std::fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("uri", &self.slot.uri)
            .field("open", &self.is_open())
            .finish()
    }
}

/// State of an open document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    /// Document URI.
    pub uri: String,
    /// Path relative to the root.
    pub path: String,
    /// Current version.
    pub version: u64,
    /// Unsaved changes.
    pub dirty: bool,
    /// Language id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_id: Option<String>,
}

/// Result of [`Workspace::open_file`] and [`Workspace::create_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenOutcome {
    /// The document.
    pub document: DocumentInfo,
    /// It was already open; nothing was re-read.
    pub already_open: bool,
    /// Its content.
    pub view: RenderedView,
}

/// Result of [`Workspace::close_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseOutcome {
    /// Document URI.
    pub uri: String,
    /// Unsaved changes were dropped.
    pub discarded_changes: bool,
}

/// Result of an applied edit batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    /// Document URI.
    pub uri: String,
    /// Version before the batch.
    pub previous_version: u64,
    /// Version after the batch.
    pub version: u64,
    /// Size of the change.
    pub summary: DiffSummary,
    /// Edits that revert the batch when applied to the new content.
    pub inverse_edits: Vec<Edit>,
    /// The changed region (or the whole document, per configuration).
    pub view: RenderedView,
    /// Diagnostics the language server has published for the document.
    pub diagnostics: Vec<Diagnostic>,
    /// The change was applied but the language server could not be updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

/// Result of [`Workspace::undo`] and [`Workspace::redo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryOutcome {
    /// Document URI.
    pub uri: String,
    /// Something was undone (or redone).
    pub applied: bool,
    /// Version after the step.
    pub version: u64,
    /// Unsaved changes after the step.
    pub dirty: bool,
    /// The changed region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<RenderedView>,
    /// Diagnostics the language server has published for the document.
    pub diagnostics: Vec<Diagnostic>,
    /// The step was applied but the language server could not be updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

/// Result of [`Workspace::save_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    /// Document URI.
    pub uri: String,
    /// Path relative to the root.
    pub path: String,
    /// Saved version.
    pub version: u64,
    /// Bytes written.
    pub bytes: usize,
    /// Diagnostics at save time; saving never waits on them.
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of [`Workspace::read_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadOutcome {
    /// The document.
    pub document: DocumentInfo,
    /// Requested lines.
    pub view: RenderedView,
}

/// One match of [`Workspace::find_in_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoundMatch {
    /// Start of the match.
    pub start: Position,
    /// End of the match (exclusive).
    pub end: Position,
    /// Text of the line the match starts on.
    pub line_text: String,
}

/// Result of [`Workspace::find_in_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FindOutcome {
    /// Document URI.
    pub uri: String,
    /// Version the matches refer to.
    pub version: u64,
    /// Matches in document order.
    pub matches: Vec<FoundMatch>,
}

/// One match of [`Workspace::find_in_path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathMatch {
    /// Path relative to the root.
    pub path: String,
    /// `file://` URI.
    pub uri: String,
    /// Start of the match.
    pub start: Position,
    /// End of the match (exclusive).
    pub end: Position,
    /// Text of the line the match starts on.
    pub line_text: String,
}

/// Result of [`Workspace::find_in_path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathSearchOutcome {
    /// Matches, file by file in name order.
    pub matches: Vec<PathMatch>,
    /// Files whose text was searched.
    pub files_searched: usize,
    /// The result limit cut the search short.
    pub truncated: bool,
}

/// Result of [`Workspace::rename_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameOutcome {
    /// Old URI.
    pub from: String,
    /// New URI.
    pub to: String,
    /// New path relative to the root.
    pub path: String,
    /// The document was open and has been reopened under its new URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reopened: Option<DocumentInfo>,
}

/// Result of [`Workspace::delete_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// Deleted URI.
    pub uri: String,
    /// Deleted path relative to the root.
    pub path: String,
    /// Open documents that were closed because they lived at or below the path.
    pub closed: Vec<CloseOutcome>,
}

/// Result of [`Workspace::replace_in_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceOutcome {
    /// Document URI.
    pub uri: String,
    /// Number of replaced matches.
    pub replacements: usize,
    /// The applied batch; `None` when nothing matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit: Option<EditOutcome>,
}

/// Result of a navigation or symbol query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolOutcome {
    /// Locations or symbols found.
    pub references: Vec<SymbolReference>,
    /// The language server did not answer in time; `references` is empty or partial.
    pub timed_out: bool,
    /// Why an answer is empty even though the request succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl SymbolOutcome {
    fn found(references: Vec<SymbolReference>) -> Self {
        Self {
            references,
            timed_out: false,
            warning: None,
        }
    }

    fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::found(Vec::new())
        }
    }
}

/// Registry of open documents for one root.
pub struct Workspace {
    config: WorkspaceConfig,
    root: WorkspaceRoot,
    documents: RwLock<HashMap<String, Arc<DocumentSlot>>>,
    // Serializes open, close and eviction so the cap holds.
    open_lock: Mutex<()>,
    languages: Vec<LanguageEntry>,
    sessions: Mutex<HashMap<String, Arc<LanguageServerSession>>>,
    clock: AtomicU64,
}

impl Workspace {
    /// Create a workspace for `config.root`, with the configured language servers.
    pub fn new(config: WorkspaceConfig) -> Result<Self, WorkspaceError> {
        config.validate()?;
        let root = WorkspaceRoot::new(&config.root)?;
        let languages = config
            .lsp
            .servers
            .iter()
            .map(|server| LanguageEntry {
                language_id: server.language_id.clone(),
                extensions: server.extensions.clone(),
                connector: Arc::new(ProcessConnector::new(
                    server.command.clone(),
                    server.args.clone(),
                    root.path(),
                )) as Arc<dyn LspConnector>,
            })
            .collect();

        info!(root = %root.path().display(), "workspace ready");
        Ok(Self {
            config,
            root,
            documents: RwLock::new(HashMap::new()),
            open_lock: Mutex::new(()),
            languages,
            sessions: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
        })
    }

    /// Route files with `extensions` to a server reached through `connector`.
    ///
    /// Takes precedence over configured servers for the same extensions.
    pub fn with_language_server(
        mut self,
        language_id: impl Into<String>,
        extensions: &[&str],
        connector: Arc<dyn LspConnector>,
    ) -> Self {
        self.languages.insert(
            0,
            LanguageEntry {
                language_id: language_id.into(),
                extensions: extensions.iter().map(|ext| ext.to_string()).collect(),
                connector,
            },
        );
        self
    }

    /// Configuration in effect.
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// The sandbox root.
    pub fn root(&self) -> &WorkspaceRoot {
        &self.root
    }

    /// A local terminal running in the root with the configured command policy.
    pub fn local_terminal(&self) -> LocalTerminal {
        self.config.terminal.build(self.root.path())
    }

    /// Open documents, by URI.
    pub fn open_documents(&self) -> Vec<DocumentInfo> {
        let slots: Vec<_> = self.documents.read().values().cloned().collect();
        let mut infos: Vec<_> = slots
            .iter()
            .map(|slot| self.info(slot, &slot.document.read()))
            .collect();
        infos.sort_by(|a, b| a.uri.cmp(&b.uri));
        infos
    }

    /// Handle of an open document.
    pub fn document(&self, uri: &str) -> Result<DocumentHandle, WorkspaceError> {
        Ok(DocumentHandle {
            slot: self.slot(uri)?,
        })
    }

    /// Open `uri`, or return the already open document unchanged.
    pub fn open_file(&self, uri: &str) -> Result<DocumentHandle, WorkspaceError> {
        let resolved = self.root.resolve(uri)?;
        self.open_resolved(&resolved).map(|(handle, _)| handle)
    }

    /// [`Self::open_file`], reporting the document and its content.
    pub fn open_file_view(&self, uri: &str) -> Result<OpenOutcome, WorkspaceError> {
        let resolved = self.root.resolve(uri)?;
        let (handle, already_open) = self.open_resolved(&resolved)?;
        let doc = self.read_guard(&handle.slot)?;
        Ok(OpenOutcome {
            document: self.info(&handle.slot, &doc),
            already_open,
            view: render_full(doc.model(), &self.config.render, true),
        })
    }

    /// Close `uri`, discarding its history and any unsaved changes.
    pub fn close_file(&self, uri: &str) -> Result<CloseOutcome, WorkspaceError> {
        let resolved = self.root.resolve(uri)?;
        let _open = self.open_lock.lock();
        self.remove_slot(&resolved.uri, false)
    }

    /// Apply an edit batch to an open document.
    pub fn edit_file(&self, uri: &str, edits: &[Edit]) -> Result<EditOutcome, WorkspaceError> {
        let slot = self.slot(uri)?;
        let mut doc = self.write_guard(&slot)?;
        self.apply(&slot, &mut doc, edits)
    }

    /// Undo the last batch of an open document.
    pub fn undo(&self, uri: &str) -> Result<HistoryOutcome, WorkspaceError> {
        self.step_history(uri, |doc| doc.model_mut().undo())
    }

    /// Redo the last undone batch of an open document.
    pub fn redo(&self, uri: &str) -> Result<HistoryOutcome, WorkspaceError> {
        self.step_history(uri, |doc| doc.model_mut().redo())
    }

    /// Write an open document to disk and mark it clean.
    pub fn save_file(&self, uri: &str) -> Result<SaveOutcome, WorkspaceError> {
        let slot = self.slot(uri)?;
        let mut doc = self.write_guard(&slot)?;
        let text = doc.persisted_text();
        if let Some(parent) = slot.path.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::io(parent, source))?;
        }
        fs::write(&slot.path, &text).map_err(|source| WorkspaceError::io(&slot.path, source))?;
        doc.model_mut().mark_saved();

        if let Some(session) = &slot.session
            && let Err(err) = session.did_save(&slot.uri, &doc.model().text())
        {
            warn!(uri = %slot.uri, error = %err, "didSave failed");
        }
        info!(uri = %slot.uri, version = doc.version(), "saved");
        Ok(SaveOutcome {
            uri: slot.uri.clone(),
            path: self.root.relative(&slot.path),
            version: doc.version(),
            bytes: text.len(),
            diagnostics: self.diagnostics_of(&slot, &doc),
        })
    }

    /// Lines `first..=last` of a document (all lines when `lines` is `None`), opening it if needed.
    pub fn read_file(
        &self,
        uri: &str,
        lines: Option<(usize, usize)>,
        with_line_numbers: bool,
    ) -> Result<ReadOutcome, WorkspaceError> {
        let resolved = self.root.resolve(uri)?;
        let (handle, _) = self.open_resolved(&resolved)?;
        let doc = self.read_guard(&handle.slot)?;
        let model = doc.model();

        let view = match lines {
            None => render_full(model, &self.config.render, with_line_numbers),
            Some((first, last)) => {
                if last < first {
                    return Err(WorkspaceError::Validation(format!(
                        "line range {first}..={last} is reversed"
                    )));
                }
                let line_count = model.index().line_count();
                if first >= line_count && self.config.position_policy == PositionPolicy::Strict {
                    return Err(OutOfRangeError::Line {
                        line: first,
                        line_count,
                    }
                    .into());
                }
                render_span(model, first, last, self.config.render.max_lines, with_line_numbers)
            }
        };
        Ok(ReadOutcome {
            document: self.info(&handle.slot, &doc),
            view,
        })
    }

    /// Create a file under the root and open it.
    ///
    /// An existing file is only replaced with `overwrite`; an open copy of it is closed first,
    /// dropping its unsaved changes.
    pub fn create_file(
        &self,
        uri: &str,
        text: &str,
        overwrite: bool,
    ) -> Result<OpenOutcome, WorkspaceError> {
        let resolved = self.root.resolve(uri)?;
        if resolved.path.is_dir() {
            return Err(WorkspaceError::Validation(format!(
                "`{}` is a directory",
                self.root.relative(&resolved.path)
            )));
        }
        if resolved.path.exists() {
            if !overwrite {
                return Err(WorkspaceError::AlreadyExists {
                    path: resolved.path,
                });
            }
            if self.documents.read().contains_key(&resolved.uri) {
                self.close_file(&resolved.uri)?;
            }
        }

        if let Some(parent) = resolved.path.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::io(parent, source))?;
        }
        fs::write(&resolved.path, text)
            .map_err(|source| WorkspaceError::io(&resolved.path, source))?;
        info!(uri = %resolved.uri, bytes = text.len(), "created");
        self.open_file_view(&resolved.uri)
    }

    /// Matches of `query` in an open document.
    pub fn find_in_file(
        &self,
        uri: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<FindOutcome, WorkspaceError> {
        let slot = self.slot(uri)?;
        let doc = self.read_guard(&slot)?;
        let index = doc.model().index();
        let matches = find_all(&doc.model().text(), query, options)?
            .into_iter()
            .map(|m| {
                let start = index.position_at(m.start);
                FoundMatch {
                    start,
                    end: index.position_at(m.end),
                    line_text: index.line_text(start.line).unwrap_or_default(),
                }
            })
            .collect();
        Ok(FindOutcome {
            uri: slot.uri.clone(),
            version: doc.version(),
            matches,
        })
    }

    /// Replace every match of `query` with the literal `replacement`, as one batch.
    pub fn replace_in_file(
        &self,
        uri: &str,
        query: &str,
        replacement: &str,
        options: SearchOptions,
    ) -> Result<ReplaceOutcome, WorkspaceError> {
        if query.is_empty() {
            return Err(WorkspaceError::Validation("query must not be empty".to_string()));
        }
        let slot = self.slot(uri)?;
        let mut doc = self.write_guard(&slot)?;

        let edits: Vec<Edit> = {
            let index = doc.model().index();
            find_all(&doc.model().text(), query, options)?
                .into_iter()
                .map(|m| {
                    let range = TextRange::new(index.position_at(m.start), index.position_at(m.end));
                    Edit::new(range, replacement)
                })
                .collect()
        };
        if edits.is_empty() {
            return Ok(ReplaceOutcome {
                uri: slot.uri.clone(),
                replacements: 0,
                edit: None,
            });
        }

        let edit = self.apply(&slot, &mut doc, &edits)?;
        Ok(ReplaceOutcome {
            uri: slot.uri.clone(),
            replacements: edits.len(),
            edit: Some(edit),
        })
    }

    /// Matches of `query` in a file or, recursively, in every file below a directory.
    ///
    /// `path` defaults to the root. Open documents are searched in their current, possibly unsaved,
    /// state; other files are read from disk and skipped when they are not UTF-8. `scope` keeps only
    /// matches lying inside one of its ranges and is accepted for a single file only. At most
    /// `limit` matches are returned.
    pub fn find_in_path(
        &self,
        path: Option<&str>,
        query: &str,
        options: SearchOptions,
        scope: Option<&[TextRange]>,
        limit: Option<usize>,
    ) -> Result<PathSearchOutcome, WorkspaceError> {
        if query.is_empty() {
            return Err(WorkspaceError::Validation("query must not be empty".to_string()));
        }
        let limit = limit.unwrap_or(MAX_SEARCH_RESULTS);
        if limit == 0 {
            return Err(WorkspaceError::Validation("limit must be positive".to_string()));
        }

        let target = self.root.resolve(path.unwrap_or("."))?;
        let files = if target.path.is_file() {
            vec![target.path.clone()]
        } else if target.path.is_dir() {
            if scope.is_some() {
                return Err(WorkspaceError::Validation(
                    "search_scope applies to a single file, not a directory".to_string(),
                ));
            }
            walk_files(&target.path).collect()
        } else {
            return Err(WorkspaceError::io(
                &target.path,
                io::Error::from(io::ErrorKind::NotFound),
            ));
        };

        let mut outcome = PathSearchOutcome {
            matches: Vec::new(),
            files_searched: 0,
            truncated: false,
        };
        for file in files {
            let Ok(resolved) = self.root.resolve(&self.root.relative(&file)) else {
                continue;
            };
            let Some(text) = self.current_text(&resolved) else {
                continue;
            };
            outcome.files_searched += 1;
            let index = LineIndex::from_text(&text);
            for m in find_all(&text, query, options)? {
                let start = index.position_at(m.start);
                let end = index.position_at(m.end);
                if let Some(scope) = scope
                    && !scope
                        .iter()
                        .any(|range| range.start_position <= start && end <= range.end_position)
                {
                    continue;
                }
                if outcome.matches.len() == limit {
                    outcome.truncated = true;
                    return Ok(outcome);
                }
                outcome.matches.push(PathMatch {
                    path: self.root.relative(&resolved.path),
                    uri: resolved.uri.clone(),
                    start,
                    end,
                    line_text: index.line_text(start.line).unwrap_or_default(),
                });
            }
        }
        debug!(query, matches = outcome.matches.len(), files = outcome.files_searched, "path search");
        Ok(outcome)
    }

    /// Move a file inside the root.
    ///
    /// An open source document must be clean; it is closed and reopened under the new URI. An
    /// existing destination is only replaced with `overwrite`, dropping any open copy of it.
    pub fn rename_file(
        &self,
        from: &str,
        to: &str,
        overwrite: bool,
    ) -> Result<RenameOutcome, WorkspaceError> {
        let source = self.root.resolve(from)?;
        let target = self.root.resolve(to)?;
        if !source.path.is_file() {
            return Err(WorkspaceError::Validation(format!(
                "`{}` is not a file",
                self.root.relative(&source.path)
            )));
        }
        if source.path == target.path {
            return Err(WorkspaceError::Validation(
                "source and destination are the same file".to_string(),
            ));
        }
        if target.path.is_dir() {
            return Err(WorkspaceError::Validation(format!(
                "`{}` is a directory",
                self.root.relative(&target.path)
            )));
        }

        let was_open = {
            let _open = self.open_lock.lock();
            if target.path.exists() {
                if !overwrite {
                    return Err(WorkspaceError::AlreadyExists { path: target.path });
                }
                if self.documents.read().contains_key(&target.uri) {
                    self.remove_slot(&target.uri, false)?;
                }
            }
            let was_open = self.documents.read().contains_key(&source.uri);
            if was_open {
                self.remove_slot(&source.uri, true)?;
            }
            if let Some(parent) = target.path.parent() {
                fs::create_dir_all(parent).map_err(|source| WorkspaceError::io(parent, source))?;
            }
            fs::rename(&source.path, &target.path)
                .map_err(|err| WorkspaceError::io(&source.path, err))?;
            was_open
        };
        info!(from = %source.uri, to = %target.uri, "renamed");

        let reopened = if was_open {
            let (handle, _) = self.open_resolved(&target)?;
            let doc = self.read_guard(&handle.slot)?;
            Some(self.info(&handle.slot, &doc))
        } else {
            None
        };
        Ok(RenameOutcome {
            from: source.uri,
            to: target.uri,
            path: self.root.relative(&target.path),
            reopened,
        })
    }

    /// Delete a file, or with `recursive` a directory, closing every open document below it.
    ///
    /// Unsaved changes of those documents are discarded. The root itself cannot be deleted.
    pub fn delete_file(&self, uri: &str, recursive: bool) -> Result<DeleteOutcome, WorkspaceError> {
        let resolved = self.root.resolve(uri)?;
        if resolved.path == self.root.path() {
            return Err(WorkspaceError::Validation(
                "the workspace root cannot be deleted".to_string(),
            ));
        }
        let is_dir = resolved.path.is_dir();
        if !is_dir && !resolved.path.is_file() {
            return Err(WorkspaceError::io(
                &resolved.path,
                io::Error::from(io::ErrorKind::NotFound),
            ));
        }
        if is_dir && !recursive {
            return Err(WorkspaceError::Validation(format!(
                "`{}` is a directory; pass recursive to delete it",
                self.root.relative(&resolved.path)
            )));
        }

        let _open = self.open_lock.lock();
        let mut affected: Vec<String> = self
            .documents
            .read()
            .values()
            .filter(|slot| slot.path.starts_with(&resolved.path))
            .map(|slot| slot.uri.clone())
            .collect();
        affected.sort();
        let closed = affected
            .iter()
            .map(|uri| self.remove_slot(uri, false))
            .collect::<Result<Vec<_>, _>>()?;

        let removed = if is_dir {
            fs::remove_dir_all(&resolved.path)
        } else {
            fs::remove_file(&resolved.path)
        };
        removed.map_err(|source| WorkspaceError::io(&resolved.path, source))?;
        info!(uri = %resolved.uri, closed = closed.len(), "deleted");
        Ok(DeleteOutcome {
            path: self.root.relative(&resolved.path),
            uri: resolved.uri,
            closed,
        })
    }

    /// Latest diagnostics of an open document.
    pub fn diagnostics(&self, uri: &str) -> Result<Vec<Diagnostic>, WorkspaceError> {
        let slot = self.slot(uri)?;
        let doc = self.read_guard(&slot)?;
        Ok(self.diagnostics_of(&slot, &doc))
    }

    /// Symbols of an open document, optionally restricted to `kinds`.
    pub fn get_symbols(
        &self,
        uri: &str,
        kinds: Option<&[SymbolKind]>,
    ) -> Result<SymbolOutcome, WorkspaceError> {
        let slot = self.slot(uri)?;
        let session = Self::session_of(&slot)?;
        let result = {
            let doc = self.read_guard(&slot)?;
            session.document_symbols(&slot.uri, doc.version(), doc.model().index())
        };
        let symbols = match result {
            Ok(symbols) => symbols,
            Err(err) if err.is_timeout() => {
                warn!(uri = %slot.uri, "documentSymbol timed out");
                return Ok(SymbolOutcome::timed_out());
            }
            Err(err) => return Err(err.into()),
        };

        let references = match kinds {
            Some(kinds) if !kinds.is_empty() => symbols
                .into_iter()
                .filter(|sym| sym.kind.as_ref().is_some_and(|kind| kinds.contains(kind)))
                .collect(),
            _ => symbols,
        };
        Ok(SymbolOutcome::found(references))
    }

    /// Where the symbol at `position` is defined.
    pub fn goto_definition(
        &self,
        uri: &str,
        position: Position,
    ) -> Result<SymbolOutcome, WorkspaceError> {
        self.navigate(uri, position, |session, uri, version, index, pos| {
            session.definition(uri, version, index, pos)
        })
    }

    /// Every reference to the symbol at `position`, its declaration included.
    pub fn find_references(
        &self,
        uri: &str,
        position: Position,
    ) -> Result<SymbolOutcome, WorkspaceError> {
        self.navigate(uri, position, |session, uri, version, index, pos| {
            session.references(uri, version, index, pos)
        })
    }

    /// Workspace-wide symbol search across every configured language server.
    pub fn find_symbols(&self, query: &str) -> Result<SymbolOutcome, WorkspaceError> {
        if self.languages.is_empty() {
            return Err(WorkspaceError::NoLanguageServer {
                uri: self.root_uri(),
            });
        }

        let mut outcome = SymbolOutcome::found(Vec::new());
        let mut first_error: Option<LspError> = None;
        let mut answered = false;
        let mut seen = Vec::new();
        for entry in &self.languages {
            if seen.contains(&entry.language_id) {
                continue;
            }
            seen.push(entry.language_id.clone());
            let session = self.session_for(entry);
            match session.workspace_symbols(query, self.line_reader()) {
                Ok(symbols) => {
                    answered = true;
                    outcome.references.extend(symbols);
                }
                Err(err) if err.is_timeout() => {
                    warn!(language = %entry.language_id, query, "workspace/symbol timed out");
                    outcome.timed_out = true;
                }
                Err(err) => {
                    warn!(language = %entry.language_id, error = %err, "workspace/symbol failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) if !answered && !outcome.timed_out => Err(err.into()),
            _ => Ok(outcome),
        }
    }

    /// Files under `path` matching `pattern`.
    pub fn search_files(
        &self,
        pattern: &str,
        path: Option<&str>,
    ) -> Result<FileSearch, WorkspaceError> {
        search_files(&self.root, pattern, path)
    }

    /// Tree below `path`.
    pub fn list_directory(
        &self,
        path: Option<&str>,
        depth: Option<usize>,
    ) -> Result<DirectoryListing, WorkspaceError> {
        list_directory(&self.root, path, depth)
    }

    /// Languages whose server is currently running, sorted.
    pub fn running_language_servers(&self) -> Vec<String> {
        let mut running: Vec<_> = self
            .sessions
            .lock()
            .values()
            .filter(|session| session.is_running())
            .map(|session| session.language_id().to_string())
            .collect();
        running.sort();
        running
    }

    /// Stop every language server.
    pub fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.shutdown();
        }
    }

    fn root_uri(&self) -> String {
        ide_core_lsp::path_to_file_uri(self.root.path())
            .unwrap_or_else(|| self.root.path().display().to_string())
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn slot(&self, uri: &str) -> Result<Arc<DocumentSlot>, WorkspaceError> {
        let resolved = self.root.resolve(uri)?;
        let slot = self
            .documents
            .read()
            .get(&resolved.uri)
            .cloned()
            .ok_or(WorkspaceError::NotOpen { uri: resolved.uri })?;
        slot.last_used.store(self.tick(), Ordering::Relaxed);
        Ok(slot)
    }

    fn read_guard<'a>(
        &self,
        slot: &'a DocumentSlot,
    ) -> Result<RwLockReadGuard<'a, Document>, WorkspaceError> {
        let guard = slot.document.read();
        if slot.closed.load(Ordering::Acquire) {
            return Err(WorkspaceError::NotOpen {
                uri: slot.uri.clone(),
            });
        }
        Ok(guard)
    }

    fn write_guard<'a>(
        &self,
        slot: &'a DocumentSlot,
    ) -> Result<RwLockWriteGuard<'a, Document>, WorkspaceError> {
        let guard = slot.document.write();
        if slot.closed.load(Ordering::Acquire) {
            return Err(WorkspaceError::NotOpen {
                uri: slot.uri.clone(),
            });
        }
        Ok(guard)
    }

    fn info(&self, slot: &DocumentSlot, doc: &Document) -> DocumentInfo {
        DocumentInfo {
            uri: slot.uri.clone(),
            path: self.root.relative(&slot.path),
            version: doc.version(),
            dirty: doc.is_dirty(),
            language_id: doc.language_id().map(str::to_string),
        }
    }

    fn language_for(&self, resolved: &ResolvedPath) -> Option<&LanguageEntry> {
        let ext = resolved.extension()?;
        self.languages
            .iter()
            .find(|entry| entry.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    fn session_for(&self, entry: &LanguageEntry) -> Arc<LanguageServerSession> {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(entry.language_id.clone())
            .or_insert_with(|| {
                let lsp = &self.config.lsp;
                let mut options = SessionOptions::new(entry.language_id.clone(), self.root.path());
                options.request_timeout = lsp.request_timeout();
                options.initialize_timeout = lsp.initialize_timeout();
                options.max_sync_failures = lsp.max_sync_failures;
                Arc::new(LanguageServerSession::new(options, entry.connector.clone()))
            })
            .clone()
    }

    fn session_of(slot: &DocumentSlot) -> Result<&Arc<LanguageServerSession>, WorkspaceError> {
        slot.session
            .as_ref()
            .ok_or_else(|| WorkspaceError::NoLanguageServer {
                uri: slot.uri.clone(),
            })
    }

    fn open_resolved(
        &self,
        resolved: &ResolvedPath,
    ) -> Result<(DocumentHandle, bool), WorkspaceError> {
        let _open = self.open_lock.lock();
        if let Some(slot) = self.documents.read().get(&resolved.uri).cloned() {
            slot.last_used.store(self.tick(), Ordering::Relaxed);
            debug!(uri = %resolved.uri, "already open");
            return Ok((DocumentHandle { slot }, true));
        }

        if resolved.path.is_dir() {
            return Err(WorkspaceError::Validation(format!(
                "`{}` is a directory",
                self.root.relative(&resolved.path)
            )));
        }
        let raw = fs::read_to_string(&resolved.path)
            .map_err(|source| WorkspaceError::io(&resolved.path, source))?;
        self.make_room()?;

        let entry = self.language_for(resolved);
        let session = entry.map(|entry| self.session_for(entry));
        let document = Document::from_raw(
            resolved.uri.clone(),
            entry.map(|entry| entry.language_id.clone()),
            &raw,
        );
        let slot = Arc::new(DocumentSlot {
            uri: resolved.uri.clone(),
            path: resolved.path.clone(),
            session,
            document: RwLock::new(document),
            last_used: AtomicU64::new(self.tick()),
            closed: AtomicBool::new(false),
        });

        if let Some(session) = &slot.session {
            let doc = slot.document.read();
            if let Err(err) = session.did_open(&slot.uri, doc.version(), doc.model().index()) {
                // The document stays usable; the session opens it on its next request.
                warn!(uri = %slot.uri, error = %err, "didOpen failed");
            }
        }

        self.documents
            .write()
            .insert(resolved.uri.clone(), slot.clone());
        info!(uri = %resolved.uri, "opened");
        Ok((DocumentHandle { slot }, false))
    }

    /// Close an open document. Caller holds `open_lock`.
    ///
    /// With `refuse_dirty` a document with unsaved changes stays open and the call fails.
    fn remove_slot(&self, uri: &str, refuse_dirty: bool) -> Result<CloseOutcome, WorkspaceError> {
        let slot = self
            .documents
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| WorkspaceError::NotOpen {
                uri: uri.to_string(),
            })?;

        // Wait for in-flight operations before detaching.
        let discarded_changes = {
            let doc = slot.document.write();
            if refuse_dirty && doc.is_dirty() {
                return Err(WorkspaceError::Validation(format!(
                    "`{}` has unsaved changes; save or close it first",
                    self.root.relative(&slot.path)
                )));
            }
            slot.closed.store(true, Ordering::Release);
            doc.is_dirty()
        };
        self.documents.write().remove(uri);
        self.detach(&slot);
        if discarded_changes {
            warn!(uri = %slot.uri, "closed with unsaved changes");
        } else {
            info!(uri = %slot.uri, "closed");
        }
        Ok(CloseOutcome {
            uri: slot.uri.clone(),
            discarded_changes,
        })
    }

    /// Text of an open document, else the LF-normalized file content; `None` if unreadable.
    fn current_text(&self, resolved: &ResolvedPath) -> Option<String> {
        let open = self.documents.read().get(&resolved.uri).cloned();
        if let Some(slot) = open {
            return Some(slot.document.read().model().text());
        }
        match fs::read_to_string(&resolved.path) {
            Ok(raw) => Some(LineEnding::normalize(&raw).0),
            Err(err) => {
                debug!(path = %resolved.path.display(), error = %err, "skipping unreadable file");
                None
            }
        }
    }

    /// Evict least recently used clean documents until one more fits. Caller holds `open_lock`.
    fn make_room(&self) -> Result<(), WorkspaceError> {
        let limit = self.config.max_open_documents;
        while self.documents.read().len() >= limit {
            let mut candidates: Vec<_> = self.documents.read().values().cloned().collect();
            candidates.sort_by_key(|slot| slot.last_used.load(Ordering::Relaxed));

            let evicted = candidates.into_iter().find(|slot| {
                // A document that is being edited right now is not a candidate.
                let Some(doc) = slot.document.try_write() else {
                    return false;
                };
                if doc.is_dirty() {
                    return false;
                }
                slot.closed.store(true, Ordering::Release);
                true
            });
            let Some(slot) = evicted else {
                warn!(limit, "open document cap reached and every document is modified");
                return Err(WorkspaceError::TooManyOpenDocuments { limit });
            };

            self.documents.write().remove(&slot.uri);
            self.detach(&slot);
            info!(uri = %slot.uri, "evicted least recently used document");
        }
        Ok(())
    }

    fn detach(&self, slot: &DocumentSlot) {
        if let Some(session) = &slot.session
            && let Err(err) = session.did_close(&slot.uri)
        {
            warn!(uri = %slot.uri, error = %err, "didClose failed");
        }
    }

    fn apply(
        &self,
        slot: &DocumentSlot,
        doc: &mut Document,
        edits: &[Edit],
    ) -> Result<EditOutcome, WorkspaceError> {
        let before = doc.model().snapshot();
        let result = doc
            .model_mut()
            .apply_edits(edits, self.config.position_policy)
            .map_err(|source| WorkspaceError::Edit {
                uri: slot.uri.clone(),
                source,
            })?;
        let (_, sync_error) = self.forward_change(slot, doc, &before);
        debug!(
            uri = %slot.uri,
            version = result.version,
            edits = result.summary.edits_applied,
            "applied edit batch"
        );

        Ok(EditOutcome {
            uri: slot.uri.clone(),
            previous_version: result.previous_version,
            version: result.version,
            summary: result.summary,
            inverse_edits: result.inverse_edits,
            view: render_change(doc.model(), &result.summary, &self.config.render),
            diagnostics: self.diagnostics_of(slot, doc),
            sync_error,
        })
    }

    fn step_history(
        &self,
        uri: &str,
        step: impl FnOnce(&mut Document) -> bool,
    ) -> Result<HistoryOutcome, WorkspaceError> {
        let slot = self.slot(uri)?;
        let mut doc = self.write_guard(&slot)?;
        let before = doc.model().snapshot();
        let applied = step(&mut doc);

        let (summary, sync_error) = if applied {
            self.forward_change(&slot, &mut doc, &before)
        } else {
            (None, None)
        };
        let view = summary.map(|summary| render_change(doc.model(), &summary, &self.config.render));
        Ok(HistoryOutcome {
            uri: slot.uri.clone(),
            applied,
            version: doc.version(),
            dirty: doc.is_dirty(),
            view,
            diagnostics: self.diagnostics_of(&slot, &doc),
            sync_error,
        })
    }

    /// Send the pending delta to the language server. Caller holds the document's write lock.
    fn forward_change(
        &self,
        slot: &DocumentSlot,
        doc: &mut Document,
        before: &LineIndex,
    ) -> (Option<DiffSummary>, Option<String>) {
        let Some(delta) = doc.model_mut().take_last_delta() else {
            return (None, None);
        };
        let summary = summarize_delta(&delta, doc.model().index());
        let Some(session) = &slot.session else {
            return (Some(summary), None);
        };
        match session.did_change(&slot.uri, before, &delta, doc.model().index()) {
            Ok(()) => (Some(summary), None),
            Err(err) => {
                warn!(uri = %slot.uri, error = %err, "language server not updated");
                (Some(summary), Some(err.to_string()))
            }
        }
    }

    fn diagnostics_of(&self, slot: &DocumentSlot, doc: &Document) -> Vec<Diagnostic> {
        slot.session
            .as_ref()
            .map(|session| session.diagnostics(&slot.uri, doc.model().index()))
            .unwrap_or_default()
    }

    fn navigate<F>(
        &self,
        uri: &str,
        position: Position,
        request: F,
    ) -> Result<SymbolOutcome, WorkspaceError>
    where
        F: FnOnce(
            &LanguageServerSession,
            &str,
            u64,
            &LineIndex,
            Position,
        ) -> Result<NavigationTargets, LspError>,
    {
        let slot = self.slot(uri)?;
        let session = Self::session_of(&slot)?;
        let result = {
            let doc = self.read_guard(&slot)?;
            let index = doc.model().index();
            let offset = index.position_to_offset(position, self.config.position_policy)?;
            request(session, &slot.uri, doc.version(), index, index.position_at(offset))
        };

        match result {
            // Resolved after the read lock is released; targets may live in other open documents.
            Ok(targets) if targets.content_modified => {
                let mut outcome = SymbolOutcome::found(Vec::new());
                outcome.warning = Some(format!(
                    "language server reported {} as modified while answering; retry once it settles",
                    slot.uri
                ));
                Ok(outcome)
            }
            Ok(targets) => Ok(SymbolOutcome::found(targets.resolve(self.line_reader()))),
            Err(err) if err.is_timeout() => {
                warn!(uri = %slot.uri, %position, "navigation request timed out");
                Ok(SymbolOutcome::timed_out())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Line lookup for converting server columns: open documents first, then the file on disk.
    fn line_reader(&self) -> impl FnMut(&str, usize) -> Option<String> + '_ {
        let mut files: HashMap<String, Option<Vec<String>>> = HashMap::new();
        move |uri, line| {
            let open = self.documents.read().get(uri).cloned();
            if let Some(slot) = open {
                return slot.document.read().model().index().line_text(line);
            }
            files
                .entry(uri.to_string())
                .or_insert_with(|| {
                    let path = file_uri_to_path(uri)?;
                    let raw = fs::read_to_string(path).ok()?;
                    Some(raw.lines().map(str::to_string).collect())
                })
                .as_ref()
                .and_then(|lines| lines.get(line).cloned())
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.shutdown();
    }
}
