//! Language-server session.
//!
//! One [`LanguageServerSession`] keeps one external server's view of the open documents of a
//! language in line with local state:
//!
//! - `didOpen` carries the full text; every local change goes out as one `didChange` holding only
//!   the changed ranges (or the full text, if the server only supports full sync).
//! - Each synced document remembers the local version the server has seen. A change whose base
//!   version does not match, a dead connection, or repeated `ContentModified` replies trigger a full
//!   resync (`didClose` + `didOpen`) instead of further incremental attempts.
//! - Versions on the wire strictly increase per document even when undo moves the local version
//!   backwards.
//! - The server is started lazily on first use and restarted on the next use after it dies.
//!
//! The session never owns document content: callers pass the relevant snapshot into each call.

use crate::error::LspError;
use crate::lsp_client::{LspClient, LspConnection};
use crate::lsp_diagnostics::{DiagnosticsStore, PublishedDiagnostics};
use crate::lsp_locations::{LspLocation, locations_from_value, resolve_locations};
use crate::lsp_symbols::{document_symbols_from_value, workspace_symbols_from_value};
use crate::lsp_sync::{
    LspCoordinateConverter, PositionEncoding, SyncKind, TextChange, content_changes_for_delta,
    did_change_params,
};
use crate::lsp_uri::path_to_file_uri;
use ide_core::{Diagnostic, LineIndex, Position, SymbolReference, TextDelta};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Opens connections to a language server.
pub trait LspConnector: Send + Sync {
    /// Establish a fresh connection.
    fn connect(&self) -> Result<LspConnection, LspError>;
}

/// Spawns the server as a child process speaking LSP over stdio.
#[derive(Debug, Clone)]
pub struct ProcessConnector {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
}

impl ProcessConnector {
    /// Run `program args...` in `cwd`.
    pub fn new(program: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
        }
    }
}

impl LspConnector for ProcessConnector {
    fn connect(&self) -> Result<LspConnection, LspError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.cwd);
        LspConnection::spawn(cmd)
    }
}

/// Session parameters.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Language id sent in `didOpen`.
    pub language_id: String,
    /// Workspace root (absolute).
    pub root: PathBuf,
    /// Bound for navigation requests.
    pub request_timeout: Duration,
    /// Bound for the `initialize` handshake.
    pub initialize_timeout: Duration,
    /// Consecutive failures tolerated before a document is fully resynced.
    pub max_sync_failures: u32,
    /// Passed through as `initializationOptions`.
    pub initialization_options: Option<Value>,
}

impl SessionOptions {
    /// Options with default bounds.
    pub fn new(language_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            language_id: language_id.into(),
            root: root.into(),
            request_timeout: Duration::from_secs(5),
            initialize_timeout: Duration::from_secs(10),
            max_sync_failures: 2,
            initialization_options: None,
        }
    }
}

/// Server-side state of one open document.
#[derive(Debug, Clone, Copy)]
struct SyncedDocument {
    local_version: u64,
    wire_version: i32,
    failures: u32,
    needs_resync: bool,
}

struct Connected {
    client: LspClient,
    encoding: PositionEncoding,
    sync_kind: SyncKind,
    documents: Mutex<HashMap<String, SyncedDocument>>,
}

/// Locations returned by a navigation request, still in server coordinates.
#[derive(Debug, Clone)]
pub struct NavigationTargets {
    /// Normalized locations.
    pub locations: Vec<LspLocation>,
    /// Encoding the server's columns are expressed in.
    pub encoding: PositionEncoding,
    /// The server answered `ContentModified`; `locations` is empty.
    pub content_modified: bool,
}

impl NavigationTargets {
    /// Convert into local references; see [`resolve_locations`].
    pub fn resolve<F>(&self, line_text: F) -> Vec<SymbolReference>
    where
        F: FnMut(&str, usize) -> Option<String>,
    {
        resolve_locations(&self.locations, self.encoding, line_text)
    }
}

/// Synchronization channel to one language server.
pub struct LanguageServerSession {
    options: SessionOptions,
    connector: Arc<dyn LspConnector>,
    connection: Mutex<Option<Arc<Connected>>>,
    diagnostics: Arc<DiagnosticsStore>,
}

impl LanguageServerSession {
    /// Create an idle session. Nothing is started until the first call that needs the server.
    pub fn new(options: SessionOptions, connector: Arc<dyn LspConnector>) -> Self {
        Self {
            options,
            connector,
            connection: Mutex::new(None),
            diagnostics: Arc::new(DiagnosticsStore::new()),
        }
    }

    /// Language id this session serves.
    pub fn language_id(&self) -> &str {
        &self.options.language_id
    }

    /// `true` while a live connection exists.
    pub fn is_running(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .is_some_and(|conn| conn.client.is_alive())
    }

    /// `true` if `uri` is currently open on the server.
    pub fn is_synced(&self, uri: &str) -> bool {
        self.live()
            .is_some_and(|conn| conn.documents.lock().contains_key(uri))
    }

    /// Send `didOpen` with the full content at `version`.
    pub fn did_open(&self, uri: &str, version: u64, index: &LineIndex) -> Result<(), LspError> {
        let conn = self.connected()?;
        if conn.documents.lock().contains_key(uri) {
            return self.resync(&conn, uri, version, index);
        }
        self.send_open(&conn, uri, version, index)
    }

    /// Forward one local change.
    ///
    /// `before` is the content the delta was produced from, `after` the current content. Desyncs are
    /// repaired here; an error means even a full resync failed.
    pub fn did_change(
        &self,
        uri: &str,
        before: &LineIndex,
        delta: &TextDelta,
        after: &LineIndex,
    ) -> Result<(), LspError> {
        let conn = self.connected()?;
        let state = conn.documents.lock().get(uri).copied();
        let Some(doc) = state else {
            debug!(uri, "document not open on server; opening with current content");
            return self.send_open(&conn, uri, delta.version_after, after);
        };

        if doc.needs_resync || doc.local_version != delta.version_before {
            warn!(
                uri,
                server_version = doc.local_version,
                base_version = delta.version_before,
                "language server out of sync; resyncing"
            );
            return self.resync(&conn, uri, delta.version_after, after);
        }

        let changes: Vec<TextChange> = match conn.sync_kind {
            SyncKind::None => {
                self.update_document(&conn, uri, |d| d.local_version = delta.version_after);
                return Ok(());
            }
            SyncKind::Full => {
                let text = after.text();
                return self.send_full_change(&conn, uri, doc, delta.version_after, text);
            }
            SyncKind::Incremental => content_changes_for_delta(before, delta, conn.encoding),
        };

        let wire_version = doc.wire_version.saturating_add(1);
        match conn
            .client
            .notify("textDocument/didChange", did_change_params(uri, wire_version, &changes))
        {
            Ok(()) => {
                self.update_document(&conn, uri, |d| {
                    d.local_version = delta.version_after;
                    d.wire_version = wire_version;
                    d.failures = 0;
                });
                Ok(())
            }
            Err(err) => {
                warn!(uri, error = %err, "didChange failed; reconnecting");
                self.recover(uri, delta.version_after, after)
            }
        }
    }

    /// Send `didSave`.
    pub fn did_save(&self, uri: &str, text: &str) -> Result<(), LspError> {
        let Some(conn) = self.live() else {
            return Ok(());
        };
        if !conn.documents.lock().contains_key(uri) {
            return Ok(());
        }
        conn.client.notify(
            "textDocument/didSave",
            json!({ "textDocument": { "uri": uri }, "text": text }),
        )
    }

    /// Send `didClose` and drop the document's diagnostics.
    ///
    /// When no server is running this is a no-op; the session stays ready to start on demand.
    pub fn did_close(&self, uri: &str) -> Result<(), LspError> {
        self.diagnostics.clear(uri);
        let Some(conn) = self.live() else {
            return Ok(());
        };
        if conn.documents.lock().remove(uri).is_none() {
            return Ok(());
        }
        conn.client.notify(
            "textDocument/didClose",
            json!({ "textDocument": { "uri": uri } }),
        )?;
        if conn.documents.lock().is_empty() {
            debug!(language = %self.options.language_id, "no open documents; session idle");
        }
        Ok(())
    }

    /// `textDocument/definition` at `pos`.
    pub fn definition(
        &self,
        uri: &str,
        version: u64,
        index: &LineIndex,
        pos: Position,
    ) -> Result<NavigationTargets, LspError> {
        self.navigate("textDocument/definition", uri, version, index, pos, None)
    }

    /// `textDocument/references` at `pos`, declaration included.
    pub fn references(
        &self,
        uri: &str,
        version: u64,
        index: &LineIndex,
        pos: Position,
    ) -> Result<NavigationTargets, LspError> {
        let context = json!({ "includeDeclaration": true });
        self.navigate("textDocument/references", uri, version, index, pos, Some(context))
    }

    /// `textDocument/documentSymbol`, flattened.
    pub fn document_symbols(
        &self,
        uri: &str,
        version: u64,
        index: &LineIndex,
    ) -> Result<Vec<SymbolReference>, LspError> {
        let conn = self.connected()?;
        self.ensure_synced(&conn, uri, version, index)?;
        let result = self.tracked_request(
            &conn,
            uri,
            version,
            index,
            "textDocument/documentSymbol",
            json!({ "textDocument": { "uri": uri } }),
        )?;
        Ok(result
            .map(|value| document_symbols_from_value(uri, index, conn.encoding, &value))
            .unwrap_or_default())
    }

    /// `workspace/symbol` for `query`.
    pub fn workspace_symbols<F>(
        &self,
        query: &str,
        line_text: F,
    ) -> Result<Vec<SymbolReference>, LspError>
    where
        F: FnMut(&str, usize) -> Option<String>,
    {
        let conn = self.connected()?;
        let result = conn.client.request(
            "workspace/symbol",
            json!({ "query": query }),
            self.options.request_timeout,
        )?;
        Ok(workspace_symbols_from_value(&result, conn.encoding, line_text))
    }

    /// Latest published diagnostics for `uri`, converted against `index`.
    pub fn diagnostics(&self, uri: &str, index: &LineIndex) -> Vec<Diagnostic> {
        let encoding = self.live().map(|conn| conn.encoding).unwrap_or_default();
        self.diagnostics.resolve(uri, index, encoding)
    }

    /// Stop the server, if running.
    pub fn shutdown(&self) {
        let conn = self.connection.lock().take();
        if let Some(conn) = conn {
            info!(language = %self.options.language_id, "stopping language server");
            conn.client.shutdown(Duration::from_secs(1));
        }
    }

    fn live(&self) -> Option<Arc<Connected>> {
        self.connection
            .lock()
            .as_ref()
            .filter(|conn| conn.client.is_alive())
            .cloned()
    }

    fn connected(&self) -> Result<Arc<Connected>, LspError> {
        let mut slot = self.connection.lock();
        if let Some(conn) = slot.as_ref() {
            if conn.client.is_alive() {
                return Ok(Arc::clone(conn));
            }
            warn!(language = %self.options.language_id, "language server exited; restarting");
        }

        let conn = Arc::new(self.start()?);
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }

    fn start(&self) -> Result<Connected, LspError> {
        let connection = self.connector.connect()?;
        let root_uri = path_to_file_uri(&self.options.root);
        let folders: Vec<Value> = root_uri
            .iter()
            .map(|uri| json!({ "uri": uri, "name": folder_name(&self.options.root) }))
            .collect();

        let store = Arc::clone(&self.diagnostics);
        let client = LspClient::start(
            connection,
            folders.clone(),
            Box::new(move |method, params| match method {
                "textDocument/publishDiagnostics" => {
                    if let Some(published) = PublishedDiagnostics::from_params(params) {
                        debug!(uri = %published.uri, count = published.diagnostics.len(), "diagnostics published");
                        store.publish(published);
                    }
                }
                "window/logMessage" | "window/showMessage" => {
                    let message = params.get("message").and_then(Value::as_str).unwrap_or("");
                    debug!(target: "ide_core_lsp::server_log", "{message}");
                }
                _ => {}
            }),
        );

        let result = client.request(
            "initialize",
            self.initialize_params(root_uri, folders),
            self.options.initialize_timeout,
        )?;
        let capabilities = result.get("capabilities").cloned().unwrap_or(Value::Null);
        let encoding = PositionEncoding::from_capabilities(&capabilities);
        let sync_kind = SyncKind::from_capabilities(&capabilities);
        client.notify("initialized", json!({}))?;

        info!(
            language = %self.options.language_id,
            ?encoding,
            ?sync_kind,
            "language server initialized"
        );
        Ok(Connected {
            client,
            encoding,
            sync_kind,
            documents: Mutex::new(HashMap::new()),
        })
    }

    fn initialize_params(&self, root_uri: Option<String>, folders: Vec<Value>) -> Value {
        let mut params = json!({
            "processId": std::process::id(),
            "rootUri": root_uri,
            "workspaceFolders": folders,
            "capabilities": {
                "general": { "positionEncodings": PositionEncoding::OFFERED },
                "textDocument": {
                    "synchronization": { "didSave": true, "dynamicRegistration": false },
                    "publishDiagnostics": { "versionSupport": true },
                    "definition": { "linkSupport": true },
                    "references": {},
                    "documentSymbol": { "hierarchicalDocumentSymbolSupport": true },
                },
                "workspace": { "symbol": {}, "workspaceFolders": true, "configuration": true },
            },
        });
        if let Some(options) = &self.options.initialization_options {
            params["initializationOptions"] = options.clone();
        }
        params
    }

    fn send_open(
        &self,
        conn: &Connected,
        uri: &str,
        version: u64,
        index: &LineIndex,
    ) -> Result<(), LspError> {
        let mut docs = conn.documents.lock();
        self.open_locked(conn, &mut docs, uri, version, index)
    }

    /// `didOpen` with the caller holding the document table for the whole exchange.
    fn open_locked(
        &self,
        conn: &Connected,
        docs: &mut HashMap<String, SyncedDocument>,
        uri: &str,
        version: u64,
        index: &LineIndex,
    ) -> Result<(), LspError> {
        let wire_version = docs
            .get(uri)
            .map_or(0, |doc| doc.wire_version.saturating_add(1));
        conn.client.notify(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": self.options.language_id,
                    "version": wire_version,
                    "text": index.text(),
                }
            }),
        )?;
        docs.insert(
            uri.to_string(),
            SyncedDocument {
                local_version: version,
                wire_version,
                failures: 0,
                needs_resync: false,
            },
        );
        Ok(())
    }

    fn send_full_change(
        &self,
        conn: &Connected,
        uri: &str,
        doc: SyncedDocument,
        version: u64,
        text: String,
    ) -> Result<(), LspError> {
        let wire_version = doc.wire_version.saturating_add(1);
        conn.client.notify(
            "textDocument/didChange",
            json!({
                "textDocument": { "uri": uri, "version": wire_version },
                "contentChanges": [{ "text": text }],
            }),
        )?;
        self.update_document(conn, uri, |d| {
            d.local_version = version;
            d.wire_version = wire_version;
            d.failures = 0;
        });
        Ok(())
    }

    fn resync(
        &self,
        conn: &Connected,
        uri: &str,
        version: u64,
        index: &LineIndex,
    ) -> Result<(), LspError> {
        let mut docs = conn.documents.lock();
        self.resync_locked(conn, &mut docs, uri, version, index)
    }

    /// `didClose` + `didOpen` as one step; no other exchange for the table can interleave.
    fn resync_locked(
        &self,
        conn: &Connected,
        docs: &mut HashMap<String, SyncedDocument>,
        uri: &str,
        version: u64,
        index: &LineIndex,
    ) -> Result<(), LspError> {
        info!(uri, version, "full resync");
        if let Err(err) = conn.client.notify(
            "textDocument/didClose",
            json!({ "textDocument": { "uri": uri } }),
        ) {
            debug!(uri, error = %err, "didClose before resync failed");
        }
        let Err(err) = self.open_locked(conn, docs, uri, version, index) else {
            return Ok(());
        };
        if let Some(doc) = docs.get_mut(uri) {
            doc.needs_resync = true;
        }
        Err(LspError::Desync {
            uri: uri.to_string(),
            reason: err.to_string(),
        })
    }

    fn recover(&self, uri: &str, version: u64, index: &LineIndex) -> Result<(), LspError> {
        let desync = |err: LspError| LspError::Desync {
            uri: uri.to_string(),
            reason: err.to_string(),
        };
        let conn = self.connected().map_err(desync)?;
        self.send_open(&conn, uri, version, index).map_err(desync)
    }

    /// Bring the server to `version` before a request. The check and any resync happen under one
    /// lock, so concurrent readers of the same version resync at most once.
    fn ensure_synced(
        &self,
        conn: &Connected,
        uri: &str,
        version: u64,
        index: &LineIndex,
    ) -> Result<(), LspError> {
        let mut docs = conn.documents.lock();
        match docs.get(uri).copied() {
            None => self.open_locked(conn, &mut docs, uri, version, index),
            Some(doc) if doc.needs_resync || doc.local_version != version => {
                self.resync_locked(conn, &mut docs, uri, version, index)
            }
            Some(_) => Ok(()),
        }
    }

    fn navigate(
        &self,
        method: &str,
        uri: &str,
        version: u64,
        index: &LineIndex,
        pos: Position,
        context: Option<Value>,
    ) -> Result<NavigationTargets, LspError> {
        let conn = self.connected()?;
        self.ensure_synced(&conn, uri, version, index)?;

        let lsp_pos = LspCoordinateConverter::position_to_lsp(index, pos, conn.encoding);
        let mut params = json!({
            "textDocument": { "uri": uri },
            "position": lsp_pos,
        });
        if let Some(context) = context {
            params["context"] = context;
        }

        let result = self.tracked_request(&conn, uri, version, index, method, params)?;
        Ok(NavigationTargets {
            locations: result.as_ref().map(locations_from_value).unwrap_or_default(),
            encoding: conn.encoding,
            content_modified: result.is_none(),
        })
    }

    /// A document-scoped request. `None` means the server answered `ContentModified`.
    ///
    /// Below `max_sync_failures` consecutive `ContentModified` replies the request yields an empty
    /// result. At the limit the document is resynced and the request retried once.
    fn tracked_request(
        &self,
        conn: &Connected,
        uri: &str,
        version: u64,
        index: &LineIndex,
        method: &str,
        params: Value,
    ) -> Result<Option<Value>, LspError> {
        let timeout = self.options.request_timeout;
        let err = match conn.client.request(method, params.clone(), timeout) {
            Ok(result) => return Ok(Some(result)),
            Err(err) if err.is_content_modified() => err,
            Err(err) => return Err(err),
        };

        let max = self.options.max_sync_failures.max(1);
        if self.count_content_modified(conn, uri) < max {
            warn!(uri, method, error = %err, "content modified; returning an empty result");
            return Ok(None);
        }

        warn!(uri, method, "content modified repeatedly; resyncing and retrying");
        self.resync(conn, uri, version, index)?;
        match conn.client.request(method, params, timeout) {
            Ok(result) => Ok(Some(result)),
            Err(err) if err.is_content_modified() => {
                self.count_content_modified(conn, uri);
                warn!(uri, method, "content modified after resync; returning an empty result");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Record one `ContentModified` reply; returns the consecutive count.
    fn count_content_modified(&self, conn: &Connected, uri: &str) -> u32 {
        let mut docs = conn.documents.lock();
        match docs.get_mut(uri) {
            Some(doc) => {
                doc.failures += 1;
                doc.failures
            }
            None => 0,
        }
    }

    fn update_document(&self, conn: &Connected, uri: &str, f: impl FnOnce(&mut SyncedDocument)) {
        if let Some(doc) = conn.documents.lock().get_mut(uri) {
            f(doc);
        }
    }
}

impl Drop for LanguageServerSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn folder_name(root: &std::path::Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CONTENT_MODIFIED;
    use crate::fake_server::FakeLanguageServer;
    use ide_core::{Edit, PositionPolicy, TextModel, TextRange};
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    const URI: &str = "file:///w/a.py";

    fn session(server: &FakeLanguageServer) -> LanguageServerSession {
        let mut options = SessionOptions::new("python", "/w");
        options.request_timeout = Duration::from_millis(200);
        LanguageServerSession::new(options, Arc::new(server.clone()))
    }

    fn edit(model: &mut TextModel, edits: &[Edit]) -> (LineIndex, TextDelta) {
        let before = model.snapshot();
        model.apply_edits(edits, PositionPolicy::Strict).unwrap();
        (before, model.take_last_delta().unwrap())
    }

    fn wait_until_stopped(session: &LanguageServerSession) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn server_starts_on_first_use() {
        let server = FakeLanguageServer::new();
        let session = session(&server);
        assert_eq!(server.connect_count(), 0);

        session.did_open(URI, 0, &LineIndex::from_text("x = 1\n")).unwrap();
        assert_eq!(server.connect_count(), 1);

        let init = server.wait_for("initialize", 1);
        assert_eq!(
            init[0]["capabilities"]["general"]["positionEncodings"],
            json!(["utf-32", "utf-16"])
        );
        assert_eq!(init[0]["rootUri"], "file:///w");

        let opened = server.wait_for("textDocument/didOpen", 1);
        assert_eq!(opened[0]["textDocument"]["version"], 0);
        assert_eq!(opened[0]["textDocument"]["languageId"], "python");
        assert_eq!(opened[0]["textDocument"]["text"], "x = 1\n");
        assert!(session.is_synced(URI));
    }

    #[test]
    fn changes_carry_only_edited_ranges_in_server_units() {
        let server = FakeLanguageServer::new();
        let session = session(&server);
        let mut model = TextModel::new("s = \"🌍\"\nt = 1\n");
        session.did_open(URI, 0, model.index()).unwrap();

        let (before, delta) = edit(
            &mut model,
            &[
                Edit::new(
                    TextRange::new(Position::new(0, 6), Position::new(0, 6)),
                    "!",
                ),
                Edit::new(TextRange::new(Position::new(1, 4), Position::new(1, 5)), "2"),
            ],
        );
        session.did_change(URI, &before, &delta, model.index()).unwrap();

        let changes = server.wait_for("textDocument/didChange", 1);
        assert_eq!(changes[0]["textDocument"]["version"], 1);
        assert_eq!(
            changes[0]["contentChanges"],
            json!([
                { "range": { "start": { "line": 1, "character": 4 }, "end": { "line": 1, "character": 5 } }, "text": "2" },
                { "range": { "start": { "line": 0, "character": 7 }, "end": { "line": 0, "character": 7 } }, "text": "!" },
            ])
        );
    }

    #[test]
    fn undo_keeps_wire_versions_increasing() {
        let server = FakeLanguageServer::new();
        let session = session(&server);
        let mut model = TextModel::new("");
        session.did_open(URI, 0, model.index()).unwrap();

        let (before, delta) = edit(&mut model, &[Edit::insert(Position::new(0, 0), "a")]);
        session.did_change(URI, &before, &delta, model.index()).unwrap();

        let before = model.snapshot();
        assert!(model.undo());
        let delta = model.take_last_delta().unwrap();
        assert_eq!(delta.version_after, 0);
        session.did_change(URI, &before, &delta, model.index()).unwrap();

        let versions: Vec<Value> = server
            .wait_for("textDocument/didChange", 2)
            .iter()
            .map(|params| params["textDocument"]["version"].clone())
            .collect();
        assert_eq!(versions, vec![json!(1), json!(2)]);
    }

    #[test]
    fn version_gap_triggers_full_resync() {
        let server = FakeLanguageServer::new();
        let session = session(&server);
        let mut model = TextModel::new("a\n");
        session.did_open(URI, 0, model.index()).unwrap();

        // First delta never reaches the session.
        edit(&mut model, &[Edit::insert(Position::new(0, 1), "b")]);
        let (before, delta) = edit(&mut model, &[Edit::insert(Position::new(0, 2), "c")]);
        session.did_change(URI, &before, &delta, model.index()).unwrap();

        let closed = server.wait_for("textDocument/didClose", 1);
        assert_eq!(closed.len(), 1);
        let opened = server.wait_for("textDocument/didOpen", 2);
        assert_eq!(opened[1]["textDocument"]["text"], "abc\n");
        assert_eq!(opened[1]["textDocument"]["version"], 1);
        assert!(server.messages("textDocument/didChange").is_empty());
    }

    #[test]
    fn dead_server_is_restarted_and_documents_reopened() {
        let server = FakeLanguageServer::new();
        let session = session(&server);
        let mut model = TextModel::new("a\n");
        session.did_open(URI, 0, model.index()).unwrap();
        server.wait_for("textDocument/didOpen", 1);

        server.crash();
        wait_until_stopped(&session);
        assert!(!session.is_running());

        let (before, delta) = edit(&mut model, &[Edit::insert(Position::new(0, 1), "b")]);
        session.did_change(URI, &before, &delta, model.index()).unwrap();

        assert_eq!(server.connect_count(), 2);
        let opened = server.wait_for("textDocument/didOpen", 2);
        assert_eq!(opened.len(), 2);
        assert_eq!(opened.last().unwrap()["textDocument"]["text"], "ab\n");
    }

    #[test]
    fn content_modified_is_an_empty_answer_until_the_resync_limit() {
        let server = FakeLanguageServer::new();
        let session = session(&server);
        let index = LineIndex::from_text("foo()\n");
        session.did_open(URI, 0, &index).unwrap();
        server.fail("textDocument/definition", CONTENT_MODIFIED, "content modified");

        let first = session.definition(URI, 0, &index, Position::new(0, 1)).unwrap();
        assert!(first.content_modified);
        assert!(first.locations.is_empty());
        assert!(server.messages("textDocument/didClose").is_empty());

        // Second consecutive failure: resync, retry once, still modified.
        let second = session.definition(URI, 0, &index, Position::new(0, 1)).unwrap();
        assert!(second.content_modified);
        assert_eq!(server.wait_for("textDocument/didClose", 1).len(), 1);
        let opened = server.wait_for("textDocument/didOpen", 2);
        assert_eq!(opened.len(), 2);
        assert_eq!(opened[1]["textDocument"]["version"], 1);
        assert_eq!(server.messages("textDocument/definition").len(), 3);
    }

    #[test]
    fn request_is_retried_once_after_resync() {
        let server = FakeLanguageServer::new();
        server.respond(
            "textDocument/definition",
            json!([{
                "uri": URI,
                "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 3 } }
            }]),
        );
        server.fail_times("textDocument/definition", CONTENT_MODIFIED, "content modified", 2);
        let session = session(&server);
        let index = LineIndex::from_text("foo()\n");
        session.did_open(URI, 0, &index).unwrap();

        let first = session.definition(URI, 0, &index, Position::new(0, 1)).unwrap();
        assert!(first.locations.is_empty());

        let second = session.definition(URI, 0, &index, Position::new(0, 1)).unwrap();
        assert!(!second.content_modified);
        assert_eq!(second.locations.len(), 1);
        assert_eq!(server.messages("textDocument/didOpen").len(), 2);
        assert_eq!(server.messages("textDocument/definition").len(), 3);
    }

    #[test]
    fn concurrent_readers_resync_once_per_version() {
        let server = FakeLanguageServer::new();
        let session = Arc::new(session(&server));
        let mut model = TextModel::new("a\n");
        session.did_open(URI, 0, model.index()).unwrap();
        // The session never sees this edit, so every reader finds it one version behind.
        edit(&mut model, &[Edit::insert(Position::new(0, 1), "b")]);
        let index = Arc::new(model.snapshot());

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    session.definition(URI, 1, &index, Position::new(0, 0)).unwrap();
                })
            })
            .collect();
        for reader in readers {
            reader.join().unwrap();
        }

        server.wait_for("textDocument/definition", 8);
        let methods: Vec<String> = server
            .received()
            .iter()
            .filter_map(|msg| msg.get("method").and_then(Value::as_str))
            .filter(|method| method.starts_with("textDocument/did"))
            .map(str::to_string)
            .collect();
        assert_eq!(
            methods,
            vec![
                "textDocument/didOpen".to_string(),
                "textDocument/didClose".to_string(),
                "textDocument/didOpen".to_string(),
            ]
        );
    }

    #[test]
    fn unanswered_request_times_out() {
        let server = FakeLanguageServer::new();
        server.stay_silent("textDocument/references");
        let session = session(&server);
        let index = LineIndex::from_text("foo\n");

        let err = session
            .references(URI, 0, &index, Position::new(0, 0))
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(session.is_running());
    }

    #[test]
    fn published_diagnostics_are_converted_on_read() {
        let server = FakeLanguageServer::new();
        let session = session(&server);
        let index = LineIndex::from_text("x = 🌍 + y\n");
        session.did_open(URI, 0, &index).unwrap();

        assert!(server.notify(
            "textDocument/publishDiagnostics",
            json!({
                "uri": URI,
                "diagnostics": [{
                    "range": { "start": { "line": 0, "character": 9 }, "end": { "line": 0, "character": 10 } },
                    "severity": 1,
                    "message": "undefined name 'y'"
                }]
            })
        ));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut diagnostics = Vec::new();
        while diagnostics.is_empty() && Instant::now() < deadline {
            diagnostics = session.diagnostics(URI, &index);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].start, Position::new(0, 8));

        session.did_close(URI).unwrap();
        assert!(session.diagnostics(URI, &index).is_empty());
    }

    #[test]
    fn close_without_server_is_a_no_op() {
        let server = FakeLanguageServer::new();
        let session = session(&server);
        session.did_close(URI).unwrap();
        assert_eq!(server.connect_count(), 0);
    }
}
