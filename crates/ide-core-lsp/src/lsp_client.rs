//! Minimal JSON-RPC/LSP client.
//!
//! The client is runtime-agnostic: plain threads and `std::sync::mpsc` channels. A router thread
//! owns the inbound side of the connection and
//!
//! - hands each response to the caller waiting on its id, so requests issued concurrently from
//!   several threads never consume each other's replies,
//! - answers common server->client requests with safe headless defaults,
//! - forwards notifications (e.g. `textDocument/publishDiagnostics`) to a callback.
//!
//! A connection is either a spawned server process ([`LspConnection::spawn`]) or an in-memory
//! channel pair ([`LspConnection::in_memory`]) for embedding and tests.

use crate::error::LspError;
use crate::lsp_transport::{read_message, write_message};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Messages arriving from the server side of a connection.
#[derive(Debug)]
pub enum LspInbound {
    /// A raw JSON-RPC message.
    Message(Value),
    /// The connection failed; no further messages will arrive.
    IoError(String),
}

/// Callback receiving server notifications as `(method, params)`.
pub type NotificationHandler = Box<dyn Fn(&str, &Value) + Send + Sync>;

/// A bidirectional message stream to a language server.
pub struct LspConnection {
    outbound: mpsc::Sender<Value>,
    inbound: mpsc::Receiver<LspInbound>,
    child: Option<Child>,
}

/// The server's side of an in-memory connection.
pub struct LspServerEnd {
    /// Messages sent by the client.
    pub incoming: mpsc::Receiver<Value>,
    /// Messages to deliver to the client.
    pub outgoing: mpsc::Sender<LspInbound>,
}

impl LspServerEnd {
    /// Deliver a message to the client. Returns `false` once the client is gone.
    pub fn send(&self, value: Value) -> bool {
        self.outgoing.send(LspInbound::Message(value)).is_ok()
    }
}

impl LspConnection {
    /// Spawn a server process and connect to its stdio.
    ///
    /// `stdin`/`stdout` are overridden to be piped; `stderr` lines are logged at debug level.
    pub fn spawn(mut cmd: Command) -> Result<Self, LspError> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let child = cmd.spawn().map_err(|source| LspError::Spawn {
            command: program,
            source,
        })?;
        Self::from_child(child)
    }

    /// Connect to an already-spawned process.
    pub fn from_child(mut child: Child) -> Result<Self, LspError> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::Closed("server stdin is not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::Closed("server stdout is not piped".to_string()))?;

        let (tx_out, rx_out) = mpsc::channel::<Value>();
        let (tx_in, rx_in) = mpsc::channel::<LspInbound>();

        {
            let tx_in = tx_in.clone();
            thread::spawn(move || write_loop(stdin, rx_out, tx_in));
        }
        thread::spawn(move || read_loop(stdout, tx_in));
        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || stderr_loop(stderr));
        }

        Ok(Self {
            outbound: tx_out,
            inbound: rx_in,
            child: Some(child),
        })
    }

    /// An in-process connection; the returned [`LspServerEnd`] plays the server.
    pub fn in_memory() -> (Self, LspServerEnd) {
        let (tx_out, rx_out) = mpsc::channel::<Value>();
        let (tx_in, rx_in) = mpsc::channel::<LspInbound>();
        (
            Self {
                outbound: tx_out,
                inbound: rx_in,
                child: None,
            },
            LspServerEnd {
                incoming: rx_out,
                outgoing: tx_in,
            },
        )
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, mpsc::Sender<Value>>>>;

/// A JSON-RPC client bound to one connection.
pub struct LspClient {
    outbound: mpsc::Sender<Value>,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    child: Mutex<Option<Child>>,
}

impl LspClient {
    /// Start routing a connection.
    pub fn start(
        connection: LspConnection,
        workspace_folders: Vec<Value>,
        on_notification: NotificationHandler,
    ) -> Self {
        let LspConnection {
            outbound,
            inbound,
            child,
        } = connection;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        {
            let router = Router {
                outbound: outbound.clone(),
                pending: Arc::clone(&pending),
                alive: Arc::clone(&alive),
                workspace_folders,
                on_notification,
            };
            thread::spawn(move || router.run(inbound));
        }

        Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            child: Mutex::new(child),
        }
    }

    /// `false` once the connection has failed or closed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Send a notification.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), LspError> {
        trace!(method, "lsp notify");
        self.send(json!({ "jsonrpc": "2.0", "method": method, "params": params }))
    }

    /// Send a request and block until its response arrives or `timeout` expires.
    ///
    /// Returns the `result` member. A JSON-RPC error becomes [`LspError::Response`]. On timeout a
    /// `$/cancelRequest` is sent and a late response is discarded.
    pub fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, LspError> {
        if !self.is_alive() {
            return Err(LspError::Closed("connection is not running".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        self.pending.lock().insert(id, tx);

        debug!(id, method, "lsp request");
        let message = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if let Err(err) = self.send(message) {
            self.pending.lock().remove(&id);
            return Err(err);
        }

        match rx.recv_timeout(timeout) {
            Ok(response) => response_result(method, response),
            Err(RecvTimeoutError::Timeout) => {
                self.pending.lock().remove(&id);
                warn!(id, method, ?timeout, "lsp request timed out");
                let _ = self.notify("$/cancelRequest", json!({ "id": id }));
                Err(LspError::Timeout {
                    method: method.to_string(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(LspError::Closed(format!(
                "connection dropped while waiting for `{method}`"
            ))),
        }
    }

    /// Polite `shutdown` + `exit`, then make sure the process is gone.
    pub fn shutdown(&self, timeout: Duration) {
        if self.is_alive() {
            if let Err(err) = self.request("shutdown", Value::Null, timeout) {
                debug!(error = %err, "lsp shutdown request failed");
            }
            let _ = self.notify("exit", Value::Null);
        }
        self.reap();
    }

    fn reap(&self) {
        if let Some(mut child) = self.child.lock().take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }

    fn send(&self, message: Value) -> Result<(), LspError> {
        self.outbound
            .send(message)
            .map_err(|_| LspError::Closed("writer stopped".to_string()))
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        self.reap();
    }
}

fn response_result(method: &str, response: Value) -> Result<Value, LspError> {
    if let Some(error) = response.get("error") {
        return Err(LspError::Response {
            method: method.to_string(),
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}

struct Router {
    outbound: mpsc::Sender<Value>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    workspace_folders: Vec<Value>,
    on_notification: NotificationHandler,
}

impl Router {
    fn run(self, inbound: mpsc::Receiver<LspInbound>) {
        for message in inbound {
            match message {
                LspInbound::Message(value) => self.dispatch(value),
                LspInbound::IoError(err) => {
                    warn!(error = %err, "language server connection failed");
                    break;
                }
            }
        }

        self.alive.store(false, Ordering::Release);
        // Dropping the waiters' senders wakes them with `Disconnected`.
        self.pending.lock().clear();
    }

    fn dispatch(&self, value: Value) {
        let method = value.get("method").and_then(Value::as_str);
        match (method, value.get("id")) {
            (Some(method), Some(id)) => {
                let result = server_request_reply(method, &value, &self.workspace_folders);
                debug!(method, "answering server request");
                let reply = json!({ "jsonrpc": "2.0", "id": id, "result": result });
                let _ = self.outbound.send(reply);
            }
            (Some(method), None) => {
                let params = value.get("params").unwrap_or(&Value::Null);
                (self.on_notification)(method, params);
            }
            (None, Some(id)) => {
                let waiter = id.as_u64().and_then(|id| self.pending.lock().remove(&id));
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(value);
                    }
                    None => trace!(%id, "dropping response without a waiter"),
                }
            }
            (None, None) => trace!("ignoring malformed message"),
        }
    }
}

/// Safe defaults for server->client requests a headless client cannot act on.
fn server_request_reply(method: &str, msg: &Value, workspace_folders: &[Value]) -> Value {
    match method {
        "workspace/configuration" => {
            let items = msg
                .get("params")
                .and_then(|p| p.get("items"))
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            Value::Array(std::iter::repeat_n(Value::Null, items).collect())
        }
        "workspace/workspaceFolders" => Value::Array(workspace_folders.to_vec()),
        "workspace/applyEdit" => json!({
            "applied": false,
            "failureReason": "edits must be submitted through the workspace",
        }),
        _ => Value::Null,
    }
}

fn write_loop(stdin: ChildStdin, rx: mpsc::Receiver<Value>, tx_in: mpsc::Sender<LspInbound>) {
    let mut writer = BufWriter::new(stdin);
    for value in rx {
        if let Err(err) = write_message(&mut writer, &value) {
            let _ = tx_in.send(LspInbound::IoError(err.to_string()));
            break;
        }
    }
}

fn read_loop(stdout: ChildStdout, tx: mpsc::Sender<LspInbound>) {
    let mut reader = BufReader::new(stdout);
    loop {
        match read_message(&mut reader) {
            Ok(Some(value)) => {
                if tx.send(LspInbound::Message(value)).is_err() {
                    break;
                }
            }
            Ok(None) => {
                let _ = tx.send(LspInbound::IoError("server closed stdout".to_string()));
                break;
            }
            Err(err) => {
                let _ = tx.send(LspInbound::IoError(err.to_string()));
                break;
            }
        }
    }
}

fn stderr_loop(stderr: ChildStderr) {
    for line in BufReader::new(stderr).lines() {
        match line {
            Ok(line) => debug!(target: "ide_core_lsp::server_stderr", "{line}"),
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn echo_server(server: LspServerEnd) {
        thread::spawn(move || {
            for msg in server.incoming.iter() {
                let Some(id) = msg.get("id").cloned() else {
                    continue;
                };
                if msg.get("method").is_none() {
                    continue;
                }
                let reply = match msg["method"].as_str() {
                    Some("fail") => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32801, "message": "modified"}}),
                    Some("slow") => continue,
                    _ => json!({"jsonrpc": "2.0", "id": id, "result": msg["params"].clone()}),
                };
                if !server.send(reply) {
                    break;
                }
            }
        });
    }

    #[test]
    fn request_returns_matching_result() {
        let (conn, server) = LspConnection::in_memory();
        echo_server(server);
        let client = LspClient::start(conn, Vec::new(), Box::new(|_, _| {}));

        let result = client
            .request("echo", json!({"n": 1}), Duration::from_secs(5))
            .unwrap();
        assert_eq!(result, json!({"n": 1}));
    }

    #[test]
    fn concurrent_requests_get_their_own_replies() {
        let (conn, server) = LspConnection::in_memory();
        echo_server(server);
        let client = Arc::new(LspClient::start(conn, Vec::new(), Box::new(|_, _| {})));

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let client = Arc::clone(&client);
                thread::spawn(move || {
                    client
                        .request("echo", json!(n), Duration::from_secs(5))
                        .unwrap()
                })
            })
            .collect();
        for (n, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), json!(n));
        }
    }

    #[test]
    fn error_response_and_timeout_are_distinguished() {
        let (conn, server) = LspConnection::in_memory();
        echo_server(server);
        let client = LspClient::start(conn, Vec::new(), Box::new(|_, _| {}));

        let err = client
            .request("fail", Value::Null, Duration::from_secs(5))
            .unwrap_err();
        assert!(err.is_content_modified());

        let err = client
            .request("slow", Value::Null, Duration::from_millis(20))
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn server_requests_are_answered_and_notifications_forwarded() {
        let (conn, server) = LspConnection::in_memory();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let _client = LspClient::start(
            conn,
            vec![json!({"uri": "file:///w", "name": "w"})],
            Box::new(move |method, _| {
                if method == "window/logMessage" {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        server.send(json!({"jsonrpc": "2.0", "id": "cfg", "method": "workspace/configuration", "params": {"items": [{}, {}]}}));
        let reply = server
            .incoming
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(reply["id"], "cfg");
        assert_eq!(reply["result"], json!([null, null]));

        server.send(json!({"jsonrpc": "2.0", "method": "window/logMessage", "params": {"type": 3, "message": "hi"}}));
        server.send(json!({"jsonrpc": "2.0", "id": 9, "method": "workspace/workspaceFolders"}));
        let reply = server
            .incoming
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(reply["result"][0]["name"], "w");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_connection_fails_fast() {
        let (conn, server) = LspConnection::in_memory();
        let client = LspClient::start(conn, Vec::new(), Box::new(|_, _| {}));
        server
            .outgoing
            .send(LspInbound::IoError("gone".to_string()))
            .unwrap();
        drop(server);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while client.is_alive() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!client.is_alive());
        assert!(matches!(
            client.request("echo", Value::Null, Duration::from_secs(1)),
            Err(LspError::Closed(_))
        ));
    }
}
