//! In-process language server for tests.
//!
//! [`FakeLanguageServer`] implements [`LspConnector`] over [`LspConnection::in_memory`]. It answers
//! `initialize` with configurable capabilities, replies to other requests from a table, and keeps
//! every message it receives so tests can assert on the traffic.

use crate::error::LspError;
use crate::lsp_client::{LspConnection, LspInbound, LspServerEnd};
use crate::session::LspConnector;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

struct FakeState {
    capabilities: Value,
    results: HashMap<String, Value>,
    errors: HashMap<String, ScriptedError>,
    silent: HashSet<String>,
    received: Vec<Value>,
    generation: usize,
    connects: usize,
    outgoing: Option<mpsc::Sender<LspInbound>>,
}

struct ScriptedError {
    code: i64,
    message: String,
    /// Replies left before `method` answers normally again; `None` fails forever.
    remaining: Option<usize>,
}

/// A scripted language server.
#[derive(Clone)]
pub struct FakeLanguageServer {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeLanguageServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLanguageServer {
    /// UTF-16 positions, incremental sync.
    pub fn new() -> Self {
        Self::with_capabilities(json!({
            "positionEncoding": "utf-16",
            "textDocumentSync": { "openClose": true, "change": 2, "save": true },
        }))
    }

    /// Answer `initialize` with `capabilities`.
    pub fn with_capabilities(capabilities: Value) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                capabilities,
                results: HashMap::new(),
                errors: HashMap::new(),
                silent: HashSet::new(),
                received: Vec::new(),
                generation: 0,
                connects: 0,
                outgoing: None,
            })),
        }
    }

    /// Reply to `method` with `result`.
    pub fn respond(&self, method: &str, result: Value) {
        let mut state = self.state.lock();
        state.errors.remove(method);
        state.silent.remove(method);
        state.results.insert(method.to_string(), result);
    }

    /// Reply to `method` with a JSON-RPC error.
    pub fn fail(&self, method: &str, code: i64, message: &str) {
        self.script_error(method, code, message, None);
    }

    /// Reply to the next `times` requests for `method` with a JSON-RPC error.
    pub fn fail_times(&self, method: &str, code: i64, message: &str, times: usize) {
        if times == 0 {
            self.state.lock().errors.remove(method);
            return;
        }
        self.script_error(method, code, message, Some(times));
    }

    fn script_error(&self, method: &str, code: i64, message: &str, remaining: Option<usize>) {
        let mut state = self.state.lock();
        state.silent.remove(method);
        state.errors.insert(
            method.to_string(),
            ScriptedError {
                code,
                message: message.to_string(),
                remaining,
            },
        );
    }

    /// Never reply to `method`.
    pub fn stay_silent(&self, method: &str) {
        self.state.lock().silent.insert(method.to_string());
    }

    /// Number of connections made so far.
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    /// Every message received, in order.
    pub fn received(&self) -> Vec<Value> {
        self.state.lock().received.clone()
    }

    /// Params of every received message with `method`.
    pub fn messages(&self, method: &str) -> Vec<Value> {
        self.state
            .lock()
            .received
            .iter()
            .filter(|msg| msg.get("method").and_then(Value::as_str) == Some(method))
            .map(|msg| msg.get("params").cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Wait until at least `count` messages with `method` arrived, then return all of them.
    pub fn wait_for(&self, method: &str, count: usize) -> Vec<Value> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let messages = self.messages(method);
            if messages.len() >= count || Instant::now() >= deadline {
                return messages;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Send a notification to the client.
    pub fn notify(&self, method: &str, params: Value) -> bool {
        let state = self.state.lock();
        state.outgoing.as_ref().is_some_and(|tx| {
            tx.send(LspInbound::Message(
                json!({ "jsonrpc": "2.0", "method": method, "params": params }),
            ))
            .is_ok()
        })
    }

    /// Break the current connection as if the process died.
    pub fn crash(&self) {
        let mut state = self.state.lock();
        if let Some(tx) = state.outgoing.take() {
            let _ = tx.send(LspInbound::IoError("server crashed".to_string()));
        }
        state.generation += 1;
    }

    fn serve(&self, server: LspServerEnd, generation: usize) {
        for msg in server.incoming.iter() {
            let reply = {
                let mut state = self.state.lock();
                if state.generation != generation {
                    break;
                }
                state.received.push(msg.clone());
                reply_for(&mut state, &msg)
            };
            if msg.get("method").and_then(Value::as_str) == Some("exit") {
                break;
            }
            if let Some(reply) = reply
                && !server.send(reply)
            {
                break;
            }
        }
    }
}

fn reply_for(state: &mut FakeState, msg: &Value) -> Option<Value> {
    let id = msg.get("id")?.clone();
    let method = msg.get("method")?.as_str()?;
    if state.silent.contains(method) {
        return None;
    }
    if let Some(scripted) = state.errors.get_mut(method) {
        let reply = json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": scripted.code, "message": scripted.message },
        });
        let exhausted = scripted.remaining.as_mut().is_some_and(|n| {
            *n = n.saturating_sub(1);
            *n == 0
        });
        if exhausted {
            state.errors.remove(method);
        }
        return Some(reply);
    }
    let result = match method {
        "initialize" => json!({ "capabilities": state.capabilities }),
        _ => state.results.get(method).cloned().unwrap_or(Value::Null),
    };
    Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

impl LspConnector for FakeLanguageServer {
    fn connect(&self) -> Result<LspConnection, LspError> {
        let (conn, server) = LspConnection::in_memory();
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.connects += 1;
            state.outgoing = Some(server.outgoing.clone());
            state.generation
        };
        let this = self.clone();
        thread::spawn(move || this.serve(server, generation));
        Ok(conn)
    }
}
