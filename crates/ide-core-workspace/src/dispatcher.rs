//! Action dispatch and the response envelope.

use crate::action::{Action, ActionRequest, ActionSpec, ActionTable, ActionTableError};
use crate::error::WorkspaceError;
use crate::render::format_diagnostics;
use crate::workspace::Workspace;
use ide_core::Diagnostic;
use ide_core_terminal::{CommandHandle, CommandRequest, Terminal};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Coarse outcome of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The action completed.
    Ok,
    /// A bounded wait expired; the observation holds what was available.
    Timeout,
    /// The action failed; see `info.error`.
    Error,
}

/// Structured failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    /// Stable code, see [`WorkspaceError::kind`].
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

/// Metadata accompanying an observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Info {
    /// The requested `action_name`.
    pub action: String,
    /// Set when `status` is `error` (or `timeout` caused by an error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Non-fatal problem, such as a language server that could not be updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// The uniform response to every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Resulting state.
    pub observation: Value,
    /// Outcome.
    pub status: Status,
    /// The episode is over.
    pub done: bool,
    /// Part of the observation was cut.
    pub truncated: bool,
    /// Metadata and errors.
    pub info: Info,
}

impl Envelope {
    fn failure(action: &str, err: &WorkspaceError) -> Self {
        let kind = err.kind();
        Self {
            observation: json!({}),
            status: if kind == "language_server_timeout" {
                Status::Timeout
            } else {
                Status::Error
            },
            done: false,
            truncated: false,
            info: Info {
                action: action.to_string(),
                error: Some(ErrorInfo {
                    kind: kind.to_string(),
                    message: err.to_string(),
                }),
                warning: None,
            },
        }
    }
}

#[derive(Default)]
struct Executed {
    observation: Value,
    timed_out: bool,
    truncated: bool,
    warning: Option<String>,
    done: bool,
}

impl Executed {
    fn of<T: Serialize>(value: &T) -> Result<Self, WorkspaceError> {
        let observation = serde_json::to_value(value)
            .map_err(|err| WorkspaceError::Validation(format!("unserializable result: {err}")))?;
        Ok(Self {
            observation,
            ..Self::default()
        })
    }

    fn truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    fn timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    fn warning(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }

    /// Adds `diagnostics_text`, one diagnostic per line, next to the structured list.
    fn diagnostics(mut self, diagnostics: &[Diagnostic]) -> Self {
        if !diagnostics.is_empty()
            && let Some(map) = self.observation.as_object_mut()
        {
            map.insert(
                "diagnostics_text".to_string(),
                Value::String(format_diagnostics(diagnostics)),
            );
        }
        self
    }
}

/// Routes validated actions to the workspace or the terminal.
pub struct ActionDispatcher {
    workspace: Arc<Workspace>,
    terminal: Arc<dyn Terminal>,
    table: ActionTable,
}

impl ActionDispatcher {
    /// Dispatcher over the built-in action table.
    pub fn new(
        workspace: Arc<Workspace>,
        terminal: Arc<dyn Terminal>,
    ) -> Result<Self, ActionTableError> {
        Ok(Self {
            workspace,
            terminal,
            table: ActionTable::new()?,
        })
    }

    /// The workspace actions run against.
    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    /// Every supported action.
    pub fn schema(&self) -> &'static [ActionSpec] {
        self.table.specs()
    }

    /// Handle one line of JSON text.
    pub fn dispatch_line(&self, line: &str) -> Envelope {
        match serde_json::from_str::<Value>(line) {
            Ok(request) => self.dispatch_value(request),
            Err(err) => Envelope::failure(
                "",
                &WorkspaceError::Validation(format!("request is not valid JSON: {err}")),
            ),
        }
    }

    /// Handle a raw JSON request.
    pub fn dispatch_value(&self, request: Value) -> Envelope {
        match serde_json::from_value::<ActionRequest>(request) {
            Ok(request) => self.dispatch(&request),
            Err(err) => Envelope::failure(
                "",
                &WorkspaceError::Validation(format!("malformed request: {err}")),
            ),
        }
    }

    /// Validate, execute and package one request.
    pub fn dispatch(&self, request: &ActionRequest) -> Envelope {
        let name = request.action_name.as_str();
        let action = match self.table.resolve(request) {
            Ok(action) => action,
            Err(err) => {
                warn!(category = %request.category, action = name, error = %err, "rejected request");
                return Envelope::failure(name, &err);
            }
        };

        debug!(category = %action.category(), action = name, "dispatching");
        match self.execute(action) {
            Ok(executed) => Envelope {
                observation: executed.observation,
                status: if executed.timed_out {
                    Status::Timeout
                } else {
                    Status::Ok
                },
                done: executed.done,
                truncated: executed.truncated,
                info: Info {
                    action: name.to_string(),
                    error: None,
                    warning: executed.warning,
                },
            },
            Err(err) => {
                warn!(action = name, kind = err.kind(), error = %err, "action failed");
                Envelope::failure(name, &err)
            }
        }
    }

    fn execute(&self, action: Action) -> Result<Executed, WorkspaceError> {
        let ws = &self.workspace;
        match action {
            Action::OpenFile(args) => {
                let outcome = ws.open_file_view(&args.uri)?;
                Ok(Executed::of(&outcome)?.truncated(outcome.view.truncated))
            }
            Action::CloseFile(args) => Executed::of(&ws.close_file(&args.uri)?),
            Action::EditFile(args) => {
                let outcome = ws.edit_file(&args.uri, &args.edits)?;
                Ok(Executed::of(&outcome)?
                    .truncated(outcome.view.truncated)
                    .warning(outcome.sync_error.clone())
                    .diagnostics(&outcome.diagnostics))
            }
            Action::SaveFile(args) => {
                let outcome = ws.save_file(&args.uri)?;
                Ok(Executed::of(&outcome)?.diagnostics(&outcome.diagnostics))
            }
            Action::SearchFiles(args) => {
                let found = ws.search_files(&args.pattern, args.path.as_deref())?;
                Ok(Executed::of(&found)?.truncated(found.truncated))
            }
            Action::GotoDefinition(args) => {
                let outcome = ws.goto_definition(&args.uri, args.position)?;
                Ok(Executed::of(&outcome)?
                    .timed_out(outcome.timed_out)
                    .warning(outcome.warning.clone()))
            }
            Action::FindReferences(args) => {
                let outcome = ws.find_references(&args.uri, args.position)?;
                Ok(Executed::of(&outcome)?
                    .timed_out(outcome.timed_out)
                    .warning(outcome.warning.clone()))
            }
            Action::ListDirectory(args) => {
                let listing = ws.list_directory(args.path.as_deref(), args.depth)?;
                Ok(Executed::of(&json!({
                    "path": listing.path,
                    "tree": listing.render(),
                    "entries": listing.entries,
                }))?)
            }
            Action::ReadFile(args) => {
                let outcome = ws.read_file(&args.uri, args.lines(), args.line_numbers)?;
                Ok(Executed::of(&outcome)?.truncated(outcome.view.truncated))
            }
            Action::CreateFile(args) => {
                let outcome = ws.create_file(&args.uri, &args.text, args.overwrite)?;
                Ok(Executed::of(&outcome)?.truncated(outcome.view.truncated))
            }
            Action::FindInFile(args) => {
                Executed::of(&ws.find_in_file(&args.uri, &args.query, args.options)?)
            }
            Action::ReplaceInFile(args) => {
                let outcome =
                    ws.replace_in_file(&args.uri, &args.query, &args.replacement, args.options)?;
                let edit = outcome.edit.as_ref();
                Ok(Executed::of(&outcome)?
                    .truncated(edit.is_some_and(|e| e.view.truncated))
                    .warning(edit.and_then(|e| e.sync_error.clone())))
            }
            Action::FindInPath(args) => {
                let outcome = ws.find_in_path(
                    args.path.as_deref(),
                    &args.query,
                    args.options,
                    args.search_scope.as_deref(),
                    args.limit,
                )?;
                Ok(Executed::of(&outcome)?.truncated(outcome.truncated))
            }
            Action::RenameFile(args) => {
                Executed::of(&ws.rename_file(&args.uri, &args.new_uri, args.overwrite)?)
            }
            Action::DeleteFile(args) => Executed::of(&ws.delete_file(&args.uri, args.recursive)?),
            Action::Undo(args) => {
                let outcome = ws.undo(&args.uri)?;
                Ok(Executed::of(&outcome)?
                    .truncated(outcome.view.as_ref().is_some_and(|v| v.truncated))
                    .warning(outcome.sync_error.clone())
                    .diagnostics(&outcome.diagnostics))
            }
            Action::Redo(args) => {
                let outcome = ws.redo(&args.uri)?;
                Ok(Executed::of(&outcome)?
                    .truncated(outcome.view.as_ref().is_some_and(|v| v.truncated))
                    .warning(outcome.sync_error.clone())
                    .diagnostics(&outcome.diagnostics))
            }
            Action::GetSymbols(args) => {
                let outcome = ws.get_symbols(&args.uri, args.kinds.as_deref())?;
                Ok(Executed::of(&outcome)?.timed_out(outcome.timed_out))
            }
            Action::FindSymbols(args) => {
                let outcome = ws.find_symbols(&args.query)?;
                Ok(Executed::of(&outcome)?.timed_out(outcome.timed_out))
            }
            Action::Finish => Ok(Executed {
                observation: json!({ "open_documents": ws.open_documents() }),
                done: true,
                ..Executed::default()
            }),
            Action::RunCommand(args) => {
                let mut request = CommandRequest::new(args.command);
                if let Some(secs) = args.timeout {
                    let timeout = Duration::try_from_secs_f64(secs)
                        .ok()
                        .filter(|t| !t.is_zero())
                        .ok_or_else(|| {
                            WorkspaceError::Validation(format!(
                                "timeout must be a positive number of seconds, got {secs}"
                            ))
                        })?;
                    request = request.with_timeout(timeout);
                }
                if args.run_in_background {
                    request = request.in_background();
                }
                let outcome = self.terminal.run_command(&request)?;
                Ok(Executed::of(&outcome)?
                    .truncated(outcome.truncated)
                    .timed_out(outcome.timed_out))
            }
            Action::PollCommand(args) => {
                let outcome = self.terminal.poll(CommandHandle(args.handle))?;
                Ok(Executed::of(&outcome)?
                    .truncated(outcome.truncated)
                    .timed_out(outcome.timed_out))
            }
        }
    }
}
