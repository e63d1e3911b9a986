//! Actions: the closed set of operations a caller can request, and the table that names them.
//!
//! A request names an action by `(category, action_name)` and carries its arguments as a JSON
//! object. The request is resolved through [`ActionTable`] into an [`Action`] before anything is
//! executed, so an unknown name or malformed arguments never reach the workspace.

use crate::error::WorkspaceError;
use ide_core::{Edit, Position, SearchOptions, SymbolKind, TextRange};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Which collaborator handles an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    /// Documents, files and symbols.
    Workspace,
    /// Command execution.
    Terminal,
}

impl ActionCategory {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "workspace" => Some(Self::Workspace),
            "terminal" => Some(Self::Terminal),
            _ => None,
        }
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Workspace => "workspace",
            Self::Terminal => "terminal",
        })
    }
}

/// A request as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// `workspace` or `terminal`.
    pub category: String,
    /// Operation name.
    pub action_name: String,
    /// Arguments; a missing or `null` value means no arguments.
    #[serde(default)]
    pub action_args: Value,
}

/// `{uri}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UriArgs {
    /// `file://` URI or root-relative path.
    pub uri: String,
}

/// `{uri, edits}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditArgs {
    /// Target document.
    pub uri: String,
    /// The batch, in pre-batch coordinates.
    pub edits: Vec<Edit>,
}

/// `{uri, position}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PositionArgs {
    /// Target document.
    pub uri: String,
    /// `[line, column]`, zero-based.
    pub position: Position,
}

/// `{pattern, path?}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchFilesArgs {
    /// Gitignore-style glob.
    pub pattern: String,
    /// Directory to search below.
    #[serde(default)]
    pub path: Option<String>,
}

/// `{path?, depth?}`
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListDirectoryArgs {
    /// Directory to list; the root by default.
    #[serde(default)]
    pub path: Option<String>,
    /// Levels to descend.
    #[serde(default)]
    pub depth: Option<usize>,
}

/// `{uri, start_line?, end_line?, line_numbers?}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadFileArgs {
    /// Target document.
    pub uri: String,
    /// First line to show.
    #[serde(default)]
    pub start_line: Option<usize>,
    /// Last line to show (inclusive).
    #[serde(default)]
    pub end_line: Option<usize>,
    /// Prefix lines with their numbers.
    #[serde(default = "default_true")]
    pub line_numbers: bool,
}

impl ReadFileArgs {
    /// The requested span, if any bound was given.
    pub fn lines(&self) -> Option<(usize, usize)> {
        match (self.start_line, self.end_line) {
            (None, None) => None,
            (start, end) => Some((start.unwrap_or(0), end.unwrap_or(usize::MAX))),
        }
    }
}

fn default_true() -> bool {
    true
}

/// `{uri, text?, overwrite?}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFileArgs {
    /// File to create.
    pub uri: String,
    /// Initial content.
    #[serde(default)]
    pub text: String,
    /// Replace an existing file.
    #[serde(default)]
    pub overwrite: bool,
}

/// `{uri, query, options?}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindInFileArgs {
    /// Target document.
    pub uri: String,
    /// Literal text or regex.
    pub query: String,
    /// Matching options.
    #[serde(default)]
    pub options: SearchOptions,
}

/// `{query, path?, options?, search_scope?, limit?}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindInPathArgs {
    /// Literal text or regex.
    pub query: String,
    /// File or directory to search; the root by default.
    #[serde(default)]
    pub path: Option<String>,
    /// Matching options.
    #[serde(default)]
    pub options: SearchOptions,
    /// Ranges a match must lie in; single files only.
    #[serde(default)]
    pub search_scope: Option<Vec<TextRange>>,
    /// Maximum number of matches.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `{uri, new_uri, overwrite?}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameFileArgs {
    /// File to move.
    pub uri: String,
    /// Destination.
    pub new_uri: String,
    /// Replace an existing destination.
    #[serde(default)]
    pub overwrite: bool,
}

/// `{uri, recursive?}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteFileArgs {
    /// File or directory to delete.
    pub uri: String,
    /// Required to delete a directory.
    #[serde(default)]
    pub recursive: bool,
}

/// `{uri, query, replacement, options?}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaceInFileArgs {
    /// Target document.
    pub uri: String,
    /// Literal text or regex.
    pub query: String,
    /// Literal replacement.
    pub replacement: String,
    /// Matching options.
    #[serde(default)]
    pub options: SearchOptions,
}

/// `{uri, kinds?}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetSymbolsArgs {
    /// Target document.
    pub uri: String,
    /// Only symbols of these kinds.
    #[serde(default)]
    pub kinds: Option<Vec<SymbolKind>>,
}

/// `{query}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryArgs {
    /// Symbol name or prefix.
    pub query: String,
}

/// `{command, timeout?, run_in_background?}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunCommandArgs {
    /// Shell command line.
    pub command: String,
    /// Timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
    /// Return a handle immediately.
    #[serde(default)]
    pub run_in_background: bool,
}

/// `{handle}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollCommandArgs {
    /// Handle returned by a background `run_command`.
    pub handle: u64,
}

/// A validated action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open a document (idempotent).
    OpenFile(UriArgs),
    /// Close a document, discarding its history.
    CloseFile(UriArgs),
    /// Apply an edit batch.
    EditFile(EditArgs),
    /// Persist a document.
    SaveFile(UriArgs),
    /// Find files by glob.
    SearchFiles(SearchFilesArgs),
    /// Definition of the symbol at a position.
    GotoDefinition(PositionArgs),
    /// References to the symbol at a position.
    FindReferences(PositionArgs),
    /// Directory tree.
    ListDirectory(ListDirectoryArgs),
    /// Read lines of a document.
    ReadFile(ReadFileArgs),
    /// Create a file and open it.
    CreateFile(CreateFileArgs),
    /// Search inside a document.
    FindInFile(FindInFileArgs),
    /// Replace matches inside a document.
    ReplaceInFile(ReplaceInFileArgs),
    /// Search a file or directory tree.
    FindInPath(FindInPathArgs),
    /// Move a file.
    RenameFile(RenameFileArgs),
    /// Delete a file or directory.
    DeleteFile(DeleteFileArgs),
    /// Undo the last batch.
    Undo(UriArgs),
    /// Redo the last undone batch.
    Redo(UriArgs),
    /// Symbol outline of a document.
    GetSymbols(GetSymbolsArgs),
    /// Workspace symbol search.
    FindSymbols(QueryArgs),
    /// End the episode.
    Finish,
    /// Run a shell command.
    RunCommand(RunCommandArgs),
    /// Progress of a background command.
    PollCommand(PollCommandArgs),
}

impl Action {
    /// The `action_name` this action is requested by.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenFile(_) => "open_file",
            Self::CloseFile(_) => "close_file",
            Self::EditFile(_) => "edit_file",
            Self::SaveFile(_) => "save_file",
            Self::SearchFiles(_) => "search_files",
            Self::GotoDefinition(_) => "goto_definition",
            Self::FindReferences(_) => "find_references",
            Self::ListDirectory(_) => "list_directory",
            Self::ReadFile(_) => "read_file",
            Self::CreateFile(_) => "create_file",
            Self::FindInFile(_) => "find_in_file",
            Self::ReplaceInFile(_) => "replace_in_file",
            Self::FindInPath(_) => "find_in_path",
            Self::RenameFile(_) => "rename_file",
            Self::DeleteFile(_) => "delete_file",
            Self::Undo(_) => "undo",
            Self::Redo(_) => "redo",
            Self::GetSymbols(_) => "get_symbols",
            Self::FindSymbols(_) => "find_symbols",
            Self::Finish => "finish",
            Self::RunCommand(_) => "run_command",
            Self::PollCommand(_) => "poll_command",
        }
    }

    /// The category this action belongs to.
    pub fn category(&self) -> ActionCategory {
        match self {
            Self::RunCommand(_) | Self::PollCommand(_) => ActionCategory::Terminal,
            _ => ActionCategory::Workspace,
        }
    }
}

/// Table entry describing one action.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActionSpec {
    /// Category.
    pub category: ActionCategory,
    /// `action_name`.
    #[serde(rename = "action_name")]
    pub name: &'static str,
    /// Argument names that must be present.
    pub required: &'static [&'static str],
    /// Argument names that may be present.
    pub optional: &'static [&'static str],
    /// One-line description for adapters.
    pub description: &'static str,
    /// A valid `action_args` object.
    pub example: &'static str,
    #[serde(skip)]
    parse: fn(Value) -> Result<Action, serde_json::Error>,
}

fn args<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value)
}

/// Every action, in schema order.
pub static ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "open_file",
        required: &["uri"],
        optional: &[],
        description: "Open a file; opening an open file returns it unchanged.",
        example: r#"{"uri": "src/main.py"}"#,
        parse: |v| Ok(Action::OpenFile(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "close_file",
        required: &["uri"],
        optional: &[],
        description: "Close a file, discarding its undo history and unsaved changes.",
        example: r#"{"uri": "src/main.py"}"#,
        parse: |v| Ok(Action::CloseFile(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "edit_file",
        required: &["uri", "edits"],
        optional: &[],
        description: "Apply non-overlapping range replacements atomically.",
        example: r#"{"uri": "src/main.py", "edits": [{"range": {"start_position": [0, 0], "end_position": [0, 0]}, "text": "x = 1\n"}]}"#,
        parse: |v| Ok(Action::EditFile(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "save_file",
        required: &["uri"],
        optional: &[],
        description: "Write an open file to disk.",
        example: r#"{"uri": "src/main.py"}"#,
        parse: |v| Ok(Action::SaveFile(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "search_files",
        required: &["pattern"],
        optional: &["path"],
        description: "Find files by glob, most recently modified first.",
        example: r#"{"pattern": "*.py", "path": "src"}"#,
        parse: |v| Ok(Action::SearchFiles(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "goto_definition",
        required: &["uri", "position"],
        optional: &[],
        description: "Locations defining the symbol at a position.",
        example: r#"{"uri": "src/main.py", "position": [3, 4]}"#,
        parse: |v| Ok(Action::GotoDefinition(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "find_references",
        required: &["uri", "position"],
        optional: &[],
        description: "Locations referencing the symbol at a position, its declaration included.",
        example: r#"{"uri": "src/main.py", "position": [3, 4]}"#,
        parse: |v| Ok(Action::FindReferences(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "list_directory",
        required: &[],
        optional: &["path", "depth"],
        description: "Directory tree, honoring ignore files.",
        example: r#"{"path": "src", "depth": 2}"#,
        parse: |v| Ok(Action::ListDirectory(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "read_file",
        required: &["uri"],
        optional: &["start_line", "end_line", "line_numbers"],
        description: "Lines of a file, opening it if needed.",
        example: r#"{"uri": "src/main.py", "start_line": 0, "end_line": 20}"#,
        parse: |v| Ok(Action::ReadFile(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "create_file",
        required: &["uri"],
        optional: &["text", "overwrite"],
        description: "Create a file and open it.",
        example: r#"{"uri": "src/new.py", "text": "", "overwrite": false}"#,
        parse: |v| Ok(Action::CreateFile(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "find_in_file",
        required: &["uri", "query"],
        optional: &["options"],
        description: "Matches of a literal or regex query in an open file.",
        example: r#"{"uri": "src/main.py", "query": "foo", "options": {"whole_word": true}}"#,
        parse: |v| Ok(Action::FindInFile(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "replace_in_file",
        required: &["uri", "query", "replacement"],
        optional: &["options"],
        description: "Replace every match in an open file as one undoable batch.",
        example: r#"{"uri": "src/main.py", "query": "foo", "replacement": "bar"}"#,
        parse: |v| Ok(Action::ReplaceInFile(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "find_in_path",
        required: &["query"],
        optional: &["path", "options", "search_scope", "limit"],
        description: "Matches of a query in a file or, recursively, a directory; open files use their unsaved text.",
        example: r#"{"query": "TODO", "path": "src", "options": {"case_sensitive": false}, "limit": 50}"#,
        parse: |v| Ok(Action::FindInPath(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "rename_file",
        required: &["uri", "new_uri"],
        optional: &["overwrite"],
        description: "Move a file; an open, saved copy follows it to the new path.",
        example: r#"{"uri": "src/old.py", "new_uri": "src/new.py", "overwrite": false}"#,
        parse: |v| Ok(Action::RenameFile(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "delete_file",
        required: &["uri"],
        optional: &["recursive"],
        description: "Delete a file or directory, closing open documents below it.",
        example: r#"{"uri": "src/old.py"}"#,
        parse: |v| Ok(Action::DeleteFile(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "undo",
        required: &["uri"],
        optional: &[],
        description: "Undo the last edit batch.",
        example: r#"{"uri": "src/main.py"}"#,
        parse: |v| Ok(Action::Undo(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "redo",
        required: &["uri"],
        optional: &[],
        description: "Redo the last undone edit batch.",
        example: r#"{"uri": "src/main.py"}"#,
        parse: |v| Ok(Action::Redo(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "get_symbols",
        required: &["uri"],
        optional: &["kinds"],
        description: "Symbol outline of an open file.",
        example: r#"{"uri": "src/main.py", "kinds": ["function", "class"]}"#,
        parse: |v| Ok(Action::GetSymbols(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "find_symbols",
        required: &["query"],
        optional: &[],
        description: "Symbols matching a query across the workspace.",
        example: r#"{"query": "Parser"}"#,
        parse: |v| Ok(Action::FindSymbols(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Workspace,
        name: "finish",
        required: &[],
        optional: &[],
        description: "End the episode.",
        example: "{}",
        parse: |v| {
            let _: Empty = args(v)?;
            Ok(Action::Finish)
        },
    },
    ActionSpec {
        category: ActionCategory::Terminal,
        name: "run_command",
        required: &["command"],
        optional: &["timeout", "run_in_background"],
        description: "Run a shell command in the workspace root.",
        example: r#"{"command": "pytest -q", "timeout": 120}"#,
        parse: |v| Ok(Action::RunCommand(args(v)?)),
    },
    ActionSpec {
        category: ActionCategory::Terminal,
        name: "poll_command",
        required: &["handle"],
        optional: &[],
        description: "Output of a background command so far.",
        example: r#"{"handle": 1}"#,
        parse: |v| Ok(Action::PollCommand(args(v)?)),
    },
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Empty {}

/// A malformed action table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionTableError {
    /// Two entries share `(category, action_name)`.
    #[error("action `{category}/{name}` is declared twice")]
    Duplicate {
        /// Category.
        category: ActionCategory,
        /// Name.
        name: &'static str,
    },
    /// An entry's example does not resolve to the action it describes.
    #[error("action `{category}/{name}` does not resolve to itself: {reason}")]
    Unreachable {
        /// Category.
        category: ActionCategory,
        /// Name.
        name: &'static str,
        /// What went wrong.
        reason: String,
    },
}

/// Lookup from `(category, action_name)` to its entry.
#[derive(Debug, Clone)]
pub struct ActionTable {
    specs: &'static [ActionSpec],
    index: HashMap<ActionCategory, HashMap<&'static str, usize>>,
}

impl ActionTable {
    /// Build the table over [`ACTIONS`].
    pub fn new() -> Result<Self, ActionTableError> {
        Self::from_specs(ACTIONS)
    }

    /// Build and check a table: keys are unique and every example resolves to its own entry.
    pub fn from_specs(specs: &'static [ActionSpec]) -> Result<Self, ActionTableError> {
        let mut index: HashMap<ActionCategory, HashMap<&'static str, usize>> = HashMap::new();
        for (i, spec) in specs.iter().enumerate() {
            if index
                .entry(spec.category)
                .or_default()
                .insert(spec.name, i)
                .is_some()
            {
                return Err(ActionTableError::Duplicate {
                    category: spec.category,
                    name: spec.name,
                });
            }

            let broken = |reason: String| ActionTableError::Unreachable {
                category: spec.category,
                name: spec.name,
                reason,
            };
            let example: Value =
                serde_json::from_str(spec.example).map_err(|err| broken(err.to_string()))?;
            let action = (spec.parse)(example).map_err(|err| broken(err.to_string()))?;
            if action.name() != spec.name || action.category() != spec.category {
                return Err(broken(format!(
                    "example parses as `{}/{}`",
                    action.category(),
                    action.name()
                )));
            }
        }
        Ok(Self { specs, index })
    }

    /// All entries.
    pub fn specs(&self) -> &'static [ActionSpec] {
        self.specs
    }

    /// Entry for `(category, action_name)`.
    pub fn get(&self, category: ActionCategory, name: &str) -> Option<&'static ActionSpec> {
        self.index
            .get(&category)?
            .get(name)
            .map(|&i| &self.specs[i])
    }

    /// Resolve a request into an action without executing anything.
    pub fn resolve(&self, request: &ActionRequest) -> Result<Action, WorkspaceError> {
        let category = ActionCategory::parse(&request.category).ok_or_else(|| {
            WorkspaceError::Validation(format!(
                "unknown category `{}` (expected `workspace` or `terminal`)",
                request.category
            ))
        })?;
        let spec = self.get(category, &request.action_name).ok_or_else(|| {
            WorkspaceError::Validation(format!(
                "unknown action `{}` in category `{category}`",
                request.action_name
            ))
        })?;

        let args = match &request.action_args {
            Value::Null => Value::Object(Default::default()),
            Value::Object(_) => request.action_args.clone(),
            other => {
                return Err(WorkspaceError::Validation(format!(
                    "action_args for `{}` must be an object, got {other}",
                    spec.name
                )));
            }
        };
        (spec.parse)(args).map_err(|err| {
            WorkspaceError::Validation(format!("invalid arguments for `{}`: {err}", spec.name))
        })
    }
}
