//! Workspace configuration.
//!
//! Loaded from a TOML file; every field has a default so a partial (or empty) file is valid:
//!
//! ```toml
//! root = "."
//! max_open_documents = 3
//! position_policy = "strict"
//!
//! [render]
//! mode = "window"
//! context_lines = 3
//!
//! [lsp]
//! request_timeout_ms = 5000
//!
//! [[lsp.servers]]
//! language_id = "python"
//! extensions = ["py", "pyi"]
//! command = "pyright-langserver"
//! args = ["--stdio"]
//!
//! [terminal]
//! allow_list = []
//! ```

use ide_core::PositionPolicy;
use ide_core_terminal::{CommandFilter, DEFAULT_DENY_LIST, LocalTerminal};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Workspace root. Relative roots resolve against the process working directory.
    pub root: PathBuf,
    /// Open document cap; the least recently used clean document is evicted beyond it.
    pub max_open_documents: usize,
    /// How out-of-range positions are handled, for every operation.
    pub position_policy: PositionPolicy,
    /// Observation rendering.
    pub render: RenderConfig,
    /// Language servers.
    pub lsp: LspConfig,
    /// Command execution.
    pub terminal: TerminalConfig,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            max_open_documents: 3,
            position_policy: PositionPolicy::Strict,
            render: RenderConfig::default(),
            lsp: LspConfig::default(),
            terminal: TerminalConfig::default(),
        }
    }
}

impl WorkspaceConfig {
    /// Defaults rooted at `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load and validate a TOML file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Self = toml::from_str(&contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_open_documents == 0 {
            return Err(ConfigError::Invalid(
                "max_open_documents must be at least 1".to_string(),
            ));
        }
        for server in &self.lsp.servers {
            if server.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language server for `{}` has no command",
                    server.language_id
                )));
            }
            if server.extensions.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language server for `{}` lists no file extensions",
                    server.language_id
                )));
            }
        }
        Ok(())
    }
}

/// How document views are rendered into observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// The whole document (up to `max_lines`).
    Full,
    /// Only the lines around a change.
    #[default]
    Window,
}

/// Rendering options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RenderConfig {
    /// Full or windowed views after edits.
    pub mode: RenderMode,
    /// Lines shown above and below a change in window mode.
    pub context_lines: usize,
    /// Longest rendered view; longer views are cut and flagged as truncated.
    pub max_lines: Option<usize>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::Window,
            context_lines: 3,
            max_lines: Some(2000),
        }
    }
}

/// Language-server options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LspConfig {
    /// Bound on navigation requests.
    pub request_timeout_ms: u64,
    /// Bound on the `initialize` handshake.
    pub initialize_timeout_ms: u64,
    /// Sync failures tolerated before a document is fully resynced.
    pub max_sync_failures: u32,
    /// Servers by language.
    pub servers: Vec<LanguageServerConfig>,
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5000,
            initialize_timeout_ms: 10_000,
            max_sync_failures: 2,
            servers: Vec::new(),
        }
    }
}

impl LspConfig {
    /// [`Self::request_timeout_ms`] as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// [`Self::initialize_timeout_ms`] as a duration.
    pub fn initialize_timeout(&self) -> Duration {
        Duration::from_millis(self.initialize_timeout_ms)
    }
}

/// One language server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanguageServerConfig {
    /// Language id sent to the server (e.g. `python`).
    pub language_id: String,
    /// File extensions routed to this server, without the dot.
    pub extensions: Vec<String>,
    /// Executable.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Command execution options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TerminalConfig {
    /// When non-empty, only these programs may run.
    pub allow_list: Vec<String>,
    /// Programs that never run (ignored when `allow_list` is set).
    pub deny_list: Vec<String>,
    /// Timeout for foreground commands without an explicit one.
    pub default_timeout_secs: u64,
    /// Capture limit per output stream.
    pub max_output_bytes: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            allow_list: Vec::new(),
            deny_list: DEFAULT_DENY_LIST.iter().map(|s| s.to_string()).collect(),
            default_timeout_secs: 60,
            max_output_bytes: 1024 * 1024,
        }
    }
}

impl TerminalConfig {
    /// A local terminal in `root` enforcing this policy.
    pub fn build(&self, root: &Path) -> LocalTerminal {
        LocalTerminal::new(root)
            .with_filter(CommandFilter::new(
                self.allow_list.clone(),
                self.deny_list.clone(),
            ))
            .with_default_timeout(Duration::from_secs(self.default_timeout_secs))
            .with_max_output_bytes(self.max_output_bytes)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("config I/O error: {0}")]
    Io(#[source] std::io::Error),
    /// The file is not valid TOML for [`WorkspaceConfig`].
    #[error("config parse error: {0}")]
    Parse(#[source] toml::de::Error),
    /// Values are out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let cfg = WorkspaceConfig::default();
        assert_eq!(cfg.max_open_documents, 3);
        assert_eq!(cfg.position_policy, PositionPolicy::Strict);
        assert_eq!(cfg.render.mode, RenderMode::Window);
        assert_eq!(cfg.render.context_lines, 3);
        assert_eq!(cfg.lsp.request_timeout(), Duration::from_secs(5));
        assert!(cfg.terminal.deny_list.iter().any(|p| p == "rm"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspace.toml");
        std::fs::write(
            &path,
            r#"
max_open_documents = 1
position_policy = "clamp"

[render]
mode = "full"

[[lsp.servers]]
language_id = "python"
extensions = ["py"]
command = "pyright-langserver"
args = ["--stdio"]
"#,
        )
        .unwrap();

        let cfg = WorkspaceConfig::load_from(&path).unwrap();
        assert_eq!(cfg.max_open_documents, 1);
        assert_eq!(cfg.position_policy, PositionPolicy::Clamp);
        assert_eq!(cfg.render.mode, RenderMode::Full);
        assert_eq!(cfg.render.context_lines, 3);
        assert_eq!(cfg.lsp.servers[0].args, vec!["--stdio"]);
        assert_eq!(cfg.lsp.max_sync_failures, 2);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspace.toml");

        std::fs::write(&path, "max_open_documents = 0\n").unwrap();
        assert!(matches!(
            WorkspaceConfig::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));

        std::fs::write(
            &path,
            "[[lsp.servers]]\nlanguage_id = \"rust\"\nextensions = []\ncommand = \"rust-analyzer\"\n",
        )
        .unwrap();
        assert!(matches!(
            WorkspaceConfig::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));

        std::fs::write(&path, "max_open_documents = \"many\"\n").unwrap();
        assert!(matches!(
            WorkspaceConfig::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            WorkspaceConfig::load_from(&dir.path().join("nope.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
