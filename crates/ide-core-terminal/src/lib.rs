#![warn(missing_docs)]
//! `ide-core-terminal` - command execution for agent workspaces.
//!
//! Commands are plain shell command lines. Every program a line invokes is checked against a
//! [`CommandFilter`] before anything is spawned. Foreground commands block until they exit or hit
//! their timeout; background commands return a [`CommandHandle`] to [`Terminal::poll`] later.

mod error;
pub mod filter;
pub mod local;

pub use error::TerminalError;
pub use filter::{CommandFilter, DEFAULT_DENY_LIST, programs_in};
pub use local::LocalTerminal;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifies a background command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandHandle(pub u64);

/// One command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Shell command line.
    pub command: String,
    /// Overrides the terminal's default timeout.
    pub timeout: Option<Duration>,
    /// Return immediately with a handle.
    pub run_in_background: bool,
}

impl CommandRequest {
    /// A foreground command with the default timeout.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: None,
            run_in_background: false,
        }
    }

    /// Set an explicit timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run detached from the caller.
    pub fn in_background(mut self) -> Self {
        self.run_in_background = true;
        self
    }
}

/// Result (or progress) of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    /// Command line as submitted.
    pub command: String,
    /// Exit code; `None` while running or when killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output so far.
    pub stdout: String,
    /// Captured standard error so far.
    pub stderr: String,
    /// Killed after exceeding its timeout.
    pub timed_out: bool,
    /// Output exceeded the capture limit.
    pub truncated: bool,
    /// The process has exited.
    pub finished: bool,
    /// Handle of a background command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<CommandHandle>,
}

impl CommandOutcome {
    /// Finished with exit code 0.
    pub fn succeeded(&self) -> bool {
        self.finished && !self.timed_out && self.exit_code == Some(0)
    }
}

/// Capability to run commands.
///
/// Implementations are chosen at construction time (local process, container, remote host).
pub trait Terminal: Send + Sync {
    /// Run a command, or start it in the background.
    fn run_command(&self, request: &CommandRequest) -> Result<CommandOutcome, TerminalError>;

    /// Output collected so far for a background command. Once it reports `finished` the handle is
    /// released.
    fn poll(&self, handle: CommandHandle) -> Result<CommandOutcome, TerminalError>;
}
