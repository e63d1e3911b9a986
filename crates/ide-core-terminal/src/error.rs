use std::io;
use thiserror::Error;

/// Terminal failures.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// The filter rejected a program; nothing was spawned.
    #[error("command `{program}` is not allowed: {reason}")]
    CommandNotAllowed {
        /// Offending program name.
        program: String,
        /// Which rule rejected it.
        reason: String,
    },

    /// The command line contains no program.
    #[error("command is empty")]
    EmptyCommand,

    /// The shell could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// Command line.
        command: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// `poll` for a handle that does not exist (or was already collected).
    #[error("unknown command handle {0}")]
    UnknownHandle(u64),

    /// Waiting on or killing a process failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
