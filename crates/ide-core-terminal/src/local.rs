//! Local shell execution.

use crate::error::TerminalError;
use crate::filter::CommandFilter;
use crate::{CommandHandle, CommandOutcome, CommandRequest, Terminal};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to wait for pipes to drain after the shell exited.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
struct OutputBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
    closed: bool,
}

impl OutputBuffer {
    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

type SharedOutput = Arc<Mutex<OutputBuffer>>;

fn closed_output() -> SharedOutput {
    Arc::new(Mutex::new(OutputBuffer {
        closed: true,
        ..OutputBuffer::default()
    }))
}

fn capture<R: Read + Send + 'static>(mut reader: R, limit: usize) -> SharedOutput {
    let output = Arc::new(Mutex::new(OutputBuffer {
        limit,
        ..OutputBuffer::default()
    }));
    let sink = Arc::clone(&output);
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().push(&buf[..n]),
            }
        }
        sink.lock().closed = true;
    });
    output
}

struct RunningCommand {
    command: String,
    child: Child,
    stdout: SharedOutput,
    stderr: SharedOutput,
    deadline: Option<Instant>,
}

impl RunningCommand {
    /// Exit code once finished; kills the process when its deadline passed.
    fn check(&mut self) -> Result<Option<(Option<i32>, bool)>, TerminalError> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(Some((status.code(), false)));
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            warn!(command = %self.command, "command timed out; killing");
            let _ = self.child.kill();
            let status = self.child.wait()?;
            return Ok(Some((status.code(), true)));
        }
        Ok(None)
    }

    fn outcome(
        &self,
        exit: Option<(Option<i32>, bool)>,
        handle: Option<CommandHandle>,
    ) -> CommandOutcome {
        if exit.is_some() {
            // Background children of the shell may keep the pipes open.
            let drained_by = Instant::now() + DRAIN_TIMEOUT;
            while !(self.stdout.lock().closed && self.stderr.lock().closed)
                && Instant::now() < drained_by
            {
                thread::sleep(POLL_INTERVAL);
            }
        }
        let stdout = self.stdout.lock();
        let stderr = self.stderr.lock();
        let (exit_code, timed_out) = exit.unwrap_or((None, false));
        CommandOutcome {
            command: self.command.clone(),
            exit_code,
            stdout: stdout.text(),
            stderr: stderr.text(),
            timed_out,
            truncated: stdout.truncated || stderr.truncated,
            finished: exit.is_some(),
            handle,
        }
    }
}

/// Runs commands through `sh -c` inside a working directory.
pub struct LocalTerminal {
    root: PathBuf,
    filter: CommandFilter,
    default_timeout: Duration,
    max_output_bytes: usize,
    next_handle: AtomicU64,
    background: Mutex<HashMap<u64, RunningCommand>>,
}

impl LocalTerminal {
    /// A terminal rooted at `root` using the default deny list.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            filter: CommandFilter::default(),
            default_timeout: Duration::from_secs(60),
            max_output_bytes: 1024 * 1024,
            next_handle: AtomicU64::new(1),
            background: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the command filter.
    pub fn with_filter(mut self, filter: CommandFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Timeout applied when a request carries none.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Per-stream capture limit.
    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    /// Working directory of spawned commands.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The active filter.
    pub fn filter(&self) -> &CommandFilter {
        &self.filter
    }

    fn spawn(&self, request: &CommandRequest) -> Result<RunningCommand, TerminalError> {
        self.filter.check(&request.command).inspect_err(|err| {
            warn!(command = %request.command, error = %err, "command rejected");
        })?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&request.command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TerminalError::Spawn {
                command: request.command.clone(),
                source,
            })?;
        debug!(command = %request.command, pid = child.id(), "command started");

        let stdout = match child.stdout.take() {
            Some(pipe) => capture(pipe, self.max_output_bytes),
            None => closed_output(),
        };
        let stderr = match child.stderr.take() {
            Some(pipe) => capture(pipe, self.max_output_bytes),
            None => closed_output(),
        };

        // Background commands only expire when a timeout was asked for explicitly.
        let timeout = match (request.run_in_background, request.timeout) {
            (_, Some(timeout)) => Some(timeout),
            (false, None) => Some(self.default_timeout),
            (true, None) => None,
        };
        Ok(RunningCommand {
            command: request.command.clone(),
            child,
            stdout,
            stderr,
            deadline: timeout.map(|timeout| Instant::now() + timeout),
        })
    }
}

impl Terminal for LocalTerminal {
    fn run_command(&self, request: &CommandRequest) -> Result<CommandOutcome, TerminalError> {
        let mut running = self.spawn(request)?;

        if request.run_in_background {
            let handle = CommandHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
            info!(command = %request.command, handle = handle.0, "command moved to background");
            let outcome = running.outcome(None, Some(handle));
            self.background.lock().insert(handle.0, running);
            return Ok(outcome);
        }

        loop {
            if let Some(exit) = running.check()? {
                let outcome = running.outcome(Some(exit), None);
                debug!(command = %request.command, exit_code = ?outcome.exit_code, "command finished");
                return Ok(outcome);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn poll(&self, handle: CommandHandle) -> Result<CommandOutcome, TerminalError> {
        let mut background = self.background.lock();
        let running = background
            .get_mut(&handle.0)
            .ok_or(TerminalError::UnknownHandle(handle.0))?;

        let exit = running.check()?;
        let outcome = running.outcome(exit, Some(handle));
        if outcome.finished {
            background.remove(&handle.0);
        }
        Ok(outcome)
    }
}

impl Drop for LocalTerminal {
    fn drop(&mut self) {
        for (handle, mut running) in self.background.lock().drain() {
            if let Ok(None) = running.child.try_wait() {
                debug!(handle, command = %running.command, "killing background command");
                let _ = running.child.kill();
            }
            let _ = running.child.wait();
        }
    }
}
