//! Line-delimited JSON front end.
//!
//! Reads one action request per line from stdin and writes one response envelope per line to
//! stdout. Logs go to stderr and are filtered with `RUST_LOG`.
//!
//! # Usage
//!
//! ```bash
//! ide-stdio --config workspace.toml
//! echo '{"category":"workspace","action_name":"open_file","action_args":{"uri":"a.py"}}' \
//!     | ide-stdio --root .
//! ide-stdio --schema
//! ```

use anyhow::Context;
use clap::Parser;
use ide_core_workspace::{ActionDispatcher, Workspace, WorkspaceConfig};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(
    name = "ide-stdio",
    version,
    about = "Serve workspace actions as JSON lines over stdin/stdout"
)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace root; overrides `root` from the configuration.
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Print the action schema as JSON and exit.
    #[arg(long)]
    schema: bool,

    /// Keep serving after a `finish` action.
    #[arg(long)]
    keep_alive: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<WorkspaceConfig> {
    let mut config = match &cli.config {
        Some(path) => WorkspaceConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => WorkspaceConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    Ok(config)
}

/// Answer every request in `input` until it ends or (unless `keep_alive`) an action finishes.
fn serve(
    dispatcher: &ActionDispatcher,
    input: impl BufRead,
    mut output: impl Write,
    keep_alive: bool,
) -> anyhow::Result<()> {
    for line in input.lines() {
        let line = line.context("failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }
        let envelope = dispatcher.dispatch_line(&line);
        debug!(action = %envelope.info.action, status = ?envelope.status, "answered");
        serde_json::to_writer(&mut output, &envelope).context("failed to encode response")?;
        output.write_all(b"\n").context("failed to write response")?;
        output.flush().context("failed to write response")?;
        if envelope.done && !keep_alive {
            info!("episode finished");
            break;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let config = load_config(&cli)?;
    let workspace = Arc::new(Workspace::new(config).context("failed to open workspace")?);
    let terminal = Arc::new(workspace.local_terminal());
    let dispatcher =
        ActionDispatcher::new(workspace.clone(), terminal).context("invalid action table")?;

    if cli.schema {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, dispatcher.schema())
            .context("failed to encode schema")?;
        out.write_all(b"\n")?;
        return Ok(());
    }

    info!(root = %workspace.root().path().display(), "serving");
    let result = serve(&dispatcher, io::stdin().lock(), io::stdout().lock(), cli.keep_alive);
    workspace.shutdown();
    result
}
