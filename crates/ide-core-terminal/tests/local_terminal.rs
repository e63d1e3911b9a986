#![cfg(unix)]

use ide_core_terminal::{
    CommandFilter, CommandHandle, CommandRequest, LocalTerminal, Terminal, TerminalError,
};
use pretty_assertions::assert_eq;
use std::thread;
use std::time::{Duration, Instant};

fn terminal(dir: &tempfile::TempDir) -> LocalTerminal {
    LocalTerminal::new(dir.path()).with_default_timeout(Duration::from_secs(10))
}

#[test]
fn foreground_command_captures_output_and_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "hi\n").unwrap();
    let terminal = terminal(&dir);

    let outcome = terminal
        .run_command(&CommandRequest::new("cat hello.txt; echo oops >&2; exit 3"))
        .unwrap();
    assert_eq!(outcome.stdout, "hi\n");
    assert_eq!(outcome.stderr, "oops\n");
    assert_eq!(outcome.exit_code, Some(3));
    assert!(outcome.finished);
    assert!(!outcome.succeeded());
}

#[test]
fn denied_program_is_rejected_before_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    std::fs::write(&marker, "").unwrap();
    let terminal = terminal(&dir);

    let err = terminal
        .run_command(&CommandRequest::new("echo ok | rm marker"))
        .unwrap_err();
    assert!(matches!(err, TerminalError::CommandNotAllowed { ref program, .. } if program == "rm"));
    assert!(marker.exists());
}

#[test]
fn allow_list_restricts_programs() {
    let dir = tempfile::tempdir().unwrap();
    let terminal = terminal(&dir).with_filter(CommandFilter::new(vec!["echo".into()], Vec::new()));

    assert!(terminal.run_command(&CommandRequest::new("echo fine")).unwrap().succeeded());
    assert!(matches!(
        terminal.run_command(&CommandRequest::new("ls")),
        Err(TerminalError::CommandNotAllowed { .. })
    ));
}

#[test]
fn slow_command_is_killed_at_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let terminal = terminal(&dir);

    let started = Instant::now();
    let outcome = terminal
        .run_command(&CommandRequest::new("sleep 5").with_timeout(Duration::from_millis(200)))
        .unwrap();
    assert!(outcome.timed_out);
    assert!(outcome.finished);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn background_command_is_polled_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let terminal = terminal(&dir);

    let started = terminal
        .run_command(&CommandRequest::new("sleep 0.2; echo done").in_background())
        .unwrap();
    assert!(!started.finished);
    let handle = started.handle.unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let outcome = loop {
        let outcome = terminal.poll(handle).unwrap();
        if outcome.finished || Instant::now() > deadline {
            break outcome;
        }
        thread::sleep(Duration::from_millis(20));
    };
    assert!(outcome.succeeded());
    assert_eq!(outcome.stdout, "done\n");

    assert!(matches!(
        terminal.poll(handle),
        Err(TerminalError::UnknownHandle(_))
    ));
    assert!(matches!(
        terminal.poll(CommandHandle(999)),
        Err(TerminalError::UnknownHandle(999))
    ));
}

#[test]
fn output_beyond_limit_is_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let terminal = terminal(&dir).with_max_output_bytes(4);

    let outcome = terminal
        .run_command(&CommandRequest::new("echo abcdefgh"))
        .unwrap();
    assert_eq!(outcome.stdout, "abcd");
    assert!(outcome.truncated);
}
