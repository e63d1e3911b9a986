use ide_core_lsp::CONTENT_MODIFIED;
use ide_core_lsp::fake_server::FakeLanguageServer;
use ide_core_workspace::{ActionDispatcher, Envelope, Status, Workspace, WorkspaceConfig};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Harness {
    dir: tempfile::TempDir,
    server: FakeLanguageServer,
    dispatcher: ActionDispatcher,
}

impl Harness {
    fn new(configure: impl FnOnce(&mut WorkspaceConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WorkspaceConfig::for_root(dir.path());
        configure(&mut config);
        let server = FakeLanguageServer::new();
        let workspace = Arc::new(
            Workspace::new(config)
                .unwrap()
                .with_language_server("python", &["py"], Arc::new(server.clone())),
        );
        let terminal = Arc::new(workspace.local_terminal());
        let dispatcher = ActionDispatcher::new(workspace, terminal).unwrap();
        Self {
            dir,
            server,
            dispatcher,
        }
    }

    fn write(&self, name: &str, text: &str) {
        let path = self.dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn send(&self, category: &str, action_name: &str, action_args: Value) -> Envelope {
        self.dispatcher.dispatch_value(json!({
            "category": category,
            "action_name": action_name,
            "action_args": action_args,
        }))
    }

    fn workspace(&self, action_name: &str, action_args: Value) -> Envelope {
        self.send("workspace", action_name, action_args)
    }
}

fn error_kind(envelope: &Envelope) -> &str {
    &envelope.info.error.as_ref().expect("error info").kind
}

#[test]
fn edit_and_undo_through_the_protocol() {
    let h = Harness::new(|_| {});
    h.write("a.py", "");

    let opened = h.workspace("open_file", json!({ "uri": "a.py" }));
    assert_eq!(opened.status, Status::Ok);
    assert_eq!(opened.observation["document"]["version"], 0);
    assert!(!opened.done);

    let edited = h.workspace(
        "edit_file",
        json!({
            "uri": "a.py",
            "edits": [{
                "range": { "start_position": [0, 0], "end_position": [0, 0] },
                "text": "x = 1\n"
            }]
        }),
    );
    assert_eq!(edited.status, Status::Ok, "{:?}", edited.info);
    assert_eq!(edited.observation["version"], 1);
    assert_eq!(edited.observation["view"]["text"], "0    |x = 1\n1    |");
    assert_eq!(edited.info.action, "edit_file");

    let undone = h.workspace("undo", json!({ "uri": "a.py" }));
    assert_eq!(undone.observation["version"], 0);
    assert_eq!(undone.observation["applied"], true);

    let read = h.workspace("read_file", json!({ "uri": "a.py", "line_numbers": false }));
    assert_eq!(read.observation["view"]["text"], "");
}

#[test]
fn unknown_actions_fail_before_touching_anything() {
    let h = Harness::new(|_| {});
    h.write("a.py", "x = 1\n");

    let unknown = h.workspace("delete_everything", json!({ "uri": "a.py" }));
    assert_eq!(unknown.status, Status::Error);
    assert_eq!(error_kind(&unknown), "validation_error");
    assert_eq!(unknown.info.action, "delete_everything");

    let wrong_category = h.send("terminal", "open_file", json!({ "uri": "a.py" }));
    assert_eq!(error_kind(&wrong_category), "validation_error");

    let malformed = h.dispatcher.dispatch_value(json!({ "action_name": "open_file" }));
    assert_eq!(error_kind(&malformed), "validation_error");

    let bad_edit = h.workspace("edit_file", json!({ "uri": "a.py", "edits": "x" }));
    assert_eq!(error_kind(&bad_edit), "validation_error");

    // Nothing was opened by any of the above.
    let finish = h.workspace("finish", Value::Null);
    assert!(finish.done);
    assert_eq!(finish.observation["open_documents"], json!([]));
    assert!(h.server.received().is_empty());
}

#[test]
fn misspelled_edit_fields_are_rejected_without_mutation() {
    let h = Harness::new(|_| {});
    h.write("a.py", "hello world\n");
    h.workspace("open_file", json!({ "uri": "a.py" }));

    let misspelled = h.workspace(
        "edit_file",
        json!({
            "uri": "a.py",
            "edits": [{
                "range": { "start_position": [0, 0], "end_position": [0, 5] },
                "new_text": "HELLO"
            }]
        }),
    );
    assert_eq!(misspelled.status, Status::Error);
    assert_eq!(error_kind(&misspelled), "validation_error");

    let missing_text = h.workspace(
        "edit_file",
        json!({
            "uri": "a.py",
            "edits": [{ "range": { "start_position": [0, 0], "end_position": [0, 5] } }]
        }),
    );
    assert_eq!(error_kind(&missing_text), "validation_error");

    let extra_range_key = h.workspace(
        "edit_file",
        json!({
            "uri": "a.py",
            "edits": [{
                "range": { "start_position": [0, 0], "end_position": [0, 5], "end": [0, 1] },
                "text": ""
            }]
        }),
    );
    assert_eq!(error_kind(&extra_range_key), "validation_error");

    let read = h.workspace("read_file", json!({ "uri": "a.py", "line_numbers": false }));
    assert_eq!(read.observation["document"]["version"], 0);
    assert_eq!(read.observation["view"]["text"], "hello world\n");
}

#[test]
fn failures_carry_their_kind() {
    let h = Harness::new(|config| config.max_open_documents = 1);
    h.write("a.py", "");
    h.write("b.py", "");

    let not_open = h.workspace("save_file", json!({ "uri": "a.py" }));
    assert_eq!(error_kind(&not_open), "not_open");

    h.workspace("open_file", json!({ "uri": "a.py" }));
    let past_end = h.workspace(
        "edit_file",
        json!({
            "uri": "a.py",
            "edits": [{ "range": { "start_position": [0, 0], "end_position": [3, 0] }, "text": "c" }]
        }),
    );
    assert_eq!(error_kind(&past_end), "out_of_range");

    h.workspace(
        "edit_file",
        json!({
            "uri": "a.py",
            "edits": [{ "range": { "start_position": [0, 0], "end_position": [0, 0] }, "text": "x" }]
        }),
    );
    let full = h.workspace("open_file", json!({ "uri": "b.py" }));
    assert_eq!(error_kind(&full), "too_many_open_documents");

    let outside = h.workspace("list_directory", json!({ "path": "../.." }));
    assert_eq!(error_kind(&outside), "validation_error");
}

#[test]
fn empty_definition_is_ok() {
    let h = Harness::new(|_| {});
    h.write("a.py", "x = 1\n");
    h.workspace("open_file", json!({ "uri": "a.py" }));

    let reply = h.workspace("goto_definition", json!({ "uri": "a.py", "position": [0, 5] }));
    assert_eq!(reply.status, Status::Ok);
    assert_eq!(reply.observation["references"], json!([]));
    assert!(reply.info.error.is_none());
}

#[test]
fn content_modified_navigation_is_ok_with_a_warning() {
    let h = Harness::new(|_| {});
    h.write("a.py", "x = 1\n");
    h.server.fail("textDocument/definition", CONTENT_MODIFIED, "content modified");
    h.workspace("open_file", json!({ "uri": "a.py" }));

    for _ in 0..2 {
        let reply = h.workspace("goto_definition", json!({ "uri": "a.py", "position": [0, 0] }));
        assert_eq!(reply.status, Status::Ok, "{:?}", reply.info);
        assert_eq!(reply.observation["references"], json!([]));
        assert!(reply.info.error.is_none());
        assert!(reply.info.warning.is_some());
    }
    // The second consecutive failure reached the limit and reopened the document.
    assert_eq!(h.server.wait_for("textDocument/didClose", 1).len(), 1);
}

#[test]
fn published_diagnostics_are_rendered_as_text() {
    let h = Harness::new(|_| {});
    h.write("a.py", "x = y\n");
    let opened = h.workspace("open_file", json!({ "uri": "a.py" }));
    let uri = opened.observation["document"]["uri"].clone();
    assert!(h.server.notify(
        "textDocument/publishDiagnostics",
        json!({
            "uri": uri,
            "diagnostics": [{
                "range": { "start": { "line": 0, "character": 4 }, "end": { "line": 0, "character": 5 } },
                "severity": 1,
                "source": "pyright",
                "message": "undefined name 'y'"
            }]
        })
    ));

    let deadline = Instant::now() + Duration::from_secs(5);
    let saved = loop {
        let saved = h.workspace("save_file", json!({ "uri": "a.py" }));
        if saved.observation.get("diagnostics_text").is_some() || Instant::now() >= deadline {
            break saved;
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    assert_eq!(
        saved.observation["diagnostics_text"],
        "0:4 error [pyright]: undefined name 'y'"
    );
    assert_eq!(saved.observation["diagnostics"].as_array().unwrap().len(), 1);
}

#[test]
fn navigation_timeouts_report_timeout_status() {
    let h = Harness::new(|config| config.lsp.request_timeout_ms = 200);
    h.write("a.py", "x = 1\n");
    h.server.stay_silent("textDocument/definition");
    h.workspace("open_file", json!({ "uri": "a.py" }));

    let reply = h.workspace("goto_definition", json!({ "uri": "a.py", "position": [0, 0] }));
    assert_eq!(reply.status, Status::Timeout);
    assert_eq!(reply.observation["timed_out"], true);
    assert_eq!(reply.observation["references"], json!([]));
}

#[test]
fn file_queries() {
    let h = Harness::new(|_| {});
    h.write("src/a.py", "");
    h.write("src/b.txt", "");

    let found = h.workspace("search_files", json!({ "pattern": "*.py" }));
    assert_eq!(found.observation["files"][0]["path"], "src/a.py");
    assert_eq!(found.observation["files"].as_array().unwrap().len(), 1);

    let listed = h.workspace("list_directory", json!({ "depth": 2 }));
    assert_eq!(listed.observation["tree"], "./\n- src/\n  - a.py\n  - b.txt");

    let created = h.workspace("create_file", json!({ "uri": "src/c.py", "text": "pass\n" }));
    assert_eq!(created.status, Status::Ok);
    assert_eq!(created.observation["document"]["path"], "src/c.py");
}

#[test]
fn file_management_through_the_protocol() {
    let h = Harness::new(|_| {});
    h.write("src/a.py", "def old(): pass\n");
    h.workspace("open_file", json!({ "uri": "src/a.py" }));

    let found = h.workspace(
        "find_in_path",
        json!({ "query": "OLD", "options": { "case_sensitive": false }, "limit": 1 }),
    );
    assert_eq!(found.status, Status::Ok, "{:?}", found.info);
    assert_eq!(found.observation["matches"][0]["path"], "src/a.py");
    assert_eq!(found.observation["matches"][0]["start"], json!([0, 4]));
    assert!(!found.truncated);

    let renamed = h.workspace("rename_file", json!({ "uri": "src/a.py", "new_uri": "src/b.py" }));
    assert_eq!(renamed.status, Status::Ok, "{:?}", renamed.info);
    assert_eq!(renamed.observation["reopened"]["path"], "src/b.py");

    let edited = h.workspace(
        "edit_file",
        json!({
            "uri": "src/b.py",
            "edits": [{ "range": { "start_position": [0, 4], "end_position": [0, 7] }, "text": "new" }]
        }),
    );
    assert_eq!(
        edited.observation["inverse_edits"],
        json!([{ "range": { "start_position": [0, 4], "end_position": [0, 7] }, "text": "old" }])
    );

    let deleted = h.workspace("delete_file", json!({ "uri": "src", "recursive": true }));
    assert_eq!(deleted.status, Status::Ok, "{:?}", deleted.info);
    assert_eq!(deleted.observation["closed"][0]["discarded_changes"], true);
    assert!(!h.dir.path().join("src").exists());
}

#[test]
fn schema_lists_every_action() {
    let h = Harness::new(|_| {});
    let names: Vec<_> = h.dispatcher.schema().iter().map(|spec| spec.name).collect();
    for required in [
        "open_file",
        "close_file",
        "edit_file",
        "save_file",
        "search_files",
        "goto_definition",
        "find_references",
        "list_directory",
        "find_in_path",
        "rename_file",
        "delete_file",
        "run_command",
    ] {
        assert!(names.contains(&required), "{required} missing");
    }
    let schema = serde_json::to_value(h.dispatcher.schema()).unwrap();
    assert_eq!(schema[0]["action_name"], "open_file");
    assert_eq!(schema[0]["category"], "workspace");
}

#[cfg(unix)]
#[test]
fn terminal_actions() {
    let h = Harness::new(|_| {});
    let ran = h.send("terminal", "run_command", json!({ "command": "echo hi" }));
    assert_eq!(ran.status, Status::Ok);
    assert_eq!(ran.observation["stdout"], "hi\n");
    assert_eq!(ran.observation["exit_code"], 0);

    let denied = h.send("terminal", "run_command", json!({ "command": "rm -rf src" }));
    assert_eq!(error_kind(&denied), "command_not_allowed");

    let bad_timeout = h.send(
        "terminal",
        "run_command",
        json!({ "command": "echo hi", "timeout": -1.0 }),
    );
    assert_eq!(error_kind(&bad_timeout), "validation_error");

    let slow = h.send(
        "terminal",
        "run_command",
        json!({ "command": "sleep 5", "timeout": 0.2 }),
    );
    assert_eq!(slow.status, Status::Timeout);
    assert_eq!(slow.observation["timed_out"], true);

    let unknown = h.send("terminal", "poll_command", json!({ "handle": 999 }));
    assert_eq!(error_kind(&unknown), "validation_error");
}
