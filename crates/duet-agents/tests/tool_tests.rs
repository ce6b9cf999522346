//! Sandbox tool tests against real temp directories.
//!
//! Tests verify:
//! - fs_read / fs_write / fs_list size limits, truncation and path policy
//! - run_command allow list, output capture, exit codes and timeout
//! - run_tests command mapping
//! - orchestrator-side tool execution keeps order and isolates failures

use std::time::Duration;

use serde_json::{json, Map, Value};

use conversation::orchestrator::execute_tools;
use conversation::ToolCall;
use duet_agents::tools::fs_tools::{MAX_LIST_ENTRIES, MAX_READ_CHARS};
use duet_agents::tools::{LocalSandbox, ToolError};

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn sandbox() -> (tempfile::TempDir, LocalSandbox) {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = LocalSandbox::new(dir.path(), None).unwrap();
    (dir, sandbox)
}

// ---------------------------------------------------------------------------
// fs_read
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fs_read_returns_content_and_summary() {
    let (dir, sandbox) = sandbox();
    std::fs::write(dir.path().join("notes.txt"), "hello duet").unwrap();

    let out = sandbox
        .execute("fs_read", &args(json!({"path": "notes.txt"})))
        .await
        .unwrap();
    assert_eq!(out["content"], "hello duet");
    assert_eq!(out["size"], 10);
    assert_eq!(out["summary"], "Read notes.txt (10 chars)");
}

#[tokio::test]
async fn test_fs_read_truncates_long_files() {
    let (dir, sandbox) = sandbox();
    std::fs::write(dir.path().join("big.txt"), "a".repeat(MAX_READ_CHARS + 2000)).unwrap();

    let out = sandbox
        .execute("fs_read", &args(json!({"path": "big.txt"})))
        .await
        .unwrap();
    let content = out["content"].as_str().unwrap();
    assert!(content.starts_with(&"a".repeat(MAX_READ_CHARS)));
    assert!(content.ends_with("[... content truncated ...]"));
}

#[tokio::test]
async fn test_fs_read_refuses_files_over_one_megabyte() {
    let (dir, sandbox) = sandbox();
    std::fs::write(dir.path().join("huge.bin"), vec![b'x'; 1_000_001]).unwrap();

    let err = sandbox
        .execute("fs_read", &args(json!({"path": "huge.bin"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::TooLarge { what: "file", .. }));
}

#[tokio::test]
async fn test_fs_read_prefers_project_root() {
    let sandbox_dir = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    std::fs::create_dir(project.path().join("src")).unwrap();
    std::fs::write(project.path().join("src/auth.py"), "def login(): pass").unwrap();
    let sandbox = LocalSandbox::new(sandbox_dir.path(), Some(project.path())).unwrap();

    let out = sandbox
        .execute("fs_read", &args(json!({"path": "src/auth.py"})))
        .await
        .unwrap();
    assert_eq!(out["content"], "def login(): pass");
}

#[tokio::test]
async fn test_fs_read_rejects_unsafe_paths() {
    let (_dir, sandbox) = sandbox();
    for path in ["../outside.txt", "/etc/passwd", ".env", "/proc/self/environ"] {
        let err = sandbox
            .execute("fs_read", &args(json!({"path": path})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnsafePath(_)), "accepted {path}");
    }
}

// ---------------------------------------------------------------------------
// fs_write
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fs_write_lands_in_sandbox_by_file_name() {
    let (dir, sandbox) = sandbox();
    let out = sandbox
        .execute(
            "fs_write",
            &args(json!({"path": "deep/nested/out.txt", "content": "written"})),
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "written");
    assert!(!dir.path().join("deep").exists());
    assert!(out["summary"].as_str().unwrap().starts_with("Wrote 7 bytes"));
}

#[tokio::test]
async fn test_fs_write_rejects_large_content() {
    let (dir, sandbox) = sandbox();
    let err = sandbox
        .execute(
            "fs_write",
            &args(json!({"path": "big.txt", "content": "z".repeat(100_001)})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::TooLarge { what: "content", .. }));
    assert!(!dir.path().join("big.txt").exists());
}

// ---------------------------------------------------------------------------
// fs_list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fs_list_is_sorted_and_capped() {
    let (dir, sandbox) = sandbox();
    for i in 0..(MAX_LIST_ENTRIES + 5) {
        std::fs::write(dir.path().join(format!("f{i:03}.txt")), "").unwrap();
    }

    let out = sandbox.execute("fs_list", &Map::new()).await.unwrap();
    let files: Vec<&str> = out["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(files.len(), MAX_LIST_ENTRIES);
    assert_eq!(files[0], "f000.txt");
    assert_eq!(files[MAX_LIST_ENTRIES - 1], "f099.txt");
    assert_eq!(out["count"], MAX_LIST_ENTRIES);
    assert_eq!(out["truncated"], true);
}

// ---------------------------------------------------------------------------
// run_command / run_tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_run_command_captures_stdout() {
    let (_dir, sandbox) = sandbox();
    let out = sandbox
        .execute("run_command", &args(json!({"command": "echo hello duet"})))
        .await
        .unwrap();
    assert_eq!(out["stdout"], "hello duet\n");
    assert_eq!(out["returncode"], 0);
    assert_eq!(out["summary"], "Executed: echo hello duet (exit code: 0)");
}

#[tokio::test]
async fn test_run_command_runs_in_sandbox_dir() {
    let (dir, sandbox) = sandbox();
    std::fs::write(dir.path().join("marker.txt"), "").unwrap();
    let out = sandbox
        .execute("run_command", &args(json!({"command": "ls"})))
        .await
        .unwrap();
    assert!(out["stdout"].as_str().unwrap().contains("marker.txt"));
}

#[tokio::test]
async fn test_run_command_reports_nonzero_exit() {
    let (_dir, sandbox) = sandbox();
    let out = sandbox
        .execute("run_command", &args(json!({"command": "ls does-not-exist"})))
        .await
        .unwrap();
    assert_ne!(out["returncode"], 0);
    assert!(!out["stderr"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_command_rejects_chaining_and_unknown_programs() {
    let (_dir, sandbox) = sandbox();
    for command in ["echo hi; ls", "cat x | wc", "rm -rf /", "curl http://x", "make"] {
        let err = sandbox
            .execute("run_command", &args(json!({"command": command})))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ToolError::CommandNotAllowed { .. }),
            "accepted {command}"
        );
    }
}

#[tokio::test]
async fn test_run_command_times_out() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("log.txt"), "line\n").unwrap();
    let sandbox = LocalSandbox::new(dir.path(), None)
        .unwrap()
        .with_command_timeout(Duration::from_millis(300));

    let err = sandbox
        .execute("run_command", &args(json!({"command": "tail -f log.txt"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Timeout { .. }));
}

#[tokio::test]
async fn test_run_tests_maps_unknown_commands_to_default() {
    use duet_agents::tools::exec_tool::RunTestsTool;
    assert_eq!(RunTestsTool::select_command(Some("rm -rf /")), "npm test");
    assert_eq!(RunTestsTool::select_command(Some(" python -m pytest ")), "python -m pytest");
}

// ---------------------------------------------------------------------------
// Orchestrator tool execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_execute_tools_keeps_order_and_isolates_failures() {
    let (dir, sandbox) = sandbox();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();

    let calls = vec![
        ToolCall::new("fs_read", args(json!({"path": "a.txt"}))),
        ToolCall::new("launch_rockets", Map::new()),
        ToolCall::new("fs_list", args(json!({"path": "."}))),
    ];
    let results = execute_tools(&sandbox, &calls).await;

    let names: Vec<&str> = results.iter().map(|r| r.tool.as_str()).collect();
    assert_eq!(names, ["fs_read", "launch_rockets", "fs_list"]);
    assert!(!results[0].is_error());
    assert_eq!(results[0].summary, "Read a.txt (5 chars)");
    assert!(results[1].is_error());
    assert!(results[1].summary.starts_with("Tool execution failed: "));
    assert!(!results[2].is_error());
}
