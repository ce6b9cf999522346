//! Restricted command execution tools.
//!
//! Commands are checked against a block list and an allow list, split with
//! `shlex` and spawned directly (no shell) in the sandbox directory with a
//! minimal environment and a hard timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};

use super::{clip, ToolError};

/// Exact commands or command prefixes (followed by a space) that may run.
pub const ALLOWED_COMMANDS: &[&str] = &[
    "ls",
    "cat",
    "grep",
    "find",
    "head",
    "tail",
    "wc",
    "echo",
    "git status",
    "git diff",
    "git log",
    "npm test",
    "python -m pytest",
    "python -c",
    "node -e",
];

/// Substrings that reject a command regardless of the allow list.
pub const BLOCKED_PATTERNS: &[&str] = &[
    "rm -rf", "sudo", "curl", "wget", "ssh", "scp", "chmod +x", "exec", "eval", "import os",
    "subprocess", "__import__", "&", "|", ";", "$(", "`", "&&", "||",
];

/// Test commands `run_tests` may map to. The first is the default.
pub const SAFE_TEST_COMMANDS: &[&str] = &["npm test", "python -m pytest"];

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_STDOUT_CHARS: usize = 2000;
const MAX_STDERR_CHARS: usize = 500;

/// Check a command line against the block and allow lists.
pub fn validate_command(command: &str) -> Result<(), ToolError> {
    let command = command.trim();
    let rejected = || ToolError::CommandNotAllowed {
        command: command.to_string(),
    };

    if command.is_empty() || BLOCKED_PATTERNS.iter().any(|p| command.contains(p)) {
        return Err(rejected());
    }

    let allowed = ALLOWED_COMMANDS
        .iter()
        .any(|a| command == *a || command.starts_with(&format!("{a} ")));
    if allowed {
        Ok(())
    } else {
        Err(rejected())
    }
}

fn safe_env(sandbox_dir: &Path) -> Vec<(String, String)> {
    let dir = sandbox_dir.display().to_string();
    let mut env = vec![
        ("PATH".to_string(), "/usr/local/bin:/usr/bin:/bin".to_string()),
        ("HOME".to_string(), dir.clone()),
        ("TMPDIR".to_string(), dir),
        ("USER".to_string(), "sandbox".to_string()),
    ];
    for passthrough in ["NODE_PATH", "PYTHONPATH"] {
        if let Ok(value) = std::env::var(passthrough) {
            env.push((passthrough.to_string(), value));
        }
    }
    env
}

#[derive(Debug, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or -1 when the process was killed by a signal.
    pub returncode: i32,
    pub summary: String,
}

/// Validate and run `command` in `sandbox_dir`.
///
/// A non-zero exit is still `Ok` so the agent can read the output.
pub async fn run_restricted(
    sandbox_dir: &Path,
    command: &str,
    timeout: Duration,
) -> Result<CommandOutput, ToolError> {
    validate_command(command)?;

    let argv = shlex::split(command)
        .filter(|argv| !argv.is_empty())
        .ok_or_else(|| ToolError::InvalidArgs(format!("cannot parse command `{command}`")))?;

    let child = tokio::process::Command::new(&argv[0])
        .args(&argv[1..])
        .current_dir(sandbox_dir)
        .env_clear()
        .envs(safe_env(sandbox_dir))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(ToolError::Timeout {
                seconds: timeout.as_secs(),
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let returncode = output.status.code().unwrap_or(-1);

    Ok(CommandOutput {
        stdout: clip(&stdout, MAX_STDOUT_CHARS).0.to_string(),
        stderr: clip(&stderr, MAX_STDERR_CHARS).0.to_string(),
        returncode,
        summary: format!("Executed: {command} (exit code: {returncode})"),
    })
}

// ---------------------------------------------------------------------------
// RunCommandTool
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RunCommandArgs {
    /// The command to run (e.g. "git diff").
    pub command: String,
}

/// Execute an allow-listed command inside the sandbox directory.
pub struct RunCommandTool {
    pub sandbox_dir: PathBuf,
    pub timeout: Duration,
}

impl RunCommandTool {
    pub fn new(sandbox_dir: &Path) -> Self {
        Self {
            sandbox_dir: sandbox_dir.to_path_buf(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Tool for RunCommandTool {
    const NAME: &'static str = "run_command";
    type Error = ToolError;
    type Args = RunCommandArgs;
    type Output = CommandOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.into(),
            description: format!(
                "Run a command in the sandbox directory without a shell. Allowed: {}. \
                 Pipes, redirects and command chaining are rejected.",
                ALLOWED_COMMANDS.join(", ")
            ),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The command to run (e.g. 'git status', 'ls -la')"
                    }
                },
                "required": ["command"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        run_restricted(&self.sandbox_dir, &args.command, self.timeout).await
    }
}

// ---------------------------------------------------------------------------
// RunTestsTool
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RunTestsArgs {
    #[serde(default)]
    pub command: Option<String>,
}

/// Run the project's tests with one of [`SAFE_TEST_COMMANDS`].
pub struct RunTestsTool {
    pub sandbox_dir: PathBuf,
    pub timeout: Duration,
}

impl RunTestsTool {
    pub fn new(sandbox_dir: &Path) -> Self {
        Self {
            sandbox_dir: sandbox_dir.to_path_buf(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Map a requested command onto a safe test command; anything unknown
    /// becomes the default.
    pub fn select_command(requested: Option<&str>) -> &'static str {
        requested
            .map(str::trim)
            .and_then(|req| SAFE_TEST_COMMANDS.iter().copied().find(|safe| *safe == req))
            .unwrap_or(SAFE_TEST_COMMANDS[0])
    }
}

impl Tool for RunTestsTool {
    const NAME: &'static str = "run_tests";
    type Error = ToolError;
    type Args = RunTestsArgs;
    type Output = CommandOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.into(),
            description: format!(
                "Run the test suite in the sandbox. One of: {} (default: {}).",
                SAFE_TEST_COMMANDS.join(", "),
                SAFE_TEST_COMMANDS[0]
            ),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Test command to run"
                    }
                }
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let command = Self::select_command(args.command.as_deref());
        run_restricted(&self.sandbox_dir, command, self.timeout).await
    }
}
