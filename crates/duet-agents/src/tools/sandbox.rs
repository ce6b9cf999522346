//! Name-based dispatch over the duet tools.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use conversation::{ToolExecutionError, ToolSandbox};

use super::exec_tool::{RunCommandTool, RunTestsTool};
use super::fs_tools::{FsListTool, FsReadTool, FsWriteTool};
use super::{PathPolicy, ToolError};

/// Local sandbox owning one instance of every tool.
///
/// Calls are serialized: at most one tool runs at a time.
pub struct LocalSandbox {
    policy: Arc<PathPolicy>,
    fs_read: FsReadTool,
    fs_write: FsWriteTool,
    fs_list: FsListTool,
    run_command: RunCommandTool,
    run_tests: RunTestsTool,
    lock: Mutex<()>,
}

impl LocalSandbox {
    /// Create the sandbox directory if needed and build the tool set.
    pub fn new(sandbox_dir: &Path, project_root: Option<&Path>) -> Result<Self, ToolError> {
        let policy = Arc::new(PathPolicy::new(sandbox_dir, project_root)?);
        let dir = policy.sandbox_dir().to_path_buf();
        Ok(Self {
            fs_read: FsReadTool::new(Arc::clone(&policy)),
            fs_write: FsWriteTool::new(Arc::clone(&policy)),
            fs_list: FsListTool::new(Arc::clone(&policy)),
            run_command: RunCommandTool::new(&dir),
            run_tests: RunTestsTool::new(&dir),
            policy,
            lock: Mutex::new(()),
        })
    }

    /// Override the command timeout for `run_command` and `run_tests`.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.run_command.timeout = timeout;
        self.run_tests.timeout = timeout;
        self
    }

    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// Names of every tool this sandbox dispatches.
    pub fn tool_names() -> [&'static str; 5] {
        [
            FsReadTool::NAME,
            FsWriteTool::NAME,
            FsListTool::NAME,
            RunCommandTool::NAME,
            RunTestsTool::NAME,
        ]
    }

    /// Tool definitions for prompt construction.
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            self.fs_read.definition(String::new()).await,
            self.fs_write.definition(String::new()).await,
            self.fs_list.definition(String::new()).await,
            self.run_command.definition(String::new()).await,
            self.run_tests.definition(String::new()).await,
        ]
    }

    /// Run one tool call and return its JSON result.
    pub async fn execute(&self, name: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let _guard = self.lock.lock().await;
        debug!(tool = name, "executing tool");

        match name {
            FsReadTool::NAME => invoke(&self.fs_read, args).await,
            FsWriteTool::NAME => invoke(&self.fs_write, args).await,
            FsListTool::NAME => invoke(&self.fs_list, args).await,
            RunCommandTool::NAME => invoke(&self.run_command, args).await,
            RunTestsTool::NAME => invoke(&self.run_tests, args).await,
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

async fn invoke<T>(tool: &T, args: &Map<String, Value>) -> Result<Value, ToolError>
where
    T: Tool<Error = ToolError>,
    T::Args: DeserializeOwned,
    T::Output: Serialize,
{
    let parsed: T::Args = serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
    let output = tool.call(parsed).await?;
    Ok(serde_json::to_value(output)?)
}

#[async_trait]
impl ToolSandbox for LocalSandbox {
    async fn execute_tool(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolExecutionError> {
        self.execute(name, args)
            .await
            .map_err(|e| e.into_execution_error(name))
    }
}
