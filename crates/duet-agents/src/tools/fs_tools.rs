//! File system tools: read, write, and list files under the path policy.

use std::path::Path;
use std::sync::Arc;

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};

use super::{clip, PathPolicy, ToolError};

/// Files larger than this are refused by `fs_read`.
pub const MAX_READ_BYTES: u64 = 1_000_000;
/// Characters of content returned by `fs_read` before truncation.
pub const MAX_READ_CHARS: usize = 10_000;
/// Largest content `fs_write` accepts.
pub const MAX_WRITE_BYTES: u64 = 100_000;
/// Entries returned by `fs_list`.
pub const MAX_LIST_ENTRIES: usize = 100;

const TRUNCATION_MARKER: &str = "\n[... content truncated ...]";

// ---------------------------------------------------------------------------
// FsReadTool
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct FsReadArgs {
    /// Path relative to the project root (or sandbox), or an absolute path inside either.
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct FsReadOutput {
    pub content: String,
    /// Length of `content` in characters.
    pub size: usize,
    pub summary: String,
}

/// Read a text file inside the project root or sandbox.
pub struct FsReadTool {
    policy: Arc<PathPolicy>,
}

impl FsReadTool {
    pub fn new(policy: Arc<PathPolicy>) -> Self {
        Self { policy }
    }
}

impl Tool for FsReadTool {
    const NAME: &'static str = "fs_read";
    type Error = ToolError;
    type Args = FsReadArgs;
    type Output = FsReadOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.into(),
            description: "Read a text file from the project. Files over 1MB are refused; \
                          long content is truncated."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the project root"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let full_path = self.policy.resolve(&args.path)?;

        let size = std::fs::metadata(&full_path)?.len();
        if size > MAX_READ_BYTES {
            return Err(ToolError::TooLarge {
                what: "file",
                size,
                limit: MAX_READ_BYTES,
            });
        }

        let raw = std::fs::read_to_string(&full_path)?;
        let content = match clip(&raw, MAX_READ_CHARS) {
            (head, true) => format!("{head}{TRUNCATION_MARKER}"),
            (_, false) => raw,
        };
        let size = content.chars().count();

        Ok(FsReadOutput {
            summary: format!("Read {} ({size} chars)", args.path),
            content,
            size,
        })
    }
}

// ---------------------------------------------------------------------------
// FsWriteTool
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct FsWriteArgs {
    /// Only the file name is used; the file always lands in the sandbox.
    pub path: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct FsWriteOutput {
    pub path: String,
    pub summary: String,
}

/// Write a file into the sandbox directory.
pub struct FsWriteTool {
    policy: Arc<PathPolicy>,
}

impl FsWriteTool {
    pub fn new(policy: Arc<PathPolicy>) -> Self {
        Self { policy }
    }
}

impl Tool for FsWriteTool {
    const NAME: &'static str = "fs_write";
    type Error = ToolError;
    type Args = FsWriteArgs;
    type Output = FsWriteOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.into(),
            description: "Write a file into the sandbox directory. Only the file name of \
                          `path` is used. Content is limited to 100KB."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File name to create in the sandbox"
                    },
                    "content": {
                        "type": "string",
                        "description": "The content to write to the file"
                    }
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let file_name = Path::new(&args.path)
            .file_name()
            .ok_or_else(|| ToolError::InvalidArgs(format!("`{}` has no file name", args.path)))?;

        let size = args.content.len() as u64;
        if size > MAX_WRITE_BYTES {
            return Err(ToolError::TooLarge {
                what: "content",
                size,
                limit: MAX_WRITE_BYTES,
            });
        }

        let target = self.policy.sandbox_dir().join(file_name);
        std::fs::write(&target, &args.content)?;

        let shown = target.display().to_string();
        Ok(FsWriteOutput {
            summary: format!("Wrote {} bytes to {shown}", args.content.len()),
            path: shown,
        })
    }
}

// ---------------------------------------------------------------------------
// FsListTool
// ---------------------------------------------------------------------------

fn current_dir() -> String {
    ".".into()
}

#[derive(Deserialize)]
pub struct FsListArgs {
    #[serde(default = "current_dir")]
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct FsListOutput {
    pub files: Vec<String>,
    pub count: usize,
    pub truncated: bool,
    pub summary: String,
}

/// List a directory inside the project root or sandbox.
pub struct FsListTool {
    policy: Arc<PathPolicy>,
}

impl FsListTool {
    pub fn new(policy: Arc<PathPolicy>) -> Self {
        Self { policy }
    }
}

impl Tool for FsListTool {
    const NAME: &'static str = "fs_list";
    type Error = ToolError;
    type Args = FsListArgs;
    type Output = FsListOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.into(),
            description: "List entries of a directory in the project (at most 100).".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory relative to the project root. Defaults to '.'"
                    }
                }
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let dir = self.policy.resolve(&args.path)?;

        let mut files: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();

        let truncated = files.len() > MAX_LIST_ENTRIES;
        files.truncate(MAX_LIST_ENTRIES);
        let count = files.len();

        Ok(FsListOutput {
            summary: format!("Listed {count} items in {}", args.path),
            files,
            count,
            truncated,
        })
    }
}
