//! Rig-compatible tools for the duet sandbox.
//!
//! Each tool implements `rig::tool::Tool`. [`LocalSandbox`] owns one of
//! each and dispatches reply tool calls by name. Reads and listings are
//! confined to the project root and the sandbox directory; writes and
//! commands only ever touch the sandbox directory.

pub mod exec_tool;
pub mod fs_tools;
pub mod sandbox;

use std::path::{Path, PathBuf};

use conversation::ToolExecutionError;

pub use sandbox::LocalSandbox;

/// Substrings that make a requested path unacceptable outright.
pub const DANGEROUS_PATHS: &[&str] = &[
    "/etc/", "/root/", "/home/", "/usr/", "/var/", "/sys/", "/proc/", "~/.ssh/", "~/.aws/",
    "~/.config/", ".env", "id_rsa", "passwd",
];

/// Errors that can occur during tool execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsafe path rejected: `{0}`")]
    UnsafePath(String),

    #[error("command `{command}` not allowed")]
    CommandNotAllowed { command: String },

    #[error("command timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("{what} too large ({size} > {limit} bytes)")]
    TooLarge {
        what: &'static str,
        size: u64,
        limit: u64,
    },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("failed to encode tool output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ToolError {
    /// Attach the tool name for the orchestrator's error entry.
    pub fn into_execution_error(self, tool: &str) -> ToolExecutionError {
        ToolExecutionError::new(tool, self.to_string())
    }
}

/// Validate that a resolved path stays within `working_dir`.
///
/// Returns the canonicalized path on success. An absolute `requested`
/// path replaces `working_dir` in the join and is checked as-is.
pub fn sandbox_check(working_dir: &Path, requested: &str) -> Result<PathBuf, ToolError> {
    let candidate = working_dir.join(requested);
    let resolved = candidate
        .canonicalize()
        .or_else(|_| {
            // Target may not exist yet; canonicalize the parent instead.
            match (candidate.parent(), candidate.file_name()) {
                (Some(parent), Some(name)) => Ok(parent.canonicalize()?.join(name)),
                _ => Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "cannot resolve path",
                )),
            }
        })
        .map_err(ToolError::Io)?;

    let canon_root = working_dir.canonicalize().map_err(ToolError::Io)?;

    if !resolved.starts_with(&canon_root) {
        return Err(ToolError::UnsafePath(requested.to_string()));
    }
    Ok(resolved)
}

/// Where tools may read from and write to.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    sandbox_dir: PathBuf,
    project_root: Option<PathBuf>,
}

impl PathPolicy {
    /// Create the sandbox directory if needed and canonicalize both roots.
    pub fn new(sandbox_dir: &Path, project_root: Option<&Path>) -> Result<Self, ToolError> {
        std::fs::create_dir_all(sandbox_dir)?;
        let sandbox_dir = sandbox_dir.canonicalize()?;
        let project_root = project_root.map(Path::canonicalize).transpose()?;
        Ok(Self {
            sandbox_dir,
            project_root,
        })
    }

    pub fn sandbox_dir(&self) -> &Path {
        &self.sandbox_dir
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Resolve a requested path for reading or listing.
    ///
    /// Relative paths resolve against the project root when one is set,
    /// otherwise against the sandbox. The result must lie inside one of them.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, ToolError> {
        if requested.contains("..") || DANGEROUS_PATHS.iter().any(|d| requested.contains(d)) {
            return Err(ToolError::UnsafePath(requested.to_string()));
        }

        let base = self.project_root.as_deref().unwrap_or(&self.sandbox_dir);
        if !Path::new(requested).is_absolute() {
            return sandbox_check(base, requested);
        }

        self.roots()
            .find_map(|root| sandbox_check(root, requested).ok())
            .ok_or_else(|| ToolError::UnsafePath(requested.to_string()))
    }

    fn roots(&self) -> impl Iterator<Item = &Path> {
        self.project_root
            .as_deref()
            .into_iter()
            .chain(std::iter::once(self.sandbox_dir.as_path()))
    }
}

/// Truncate to `max` characters, reporting whether anything was cut.
pub(crate) fn clip(text: &str, max: usize) -> (&str, bool) {
    let clipped = conversation::protocol::truncate_chars(text, max);
    (clipped, clipped.len() < text.len())
}
