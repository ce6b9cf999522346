//! Transcript persistence.
//!
//! Two files per session under `<output_dir>/transcripts/`:
//! - `<session_id>.json`: full machine-readable record, numbered turns
//! - `<session_id>_readable.txt`: plain-text rendering for humans

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::info;

use conversation::{AgentReply, EndReason, Role, RunOutcome, ToolResult, Turn};

pub const TRANSCRIPTS_DIR: &str = "transcripts";
pub const LOGS_DIR: &str = "logs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_number: usize,
    pub role: Role,
    pub agent_type: String,
    pub reply: AgentReply,
    pub tool_results: Option<Vec<ToolResult>>,
    pub token_count: Option<u64>,
    pub duration: Option<f64>,
}

impl TurnRecord {
    fn from_turn(turn_number: usize, turn: &Turn) -> Self {
        Self {
            turn_number,
            role: turn.role,
            agent_type: turn.agent_type.clone(),
            reply: turn.reply.clone(),
            tool_results: turn.tool_results.clone(),
            token_count: turn.token_count,
            duration: turn.duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub session_id: String,
    pub task: String,
    pub start_time: String,
    pub end_time: String,
    pub final_result: Option<String>,
    pub finalized: bool,
    pub end_reason: EndReason,
    pub total_tokens: u64,
    pub turns: Vec<TurnRecord>,
}

/// Where a session's files were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptPaths {
    pub json: PathBuf,
    pub readable: PathBuf,
}

pub struct TranscriptWriter {
    output_dir: PathBuf,
    session_id: String,
    start_time: DateTime<Local>,
}

impl TranscriptWriter {
    /// Create `transcripts/` and `logs/` under `output_dir` and start a session
    /// named after the current local time.
    pub fn new(output_dir: &Path) -> io::Result<Self> {
        let start_time = Local::now();
        let session_id = start_time.format("%Y%m%d_%H%M%S").to_string();
        Self::with_session_id(output_dir, session_id)
    }

    pub fn with_session_id(output_dir: &Path, session_id: impl Into<String>) -> io::Result<Self> {
        std::fs::create_dir_all(output_dir.join(TRANSCRIPTS_DIR))?;
        std::fs::create_dir_all(output_dir.join(LOGS_DIR))?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            session_id: session_id.into(),
            start_time: Local::now(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Build the record for `outcome`, stamped with the current time as end.
    pub fn record(&self, task: &str, outcome: &RunOutcome) -> TranscriptRecord {
        TranscriptRecord {
            session_id: self.session_id.clone(),
            task: task.to_string(),
            start_time: self.start_time.to_rfc3339(),
            end_time: Local::now().to_rfc3339(),
            final_result: outcome.final_result.clone(),
            finalized: outcome.finalized,
            end_reason: outcome.end_reason,
            total_tokens: outcome.total_tokens,
            turns: outcome
                .transcript
                .iter()
                .enumerate()
                .map(|(i, turn)| TurnRecord::from_turn(i + 1, turn))
                .collect(),
        }
    }

    pub fn save(&self, task: &str, outcome: &RunOutcome) -> io::Result<TranscriptPaths> {
        let record = self.record(task, outcome);
        let dir = self.output_dir.join(TRANSCRIPTS_DIR);

        let json = dir.join(format!("{}.json", self.session_id));
        let encoded = serde_json::to_string_pretty(&record).map_err(io::Error::other)?;
        std::fs::write(&json, encoded)?;

        let readable = dir.join(format!("{}_readable.txt", self.session_id));
        std::fs::write(&readable, render_readable(&record))?;

        info!(json = %json.display(), readable = %readable.display(), "transcript saved");
        Ok(TranscriptPaths { json, readable })
    }
}

fn role_display(role: Role) -> &'static str {
    match role {
        Role::Executor => "Executor",
        Role::Reviewer => "Reviewer",
        Role::Facilitator => "Facilitator",
    }
}

/// Plain-text rendering of a transcript record.
pub fn render_readable(record: &TranscriptRecord) -> String {
    let mut out = String::new();
    out.push_str("Duet Transcript\n");
    out.push_str(&format!("Session: {}\n", record.session_id));
    out.push_str(&format!("Task: {}\n", record.task));
    out.push_str(&format!("Start: {}\n", record.start_time));
    out.push_str(&format!("End: {}\n", record.end_time));
    out.push_str(&"=".repeat(50));
    out.push_str("\n\n");

    for turn in &record.turns {
        out.push_str(&format!(
            "Turn {} - {} ({})\n",
            turn.turn_number,
            role_display(turn.role),
            turn.agent_type
        ));
        out.push_str(&format!(
            "Phase: {} | Status: {}\n",
            turn.reply.phase, turn.reply.finish
        ));
        out.push_str(&format!("Message: {}\n", turn.reply.message));

        if !turn.reply.tool_calls.is_empty() {
            let calls: Vec<String> = turn
                .reply
                .tool_calls
                .iter()
                .map(|c| format!("{}({})", c.name, serde_json::Value::Object(c.args.clone())))
                .collect();
            out.push_str(&format!("Tool calls: {}\n", calls.join(", ")));
        }
        if let Some(results) = &turn.tool_results {
            for result in results {
                out.push_str(&format!("Tool result: {}\n", result.summary));
            }
        }
        if let Some(critiques) = turn.reply.critiques.as_deref().filter(|c| !c.is_empty()) {
            out.push_str(&format!("Critiques: {critiques}\n"));
        }

        out.push('\n');
        out.push_str(&"-".repeat(30));
        out.push_str("\n\n");
    }

    if let Some(final_result) = &record.final_result {
        out.push_str(&format!("Final:\n{final_result}\n"));
    }
    out
}
