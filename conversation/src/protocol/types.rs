//! Reply protocol types: phases, finish status, roles, replies and turns.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigurationError;

/// Maximum length of `AgentReply::message`, in characters.
pub const MAX_MESSAGE_CHARS: usize = 500;
/// Maximum length of `AgentReply::critiques`, in characters.
pub const MAX_CRITIQUE_CHARS: usize = 200;

/// Stage of the collaborative workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Analysis,
    Proposal,
    Implement,
    Review,
    Finalize,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Self::Analysis,
        Self::Proposal,
        Self::Implement,
        Self::Review,
        Self::Finalize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Proposal => "proposal",
            Self::Implement => "implement",
            Self::Review => "review",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| ConfigurationError::new(format!("invalid phase: {s}")))
    }
}

/// Completion signal carried by every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FinishStatus {
    /// Mid-phase; more work expected.
    None,
    /// Yield control per the phase's transition rule.
    Handoff,
    /// Terminal answer reached.
    Final,
}

impl FinishStatus {
    pub const ALL: [FinishStatus; 3] = [Self::None, Self::Handoff, Self::Final];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Handoff => "handoff",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for FinishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FinishStatus {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|finish| finish.as_str() == s)
            .ok_or_else(|| ConfigurationError::new(format!("invalid finish status: {s}")))
    }
}

/// Side of the conversation.
///
/// `Facilitator` is accepted for role assignment and prompting, but the
/// state machine only ever selects `Executor` or `Reviewer` as speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Executor,
    Reviewer,
    Facilitator,
}

impl Role {
    pub const ALL: [Role; 3] = [Self::Executor, Self::Reviewer, Self::Facilitator];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executor => "executor",
            Self::Reviewer => "reviewer",
            Self::Facilitator => "facilitator",
        }
    }

    /// The other speaking side. Anything that is not the executor hands to the executor.
    pub fn opposite(self) -> Self {
        match self {
            Self::Executor => Self::Reviewer,
            Self::Reviewer | Self::Facilitator => Self::Executor,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ConfigurationError::new(format!("invalid role: {s}")))
    }
}

/// One requested tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ToolCall {
    pub name: String,
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Canonical structured reply. Produced only by validation or by
/// [`create_error_reply`](crate::protocol::create_error_reply).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AgentReply {
    pub phase: Phase,
    #[schemars(length(max = 500))]
    pub message: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub finish: FinishStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(max = 200))]
    pub critiques: Option<String>,
}

impl AgentReply {
    /// Reply with no tool calls and no critique.
    pub fn new(phase: Phase, message: impl Into<String>, finish: FinishStatus) -> Self {
        Self {
            phase,
            message: message.into(),
            tool_calls: Vec::new(),
            finish,
            critiques: None,
        }
    }

    pub fn with_critiques(mut self, critiques: impl Into<String>) -> Self {
        self.critiques = Some(critiques.into());
        self
    }

    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn is_final(&self) -> bool {
        self.finish == FinishStatus::Final
    }
}

/// Outcome of one executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub summary: String,
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One accepted exchange. Immutable once appended to a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    /// Which backend produced the reply (opaque provider name).
    pub agent_type: String,
    pub reply: AgentReply,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    /// Wall-clock seconds spent producing the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Turn {
    pub fn new(role: Role, agent_type: impl Into<String>, reply: AgentReply) -> Self {
        Self {
            role,
            agent_type: agent_type.into(),
            reply,
            tool_results: None,
            token_count: None,
            duration: None,
        }
    }

    pub fn with_token_count(mut self, tokens: u64) -> Self {
        self.token_count = Some(tokens);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
