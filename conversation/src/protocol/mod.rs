//! Structured reply protocol shared by every agent.

pub mod extract;
pub mod types;
pub mod validate;

pub use extract::{extract_json, parse_agent_reply};
pub use types::{
    truncate_chars, AgentReply, FinishStatus, Phase, Role, ToolCall, ToolResult, Turn,
    MAX_CRITIQUE_CHARS, MAX_MESSAGE_CHARS,
};
pub use validate::{
    create_error_reply, is_error_reply, validate_agent_reply, ERROR_REPLY_CRITIQUE,
    ERROR_REPLY_PREFIX,
};

/// JSON schema for [`AgentReply`], rendered for system prompts.
pub fn reply_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(AgentReply);
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}
