//! Closed-schema validation of raw agent replies.
//!
//! The schema is strict: `phase`, `message` and `finish` are required, only
//! the five reply fields are accepted, and each tool call carries exactly
//! `name` and `args`. Length limits count characters.

use serde_json::{Map, Value};

use super::types::{
    truncate_chars, AgentReply, FinishStatus, Phase, ToolCall, MAX_CRITIQUE_CHARS,
    MAX_MESSAGE_CHARS,
};
use crate::error::ReplyError;

const REPLY_FIELDS: &[&str] = &["phase", "message", "tool_calls", "finish", "critiques"];
const TOOL_CALL_FIELDS: &[&str] = &["name", "args"];

/// Prefix marking replies synthesised from a failure.
pub const ERROR_REPLY_PREFIX: &str = "[system error] ";
/// Critique attached to every error reply.
pub const ERROR_REPLY_CRITIQUE: &str = "Please correct the reply format to valid JSON";
const MAX_ERROR_TEXT_CHARS: usize = 400;

/// Validate a raw JSON reply and normalise it into an [`AgentReply`].
///
/// Normalisation trims `message`, defaults `tool_calls` to empty and drops
/// `critiques` when it is blank after trimming.
pub fn validate_agent_reply(raw: &Value) -> Result<AgentReply, ReplyError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ReplyError::schema(format!("reply must be an object, got {}", kind(raw))))?;

    if let Some(field) = obj.keys().find(|k| !REPLY_FIELDS.contains(&k.as_str())) {
        return Err(ReplyError::schema(format!(
            "additional property `{field}` is not allowed"
        )));
    }

    let phase = required_str(obj, "phase")?;
    let phase: Phase = phase.parse().map_err(|_| {
        ReplyError::schema(format!(
            "`phase` must be one of analysis, proposal, implement, review, finalize (got {phase:?})"
        ))
    })?;

    let finish = required_str(obj, "finish")?;
    let finish: FinishStatus = finish.parse().map_err(|_| {
        ReplyError::schema(format!(
            "`finish` must be one of none, handoff, final (got {finish:?})"
        ))
    })?;

    let message = required_str(obj, "message")?;
    let message_len = message.chars().count();
    if message_len > MAX_MESSAGE_CHARS {
        return Err(ReplyError::schema(format!(
            "`message` is {message_len} characters, limit is {MAX_MESSAGE_CHARS}"
        )));
    }

    let tool_calls = match obj.get("tool_calls") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| validate_tool_call(idx, item))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(ReplyError::schema(format!(
                "`tool_calls` must be an array, got {}",
                kind(other)
            )))
        }
    };

    let critiques = match obj.get("critiques") {
        None => None,
        Some(Value::String(text)) => {
            let len = text.chars().count();
            if len > MAX_CRITIQUE_CHARS {
                return Err(ReplyError::schema(format!(
                    "`critiques` is {len} characters, limit is {MAX_CRITIQUE_CHARS}"
                )));
            }
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(other) => {
            return Err(ReplyError::schema(format!(
                "`critiques` must be a string, got {}",
                kind(other)
            )))
        }
    };

    Ok(AgentReply {
        phase,
        message: message.trim().to_string(),
        tool_calls,
        finish,
        critiques,
    })
}

fn validate_tool_call(idx: usize, item: &Value) -> Result<ToolCall, ReplyError> {
    let obj = item.as_object().ok_or_else(|| {
        ReplyError::schema(format!("tool_calls[{idx}] must be an object, got {}", kind(item)))
    })?;

    if let Some(field) = obj.keys().find(|k| !TOOL_CALL_FIELDS.contains(&k.as_str())) {
        return Err(ReplyError::schema(format!(
            "tool_calls[{idx}]: additional property `{field}` is not allowed"
        )));
    }

    let name = match obj.get("name") {
        Some(Value::String(name)) => name.clone(),
        Some(other) => {
            return Err(ReplyError::schema(format!(
                "tool_calls[{idx}].name must be a string, got {}",
                kind(other)
            )))
        }
        None => {
            return Err(ReplyError::schema(format!(
                "tool_calls[{idx}] is missing required field `name`"
            )))
        }
    };

    let args = match obj.get("args") {
        Some(Value::Object(args)) => args.clone(),
        Some(other) => {
            return Err(ReplyError::schema(format!(
                "tool_calls[{idx}].args must be an object, got {}",
                kind(other)
            )))
        }
        None => {
            return Err(ReplyError::schema(format!(
                "tool_calls[{idx}] is missing required field `args`"
            )))
        }
    };

    Ok(ToolCall { name, args })
}

fn required_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str, ReplyError> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ReplyError::schema(format!(
            "`{field}` must be a string, got {}",
            kind(other)
        ))),
        None => Err(ReplyError::schema(format!(
            "missing required field `{field}`"
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build a well-formed reply describing a failure.
///
/// `finish` is always `handoff`: an error never terminates the conversation.
pub fn create_error_reply(error: &str, current_phase: Option<Phase>) -> AgentReply {
    AgentReply {
        phase: current_phase.unwrap_or(Phase::Analysis),
        message: format!(
            "{ERROR_REPLY_PREFIX}{}",
            truncate_chars(error, MAX_ERROR_TEXT_CHARS)
        ),
        tool_calls: Vec::new(),
        finish: FinishStatus::Handoff,
        critiques: Some(ERROR_REPLY_CRITIQUE.to_string()),
    }
}

/// Whether `reply` was produced by [`create_error_reply`].
pub fn is_error_reply(reply: &AgentReply) -> bool {
    reply.message.starts_with(ERROR_REPLY_PREFIX)
}
