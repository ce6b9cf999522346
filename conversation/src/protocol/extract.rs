//! Locate a JSON object inside free-form model output.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::types::{truncate_chars, AgentReply};
use super::validate::validate_agent_reply;
use crate::error::ReplyError;

const EXCERPT_CHARS: usize = 200;

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// Extract the first JSON object found in `text`.
///
/// Candidates are tried in order: a fenced code block holding an object,
/// the span from the first `{` to the last `}`, then the whole trimmed text.
/// The first candidate that parses as an object wins.
pub fn extract_json(text: &str) -> Result<Map<String, Value>, ReplyError> {
    let mut candidates: Vec<&str> = Vec::with_capacity(3);

    if let Some(captures) = fence_pattern().and_then(|re| re.captures(text)) {
        if let Some(body) = captures.get(1) {
            candidates.push(body.as_str());
        }
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(&text[start..=end]);
        }
    }
    candidates.push(text.trim());

    let mut last_reason = String::from("no JSON object found");
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(other) => last_reason = format!("expected a JSON object, found {other}"),
            Err(e) => last_reason = e.to_string(),
        }
    }

    Err(ReplyError::Parse {
        reason: last_reason,
        excerpt: truncate_chars(text, EXCERPT_CHARS).to_string(),
    })
}

/// Extract and validate a reply from raw model text.
pub fn parse_agent_reply(text: &str) -> Result<AgentReply, ReplyError> {
    let map = extract_json(text)?;
    validate_agent_reply(&Value::Object(map))
}
