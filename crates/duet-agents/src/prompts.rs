//! Prompt construction for duet agents.
//!
//! The system prompt is assembled from the JSON reply contract, role
//! preamble, task-type focus block and few-shot examples. The user prompt
//! is kept compact: the task, the speaker's position, a context digest and
//! the last few turns of the window.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content changes.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use conversation::protocol::reply_schema;
use conversation::{AgentContext, OrchestratorPrompt, Role, Turn};

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Turns shown in the user prompt.
const RECENT_TURNS: usize = 3;
const TURN_MESSAGE_CHARS: usize = 150;
const SUMMARY_CHARS: usize = 200;
const CRITIQUE_CHARS: usize = 100;

pub const EXECUTOR_PREAMBLE: &str = "\
You are the code executor. Your responsibilities:
- Analyze problems and propose concrete solutions
- Write and modify code
- Execute tests for verification
- Respond to reviewer feedback and make improvements

Always reply in JSON format with these fields:
- phase: current phase (analysis/proposal/implement/review/finalize)
- message: concise text explanation (limit 300 chars)
- tool_calls: tool invocation list (optional, format: [{\"name\": \"tool_name\", \"args\": {...}}])
- finish: completion status (none/handoff/final)
- critiques: questions or concerns for the reviewer (optional)

Keep replies concise and focused, use tools to verify your solutions.";

pub const REVIEWER_PREAMBLE: &str = "\
You are the code reviewer. Your responsibilities:
- Review solutions proposed by the executor
- Identify potential issues, risks, and improvement points
- Verify code quality, performance, and security
- Provide constructive improvement suggestions

Always reply in JSON format with these fields:
- phase: current phase (analysis/proposal/implement/review/finalize)
- message: concise review feedback (limit 300 chars)
- tool_calls: tool invocation list (optional, for verification)
- finish: completion status (none/handoff/final)
- critiques: specific improvement suggestions

Focus on code correctness, efficiency, maintainability, and potential risks. \
When the work is complete, reply with finish=final and start the message with FINAL:";

pub const FACILITATOR_PREAMBLE: &str = "\
You are the collaboration facilitator. Your responsibilities:
- Drive discussion progress and ensure focus on task goals
- Coordinate between executor and reviewer
- Identify key decision points and facilitate consensus
- Arbitrate when necessary

Always reply in JSON format with these fields:
- phase: current phase (analysis/proposal/implement/review/finalize)
- message: coordination explanation or decision (limit 200 chars)
- tool_calls: empty (the facilitator does not use tools)
- finish: completion status (none/handoff/final)
- critiques: guidance for both parties

Stay neutral and promote efficient collaboration.";

/// Appended to the role prompt on every retry.
pub const RETRY_HINT: &str =
    "The previous reply was not valid JSON for the schema. Return strictly the JSON object.";

/// The kind of work a task asks for. Selects the focus block of the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskType {
    Debug,
    Review,
    Design,
    #[default]
    Implement,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [Self::Debug, Self::Review, Self::Design, Self::Implement];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Review => "review",
            Self::Design => "design",
            Self::Implement => "implement",
        }
    }

    /// Keywords (English and Chinese) that select this task type.
    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Debug => &["调试", "debug", "修复", "bug", "错误"],
            Self::Review => &["审查", "review", "检查", "评估"],
            Self::Design => &["设计", "design", "架构", "方案"],
            Self::Implement => &["实现", "implement", "开发", "编写"],
        }
    }

    fn focus(self) -> &'static str {
        match self {
            Self::Debug => "\
Current task type: Problem debugging
Focus areas:
- Accurately identify root cause
- Minimize modification scope
- Verify fix effectiveness
- Ensure no new issues introduced",
            Self::Review => "\
Current task type: Code review
Focus areas:
- Code quality and standards
- Performance and security issues
- Architecture reasonableness
- Test coverage",
            Self::Design => "\
Current task type: Solution design
Focus areas:
- Requirements understanding and analysis
- Architecture design reasonableness
- Extensibility and maintainability
- Appropriate technology selection",
            Self::Implement => "\
Current task type: Feature implementation
Focus areas:
- Feature completeness
- Code quality
- Test verification
- Documentation improvement",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown task type `{s}` (expected debug, review, design or implement)")
            })
    }
}

/// Infer the task type from the task text. The first matching type in
/// debug, review, design, implement order wins; no match means implement.
pub fn infer_task_type(task: &str) -> TaskType {
    let lower = task.to_lowercase();
    TaskType::ALL
        .into_iter()
        .find(|t| t.keywords().iter().any(|k| lower.contains(k)))
        .unwrap_or_default()
}

pub fn role_preamble(role: Role) -> &'static str {
    match role {
        Role::Executor => EXECUTOR_PREAMBLE,
        Role::Reviewer => REVIEWER_PREAMBLE,
        Role::Facilitator => FACILITATOR_PREAMBLE,
    }
}

/// Example replies shown to a role. The facilitator gets none.
pub fn few_shot_examples(role: Role) -> Vec<(&'static str, Value)> {
    match role {
        Role::Executor => vec![(
            "analysis_example",
            json!({
                "phase": "analysis",
                "message": "Analysis shows login function lacks proper error handling for empty \
                            username, causing 500 errors. Need parameter validation.",
                "tool_calls": [{"name": "fs_read", "args": {"path": "src/auth.py"}}],
                "finish": "handoff",
                "critiques": "Please review if this analysis is accurate and complete"
            }),
        )],
        Role::Reviewer => vec![(
            "review_example",
            json!({
                "phase": "review",
                "message": "Solution is basically correct, but suggest adding logging and more \
                            specific error messages. Parameter validation should be at route \
                            layer not business logic.",
                "tool_calls": [],
                "finish": "handoff",
                "critiques": "Suggest refactoring validation logic location and adding \
                              appropriate error logging"
            }),
        )],
        Role::Facilitator => Vec::new(),
    }
}

/// Role preamble, task focus and examples for one speaker.
pub fn role_prompt(role: Role, task_type: TaskType) -> String {
    let mut prompt = format!("{}\n\n{}", role_preamble(role), task_type.focus());
    let examples = few_shot_examples(role);
    if !examples.is_empty() {
        prompt.push_str("\n\nExample reply format:\n");
        for (name, example) in examples {
            prompt.push_str(&format!("{name}: {example}\n"));
        }
    }
    prompt
}

/// Full system prompt: JSON contract with the reply schema, then `role_prompt`.
pub fn system_prompt(role_prompt: &str) -> String {
    let schema = serde_json::to_string_pretty(&reply_schema()).unwrap_or_default();
    format!(
        "You are a collaborating AI agent. Reply strictly in JSON or the reply is rejected \
         and retried.

JSON Schema (follow strictly):
{schema}

Requirements:
1. The reply must be a single valid JSON object with no other text
2. Include every required field: phase, message, finish
3. Keep message within 500 characters and critiques within 200
4. Use only the listed enum values
5. Do not explain or add comments, return only JSON

Example valid reply:
{{
    \"phase\": \"analysis\",
    \"message\": \"Analyzed the problem; the algorithm complexity needs work\",
    \"tool_calls\": [],
    \"finish\": \"handoff\",
    \"critiques\": \"Please check whether this analysis is accurate\"
}}

{role_prompt}"
    )
}

/// Compact user prompt for a normal attempt.
pub fn user_prompt(prompt: &OrchestratorPrompt) -> String {
    let context = format_context(&prompt.context);
    let transcript = format_transcript(&prompt.transcript);
    format!(
        "Task: {task}

Your role: {role}
Current phase: {phase}

{context}

Recent conversation:
{transcript}

Return only the JSON reply matching the schema, no other text:",
        task = prompt.task,
        role = prompt.role,
        phase = prompt.current_phase,
    )
}

/// Stripped-down user prompt for the last retry.
pub fn simplified_user_prompt(prompt: &OrchestratorPrompt) -> String {
    format!(
        "Task: {task}
Role: {role}
Phase: {phase}

Reply with a JSON object containing only phase, message and finish.
Keep the message under 200 characters.

Return JSON:",
        task = prompt.task,
        role = prompt.role,
        phase = prompt.current_phase,
    )
}

fn ellipsize(text: &str, max: usize) -> String {
    let head = conversation::protocol::truncate_chars(text, max);
    if head.len() < text.len() {
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn format_context(context: &AgentContext) -> String {
    let mut parts = Vec::new();

    if !context.running_summary.is_empty() {
        parts.push(format!(
            "Key summary: {}",
            ellipsize(&context.running_summary, SUMMARY_CHARS)
        ));
    }
    if let Some(critique) = context.last_critique.as_deref().filter(|c| !c.is_empty()) {
        parts.push(format!("Last critique: {}", ellipsize(critique, CRITIQUE_CHARS)));
    }

    let mut progress = format!("Progress: {}/{} turns", context.turn_count, context.max_turns);
    if context.total_tokens > 0 {
        progress.push_str(&format!(" | Tokens: {}", context.total_tokens));
    }
    parts.push(progress);

    if let Some(feedback) = &context.error_feedback {
        parts.push(format!("Error feedback: {feedback}"));
    }

    parts.join("\n")
}

fn format_transcript(transcript: &[Turn]) -> String {
    if transcript.is_empty() {
        return "(conversation start)".into();
    }

    let start = transcript.len().saturating_sub(RECENT_TURNS);
    let mut lines = Vec::new();
    for turn in &transcript[start..] {
        lines.push(format!(
            "{}: {}",
            turn.role,
            ellipsize(&turn.reply.message, TURN_MESSAGE_CHARS)
        ));
        if let Some(results) = turn.tool_results.as_ref().filter(|r| !r.is_empty()) {
            lines.push(format!("   [tools: {} results]", results.len()));
        }
    }
    lines.join("\n")
}
