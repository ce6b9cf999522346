//! Conversation engine for executor/reviewer agent duets.
//!
//! - [`protocol`]: reply types, closed-schema validation, JSON extraction, error replies
//! - [`state_machine`]: deterministic (reply, speaker) → (phase, speaker) transitions
//! - [`manager`]: transcript ownership, windowing, running summary, per-role context
//! - [`retry`]: pure retry/back-off decisions for one generation call
//! - [`orchestrator`]: the turn loop plus the agent and sandbox contracts

pub mod error;
pub mod manager;
pub mod orchestrator;
pub mod protocol;
pub mod retry;
pub mod state_machine;

pub use error::{ConfigurationError, ReplyError, RetryCategory, RunError, ToolExecutionError};
pub use manager::{AgentContext, ConversationManager, DecisionNote};
pub use orchestrator::{
    extract_final_result, Agent, EndReason, Generation, OrchestratorConfig, OrchestratorPrompt,
    RoleAssignment, RunOutcome, ToolSandbox, TurnOrchestrator, DEFAULT_FINAL_MARKER,
};
pub use protocol::{
    create_error_reply, extract_json, is_error_reply, parse_agent_reply, validate_agent_reply,
    AgentReply, FinishStatus, Phase, Role, ToolCall, ToolResult, Turn,
};
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use state_machine::{next_state, StateMachine, TransitionRecord};
