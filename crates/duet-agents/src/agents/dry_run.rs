//! Offline agent for `--dry-run`.

use async_trait::async_trait;

use conversation::{Agent, AgentReply, FinishStatus, Generation, OrchestratorPrompt};

/// Tokens charged per mock reply.
pub const DRY_RUN_TOKENS: u64 = 100;
/// 1-based turn number from which mock replies are `final`.
pub const DRY_RUN_FINAL_TURN: usize = 3;

/// Deterministic mock replies in the current phase. Makes no network calls.
pub struct DryRunAgent {
    name: String,
}

impl DryRunAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Agent for DryRunAgent {
    fn agent_type(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &OrchestratorPrompt) -> Generation {
        let turn_number = prompt.context.turn_count + 1;
        let finish = if turn_number >= DRY_RUN_FINAL_TURN {
            FinishStatus::Final
        } else {
            FinishStatus::Handoff
        };
        let reply = AgentReply::new(
            prompt.current_phase,
            format!("[Dry run] Turn {turn_number} mock response from {}", prompt.role),
            finish,
        );
        Generation::new(reply).with_tokens(DRY_RUN_TOKENS)
    }
}
