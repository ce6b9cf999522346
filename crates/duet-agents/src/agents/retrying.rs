//! Retrying reply generation over a [`ChatBackend`].
//!
//! Each attempt rebuilds the prompts. Retries lower the temperature, add a
//! stricter JSON hint to the role prompt, shrink `max_tokens`, and on the
//! final attempt swap in a stripped-down user prompt. Exhaustion yields an
//! error reply; with recovery enabled that error is fed back for one more
//! full generation.

use async_trait::async_trait;
use tracing::{debug, warn};

use conversation::{
    create_error_reply, is_error_reply, parse_agent_reply, Agent, Generation, OrchestratorPrompt,
    RetryDecision, RetryPolicy, RetryState,
};

use super::backend::{estimate_exchange, ChatBackend, ChatRequest};
use crate::prompts::{self, TaskType};

const MIN_TEMPERATURE: f64 = 0.1;
const TEMPERATURE_STEP: f64 = 0.2;
/// Token cap for retry attempts.
const RETRY_MAX_TOKENS: u64 = 800;
/// Attempt index (0-based) from which the simplified user prompt is used.
const SIMPLIFY_FROM_ATTEMPT: u32 = 2;

/// Temperature for the 0-based `attempt`.
pub fn annealed_temperature(base: f64, attempt: u32) -> f64 {
    (base - TEMPERATURE_STEP * f64::from(attempt)).max(MIN_TEMPERATURE)
}

/// [`Agent`] that wraps a backend with extraction, validation and retries.
pub struct RetryingAgent<B> {
    backend: B,
    temperature: f64,
    max_tokens: u64,
    task_type: Option<TaskType>,
    policy: RetryPolicy,
    recovery: bool,
}

impl<B: ChatBackend> RetryingAgent<B> {
    pub fn new(backend: B, temperature: f64, max_tokens: u64) -> Self {
        Self {
            backend,
            temperature,
            max_tokens,
            task_type: None,
            policy: RetryPolicy::default(),
            recovery: true,
        }
    }

    /// Fix the task type instead of inferring it from the task text.
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_recovery(mut self, enabled: bool) -> Self {
        self.recovery = enabled;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Build the request for the 0-based `attempt`.
    pub fn build_request(&self, prompt: &OrchestratorPrompt, attempt: u32) -> ChatRequest {
        let task_type = self
            .task_type
            .unwrap_or_else(|| prompts::infer_task_type(&prompt.task));

        let mut role_prompt = prompts::role_prompt(prompt.role, task_type);
        if attempt > 0 {
            role_prompt.push_str(&format!(
                "\n\nRetry {}: {}",
                attempt + 1,
                prompts::RETRY_HINT
            ));
        }

        let user = if attempt >= SIMPLIFY_FROM_ATTEMPT {
            prompts::simplified_user_prompt(prompt)
        } else {
            prompts::user_prompt(prompt)
        };

        ChatRequest {
            system: prompts::system_prompt(&role_prompt),
            user,
            temperature: annealed_temperature(self.temperature, attempt),
            max_tokens: if attempt > 0 {
                self.max_tokens.min(RETRY_MAX_TOKENS)
            } else {
                self.max_tokens
            },
        }
    }

    /// One generation call: up to `policy.max_attempts` backend attempts.
    async fn generate_once(&self, prompt: &OrchestratorPrompt) -> Generation {
        let mut state = RetryState::new(self.policy);
        let mut tokens = 0u64;

        loop {
            let attempt = state.begin_attempt();
            let request = self.build_request(prompt, attempt);

            let error = match self.backend.complete(&request).await {
                Ok(completion) => {
                    tokens += completion
                        .tokens
                        .unwrap_or_else(|| estimate_exchange(&request, &completion.text));
                    match parse_agent_reply(&completion.text) {
                        Ok(reply) => return Generation::new(reply).with_tokens(tokens),
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            match state.record_failure(error) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        provider = self.backend.name(),
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        error = ?state.last_error(),
                        "Reply rejected, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => break,
            }
        }

        let attempts = state.attempts();
        let reason = state
            .into_last_error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown failure".into());
        warn!(
            provider = self.backend.name(),
            attempts,
            error = %reason,
            "Reply generation exhausted retries"
        );
        let reply = create_error_reply(
            &format!("agent generation failed after {attempts} attempts: {reason}"),
            Some(prompt.current_phase),
        );
        Generation::new(reply).with_tokens(tokens)
    }
}

#[async_trait]
impl<B: ChatBackend> Agent for RetryingAgent<B> {
    fn agent_type(&self) -> &str {
        self.backend.name()
    }

    async fn generate(&self, prompt: &OrchestratorPrompt) -> Generation {
        let first = self.generate_once(prompt).await;
        if !self.recovery || !is_error_reply(&first.reply) {
            return first;
        }

        debug!(provider = self.backend.name(), "running recovery generation");
        let mut recovery = prompt.clone();
        recovery.context.error_feedback = Some(format!(
            "Previous reply was malformed: {}. Return strictly the JSON schema.",
            first.reply.message
        ));

        let second = self.generate_once(&recovery).await;
        let tokens = first.token_count.unwrap_or(0) + second.token_count.unwrap_or(0);
        Generation::new(second.reply).with_tokens(tokens)
    }
}
