//! Turn orchestrator: generate → append → check termination, one turn at a time.
//!
//! ## Lifecycle
//!
//! ```text
//! TurnOrchestrator::run(task)
//!   → ConversationManager::new(max_turns, window_size)  : ConfigurationError is fatal
//!   → preflight: agents for every role, sandbox when tools are on
//!   → loop:
//!       check cancellation / can_continue / token budget
//!       resolve provider for current speaker
//!       agent.generate(prompt)                           : never fails, may be an error reply
//!       execute tool calls in order (optional)
//!       manager.add_turn(turn)
//!       stop on finish == final
//!   → extract_final_result(transcript)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigurationError, RunError, ToolExecutionError};
use crate::manager::{default_window, AgentContext, ConversationManager};
use crate::protocol::{truncate_chars, AgentReply, FinishStatus, Phase, Role, ToolCall, ToolResult, Turn};

/// Marker separating the final answer from any preamble in a `final` reply.
pub const DEFAULT_FINAL_MARKER: &str = "FINAL:";

// ── Collaborator contracts ───────────────────────────────────────────────────

/// Everything an agent needs to produce the next reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorPrompt {
    pub task: String,
    pub role: Role,
    pub current_phase: Phase,
    /// Windowed transcript; older turns are represented by the running summary.
    pub transcript: Vec<Turn>,
    pub context: AgentContext,
}

/// A validated reply plus the tokens spent producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub reply: AgentReply,
    pub token_count: Option<u64>,
}

impl Generation {
    pub fn new(reply: AgentReply) -> Self {
        Self {
            reply,
            token_count: None,
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.token_count = Some(tokens);
        self
    }
}

/// Reply generator for one provider.
///
/// Implementations own extraction, validation and retries. On exhaustion
/// they return an error reply instead of failing.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Opaque backend name recorded on every turn.
    fn agent_type(&self) -> &str;

    async fn generate(&self, prompt: &OrchestratorPrompt) -> Generation;
}

/// Executes tool calls on behalf of the orchestrator.
///
/// The result object should carry a `summary` string.
#[async_trait]
pub trait ToolSandbox: Send + Sync {
    async fn execute_tool(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolExecutionError>;
}

// ── Configuration ────────────────────────────────────────────────────────────

/// Which provider plays which role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    by_role: BTreeMap<Role, String>,
}

impl RoleAssignment {
    /// Build from `(provider, role)` pairs.
    ///
    /// Executor and reviewer must both be played, and no role may be claimed
    /// by two providers.
    pub fn new<I, S>(pairs: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (S, Role)>,
        S: Into<String>,
    {
        let mut by_role = BTreeMap::new();
        for (provider, role) in pairs {
            let provider = provider.into();
            if let Some(existing) = by_role.insert(role, provider.clone()) {
                return Err(ConfigurationError::new(format!(
                    "role `{role}` is assigned to both `{existing}` and `{provider}`"
                )));
            }
        }
        for required in [Role::Executor, Role::Reviewer] {
            if !by_role.contains_key(&required) {
                return Err(ConfigurationError::new(format!(
                    "no provider plays the `{required}` role"
                )));
            }
        }
        Ok(Self { by_role })
    }

    pub fn provider_for(&self, role: Role) -> Option<&str> {
        self.by_role.get(&role).map(String::as_str)
    }

    pub fn role_of(&self, provider: &str) -> Option<Role> {
        self.by_role
            .iter()
            .find(|(_, p)| p.as_str() == provider)
            .map(|(role, _)| *role)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, &str)> {
        self.by_role.iter().map(|(r, p)| (*r, p.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub max_turns: usize,
    pub window_size: usize,
    pub max_budget_tokens: u64,
    pub enable_tools: bool,
    pub final_marker: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::with_max_turns(10)
    }
}

impl OrchestratorConfig {
    /// Defaults with the given turn cap and a window of half of it.
    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            max_turns,
            window_size: default_window(max_turns),
            max_budget_tokens: 50_000,
            enable_tools: false,
            final_marker: DEFAULT_FINAL_MARKER.to_string(),
        }
    }
}

// ── Outcome ──────────────────────────────────────────────────────────────────

/// Why the turn loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A turn signalled `final`.
    Finalized,
    /// `max_turns` reached without a final reply.
    TurnCap,
    /// Token budget spent before the next turn.
    BudgetExhausted,
    /// Cancellation observed between turns.
    Cancelled,
    /// An unrecoverable error left the loop.
    Failed,
}

impl EndReason {
    fn is_success(self) -> bool {
        matches!(self, Self::Finalized | Self::TurnCap | Self::BudgetExhausted)
    }
}

/// Result of one run. The transcript is kept even when the run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    pub final_result: Option<String>,
    /// Whether a turn explicitly signalled `final`.
    pub finalized: bool,
    pub end_reason: EndReason,
    pub turns: usize,
    pub total_tokens: u64,
    pub transcript: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Best-effort answer from a finished transcript.
///
/// Prefers the latest `final` turn, taking the text after `marker` when it is
/// present; otherwise falls back to the last turn's message.
pub fn extract_final_result(transcript: &[Turn], marker: &str) -> Option<String> {
    if let Some(turn) = transcript.iter().rev().find(|t| t.reply.is_final()) {
        let message = &turn.reply.message;
        let answer = match message.split_once(marker) {
            Some((_, after)) if !marker.is_empty() => after.trim().to_string(),
            _ => message.clone(),
        };
        return Some(answer);
    }
    transcript.last().map(|turn| turn.reply.message.clone())
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

/// Drives one executor/reviewer conversation to completion.
pub struct TurnOrchestrator {
    config: OrchestratorConfig,
    roles: RoleAssignment,
    agents: HashMap<String, Arc<dyn Agent>>,
    sandbox: Option<Arc<dyn ToolSandbox>>,
    cancel: CancellationToken,
}

impl TurnOrchestrator {
    pub fn new(config: OrchestratorConfig, roles: RoleAssignment) -> Self {
        Self {
            config,
            roles,
            agents: HashMap::new(),
            sandbox: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Register the agent backing `provider`.
    pub fn with_agent(mut self, provider: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        self.agents.insert(provider.into(), agent);
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn ToolSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the run before its next turn.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the conversation for `task`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` before any turn when the turn cap,
    /// window or budget is invalid, when an assigned provider has no agent,
    /// or when tools are enabled without a sandbox. Failures after the first
    /// turn are reported in the outcome with `success = false`.
    pub async fn run(&self, task: &str) -> Result<RunOutcome, ConfigurationError> {
        let mut manager = ConversationManager::new(self.config.max_turns, self.config.window_size)?;
        self.preflight()?;

        info!(
            max_turns = self.config.max_turns,
            window = self.config.window_size,
            budget = self.config.max_budget_tokens,
            tools = self.config.enable_tools,
            "duet run starting"
        );

        let mut failure: Option<RunError> = None;
        let end_reason = loop {
            if self.cancel.is_cancelled() {
                info!(turns = manager.transcript().len(), "run cancelled");
                break EndReason::Cancelled;
            }
            if !manager.can_continue() {
                break if manager.transcript().last().is_some_and(|t| t.reply.is_final()) {
                    EndReason::Finalized
                } else {
                    info!(max_turns = self.config.max_turns, "turn cap reached");
                    EndReason::TurnCap
                };
            }
            if manager.total_tokens() >= self.config.max_budget_tokens {
                warn!(
                    total_tokens = manager.total_tokens(),
                    budget = self.config.max_budget_tokens,
                    "token budget exhausted"
                );
                break EndReason::BudgetExhausted;
            }

            match self.play_turn(&mut manager, task).await {
                Ok(true) => break EndReason::Finalized,
                Ok(false) => {}
                Err(e) => {
                    error!(turns = manager.transcript().len(), error = %e, "run failed");
                    failure = Some(e);
                    break EndReason::Failed;
                }
            }
        };

        let transcript = manager.transcript().to_vec();
        let final_result = extract_final_result(&transcript, &self.config.final_marker);
        let outcome = RunOutcome {
            success: end_reason.is_success(),
            final_result,
            finalized: end_reason == EndReason::Finalized,
            end_reason,
            turns: transcript.len(),
            total_tokens: manager.total_tokens(),
            transcript,
            error: failure.map(|e| e.to_string()),
        };

        info!(
            success = outcome.success,
            reason = ?outcome.end_reason,
            turns = outcome.turns,
            total_tokens = outcome.total_tokens,
            "duet run finished"
        );
        Ok(outcome)
    }

    fn preflight(&self) -> Result<(), ConfigurationError> {
        if self.config.max_budget_tokens == 0 {
            return Err(ConfigurationError::new("max_budget_tokens must be greater than 0"));
        }
        for (role, provider) in self.roles.iter() {
            if !self.agents.contains_key(provider) {
                return Err(ConfigurationError::new(format!(
                    "no agent registered for provider `{provider}` (role `{role}`)"
                )));
            }
        }
        if self.config.enable_tools && self.sandbox.is_none() {
            return Err(ConfigurationError::new(
                "tool execution is enabled but no sandbox is configured",
            ));
        }
        Ok(())
    }

    /// Generate, execute tools and append a single turn.
    /// Returns whether the turn was final.
    async fn play_turn(
        &self,
        manager: &mut ConversationManager,
        task: &str,
    ) -> Result<bool, RunError> {
        let role = manager.current_speaker();
        let phase = manager.current_phase();
        let provider = self
            .roles
            .provider_for(role)
            .ok_or(RunError::UnassignedRole(role))?;
        let agent = self
            .agents
            .get(provider)
            .ok_or_else(|| RunError::MissingAgent(provider.to_string()))?;

        let prompt = OrchestratorPrompt {
            task: task.to_string(),
            role,
            current_phase: phase,
            transcript: manager.get_windowed_transcript().to_vec(),
            context: manager.get_context_for_agent(role),
        };

        let started = Instant::now();
        let generation = agent.generate(&prompt).await;
        let elapsed = started.elapsed().as_secs_f64();

        if generation.reply.phase != phase {
            debug!(
                expected = %phase,
                reported = %generation.reply.phase,
                "agent replied in a different phase"
            );
        }

        let mut turn = Turn::new(role, agent.agent_type(), generation.reply).with_duration(elapsed);
        turn.token_count = generation.token_count;

        if self.config.enable_tools && !turn.reply.tool_calls.is_empty() {
            let sandbox = self.sandbox.as_ref().ok_or_else(|| {
                RunError::Configuration(ConfigurationError::new("no sandbox configured"))
            })?;
            turn.tool_results = Some(execute_tools(sandbox.as_ref(), &turn.reply.tool_calls).await);
        }

        info!(
            turn = manager.transcript().len() + 1,
            provider,
            role = %role,
            phase = %turn.reply.phase,
            finish = %turn.reply.finish,
            tokens = turn.token_count.unwrap_or(0),
            "turn appended"
        );

        let finished = turn.reply.finish == FinishStatus::Final;
        manager.add_turn(turn);
        Ok(finished)
    }
}

/// Run tool calls sequentially in request order. A failing call becomes an
/// error entry and does not stop the rest.
pub async fn execute_tools(sandbox: &dyn ToolSandbox, calls: &[ToolCall]) -> Vec<ToolResult> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        debug!(tool = %call.name, "executing tool call");
        let entry = match sandbox.execute_tool(&call.name, &call.args).await {
            Ok(result) => {
                let summary = result
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} executed", call.name));
                ToolResult {
                    tool: call.name.clone(),
                    args: call.args.clone(),
                    result: Some(result),
                    error: None,
                    summary,
                }
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e.message, "tool call failed");
                ToolResult {
                    tool: call.name.clone(),
                    args: call.args.clone(),
                    result: None,
                    summary: format!(
                        "Tool execution failed: {}",
                        truncate_chars(&e.message, 50)
                    ),
                    error: Some(e.message),
                }
            }
        };
        results.push(entry);
    }
    results
}
