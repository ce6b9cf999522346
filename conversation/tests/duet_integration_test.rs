//! Mocked duet integration test: drives the full turn loop with
//! deterministic scripted agents (no LLM calls).
//!
//! Covers: orchestrator ↔ manager ↔ state machine ↔ tool execution
//! running together, plus every termination path.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use conversation::{
    create_error_reply, Agent, AgentReply, EndReason, FinishStatus, Generation, OrchestratorConfig,
    OrchestratorPrompt, Phase, Role, RoleAssignment, ToolCall, ToolExecutionError, ToolSandbox,
    TurnOrchestrator,
};

/// Replies in whatever phase the orchestrator asks for, with scripted
/// finish/message pairs. Once the script runs out it keeps handing off.
struct ScriptedAgent {
    name: &'static str,
    script: Mutex<VecDeque<AgentReply>>,
    tokens: Option<u64>,
    prompts: Mutex<Vec<OrchestratorPrompt>>,
}

impl ScriptedAgent {
    fn new(name: &'static str, script: Vec<(FinishStatus, &str)>) -> Self {
        let script = script
            .into_iter()
            // Phase is overwritten with the prompt's phase at generation time.
            .map(|(finish, msg)| AgentReply::new(Phase::Analysis, msg, finish))
            .collect();
        Self {
            name,
            script: Mutex::new(script),
            tokens: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn with_replies(name: &'static str, replies: Vec<AgentReply>) -> Self {
        Self {
            name,
            script: Mutex::new(replies.into()),
            tokens: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = Some(tokens);
        self
    }

    fn prompts(&self) -> Vec<OrchestratorPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn agent_type(&self) -> &str {
        self.name
    }

    async fn generate(&self, prompt: &OrchestratorPrompt) -> Generation {
        self.prompts.lock().unwrap().push(prompt.clone());
        let mut reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| AgentReply::new(prompt.current_phase, "continuing", FinishStatus::Handoff));
        reply.phase = prompt.current_phase;
        let generation = Generation::new(reply);
        match self.tokens {
            Some(t) => generation.with_tokens(t),
            None => generation,
        }
    }
}

/// Cancels the run while producing its first reply.
struct CancellingAgent {
    token: CancellationToken,
}

#[async_trait]
impl Agent for CancellingAgent {
    fn agent_type(&self) -> &str {
        "cancelling"
    }

    async fn generate(&self, prompt: &OrchestratorPrompt) -> Generation {
        self.token.cancel();
        Generation::new(AgentReply::new(
            prompt.current_phase,
            "stopping soon",
            FinishStatus::Handoff,
        ))
    }
}

/// Records calls; `fail` always errors, everything else echoes.
#[derive(Default)]
struct RecordingSandbox {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ToolSandbox for RecordingSandbox {
    async fn execute_tool(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolExecutionError> {
        self.calls.lock().unwrap().push(name.to_string());
        if name == "fail" {
            return Err(ToolExecutionError::new(name, "disk on fire"));
        }
        Ok(json!({"args": args, "summary": format!("{name} ok")}))
    }
}

fn default_roles() -> RoleAssignment {
    RoleAssignment::new([("claude", Role::Executor), ("openai", Role::Reviewer)]).unwrap()
}

fn orchestrator(
    config: OrchestratorConfig,
    executor: Arc<ScriptedAgent>,
    reviewer: Arc<ScriptedAgent>,
) -> TurnOrchestrator {
    TurnOrchestrator::new(config, default_roles())
        .with_agent("claude", executor)
        .with_agent("openai", reviewer)
}

// ── Happy path ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_duet_reaches_final_answer() {
    let executor = Arc::new(ScriptedAgent::new(
        "claude",
        vec![
            (FinishStatus::Handoff, "Analysed the task"),
            (FinishStatus::Handoff, "Proposal: use a lookup table"),
            (FinishStatus::Handoff, "Implemented the table"),
            (FinishStatus::Final, "Work complete. FINAL: lookup table shipped"),
        ],
    ));
    let reviewer = Arc::new(ScriptedAgent::with_replies(
        "openai",
        vec![
            AgentReply::new(Phase::Proposal, "plan approved", FinishStatus::Handoff)
                .with_critiques("mind the edge cases"),
            AgentReply::new(Phase::Review, "LGTM", FinishStatus::Handoff),
        ],
    ));

    let orch = orchestrator(
        OrchestratorConfig::with_max_turns(10),
        executor.clone(),
        reviewer.clone(),
    );
    let outcome = orch.run("build a lookup table").await.unwrap();

    assert!(outcome.success);
    assert!(outcome.finalized);
    assert_eq!(outcome.end_reason, EndReason::Finalized);
    assert_eq!(outcome.final_result.as_deref(), Some("lookup table shipped"));
    assert_eq!(outcome.turns, 6);
    assert!(outcome.error.is_none());

    let roles: Vec<_> = outcome.transcript.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        [
            Role::Executor,
            Role::Executor,
            Role::Reviewer,
            Role::Executor,
            Role::Reviewer,
            Role::Executor
        ]
    );
    let phases: Vec<_> = outcome.transcript.iter().map(|t| t.reply.phase).collect();
    assert_eq!(
        phases,
        [
            Phase::Analysis,
            Phase::Proposal,
            Phase::Proposal,
            Phase::Implement,
            Phase::Review,
            Phase::Finalize
        ]
    );
    assert!(outcome.transcript.iter().all(|t| t.duration.is_some()));
    assert_eq!(outcome.transcript[2].agent_type, "openai");

    // The executor sees the reviewer's critique once it has been given.
    let exec_prompts = executor.prompts();
    assert_eq!(exec_prompts.len(), 4);
    assert!(exec_prompts[1].context.last_critique.is_none());
    assert_eq!(
        exec_prompts[2].context.last_critique.as_deref(),
        Some("mind the edge cases")
    );
    assert_eq!(exec_prompts[2].task, "build a lookup table");
    assert_eq!(exec_prompts[2].role, Role::Executor);
}

#[tokio::test]
async fn test_prompt_transcript_is_windowed() {
    let executor = Arc::new(ScriptedAgent::new("claude", vec![]));
    let reviewer = Arc::new(ScriptedAgent::new("openai", vec![]));
    let mut config = OrchestratorConfig::with_max_turns(8);
    config.window_size = 2;

    let orch = orchestrator(config, executor.clone(), reviewer.clone());
    let outcome = orch.run("long task").await.unwrap();
    assert_eq!(outcome.turns, 8);

    let mut all = executor.prompts();
    all.extend(reviewer.prompts());
    assert!(all.iter().all(|p| p.transcript.len() <= 2));
    assert!(all.iter().any(|p| p.transcript.len() == 2));
}

// ── Termination paths ──────────────────────────────────────────────

#[tokio::test]
async fn test_turn_cap_without_final_falls_back_to_last_message() {
    let executor = Arc::new(ScriptedAgent::new("claude", vec![]));
    let reviewer = Arc::new(ScriptedAgent::new("openai", vec![]));
    let orch = orchestrator(OrchestratorConfig::with_max_turns(5), executor, reviewer);

    let outcome = orch.run("never finishes").await.unwrap();
    assert!(outcome.success);
    assert!(!outcome.finalized);
    assert_eq!(outcome.end_reason, EndReason::TurnCap);
    assert_eq!(outcome.turns, 5);
    assert_eq!(outcome.final_result.as_deref(), Some("continuing"));
}

#[tokio::test]
async fn test_token_budget_stops_before_next_turn() {
    let executor = Arc::new(ScriptedAgent::new("claude", vec![]).with_tokens(60));
    let reviewer = Arc::new(ScriptedAgent::new("openai", vec![]).with_tokens(60));
    let mut config = OrchestratorConfig::with_max_turns(10);
    config.max_budget_tokens = 100;

    let outcome = orchestrator(config, executor, reviewer)
        .run("expensive")
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(!outcome.finalized);
    assert_eq!(outcome.end_reason, EndReason::BudgetExhausted);
    assert_eq!(outcome.turns, 2);
    assert_eq!(outcome.total_tokens, 120);
}

#[tokio::test]
async fn test_cancellation_before_first_turn() {
    let executor = Arc::new(ScriptedAgent::new("claude", vec![]));
    let reviewer = Arc::new(ScriptedAgent::new("openai", vec![]));
    let orch = orchestrator(OrchestratorConfig::default(), executor.clone(), reviewer);
    orch.cancellation_token().cancel();

    let outcome = orch.run("task").await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.end_reason, EndReason::Cancelled);
    assert_eq!(outcome.turns, 0);
    assert!(outcome.final_result.is_none());
    assert!(executor.prompts().is_empty());
}

#[tokio::test]
async fn test_cancellation_never_interrupts_an_inflight_turn() {
    let token = CancellationToken::new();
    let reviewer = Arc::new(ScriptedAgent::new("openai", vec![]));
    let orch = TurnOrchestrator::new(OrchestratorConfig::default(), default_roles())
        .with_agent(
            "claude",
            Arc::new(CancellingAgent {
                token: token.clone(),
            }),
        )
        .with_agent("openai", reviewer)
        .with_cancellation(token);

    let outcome = orch.run("task").await.unwrap();
    assert_eq!(outcome.end_reason, EndReason::Cancelled);
    assert_eq!(outcome.turns, 1);
    assert_eq!(outcome.transcript[0].reply.message, "stopping soon");
}

#[tokio::test]
async fn test_missing_agent_is_fatal_before_any_turn() {
    let executor = Arc::new(ScriptedAgent::new(
        "claude",
        vec![(FinishStatus::Handoff, "analysis done")],
    ));
    let orch = TurnOrchestrator::new(OrchestratorConfig::default(), default_roles())
        .with_agent("claude", executor.clone());

    let err = orch.run("task").await.unwrap_err();
    assert!(err.to_string().contains("openai"), "{err}");
    assert!(executor.prompts().is_empty());
}

#[tokio::test]
async fn test_invalid_configuration_is_fatal_before_any_turn() {
    let executor = Arc::new(ScriptedAgent::new("claude", vec![]));
    let reviewer = Arc::new(ScriptedAgent::new("openai", vec![]));

    let mut config = OrchestratorConfig::with_max_turns(0);
    config.window_size = 1;
    let err = orchestrator(config, executor.clone(), reviewer.clone())
        .run("task")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("max_turns"));

    let mut config = OrchestratorConfig::default();
    config.max_budget_tokens = 0;
    assert!(orchestrator(config, executor.clone(), reviewer)
        .run("task")
        .await
        .is_err());
    assert!(executor.prompts().is_empty());
}

// ── Error replies ──────────────────────────────────────────────────

#[tokio::test]
async fn test_error_reply_is_appended_and_run_continues() {
    let executor = Arc::new(ScriptedAgent::with_replies(
        "claude",
        vec![
            create_error_reply("JSON parse failed: expected value", Some(Phase::Analysis)),
            AgentReply::new(Phase::Proposal, "FINAL: recovered", FinishStatus::Final),
        ],
    ));
    let reviewer = Arc::new(ScriptedAgent::new("openai", vec![]));

    let outcome = orchestrator(OrchestratorConfig::default(), executor, reviewer)
        .run("task")
        .await
        .unwrap();
    assert!(outcome.finalized);
    assert_eq!(outcome.turns, 2);
    assert!(conversation::is_error_reply(&outcome.transcript[0].reply));
    assert_eq!(outcome.transcript[0].reply.finish, FinishStatus::Handoff);
    assert_eq!(outcome.final_result.as_deref(), Some("recovered"));
}

// ── Tool execution ─────────────────────────────────────────────────

fn reply_with_tools() -> AgentReply {
    let mut path = Map::new();
    path.insert("path".into(), json!("notes.txt"));
    AgentReply::new(Phase::Analysis, "FINAL: read files", FinishStatus::Final)
        .with_tool_call(ToolCall::new("fs_write", path.clone()))
        .with_tool_call(ToolCall::new("fail", Map::new()))
        .with_tool_call(ToolCall::new("fs_read", path))
}

#[tokio::test]
async fn test_tool_calls_run_in_order_when_enabled() {
    let executor = Arc::new(ScriptedAgent::with_replies("claude", vec![reply_with_tools()]));
    let reviewer = Arc::new(ScriptedAgent::new("openai", vec![]));
    let sandbox = Arc::new(RecordingSandbox::default());
    let mut config = OrchestratorConfig::default();
    config.enable_tools = true;

    let outcome = orchestrator(config, executor, reviewer)
        .with_sandbox(sandbox.clone())
        .run("task")
        .await
        .unwrap();

    assert_eq!(
        *sandbox.calls.lock().unwrap(),
        ["fs_write", "fail", "fs_read"]
    );
    let results = outcome.transcript[0].tool_results.as_ref().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].summary, "fs_write ok");
    assert_eq!(results[1].error.as_deref(), Some("disk on fire"));
    assert_eq!(results[1].summary, "Tool execution failed: disk on fire");
    assert_eq!(results[2].result.as_ref().unwrap()["args"]["path"], "notes.txt");
}

#[tokio::test]
async fn test_tools_enabled_without_sandbox_is_fatal_before_any_turn() {
    let executor = Arc::new(ScriptedAgent::with_replies("claude", vec![reply_with_tools()]));
    let reviewer = Arc::new(ScriptedAgent::new("openai", vec![]));
    let mut config = OrchestratorConfig::default();
    config.enable_tools = true;

    let err = orchestrator(config, executor.clone(), reviewer)
        .run("task")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("sandbox"), "{err}");
    assert!(executor.prompts().is_empty());
}

#[tokio::test]
async fn test_tool_calls_skipped_when_disabled() {
    let executor = Arc::new(ScriptedAgent::with_replies("claude", vec![reply_with_tools()]));
    let reviewer = Arc::new(ScriptedAgent::new("openai", vec![]));
    let sandbox = Arc::new(RecordingSandbox::default());

    let outcome = orchestrator(OrchestratorConfig::default(), executor, reviewer)
        .with_sandbox(sandbox.clone())
        .run("task")
        .await
        .unwrap();

    assert!(sandbox.calls.lock().unwrap().is_empty());
    assert!(outcome.transcript[0].tool_results.is_none());
}
