//! Conversation manager: transcript ownership, windowing and per-role context.

pub mod summary;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigurationError;
use crate::protocol::{truncate_chars, FinishStatus, Phase, Role, Turn};
use crate::state_machine::StateMachine;

const DECISION_LOOKBACK: usize = 3;
const DECISION_CHARS: usize = 80;

/// A recent turn that signalled `handoff` or `final`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionNote {
    pub role: Role,
    pub message: String,
}

/// Snapshot of conversation state handed to an agent for prompting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub current_phase: Phase,
    pub turn_count: usize,
    pub max_turns: usize,
    pub running_summary: String,
    pub total_tokens: u64,
    /// Most recent non-empty critique from the other side.
    pub last_critique: Option<String>,
    pub recent_decisions: Vec<DecisionNote>,
    /// Set only by agent wrappers on a recovery attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_feedback: Option<String>,
}

/// Owns the transcript of one run and drives the state machine.
#[derive(Debug, Clone)]
pub struct ConversationManager {
    max_turns: usize,
    window_size: usize,
    transcript: Vec<Turn>,
    state: StateMachine,
    running_summary: String,
    total_tokens: u64,
    summary_refreshes: usize,
}

impl ConversationManager {
    pub fn new(max_turns: usize, window_size: usize) -> Result<Self, ConfigurationError> {
        if max_turns == 0 {
            return Err(ConfigurationError::new("max_turns must be greater than 0"));
        }
        if window_size == 0 {
            return Err(ConfigurationError::new("window_size must be greater than 0"));
        }
        Ok(Self {
            max_turns,
            window_size,
            transcript: Vec::new(),
            state: StateMachine::new(),
            running_summary: String::new(),
            total_tokens: 0,
            summary_refreshes: 0,
        })
    }

    /// Use a window of half the turn cap, at least one turn.
    pub fn with_default_window(max_turns: usize) -> Result<Self, ConfigurationError> {
        Self::new(max_turns, default_window(max_turns))
    }

    pub fn current_phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn current_speaker(&self) -> Role {
        self.state.speaker()
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn running_summary(&self) -> &str {
        &self.running_summary
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// How many times the running summary has been recomputed.
    pub fn summary_refreshes(&self) -> usize {
        self.summary_refreshes
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.state
    }

    /// Whether another turn may be generated.
    pub fn can_continue(&self) -> bool {
        if self.transcript.len() >= self.max_turns {
            return false;
        }
        !self
            .transcript
            .last()
            .is_some_and(|turn| turn.reply.finish == FinishStatus::Final)
    }

    /// Append a turn and advance phase and speaker.
    pub fn add_turn(&mut self, turn: Turn) {
        if let Some(tokens) = turn.token_count {
            self.total_tokens = self.total_tokens.saturating_add(tokens);
        }
        self.state.apply(&turn.reply, turn.role);
        self.transcript.push(turn);

        if self.transcript.len() % self.window_size == 0 {
            let start = self.transcript.len() - self.window_size;
            self.running_summary = summary::summarize(&self.transcript[start..]);
            self.summary_refreshes += 1;
            debug!(
                turns = self.transcript.len(),
                lines = self.running_summary.lines().count(),
                "running summary recomputed"
            );
        }
    }

    /// The whole transcript, or only its last `window_size` turns.
    pub fn get_windowed_transcript(&self) -> &[Turn] {
        let start = self.transcript.len().saturating_sub(self.window_size);
        &self.transcript[start..]
    }

    pub fn get_context_for_agent(&self, role: Role) -> AgentContext {
        AgentContext {
            current_phase: self.current_phase(),
            turn_count: self.transcript.len(),
            max_turns: self.max_turns,
            running_summary: self.running_summary.clone(),
            total_tokens: self.total_tokens,
            last_critique: self.last_critique_for(role),
            recent_decisions: self.recent_decisions(),
            error_feedback: None,
        }
    }

    fn last_critique_for(&self, role: Role) -> Option<String> {
        self.transcript
            .iter()
            .rev()
            .filter(|turn| turn.role != role)
            .find_map(|turn| {
                turn.reply
                    .critiques
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .map(str::to_string)
            })
    }

    fn recent_decisions(&self) -> Vec<DecisionNote> {
        let start = self.transcript.len().saturating_sub(DECISION_LOOKBACK);
        self.transcript[start..]
            .iter()
            .filter(|turn| turn.reply.finish != FinishStatus::None)
            .map(|turn| DecisionNote {
                role: turn.role,
                message: truncate_chars(&turn.reply.message, DECISION_CHARS).to_string(),
            })
            .collect()
    }
}

/// `max_turns / 2`, clamped to at least 1.
pub fn default_window(max_turns: usize) -> usize {
    (max_turns / 2).max(1)
}
