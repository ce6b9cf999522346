//! Phase state machine: (reply, speaker) → (next phase, next speaker).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::{AgentReply, FinishStatus, Phase, Role};

/// Compute the next phase and speaker after `speaker` produced `reply`.
///
/// A `final` reply freezes the state: the reply's phase and the same speaker
/// come back unchanged, so reapplying it is a no-op. `Facilitator` follows
/// the non-executor branch of every row.
pub fn next_state(reply: &AgentReply, speaker: Role) -> (Phase, Role) {
    if reply.finish == FinishStatus::Final {
        return (reply.phase, speaker);
    }

    let executor = speaker == Role::Executor;
    let handoff = reply.finish == FinishStatus::Handoff;

    match reply.phase {
        Phase::Analysis => (Phase::Proposal, Role::Executor),
        Phase::Proposal => match (handoff, executor) {
            (true, true) => (Phase::Proposal, Role::Reviewer),
            (true, false) => (Phase::Implement, Role::Executor),
            (false, true) => (Phase::Implement, Role::Executor),
            // Reviewer asks for another round on the proposal.
            (false, false) => (Phase::Proposal, Role::Executor),
        },
        Phase::Implement => {
            if executor {
                (Phase::Review, Role::Reviewer)
            } else {
                (Phase::Implement, Role::Executor)
            }
        }
        Phase::Review => {
            if handoff && !executor {
                (Phase::Finalize, Role::Executor)
            } else {
                // Executor speaking in review is still answering feedback.
                (Phase::Implement, Role::Executor)
            }
        }
        Phase::Finalize => (Phase::Finalize, speaker),
    }
}

/// One applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    pub speaker: Role,
    pub next_speaker: Role,
    pub finish: FinishStatus,
}

/// Current phase/speaker pair plus the log of transitions that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachine {
    phase: Phase,
    speaker: Role,
    history: Vec<TransitionRecord>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Start in `analysis` with the executor speaking.
    pub fn new() -> Self {
        Self {
            phase: Phase::Analysis,
            speaker: Role::Executor,
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn speaker(&self) -> Role {
        self.speaker
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Advance on a reply produced by `speaker` and return the new state.
    pub fn apply(&mut self, reply: &AgentReply, speaker: Role) -> (Phase, Role) {
        let (phase, next_speaker) = next_state(reply, speaker);

        debug!(
            from = %self.phase,
            to = %phase,
            speaker = %speaker,
            next_speaker = %next_speaker,
            finish = %reply.finish,
            "phase transition"
        );

        self.history.push(TransitionRecord {
            from: self.phase,
            to: phase,
            speaker,
            next_speaker,
            finish: reply.finish,
        });
        self.phase = phase;
        self.speaker = next_speaker;
        (phase, next_speaker)
    }
}
