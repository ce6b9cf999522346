//! Retry policy for one generation call.
//!
//! The policy is a pure function of (attempt, error) → decision. Callers
//! that need to carry the last error across attempts use [`RetryState`].

use std::time::Duration;

use crate::error::ReplyError;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then try again.
    Retry { delay: Duration },
    /// Attempts exhausted; fall back to an error reply.
    GiveUp,
}

/// Bounded linear back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// No back-off at all. Useful for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Decide after the 1-based `attempt` failed.
    ///
    /// Every [`ReplyError`] category is retriable, so only the attempt count
    /// matters. Delays grow as `base_delay * attempt` and never decrease
    /// within one generation call.
    pub fn decide(&self, attempt: u32, _error: &ReplyError) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.base_delay.saturating_mul(attempt.max(1)),
        }
    }
}

/// Attempt counter plus the most recent failure.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
    last_error: Option<ReplyError>,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last_error: None,
        }
    }

    /// Begin the next attempt and return its 0-based index.
    pub fn begin_attempt(&mut self) -> u32 {
        let index = self.attempt;
        self.attempt += 1;
        index
    }

    /// Record the failure of the attempt in progress.
    pub fn record_failure(&mut self, error: ReplyError) -> RetryDecision {
        let decision = self.policy.decide(self.attempt, &error);
        self.last_error = Some(error);
        decision
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn last_error(&self) -> Option<&ReplyError> {
        self.last_error.as_ref()
    }

    pub fn into_last_error(self) -> Option<ReplyError> {
        self.last_error
    }
}
