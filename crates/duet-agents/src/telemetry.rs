//! Tracing setup and human-readable run reporting.
//!
//! Everything goes through `tracing`; there is no separate console printer.

use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use conversation::{RunOutcome, Turn};

/// Characters of a turn message shown when not verbose.
const TURN_PREVIEW_CHARS: usize = 200;

/// Default filter when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose).into()),
        )
        .init();
}

pub fn log_run_start(task: &str, session_id: &str) {
    info!(session = session_id, task, "=== duet collaboration starting ===");
}

/// Render one turn: header, message, tool activity, critique and stats.
pub fn log_turn(turn: &Turn, turn_number: usize, verbose: bool) {
    let message = if verbose {
        turn.reply.message.clone()
    } else {
        preview(&turn.reply.message)
    };
    info!(
        turn = turn_number,
        role = %turn.role,
        agent = %turn.agent_type,
        phase = %turn.reply.phase,
        finish = %turn.reply.finish,
        "{message}"
    );

    for call in &turn.reply.tool_calls {
        info!(
            turn = turn_number,
            tool = %call.name,
            args = %serde_json::Value::Object(call.args.clone()),
            "tool call"
        );
    }
    for result in turn.tool_results.iter().flatten() {
        if result.is_error() {
            warn!(turn = turn_number, tool = %result.tool, "{}", result.summary);
        } else {
            info!(turn = turn_number, tool = %result.tool, "{}", result.summary);
        }
    }
    if let Some(critiques) = turn.reply.critiques.as_deref().filter(|c| !c.is_empty()) {
        info!(turn = turn_number, "critiques: {critiques}");
    }
    if verbose {
        info!(
            turn = turn_number,
            tokens = turn.token_count.unwrap_or(0),
            seconds = turn.duration.unwrap_or(0.0),
            "turn stats"
        );
    }
}

pub fn log_run_end(outcome: &RunOutcome, elapsed: Duration) {
    info!(
        success = outcome.success,
        end_reason = ?outcome.end_reason,
        turns = outcome.turns,
        tokens = outcome.total_tokens,
        seconds = %format!("{:.2}", elapsed.as_secs_f64()),
        "=== duet collaboration finished ==="
    );
    if let Some(error) = &outcome.error {
        warn!(error = %error, "run ended with an error");
    }
    if let Some(result) = &outcome.final_result {
        info!("final result: {result}");
    }
}

fn preview(message: &str) -> String {
    let head = conversation::protocol::truncate_chars(message, TURN_PREVIEW_CHARS);
    if head.len() < message.len() {
        format!("{head}...")
    } else {
        message.to_string()
    }
}
