//! One end-to-end duet session: wire agents, sandbox and orchestrator from
//! a validated config, run the task, and persist the transcript.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use conversation::{RunOutcome, TurnOrchestrator};

use crate::agents::AgentFactory;
use crate::config::DuetConfig;
use crate::telemetry;
use crate::tools::LocalSandbox;
use crate::transcript::{TranscriptPaths, TranscriptWriter};

#[derive(Debug)]
pub struct SessionReport {
    pub session_id: String,
    pub outcome: RunOutcome,
    /// `None` when transcripts are disabled or saving failed.
    pub transcript: Option<TranscriptPaths>,
}

/// Build the orchestrator for `config` without running it.
pub fn build_orchestrator(config: &DuetConfig, cancel: CancellationToken) -> Result<TurnOrchestrator> {
    let roles = config.role_assignment()?;
    let factory = AgentFactory::new(config)?;

    let mut orchestrator =
        TurnOrchestrator::new(config.orchestrator_config(), roles).with_cancellation(cancel);
    for (name, agent) in factory.build_all()? {
        orchestrator = orchestrator.with_agent(name, agent);
    }

    if config.enable_file_ops {
        let sandbox = LocalSandbox::new(&config.sandbox_dir, config.project_root.as_deref())
            .with_context(|| {
                format!("Failed to prepare sandbox at {}", config.sandbox_dir.display())
            })?;
        info!(sandbox = %sandbox.policy().sandbox_dir().display(), "tool sandbox ready");
        orchestrator = orchestrator.with_sandbox(Arc::new(sandbox));
    }
    Ok(orchestrator)
}

/// Validate `config`, run `task` to completion and save the transcript.
pub async fn run_session(
    config: &DuetConfig,
    task: &str,
    cancel: CancellationToken,
) -> Result<SessionReport> {
    config.validate()?;

    let writer = TranscriptWriter::new(&config.output_dir).with_context(|| {
        format!("Failed to create output directory {}", config.output_dir.display())
    })?;
    let orchestrator = build_orchestrator(config, cancel)?;

    telemetry::log_run_start(task, writer.session_id());
    let started = Instant::now();
    let outcome = orchestrator.run(task).await?;

    for (i, turn) in outcome.transcript.iter().enumerate() {
        telemetry::log_turn(turn, i + 1, config.verbose);
    }
    telemetry::log_run_end(&outcome, started.elapsed());

    let transcript = if config.save_transcript {
        match writer.save(task, &outcome) {
            Ok(paths) => Some(paths),
            Err(e) => {
                warn!(error = %e, "failed to save transcript");
                None
            }
        }
    } else {
        None
    };

    Ok(SessionReport {
        session_id: writer.session_id().to_string(),
        outcome,
        transcript,
    })
}
