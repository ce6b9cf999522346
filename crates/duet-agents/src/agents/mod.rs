//! Agent builders for the duet.
//!
//! The `AgentFactory` turns a validated [`DuetConfig`] into one
//! `conversation::Agent` per provider: rig-backed retrying agents normally,
//! offline mock agents under `--dry-run`.

pub mod backend;
pub mod dry_run;
pub mod retrying;

use std::sync::Arc;

use anyhow::{Context, Result};

use conversation::Agent;

use crate::config::DuetConfig;
use crate::prompts::TaskType;
use backend::RigBackend;
use dry_run::DryRunAgent;
use retrying::RetryingAgent;

/// Factory that builds every provider's agent from a `DuetConfig`.
pub struct AgentFactory {
    config: DuetConfig,
    task_type: TaskType,
}

impl AgentFactory {
    pub fn new(config: &DuetConfig) -> Result<Self> {
        let task_type = config.task_type().context("Invalid task type")?;
        Ok(Self {
            config: config.clone(),
            task_type,
        })
    }

    /// Build the agent for one provider name (`claude` or `openai`).
    pub fn build(&self, provider: &str) -> Result<Arc<dyn Agent>> {
        if self.config.dry_run {
            return Ok(Arc::new(DryRunAgent::new(provider)));
        }

        let settings = self
            .config
            .provider(provider)
            .with_context(|| format!("Unknown provider `{provider}`"))?;
        let backend = RigBackend::new(provider, settings)?;
        let agent = RetryingAgent::new(backend, settings.temperature, settings.max_tokens)
            .with_task_type(self.task_type);
        Ok(Arc::new(agent))
    }

    /// Agents for every configured provider, keyed by provider name.
    pub fn build_all(&self) -> Result<Vec<(&'static str, Arc<dyn Agent>)>> {
        self.config
            .providers()
            .into_iter()
            .map(|(name, _)| Ok((name, self.build(name)?)))
            .collect()
    }
}
