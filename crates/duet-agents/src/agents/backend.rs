//! Chat completion backends.
//!
//! A [`ChatBackend`] turns one (system, user) prompt pair into raw text.
//! Extraction, validation and retries live in [`super::retrying`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::{debug, warn};

use conversation::ReplyError;

use crate::config::ProviderConfig;

/// API key sent to OpenAI-compatible servers that do not check one.
const PLACEHOLDER_API_KEY: &str = "not-needed";

/// Upper bound on one model call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

/// Raw text returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Reported usage, when the backend has it. Callers estimate otherwise.
    pub tokens: Option<u64>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens: None,
        }
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Provider name recorded as the turn's `agent_type`.
    fn name(&self) -> &str;

    /// Every failure is a `ReplyError::Transport`.
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ReplyError>;
}

/// Rough token count: about four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Estimated cost of a request plus its response.
pub fn estimate_exchange(request: &ChatRequest, response: &str) -> u64 {
    estimate_tokens(&request.system) + estimate_tokens(&request.user) + estimate_tokens(response)
}

/// Backend for any OpenAI-compatible endpoint, via rig.
///
/// On a transport failure of the primary model the fallback model, when
/// configured, is tried once.
pub struct RigBackend {
    name: String,
    client: openai::CompletionsClient,
    model: String,
    fallback_model: Option<String>,
}

impl RigBackend {
    pub fn new(name: impl Into<String>, provider: &ProviderConfig) -> Result<Self> {
        let name = name.into();
        let api_key = provider.api_key.as_deref().unwrap_or(PLACEHOLDER_API_KEY);
        let client = openai::CompletionsClient::builder()
            .api_key(api_key)
            .base_url(&provider.base_url)
            .build()
            .with_context(|| format!("Failed to build {name} client ({})", provider.base_url))?;

        Ok(Self {
            name,
            client,
            model: provider.model.clone(),
            fallback_model: provider.fallback_model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn prompt_model(
        &self,
        model: &str,
        request: &ChatRequest,
    ) -> Result<String, String> {
        let agent = self
            .client
            .agent(model)
            .preamble(&request.system)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build();
        match tokio::time::timeout(REQUEST_TIMEOUT, agent.prompt(request.user.as_str())).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("{model} timed out after {}s", REQUEST_TIMEOUT.as_secs())),
        }
    }
}

#[async_trait]
impl ChatBackend for RigBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ReplyError> {
        debug!(
            provider = %self.name,
            model = %self.model,
            temperature = request.temperature,
            max_tokens = request.max_tokens,
            "requesting completion"
        );

        let primary_err = match self.prompt_model(&self.model, request).await {
            Ok(text) => return Ok(Completion::new(text)),
            Err(e) => e,
        };

        let Some(fallback) = self.fallback_model.as_deref() else {
            return Err(ReplyError::transport(primary_err));
        };

        warn!(
            provider = %self.name,
            primary = %self.model,
            fallback,
            error = %primary_err,
            "Primary model failed, trying fallback"
        );
        match self.prompt_model(fallback, request).await {
            Ok(text) => Ok(Completion::new(text)),
            Err(fallback_err) => Err(ReplyError::transport(format!(
                "primary model failed: {primary_err}; fallback model failed: {fallback_err}"
            ))),
        }
    }
}

/// Check if an inference endpoint is reachable (GET {url}/models).
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
