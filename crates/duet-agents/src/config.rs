//! Duet run configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags ([`Overrides`])
//! 2. Environment variables (e.g. `OPENAI_MODEL`, `MAX_TURNS`)
//! 3. TOML file passed with `--config`
//! 4. Built-in defaults
//!
//! Validation collects every problem before reporting, so one run of
//! `duet --print-config` shows them all.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use conversation::{OrchestratorConfig, Role, RoleAssignment};

use crate::prompts::TaskType;

/// Provider name for the Anthropic-hosted model.
pub const CLAUDE_PROVIDER: &str = "claude";
/// Provider name for the OpenAI-hosted model.
pub const OPENAI_PROVIDER: &str = "openai";

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_FALLBACK_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-20240620";
const DEFAULT_CLAUDE_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_TEMPERATURE: f64 = 0.4;
const DEFAULT_MAX_TOKENS: u64 = 1500;
const DEFAULT_MAX_TURNS: usize = 10;
const DEFAULT_BUDGET_TOKENS: u64 = 50_000;
const DEFAULT_SANDBOX_DIR: &str = "/tmp/ai_duet_sandbox";
const DEFAULT_OUTPUT_DIR: &str = "./ai_duet_outputs";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration:\n{}", format_problems(.0))]
    Invalid(Vec<String>),
}

fn format_problems(problems: &[String]) -> String {
    problems
        .iter()
        .map(|p| format!("  - {p}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
    pub base_url: String,
    /// Tried once when the primary model fails to answer.
    pub fallback_model: Option<String>,
}

impl ProviderConfig {
    fn openai_defaults() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_OPENAI_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: DEFAULT_OPENAI_BASE_URL.into(),
            fallback_model: Some(DEFAULT_OPENAI_FALLBACK_MODEL.into()),
        }
    }

    fn claude_defaults() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_CLAUDE_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: DEFAULT_CLAUDE_BASE_URL.into(),
            fallback_model: None,
        }
    }

    fn apply_file(&mut self, file: ProviderFile) {
        if file.api_key.is_some() {
            self.api_key = file.api_key;
        }
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(t) = file.temperature {
            self.temperature = t;
        }
        if let Some(n) = file.max_tokens {
            self.max_tokens = n;
        }
        if let Some(url) = file.base_url {
            self.base_url = url;
        }
        if file.fallback_model.is_some() {
            self.fallback_model = file.fallback_model;
        }
    }

    fn apply_env(&mut self, prefix: &str, env: &EnvLookup<'_>, problems: &mut Vec<String>) {
        if let Some(key) = env(&format!("{prefix}_API_KEY")).filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(model) = env(&format!("{prefix}_MODEL")) {
            self.model = model;
        }
        parse_env(env, &format!("{prefix}_TEMPERATURE"), &mut self.temperature, problems);
        parse_env(env, &format!("{prefix}_MAX_TOKENS"), &mut self.max_tokens, problems);
        if let Some(url) = env(&format!("{prefix}_BASE_URL")) {
            self.base_url = url;
        }
        if let Some(model) = env(&format!("{prefix}_FALLBACK_MODEL")) {
            self.fallback_model = (!model.is_empty()).then_some(model);
        }
    }
}

/// Top-level duet configuration.
///
/// Roles and task type stay as strings until [`DuetConfig::validate`] so
/// bad values are reported together with every other problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuetConfig {
    pub openai: ProviderConfig,
    pub claude: ProviderConfig,
    pub claude_role: String,
    pub openai_role: String,
    pub task_type: String,
    pub max_turns: usize,
    pub enable_file_ops: bool,
    pub project_root: Option<PathBuf>,
    pub sandbox_dir: PathBuf,
    pub verbose: bool,
    pub save_transcript: bool,
    pub output_dir: PathBuf,
    pub max_budget_tokens: u64,
    pub dry_run: bool,
}

impl Default for DuetConfig {
    fn default() -> Self {
        Self {
            openai: ProviderConfig::openai_defaults(),
            claude: ProviderConfig::claude_defaults(),
            claude_role: Role::Executor.to_string(),
            openai_role: Role::Reviewer.to_string(),
            task_type: TaskType::Implement.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
            enable_file_ops: false,
            project_root: None,
            sandbox_dir: PathBuf::from(DEFAULT_SANDBOX_DIR),
            verbose: false,
            save_transcript: true,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_budget_tokens: DEFAULT_BUDGET_TOKENS,
            dry_run: false,
        }
    }
}

/// Variable lookup, injectable so tests never touch the process environment.
pub type EnvLookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Values a TOML config file may set. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub openai: Option<ProviderFile>,
    pub claude: Option<ProviderFile>,
    pub claude_role: Option<String>,
    pub openai_role: Option<String>,
    pub task_type: Option<String>,
    pub max_turns: Option<usize>,
    pub enable_file_ops: Option<bool>,
    pub project_root: Option<PathBuf>,
    pub sandbox_dir: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub save_transcript: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub max_budget_tokens: Option<u64>,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderFile {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub base_url: Option<String>,
    pub fallback_model: Option<String>,
}

/// CLI-level overrides. Boolean flags only ever switch a setting on.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub claude_role: Option<String>,
    pub openai_role: Option<String>,
    pub task_type: Option<String>,
    pub max_turns: Option<usize>,
    pub openai_model: Option<String>,
    pub claude_model: Option<String>,
    pub temperature: Option<f64>,
    pub with_files: bool,
    pub project_root: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub verbose: bool,
    pub dry_run: bool,
    pub budget: Option<u64>,
    pub no_save: bool,
}

impl DuetConfig {
    /// Defaults, then `file` (if any), then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(file, &|key| std::env::var(key).ok())
    }

    pub fn load_with_env(file: Option<&Path>, env: &EnvLookup<'_>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = file {
            config.apply_file(read_config_file(path)?);
        }

        let mut problems = Vec::new();
        config.apply_env(env, &mut problems);
        if problems.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(p) = file.openai {
            self.openai.apply_file(p);
        }
        if let Some(p) = file.claude {
            self.claude.apply_file(p);
        }
        set(&mut self.claude_role, file.claude_role);
        set(&mut self.openai_role, file.openai_role);
        set(&mut self.task_type, file.task_type);
        set(&mut self.max_turns, file.max_turns);
        set(&mut self.enable_file_ops, file.enable_file_ops);
        if file.project_root.is_some() {
            self.project_root = file.project_root;
        }
        set(&mut self.sandbox_dir, file.sandbox_dir);
        set(&mut self.verbose, file.verbose);
        set(&mut self.save_transcript, file.save_transcript);
        set(&mut self.output_dir, file.output_dir);
        set(&mut self.max_budget_tokens, file.max_budget_tokens);
        set(&mut self.dry_run, file.dry_run);
    }

    /// Apply environment variables. Unparseable numbers are pushed to `problems`.
    pub fn apply_env(&mut self, env: &EnvLookup<'_>, problems: &mut Vec<String>) {
        self.openai.apply_env("OPENAI", env, problems);
        self.claude.apply_env("ANTHROPIC", env, problems);

        set(&mut self.claude_role, env("CLAUDE_ROLE"));
        set(&mut self.openai_role, env("OPENAI_ROLE"));
        set(&mut self.task_type, env("TASK_TYPE"));
        parse_env(env, "MAX_TURNS", &mut self.max_turns, problems);
        parse_flag(env, "ENABLE_FILE_OPS", &mut self.enable_file_ops);
        if let Some(root) = env("PROJECT_ROOT").filter(|r| !r.is_empty()) {
            self.project_root = Some(PathBuf::from(root));
        }
        set(&mut self.sandbox_dir, env("SANDBOX_DIR").map(PathBuf::from));
        parse_flag(env, "VERBOSE", &mut self.verbose);
        parse_flag(env, "SAVE_TRANSCRIPT", &mut self.save_transcript);
        set(&mut self.output_dir, env("OUTPUT_DIR").map(PathBuf::from));
        parse_env(env, "MAX_BUDGET_TOKENS", &mut self.max_budget_tokens, problems);
        parse_flag(env, "DRY_RUN", &mut self.dry_run);
    }

    pub fn apply_overrides(&mut self, o: Overrides) {
        set(&mut self.claude_role, o.claude_role);
        set(&mut self.openai_role, o.openai_role);
        set(&mut self.task_type, o.task_type);
        set(&mut self.max_turns, o.max_turns);
        set(&mut self.openai.model, o.openai_model);
        set(&mut self.claude.model, o.claude_model);
        if let Some(t) = o.temperature {
            self.openai.temperature = t;
            self.claude.temperature = t;
        }
        if o.with_files {
            self.enable_file_ops = true;
        }
        if o.project_root.is_some() {
            self.project_root = o.project_root;
        }
        set(&mut self.output_dir, o.output_dir);
        if o.verbose {
            self.verbose = true;
        }
        if o.dry_run {
            self.dry_run = true;
        }
        set(&mut self.max_budget_tokens, o.budget);
        if o.no_save {
            self.save_transcript = false;
        }
    }

    /// Check every constraint and report all violations at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let claude_role = parse_role(CLAUDE_PROVIDER, &self.claude_role, &mut problems);
        let openai_role = parse_role(OPENAI_PROVIDER, &self.openai_role, &mut problems);
        if let (Some(c), Some(o)) = (claude_role, openai_role) {
            if let Err(e) = RoleAssignment::new([(CLAUDE_PROVIDER, c), (OPENAI_PROVIDER, o)]) {
                problems.push(e.0);
            }
        }

        if let Err(e) = TaskType::from_str(&self.task_type) {
            problems.push(e);
        }
        if self.max_turns == 0 {
            problems.push("max_turns must be > 0".into());
        }
        if self.max_budget_tokens == 0 {
            problems.push("max_budget_tokens must be > 0".into());
        }

        for (name, provider) in self.providers() {
            if !(0.0..=2.0).contains(&provider.temperature) {
                problems.push(format!(
                    "{name} temperature must be in 0..=2, got {}",
                    provider.temperature
                ));
            }
            if provider.max_tokens == 0 {
                problems.push(format!("{name} max_tokens must be > 0"));
            }
            if !self.dry_run && provider.api_key.is_none() {
                problems.push(format!("missing API key for {name}"));
            }
        }

        if self.enable_file_ops {
            if let Some(root) = &self.project_root {
                if !root.is_dir() {
                    problems.push(format!("project root does not exist: {}", root.display()));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn providers(&self) -> [(&'static str, &ProviderConfig); 2] {
        [(CLAUDE_PROVIDER, &self.claude), (OPENAI_PROVIDER, &self.openai)]
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| p)
    }

    /// Role assignment for the orchestrator. Call after [`Self::validate`].
    pub fn role_assignment(&self) -> Result<RoleAssignment, ConfigError> {
        let mut problems = Vec::new();
        let claude = parse_role(CLAUDE_PROVIDER, &self.claude_role, &mut problems);
        let openai = parse_role(OPENAI_PROVIDER, &self.openai_role, &mut problems);
        match (claude, openai) {
            (Some(c), Some(o)) => RoleAssignment::new([(CLAUDE_PROVIDER, c), (OPENAI_PROVIDER, o)])
                .map_err(|e| ConfigError::Invalid(vec![e.0])),
            _ => Err(ConfigError::Invalid(problems)),
        }
    }

    pub fn task_type(&self) -> Result<TaskType, ConfigError> {
        TaskType::from_str(&self.task_type).map_err(|e| ConfigError::Invalid(vec![e]))
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::with_max_turns(self.max_turns);
        config.max_budget_tokens = self.max_budget_tokens;
        config.enable_tools = self.enable_file_ops;
        config
    }

    /// Human-readable summary with API keys redacted.
    pub fn summary(&self) -> String {
        let mut out = String::from("=== Duet Config ===\n");
        for (name, role, p) in [
            (CLAUDE_PROVIDER, &self.claude_role, &self.claude),
            (OPENAI_PROVIDER, &self.openai_role, &self.openai),
        ] {
            let _ = writeln!(
                out,
                "{name}: role={role} model={} base_url={} temperature={} max_tokens={} \
                 fallback={} api_key={}",
                p.model,
                p.base_url,
                p.temperature,
                p.max_tokens,
                p.fallback_model.as_deref().unwrap_or("none"),
                redact(p.api_key.as_deref()),
            );
        }
        let _ = writeln!(out, "Task type: {}", self.task_type);
        let _ = writeln!(out, "Max turns: {}", self.max_turns);
        let _ = writeln!(out, "Token budget: {}", self.max_budget_tokens);
        let _ = writeln!(out, "File ops: {}", on_off(self.enable_file_ops));
        if let Some(root) = &self.project_root {
            let _ = writeln!(out, "Project root: {}", root.display());
        }
        let _ = writeln!(out, "Sandbox dir: {}", self.sandbox_dir.display());
        let _ = writeln!(out, "Output dir: {}", self.output_dir.display());
        let _ = writeln!(out, "Save transcript: {}", on_off(self.save_transcript));
        let _ = writeln!(out, "Dry run: {}", on_off(self.dry_run));
        out.push_str(&"=".repeat(30));
        out
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn parse_env<T: FromStr>(env: &EnvLookup<'_>, key: &str, slot: &mut T, problems: &mut Vec<String>) {
    if let Some(raw) = env(key) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(_) => problems.push(format!("{key} has an invalid value: `{raw}`")),
        }
    }
}

fn parse_flag(env: &EnvLookup<'_>, key: &str, slot: &mut bool) {
    if let Some(raw) = env(key) {
        let raw = raw.trim();
        *slot = raw.eq_ignore_ascii_case("true") || raw == "1";
    }
}

fn parse_role(provider: &str, raw: &str, problems: &mut Vec<String>) -> Option<Role> {
    match Role::from_str(raw) {
        Ok(role) => Some(role),
        Err(_) => {
            problems.push(format!("invalid {provider} role: `{raw}`"));
            None
        }
    }
}

fn redact(key: Option<&str>) -> &'static str {
    match key {
        Some(_) => "set (redacted)",
        None => "missing",
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
