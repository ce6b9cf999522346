use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use duet_agents::config::{ConfigError, DuetConfig, Overrides};
use duet_agents::{run_session, telemetry};

const EXIT_RUN_FAILED: u8 = 1;
const EXIT_CONFIG: u8 = 2;

/// Executor/reviewer LLM duet: two models collaborate on one task.
#[derive(Debug, Parser)]
#[command(name = "duet", version, about)]
struct Cli {
    /// Task description for the duet.
    #[arg(required_unless_present = "print_config")]
    task: Option<String>,

    /// TOML config file (overridden by environment and flags).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Role played by the Claude provider (executor, reviewer, facilitator).
    #[arg(long)]
    claude_role: Option<String>,

    /// Role played by the OpenAI provider.
    #[arg(long)]
    openai_role: Option<String>,

    /// Task type (debug, review, design, implement).
    #[arg(long = "type")]
    task_type: Option<String>,

    #[arg(long)]
    max_turns: Option<usize>,

    #[arg(long)]
    openai_model: Option<String>,

    #[arg(long)]
    claude_model: Option<String>,

    /// Sampling temperature for both providers.
    #[arg(long)]
    temperature: Option<f64>,

    /// Enable the file and command tool sandbox.
    #[arg(long)]
    with_files: bool,

    #[arg(long)]
    project_root: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long, short)]
    verbose: bool,

    /// Use offline mock agents; no API calls.
    #[arg(long)]
    dry_run: bool,

    /// Token budget for the whole run.
    #[arg(long)]
    budget: Option<u64>,

    /// Do not write transcript files.
    #[arg(long)]
    no_save: bool,

    /// Print the resolved configuration and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            claude_role: self.claude_role.clone(),
            openai_role: self.openai_role.clone(),
            task_type: self.task_type.clone(),
            max_turns: self.max_turns,
            openai_model: self.openai_model.clone(),
            claude_model: self.claude_model.clone(),
            temperature: self.temperature,
            with_files: self.with_files,
            project_root: self.project_root.clone(),
            output_dir: self.output_dir.clone(),
            verbose: self.verbose,
            dry_run: self.dry_run,
            budget: self.budget,
            no_save: self.no_save,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match DuetConfig::load(cli.config.as_deref()) {
        Ok(mut config) => {
            config.apply_overrides(cli.overrides());
            config
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if cli.print_config {
        println!("{}", config.summary());
        return match config.validate() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{e}");
                ExitCode::from(EXIT_CONFIG)
            }
        };
    }

    telemetry::init_tracing(config.verbose);

    let task = cli.task.unwrap_or_default();
    match run(&config, &task).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_RUN_FAILED),
        Err(e) if is_config_error(&e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_RUN_FAILED)
        }
    }
}

fn is_config_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<ConfigError>().is_some()
        || e.downcast_ref::<conversation::ConfigurationError>().is_some()
}

async fn run(config: &DuetConfig, task: &str) -> Result<bool> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current turn");
            on_signal.cancel();
        }
    });

    let report = run_session(config, task, cancel).await?;
    if let Some(paths) = &report.transcript {
        info!(
            session = %report.session_id,
            json = %paths.json.display(),
            readable = %paths.readable.display(),
            "artifacts saved"
        );
    }
    Ok(report.outcome.success)
}
