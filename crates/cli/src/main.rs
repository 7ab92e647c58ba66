//! Conductor CLI
//!
//! Main entry point for the conductor command-line tool.
//! Runs multi-phase prompt workflows against agent backends.

mod commands;

use clap::{Parser, Subcommand};
use commands::{InspectCommand, ListCommand, RenderCommand, RunCommand};
use conductor_core::config::{AppConfig, ConfigOverrides, LogFormat};
use conductor_core::{logging, AppError, AppResult};
use std::path::PathBuf;

/// Conductor - run multi-phase prompt workflows with agent delegation
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(about = "Run multi-phase prompt workflows with agent delegation", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "CONDUCTOR_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "CONDUCTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log output format (pretty, json)
    #[arg(long, global = true, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Agent provider (ollama, command, dry-run)
    #[arg(short, long, global = true, env = "CONDUCTOR_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "CONDUCTOR_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow document
    Run(RunCommand),

    /// Show a document's phases, steps and placeholders
    Inspect(InspectCommand),

    /// Print resolved step instructions without dispatching
    Render(RenderCommand),

    /// List available documents
    List(ListCommand),
}

/// One-line description of why a command failed.
fn failure_summary(err: &AppError) -> String {
    if err.is_authoring_error() {
        format!("Document rejected before any step ran: {}", err)
    } else if err.is_runtime_error() {
        format!("Agent call failed: {}", err)
    } else {
        format!("Command failed: {}", err)
    }
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    LogFormat::parse(s).ok_or_else(|| format!("unknown log format '{}' (pretty, json)", s))
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        workspace: cli.workspace,
        config_file: cli.config,
        provider: cli.provider,
        model: cli.model,
        log_level: cli.log_level,
        log_format: cli.log_format,
        verbose: cli.verbose,
        no_color: cli.no_color,
    };

    // Defaults, then config file, then environment, then CLI flags
    let config = AppConfig::load_with(&overrides)?;

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format)?;

    tracing::info!("Conductor starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.agent.provider);
    tracing::debug!("Model: {}", config.agent.model);

    config.validate()?;

    // Emit command span
    let command_name = match &cli.command {
        Commands::Run(_) => "run",
        Commands::Inspect(_) => "inspect",
        Commands::Render(_) => "render",
        Commands::List(_) => "list",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Run(cmd) => cmd.execute(&config).await,
        Commands::Inspect(cmd) => cmd.execute(&config).await,
        Commands::Render(cmd) => cmd.execute(&config).await,
        Commands::List(cmd) => cmd.execute(&config).await,
    };

    // Log completion
    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("{}", failure_summary(e)),
    }

    result
}
