//! Run command handler.
//!
//! Loads a document, plans the run and dispatches every step to the
//! configured agent backend.

use super::{open_document, parse_named_value};
use clap::Args;
use conductor_agent::create_invoker;
use conductor_core::{config::AppConfig, AppError, AppResult};
use conductor_orchestrator::{CancellationHandle, Orchestrator, RunOptions, RunPlan};
use conductor_prompt::Arguments;
use std::collections::HashMap;
use std::time::Duration;

/// Run a workflow document
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Document id (e.g. "full-stack-feature") or path
    pub document: String,

    /// Argument text for $ARGUMENTS; declared --flags are picked out of it
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Named placeholder value (repeatable)
    #[arg(long = "arg", value_name = "NAME=VALUE", value_parser = parse_named_value)]
    pub named: Vec<(String, String)>,

    /// Stop dispatching after the first failed step
    #[arg(long)]
    pub strict: bool,

    /// Per-step timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Maximum concurrent steps within a phase
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Use the dry-run backend instead of the configured provider
    #[arg(long)]
    pub dry_run: bool,

    /// Output the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing run command for: {}", self.document);
        tracing::debug!("Run options: {:?}", self);

        let document = open_document(config, &self.document)?;
        let arguments = Arguments::from_words(&self.args, &document.declared_flags);
        let named: HashMap<String, String> = self.named.iter().cloned().collect();

        // Authoring errors surface here, before anything is dispatched.
        let plan = RunPlan::build(&document, &arguments, &named)?;

        let mut agent_config = config.agent.clone();
        if self.dry_run {
            agent_config.provider = "dry-run".to_string();
        }
        let invoker = create_invoker(&agent_config)?;

        let cancel = CancellationHandle::new();
        let mut options = RunOptions::from_config(&config.orchestration)
            .with_cancel(cancel.clone())
            .with_strict(config.orchestration.strict || self.strict);
        if let Some(secs) = self.timeout {
            options = options.with_step_timeout(Duration::from_secs(secs));
        }
        if let Some(max) = self.max_concurrency {
            options = options.with_max_concurrency(max);
        }

        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling: waiting for running steps to finish...");
                cancel.cancel();
            }
        });

        let report = Orchestrator::new(invoker, options).run(&plan).await;
        ctrl_c.abort();

        if self.json {
            println!("{}", report.to_json()?);
        } else {
            println!("{}", report.render_text()?);
        }

        if report.status.is_success() {
            Ok(())
        } else {
            Err(AppError::Orchestration(format!(
                "Run of '{}' finished with status {:?}",
                report.document, report.status
            )))
        }
    }
}
