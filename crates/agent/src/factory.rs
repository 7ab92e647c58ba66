//! Agent backend factory.
//!
//! Builds the configured [`AgentInvoker`] from the `agent` section of the
//! application configuration.

use crate::invoker::AgentInvoker;
use crate::providers::{CommandInvoker, DryRunInvoker, OllamaInvoker};
use conductor_core::config::AgentConfig;
use conductor_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create an agent backend for the configured provider.
///
/// # Errors
/// Returns `AppError::Config` if:
/// - Provider is unknown
/// - Provider "command" has no program configured
pub fn create_invoker(config: &AgentConfig) -> AppResult<Arc<dyn AgentInvoker>> {
    tracing::debug!("Creating agent backend: {}", config.provider);

    match config.provider.to_lowercase().as_str() {
        "ollama" => {
            let mut invoker =
                OllamaInvoker::with_base_url(config.ollama.endpoint.clone(), config.model.clone());
            if let Some(secs) = config.ollama.timeout {
                invoker = invoker.with_timeout(Duration::from_secs(secs))?;
            }
            Ok(Arc::new(invoker))
        }
        "command" => match config.command {
            Some(ref settings) if !settings.program.trim().is_empty() => Ok(Arc::new(
                CommandInvoker::from_settings(settings, config.model.clone()),
            )),
            _ => Err(AppError::Config(
                "Provider 'command' requires agent.command.program".to_string(),
            )),
        },
        "dry-run" | "dryrun" => Ok(Arc::new(DryRunInvoker::new())),
        other => Err(AppError::Config(format!("Unknown provider: {}", other))),
    }
}
