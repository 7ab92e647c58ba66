//! External command agent backend.
//!
//! Runs a configured program once per dispatch. `{role}` and `{model}` in the
//! arguments are substituted, the request is written to stdin as JSON, and
//! stdout becomes the agent output.

use crate::invoker::{AgentInvoker, AgentOutput, AgentRequest};
use conductor_core::config::CommandSettings;
use conductor_core::{AppError, AppResult};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Agent backend that shells out to a program.
pub struct CommandInvoker {
    program: String,
    args: Vec<String>,
    default_model: String,
}

impl CommandInvoker {
    pub fn new(program: impl Into<String>, args: Vec<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            default_model: model.into(),
        }
    }

    pub fn from_settings(settings: &CommandSettings, model: impl Into<String>) -> Self {
        Self::new(settings.program.clone(), settings.args.clone(), model)
    }

    fn expand_args(&self, request: &AgentRequest) -> Vec<String> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        self.args
            .iter()
            .map(|arg| arg.replace("{role}", &request.role).replace("{model}", model))
            .collect()
    }
}

#[async_trait::async_trait]
impl AgentInvoker for CommandInvoker {
    fn name(&self) -> &str {
        "command"
    }

    async fn invoke(&self, request: &AgentRequest) -> AppResult<AgentOutput> {
        let args = self.expand_args(request);
        tracing::debug!("Running agent command: {} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::Agent(format!("Failed to start '{}': {}", self.program, e))
            })?;

        let payload = serde_json::to_vec(request)?;
        let stdin = child.stdin.take();
        // Feed stdin while the output pipes drain; a program that echoes as it
        // reads would otherwise block once its stdout pipe fills.
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A program that ignores stdin may close it early; that is not an error.
                if let Err(e) = stdin.write_all(&payload).await {
                    tracing::debug!("Agent command closed stdin: {}", e);
                }
            }
        };

        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(AppError::AgentInvocation {
                role: request.role.clone(),
                message: if stderr.is_empty() {
                    format!("'{}' exited with status {}", self.program, code)
                } else {
                    format!("'{}' exited with status {}: {}", self.program, code, stderr)
                },
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(AgentOutput::from_raw(stdout.trim_end()))
    }
}
