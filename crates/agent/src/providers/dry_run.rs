//! Dry-run backend: answers every request locally without calling anything.

use crate::invoker::{AgentInvoker, AgentOutput, AgentRequest};
use conductor_core::AppResult;

#[derive(Debug, Clone, Default)]
pub struct DryRunInvoker;

impl DryRunInvoker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl AgentInvoker for DryRunInvoker {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn invoke(&self, request: &AgentRequest) -> AppResult<AgentOutput> {
        let mut content = format!("[dry-run] {}: {}", request.role, request.instruction.trim());
        if !request.context.is_empty() {
            let inputs: Vec<&str> = request.context.keys().map(String::as_str).collect();
            content.push_str(&format!(" (context from: {})", inputs.join(", ")));
        }
        Ok(AgentOutput::text(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_echoes_instruction() {
        let request = AgentRequest::new("architect", "Design it\n")
            .with_context("1", "a")
            .with_context("2", "b");
        let output = DryRunInvoker::new().invoke(&request).await.unwrap();
        assert_eq!(
            output.content,
            "[dry-run] architect: Design it (context from: 1, 2)"
        );
    }
}
