//! Ollama agent backend.
//!
//! Each role is played by the configured local model, with the role given as
//! the system prompt.
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use crate::invoker::{AgentInvoker, AgentOutput, AgentRequest};
use conductor_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Agent backend backed by an Ollama server.
pub struct OllamaInvoker {
    /// Base URL for Ollama API
    base_url: String,

    /// Model used when the request carries no model hint
    default_model: String,

    /// HTTP client
    client: reqwest::Client,
}

impl OllamaInvoker {
    /// Create an invoker against the default local endpoint.
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_ENDPOINT, model)
    }

    pub fn with_base_url(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Set an HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> AppResult<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Agent(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    fn to_ollama_request(&self, request: &AgentRequest) -> OllamaRequest {
        OllamaRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            prompt: request.to_prompt(),
            system: Some(system_prompt(request)),
            stream: false,
        }
    }
}

fn system_prompt(request: &AgentRequest) -> String {
    let mut system = format!("You are acting as the '{}' agent.", request.role);
    if !request.tools.is_empty() {
        system.push_str(&format!(" Available tools: {}.", request.tools.join(", ")));
    }
    system
}

#[async_trait::async_trait]
impl AgentInvoker for OllamaInvoker {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn invoke(&self, request: &AgentRequest) -> AppResult<AgentOutput> {
        let ollama_request = self.to_ollama_request(request);
        let url = format!("{}/api/generate", self.base_url);

        tracing::debug!(
            "Sending '{}' request to Ollama model {}",
            request.role,
            ollama_request.model
        );

        let response = self
            .client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| AppError::Agent(format!("Failed to send request to Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::AgentInvocation {
                role: request.role.clone(),
                message: format!("Ollama API error ({}): {}", status, error_text),
            });
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::Agent(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!(
            "Received {} token(s) from {}",
            ollama_response.eval_count.unwrap_or(0),
            ollama_response.model
        );

        Ok(AgentOutput::from_raw(ollama_response.response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_invoker_creation() {
        let invoker = OllamaInvoker::new("llama3.2");
        assert_eq!(invoker.name(), "ollama");
        assert_eq!(invoker.base_url, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let invoker = OllamaInvoker::with_base_url("http://gpu-box:11434/", "llama3.2");
        assert_eq!(invoker.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_request_conversion() {
        let invoker = OllamaInvoker::new("llama3.2");
        let request = AgentRequest::new("security-auditor", "Audit $TARGET")
            .with_tools(vec!["Read".to_string(), "Grep".to_string()])
            .with_context("1", "findings");

        let ollama = invoker.to_ollama_request(&request);
        assert_eq!(ollama.model, "llama3.2");
        assert!(!ollama.stream);
        let system = ollama.system.unwrap();
        assert!(system.contains("security-auditor"));
        assert!(system.contains("Read, Grep"));
        assert!(ollama.prompt.contains("## Context: 1"));
    }

    #[test]
    fn test_model_hint_wins() {
        let invoker = OllamaInvoker::new("llama3.2");
        let request = AgentRequest::new("dev", "x").with_model("qwen2.5-coder");
        assert_eq!(invoker.to_ollama_request(&request).model, "qwen2.5-coder");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let invoker = OllamaInvoker::with_base_url("http://127.0.0.1:9", "llama3.2")
            .with_timeout(Duration::from_secs(2))
            .unwrap();
        let result = invoker.invoke(&AgentRequest::new("dev", "hello")).await;
        assert!(matches!(result, Err(AppError::Agent(_))));
    }
}
