//! Agent invocation abstraction and request/response types.
//!
//! The orchestrator only ever talks to an [`AgentInvoker`]; how a role is
//! mapped to a model, a process or a remote service is up to the backend.

use conductor_core::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One delegated unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Target agent role (e.g., "backend-architect")
    pub role: String,

    /// Fully resolved instruction text
    pub instruction: String,

    /// Outputs of upstream steps, keyed by step id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,

    /// Model hint from the document metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Tool-access list from the document metadata
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

impl AgentRequest {
    pub fn new(role: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    /// Add an upstream output under its step id.
    pub fn with_context(mut self, step: impl Into<String>, output: impl Into<String>) -> Self {
        self.context.insert(step.into(), output.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = Some(expected.into());
        self
    }

    /// Render the request as a single prompt: instruction, expected output,
    /// then one `## Context: <step>` section per upstream output.
    pub fn to_prompt(&self) -> String {
        let mut prompt = self.instruction.trim_end().to_string();

        if let Some(ref expected) = self.expected_output {
            prompt.push_str("\n\n## Expected Output\n\n");
            prompt.push_str(expected.trim());
        }

        for (step, output) in &self.context {
            prompt.push_str(&format!("\n\n## Context: {}\n\n", step));
            prompt.push_str(output.trim());
        }

        prompt
    }
}

/// Output returned by an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Raw text content
    pub content: String,

    /// Parsed JSON when the content is a JSON document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}

impl AgentOutput {
    /// Plain text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            structured: None,
        }
    }

    /// Output from raw agent text, keeping a parsed copy when it is a JSON
    /// object or array.
    pub fn from_raw(content: impl Into<String>) -> Self {
        let content = content.into();
        let trimmed = content.trim();
        let structured = if trimmed.starts_with('{') || trimmed.starts_with('[') {
            serde_json::from_str(trimmed).ok()
        } else {
            None
        };
        Self {
            content,
            structured,
        }
    }
}

/// Trait for agent backends.
///
/// Implementations own their own retry policy; a returned error is final for
/// the dispatch.
#[async_trait::async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Backend name (e.g., "ollama", "command").
    fn name(&self) -> &str;

    /// Run one request to completion.
    async fn invoke(&self, request: &AgentRequest) -> AppResult<AgentOutput>;
}
