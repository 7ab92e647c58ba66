//! Agent invocation crate for Conductor.
//!
//! Provides the backend-agnostic `invoke(role, instruction, context)` seam the
//! orchestrator dispatches through, plus the built-in backends.
//!
//! # Backends
//! - **ollama**: local model runtime (default)
//! - **command**: any external program speaking JSON on stdin
//! - **dry-run**: echoes instructions, for previewing runs
//!
//! # Example
//! ```no_run
//! use conductor_agent::{AgentInvoker, AgentRequest, providers::OllamaInvoker};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let invoker = OllamaInvoker::new("llama3.2");
//! let request = AgentRequest::new("code-reviewer", "Review src/main.rs");
//! let output = invoker.invoke(&request).await?;
//! println!("{}", output.content);
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod invoker;
pub mod providers;

// Re-export main types
pub use factory::create_invoker;
pub use invoker::{AgentInvoker, AgentOutput, AgentRequest};
pub use providers::{CommandInvoker, DryRunInvoker, OllamaInvoker};
