//! Agent backend implementations.

pub mod command;
pub mod dry_run;
pub mod ollama;

pub use command::CommandInvoker;
pub use dry_run::DryRunInvoker;
pub use ollama::OllamaInvoker;
