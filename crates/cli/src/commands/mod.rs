//! Command handlers for the Conductor CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod inspect;
pub mod list;
pub mod render;
pub mod run;

// Re-export command types for convenience
pub use inspect::InspectCommand;
pub use list::ListCommand;
pub use render::RenderCommand;
pub use run::RunCommand;

use conductor_core::{config::AppConfig, AppResult};
use conductor_prompt::{find_document, load_document, Document};

/// Resolve a document id or path against the configured directories and load it.
pub(crate) fn open_document(config: &AppConfig, reference: &str) -> AppResult<Document> {
    let path = find_document(
        &config.workspace,
        &config.document_search_paths(),
        reference,
    )?;
    load_document(&path)
}

/// Parse a `NAME=VALUE` pair for `--arg`.
pub(crate) fn parse_named_value(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid NAME=VALUE: no '=' in '{}'", s))?;
    let name = name.trim().trim_start_matches('$');
    if name.is_empty() {
        return Err(format!("invalid NAME=VALUE: empty name in '{}'", s));
    }
    Ok((name.to_string(), value.to_string()))
}
