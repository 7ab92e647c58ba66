//! List command handler.

use clap::Args;
use conductor_core::{config::AppConfig, AppResult};
use conductor_prompt::list_documents;

/// List documents in the configured directories
#[derive(Args, Debug)]
pub struct ListCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing list command");

        let documents = list_documents(&config.workspace, &config.document_search_paths())?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&documents)?);
            return Ok(());
        }

        if documents.is_empty() {
            println!("No documents found in:");
            for dir in config.document_search_paths() {
                println!("  {}", dir.display());
            }
            return Ok(());
        }

        let width = documents.iter().map(|d| d.id.len()).max().unwrap_or(0);
        for doc in &documents {
            println!(
                "{:width$}  {}",
                doc.id,
                doc.description.as_deref().unwrap_or(""),
                width = width
            );
        }

        Ok(())
    }
}
