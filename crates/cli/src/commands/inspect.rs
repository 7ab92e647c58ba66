//! Inspect command handler.
//!
//! Shows a document's metadata, flags, placeholders and phase graph.

use clap::Args;
use conductor_core::{config::AppConfig, AppResult};
use conductor_prompt::placeholder::scan_tokens;
use conductor_prompt::{build_phase_graph, StepCondition};

use super::open_document;

/// Show the structure of a document
#[derive(Args, Debug)]
pub struct InspectCommand {
    /// Document id or path
    pub document: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl InspectCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing inspect command for: {}", self.document);

        let document = open_document(config, &self.document)?;
        let graph = build_phase_graph(&document.body, &document.metadata)?;
        let placeholders = scan_tokens(&document.body)?;
        let order = graph.topological_order();

        if self.json {
            let value = serde_json::json!({
                "name": document.display_name(),
                "source": document.source,
                "metadata": document.metadata,
                "declaredFlags": document.declared_flags,
                "placeholders": placeholders,
                "phases": graph.phases,
                "dispatchOrder": order,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        let metadata = &document.metadata;
        println!("Document: {}", document.display_name());
        if let Some(ref source) = document.source {
            println!("Source: {}", source.display());
        }
        if let Some(ref description) = metadata.description {
            println!("Description: {}", description);
        }
        if let Some(ref model) = metadata.model {
            println!("Model: {}", model);
        }
        if !metadata.tools.is_empty() {
            println!("Tools: {}", metadata.tools.join(", "));
        }
        if !document.declared_flags.is_empty() {
            let flags: Vec<String> = document
                .declared_flags
                .iter()
                .map(|f| format!("--{}", f))
                .collect();
            println!("Flags: {}", flags.join(" "));
        }
        if !placeholders.is_empty() {
            println!("Placeholders:");
            for token in &placeholders {
                let default = token
                    .default
                    .as_deref()
                    .or_else(|| metadata.defaults.get(&token.name).map(String::as_str));
                match default {
                    Some(d) => println!("  ${} (default: {})", token.name, d),
                    None => println!("  ${} (required)", token.name),
                }
            }
        }

        for phase in &graph.phases {
            println!();
            println!("Phase {}: {}", phase.ordinal, phase.title);
            for step in &phase.steps {
                println!("  [{}] {} ({})", step.id, step.title, step.role);
                if !step.depends_on.is_empty() {
                    let deps: Vec<&str> = step.depends_on.iter().map(|d| d.as_str()).collect();
                    println!("      depends on: {}", deps.join(", "));
                }
                match step.condition {
                    Some(StepCondition::SkipIf(ref flag)) => {
                        println!("      skipped when --{} is set", flag)
                    }
                    Some(StepCondition::OnlyIf(ref flag)) => {
                        println!("      runs only when --{} is set", flag)
                    }
                    None => {}
                }
            }
        }

        let order: Vec<&str> = order.iter().map(|id| id.as_str()).collect();
        println!();
        println!("Dispatch order: {}", order.join(" -> "));

        Ok(())
    }
}
