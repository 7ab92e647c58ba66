//! Render command handler: show what each step would receive, without dispatching.

use super::{open_document, parse_named_value};
use clap::Args;
use conductor_core::{config::AppConfig, AppResult};
use conductor_orchestrator::RunPlan;
use conductor_prompt::Arguments;
use std::collections::HashMap;

/// Resolve a document's placeholders and print each step's instruction
#[derive(Args, Debug)]
pub struct RenderCommand {
    /// Document id or path
    pub document: String,

    /// Argument text for $ARGUMENTS
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Named placeholder value (repeatable)
    #[arg(long = "arg", value_name = "NAME=VALUE", value_parser = parse_named_value)]
    pub named: Vec<(String, String)>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RenderCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing render command for: {}", self.document);

        let document = open_document(config, &self.document)?;
        let arguments = Arguments::from_words(&self.args, &document.declared_flags);
        let named: HashMap<String, String> = self.named.iter().cloned().collect();
        let plan = RunPlan::build(&document, &arguments, &named)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&plan.rendered_steps())?);
            return Ok(());
        }

        for step in plan.rendered_steps() {
            println!("### Step {} ({})", step.id, step.role);
            if let Some(reason) = plan.pruned.get(&step.id) {
                println!("(pruned: {})", reason);
            }
            println!();
            println!("{}", step.instruction.trim());
            if let Some(ref expected) = step.expected_output {
                println!();
                println!("Expected output: {}", expected.trim());
            }
            println!();
        }

        Ok(())
    }
}
