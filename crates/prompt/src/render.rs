//! Step rendering: resolve every step's placeholders ahead of dispatch.

use crate::args::Arguments;
use crate::placeholder::{self, ARGUMENTS};
use crate::types::{Document, PhaseGraph, StepId};
use conductor_core::AppResult;
use serde::Serialize;
use std::collections::HashMap;

/// A step with all placeholders substituted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedStep {
    pub id: StepId,
    pub role: String,
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

/// Build the per-run value map.
///
/// `ARGUMENTS` comes from the catch-all text; explicitly named values win over
/// it. A blank catch-all counts as absent.
pub fn value_map(arguments: &Arguments, named: &HashMap<String, String>) -> HashMap<String, String> {
    let mut values = HashMap::new();
    if let Some(ref catch_all) = arguments.catch_all {
        if !catch_all.trim().is_empty() {
            values.insert(ARGUMENTS.to_string(), catch_all.clone());
        }
    }
    values.extend(named.iter().map(|(k, v)| (k.clone(), v.clone())));
    values
}

/// Resolve the instruction and expected output of every step in `graph`.
///
/// Stops at the first unresolved or ambiguous placeholder, so nothing is
/// dispatched for a document that cannot be fully rendered.
pub fn render_steps(
    document: &Document,
    graph: &PhaseGraph,
    arguments: &Arguments,
    named: &HashMap<String, String>,
) -> AppResult<Vec<RenderedStep>> {
    let values = value_map(arguments, named);
    let defaults = &document.metadata.defaults;

    graph
        .steps()
        .map(|step| {
            let instruction = placeholder::resolve(&step.instruction, &values, defaults)?;
            let expected_output = step
                .expected_output
                .as_deref()
                .map(|text| placeholder::resolve(text, &values, defaults))
                .transpose()?;

            Ok(RenderedStep {
                id: step.id.clone(),
                role: step.role.clone(),
                instruction,
                expected_output,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_phase_graph;
    use conductor_core::AppError;
    use std::collections::BTreeSet;

    fn prepare(text: &str) -> (Document, PhaseGraph) {
        let document = Document::parse(text).unwrap();
        let graph = build_phase_graph(&document.body, &document.metadata).unwrap();
        (document, graph)
    }

    #[test]
    fn test_render_single_step() {
        let (document, graph) = prepare("Phase 1: do $X");
        let mut named = HashMap::new();
        named.insert("X".to_string(), "build".to_string());

        let steps = render_steps(&document, &graph, &Arguments::default(), &named).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].instruction, "Phase 1: do build");
    }

    #[test]
    fn test_unresolved_arguments_fail_before_dispatch() {
        let (document, graph) = prepare("Implement $ARGUMENTS");
        let result = render_steps(&document, &graph, &Arguments::default(), &HashMap::new());
        assert!(matches!(
            result,
            Err(AppError::UnresolvedPlaceholder { ref token }) if token == "ARGUMENTS"
        ));
    }

    #[test]
    fn test_blank_catch_all_is_absent() {
        let (document, graph) = prepare("Implement $ARGUMENTS");
        let arguments = Arguments {
            catch_all: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(render_steps(&document, &graph, &arguments, &HashMap::new()).is_err());
    }

    #[test]
    fn test_catch_all_and_document_defaults() {
        let text = "---\ndefaults:\n  TARGET: src/\n---\n## Phase 1: Scan\n### 1. Scan\n- Prompt: Scan $TARGET for $ARGUMENTS\n- Expected output: Findings for $ARGUMENTS\n";
        let (document, graph) = prepare(text);
        let arguments = Arguments::parse("sql injection", &BTreeSet::new());

        let steps = render_steps(&document, &graph, &arguments, &HashMap::new()).unwrap();
        assert_eq!(steps[0].instruction, "Scan src/ for sql injection");
        assert_eq!(
            steps[0].expected_output.as_deref(),
            Some("Findings for sql injection")
        );
    }

    #[test]
    fn test_named_value_overrides_catch_all() {
        let (document, graph) = prepare("Do $ARGUMENTS");
        let arguments = Arguments::parse("from blob", &BTreeSet::new());
        let mut named = HashMap::new();
        named.insert(ARGUMENTS.to_string(), "from name".to_string());

        let steps = render_steps(&document, &graph, &arguments, &named).unwrap();
        assert_eq!(steps[0].instruction, "Do from name");
    }
}
