//! Run planning: everything that can fail before the first dispatch.

use conductor_core::AppResult;
use conductor_prompt::{
    build_phase_graph, render_steps, Arguments, Document, FlagSet, PhaseGraph, RenderedStep,
    StepCondition, StepId,
};
use std::collections::{BTreeMap, HashMap};

/// A fully rendered, ready-to-run document.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Display name of the document
    pub document: String,

    /// Model hint forwarded to every dispatch
    pub model: Option<String>,

    /// Tool-access list forwarded to every dispatch
    pub tools: Vec<String>,

    pub graph: PhaseGraph,

    /// Flags recognized in the argument blob
    pub flags: FlagSet,

    /// Steps removed by flag conditions, with the reason
    pub pruned: BTreeMap<StepId, String>,

    rendered: HashMap<StepId, RenderedStep>,
}

impl RunPlan {
    /// Build the phase graph and plan the run.
    pub fn build(
        document: &Document,
        arguments: &Arguments,
        named: &HashMap<String, String>,
    ) -> AppResult<Self> {
        let graph = build_phase_graph(&document.body, &document.metadata)?;
        Self::prepare(document, graph, arguments, named)
    }

    /// Plan a run over an already built graph.
    ///
    /// Every step's placeholders are resolved here, so an unresolved token
    /// fails the run before anything is dispatched.
    pub fn prepare(
        document: &Document,
        graph: PhaseGraph,
        arguments: &Arguments,
        named: &HashMap<String, String>,
    ) -> AppResult<Self> {
        let rendered = render_steps(document, &graph, arguments, named)?
            .into_iter()
            .map(|step| (step.id.clone(), step))
            .collect();

        let pruned = graph
            .steps()
            .filter_map(|step| {
                let reason = prune_reason(step.condition.as_ref()?, &arguments.flags)?;
                Some((step.id.clone(), reason))
            })
            .collect();

        tracing::debug!(
            "Planned {} step(s) across {} phase(s)",
            graph.len(),
            graph.phases.len()
        );

        Ok(Self {
            document: document.display_name(),
            model: document.metadata.model.clone(),
            tools: document.metadata.tools.clone(),
            graph,
            flags: arguments.flags.clone(),
            pruned,
            rendered,
        })
    }

    pub fn rendered(&self, id: &StepId) -> Option<&RenderedStep> {
        self.rendered.get(id)
    }

    /// Rendered steps in document order.
    pub fn rendered_steps(&self) -> Vec<&RenderedStep> {
        self.graph
            .steps()
            .filter_map(|s| self.rendered.get(&s.id))
            .collect()
    }
}

fn prune_reason(condition: &StepCondition, flags: &FlagSet) -> Option<String> {
    match condition {
        StepCondition::SkipIf(flag) if flags.is_set(flag) => Some(format!("--{} is set", flag)),
        StepCondition::OnlyIf(flag) if !flags.is_set(flag) => {
            Some(format!("--{} is not set", flag))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::AppError;

    const DOC: &str = "---\nname: ship\nmodel: sonnet\nflags: [--skip-tests, --draft-pr]\n---\n## Phase 1: Build\n### 1. Implement\n- Prompt: Implement $ARGUMENTS\n### 2. Tests\n- Skip if: --skip-tests\n- Prompt: Test it\n### 3. Draft\n- Only if: --draft-pr\n- Prompt: Open a PR\n";

    #[test]
    fn test_prepare_renders_and_prunes() {
        let document = Document::parse(DOC).unwrap();
        let arguments = Arguments::parse("login page --skip-tests", &document.declared_flags);
        let plan = RunPlan::build(&document, &arguments, &HashMap::new()).unwrap();

        assert_eq!(plan.document, "ship");
        assert_eq!(plan.model.as_deref(), Some("sonnet"));
        assert_eq!(
            plan.rendered(&StepId::from("1")).unwrap().instruction,
            "Implement login page"
        );
        assert_eq!(
            plan.pruned.keys().map(StepId::as_str).collect::<Vec<_>>(),
            vec!["2", "3"]
        );
        assert_eq!(plan.rendered_steps().len(), 3);
    }

    #[test]
    fn test_prepare_fails_on_unresolved_placeholder() {
        let document = Document::parse(DOC).unwrap();
        let result = RunPlan::build(&document, &Arguments::default(), &HashMap::new());
        assert!(matches!(
            result,
            Err(AppError::UnresolvedPlaceholder { .. })
        ));
    }
}
