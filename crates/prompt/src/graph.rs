//! Phase graph construction.
//!
//! Turns the structural markers of a document body into phases and steps:
//!
//! ```text
//! ## Phase 1: Analysis
//! ### 1. Architecture Review
//! - Use Task tool with subagent_type="architect-review"
//! - Prompt: "Review the design of $ARGUMENTS"
//! - Expected output: Risk assessment
//!
//! ## Phase 2: Implementation
//! ### 2. Backend
//! - Agent: backend-architect
//! - Context from previous: step 1
//! ```
//!
//! Dependency edges come only from context annotations and may only point
//! backwards in document order, so the graph is acyclic by construction.

use crate::markdown::{self, Line};
use crate::types::{Metadata, Phase, PhaseGraph, Step, StepCondition, StepId};
use conductor_core::{AppError, AppResult};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

const DEFAULT_ROLE: &str = "general-purpose";
const DEFAULT_VALIDATOR: &str = "validator";
const VALIDATION_STEP: &str = "validation";

static PHASE_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:phase)\s+(\d+)\s*[:.\-]?\s*(.*)$").expect("Invalid phase heading regex")
});

static LABELED_STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:step)\s+(\d+(?:\.\d+)*|[A-Z])(?:\s*[:.)\-]\s*|\s+|$)(.*)$")
        .expect("Invalid step heading regex")
});

static NUMBERED_STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)*)[.):]?(?:\s+(.*))?$").expect("Invalid step heading regex")
});

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)[-*+]\s+(.*)$").expect("Invalid bullet regex"));

static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9 ]*?)\s*:\s*(.*)$").expect("Invalid attribute regex")
});

static SUBAGENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"subagent_type\s*[=:]\s*["'`]?([\w:./\-]+)"#).expect("Invalid subagent regex")
});

static STEP_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?i:steps?)\s+((?:\d+(?:\.\d+)*|[A-Z]\b)(?:\s*(?:,|&|(?i:and)|(?i:or))\s*(?:\d+(?:\.\d+)*|[A-Z]\b))*)",
    )
    .expect("Invalid step reference regex")
});

static STEP_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)*|[A-Z]\b").expect("Invalid label regex"));

static PHASE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:phases?)\s+(\d+(?:\s*(?:,|&|(?i:and)|(?i:or))\s*\d+)*)")
        .expect("Invalid phase reference regex")
});

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("Invalid number regex"));

static ITEM_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[,;&]|\s+(?i:and)\s+").expect("Invalid item separator regex")
});

static FLAG_MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:`|\*\*)--([a-z][a-z0-9\-]*)").expect("Invalid flag mention regex")
});

static FLAG_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-{0,2}([a-z][a-z0-9\-]*)").expect("Invalid flag name regex"));

/// A `##`-level section of the body.
enum Section<'a> {
    Preamble,
    Phase(PhaseDraft<'a>),
    Validation { title: String, text: String },
    Other,
}

struct PhaseDraft<'a> {
    ordinal: u32,
    title: String,
    intro: Vec<Line<'a>>,
    steps: Vec<StepHeading<'a>>,
}

struct StepHeading<'a> {
    label: Option<String>,
    title: String,
    lines: Vec<Line<'a>>,
}

/// Attributes pulled out of a step section.
#[derive(Default)]
struct Attributes {
    role: Option<String>,
    prompt: Option<String>,
    expected_output: Option<String>,
    context: Option<ContextAnnotation>,
    condition: Option<StepCondition>,
    remainder: String,
}

#[derive(Debug, Clone)]
struct ContextAnnotation {
    raw: String,
    from_phase: Option<u32>,
    from_previous: bool,
    value: String,
}

/// Step before edge inference.
struct StepDraft {
    id: StepId,
    /// Label as written; unique within its phase only
    label: String,
    phase_index: usize,
    title: String,
    attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reference {
    Step(String),
    Phase(u32),
    PreviousStep,
    PreviousPhase,
    Title(String),
}

impl Reference {
    fn describe(&self) -> String {
        match self {
            Reference::Step(label) => format!("step {}", label),
            Reference::Phase(n) => format!("phase {}", n),
            Reference::PreviousStep => "previous step".to_string(),
            Reference::PreviousPhase => "previous phase".to_string(),
            Reference::Title(title) => title.clone(),
        }
    }
}

/// Build the phase graph for a document body.
///
/// The body is parsed before placeholder resolution; structure does not
/// depend on argument values.
pub fn build_phase_graph(body: &str, metadata: &Metadata) -> AppResult<PhaseGraph> {
    let default_role = metadata
        .role
        .clone()
        .or_else(|| metadata.name.clone())
        .unwrap_or_else(|| DEFAULT_ROLE.to_string());

    let sections = split_sections(body)?;
    let mut phase_drafts: Vec<PhaseDraft> = Vec::new();
    let mut validation: Option<(String, String)> = None;

    for section in sections {
        match section {
            Section::Phase(draft) => phase_drafts.push(draft),
            Section::Validation { title, text } => validation = Some((title, text)),
            Section::Preamble | Section::Other => {}
        }
    }

    if phase_drafts.is_empty() {
        let instruction = body.trim().to_string();
        tracing::debug!("No phase headings; treating the whole body as one step");
        let step = Step {
            id: StepId::from("1"),
            ordinal: 0,
            phase: 1,
            title: metadata.name.clone().unwrap_or_else(|| "Main".to_string()),
            role: default_role,
            instruction,
            expected_output: None,
            context_annotation: None,
            depends_on: Vec::new(),
            condition: None,
        };
        return Ok(PhaseGraph {
            phases: vec![Phase {
                ordinal: 1,
                title: step.title.clone(),
                steps: vec![step],
            }],
        });
    }

    let mut drafts: Vec<StepDraft> = Vec::new();
    for (phase_index, phase) in phase_drafts.iter().enumerate() {
        if phase.steps.is_empty() {
            let label = format!("phase-{}", phase.ordinal);
            drafts.push(StepDraft {
                id: StepId::new(label.clone()),
                label,
                phase_index,
                title: phase.title.clone(),
                attributes: extract_attributes(&phase.intro),
            });
            continue;
        }

        let mut seen = BTreeSet::new();
        for (index, heading) in phase.steps.iter().enumerate() {
            let label = heading
                .label
                .clone()
                .unwrap_or_else(|| format!("{}.{}", phase.ordinal, index + 1));
            if !seen.insert(label.clone()) {
                return Err(AppError::DuplicateStep { step: label });
            }
            drafts.push(StepDraft {
                id: StepId::new(label.clone()),
                label,
                phase_index,
                title: heading.title.clone(),
                attributes: extract_attributes(&heading.lines),
            });
        }
    }
    qualify_repeated_labels(&mut drafts, &phase_drafts);

    let mut dependencies: Vec<Vec<StepId>> = Vec::with_capacity(drafts.len());
    for index in 0..drafts.len() {
        dependencies.push(infer_dependencies(index, &drafts, &phase_drafts)?);
    }

    let mut phases: Vec<Phase> = phase_drafts
        .iter()
        .map(|p| Phase {
            ordinal: p.ordinal,
            title: p.title.clone(),
            steps: Vec::new(),
        })
        .collect();

    for (ordinal, (draft, depends_on)) in drafts.into_iter().zip(dependencies).enumerate() {
        let attributes = draft.attributes;
        let instruction = attributes
            .prompt
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| Some(attributes.remainder.trim().to_string()).filter(|r| !r.is_empty()))
            .unwrap_or_else(|| draft.title.clone());

        let phase = &mut phases[draft.phase_index];
        let phase_ordinal = phase.ordinal;
        phase.steps.push(Step {
            id: draft.id,
            ordinal,
            phase: phase_ordinal,
            title: draft.title,
            role: attributes.role.unwrap_or_else(|| default_role.clone()),
            instruction,
            expected_output: attributes.expected_output,
            context_annotation: attributes.context.map(|c| c.raw),
            depends_on,
            condition: attributes.condition,
        });
    }

    if let Some((title, text)) = validation {
        let validation_id = StepId::from(VALIDATION_STEP);
        if phases
            .iter()
            .flat_map(|p| p.steps.iter())
            .any(|s| s.id == validation_id)
        {
            return Err(AppError::DuplicateStep {
                step: VALIDATION_STEP.to_string(),
            });
        }

        let all_prior: Vec<StepId> = phases
            .iter()
            .flat_map(|p| p.steps.iter().map(|s| s.id.clone()))
            .collect();
        let ordinal = all_prior.len();
        let phase_ordinal = phases.last().map(|p| p.ordinal + 1).unwrap_or(1);

        phases.push(Phase {
            ordinal: phase_ordinal,
            title: title.clone(),
            steps: vec![Step {
                id: validation_id,
                ordinal,
                phase: phase_ordinal,
                title,
                role: metadata
                    .validator
                    .clone()
                    .unwrap_or_else(|| DEFAULT_VALIDATOR.to_string()),
                instruction: format!(
                    "Validate the outputs of all previous steps against these success criteria:\n\n{}",
                    text.trim()
                ),
                expected_output: Some("Pass/fail verdict for each criterion".to_string()),
                context_annotation: None,
                depends_on: all_prior,
                condition: None,
            }],
        });
    }

    let graph = PhaseGraph { phases };
    tracing::debug!(
        "Built phase graph: {} phase(s), {} step(s), {} root(s)",
        graph.phases.len(),
        graph.len(),
        graph.roots().len()
    );

    Ok(graph)
}

fn heading_text<'a>(line: &'a str, level: usize) -> Option<&'a str> {
    let hashes = "#".repeat(level);
    let rest = line.strip_prefix(hashes.as_str())?;
    if rest.starts_with('#') {
        return None;
    }
    let rest = rest.strip_prefix(' ').or_else(|| rest.strip_prefix('\t'))?;
    Some(rest.trim().trim_end_matches('#').trim())
}

fn is_validation_heading(title: &str) -> bool {
    let lower = title.to_lowercase();
    lower.starts_with("success criteria") || lower.starts_with("validation")
}

fn split_sections(body: &str) -> AppResult<Vec<Section<'_>>> {
    let mut sections = vec![Section::Preamble];
    let mut last_phase: Option<u32> = None;

    for line in markdown::lines(body) {
        if !line.fenced {
            if let Some(title) = heading_text(line.text, 2) {
                let section = if let Some(caps) = PHASE_HEADING_RE.captures(title) {
                    let ordinal: u32 = caps[1].parse().map_err(|_| {
                        AppError::Prompt(format!("Invalid phase number in heading '{}'", title))
                    })?;
                    if last_phase.is_some_and(|last| ordinal <= last) {
                        return Err(AppError::Prompt(format!(
                            "Phase {} appears after phase {}; phases must be in increasing order",
                            ordinal,
                            last_phase.unwrap_or_default()
                        )));
                    }
                    last_phase = Some(ordinal);
                    let rest = caps[2].trim();
                    Section::Phase(PhaseDraft {
                        ordinal,
                        title: if rest.is_empty() {
                            format!("Phase {}", ordinal)
                        } else {
                            rest.to_string()
                        },
                        intro: Vec::new(),
                        steps: Vec::new(),
                    })
                } else if is_validation_heading(title) {
                    Section::Validation {
                        title: title.to_string(),
                        text: String::new(),
                    }
                } else {
                    Section::Other
                };
                sections.push(section);
                continue;
            }
        }

        let Some(current) = sections.last_mut() else {
            continue;
        };

        match current {
            Section::Phase(phase) => {
                if !line.fenced {
                    if let Some(title) = heading_text(line.text, 3) {
                        let (label, title) = parse_step_heading(title);
                        phase.steps.push(StepHeading {
                            label,
                            title,
                            lines: Vec::new(),
                        });
                        continue;
                    }
                }
                match phase.steps.last_mut() {
                    Some(step) => step.lines.push(line),
                    None => phase.intro.push(line),
                }
            }
            Section::Validation { text, .. } => text.push_str(line.raw),
            Section::Preamble | Section::Other => {}
        }
    }

    Ok(sections)
}

fn parse_step_heading(text: &str) -> (Option<String>, String) {
    if let Some(caps) = LABELED_STEP_RE.captures(text) {
        let label = caps[1].to_string();
        let title = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        let title = if title.is_empty() {
            format!("Step {}", label)
        } else {
            title.to_string()
        };
        return (Some(label), title);
    }

    if let Some(caps) = NUMBERED_STEP_RE.captures(text) {
        let label = caps[1].to_string();
        let title = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        let title = if title.is_empty() {
            format!("Step {}", label)
        } else {
            title.to_string()
        };
        return (Some(label), title);
    }

    (None, text.to_string())
}

fn strip_wrapping(value: &str) -> String {
    let trimmed = value.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('`', '`'), ('[', ']'), ('(', ')')] {
        if trimmed.len() >= 2 && trimmed.starts_with(open) && trimmed.ends_with(close) {
            return trimmed[open.len_utf8()..trimmed.len() - close.len_utf8()]
                .trim()
                .to_string();
        }
    }
    trimmed.to_string()
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn extract_attributes(lines: &[Line<'_>]) -> Attributes {
    let mut attributes = Attributes::default();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        index += 1;

        let bullet = if line.fenced {
            None
        } else {
            BULLET_RE.captures(line.text)
        };
        let Some(bullet) = bullet else {
            attributes.remainder.push_str(line.raw);
            continue;
        };

        let bullet_indent = bullet[1].len();
        let content = bullet[2].replace("**", "");

        // Continuation lines are indented past the bullet marker.
        let mut continuation: Vec<&str> = Vec::new();
        while index < lines.len() {
            let next = lines[index];
            if next.fenced || next.text.trim().is_empty() || indent_of(next.text) <= bullet_indent
            {
                break;
            }
            continuation.push(next.text.trim());
            index += 1;
        }

        let consumed = apply_attribute(&mut attributes, &content, &continuation);
        if !consumed {
            attributes.remainder.push_str(line.raw);
            for extra in &continuation {
                attributes.remainder.push_str(extra);
                attributes.remainder.push('\n');
            }
        }
    }

    attributes
}

/// Returns false when the bullet is ordinary text rather than an attribute.
fn apply_attribute(attributes: &mut Attributes, content: &str, continuation: &[&str]) -> bool {
    if let Some(caps) = SUBAGENT_RE.captures(content) {
        attributes.role = Some(caps[1].to_string());
        return true;
    }

    let Some(caps) = ATTRIBUTE_RE.captures(content) else {
        return false;
    };
    let key = caps[1].trim().to_lowercase();
    let mut value = caps[2].trim().to_string();
    for extra in continuation {
        value.push('\n');
        value.push_str(extra);
    }

    match key.as_str() {
        "agent" | "role" | "subagent" => {
            attributes.role = Some(strip_wrapping(&value));
        }
        "prompt" | "instruction" | "instructions" | "task" => {
            attributes.prompt = Some(strip_wrapping(&value));
        }
        "expected output" | "output" | "outputs" | "deliverable" | "deliverables" => {
            attributes.expected_output = Some(value.trim().to_string());
        }
        "skip if" | "skip when" | "unless" => {
            attributes.condition = flag_name(&value).map(StepCondition::SkipIf);
            return attributes.condition.is_some();
        }
        "only if" | "only when" | "run if" | "when" => {
            attributes.condition = flag_name(&value).map(StepCondition::OnlyIf);
            return attributes.condition.is_some();
        }
        _ if key == "context" || key.starts_with("context from") => {
            let from_phase = key
                .strip_prefix("context from phase")
                .and_then(|rest| rest.trim().parse().ok());
            attributes.context = Some(ContextAnnotation {
                raw: content.trim().to_string(),
                from_phase,
                from_previous: key.starts_with("context from previous"),
                value,
            });
        }
        _ => return false,
    }

    true
}

fn flag_name(value: &str) -> Option<String> {
    let cleaned = strip_wrapping(value);
    FLAG_NAME_RE
        .captures(cleaned.trim())
        .map(|caps| caps[1].to_string())
}

fn parse_references(annotation: &ContextAnnotation) -> Vec<Reference> {
    let mut refs = Vec::new();

    if let Some(n) = annotation.from_phase {
        refs.push(Reference::Phase(n));
    }

    let mut remainder = annotation.value.clone();

    // Structural references first; their spans are blanked out so the rest
    // can be split into free-text items.
    for caps in STEP_REF_RE.captures_iter(&annotation.value) {
        for label in STEP_LABEL_RE.find_iter(&caps[1]) {
            refs.push(Reference::Step(label.as_str().to_string()));
        }
    }
    remainder = STEP_REF_RE.replace_all(&remainder, ",").into_owned();

    for caps in PHASE_REF_RE.captures_iter(&annotation.value) {
        for number in NUMBER_RE.find_iter(&caps[1]) {
            if let Ok(n) = number.as_str().parse() {
                refs.push(Reference::Phase(n));
            }
        }
    }
    remainder = PHASE_REF_RE.replace_all(&remainder, ",").into_owned();

    for item in ITEM_SPLIT_RE.split(&remainder) {
        let item = strip_wrapping(item);
        let lower = item.to_lowercase();
        let lower = lower.trim_start_matches("the ").trim();
        if lower.is_empty() || matches!(lower, "none" | "n/a" | "-") {
            continue;
        }
        if lower.starts_with("previous step") || lower.starts_with("prior step") {
            refs.push(Reference::PreviousStep);
        } else if matches!(
            lower,
            "previous" | "previous phase" | "previous phases" | "previous steps" | "all previous"
        ) {
            refs.push(Reference::PreviousPhase);
        } else {
            refs.push(Reference::Title(item.to_string()));
        }
    }

    refs
}

fn infer_dependencies(
    index: usize,
    drafts: &[StepDraft],
    phases: &[PhaseDraft<'_>],
) -> AppResult<Vec<StepId>> {
    let draft = &drafts[index];
    let Some(ref annotation) = draft.attributes.context else {
        return Ok(Vec::new());
    };

    let phase_ordinal = phases[draft.phase_index].ordinal;
    let mut targets: BTreeSet<usize> = BTreeSet::new();
    let mut structural = false;

    let dangling = |reference: &Reference| AppError::DanglingContextReference {
        step: draft.id.to_string(),
        reference: reference.describe(),
    };
    let forward = |reference: &Reference| AppError::ForwardReference {
        step: draft.id.to_string(),
        reference: reference.describe(),
    };

    for reference in parse_references(annotation) {
        match &reference {
            Reference::Step(label) => {
                structural = true;
                let target =
                    resolve_label(label, index, drafts).ok_or_else(|| dangling(&reference))?;
                if target >= index {
                    return Err(forward(&reference));
                }
                targets.insert(target);
            }
            Reference::Phase(n) => {
                structural = true;
                let phase_index = phases
                    .iter()
                    .position(|p| p.ordinal == *n)
                    .ok_or_else(|| dangling(&reference))?;
                if *n >= phase_ordinal {
                    return Err(forward(&reference));
                }
                targets.extend(steps_in_phase(drafts, phase_index));
            }
            Reference::PreviousStep => {
                structural = true;
                if index == 0 {
                    return Err(dangling(&reference));
                }
                targets.insert(index - 1);
            }
            Reference::PreviousPhase => {
                structural = true;
                if draft.phase_index == 0 {
                    return Err(dangling(&reference));
                }
                targets.extend(steps_in_phase(drafts, draft.phase_index - 1));
            }
            Reference::Title(title) => {
                let found = drafts.iter().position(|d| {
                    d.title.eq_ignore_ascii_case(title)
                        || d.label.eq_ignore_ascii_case(title)
                        || d.id.as_str().eq_ignore_ascii_case(title)
                });
                match found {
                    Some(target) if target >= index => return Err(forward(&reference)),
                    Some(target) => {
                        structural = true;
                        targets.insert(target);
                    }
                    // Free text describing the context, not a reference.
                    None => {}
                }
            }
        }
    }

    // "Context from previous: <description>" with nothing resolvable points at
    // the preceding phase, or the preceding step inside the first phase.
    if !structural && annotation.from_previous {
        if draft.phase_index > 0 {
            targets.extend(steps_in_phase(drafts, draft.phase_index - 1));
        } else if index > 0 {
            targets.insert(index - 1);
        }
    }

    Ok(targets.into_iter().map(|t| drafts[t].id.clone()).collect())
}

/// Labels used in more than one phase become `<phase>:<label>` ids, so
/// numbering may restart in every phase.
fn qualify_repeated_labels(drafts: &mut [StepDraft], phases: &[PhaseDraft<'_>]) {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for draft in drafts.iter() {
        *counts.entry(draft.label.clone()).or_default() += 1;
    }
    for draft in drafts.iter_mut() {
        if counts.get(&draft.label).is_some_and(|&n| n > 1) {
            let ordinal = phases[draft.phase_index].ordinal;
            draft.id = StepId::new(format!("{}:{}", ordinal, draft.label));
        }
    }
}

/// Find the step a `step <label>` reference names: the one in the same phase,
/// otherwise the nearest earlier one, otherwise any (a forward reference).
fn resolve_label(label: &str, index: usize, drafts: &[StepDraft]) -> Option<usize> {
    let phase_index = drafts[index].phase_index;
    let candidates: Vec<usize> = drafts
        .iter()
        .enumerate()
        .filter(|(_, d)| d.label == label || d.id.as_str() == label)
        .map(|(i, _)| i)
        .collect();

    candidates
        .iter()
        .copied()
        .find(|&i| drafts[i].phase_index == phase_index)
        .or_else(|| candidates.iter().copied().filter(|&i| i < index).last())
        .or_else(|| candidates.first().copied())
}

fn steps_in_phase(drafts: &[StepDraft], phase_index: usize) -> Vec<usize> {
    drafts
        .iter()
        .enumerate()
        .filter(|(_, d)| d.phase_index == phase_index)
        .map(|(i, _)| i)
        .collect()
}

/// Flags mentioned in parameter/option sections, e.g. "- `--skip-tests`: ...".
pub fn scan_declared_flags(body: &str) -> BTreeSet<String> {
    let mut flags = BTreeSet::new();
    let mut in_options = false;

    for line in markdown::lines(body) {
        if line.fenced {
            continue;
        }
        if let Some(title) = heading_text(line.text, 2) {
            let lower = title.to_lowercase();
            in_options = !PHASE_HEADING_RE.is_match(title)
                && ["parameter", "option", "flag", "argument"]
                    .iter()
                    .any(|word| lower.contains(word));
            continue;
        }
        if in_options {
            for caps in FLAG_MENTION_RE.captures_iter(line.text) {
                flags.insert(caps[1].to_string());
            }
        }
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ok(body: &str) -> PhaseGraph {
        build_phase_graph(body, &Metadata::default()).unwrap()
    }

    fn ids(steps: &[StepId]) -> Vec<&str> {
        steps.iter().map(StepId::as_str).collect()
    }

    const WORKFLOW: &str = r#"# Full-Stack Feature

Build $ARGUMENTS end to end.

## Phase 1: Architecture

### 1. Database Design
- Use Task tool with subagent_type="database-architect"
- Prompt: "Design the schema for: $ARGUMENTS"
- Expected output: ER diagram and migrations plan

### 2. Backend Architecture
- Use Task tool with subagent_type="backend-architect"
- Prompt: "Design services for $ARGUMENTS using the schema"
- Context: Database schema from step 1

## Phase 2: Implementation

### 3. API Implementation
- Agent: backend-developer
- Prompt: "Implement the API"
- Context from previous: Backend Architecture

### 4. Frontend
- Agent: frontend-developer
- Prompt: "Build the UI"
- Context from phase 1: API contract

### 5. Tests
- Agent: test-automator
- Skip if: --skip-tests
- Prompt: "Write tests"
- Context: steps 3 and 4

## Success Criteria
- All endpoints documented
- Tests pass
"#;

    #[test]
    fn test_workflow_structure() {
        let graph = build_ok(WORKFLOW);
        assert_eq!(graph.phases.len(), 3);
        assert_eq!(graph.phases[0].title, "Architecture");
        assert_eq!(graph.phases[1].steps.len(), 3);
        assert_eq!(graph.len(), 6);

        let first = graph.step(&StepId::from("1")).unwrap();
        assert_eq!(first.role, "database-architect");
        assert_eq!(first.instruction, "Design the schema for: $ARGUMENTS");
        assert_eq!(
            first.expected_output.as_deref(),
            Some("ER diagram and migrations plan")
        );
    }

    #[test]
    fn test_workflow_edges() {
        let graph = build_ok(WORKFLOW);
        let deps = |id: &str| ids(&graph.step(&StepId::from(id)).unwrap().depends_on).join(",");

        assert_eq!(deps("1"), "");
        assert_eq!(deps("2"), "1");
        assert_eq!(deps("3"), "2");
        assert_eq!(deps("4"), "1,2");
        assert_eq!(deps("5"), "3,4");
        assert_eq!(deps("validation"), "1,2,3,4,5");
        assert_eq!(
            graph.step(&StepId::from("5")).unwrap().condition,
            Some(StepCondition::SkipIf("skip-tests".to_string()))
        );
    }

    #[test]
    fn test_validation_step() {
        let graph = build_ok(WORKFLOW);
        let last = graph.phases.last().unwrap();
        assert_eq!(last.ordinal, 3);
        assert_eq!(last.title, "Success Criteria");
        let step = &last.steps[0];
        assert_eq!(step.role, "validator");
        assert!(step.instruction.contains("All endpoints documented"));
    }

    #[test]
    fn test_body_without_phases_is_one_step() {
        let graph = build_ok("Phase 1: do $X");
        assert_eq!(graph.len(), 1);
        let step = graph.steps().next().unwrap();
        assert_eq!(step.instruction, "Phase 1: do $X");
        assert_eq!(step.role, "general-purpose");
        assert_eq!(graph.roots().len(), 1);
    }

    #[test]
    fn test_phase_without_steps_is_one_step() {
        let graph = build_ok("## Phase 1: Scan\nRun the scanner on $TARGET.\n\n## Phase 2: Report\n- Context from previous: findings\nSummarize.\n");
        assert_eq!(graph.len(), 2);
        let report = graph.step(&StepId::from("phase-2")).unwrap();
        assert_eq!(report.title, "Report");
        assert_eq!(ids(&report.depends_on), vec!["phase-1"]);
        assert_eq!(report.instruction, "Summarize.");
    }

    #[test]
    fn test_implicit_step_does_not_clash_with_numbered_steps() {
        let body = "## Phase 1: Plan\n### 1. Outline\nOutline it.\n### 2. Scan\nScan it.\n## Phase 2: Report\n- Context from previous: findings\nSummarize.\n";
        let graph = build_ok(body);
        let labels: Vec<&str> = graph.steps().map(|s| s.id.as_str()).collect();
        assert_eq!(labels, vec!["1", "2", "phase-2"]);
        let report = graph.step(&StepId::from("phase-2")).unwrap();
        assert_eq!(ids(&report.depends_on), vec!["1", "2"]);
    }

    #[test]
    fn test_numbering_restarts_per_phase() {
        let body = "## Phase 1: Design\n### 1. Schema\nDesign it.\n### 2. Api\n- Context: step 1\n## Phase 2: Build\n### 1. Backend\n- Context from previous: Api\n### 2. Frontend\n- Context: step 1\n### 3. Docs\n- Context: step 2 and step 3\n";
        let result = build_phase_graph(body, &Metadata::default());
        assert!(matches!(result, Err(AppError::ForwardReference { .. })));

        let body = body.replace("step 2 and step 3", "step 2");
        let graph = build_ok(&body);
        let labels: Vec<&str> = graph.steps().map(|s| s.id.as_str()).collect();
        assert_eq!(labels, vec!["1:1", "1:2", "2:1", "2:2", "3"]);

        let deps = |id: &str| ids(&graph.step(&StepId::from(id)).unwrap().depends_on).join(",");
        assert_eq!(deps("1:2"), "1:1");
        assert_eq!(deps("2:1"), "1:2");
        assert_eq!(deps("2:2"), "2:1");
        assert_eq!(deps("3"), "2:2");
    }

    #[test]
    fn test_repeated_label_falls_back_to_earlier_phase() {
        let body = "## Phase 1: A\n### 1. First\nDo it.\n### 2. Second\nDo it.\n## Phase 2: B\n### 1. Again\n- Context: step 2\n";
        let graph = build_ok(body);
        let again = graph.step(&StepId::from("2:1")).unwrap();
        assert_eq!(ids(&again.depends_on), vec!["2"]);
    }

    #[test]
    fn test_lettered_steps() {
        let body = "## Phase 1: Work\n### Step A: Research\nDo research.\n### Step B: Write\n- Context from previous: Step A\nWrite it up.\n";
        let graph = build_ok(body);
        let b = graph.step(&StepId::from("B")).unwrap();
        assert_eq!(b.title, "Write");
        assert_eq!(ids(&b.depends_on), vec!["A"]);
    }

    #[test]
    fn test_unlabelled_steps_get_positional_ids() {
        let body = "## Phase 2: Review\n### Security\nCheck auth.\n### Performance\nCheck latency.\n";
        let graph = build_ok(body);
        let labels: Vec<&str> = graph.steps().map(|s| s.id.as_str()).collect();
        assert_eq!(labels, vec!["2.1", "2.2"]);
    }

    #[test]
    fn test_forward_step_reference_rejected() {
        let body = "## Phase 1: Work\n### 1. First\n- Context: step 2\n### 2. Second\nDo it.\n";
        let result = build_phase_graph(body, &Metadata::default());
        assert!(matches!(result, Err(AppError::ForwardReference { .. })));
    }

    #[test]
    fn test_self_reference_rejected() {
        let body = "## Phase 1: Work\n### 1. First\n- Context: step 1\n";
        let result = build_phase_graph(body, &Metadata::default());
        assert!(matches!(result, Err(AppError::ForwardReference { .. })));
    }

    #[test]
    fn test_forward_title_reference_rejected() {
        let body = "## Phase 1: Work\n### 1. First\n- Context: Second\n### 2. Second\nDo it.\n";
        let result = build_phase_graph(body, &Metadata::default());
        assert!(matches!(result, Err(AppError::ForwardReference { .. })));
    }

    #[test]
    fn test_forward_phase_reference_rejected() {
        let body = "## Phase 1: A\n### 1. First\n- Context from phase 2: results\n## Phase 2: B\n### 2. Second\nDo it.\n";
        let result = build_phase_graph(body, &Metadata::default());
        assert!(matches!(result, Err(AppError::ForwardReference { .. })));
    }

    #[test]
    fn test_dangling_step_reference_rejected() {
        let body = "## Phase 1: Work\n### 1. First\nDo it.\n### 2. Second\n- Context: step 7\n";
        match build_phase_graph(body, &Metadata::default()) {
            Err(AppError::DanglingContextReference { step, reference }) => {
                assert_eq!(step, "2");
                assert_eq!(reference, "step 7");
            }
            other => panic!("expected DanglingContextReference, got {:?}", other),
        }
    }

    #[test]
    fn test_dangling_previous_phase_rejected() {
        let body = "## Phase 1: Work\n### 1. First\n- Context: previous phase\n";
        let result = build_phase_graph(body, &Metadata::default());
        assert!(matches!(
            result,
            Err(AppError::DanglingContextReference { .. })
        ));
    }

    #[test]
    fn test_free_text_context_is_not_an_edge() {
        let body = "## Phase 1: Work\n### 1. First\nDo it.\n### 2. Second\n- Context: API contracts and error codes\n";
        let graph = build_ok(body);
        assert!(graph.step(&StepId::from("2")).unwrap().depends_on.is_empty());
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let body = "## Phase 1: Work\n### 1. First\nA\n### 1. Again\nB\n";
        let result = build_phase_graph(body, &Metadata::default());
        assert!(matches!(result, Err(AppError::DuplicateStep { .. })));
    }

    #[test]
    fn test_phases_out_of_order_rejected() {
        let body = "## Phase 2: B\nb\n## Phase 1: A\na\n";
        assert!(build_phase_graph(body, &Metadata::default()).is_err());
    }

    #[test]
    fn test_headings_in_code_fences_are_ignored() {
        let body = "## Phase 1: Work\n### 1. Script\n```markdown\n## Phase 9: Fake\n### 9. Fake\n```\n";
        let graph = build_ok(body);
        assert_eq!(graph.len(), 1);
        assert!(graph.steps().next().unwrap().instruction.contains("Phase 9"));
    }

    #[test]
    fn test_default_role_from_metadata() {
        let metadata = Metadata {
            name: Some("code-reviewer".to_string()),
            ..Default::default()
        };
        let graph = build_phase_graph("Review $ARGUMENTS", &metadata).unwrap();
        assert_eq!(graph.steps().next().unwrap().role, "code-reviewer");
    }

    #[test]
    fn test_only_if_condition() {
        let body = "## Phase 1: Ship\n### 1. Draft PR\n- Only if: `--draft-pr`\n- Prompt: Open a draft PR\n";
        let graph = build_ok(body);
        assert_eq!(
            graph.steps().next().unwrap().condition,
            Some(StepCondition::OnlyIf("draft-pr".to_string()))
        );
    }

    #[test]
    fn test_multiline_prompt() {
        let body = "## Phase 1: Work\n### 1. Plan\n- Prompt: Plan the work\n  covering risks\n- Expected output: plan\n";
        let graph = build_ok(body);
        assert_eq!(
            graph.steps().next().unwrap().instruction,
            "Plan the work\ncovering risks"
        );
    }

    #[test]
    fn test_scan_declared_flags() {
        let body = "## Phase 1: Work\n- `--not-a-flag` here\n## Execution Parameters\n- `--skip-tests`: skip\n- **--draft-pr**: draft\n## Notes\n- `--ignored`\n";
        let flags = scan_declared_flags(body);
        assert_eq!(
            flags.into_iter().collect::<Vec<_>>(),
            vec!["draft-pr".to_string(), "skip-tests".to_string()]
        );
    }
}
