//! Document types for Conductor.
//!
//! This module defines the domain entities parsed out of a workflow document:
//! metadata, placeholder tokens, phases, steps and the phase graph.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;

/// A loaded instruction document. Immutable once parsed.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// File the document was read from, if any
    pub source: Option<PathBuf>,

    /// Front-matter metadata (empty when the document has none)
    pub metadata: Metadata,

    /// Document text after the front-matter block
    pub body: String,

    /// Flags this document recognizes (without the leading `--`)
    pub declared_flags: BTreeSet<String>,
}

impl Document {
    /// Display name: front-matter `name`, else the file stem, else "document".
    pub fn display_name(&self) -> String {
        if let Some(ref name) = self.metadata.name {
            return name.clone();
        }
        self.source
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }
}

/// Front-matter metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Target model hint (e.g., "opus", "sonnet")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Allowed tool-access list
    #[serde(
        default,
        alias = "tool_access",
        alias = "allowed-tools",
        deserialize_with = "list_or_csv",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tools: Vec<String>,

    #[serde(default, deserialize_with = "scalar_string", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, deserialize_with = "list_or_csv", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Declared flag names, with or without the leading `--`
    #[serde(default, deserialize_with = "list_or_csv", skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,

    /// Document-level placeholder defaults
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, String>,

    /// Agent role for steps that do not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Agent role for the terminal validation step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,

    /// Any other keys, preserved as-is
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Metadata {
    /// True when no key was present.
    pub fn is_empty(&self) -> bool {
        *self == Metadata::default()
    }
}

fn list_or_csv<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<serde_yaml::Value>),
        Csv(String),
        Null(()),
    }

    Ok(match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(items) => items.iter().filter_map(value_to_string).collect(),
        ListOrCsv::Csv(s) => s
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        ListOrCsv::Null(()) => Vec::new(),
    })
}

fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

fn value_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A named substitution site in document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceholderToken {
    /// Token name without `$` or braces
    pub name: String,

    /// Inline default (`${NAME:-default}`)
    pub default: Option<String>,

    /// Byte offsets of each occurrence
    pub positions: Vec<usize>,
}

/// Identifier of a step, unique within a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Flag-driven condition attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "flag", rename_all = "snake_case")]
pub enum StepCondition {
    /// Prune the step when the flag is set
    SkipIf(String),
    /// Prune the step unless the flag is set
    OnlyIf(String),
}

/// A single delegated unit of work.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub id: StepId,

    /// Position in document order, starting at 0
    pub ordinal: usize,

    /// Ordinal of the owning phase
    pub phase: u32,

    pub title: String,

    /// Target agent role (e.g., "code-reviewer")
    pub role: String,

    /// Instruction text, placeholders unresolved
    pub instruction: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,

    /// Raw context annotation the edges were inferred from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_annotation: Option<String>,

    /// Upstream steps, in document order
    pub depends_on: Vec<StepId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,
}

/// An ordered stage of the workflow.
#[derive(Debug, Clone, Serialize)]
pub struct Phase {
    pub ordinal: u32,
    pub title: String,
    pub steps: Vec<Step>,
}

/// Phases with their steps and dependency edges. Acyclic by construction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseGraph {
    pub phases: Vec<Phase>,
}

impl PhaseGraph {
    /// All steps in document order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.phases.iter().flat_map(|p| p.steps.iter())
    }

    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps().find(|s| &s.id == id)
    }

    pub fn len(&self) -> usize {
        self.phases.iter().map(|p| p.steps.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Steps without dependencies.
    pub fn roots(&self) -> Vec<&Step> {
        self.steps().filter(|s| s.depends_on.is_empty()).collect()
    }

    /// Every step that depends on `id`, directly or transitively.
    pub fn dependents_of(&self, id: &StepId) -> BTreeSet<StepId> {
        let mut children: HashMap<&StepId, Vec<&StepId>> = HashMap::new();
        for step in self.steps() {
            for dep in &step.depends_on {
                children.entry(dep).or_default().push(&step.id);
            }
        }

        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for child in children.get(current).into_iter().flatten() {
                if found.insert((*child).clone()) {
                    queue.push_back(*child);
                }
            }
        }
        found
    }

    /// A dispatch order in which every step follows its dependencies (Kahn's algorithm,
    /// ties broken by document order).
    pub fn topological_order(&self) -> Vec<StepId> {
        let steps: Vec<&Step> = self.steps().collect();
        let mut remaining: HashMap<&StepId, usize> = steps
            .iter()
            .map(|s| (&s.id, s.depends_on.len()))
            .collect();
        let mut done: HashSet<&StepId> = HashSet::new();
        let mut order = Vec::with_capacity(steps.len());

        while order.len() < steps.len() {
            let next = steps
                .iter()
                .find(|s| !done.contains(&s.id) && remaining.get(&s.id) == Some(&0));
            let Some(next) = next else { break };

            done.insert(&next.id);
            order.push(next.id.clone());
            for step in &steps {
                if step.depends_on.contains(&next.id) {
                    if let Some(count) = remaining.get_mut(&step.id) {
                        *count -= 1;
                    }
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, phase: u32, ordinal: usize, deps: &[&str]) -> Step {
        Step {
            id: StepId::from(id),
            ordinal,
            phase,
            title: format!("Step {}", id),
            role: "general-purpose".to_string(),
            instruction: String::new(),
            expected_output: None,
            context_annotation: None,
            depends_on: deps.iter().map(|d| StepId::from(*d)).collect(),
            condition: None,
        }
    }

    fn sample_graph() -> PhaseGraph {
        PhaseGraph {
            phases: vec![
                Phase {
                    ordinal: 1,
                    title: "Analysis".to_string(),
                    steps: vec![step("1", 1, 0, &[]), step("2", 1, 1, &[])],
                },
                Phase {
                    ordinal: 2,
                    title: "Build".to_string(),
                    steps: vec![step("3", 2, 2, &["1"]), step("4", 2, 3, &["3", "2"])],
                },
            ],
        }
    }

    #[test]
    fn test_metadata_deserialization() {
        let yaml = r#"
name: full-stack-feature
description: Build a feature end to end
model: opus
tool_access: Read, Write, Bash
version: 1.2
tags: [workflow, backend]
flags: ["--skip-tests", "draft-pr"]
defaults:
  TARGET: "."
owner: platform-team
"#;
        let metadata: Metadata = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(metadata.name.as_deref(), Some("full-stack-feature"));
        assert_eq!(metadata.tools, vec!["Read", "Write", "Bash"]);
        assert_eq!(metadata.version.as_deref(), Some("1.2"));
        assert_eq!(metadata.tags, vec!["workflow", "backend"]);
        assert_eq!(metadata.flags.len(), 2);
        assert_eq!(metadata.defaults.get("TARGET").map(String::as_str), Some("."));
        assert!(metadata.extra.contains_key("owner"));
        assert!(!metadata.is_empty());
    }

    #[test]
    fn test_empty_metadata() {
        assert!(Metadata::default().is_empty());
    }

    #[test]
    fn test_roots_and_dependents() {
        let graph = sample_graph();
        let roots: Vec<&str> = graph.roots().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(roots, vec!["1", "2"]);

        let dependents = graph.dependents_of(&StepId::from("1"));
        assert_eq!(
            dependents.into_iter().collect::<Vec<_>>(),
            vec![StepId::from("3"), StepId::from("4")]
        );
        assert!(graph.dependents_of(&StepId::from("4")).is_empty());
    }

    #[test]
    fn test_topological_order_respects_dependencies() {
        let graph = sample_graph();
        let order = graph.topological_order();
        assert_eq!(order.len(), graph.len());

        let pos = |id: &str| order.iter().position(|s| s.as_str() == id).unwrap();
        for step in graph.steps() {
            for dep in &step.depends_on {
                assert!(pos(dep.as_str()) < pos(step.id.as_str()));
            }
        }
    }

    #[test]
    fn test_display_name_falls_back_to_file_stem() {
        let doc = Document {
            source: Some(PathBuf::from("/tmp/feature-dev.md")),
            metadata: Metadata::default(),
            body: String::new(),
            declared_flags: BTreeSet::new(),
        };
        assert_eq!(doc.display_name(), "feature-dev");
    }
}
