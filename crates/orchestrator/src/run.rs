//! Run results: per-step outcomes, the shared run context and the execution log.

use chrono::{DateTime, Utc};
use conductor_agent::AgentOutput;
use conductor_core::{AppError, AppResult};
use conductor_prompt::StepId;
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::BTreeMap;

/// Terminal state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    /// Not dispatched because an upstream step failed or the run halted
    Skipped,
    /// Not dispatched because of a flag condition
    Pruned,
    /// Not dispatched because the run was cancelled
    Cancelled,
}

impl StepStatus {
    /// Dependents may still run after this status.
    pub fn unblocks_dependents(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Pruned)
    }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    PartiallyFailed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_success(self) -> bool {
        self == RunStatus::Succeeded
    }
}

/// Outputs of completed steps, keyed by step id. Each step is written once.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RunContext(BTreeMap<StepId, AgentOutput>);

impl RunContext {
    pub fn insert(&mut self, step: StepId, output: AgentOutput) -> AppResult<()> {
        if self.0.contains_key(&step) {
            return Err(AppError::Orchestration(format!(
                "Output for step {} recorded twice",
                step
            )));
        }
        self.0.insert(step, output);
        Ok(())
    }

    pub fn get(&self, step: &StepId) -> Option<&AgentOutput> {
        self.0.get(step)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepId, &AgentOutput)> {
        self.0.iter()
    }
}

/// What happened to a step at one point in the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    /// Sent to the agent with the listed upstream outputs as context
    Dispatched { role: String, inputs: Vec<StepId> },
    Completed { duration_ms: u64 },
    Failed {
        error: String,
        inputs: Vec<StepId>,
        duration_ms: u64,
    },
    Skipped { reason: String },
    Pruned { reason: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub sequence: usize,
    pub step: StepId,
    #[serde(flatten)]
    pub event: LogEvent,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of dispatch decisions, in the order they were made.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ExecutionLog(Vec<LogEntry>);

impl ExecutionLog {
    pub fn push(&mut self, step: StepId, event: LogEvent) {
        let sequence = self.0.len();
        self.0.push(LogEntry {
            sequence,
            step,
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.0
    }

    /// Entries for one step.
    pub fn for_step<'a>(&'a self, step: &'a StepId) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.0.iter().filter(move |e| &e.step == step)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Final state of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub id: StepId,
    pub title: String,
    pub phase: u32,
    pub role: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pruned: usize,
    pub cancelled: usize,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub document: String,
    pub status: RunStatus,
    pub counts: StatusCounts,
    /// Outcomes in document order
    pub steps: Vec<StepOutcome>,
    pub context: RunContext,
    pub log: ExecutionLog,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

const REPORT_TEMPLATE: &str = "\
Run of {{document}}: {{status}}
  completed: {{counts.completed}}, failed: {{counts.failed}}, skipped: {{counts.skipped}}, pruned: {{counts.pruned}}, cancelled: {{counts.cancelled}}

{{#each steps}}
[{{status}}] {{id}} {{title}} ({{role}}){{#if duration_ms}} {{duration_ms}}ms{{/if}}
{{#if error}}    error: {{error}}
{{/if}}{{#if reason}}    reason: {{reason}}
{{/if}}{{/each}}
{{#each outputs}}
## {{@key}}

{{this}}
{{/each}}";

impl RunReport {
    pub(crate) fn new(
        document: String,
        steps: Vec<StepOutcome>,
        context: RunContext,
        log: ExecutionLog,
        started_at: DateTime<Utc>,
    ) -> Self {
        let counts = count(&steps);
        let status = run_status(&counts);
        Self {
            document,
            status,
            counts,
            steps,
            context,
            log,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn step(&self, id: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.id.as_str() == id)
    }

    pub fn status_of(&self, id: &str) -> Option<StepStatus> {
        self.step(id).map(|s| s.status)
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary, followed by each completed step's output.
    pub fn render_text(&self) -> AppResult<String> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string("report", REPORT_TEMPLATE)
            .map_err(|e| AppError::Other(format!("Failed to register report template: {}", e)))?;

        let outputs: BTreeMap<&str, &str> = self
            .context
            .iter()
            .map(|(id, output)| (id.as_str(), output.content.trim()))
            .collect();

        let data = serde_json::json!({
            "document": self.document,
            "status": self.status,
            "counts": self.counts,
            "steps": self.steps,
            "outputs": outputs,
        });

        handlebars
            .render("report", &data)
            .map_err(|e| AppError::Other(format!("Failed to render report: {}", e)))
    }
}

fn count(steps: &[StepOutcome]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for step in steps {
        match step.status {
            StepStatus::Completed => counts.completed += 1,
            StepStatus::Failed => counts.failed += 1,
            StepStatus::Skipped => counts.skipped += 1,
            StepStatus::Pruned => counts.pruned += 1,
            StepStatus::Cancelled => counts.cancelled += 1,
        }
    }
    counts
}

fn run_status(counts: &StatusCounts) -> RunStatus {
    if counts.cancelled > 0 {
        RunStatus::Cancelled
    } else if counts.failed == 0 && counts.skipped == 0 {
        RunStatus::Succeeded
    } else if counts.completed > 0 {
        RunStatus::PartiallyFailed
    } else {
        RunStatus::Failed
    }
}
