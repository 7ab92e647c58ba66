//! The orchestration driver.
//!
//! Phases run strictly in order. Within a phase, every step whose upstream
//! steps have all completed is dispatched at once (up to `max_concurrency`),
//! and steps unblocked by a completion are dispatched as soon as it lands.
//! The next phase starts only when every step of the current one is settled.

use crate::cancel::CancellationHandle;
use crate::plan::RunPlan;
use crate::run::{ExecutionLog, LogEvent, RunContext, RunReport, StepOutcome, StepStatus};
use chrono::Utc;
use conductor_agent::{AgentInvoker, AgentOutput, AgentRequest};
use conductor_core::config::OrchestrationConfig;
use conductor_core::{AppError, AppResult};
use conductor_prompt::{Phase, Step, StepId};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Scheduling policy for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stop dispatching after the first failure
    pub strict: bool,

    /// Time budget per dispatch; `None` waits indefinitely
    pub step_timeout: Option<Duration>,

    /// Maximum concurrent dispatches within a phase
    pub max_concurrency: usize,

    pub cancel: CancellationHandle,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            strict: false,
            step_timeout: None,
            max_concurrency: 4,
            cancel: CancellationHandle::new(),
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &OrchestrationConfig) -> Self {
        Self {
            strict: config.strict,
            step_timeout: config.step_timeout_secs.map(Duration::from_secs),
            max_concurrency: config.max_concurrency.max(1),
            cancel: CancellationHandle::new(),
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationHandle) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Runs a [`RunPlan`] against an agent backend.
pub struct Orchestrator {
    invoker: Arc<dyn AgentInvoker>,
    options: RunOptions,
}

/// Result of one dispatch.
struct Dispatch {
    id: StepId,
    inputs: Vec<StepId>,
    result: AppResult<AgentOutput>,
    elapsed: Duration,
}

enum Decision {
    Wait,
    Dispatch,
    Settle(StepStatus, String),
}

/// Mutable bookkeeping for a run in progress.
struct RunState<'p> {
    plan: &'p RunPlan,
    statuses: HashMap<StepId, StepStatus>,
    outcomes: HashMap<StepId, StepOutcome>,
    context: RunContext,
    log: ExecutionLog,
    /// Set in strict mode by the first failed step
    halted_by: Option<StepId>,
}

impl Orchestrator {
    pub fn new(invoker: Arc<dyn AgentInvoker>, options: RunOptions) -> Self {
        Self { invoker, options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every step of the plan. Step failures are reported, not returned.
    pub async fn run(&self, plan: &RunPlan) -> RunReport {
        let span = tracing::info_span!("run", document = %plan.document);
        self.execute(plan).instrument(span).await
    }

    async fn execute(&self, plan: &RunPlan) -> RunReport {
        let started_at = Utc::now();
        let mut state = RunState::new(plan);

        tracing::info!(
            "Starting run: {} step(s) in {} phase(s) via {}",
            plan.graph.len(),
            plan.graph.phases.len(),
            self.invoker.name()
        );

        for phase in &plan.graph.phases {
            tracing::info!("Phase {}: {}", phase.ordinal, phase.title);
            self.run_phase(phase, &mut state).await;
        }

        let RunState {
            mut outcomes,
            context,
            log,
            ..
        } = state;
        let steps = plan
            .graph
            .steps()
            .filter_map(|s| outcomes.remove(&s.id))
            .collect();

        let report = RunReport::new(plan.document.clone(), steps, context, log, started_at);
        tracing::info!(
            "Run finished: {:?} ({} completed, {} failed, {} skipped, {} pruned, {} cancelled)",
            report.status,
            report.counts.completed,
            report.counts.failed,
            report.counts.skipped,
            report.counts.pruned,
            report.counts.cancelled
        );
        report
    }

    async fn run_phase(&self, phase: &Phase, state: &mut RunState<'_>) {
        let mut waiting: Vec<&Step> = phase.steps.iter().collect();
        let mut in_flight = FuturesUnordered::new();

        loop {
            let cancelled = self.options.cancel.is_cancelled();

            // Steps are in document order and only depend on earlier ones, so
            // one pass settles every chain of skips and prunes.
            let mut index = 0;
            while index < waiting.len() {
                let step = waiting[index];
                match state.decide(step, cancelled) {
                    Decision::Wait => index += 1,
                    Decision::Dispatch if in_flight.len() >= self.options.max_concurrency => {
                        index += 1
                    }
                    Decision::Dispatch => {
                        waiting.remove(index);
                        match state.begin(step) {
                            Ok((request, inputs)) => {
                                let span = tracing::info_span!(
                                    "step",
                                    id = %step.id,
                                    role = %request.role
                                );
                                in_flight.push(
                                    invoke_step(
                                        self.invoker.clone(),
                                        step.id.clone(),
                                        request,
                                        inputs,
                                        self.options.step_timeout,
                                    )
                                    .instrument(span),
                                );
                            }
                            Err(e) => state.record(
                                Dispatch {
                                    id: step.id.clone(),
                                    inputs: Vec::new(),
                                    result: Err(e),
                                    elapsed: Duration::ZERO,
                                },
                                self.options.strict,
                            ),
                        }
                    }
                    Decision::Settle(status, reason) => {
                        waiting.remove(index);
                        state.settle(step, status, reason);
                    }
                }
            }

            if in_flight.is_empty() {
                for step in waiting.drain(..) {
                    state.settle(
                        step,
                        StepStatus::Skipped,
                        "upstream step never settled".to_string(),
                    );
                }
                break;
            }

            // In-flight dispatches are always awaited; cancellation only wakes
            // the loop so waiting steps are settled promptly.
            let finished = if cancelled {
                in_flight.next().await
            } else {
                tokio::select! {
                    finished = in_flight.next() => finished,
                    _ = self.options.cancel.cancelled() => continue,
                }
            };

            if let Some(dispatch) = finished {
                state.record(dispatch, self.options.strict);
            }
        }
    }
}

async fn invoke_step(
    invoker: Arc<dyn AgentInvoker>,
    id: StepId,
    request: AgentRequest,
    inputs: Vec<StepId>,
    timeout: Option<Duration>,
) -> Dispatch {
    let started = Instant::now();
    let call = invoker.invoke(&request);

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::DispatchTimeout {
                step: id.to_string(),
                timeout_secs: limit.as_secs(),
            }),
        },
        None => call.await,
    };

    Dispatch {
        id,
        inputs,
        result,
        elapsed: started.elapsed(),
    }
}

impl<'p> RunState<'p> {
    fn new(plan: &'p RunPlan) -> Self {
        Self {
            plan,
            statuses: HashMap::new(),
            outcomes: HashMap::new(),
            context: RunContext::default(),
            log: ExecutionLog::default(),
            halted_by: None,
        }
    }

    fn decide(&self, step: &Step, cancelled: bool) -> Decision {
        if let Some(reason) = self.plan.pruned.get(&step.id) {
            return Decision::Settle(StepStatus::Pruned, reason.clone());
        }
        if cancelled {
            return Decision::Settle(StepStatus::Cancelled, "run cancelled".to_string());
        }
        if let Some(ref failed) = self.halted_by {
            return Decision::Settle(
                StepStatus::Skipped,
                format!("run halted after step {} failed", failed),
            );
        }

        let mut pending = false;
        for dep in &step.depends_on {
            match self.statuses.get(dep) {
                None => pending = true,
                Some(status) if status.unblocks_dependents() => {}
                Some(status) => {
                    let word = match status {
                        StepStatus::Failed => "failed",
                        StepStatus::Cancelled => "was cancelled",
                        _ => "was skipped",
                    };
                    return Decision::Settle(
                        StepStatus::Skipped,
                        format!("upstream step {} {}", dep, word),
                    );
                }
            }
        }

        if pending {
            Decision::Wait
        } else {
            Decision::Dispatch
        }
    }

    /// Build the request for a step and log its dispatch.
    fn begin(&mut self, step: &Step) -> AppResult<(AgentRequest, Vec<StepId>)> {
        let rendered = self.plan.rendered(&step.id).ok_or_else(|| {
            AppError::Orchestration(format!("Step {} has no rendered instruction", step.id))
        })?;

        let mut request = AgentRequest::new(rendered.role.clone(), rendered.instruction.clone())
            .with_tools(self.plan.tools.clone());
        if let Some(ref model) = self.plan.model {
            request = request.with_model(model.clone());
        }
        if let Some(ref expected) = rendered.expected_output {
            request = request.with_expected_output(expected.clone());
        }

        // Pruned upstream steps have no output and contribute nothing.
        let mut inputs = Vec::new();
        for dep in &step.depends_on {
            if let Some(output) = self.context.get(dep) {
                request = request.with_context(dep.as_str(), output.content.clone());
                inputs.push(dep.clone());
            }
        }

        tracing::info!("Dispatching step {} to '{}'", step.id, request.role);
        self.log.push(
            step.id.clone(),
            LogEvent::Dispatched {
                role: request.role.clone(),
                inputs: inputs.clone(),
            },
        );

        Ok((request, inputs))
    }

    /// Record a step that was never dispatched.
    fn settle(&mut self, step: &Step, status: StepStatus, reason: String) {
        tracing::info!("Step {} {:?}: {}", step.id, status, reason);

        let event = match status {
            StepStatus::Pruned => LogEvent::Pruned {
                reason: reason.clone(),
            },
            StepStatus::Cancelled => LogEvent::Cancelled,
            _ => LogEvent::Skipped {
                reason: reason.clone(),
            },
        };
        self.log.push(step.id.clone(), event);
        self.statuses.insert(step.id.clone(), status);
        self.outcomes.insert(
            step.id.clone(),
            self.outcome(&step.id, status, None, Some(reason), None),
        );
    }

    /// Record the result of a dispatch.
    fn record(&mut self, dispatch: Dispatch, strict: bool) {
        let Dispatch {
            id,
            inputs,
            result,
            elapsed,
        } = dispatch;
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let error = match result {
            Ok(output) => self.context.insert(id.clone(), output).err(),
            Err(e) => Some(e),
        };

        let status = match error {
            None => {
                tracing::info!("Step {} completed in {}ms", id, duration_ms);
                self.log
                    .push(id.clone(), LogEvent::Completed { duration_ms });
                StepStatus::Completed
            }
            Some(ref e) => {
                tracing::warn!("Step {} failed: {}", id, e);
                let blocked = self.plan.graph.dependents_of(&id);
                if !blocked.is_empty() {
                    let names: Vec<&str> = blocked.iter().map(StepId::as_str).collect();
                    tracing::info!("Steps blocked by {}: {}", id, names.join(", "));
                }
                self.log.push(
                    id.clone(),
                    LogEvent::Failed {
                        error: e.to_string(),
                        inputs,
                        duration_ms,
                    },
                );
                if strict && self.halted_by.is_none() {
                    tracing::warn!("Strict mode: no further steps will be dispatched");
                    self.halted_by = Some(id.clone());
                }
                StepStatus::Failed
            }
        };

        self.statuses.insert(id.clone(), status);
        let outcome = self.outcome(
            &id,
            status,
            error.map(|e| e.to_string()),
            None,
            Some(duration_ms),
        );
        self.outcomes.insert(id, outcome);
    }

    fn outcome(
        &self,
        id: &StepId,
        status: StepStatus,
        error: Option<String>,
        reason: Option<String>,
        duration_ms: Option<u64>,
    ) -> StepOutcome {
        let step = self.plan.graph.step(id);
        let role = self
            .plan
            .rendered(id)
            .map(|r| r.role.clone())
            .or_else(|| step.map(|s| s.role.clone()))
            .unwrap_or_default();

        StepOutcome {
            id: id.clone(),
            title: step.map(|s| s.title.clone()).unwrap_or_default(),
            phase: step.map(|s| s.phase).unwrap_or_default(),
            role,
            status,
            error,
            reason,
            duration_ms,
        }
    }
}
