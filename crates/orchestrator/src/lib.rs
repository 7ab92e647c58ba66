//! Orchestration for Conductor.
//!
//! Takes a planned document and drives its steps through an agent backend:
//! phase by phase, independent steps concurrently, failures propagated to
//! dependents, with optional strict mode, timeouts and cancellation.
//!
//! # Example
//! ```no_run
//! use conductor_agent::DryRunInvoker;
//! use conductor_orchestrator::{Orchestrator, RunOptions, RunPlan};
//! use conductor_prompt::{Arguments, Document};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let document = Document::parse("Review $ARGUMENTS")?;
//! let arguments = Arguments::parse("src/lib.rs", &document.declared_flags);
//! let plan = RunPlan::build(&document, &arguments, &HashMap::new())?;
//!
//! let orchestrator = Orchestrator::new(Arc::new(DryRunInvoker::new()), RunOptions::default());
//! let report = orchestrator.run(&plan).await;
//! println!("{}", report.render_text()?);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod driver;
pub mod plan;
pub mod run;

#[cfg(test)]
mod testing;

// Re-export main types
pub use cancel::CancellationHandle;
pub use driver::{Orchestrator, RunOptions};
pub use plan::RunPlan;
pub use run::{
    ExecutionLog, LogEntry, LogEvent, RunContext, RunReport, RunStatus, StatusCounts,
    StepOutcome, StepStatus,
};
