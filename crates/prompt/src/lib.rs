//! Document handling for Conductor.
//!
//! This crate turns a markdown instruction document into something runnable:
//! - Front-matter metadata parsing
//! - Argument blob scanning and placeholder resolution
//! - Phase graph construction from phase/step headings and context annotations
//! - Document discovery in the workspace

pub mod args;
pub mod front_matter;
pub mod graph;
pub mod loader;
mod markdown;
pub mod placeholder;
pub mod render;
pub mod types;

// Re-export main types
pub use args::{Arguments, FlagSet};
pub use front_matter::parse_front_matter;
pub use graph::build_phase_graph;
pub use loader::{find_document, list_documents, load_document, DocumentSummary};
pub use render::{render_steps, RenderedStep};
pub use types::{
    Document, Metadata, Phase, PhaseGraph, PlaceholderToken, Step, StepCondition, StepId,
};
