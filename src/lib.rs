// Core modules
pub mod config;
pub mod core;
mod error;
pub mod orchestrator;
pub mod process;
pub mod step;

// Demo wiring for pipeline files
pub mod pipeline;

// Re-export key types
pub use config::{PipelineFile, StepSpec, load_pipeline, resolve_pipeline_path};
pub use crate::core::{RunContext, RunFailure, RunState, Stage};
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{
    Callbacks, Orchestrator, OrchestratorConfig, RepeatOverrides, RepeatSteps, RunOutcome,
    RunResult,
};
pub use pipeline::{SimulatedContainer, SimulatedProcess, build_config};
pub use process::Process;
pub use step::{Step, StepAction, StepId, StepKind, StepPriority};
