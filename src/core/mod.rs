// Run context, lifecycle states and the telemetry relay

pub mod context;
pub(crate) mod relay;
pub mod state;

pub use context::{RunContext, RunFailure};
pub use state::{RunState, Stage};
