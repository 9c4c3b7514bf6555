//! Output of a successful run and the bound repeat operation.

use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::context::RunFailure;
use crate::error::OrchestratorResult;
use crate::orchestrator::Orchestrator;
use crate::orchestrator::config::{OrchestratorConfig, RepeatOverrides, RepeatSteps};
use crate::process::Process;
use crate::step::Step;

/// The finalized container of a successful run.
///
/// Also remembers the configuration that produced it and the repeatable steps
/// of each stage, so the volatile part of the pipeline can be run again with
/// [`RunResult::repeat`].
pub struct RunResult<P: Process> {
    run_id: Uuid,
    container: Arc<P::Container>,
    repeat_steps: RepeatSteps<P>,
    origin: Arc<OrchestratorConfig<P>>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl<P: Process> Clone for RunResult<P> {
    fn clone(&self) -> Self {
        Self {
            run_id: self.run_id,
            container: self.container.clone(),
            repeat_steps: self.repeat_steps.clone(),
            origin: self.origin.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

impl<P: Process> RunResult<P> {
    pub(crate) fn new(
        run_id: Uuid,
        container: P::Container,
        repeat_steps: RepeatSteps<P>,
        origin: Arc<OrchestratorConfig<P>>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            container: Arc::new(container),
            repeat_steps,
            origin,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn container(&self) -> &P::Container {
        &self.container
    }

    /// Shared handle to the container, for consumers that outlive the result.
    pub fn shared_container(&self) -> Arc<P::Container> {
        self.container.clone()
    }

    pub fn repeat_pre_steps(&self) -> &[Step<P>] {
        &self.repeat_steps.pre
    }

    pub fn repeat_concurrent_steps(&self) -> &[Step<P>] {
        &self.repeat_steps.concurrent
    }

    pub fn repeat_post_steps(&self) -> &[Step<P>] {
        &self.repeat_steps.post
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Run a new orchestrator derived from the one that produced this result.
    ///
    /// Unset overrides fall back to the original configuration, except step
    /// lists, which fall back to this run's repeatable subsets. Fails with
    /// `EmptyPipeline` when the merged configuration has no steps.
    ///
    /// The returned future is `'static`, so it can be spawned from inside an
    /// `on_success` callback.
    pub fn repeat(
        &self,
        overrides: RepeatOverrides<P>,
    ) -> impl Future<Output = OrchestratorResult<RunOutcome<P>>> + Send + 'static {
        let config = overrides.apply(&self.origin, &self.repeat_steps);
        let parent = self.run_id;

        async move {
            let orchestrator = Orchestrator::new(config)?;
            tracing::info!(parent_run_id = %parent, "repeating bootstrap run");
            Ok(orchestrator.run().await)
        }
    }
}

impl<P: Process> fmt::Debug for RunResult<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunResult")
            .field("run_id", &self.run_id)
            .field("repeat_pre", &self.repeat_steps.pre.len())
            .field("repeat_concurrent", &self.repeat_steps.concurrent.len())
            .field("repeat_post", &self.repeat_steps.post.len())
            .field("started_at", &self.started_at)
            .field("finished_at", &self.finished_at)
            .finish()
    }
}

/// What a run ended with. Mirrors the `on_success` / `on_error` callbacks.
pub enum RunOutcome<P: Process> {
    Succeeded(RunResult<P>),
    Failed(RunFailure<P>),
}

impl<P: Process> RunOutcome<P> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn result(&self) -> Option<&RunResult<P>> {
        match self {
            Self::Succeeded(result) => Some(result),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RunFailure<P>> {
        match self {
            Self::Succeeded(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<RunResult<P>, RunFailure<P>> {
        match self {
            Self::Succeeded(result) => Ok(result),
            Self::Failed(failure) => Err(failure),
        }
    }
}

impl<P: Process> fmt::Debug for RunOutcome<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded(result) => f.debug_tuple("Succeeded").field(result).finish(),
            Self::Failed(failure) => f.debug_tuple("Failed").field(failure).finish(),
        }
    }
}
