//! The staged run engine.
//!
//! A run walks three stages over one freshly created process:
//! 1. pre-steps, strictly in declaration order,
//! 2. concurrent steps, one tokio task each, joined before moving on,
//! 3. post-steps, strictly in declaration order.
//!
//! The first failure anywhere ends the run. Nothing later is launched, and
//! `on_error` fires exactly once. A run that reaches the end finalizes the
//! process and hands a [`RunResult`] to `on_success`.

use std::any::Any;
use std::cmp::Reverse;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tracing::{Instrument, Span, debug, info};

use crate::core::context::{RunContext, RunFailure};
use crate::core::relay::TelemetryRelay;
use crate::core::state::{RunState, Stage};
use crate::error::OrchestratorResult;
use crate::process::Process;
use crate::step::Step;

mod config;
mod result;


pub use config::{
    Callbacks, OnError, OnStart, OnStepStart, OnStepSuccess, OnSuccess, OrchestratorConfig,
    ProcessFactory, RepeatOverrides, RepeatSteps,
};
pub use result::{RunOutcome, RunResult};

/// Drives a process through the configured stages.
///
/// Cheap to clone; clones share the same immutable configuration. Every call
/// to [`Orchestrator::run`] is an independent run with its own process.
pub struct Orchestrator<P: Process> {
    config: Arc<OrchestratorConfig<P>>,
}

impl<P: Process> Clone for Orchestrator<P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl<P: Process> Orchestrator<P> {
    /// Create an orchestrator. Fails if no stage has any step.
    pub fn new(config: OrchestratorConfig<P>) -> OrchestratorResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig<P> {
        &self.config
    }

    /// Execute the pipeline once.
    ///
    /// Outcomes are delivered through the configured callbacks; the returned
    /// [`RunOutcome`] carries the same information for callers that await it.
    pub async fn run(&self) -> RunOutcome<P> {
        let process = (self.config.process_factory)();
        let ctx = Arc::new(RunContext::new(
            process,
            &self.config.pre_steps,
            &self.config.concurrent_steps,
            &self.config.post_steps,
        ));
        let span = tracing::info_span!("bootstrap_run", run_id = %ctx.run_id());

        self.drive(ctx).instrument(span).await
    }

    async fn drive(&self, ctx: Arc<RunContext<P>>) -> RunOutcome<P> {
        let relay = Arc::new(TelemetryRelay::new(&self.config.callbacks));
        let mut state = RunState::NotStarted;

        info!(
            pre = self.config.pre_steps.len(),
            concurrent = self.config.concurrent_steps.len(),
            post = self.config.post_steps.len(),
            "bootstrap run started"
        );
        advance(&mut state, RunState::RunningPre);
        if let Some(cb) = &self.config.callbacks.on_start {
            cb();
        }

        self.run_ordered(Stage::Pre, &self.config.pre_steps, &ctx, &relay)
            .await;
        if let Some(failure) = ctx.failure() {
            return self.fail(&mut state, failure);
        }

        if !self.config.concurrent_steps.is_empty() {
            advance(&mut state, RunState::RunningConcurrent);
            self.run_concurrent(&ctx, &relay).await;
            if let Some(failure) = ctx.failure() {
                return self.fail(&mut state, failure);
            }
        }

        if !self.config.post_steps.is_empty() {
            advance(&mut state, RunState::RunningPost);
            self.run_ordered(Stage::Post, &self.config.post_steps, &ctx, &relay)
                .await;
            if let Some(failure) = ctx.failure() {
                return self.fail(&mut state, failure);
            }
        }

        self.succeed(&mut state, &ctx)
    }

    /// Run `steps` one after another, stopping at the first failure.
    async fn run_ordered(
        &self,
        stage: Stage,
        steps: &[Step<P>],
        ctx: &RunContext<P>,
        relay: &TelemetryRelay<P>,
    ) {
        for step in steps {
            if ctx.has_error() {
                return;
            }

            relay.step_started(stage, step);
            let started = Instant::now();
            match invoke_guarded(step, ctx.process()).await {
                Ok(()) => {
                    relay.report_success(ctx, stage, step, started);
                }
                Err(err) => {
                    relay.report_error(ctx, stage, step, err);
                    return;
                }
            }
        }
    }

    /// Launch every concurrent step as its own task and wait for all launched
    /// tasks. Steps not yet launched when a failure is captured never start.
    async fn run_concurrent(&self, ctx: &Arc<RunContext<P>>, relay: &Arc<TelemetryRelay<P>>) {
        let mut order: Vec<&Step<P>> = self.config.concurrent_steps.iter().collect();
        order.sort_by_key(|step| Reverse(step.priority()));

        let mut units = JoinSet::new();
        let mut skipped = 0usize;

        for step in order {
            if ctx.has_error() {
                skipped += 1;
                debug!(step = %step.label(), "not launching step, run already failed");
                continue;
            }

            let ctx = ctx.clone();
            let relay = relay.clone();
            let step = step.clone();
            units.spawn(
                async move {
                    relay.step_started(Stage::Concurrent, &step);
                    let started = Instant::now();
                    match invoke_guarded(&step, ctx.process()).await {
                        Ok(()) => {
                            relay.report_success(&ctx, Stage::Concurrent, &step, started);
                        }
                        Err(err) => {
                            relay.report_error(&ctx, Stage::Concurrent, &step, err);
                        }
                    }
                }
                .instrument(Span::current()),
            );

            // Let launched units progress so an early failure cancels later launches.
            tokio::task::yield_now().await;
        }

        if skipped > 0 {
            debug!(skipped, "concurrent steps cancelled before launch");
        }

        while let Some(joined) = units.join_next().await {
            if let Err(err) = joined {
                // Units catch their own panics, so this is only reachable on runtime shutdown.
                tracing::error!(error = %err, "concurrent step task did not complete");
            }
        }
    }

    fn fail(&self, state: &mut RunState, failure: &RunFailure<P>) -> RunOutcome<P> {
        advance(state, RunState::Failed);
        info!(
            step = %failure.step.label(),
            stage = %failure.stage,
            "bootstrap run failed"
        );
        RunOutcome::Failed(failure.clone())
    }

    fn succeed(&self, state: &mut RunState, ctx: &RunContext<P>) -> RunOutcome<P> {
        advance(state, RunState::Succeeded);

        let container = ctx.process().finalize();
        let repeat_steps = RepeatSteps {
            pre: ctx.repeat_pre().to_vec(),
            concurrent: ctx.repeat_concurrent().to_vec(),
            post: ctx.repeat_post().to_vec(),
        };
        let result = RunResult::new(
            ctx.run_id(),
            container,
            repeat_steps,
            self.config.clone(),
            ctx.started_at(),
        );
        let total = TelemetryRelay::<P>::elapsed(ctx.started());

        info!(total_ms = total.as_millis() as u64, "bootstrap run succeeded");
        if let Some(cb) = &self.config.callbacks.on_success {
            cb(result.clone(), total);
        }
        RunOutcome::Succeeded(result)
    }
}

/// Run a step's action, turning a panic into that step's failure.
async fn invoke_guarded<P>(step: &Step<P>, process: &Arc<P>) -> anyhow::Result<()> {
    AssertUnwindSafe(step.action().invoke(process))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(anyhow::anyhow!("step panicked: {}", panic_message(&*panic))))
}

fn advance(state: &mut RunState, next: RunState) {
    debug_assert!(!state.is_terminal(), "run already finished as {}", state);
    debug_assert!(
        state.can_advance_to(next),
        "invalid run transition {} -> {}",
        state,
        next
    );
    debug!(from = %state, to = %next, "run state transition");
    *state = next;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
