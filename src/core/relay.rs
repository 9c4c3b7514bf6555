//! Funnels step notifications from every execution context through one gate.
//!
//! Concurrent steps complete on arbitrary runtime workers. The relay
//! serializes their callback invocations and decides, through the context's
//! write-once slot, which failure becomes the run's reported error.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::core::context::{RunContext, RunFailure};
use crate::core::state::Stage;
use crate::orchestrator::{Callbacks, OnError, OnStepStart, OnStepSuccess};
use crate::process::Process;
use crate::step::Step;

pub struct TelemetryRelay<P: Process> {
    on_step_start: Option<OnStepStart<P>>,
    on_step_success: Option<OnStepSuccess<P>>,
    on_error: Option<OnError<P>>,
    gate: Mutex<()>,
}

impl<P: Process> TelemetryRelay<P> {
    pub fn new(callbacks: &Callbacks<P>) -> Self {
        Self {
            on_step_start: callbacks.on_step_start.clone(),
            on_step_success: callbacks.on_step_success.clone(),
            on_error: callbacks.on_error.clone(),
            gate: Mutex::new(()),
        }
    }

    /// Time elapsed since `reference`.
    pub fn elapsed(reference: Instant) -> Duration {
        Instant::now().saturating_duration_since(reference)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // A panicking callback poisons the gate but leaves nothing inconsistent.
        self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn step_started(&self, stage: Stage, step: &Step<P>) {
        tracing::debug!(step = %step.label(), %stage, "step started");
        if let Some(cb) = &self.on_step_start {
            let _guard = self.lock();
            cb(step);
        }
    }

    /// Forward a step success unless the run already failed.
    ///
    /// Returns false when the outcome was discarded.
    pub fn report_success(
        &self,
        ctx: &RunContext<P>,
        stage: Stage,
        step: &Step<P>,
        step_started: Instant,
    ) -> bool {
        let step_duration = Self::elapsed(step_started);
        let total = Self::elapsed(ctx.started());

        let _guard = self.lock();
        if ctx.has_error() {
            tracing::debug!(
                step = %step.label(),
                %stage,
                "discarding step success after run failure"
            );
            return false;
        }

        tracing::debug!(
            step = %step.label(),
            %stage,
            elapsed_ms = step_duration.as_millis() as u64,
            total_ms = total.as_millis() as u64,
            "step succeeded"
        );
        if let Some(cb) = &self.on_step_success {
            cb(step, step_duration, total);
        }
        true
    }

    /// Capture `error` as the run's failure and notify `on_error`.
    ///
    /// Only the first failure of a run is stored and reported; later ones
    /// return false and are dropped.
    pub fn report_error(
        &self,
        ctx: &RunContext<P>,
        stage: Stage,
        step: &Step<P>,
        error: anyhow::Error,
    ) -> bool {
        let failure = RunFailure {
            error: Arc::new(error),
            step: step.clone(),
            stage,
        };
        if !ctx.capture_error(failure) {
            tracing::debug!(
                step = %step.label(),
                %stage,
                "discarding step failure, run already failed"
            );
            return false;
        }

        let total = Self::elapsed(ctx.started());
        let Some(captured) = ctx.failure() else {
            return false;
        };
        tracing::warn!(
            step = %step.label(),
            %stage,
            error = %captured.error,
            total_ms = total.as_millis() as u64,
            "step failed"
        );

        if let Some(cb) = &self.on_error {
            let _guard = self.lock();
            cb(&*captured.error, &**ctx.process(), step, total);
        }
        true
    }
}
