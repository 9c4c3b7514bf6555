//! Orchestrator configuration and the override set used by repeat runs.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::result::RunResult;
use crate::process::Process;
use crate::step::Step;

pub type ProcessFactory<P> = Arc<dyn Fn() -> P + Send + Sync>;
pub type OnStart = Arc<dyn Fn() + Send + Sync>;
pub type OnStepStart<P> = Arc<dyn Fn(&Step<P>) + Send + Sync>;
/// Receives the step, its own duration and the run duration so far.
pub type OnStepSuccess<P> = Arc<dyn Fn(&Step<P>, Duration, Duration) + Send + Sync>;
pub type OnSuccess<P> = Arc<dyn Fn(RunResult<P>, Duration) + Send + Sync>;
/// Receives the error, the process as of failure, the failing step and the run duration.
pub type OnError<P> = Arc<dyn Fn(&anyhow::Error, &P, &Step<P>, Duration) + Send + Sync>;

/// Lifecycle callbacks. Every field is optional; absent callbacks are skipped.
pub struct Callbacks<P: Process> {
    pub on_start: Option<OnStart>,
    pub on_step_start: Option<OnStepStart<P>>,
    pub on_step_success: Option<OnStepSuccess<P>>,
    pub on_success: Option<OnSuccess<P>>,
    pub on_error: Option<OnError<P>>,
}

impl<P: Process> Default for Callbacks<P> {
    fn default() -> Self {
        Self {
            on_start: None,
            on_step_start: None,
            on_step_success: None,
            on_success: None,
            on_error: None,
        }
    }
}

impl<P: Process> Clone for Callbacks<P> {
    fn clone(&self) -> Self {
        Self {
            on_start: self.on_start.clone(),
            on_step_start: self.on_step_start.clone(),
            on_step_success: self.on_step_success.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<P: Process> Callbacks<P> {
    /// Fill every unset callback from `base`.
    pub fn or(self, base: &Callbacks<P>) -> Callbacks<P> {
        Callbacks {
            on_start: self.on_start.or_else(|| base.on_start.clone()),
            on_step_start: self.on_step_start.or_else(|| base.on_step_start.clone()),
            on_step_success: self.on_step_success.or_else(|| base.on_step_success.clone()),
            on_success: self.on_success.or_else(|| base.on_success.clone()),
            on_error: self.on_error.or_else(|| base.on_error.clone()),
        }
    }
}

/// Builder-style setters shared by [`OrchestratorConfig`] and [`RepeatOverrides`].
macro_rules! callback_setters {
    () => {
        pub fn on_start<F>(mut self, f: F) -> Self
        where
            F: Fn() + Send + Sync + 'static,
        {
            self.callbacks.on_start = Some(Arc::new(f));
            self
        }

        pub fn on_step_start<F>(mut self, f: F) -> Self
        where
            F: Fn(&Step<P>) + Send + Sync + 'static,
        {
            self.callbacks.on_step_start = Some(Arc::new(f));
            self
        }

        pub fn on_step_success<F>(mut self, f: F) -> Self
        where
            F: Fn(&Step<P>, Duration, Duration) + Send + Sync + 'static,
        {
            self.callbacks.on_step_success = Some(Arc::new(f));
            self
        }

        pub fn on_success<F>(mut self, f: F) -> Self
        where
            F: Fn(RunResult<P>, Duration) + Send + Sync + 'static,
        {
            self.callbacks.on_success = Some(Arc::new(f));
            self
        }

        pub fn on_error<F>(mut self, f: F) -> Self
        where
            F: Fn(&anyhow::Error, &P, &Step<P>, Duration) + Send + Sync + 'static,
        {
            self.callbacks.on_error = Some(Arc::new(f));
            self
        }

        pub fn callbacks(mut self, callbacks: Callbacks<P>) -> Self {
            self.callbacks = callbacks;
            self
        }
    };
}

/// Everything an orchestrator needs: how to create a process, the three
/// ordered step lists and the lifecycle callbacks.
pub struct OrchestratorConfig<P: Process> {
    pub(crate) process_factory: ProcessFactory<P>,
    pub(crate) pre_steps: Vec<Step<P>>,
    pub(crate) concurrent_steps: Vec<Step<P>>,
    pub(crate) post_steps: Vec<Step<P>>,
    pub(crate) callbacks: Callbacks<P>,
}

impl<P: Process> Clone for OrchestratorConfig<P> {
    fn clone(&self) -> Self {
        Self {
            process_factory: self.process_factory.clone(),
            pre_steps: self.pre_steps.clone(),
            concurrent_steps: self.concurrent_steps.clone(),
            post_steps: self.post_steps.clone(),
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<P: Process> OrchestratorConfig<P> {
    pub fn new<F>(process_factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self::with_factory(Arc::new(process_factory))
    }

    pub fn with_factory(process_factory: ProcessFactory<P>) -> Self {
        Self {
            process_factory,
            pre_steps: Vec::new(),
            concurrent_steps: Vec::new(),
            post_steps: Vec::new(),
            callbacks: Callbacks::default(),
        }
    }

    pub fn pre_step(mut self, step: Step<P>) -> Self {
        self.pre_steps.push(step);
        self
    }

    pub fn pre_steps(mut self, steps: impl IntoIterator<Item = Step<P>>) -> Self {
        self.pre_steps.extend(steps);
        self
    }

    pub fn concurrent_step(mut self, step: Step<P>) -> Self {
        self.concurrent_steps.push(step);
        self
    }

    pub fn concurrent_steps(mut self, steps: impl IntoIterator<Item = Step<P>>) -> Self {
        self.concurrent_steps.extend(steps);
        self
    }

    pub fn post_step(mut self, step: Step<P>) -> Self {
        self.post_steps.push(step);
        self
    }

    pub fn post_steps(mut self, steps: impl IntoIterator<Item = Step<P>>) -> Self {
        self.post_steps.extend(steps);
        self
    }

    callback_setters!();

    pub fn process_factory(&self) -> &ProcessFactory<P> {
        &self.process_factory
    }

    pub fn pre(&self) -> &[Step<P>] {
        &self.pre_steps
    }

    pub fn concurrent(&self) -> &[Step<P>] {
        &self.concurrent_steps
    }

    pub fn post(&self) -> &[Step<P>] {
        &self.post_steps
    }

    pub fn step_count(&self) -> usize {
        self.pre_steps.len() + self.concurrent_steps.len() + self.post_steps.len()
    }

    /// Reject a configuration with no steps in any stage.
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.step_count() == 0 {
            return Err(OrchestratorError::EmptyPipeline);
        }
        Ok(())
    }
}

/// Overrides for a repeat run. Unset fields fall back to the original
/// orchestrator; unset step lists fall back to the repeatable subset captured
/// by the run that produced the result.
pub struct RepeatOverrides<P: Process> {
    process_factory: Option<ProcessFactory<P>>,
    pre_steps: Option<Vec<Step<P>>>,
    concurrent_steps: Option<Vec<Step<P>>>,
    post_steps: Option<Vec<Step<P>>>,
    callbacks: Callbacks<P>,
}

impl<P: Process> Default for RepeatOverrides<P> {
    fn default() -> Self {
        Self {
            process_factory: None,
            pre_steps: None,
            concurrent_steps: None,
            post_steps: None,
            callbacks: Callbacks::default(),
        }
    }
}

impl<P: Process> RepeatOverrides<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_factory<F>(mut self, f: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.process_factory = Some(Arc::new(f));
        self
    }

    pub fn pre_steps(mut self, steps: Vec<Step<P>>) -> Self {
        self.pre_steps = Some(steps);
        self
    }

    pub fn concurrent_steps(mut self, steps: Vec<Step<P>>) -> Self {
        self.concurrent_steps = Some(steps);
        self
    }

    pub fn post_steps(mut self, steps: Vec<Step<P>>) -> Self {
        self.post_steps = Some(steps);
        self
    }

    callback_setters!();

    /// Merge onto `original`, taking step lists from `repeat` where unset.
    pub(crate) fn apply(
        self,
        original: &OrchestratorConfig<P>,
        repeat: &RepeatSteps<P>,
    ) -> OrchestratorConfig<P> {
        OrchestratorConfig {
            process_factory: self
                .process_factory
                .unwrap_or_else(|| original.process_factory.clone()),
            pre_steps: self.pre_steps.unwrap_or_else(|| repeat.pre.clone()),
            concurrent_steps: self
                .concurrent_steps
                .unwrap_or_else(|| repeat.concurrent.clone()),
            post_steps: self.post_steps.unwrap_or_else(|| repeat.post.clone()),
            callbacks: self.callbacks.or(&original.callbacks),
        }
    }
}

/// Repeatable subsets of each stage, captured from a finished run.
pub struct RepeatSteps<P> {
    pub pre: Vec<Step<P>>,
    pub concurrent: Vec<Step<P>>,
    pub post: Vec<Step<P>>,
}

impl<P> Clone for RepeatSteps<P> {
    fn clone(&self) -> Self {
        Self {
            pre: self.pre.clone(),
            concurrent: self.concurrent.clone(),
            post: self.post.clone(),
        }
    }
}

impl<P> RepeatSteps<P> {
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.concurrent.is_empty() && self.post.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(usize);

    impl Process for Counter {
        type Container = usize;

        fn finalize(&self) -> usize {
            self.0
        }
    }

    fn noop(title: &str) -> Step<Counter> {
        Step::blocking(|_| Ok(())).titled(title)
    }

    #[test]
    fn test_validate_rejects_empty_pipeline() {
        let config = OrchestratorConfig::new(|| Counter(0));
        assert_eq!(config.validate(), Err(OrchestratorError::EmptyPipeline));

        let config = config.post_step(noop("only"));
        assert!(config.validate().is_ok());
        assert_eq!(config.step_count(), 1);
    }

    #[test]
    fn test_repeat_overrides_fall_back_to_repeat_steps_and_callbacks() {
        let starts = Arc::new(AtomicUsize::new(0));
        let starts_cb = starts.clone();
        let original = OrchestratorConfig::new(|| Counter(1))
            .pre_step(noop("env"))
            .concurrent_steps([noop("a").repeatable(), noop("b")])
            .on_start(move || {
                starts_cb.fetch_add(1, Ordering::SeqCst);
            });
        let repeat = RepeatSteps {
            pre: Vec::new(),
            concurrent: vec![original.concurrent()[0].clone()],
            post: Vec::new(),
        };

        let merged = RepeatOverrides::new()
            .process_factory(|| Counter(7))
            .apply(&original, &repeat);

        assert!(merged.pre().is_empty());
        assert_eq!(merged.concurrent().len(), 1);
        assert!(merged.concurrent()[0].same_step(&original.concurrent()[0]));
        assert_eq!((merged.process_factory())().0, 7);

        if let Some(cb) = &merged.callbacks.on_start {
            cb();
        }
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_override_replaces_list() {
        let original = OrchestratorConfig::new(|| Counter(0)).pre_step(noop("env"));
        let repeat = RepeatSteps {
            pre: Vec::new(),
            concurrent: Vec::new(),
            post: Vec::new(),
        };
        assert!(repeat.is_empty());

        let merged = RepeatOverrides::new()
            .pre_steps(original.pre().to_vec())
            .apply(&original, &repeat);
        assert_eq!(merged.pre()[0].title(), Some("env"));
        assert_eq!((merged.process_factory())().0, 0);
    }
}
