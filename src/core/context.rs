//! Per-run state shared by the stages of one `Orchestrator::run` call.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use uuid::Uuid;

use crate::core::state::Stage;
use crate::process::Process;
use crate::step::{Step, repeatable_subset};

/// The first error captured in a run, with the step and stage it came from.
pub struct RunFailure<P> {
    pub error: Arc<anyhow::Error>,
    pub step: Step<P>,
    pub stage: Stage,
}

impl<P> Clone for RunFailure<P> {
    fn clone(&self) -> Self {
        Self {
            error: self.error.clone(),
            step: self.step.clone(),
            stage: self.stage,
        }
    }
}

impl<P> fmt::Debug for RunFailure<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunFailure")
            .field("error", &self.error)
            .field("step", &self.step)
            .field("stage", &self.stage)
            .finish()
    }
}

/// Owns the process, the start time and the error slot for one run.
pub struct RunContext<P: Process> {
    run_id: Uuid,
    process: Arc<P>,
    started: Instant,
    started_at: DateTime<Utc>,
    /// Written at most once; `OnceLock::set` picks a single winner.
    failure: OnceLock<RunFailure<P>>,
    repeat_pre: Vec<Step<P>>,
    repeat_concurrent: Vec<Step<P>>,
    repeat_post: Vec<Step<P>>,
}

impl<P: Process> RunContext<P> {
    pub fn new(
        process: P,
        pre: &[Step<P>],
        concurrent: &[Step<P>],
        post: &[Step<P>],
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            process: Arc::new(process),
            started: Instant::now(),
            started_at: Utc::now(),
            failure: OnceLock::new(),
            repeat_pre: repeatable_subset(pre),
            repeat_concurrent: repeatable_subset(concurrent),
            repeat_post: repeatable_subset(post),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn process(&self) -> &Arc<P> {
        &self.process
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Store `failure` as the run's terminal error unless one is already held.
    ///
    /// Returns true only for the caller whose failure was stored.
    pub fn capture_error(&self, failure: RunFailure<P>) -> bool {
        self.failure.set(failure).is_ok()
    }

    pub fn has_error(&self) -> bool {
        self.failure.get().is_some()
    }

    pub fn failure(&self) -> Option<&RunFailure<P>> {
        self.failure.get()
    }

    pub fn repeat_pre(&self) -> &[Step<P>] {
        &self.repeat_pre
    }

    pub fn repeat_concurrent(&self) -> &[Step<P>] {
        &self.repeat_concurrent
    }

    pub fn repeat_post(&self) -> &[Step<P>] {
        &self.repeat_post
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;

    impl Process for Empty {
        type Container = ();

        fn finalize(&self) {}
    }

    fn failure(step: &Step<Empty>, msg: &str) -> RunFailure<Empty> {
        RunFailure {
            error: Arc::new(anyhow::anyhow!(msg.to_string())),
            step: step.clone(),
            stage: Stage::Concurrent,
        }
    }

    #[test]
    fn test_capture_error_first_wins() {
        let step = Step::<Empty>::blocking(|_| Ok(()));
        let ctx = RunContext::new(Empty, &[], std::slice::from_ref(&step), &[]);

        assert!(!ctx.has_error());
        assert!(ctx.capture_error(failure(&step, "first")));
        assert!(!ctx.capture_error(failure(&step, "second")));

        let stored = ctx.failure().map(|f| f.error.to_string());
        assert_eq!(stored.as_deref(), Some("first"));
    }

    #[test]
    fn test_capture_error_from_many_threads_stores_one() {
        let step = Step::<Empty>::blocking(|_| Ok(()));
        let ctx = Arc::new(RunContext::new(Empty, &[], &[], &[]));

        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..32)
                .map(|i| {
                    let ctx = ctx.clone();
                    let step = step.clone();
                    scope.spawn(move || ctx.capture_error(failure(&step, &format!("e{}", i))))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(false) as usize)
                .sum()
        });

        assert_eq!(winners, 1);
    }

    #[test]
    fn test_repeat_lists_are_partitioned_per_stage() {
        let pre = vec![Step::<Empty>::blocking(|_| Ok(())).titled("env")];
        let concurrent = vec![
            Step::<Empty>::blocking(|_| Ok(())).titled("a").repeatable(),
            Step::<Empty>::blocking(|_| Ok(())).titled("b"),
        ];
        let post = vec![Step::<Empty>::blocking(|_| Ok(())).titled("c").repeatable()];

        let ctx = RunContext::new(Empty, &pre, &concurrent, &post);
        assert!(ctx.repeat_pre().is_empty());
        assert_eq!(ctx.repeat_concurrent().len(), 1);
        assert!(ctx.repeat_concurrent()[0].same_step(&concurrent[0]));
        assert_eq!(ctx.repeat_post()[0].title(), Some("c"));
    }
}
