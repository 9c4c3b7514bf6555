//! Simulated bootstrap pipelines built from a [`PipelineFile`].

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{PipelineFile, StepSpec};
use crate::orchestrator::OrchestratorConfig;
use crate::process::Process;
use crate::step::Step;

/// Records the titles of completed steps in completion order.
#[derive(Debug, Default)]
pub struct SimulatedProcess {
    completed: Mutex<Vec<String>>,
}

impl SimulatedProcess {
    fn complete(&self, title: &str) {
        let mut completed = self
            .completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        completed.push(title.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatedContainer {
    pub completed: Vec<String>,
}

impl Process for SimulatedProcess {
    type Container = SimulatedContainer;

    fn finalize(&self) -> SimulatedContainer {
        let completed = self
            .completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        SimulatedContainer {
            completed: completed.clone(),
        }
    }
}

fn simulated_step(spec: &StepSpec) -> Step<SimulatedProcess> {
    let title = spec.title.clone();
    let delay = Duration::from_millis(spec.delay_ms);
    let fail = spec.fail.clone();

    Step::suspending(move |process: Arc<SimulatedProcess>| {
        let title = title.clone();
        let fail = fail.clone();
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(msg) = fail {
                return Err(anyhow::anyhow!(msg));
            }
            process.complete(&title);
            Ok(())
        }
    })
    .titled(spec.title.clone())
    .with_kind(spec.kind)
    .with_priority(spec.priority)
}

/// Turn a pipeline file into an orchestrator configuration over fresh
/// [`SimulatedProcess`] instances. Callbacks are left for the caller to set.
pub fn build_config(pipeline: &PipelineFile) -> OrchestratorConfig<SimulatedProcess> {
    OrchestratorConfig::new(SimulatedProcess::default)
        .pre_steps(pipeline.pre.iter().map(simulated_step))
        .concurrent_steps(pipeline.concurrent.iter().map(simulated_step))
        .post_steps(pipeline.post.iter().map(simulated_step))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_pipeline;
    use crate::orchestrator::{Orchestrator, RepeatOverrides};
    use crate::step::{StepKind, StepPriority};

    fn pipeline(raw: &str) -> PipelineFile {
        parse_pipeline(raw, |_| None).unwrap()
    }

    #[test]
    fn test_build_config_keeps_stage_layout() {
        let file = pipeline(
            r#"{
                "pre": [{ "title": "environment" }, { "title": "service" }],
                "concurrent": [{ "title": "facts", "kind": "repeatable", "priority": "critical" }],
                "post": [{ "title": "repository" }]
            }"#,
        );

        let config = build_config(&file);

        assert_eq!(config.step_count(), 4);
        assert_eq!(config.pre()[1].title(), Some("service"));
        let facts = &config.concurrent()[0];
        assert_eq!(facts.kind(), StepKind::Repeatable);
        assert_eq!(facts.priority(), StepPriority::Critical);
    }

    #[tokio::test]
    async fn test_simulated_run_and_repeat() {
        let file = pipeline(
            r#"{
                "pre": [{ "title": "environment" }],
                "concurrent": [
                    { "title": "fact0", "kind": "repeatable", "delay_ms": 5 },
                    { "title": "fact1", "delay_ms": 1 }
                ],
                "post": [{ "title": "database" }]
            }"#,
        );
        let orchestrator = Orchestrator::new(build_config(&file)).unwrap();

        let first = orchestrator.run().await.into_result().unwrap();
        let completed = &first.container().completed;
        assert_eq!(completed.len(), 4);
        assert_eq!(completed[0], "environment");
        assert_eq!(completed[3], "database");

        let second = first
            .repeat(RepeatOverrides::new())
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(second.container().completed, vec!["fact0"]);
    }

    #[tokio::test]
    async fn test_simulated_failure_stops_the_run() {
        let file = pipeline(
            r#"{
                "pre": [{ "title": "environment", "fail": "no network" }],
                "post": [{ "title": "database" }]
            }"#,
        );
        let orchestrator = Orchestrator::new(build_config(&file)).unwrap();

        let failure = orchestrator.run().await.into_result().unwrap_err();

        assert_eq!(failure.step.title(), Some("environment"));
        assert_eq!(failure.error.to_string(), "no network");
    }
}
