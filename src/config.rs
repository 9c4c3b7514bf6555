use serde::Deserialize;
use std::{env, fs, path::Path, path::PathBuf};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::step::{StepKind, StepPriority};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineFile {
    #[serde(default)]
    pub pre: Vec<StepSpec>,
    #[serde(default)]
    pub concurrent: Vec<StepSpec>,
    #[serde(default)]
    pub post: Vec<StepSpec>,
}

impl PipelineFile {
    pub fn step_count(&self) -> usize {
        self.pre.len() + self.concurrent.len() + self.post.len()
    }
}

/// One simulated step: waits `delay_ms`, then succeeds or fails with `fail`.
#[derive(Debug, Deserialize, Clone)]
pub struct StepSpec {
    pub title: String,
    #[serde(default)]
    pub kind: StepKind,
    #[serde(default)]
    pub priority: StepPriority,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub fail: Option<String>,
}

pub fn resolve_pipeline_path(explicit: Option<PathBuf>) -> OrchestratorResult<PathBuf> {
    resolve_pipeline_path_with(explicit, |name| env::var(name).ok())
}

fn resolve_pipeline_path_with(
    explicit: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> OrchestratorResult<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p);
    }

    if let Some(p) = lookup("BOOTSTRAP_PIPELINE") {
        return Ok(PathBuf::from(p));
    }

    if let Some(xdg) = lookup("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("bootstrap").join("pipeline.json");
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let candidate = PathBuf::from("pipeline.json");
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(OrchestratorError::Config(
        "Could not find pipeline.json (pass --pipeline, set BOOTSTRAP_PIPELINE or create ./pipeline.json)"
            .to_string(),
    ))
}

/// Replace each `${NAME}` with the value `lookup` returns.
///
/// Unknown names and an unterminated `${` are kept as written.
fn substitute_vars(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let reference = &rest[open..];
        let Some(close) = reference.find('}') else {
            out.push_str(reference);
            return out;
        };

        match lookup(&reference[2..close]) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&reference[..=close]),
        }
        rest = &reference[close + 1..];
    }

    out.push_str(rest);
    out
}

fn expand_spec(spec: &mut StepSpec, lookup: &impl Fn(&str) -> Option<String>) {
    spec.title = substitute_vars(&spec.title, lookup);
    if let Some(msg) = spec.fail.as_mut() {
        *msg = substitute_vars(msg, lookup);
    }
}

/// Parse a pipeline document, expanding variables through `lookup`.
pub fn parse_pipeline(
    raw: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> OrchestratorResult<PipelineFile> {
    let mut pipeline: PipelineFile = serde_json::from_str(raw)?;

    for spec in pipeline
        .pre
        .iter_mut()
        .chain(pipeline.concurrent.iter_mut())
        .chain(pipeline.post.iter_mut())
    {
        expand_spec(spec, &lookup);
    }

    if pipeline.step_count() == 0 {
        return Err(OrchestratorError::EmptyPipeline);
    }

    Ok(pipeline)
}

pub fn load_pipeline(path: &Path) -> OrchestratorResult<PipelineFile> {
    let raw = fs::read_to_string(path)?;
    parse_pipeline(&raw, |name| env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(name: &str) -> Option<String> {
        match name {
            "REGION" => Some("eu-west".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_substitute_vars() {
        assert_eq!(substitute_vars("fetch ${REGION} facts", &vars), "fetch eu-west facts");
        assert_eq!(substitute_vars("${MISSING}/x", &vars), "${MISSING}/x");
        assert_eq!(substitute_vars("cost $5", &vars), "cost $5");
        assert_eq!(substitute_vars("${REGION}${REGION}", &vars), "eu-westeu-west");
        assert_eq!(substitute_vars("open ${REGION", &vars), "open ${REGION");
    }

    #[test]
    fn test_parse_pipeline_applies_defaults() {
        let raw = r#"{
            "pre": [{ "title": "environment" }],
            "concurrent": [
                { "title": "facts ${REGION}", "kind": "repeatable", "priority": "high", "delay_ms": 20 },
                { "title": "broken", "fail": "no route to ${REGION}" }
            ]
        }"#;

        let pipeline = parse_pipeline(raw, vars).unwrap();

        assert_eq!(pipeline.step_count(), 3);
        assert!(pipeline.post.is_empty());
        let env = &pipeline.pre[0];
        assert_eq!(env.kind, StepKind::Once);
        assert_eq!(env.priority, StepPriority::Medium);
        assert_eq!(env.delay_ms, 0);
        assert!(env.fail.is_none());

        let facts = &pipeline.concurrent[0];
        assert_eq!(facts.title, "facts eu-west");
        assert_eq!(facts.kind, StepKind::Repeatable);
        assert_eq!(facts.priority, StepPriority::High);
        assert_eq!(
            pipeline.concurrent[1].fail.as_deref(),
            Some("no route to eu-west")
        );
    }

    #[test]
    fn test_parse_pipeline_rejects_empty_and_malformed() {
        assert_eq!(
            parse_pipeline(r#"{ "pre": [], "post": [] }"#, vars).unwrap_err(),
            OrchestratorError::EmptyPipeline
        );
        assert!(matches!(
            parse_pipeline(r#"{ "pre": [{ "kind": "once" }] }"#, vars),
            Err(OrchestratorError::Config(_))
        ));
        assert!(matches!(
            parse_pipeline(r#"{ "pre": [{ "title": "x", "priority": "urgent" }] }"#, vars),
            Err(OrchestratorError::Config(_))
        ));
    }

    #[test]
    fn test_load_pipeline_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "post": [{{ "title": "finish", "delay_ms": 5 }}] }}"#).unwrap();

        let pipeline = load_pipeline(file.path()).unwrap();
        assert_eq!(pipeline.post[0].title, "finish");
        assert_eq!(pipeline.post[0].delay_ms, 5);

        let missing = file.path().with_extension("absent");
        assert!(matches!(
            load_pipeline(&missing),
            Err(OrchestratorError::Io(_))
        ));
    }

    #[test]
    fn test_resolve_pipeline_path_order() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("bootstrap");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("pipeline.json"), "{}").unwrap();
        let xdg = dir.path().to_string_lossy().to_string();

        let explicit = PathBuf::from("/tmp/explicit.json");
        assert_eq!(
            resolve_pipeline_path_with(Some(explicit.clone()), |_| None).unwrap(),
            explicit
        );

        let from_env = resolve_pipeline_path_with(None, |name| match name {
            "BOOTSTRAP_PIPELINE" => Some("/tmp/from-env.json".to_string()),
            "XDG_CONFIG_HOME" => Some(xdg.clone()),
            _ => None,
        })
        .unwrap();
        assert_eq!(from_env, PathBuf::from("/tmp/from-env.json"));

        let from_xdg = resolve_pipeline_path_with(None, |name| match name {
            "XDG_CONFIG_HOME" => Some(xdg.clone()),
            _ => None,
        })
        .unwrap();
        assert_eq!(from_xdg, nested.join("pipeline.json"));
    }
}
