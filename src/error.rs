//! Error types for orchestrator construction and pipeline loading.
//!
//! Step failures are not represented here: step actions fail with an opaque
//! `anyhow::Error`, which is captured per run and delivered to `on_error`.

use std::fmt;

/// Errors raised while configuring an orchestrator or loading a pipeline file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// The pre, concurrent and post step lists are all empty.
    EmptyPipeline,

    /// A pipeline file could not be located or is malformed.
    Config(String),

    /// Reading a pipeline file failed.
    Io(String),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPipeline => write!(f, "Step lists can't all be empty"),
            Self::Config(msg) => write!(f, "Invalid pipeline configuration: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for OrchestratorError {}

/// Result type for orchestrator configuration operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            OrchestratorError::EmptyPipeline.to_string(),
            "Step lists can't all be empty"
        );
        assert!(
            OrchestratorError::Config("missing `title`".into())
                .to_string()
                .contains("missing `title`")
        );
    }

    #[test]
    fn test_from_serde_error_is_config() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            OrchestratorError::from(err),
            OrchestratorError::Config(_)
        ));
    }
}
