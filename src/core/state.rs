// Run lifecycle: stages and the state machine a run walks through

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three ordered phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pre,
    Concurrent,
    Post,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Concurrent => write!(f, "concurrent"),
            Self::Post => write!(f, "post"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    RunningPre,
    RunningConcurrent,
    RunningPost,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_advance_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (NotStarted, RunningPre) => true,
            (RunningPre, RunningConcurrent | RunningPost) => true,
            (RunningConcurrent, RunningPost) => true,
            (RunningPre | RunningConcurrent | RunningPost, Succeeded | Failed) => true,
            _ => false,
        }
    }
}

impl From<Stage> for RunState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Pre => RunState::RunningPre,
            Stage::Concurrent => RunState::RunningConcurrent,
            Stage::Post => RunState::RunningPost,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::RunningPre => "running_pre",
            Self::RunningConcurrent => "running_concurrent",
            Self::RunningPost => "running_post",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}
