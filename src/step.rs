//! Step descriptors: one unit of setup work over a shared process.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of a step. Minted once at construction and shared by every clone,
/// so two handles compare equal only if they describe the same step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(Uuid);

impl StepId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a step is handed on to repeat invocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Runs in the original pipeline only.
    #[default]
    Once,
    /// Also included in the step lists captured for `RunResult::repeat`.
    Repeatable,
}

/// Launch-order hint for the concurrent stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPriority {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
    Critical = 3,
}

type BlockingFn<P> = dyn Fn(&P) -> anyhow::Result<()> + Send + Sync;
type AsyncFn<P> = dyn Fn(Arc<P>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// The work a step performs against the process.
pub enum StepAction<P> {
    /// Runs to completion on the calling task.
    Blocking(Arc<BlockingFn<P>>),
    /// Suspends; the future is only created once the step is launched.
    Async(Arc<AsyncFn<P>>),
}

impl<P> Clone for StepAction<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Blocking(f) => Self::Blocking(f.clone()),
            Self::Async(f) => Self::Async(f.clone()),
        }
    }
}

impl<P> StepAction<P> {
    pub(crate) async fn invoke(&self, process: &Arc<P>) -> anyhow::Result<()> {
        match self {
            Self::Blocking(f) => f(process.as_ref()),
            Self::Async(f) => f(process.clone()).await,
        }
    }
}

/// An immutable descriptor of one unit of setup work.
///
/// Cloning is cheap and preserves identity (see [`Step::id`]).
pub struct Step<P> {
    id: StepId,
    title: Option<Arc<str>>,
    kind: StepKind,
    priority: StepPriority,
    action: StepAction<P>,
}

impl<P> Clone for Step<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            title: self.title.clone(),
            kind: self.kind,
            priority: self.priority,
            action: self.action.clone(),
        }
    }
}

impl<P> Step<P> {
    /// A step with a synchronous, fallible action.
    pub fn blocking<F>(action: F) -> Self
    where
        F: Fn(&P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::from_action(StepAction::Blocking(Arc::new(action)))
    }

    /// A step with a suspending, fallible action.
    pub fn suspending<F, Fut>(action: F) -> Self
    where
        F: Fn(Arc<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_action(StepAction::Async(Arc::new(move |process: Arc<P>| {
            Box::pin(action(process)) as BoxFuture<'static, anyhow::Result<()>>
        })))
    }

    fn from_action(action: StepAction<P>) -> Self {
        Self {
            id: StepId::new(),
            title: None,
            kind: StepKind::default(),
            priority: StepPriority::default(),
            action,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(Arc::from(title.into()));
        self
    }

    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }

    /// Shorthand for `with_kind(StepKind::Repeatable)`.
    pub fn repeatable(self) -> Self {
        self.with_kind(StepKind::Repeatable)
    }

    pub fn with_priority(mut self, priority: StepPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> StepId {
        self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn priority(&self) -> StepPriority {
        self.priority
    }

    pub fn action(&self) -> &StepAction<P> {
        &self.action
    }

    pub fn is_repeatable(&self) -> bool {
        self.kind == StepKind::Repeatable
    }

    /// True if both handles were cloned from the same constructed step.
    pub fn same_step(&self, other: &Step<P>) -> bool {
        self.id == other.id
    }

    /// Title for log lines; falls back to the step id.
    pub(crate) fn label(&self) -> String {
        match &self.title {
            Some(title) => title.to_string(),
            None => format!("step:{}", self.id),
        }
    }
}

impl<P> fmt::Debug for Step<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self.action {
            StepAction::Blocking(_) => "blocking",
            StepAction::Async(_) => "async",
        };
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("action", &shape)
            .finish()
    }
}

/// Keep only the repeatable steps, preserving declaration order.
pub(crate) fn repeatable_subset<P>(steps: &[Step<P>]) -> Vec<Step<P>> {
    steps.iter().filter(|s| s.is_repeatable()).cloned().collect()
}
