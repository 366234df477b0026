//! Tasks, schedules and execution records.

use chrono::{DateTime, Local, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::trigger::Trigger;
use crate::models::PipelineResult;

/// Async function run for every execution of a task.
pub type Executor =
    Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, anyhow::Result<PipelineResult>> + Send + Sync>;

/// Wraps an async closure as an [`Executor`].
pub fn executor<F, Fut>(f: F) -> Executor
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<PipelineResult>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// Resources a task says it touches. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
    #[serde(default)]
    pub network: bool,
}

#[derive(Clone)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub trigger: Trigger,
    pub enabled: bool,
    pub capabilities: Capabilities,
    pub executor: Executor,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        trigger: Trigger,
        executor: Executor,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            trigger,
            enabled: true,
            capabilities: Capabilities::default(),
            executor,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("enabled", &self.enabled)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Per-task timing bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub task_id: String,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub execution_count: u64,
}

impl Schedule {
    pub fn new(task_id: impl Into<String>, enabled: bool) -> Self {
        Self {
            task_id: task_id.into(),
            enabled,
            last_run: None,
            next_run: None,
            execution_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

/// One run of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub task_id: String,
    pub status: ExecutionStatus,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    pub(crate) fn running(task_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            status: ExecutionStatus::Running,
            scheduled_at: now,
            started_at: Some(now),
            completed_at: None,
            duration_ms: None,
            result: None,
            error: None,
        }
    }
}

/// Handed to an executor for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub task_id: String,
    pub execution_id: String,
    pub seed: String,
    pub date: String,
    pub started_at: DateTime<Utc>,
}

/// A seed and date pair for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub seed: String,
    pub date: String,
}

/// Supplies a fresh seed and date for each execution.
pub trait ContextSource: Send + Sync {
    fn next_context(&self) -> RunContext;
}

/// Always hands out the same seed and date.
#[derive(Debug, Clone)]
pub struct PinnedContext {
    pub seed: String,
    pub date: String,
}

impl PinnedContext {
    pub fn new(seed: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            date: date.into(),
        }
    }
}

impl ContextSource for PinnedContext {
    fn next_context(&self) -> RunContext {
        RunContext {
            seed: self.seed.clone(),
            date: self.date.clone(),
        }
    }
}

/// Today's local date, seeded as `daily-<date>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailyContext;

impl ContextSource for DailyContext {
    fn next_context(&self) -> RunContext {
        let date = Local::now().format("%Y-%m-%d").to_string();
        RunContext {
            seed: format!("daily-{}", date),
            date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_context_seed_tracks_date() {
        let ctx = DailyContext.next_context();
        assert_eq!(ctx.seed, format!("daily-{}", ctx.date));
        assert_eq!(ctx.date.len(), 10);
    }

    #[test]
    fn test_pinned_context() {
        let source = PinnedContext::new("fixed", "2025-01-15");
        assert_eq!(source.next_context(), source.next_context());
        assert_eq!(source.next_context().seed, "fixed");
    }

    #[test]
    fn test_task_debug_hides_executor() {
        let task = Task::new(
            "t",
            "Test",
            Trigger::Manual,
            executor(|_| async { Ok(PipelineResult::failure("unused", 0)) }),
        )
        .with_enabled(false);
        let debug = format!("{:?}", task);
        assert!(debug.contains("enabled: false"));
        assert!(!debug.contains("executor"));
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(ExecutionStatus::Failed.to_string(), "failed");
        assert!(ExecutionStatus::Completed.is_finished());
        assert!(!ExecutionStatus::Running.is_finished());
    }
}
