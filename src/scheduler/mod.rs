//! In-memory task scheduler.
//!
//! Each enabled task with a timed trigger owns at most one pending timer, a
//! spawned Tokio task that sleeps for the computed delay and then runs the
//! executor. A timer detaches itself from the timer table before it runs the
//! executor, so `stop()` and `disable_task()` only ever abort sleeping
//! timers. Runs of the same task are not serialized: a manual trigger during
//! a timed run produces a second, independent execution.
//!
//! There is no executor timeout. An executor that never resolves keeps its
//! task from being rescheduled.

pub mod task;
pub mod trigger;

use chrono::{Local, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SeedcastError};
use crate::models::PipelineResult;

pub use task::{
    executor, Capabilities, ContextSource, DailyContext, Execution, ExecutionContext,
    ExecutionStatus, Executor, PinnedContext, RunContext, Schedule, Task,
};
pub use trigger::{CalendarEvent, CronShape, Trigger};

/// Snapshot of scheduler state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub tasks: usize,
    pub enabled: usize,
    pub enabled_ids: Vec<String>,
    pub pending_timers: usize,
    pub total_executions: usize,
    /// Executions started but not yet finished.
    pub in_flight: usize,
}

struct Timer {
    id: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    tasks: HashMap<String, Task>,
    schedules: HashMap<String, Schedule>,
    executions: Vec<Execution>,
    timers: HashMap<String, Timer>,
    running: bool,
    timer_seq: u64,
}

impl State {
    fn cancel_timer(&mut self, task_id: &str) -> bool {
        match self.timers.remove(task_id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }
}

struct Inner {
    state: Mutex<State>,
    contexts: Arc<dyn ContextSource>,
}

/// Cloneable handle to one scheduler instance.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    pub fn new(contexts: Arc<dyn ContextSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                contexts,
            }),
        }
    }

    /// Adds a task, replacing any task with the same id.
    pub fn register_task(&self, task: Task) {
        let mut state = self.inner.state.lock();
        let id = task.id.clone();

        if state.tasks.contains_key(&id) {
            warn!("Task '{}' already registered, replacing it", id);
            state.cancel_timer(&id);
        }

        info!("Registered task '{}' ({}, trigger: {})", id, task.name, task.trigger);
        state.schedules.insert(id.clone(), Schedule::new(&id, task.enabled));
        state.tasks.insert(id.clone(), task);
        self.arm_timer(&mut state, &id);
    }

    /// Removes a task and its schedule. Returns false if it was unknown.
    pub fn unregister_task(&self, task_id: &str) -> bool {
        let mut state = self.inner.state.lock();
        state.cancel_timer(task_id);
        state.schedules.remove(task_id);
        let removed = state.tasks.remove(task_id).is_some();
        if removed {
            info!("Unregistered task '{}'", task_id);
        }
        removed
    }

    /// Arms timers for every enabled task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        if state.running {
            debug!("Scheduler already running");
            return;
        }
        state.running = true;

        let ids: Vec<String> = state.tasks.keys().cloned().collect();
        for id in &ids {
            self.arm_timer(&mut state, id);
        }
        info!(
            "Scheduler started with {} tasks ({} timers armed)",
            state.tasks.len(),
            state.timers.len()
        );
    }

    /// Cancels all pending timers. Executions already running finish.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.running = false;
        let cancelled = state.timers.len();
        for (_, timer) in state.timers.drain() {
            timer.handle.abort();
        }
        for schedule in state.schedules.values_mut() {
            schedule.next_run = None;
        }
        info!("Scheduler stopped ({} pending timers cancelled)", cancelled);
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    pub fn enable_task(&self, task_id: &str) -> Result<()> {
        let mut state = self.inner.state.lock();
        Self::set_enabled(&mut state, task_id, true)?;
        self.arm_timer(&mut state, task_id);
        debug!("Enabled task '{}'", task_id);
        Ok(())
    }

    /// Disables a task and cancels its pending timer. History is kept.
    pub fn disable_task(&self, task_id: &str) -> Result<()> {
        let mut state = self.inner.state.lock();
        Self::set_enabled(&mut state, task_id, false)?;
        state.cancel_timer(task_id);
        if let Some(schedule) = state.schedules.get_mut(task_id) {
            schedule.next_run = None;
        }
        debug!("Disabled task '{}'", task_id);
        Ok(())
    }

    fn set_enabled(state: &mut State, task_id: &str, enabled: bool) -> Result<()> {
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| SeedcastError::TaskNotFound(task_id.to_string()))?;
        task.enabled = enabled;
        if let Some(schedule) = state.schedules.get_mut(task_id) {
            schedule.enabled = enabled;
        }
        Ok(())
    }

    /// Runs a task now, regardless of its trigger or enabled flag.
    pub async fn trigger_task(&self, task_id: &str) -> Result<Execution> {
        info!("Manually triggering task '{}'", task_id);
        self.execute(task_id).await
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        let state = self.inner.state.lock();
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.inner.state.lock().tasks.get(task_id).cloned()
    }

    pub fn schedule(&self, task_id: &str) -> Option<Schedule> {
        self.inner.state.lock().schedules.get(task_id).cloned()
    }

    pub fn schedules(&self) -> Vec<Schedule> {
        let state = self.inner.state.lock();
        let mut schedules: Vec<Schedule> = state.schedules.values().cloned().collect();
        schedules.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        schedules
    }

    /// Executions of one task in start order.
    pub fn executions_for(&self, task_id: &str) -> Vec<Execution> {
        self.inner
            .state
            .lock()
            .executions
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect()
    }

    /// The `limit` most recently started executions, newest first.
    pub fn recent_executions(&self, limit: usize) -> Vec<Execution> {
        self.inner
            .state
            .lock()
            .executions
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.state.lock();
        let mut enabled_ids: Vec<String> = state
            .tasks
            .values()
            .filter(|t| t.enabled)
            .map(|t| t.id.clone())
            .collect();
        enabled_ids.sort();

        SchedulerStatus {
            running: state.running,
            tasks: state.tasks.len(),
            enabled: enabled_ids.len(),
            enabled_ids,
            pending_timers: state.timers.len(),
            total_executions: state.executions.len(),
            in_flight: state
                .executions
                .iter()
                .filter(|e| !e.status.is_finished())
                .count(),
        }
    }

    /// Arms the next timer for `task_id` if it is enabled, timed and the
    /// scheduler is running.
    fn arm_timer(&self, state: &mut State, task_id: &str) {
        if !state.running {
            return;
        }
        let delay = match state.tasks.get(task_id) {
            Some(task) if task.enabled => match task.trigger.delay_from(&Local::now()) {
                Some(delay) => delay,
                None => return,
            },
            _ => return,
        };

        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                error!("No Tokio runtime available, cannot schedule task '{}'", task_id);
                return;
            }
        };

        state.cancel_timer(task_id);
        state.timer_seq += 1;
        let timer_id = state.timer_seq;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let id = task_id.to_string();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                TaskScheduler { inner }.fire(id, timer_id).await;
            }
        });

        state.timers.insert(task_id.to_string(), Timer { id: timer_id, handle });
        if let Some(schedule) = state.schedules.get_mut(task_id) {
            schedule.next_run = chrono::Duration::from_std(delay)
                .ok()
                .map(|d| Utc::now() + d);
        }
        debug!("Armed timer for '{}' in {:?}", task_id, delay);
    }

    async fn fire(&self, task_id: String, timer_id: u64) {
        {
            let mut state = self.inner.state.lock();
            match state.timers.get(&task_id) {
                Some(timer) if timer.id == timer_id => {
                    state.timers.remove(&task_id);
                }
                _ => return,
            }
        }

        if let Err(e) = self.execute(&task_id).await {
            warn!("Timer for '{}' fired but the task is gone: {}", task_id, e);
            return;
        }

        let mut state = self.inner.state.lock();
        if !state.timers.contains_key(&task_id) {
            self.arm_timer(&mut state, &task_id);
        }
    }

    /// Creates, runs and finalizes one execution.
    async fn execute(&self, task_id: &str) -> Result<Execution> {
        let (executor, ctx) = {
            let mut state = self.inner.state.lock();
            let executor = state
                .tasks
                .get(task_id)
                .map(|t| t.executor.clone())
                .ok_or_else(|| SeedcastError::TaskNotFound(task_id.to_string()))?;

            let execution = Execution::running(task_id);
            let run = self.inner.contexts.next_context();
            let ctx = ExecutionContext {
                task_id: task_id.to_string(),
                execution_id: execution.id.clone(),
                seed: run.seed,
                date: run.date,
                started_at: execution.started_at.unwrap_or(execution.scheduled_at),
            };
            state.executions.push(execution);
            (executor, ctx)
        };

        let execution_id = ctx.execution_id.clone();
        let started = Instant::now();
        let outcome = AssertUnwindSafe(async move { executor(ctx).await })
            .catch_unwind()
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (status, result, error) = match outcome {
            Ok(Ok(result)) if result.success => (ExecutionStatus::Completed, Some(result), None),
            Ok(Ok(result)) => {
                let message = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "pipeline reported failure".to_string());
                (ExecutionStatus::Failed, Some(result), Some(message))
            }
            Ok(Err(e)) => (ExecutionStatus::Failed, None, Some(format!("{:#}", e))),
            Err(panic) => (
                ExecutionStatus::Failed,
                None,
                Some(format!("executor panicked: {}", panic_message(panic.as_ref()))),
            ),
        };

        match &error {
            Some(message) => warn!("Task '{}' failed after {}ms: {}", task_id, duration_ms, message),
            None => info!("Task '{}' completed in {}ms", task_id, duration_ms),
        }

        Ok(self.finalize(task_id, &execution_id, status, result, error, duration_ms))
    }

    fn finalize(
        &self,
        task_id: &str,
        execution_id: &str,
        status: ExecutionStatus,
        result: Option<PipelineResult>,
        error: Option<String>,
        duration_ms: u64,
    ) -> Execution {
        let mut state = self.inner.state.lock();
        let completed_at = Utc::now();

        if let Some(schedule) = state.schedules.get_mut(task_id) {
            schedule.last_run = Some(completed_at);
            schedule.execution_count += 1;
        }

        let record = state
            .executions
            .iter_mut()
            .rev()
            .find(|e| e.id == execution_id);

        match record {
            Some(execution) => {
                execution.status = status;
                execution.completed_at = Some(completed_at);
                execution.duration_ms = Some(duration_ms);
                execution.result = result;
                execution.error = error;
                execution.clone()
            }
            None => {
                let mut execution = Execution::running(task_id);
                execution.id = execution_id.to_string();
                execution.status = status;
                execution.completed_at = Some(completed_at);
                execution.duration_ms = Some(duration_ms);
                execution.result = result;
                execution.error = error;
                execution
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PipelineMetrics, PipelineProvenance};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn scheduler() -> TaskScheduler {
        TaskScheduler::new(Arc::new(PinnedContext::new("sched-seed", "2025-01-15")))
    }

    fn ok_result(ctx: &ExecutionContext) -> PipelineResult {
        PipelineResult::success(
            serde_json::json!({ "ok": true }),
            PipelineMetrics::default(),
            PipelineProvenance {
                task_id: ctx.task_id.clone(),
                execution_id: ctx.execution_id.clone(),
                seed: ctx.seed.clone(),
                timestamp: ctx.started_at,
            },
        )
    }

    fn counting_task(id: &str, trigger: Trigger, counter: Arc<AtomicUsize>) -> Task {
        Task::new(
            id,
            id,
            trigger,
            executor(move |ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(ok_result(&ctx))
                }
            }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_fires_once() {
        let sched = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        sched.register_task(counting_task("tick", Trigger::interval(1000), counter.clone()));
        sched.start();
        assert_eq!(sched.status().pending_timers, 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let runs = sched.executions_for("tick");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, ExecutionStatus::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(sched.schedule("tick").unwrap().execution_count, 1);
        assert_eq!(sched.status().pending_timers, 1);
        sched.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_rearms_after_each_run() {
        let sched = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        sched.register_task(counting_task("tick", Trigger::interval(100), counter.clone()));
        sched.start();

        tokio::time::sleep(Duration::from_millis(350)).await;
        sched.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(sched.status().pending_timers, 0);
    }

    #[tokio::test]
    async fn test_status_counts_enabled_tasks() {
        let sched = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        sched.register_task(counting_task("a", Trigger::interval(60_000), counter.clone()));
        sched.register_task(counting_task("b", Trigger::cron("*/15 * * * *"), counter.clone()));
        sched.register_task(
            counting_task("c", Trigger::interval(60_000), counter.clone()).with_enabled(false),
        );
        sched.start();

        let status = sched.status();
        assert_eq!(status.tasks, 3);
        assert_eq!(status.enabled, 2);
        assert_eq!(status.enabled_ids, vec!["a".to_string(), "b".to_string()]);
        assert!(status.running);
        assert_eq!(status.pending_timers, 2);

        sched.stop();
        assert!(!sched.is_running());
        assert_eq!(sched.status().pending_timers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_cancels_timer() {
        let sched = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        sched.register_task(counting_task("quiet", Trigger::interval(100), counter.clone()));
        sched.start();
        sched.disable_task("quiet").unwrap();

        let status = sched.status();
        assert!(!status.enabled_ids.contains(&"quiet".to_string()));
        assert_eq!(status.pending_timers, 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(sched.executions_for("quiet").is_empty());

        let manual = sched.trigger_task("quiet").await.unwrap();
        assert_eq!(manual.status, ExecutionStatus::Completed);
        assert_eq!(sched.executions_for("quiet").len(), 1);

        sched.enable_task("quiet").unwrap();
        assert_eq!(sched.status().pending_timers, 1);
        sched.stop();
    }

    #[tokio::test]
    async fn test_manual_trigger_and_context() {
        let sched = scheduler();
        sched.register_task(Task::new(
            "manual",
            "Manual",
            Trigger::Manual,
            executor(|ctx| async move {
                assert_eq!(ctx.seed, "sched-seed");
                assert_eq!(ctx.date, "2025-01-15");
                Ok(ok_result(&ctx))
            }),
        ));
        sched.start();
        assert_eq!(sched.status().pending_timers, 0);

        let execution = sched.trigger_task("manual").await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        let result = execution.result.unwrap();
        assert_eq!(result.provenance.unwrap().execution_id, execution.id);
        assert!(execution.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_errors_become_failed_executions() {
        let sched = scheduler();
        sched.register_task(Task::new(
            "err",
            "Error",
            Trigger::Manual,
            executor(|_| async {
                Err::<PipelineResult, _>(anyhow::anyhow!("upstream unavailable"))
            }),
        ));
        sched.register_task(Task::new(
            "panic",
            "Panic",
            Trigger::Manual,
            executor(|_| async {
                let explode = true;
                if explode {
                    panic!("kaboom");
                }
                Ok(PipelineResult::failure("unreachable", 0))
            }),
        ));
        sched.register_task(Task::new(
            "soft",
            "Soft failure",
            Trigger::Manual,
            executor(|_| async { Ok(PipelineResult::failure("no snapshot", 3)) }),
        ));

        let err = sched.trigger_task("err").await.unwrap();
        assert_eq!(err.status, ExecutionStatus::Failed);
        assert!(err.error.unwrap().contains("upstream unavailable"));

        let panicked = sched.trigger_task("panic").await.unwrap();
        assert_eq!(panicked.status, ExecutionStatus::Failed);
        assert!(panicked.error.unwrap().contains("kaboom"));

        let soft = sched.trigger_task("soft").await.unwrap();
        assert_eq!(soft.status, ExecutionStatus::Failed);
        assert_eq!(soft.error.as_deref(), Some("no snapshot"));
        assert!(!soft.result.unwrap().success);

        assert_eq!(sched.status().total_executions, 3);
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let sched = scheduler();
        assert!(matches!(
            sched.trigger_task("missing").await,
            Err(SeedcastError::TaskNotFound(_))
        ));
        assert!(sched.enable_task("missing").is_err());
        assert!(!sched.unregister_task("missing"));
    }

    #[tokio::test]
    async fn test_reregister_replaces() {
        let sched = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        sched.register_task(counting_task("dup", Trigger::Manual, counter.clone()));
        let mut replacement = counting_task("dup", Trigger::Manual, counter.clone());
        replacement.name = "Replacement".to_string();
        sched.register_task(replacement);

        let tasks = sched.list_tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "Replacement");
        assert!(sched.unregister_task("dup"));
        assert!(sched.get_task("dup").is_none());
        assert!(sched.schedule("dup").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_does_not_cancel_running_executor() {
        let sched = scheduler();
        sched.register_task(Task::new(
            "slow",
            "Slow",
            Trigger::interval(100),
            executor(|ctx| async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(ok_result(&ctx))
            }),
        ));
        sched.start();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sched.executions_for("slow")[0].status, ExecutionStatus::Running);
        assert_eq!(sched.status().in_flight, 1);
        sched.stop();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let runs = sched.executions_for("slow");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, ExecutionStatus::Completed);
        assert_eq!(sched.status().pending_timers, 0);
        assert_eq!(sched.status().in_flight, 0);
    }

    #[tokio::test]
    async fn test_recent_executions_newest_first() {
        let sched = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        sched.register_task(counting_task("a", Trigger::Manual, counter.clone()));
        sched.register_task(counting_task("b", Trigger::Manual, counter.clone()));

        sched.trigger_task("a").await.unwrap();
        let last = sched.trigger_task("b").await.unwrap();

        let recent = sched.recent_executions(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, last.id);
        assert_eq!(sched.recent_executions(10).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_during_timer_run_is_independent() {
        let sched = scheduler();
        sched.register_task(Task::new(
            "slow",
            "Slow",
            Trigger::interval(100),
            executor(|ctx| async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(ok_result(&ctx))
            }),
        ));
        sched.start();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sched.executions_for("slow")[0].status, ExecutionStatus::Running);

        let manual = sched.trigger_task("slow").await.unwrap();
        sched.stop();

        let runs = sched.executions_for("slow");
        assert_eq!(runs.len(), 2);
        assert_ne!(runs[0].id, runs[1].id);
        assert_eq!(runs[1].id, manual.id);
        assert!(runs.iter().all(|e| e.status == ExecutionStatus::Completed));
        assert_eq!(sched.schedule("slow").unwrap().execution_count, 2);
    }

    #[test]
    fn test_panic_message_reads_payload() {
        let text: Box<dyn std::any::Any + Send> = Box::new("static text");
        assert_eq!(panic_message(text.as_ref()), "static text");

        let owned: Box<dyn std::any::Any + Send> = Box::new(format!("code {}", 7));
        assert_eq!(panic_message(owned.as_ref()), "code 7");

        let other: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
