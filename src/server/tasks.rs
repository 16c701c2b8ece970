//! Asynchronous tool execution: the task engine.
//!
//! A task-augmented `tools/call` creates a [`TaskEntry`], spawns the handler
//! on its own tokio task, and returns the working snapshot immediately.
//! Completion is idempotent and is the only writer of terminal state; the
//! reaper reclaims terminal entries past their TTL, leaving tombstones so
//! "expired" stays distinguishable from "never existed".

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result, TaskError};
use crate::server::registry::paginate;
use crate::server::sessions::{SessionId, SessionRegistry};
use crate::types::protocol::notifications;
use crate::types::tasks::{related_task_meta, ListTasksResult, Task, TaskParams, TaskStatus};
use crate::types::CallToolResult;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct TaskEngineConfig {
    /// Cap on concurrently running tasks; `None` is unlimited.
    pub max_concurrent: Option<usize>,
    /// TTL applied when the caller does not request one.
    pub default_ttl: Duration,
    /// Poll interval suggested to clients when the caller does not set one.
    pub default_poll_interval: Option<Duration>,
    /// Page size for `tasks/list`.
    pub list_page_size: usize,
}

impl Default for TaskEngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            default_ttl: Duration::from_secs(60),
            default_poll_interval: Some(Duration::from_millis(500)),
            list_page_size: 50,
        }
    }
}

/// One stored task and its execution handles.
pub struct TaskEntry {
    task: Mutex<Task>,
    cancel: CancellationToken,
    result: Mutex<Option<std::result::Result<CallToolResult, String>>>,
    completed: AtomicBool,
    done: Notify,
    owner: SessionId,
    updated_at: Mutex<Instant>,
}

impl TaskEntry {
    /// The cancellation token handlers observe.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A wire snapshot of the task.
    pub fn snapshot(&self) -> Task {
        self.task.lock().clone()
    }

    /// The owning session.
    pub fn owner(&self) -> &SessionId {
        &self.owner
    }

    fn is_terminal(&self) -> bool {
        self.task.lock().status.is_terminal()
    }

    fn is_expired(&self, now: Instant) -> bool {
        let task = self.task.lock();
        let Some(ttl_ms) = task.ttl else {
            return false;
        };
        task.status.is_terminal()
            && now.duration_since(*self.updated_at.lock()) > Duration::from_millis(ttl_ms)
    }
}

impl std::fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let task = self.snapshot();
        f.debug_struct("TaskEntry")
            .field("task_id", &task.task_id)
            .field("status", &task.status)
            .field("owner", &self.owner)
            .finish()
    }
}

struct EngineInner {
    entries: Mutex<HashMap<String, Arc<TaskEntry>>>,
    expired: Mutex<HashSet<String>>,
    running: AtomicUsize,
    config: TaskEngineConfig,
    sessions: Arc<SessionRegistry>,
    reaper_started: AtomicBool,
}

/// The task engine; cheap to clone.
#[derive(Clone)]
pub struct TaskEngine {
    inner: Arc<EngineInner>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl TaskEngine {
    /// Create an engine fanning status notifications out through `sessions`.
    pub fn new(config: TaskEngineConfig, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                entries: Mutex::new(HashMap::new()),
                expired: Mutex::new(HashSet::new()),
                running: AtomicUsize::new(0),
                config,
                sessions,
                reaper_started: AtomicBool::new(false),
            }),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &TaskEngineConfig {
        &self.inner.config
    }

    /// Number of non-terminal tasks.
    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Create a task in `working` state.
    ///
    /// Fails with `ResourceExhausted` when the concurrency cap is reached.
    pub fn create(&self, owner: SessionId, params: &TaskParams) -> Result<Arc<TaskEntry>> {
        if let Some(limit) = self.inner.config.max_concurrent {
            if self.running() >= limit {
                return Err(TaskError::ResourceExhausted { limit }.into());
            }
        }
        self.ensure_reaper();

        let now = now_rfc3339();
        let ttl = params
            .ttl
            .or_else(|| u64::try_from(self.inner.config.default_ttl.as_millis()).ok());
        let poll_interval = params.poll_interval.or_else(|| {
            self.inner
                .config
                .default_poll_interval
                .and_then(|d| u64::try_from(d.as_millis()).ok())
        });

        let entry = Arc::new(TaskEntry {
            task: Mutex::new(Task {
                task_id: Uuid::new_v4().to_string(),
                status: TaskStatus::Working,
                status_message: None,
                created_at: now.clone(),
                last_updated_at: now,
                ttl,
                poll_interval,
            }),
            cancel: CancellationToken::new(),
            result: Mutex::new(None),
            completed: AtomicBool::new(false),
            done: Notify::new(),
            owner,
            updated_at: Mutex::new(Instant::now()),
        });

        self.inner.running.fetch_add(1, Ordering::AcqRel);
        self.inner
            .entries
            .lock()
            .insert(entry.snapshot().task_id, entry.clone());
        Ok(entry)
    }

    /// Run a tool future to completion on a dedicated tokio task.
    ///
    /// Cancellation of the entry's token preempts the handler and finalizes
    /// the task as `cancelled`; a handler returning its own cancellation
    /// error finalizes the same way.
    pub fn spawn_execute<F>(&self, entry: Arc<TaskEntry>, fut: F)
    where
        F: Future<Output = Result<CallToolResult>> + Send + 'static,
    {
        let engine = self.clone();
        let cancel = entry.cancel.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                () = cancel.cancelled() => Err(Error::Cancelled),
                outcome = fut => outcome,
            };
            engine.complete(&entry, outcome);
        });
    }

    /// Record a task's outcome. Idempotent: the first call wins, later
    /// calls are no-ops and emit no further notifications.
    pub fn complete(&self, entry: &Arc<TaskEntry>, outcome: Result<CallToolResult>) {
        if entry.completed.swap(true, Ordering::AcqRel) {
            return;
        }

        {
            let mut task = entry.task.lock();
            match &outcome {
                Ok(_) => {
                    task.status = TaskStatus::Completed;
                },
                Err(error) if error.is_cancellation() => {
                    task.status = TaskStatus::Cancelled;
                    task.status_message = Some(error.to_string());
                },
                Err(error) => {
                    task.status = TaskStatus::Failed;
                    task.status_message = Some(error.to_string());
                },
            }
            task.last_updated_at = now_rfc3339();
        }
        *entry.updated_at.lock() = Instant::now();
        *entry.result.lock() = Some(outcome.map_err(|e| e.to_string()));

        self.inner.running.fetch_sub(1, Ordering::AcqRel);
        entry.done.notify_waiters();
        self.notify_status(entry);
    }

    fn notify_status(&self, entry: &Arc<TaskEntry>) {
        let snapshot = entry.snapshot();
        tracing::debug!(
            target: "mcpio::tasks",
            task_id = %snapshot.task_id,
            status = %snapshot.status,
            "task status changed"
        );
        match serde_json::to_value(&snapshot) {
            Ok(params) => self
                .inner
                .sessions
                .broadcast(notifications::TASKS_STATUS, Some(params)),
            Err(error) => {
                tracing::warn!(target: "mcpio::tasks", %error, "cannot serialize task status");
            },
        }
    }

    fn lookup(&self, task_id: &str) -> Result<Arc<TaskEntry>> {
        let entry = self.inner.entries.lock().get(task_id).cloned();
        match entry {
            Some(entry) => {
                if entry.is_expired(Instant::now()) {
                    self.expire(task_id);
                    return Err(TaskError::Expired {
                        task_id: task_id.to_string(),
                    }
                    .into());
                }
                Ok(entry)
            },
            None if self.inner.expired.lock().contains(task_id) => Err(TaskError::Expired {
                task_id: task_id.to_string(),
            }
            .into()),
            None => Err(TaskError::NotFound {
                task_id: task_id.to_string(),
            }
            .into()),
        }
    }

    fn expire(&self, task_id: &str) {
        self.inner.entries.lock().remove(task_id);
        self.inner.expired.lock().insert(task_id.to_string());
    }

    /// `tasks/get`: a snapshot, or a not-found/expired error.
    pub fn get(&self, task_id: &str) -> Result<Task> {
        Ok(self.lookup(task_id)?.snapshot())
    }

    /// `tasks/result`: block until terminal, then surface the outcome.
    ///
    /// Failure and cancellation surface as errors carrying the recorded
    /// status message; success merges the related-task meta key over the
    /// handler's own meta.
    pub async fn wait_result(&self, task_id: &str) -> Result<CallToolResult> {
        let entry = self.lookup(task_id)?;
        loop {
            if entry.completed.load(Ordering::Acquire) {
                break;
            }
            let notified = entry.done.notified();
            // Re-check after arming to close the completion race.
            if entry.completed.load(Ordering::Acquire) {
                break;
            }
            notified.await;
        }

        let stored = entry.result.lock().clone();
        match stored {
            Some(Ok(mut result)) => {
                let mut meta = related_task_meta(task_id);
                if let Some(own) = result.meta.take() {
                    for (key, value) in own {
                        meta.entry(key).or_insert(value);
                    }
                }
                result.meta = Some(meta);
                Ok(result)
            },
            Some(Err(message)) => Err(Error::internal(message)),
            None => Err(Error::internal("task finished without a result")),
        }
    }

    /// `tasks/cancel`: fire the entry's cancellation token.
    ///
    /// The executor is the only status writer; this returns the current
    /// snapshot and the `cancelled` transition follows asynchronously.
    pub fn cancel(&self, task_id: &str) -> Result<Task> {
        let entry = self.lookup(task_id)?;
        let snapshot = entry.snapshot();
        if snapshot.status.is_terminal() {
            return Err(TaskError::InvalidTransition {
                task_id: task_id.to_string(),
                from: snapshot.status,
                to: TaskStatus::Cancelled,
            }
            .into());
        }
        entry.cancel.cancel();
        Ok(snapshot)
    }

    /// `tasks/list`: the owner's tasks in task-id order, paginated.
    pub fn list(&self, owner: &SessionId, cursor: Option<&str>) -> Result<ListTasksResult> {
        let mut tasks: Vec<Task> = self
            .inner
            .entries
            .lock()
            .values()
            .filter(|entry| entry.owner() == owner)
            .map(|entry| entry.snapshot())
            .collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));

        let (tasks, next_cursor) =
            paginate(&tasks, cursor, self.inner.config.list_page_size)?;
        Ok(ListTasksResult { tasks, next_cursor })
    }

    /// Spawn the reaper loop on first use.
    fn ensure_reaper(&self) {
        if self.inner.reaper_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let period = (self.inner.config.default_ttl / 4).max(Duration::from_millis(50));
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let now = Instant::now();
                let reclaimed: Vec<String> = {
                    let entries = inner.entries.lock();
                    entries
                        .iter()
                        .filter(|(_, entry)| entry.is_expired(now))
                        .map(|(id, _)| id.clone())
                        .collect()
                };
                if reclaimed.is_empty() {
                    continue;
                }
                let mut entries = inner.entries.lock();
                let mut expired = inner.expired.lock();
                for id in reclaimed {
                    tracing::debug!(target: "mcpio::tasks", task_id = %id, "reclaiming expired task");
                    entries.remove(&id);
                    expired.insert(id);
                }
            }
        });
    }
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("entries", &self.inner.entries.lock().len())
            .field("running", &self.running())
            .finish()
    }
}
