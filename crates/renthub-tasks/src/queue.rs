//! The deferred task queue.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use renthub_db::Transaction;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{RetryPolicy, TaskError};

/// A task waiting for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask<T> {
    /// Queue-assigned id.
    pub id: u64,
    /// The task payload.
    pub task: T,
    /// Failed deliveries so far.
    pub attempts: u32,
    /// When the task was first enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time of the next delivery.
    pub available_at: DateTime<Utc>,
    /// Error from the most recent failed delivery.
    pub last_error: Option<String>,
}

/// A task that exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter<T> {
    /// Queue-assigned id.
    pub id: u64,
    /// The task payload.
    pub task: T,
    /// Deliveries attempted.
    pub attempts: u32,
    /// Error from the final delivery.
    pub error: String,
    /// When the task was given up on.
    pub failed_at: DateTime<Utc>,
}

/// Serializable queue contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot<T> {
    next_id: u64,
    pending: Vec<QueuedTask<T>>,
    dead: Vec<DeadLetter<T>>,
}

impl<T> Default for QueueSnapshot<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            pending: Vec::new(),
            dead: Vec::new(),
        }
    }
}

/// Outcome of one [`TaskQueue::run_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Tasks delivered successfully.
    pub executed: usize,
    /// Failed deliveries that were re-scheduled.
    pub failed: usize,
    /// Tasks moved to the dead-letter list.
    pub dead_lettered: usize,
}

impl RunReport {
    /// Total deliveries attempted.
    pub fn attempted(&self) -> usize {
        self.executed + self.failed + self.dead_lettered
    }
}

struct QueueState<T> {
    next_id: u64,
    pending: VecDeque<QueuedTask<T>>,
    // Taken by a run pass and not yet finished; snapshots count them as pending.
    in_flight: Vec<QueuedTask<T>>,
    dead: Vec<DeadLetter<T>>,
}

impl<T> QueueState<T> {
    fn finish(&mut self, id: u64) {
        self.in_flight.retain(|t| t.id != id);
    }
}

/// Returns a run pass's unfinished tasks to the pending queue when the
/// pass ends early, e.g. because a handler panicked.
struct InFlightGuard<'a, T> {
    state: &'a Mutex<QueueState<T>>,
    ids: Vec<u64>,
}

impl<T> Drop for InFlightGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        let (unfinished, others): (Vec<_>, Vec<_>) = std::mem::take(&mut state.in_flight)
            .into_iter()
            .partition(|t| self.ids.contains(&t.id));
        state.in_flight = others;
        if unfinished.is_empty() {
            return;
        }
        tracing::warn!(tasks = unfinished.len(), "task run interrupted; re-queueing unfinished tasks");
        for task in unfinished.into_iter().rev() {
            state.pending.push_front(task);
        }
    }
}

/// At-least-once queue of deferred tasks.
///
/// Shared behind an `Arc`; producers enqueue from any thread and a worker
/// drains due tasks with [`TaskQueue::run_pending`].
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    policy: RetryPolicy,
    path: Option<PathBuf>,
}

impl<T> TaskQueue<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    /// Create an empty, non-persistent queue.
    pub fn new(policy: RetryPolicy) -> Self {
        Self::from_snapshot(QueueSnapshot::default(), policy, None)
    }

    /// Open a queue backed by `path`, loading it if the file exists.
    pub fn open(path: impl AsRef<Path>, policy: RetryPolicy) -> Result<Self, TaskError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| TaskError::Persist(format!("{}: {}", path.display(), e)))?;
            serde_json::from_str(&content)?
        } else {
            QueueSnapshot::default()
        };
        Ok(Self::from_snapshot(snapshot, policy, Some(path)))
    }

    fn from_snapshot(snapshot: QueueSnapshot<T>, policy: RetryPolicy, path: Option<PathBuf>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                next_id: snapshot.next_id.max(1),
                pending: snapshot.pending.into(),
                in_flight: Vec::new(),
                dead: snapshot.dead,
            }),
            policy,
            path,
        }
    }

    /// Write the queue to its file, if it has one.
    pub fn flush(&self) -> Result<(), TaskError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(&self.snapshot())?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| TaskError::Persist(format!("{}: {}", parent.display(), e)))?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content)
            .and_then(|_| std::fs::rename(&tmp, path))
            .map_err(|e| TaskError::Persist(format!("{}: {}", path.display(), e)))
    }

    /// Copy of the queue contents.
    ///
    /// Tasks being delivered right now are included as pending, so a
    /// snapshot taken during a run pass still holds them.
    pub fn snapshot(&self) -> QueueSnapshot<T> {
        let state = self.state.lock();
        QueueSnapshot {
            next_id: state.next_id,
            pending: state
                .in_flight
                .iter()
                .chain(state.pending.iter())
                .cloned()
                .collect(),
            dead: state.dead.clone(),
        }
    }

    /// Replace the queue contents.
    pub fn restore(&self, snapshot: QueueSnapshot<T>) {
        let mut state = self.state.lock();
        state.next_id = snapshot.next_id.max(1);
        state.pending = snapshot.pending.into();
        state.in_flight.clear();
        state.dead = snapshot.dead;
    }

    /// The retry policy applied to failing tasks.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Enqueue a task for immediate delivery. Returns its id.
    pub fn enqueue(&self, task: T) -> u64 {
        let now = Utc::now();
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.pending.push_back(QueuedTask {
            id,
            task,
            attempts: 0,
            enqueued_at: now,
            available_at: now,
            last_error: None,
        });
        tracing::debug!(task_id = id, "task enqueued");
        id
    }

    /// Enqueue a task only if `tx` commits.
    pub fn enqueue_transactional(self: &Arc<Self>, tx: &mut Transaction<'_>, task: T) {
        let queue = Arc::clone(self);
        tx.on_commit(move || {
            queue.enqueue(task);
        });
    }

    /// Deliver every task that is due now.
    pub fn run_pending<F, E>(&self, handler: F) -> RunReport
    where
        F: FnMut(&T) -> Result<(), E>,
        E: fmt::Display,
    {
        self.run_pending_at(Utc::now(), handler)
    }

    /// Deliver every task due at `now`.
    ///
    /// Tasks enqueued by the handler itself are not delivered in this pass.
    pub fn run_pending_at<F, E>(&self, now: DateTime<Utc>, mut handler: F) -> RunReport
    where
        F: FnMut(&T) -> Result<(), E>,
        E: fmt::Display,
    {
        let due: Vec<QueuedTask<T>> = {
            let mut state = self.state.lock();
            let (due, waiting): (VecDeque<_>, VecDeque<_>) = state
                .pending
                .drain(..)
                .partition(|t| t.available_at <= now);
            state.pending = waiting;
            state.in_flight.extend(due.iter().cloned());
            due.into()
        };
        let _guard = InFlightGuard {
            state: &self.state,
            ids: due.iter().map(|t| t.id).collect(),
        };

        let mut report = RunReport::default();
        for mut queued in due {
            let result = handler(&queued.task);
            let mut state = self.state.lock();
            state.finish(queued.id);
            match result {
                Ok(()) => {
                    report.executed += 1;
                }
                Err(e) => {
                    queued.attempts += 1;
                    let message = e.to_string();

                    if self.policy.should_retry(queued.attempts) {
                        let delay = self.policy.backoff.delay_after(queued.attempts);
                        tracing::warn!(
                            task_id = queued.id,
                            attempts = queued.attempts,
                            error = %message,
                            "task failed, re-scheduling"
                        );
                        queued.available_at = now
                            + chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::zero());
                        queued.last_error = Some(message);
                        state.pending.push_back(queued);
                        report.failed += 1;
                    } else {
                        tracing::error!(
                            task_id = queued.id,
                            attempts = queued.attempts,
                            error = %message,
                            "task dead-lettered"
                        );
                        state.dead.push(DeadLetter {
                            id: queued.id,
                            task: queued.task,
                            attempts: queued.attempts,
                            error: message,
                            failed_at: now,
                        });
                        report.dead_lettered += 1;
                    }
                }
            }
        }

        if report.attempted() > 0 {
            tracing::info!(
                executed = report.executed,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                "task run finished"
            );
        }
        report
    }

    /// Put a dead-lettered task back on the queue with a fresh budget.
    pub fn retry_dead(&self, id: u64) -> Result<(), TaskError> {
        let mut state = self.state.lock();
        let position = state
            .dead
            .iter()
            .position(|d| d.id == id)
            .ok_or(TaskError::UnknownTask(id))?;
        let dead = state.dead.remove(position);
        let now = Utc::now();
        state.pending.push_back(QueuedTask {
            id: dead.id,
            task: dead.task,
            attempts: 0,
            enqueued_at: now,
            available_at: now,
            last_error: Some(dead.error),
        });
        Ok(())
    }

    /// Tasks waiting for delivery.
    pub fn pending(&self) -> Vec<QueuedTask<T>> {
        self.state.lock().pending.iter().cloned().collect()
    }

    /// Tasks that exhausted their retries.
    pub fn dead_letters(&self) -> Vec<DeadLetter<T>> {
        self.state.lock().dead.clone()
    }

    /// Number of tasks being delivered by a run pass right now.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Number of tasks waiting for delivery.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether no tasks are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TaskQueue")
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .field("dead", &state.dead.len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackoffStrategy;
    use renthub_db::{Db, TransactionOptions};
    use std::time::Duration;

    fn queue(max_attempts: u32) -> TaskQueue<String> {
        TaskQueue::new(RetryPolicy::new(max_attempts).with_backoff(BackoffStrategy::Fixed(
            Duration::from_secs(10),
        )))
    }

    #[test]
    fn test_enqueue_and_run() {
        let q = queue(3);
        q.enqueue("a".to_string());
        q.enqueue("b".to_string());

        let mut seen = Vec::new();
        let report = q.run_pending(|t: &String| {
            seen.push(t.clone());
            Ok::<_, String>(())
        });

        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(report.executed, 2);
        assert!(q.is_empty());
    }

    #[test]
    fn test_failed_task_waits_for_backoff() {
        let q = queue(3);
        q.enqueue("flaky".to_string());
        let now = Utc::now();

        let report = q.run_pending_at(now, |_| Err("boom"));
        assert_eq!(report.failed, 1);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pending()[0].last_error.as_deref(), Some("boom"));

        // Not due yet.
        let report = q.run_pending_at(now, |_| Ok::<_, String>(()));
        assert_eq!(report.attempted(), 0);

        let later = now + chrono::Duration::seconds(11);
        let report = q.run_pending_at(later, |_| Ok::<_, String>(()));
        assert_eq!(report.executed, 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_dead_letter_after_max_attempts() {
        let q = TaskQueue::new(RetryPolicy::new(2).with_backoff(BackoffStrategy::None));
        let id = q.enqueue("doomed".to_string());
        let now = Utc::now();

        assert_eq!(q.run_pending_at(now, |_| Err("no")).failed, 1);
        assert_eq!(q.run_pending_at(now, |_| Err("no")).dead_lettered, 1);
        assert!(q.is_empty());

        let dead = q.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);

        q.retry_dead(id).unwrap();
        assert!(q.dead_letters().is_empty());
        assert_eq!(q.len(), 1);
        assert!(matches!(q.retry_dead(99), Err(TaskError::UnknownTask(99))));
    }

    #[test]
    fn test_transactional_enqueue_only_on_commit() {
        let db = Db::in_memory();
        let q = Arc::new(queue(3));

        let mut tx = db.begin(TransactionOptions::single_group());
        q.enqueue_transactional(&mut tx, "rolled back".to_string());
        tx.rollback();
        assert!(q.is_empty());

        let mut tx = db.begin(TransactionOptions::single_group());
        q.enqueue_transactional(&mut tx, "committed".to_string());
        db.commit(tx).unwrap();
        assert_eq!(q.pending()[0].task, "committed");
    }

    #[test]
    fn test_handler_may_enqueue() {
        let q = queue(3);
        q.enqueue("parent".to_string());
        let report = q.run_pending(|t: &String| {
            if t == "parent" {
                q.enqueue("child".to_string());
            }
            Ok::<_, String>(())
        });
        assert_eq!(report.executed, 1);
        assert_eq!(q.pending()[0].task, "child");
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");

        let q: TaskQueue<String> = TaskQueue::open(&path, RetryPolicy::default()).unwrap();
        q.enqueue("a".to_string());
        q.flush().unwrap();

        let reopened: TaskQueue<String> = TaskQueue::open(&path, RetryPolicy::default()).unwrap();
        assert_eq!(reopened.len(), 1);
        let next = reopened.enqueue("b".to_string());
        assert_eq!(next, 2);
    }

    #[test]
    fn test_snapshot_during_run_keeps_in_flight_tasks() {
        let q = queue(3);
        q.enqueue("a".to_string());
        q.enqueue("b".to_string());

        let mut seen = Vec::new();
        q.run_pending(|t: &String| {
            let snapshot = q.snapshot();
            seen.push(snapshot.pending.len());
            assert!(snapshot.pending.iter().any(|p| &p.task == t));
            assert_eq!(q.len(), 0);
            Ok::<_, String>(())
        });

        // The second task is still in flight while the first runs.
        assert_eq!(seen, vec![2, 1]);
        assert_eq!(q.in_flight(), 0);
        assert!(q.snapshot().pending.is_empty());
    }

    #[test]
    fn test_handler_panic_requeues_unfinished_tasks() {
        let q = queue(3);
        q.enqueue("ok".to_string());
        q.enqueue("panics".to_string());
        q.enqueue("never reached".to_string());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            q.run_pending(|t: &String| {
                if t == "panics" {
                    panic!("handler crashed");
                }
                Ok::<_, String>(())
            })
        }));
        assert!(result.is_err());

        let pending: Vec<String> = q.pending().into_iter().map(|t| t.task).collect();
        assert_eq!(pending, vec!["panics", "never reached"]);
        assert_eq!(q.in_flight(), 0);

        let report = q.run_pending(|_| Ok::<_, String>(()));
        assert_eq!(report.executed, 2);
    }
}
