//! Single-flight action queue.
//!
//! Requests from the front end (select, start, stop) are appended to one
//! FIFO and executed by a single drain task, one at a time, with a fixed
//! cooldown after each action. The drain task is started by the first
//! enqueue and exits once the queue runs dry.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use uuid::Uuid;

/// Number of finished actions kept in the history.
pub const HISTORY_LIMIT: usize = 1000;

/// Kind of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Select,
    Start,
    Stop,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Select => write!(f, "select"),
            ActionKind::Start => write!(f, "start"),
            ActionKind::Stop => write!(f, "stop"),
        }
    }
}

/// Who asked for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub guild_id: u64,
    pub user_id: u64,
}

impl Requester {
    pub fn new(guild_id: u64, user_id: u64) -> Self {
        Self { guild_id, user_id }
    }
}

/// How an action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Success,
    Failure,
}

/// An action and its lifecycle timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    pub id: Uuid,
    pub kind: ActionKind,
    pub requester: Requester,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<ActionOutcome>,
    pub error: Option<String>,
}

impl QueuedAction {
    fn new(kind: ActionKind, requester: Requester) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            requester,
            enqueued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            outcome: None,
            error: None,
        }
    }
}

type Job = BoxFuture<'static, std::result::Result<(), String>>;

struct Entry {
    action: QueuedAction,
    job: Option<Job>,
    done: oneshot::Sender<QueuedAction>,
}

/// Handle to an enqueued action.
#[derive(Debug)]
pub struct ActionTicket {
    id: Uuid,
    receiver: oneshot::Receiver<QueuedAction>,
}

impl ActionTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait until the action has run and return its final record.
    pub async fn completed(self) -> Result<QueuedAction> {
        self.receiver
            .await
            .map_err(|_| Error::Queue(format!("Action {} was dropped", self.id)))
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Entry>,
    draining: bool,
    history: VecDeque<QueuedAction>,
}

struct Inner {
    state: Mutex<QueueState>,
    idle: Notify,
    cooldown: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock leaves the state consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Process-wide FIFO of actions with a single consumer.
///
/// Cloning is cheap; clones share the same queue.
///
/// # Example
///
/// ```no_run
/// use aternos_controller::queue::{ActionKind, ActionQueue, Requester};
/// use std::time::Duration;
///
/// # async fn example() -> aternos_controller::Result<()> {
/// let queue = ActionQueue::new(Duration::from_secs(5));
/// let answer = queue
///     .submit(ActionKind::Start, Requester::new(1, 2), || async { Ok(42) })
///     .await?;
/// assert_eq!(answer, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ActionQueue {
    inner: Arc<Inner>,
}

impl ActionQueue {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
                cooldown,
            }),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.inner.cooldown
    }

    /// Append a marker action with no side effect of its own.
    pub fn enqueue(&self, kind: ActionKind, requester: Requester) -> Result<ActionTicket> {
        self.push(kind, requester, None)
    }

    /// Append `job` and wait for its result.
    ///
    /// The job runs on the drain task once every earlier action and its
    /// cooldown are over.
    pub async fn submit<F, Fut, T>(&self, kind: ActionKind, requester: Requester, job: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let wrapped = async move {
            let result = job().await;
            let summary = result.as_ref().map(|_| ()).map_err(|e| e.to_string());
            let _ = sender.send(result);
            summary
        }
        .boxed();

        let ticket = self.push(kind, requester, Some(wrapped))?;
        let id = ticket.id();

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(Error::Queue(format!("Action {} did not complete", id))),
        }
    }

    fn push(&self, kind: ActionKind, requester: Requester, job: Option<Job>) -> Result<ActionTicket> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Queue(format!("No async runtime available: {}", e)))?;

        let action = QueuedAction::new(kind, requester);
        let id = action.id;
        let (done, receiver) = oneshot::channel();

        let start_drain = {
            let mut state = self.inner.lock();
            state.pending.push_back(Entry { action, job, done });
            tracing::info!(
                action_id = %id,
                %kind,
                guild_id = requester.guild_id,
                user_id = requester.user_id,
                pending = state.pending.len(),
                "Added action to queue"
            );
            !std::mem::replace(&mut state.draining, true)
        };

        if start_drain {
            runtime.spawn(drain(self.inner.clone()));
        }

        Ok(ActionTicket { id, receiver })
    }

    /// Number of actions waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether the drain task is running (an action or its cooldown).
    pub fn is_draining(&self) -> bool {
        self.inner.lock().draining
    }

    /// Finished actions, oldest first.
    pub fn history(&self) -> Vec<QueuedAction> {
        self.inner.lock().history.iter().cloned().collect()
    }

    /// Wait until the queue is empty and the drain task has exited.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_draining() {
                return;
            }
            notified.await;
        }
    }
}

async fn drain(inner: Arc<Inner>) {
    loop {
        let entry = {
            let mut state = inner.lock();
            match state.pending.pop_front() {
                Some(entry) => entry,
                None => {
                    state.draining = false;
                    drop(state);
                    tracing::info!("Queue processing completed");
                    inner.idle.notify_waiters();
                    return;
                }
            }
        };

        let Entry {
            mut action,
            job,
            done,
        } = entry;
        action.started_at = Some(Utc::now());
        tracing::info!(
            action_id = %action.id,
            kind = %action.kind,
            guild_id = action.requester.guild_id,
            user_id = action.requester.user_id,
            "Processing action"
        );

        let result = match job {
            Some(job) => AssertUnwindSafe(job)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(panic_message(panic))),
            None => Ok(()),
        };

        let completed_at = Utc::now();
        action.completed_at = Some(completed_at);
        match result {
            Ok(()) => {
                action.outcome = Some(ActionOutcome::Success);
                let elapsed = completed_at - action.enqueued_at;
                tracing::info!(
                    action_id = %action.id,
                    elapsed_ms = elapsed.num_milliseconds(),
                    "Action completed"
                );
            }
            Err(error) => {
                tracing::error!(action_id = %action.id, %error, "Action failed");
                action.outcome = Some(ActionOutcome::Failure);
                action.error = Some(error);
            }
        }

        {
            let mut state = inner.lock();
            state.history.push_back(action.clone());
            if state.history.len() > HISTORY_LIMIT {
                state.history.pop_front();
            }
        }
        let _ = done.send(action);

        tokio::time::sleep(inner.cooldown).await;
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Action panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_marker_action_completes() {
        let queue = ActionQueue::new(Duration::ZERO);

        let ticket = queue.enqueue(ActionKind::Select, Requester::new(1, 2)).unwrap();
        let action = ticket.completed().await.unwrap();

        assert_eq!(action.kind, ActionKind::Select);
        assert_eq!(action.outcome, Some(ActionOutcome::Success));
        assert!(action.started_at.is_some());
        assert!(action.completed_at >= action.started_at);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_when_empty() {
        let queue = ActionQueue::new(Duration::from_millis(10));
        queue.enqueue(ActionKind::Stop, Requester::new(1, 2)).unwrap();

        queue.wait_idle().await;

        assert!(!queue.is_draining());
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.history().len(), 1);
    }

    #[test]
    fn test_enqueue_outside_runtime_fails() {
        let queue = ActionQueue::new(Duration::ZERO);

        let result = queue.enqueue(ActionKind::Start, Requester::new(1, 2));

        assert!(matches!(result, Err(Error::Queue(_))));
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_panic_message() {
        let message = panic_message(Box::new("boom"));
        assert_eq!(message, "Action panicked: boom");
    }
}
