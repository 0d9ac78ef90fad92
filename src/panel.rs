//! Queued front end over a [`ServerController`].
//!
//! Mutating operations (select, start, stop) run on the [`ActionQueue`] so
//! that requests from different users never reach the console concurrently
//! or back to back. Status reads bypass the queue.

use crate::error::Result;
use crate::queue::{ActionKind, ActionQueue, Requester};
use crate::status::{ServerState, StatusReport};
use crate::{ServerController, ServerSelection};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared controller plus the queue that serializes its actions.
#[derive(Clone)]
pub struct ControlPanel {
    controller: Arc<Mutex<ServerController>>,
    queue: ActionQueue,
}

impl ControlPanel {
    /// Wrap a controller, using its configured queue cooldown.
    pub fn new(controller: ServerController) -> Self {
        let queue = ActionQueue::new(controller.config().timing.queue_cooldown());
        Self::with_queue(controller, queue)
    }

    pub fn with_queue(controller: ServerController, queue: ActionQueue) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
            queue,
        }
    }

    pub fn controller(&self) -> Arc<Mutex<ServerController>> {
        self.controller.clone()
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    /// Select a server, falling back to the first one when `name` is unknown.
    pub async fn select(&self, requester: Requester, name: Option<String>) -> Result<ServerSelection> {
        let controller = self.controller.clone();
        self.queue
            .submit(ActionKind::Select, requester, move || async move {
                let mut controller = controller.lock().await;
                let result = controller.select_server_or_default(name.as_deref()).await;
                relogin_on_failure(&mut controller, result).await
            })
            .await
    }

    /// Start the selected server.
    pub async fn start(&self, requester: Requester) -> Result<bool> {
        let controller = self.controller.clone();
        self.queue
            .submit(ActionKind::Start, requester, move || async move {
                let mut controller = controller.lock().await;
                let result = controller.start().await;
                relogin_on_failure(&mut controller, result).await
            })
            .await
    }

    /// Stop the selected server.
    pub async fn stop(&self, requester: Requester) -> Result<bool> {
        let controller = self.controller.clone();
        self.queue
            .submit(ActionKind::Stop, requester, move || async move {
                let mut controller = controller.lock().await;
                let result = controller.stop().await;
                relogin_on_failure(&mut controller, result).await
            })
            .await
    }

    /// Current state of the selected server.
    pub async fn status(&self) -> Result<ServerState> {
        let mut controller = self.controller.lock().await;
        let result = controller.get_status().await;
        relogin_on_failure(&mut controller, result).await
    }

    /// State plus address, players and queue details.
    pub async fn status_report(&self) -> Result<StatusReport> {
        let mut controller = self.controller.lock().await;
        let result = controller.status_report().await;
        relogin_on_failure(&mut controller, result).await
    }
}

// Returns `result` unchanged. A successful re-login only affects later requests.
async fn relogin_on_failure<T>(controller: &mut ServerController, result: Result<T>) -> Result<T> {
    if let Err(error) = &result {
        if error.requires_reauthentication() {
            match controller.recover(error).await {
                Ok(_) => tracing::info!("Re-login after failure succeeded"),
                Err(e) => tracing::warn!(error = %e, "Re-login after failure failed"),
            }
        }
    }
    result
}
