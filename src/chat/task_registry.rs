//! Chat task registry - tracks the in-flight request of each session

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::llm_engine::provider::ChatError;

/// Active chat request
pub struct ChatTask {
    pub session_id: String,
    pub task_id: String,
    pub cancel_token: CancellationToken,
    pub started_at: Instant,
}

/// Registry of active chat tasks (keyed by session_id)
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<String, ChatTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request for `session_id`. Fails with `Busy` while another
    /// request of the same session is registered.
    pub fn begin(&self, session_id: &str) -> Result<TaskGuard, ChatError> {
        match self.tasks.entry(session_id.to_string()) {
            Entry::Occupied(_) => {
                log::warn!("Session {} already has a request in flight", session_id);
                Err(ChatError::Busy(session_id.to_string()))
            }
            Entry::Vacant(slot) => {
                let task_id = uuid::Uuid::new_v4().to_string();
                let cancel_token = CancellationToken::new();
                slot.insert(ChatTask {
                    session_id: session_id.to_string(),
                    task_id: task_id.clone(),
                    cancel_token: cancel_token.clone(),
                    started_at: Instant::now(),
                });
                log::debug!("Registered task {} for session {}", task_id, session_id);

                Ok(TaskGuard {
                    tasks: Arc::clone(&self.tasks),
                    session_id: session_id.to_string(),
                    task_id,
                    cancel_token,
                })
            }
        }
    }

    /// Cancel the session's request. The task stays registered until the
    /// running turn has wound down and dropped its guard.
    pub fn cancel_session(&self, session_id: &str) -> bool {
        match self.tasks.get(session_id) {
            Some(task) => {
                log::info!(
                    "Cancelling task {} for session {} after {:.2?}",
                    task.task_id,
                    session_id,
                    task.started_at.elapsed()
                );
                task.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every active request
    pub fn cancel_all(&self) {
        for task in self.tasks.iter() {
            task.cancel_token.cancel();
        }
    }

    /// Check if there's an active task for a session
    pub fn is_session_processing(&self, session_id: &str) -> bool {
        self.tasks.contains_key(session_id)
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Registration of one request; deregisters on drop
pub struct TaskGuard {
    tasks: Arc<DashMap<String, ChatTask>>,
    session_id: String,
    task_id: String,
    cancel_token: CancellationToken,
}

impl TaskGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.tasks
            .remove_if(&self.session_id, |_, task| task.task_id == self.task_id);
        log::debug!("Task {} for session {} finished", self.task_id, self.session_id);
    }
}
