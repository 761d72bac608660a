//! Task registry for background lease refreshers
//!
//! Every refresher spawned by the alarm storage is tracked here so that it can
//! be counted while alive and aborted on shutdown. Handles are
//! [`AbortHandle`]s: the registry never awaits a task, it only observes and
//! cancels it.
//!
//! # Example
//!
//! ```ignore
//! let registry = TaskRegistry::new();
//! let task = tokio::spawn(async { /* ... */ });
//! registry.register(task.abort_handle()).await;
//!
//! registry.shutdown_all().await;
//! ```

use std::sync::Arc;

use tokio::{sync::Mutex, task::AbortHandle};

/// Registry for tracking and cancelling tasks
///
/// Clones share the same set of handles.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<Vec<AbortHandle>>>,
}

impl TaskRegistry {
    /// Create a new empty task registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task for tracking and cleanup
    pub async fn register(&self, task: AbortHandle) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Number of registered tasks that have not finished yet
    pub async fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .await
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Abort all registered tasks and forget them.
    ///
    /// Returns how many tasks were still running.
    pub async fn shutdown_all(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        let running = tasks.iter().filter(|task| !task.is_finished()).count();
        for task in tasks.drain(..) {
            task.abort();
        }
        drop(tasks);
        running
    }
}
