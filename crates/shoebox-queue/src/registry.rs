//! In-memory task registry.
//!
//! Maps `jobId → cancellable handle` behind a single-writer guard. Never
//! persisted: at process start it is empty and rebuilt implicitly by
//! `resume_incomplete` scanning the record store. Absence of an entry means
//! no worker owns that id.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use shoebox_models::JobId;

struct TaskHandle {
    generation: u64,
    cancel: watch::Sender<bool>,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryInner {
    tasks: HashMap<JobId, TaskHandle>,
    next_generation: u64,
}

/// Single-writer registry enforcing at most one task per job id.
#[derive(Default)]
pub struct TaskRegistry {
    inner: Mutex<RegistryInner>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task for a job id, cancelling and replacing any existing one.
    ///
    /// The replacement task first awaits the predecessor's handle, so work
    /// for one id is strictly sequential even across a cancel-then-replace:
    /// the old task winds down at its next checkpoint before the new one
    /// touches the job. Returns the task's generation.
    pub async fn spawn<F, Fut>(&self, id: &JobId, make: F) -> u64
    where
        F: FnOnce(watch::Receiver<bool>, u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock().await;

        let predecessor = inner.tasks.remove(id).map(|old| {
            let _ = old.cancel.send(true);
            old.join
        });

        inner.next_generation += 1;
        let generation = inner.next_generation;
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task = make(cancel_rx, generation);
        let join = tokio::spawn(async move {
            if let Some(prev) = predecessor {
                let _ = prev.await;
            }
            task.await;
        });

        inner.tasks.insert(
            id.clone(),
            TaskHandle {
                generation,
                cancel: cancel_tx,
                join,
            },
        );

        generation
    }

    /// Request cooperative cancellation of a job's task. Idempotent.
    ///
    /// The entry stays in the map until the task itself finishes, so a
    /// follow-up spawn for the same id still chains on the winding-down
    /// task.
    pub async fn cancel(&self, id: &JobId) -> bool {
        let inner = self.inner.lock().await;
        match inner.tasks.get(id) {
            Some(handle) => {
                let _ = handle.cancel.send(true);
                true
            }
            None => false,
        }
    }

    /// Remove a finished task's entry, unless it was already replaced.
    pub async fn finish(&self, id: &JobId, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner
            .tasks
            .get(id)
            .is_some_and(|handle| handle.generation == generation)
        {
            inner.tasks.remove(id);
        }
    }

    /// Whether a task currently owns this id.
    pub async fn is_running(&self, id: &JobId) -> bool {
        self.inner.lock().await.tasks.contains_key(id)
    }

    /// Number of registered tasks.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
