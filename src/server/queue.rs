//! Ordered processing queue.
//!
//! Tasks are appended at the tail and only the merge loop removes them,
//! always from the head.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::task::{SubmapId, SubmapTask};

/// FIFO of submap tasks in arrival order.
#[derive(Default)]
pub struct SubmapQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    tasks: VecDeque<Arc<SubmapTask>>,
    next_id: SubmapId,
}

impl SubmapQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        // Only plain collection operations run under this lock.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a task with the next sequence number and append it.
    pub fn push(&self, robot_name: &str, source_path: impl Into<PathBuf>) -> Arc<SubmapTask> {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let task = Arc::new(SubmapTask::new(id, robot_name, source_path));
        inner.tasks.push_back(task.clone());
        task
    }

    /// Task at the head.
    pub fn front(&self) -> Option<Arc<SubmapTask>> {
        self.lock().tasks.front().cloned()
    }

    /// Remove the head, but only if it is task `id`.
    pub fn pop_front_if(&self, id: SubmapId) -> Option<Arc<SubmapTask>> {
        let mut inner = self.lock();
        if inner.tasks.front().map(|t| t.id()) == Some(id) {
            inner.tasks.pop_front()
        } else {
            None
        }
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }

    /// Run `f` over the queued tasks while holding the queue lock.
    pub fn with_tasks<R>(&self, f: impl FnOnce(&VecDeque<Arc<SubmapTask>>) -> R) -> R {
        f(&self.lock().tasks)
    }

    /// Copy of the queued task handles.
    pub fn snapshot(&self) -> Vec<Arc<SubmapTask>> {
        self.lock().tasks.iter().cloned().collect()
    }
}
