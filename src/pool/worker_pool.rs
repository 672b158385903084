//! Worker pool implementation.

use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;

/// Exclusivity group identifier.
pub type GroupId = u64;

/// Group whose jobs never exclude each other.
pub const NON_EXCLUSIVE_GROUP: GroupId = GroupId::MAX;

/// Unit of work executed by the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool no longer accepts jobs.
    #[error("Worker pool stopped")]
    Stopped,
}

struct PoolState {
    queue: VecDeque<(GroupId, Job)>,
    /// Exclusive groups with a job currently running.
    running_groups: HashSet<GroupId>,
    /// Workers currently executing a job.
    active: usize,
    /// New submissions are rejected.
    stopped: bool,
    /// Workers exit once the queue is empty.
    exit: bool,
}

impl PoolState {
    /// Take the first job that may run now.
    fn take_runnable(&mut self) -> Option<(GroupId, Job)> {
        let index = self
            .queue
            .iter()
            .position(|(group, _)| {
                *group == NON_EXCLUSIVE_GROUP || !self.running_groups.contains(group)
            })?;
        let (group, job) = self.queue.remove(index)?;
        if group != NON_EXCLUSIVE_GROUP {
            self.running_groups.insert(group);
        }
        self.active += 1;
        Some((group, job))
    }
}

struct Shared {
    state: Mutex<PoolState>,
    /// Signalled when a job is queued or a group is released.
    work_available: Condvar,
    /// Signalled when a job finishes.
    job_done: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Jobs run outside the lock, so a poisoned state is still coherent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-size thread pool with per-group serialization.
pub struct WorkerPool {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn a pool with `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                running_groups: HashSet::new(),
                active: 0,
                stopped: false,
                exit: false,
            }),
            work_available: Condvar::new(),
            job_done: Condvar::new(),
        });

        let mut pool = Self {
            shared,
            threads: Vec::new(),
        };
        for index in 0..num_threads.max(1) {
            let shared = pool.shared.clone();
            let handle = thread::Builder::new()
                .name(format!("pool-worker-{}", index))
                .spawn(move || worker_loop(&shared))?;
            pool.threads.push(handle);
        }
        Ok(pool)
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Number of workers currently executing a job.
    pub fn num_active_workers(&self) -> usize {
        self.shared.lock().active
    }

    /// Number of jobs waiting to run.
    pub fn num_queued_jobs(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Queue `job` in exclusivity group `group`.
    pub fn enqueue_ordered<F>(&self, group: GroupId, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.lock();
        if state.stopped {
            return Err(PoolError::Stopped);
        }
        state.queue.push_back((group, Box::new(job)));
        drop(state);
        self.shared.work_available.notify_one();
        Ok(())
    }

    /// Reject all further submissions. Queued jobs still run.
    pub fn stop(&self) {
        self.shared.lock().stopped = true;
    }

    /// Check if the pool rejects submissions.
    pub fn is_stopped(&self) -> bool {
        self.shared.lock().stopped
    }

    /// Block until no job is queued or running.
    pub fn wait_for_empty_queue(&self) {
        let mut state = self.shared.lock();
        while !state.queue.is_empty() || state.active > 0 {
            state = self
                .shared
                .job_done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.stopped = true;
            state.exit = true;
        }
        self.shared.work_available.notify_all();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::error!("Worker thread panicked outside of a job");
            }
        }
    }
}

fn worker_loop(shared: &Shared) {
    let mut state = shared.lock();
    loop {
        if let Some((group, job)) = state.take_runnable() {
            drop(state);

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                log::error!("Worker job panicked: {}", panic_message(&payload));
            }

            state = shared.lock();
            state.active -= 1;
            if group != NON_EXCLUSIVE_GROUP {
                state.running_groups.remove(&group);
                // A job of this group may now be runnable.
                shared.work_available.notify_all();
            }
            shared.job_done.notify_all();
            continue;
        }

        if state.exit && state.queue.is_empty() {
            return;
        }
        state = shared
            .work_available
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_runs_all_jobs() {
        let pool = WorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let c = counter.clone();
            pool.enqueue_ordered(NON_EXCLUSIVE_GROUP, move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.wait_for_empty_queue();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(pool.num_active_workers(), 0);
    }

    #[test]
    fn test_group_jobs_run_in_order_one_at_a_time() {
        let pool = WorkerPool::new(4).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        for i in 0..10 {
            let order = order.clone();
            let running = running.clone();
            let overlaps = overlaps.clone();
            pool.enqueue_ordered(7, move || {
                if running.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(2));
                order.lock().unwrap().push(i);
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.wait_for_empty_queue();
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_active_workers_bounded() {
        let pool = Arc::new(WorkerPool::new(2).unwrap());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let running = running.clone();
            let peak = peak.clone();
            pool.enqueue_ordered(NON_EXCLUSIVE_GROUP, move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.wait_for_empty_queue();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_stop_rejects_new_jobs() {
        let pool = WorkerPool::new(1).unwrap();
        pool.stop();
        assert!(pool.is_stopped());
        assert_eq!(
            pool.enqueue_ordered(NON_EXCLUSIVE_GROUP, || {}),
            Err(PoolError::Stopped)
        );
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        pool.enqueue_ordered(NON_EXCLUSIVE_GROUP, || panic!("boom"))
            .unwrap();
        let c = counter.clone();
        pool.enqueue_ordered(NON_EXCLUSIVE_GROUP, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.wait_for_empty_queue();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_drains_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(2).unwrap();
            for _ in 0..5 {
                let c = counter.clone();
                pool.enqueue_ordered(NON_EXCLUSIVE_GROUP, move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}
