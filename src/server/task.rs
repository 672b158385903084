//! Per-submap task record.
//!
//! A task moves through one-way flags:
//!
//! ```text
//! queued ──► loaded ──► processed ──► merged
//!    └──────────┴───────────┴──► failed (quarantined)
//! ```
//!
//! A worker holds the task lock for the whole load/process job. The merge
//! loop and the status reporter only ever `try_lock` it.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

use crate::error::{Result, ServerError};

/// Ingestion sequence number of a submap.
pub type SubmapId = u64;

/// Presentation state of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmapState {
    /// Waiting for a worker.
    QueuedForLoading,
    /// A worker is loading the submap.
    Loading,
    /// Loaded, waiting for processing.
    QueuedForProcessing,
    /// A worker is running submap commands.
    Processing,
    /// Loaded and processed, waiting for the merge loop.
    ReadyToMerge,
    /// The merge loop holds the task.
    Merging,
    /// Merged, about to leave the queue.
    Merged,
    /// Quarantined; will be removed without merging.
    Failed,
    /// Merged but unlocked while still queued. Never expected.
    Inconsistent,
}

impl SubmapState {
    /// Derive the state from the task flags and whether its lock is held.
    pub fn derive(
        loaded: bool,
        processed: bool,
        merged: bool,
        failed: bool,
        locked: bool,
    ) -> Self {
        match (failed, merged, processed, loaded, locked) {
            (true, ..) => SubmapState::Failed,
            (_, true, _, _, true) => SubmapState::Merged,
            (_, true, _, _, false) => SubmapState::Inconsistent,
            (_, _, true, _, true) => SubmapState::Merging,
            (_, _, true, _, false) => SubmapState::ReadyToMerge,
            (_, _, _, true, true) => SubmapState::Processing,
            (_, _, _, true, false) => SubmapState::QueuedForProcessing,
            (_, _, _, false, true) => SubmapState::Loading,
            (_, _, _, false, false) => SubmapState::QueuedForLoading,
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            SubmapState::QueuedForLoading => "queued for loading",
            SubmapState::Loading => "loading...",
            SubmapState::QueuedForProcessing => "queued for processing",
            SubmapState::Processing => "processing...",
            SubmapState::ReadyToMerge => "ready to merge",
            SubmapState::Merging => "merging...",
            SubmapState::Merged => "merged",
            SubmapState::Failed => "failed (quarantined)",
            SubmapState::Inconsistent => "ERROR: merged and unlocked",
        }
    }
}

impl fmt::Display for SubmapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Hash of a submap source path.
pub fn path_hash(path: &Path) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

/// Map store key of a submap: `{robot}_{hash:016x}_{id}`.
///
/// The sequence number keeps keys unique when a path is submitted twice.
pub fn derive_map_key(robot_name: &str, map_hash: u64, id: SubmapId) -> String {
    format!("{}_{:016x}_{}", robot_name, map_hash, id)
}

/// One ingested submap.
pub struct SubmapTask {
    id: SubmapId,
    robot_name: String,
    source_path: PathBuf,
    map_hash: u64,
    map_key: String,
    loaded: AtomicBool,
    processed: AtomicBool,
    merged: AtomicBool,
    failed: AtomicBool,
    lock: Mutex<()>,
}

impl SubmapTask {
    /// Create a queued task.
    pub fn new(
        id: SubmapId,
        robot_name: impl Into<String>,
        source_path: impl Into<PathBuf>,
    ) -> Self {
        let robot_name = robot_name.into();
        let source_path = source_path.into();
        let map_hash = path_hash(&source_path);
        let map_key = derive_map_key(&robot_name, map_hash, id);
        Self {
            id,
            robot_name,
            source_path,
            map_hash,
            map_key,
            loaded: AtomicBool::new(false),
            processed: AtomicBool::new(false),
            merged: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            lock: Mutex::new(()),
        }
    }

    /// Ingestion sequence number.
    pub fn id(&self) -> SubmapId {
        self.id
    }

    /// Robot that produced the submap (may be empty).
    pub fn robot_name(&self) -> &str {
        &self.robot_name
    }

    /// Folder the submap is loaded from.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Hash of the source path.
    pub fn map_hash(&self) -> u64 {
        self.map_hash
    }

    /// Key of the submap in the map store.
    pub fn map_key(&self) -> &str {
        &self.map_key
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn is_merged(&self) -> bool {
        self.merged.load(Ordering::SeqCst)
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Loaded and processed, not quarantined.
    pub fn is_ready_to_merge(&self) -> bool {
        self.is_loaded() && self.is_processed() && !self.is_failed()
    }

    pub(crate) fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::SeqCst);
    }

    /// No-op unless loaded.
    pub(crate) fn mark_processed(&self) {
        if self.is_loaded() {
            self.processed.store(true, Ordering::SeqCst);
        }
    }

    /// No-op unless processed.
    pub(crate) fn mark_merged(&self) {
        if self.is_processed() {
            self.merged.store(true, Ordering::SeqCst);
        }
    }

    pub(crate) fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    /// Block until the task lock is held.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| ServerError::PoisonedTask(self.map_key.clone()))
    }

    /// Take the task lock if nobody holds it.
    ///
    /// `Ok(None)` means the lock is currently held elsewhere.
    pub(crate) fn try_lock(&self) -> Result<Option<MutexGuard<'_, ()>>> {
        match self.lock.try_lock() {
            Ok(guard) => Ok(Some(guard)),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Poisoned(_)) => Err(ServerError::PoisonedTask(self.map_key.clone())),
        }
    }

    /// Current presentation state. Briefly try-locks the task.
    pub fn observe_state(&self) -> SubmapState {
        let locked = match self.try_lock() {
            Ok(Some(_guard)) => false,
            Ok(None) => true,
            Err(_) => return SubmapState::Failed,
        };
        SubmapState::derive(
            self.is_loaded(),
            self.is_processed(),
            self.is_merged(),
            self.is_failed(),
            locked,
        )
    }
}

impl fmt::Debug for SubmapTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmapTask")
            .field("id", &self.id)
            .field("robot_name", &self.robot_name)
            .field("map_key", &self.map_key)
            .field("loaded", &self.is_loaded())
            .field("processed", &self.is_processed())
            .field("merged", &self.is_merged())
            .field("failed", &self.is_failed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_key_is_unique_per_submission() {
        let a = SubmapTask::new(1, "robot", "/data/submap");
        let b = SubmapTask::new(2, "robot", "/data/submap");
        assert_eq!(a.map_hash(), b.map_hash());
        assert_ne!(a.map_key(), b.map_key());
        assert!(a.map_key().starts_with("robot_"));
        assert!(a.map_key().ends_with("_1"));
    }

    #[test]
    fn test_flags_respect_order() {
        let task = SubmapTask::new(0, "r", "/p");
        task.mark_processed();
        task.mark_merged();
        assert!(!task.is_processed());
        assert!(!task.is_merged());

        task.mark_loaded();
        task.mark_processed();
        task.mark_merged();
        assert!(task.is_loaded() && task.is_processed() && task.is_merged());
    }

    #[test]
    fn test_state_derivation() {
        use SubmapState::*;
        let cases = [
            ((false, false, false, false, false), QueuedForLoading),
            ((false, false, false, false, true), Loading),
            ((true, false, false, false, false), QueuedForProcessing),
            ((true, false, false, false, true), Processing),
            ((true, true, false, false, false), ReadyToMerge),
            ((true, true, false, false, true), Merging),
            ((true, true, true, false, true), Merged),
            ((true, true, true, false, false), Inconsistent),
            ((true, false, false, true, false), Failed),
        ];
        for ((l, p, m, f, k), expected) in cases {
            assert_eq!(SubmapState::derive(l, p, m, f, k), expected);
        }
    }

    #[test]
    fn test_observe_state_sees_lock() {
        let task = SubmapTask::new(0, "r", "/p");
        assert_eq!(task.observe_state(), SubmapState::QueuedForLoading);
        let guard = task.lock().unwrap();
        assert_eq!(task.observe_state(), SubmapState::Loading);
        assert!(task.try_lock().unwrap().is_none());
        drop(guard);
        assert!(task.try_lock().unwrap().is_some());
    }
}
