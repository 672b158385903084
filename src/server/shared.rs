//! State shared between the server facade, worker jobs, and the loops.
//!
//! Every collection sits behind its own short-lived lock; no two of them
//! are ever held at once. The only nesting is a task lock held by its
//! owner while it touches one of these.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::commands::CommandEngine;
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::map::{MapStore, MissionId, TrajectoryInterpolator};
use crate::utils::ShutdownToken;

use super::queue::SubmapQueue;
use super::task::{SubmapId, SubmapTask};

/// Key of the global map in the map store.
pub const MERGED_MAP_KEY: &str = "merged_map";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Guarded sections only touch plain collections and cannot leave them
    // half-updated.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pipeline state shared by all server threads.
pub struct ServerShared {
    /// Server configuration.
    pub config: ServerConfig,
    /// Map storage.
    pub store: Arc<dyn MapStore>,
    /// Processing command engine.
    pub engine: Arc<dyn CommandEngine>,
    /// Trajectory interpolation for lookups.
    pub interpolator: Arc<dyn TrajectoryInterpolator>,
    /// Submaps in arrival order.
    pub queue: SubmapQueue,
    /// One-way shutdown flag.
    pub shutdown: ShutdownToken,
    robot_missions: Mutex<BTreeMap<String, MissionId>>,
    submap_commands: Mutex<BTreeMap<SubmapId, String>>,
    merge_command: Mutex<String>,
    merge_busy: AtomicBool,
    quarantined: Mutex<Vec<String>>,
}

impl ServerShared {
    /// Create shared state around the given collaborators.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn MapStore>,
        engine: Arc<dyn CommandEngine>,
        interpolator: Arc<dyn TrajectoryInterpolator>,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            config,
            store,
            engine,
            interpolator,
            queue: SubmapQueue::new(),
            shutdown,
            robot_missions: Mutex::new(BTreeMap::new()),
            submap_commands: Mutex::new(BTreeMap::new()),
            merge_command: Mutex::new(String::new()),
            merge_busy: AtomicBool::new(false),
            quarantined: Mutex::new(Vec::new()),
        }
    }

    /// Append a task for `source_path`.
    ///
    /// Rejected when the path is empty or shutdown was requested.
    pub fn enqueue(&self, robot_name: &str, source_path: &Path) -> Result<Arc<SubmapTask>> {
        if source_path.as_os_str().is_empty() {
            return Err(ServerError::EmptySourcePath);
        }
        if self.shutdown.is_requested() {
            return Err(ServerError::ShutdownRequested);
        }
        if robot_name.is_empty() {
            log::warn!(
                "Submap at {:?} has no robot name, mission tracking disabled for it",
                source_path
            );
        }
        Ok(self.queue.push(robot_name, source_path))
    }

    /// Mark `task` as failed so the merge loop drops it.
    pub fn quarantine(&self, task: &SubmapTask, reason: &ServerError) {
        log::error!(
            "Quarantining submap '{}' from {:?}: {}",
            task.map_key(),
            task.source_path(),
            reason
        );
        task.mark_failed();
        lock(&self.quarantined).push(task.map_key().to_string());
    }

    /// Map keys of all quarantined submaps.
    pub fn quarantined(&self) -> Vec<String> {
        lock(&self.quarantined).clone()
    }

    /// Mission most recently merged for `robot_name`.
    pub fn robot_mission(&self, robot_name: &str) -> Option<MissionId> {
        lock(&self.robot_missions).get(robot_name).cloned()
    }

    /// Copy of the robot→mission index.
    pub fn robot_missions(&self) -> BTreeMap<String, MissionId> {
        lock(&self.robot_missions).clone()
    }

    /// Only the merge loop writes the index.
    pub(crate) fn record_robot_mission(&self, robot_name: &str, mission: MissionId) {
        lock(&self.robot_missions).insert(robot_name.to_string(), mission);
    }

    /// Publish the command a worker runs for submap `id`.
    pub(crate) fn set_submap_command(&self, id: SubmapId, command: &str) {
        lock(&self.submap_commands).insert(id, command.to_string());
    }

    pub(crate) fn clear_submap_command(&self, id: SubmapId) {
        lock(&self.submap_commands).remove(&id);
    }

    /// Copy of the per-submap command table.
    pub fn submap_commands(&self) -> BTreeMap<SubmapId, String> {
        lock(&self.submap_commands).clone()
    }

    /// Publish the command the merge loop is running.
    pub(crate) fn set_merge_command(&self, command: &str) {
        let mut current = lock(&self.merge_command);
        current.clear();
        current.push_str(command);
    }

    /// Command the merge loop is running (empty when idle).
    pub fn merge_command(&self) -> String {
        lock(&self.merge_command).clone()
    }

    pub(crate) fn set_merge_busy(&self, busy: bool) {
        self.merge_busy.store(busy, Ordering::SeqCst);
    }

    /// Whether the merge loop is inside an iteration.
    pub fn is_merge_busy(&self) -> bool {
        self.merge_busy.load(Ordering::SeqCst)
    }

    /// Whether the global map exists.
    pub fn has_merged_map(&self) -> bool {
        self.store.has_map(MERGED_MAP_KEY)
    }

    /// Save the global map to `folder`.
    pub fn save_merged_map(&self, folder: &Path) -> Result<()> {
        if !self.has_merged_map() {
            return Err(ServerError::NoMergedMap);
        }
        log::info!("Saving merged map to {:?}", folder);
        self.store
            .save_map_to_folder(MERGED_MAP_KEY, folder, &self.config.storage.save_config())?;
        Ok(())
    }

    /// Save the global map to the configured merged map folder.
    pub fn save_merged_map_to_configured(&self) -> Result<()> {
        let folder = self
            .config
            .storage
            .merged_map_path()
            .ok_or(ServerError::NoOutputFolder)?;
        self.save_merged_map(&folder)
    }
}

/// Clears a submap's command table entry when dropped.
pub(crate) struct SubmapCommandMarker<'a> {
    shared: &'a ServerShared,
    id: SubmapId,
}

impl<'a> SubmapCommandMarker<'a> {
    pub(crate) fn new(shared: &'a ServerShared, id: SubmapId) -> Self {
        Self { shared, id }
    }

    pub(crate) fn set(&self, command: &str) {
        self.shared.set_submap_command(self.id, command);
    }
}

impl Drop for SubmapCommandMarker<'_> {
    fn drop(&mut self) {
        self.shared.clear_submap_command(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::BasicCommandEngine;
    use crate::map::{FolderMapStore, LinearInterpolator};

    fn shared() -> ServerShared {
        let store: Arc<dyn MapStore> = Arc::new(FolderMapStore::new());
        ServerShared::new(
            ServerConfig::default(),
            store.clone(),
            Arc::new(BasicCommandEngine::new(store)),
            Arc::new(LinearInterpolator),
            ShutdownToken::new(),
        )
    }

    #[test]
    fn test_enqueue_rejections() {
        let shared = shared();
        assert!(matches!(
            shared.enqueue("r", Path::new("")),
            Err(ServerError::EmptySourcePath)
        ));
        assert!(shared.enqueue("", Path::new("/a")).is_ok());
        shared.shutdown.request();
        assert!(matches!(
            shared.enqueue("r", Path::new("/b")),
            Err(ServerError::ShutdownRequested)
        ));
        assert_eq!(shared.queue.len(), 1);
    }

    #[test]
    fn test_quarantine_marks_task() {
        let shared = shared();
        let task = shared.enqueue("r", Path::new("/a")).unwrap();
        shared.quarantine(&task, &ServerError::DuplicateMapKey(task.map_key().into()));
        assert!(task.is_failed());
        assert_eq!(shared.quarantined(), vec![task.map_key().to_string()]);
    }

    #[test]
    fn test_command_marker_clears_on_drop() {
        let shared = shared();
        {
            let marker = SubmapCommandMarker::new(&shared, 3);
            marker.set("loading");
            assert_eq!(shared.submap_commands().get(&3).map(String::as_str), Some("loading"));
        }
        assert!(shared.submap_commands().is_empty());
    }

    #[test]
    fn test_save_without_merged_map() {
        let shared = shared();
        assert!(matches!(
            shared.save_merged_map(Path::new("/tmp")),
            Err(ServerError::NoMergedMap)
        ));
        assert!(matches!(
            shared.save_merged_map_to_configured(),
            Err(ServerError::NoOutputFolder)
        ));
    }
}
