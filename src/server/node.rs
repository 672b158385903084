//! Map merging server facade.
//!
//! Owns the worker pool, the merge thread, and the status thread, and
//! exposes ingestion, lookup, saving, and status to callers.
//!
//! # Teardown
//!
//! ```text
//! request shutdown ─► join merge thread ─► stop + drain pool ─► join status thread
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::commands::{BasicCommandEngine, CommandEngine};
use crate::config::ServerConfig;
use crate::core::types::Vector3;
use crate::error::{Result, ServerError};
use crate::map::{FolderMapStore, LinearInterpolator, MapStore, SensorKind, TrajectoryInterpolator};
use crate::pool::{NON_EXCLUSIVE_GROUP, WorkerPool};
use crate::utils::ShutdownToken;

use super::ingest::run_submap_job;
use super::lookup::{LookupError, MapLookup, map_lookup};
use super::merge_thread::MergeThread;
use super::shared::ServerShared;
use super::status_thread::{StatusSnapshot, StatusThread};
use super::task::{SubmapId, SubmapTask};

/// Multi-robot submap merging server.
pub struct MapServer {
    shared: Arc<ServerShared>,
    pool: Arc<WorkerPool>,
    merge_thread: Option<MergeThread>,
    status_thread: Option<StatusThread>,
    started: bool,
}

impl MapServer {
    /// Create a server around explicit collaborators.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn MapStore>,
        engine: Arc<dyn CommandEngine>,
        interpolator: Arc<dyn TrajectoryInterpolator>,
    ) -> Result<Self> {
        Self::with_shutdown_token(config, store, engine, interpolator, ShutdownToken::new())
    }

    /// Create a server that shuts down when `shutdown` is requested.
    pub fn with_shutdown_token(
        config: ServerConfig,
        store: Arc<dyn MapStore>,
        engine: Arc<dyn CommandEngine>,
        interpolator: Arc<dyn TrajectoryInterpolator>,
        shutdown: ShutdownToken,
    ) -> Result<Self> {
        let config = config.sanitized();
        let pool = Arc::new(WorkerPool::new(config.pool.submap_loading_threads)?);
        let shared = Arc::new(ServerShared::new(
            config,
            store,
            engine,
            interpolator,
            shutdown,
        ));
        Ok(Self {
            shared,
            pool,
            merge_thread: None,
            status_thread: None,
            started: false,
        })
    }

    /// Create a server with the folder store, basic command engine, and
    /// linear interpolator.
    pub fn from_config(config: ServerConfig, shutdown: ShutdownToken) -> Result<Self> {
        let store: Arc<dyn MapStore> = match config.storage.resource_path() {
            Some(folder) => Arc::new(FolderMapStore::with_resource_folder(folder)),
            None => Arc::new(FolderMapStore::new()),
        };
        let engine = Arc::new(BasicCommandEngine::new(store.clone()));
        Self::with_shutdown_token(
            config,
            store,
            engine,
            Arc::new(LinearInterpolator),
            shutdown,
        )
    }

    /// Launch the merge and status threads.
    pub fn start(&mut self) -> Result<()> {
        if self.shared.shutdown.is_requested() {
            log::error!("Cannot start server, a shutdown has already been requested");
            return Err(ServerError::ShutdownRequested);
        }
        if self.started {
            return Err(ServerError::AlreadyStarted);
        }

        log::info!("Launching merge thread...");
        self.merge_thread = Some(MergeThread::spawn(self.shared.clone())?);
        log::info!("Launching status thread...");
        self.status_thread = Some(StatusThread::spawn(
            self.shared.clone(),
            self.pool.clone(),
        )?);
        self.started = true;
        log::info!(
            "Server started ({} submap loading threads)",
            self.pool.num_threads()
        );
        Ok(())
    }

    /// Whether `start()` succeeded and teardown has not run.
    pub fn is_running(&self) -> bool {
        self.started && self.merge_thread.is_some()
    }

    /// Stop all threads. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shared.shutdown.request() {
            log::info!("Shutting down...");
        }

        if let Some(merge_thread) = self.merge_thread.take() {
            log::info!("Stopping merge thread...");
            if merge_thread.join().is_err() {
                log::error!("Merge thread panicked");
            }
        }

        if !self.pool.is_stopped() {
            log::info!("Stopping submap processing threads...");
            self.pool.stop();
            self.pool.wait_for_empty_queue();
        }

        if let Some(status_thread) = self.status_thread.take() {
            log::info!("Stopping status thread...");
            if status_thread.join().is_err() {
                log::error!("Status thread panicked");
            }
        }
    }

    /// Queue a submap for loading, processing, and merging.
    pub fn submit(&self, robot_name: &str, source_path: impl AsRef<Path>) -> Result<SubmapId> {
        let source_path = source_path.as_ref();
        let task = self.shared.enqueue(robot_name, source_path)?;
        log::info!("Queued submap '{}' from {:?}", task.map_key(), source_path);

        let job_shared = self.shared.clone();
        let job_task = task.clone();
        if self
            .pool
            .enqueue_ordered(NON_EXCLUSIVE_GROUP, move || {
                run_submap_job(job_shared, job_task)
            })
            .is_err()
        {
            let e = ServerError::PoolStopped(task.map_key().to_string());
            self.shared.quarantine(&task, &e);
            return Err(e);
        }
        Ok(task.id())
    }

    /// Express `p_s` in the global frame.
    pub fn map_lookup(
        &self,
        robot_name: &str,
        sensor: SensorKind,
        timestamp_ns: i64,
        p_s: &Vector3,
    ) -> std::result::Result<MapLookup, LookupError> {
        map_lookup(&self.shared, robot_name, sensor, timestamp_ns, p_s)
    }

    /// Save the merged map to the configured folder.
    pub fn save_map(&self) -> Result<()> {
        self.shared.save_merged_map_to_configured()
    }

    /// Save the merged map to `folder`.
    pub fn save_map_to(&self, folder: impl AsRef<Path>) -> Result<()> {
        self.shared.save_merged_map(folder.as_ref())
    }

    /// Current pipeline status.
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot::capture(&self.shared, &self.pool)
    }

    /// Submaps still queued, head first.
    pub fn queued_tasks(&self) -> Vec<Arc<SubmapTask>> {
        self.shared.queue.snapshot()
    }

    /// Shutdown token shared by all server threads.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shared.shutdown.clone()
    }

    /// Map store used by the server.
    pub fn store(&self) -> Arc<dyn MapStore> {
        self.shared.store.clone()
    }

    /// Whether the merged map exists.
    pub fn has_merged_map(&self) -> bool {
        self.shared.has_merged_map()
    }
}

impl Drop for MapServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
