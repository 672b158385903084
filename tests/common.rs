//! Test utilities for the merging pipeline.
//!
//! Provides synthetic submap folders and an instrumented map store that can
//! slow down loads and counts what the server does with it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use milan::map::{MapHandle, Sensor, Vertex, write_map_folder};
use milan::{
    BasicCommandEngine, FolderMapStore, LinearInterpolator, MapServer, MapStore, Mission, MissionId,
    PoseGraphMap, SaveConfig, SensorKind, ServerConfig, StoreError, Transform3D, Vector3,
};

// ============================================================================
// Synthetic submaps
// ============================================================================

/// Builder for a single-mission submap.
pub struct SubmapBuilder {
    mission: Mission,
}

impl SubmapBuilder {
    /// Mission `id` with an identity lidar and a straight x-axis trajectory:
    /// the body is at `x = (t - first) / 100` for each timestamp `t`.
    pub fn new(id: &str, stamps: &[i64]) -> Self {
        let mut mission = Mission::new(MissionId::new(id));
        let first = stamps.first().copied().unwrap_or(0);
        mission.vertices = stamps
            .iter()
            .map(|&t| Vertex {
                timestamp_ns: t,
                t_m_b: Transform3D::from_translation(Vector3::new(
                    (t - first) as f64 / 100.0,
                    0.0,
                    0.0,
                )),
            })
            .collect();
        let mut builder = Self { mission };
        builder = builder.sensor(SensorKind::Lidar, Transform3D::identity());
        builder
    }

    /// Add or replace a sensor.
    pub fn sensor(mut self, kind: SensorKind, t_b_s: Transform3D) -> Self {
        self.mission.sensors.insert(
            kind,
            Sensor {
                id: format!("{}0", kind),
                t_b_s,
            },
        );
        self
    }

    /// Set the mission base frame.
    pub fn base_frame(mut self, t_g_m: Transform3D) -> Self {
        self.mission.base_frame.t_g_m = t_g_m;
        self
    }

    /// Write the submap into `root/name` and return the folder.
    pub fn write(self, root: &Path, name: &str) -> PathBuf {
        let folder = root.join(name);
        write_map_folder(
            name,
            &PoseGraphMap::with_mission(self.mission),
            &folder,
            &SaveConfig::default(),
        )
        .unwrap();
        folder
    }
}

/// Write a submap folder holding two missions.
pub fn write_two_mission_submap(root: &Path, name: &str) -> PathBuf {
    let mut map = PoseGraphMap::new();
    map.insert_mission(Mission::new(MissionId::new("a")));
    map.insert_mission(Mission::new(MissionId::new("b")));
    let folder = root.join(name);
    write_map_folder(name, &map, &folder, &SaveConfig::default()).unwrap();
    folder
}

/// Sequence number encoded at the end of a submap map key.
pub fn key_id(key: &str) -> u64 {
    key.rsplit('_').next().unwrap().parse().unwrap()
}

// ============================================================================
// Instrumented store
// ============================================================================

/// Map store wrapper recording loads, merges, and saves.
#[derive(Default)]
pub struct InstrumentedStore {
    inner: FolderMapStore,
    load_delays: Mutex<HashMap<PathBuf, Duration>>,
    loading: AtomicUsize,
    peak_loading: AtomicUsize,
    merged_keys: Mutex<Vec<String>>,
    saves: AtomicUsize,
}

impl InstrumentedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make loads of `folder` take at least `delay`.
    pub fn delay_load(&self, folder: &Path, delay: Duration) {
        self.load_delays
            .lock()
            .unwrap()
            .insert(folder.to_path_buf(), delay);
    }

    /// Highest number of loads observed running at once.
    pub fn peak_loading(&self) -> usize {
        self.peak_loading.load(Ordering::SeqCst)
    }

    /// Submap keys in the order they entered the merged map.
    pub fn merged_keys(&self) -> Vec<String> {
        self.merged_keys.lock().unwrap().clone()
    }

    /// Sequence numbers in merge order.
    pub fn merged_ids(&self) -> Vec<u64> {
        self.merged_keys().iter().map(|k| key_id(k)).collect()
    }

    /// Number of saves requested.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl MapStore for InstrumentedStore {
    fn has_map(&self, key: &str) -> bool {
        self.inner.has_map(key)
    }

    fn map_keys(&self) -> Vec<String> {
        self.inner.map_keys()
    }

    fn load_map_from_folder(&self, folder: &Path, key: &str) -> Result<(), StoreError> {
        let now = self.loading.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_loading.fetch_max(now, Ordering::SeqCst);

        let delay = self.load_delays.lock().unwrap().get(folder).copied();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let result = self.inner.load_map_from_folder(folder, key);

        self.loading.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn save_map_to_folder(
        &self,
        key: &str,
        folder: &Path,
        config: &SaveConfig,
    ) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_map_to_folder(key, folder, config)
    }

    fn rename_map(&self, old_key: &str, new_key: &str) -> Result<(), StoreError> {
        self.inner.rename_map(old_key, new_key)?;
        self.merged_keys.lock().unwrap().push(old_key.to_string());
        Ok(())
    }

    fn merge_submap_into_base_map(
        &self,
        base_key: &str,
        submap_key: &str,
    ) -> Result<(), StoreError> {
        self.inner.merge_submap_into_base_map(base_key, submap_key)?;
        self.merged_keys.lock().unwrap().push(submap_key.to_string());
        Ok(())
    }

    fn delete_map(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete_map(key)
    }

    fn map_handle(&self, key: &str) -> Option<MapHandle> {
        self.inner.map_handle(key)
    }
}

// ============================================================================
// Server setup
// ============================================================================

/// Config with fast loops and no backups.
pub fn fast_config(threads: usize) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.pool.submap_loading_threads = threads;
    config.merging.merge_poll_interval_ms = 10;
    config.merging.status_interval_ms = 50;
    config.merging.backup_interval_s = 0.0;
    config
}

/// Started server on top of `store`.
pub fn start_server(config: ServerConfig, store: Arc<InstrumentedStore>) -> MapServer {
    let store: Arc<dyn MapStore> = store;
    let engine = Arc::new(BasicCommandEngine::new(store.clone()));
    let mut server =
        MapServer::new(config, store, engine, Arc::new(LinearInterpolator)).unwrap();
    server.start().unwrap();
    server
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Wait until the queue is empty.
pub fn wait_for_drain(server: &MapServer) -> bool {
    wait_until(Duration::from_secs(10), || server.queued_tasks().is_empty())
}
