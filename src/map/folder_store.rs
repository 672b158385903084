//! In-memory map store backed by map folders on disk.
//!
//! ## Folder Format
//!
//! A map folder contains:
//! - `map.yaml` - the serialized [`PoseGraphMap`]
//! - `resources/` - optional resource files (images, point clouds)
//!
//! When a resource folder is configured, resources of a loaded submap are
//! copied into `{resource_folder}/{map_key}/` so they outlive the submap
//! folder.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::model::PoseGraphMap;
use super::store::{MapHandle, MapStore, SaveConfig, StoreError};

/// File name of the serialized map inside a map folder.
pub const MAP_FILE_NAME: &str = "map.yaml";

/// Name of the optional resource subfolder.
pub const RESOURCE_DIR_NAME: &str = "resources";

/// Map store keeping maps in memory and reading/writing map folders.
pub struct FolderMapStore {
    /// Maps by key.
    maps: RwLock<HashMap<String, MapHandle>>,
    /// Where resources of loaded maps are collected (None = leave in place).
    resource_folder: Option<PathBuf>,
}

impl FolderMapStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            maps: RwLock::new(HashMap::new()),
            resource_folder: None,
        }
    }

    /// Create an empty store that collects submap resources in `folder`.
    pub fn with_resource_folder(folder: impl Into<PathBuf>) -> Self {
        Self {
            maps: RwLock::new(HashMap::new()),
            resource_folder: Some(folder.into()),
        }
    }

    /// Insert an in-memory map directly.
    pub fn insert_map(&self, key: &str, map: PoseGraphMap) -> Result<(), StoreError> {
        let mut maps = self.write_maps()?;
        if maps.contains_key(key) {
            return Err(StoreError::MapExists(key.to_string()));
        }
        maps.insert(key.to_string(), Arc::new(RwLock::new(map)));
        Ok(())
    }

    /// Number of maps held.
    pub fn len(&self) -> usize {
        self.maps.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_maps(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, MapHandle>>, StoreError> {
        self.maps
            .read()
            .map_err(|_| StoreError::Poisoned("map table".to_string()))
    }

    fn write_maps(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, MapHandle>>, StoreError> {
        self.maps
            .write()
            .map_err(|_| StoreError::Poisoned("map table".to_string()))
    }

    fn copy_resources(&self, folder: &Path, key: &str) -> Result<usize, StoreError> {
        let Some(resource_folder) = &self.resource_folder else {
            return Ok(0);
        };
        let source = folder.join(RESOURCE_DIR_NAME);
        if !source.is_dir() {
            return Ok(0);
        }

        let target = resource_folder.join(key);
        fs::create_dir_all(&target).map_err(|e| StoreError::io(&target, e))?;

        let mut copied = 0;
        let entries = fs::read_dir(&source).map_err(|e| StoreError::io(&source, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                let dest = target.join(entry.file_name());
                fs::copy(&path, &dest).map_err(|e| StoreError::io(&path, e))?;
                copied += 1;
            }
        }
        Ok(copied)
    }
}

impl Default for FolderMapStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a map folder without inserting it anywhere.
pub fn read_map_folder(folder: &Path) -> Result<PoseGraphMap, StoreError> {
    let path = folder.join(MAP_FILE_NAME);
    let content = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
    serde_yaml::from_str(&content).map_err(|e| StoreError::Parse {
        path,
        message: e.to_string(),
    })
}

/// Write a map into a folder, replacing `map.yaml` atomically.
pub fn write_map_folder(
    key: &str,
    map: &PoseGraphMap,
    folder: &Path,
    config: &SaveConfig,
) -> Result<(), StoreError> {
    let path = folder.join(MAP_FILE_NAME);
    if path.exists() && !config.overwrite_existing {
        return Err(StoreError::FolderExists(folder.to_path_buf()));
    }
    fs::create_dir_all(folder).map_err(|e| StoreError::io(folder, e))?;

    let tmp_path = folder.join(format!("{}.tmp", MAP_FILE_NAME));
    {
        let file = File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "# Pose graph map '{}'", key).map_err(|e| StoreError::io(&tmp_path, e))?;
        writeln!(
            writer,
            "# {} missions, {} vertices",
            map.num_missions(),
            map.num_vertices()
        )
        .map_err(|e| StoreError::io(&tmp_path, e))?;
        serde_yaml::to_writer(&mut writer, map).map_err(|e| StoreError::Serialize {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        writer.flush().map_err(|e| StoreError::io(&tmp_path, e))?;
    }
    fs::rename(&tmp_path, &path).map_err(|e| StoreError::io(&path, e))
}

impl MapStore for FolderMapStore {
    fn has_map(&self, key: &str) -> bool {
        self.maps
            .read()
            .map(|m| m.contains_key(key))
            .unwrap_or(false)
    }

    fn map_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .maps
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn load_map_from_folder(&self, folder: &Path, key: &str) -> Result<(), StoreError> {
        if self.has_map(key) {
            return Err(StoreError::MapExists(key.to_string()));
        }

        let mut map = read_map_folder(folder)?;
        // Interpolation relies on time-ordered vertices.
        let dropped: usize = map.missions.values_mut().map(|m| m.sort_vertices()).sum();
        if dropped > 0 {
            log::warn!(
                "Map '{}': dropped {} duplicate vertex timestamps",
                key,
                dropped
            );
        }
        let copied = self.copy_resources(folder, key)?;

        log::debug!(
            "Loaded map '{}' from {:?} ({} missions, {} vertices, {} resources)",
            key,
            folder,
            map.num_missions(),
            map.num_vertices(),
            copied
        );
        self.insert_map(key, map)
    }

    fn save_map_to_folder(
        &self,
        key: &str,
        folder: &Path,
        config: &SaveConfig,
    ) -> Result<(), StoreError> {
        let handle = self
            .map_handle(key)
            .ok_or_else(|| StoreError::MapNotFound(key.to_string()))?;
        let map = handle
            .read()
            .map_err(|_| StoreError::Poisoned(key.to_string()))?;
        write_map_folder(key, &map, folder, config)?;
        log::debug!("Saved map '{}' to {:?}", key, folder);
        Ok(())
    }

    fn rename_map(&self, old_key: &str, new_key: &str) -> Result<(), StoreError> {
        let mut maps = self.write_maps()?;
        if maps.contains_key(new_key) {
            return Err(StoreError::MapExists(new_key.to_string()));
        }
        let handle = maps
            .remove(old_key)
            .ok_or_else(|| StoreError::MapNotFound(old_key.to_string()))?;
        maps.insert(new_key.to_string(), handle);
        Ok(())
    }

    fn merge_submap_into_base_map(
        &self,
        base_key: &str,
        submap_key: &str,
    ) -> Result<(), StoreError> {
        let (base, submap) = {
            let maps = self.read_maps()?;
            let base = maps
                .get(base_key)
                .cloned()
                .ok_or_else(|| StoreError::MapNotFound(base_key.to_string()))?;
            let submap = maps
                .get(submap_key)
                .cloned()
                .ok_or_else(|| StoreError::MapNotFound(submap_key.to_string()))?;
            (base, submap)
        };

        let submap_content = submap
            .read()
            .map_err(|_| StoreError::Poisoned(submap_key.to_string()))?
            .clone();
        let mut base_map = base
            .write()
            .map_err(|_| StoreError::Poisoned(base_key.to_string()))?;
        base_map.merge(submap_content);
        Ok(())
    }

    fn delete_map(&self, key: &str) -> Result<(), StoreError> {
        self.write_maps()?
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::MapNotFound(key.to_string()))
    }

    fn map_handle(&self, key: &str) -> Option<MapHandle> {
        self.maps.read().ok()?.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Transform3D;
    use crate::map::model::{Mission, MissionId, Vertex};

    fn test_map(mission: &str, stamps: &[i64]) -> PoseGraphMap {
        let mut m = Mission::new(MissionId::new(mission));
        m.vertices = stamps
            .iter()
            .map(|&t| Vertex {
                timestamp_ns: t,
                t_m_b: Transform3D::identity(),
            })
            .collect();
        PoseGraphMap::with_mission(m)
    }

    #[test]
    fn test_save_and_load_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderMapStore::new();
        store.insert_map("a", test_map("m0", &[1, 2, 3])).unwrap();

        store
            .save_map_to_folder("a", dir.path(), &SaveConfig::default())
            .unwrap();
        store.load_map_from_folder(dir.path(), "b").unwrap();

        let store: &dyn MapStore = &store;
        let vertices = store.with_read_access("b", |m| m.num_vertices()).unwrap();
        assert_eq!(vertices, 3);
    }

    #[test]
    fn test_load_sorts_vertices_by_time() {
        let dir = tempfile::tempdir().unwrap();
        write_map_folder(
            "x",
            &test_map("m", &[2_000, 1_000, 3_000, 1_000]),
            dir.path(),
            &SaveConfig::default(),
        )
        .unwrap();

        let store = FolderMapStore::new();
        store.load_map_from_folder(dir.path(), "k").unwrap();
        let store: &dyn MapStore = &store;
        let stamps = store
            .with_read_access("k", |m| {
                m.missions
                    .values()
                    .flat_map(|m| m.vertices.iter().map(|v| v.timestamp_ns))
                    .collect::<Vec<_>>()
            })
            .unwrap();
        assert_eq!(stamps, vec![1_000, 2_000, 3_000]);
    }

    #[test]
    fn test_load_existing_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_map_folder("x", &test_map("m", &[1]), dir.path(), &SaveConfig::default()).unwrap();

        let store = FolderMapStore::new();
        store.load_map_from_folder(dir.path(), "k").unwrap();
        let err = store.load_map_from_folder(dir.path(), "k").unwrap_err();
        assert!(matches!(err, StoreError::MapExists(_)));
    }

    #[test]
    fn test_load_missing_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderMapStore::new();
        let err = store
            .load_map_from_folder(&dir.path().join("nope"), "k")
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(!store.has_map("k"));
    }

    #[test]
    fn test_save_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FolderMapStore::new();
        store.insert_map("a", test_map("m", &[1])).unwrap();
        let config = SaveConfig {
            overwrite_existing: false,
        };
        store.save_map_to_folder("a", dir.path(), &config).unwrap();
        let err = store
            .save_map_to_folder("a", dir.path(), &config)
            .unwrap_err();
        assert!(matches!(err, StoreError::FolderExists(_)));
    }

    #[test]
    fn test_rename_map() {
        let store = FolderMapStore::new();
        store.insert_map("old", test_map("m", &[1])).unwrap();
        store.rename_map("old", "new").unwrap();
        assert!(!store.has_map("old"));
        assert!(store.has_map("new"));
        assert!(matches!(
            store.rename_map("old", "other"),
            Err(StoreError::MapNotFound(_))
        ));
    }

    #[test]
    fn test_merge_and_delete() {
        let store = FolderMapStore::new();
        store.insert_map("base", test_map("m", &[1, 2])).unwrap();
        store.insert_map("sub", test_map("m", &[3, 4])).unwrap();

        store.merge_submap_into_base_map("base", "sub").unwrap();
        store.delete_map("sub").unwrap();

        assert_eq!(store.map_keys(), vec!["base".to_string()]);
        let store: &dyn MapStore = &store;
        let (missions, vertices) = store
            .with_read_access("base", |m| (m.num_missions(), m.num_vertices()))
            .unwrap();
        assert_eq!(missions, 1);
        assert_eq!(vertices, 4);
    }

    #[test]
    fn test_resources_are_collected() {
        let submap_dir = tempfile::tempdir().unwrap();
        let resource_dir = tempfile::tempdir().unwrap();
        write_map_folder(
            "s",
            &test_map("m", &[1]),
            submap_dir.path(),
            &SaveConfig::default(),
        )
        .unwrap();
        let resources = submap_dir.path().join(RESOURCE_DIR_NAME);
        fs::create_dir_all(&resources).unwrap();
        fs::write(resources.join("cloud.bin"), b"points").unwrap();

        let store = FolderMapStore::with_resource_folder(resource_dir.path());
        store.load_map_from_folder(submap_dir.path(), "s_1").unwrap();

        assert!(resource_dir.path().join("s_1").join("cloud.bin").exists());
    }
}
