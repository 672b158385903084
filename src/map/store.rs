//! Map store contract.
//!
//! The store owns every map by key. Maps are shared as
//! `Arc<RwLock<PoseGraphMap>>` handles so a reader holding read access never
//! observes a merge half-applied.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use super::model::PoseGraphMap;

/// Shared handle to one map.
pub type MapHandle = Arc<RwLock<PoseGraphMap>>;

/// Map store error types
#[derive(Error, Debug)]
pub enum StoreError {
    /// No map under this key.
    #[error("Map not found: {0}")]
    MapNotFound(String),

    /// A map already exists under this key.
    #[error("Map already exists: {0}")]
    MapExists(String),

    /// Target folder already holds a map and overwriting is disabled.
    #[error("Map folder already exists: {0}")]
    FolderExists(PathBuf),

    /// Filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Map file could not be parsed.
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// Path of the map file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Map could not be serialized.
    #[error("Failed to serialize map '{key}': {message}")]
    Serialize {
        /// Key of the map
        key: String,
        /// Serializer message
        message: String,
    },

    /// A map lock was poisoned by a panicking thread.
    #[error("Map lock poisoned: {0}")]
    Poisoned(String),
}

impl StoreError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Options for writing a map to disk.
#[derive(Debug, Clone)]
pub struct SaveConfig {
    /// Replace an existing map file in the target folder.
    pub overwrite_existing: bool,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            overwrite_existing: true,
        }
    }
}

/// Keyed storage for pose graph maps.
///
/// Implementations are responsible for their own internal read/write
/// exclusion; every method may be called concurrently.
pub trait MapStore: Send + Sync {
    /// Check if a map exists under `key`.
    fn has_map(&self, key: &str) -> bool;

    /// All map keys currently held.
    fn map_keys(&self) -> Vec<String>;

    /// Load the map stored in `folder` under `key`.
    fn load_map_from_folder(&self, folder: &Path, key: &str) -> Result<(), StoreError>;

    /// Write the map under `key` into `folder`.
    fn save_map_to_folder(
        &self,
        key: &str,
        folder: &Path,
        config: &SaveConfig,
    ) -> Result<(), StoreError>;

    /// Move a map to a new key.
    fn rename_map(&self, old_key: &str, new_key: &str) -> Result<(), StoreError>;

    /// Merge the map under `submap_key` into the map under `base_key`.
    ///
    /// The submap stays in the store; callers delete it afterwards.
    fn merge_submap_into_base_map(&self, base_key: &str, submap_key: &str)
    -> Result<(), StoreError>;

    /// Remove a map.
    fn delete_map(&self, key: &str) -> Result<(), StoreError>;

    /// Shared handle to a map, if present.
    fn map_handle(&self, key: &str) -> Option<MapHandle>;
}

impl<'a> dyn MapStore + 'a {
    /// Run `f` with read access to the map under `key`.
    pub fn with_read_access<R>(
        &self,
        key: &str,
        f: impl FnOnce(&PoseGraphMap) -> R,
    ) -> Result<R, StoreError> {
        let handle = self
            .map_handle(key)
            .ok_or_else(|| StoreError::MapNotFound(key.to_string()))?;
        let map = handle
            .read()
            .map_err(|_| StoreError::Poisoned(key.to_string()))?;
        Ok(f(&map))
    }

    /// Run `f` with write access to the map under `key`.
    pub fn with_write_access<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut PoseGraphMap) -> R,
    ) -> Result<R, StoreError> {
        let handle = self
            .map_handle(key)
            .ok_or_else(|| StoreError::MapNotFound(key.to_string()))?;
        let mut map = handle
            .write()
            .map_err(|_| StoreError::Poisoned(key.to_string()))?;
        Ok(f(&mut map))
    }
}
