//! Storage configuration section.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::map::SaveConfig;

/// Storage settings section
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageSection {
    /// Where the merged map is saved (empty = backups and saving disabled)
    #[serde(default)]
    pub merged_map_folder: String,

    /// Where submap resources are collected (empty = left with the submap)
    #[serde(default)]
    pub resource_folder: String,

    /// Replace an existing merged map when saving
    #[serde(default = "defaults::overwrite_existing")]
    pub overwrite_existing: bool,
}

impl StorageSection {
    /// Merged map folder, if configured.
    pub fn merged_map_path(&self) -> Option<PathBuf> {
        non_empty_path(&self.merged_map_folder)
    }

    /// Resource folder, if configured.
    pub fn resource_path(&self) -> Option<PathBuf> {
        non_empty_path(&self.resource_folder)
    }

    /// Save options derived from this section.
    pub fn save_config(&self) -> SaveConfig {
        SaveConfig {
            overwrite_existing: self.overwrite_existing,
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            merged_map_folder: String::new(),
            resource_folder: String::new(),
            overwrite_existing: defaults::overwrite_existing(),
        }
    }
}

fn non_empty_path(s: &str) -> Option<PathBuf> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}
