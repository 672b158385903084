//! Main ServerConfig and loading.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::ConfigLoadError;
use super::merging::MergingSection;
use super::pool::PoolSection;
use super::storage::StorageSection;

/// Default config file locations, tried in order.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["milan.toml", "/etc/milan.toml"];

/// Full server configuration loaded from TOML
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Worker pool settings
    #[serde(default)]
    pub pool: PoolSection,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSection,

    /// Merge loop settings
    #[serde(default)]
    pub merging: MergingSection,
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigLoadError::Io(e.to_string()))?;
        Self::from_toml(&contents)
    }

    /// Parse from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigLoadError> {
        basic_toml::from_str(toml).map_err(|e| ConfigLoadError::Parse(e.to_string()))
    }

    /// Load `path` if given, else the first readable default path.
    ///
    /// Falls back to built-in defaults with a warning when nothing loads.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(path) => match Self::load(path) {
                Ok(cfg) => {
                    log::info!("Loaded config from {}", path.display());
                    cfg
                }
                Err(e) => {
                    log::warn!("Failed to load config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            None => {
                for candidate in DEFAULT_CONFIG_PATHS {
                    let candidate = Path::new(candidate);
                    if candidate.exists()
                        && let Ok(cfg) = Self::load(candidate)
                    {
                        log::info!("Loaded config from {}", candidate.display());
                        return cfg;
                    }
                }
                Self::default()
            }
        }
    }

    /// Clamp values that would stall the pipeline.
    pub fn sanitized(mut self) -> Self {
        if self.pool.submap_loading_threads == 0 {
            log::warn!("submap_loading_threads = 0, using 1");
            self.pool.submap_loading_threads = 1;
        }
        if self.merging.backup_interval_s < 0.0 {
            log::warn!(
                "Negative backup_interval_s ({}), disabling backups",
                self.merging.backup_interval_s
            );
            self.merging.backup_interval_s = 0.0;
        }
        if self.merging.merge_poll_interval_ms == 0 {
            log::warn!("merge_poll_interval_ms = 0, using 1");
            self.merging.merge_poll_interval_ms = 1;
        }
        if self.merging.status_interval_ms == 0 {
            log::warn!("status_interval_ms = 0, using 1");
            self.merging.status_interval_ms = 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.pool.submap_loading_threads, 4);
        assert_eq!(config.merging.backup_interval_s, 300.0);
        assert!(config.storage.merged_map_path().is_none());
        assert!(config.storage.overwrite_existing);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            [merging]
            backup_interval_s = 0.5
            submap_commands = ["sort_vertices", "stats"]
            "#,
        )
        .unwrap();
        assert_eq!(config.merging.backup_interval_s, 0.5);
        assert_eq!(config.merging.submap_commands.len(), 2);
        assert_eq!(config.merging.merge_poll_interval_ms, 1000);
        assert_eq!(config.pool.submap_loading_threads, 4);
    }

    #[test]
    fn test_backup_interval_disabled() {
        let mut config = ServerConfig::default();
        config.merging.backup_interval_s = 0.0;
        assert!(config.merging.backup_interval().is_none());
        config.merging.backup_interval_s = 2.5;
        assert_eq!(
            config.merging.backup_interval(),
            Some(std::time::Duration::from_millis(2500))
        );
    }

    #[test]
    fn test_parse_error() {
        let err = ServerConfig::from_toml("[pool]\nsubmap_loading_threads = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigLoadError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\nmerged_map_folder = \"/tmp/merged\"").unwrap();
        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(
            config.storage.merged_map_path(),
            Some(std::path::PathBuf::from("/tmp/merged"))
        );
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load_or_default(Some(&dir.path().join("none.toml")));
        assert_eq!(config.pool.submap_loading_threads, 4);
    }

    #[test]
    fn test_sanitized() {
        let mut config = ServerConfig::default();
        config.pool.submap_loading_threads = 0;
        config.merging.backup_interval_s = -1.0;
        config.merging.merge_poll_interval_ms = 0;
        config.merging.status_interval_ms = 0;
        let config = config.sanitized();
        assert_eq!(config.pool.submap_loading_threads, 1);
        assert!(config.merging.backup_interval().is_none());
        assert_eq!(config.merging.merge_poll_interval_ms, 1);
        assert_eq!(config.merging.status_interval_ms, 1);
    }
}
