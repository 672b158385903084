//! Server configuration loading.
//!
//! Loads all configuration from a single TOML file with sensible defaults.
//!
//! ## Configuration Sections
//!
//! | Section | Description |
//! |---------|-------------|
//! | [`PoolSection`] | Submap loading parallelism |
//! | [`StorageSection`] | Merged map and resource folders |
//! | [`MergingSection`] | Poll intervals, backups, command lists |
//!
//! ## Example TOML
//!
//! ```toml
//! [pool]
//! submap_loading_threads = 4
//!
//! [storage]
//! merged_map_folder = "/data/merged"   # empty: saving disabled
//! resource_folder = ""
//! overwrite_existing = true
//!
//! [merging]
//! backup_interval_s = 300.0            # 0 disables backups
//! merge_poll_interval_ms = 1000
//! status_interval_ms = 1000
//! submap_commands = ["sort_vertices", "check_consistency"]
//! global_map_commands = ["stats"]
//! ```

mod defaults;
mod error;
mod merging;
mod pool;
mod server;
mod storage;

pub use error::ConfigLoadError;
pub use server::{DEFAULT_CONFIG_PATHS, ServerConfig};

pub use merging::MergingSection;
pub use pool::PoolSection;
pub use storage::StorageSection;
