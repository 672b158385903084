//! Worker pool configuration section.

use serde::{Deserialize, Serialize};

use super::defaults;

/// Worker pool settings section
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolSection {
    /// Number of threads loading and processing submaps in parallel
    #[serde(default = "defaults::submap_loading_threads")]
    pub submap_loading_threads: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            submap_loading_threads: defaults::submap_loading_threads(),
        }
    }
}
