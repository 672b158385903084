//! Merging configuration section.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;

/// Merge loop settings section
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergingSection {
    /// Seconds between merged map backups (0 = disabled)
    #[serde(default = "defaults::backup_interval_s")]
    pub backup_interval_s: f64,

    /// Sleep between merge loop iterations (milliseconds)
    #[serde(default = "defaults::merge_poll_interval_ms")]
    pub merge_poll_interval_ms: u64,

    /// Interval of the status log (milliseconds)
    #[serde(default = "defaults::status_interval_ms")]
    pub status_interval_ms: u64,

    /// Commands run on every submap after loading, in order
    #[serde(default)]
    pub submap_commands: Vec<String>,

    /// Commands run on the merged map after every merge iteration
    #[serde(default)]
    pub global_map_commands: Vec<String>,
}

impl MergingSection {
    /// Backup interval, `None` when backups are disabled.
    pub fn backup_interval(&self) -> Option<Duration> {
        if self.backup_interval_s > 0.0 && self.backup_interval_s.is_finite() {
            Some(Duration::from_secs_f64(self.backup_interval_s))
        } else {
            None
        }
    }

    /// Merge loop poll interval.
    pub fn merge_poll_interval(&self) -> Duration {
        Duration::from_millis(self.merge_poll_interval_ms)
    }

    /// Status log interval.
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

impl Default for MergingSection {
    fn default() -> Self {
        Self {
            backup_interval_s: defaults::backup_interval_s(),
            merge_poll_interval_ms: defaults::merge_poll_interval_ms(),
            status_interval_ms: defaults::status_interval_ms(),
            submap_commands: Vec::new(),
            global_map_commands: Vec::new(),
        }
    }
}
