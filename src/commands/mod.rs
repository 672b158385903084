//! Map processing commands.
//!
//! A [`CommandEngine`] executes named operations against a selected map.
//! The operation vocabulary is configuration: the server only forwards
//! strings and reports pass/fail.
//!
//! [`BasicCommandEngine`] understands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `stats` | Log mission/vertex counts |
//! | `sort_vertices` | Sort vertices by time, drop duplicate timestamps |
//! | `anchor_all_missions` | Mark every mission base frame as known |
//! | `check_consistency` | Fail if a mission is empty or out of time order |
//! | `sleep <ms>` | Hold the map selection for a while (load testing) |

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::map::{MapStore, StoreError};

/// Command engine error types
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command name not in the vocabulary.
    #[error("Unknown command: '{0}'")]
    UnknownCommand(String),

    /// Command arguments could not be parsed.
    #[error("Invalid arguments for '{command}': {message}")]
    InvalidArguments {
        /// Command name
        command: String,
        /// Reason
        message: String,
    },

    /// Command ran but reported failure.
    #[error("Command '{command}' failed: {message}")]
    Failed {
        /// Command name
        command: String,
        /// Reason
        message: String,
    },

    /// Selected map unavailable.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Executes named processing operations on a selected map.
pub trait CommandEngine: Send + Sync {
    /// Run `command` against the map stored under `map_key`.
    fn run_command(&self, map_key: &str, command: &str) -> Result<(), CommandError>;
}

/// Command engine working directly on a [`MapStore`].
pub struct BasicCommandEngine {
    store: Arc<dyn MapStore>,
}

impl BasicCommandEngine {
    /// Create an engine operating on `store`.
    pub fn new(store: Arc<dyn MapStore>) -> Self {
        Self { store }
    }

    fn stats(&self, map_key: &str) -> Result<(), CommandError> {
        let (missions, vertices, known) = self.store.with_read_access(map_key, |map| {
            let known = map
                .missions
                .values()
                .filter(|m| m.base_frame.is_t_g_m_known)
                .count();
            (map.num_missions(), map.num_vertices(), known)
        })?;
        log::info!(
            "Map '{}': {} missions ({} anchored), {} vertices",
            map_key,
            missions,
            known,
            vertices
        );
        Ok(())
    }

    fn sort_vertices(&self, map_key: &str) -> Result<(), CommandError> {
        let removed = self.store.with_write_access(map_key, |map| {
            map.missions
                .values_mut()
                .map(|m| m.sort_vertices())
                .sum::<usize>()
        })?;
        if removed > 0 {
            log::debug!("Map '{}': dropped {} duplicate vertices", map_key, removed);
        }
        Ok(())
    }

    fn anchor_all_missions(&self, map_key: &str) -> Result<(), CommandError> {
        let anchored = self.store.with_write_access(map_key, |map| {
            let mut anchored = 0;
            for mission in map.missions.values_mut() {
                if !mission.base_frame.is_t_g_m_known {
                    mission.base_frame.is_t_g_m_known = true;
                    anchored += 1;
                }
            }
            anchored
        })?;
        log::debug!("Map '{}': anchored {} missions", map_key, anchored);
        Ok(())
    }

    fn check_consistency(&self, map_key: &str) -> Result<(), CommandError> {
        let problems = self.store.with_read_access(map_key, |map| {
            map.missions
                .values()
                .filter_map(|m| {
                    if !m.id.is_valid() {
                        Some("mission with empty id".to_string())
                    } else if m.vertices.is_empty() {
                        Some(format!("mission {} has no vertices", m.id))
                    } else if !m.is_time_ordered() {
                        Some(format!("mission {} is not time ordered", m.id))
                    } else {
                        None
                    }
                })
                .collect::<Vec<_>>()
        })?;

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CommandError::Failed {
                command: "check_consistency".to_string(),
                message: problems.join("; "),
            })
        }
    }

    fn sleep(&self, map_key: &str, args: &[&str]) -> Result<(), CommandError> {
        let millis = args
            .first()
            .ok_or_else(|| CommandError::InvalidArguments {
                command: "sleep".to_string(),
                message: "missing duration in milliseconds".to_string(),
            })?
            .parse::<u64>()
            .map_err(|e| CommandError::InvalidArguments {
                command: "sleep".to_string(),
                message: e.to_string(),
            })?;
        if !self.store.has_map(map_key) {
            return Err(StoreError::MapNotFound(map_key.to_string()).into());
        }
        thread::sleep(Duration::from_millis(millis));
        Ok(())
    }
}

impl CommandEngine for BasicCommandEngine {
    fn run_command(&self, map_key: &str, command: &str) -> Result<(), CommandError> {
        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match name {
            "stats" => self.stats(map_key),
            "sort_vertices" => self.sort_vertices(map_key),
            "anchor_all_missions" => self.anchor_all_missions(map_key),
            "check_consistency" => self.check_consistency(map_key),
            "sleep" => self.sleep(map_key, &args),
            _ => Err(CommandError::UnknownCommand(command.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Transform3D;
    use crate::map::{FolderMapStore, Mission, MissionId, PoseGraphMap, Vertex};

    fn engine_with_map(stamps: &[i64]) -> (Arc<dyn MapStore>, BasicCommandEngine) {
        let store = FolderMapStore::new();
        let mut mission = Mission::new(MissionId::new("m"));
        mission.vertices = stamps
            .iter()
            .map(|&t| Vertex {
                timestamp_ns: t,
                t_m_b: Transform3D::identity(),
            })
            .collect();
        store
            .insert_map("map", PoseGraphMap::with_mission(mission))
            .unwrap();
        let store: Arc<dyn MapStore> = Arc::new(store);
        let engine = BasicCommandEngine::new(store.clone());
        (store, engine)
    }

    #[test]
    fn test_unknown_command() {
        let (_, engine) = engine_with_map(&[1]);
        assert!(matches!(
            engine.run_command("map", "optimize_everything"),
            Err(CommandError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_missing_map() {
        let (_, engine) = engine_with_map(&[1]);
        assert!(matches!(
            engine.run_command("other", "stats"),
            Err(CommandError::Store(StoreError::MapNotFound(_)))
        ));
    }

    #[test]
    fn test_sort_then_check() {
        let (_, engine) = engine_with_map(&[3, 1, 2]);
        assert!(engine.run_command("map", "check_consistency").is_err());
        engine.run_command("map", "sort_vertices").unwrap();
        engine.run_command("map", "check_consistency").unwrap();
    }

    #[test]
    fn test_anchor_all_missions() {
        let (store, engine) = engine_with_map(&[1]);
        engine.run_command("map", "anchor_all_missions").unwrap();
        let known = store
            .with_read_access("map", |m| {
                m.missions.values().all(|m| m.base_frame.is_t_g_m_known)
            })
            .unwrap();
        assert!(known);
    }

    #[test]
    fn test_sleep_arguments() {
        let (_, engine) = engine_with_map(&[1]);
        engine.run_command("map", "sleep 1").unwrap();
        assert!(matches!(
            engine.run_command("map", "sleep"),
            Err(CommandError::InvalidArguments { .. })
        ));
        assert!(matches!(
            engine.run_command("map", "sleep soon"),
            Err(CommandError::InvalidArguments { .. })
        ));
    }
}
