//! Status Thread - periodic observability snapshot.
//!
//! The snapshot is derived on demand from the authoritative state; the
//! thread only formats and logs it. Nothing here mutates pipeline state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::map::MissionId;
use crate::pool::WorkerPool;

use super::shared::ServerShared;
use super::task::{SubmapId, SubmapState};

const SEPARATOR: &str =
    "==================================================================";

/// State of one queued submap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmapStatus {
    /// Ingestion sequence number.
    pub id: SubmapId,
    /// Robot name.
    pub robot_name: String,
    /// Map store key.
    pub map_key: String,
    /// Derived state.
    pub state: SubmapState,
}

/// Point-in-time view of the pipeline.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// Queued submaps, head first.
    pub submaps: Vec<SubmapStatus>,
    /// Workers executing a job.
    pub active_workers: usize,
    /// Pool size.
    pub worker_capacity: usize,
    /// Command currently run per submap.
    pub submap_commands: BTreeMap<SubmapId, String>,
    /// Whether the merge loop is inside an iteration.
    pub merge_busy: bool,
    /// Command currently run by the merge loop.
    pub merge_command: String,
    /// Robot→mission index.
    pub robot_missions: BTreeMap<String, MissionId>,
    /// Map keys of quarantined submaps.
    pub quarantined: Vec<String>,
    /// Whether the global map exists.
    pub has_merged_map: bool,
}

impl StatusSnapshot {
    /// Capture the current state.
    pub fn capture(shared: &ServerShared, pool: &WorkerPool) -> Self {
        let submaps = shared.queue.with_tasks(|tasks| {
            tasks
                .iter()
                .map(|task| SubmapStatus {
                    id: task.id(),
                    robot_name: task.robot_name().to_string(),
                    map_key: task.map_key().to_string(),
                    state: task.observe_state(),
                })
                .collect::<Vec<_>>()
        });

        for submap in &submaps {
            if submap.state == SubmapState::Inconsistent {
                log::error!(
                    "Submap '{}' is merged and unlocked at the same time",
                    submap.map_key
                );
            }
        }

        let merge_busy = shared.is_merge_busy();
        Self {
            submaps,
            active_workers: pool.num_active_workers(),
            worker_capacity: pool.num_threads(),
            submap_commands: shared.submap_commands(),
            merge_busy,
            merge_command: shared.merge_command(),
            robot_missions: shared.robot_missions(),
            quarantined: shared.quarantined(),
            has_merged_map: shared.has_merged_map(),
        }
    }

    /// Number of submaps in a given state.
    pub fn count(&self, state: SubmapState) -> usize {
        self.submaps.iter().filter(|s| s.state == state).count()
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", SEPARATOR)?;
        writeln!(f, "Status:")?;
        if self.submaps.is_empty() {
            writeln!(f, " - No submaps to process or merge...")?;
        }
        for s in &self.submaps {
            writeln!(f, " - {} - map '{}'\t: {}", s.robot_name, s.map_key, s.state)?;
        }
        writeln!(f, "{}", SEPARATOR)?;
        writeln!(
            f,
            " - Active submap threads: {}/{}",
            self.active_workers, self.worker_capacity
        )?;
        for (id, command) in &self.submap_commands {
            writeln!(f, "   - submap {} - command: {}", id, command)?;
        }
        if self.merge_busy {
            writeln!(f, " - Active merging thread: yes")?;
            writeln!(f, "   - current command: {}", self.merge_command)?;
        } else {
            writeln!(f, " - Active merging thread: no")?;
        }
        writeln!(
            f,
            " - Merged map: {}",
            if self.has_merged_map { "yes" } else { "not yet" }
        )?;
        if !self.quarantined.is_empty() {
            writeln!(f, " - Quarantined submaps: {}", self.quarantined.join(", "))?;
        }
        writeln!(f, "{}", SEPARATOR)?;
        write!(f, "Robot to mission map:")?;
        for (robot, mission) in &self.robot_missions {
            write!(f, "\n - {}\t\t mission id: {}", robot, mission)?;
        }
        writeln!(f)?;
        write!(f, "{}", SEPARATOR)
    }
}

/// Status thread handle.
pub struct StatusThread {
    handle: JoinHandle<()>,
}

impl StatusThread {
    /// Spawn the status thread.
    pub fn spawn(shared: Arc<ServerShared>, pool: Arc<WorkerPool>) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name("status".into())
            .spawn(move || run_status_loop(&shared, &pool))?;
        Ok(Self { handle })
    }

    /// Wait for thread to finish.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

fn run_status_loop(shared: &ServerShared, pool: &WorkerPool) {
    let interval = shared.config.merging.status_interval();
    while !shared.shutdown.is_requested() {
        log::info!("{}", StatusSnapshot::capture(shared, pool));
        if shared.shutdown.sleep(interval) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            submaps: vec![
                SubmapStatus {
                    id: 0,
                    robot_name: "alpha".into(),
                    map_key: "alpha_00_0".into(),
                    state: SubmapState::ReadyToMerge,
                },
                SubmapStatus {
                    id: 1,
                    robot_name: "beta".into(),
                    map_key: "beta_00_1".into(),
                    state: SubmapState::Loading,
                },
            ],
            active_workers: 1,
            worker_capacity: 4,
            submap_commands: BTreeMap::from([(1, "loading".to_string())]),
            merge_busy: true,
            merge_command: "merging submap".into(),
            robot_missions: BTreeMap::from([("alpha".to_string(), MissionId::new("m0"))]),
            quarantined: vec![],
            has_merged_map: true,
        }
    }

    #[test]
    fn test_display_lists_everything() {
        let text = snapshot().to_string();
        assert!(text.contains("alpha_00_0'\t: ready to merge"));
        assert!(text.contains("beta_00_1'\t: loading..."));
        assert!(text.contains("Active submap threads: 1/4"));
        assert!(text.contains("submap 1 - command: loading"));
        assert!(text.contains("current command: merging submap"));
        assert!(text.contains("alpha\t\t mission id: m0"));
        assert!(!text.contains("Quarantined"));
    }

    #[test]
    fn test_count_by_state() {
        let s = snapshot();
        assert_eq!(s.count(SubmapState::Loading), 1);
        assert_eq!(s.count(SubmapState::Merged), 0);
    }
}
