//! Merge Thread - ordered submap merging and backups.
//!
//! Each iteration walks the queue from the head:
//!
//! - task lock busy → stop scanning (a worker still owns it)
//! - quarantined → drop it and continue
//! - not loaded or not processed → stop scanning
//! - ready → merge it, pop it, continue
//!
//! Never skipping an unready head is what keeps merge order equal to
//! arrival order. The loop never blocks on a task lock.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Result, ServerError};
use crate::map::MissionId;

use super::shared::{MERGED_MAP_KEY, ServerShared};
use super::task::SubmapTask;

/// Merge thread handle.
pub struct MergeThread {
    handle: JoinHandle<()>,
}

impl MergeThread {
    /// Spawn the merge thread.
    pub fn spawn(shared: Arc<ServerShared>) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name("map-merging".into())
            .spawn(move || {
                let mut merger = MergeLoop::new(shared);
                merger.run();
            })?;
        Ok(Self { handle })
    }

    /// Wait for thread to finish.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

/// What happened to the queue head.
enum HeadOutcome {
    /// Merged or dropped; continue with the next head.
    Removed,
    /// Not ready; stop scanning.
    Blocked,
}

struct MergeLoop {
    shared: Arc<ServerShared>,
    received_first_submap: bool,
    /// Deadline of the next backup, on a fixed grid from startup.
    next_backup: Option<Instant>,
}

impl MergeLoop {
    fn new(shared: Arc<ServerShared>) -> Self {
        let received_first_submap = shared.has_merged_map();
        let next_backup = shared
            .config
            .merging
            .backup_interval()
            .map(|interval| Instant::now() + interval);
        Self {
            shared,
            received_first_submap,
            next_backup,
        }
    }

    fn run(&mut self) {
        log::info!("Merge thread started");
        let poll_interval = self.shared.config.merging.merge_poll_interval();

        while !self.shared.shutdown.is_requested() {
            if !self.received_first_submap && self.shared.queue.is_empty() {
                log::debug!("Waiting for the first submap");
            } else {
                self.shared.set_merge_busy(true);
                self.drain_queue();
                if self.received_first_submap && !self.shared.shutdown.is_requested() {
                    self.run_global_commands();
                    self.maybe_backup();
                }
                self.shared.set_merge_busy(false);
            }

            if self.shared.shutdown.sleep(self.sleep_duration(poll_interval)) {
                break;
            }
        }
        log::info!("Merge thread stopped");
    }

    fn drain_queue(&mut self) {
        while !self.shared.shutdown.is_requested() {
            let Some(task) = self.shared.queue.front() else {
                break;
            };
            match self.process_head(&task) {
                HeadOutcome::Removed => continue,
                HeadOutcome::Blocked => break,
            }
        }
    }

    fn process_head(&mut self, task: &Arc<SubmapTask>) -> HeadOutcome {
        let guard = match task.try_lock() {
            Ok(Some(guard)) => guard,
            Ok(None) => return HeadOutcome::Blocked,
            Err(e) => {
                self.shared.quarantine(task, &e);
                self.remove_head(task);
                return HeadOutcome::Removed;
            }
        };

        if task.is_failed() {
            log::warn!(
                "Dropping quarantined submap '{}' from the queue",
                task.map_key()
            );
            self.remove_head(task);
            drop(guard);
            return HeadOutcome::Removed;
        }

        if !task.is_loaded() || !task.is_processed() {
            return HeadOutcome::Blocked;
        }

        log::debug!("Submap '{}' is ready to be merged", task.map_key());
        self.shared.set_merge_command("merging submap");

        match self.merge_submap(task) {
            Ok(mission_id) => {
                if task.robot_name().is_empty() {
                    log::warn!(
                        "Submap '{}' has no robot name associated with it",
                        task.map_key()
                    );
                } else {
                    self.shared.record_robot_mission(task.robot_name(), mission_id);
                }
                task.mark_merged();
                log::info!(
                    "Merged submap '{}' (robot '{}')",
                    task.map_key(),
                    task.robot_name()
                );
            }
            Err(e) => self.shared.quarantine(task, &e),
        }

        // Pop while still holding the task lock so nobody observes a merged
        // task unlocked in the queue.
        self.remove_head(task);
        drop(guard);
        HeadOutcome::Removed
    }

    fn remove_head(&self, task: &SubmapTask) {
        if self.shared.queue.pop_front_if(task.id()).is_none() {
            log::error!(
                "Queue head changed while merging submap '{}'",
                task.map_key()
            );
        }
    }

    /// Merge one ready submap into the global map.
    fn merge_submap(&mut self, task: &SubmapTask) -> Result<MissionId> {
        let store = &self.shared.store;
        let key = task.map_key();

        let (missions, first) = store.with_read_access(key, |map| {
            (map.num_missions(), map.first_mission_id().cloned())
        })?;
        let mission_id = match first {
            Some(id) if missions == 1 && id.is_valid() => id,
            _ => {
                return Err(ServerError::InvalidSubmap {
                    key: key.to_string(),
                    missions,
                });
            }
        };

        if !store.has_map(MERGED_MAP_KEY) {
            log::info!("First submap '{}' initializes the merged map", key);
            store.rename_map(key, MERGED_MAP_KEY)?;
            // The first mission defines the global frame.
            store.with_write_access(MERGED_MAP_KEY, |map| {
                if let Some(mission) = map.mission_mut(&mission_id) {
                    mission.base_frame.is_t_g_m_known = true;
                }
            })?;
            self.received_first_submap = true;
        } else {
            log::debug!("Merging submap '{}' into '{}'", key, MERGED_MAP_KEY);
            store.merge_submap_into_base_map(MERGED_MAP_KEY, key)?;
            if let Err(e) = store.delete_map(key) {
                log::warn!("Failed to delete merged submap '{}': {}", key, e);
            }
        }
        Ok(mission_id)
    }

    fn run_global_commands(&self) {
        let commands = &self.shared.config.merging.global_map_commands;
        if commands.is_empty() {
            return;
        }
        for command in commands {
            self.shared.set_merge_command(command);
            match self.shared.engine.run_command(MERGED_MAP_KEY, command) {
                Ok(()) => log::debug!("Merged map command '{}' done", command),
                Err(e) => log::error!("Merged map command '{}' failed: {}", command, e),
            }
        }
        self.shared.set_merge_command("");
    }

    /// Poll interval, shortened so a due backup is not delayed by a poll.
    fn sleep_duration(&self, poll_interval: Duration) -> Duration {
        match self.next_backup {
            Some(deadline) if self.received_first_submap => deadline
                .saturating_duration_since(Instant::now())
                .min(poll_interval),
            _ => poll_interval,
        }
    }

    fn maybe_backup(&mut self) {
        let (Some(deadline), Some(interval)) =
            (self.next_backup, self.shared.config.merging.backup_interval())
        else {
            return;
        };
        if Instant::now() < deadline {
            return;
        }

        log::info!("Saving merged map as backup");
        self.shared.set_merge_command("save map");
        if let Err(e) = self.shared.save_merged_map_to_configured() {
            log::error!("Backup of merged map failed: {}", e);
        }
        self.shared.set_merge_command("");
        self.next_backup = Some(advance_deadline(deadline, interval, Instant::now()));
    }
}

/// Next grid point after `deadline` that is still ahead of `now`.
///
/// Deadlines missed while a save or merge was running are skipped.
fn advance_deadline(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let mut next = deadline + interval;
    if next <= now {
        let behind = now.duration_since(next).as_nanos();
        let skipped = (behind / interval.as_nanos().max(1)) as u32 + 1;
        log::warn!("Backup schedule behind, skipping {} backups", skipped);
        next += interval * skipped;
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_deadline_keeps_grid() {
        let start = Instant::now();
        let interval = Duration::from_millis(100);
        let deadline = start + interval;

        // Served on time: next grid point.
        let next = advance_deadline(deadline, interval, deadline + Duration::from_millis(30));
        assert_eq!(next, start + 2 * interval);

        // Served late: skip to the first grid point ahead of now.
        let next = advance_deadline(deadline, interval, deadline + Duration::from_millis(250));
        assert_eq!(next, deadline + 3 * interval);
    }
}
