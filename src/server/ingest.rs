//! Submap load-and-process job.
//!
//! Runs on the worker pool in the non-exclusive group, holding the task
//! lock from start to finish:
//!
//! 1. load the submap under its map key
//! 2. mark loaded
//! 3. run the configured submap commands (best effort, cancellable
//!    between commands)
//! 4. mark processed, unless cancelled

use std::sync::Arc;

use crate::error::{Result, ServerError};

use super::shared::{ServerShared, SubmapCommandMarker};
use super::task::SubmapTask;

/// Worker pool entry point for one submap.
pub(crate) fn run_submap_job(shared: Arc<ServerShared>, task: Arc<SubmapTask>) {
    let _guard = match task.lock() {
        Ok(guard) => guard,
        Err(e) => {
            shared.quarantine(&task, &e);
            return;
        }
    };

    if shared.shutdown.is_requested() {
        log::warn!("Shutdown requested, skipping submap '{}'", task.map_key());
        return;
    }

    if let Err(e) = load_and_process(&shared, &task) {
        // Still under the task lock, so the merge loop sees the failure
        // together with the flags.
        shared.quarantine(&task, &e);
    }
}

fn load_and_process(shared: &ServerShared, task: &SubmapTask) -> Result<()> {
    let marker = SubmapCommandMarker::new(shared, task.id());
    let key = task.map_key();

    log::debug!("Loading submap '{}' from {:?}", key, task.source_path());
    marker.set("loading");

    if shared.store.has_map(key) {
        return Err(ServerError::DuplicateMapKey(key.to_string()));
    }
    shared.store.load_map_from_folder(task.source_path(), key)?;
    task.mark_loaded();
    log::debug!("Loaded submap '{}', processing", key);

    for command in &shared.config.merging.submap_commands {
        marker.set(command);
        match shared.engine.run_command(key, command) {
            Ok(()) => log::debug!("Submap '{}': command '{}' done", key, command),
            Err(e) => log::error!("Submap '{}': command '{}' failed: {}", key, command, e),
        }

        if shared.shutdown.is_requested() {
            log::warn!(
                "Shutdown requested, aborting processing of submap '{}'",
                key
            );
            return Ok(());
        }
    }

    task.mark_processed();
    log::debug!("Processed submap '{}'", key);
    Ok(())
}
