//! Error types for the merging server.

use thiserror::Error;

use crate::map::StoreError;

/// Server error type
#[derive(Error, Debug)]
pub enum ServerError {
    /// Submission without a submap folder.
    #[error("Submap path is empty")]
    EmptySourcePath,

    /// A shutdown has already been requested; the request is ignored.
    #[error("Shutdown already requested")]
    ShutdownRequested,

    /// `start()` called on a server whose threads are already running.
    #[error("Server already started")]
    AlreadyStarted,

    /// The worker pool refused the job (pool stopped).
    #[error("Worker pool rejected job for submap '{0}'")]
    PoolStopped(String),

    /// A map with the derived key is already in the store.
    #[error("Map key '{0}' already exists in the map store")]
    DuplicateMapKey(String),

    /// A submap must contain exactly one mission.
    #[error("Submap '{key}' has {missions} missions, expected exactly one")]
    InvalidSubmap {
        /// Map key of the offending submap
        key: String,
        /// Number of missions found
        missions: usize,
    },

    /// The global map does not exist yet.
    #[error("Merged map does not exist yet")]
    NoMergedMap,

    /// No output folder configured for saving.
    #[error("No merged map folder configured")]
    NoOutputFolder,

    /// Task lock was poisoned by a panicking worker.
    #[error("Submap '{0}' lock poisoned by a failed worker")]
    PoisonedTask(String),

    /// Map store failure.
    #[error("Map store error: {0}")]
    Store(#[from] StoreError),

    /// I/O failure outside the map store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ServerError>;
