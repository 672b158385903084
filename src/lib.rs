//! Milan - multi-robot submap merging server
//!
//! Ingests map fragments ("submaps") from multiple robots, loads and
//! processes them concurrently, merges them in strict arrival order into
//! one global map, and answers point-in-time pose lookups while merging
//! continues in the background.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     server/                         │  ← Orchestration
//! │   (queue, ingest, merge thread, status, lookup)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │             commands/   pool/   config/             │  ← Collaborators
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      map/                           │  ← Map model + store
//! │        (model, store, folder store, interpolator)   │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                (types, math)                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use milan::{MapServer, SensorKind, ServerConfig, ShutdownToken, Vector3};
//!
//! let mut server = MapServer::from_config(ServerConfig::default(), ShutdownToken::new())?;
//! server.start()?;
//! server.submit("robot_a", "/data/robot_a/submap_0")?;
//!
//! let lookup = server.map_lookup("robot_a", SensorKind::Lidar, t_ns, &Vector3::zero());
//! server.shutdown();
//! ```

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Map model and storage (depends on core)
// ============================================================================
pub mod map;

// ============================================================================
// Layer 3: Collaborators (depends on map)
// ============================================================================
pub mod commands;
pub mod config;
pub mod pool;
pub mod utils;

// ============================================================================
// Layer 4: Merging pipeline (depends on all layers)
// ============================================================================
pub mod error;
pub mod server;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use crate::core::types::{Quaternion, Transform3D, Vector3};

// Map
pub use map::{
    FolderMapStore, LinearInterpolator, MapStore, Mission, MissionId, PoseGraphMap, SaveConfig,
    SensorKind, StoreError, TrajectoryInterpolator,
};

// Collaborators
pub use commands::{BasicCommandEngine, CommandEngine, CommandError};
pub use config::{ConfigLoadError, ServerConfig};
pub use pool::{NON_EXCLUSIVE_GROUP, WorkerPool};
pub use utils::ShutdownToken;

// Server
pub use error::{Result, ServerError};
pub use server::{
    LookupError, LookupStatus, MERGED_MAP_KEY, MapLookup, MapServer, StatusSnapshot, SubmapState,
    SubmapTask,
};
