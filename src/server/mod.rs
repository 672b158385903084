//! Submap merging pipeline.
//!
//! ```text
//! submit() ─► SubmapQueue ─► WorkerPool (load + submap commands)
//!                  │
//!                  ▼
//!            MergeThread (ordered merge, global commands, backups)
//!                  │
//!                  ▼
//!            merged_map ◄── map_lookup()
//!
//! StatusThread logs a StatusSnapshot of all of the above.
//! ```

mod ingest;
mod lookup;
mod merge_thread;
mod node;
mod queue;
mod shared;
mod status_thread;
mod task;

pub use lookup::{LookupError, LookupStatus, MapLookup, lookup_status};
pub use node::MapServer;
pub use queue::SubmapQueue;
pub use shared::{MERGED_MAP_KEY, ServerShared};
pub use status_thread::{StatusSnapshot, SubmapStatus};
pub use task::{SubmapId, SubmapState, SubmapTask, derive_map_key};
