//! Fixed-size worker pool with exclusivity groups.
//!
//! Jobs are queued in submission order. A job tagged with
//! [`NON_EXCLUSIVE_GROUP`] may run alongside anything; jobs sharing any
//! other group id run one at a time, in the order they were submitted.
//!
//! ```text
//! enqueue_ordered(g, job) ──► queue ──► worker picks the first job whose
//!                                       group is not currently running
//! ```

mod worker_pool;

pub use worker_pool::{GroupId, Job, NON_EXCLUSIVE_GROUP, PoolError, WorkerPool};
