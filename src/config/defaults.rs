//! Default value functions for serde deserialization.

pub fn submap_loading_threads() -> usize {
    4
}

pub fn overwrite_existing() -> bool {
    true
}

pub fn backup_interval_s() -> f64 {
    300.0
}

pub fn merge_poll_interval_ms() -> u64 {
    1000
}

pub fn status_interval_ms() -> u64 {
    1000
}
