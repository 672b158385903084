//! Map layer: pose graph model, keyed map store, trajectory interpolation.
//!
//! # Contents
//!
//! - [`model`]: Missions, sensors, base frames, vertices
//! - [`store`]: The [`MapStore`] contract and its error type
//! - [`folder_store`]: In-memory store reading/writing map folders
//! - [`interpolator`]: Pose interpolation at arbitrary timestamps

pub mod folder_store;
pub mod interpolator;
pub mod model;
pub mod store;

pub use folder_store::{FolderMapStore, MAP_FILE_NAME, read_map_folder, write_map_folder};
pub use interpolator::{LinearInterpolator, TimeRange, TrajectoryInterpolator};
pub use model::{Mission, MissionBaseFrame, MissionId, PoseGraphMap, Sensor, SensorKind, Vertex};
pub use store::{MapHandle, MapStore, SaveConfig, StoreError};
