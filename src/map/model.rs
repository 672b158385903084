//! Pose graph map model.
//!
//! A map is a set of missions. Each mission owns a base frame (its alignment
//! into the global frame), a set of sensors with fixed extrinsics relative to
//! the robot body, and a time-ordered list of body poses (vertices).
//!
//! ```text
//! T_G_S = T_G_M ∘ T_M_B(t) ∘ T_B_S
//!          │        │          └─ sensor extrinsic
//!          │        └─ vertex pose in the mission frame
//!          └─ mission base frame in the global frame
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::Transform3D;

/// Unique mission identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissionId(String);

impl MissionId {
    /// Create a mission id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An id is valid if it is non-empty.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of sensor a lookup can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SensorKind {
    /// Camera rig (one or more cameras sharing a body frame).
    #[serde(rename = "ncamera")]
    NCamera,
    /// Inertial measurement unit.
    Imu,
    /// LiDAR.
    Lidar,
    /// Six degree of freedom odometry source.
    #[serde(rename = "odometry_6dof")]
    Odometry6DoF,
    /// GNSS receiver.
    Gps,
}

impl SensorKind {
    /// Stable lowercase name (matches the serialized form).
    pub fn name(&self) -> &'static str {
        match self {
            SensorKind::NCamera => "ncamera",
            SensorKind::Imu => "imu",
            SensorKind::Lidar => "lidar",
            SensorKind::Odometry6DoF => "odometry_6dof",
            SensorKind::Gps => "gps",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ncamera" | "camera" => Ok(SensorKind::NCamera),
            "imu" => Ok(SensorKind::Imu),
            "lidar" => Ok(SensorKind::Lidar),
            "odometry" | "odometry6dof" | "odometry_6dof" => Ok(SensorKind::Odometry6DoF),
            "gps" => Ok(SensorKind::Gps),
            other => Err(format!("Unknown sensor kind: {}", other)),
        }
    }
}

/// A sensor mounted on the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    /// Sensor identifier.
    pub id: String,
    /// Extrinsic: sensor frame expressed in the body frame.
    #[serde(default)]
    pub t_b_s: Transform3D,
}

/// Alignment of a mission into the global frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct MissionBaseFrame {
    /// Mission frame expressed in the global frame.
    #[serde(default)]
    pub t_g_m: Transform3D,
    /// Whether `t_g_m` has been established.
    #[serde(default)]
    pub is_t_g_m_known: bool,
}

/// One pose-graph vertex: the body pose at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Timestamp in nanoseconds since epoch.
    pub timestamp_ns: i64,
    /// Body frame expressed in the mission frame.
    pub t_m_b: Transform3D,
}

/// A single robot session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    /// Mission identifier.
    pub id: MissionId,
    /// Global alignment.
    #[serde(default)]
    pub base_frame: MissionBaseFrame,
    /// Sensors by kind.
    #[serde(default)]
    pub sensors: BTreeMap<SensorKind, Sensor>,
    /// Vertices, ordered by timestamp.
    #[serde(default)]
    pub vertices: Vec<Vertex>,
}

impl Mission {
    /// Create an empty mission with an identity, unknown base frame.
    pub fn new(id: MissionId) -> Self {
        Self {
            id,
            base_frame: MissionBaseFrame::default(),
            sensors: BTreeMap::new(),
            vertices: Vec::new(),
        }
    }

    /// Check if the mission carries a sensor of this kind.
    pub fn has_sensor(&self, kind: SensorKind) -> bool {
        self.sensors.contains_key(&kind)
    }

    /// Get the sensor of this kind.
    pub fn sensor(&self, kind: SensorKind) -> Option<&Sensor> {
        self.sensors.get(&kind)
    }

    /// Whether vertices are strictly increasing in time.
    pub fn is_time_ordered(&self) -> bool {
        self.vertices
            .windows(2)
            .all(|w| w[0].timestamp_ns < w[1].timestamp_ns)
    }

    /// Sort vertices by time and drop later duplicates of a timestamp.
    ///
    /// Returns the number of vertices removed.
    pub fn sort_vertices(&mut self) -> usize {
        let before = self.vertices.len();
        self.vertices.sort_by_key(|v| v.timestamp_ns);
        self.vertices.dedup_by_key(|v| v.timestamp_ns);
        before - self.vertices.len()
    }

    /// Absorb another chunk of the same mission.
    ///
    /// Vertices are merged in time order (existing vertices win on equal
    /// timestamps); sensors of kinds not yet present are adopted.
    pub fn extend_from(&mut self, other: Mission) {
        for (kind, sensor) in other.sensors {
            self.sensors.entry(kind).or_insert(sensor);
        }
        self.vertices.extend(other.vertices);
        // Stable sort keeps existing vertices ahead of new ones on ties.
        self.vertices.sort_by_key(|v| v.timestamp_ns);
        self.vertices.dedup_by_key(|v| v.timestamp_ns);
    }
}

/// A pose graph map: a set of missions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PoseGraphMap {
    /// Missions keyed by id.
    #[serde(default)]
    pub missions: BTreeMap<MissionId, Mission>,
}

impl PoseGraphMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map holding a single mission.
    pub fn with_mission(mission: Mission) -> Self {
        let mut map = Self::new();
        map.insert_mission(mission);
        map
    }

    /// Number of missions.
    pub fn num_missions(&self) -> usize {
        self.missions.len()
    }

    /// Total number of vertices over all missions.
    pub fn num_vertices(&self) -> usize {
        self.missions.values().map(|m| m.vertices.len()).sum()
    }

    /// Id of the first mission (in id order).
    pub fn first_mission_id(&self) -> Option<&MissionId> {
        self.missions.keys().next()
    }

    /// Get a mission.
    pub fn mission(&self, id: &MissionId) -> Option<&Mission> {
        self.missions.get(id)
    }

    /// Get a mission mutably.
    pub fn mission_mut(&mut self, id: &MissionId) -> Option<&mut Mission> {
        self.missions.get_mut(id)
    }

    /// Insert or replace a mission.
    pub fn insert_mission(&mut self, mission: Mission) {
        self.missions.insert(mission.id.clone(), mission);
    }

    /// Merge all missions of `other` into this map.
    ///
    /// Missions already present are extended, new missions are inserted
    /// with their base frame as-is.
    pub fn merge(&mut self, other: PoseGraphMap) {
        for (id, mission) in other.missions {
            match self.missions.get_mut(&id) {
                Some(existing) => existing.extend_from(mission),
                None => {
                    self.missions.insert(id, mission);
                }
            }
        }
    }
}
