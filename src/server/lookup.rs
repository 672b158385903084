//! Point-in-time pose lookups against the merged map.
//!
//! ```text
//! robot ──index──► mission ──► sensor extrinsic T_B_S
//!                    │
//!                    ├──► base frame T_G_M
//!                    └──► interpolated body pose T_M_B(t)
//!
//! T_G_S = T_G_M ∘ T_M_B(t) ∘ T_B_S
//! ```
//!
//! Checks run in a fixed order: robot, timestamp sign, mission, sensor,
//! then the two-sided time range. A time after the covered range is
//! reported separately from one before it because later submaps may
//! still extend the mission.

use thiserror::Error;

use crate::core::types::{Transform3D, Vector3};
use crate::map::{MissionId, PoseGraphMap, SensorKind, StoreError};

use super::shared::{MERGED_MAP_KEY, ServerShared};

/// Flat lookup status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStatus {
    /// Pose found.
    Success,
    /// Unknown or empty robot name, or its mission is not in the map.
    NoSuchMission,
    /// Mission has no sensor of the requested kind.
    NoSuchSensor,
    /// Timestamp is negative or before the mission's first vertex.
    PoseNeverAvailable,
    /// Timestamp is after the mission's last vertex so far.
    PoseNotAvailableYet,
}

/// Lookup failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No mission registered for this robot.
    #[error("No mission for robot '{0}'")]
    NoSuchMission(String),

    /// Mission lacks the requested sensor kind.
    #[error("Mission {mission} has no {sensor} sensor")]
    NoSuchSensor {
        /// Mission of the robot
        mission: MissionId,
        /// Requested sensor kind
        sensor: SensorKind,
    },

    /// Timestamp will never be covered.
    #[error("Pose at {timestamp_ns} ns is never available")]
    PoseNeverAvailable {
        /// Requested timestamp
        timestamp_ns: i64,
    },

    /// Timestamp is not covered yet.
    #[error("Pose at {timestamp_ns} ns is not available yet")]
    PoseNotAvailableYet {
        /// Requested timestamp
        timestamp_ns: i64,
    },
}

impl LookupError {
    /// Flat status of this error.
    pub fn status(&self) -> LookupStatus {
        match self {
            LookupError::NoSuchMission(_) => LookupStatus::NoSuchMission,
            LookupError::NoSuchSensor { .. } => LookupStatus::NoSuchSensor,
            LookupError::PoseNeverAvailable { .. } => LookupStatus::PoseNeverAvailable,
            LookupError::PoseNotAvailableYet { .. } => LookupStatus::PoseNotAvailableYet,
        }
    }
}

/// Successful lookup result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapLookup {
    /// Query point in the global frame.
    pub p_g: Vector3,
    /// Sensor origin in the global frame.
    pub sensor_p_g: Vector3,
    /// Sensor pose in the global frame.
    pub t_g_s: Transform3D,
}

/// Flat status of a lookup result.
pub fn lookup_status(result: &Result<MapLookup, LookupError>) -> LookupStatus {
    match result {
        Ok(_) => LookupStatus::Success,
        Err(e) => e.status(),
    }
}

/// Express `p_s` (in the sensor frame at `timestamp_ns`) in the global frame.
pub fn map_lookup(
    shared: &ServerShared,
    robot_name: &str,
    sensor: SensorKind,
    timestamp_ns: i64,
    p_s: &Vector3,
) -> Result<MapLookup, LookupError> {
    let no_mission = || LookupError::NoSuchMission(robot_name.to_string());

    if robot_name.is_empty() {
        return Err(no_mission());
    }
    let mission_id = shared.robot_mission(robot_name).ok_or_else(no_mission)?;

    if timestamp_ns < 0 {
        return Err(LookupError::PoseNeverAvailable { timestamp_ns });
    }

    let result = shared.store.with_read_access(MERGED_MAP_KEY, |map| {
        sensor_pose(map, shared, robot_name, &mission_id, sensor, timestamp_ns)
    });

    let t_g_s = match result {
        Ok(inner) => inner?,
        Err(StoreError::MapNotFound(_)) => return Err(no_mission()),
        Err(e) => {
            log::error!("Lookup for robot '{}' failed: {}", robot_name, e);
            return Err(no_mission());
        }
    };

    Ok(MapLookup {
        p_g: t_g_s.transform_point(p_s),
        sensor_p_g: t_g_s.transform_point(&Vector3::zero()),
        t_g_s,
    })
}

/// `T_G_S` of `sensor` on `mission_id` at `timestamp_ns`.
fn sensor_pose(
    map: &PoseGraphMap,
    shared: &ServerShared,
    robot_name: &str,
    mission_id: &MissionId,
    sensor: SensorKind,
    timestamp_ns: i64,
) -> Result<Transform3D, LookupError> {
    let mission = map
        .mission(mission_id)
        .ok_or_else(|| LookupError::NoSuchMission(robot_name.to_string()))?;
    let t_b_s = mission
        .sensor(sensor)
        .ok_or_else(|| LookupError::NoSuchSensor {
            mission: mission_id.clone(),
            sensor,
        })?
        .t_b_s;
    let t_g_m = mission.base_frame.t_g_m;

    let range = shared
        .interpolator
        .time_range(mission)
        .ok_or(LookupError::PoseNotAvailableYet { timestamp_ns })?;
    if timestamp_ns < range.min_ns {
        return Err(LookupError::PoseNeverAvailable { timestamp_ns });
    }
    if timestamp_ns > range.max_ns {
        return Err(LookupError::PoseNotAvailableYet { timestamp_ns });
    }

    let t_m_b = shared
        .interpolator
        .pose_at(mission, timestamp_ns)
        .ok_or(LookupError::PoseNotAvailableYet { timestamp_ns })?;
    Ok(t_g_m.compose(&t_m_b).compose(&t_b_s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            LookupError::NoSuchMission("r".into()).status(),
            LookupStatus::NoSuchMission
        );
        assert_eq!(
            LookupError::NoSuchSensor {
                mission: MissionId::new("m"),
                sensor: SensorKind::Gps,
            }
            .status(),
            LookupStatus::NoSuchSensor
        );
        assert_eq!(
            lookup_status(&Err(LookupError::PoseNotAvailableYet { timestamp_ns: 5 })),
            LookupStatus::PoseNotAvailableYet
        );
        assert_eq!(
            LookupError::PoseNeverAvailable { timestamp_ns: -1 }.to_string(),
            "Pose at -1 ns is never available"
        );
    }
}
