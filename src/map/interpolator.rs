//! Trajectory interpolation over mission vertices.

use crate::core::math::interpolation_factor;
use crate::core::types::Transform3D;

use super::model::Mission;

/// Inclusive time range covered by a mission, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Earliest vertex timestamp.
    pub min_ns: i64,
    /// Latest vertex timestamp.
    pub max_ns: i64,
}

impl TimeRange {
    /// Check if `timestamp_ns` lies within the range.
    #[inline]
    pub fn contains(&self, timestamp_ns: i64) -> bool {
        timestamp_ns >= self.min_ns && timestamp_ns <= self.max_ns
    }
}

/// Interpolates body poses of a mission at arbitrary timestamps.
pub trait TrajectoryInterpolator: Send + Sync {
    /// Time range for which [`pose_at`](Self::pose_at) is defined.
    ///
    /// Returns `None` for a mission without vertices.
    fn time_range(&self, mission: &Mission) -> Option<TimeRange>;

    /// Body pose in the mission frame (`T_M_B`) at `timestamp_ns`.
    ///
    /// Returns `None` outside of [`time_range`](Self::time_range).
    fn pose_at(&self, mission: &Mission, timestamp_ns: i64) -> Option<Transform3D>;
}

/// Linear interpolation for translation, slerp for rotation.
///
/// Expects vertices in time order (see [`Mission::sort_vertices`]);
/// `FolderMapStore` sorts them when loading a folder.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl TrajectoryInterpolator for LinearInterpolator {
    fn time_range(&self, mission: &Mission) -> Option<TimeRange> {
        let first = mission.vertices.first()?;
        let last = mission.vertices.last()?;
        Some(TimeRange {
            min_ns: first.timestamp_ns,
            max_ns: last.timestamp_ns,
        })
    }

    fn pose_at(&self, mission: &Mission, timestamp_ns: i64) -> Option<Transform3D> {
        let range = self.time_range(mission)?;
        if !range.contains(timestamp_ns) {
            return None;
        }

        let vertices = &mission.vertices;
        // Index of the first vertex at or after the query time.
        let upper = vertices.partition_point(|v| v.timestamp_ns < timestamp_ns);
        let end = vertices.get(upper)?;
        if end.timestamp_ns == timestamp_ns || upper == 0 {
            return Some(end.t_m_b);
        }

        let start = &vertices[upper - 1];
        let t = interpolation_factor(start.timestamp_ns, end.timestamp_ns, timestamp_ns);
        Some(Transform3D::interpolate(&start.t_m_b, &end.t_m_b, t))
    }
}
