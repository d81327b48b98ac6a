//! Planar poses, timed trajectories and the per-sample ego frame.
//!
//! Conventions: the global frame is the scene's map frame. An ego frame has
//! its origin at the ego vehicle, `x` pointing forward and `y` to the left.
//! Headings are radians, counter-clockwise, normalized to (-π, π].

use crate::error::TrajectoryError;
use nalgebra::{Isometry2, Point2, Vector2};
use serde::{Deserialize, Serialize};

/// A planar pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Pose2 {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose2 {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    pub fn isometry(&self) -> Isometry2<f64> {
        Isometry2::new(Vector2::new(self.x, self.y), self.heading)
    }

    pub fn from_isometry(iso: &Isometry2<f64>) -> Self {
        Self {
            x: iso.translation.vector.x,
            y: iso.translation.vector.y,
            heading: iso.rotation.angle(),
        }
    }

    /// Composes `local`, expressed relative to `self`, into `self`'s parent frame.
    pub fn compose(&self, local: &Pose2) -> Pose2 {
        Pose2::from_isometry(&(self.isometry() * local.isometry()))
    }

    pub fn distance_to(&self, other: &Pose2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.heading.is_finite()
    }
}

/// A pose at a time offset from the owning trajectory's origin instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedPose {
    /// Seconds after the trajectory origin
    pub offset: f64,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl TimedPose {
    pub fn new(offset: f64, x: f64, y: f64, heading: f64) -> Self {
        Self { offset, x, y, heading }
    }

    pub fn at(offset: f64, pose: Pose2) -> Self {
        Self::new(offset, pose.x, pose.y, pose.heading)
    }

    pub fn pose(&self) -> Pose2 {
        Pose2::new(self.x, self.y, self.heading)
    }
}

/// Where a trajectory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryKind {
    Prediction,
    GroundTruth,
    BaselineReference,
}

impl TrajectoryKind {
    pub fn name(&self) -> &'static str {
        match self {
            TrajectoryKind::Prediction => "prediction",
            TrajectoryKind::GroundTruth => "ground_truth",
            TrajectoryKind::BaselineReference => "baseline_reference",
        }
    }
}

impl std::fmt::Display for TrajectoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Time-sorted sequence of poses measured from an absolute origin instant.
///
/// Offsets are strictly increasing; this is checked on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    kind: TrajectoryKind,
    /// Absolute time (seconds) that offsets are measured from
    origin: f64,
    poses: Vec<TimedPose>,
}

impl Trajectory {
    pub fn new(kind: TrajectoryKind, origin: f64, poses: Vec<TimedPose>) -> Result<Self, TrajectoryError> {
        for (index, pose) in poses.iter().enumerate() {
            if !(pose.offset.is_finite() && pose.pose().is_finite()) {
                return Err(TrajectoryError::NonFinite { index });
            }
            if index > 0 {
                let previous = poses[index - 1].offset;
                if pose.offset <= previous {
                    return Err(TrajectoryError::NotStrictlyIncreasing {
                        index,
                        previous,
                        offset: pose.offset,
                    });
                }
            }
        }
        Ok(Self { kind, origin, poses })
    }

    pub fn empty(kind: TrajectoryKind, origin: f64) -> Self {
        Self { kind, origin, poses: Vec::new() }
    }

    /// Builds from poses already known to be sorted (filtered or rebased
    /// from a valid trajectory).
    pub(crate) fn from_sorted(kind: TrajectoryKind, origin: f64, poses: Vec<TimedPose>) -> Self {
        debug_assert!(poses.windows(2).all(|w| w[0].offset < w[1].offset));
        Self { kind, origin, poses }
    }

    pub fn kind(&self) -> TrajectoryKind {
        self.kind
    }

    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn poses(&self) -> &[TimedPose] {
        &self.poses
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn first(&self) -> Option<&TimedPose> {
        self.poses.first()
    }

    pub fn last(&self) -> Option<&TimedPose> {
        self.poses.last()
    }

    /// Offset of the final pose (0 for an empty trajectory).
    pub fn horizon(&self) -> f64 {
        self.poses.last().map(|p| p.offset).unwrap_or(0.0)
    }

    pub fn absolute_time(&self, pose: &TimedPose) -> f64 {
        self.origin + pose.offset
    }

    pub fn points(&self) -> impl Iterator<Item = Point2<f64>> + '_ {
        self.poses.iter().map(|p| Point2::new(p.x, p.y))
    }

    /// Applies a rigid pose mapping, keeping timing untouched.
    pub fn map_poses(&self, f: impl Fn(Pose2) -> Pose2) -> Trajectory {
        let poses = self
            .poses
            .iter()
            .map(|p| TimedPose::at(p.offset, f(p.pose())))
            .collect();
        Self::from_sorted(self.kind, self.origin, poses)
    }

    /// Linearly interpolated position at `offset`, if it lies within the trajectory.
    pub fn position_at(&self, offset: f64) -> Option<Point2<f64>> {
        let first = self.poses.first()?;
        let last = self.poses.last()?;
        if offset < first.offset - 1e-9 || offset > last.offset + 1e-9 {
            return None;
        }
        let upper = self.poses.partition_point(|p| p.offset < offset);
        if upper == 0 {
            return Some(Point2::new(first.x, first.y));
        }
        if upper >= self.poses.len() {
            return Some(Point2::new(last.x, last.y));
        }
        let a = &self.poses[upper - 1];
        let b = &self.poses[upper];
        let t = (offset - a.offset) / (b.offset - a.offset);
        Some(Point2::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t))
    }
}

/// Rigid transform into the ego frame anchored at one sample's ego pose.
///
/// Every trajectory drawn for a sample goes through the same instance; it is
/// rebuilt for each sample because the ego moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EgoTransform {
    anchor: Pose2,
    world_to_ego: Isometry2<f64>,
}

impl EgoTransform {
    pub fn anchored_at(ego: Pose2) -> Self {
        Self {
            anchor: ego,
            world_to_ego: ego.isometry().inverse(),
        }
    }

    pub fn anchor(&self) -> Pose2 {
        self.anchor
    }

    /// Global pose → ego frame.
    pub fn to_ego(&self, global: Pose2) -> Pose2 {
        Pose2::from_isometry(&(self.world_to_ego * global.isometry()))
    }

    pub fn point_to_ego(&self, global: Point2<f64>) -> Point2<f64> {
        self.world_to_ego * global
    }

    /// Global trajectory → ego frame.
    pub fn trajectory_to_ego(&self, global: &Trajectory) -> Trajectory {
        global.map_poses(|p| self.to_ego(p))
    }

    /// Trajectory expressed relative to `source_anchor` → this ego frame.
    pub fn relative_to_ego(&self, source_anchor: Pose2, local: &Trajectory) -> Trajectory {
        local.map_poses(|p| self.to_ego(source_anchor.compose(&p)))
    }
}

/// Wraps an angle into (-π, π].
pub fn normalize_angle(angle: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let mut a = angle % two_pi;
    if a <= -std::f64::consts::PI {
        a += two_pi;
    } else if a > std::f64::consts::PI {
        a -= two_pi;
    }
    a
}
