//! Reference time-slicing.
//!
//! Cuts ground-truth and baseline trajectories down to the prediction window
//! of one sample and rebases them so offset 0 is the window start.

use crate::error::TrajectoryError;
use crate::geometry::{TimedPose, Trajectory, TrajectoryKind};
use crate::scene::{ReferenceSamples, ReferenceTrajectory};
use serde::{Deserialize, Serialize};

/// Spacing assumed for references that carry no per-pose time.
pub const FALLBACK_INTERVAL: f64 = 0.5;

/// Closed-interval tolerance on window bounds.
const WINDOW_EPSILON: f64 = 1e-9;

/// How a sliced reference was timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimingFidelity {
    /// Per-pose timestamps from the source data
    #[default]
    Exact,
    /// Times inferred from sample index and [`FALLBACK_INTERVAL`]
    IndexApproximated,
}

impl TimingFidelity {
    pub fn is_approximate(&self) -> bool {
        matches!(self, TimingFidelity::IndexApproximated)
    }
}

/// A reference cut to one sample's window.
#[derive(Debug, Clone, PartialEq)]
pub struct SlicedReference {
    pub trajectory: Trajectory,
    pub fidelity: TimingFidelity,
}

impl SlicedReference {
    pub fn kind(&self) -> TrajectoryKind {
        self.trajectory.kind()
    }
}

/// Keeps the poses whose absolute time lies in `[window_start, window_end]`
/// and rebases them onto `window_start`.
///
/// An empty window (`window_end < window_start`) or a trajectory entirely
/// outside it yields an empty trajectory with origin `window_start`.
pub fn slice(trajectory: &Trajectory, window_start: f64, window_end: f64) -> Trajectory {
    let origin = trajectory.origin();
    let poses: Vec<TimedPose> = trajectory
        .poses()
        .iter()
        .filter(|p| {
            let t = origin + p.offset;
            t >= window_start - WINDOW_EPSILON && t <= window_end + WINDOW_EPSILON
        })
        // Written as offset + (origin - start) so a rebased trajectory maps
        // onto itself exactly when sliced again with the same bounds.
        .map(|p| TimedPose { offset: p.offset + (origin - window_start), ..*p })
        .collect();
    Trajectory::from_sorted(trajectory.kind(), window_start, poses)
}

/// Times a reference's samples and slices them to the window.
pub fn slice_reference(
    reference: &ReferenceTrajectory,
    window_start: f64,
    window_end: f64,
) -> Result<SlicedReference, TrajectoryError> {
    let (timed, fidelity) = time_reference(reference)?;
    Ok(SlicedReference {
        trajectory: slice(&timed, window_start, window_end),
        fidelity,
    })
}

/// Turns a reference into a [`Trajectory`] anchored at its start time.
pub fn time_reference(reference: &ReferenceTrajectory) -> Result<(Trajectory, TimingFidelity), TrajectoryError> {
    match &reference.samples {
        ReferenceSamples::Timestamped(poses) => Ok((
            Trajectory::new(reference.kind, reference.start_time, poses.clone())?,
            TimingFidelity::Exact,
        )),
        ReferenceSamples::Untimed(poses) => {
            let timed = poses
                .iter()
                .enumerate()
                .map(|(i, pose)| TimedPose::at(i as f64 * FALLBACK_INTERVAL, *pose))
                .collect();
            Ok((
                Trajectory::new(reference.kind, reference.start_time, timed)?,
                TimingFidelity::IndexApproximated,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Pose2;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn ground_truth(start: f64, n: usize, dt: f64) -> Trajectory {
        let poses = (0..n)
            .map(|i| TimedPose::new(i as f64 * dt, i as f64 * 2.0, 0.0, 0.0))
            .collect();
        Trajectory::new(TrajectoryKind::GroundTruth, start, poses).unwrap()
    }

    #[test]
    fn test_slice_window_two_to_six() {
        let gt = ground_truth(0.0, 11, 1.0);
        let sliced = slice(&gt, 2.0, 6.0);

        assert_eq!(sliced.len(), 5);
        assert_relative_eq!(sliced.origin(), 2.0);
        let offsets: Vec<f64> = sliced.poses().iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        let times: Vec<f64> = sliced.poses().iter().map(|p| sliced.absolute_time(p)).collect();
        assert_eq!(times, vec![2.0, 3.0, 4.0, 5.0, 6.0]);
        // Positions are untouched
        assert_relative_eq!(sliced.first().unwrap().x, 4.0);
    }

    #[test]
    fn test_slice_outside_window_is_empty() {
        let gt = ground_truth(0.0, 5, 1.0);
        let sliced = slice(&gt, 10.0, 14.0);
        assert!(sliced.is_empty());
        assert_eq!(sliced.origin(), 10.0);
        assert_eq!(sliced.kind(), TrajectoryKind::GroundTruth);

        assert!(slice(&gt, 3.0, 1.0).is_empty());
    }

    #[test]
    fn test_untimed_reference_is_flagged() {
        let reference = ReferenceTrajectory {
            kind: TrajectoryKind::BaselineReference,
            start_time: 10.0,
            samples: ReferenceSamples::Untimed((0..10).map(|i| Pose2::new(i as f64, 0.0, 0.0)).collect()),
        };
        let sliced = slice_reference(&reference, 11.0, 12.0).unwrap();
        assert_eq!(sliced.fidelity, TimingFidelity::IndexApproximated);
        assert!(sliced.fidelity.is_approximate());
        // indices 2..=4 at 0.5 s spacing
        let xs: Vec<f64> = sliced.trajectory.poses().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0]);
        assert_eq!(sliced.kind(), TrajectoryKind::BaselineReference);
    }

    #[test]
    fn test_timestamped_reference_is_exact() {
        let reference = ReferenceTrajectory {
            kind: TrajectoryKind::GroundTruth,
            start_time: 0.0,
            samples: ReferenceSamples::Timestamped(ground_truth(0.0, 4, 1.0).poses().to_vec()),
        };
        let sliced = slice_reference(&reference, 0.0, 10.0).unwrap();
        assert_eq!(sliced.fidelity, TimingFidelity::Exact);
        assert_eq!(sliced.trajectory.len(), 4);
    }

    #[test]
    fn test_malformed_reference_is_rejected() {
        let reference = ReferenceTrajectory {
            kind: TrajectoryKind::GroundTruth,
            start_time: 0.0,
            samples: ReferenceSamples::Timestamped(vec![
                TimedPose::new(1.0, 0.0, 0.0, 0.0),
                TimedPose::new(0.5, 0.0, 0.0, 0.0),
            ]),
        };
        assert!(slice_reference(&reference, 0.0, 2.0).is_err());
    }

    proptest! {
        #[test]
        fn prop_slice_is_idempotent(
            start in -50.0f64..50.0,
            dt in 0.05f64..1.0,
            n in 1usize..80,
            a in -10.0f64..60.0,
            len in 0.0f64..20.0,
        ) {
            let gt = ground_truth(start, n, dt);
            let once = slice(&gt, a, a + len);
            let twice = slice(&once, a, a + len);
            prop_assert_eq!(&once, &twice);

            for pose in once.poses() {
                let t = once.absolute_time(pose);
                prop_assert!(t >= a - 1e-6 && t <= a + len + 1e-6);
            }
        }
    }
}
