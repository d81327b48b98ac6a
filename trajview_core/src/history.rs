//! Bounded history of recent predictions for the fading overlay.

use crate::geometry::{Pose2, Trajectory};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use trajview_env::FrameIndex;

/// One prediction, kept in the ego frame of the sample that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub source_frame: FrameIndex,
    /// Absolute time of the source sample
    pub source_time: f64,
    /// Ego pose at the source sample; the trajectory is relative to it
    pub anchor: Pose2,
    pub trajectory: Trajectory,
    /// Horizon the prediction was normalized to
    pub horizon: f64,
    /// Wall-clock inference latency
    pub latency: Duration,
}

/// A record plus the number of pushes since it was added.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub record: PredictionRecord,
    pub age: usize,
}

/// Ring buffer of the last `depth` predictions.
///
/// Owned by a single run and reset between scenes, never mid-run.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    depth: usize,
    decay: f64,
    base_opacity: f64,
    /// Oldest at the front
    entries: VecDeque<HistoryEntry>,
}

impl HistoryBuffer {
    pub fn new(depth: usize, decay: f64, base_opacity: f64) -> Self {
        Self {
            depth,
            decay,
            base_opacity,
            entries: VecDeque::with_capacity(depth),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Ages every entry, appends `record` at age 0 and evicts beyond depth.
    ///
    /// Returns the evicted record, if any.
    pub fn push(&mut self, record: PredictionRecord) -> Option<PredictionRecord> {
        if self.depth == 0 {
            return Some(record);
        }
        for entry in self.entries.iter_mut() {
            entry.age += 1;
        }
        self.entries.push_back(HistoryEntry { record, age: 0 });
        if self.entries.len() > self.depth {
            self.entries.pop_front().map(|e| e.record)
        } else {
            None
        }
    }

    /// `base_opacity · decay^age`
    pub fn opacity(&self, entry: &HistoryEntry) -> f64 {
        self.opacity_at(entry.age)
    }

    pub fn opacity_at(&self, age: usize) -> f64 {
        let exponent = i32::try_from(age).unwrap_or(i32::MAX);
        self.base_opacity * self.decay.powi(exponent)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Entries older than the latest push, oldest first.
    pub fn prior(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(|e| e.age > 0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{TimedPose, TrajectoryKind};
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn record(frame: usize) -> PredictionRecord {
        let poses = (1..=8).map(|k| TimedPose::new(k as f64 * 0.5, k as f64, 0.0, 0.0)).collect();
        PredictionRecord {
            source_frame: FrameIndex(frame),
            source_time: frame as f64 * 0.5,
            anchor: Pose2::new(frame as f64, 0.0, 0.0),
            trajectory: Trajectory::new(TrajectoryKind::Prediction, frame as f64 * 0.5, poses).unwrap(),
            horizon: 4.0,
            latency: Duration::from_millis(12),
        }
    }

    #[test]
    fn test_depth_five_decay_point_seven() {
        let mut history = HistoryBuffer::new(5, 0.7, 0.8);
        for frame in 0..5 {
            assert!(history.push(record(frame)).is_none());
        }
        let evicted = history.push(record(5)).unwrap();
        assert_eq!(evicted.source_frame, FrameIndex(0));
        assert_eq!(history.len(), 5);

        let ages: Vec<usize> = history.iter().map(|e| e.age).collect();
        assert_eq!(ages, vec![4, 3, 2, 1, 0]);
        let frames: Vec<usize> = history.iter().map(|e| e.record.source_frame.get()).collect();
        assert_eq!(frames, vec![1, 2, 3, 4, 5]);

        for entry in history.iter() {
            assert_relative_eq!(history.opacity(entry), 0.8 * 0.7f64.powi(entry.age as i32), epsilon = 1e-12);
        }
        assert_eq!(history.latest().unwrap().record.source_frame, FrameIndex(5));
        assert_eq!(history.prior().count(), 4);
    }

    #[test]
    fn test_zero_depth_retains_nothing() {
        let mut history = HistoryBuffer::new(0, 0.7, 0.8);
        let returned = history.push(record(0));
        assert_eq!(returned.unwrap().source_frame, FrameIndex(0));
        assert!(history.is_empty());
        assert!(history.latest().is_none());
    }

    #[test]
    fn test_new_buffer_starts_empty() {
        let mut history = HistoryBuffer::new(5, 0.7, 0.8);
        assert!(history.is_empty());
        assert_eq!(history.prior().count(), 0);
        history.push(record(0));
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().age, 0);
    }

    #[test]
    fn test_reset_clears() {
        let mut history = HistoryBuffer::new(3, 0.5, 1.0);
        history.push(record(0));
        history.push(record(1));
        history.reset();
        assert!(history.is_empty());
        history.push(record(2));
        assert_eq!(history.latest().unwrap().age, 0);
    }

    #[test]
    fn test_zero_decay_hides_all_but_latest() {
        let history = HistoryBuffer::new(3, 0.0, 0.8);
        assert_relative_eq!(history.opacity_at(0), 0.8);
        assert_relative_eq!(history.opacity_at(1), 0.0);
    }

    proptest! {
        #[test]
        fn prop_ages_are_contiguous(depth in 0usize..10, pushes in 0usize..30) {
            let mut history = HistoryBuffer::new(depth, 0.7, 0.8);
            for frame in 0..pushes {
                history.push(record(frame));
            }
            prop_assert_eq!(history.len(), depth.min(pushes));
            let ages: Vec<usize> = history.iter().map(|e| e.age).collect();
            let expected: Vec<usize> = (0..history.len()).rev().collect();
            prop_assert_eq!(ages, expected);
        }
    }
}
