//! Timeline sampling: which scene frames back which animation frames.

use crate::error::ConfigError;
use crate::scene::SceneTimeline;
use serde::{Deserialize, Serialize};
use trajview_env::FrameIndex;

pub const DEFAULT_SAMPLING_RATE: f64 = 2.0;
pub const DEFAULT_FRAME_STEP: usize = 1;

/// Slack for floating-point products such as `6.0 * 2.0`.
const COUNT_EPSILON: f64 = 1e-9;

/// Parameters that shape a run's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleParams {
    /// Timeline length in seconds
    pub total_duration: f64,
    /// Samples per second
    pub sampling_rate: f64,
    pub start_frame_index: usize,
    pub frame_step: usize,
}

impl ScheduleParams {
    pub fn new(total_duration: f64, sampling_rate: f64) -> Self {
        Self {
            total_duration,
            sampling_rate,
            start_frame_index: 0,
            frame_step: DEFAULT_FRAME_STEP,
        }
    }

    pub fn with_start_frame(mut self, index: usize) -> Self {
        self.start_frame_index = index;
        self
    }

    pub fn with_frame_step(mut self, step: usize) -> Self {
        self.frame_step = step;
        self
    }
}

/// How sample times map onto scene frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Evenly spaced at `1 / sampling_rate`, nearest frame backs each sample
    Rate,
    /// Every `frame_step`-th scene frame
    FrameStep,
}

/// One scheduled sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Position in the schedule, 0-based
    pub ordinal: usize,
    pub frame_index: FrameIndex,
    /// Absolute sample time in seconds
    pub time: f64,
    /// Seconds since the first sample
    pub elapsed: f64,
}

/// Finite, restartable sequence of samples. Entries are computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSchedule {
    mode: SamplingMode,
    start_frame: usize,
    start_time: f64,
    /// Seconds between samples
    step: f64,
    frame_interval: f64,
    frame_step: usize,
    count: usize,
}

impl RunSchedule {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    /// Seconds between consecutive samples.
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn get(&self, ordinal: usize) -> Option<Sample> {
        if ordinal >= self.count {
            return None;
        }
        let elapsed = ordinal as f64 * self.step;
        let offset = match self.mode {
            SamplingMode::Rate => {
                let frames = (elapsed / self.frame_interval).round();
                if !(frames.is_finite() && frames < usize::MAX as f64) {
                    return None;
                }
                frames as usize
            }
            SamplingMode::FrameStep => ordinal.checked_mul(self.frame_step)?,
        };
        let frame = self.start_frame.checked_add(offset)?;
        Some(Sample {
            ordinal,
            frame_index: FrameIndex(frame),
            time: self.start_time + elapsed,
            elapsed,
        })
    }

    pub fn last(&self) -> Option<Sample> {
        self.count.checked_sub(1).and_then(|k| self.get(k))
    }

    pub fn iter(&self) -> ScheduleIter<'_> {
        ScheduleIter { schedule: self, next: 0 }
    }
}

impl<'a> IntoIterator for &'a RunSchedule {
    type Item = Sample;
    type IntoIter = ScheduleIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`RunSchedule`]; create a new one to restart.
#[derive(Debug, Clone)]
pub struct ScheduleIter<'a> {
    schedule: &'a RunSchedule,
    next: usize,
}

impl Iterator for ScheduleIter<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        let sample = self.schedule.get(self.next)?;
        self.next += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.schedule.count.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ScheduleIter<'_> {}

/// Builds the run schedule and checks it against the scene.
///
/// `frame_step` and a non-default `sampling_rate` are mutually exclusive.
/// With the default rate and a custom step, the step alone defines spacing.
pub fn build_schedule(params: &ScheduleParams, scene: &SceneTimeline) -> Result<RunSchedule, ConfigError> {
    if !(params.sampling_rate.is_finite() && params.sampling_rate > 0.0) {
        return Err(ConfigError::InvalidSamplingRate(params.sampling_rate));
    }
    if !(params.total_duration.is_finite() && params.total_duration > 0.0) {
        return Err(ConfigError::InvalidDuration(params.total_duration));
    }
    if params.frame_step == 0 {
        return Err(ConfigError::InvalidFrameStep);
    }
    if !(scene.frame_interval.is_finite() && scene.frame_interval > 0.0) {
        return Err(ConfigError::InvalidFrameInterval(scene.frame_interval));
    }

    let custom_rate = params.sampling_rate != DEFAULT_SAMPLING_RATE;
    let custom_step = params.frame_step != DEFAULT_FRAME_STEP;
    if custom_rate && custom_step {
        return Err(ConfigError::ConflictingSampling {
            sampling_rate: params.sampling_rate,
            frame_step: params.frame_step,
        });
    }

    if params.start_frame_index >= scene.frame_count {
        return Err(ConfigError::FrameOutOfRange {
            index: params.start_frame_index,
            frame_count: scene.frame_count,
        });
    }

    let (mode, step) = if custom_step {
        (SamplingMode::FrameStep, params.frame_step as f64 * scene.frame_interval)
    } else {
        (SamplingMode::Rate, 1.0 / params.sampling_rate)
    };
    // A schedule never holds more samples than the scene has frames
    let spans = (params.total_duration / step + COUNT_EPSILON).floor();
    if !(spans.is_finite() && spans < scene.frame_count as f64) {
        return Err(ConfigError::FrameOutOfRange {
            index: params.start_frame_index.saturating_add(spans as usize),
            frame_count: scene.frame_count,
        });
    }
    let count = spans as usize + 1;

    let schedule = RunSchedule {
        mode,
        start_frame: params.start_frame_index,
        start_time: scene.timestamp_of(FrameIndex(params.start_frame_index)),
        step,
        frame_interval: scene.frame_interval,
        frame_step: params.frame_step,
        count,
    };

    match schedule.last() {
        Some(last) if last.frame_index.get() < scene.frame_count => {}
        last => {
            return Err(ConfigError::FrameOutOfRange {
                index: last.map_or(usize::MAX, |s| s.frame_index.get()),
                frame_count: scene.frame_count,
            });
        }
    }

    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn scene(frame_count: usize) -> SceneTimeline {
        SceneTimeline {
            frame_count,
            frame_interval: 0.5,
            start_timestamp: 100.0,
        }
    }

    #[test]
    fn test_two_hertz_for_six_seconds() {
        let schedule = build_schedule(&ScheduleParams::new(6.0, 2.0), &scene(20)).unwrap();
        assert_eq!(schedule.len(), 13);
        assert_eq!(schedule.mode(), SamplingMode::Rate);

        let elapsed: Vec<f64> = schedule.iter().map(|s| s.elapsed).collect();
        let expected: Vec<f64> = (0..13).map(|k| k as f64 * 0.5).collect();
        assert_eq!(elapsed, expected);

        let frames: Vec<usize> = schedule.iter().map(|s| s.frame_index.get()).collect();
        assert_eq!(frames, (0..13).collect::<Vec<_>>());
        assert_relative_eq!(schedule.get(0).unwrap().time, 100.0);
    }

    #[test]
    fn test_schedule_is_restartable() {
        let schedule = build_schedule(&ScheduleParams::new(2.0, 2.0), &scene(10)).unwrap();
        let first: Vec<Sample> = schedule.iter().collect();
        let second: Vec<Sample> = (&schedule).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(schedule.iter().len(), 5);
    }

    #[test]
    fn test_invalid_parameters() {
        let timeline = scene(20);
        assert_eq!(
            build_schedule(&ScheduleParams::new(6.0, 0.0), &timeline),
            Err(ConfigError::InvalidSamplingRate(0.0))
        );
        assert_eq!(
            build_schedule(&ScheduleParams::new(-1.0, 2.0), &timeline),
            Err(ConfigError::InvalidDuration(-1.0))
        );
        assert_eq!(
            build_schedule(&ScheduleParams::new(6.0, 2.0).with_frame_step(0), &timeline),
            Err(ConfigError::InvalidFrameStep)
        );
    }

    #[test]
    fn test_schedule_past_scene_end_is_rejected() {
        // 13 samples need frames 0..=12
        let err = build_schedule(&ScheduleParams::new(6.0, 2.0), &scene(12)).unwrap_err();
        assert_eq!(err, ConfigError::FrameOutOfRange { index: 12, frame_count: 12 });

        let err = build_schedule(&ScheduleParams::new(1.0, 2.0).with_start_frame(12), &scene(12)).unwrap_err();
        assert_eq!(err, ConfigError::FrameOutOfRange { index: 12, frame_count: 12 });
    }

    #[test]
    fn test_frame_step_and_rate_are_exclusive() {
        let params = ScheduleParams::new(6.0, 4.0).with_frame_step(2);
        assert!(matches!(
            build_schedule(&params, &scene(40)),
            Err(ConfigError::ConflictingSampling { frame_step: 2, .. })
        ));
    }

    #[test]
    fn test_frame_step_mode() {
        let params = ScheduleParams::new(4.0, DEFAULT_SAMPLING_RATE)
            .with_start_frame(3)
            .with_frame_step(2);
        let schedule = build_schedule(&params, &scene(20)).unwrap();
        assert_eq!(schedule.mode(), SamplingMode::FrameStep);
        // step = 2 frames * 0.5 s
        assert_eq!(schedule.len(), 5);
        let frames: Vec<usize> = schedule.iter().map(|s| s.frame_index.get()).collect();
        assert_eq!(frames, vec![3, 5, 7, 9, 11]);
        assert_relative_eq!(schedule.get(1).unwrap().time, 101.5 + 1.0);
    }

    #[test]
    fn test_rate_mode_picks_nearest_frame() {
        let params = ScheduleParams::new(2.0, 4.0);
        let schedule = build_schedule(&params, &scene(10)).unwrap();
        let frames: Vec<usize> = schedule.iter().map(|s| s.frame_index.get()).collect();
        // 0.25 s rounds half away from zero: 0.5 -> 1
        assert_eq!(frames, vec![0, 1, 1, 2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn test_extreme_rates_are_rejected_not_overflowed() {
        let timeline = scene(20);
        let err = build_schedule(&ScheduleParams::new(1.0, 1e300), &timeline).unwrap_err();
        assert!(matches!(err, ConfigError::FrameOutOfRange { frame_count: 20, .. }));

        let err = build_schedule(&ScheduleParams::new(1e300, 2.0), &timeline).unwrap_err();
        assert!(matches!(err, ConfigError::FrameOutOfRange { frame_count: 20, .. }));

        // 21 samples over a 20-frame scene
        let err = build_schedule(&ScheduleParams::new(5.0, 4.0), &timeline).unwrap_err();
        assert!(matches!(err, ConfigError::FrameOutOfRange { .. }));

        let params = ScheduleParams::new(1e300, DEFAULT_SAMPLING_RATE).with_frame_step(usize::MAX);
        assert!(matches!(
            build_schedule(&params, &timeline),
            Err(ConfigError::FrameOutOfRange { .. })
        ));
    }

    #[test]
    fn test_get_does_not_overflow() {
        let schedule = RunSchedule {
            mode: SamplingMode::FrameStep,
            start_frame: usize::MAX - 1,
            start_time: 0.0,
            step: 1.0,
            frame_interval: 1.0,
            frame_step: 2,
            count: 3,
        };
        assert_eq!(schedule.get(0).map(|s| s.frame_index.get()), Some(usize::MAX - 1));
        assert_eq!(schedule.get(1), None);
        assert_eq!(schedule.iter().count(), 1);
    }

    proptest! {
        #[test]
        fn prop_samples_evenly_spaced(rate in 0.5f64..10.0, duration in 0.5f64..20.0) {
            let timeline = SceneTimeline { frame_count: 10_000, frame_interval: 0.05, start_timestamp: 12.0 };
            let schedule = build_schedule(&ScheduleParams::new(duration, rate), &timeline).unwrap();
            let expected_count = (duration * rate + 1e-9).floor() as usize + 1;
            prop_assert_eq!(schedule.len(), expected_count);

            let samples: Vec<Sample> = schedule.iter().collect();
            for pair in samples.windows(2) {
                prop_assert!(pair[1].time > pair[0].time);
                prop_assert!((pair[1].time - pair[0].time - 1.0 / rate).abs() < 1e-9);
                prop_assert!(pair[1].frame_index >= pair[0].frame_index);
            }
        }
    }
}
