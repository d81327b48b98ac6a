//! Run configuration.

use crate::error::ConfigError;
use crate::timeline::{ScheduleParams, DEFAULT_FRAME_STEP, DEFAULT_SAMPLING_RATE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use trajview_env::Device;

/// Parameters for one animation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Samples per second of scene time
    pub sampling_rate: f64,
    /// Seconds of scene time to animate
    pub total_duration: f64,
    /// Seconds each prediction covers
    pub prediction_horizon: f64,
    /// Prior predictions kept for the fading overlay (0 disables it)
    pub history_depth: usize,
    /// Per-age opacity multiplier in [0, 1]
    pub decay: f64,
    /// Opacity of an age-0 overlay
    pub base_opacity: f64,
    /// Playback frames per second
    pub fps: f64,
    pub start_frame_index: usize,
    /// Scene frames between samples; exclusive with a custom `sampling_rate`
    pub frame_step: usize,
    /// Predictor calls allowed in flight at once
    pub worker_cap: usize,
    /// Seconds before a predictor call is abandoned
    pub predictor_timeout: f64,
    pub device: Device,
    pub output_dir: PathBuf,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            sampling_rate: DEFAULT_SAMPLING_RATE,
            total_duration: 8.0,
            prediction_horizon: 4.0,
            history_depth: 5,
            decay: 0.7,
            base_opacity: 0.8,
            fps: 4.0,
            start_frame_index: 0,
            frame_step: DEFAULT_FRAME_STEP,
            worker_cap: 2,
            predictor_timeout: 10.0,
            device: Device::Cpu,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl AnimationConfig {
    /// Checks every field that does not depend on the scene. Scene-dependent
    /// checks happen when the schedule is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sampling_rate.is_finite() && self.sampling_rate > 0.0) {
            return Err(ConfigError::InvalidSamplingRate(self.sampling_rate));
        }
        if !(self.total_duration.is_finite() && self.total_duration > 0.0) {
            return Err(ConfigError::InvalidDuration(self.total_duration));
        }
        if !(self.prediction_horizon.is_finite() && self.prediction_horizon > 0.0) {
            return Err(ConfigError::InvalidHorizon(self.prediction_horizon));
        }
        if !(0.0..=1.0).contains(&self.decay) {
            return Err(ConfigError::InvalidDecay(self.decay));
        }
        if !(self.base_opacity > 0.0 && self.base_opacity <= 1.0) {
            return Err(ConfigError::InvalidOpacity(self.base_opacity));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(ConfigError::InvalidFps(self.fps));
        }
        if self.frame_step == 0 {
            return Err(ConfigError::InvalidFrameStep);
        }
        if self.worker_cap == 0 {
            return Err(ConfigError::InvalidWorkerCap);
        }
        if !(self.predictor_timeout.is_finite() && self.predictor_timeout > 0.0) {
            return Err(ConfigError::InvalidTimeout(self.predictor_timeout));
        }
        if self.sampling_rate != DEFAULT_SAMPLING_RATE && self.frame_step != DEFAULT_FRAME_STEP {
            return Err(ConfigError::ConflictingSampling {
                sampling_rate: self.sampling_rate,
                frame_step: self.frame_step,
            });
        }
        Ok(())
    }

    pub fn schedule_params(&self) -> ScheduleParams {
        ScheduleParams::new(self.total_duration, self.sampling_rate)
            .with_start_frame(self.start_frame_index)
            .with_frame_step(self.frame_step)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.predictor_timeout)
    }

    /// `<output_dir>/sliding_<token>.gif`
    pub fn artifact_path(&self, token: &str) -> PathBuf {
        self.output_dir.join(format!("sliding_{}.gif", token))
    }

    /// `<output_dir>/run_summary.json`
    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join("run_summary.json")
    }
}
