//! Error taxonomy for the animation engine.
//!
//! Run-level errors ([`ConfigError`], [`EncodingError`]) abort a run.
//! Per-sample errors ([`PredictionFailure`], [`RenderError`], and
//! `EnvError::DataUnavailable` from the accessor) are recorded as
//! [`FailureReason`]s and the run carries on with the next sample.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trajview_env::{EnvError, FrameIndex};

/// Invalid schedule or run parameters. Raised before any sample is processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sampling_rate must be > 0 Hz, got {0}")]
    InvalidSamplingRate(f64),

    #[error("total_duration must be > 0 s, got {0}")]
    InvalidDuration(f64),

    #[error("prediction_horizon must be > 0 s, got {0}")]
    InvalidHorizon(f64),

    #[error("decay must lie in [0, 1], got {0}")]
    InvalidDecay(f64),

    #[error("base_opacity must lie in (0, 1], got {0}")]
    InvalidOpacity(f64),

    #[error("fps must be > 0, got {0}")]
    InvalidFps(f64),

    #[error("frame_step must be >= 1")]
    InvalidFrameStep,

    #[error("worker_cap must be >= 1")]
    InvalidWorkerCap,

    #[error("predictor_timeout must be > 0 s, got {0}")]
    InvalidTimeout(f64),

    #[error("scene frame interval must be > 0 s, got {0}")]
    InvalidFrameInterval(f64),

    /// `frame_step` and `sampling_rate` select the timeline in different ways
    #[error("frame_step ({frame_step}) and sampling_rate ({sampling_rate} Hz) cannot both be customised")]
    ConflictingSampling { sampling_rate: f64, frame_step: usize },

    #[error("frame {index} is outside the scene ({frame_count} frames)")]
    FrameOutOfRange { index: usize, frame_count: usize },
}

/// A trajectory violated its ordering invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrajectoryError {
    #[error("pose {index} has offset {offset} which does not follow {previous}")]
    NotStrictlyIncreasing { index: usize, previous: f64, offset: f64 },

    #[error("pose {index} has a non-finite component")]
    NonFinite { index: usize },
}

/// Recoverable failure of a single predictor invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionFailure {
    #[error("missing sensor channel: {0}")]
    MissingChannel(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("predictor timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("model error: {0}")]
    Model(String),

    /// Output could not be turned into a valid trajectory
    #[error("malformed prediction: {0}")]
    Malformed(String),
}

impl From<EnvError> for PredictionFailure {
    fn from(err: EnvError) -> Self {
        match err {
            EnvError::MissingChannel(channel) => Self::MissingChannel(channel),
            EnvError::DeviceError(msg) => Self::Device(msg),
            EnvError::Timeout(ms) => Self::Timeout { ms },
            EnvError::DataUnavailable(msg) | EnvError::CollaboratorError(msg) => Self::Model(msg),
        }
    }
}

impl From<TrajectoryError> for PredictionFailure {
    fn from(err: TrajectoryError) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Malformed per-sample render inputs. Only that sample's image is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("prediction has no poses")]
    EmptyPrediction,

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("render task failed: {0}")]
    Task(String),
}

/// Animation encoding failed. Fatal for the run; no artifact is left behind.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("no frames to encode")]
    NoFrames,

    #[error("fps must be > 0, got {0}")]
    InvalidFps(f64),

    #[error("frame for sample {ordinal} arrived after sample {previous}")]
    OutOfOrder { ordinal: usize, previous: usize },

    #[error("frame {ordinal} is {width}x{height}, expected {expected_width}x{expected_height}")]
    FrameSize {
        ordinal: usize,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a scheduled sample produced no image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    DataUnavailable(String),
    PredictionFailed(String),
    PredictionTimeout(u64),
    RenderFailed(String),
    /// The run was cancelled before this sample was committed
    Cancelled,
    /// No image and no recorded failure reached the assembler
    Unaccounted,
}

impl FailureReason {
    /// Short machine-friendly label.
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::DataUnavailable(_) => "data_unavailable",
            FailureReason::PredictionFailed(_) => "prediction_failed",
            FailureReason::PredictionTimeout(_) => "prediction_timeout",
            FailureReason::RenderFailed(_) => "render_failed",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Unaccounted => "unaccounted",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::DataUnavailable(msg)
            | FailureReason::PredictionFailed(msg)
            | FailureReason::RenderFailed(msg) => write!(f, "{}: {}", self.label(), msg),
            FailureReason::PredictionTimeout(ms) => write!(f, "{}: {}ms", self.label(), ms),
            FailureReason::Cancelled | FailureReason::Unaccounted => f.write_str(self.label()),
        }
    }
}

impl From<PredictionFailure> for FailureReason {
    fn from(failure: PredictionFailure) -> Self {
        match failure {
            PredictionFailure::Timeout { ms } => FailureReason::PredictionTimeout(ms),
            other => FailureReason::PredictionFailed(other.to_string()),
        }
    }
}

impl From<RenderError> for FailureReason {
    fn from(err: RenderError) -> Self {
        FailureReason::RenderFailed(err.to_string())
    }
}

impl From<EnvError> for FailureReason {
    fn from(err: EnvError) -> Self {
        match err {
            EnvError::DataUnavailable(msg) => FailureReason::DataUnavailable(msg),
            other => FailureReason::from(PredictionFailure::from(other)),
        }
    }
}

/// A scheduled sample that was skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameFailure {
    /// Position of the sample in the schedule
    pub ordinal: usize,
    pub frame_index: FrameIndex,
    /// Absolute sample time in seconds
    pub time: f64,
    pub reason: FailureReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_errors_map_to_failure_reasons() {
        let reason = FailureReason::from(EnvError::unavailable("frame 3"));
        assert_eq!(reason, FailureReason::DataUnavailable("frame 3".to_string()));

        let reason = FailureReason::from(EnvError::Timeout(250));
        assert_eq!(reason, FailureReason::PredictionTimeout(250));

        let reason = FailureReason::from(EnvError::missing_channel("cam_f0"));
        assert_eq!(reason.label(), "prediction_failed");
    }

    #[test]
    fn test_failure_reason_serializes_with_kind_tag() {
        let json = serde_json::to_string(&FailureReason::PredictionTimeout(100)).unwrap();
        assert_eq!(json, r#"{"kind":"prediction_timeout","detail":100}"#);

        let json = serde_json::to_string(&FailureReason::Cancelled).unwrap();
        assert_eq!(json, r#"{"kind":"cancelled"}"#);
    }
}
