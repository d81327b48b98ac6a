//! Predictor invoker: one model call per sample.
//!
//! Each call:
//! 1. Checks the predictor's required sensor channels are present
//! 2. Stages every payload onto the configured device
//! 3. Runs the model under a timeout, measured on the run clock
//! 4. Normalizes the raw output to exactly the configured horizon
//!
//! The invoker does not limit concurrency. The runner's ordered window of
//! `worker_cap` samples is the only bound on calls in flight.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use trajview_core::{
    ConfigError, Frame, PredictionFailure, PredictionRecord, Predictor, PredictorInput, RawPrediction, TimedPose,
    Trajectory, TrajectoryKind,
};
use trajview_env::{Device, RunContext};

/// Runs a [`Predictor`] on one frame with a per-call deadline.
pub struct PredictorInvoker {
    predictor: Arc<dyn Predictor>,
    device: Device,
    timeout: Duration,
    clock: Arc<dyn RunContext>,
}

impl PredictorInvoker {
    /// Creates an invoker. The deadline applies both in real time and on
    /// `clock`, so models that spend virtual time are held to it too.
    pub fn new(
        predictor: Arc<dyn Predictor>,
        device: Device,
        timeout: Duration,
        clock: Arc<dyn RunContext>,
    ) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(0.0));
        }
        Ok(Self {
            predictor,
            device,
            timeout,
            clock,
        })
    }

    pub fn predictor_name(&self) -> &str {
        self.predictor.name()
    }

    /// Predicts from `frame` out to `horizon` seconds.
    ///
    /// The returned trajectory is relative to the frame's ego pose, starts at
    /// the frame timestamp, and ends exactly at `horizon`.
    pub async fn invoke(&self, frame: &Frame, horizon: f64) -> Result<PredictionRecord, PredictionFailure> {
        for channel in self.predictor.required_channels() {
            if frame.sensors.payload(&channel).is_none() {
                return Err(PredictionFailure::MissingChannel(channel.to_string()));
            }
        }

        let sensors = frame.sensors.staged_onto(self.device);
        match sensors.common_device(self.device) {
            Some(device) if device == self.device => {}
            other => {
                return Err(PredictionFailure::Device(format!(
                    "payloads for frame {} not on {} after staging (found {:?})",
                    frame.index, self.device, other
                )));
            }
        }

        let input = PredictorInput {
            device: self.device,
            sensors,
            ego: frame.ego,
            horizon,
        };

        let ms = self.timeout.as_millis() as u64;
        let started = self.clock.now();
        let raw = match tokio::time::timeout(self.timeout, self.predictor.predict(input)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Predictor {} timed out on frame {} after {}ms", self.predictor.name(), frame.index, ms);
                return Err(PredictionFailure::Timeout { ms });
            }
        };
        let latency = self.clock.now().saturating_sub(started);
        if latency > self.timeout {
            warn!(
                "Predictor {} answered frame {} after {:?}, past the {}ms deadline",
                self.predictor.name(),
                frame.index,
                latency,
                ms
            );
            return Err(PredictionFailure::Timeout { ms });
        }

        let trajectory = normalize(&raw, horizon, frame.timestamp)?;
        debug!(
            "Frame {}: {} raw poses -> {} at {:.3}s spacing ({:?})",
            frame.index,
            raw.poses.len(),
            trajectory.len(),
            raw.interval,
            latency
        );

        Ok(PredictionRecord {
            source_frame: frame.index,
            source_time: frame.timestamp,
            anchor: frame.ego.pose,
            trajectory,
            horizon,
            latency,
        })
    }
}

/// Fits raw model output to exactly `n = round(horizon / interval)` poses at
/// offsets `horizon·k/n`, truncating extra poses or holding the last one.
pub fn normalize(raw: &RawPrediction, horizon: f64, origin: f64) -> Result<Trajectory, PredictionFailure> {
    if !(horizon.is_finite() && horizon > 0.0) {
        return Err(PredictionFailure::Malformed(format!("invalid horizon {}", horizon)));
    }
    if !(raw.interval.is_finite() && raw.interval > 0.0) {
        return Err(PredictionFailure::Malformed(format!("invalid output interval {}", raw.interval)));
    }
    let Some(last) = raw.poses.last() else {
        return Err(PredictionFailure::Malformed("no poses".to_string()));
    };
    if let Some(index) = raw.poses.iter().position(|p| !p.is_finite()) {
        return Err(PredictionFailure::Malformed(format!("pose {} is not finite", index)));
    }

    let n = ((horizon / raw.interval).round() as usize).max(1);
    let poses = (1..=n)
        .map(|k| {
            let pose = raw.poses.get(k - 1).unwrap_or(last);
            // Pin the final offset so it equals the horizon bit for bit
            let offset = if k == n { horizon } else { horizon * k as f64 / n as f64 };
            TimedPose::at(offset, *pose)
        })
        .collect();
    Ok(Trajectory::new(TrajectoryKind::Prediction, origin, poses)?)
}
