//! Contracts for the external collaborators the engine drives.
//!
//! ```text
//!   SceneAccessor ──frame/references──► Runner ──staged input──► Predictor
//!                                         │
//!                                         ▼
//!                      Renderer ◄── MapLayer (map geometry)
//!                         └────────── CameraProjector (image-space polyline)
//! ```
//!
//! One accessor instance is scoped to one run; there are no process-wide
//! scene caches behind these traits.

use crate::geometry::Pose2;
use crate::scene::{CameraCalibration, EgoState, Frame, ReferenceTrajectory, SceneTimeline, SensorBundle, SensorChannel};
use async_trait::async_trait;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use trajview_env::{Device, EnvError, FrameIndex, SceneToken};

/// Read-only access to one scene's frames.
#[async_trait]
pub trait SceneAccessor: Send + Sync + 'static {
    /// The scene this accessor serves.
    fn token(&self) -> &SceneToken;

    /// Frame count, spacing and start time, for schedule validation.
    fn timeline(&self) -> SceneTimeline;

    /// Loads sensors, ego state and nearby agents for a frame.
    ///
    /// # Returns
    /// * `Err(EnvError::DataUnavailable)` - the frame or its sensors are missing
    async fn frame(&self, index: FrameIndex) -> Result<Frame, EnvError>;

    /// Loads the reference trajectories (ground truth, baselines) for a frame.
    async fn references(&self, index: FrameIndex) -> Result<Vec<ReferenceTrajectory>, EnvError>;
}

/// Everything handed to the model for one invocation.
#[derive(Debug, Clone)]
pub struct PredictorInput {
    /// Device every payload in `sensors` has been staged onto
    pub device: Device,
    pub sensors: SensorBundle,
    pub ego: EgoState,
    /// Requested horizon in seconds
    pub horizon: f64,
}

/// Raw model output: ego-relative poses at a fixed spacing, starting one
/// interval after the sample instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    pub poses: Vec<Pose2>,
    /// Seconds between consecutive poses
    pub interval: f64,
}

/// The trajectory prediction model.
#[async_trait]
pub trait Predictor: Send + Sync + 'static {
    /// Model name for logs and summaries.
    fn name(&self) -> &str;

    /// Sensor channels that must be present in the bundle.
    fn required_channels(&self) -> Vec<SensorChannel>;

    async fn predict(&self, input: PredictorInput) -> Result<RawPrediction, EnvError>;
}

/// Projects ego-frame ground points into camera image space.
pub trait CameraProjector: Send + Sync {
    /// Returns the image-space polyline (pixels) of the points visible to the
    /// camera, in input order. Points behind the camera are dropped.
    fn project(&self, calibration: &CameraCalibration, points: &[Point2<f64>]) -> Result<Vec<(f32, f32)>, EnvError>;
}

/// Class of a map polyline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapFeatureKind {
    LaneDivider,
    RoadEdge,
    Crosswalk,
}

/// A polyline of map geometry in the global frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFeature {
    pub kind: MapFeatureKind,
    pub points: Vec<Point2<f64>>,
}

/// Source of map geometry for the BEV panel.
pub trait MapLayer: Send + Sync {
    /// Map features within `radius` meters of `center` (global frame).
    fn features_near(&self, center: Pose2, radius: f64) -> Vec<MapFeature>;
}

/// A map layer with nothing on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyMap;

impl MapLayer for EmptyMap {
    fn features_near(&self, _center: Pose2, _radius: f64) -> Vec<MapFeature> {
        Vec::new()
    }
}
