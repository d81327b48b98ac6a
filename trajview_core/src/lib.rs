//! TrajView Core - Sliding-Window Trajectory Prediction Animation
//!
//! This library turns a sequence of re-predictions along a scene into one
//! animation, keeping every trajectory source consistent in time and space:
//! 1. **Timeline**: which scene frames back which animation frames
//! 2. **Slicing**: ground truth and baselines cut to each prediction window
//! 3. **History**: a bounded, fading overlay of earlier predictions
//! 4. **Rendering**: BEV, camera, comparison and status panels in the
//!    sample's ego frame
//! 5. **Assembly**: ordered images into a looping GIF with a run summary
//!
//! External systems (scene storage, the model, map and camera projection)
//! plug in through the traits in [`collaborators`].

pub mod assembler;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod geometry;
pub mod history;
pub mod metrics;
pub mod render;
pub mod scene;
pub mod slicer;
pub mod summary;
pub mod timeline;

// Re-export key types for convenience
pub use assembler::{assemble, AnimationAssembler, RenderedFrame};
pub use collaborators::{
    CameraProjector, EmptyMap, MapFeature, MapFeatureKind, MapLayer, Predictor, PredictorInput, RawPrediction,
    SceneAccessor,
};
pub use config::AnimationConfig;
pub use error::{
    ConfigError, EncodingError, FailureReason, FrameFailure, PredictionFailure, RenderError, TrajectoryError,
};
pub use geometry::{EgoTransform, Pose2, TimedPose, Trajectory, TrajectoryKind};
pub use history::{HistoryBuffer, HistoryEntry, PredictionRecord};
pub use metrics::{MetricsAccumulator, TrajectoryMetrics};
pub use render::{FrameRenderer, HistoryOverlay, Layout, RenderInput};
pub use scene::{
    AgentKind, AgentState, CameraCalibration, CameraFrame, EgoState, Frame, ReferenceSamples, ReferenceTrajectory,
    SceneTimeline, SensorBundle, SensorChannel, SensorPayload,
};
pub use slicer::{slice, slice_reference, SlicedReference, TimingFidelity, FALLBACK_INTERVAL};
pub use summary::{ArtifactInfo, RunSummary};
pub use timeline::{build_schedule, RunSchedule, Sample, SamplingMode, ScheduleParams};
