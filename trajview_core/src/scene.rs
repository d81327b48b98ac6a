//! Scene data model: frames, ego state, nearby agents, sensors and
//! reference trajectories as delivered by a scene accessor.

use crate::geometry::{Pose2, TimedPose, TrajectoryKind};
use image::RgbaImage;
use nalgebra::{Isometry3, Matrix3, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use trajview_env::{Device, FrameIndex};

/// Closed set of agent categories. Rendering looks styles up by variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Vehicle,
    Pedestrian,
    Other,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Vehicle, AgentKind::Pedestrian, AgentKind::Other];

    /// Maps a dataset class label onto a kind. Unknown labels become `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.to_lowercase().as_str() {
            "vehicle" | "car" | "truck" | "bus" | "trailer" => AgentKind::Vehicle,
            "pedestrian" | "person" | "walker" => AgentKind::Pedestrian,
            _ => AgentKind::Other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Vehicle => "vehicle",
            AgentKind::Pedestrian => "pedestrian",
            AgentKind::Other => "other",
        }
    }
}

/// A nearby traffic participant in the global frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: u64,
    pub kind: AgentKind,
    /// Position and heading
    pub pose: Pose2,
    /// Velocity [vx, vy] in m/s
    pub velocity: Vector2<f64>,
}

/// Ego vehicle kinematics at one frame, global frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EgoState {
    pub pose: Pose2,
    /// Velocity [vx, vy] in m/s
    pub velocity: Vector2<f64>,
    /// Acceleration [ax, ay] in m/s²
    pub acceleration: Vector2<f64>,
}

impl EgoState {
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }
}

/// Name of a sensor stream (e.g. `cam_f0`, `lidar_top`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorChannel(pub String);

impl SensorChannel {
    pub const FRONT_CAMERA: &'static str = "cam_f0";
    pub const LIDAR_TOP: &'static str = "lidar_top";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dense tensor from one sensor channel and the device it lives on.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorPayload {
    pub shape: Vec<usize>,
    pub data: Arc<[f32]>,
    pub device: Device,
}

impl SensorPayload {
    pub fn new(shape: Vec<usize>, data: Arc<[f32]>) -> Self {
        Self { shape, data, device: Device::Cpu }
    }

    /// Same tensor, placed on `device`.
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            shape: self.shape.clone(),
            data: Arc::clone(&self.data),
            device,
        }
    }
}

/// Pinhole calibration of a camera mounted on the ego vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    /// 3x3 intrinsic matrix K
    pub intrinsics: Matrix3<f64>,
    /// Camera pose in the ego frame (x forward, y left, z up)
    pub extrinsics: Isometry3<f64>,
    pub width: u32,
    pub height: u32,
}

/// One camera image with its calibration.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub image: Option<Arc<RgbaImage>>,
    pub calibration: CameraCalibration,
}

/// Sensor data for one frame.
#[derive(Debug, Clone, Default)]
pub struct SensorBundle {
    payloads: BTreeMap<SensorChannel, SensorPayload>,
    pub front_camera: Option<CameraFrame>,
}

impl SensorBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self, channel: SensorChannel, payload: SensorPayload) -> Self {
        self.payloads.insert(channel, payload);
        self
    }

    pub fn with_camera(mut self, camera: CameraFrame) -> Self {
        self.front_camera = Some(camera);
        self
    }

    pub fn payload(&self, channel: &SensorChannel) -> Option<&SensorPayload> {
        self.payloads.get(channel)
    }

    pub fn payloads(&self) -> impl Iterator<Item = (&SensorChannel, &SensorPayload)> {
        self.payloads.iter()
    }

    pub fn channels(&self) -> impl Iterator<Item = &SensorChannel> {
        self.payloads.keys()
    }

    /// Copy of the bundle with every payload placed on `device`.
    pub fn staged_onto(&self, device: Device) -> SensorBundle {
        SensorBundle {
            payloads: self
                .payloads
                .iter()
                .map(|(channel, payload)| (channel.clone(), payload.to_device(device)))
                .collect(),
            front_camera: self.front_camera.clone(),
        }
    }

    /// The single device all payloads share, or `None` if they disagree.
    /// An empty bundle trivially lives on `fallback`.
    pub fn common_device(&self, fallback: Device) -> Option<Device> {
        let mut devices = self.payloads.values().map(|p| p.device);
        match devices.next() {
            None => Some(fallback),
            Some(first) => devices.all(|d| d == first).then_some(first),
        }
    }
}

/// Everything a scene accessor knows about one frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: FrameIndex,
    /// Absolute timestamp in seconds
    pub timestamp: f64,
    pub ego: EgoState,
    pub sensors: SensorBundle,
    pub agents: Vec<AgentState>,
}

/// Shape of a scene's timeline, used to validate schedules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneTimeline {
    pub frame_count: usize,
    /// Seconds between consecutive frames
    pub frame_interval: f64,
    /// Absolute timestamp of frame 0
    pub start_timestamp: f64,
}

impl SceneTimeline {
    pub fn timestamp_of(&self, index: FrameIndex) -> f64 {
        self.start_timestamp + index.get() as f64 * self.frame_interval
    }
}

/// Samples of a reference trajectory, with or without per-pose time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSamples {
    /// Offsets are measured from the reference's start time
    Timestamped(Vec<TimedPose>),
    /// Poses at an implied fixed spacing
    Untimed(Vec<Pose2>),
}

/// A ground-truth or baseline trajectory in the global frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTrajectory {
    pub kind: TrajectoryKind,
    /// Absolute time of the first sample
    pub start_time: f64,
    pub samples: ReferenceSamples,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> SensorPayload {
        SensorPayload::new(vec![2], Arc::from(vec![0.5f32, 1.5]))
    }

    #[test]
    fn test_agent_kind_from_label() {
        assert_eq!(AgentKind::from_label("Car"), AgentKind::Vehicle);
        assert_eq!(AgentKind::from_label("pedestrian"), AgentKind::Pedestrian);
        assert_eq!(AgentKind::from_label("traffic_cone"), AgentKind::Other);
    }

    #[test]
    fn test_staging_moves_every_payload() {
        let bundle = SensorBundle::new()
            .with_payload(SensorChannel::new("cam_f0"), payload())
            .with_payload(SensorChannel::new("lidar_top"), payload().to_device(Device::Cuda(1)));
        assert_eq!(bundle.common_device(Device::Cpu), None);

        let staged = bundle.staged_onto(Device::Cuda(0));
        assert_eq!(staged.common_device(Device::Cpu), Some(Device::Cuda(0)));
        // Staging shares the underlying buffer
        let original = bundle.payload(&SensorChannel::new("cam_f0")).unwrap();
        let moved = staged.payload(&SensorChannel::new("cam_f0")).unwrap();
        assert!(Arc::ptr_eq(&original.data, &moved.data));
    }

    #[test]
    fn test_empty_bundle_uses_fallback_device() {
        assert_eq!(SensorBundle::new().common_device(Device::Cuda(3)), Some(Device::Cuda(3)));
    }
}
