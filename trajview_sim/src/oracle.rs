//! Synthetic scene oracle.
//!
//! Deterministic stand-ins for every external collaborator, derived from one
//! seed so that a run can be replayed exactly:
//! - [`SyntheticScene`]: ego kinematics, nearby agents, sensors, ground truth
//!   and an untimed constant-velocity baseline
//! - [`SyntheticPredictor`]: a noisy constant turn-rate rollout with failure
//!   and latency injection
//! - [`PinholeProjector`]: ego ground plane → image pixels
//! - [`RouteMapLayer`]: lane geometry that follows the ego route

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use nalgebra::{Isometry3, Matrix3, Point2, Point3, Translation3, UnitQuaternion, Vector2, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use trajview_core::{
    AgentKind, AgentState, CameraCalibration, CameraFrame, CameraProjector, EgoState, Frame, MapFeature,
    MapFeatureKind, MapLayer, Pose2, Predictor, PredictorInput, RawPrediction, ReferenceSamples,
    ReferenceTrajectory, SceneAccessor, SceneTimeline, SensorBundle, SensorChannel, SensorPayload, TimedPose,
    TrajectoryKind, FALLBACK_INTERVAL,
};
use trajview_env::{EnvError, FrameIndex, RunContext, SceneToken, TokioContext};

/// Integration sub-steps per scene frame.
const SUBSTEPS: usize = 10;

/// Poses in the untimed baseline (0 to 4 s at the fallback spacing).
const BASELINE_POSES: usize = 9;

/// Time the synthetic model spends per call.
const DEFAULT_INFERENCE_TIME: Duration = Duration::from_millis(15);

// =============================================================================
// EGO MOTION
// =============================================================================

/// How the ego vehicle drives through a synthetic scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionProfile {
    /// Constant speed, straight ahead
    Cruise { speed: f64 },

    /// Constant speed with a yaw rate applied between `start` and `end` (s)
    Turn { speed: f64, yaw_rate: f64, start: f64, end: f64 },

    /// Speed oscillating smoothly between 0 and `cruise` every `period` seconds
    StopAndGo { cruise: f64, period: f64 },
}

impl MotionProfile {
    pub fn speed_at(&self, t: f64) -> f64 {
        match *self {
            MotionProfile::Cruise { speed } | MotionProfile::Turn { speed, .. } => speed,
            MotionProfile::StopAndGo { cruise, period } => cruise * 0.5 * (1.0 - (2.0 * PI * t / period).cos()),
        }
    }

    /// Longitudinal acceleration (m/s²).
    pub fn accel_at(&self, t: f64) -> f64 {
        match *self {
            MotionProfile::Cruise { .. } | MotionProfile::Turn { .. } => 0.0,
            MotionProfile::StopAndGo { cruise, period } => {
                let w = 2.0 * PI / period;
                cruise * 0.5 * w * (w * t).sin()
            }
        }
    }

    pub fn yaw_rate_at(&self, t: f64) -> f64 {
        match *self {
            MotionProfile::Turn { yaw_rate, start, end, .. } if t >= start && t < end => yaw_rate,
            _ => 0.0,
        }
    }
}

/// Ego kinematics at one frame.
#[derive(Debug, Clone, Copy)]
struct EgoSample {
    pose: Pose2,
    speed: f64,
    accel: f64,
    yaw_rate: f64,
}

impl EgoSample {
    fn state(&self) -> EgoState {
        let (sin, cos) = self.pose.heading.sin_cos();
        let forward = Vector2::new(cos, sin);
        EgoState {
            pose: self.pose,
            velocity: forward * self.speed,
            acceleration: forward * self.accel,
        }
    }
}

/// Integrates `profile` with a midpoint scheme, one sample per frame.
fn integrate(profile: &MotionProfile, frame_count: usize, frame_interval: f64) -> Vec<EgoSample> {
    let dt = frame_interval / SUBSTEPS as f64;
    let (mut x, mut y, mut heading) = (0.0f64, 0.0f64, 0.0f64);
    let mut samples = Vec::with_capacity(frame_count);
    for index in 0..frame_count {
        let t = index as f64 * frame_interval;
        samples.push(EgoSample {
            pose: Pose2::new(x, y, heading),
            speed: profile.speed_at(t),
            accel: profile.accel_at(t),
            yaw_rate: profile.yaw_rate_at(t),
        });
        for step in 0..SUBSTEPS {
            let mid = t + (step as f64 + 0.5) * dt;
            let mid_heading = heading + profile.yaw_rate_at(mid) * dt * 0.5;
            let v = profile.speed_at(mid);
            x += v * mid_heading.cos() * dt;
            y += v * mid_heading.sin() * dt;
            heading += profile.yaw_rate_at(mid) * dt;
        }
    }
    samples
}

// =============================================================================
// SYNTHETIC SCENE
// =============================================================================

/// Parameters of a generated scene.
#[derive(Debug, Clone)]
pub struct SceneSpec {
    pub token: SceneToken,
    pub frame_count: usize,
    /// Seconds between frames
    pub frame_interval: f64,
    pub start_timestamp: f64,
    pub motion: MotionProfile,
    pub vehicles: usize,
    pub pedestrians: usize,
    pub with_camera: bool,
    /// Frames the accessor reports as unavailable
    pub missing_frames: BTreeSet<usize>,
    /// Frames delivered without the front camera channel
    pub camera_dropouts: BTreeSet<usize>,
}

impl Default for SceneSpec {
    fn default() -> Self {
        Self {
            token: SceneToken::new("synthetic"),
            frame_count: 200,
            frame_interval: 0.1,
            start_timestamp: 0.0,
            motion: MotionProfile::Cruise { speed: 8.0 },
            vehicles: 6,
            pedestrians: 3,
            with_camera: true,
            missing_frames: BTreeSet::new(),
            camera_dropouts: BTreeSet::new(),
        }
    }
}

/// An agent at a reference instant; it moves with constant velocity.
#[derive(Debug, Clone)]
struct AgentTrack {
    id: u64,
    kind: AgentKind,
    /// Pose at scene time `t0`
    pose: Pose2,
    t0: f64,
    velocity: Vector2<f64>,
}

impl AgentTrack {
    fn state_at(&self, t: f64) -> AgentState {
        let dt = t - self.t0;
        AgentState {
            id: self.id,
            kind: self.kind,
            pose: Pose2::new(self.pose.x + self.velocity.x * dt, self.pose.y + self.velocity.y * dt, self.pose.heading),
            velocity: self.velocity,
        }
    }
}

/// A fully generated scene, served through [`SceneAccessor`].
pub struct SyntheticScene {
    spec: SceneSpec,
    ego: Vec<EgoSample>,
    agents: Vec<AgentTrack>,
    camera_image: Arc<RgbaImage>,
    calibration: CameraCalibration,
}

impl SyntheticScene {
    /// Generates a scene. All randomness comes from `rng`.
    pub fn generate(spec: SceneSpec, rng: &mut ChaCha8Rng) -> Self {
        let ego = integrate(&spec.motion, spec.frame_count, spec.frame_interval);
        let mut agents = Vec::with_capacity(spec.vehicles + spec.pedestrians);

        let lateral_noise = Normal::new(0.0, 0.3).ok();
        for i in 0..spec.vehicles + spec.pedestrians {
            let kind = if i < spec.vehicles { AgentKind::Vehicle } else { AgentKind::Pedestrian };
            let anchor_index = rng.gen_range(0..spec.frame_count.max(1));
            let Some(anchor) = ego.get(anchor_index) else { break };
            let (lateral, speed, heading) = match kind {
                AgentKind::Vehicle => {
                    let oncoming = rng.gen_bool(0.4);
                    let lane = if oncoming { 3.5 } else { 0.0 };
                    let heading = if oncoming { PI } else { 0.0 };
                    let jitter = lateral_noise.map_or(0.0, |n| n.sample(rng));
                    (lane + jitter, rng.gen_range(4.0..11.0), heading)
                }
                _ => {
                    let side = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                    (side * rng.gen_range(6.0..9.0), rng.gen_range(0.8..1.6), side * -PI / 2.0)
                }
            };
            let pose = anchor.pose.compose(&Pose2::new(0.0, lateral, heading));
            let velocity = Vector2::new(pose.heading.cos(), pose.heading.sin()) * speed;
            agents.push(AgentTrack {
                id: 1000 + i as u64,
                kind,
                pose,
                t0: anchor_index as f64 * spec.frame_interval,
                velocity,
            });
        }

        debug!(
            "Generated scene {}: {} frames, {} agents",
            spec.token,
            spec.frame_count,
            agents.len()
        );

        Self {
            spec,
            ego,
            agents,
            camera_image: Arc::new(camera_backdrop(320, 180)),
            calibration: front_camera_calibration(1600, 900),
        }
    }

    pub fn spec(&self) -> &SceneSpec {
        &self.spec
    }

    /// Ego poses of every frame, for building map layers.
    pub fn route(&self) -> Vec<Pose2> {
        self.ego.iter().map(|s| s.pose).collect()
    }

    fn sample(&self, index: FrameIndex) -> Result<&EgoSample, EnvError> {
        if self.spec.missing_frames.contains(&index.get()) {
            return Err(EnvError::unavailable(format!("frame {} of {} is missing", index, self.spec.token)));
        }
        self.ego
            .get(index.get())
            .ok_or_else(|| EnvError::unavailable(format!("frame {} is past the end of {}", index, self.spec.token)))
    }

    fn timestamp(&self, index: usize) -> f64 {
        self.spec.start_timestamp + index as f64 * self.spec.frame_interval
    }

    fn sensors(&self, index: FrameIndex, sample: &EgoSample, agents: &[AgentState]) -> SensorBundle {
        let mut sensors = SensorBundle::new();
        if !self.spec.camera_dropouts.contains(&index.get()) {
            // [frame, timestamp, speed, yaw rate]; the synthetic predictor reads these
            let encoded = vec![
                index.get() as f32,
                self.timestamp(index.get()) as f32,
                sample.speed as f32,
                sample.yaw_rate as f32,
            ];
            sensors = sensors.with_payload(
                SensorChannel::new(SensorChannel::FRONT_CAMERA),
                SensorPayload::new(vec![encoded.len()], Arc::from(encoded)),
            );
            if self.spec.with_camera {
                sensors = sensors.with_camera(CameraFrame {
                    image: Some(Arc::clone(&self.camera_image)),
                    calibration: self.calibration.clone(),
                });
            }
        }

        let points: Vec<f32> = agents
            .iter()
            .flat_map(|a| {
                let local = sample.pose.isometry().inverse_transform_point(&a.pose.position());
                [local.x as f32, local.y as f32, 0.0]
            })
            .collect();
        sensors.with_payload(
            SensorChannel::new(SensorChannel::LIDAR_TOP),
            SensorPayload::new(vec![agents.len(), 3], Arc::from(points)),
        )
    }
}

#[async_trait]
impl SceneAccessor for SyntheticScene {
    fn token(&self) -> &SceneToken {
        &self.spec.token
    }

    fn timeline(&self) -> SceneTimeline {
        SceneTimeline {
            frame_count: self.spec.frame_count,
            frame_interval: self.spec.frame_interval,
            start_timestamp: self.spec.start_timestamp,
        }
    }

    async fn frame(&self, index: FrameIndex) -> Result<Frame, EnvError> {
        let sample = self.sample(index)?;
        let t = index.get() as f64 * self.spec.frame_interval;
        let agents: Vec<AgentState> = self.agents.iter().map(|a| a.state_at(t)).collect();
        Ok(Frame {
            index,
            timestamp: self.timestamp(index.get()),
            ego: sample.state(),
            sensors: self.sensors(index, sample, &agents),
            agents,
        })
    }

    /// Ground truth from this frame to the end of the scene, plus an untimed
    /// constant-velocity baseline.
    async fn references(&self, index: FrameIndex) -> Result<Vec<ReferenceTrajectory>, EnvError> {
        let sample = self.sample(index)?;
        let start = index.get();
        let ground_truth = self.ego[start..]
            .iter()
            .enumerate()
            .map(|(k, s)| TimedPose::at(k as f64 * self.spec.frame_interval, s.pose))
            .collect();

        let (sin, cos) = sample.pose.heading.sin_cos();
        let baseline = (0..BASELINE_POSES)
            .map(|k| {
                let d = sample.speed * k as f64 * FALLBACK_INTERVAL;
                Pose2::new(sample.pose.x + d * cos, sample.pose.y + d * sin, sample.pose.heading)
            })
            .collect();

        let start_time = self.timestamp(start);
        Ok(vec![
            ReferenceTrajectory {
                kind: TrajectoryKind::GroundTruth,
                start_time,
                samples: ReferenceSamples::Timestamped(ground_truth),
            },
            ReferenceTrajectory {
                kind: TrajectoryKind::BaselineReference,
                start_time,
                samples: ReferenceSamples::Untimed(baseline),
            },
        ])
    }
}

/// Sky over a road with a dashed centre line.
fn camera_backdrop(width: u32, height: u32) -> RgbaImage {
    let horizon = height / 2;
    RgbaImage::from_fn(width, height, |x, y| {
        if y < horizon {
            let shade = 150 + (60 * y / horizon.max(1)) as u8;
            Rgba([shade / 2, shade - 20, shade, 255])
        } else {
            let depth = (y - horizon) as f32 / (height - horizon).max(1) as f32;
            let center = width as f32 / 2.0;
            let stripe = (x as f32 - center).abs() < 1.0 + 3.0 * depth && (y / 6) % 2 == 0;
            if stripe {
                Rgba([230, 230, 210, 255])
            } else {
                let grey = 70 + (40.0 * depth) as u8;
                Rgba([grey, grey, grey + 5, 255])
            }
        }
    })
}

/// Forward-looking camera 1.5 m ahead of the rear axle, 1.6 m up.
pub fn front_camera_calibration(width: u32, height: u32) -> CameraCalibration {
    let focal = width as f64 * 0.79;
    CameraCalibration {
        intrinsics: Matrix3::new(
            focal,
            0.0,
            width as f64 / 2.0,
            0.0,
            focal,
            height as f64 / 2.0,
            0.0,
            0.0,
            1.0,
        ),
        extrinsics: Isometry3::from_parts(Translation3::new(1.5, 0.0, 1.6), UnitQuaternion::identity()),
        width,
        height,
    }
}

// =============================================================================
// SYNTHETIC PREDICTOR
// =============================================================================

/// Constant turn-rate rollout from the decoded camera tensor, with Gaussian
/// noise that grows with the offset.
///
/// Inference time is spent on the model's clock, so on a
/// [`SimContext`](crate::SimContext) slow frames cost no real time.
#[derive(Clone)]
pub struct SyntheticPredictor {
    seed: u64,
    /// Spacing of output poses (s)
    interval: f64,
    pose_count: usize,
    /// Noise standard deviation per second of offset (m)
    noise: f64,
    fail_frames: BTreeSet<usize>,
    slow_frames: BTreeSet<usize>,
    slow_delay: Duration,
    inference_time: Duration,
    clock: Arc<dyn RunContext>,
}

impl SyntheticPredictor {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            interval: 0.5,
            pose_count: 8,
            noise: 0.15,
            fail_frames: BTreeSet::new(),
            slow_frames: BTreeSet::new(),
            slow_delay: Duration::ZERO,
            inference_time: DEFAULT_INFERENCE_TIME,
            clock: TokioContext::shared(),
        }
    }

    /// Clock the model spends its inference time on.
    pub fn with_clock(mut self, clock: Arc<dyn RunContext>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_inference_time(mut self, time: Duration) -> Self {
        self.inference_time = time;
        self
    }

    /// Output spacing and pose count; the invoker pads or truncates to the horizon.
    pub fn with_output(mut self, interval: f64, pose_count: usize) -> Self {
        self.interval = interval;
        self.pose_count = pose_count;
        self
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Frames on which the model reports an error.
    pub fn with_fail_frames(mut self, frames: impl IntoIterator<Item = usize>) -> Self {
        self.fail_frames.extend(frames);
        self
    }

    /// Frames on which the model takes `delay` before answering.
    pub fn with_slow_frames(mut self, frames: impl IntoIterator<Item = usize>, delay: Duration) -> Self {
        self.slow_frames.extend(frames);
        self.slow_delay = delay;
        self
    }
}

#[async_trait]
impl Predictor for SyntheticPredictor {
    fn name(&self) -> &str {
        "synthetic-ctrv"
    }

    fn required_channels(&self) -> Vec<SensorChannel> {
        vec![SensorChannel::new(SensorChannel::FRONT_CAMERA)]
    }

    async fn predict(&self, input: PredictorInput) -> Result<RawPrediction, EnvError> {
        let channel = SensorChannel::new(SensorChannel::FRONT_CAMERA);
        let payload = input
            .sensors
            .payload(&channel)
            .ok_or_else(|| EnvError::missing_channel(&channel))?;
        if payload.device != input.device {
            return Err(EnvError::device(format!("{} tensor on {}, model on {}", channel, payload.device, input.device)));
        }
        let &[frame, _, _, yaw_rate] = &payload.data[..] else {
            return Err(EnvError::CollaboratorError(format!("unexpected {} tensor shape {:?}", channel, payload.shape)));
        };
        let frame = frame as usize;

        let delay = if self.slow_frames.contains(&frame) {
            self.slow_delay
        } else {
            self.inference_time
        };
        if !delay.is_zero() {
            self.clock.sleep(delay).await;
        }
        if self.fail_frames.contains(&frame) {
            return Err(EnvError::CollaboratorError(format!("injected failure at frame {}", frame)));
        }

        let speed = input.ego.speed();
        let yaw_rate = yaw_rate as f64;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ (frame as u64).wrapping_mul(0x9e3779b97f4a7c15));
        let poses = (1..=self.pose_count)
            .map(|k| {
                let t = k as f64 * self.interval;
                let heading = yaw_rate * t;
                let (x, y) = if yaw_rate.abs() > 1e-6 {
                    (speed / yaw_rate * heading.sin(), speed / yaw_rate * (1.0 - heading.cos()))
                } else {
                    (speed * t, 0.0)
                };
                let sigma = self.noise * t;
                let (dx, dy) = match Normal::new(0.0, sigma) {
                    Ok(normal) if sigma > 0.0 => (normal.sample(&mut rng), normal.sample(&mut rng)),
                    _ => (0.0, 0.0),
                };
                Pose2::new(x + dx, y + dy, heading)
            })
            .collect();

        Ok(RawPrediction {
            poses,
            interval: self.interval,
        })
    }
}

// =============================================================================
// CAMERA PROJECTION
// =============================================================================

/// Pinhole projection of ego-frame ground points (z = 0).
#[derive(Debug, Clone, Copy)]
pub struct PinholeProjector {
    /// Points closer than this along the optical axis are dropped (m)
    pub min_depth: f64,
}

impl Default for PinholeProjector {
    fn default() -> Self {
        Self { min_depth: 0.5 }
    }
}

impl CameraProjector for PinholeProjector {
    fn project(&self, calibration: &CameraCalibration, points: &[Point2<f64>]) -> Result<Vec<(f32, f32)>, EnvError> {
        let k = &calibration.intrinsics;
        if k[(0, 0)] <= 0.0 || k[(1, 1)] <= 0.0 {
            return Err(EnvError::CollaboratorError("degenerate camera intrinsics".to_string()));
        }
        let pixels = points
            .iter()
            .filter_map(|p| {
                let camera = calibration.extrinsics.inverse_transform_point(&Point3::new(p.x, p.y, 0.0));
                // Ego axes (x forward, y left, z up) to optical axes (x right, y down, z forward)
                let optical = Vector3::new(-camera.y, -camera.z, camera.x);
                if optical.z < self.min_depth {
                    return None;
                }
                let uvw = k * optical;
                Some(((uvw.x / uvw.z) as f32, (uvw.y / uvw.z) as f32))
            })
            .collect();
        Ok(pixels)
    }
}

// =============================================================================
// MAP LAYER
// =============================================================================

/// Road geometry following the ego route: two road edges, a lane divider
/// between the ego lane and the oncoming lane, and optional crosswalks.
#[derive(Debug, Clone)]
pub struct RouteMapLayer {
    features: Vec<MapFeature>,
}

impl RouteMapLayer {
    /// Builds lanes of `lane_width` around `route`, with the ego in the right lane.
    pub fn along(route: &[Pose2], lane_width: f64) -> Self {
        let offset = |lateral: f64| -> Vec<Point2<f64>> {
            route
                .iter()
                .map(|pose| pose.compose(&Pose2::new(0.0, lateral, 0.0)).position())
                .collect()
        };
        let features = vec![
            MapFeature {
                kind: MapFeatureKind::RoadEdge,
                points: offset(-lane_width / 2.0),
            },
            MapFeature {
                kind: MapFeatureKind::LaneDivider,
                points: offset(lane_width / 2.0),
            },
            MapFeature {
                kind: MapFeatureKind::RoadEdge,
                points: offset(1.5 * lane_width),
            },
        ];
        Self { features }
    }

    /// Adds a crosswalk across both lanes at `pose` (a point on the route).
    pub fn with_crosswalk(mut self, pose: Pose2, lane_width: f64) -> Self {
        let corners = [
            (-2.0, -lane_width / 2.0),
            (2.0, -lane_width / 2.0),
            (2.0, 1.5 * lane_width),
            (-2.0, 1.5 * lane_width),
        ];
        self.features.push(MapFeature {
            kind: MapFeatureKind::Crosswalk,
            points: corners
                .iter()
                .map(|(x, y)| pose.compose(&Pose2::new(*x, *y, 0.0)).position())
                .collect(),
        });
        self
    }
}

impl MapLayer for RouteMapLayer {
    fn features_near(&self, center: Pose2, radius: f64) -> Vec<MapFeature> {
        let origin = center.position();
        let near = |p: &Point2<f64>| (p - origin).norm() <= radius;
        let mut out = Vec::new();
        for feature in &self.features {
            if feature.kind == MapFeatureKind::Crosswalk {
                if feature.points.iter().any(near) {
                    out.push(feature.clone());
                }
                continue;
            }
            // Keep contiguous runs inside the radius
            let mut run: Vec<Point2<f64>> = Vec::new();
            for point in &feature.points {
                if near(point) {
                    run.push(*point);
                } else if !run.is_empty() {
                    let points = std::mem::take(&mut run);
                    if points.len() >= 2 {
                        out.push(MapFeature { kind: feature.kind, points });
                    }
                }
            }
            if run.len() >= 2 {
                out.push(MapFeature { kind: feature.kind, points: run });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use approx::assert_relative_eq;
    use trajview_env::Device;

    fn scene(spec: SceneSpec) -> SyntheticScene {
        SyntheticScene::generate(spec, &mut ChaCha8Rng::seed_from_u64(42))
    }

    #[test]
    fn test_cruise_integrates_straight_line() {
        let samples = integrate(&MotionProfile::Cruise { speed: 10.0 }, 21, 0.1);
        assert_relative_eq!(samples[20].pose.x, 20.0, epsilon = 1e-9);
        assert_relative_eq!(samples[20].pose.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_turn_changes_heading() {
        let profile = MotionProfile::Turn { speed: 5.0, yaw_rate: 0.2, start: 1.0, end: 3.0 };
        let samples = integrate(&profile, 50, 0.1);
        assert_relative_eq!(samples[49].pose.heading, 0.4, epsilon = 1e-9);
        assert!(samples[49].pose.y > 0.0);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = scene(SceneSpec::default());
        let b = scene(SceneSpec::default());
        let pa: Vec<Pose2> = a.agents.iter().map(|t| t.pose).collect();
        let pb: Vec<Pose2> = b.agents.iter().map(|t| t.pose).collect();
        assert_eq!(pa, pb);
        assert_eq!(a.agents.len(), 9);
    }

    #[tokio::test]
    async fn test_missing_and_out_of_range_frames() {
        let spec = SceneSpec {
            frame_count: 20,
            missing_frames: BTreeSet::from([5]),
            ..Default::default()
        };
        let scene = scene(spec);
        assert!(matches!(scene.frame(FrameIndex(5)).await, Err(EnvError::DataUnavailable(_))));
        assert!(matches!(scene.frame(FrameIndex(20)).await, Err(EnvError::DataUnavailable(_))));
        assert!(matches!(scene.references(FrameIndex(5)).await, Err(EnvError::DataUnavailable(_))));

        let frame = scene.frame(FrameIndex(4)).await.unwrap();
        assert_relative_eq!(frame.timestamp, 0.4, epsilon = 1e-12);
        assert!(frame.sensors.front_camera.is_some());
    }

    #[tokio::test]
    async fn test_references_are_timed_and_untimed() {
        let scene = scene(SceneSpec { frame_count: 60, ..Default::default() });
        let references = scene.references(FrameIndex(10)).await.unwrap();
        assert_eq!(references.len(), 2);
        match &references[0].samples {
            ReferenceSamples::Timestamped(poses) => {
                assert_eq!(poses.len(), 50);
                assert_relative_eq!(poses[1].offset, 0.1, epsilon = 1e-12);
            }
            other => panic!("ground truth should be timestamped, got {:?}", other),
        }
        assert!(matches!(references[1].samples, ReferenceSamples::Untimed(ref p) if p.len() == BASELINE_POSES));
    }

    #[tokio::test]
    async fn test_predictor_rollout_and_injection() {
        let scene = scene(SceneSpec { frame_count: 40, ..Default::default() });
        let frame = scene.frame(FrameIndex(12)).await.unwrap();
        let input = PredictorInput {
            device: Device::Cpu,
            sensors: frame.sensors.clone(),
            ego: frame.ego,
            horizon: 4.0,
        };

        let clean = SyntheticPredictor::new(1).with_noise(0.0);
        let raw = clean.predict(input.clone()).await.unwrap();
        assert_eq!(raw.poses.len(), 8);
        assert_relative_eq!(raw.poses[7].x, 8.0 * 4.0, epsilon = 1e-6);

        let failing = SyntheticPredictor::new(1).with_fail_frames([12]);
        assert!(matches!(failing.predict(input).await, Err(EnvError::CollaboratorError(_))));
    }

    #[tokio::test]
    async fn test_inference_time_is_spent_on_the_clock() {
        let scene = scene(SceneSpec { frame_count: 20, ..Default::default() });
        let input_for = |frame: &Frame| PredictorInput {
            device: Device::Cpu,
            sensors: frame.sensors.clone(),
            ego: frame.ego,
            horizon: 4.0,
        };
        let clock = SimContext::shared(5);
        let predictor = SyntheticPredictor::new(1)
            .with_clock(clock.clone())
            .with_slow_frames([12], Duration::from_secs(3));

        let slow = scene.frame(FrameIndex(12)).await.unwrap();
        predictor.predict(input_for(&slow)).await.unwrap();
        assert_eq!(clock.now(), Duration::from_secs(3));

        let normal = scene.frame(FrameIndex(11)).await.unwrap();
        predictor.predict(input_for(&normal)).await.unwrap();
        assert_eq!(clock.now(), Duration::from_secs(3) + DEFAULT_INFERENCE_TIME);
    }

    #[tokio::test]
    async fn test_camera_dropout_removes_channel() {
        let spec = SceneSpec {
            frame_count: 10,
            camera_dropouts: BTreeSet::from([3]),
            ..Default::default()
        };
        let frame = scene(spec).frame(FrameIndex(3)).await.unwrap();
        assert!(frame.sensors.payload(&SensorChannel::new(SensorChannel::FRONT_CAMERA)).is_none());
        assert!(frame.sensors.front_camera.is_none());
    }

    #[test]
    fn test_pinhole_projection() {
        let calibration = front_camera_calibration(1600, 900);
        let pixels = PinholeProjector::default()
            .project(&calibration, &[Point2::new(20.0, 0.0), Point2::new(-5.0, 0.0), Point2::new(20.0, 2.0)])
            .unwrap();
        assert_eq!(pixels.len(), 2);
        // Straight ahead on the ground: centred, below the principal point
        assert_relative_eq!(pixels[0].0, 800.0, epsilon = 1e-3);
        assert!(pixels[0].1 > 450.0);
        // Left of the vehicle projects left of centre
        assert!(pixels[1].0 < 800.0);
    }

    #[test]
    fn test_route_map_clips_to_radius() {
        let route: Vec<Pose2> = (0..100).map(|i| Pose2::new(i as f64, 0.0, 0.0)).collect();
        let map = RouteMapLayer::along(&route, 3.5).with_crosswalk(Pose2::new(50.0, 0.0, 0.0), 3.5);

        let near = map.features_near(Pose2::new(10.0, 0.0, 0.0), 15.0);
        assert_eq!(near.iter().filter(|f| f.kind == MapFeatureKind::RoadEdge).count(), 2);
        assert!(near.iter().all(|f| f.kind != MapFeatureKind::Crosswalk));
        assert!(near.iter().flat_map(|f| &f.points).all(|p| (p.x - 10.0).hypot(p.y) <= 15.0));

        let at_crossing = map.features_near(Pose2::new(50.0, 0.0, 0.0), 10.0);
        assert!(at_crossing.iter().any(|f| f.kind == MapFeatureKind::Crosswalk));
    }
}
