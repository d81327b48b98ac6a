//! Demo scenarios: seeded synthetic scenes paired with a synthetic model.

use crate::context::SimContext;
use crate::oracle::{MotionProfile, PinholeProjector, RouteMapLayer, SceneSpec, SyntheticPredictor, SyntheticScene};
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::Arc;
use trajview_env::{RunContext, SceneToken};

/// RNG streams drawn from the simulation context.
const SCENE_STREAM: u64 = 1;
const PREDICTOR_STREAM: u64 = 2;

const LANE_WIDTH: f64 = 3.5;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// Straight road at constant speed
    Cruise,

    /// Constant speed through a left turn
    LeftTurn,

    /// Repeated stops at a crosswalk
    StopAndGo,

    /// Cruise with missing frames, a camera dropout and a failing model call
    Degraded,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Cruise,
            ScenarioId::LeftTurn,
            ScenarioId::StopAndGo,
            ScenarioId::Degraded,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Cruise => "cruise",
            ScenarioId::LeftTurn => "left_turn",
            ScenarioId::StopAndGo => "stop_and_go",
            ScenarioId::Degraded => "degraded",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Cruise => "8 m/s on a straight road with mixed traffic",
            ScenarioId::LeftTurn => "6 m/s with a 0.3 rad/s left turn between 2 s and 7 s",
            ScenarioId::StopAndGo => "speed cycling between 0 and 10 m/s every 6 s near a crosswalk",
            ScenarioId::Degraded => "cruise with 2 missing frames, 1 camera dropout and 1 model failure",
        }
    }

    fn motion(&self) -> MotionProfile {
        match self {
            ScenarioId::Cruise | ScenarioId::Degraded => MotionProfile::Cruise { speed: 8.0 },
            ScenarioId::LeftTurn => MotionProfile::Turn {
                speed: 6.0,
                yaw_rate: 0.3,
                start: 2.0,
                end: 7.0,
            },
            ScenarioId::StopAndGo => MotionProfile::StopAndGo { cruise: 10.0, period: 6.0 },
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('-', "_");
        ScenarioId::all()
            .into_iter()
            .find(|id| id.name() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = ScenarioId::all().iter().map(|id| id.name()).collect();
                format!("Unknown scenario: {} (expected one of {})", s, known.join(", "))
            })
    }
}

/// Collaborators for one scenario run.
pub struct Scenario {
    pub id: ScenarioId,
    pub scene: Arc<SyntheticScene>,
    pub predictor: Arc<SyntheticPredictor>,
    pub map: Arc<RouteMapLayer>,
    pub projector: Arc<PinholeProjector>,
}

impl Scenario {
    /// Builds the scenario from `context`'s seed. `fail_frames` adds model
    /// failures on top of whatever the scenario injects itself.
    pub fn build(id: ScenarioId, context: &SimContext, fail_frames: &[usize]) -> Self {
        let mut spec = SceneSpec {
            token: SceneToken::new(format!("{}_{:04}", id.name(), context.seed())),
            motion: id.motion(),
            ..Default::default()
        };
        let mut predictor_failures: BTreeSet<usize> = fail_frames.iter().copied().collect();
        if id == ScenarioId::Degraded {
            spec.missing_frames = BTreeSet::from([25, 26]);
            spec.camera_dropouts = BTreeSet::from([40]);
            predictor_failures.insert(60);
        }

        let scene = SyntheticScene::generate(spec, &mut context.rng_for(SCENE_STREAM));
        let route = scene.route();
        let mut map = RouteMapLayer::along(&route, LANE_WIDTH);
        if id == ScenarioId::StopAndGo {
            // Crossings where the speed cycle bottoms out (every 6 s at 10 Hz)
            for index in (60..route.len()).step_by(60) {
                let ahead = route.get(index + 5).unwrap_or(&route[index]);
                map = map.with_crosswalk(*ahead, LANE_WIDTH);
            }
        }

        let predictor_seed: u64 = context.rng_for(PREDICTOR_STREAM).gen();
        let predictor = SyntheticPredictor::new(predictor_seed).with_fail_frames(predictor_failures);

        Self {
            id,
            scene: Arc::new(scene),
            predictor: Arc::new(predictor),
            map: Arc::new(map),
            projector: Arc::new(PinholeProjector::default()),
        }
    }
}
