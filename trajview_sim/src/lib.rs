//! TrajView runner and deterministic demo harness
//!
//! Drives the sliding-window animation end to end: sample the scene timeline,
//! call the model on a capped worker pool, slice the references, render each
//! panel set, and encode the animation plus a `run_summary.json`.
//!
//! # Pipeline
//!
//! ```text
//!   schedule ──► prepare (load frame, invoke model)   ◄── up to worker_cap in flight
//!                    │
//!                    ▼ (schedule order)
//!              slice references ──► history ──► render ──► assembler ──► GIF
//!                                                              │
//!                                                              └──► run_summary.json
//! ```
//!
//! Multi-scene batches add a `batch_summary.json` ([`BatchReport`]) with
//! per-scene and aggregate ADE/FDE.
//!
//! The [`oracle`] module supplies seeded synthetic collaborators (scene,
//! model, map and camera projector) so the whole pipeline runs without a
//! dataset or a GPU.
//!
//! # Usage
//!
//! ```ignore
//! use trajview_sim::{AnimationRunner, Scenario, ScenarioId, SimContext};
//! use trajview_core::AnimationConfig;
//!
//! let scenario = Scenario::build(ScenarioId::LeftTurn, &SimContext::new(42), &[]);
//! let outcome = AnimationRunner::new(AnimationConfig::default())
//!     .with_map(scenario.map.clone())
//!     .with_projector(scenario.projector.clone())
//!     .run(scenario.scene.clone(), scenario.predictor.clone())
//!     .await?;
//! println!("{}", outcome.summary.headline());
//! ```

mod context;
pub mod exporter;
pub mod invoker;
pub mod oracle;
pub mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{AggregateMetrics, BatchEntry, BatchReport, RunReport};
pub use invoker::{normalize, PredictorInvoker};
pub use oracle::{
    front_camera_calibration, MotionProfile, PinholeProjector, RouteMapLayer, SceneSpec, SyntheticPredictor,
    SyntheticScene,
};
pub use runner::{AnimationRunner, CancelToken, RunError, RunOutcome};
pub use scenarios::{Scenario, ScenarioId};
