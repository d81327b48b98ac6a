//! TrajView Environment Abstraction Layer
//!
//! This crate provides the seams between the TrajView animation engine and
//! the world it runs in. Everything that is not pure geometry or rendering
//! goes through here:
//! - Time (`now()`, `sleep()`) for run durations and predictor latency
//! - Identifiers for scenes, frames and runs
//! - The compute `Device` that sensor tensors are staged onto
//! - The error type every external collaborator reports through
//!
//! Production runs use [`TokioContext`]; tests and the demo CLI use a
//! deterministic virtual clock so summaries are reproducible.
//!
//! # Example
//!
//! ```ignore
//! use trajview_env::{RunContext, TokioContext};
//!
//! let ctx = TokioContext::shared();
//! let started = ctx.now();
//! // ... process samples ...
//! let wall_clock = ctx.now() - started;
//! ```

mod context;
mod types;
mod error;
mod tokio_impl;

pub use context::RunContext;
pub use types::{Device, FrameIndex, RunId, SceneToken};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
