//! Core run context trait for TrajView pipelines.

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// The central interface for time during a run.
///
/// The runner measures run duration and inference latency with it, and
/// synthetic models spend their inference time through `sleep`, so a
/// virtual clock makes slow calls and timeouts instant and reproducible.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - the tokio timer
/// - **Simulation**: `SimContext` - a virtual clock that only `sleep` moves
#[async_trait]
pub trait RunContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for wall-clock run durations and inference latency.
    fn now(&self) -> Duration;
    
    /// Returns the wall-clock time used to stamp run summaries.
    fn system_time(&self) -> SystemTime;
    
    /// Suspends execution for the given duration.
    ///
    /// In simulation this advances the virtual clock and returns at once.
    async fn sleep(&self, duration: Duration);
    
    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
