//! Wall-clock [`RunContext`] on the tokio timer.

use crate::RunContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Real time for production runs.
///
/// `now` follows tokio's clock, so a paused test runtime pauses it too.
/// `system_time` is the creation wall time plus `now`, which keeps
/// summary timestamps consistent with measured durations.
#[derive(Debug, Clone)]
pub struct TokioContext {
    origin: Instant,
    wall_origin: SystemTime,
    seed: u64,
}

impl TokioContext {
    pub fn new() -> Self {
        Self::seeded(0)
    }

    /// A context that reports `seed` for runs driven by seeded synthetic inputs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: SystemTime::now(),
            seed,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunContext for TokioContext {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.wall_origin + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
