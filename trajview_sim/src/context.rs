//! Virtual clock and seeded randomness for reproducible runs.

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use trajview_env::RunContext;

/// Wall time of virtual instant zero: 2024-01-01T00:00:00Z.
const EPOCH_SECS: u64 = 1_704_067_200;

/// A [`RunContext`] whose clock only moves when something sleeps on it.
///
/// Clones share the clock. Each consumer draws its own RNG stream from the
/// master seed, so adding a consumer never perturbs the others.
#[derive(Debug, Clone)]
pub struct SimContext {
    seed: u64,
    elapsed_ns: Arc<AtomicU64>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            elapsed_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Moves virtual time forward by `by`.
    pub fn advance(&self, by: Duration) {
        let ns = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .elapsed_ns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| Some(t.saturating_add(ns)));
    }

    /// Independent RNG stream for one consumer (scene, predictor, ...).
    pub fn rng_for(&self, stream: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed.wrapping_mul(0x517cc1b727220a95) ^ stream)
    }
}

#[async_trait]
impl RunContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::SeqCst))
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(EPOCH_SECS) + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[tokio::test]
    async fn test_sleep_is_instant_and_shared() {
        let ctx = SimContext::new(7);
        let other = ctx.clone();
        let real = std::time::Instant::now();

        ctx.sleep(Duration::from_secs(30)).await;
        other.advance(Duration::from_millis(500));

        assert_eq!(ctx.now(), Duration::from_millis(30_500));
        assert_eq!(other.now(), ctx.now());
        assert!(real.elapsed() < Duration::from_secs(5));
        assert_eq!(
            ctx.system_time(),
            UNIX_EPOCH + Duration::from_secs(EPOCH_SECS) + Duration::from_millis(30_500)
        );
    }

    #[test]
    fn test_rng_streams() {
        let a: u64 = SimContext::new(42).rng_for(1).gen();
        let b: u64 = SimContext::new(42).rng_for(1).gen();
        let c: u64 = SimContext::new(42).rng_for(2).gen();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(SimContext::new(42).seed(), 42);
    }
}
