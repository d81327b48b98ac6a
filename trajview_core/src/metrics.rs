//! Prediction Error Metrics
//! ========================
//!
//! Displacement errors of a predicted trajectory against the sliced ground
//! truth of the same sample:
//! - **ADE**: mean displacement over all matched poses
//! - **FDE**: displacement at the last matched pose
//! - **Max error** and **RMSE**
//!
//! Both trajectories must share a frame and an origin instant. Ground truth
//! is interpolated at each prediction offset; prediction poses beyond the
//! ground truth's coverage are not matched.

use crate::geometry::Trajectory;
use serde::{Deserialize, Serialize};

// =============================================================================
// PER-SAMPLE METRICS
// =============================================================================

/// Error statistics of one prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryMetrics {
    /// Average displacement error (m)
    pub ade: f64,
    /// Final displacement error (m)
    pub fde: f64,
    /// Largest displacement (m)
    pub max_error: f64,
    /// Root mean square displacement (m)
    pub rmse: f64,
    /// Prediction poses that had ground truth to compare against
    pub matched: usize,
}

impl TrajectoryMetrics {
    /// Compares `prediction` with `ground_truth`.
    ///
    /// Returns `None` when no prediction pose falls inside the ground truth's
    /// time coverage.
    pub fn compute(prediction: &Trajectory, ground_truth: &Trajectory) -> Option<Self> {
        let shift = prediction.origin() - ground_truth.origin();
        let errors: Vec<f64> = prediction
            .poses()
            .iter()
            .filter_map(|pose| {
                let truth = ground_truth.position_at(pose.offset + shift)?;
                Some((pose.x - truth.x).hypot(pose.y - truth.y))
            })
            .collect();

        let fde = *errors.last()?;
        let n = errors.len() as f64;
        let sum: f64 = errors.iter().sum();
        let sum_squared: f64 = errors.iter().map(|e| e * e).sum();
        let max_error = errors.iter().copied().fold(0.0, f64::max);

        Some(Self {
            ade: sum / n,
            fde,
            max_error,
            rmse: (sum_squared / n).sqrt(),
            matched: errors.len(),
        })
    }
}

// =============================================================================
// RUN AGGREGATE
// =============================================================================

/// Running mean of per-sample metrics across a run.
#[derive(Debug, Clone, Default)]
pub struct MetricsAccumulator {
    samples: usize,
    ade_sum: f64,
    fde_sum: f64,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, metrics: &TrajectoryMetrics) {
        self.samples += 1;
        self.ade_sum += metrics.ade;
        self.fde_sum += metrics.fde;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn mean_ade(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.ade_sum / self.samples as f64)
    }

    pub fn mean_fde(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.fde_sum / self.samples as f64)
    }
}

// =============================================================================
// TESTS
// =============================================================================
