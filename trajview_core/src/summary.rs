//! Per-run accounting of scheduled, rendered and skipped samples.

use crate::error::{FailureReason, FrameFailure};
use crate::metrics::MetricsAccumulator;
use crate::slicer::TimingFidelity;
use crate::timeline::Sample;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use trajview_env::{FrameIndex, RunId, SceneToken};

/// Where the animation landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub frame_count: usize,
}

/// Outcome of one run. Append-only while the run is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub scene_token: SceneToken,
    pub scheduled: usize,
    pub succeeded: usize,
    pub failures: Vec<FrameFailure>,
    pub artifact: Option<ArtifactInfo>,
    /// Wall-clock seconds from first load to artifact rename
    pub duration_secs: f64,
    /// Samples whose references were timed by index, keyed by trajectory kind
    pub approximated_references: BTreeMap<String, usize>,
    pub mean_ade: Option<f64>,
    pub mean_fde: Option<f64>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new(run_id: RunId, scene_token: SceneToken, scheduled: usize) -> Self {
        Self {
            run_id,
            scene_token,
            scheduled,
            succeeded: 0,
            failures: Vec::new(),
            artifact: None,
            duration_secs: 0.0,
            approximated_references: BTreeMap::new(),
            mean_ade: None,
            mean_fde: None,
            cancelled: false,
        }
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, sample: &Sample, reason: FailureReason) {
        self.failures.push(FrameFailure {
            ordinal: sample.ordinal,
            frame_index: sample.frame_index,
            time: sample.time,
            reason,
        });
    }

    /// Notes that a reference of `kind` was sliced with index-based timing.
    pub fn record_fidelity(&mut self, kind: &str, fidelity: TimingFidelity) {
        if fidelity.is_approximate() {
            *self.approximated_references.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    pub fn skipped(&self) -> usize {
        self.failures.len()
    }

    pub fn failed_frames(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        self.failures.iter().map(|f| f.frame_index)
    }

    /// Seals the summary: failures sorted by schedule position, metrics
    /// means filled in, and any sample neither rendered nor failed listed as
    /// unaccounted so that `succeeded == scheduled - skipped` holds.
    pub fn finish(&mut self, schedule: impl IntoIterator<Item = Sample>, rendered: &[usize], metrics: &MetricsAccumulator) {
        self.failures.sort_by_key(|f| f.ordinal);
        let mut missing = Vec::new();
        for sample in schedule {
            let accounted = rendered.binary_search(&sample.ordinal).is_ok()
                || self.failures.iter().any(|f| f.ordinal == sample.ordinal);
            if !accounted {
                missing.push(sample);
            }
        }
        for sample in &missing {
            self.record_failure(sample, FailureReason::Unaccounted);
        }
        self.failures.sort_by_key(|f| f.ordinal);
        self.succeeded = rendered.len();
        self.mean_ade = metrics.mean_ade();
        self.mean_fde = metrics.mean_fde();
    }

    /// One-line human summary.
    pub fn headline(&self) -> String {
        format!(
            "run {} scene {}: {}/{} frames rendered, {} skipped{}",
            self.run_id,
            self.scene_token.short(),
            self.succeeded,
            self.scheduled,
            self.skipped(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}
