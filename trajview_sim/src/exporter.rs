//! JSON exporter for run summaries.
//!
//! - `run_summary.json`: the [`RunSummary`] fields at the top level,
//!   followed by the configuration and collaborators that produced it
//! - `batch_summary.json`: one line per scene of a multi-scene batch plus
//!   aggregate ADE/FDE

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use trajview_core::{AnimationConfig, RunSummary};

/// Writes `value` as pretty JSON, creating parent directories as needed.
fn write_json<T: Serialize>(value: &T, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// Everything persisted about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub summary: RunSummary,

    /// Model name
    pub predictor: String,

    /// Scenario name, for synthetic runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,

    /// Master seed, for synthetic runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Run start, seconds since the Unix epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<f64>,

    /// Configuration echo
    pub config: AnimationConfig,
}

impl RunReport {
    /// Creates a report for a finished run.
    pub fn new(summary: RunSummary, predictor: &str, config: AnimationConfig) -> Self {
        Self {
            summary,
            predictor: predictor.to_string(),
            scenario: None,
            seed: None,
            started_at: None,
            config,
        }
    }

    /// Tags the report with the synthetic scenario that produced it.
    pub fn with_scenario(mut self, scenario: &str, seed: u64) -> Self {
        self.scenario = Some(scenario.to_string());
        self.seed = Some(seed);
        self
    }

    /// Stamps the report with the run's start time.
    pub fn started_at(mut self, time: SystemTime) -> Self {
        self.started_at = time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs_f64());
        self
    }

    /// Writes to a JSON file, creating parent directories as needed.
    pub fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
        write_json(self, path)
    }

    /// Reads a report written by [`write_to_file`](Self::write_to_file).
    pub fn read_from_file(path: &Path) -> std::io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// One scene of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub scenario: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_token: Option<String>,
    pub scheduled: usize,
    pub succeeded: usize,
    pub mean_ade: Option<f64>,
    pub mean_fde: Option<f64>,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    /// Why the run produced no animation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchEntry {
    fn from_summary(scenario: &str, summary: &RunSummary, error: Option<String>) -> Self {
        Self {
            scenario: scenario.to_string(),
            scene_token: Some(summary.scene_token.to_string()),
            scheduled: summary.scheduled,
            succeeded: summary.succeeded,
            mean_ade: summary.mean_ade,
            mean_fde: summary.mean_fde,
            duration_secs: summary.duration_secs,
            artifact: summary.artifact.as_ref().map(|a| a.path.clone()),
            error,
        }
    }
}

/// Means over the scenes that produced an animation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub mean_ade: Option<f64>,
    pub mean_fde: Option<f64>,
    pub mean_duration_secs: Option<f64>,
}

/// Everything persisted about a multi-scene batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub seed: u64,
    pub total_scenes: usize,
    pub successful_scenes: usize,
    pub failed_scenes: usize,
    /// Percentage of scenes that produced an animation
    pub success_rate: f64,
    pub aggregate: AggregateMetrics,
    pub scenes: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            total_scenes: 0,
            successful_scenes: 0,
            failed_scenes: 0,
            success_rate: 0.0,
            aggregate: AggregateMetrics::default(),
            scenes: Vec::new(),
        }
    }

    /// Adds a scene whose animation was written.
    pub fn add_success(&mut self, scenario: &str, summary: &RunSummary) {
        self.scenes.push(BatchEntry::from_summary(scenario, summary, None));
        self.refresh();
    }

    /// Adds a scene whose run ended early. `summary` is whatever the run
    /// managed to record, if anything.
    pub fn add_failure(&mut self, scenario: &str, summary: Option<&RunSummary>, error: impl Into<String>) {
        let error = Some(error.into());
        let entry = match summary {
            Some(summary) => BatchEntry::from_summary(scenario, summary, error),
            None => BatchEntry {
                scenario: scenario.to_string(),
                scene_token: None,
                scheduled: 0,
                succeeded: 0,
                mean_ade: None,
                mean_fde: None,
                duration_secs: 0.0,
                artifact: None,
                error,
            },
        };
        self.scenes.push(entry);
        self.refresh();
    }

    fn refresh(&mut self) {
        let successful: Vec<&BatchEntry> = self.scenes.iter().filter(|e| e.error.is_none()).collect();
        self.total_scenes = self.scenes.len();
        self.successful_scenes = successful.len();
        self.failed_scenes = self.total_scenes - self.successful_scenes;
        self.success_rate = 100.0 * self.successful_scenes as f64 / self.total_scenes as f64;

        let mean = |values: Vec<f64>| (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
        self.aggregate = AggregateMetrics {
            mean_ade: mean(successful.iter().filter_map(|e| e.mean_ade).collect()),
            mean_fde: mean(successful.iter().filter_map(|e| e.mean_fde).collect()),
            mean_duration_secs: mean(successful.iter().map(|e| e.duration_secs).collect()),
        };
    }

    pub fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
        write_json(self, path)
    }

    pub fn read_from_file(path: &Path) -> std::io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
