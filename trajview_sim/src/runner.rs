//! Sliding-window runner - turns one scene into one animation.
//!
//! ```text
//!  schedule ──► [load frame → invoke predictor → slice references] × worker_cap
//!                          │                       (concurrent, ordered)
//!                          ▼  strictly in schedule order
//!                metrics → history → render → assemble
//! ```
//!
//! Per-sample failures (missing data, model errors, timeouts, bad render
//! inputs) are recorded in the [`RunSummary`] and the run moves on. Only
//! configuration and encoding errors end a run early.

use crate::exporter::RunReport;
use crate::invoker::PredictorInvoker;
use futures::stream::{self, StreamExt};
use image::ImageFormat;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use trajview_core::{
    build_schedule, slice_reference, AnimationAssembler, AnimationConfig, ArtifactInfo, CameraProjector, ConfigError,
    EgoTransform, EmptyMap, EncodingError, FailureReason, Frame, FrameRenderer, HistoryBuffer, HistoryOverlay, Layout,
    MapLayer, MetricsAccumulator, PredictionRecord, Predictor, RenderError, RenderInput, RenderedFrame, RunSummary,
    Sample, SceneAccessor, SlicedReference, TrajectoryKind, TrajectoryMetrics,
};
use trajview_env::{RunContext, RunId, TokioContext};

/// Cooperative cancellation flag, checked between samples.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No artifact was written; the summary says which samples were lost
    #[error("Encoding failed with {} of {} samples rendered: {source}", .summary.succeeded, .summary.scheduled)]
    Encoding {
        source: EncodingError,
        summary: Box<RunSummary>,
    },

    #[error("Could not write {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
}

/// A finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub artifact: ArtifactInfo,
    pub summary_path: PathBuf,
}

/// Loaded, predicted and sliced, waiting for its turn to be rendered.
struct Prepared {
    frame: Frame,
    record: PredictionRecord,
    references: Vec<SlicedReference>,
}

/// Runs the sliding-window pipeline over one scene.
pub struct AnimationRunner {
    config: AnimationConfig,
    context: Arc<dyn RunContext>,
    run_id: RunId,
    map: Arc<dyn MapLayer>,
    projector: Option<Arc<dyn CameraProjector>>,
    layout: Layout,
    cancel: CancelToken,
    /// Scenario name and seed echoed into the report
    scenario: Option<(String, u64)>,
    /// Directory for per-sample PNG copies of each composed image
    frame_dir: Option<PathBuf>,
}

impl AnimationRunner {
    /// Creates a runner with a wall clock, an empty map and no camera projection.
    pub fn new(config: AnimationConfig) -> Self {
        Self {
            config,
            context: TokioContext::shared(),
            run_id: RunId::new(),
            map: Arc::new(EmptyMap),
            projector: None,
            layout: Layout::default(),
            cancel: CancelToken::new(),
            scenario: None,
            frame_dir: None,
        }
    }

    /// Sets the clock used for durations and latency.
    pub fn with_context(mut self, context: Arc<dyn RunContext>) -> Self {
        self.context = context;
        self
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_map(mut self, map: Arc<dyn MapLayer>) -> Self {
        self.map = map;
        self
    }

    pub fn with_projector(mut self, projector: Arc<dyn CameraProjector>) -> Self {
        self.projector = Some(projector);
        self
    }

    /// Sets the canvas size and panel placement.
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Records the synthetic scenario in the persisted report.
    pub fn with_scenario(mut self, name: &str, seed: u64) -> Self {
        self.scenario = Some((name.to_string(), seed));
        self
    }

    /// Also writes every composed image to `dir` as `frame_<ordinal>.png`.
    pub fn with_frame_export(mut self, dir: impl Into<PathBuf>) -> Self {
        self.frame_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs every scheduled sample of `accessor`'s scene through `predictor`
    /// and writes the animation plus `run_summary.json`.
    ///
    /// # Returns
    /// * `Err(RunError::Config)` - invalid config or a schedule that leaves the scene
    /// * `Err(RunError::Encoding)` - no sample rendered, or the GIF could not be written
    pub async fn run(
        &self,
        accessor: Arc<dyn SceneAccessor>,
        predictor: Arc<dyn Predictor>,
    ) -> Result<RunOutcome, RunError> {
        self.config.validate()?;
        let schedule = build_schedule(&self.config.schedule_params(), &accessor.timeline())?;
        let token = accessor.token().clone();
        let predictor_name = predictor.name().to_string();
        let invoker = Arc::new(PredictorInvoker::new(
            predictor,
            self.config.device,
            self.config.timeout(),
            Arc::clone(&self.context),
        )?);
        if let Some(dir) = &self.frame_dir {
            std::fs::create_dir_all(dir).map_err(|source| RunError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        let mut renderer = FrameRenderer::new(Arc::clone(&self.map)).with_layout(self.layout);
        if let Some(projector) = &self.projector {
            renderer = renderer.with_projector(Arc::clone(projector));
        }
        let renderer = Arc::new(renderer);

        info!(
            "Run {}: scene {} | {} samples ({:?}, step {:.3}s) | horizon {:.1}s | {} on {} (workers={})",
            self.run_id,
            token,
            schedule.len(),
            schedule.mode(),
            schedule.step(),
            self.config.prediction_horizon,
            predictor_name,
            self.config.device,
            self.config.worker_cap
        );

        let started = self.context.now();
        let mut summary = RunSummary::new(self.run_id, token.clone(), schedule.len());
        let mut assembler = match AnimationAssembler::new(self.config.artifact_path(token.as_str()), self.config.fps) {
            Ok(assembler) => assembler,
            Err(source) => {
                return Err(RunError::Encoding {
                    source,
                    summary: Box::new(summary),
                })
            }
        };
        let mut history = HistoryBuffer::new(self.config.history_depth, self.config.decay, self.config.base_opacity);
        let mut metrics = MetricsAccumulator::new();
        let mut rendered: Vec<usize> = Vec::with_capacity(schedule.len());
        let horizon = self.config.prediction_horizon;

        // Loading and prediction run ahead of rendering, at most worker_cap
        // samples at a time; results come back in schedule order. This window
        // is the only limit on concurrent model calls.
        let mut stages = stream::iter(schedule.iter())
            .map(|sample| {
                let accessor = Arc::clone(&accessor);
                let invoker = Arc::clone(&invoker);
                let task = tokio::spawn(async move { prepare(accessor.as_ref(), &invoker, sample, horizon).await });
                async move {
                    let prepared = match task.await {
                        Ok(prepared) => prepared,
                        Err(err) => Err(FailureReason::PredictionFailed(format!("load task failed: {}", err))),
                    };
                    (sample, prepared)
                }
            })
            .buffered(self.config.worker_cap);

        while let Some((sample, prepared)) = stages.next().await {
            if self.cancel.is_cancelled() {
                info!("Run {} cancelled at sample {}", self.run_id, sample.ordinal);
                summary.cancelled = true;
                break;
            }

            let Prepared {
                frame,
                record,
                references: sliced,
            } = match prepared {
                Ok(prepared) => prepared,
                Err(reason) => {
                    warn!("Skipping sample {} (frame {}): {}", sample.ordinal, sample.frame_index, reason);
                    summary.record_failure(&sample, reason);
                    continue;
                }
            };
            for reference in &sliced {
                summary.record_fidelity(reference.kind().name(), reference.fidelity);
            }

            let transform = EgoTransform::anchored_at(frame.ego.pose);
            let sample_metrics = ground_truth_metrics(&record, &sliced, &transform);

            history.push(record.clone());
            let overlays: Vec<HistoryOverlay> = history
                .prior()
                .map(|entry| HistoryOverlay {
                    record: entry.record.clone(),
                    age: entry.age,
                    opacity: history.opacity(entry),
                })
                .collect();

            debug!(
                "Sample {} (frame {}, t={:.2}s): {} references, {} history overlays, latency {:?}",
                sample.ordinal,
                sample.frame_index,
                sample.elapsed,
                sliced.len(),
                overlays.len(),
                record.latency
            );

            let input = RenderInput {
                sample,
                frame,
                prediction: record,
                references: sliced,
                history: overlays,
                transform,
                metrics: sample_metrics,
                scene_label: token.short().to_string(),
            };
            let task_renderer = Arc::clone(&renderer);
            let export = self
                .frame_dir
                .as_ref()
                .map(|dir| dir.join(format!("frame_{:04}.png", sample.ordinal)));
            let image = match tokio::task::spawn_blocking(move || {
                let image = task_renderer.render(&input)?;
                if let Some(path) = export {
                    if let Err(err) = image.save_with_format(&path, ImageFormat::Png) {
                        warn!("Could not export {}: {}", path.display(), err);
                    }
                }
                Ok::<_, RenderError>(image)
            })
            .await
            {
                Ok(Ok(image)) => image,
                Ok(Err(err)) => {
                    warn!("Render failed for sample {}: {}", sample.ordinal, err);
                    summary.record_failure(&sample, err.into());
                    continue;
                }
                Err(join) => {
                    warn!("Render task for sample {} did not finish: {}", sample.ordinal, join);
                    summary.record_failure(&sample, RenderError::Task(join.to_string()).into());
                    continue;
                }
            };

            if let Err(source) = assembler.push(RenderedFrame {
                ordinal: sample.ordinal,
                image,
            }) {
                summary.finish(schedule.iter(), &rendered, &metrics);
                summary.duration_secs = self.context.now().saturating_sub(started).as_secs_f64();
                return Err(self.encoding_failure(source, summary, &predictor_name));
            }
            if let Some(m) = &sample_metrics {
                metrics.record(m);
            }
            rendered.push(sample.ordinal);
            summary.record_success();
        }
        // Dropping the stream detaches in-flight loads; their results are discarded
        drop(stages);

        if summary.cancelled {
            let recorded: BTreeSet<usize> = summary
                .failures
                .iter()
                .map(|f| f.ordinal)
                .chain(rendered.iter().copied())
                .collect();
            for sample in schedule.iter().filter(|s| !recorded.contains(&s.ordinal)) {
                summary.record_failure(&sample, FailureReason::Cancelled);
            }
        }
        summary.finish(schedule.iter(), &rendered, &metrics);

        let encoded = assembler.finish();
        summary.duration_secs = self.context.now().saturating_sub(started).as_secs_f64();
        let artifact = match encoded {
            Ok(artifact) => artifact,
            Err(source) => return Err(self.encoding_failure(source, summary, &predictor_name)),
        };
        summary.artifact = Some(artifact.clone());

        let summary_path = self.persist(&summary, &predictor_name)?;
        info!("{}", summary.headline());
        for failure in &summary.failures {
            debug!("  skipped frame {} at t={:.2}s: {}", failure.frame_index, failure.time, failure.reason);
        }

        Ok(RunOutcome {
            summary,
            artifact,
            summary_path,
        })
    }

    /// Writes the report to `<output_dir>/run_summary.json`.
    fn persist(&self, summary: &RunSummary, predictor_name: &str) -> Result<PathBuf, RunError> {
        let path = self.config.summary_path();
        let mut report =
            RunReport::new(summary.clone(), predictor_name, self.config.clone()).started_at(self.context.system_time());
        if let Some((name, seed)) = &self.scenario {
            report = report.with_scenario(name, *seed);
        }
        report.write_to_file(&path).map_err(|source| RunError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Persists what is known about a run whose animation could not be written.
    fn encoding_failure(&self, source: EncodingError, summary: RunSummary, predictor_name: &str) -> RunError {
        error!("Run {} produced no animation: {}", self.run_id, source);
        if let Err(err) = self.persist(&summary, predictor_name) {
            warn!("{}", err);
        }
        RunError::Encoding {
            source,
            summary: Box::new(summary),
        }
    }
}

/// Loads one sample, runs the model on it and cuts the references to the
/// prediction window. Missing or malformed references skip the sample.
async fn prepare(
    accessor: &dyn SceneAccessor,
    invoker: &PredictorInvoker,
    sample: Sample,
    horizon: f64,
) -> Result<Prepared, FailureReason> {
    let frame = accessor.frame(sample.frame_index).await?;
    let record = invoker.invoke(&frame, horizon).await?;
    let window_start = record.source_time;
    let references = accessor
        .references(sample.frame_index)
        .await?
        .iter()
        .map(|reference| {
            slice_reference(reference, window_start, window_start + horizon).map_err(|err| {
                FailureReason::DataUnavailable(format!("malformed {} reference: {}", reference.kind, err))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Prepared {
        frame,
        record,
        references,
    })
}

/// Prediction error against the sliced ground truth, both in the sample's ego frame.
fn ground_truth_metrics(
    record: &PredictionRecord,
    references: &[SlicedReference],
    transform: &EgoTransform,
) -> Option<TrajectoryMetrics> {
    let truth = references.iter().find(|r| r.kind() == TrajectoryKind::GroundTruth)?;
    let prediction = transform.relative_to_ego(record.anchor, &record.trajectory);
    TrajectoryMetrics::compute(&prediction, &transform.trajectory_to_ego(&truth.trajectory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use crate::oracle::{PinholeProjector, SceneSpec, SyntheticPredictor, SyntheticScene};
    use async_trait::async_trait;
    use image::codecs::gif::GifDecoder;
    use image::AnimationDecoder;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use trajview_core::render::Region;
    use trajview_core::{
        PredictorInput, RawPrediction, ReferenceSamples, ReferenceTrajectory, SceneTimeline, SensorChannel, TimedPose,
    };
    use trajview_env::{EnvError, FrameIndex, SceneToken};

    /// Small canvas so encoding stays fast.
    fn small_layout() -> Layout {
        Layout {
            width: 320,
            height: 180,
            bev: Region::new(0, 0, 180, 180),
            camera: Region::new(180, 0, 140, 75),
            comparison: Region::new(180, 75, 140, 60),
            status: Region::new(180, 135, 140, 45),
        }
    }

    fn scene(spec: SceneSpec) -> Arc<SyntheticScene> {
        Arc::new(SyntheticScene::generate(spec, &mut ChaCha8Rng::seed_from_u64(11)))
    }

    fn config(dir: &std::path::Path) -> AnimationConfig {
        AnimationConfig {
            total_duration: 6.0,
            output_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn runner(config: AnimationConfig) -> AnimationRunner {
        AnimationRunner::new(config)
            .with_context(SimContext::shared(11))
            .with_run_id(RunId::from_seed(11))
            .with_projector(Arc::new(PinholeProjector::default()))
            .with_layout(small_layout())
    }

    fn gif_frame_count(path: &std::path::Path) -> usize {
        let bytes = std::fs::read(path).unwrap();
        let decoder = GifDecoder::new(Cursor::new(bytes)).unwrap();
        decoder.into_frames().collect_frames().unwrap().len()
    }

    #[tokio::test]
    async fn test_one_prediction_failure_of_thirteen() {
        let dir = tempfile::tempdir().unwrap();
        let scene = scene(SceneSpec::default());
        // Sample 4 lands on frame 20 (2 Hz over a 10 Hz scene)
        let predictor = Arc::new(SyntheticPredictor::new(3).with_fail_frames([20]));

        let outcome = runner(config(dir.path())).run(scene, predictor).await.unwrap();
        let summary = &outcome.summary;

        assert_eq!(summary.scheduled, 13);
        assert_eq!(summary.succeeded, 12);
        assert_eq!(summary.skipped(), 1);
        let failure = &summary.failures[0];
        assert_eq!(failure.ordinal, 4);
        assert_eq!(failure.frame_index, FrameIndex(20));
        assert!((failure.time - 2.0).abs() < 1e-9);
        assert!(matches!(failure.reason, FailureReason::PredictionFailed(_)));

        assert_eq!(outcome.artifact.frame_count, 12);
        assert_eq!(gif_frame_count(&outcome.artifact.path), 12);
        assert_eq!(outcome.artifact.path, dir.path().join("sliding_synthetic.gif"));
        assert!(summary.mean_ade.is_some());
        // Every baseline is untimed
        assert_eq!(summary.approximated_references.get("baseline_reference"), Some(&12));
        assert!(!summary.cancelled);

        let report = RunReport::read_from_file(&outcome.summary_path).unwrap();
        assert_eq!(report.summary.succeeded, 12);
        assert_eq!(report.summary.failures, summary.failures);
        assert_eq!(report.summary.artifact, summary.artifact);
        assert_eq!(report.predictor, "synthetic-ctrv");
    }

    #[tokio::test]
    async fn test_missing_data_is_recorded_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let scene = scene(SceneSpec {
            missing_frames: BTreeSet::from([10]),
            camera_dropouts: BTreeSet::from([30]),
            ..Default::default()
        });

        let outcome = runner(config(dir.path()))
            .run(scene, Arc::new(SyntheticPredictor::new(3)))
            .await
            .unwrap();
        let reasons: Vec<(usize, &FailureReason)> =
            outcome.summary.failures.iter().map(|f| (f.frame_index.get(), &f.reason)).collect();

        assert_eq!(reasons.len(), 2);
        assert_eq!(reasons[0].0, 10);
        assert!(matches!(reasons[0].1, FailureReason::DataUnavailable(_)));
        assert_eq!(reasons[1].0, 30);
        assert!(matches!(reasons[1].1, FailureReason::PredictionFailed(msg) if msg.contains("cam_f0")));
        assert_eq!(outcome.summary.succeeded, 11);
    }

    #[tokio::test]
    async fn test_slow_prediction_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = SyntheticPredictor::new(3).with_slow_frames([15], Duration::from_secs(5));
        let config = AnimationConfig {
            total_duration: 2.0,
            predictor_timeout: 0.05,
            ..config(dir.path())
        };

        let outcome = runner(config)
            .run(scene(SceneSpec::default()), Arc::new(predictor))
            .await
            .unwrap();

        assert_eq!(outcome.summary.scheduled, 5);
        assert_eq!(outcome.summary.succeeded, 4);
        assert_eq!(outcome.summary.failures[0].reason, FailureReason::PredictionTimeout(50));
    }

    #[tokio::test]
    async fn test_virtual_clock_times_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let clock = SimContext::shared(11);
        let predictor = SyntheticPredictor::new(3)
            .with_clock(clock.clone())
            .with_slow_frames([15], Duration::from_secs(5));
        let config = AnimationConfig {
            total_duration: 2.0,
            predictor_timeout: 1.0,
            ..config(dir.path())
        };

        let real = std::time::Instant::now();
        let outcome = runner(config)
            .with_context(clock.clone())
            .run(scene(SceneSpec::default()), Arc::new(predictor))
            .await
            .unwrap();
        let summary = &outcome.summary;

        assert!(real.elapsed() < Duration::from_secs(5));
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failures[0].frame_index, FrameIndex(15));
        assert_eq!(summary.failures[0].reason, FailureReason::PredictionTimeout(1000));
        assert!(summary.duration_secs >= 5.0);
    }

    #[tokio::test]
    async fn test_no_rendered_frames_is_an_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let scene = scene(SceneSpec {
            missing_frames: (0..=20).collect(),
            ..Default::default()
        });
        let config = AnimationConfig {
            total_duration: 2.0,
            ..config(dir.path())
        };

        let err = runner(config.clone())
            .run(scene, Arc::new(SyntheticPredictor::new(3)))
            .await
            .unwrap_err();

        match err {
            RunError::Encoding { source, summary } => {
                assert!(matches!(source, EncodingError::NoFrames));
                assert_eq!(summary.succeeded, 0);
                assert_eq!(summary.skipped(), summary.scheduled);
                assert!(summary.artifact.is_none());
            }
            other => panic!("expected encoding error, got {:?}", other),
        }
        assert!(!config.artifact_path("synthetic").exists());
        assert!(config.summary_path().exists());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_sample() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnimationConfig {
            worker_cap: 0,
            ..config(dir.path())
        };
        let result = runner(config)
            .run(scene(SceneSpec::default()), Arc::new(SyntheticPredictor::new(3)))
            .await;
        assert!(matches!(result, Err(RunError::Config(ConfigError::InvalidWorkerCap))));

        let config = AnimationConfig {
            total_duration: 60.0,
            ..self::config(dir.path())
        };
        let result = runner(config)
            .run(scene(SceneSpec::default()), Arc::new(SyntheticPredictor::new(3)))
            .await;
        assert!(matches!(result, Err(RunError::Config(ConfigError::FrameOutOfRange { .. }))));
        assert!(!dir.path().join("run_summary.json").exists());
    }

    /// Scene whose references are missing or malformed on chosen frames.
    struct FaultyReferences {
        inner: Arc<SyntheticScene>,
        missing: BTreeSet<usize>,
        malformed: BTreeSet<usize>,
    }

    #[async_trait]
    impl SceneAccessor for FaultyReferences {
        fn token(&self) -> &SceneToken {
            self.inner.token()
        }

        fn timeline(&self) -> SceneTimeline {
            self.inner.timeline()
        }

        async fn frame(&self, index: FrameIndex) -> Result<Frame, EnvError> {
            self.inner.frame(index).await
        }

        async fn references(&self, index: FrameIndex) -> Result<Vec<ReferenceTrajectory>, EnvError> {
            if self.missing.contains(&index.get()) {
                return Err(EnvError::unavailable(format!("no references for frame {}", index)));
            }
            let mut references = self.inner.references(index).await?;
            if self.malformed.contains(&index.get()) {
                let start = references[0].start_time;
                references.push(ReferenceTrajectory {
                    kind: TrajectoryKind::BaselineReference,
                    start_time: start,
                    samples: ReferenceSamples::Timestamped(vec![
                        TimedPose::new(1.0, 0.0, 0.0, 0.0),
                        TimedPose::new(0.5, 1.0, 0.0, 0.0),
                    ]),
                });
            }
            Ok(references)
        }
    }

    #[tokio::test]
    async fn test_missing_or_malformed_references_skip_the_sample() {
        let dir = tempfile::tempdir().unwrap();
        let accessor = Arc::new(FaultyReferences {
            inner: scene(SceneSpec::default()),
            missing: BTreeSet::from([20]),
            malformed: BTreeSet::from([40]),
        });

        let outcome = runner(config(dir.path()))
            .run(accessor, Arc::new(SyntheticPredictor::new(3)))
            .await
            .unwrap();
        let summary = &outcome.summary;

        assert_eq!(summary.scheduled, 13);
        assert_eq!(summary.succeeded, 11);
        assert_eq!(summary.skipped(), 2);
        let skipped: Vec<usize> = summary.failed_frames().map(|f| f.get()).collect();
        assert_eq!(skipped, vec![20, 40]);
        assert!(summary
            .failures
            .iter()
            .all(|f| matches!(f.reason, FailureReason::DataUnavailable(_))));
        assert!(matches!(&summary.failures[1].reason, FailureReason::DataUnavailable(msg) if msg.contains("malformed")));
        assert_eq!(outcome.artifact.frame_count, 11);
        // Fidelity is only counted for rendered samples
        assert_eq!(summary.approximated_references.get("baseline_reference"), Some(&11));
    }

    /// Counts model calls in flight.
    struct CountingPredictor {
        inner: SyntheticPredictor,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Predictor for CountingPredictor {
        fn name(&self) -> &str {
            "counting"
        }

        fn required_channels(&self) -> Vec<SensorChannel> {
            self.inner.required_channels()
        }

        async fn predict(&self, input: PredictorInput) -> Result<RawPrediction, EnvError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            let result = self.inner.predict(input).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_cap_bounds_model_calls() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = Arc::new(CountingPredictor {
            inner: SyntheticPredictor::new(3),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = AnimationConfig {
            worker_cap: 3,
            ..config(dir.path())
        };

        let outcome = runner(config)
            .run(scene(SceneSpec::default()), predictor.clone())
            .await
            .unwrap();

        assert_eq!(outcome.summary.succeeded, 13);
        let peak = predictor.peak.load(Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak {}", peak);
    }

    #[tokio::test]
    async fn test_frame_export_writes_one_png_per_rendered_sample() {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        let config = AnimationConfig {
            total_duration: 2.0,
            ..config(dir.path())
        };
        let predictor = SyntheticPredictor::new(3).with_fail_frames([10]);

        let outcome = runner(config)
            .with_frame_export(&frames)
            .run(scene(SceneSpec::default()), Arc::new(predictor))
            .await
            .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(&frames)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(outcome.summary.succeeded, 4);
        assert_eq!(names, vec!["frame_0000.png", "frame_0001.png", "frame_0003.png", "frame_0004.png"]);

        let png = image::open(frames.join("frame_0003.png")).unwrap();
        assert_eq!((png.width(), png.height()), (320, 180));
    }

    /// Cancels the run as soon as the model is asked about `frame`.
    struct CancellingPredictor {
        inner: SyntheticPredictor,
        token: CancelToken,
        frame: f32,
    }

    #[async_trait]
    impl Predictor for CancellingPredictor {
        fn name(&self) -> &str {
            "cancelling"
        }

        fn required_channels(&self) -> Vec<SensorChannel> {
            self.inner.required_channels()
        }

        async fn predict(&self, input: PredictorInput) -> Result<RawPrediction, EnvError> {
            let channel = SensorChannel::new(SensorChannel::FRONT_CAMERA);
            if input.sensors.payload(&channel).map(|p| p.data[0]) == Some(self.frame) {
                self.token.cancel();
            }
            self.inner.predict(input).await
        }
    }

    #[tokio::test]
    async fn test_cancellation_keeps_rendered_frames() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancelToken::new();
        let predictor = CancellingPredictor {
            inner: SyntheticPredictor::new(3),
            token: token.clone(),
            frame: 30.0,
        };

        let outcome = runner(config(dir.path()))
            .with_cancel_token(token)
            .run(scene(SceneSpec::default()), Arc::new(predictor))
            .await
            .unwrap();
        let summary = &outcome.summary;

        assert!(summary.cancelled);
        assert!(summary.succeeded >= 4 && summary.succeeded < 13);
        assert_eq!(summary.succeeded + summary.skipped(), summary.scheduled);
        assert!(summary.failures.iter().all(|f| f.reason == FailureReason::Cancelled));
        assert_eq!(gif_frame_count(&outcome.artifact.path), summary.succeeded);
    }

    #[tokio::test]
    async fn test_zero_history_depth_still_renders() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnimationConfig {
            total_duration: 1.0,
            history_depth: 0,
            ..config(dir.path())
        };
        let outcome = runner(config)
            .run(scene(SceneSpec::default()), Arc::new(SyntheticPredictor::new(3)))
            .await
            .unwrap();
        assert_eq!(outcome.summary.succeeded, 3);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
