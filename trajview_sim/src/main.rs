//! TrajView CLI
//!
//! Renders sliding-window prediction animations for the built-in synthetic
//! scenarios.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use trajview_core::AnimationConfig;
use trajview_env::{Device, TokioContext};
use trajview_sim::{AnimationRunner, BatchReport, CancelToken, RunError, Scenario, ScenarioId, SimContext};

/// TrajView sliding-window animation CLI
#[derive(Parser, Debug)]
#[command(name = "trajview")]
#[command(about = "Animate trajectory predictions over a synthetic driving scene", long_about = None)]
struct Args {
    /// Scenario to run (cruise, left_turn, stop_and_go, degraded, all)
    #[arg(short = 'S', long, default_value = "cruise")]
    scenario: String,

    /// Master seed for the scene and model noise (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Samples per second of scene time
    #[arg(long)]
    sampling_rate: Option<f64>,

    /// Seconds of scene time to animate
    #[arg(short, long)]
    duration: Option<f64>,

    /// Seconds each prediction covers
    #[arg(long)]
    horizon: Option<f64>,

    /// Prior predictions drawn as a fading overlay
    #[arg(long)]
    history_depth: Option<usize>,

    /// Per-age opacity multiplier
    #[arg(long)]
    decay: Option<f64>,

    /// Opacity of the newest overlay
    #[arg(long)]
    base_opacity: Option<f64>,

    /// Playback frames per second
    #[arg(long)]
    fps: Option<f64>,

    /// First scene frame to sample
    #[arg(long)]
    start_frame: Option<usize>,

    /// Scene frames between samples (instead of --sampling-rate)
    #[arg(long)]
    frame_step: Option<usize>,

    /// Model calls allowed in flight at once
    #[arg(short, long)]
    workers: Option<usize>,

    /// Seconds before a model call is abandoned
    #[arg(long)]
    timeout: Option<f64>,

    /// Compute device (cpu, cuda:N)
    #[arg(long)]
    device: Option<Device>,

    /// Directory for the animation and run_summary.json
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also save every composed frame as a PNG under <output-dir>/frames
    #[arg(long)]
    export_frames: bool,

    /// Extra frame indices on which the model call fails
    #[arg(long, value_delimiter = ',')]
    fail_frames: Vec<usize>,

    /// List scenarios and exit
    #[arg(long)]
    list: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for scripting
    #[arg(long)]
    json: bool,
}

impl Args {
    fn config(&self) -> AnimationConfig {
        let defaults = AnimationConfig::default();
        AnimationConfig {
            sampling_rate: self.sampling_rate.unwrap_or(defaults.sampling_rate),
            total_duration: self.duration.unwrap_or(defaults.total_duration),
            prediction_horizon: self.horizon.unwrap_or(defaults.prediction_horizon),
            history_depth: self.history_depth.unwrap_or(defaults.history_depth),
            decay: self.decay.unwrap_or(defaults.decay),
            base_opacity: self.base_opacity.unwrap_or(defaults.base_opacity),
            fps: self.fps.unwrap_or(defaults.fps),
            start_frame_index: self.start_frame.unwrap_or(defaults.start_frame_index),
            frame_step: self.frame_step.unwrap_or(defaults.frame_step),
            worker_cap: self.workers.unwrap_or(defaults.worker_cap),
            predictor_timeout: self.timeout.unwrap_or(defaults.predictor_timeout),
            device: self.device.unwrap_or(defaults.device),
            output_dir: self.output_dir.clone().unwrap_or(defaults.output_dir),
        }
    }
}

/// Runs one scenario and records the result in `batch`.
async fn run_scenario(
    id: ScenarioId,
    seed: u64,
    mut config: AnimationConfig,
    args: &Args,
    cancel: CancelToken,
    batch: &mut BatchReport,
) {
    if args.scenario == "all" {
        config.output_dir = config.output_dir.join(id.name());
    }
    let frame_dir = config.output_dir.join("frames");
    let scenario = Scenario::build(id, &SimContext::new(seed), &args.fail_frames);
    let mut runner = AnimationRunner::new(config)
        .with_context(Arc::new(TokioContext::seeded(seed)))
        .with_map(scenario.map.clone())
        .with_projector(scenario.projector.clone())
        .with_cancel_token(cancel)
        .with_scenario(id.name(), seed);
    if args.export_frames {
        runner = runner.with_frame_export(frame_dir);
    }

    match runner.run(scenario.scene.clone(), scenario.predictor.clone()).await {
        Ok(outcome) => {
            if !args.json {
                info!("✓ {}", outcome.summary.headline());
                for failure in &outcome.summary.failures {
                    warn!("  - frame {} at {:.2}s: {}", failure.frame_index, failure.time, failure.reason);
                }
                info!(
                    "  {} ({} frames, {} bytes), summary at {}",
                    outcome.artifact.path.display(),
                    outcome.artifact.frame_count,
                    outcome.artifact.size_bytes,
                    outcome.summary_path.display()
                );
            }
            batch.add_success(id.name(), &outcome.summary);
        }
        Err(e) => {
            if !args.json {
                error!("✗ {} (seed={}) FAILED: {}", id.name(), seed, e);
            }
            let summary = match &e {
                RunError::Encoding { summary, .. } => Some(summary.as_ref()),
                _ => None,
            };
            batch.add_failure(id.name(), summary, e.to_string());
        }
    }
}

fn main() {
    let args = Args::parse();

    // Keep stdout clean for --json
    let level = match (args.verbose, args.json) {
        (true, _) => Level::DEBUG,
        (false, true) => Level::WARN,
        (false, false) => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error: failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    if args.list {
        for id in ScenarioId::all() {
            println!("{:<12} {}", id.name(), id.description());
        }
        return;
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        })]
    };

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let config = args.config();
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if !args.json {
        info!("TrajView v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let batch = runtime.block_on(async {
        let cancel = CancelToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing the frames already rendered");
                on_interrupt.cancel();
            }
        });

        let mut batch = BatchReport::new(seed);
        for id in &scenarios {
            run_scenario(*id, seed, config.clone(), &args, cancel.clone(), &mut batch).await;
            if cancel.is_cancelled() {
                break;
            }
        }
        batch
    });

    if args.scenario == "all" {
        let path = config.output_dir.join("batch_summary.json");
        match batch.write_to_file(&path) {
            Ok(()) => info!("Batch summary at {}", path.display()),
            Err(e) => error!("Failed to write {}: {}", path.display(), e),
        }
    }

    if args.json {
        match serde_json::to_string_pretty(&batch) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if batch.failed_scenes == 0 {
            info!("✅ {} animation(s) written (seed={})", batch.total_scenes, seed);
        } else {
            error!("❌ {}/{} runs failed", batch.failed_scenes, batch.total_scenes);
        }
        if let (Some(ade), Some(fde)) = (batch.aggregate.mean_ade, batch.aggregate.mean_fde) {
            info!("   mean ADE {:.3} m, mean FDE {:.3} m", ade, fde);
        }
    }

    if batch.failed_scenes > 0 {
        std::process::exit(1);
    }
}
