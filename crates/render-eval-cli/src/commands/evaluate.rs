//! Evaluate command.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use render_eval::metrics::lpips::DEFAULT_WEIGHTS_PATH;
use render_eval::{
    BatteryConfig, ComputeConfig, EvalConfig, EvalSession, Gaze, HvsConfig, RunReport,
    ViewingCondition,
};

#[derive(Args)]
pub struct EvaluateArgs {
    /// Scene root directories to evaluate
    #[arg(short = 'm', long = "model_paths", num_args = 1.., required = true)]
    pub model_paths: Vec<PathBuf>,

    /// Evaluation set (subdirectory of each scene), e.g. "test"
    #[arg(short = 's', long = "set")]
    pub set: String,

    /// LPIPS VGG16 weights (safetensors)
    ///
    /// torchvision `vgg16` `features.*` tensors plus the LPIPS v0.1 linear
    /// heads, as `lin.{i}.1.weight`, `lin{i}.model.1.weight` or
    /// `lin.{i}.weight`. Convert the PyTorch checkpoints with
    /// `safetensors.torch.save_file`.
    #[arg(long, env = "RENDER_EVAL_LPIPS_WEIGHTS", default_value = DEFAULT_WEIGHTS_PATH)]
    pub lpips_weights: PathBuf,

    /// Worker threads for metric computation (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Display acuity in pixels per degree, used by the HVS metrics
    #[arg(long, default_value_t = 40.0, value_parser = parse_ppd)]
    pub ppd: f64,

    /// Gaze point for HVS-FOV, normalized "x,y"
    #[arg(long, default_value = "0.5,0.5")]
    pub gaze: Gaze,

    /// Number of band-pass levels in the HVS metrics
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub hvs_levels: u32,

    /// Write a JSON run report here
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Exit with an error if any scene fails
    #[arg(long)]
    pub strict: bool,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,
}

pub fn run(args: EvaluateArgs) -> Result<()> {
    let battery = BatteryConfig {
        compute: ComputeConfig {
            threads: args.threads,
        },
        lpips_weights: args.lpips_weights,
        hvs: HvsConfig {
            viewing: ViewingCondition::new(args.ppd).with_gaze(args.gaze),
            levels: args.hvs_levels as usize,
        },
    };
    log::debug!("battery configuration: {battery:?}");

    let config = EvalConfig::builder(args.set)
        .scenes(args.model_paths)
        .battery(battery)
        .progress(!args.no_progress)
        .build();

    let session = EvalSession::new(config).context("Failed to set up metrics")?;
    let report = session.run();

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;
        log::info!("Run report written to: {}", path.display());
    }

    if report.failed() > 0 {
        print_failures(&report);
        if args.strict {
            bail!(
                "{} of {} scene(s) failed",
                report.failed(),
                report.scenes.len()
            );
        }
    }

    Ok(())
}

fn print_failures(report: &RunReport) {
    eprintln!("Failed scenes:");
    for (scene, failure) in report.failures() {
        eprintln!("  {} ({}): {}", scene.display(), failure.kind, failure.message);
    }
}

fn parse_ppd(s: &str) -> std::result::Result<f64, String> {
    let ppd: f64 = s
        .parse()
        .map_err(|e| format!("invalid pixels per degree '{s}': {e}"))?;
    if !ppd.is_finite() || ppd <= 0.0 {
        return Err(format!("pixels per degree must be positive, got {ppd}"));
    }
    Ok(ppd)
}
