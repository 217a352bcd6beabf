//! Quality metrics for render/ground-truth comparison.
//!
//! The [`MetricBattery`] runs a fixed, ordered list of scoring functions
//! against each image pair:
//!
//! | Order | Metric | Direction | |
//! |-------|--------|-----------|---|
//! | 1 | PSNR | higher is better | `+inf` for identical images |
//! | 2 | SSIM | higher is better | 1.0 for identical images |
//! | 3 | LPIPS | lower is better | VGG16 backbone |
//! | 4 | HVS-Uniform | lower is better | constant visual sensitivity |
//! | 5 | HVS-FOV | lower is better | foveated visual sensitivity |
//!
//! Every metric implements [`Metric`]; the battery only fixes their call
//! contract and ordering, so any of them can be swapped for another model.

pub mod filter;
pub mod hvs;
pub mod lpips;
pub mod ssim;

use std::path::PathBuf;

use ndarray::Zip;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tensor::ImageTensor;

pub use hvs::{HvsConfig, HvsLoss};
pub use lpips::{Lpips, LpipsNetwork};
pub use ssim::Ssim;

/// A scoring function over a (render, ground truth) pair.
///
/// Implementations must not depend on anything but their inputs and fixed
/// internal model state: scoring the same pair twice gives the same value.
pub trait Metric: Send + Sync {
    /// Key under which scores are reported.
    fn name(&self) -> &str;

    /// Score `render` against `ground_truth`.
    fn score(&self, render: &ImageTensor, ground_truth: &ImageTensor) -> Result<f64>;
}

/// The standard metrics, in battery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Peak signal-to-noise ratio.
    Psnr,
    /// Structural similarity.
    Ssim,
    /// Learned perceptual image patch similarity.
    Lpips,
    /// HVS loss with spatially constant sensitivity.
    HvsUniform,
    /// HVS loss with foveated sensitivity.
    HvsFoveated,
}

impl MetricKind {
    /// All standard metrics in battery order.
    pub const ALL: [Self; 5] = [
        Self::Psnr,
        Self::Ssim,
        Self::Lpips,
        Self::HvsUniform,
        Self::HvsFoveated,
    ];

    /// Report key for this metric.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Psnr => "PSNR",
            Self::Ssim => "SSIM",
            Self::Lpips => "LPIPS",
            Self::HvsUniform => "HVS-Uniform",
            Self::HvsFoveated => "HVS-FOV",
        }
    }

    /// Whether larger values mean a closer match.
    #[must_use]
    pub fn higher_is_better(self) -> bool {
        matches!(self, Self::Psnr | Self::Ssim)
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Scores of one image pair, keyed by metric name in battery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreRecord {
    scores: Vec<(String, f64)>,
}

impl ScoreRecord {
    /// Append a score.
    pub fn push(&mut self, metric: impl Into<String>, value: f64) {
        self.scores.push((metric.into(), value));
    }

    /// Score for `metric`, if present.
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|(name, _)| name == metric)
            .map(|&(_, value)| value)
    }

    /// `(metric, value)` pairs in battery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Number of scores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// True when no metric has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Compute resources made available to the metrics.
///
/// Metrics use data parallelism internally; this is the only knob, and it is
/// passed to the battery explicitly rather than set process-wide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Worker threads for metric computation. `None` uses rayon's default
    /// (one per logical CPU); `Some(1)` computes sequentially.
    pub threads: Option<usize>,
}

impl ComputeConfig {
    /// Single-threaded configuration, used by tests.
    #[must_use]
    pub fn sequential() -> Self {
        Self { threads: Some(1) }
    }

    fn build_pool(&self) -> Result<ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.threads.unwrap_or(0))
            .thread_name(|i| format!("render-eval-metric-{i}"))
            .build()
            .map_err(|e| Error::metric("thread pool", e))
    }
}

/// Configuration of the standard metric battery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    /// Compute resources.
    pub compute: ComputeConfig,
    /// LPIPS weights file (safetensors).
    pub lpips_weights: PathBuf,
    /// HVS model parameters, shared by the uniform and foveated variants.
    pub hvs: HvsConfig,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            compute: ComputeConfig::default(),
            lpips_weights: PathBuf::from(lpips::DEFAULT_WEIGHTS_PATH),
            hvs: HvsConfig::default(),
        }
    }
}

/// Fixed, ordered set of metrics plus the thread pool they run on.
pub struct MetricBattery {
    metrics: Vec<Box<dyn Metric>>,
    pool: ThreadPool,
}

impl MetricBattery {
    /// The standard battery: PSNR, SSIM, LPIPS, HVS-Uniform, HVS-FOV.
    ///
    /// LPIPS weights are loaded on first use, so a missing weights file fails
    /// the first scene that needs it rather than construction.
    pub fn new(config: &BatteryConfig) -> Result<Self> {
        let metrics: Vec<Box<dyn Metric>> = vec![
            Box::new(Psnr),
            Box::new(Ssim::new()),
            Box::new(Lpips::new(&config.lpips_weights)),
            Box::new(HvsLoss::uniform(config.hvs.clone())),
            Box::new(HvsLoss::foveated(config.hvs.clone())),
        ];
        Self::with_metrics(metrics, &config.compute)
    }

    /// A battery with a custom metric list, scored in the given order.
    pub fn with_metrics(metrics: Vec<Box<dyn Metric>>, compute: &ComputeConfig) -> Result<Self> {
        Ok(Self {
            metrics,
            pool: compute.build_pool()?,
        })
    }

    /// Metric names in battery order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|m| m.name())
    }

    /// Number of metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// True for a battery without metrics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Run every metric on one pair.
    ///
    /// Any failing metric aborts the pair with [`Error::MetricComputation`].
    pub fn score(&self, render: &ImageTensor, ground_truth: &ImageTensor) -> Result<ScoreRecord> {
        let mut record = ScoreRecord::default();
        for metric in &self.metrics {
            let value = self
                .pool
                .install(|| metric.score(render, ground_truth))
                .map_err(|e| match e {
                    Error::MetricComputation { .. } => e,
                    other => Error::metric(metric.name(), other),
                })?;
            record.push(metric.name(), value);
        }
        Ok(record)
    }
}

impl std::fmt::Debug for MetricBattery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricBattery")
            .field("metrics", &self.names().collect::<Vec<_>>())
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

/// PSNR on `[0, 1]` tensors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Psnr;

impl Metric for Psnr {
    fn name(&self) -> &str {
        MetricKind::Psnr.name()
    }

    fn score(&self, render: &ImageTensor, ground_truth: &ImageTensor) -> Result<f64> {
        calculate_psnr(render, ground_truth)
    }
}

/// Calculate PSNR between two tensors with values in `[0, 1]`.
///
/// The mean squared error runs over every channel and pixel. Returns
/// `f64::INFINITY` if the images are identical.
pub fn calculate_psnr(render: &ImageTensor, ground_truth: &ImageTensor) -> Result<f64> {
    ground_truth.ensure_same_size(render)?;

    let sum = Zip::from(render.view())
        .and(ground_truth.view())
        .fold(0.0f64, |acc, &r, &g| {
            let diff = f64::from(r) - f64::from(g);
            acc + diff * diff
        });
    let mse = sum / render.view().len() as f64;

    if mse == 0.0 {
        Ok(f64::INFINITY)
    } else {
        Ok(20.0 * (1.0 / mse.sqrt()).log10())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(&'static str, f64);

    impl Metric for Constant {
        fn name(&self) -> &str {
            self.0
        }

        fn score(&self, _: &ImageTensor, _: &ImageTensor) -> Result<f64> {
            Ok(self.1)
        }
    }

    struct Failing;

    impl Metric for Failing {
        fn name(&self) -> &str {
            "broken"
        }

        fn score(&self, _: &ImageTensor, _: &ImageTensor) -> Result<f64> {
            Err(Error::InvalidTensor("backbone unavailable".to_string()))
        }
    }

    #[test]
    fn test_psnr_identical() {
        let img = ImageTensor::filled(10, 10, 0.5);
        let psnr = calculate_psnr(&img, &img).unwrap();
        assert!(psnr.is_infinite() && psnr > 0.0);
    }

    #[test]
    fn test_psnr_different() {
        let render = ImageTensor::filled(10, 10, 0.5);
        let gt = ImageTensor::filled(10, 10, 0.6);
        let psnr = calculate_psnr(&render, &gt).unwrap();
        // MSE = 0.01 -> 20 * log10(1 / 0.1) = 20 dB
        assert!((psnr - 20.0).abs() < 1e-4, "got {psnr}");
    }

    #[test]
    fn test_psnr_dimension_mismatch() {
        let a = ImageTensor::filled(10, 10, 0.5);
        let b = ImageTensor::filled(10, 11, 0.5);
        assert!(matches!(
            calculate_psnr(&a, &b),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_metric_kind_order_and_names() {
        let names: Vec<_> = MetricKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["PSNR", "SSIM", "LPIPS", "HVS-Uniform", "HVS-FOV"]);
        assert!(MetricKind::Psnr.higher_is_better());
        assert!(!MetricKind::Lpips.higher_is_better());
    }

    #[test]
    fn test_standard_battery_order() {
        let battery = MetricBattery::new(&BatteryConfig {
            compute: ComputeConfig::sequential(),
            ..BatteryConfig::default()
        })
        .unwrap();
        let names: Vec<_> = battery.names().collect();
        assert_eq!(names, vec!["PSNR", "SSIM", "LPIPS", "HVS-Uniform", "HVS-FOV"]);
    }

    #[test]
    fn test_battery_records_in_order() {
        let metrics: Vec<Box<dyn Metric>> =
            vec![Box::new(Constant("b", 2.0)), Box::new(Constant("a", 1.0))];
        let battery = MetricBattery::with_metrics(metrics, &ComputeConfig::sequential()).unwrap();
        let img = ImageTensor::filled(4, 4, 0.0);
        let record = battery.score(&img, &img).unwrap();

        let entries: Vec<_> = record.iter().collect();
        assert_eq!(entries, vec![("b", 2.0), ("a", 1.0)]);
        assert_eq!(record.get("a"), Some(1.0));
        assert_eq!(record.get("c"), None);
    }

    #[test]
    fn test_battery_wraps_failures() {
        let metrics: Vec<Box<dyn Metric>> = vec![Box::new(Psnr), Box::new(Failing)];
        let battery = MetricBattery::with_metrics(metrics, &ComputeConfig::sequential()).unwrap();
        let img = ImageTensor::filled(4, 4, 0.0);
        match battery.score(&img, &img) {
            Err(Error::MetricComputation { metric, reason }) => {
                assert_eq!(metric, "broken");
                assert!(reason.contains("backbone unavailable"));
            }
            other => panic!("expected MetricComputation, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_lpips_weights_fail_at_score_time() {
        let battery = MetricBattery::new(&BatteryConfig {
            compute: ComputeConfig::sequential(),
            lpips_weights: PathBuf::from("/nonexistent/lpips.safetensors"),
            hvs: HvsConfig::default(),
        })
        .unwrap();
        let img = ImageTensor::filled(32, 32, 0.5);
        match battery.score(&img, &img) {
            Err(Error::MetricComputation { metric, .. }) => assert_eq!(metric, "LPIPS"),
            other => panic!("expected LPIPS failure, got {other:?}"),
        }
    }
}
