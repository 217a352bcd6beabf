//! # render-eval
//!
//! Render quality evaluation for novel-view-synthesis experiments.
//!
//! For every scene and every method under `<scene>/<set>`, this library loads
//! the rendered images and their ground truths, scores each pair with a fixed
//! battery of metrics (PSNR, SSIM, LPIPS, HVS-Uniform, HVS-FOV), averages the
//! scores per method and writes two JSON artifacts into the scene root.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_eval::{BatteryConfig, ComputeConfig, EvalConfig, EvalSession, ViewingCondition};
//!
//! let mut battery = BatteryConfig::default();
//! battery.compute = ComputeConfig { threads: Some(8) };
//! battery.hvs.viewing = ViewingCondition::laptop();
//!
//! let config = EvalConfig::builder("test")
//!     .scene("data/garden")
//!     .battery(battery)
//!     .build();
//!
//! let report = EvalSession::new(config)?.run();
//! for (scene, failure) in report.failures() {
//!     eprintln!("{}: {}", scene.display(), failure.message);
//! }
//! # Ok::<(), render_eval::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`tensor`]: The `[1, 3, H, W]` image tensor
//! - [`loader`]: Render/ground-truth pair loading
//! - [`viewing`]: Viewing condition modeling for the HVS metrics
//! - [`metrics`]: Quality metrics and the metric battery
//! - [`eval`]: Evaluation session, aggregation and persistence

pub mod error;
pub mod eval;
pub mod loader;
pub mod metrics;
pub mod tensor;
pub mod viewing;

// Re-export commonly used types
pub use error::{Error, ErrorKind, Result};
pub use eval::{
    report::{MethodReport, RunReport, SceneFailure, SceneOutcome, SceneReport},
    session::{EvalConfig, EvalSession},
};
pub use loader::{ImageSet, read_images, read_method_images};
pub use metrics::{
    BatteryConfig, ComputeConfig, HvsConfig, Metric, MetricBattery, MetricKind, ScoreRecord,
};
pub use tensor::ImageTensor;
pub use viewing::{Gaze, ViewingCondition};
