//! Scene evaluation, aggregation and report generation.
//!
//! - [`session::EvalSession`]: drives scenes and methods, isolates failures
//! - [`session::EvalConfig`]: configuration for evaluation
//! - [`aggregate`]: per-method scoring and means
//! - [`persist`]: the two JSON artifacts per scene
//! - [`report`]: report types for evaluation results

pub mod aggregate;
pub mod persist;
pub mod report;
pub mod session;

pub use aggregate::{evaluate_method, mean};
pub use persist::{artifact_paths, write_scene_report};
pub use report::{
    ArtifactPaths, MethodReport, PerImageTable, RunReport, SceneFailure, SceneOutcome,
    SceneReport, Score, ScoreSummary,
};
pub use session::{EvalConfig, EvalConfigBuilder, EvalSession, discover_methods};
