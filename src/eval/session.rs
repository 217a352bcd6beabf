//! Evaluation session driving scenes, methods and persistence.
//!
//! This module provides [`EvalSession`], the main entry point for scene
//! evaluation. For each scene the session discovers the methods under
//! `<scene>/<set>`, loads their image pairs, scores them with the
//! [`MetricBattery`], prints the means and writes the two JSON artifacts.
//!
//! A scene that fails for any reason yields a failed [`SceneOutcome`] and no
//! artifacts; the remaining scenes are still evaluated.

use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result};
use crate::eval::aggregate::evaluate_method;
use crate::eval::persist::write_scene_report;
use crate::eval::report::{
    ArtifactPaths, MethodReport, RunReport, SceneFailure, SceneOutcome, SceneReport,
};
use crate::loader::read_method_images;
use crate::metrics::{BatteryConfig, MetricBattery};

/// Configuration for an evaluation session.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Scene roots, evaluated in order.
    pub scenes: Vec<PathBuf>,

    /// Evaluation set name, e.g. `test`.
    pub set: String,

    /// Metric battery setup.
    pub battery: BatteryConfig,

    /// Draw per-image progress bars.
    pub progress: bool,
}

impl EvalConfig {
    /// Create a new configuration builder for the given evaluation set.
    #[must_use]
    pub fn builder(set: impl Into<String>) -> EvalConfigBuilder {
        EvalConfigBuilder {
            set: set.into(),
            scenes: Vec::new(),
            battery: None,
            progress: true,
        }
    }
}

/// Builder for [`EvalConfig`].
#[derive(Debug)]
pub struct EvalConfigBuilder {
    set: String,
    scenes: Vec<PathBuf>,
    battery: Option<BatteryConfig>,
    progress: bool,
}

impl EvalConfigBuilder {
    /// Add one scene root.
    #[must_use]
    pub fn scene(mut self, path: impl Into<PathBuf>) -> Self {
        self.scenes.push(path.into());
        self
    }

    /// Add several scene roots.
    #[must_use]
    pub fn scenes<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.scenes.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Set the metric battery configuration.
    #[must_use]
    pub fn battery(mut self, battery: BatteryConfig) -> Self {
        self.battery = Some(battery);
        self
    }

    /// Enable or disable progress bars.
    #[must_use]
    pub fn progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> EvalConfig {
        EvalConfig {
            scenes: self.scenes,
            set: self.set,
            battery: self.battery.unwrap_or_default(),
            progress: self.progress,
        }
    }
}

/// Evaluation session over a list of scenes.
///
/// # Example
///
/// ```rust,no_run
/// use render_eval::{EvalConfig, EvalSession};
///
/// let config = EvalConfig::builder("test")
///     .scene("data/garden")
///     .scene("data/bicycle")
///     .build();
///
/// let session = EvalSession::new(config)?;
/// let report = session.run();
/// println!("{} of {} scenes evaluated", report.succeeded(), report.scenes.len());
/// # Ok::<(), render_eval::Error>(())
/// ```
#[derive(Debug)]
pub struct EvalSession {
    config: EvalConfig,
    battery: MetricBattery,
}

impl EvalSession {
    /// Create a session with the standard battery built from `config.battery`.
    pub fn new(config: EvalConfig) -> Result<Self> {
        let battery = MetricBattery::new(&config.battery)?;
        Ok(Self::with_battery(config, battery))
    }

    /// Create a session around an already built battery.
    #[must_use]
    pub fn with_battery(config: EvalConfig, battery: MetricBattery) -> Self {
        Self { config, battery }
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Evaluate every configured scene in order.
    pub fn run(&self) -> RunReport {
        let started = chrono::Utc::now();
        let scenes = self
            .config
            .scenes
            .iter()
            .map(|scene| self.evaluate_scene(scene))
            .collect();

        let report = RunReport {
            set: self.config.set.clone(),
            scenes,
            started,
            finished: chrono::Utc::now(),
        };
        log::info!(
            "{} scene(s) evaluated, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }

    /// Evaluate one scene and write its artifacts.
    ///
    /// Never fails: errors are captured in the returned outcome.
    pub fn evaluate_scene(&self, scene: &Path) -> SceneOutcome {
        let scene = std::path::absolute(scene).unwrap_or_else(|_| scene.to_path_buf());
        println!("Scene: {}", scene.display());

        match self.try_evaluate_scene(&scene) {
            Ok((report, paths)) => {
                log::info!(
                    "{}: {} method(s) written to {}",
                    scene.display(),
                    report.methods.len(),
                    paths.results.display()
                );
                SceneOutcome {
                    methods: report.methods.into_iter().map(|m| m.name).collect(),
                    scene,
                    result: Ok(paths),
                }
            }
            Err(e) => {
                log::warn!("Unable to compute metrics for scene {}: {e}", scene.display());
                SceneOutcome {
                    scene,
                    methods: Vec::new(),
                    result: Err(SceneFailure {
                        kind: e.kind(),
                        message: e.to_string(),
                    }),
                }
            }
        }
    }

    fn try_evaluate_scene(&self, scene: &Path) -> Result<(SceneReport, ArtifactPaths)> {
        let set_dir = scene.join(&self.config.set);
        let methods = discover_methods(&set_dir)?;
        log::debug!("{}: methods {:?}", set_dir.display(), methods);

        let mut reports = Vec::with_capacity(methods.len());
        for method in &methods {
            println!("Method: {method}");
            let report = self.evaluate_method_dir(method, &set_dir.join(method))?;
            print_summary(&report);
            reports.push(report);
        }

        let report = SceneReport {
            scene: scene.to_path_buf(),
            set: self.config.set.clone(),
            methods: reports,
        };
        let paths = write_scene_report(&report)?;
        Ok((report, paths))
    }

    fn evaluate_method_dir(&self, name: &str, dir: &Path) -> Result<MethodReport> {
        let images = read_method_images(dir)?;
        let progress = self.progress_bar(images.len());
        let report = evaluate_method(&self.battery, name, &images, &progress);
        progress.finish_and_clear();
        report
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} Metric evaluation [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb
    }
}

/// Method names under an evaluation set directory, in lexical order.
///
/// Only directories count; files and hidden entries are skipped.
pub fn discover_methods(set_dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(set_dir)
        .map_err(|e| Error::load(set_dir, format!("failed to read evaluation set: {e}")))?;

    let mut methods = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| Error::load(set_dir, format!("failed to read entry: {e}")))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            return Err(Error::load(&path, "method name is not valid UTF-8"));
        };
        if name.starts_with('.') {
            continue;
        }
        methods.push(name.to_string());
    }

    methods.sort();
    Ok(methods)
}

fn print_summary(report: &MethodReport) {
    for (metric, mean) in report.summary.iter() {
        println!("  {metric:<11} : {mean:>12.7}");
    }
    println!();
}
