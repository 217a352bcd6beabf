//! Report types for evaluation results.
//!
//! Score tables keep their entries in insertion order (metrics in battery
//! order, methods in lexical order, filenames in loader order) and serialize
//! as JSON objects in that order. Non-finite scores are written as the strings
//! `"Infinity"`, `"-Infinity"` and `"NaN"`, since JSON numbers cannot hold them.

use std::path::PathBuf;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ErrorKind;

/// A metric value that survives a JSON round trip even when non-finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score(pub f64);

impl Serialize for Score {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = self.0;
        if value.is_finite() {
            serializer.serialize_f64(value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value > 0.0 {
            serializer.serialize_str("Infinity")
        } else {
            serializer.serialize_str("-Infinity")
        }
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(Self(v)),
            Raw::Text(s) => match s.as_str() {
                "Infinity" => Ok(Self(f64::INFINITY)),
                "-Infinity" => Ok(Self(f64::NEG_INFINITY)),
                "NaN" => Ok(Self(f64::NAN)),
                other => Err(serde::de::Error::custom(format!(
                    "expected a number, \"Infinity\", \"-Infinity\" or \"NaN\", got \"{other}\""
                ))),
            },
        }
    }
}

/// Metric name → mean score for one method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreSummary {
    entries: Vec<(String, f64)>,
}

impl ScoreSummary {
    /// Append a metric mean.
    pub fn push(&mut self, metric: impl Into<String>, mean: f64) {
        self.entries.push((metric.into(), mean));
    }

    /// Mean for `metric`, if present.
    #[must_use]
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == metric)
            .map(|&(_, v)| v)
    }

    /// `(metric, mean)` pairs in battery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, v)| (name.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ScoreSummary {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (metric, mean) in &self.entries {
            map.serialize_entry(metric, &Score(*mean))?;
        }
        map.end()
    }
}

/// Scores of one metric over every image of a method.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricColumn {
    /// Metric name.
    pub metric: String,
    /// One score per image, in the method's filename order.
    pub values: Vec<f64>,
}

/// Metric name → (image filename → score) for one method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerImageTable {
    filenames: Vec<String>,
    columns: Vec<MetricColumn>,
}

impl PerImageTable {
    /// Build a table; each column holds one value per filename, in order.
    ///
    /// A short column simply has no score for the trailing filenames.
    #[must_use]
    pub fn new(filenames: Vec<String>, columns: Vec<MetricColumn>) -> Self {
        Self { filenames, columns }
    }

    /// Image filenames in loader order.
    #[must_use]
    pub fn filenames(&self) -> &[String] {
        &self.filenames
    }

    /// Metric columns in battery order.
    #[must_use]
    pub fn columns(&self) -> &[MetricColumn] {
        &self.columns
    }

    /// Score of `metric` on image `filename`, if the column has one.
    #[must_use]
    pub fn get(&self, metric: &str, filename: &str) -> Option<f64> {
        let index = self.filenames.iter().position(|f| f == filename)?;
        self.columns
            .iter()
            .find(|c| c.metric == metric)?
            .values
            .get(index)
            .copied()
    }
}

struct ColumnEntries<'a> {
    filenames: &'a [String],
    values: &'a [f64],
}

impl Serialize for ColumnEntries<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = self.filenames.len().min(self.values.len());
        let mut map = serializer.serialize_map(Some(len))?;
        for (filename, value) in self.filenames.iter().zip(self.values) {
            map.serialize_entry(filename, &Score(*value))?;
        }
        map.end()
    }
}

impl Serialize for PerImageTable {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in &self.columns {
            map.serialize_entry(
                &column.metric,
                &ColumnEntries {
                    filenames: &self.filenames,
                    values: &column.values,
                },
            )?;
        }
        map.end()
    }
}

/// Aggregated scores of one method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodReport {
    /// Method directory name.
    pub name: String,
    /// Mean per metric.
    pub summary: ScoreSummary,
    /// Individual scores per metric and image.
    pub per_image: PerImageTable,
}

/// Everything evaluated for one scene, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneReport {
    /// Absolute scene root.
    pub scene: PathBuf,
    /// Evaluation set name.
    pub set: String,
    /// Methods in lexical order.
    pub methods: Vec<MethodReport>,
}

impl SceneReport {
    /// Method → {Metric → mean}.
    #[must_use]
    pub fn results_document(&self) -> ResultsDocument<'_> {
        ResultsDocument(&self.methods)
    }

    /// Method → {Metric → {filename → score}}.
    #[must_use]
    pub fn per_view_document(&self) -> PerViewDocument<'_> {
        PerViewDocument(&self.methods)
    }

    /// Look up a method by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodReport> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Serializable view of the summary artifact.
pub struct ResultsDocument<'a>(&'a [MethodReport]);

impl Serialize for ResultsDocument<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for method in self.0 {
            map.serialize_entry(&method.name, &method.summary)?;
        }
        map.end()
    }
}

/// Serializable view of the per-image artifact.
pub struct PerViewDocument<'a>(&'a [MethodReport]);

impl Serialize for PerViewDocument<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for method in self.0 {
            map.serialize_entry(&method.name, &method.per_image)?;
        }
        map.end()
    }
}

/// Paths of the two artifacts written for a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// `<scene>/<set>_results.json`.
    pub results: PathBuf,
    /// `<scene>/<set>_per_view.json`.
    pub per_view: PathBuf,
}

/// Why a scene produced no artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneFailure {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable reason.
    pub message: String,
}

/// Result of evaluating one scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneOutcome {
    /// Absolute scene root.
    pub scene: PathBuf,
    /// Method names evaluated, lexical order (empty on failure).
    #[serde(default)]
    pub methods: Vec<String>,
    /// `Ok` with the written artifacts, or the failure.
    pub result: std::result::Result<ArtifactPaths, SceneFailure>,
}

impl SceneOutcome {
    /// Whether the scene's artifacts were written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&SceneFailure> {
        self.result.as_ref().err()
    }
}

/// Summary of a whole run over several scenes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Evaluation set name.
    pub set: String,

    /// One outcome per scene, in argument order.
    pub scenes: Vec<SceneOutcome>,

    /// When the run started.
    #[serde(with = "chrono_serde")]
    pub started: chrono::DateTime<chrono::Utc>,

    /// When the run finished.
    #[serde(with = "chrono_serde")]
    pub finished: chrono::DateTime<chrono::Utc>,
}

impl RunReport {
    /// Number of scenes whose artifacts were written.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.scenes.iter().filter(|s| s.is_success()).count()
    }

    /// Number of scenes that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.scenes.len() - self.succeeded()
    }

    /// Failed scenes.
    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &SceneFailure)> {
        self.scenes
            .iter()
            .filter_map(|s| s.failure().map(|f| (&s.scene, f)))
    }
}

mod chrono_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        dt.to_rfc3339().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str, psnr: &[f64]) -> MethodReport {
        let filenames: Vec<String> = (0..psnr.len()).map(|i| format!("{i:05}.png")).collect();
        let mut summary = ScoreSummary::default();
        summary.push("PSNR", psnr.iter().sum::<f64>() / psnr.len() as f64);
        MethodReport {
            name: name.to_string(),
            summary,
            per_image: PerImageTable::new(
                filenames,
                vec![MetricColumn {
                    metric: "PSNR".to_string(),
                    values: psnr.to_vec(),
                }],
            ),
        }
    }

    #[test]
    fn test_non_finite_scores_serialize_as_strings() {
        let json = serde_json::to_string(&[
            Score(1.5),
            Score(f64::INFINITY),
            Score(f64::NEG_INFINITY),
            Score(f64::NAN),
        ])
        .unwrap();
        assert_eq!(json, r#"[1.5,"Infinity","-Infinity","NaN"]"#);

        let back: Vec<Score> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[0], Score(1.5));
        assert_eq!(back[1].0, f64::INFINITY);
        assert_eq!(back[2].0, f64::NEG_INFINITY);
        assert!(back[3].0.is_nan());
        assert!(serde_json::from_str::<Score>(r#""inf""#).is_err());
    }

    #[test]
    fn test_documents_keep_insertion_order() {
        let report = SceneReport {
            scene: PathBuf::from("/scene"),
            set: "test".to_string(),
            methods: vec![method("zeta", &[30.0, 32.0]), method("alpha", &[20.0, 22.0])],
        };

        let results = serde_json::to_string(&report.results_document()).unwrap();
        assert_eq!(results, r#"{"zeta":{"PSNR":31.0},"alpha":{"PSNR":21.0}}"#);

        let per_view = serde_json::to_string(&report.per_view_document()).unwrap();
        assert_eq!(
            per_view,
            r#"{"zeta":{"PSNR":{"00000.png":30.0,"00001.png":32.0}},"alpha":{"PSNR":{"00000.png":20.0,"00001.png":22.0}}}"#
        );
    }

    #[test]
    fn test_per_image_lookup() {
        let m = method("m", &[10.0, 11.0, 12.0]);
        assert_eq!(m.per_image.get("PSNR", "00002.png"), Some(12.0));
        assert_eq!(m.per_image.get("PSNR", "missing.png"), None);
        assert_eq!(m.per_image.get("SSIM", "00000.png"), None);
        assert_eq!(m.summary.get("PSNR"), Some(11.0));
    }

    #[test]
    fn test_per_image_lookup_short_column() {
        let table = PerImageTable::new(
            vec!["a.png".to_string(), "b.png".to_string()],
            vec![MetricColumn {
                metric: "PSNR".to_string(),
                values: vec![30.0],
            }],
        );
        assert_eq!(table.get("PSNR", "a.png"), Some(30.0));
        assert_eq!(table.get("PSNR", "b.png"), None);
    }

    #[test]
    fn test_run_report_counts() {
        let now = chrono::Utc::now();
        let report = RunReport {
            set: "test".to_string(),
            scenes: vec![
                SceneOutcome {
                    scene: PathBuf::from("/a"),
                    methods: vec!["m".to_string()],
                    result: Ok(ArtifactPaths {
                        results: PathBuf::from("/a/test_results.json"),
                        per_view: PathBuf::from("/a/test_per_view.json"),
                    }),
                },
                SceneOutcome {
                    scene: PathBuf::from("/b"),
                    methods: Vec::new(),
                    result: Err(SceneFailure {
                        kind: ErrorKind::Load,
                        message: "truncated".to_string(),
                    }),
                },
            ],
            started: now,
            finished: now,
        };

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures[0].0, &PathBuf::from("/b"));

        let json = serde_json::to_string_pretty(&report).unwrap();
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scenes, report.scenes);
        assert_eq!(back.started.timestamp(), now.timestamp());
    }
}
