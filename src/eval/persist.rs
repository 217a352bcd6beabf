//! Writing the per-scene JSON artifacts.
//!
//! Each scene gets `<set>_results.json` (method means) and
//! `<set>_per_view.json` (per-image scores) in its root. Both documents are
//! serialized and staged in temp files before either is renamed into place.
//! If the second rename fails, both artifacts are removed, so a scene never
//! keeps a truncated file or a pair from two different runs.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::eval::report::{ArtifactPaths, SceneReport};

/// Suffix of the summary artifact, after the set name.
pub const RESULTS_SUFFIX: &str = "_results.json";
/// Suffix of the per-image artifact, after the set name.
pub const PER_VIEW_SUFFIX: &str = "_per_view.json";

/// Where a scene's artifacts live.
#[must_use]
pub fn artifact_paths(scene: &Path, set: &str) -> ArtifactPaths {
    ArtifactPaths {
        results: scene.join(format!("{set}{RESULTS_SUFFIX}")),
        per_view: scene.join(format!("{set}{PER_VIEW_SUFFIX}")),
    }
}

/// Serialize and write both artifacts of a scene.
pub fn write_scene_report(report: &SceneReport) -> Result<ArtifactPaths> {
    let paths = artifact_paths(&report.scene, &report.set);

    let results = serde_json::to_string_pretty(&report.results_document())
        .map_err(|e| Error::persistence(&paths.results, e))?;
    let per_view = serde_json::to_string_pretty(&report.per_view_document())
        .map_err(|e| Error::persistence(&paths.per_view, e))?;

    let results = stage(&paths.results, &results)?;
    let per_view = stage(&paths.per_view, &per_view)?;

    results
        .persist(&paths.results)
        .map_err(|e| Error::persistence(&paths.results, e.error))?;
    if let Err(e) = per_view.persist(&paths.per_view) {
        remove_artifacts(&paths);
        return Err(Error::persistence(&paths.per_view, e.error));
    }

    log::debug!(
        "wrote {} and {}",
        paths.results.display(),
        paths.per_view.display()
    );
    Ok(paths)
}

/// Write `contents` to a temp file next to `path`, ready to be renamed.
fn stage(path: &Path, contents: &str) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::persistence(path, "artifact path has no parent directory"))?;

    let mut file = tempfile::Builder::new()
        .prefix(".render-eval-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::persistence(path, e))?;
    write_contents(&mut file, contents).map_err(|e| Error::persistence(path, e))?;
    Ok(file)
}

/// Best-effort removal of both artifacts after an incomplete write.
fn remove_artifacts(paths: &ArtifactPaths) {
    for path in [&paths.results, &paths.per_view] {
        if !path.is_file() {
            continue;
        }
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!(
                "failed to remove {} after incomplete write: {e}",
                path.display()
            );
        }
    }
}

fn write_contents(file: &mut NamedTempFile, contents: &str) -> std::io::Result<()> {
    file.write_all(contents.as_bytes())?;
    file.as_file().sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::report::{MethodReport, MetricColumn, PerImageTable, ScoreSummary};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn report(scene: PathBuf) -> SceneReport {
        let mut summary = ScoreSummary::default();
        summary.push("PSNR", f64::INFINITY);
        summary.push("SSIM", 1.0);
        SceneReport {
            scene,
            set: "test".to_string(),
            methods: vec![MethodReport {
                name: "ours".to_string(),
                summary,
                per_image: PerImageTable::new(
                    vec!["a.png".to_string()],
                    vec![
                        MetricColumn {
                            metric: "PSNR".to_string(),
                            values: vec![f64::INFINITY],
                        },
                        MetricColumn {
                            metric: "SSIM".to_string(),
                            values: vec![1.0],
                        },
                    ],
                ),
            }],
        }
    }

    fn dir_listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_artifact_paths() {
        let paths = artifact_paths(Path::new("/data/scene"), "test");
        assert_eq!(paths.results, PathBuf::from("/data/scene/test_results.json"));
        assert_eq!(paths.per_view, PathBuf::from("/data/scene/test_per_view.json"));
    }

    #[test]
    fn test_writes_both_documents() {
        let dir = TempDir::new().unwrap();
        let paths = write_scene_report(&report(dir.path().to_path_buf())).unwrap();

        let results: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.results).unwrap()).unwrap();
        assert_eq!(results["ours"]["PSNR"], "Infinity");
        assert_eq!(results["ours"]["SSIM"], 1.0);

        let per_view: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.per_view).unwrap()).unwrap();
        assert_eq!(per_view["ours"]["SSIM"]["a.png"], 1.0);

        // No temp files left behind.
        assert_eq!(
            dir_listing(dir.path()),
            vec!["test_per_view.json", "test_results.json"]
        );
    }

    #[test]
    fn test_rewrite_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let scene = report(dir.path().to_path_buf());
        let paths = write_scene_report(&scene).unwrap();
        let first = fs::read(&paths.results).unwrap();
        write_scene_report(&scene).unwrap();
        assert_eq!(fs::read(&paths.results).unwrap(), first);
    }

    #[test]
    fn test_missing_scene_dir_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let err = write_scene_report(&report(dir.path().join("gone"))).unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
    }

    #[test]
    fn test_failed_second_write_removes_first() {
        let dir = TempDir::new().unwrap();
        // A directory where the per-view file should go makes the rename fail.
        fs::create_dir(dir.path().join("test_per_view.json")).unwrap();

        let err = write_scene_report(&report(dir.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        assert!(!dir.path().join("test_results.json").exists());
        assert_eq!(dir_listing(dir.path()), vec!["test_per_view.json"]);
    }

    #[test]
    fn test_rollback_removes_artifacts_of_earlier_run() {
        let dir = TempDir::new().unwrap();
        let paths = write_scene_report(&report(dir.path().to_path_buf())).unwrap();

        remove_artifacts(&paths);
        assert!(dir_listing(dir.path()).is_empty());

        // Nothing to remove is not an error.
        remove_artifacts(&paths);
    }
}
