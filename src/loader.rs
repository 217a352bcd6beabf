//! Render/ground-truth pair loading.
//!
//! A method directory holds a `renders/` and a `gt/` directory whose files
//! correspond by filename. [`read_images`] decodes both sides into parallel
//! sequences that share one index.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::tensor::ImageTensor;

/// Name of the render subdirectory inside a method directory.
pub const RENDERS_DIR: &str = "renders";

/// Name of the ground-truth subdirectory inside a method directory.
pub const GROUND_TRUTH_DIR: &str = "gt";

/// Decoded renders, ground truths and filenames, indexed identically.
#[derive(Debug, Clone, Default)]
pub struct ImageSet {
    /// Render tensors.
    pub renders: Vec<ImageTensor>,
    /// Ground-truth tensors.
    pub ground_truths: Vec<ImageTensor>,
    /// Filenames shared by both directories.
    pub names: Vec<String>,
}

impl ImageSet {
    /// Number of image pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when the set holds no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate `(name, render, ground_truth)` in index order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &ImageTensor, &ImageTensor)> {
        self.names
            .iter()
            .zip(&self.renders)
            .zip(&self.ground_truths)
            .map(|((name, render), gt)| (name.as_str(), render, gt))
    }
}

/// Load every render/ground-truth pair of a method directory.
pub fn read_method_images(method_dir: &Path) -> Result<ImageSet> {
    read_images(
        &method_dir.join(RENDERS_DIR),
        &method_dir.join(GROUND_TRUTH_DIR),
    )
}

/// Load matched images from a render directory and a ground-truth directory.
///
/// Pairs are enumerated in lexical filename order of the render directory.
/// Every render needs a ground truth of the same name and every ground truth
/// needs a render; otherwise the load fails with [`Error::MissingPair`].
/// Images are not resized, so a resolution mismatch is an error.
pub fn read_images(renders_dir: &Path, gt_dir: &Path) -> Result<ImageSet> {
    let render_names = list_image_files(renders_dir)?;
    let gt_names = list_image_files(gt_dir)?;

    for name in &render_names {
        if !gt_names.contains(name) {
            return Err(Error::MissingPair {
                name: name.clone(),
                expected: gt_dir.join(name),
            });
        }
    }
    if let Some(orphan) = gt_names.difference(&render_names).next() {
        return Err(Error::MissingPair {
            name: orphan.clone(),
            expected: renders_dir.join(orphan),
        });
    }

    let mut set = ImageSet::default();
    for name in render_names {
        let render = load_tensor(&renders_dir.join(&name))?;
        let gt = load_tensor(&gt_dir.join(&name))?;
        gt.ensure_same_size(&render)?;

        log::debug!("loaded {name} ({}x{})", render.width(), render.height());
        set.renders.push(render);
        set.ground_truths.push(gt);
        set.names.push(name);
    }

    Ok(set)
}

/// Decode one image file into a tensor.
pub fn load_tensor(path: &Path) -> Result<ImageTensor> {
    let image = image::open(path).map_err(|e| Error::load(path, e))?;
    Ok(ImageTensor::from_image(&image))
}

/// Regular, non-hidden files of `dir`, sorted by name.
fn list_image_files(dir: &Path) -> Result<BTreeSet<String>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::load(dir, format!("failed to read directory: {e}")))?;

    let mut names = BTreeSet::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| Error::load(dir, format!("failed to read entry: {e}")))?;
        let path: PathBuf = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            return Err(Error::load(&path, "filename is not valid UTF-8"));
        };
        if name.starts_with('.') {
            continue;
        }
        names.insert(name.to_string());
    }

    Ok(names)
}
