//! LPIPS: learned perceptual image patch similarity.
//!
//! Runs both images through the convolutional part of VGG16, unit-normalizes
//! the activations tapped at the end of each of the five stages, and sums the
//! spatially averaged, linearly weighted squared differences. Lower is better;
//! identical images score 0.
//!
//! Weights come from a safetensors file with the torchvision VGG16 names
//! (`features.{N}.weight`, `features.{N}.bias`) plus the LPIPS v0.1 linear
//! heads (shape `[1, C, 1, 1]`), all f32. The heads are looked up under the
//! names the public checkpoints use, in order:
//!
//! - `lin.{i}.1.weight` (lpipsPyTorch state dict)
//! - `lin{i}.model.1.weight` (official `lpips` package, `vgg.pth`)
//! - `lin.{i}.weight`
//!
//! A usable file is produced by merging torchvision's `vgg16` state dict
//! (`features.*` entries only) with one of those head checkpoints and saving
//! the result with `safetensors.torch.save_file`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ndarray::{Array1, Array2, Array3, Array4, ArrayView3, Axis, Zip, s};
use rayon::prelude::*;
use safetensors::{Dtype, SafeTensors};

use super::{Metric, MetricKind};
use crate::error::{Error, Result};
use crate::tensor::{CHANNELS, ImageTensor};

/// Weights location used when none is configured.
pub const DEFAULT_WEIGHTS_PATH: &str = "weights/lpips_vgg.safetensors";

/// Candidate names of the `i`-th linear head, most common first.
fn head_names(i: usize) -> [String; 3] {
    [
        format!("lin.{i}.1.weight"),
        format!("lin{i}.model.1.weight"),
        format!("lin.{i}.weight"),
    ]
}

/// Input shift applied before the backbone (per RGB channel).
const SHIFT: [f32; CHANNELS] = [-0.030, -0.088, -0.188];
/// Input scale applied before the backbone (per RGB channel).
const SCALE: [f32; CHANNELS] = [0.458, 0.448, 0.450];

const NORM_EPS: f32 = 1e-10;

/// Output pixels per im2col tile.
const TILE_PIXELS: usize = 16 * 1024;

/// `features.N` indices of the VGG16 convolutions, grouped by stage.
const VGG16_STAGES: [&[usize]; 5] = [
    &[0, 2],
    &[5, 7],
    &[10, 12, 14],
    &[17, 19, 21],
    &[24, 26, 28],
];

/// A 3x3, stride 1, padding 1 convolution followed by ReLU.
#[derive(Debug, Clone)]
pub struct ConvLayer {
    /// `[out_channels, in_channels * 9]`.
    weight: Array2<f32>,
    bias: Array1<f32>,
    in_channels: usize,
}

impl ConvLayer {
    /// Build from a `[out, in, 3, 3]` kernel and an `[out]` bias.
    pub fn new(weight: Array4<f32>, bias: Array1<f32>) -> Result<Self> {
        let (out_channels, in_channels, kh, kw) = weight.dim();
        if (kh, kw) != (3, 3) {
            return Err(Error::InvalidTensor(format!(
                "expected a 3x3 kernel, got {kh}x{kw}"
            )));
        }
        if bias.len() != out_channels {
            return Err(Error::InvalidTensor(format!(
                "bias has {} entries for {out_channels} output channels",
                bias.len()
            )));
        }
        let weight = Array2::from_shape_vec(
            (out_channels, in_channels * 9),
            weight.iter().copied().collect(),
        )
        .map_err(|e| Error::InvalidTensor(e.to_string()))?;

        Ok(Self {
            weight,
            bias,
            in_channels,
        })
    }

    /// Number of input channels.
    #[must_use]
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Number of output channels.
    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.weight.nrows()
    }

    fn forward(&self, input: ArrayView3<'_, f32>) -> Array3<f32> {
        let (_, height, width) = input.dim();
        let tile_rows = (TILE_PIXELS / width.max(1)).clamp(1, height.max(1));

        let starts: Vec<usize> = (0..height).step_by(tile_rows).collect();
        let tiles: Vec<(usize, Array3<f32>)> = starts
            .into_par_iter()
            .map(|y0| {
                let rows = tile_rows.min(height - y0);
                (y0, self.forward_tile(input, y0, rows))
            })
            .collect();

        let mut output = Array3::<f32>::zeros((self.out_channels(), height, width));
        for (y0, tile) in tiles {
            let rows = tile.dim().1;
            output.slice_mut(s![.., y0..y0 + rows, ..]).assign(&tile);
        }
        output
    }

    /// Convolve output rows `y0..y0 + rows` via im2col and one matrix product.
    fn forward_tile(&self, input: ArrayView3<'_, f32>, y0: usize, rows: usize) -> Array3<f32> {
        let (channels, height, width) = input.dim();
        let mut cols = Array2::<f32>::zeros((channels * 9, rows * width));

        for c in 0..channels {
            for ky in 0..3 {
                for kx in 0..3 {
                    let mut col = cols.row_mut(c * 9 + ky * 3 + kx);
                    for y in 0..rows {
                        let sy = (y0 + y + ky) as isize - 1;
                        if sy < 0 || sy >= height as isize {
                            continue;
                        }
                        for x in 0..width {
                            let sx = (x + kx) as isize - 1;
                            if sx < 0 || sx >= width as isize {
                                continue;
                            }
                            col[y * width + x] = input[[c, sy as usize, sx as usize]];
                        }
                    }
                }
            }
        }

        let product = self.weight.dot(&cols);
        let mut out = Array3::<f32>::zeros((self.out_channels(), rows, width));
        for ((o, y, x), value) in out.indexed_iter_mut() {
            *value = (product[[o, y * width + x]] + self.bias[o]).max(0.0);
        }
        out
    }
}

/// VGG16 feature stages plus the LPIPS linear heads.
#[derive(Debug, Clone)]
pub struct LpipsNetwork {
    stages: Vec<Vec<ConvLayer>>,
    heads: Vec<Array1<f32>>,
}

impl LpipsNetwork {
    /// Assemble a network from conv stages and one linear head per stage.
    ///
    /// A 2x2 max-pool runs before every stage but the first. Channel counts
    /// must chain, the first layer must take RGB input, and each head must
    /// match its stage's output width.
    pub fn from_parts(stages: Vec<Vec<ConvLayer>>, heads: Vec<Array1<f32>>) -> Result<Self> {
        if stages.is_empty() || stages.iter().any(Vec::is_empty) {
            return Err(Error::InvalidTensor(
                "every LPIPS stage needs at least one convolution".to_string(),
            ));
        }
        if heads.len() != stages.len() {
            return Err(Error::InvalidTensor(format!(
                "{} linear heads for {} stages",
                heads.len(),
                stages.len()
            )));
        }

        let mut channels = CHANNELS;
        for (i, stage) in stages.iter().enumerate() {
            for layer in stage {
                if layer.in_channels() != channels {
                    return Err(Error::InvalidTensor(format!(
                        "stage {i}: layer expects {} input channels, previous layer gives {channels}",
                        layer.in_channels()
                    )));
                }
                channels = layer.out_channels();
            }
            if heads[i].len() != channels {
                return Err(Error::InvalidTensor(format!(
                    "stage {i}: head has {} weights for {channels} channels",
                    heads[i].len()
                )));
            }
        }

        Ok(Self { stages, heads })
    }

    /// Load VGG16 + LPIPS v0.1 weights from a safetensors file.
    pub fn load(path: &Path) -> Result<Self> {
        let model_err = |reason: String| Error::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| model_err(e.to_string()))?;
        let tensors = SafeTensors::deserialize(&bytes).map_err(|e| model_err(e.to_string()))?;

        let fetch = |name: &str| -> Result<(Vec<usize>, Vec<f32>)> {
            let view = tensors
                .tensor(name)
                .map_err(|e| model_err(format!("{name}: {e}")))?;
            if view.dtype() != Dtype::F32 {
                return Err(model_err(format!(
                    "{name}: expected F32, found {:?}",
                    view.dtype()
                )));
            }
            let values = view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            Ok((view.shape().to_vec(), values))
        };

        let mut stages = Vec::with_capacity(VGG16_STAGES.len());
        for indices in VGG16_STAGES {
            let mut layers = Vec::with_capacity(indices.len());
            for idx in indices {
                let (shape, values) = fetch(&format!("features.{idx}.weight"))?;
                let &[o, i, kh, kw] = shape.as_slice() else {
                    return Err(model_err(format!(
                        "features.{idx}.weight: expected 4 dimensions, got {shape:?}"
                    )));
                };
                let weight = Array4::from_shape_vec((o, i, kh, kw), values)
                    .map_err(|e| model_err(format!("features.{idx}.weight: {e}")))?;
                let (_, bias) = fetch(&format!("features.{idx}.bias"))?;
                let layer = ConvLayer::new(weight, Array1::from(bias))
                    .map_err(|e| model_err(format!("features.{idx}: {e}")))?;
                layers.push(layer);
            }
            stages.push(layers);
        }

        let names: HashSet<String> = tensors.names().into_iter().cloned().collect();
        let mut heads = Vec::with_capacity(VGG16_STAGES.len());
        for i in 0..VGG16_STAGES.len() {
            let candidates = head_names(i);
            let name = candidates
                .iter()
                .find(|name| names.contains(*name))
                .ok_or_else(|| {
                    model_err(format!(
                        "no linear head {i}, tried {}",
                        candidates.join(", ")
                    ))
                })?;
            let (_, values) = fetch(name)?;
            heads.push(Array1::from(values));
        }

        let network = Self::from_parts(stages, heads).map_err(|e| model_err(e.to_string()))?;
        log::debug!("loaded LPIPS weights from {}", path.display());
        Ok(network)
    }

    /// Smallest width/height the pooling chain accepts.
    #[must_use]
    pub fn min_size(&self) -> usize {
        1 << (self.stages.len() - 1)
    }

    /// Normalized activations tapped at the end of each stage.
    fn features(&self, image: &ImageTensor) -> Vec<Array3<f32>> {
        let (width, height) = image.dimensions();
        let mut x = Array3::<f32>::zeros((CHANNELS, height, width));
        for c in 0..CHANNELS {
            x.index_axis_mut(Axis(0), c)
                .assign(&image.plane(c).mapv(|v| (v - SHIFT[c]) / SCALE[c]));
        }

        let mut taps = Vec::with_capacity(self.stages.len());
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                x = max_pool(x.view());
            }
            for layer in stage {
                x = layer.forward(x.view());
            }
            taps.push(unit_normalize(x.view()));
        }
        taps
    }

    /// LPIPS distance between two same-sized images.
    pub fn distance(&self, a: &ImageTensor, b: &ImageTensor) -> Result<f64> {
        a.ensure_same_size(b)?;
        let (width, height) = a.dimensions();
        if width.min(height) < self.min_size() {
            return Err(Error::metric(
                MetricKind::Lpips.name(),
                format!(
                    "image {width}x{height} is smaller than the {} px the backbone needs",
                    self.min_size()
                ),
            ));
        }

        let features_a = self.features(a);
        let features_b = self.features(b);

        let mut total = 0.0f64;
        for ((fa, fb), head) in features_a.iter().zip(&features_b).zip(&self.heads) {
            let (_, h, w) = fa.dim();
            let sum = Zip::indexed(fa)
                .and(fb)
                .fold(0.0f64, |acc, (c, _, _), &va, &vb| {
                    let d = f64::from(va - vb);
                    acc + f64::from(head[c]) * d * d
                });
            total += sum / (h * w) as f64;
        }
        Ok(total)
    }
}

/// 2x2 max-pool with stride 2, dropping an odd trailing row/column.
fn max_pool(input: ArrayView3<'_, f32>) -> Array3<f32> {
    let (channels, height, width) = input.dim();
    Array3::from_shape_fn((channels, height / 2, width / 2), |(c, y, x)| {
        let (y, x) = (2 * y, 2 * x);
        input[[c, y, x]]
            .max(input[[c, y, x + 1]])
            .max(input[[c, y + 1, x]])
            .max(input[[c, y + 1, x + 1]])
    })
}

/// Divide each pixel's channel vector by its L2 norm.
fn unit_normalize(input: ArrayView3<'_, f32>) -> Array3<f32> {
    let norms = input
        .mapv(|v| v * v)
        .sum_axis(Axis(0))
        .mapv(|s| s.sqrt() + NORM_EPS);
    let mut out = input.to_owned();
    for mut channel in out.axis_iter_mut(Axis(0)) {
        channel /= &norms;
    }
    out
}

/// LPIPS metric with lazily loaded weights.
#[derive(Debug)]
pub struct Lpips {
    weights: PathBuf,
    network: OnceLock<LpipsNetwork>,
}

impl Lpips {
    /// LPIPS reading weights from `weights` on first use.
    #[must_use]
    pub fn new(weights: impl Into<PathBuf>) -> Self {
        Self {
            weights: weights.into(),
            network: OnceLock::new(),
        }
    }

    /// LPIPS with an already-built network.
    #[must_use]
    pub fn with_network(network: LpipsNetwork) -> Self {
        Self {
            weights: PathBuf::new(),
            network: OnceLock::from(network),
        }
    }

    fn network(&self) -> Result<&LpipsNetwork> {
        if let Some(network) = self.network.get() {
            return Ok(network);
        }
        let network = LpipsNetwork::load(&self.weights)?;
        Ok(self.network.get_or_init(|| network))
    }
}

impl Metric for Lpips {
    fn name(&self) -> &str {
        MetricKind::Lpips.name()
    }

    fn score(&self, render: &ImageTensor, ground_truth: &ImageTensor) -> Result<f64> {
        let network = self.network()?;
        network.distance(render, ground_truth)
    }
}
