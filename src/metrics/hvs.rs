//! Visual-system loss with uniform or foveated sensitivity.
//!
//! Both images are reduced to linear luminance and split into band-pass
//! levels (differences of Gaussians, sigma doubling per level). Each band is
//! divided by the local mean luminance to get contrast, weighted by a contrast
//! sensitivity function (CSF) at the band's centre frequency, and the squared
//! weighted contrast difference is averaged over pixels and summed over bands.
//!
//! The foveated variant also attenuates sensitivity with eccentricity from the
//! gaze point, so a difference in the periphery counts less than the same
//! difference under the fovea. For any pair, HVS-FOV <= HVS-Uniform.
//!
//! Lower is better; identical images score exactly 0.

use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use super::filter::{Border, blur, gaussian_kernel_3sigma};
use super::{Metric, MetricKind};
use crate::error::{Error, Result};
use crate::tensor::ImageTensor;
use crate::viewing::ViewingCondition;

/// Rec. 709 luminance weights.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Keeps contrast finite in black regions.
const ADAPTATION_FLOOR: f32 = 0.01;

/// Spatial frequency decay constant of the foveation model.
const FOVEATION_ALPHA: f64 = 0.106;
/// Eccentricity (degrees) at which spatial resolution halves.
const HALF_RESOLUTION_ECCENTRICITY: f64 = 2.3;

/// Parameters shared by the uniform and foveated HVS metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HvsConfig {
    /// Display acuity and gaze point.
    pub viewing: ViewingCondition,
    /// Number of band-pass levels.
    pub levels: usize,
}

impl Default for HvsConfig {
    fn default() -> Self {
        Self {
            viewing: ViewingCondition::desktop(),
            levels: 5,
        }
    }
}

/// How sensitivity varies across the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    /// Same sensitivity everywhere.
    Uniform,
    /// Sensitivity falls off with eccentricity from the gaze point.
    Foveated,
}

/// HVS loss scorer.
#[derive(Debug, Clone)]
pub struct HvsLoss {
    config: HvsConfig,
    sensitivity: Sensitivity,
}

impl HvsLoss {
    /// Loss with spatially constant sensitivity ("HVS-Uniform").
    #[must_use]
    pub fn uniform(config: HvsConfig) -> Self {
        Self {
            config,
            sensitivity: Sensitivity::Uniform,
        }
    }

    /// Loss with foveated sensitivity ("HVS-FOV").
    #[must_use]
    pub fn foveated(config: HvsConfig) -> Self {
        Self {
            config,
            sensitivity: Sensitivity::Foveated,
        }
    }

    /// Viewing condition and band count.
    #[must_use]
    pub fn config(&self) -> &HvsConfig {
        &self.config
    }

    /// Whether errors are weighted uniformly or by eccentricity.
    #[must_use]
    pub fn sensitivity(&self) -> Sensitivity {
        self.sensitivity
    }

    fn validate(&self) -> Result<()> {
        if self.config.levels == 0 {
            return Err(Error::metric(self.name(), "at least one band level is required"));
        }
        let ppd = self.config.viewing.acuity_ppd;
        if !ppd.is_finite() || ppd <= 0.0 {
            return Err(Error::metric(
                self.name(),
                format!("acuity must be a positive number of pixels per degree, got {ppd}"),
            ));
        }
        Ok(())
    }
}

impl Metric for HvsLoss {
    fn name(&self) -> &str {
        match self.sensitivity {
            Sensitivity::Uniform => MetricKind::HvsUniform.name(),
            Sensitivity::Foveated => MetricKind::HvsFoveated.name(),
        }
    }

    fn score(&self, render: &ImageTensor, ground_truth: &ImageTensor) -> Result<f64> {
        ground_truth.ensure_same_size(render)?;
        self.validate()?;

        let levels = self.config.levels;
        let (render_bands, truth_bands) = rayon::join(
            || contrast_bands(luminance(render).view(), levels),
            || contrast_bands(luminance(ground_truth).view(), levels),
        );

        let (width, height) = render.dimensions();
        let viewing = &self.config.viewing;
        let eccentricity = match self.sensitivity {
            Sensitivity::Uniform => None,
            Sensitivity::Foveated => Some(Array2::from_shape_fn((height, width), |(y, x)| {
                viewing.eccentricity(x, y, width, height)
            })),
        };

        let mut loss = 0.0;
        for (k, (cr, cg)) in render_bands.iter().zip(&truth_bands).enumerate() {
            let frequency = viewing.cycles_per_degree(band_frequency(k));
            let csf = contrast_sensitivity(frequency);
            let sum = match &eccentricity {
                None => Zip::from(cr).and(cg).fold(0.0f64, |acc, &a, &b| {
                    let d = csf * f64::from(a - b);
                    acc + d * d
                }),
                Some(ecc) => Zip::from(cr).and(cg).and(ecc).fold(0.0f64, |acc, &a, &b, &e| {
                    let d = csf * foveation_factor(frequency, e) * f64::from(a - b);
                    acc + d * d
                }),
            };
            loss += sum / (width * height) as f64;
        }

        log::trace!("{} over {levels} bands: {loss}", self.name());
        Ok(loss)
    }
}

/// Mannos-Sakrison contrast sensitivity at `cpd` cycles per degree.
#[must_use]
pub fn contrast_sensitivity(cpd: f64) -> f64 {
    let f = 0.114 * cpd;
    2.6 * (0.0192 + f) * (-f.powf(1.1)).exp()
}

/// Relative sensitivity at `eccentricity` degrees (1.0 at the gaze point).
#[must_use]
pub fn foveation_factor(cpd: f64, eccentricity: f64) -> f64 {
    (-FOVEATION_ALPHA * cpd * eccentricity / HALF_RESOLUTION_ECCENTRICITY).exp()
}

/// Centre frequency of band `level`, in cycles per pixel.
fn band_frequency(level: usize) -> f64 {
    1.0 / 2f64.powi(level as i32 + 2)
}

fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

fn luminance(image: &ImageTensor) -> Array2<f32> {
    let (width, height) = image.dimensions();
    let mut out = Array2::<f32>::zeros((height, width));
    for (c, &weight) in LUMA.iter().enumerate() {
        Zip::from(&mut out)
            .and(image.plane(c))
            .for_each(|l, &v| *l += weight * srgb_to_linear(v));
    }
    out
}

/// Local contrast of each difference-of-Gaussians band, finest first.
fn contrast_bands(luminance: ArrayView2<'_, f32>, levels: usize) -> Vec<Array2<f32>> {
    let mut finer = luminance.to_owned();
    let mut bands = Vec::with_capacity(levels);
    for k in 0..levels {
        let sigma = 2f64.powi(k as i32);
        let coarser = blur(luminance, &gaussian_kernel_3sigma(sigma), Border::Replicate);
        bands.push(
            Zip::from(&finer)
                .and(&coarser)
                .map_collect(|&f, &c| (f - c) / (c.max(0.0) + ADAPTATION_FLOOR)),
        );
        finer = coarser;
    }
    bands
}
