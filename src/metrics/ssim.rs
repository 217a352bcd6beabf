//! Windowed structural similarity (SSIM).
//!
//! Gaussian-weighted SSIM as used for novel-view-synthesis benchmarks: an
//! 11x11 window with sigma 1.5, zero padding so the SSIM map keeps the image
//! size, and the mean of the map over all channels and pixels.

use ndarray::{ArrayView2, Zip};
use rayon::prelude::*;

use super::filter::{Border, blur, gaussian_kernel};
use super::{Metric, MetricKind};
use crate::error::Result;
use crate::tensor::{CHANNELS, ImageTensor};

const C1: f64 = 0.01 * 0.01;
const C2: f64 = 0.03 * 0.03;

/// SSIM scorer. Higher is better, 1.0 for identical images.
#[derive(Debug, Clone)]
pub struct Ssim {
    kernel: Vec<f32>,
}

impl Ssim {
    /// SSIM with the standard 11-tap, sigma 1.5 window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(11, 1.5)
    }

    /// SSIM with a custom odd window size and Gaussian sigma.
    #[must_use]
    pub fn with_window(window_size: usize, sigma: f64) -> Self {
        Self {
            kernel: gaussian_kernel(sigma, window_size / 2),
        }
    }

    fn channel_sum(&self, a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> f64 {
        let mu_a = blur(a, &self.kernel, Border::Zero);
        let mu_b = blur(b, &self.kernel, Border::Zero);
        let aa = blur((&a * &a).view(), &self.kernel, Border::Zero);
        let bb = blur((&b * &b).view(), &self.kernel, Border::Zero);
        let ab = blur((&a * &b).view(), &self.kernel, Border::Zero);

        Zip::from(&mu_a)
            .and(&mu_b)
            .and(&aa)
            .and(&bb)
            .and(&ab)
            .fold(0.0f64, |acc, &ma, &mb, &saa, &sbb, &sab| {
                let (ma, mb) = (f64::from(ma), f64::from(mb));
                let ma_sq = ma * ma;
                let mb_sq = mb * mb;
                let ma_mb = ma * mb;
                let var_a = f64::from(saa) - ma_sq;
                let var_b = f64::from(sbb) - mb_sq;
                let cov = f64::from(sab) - ma_mb;

                let numerator = (2.0 * ma_mb + C1) * (2.0 * cov + C2);
                let denominator = (ma_sq + mb_sq + C1) * (var_a + var_b + C2);
                acc + numerator / denominator
            })
    }
}

impl Default for Ssim {
    fn default() -> Self {
        Self::new()
    }
}

impl Metric for Ssim {
    fn name(&self) -> &str {
        MetricKind::Ssim.name()
    }

    fn score(&self, render: &ImageTensor, ground_truth: &ImageTensor) -> Result<f64> {
        ground_truth.ensure_same_size(render)?;

        let total: f64 = (0..CHANNELS)
            .into_par_iter()
            .map(|c| self.channel_sum(render.plane(c), ground_truth.plane(c)))
            .sum();
        let (width, height) = render.dimensions();
        Ok(total / (CHANNELS * width * height) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn gradient(width: usize, height: usize) -> ImageTensor {
        ImageTensor::from_fn(width, height, |c, y, x| {
            ((x + 2 * y + c) % 17) as f32 / 16.0
        })
    }

    #[test]
    fn test_identical_images() {
        let img = gradient(32, 24);
        let ssim = Ssim::new().score(&img, &img).unwrap();
        assert!((ssim - 1.0).abs() < 1e-9, "identical SSIM should be 1, got {ssim}");
    }

    #[test]
    fn test_different_images() {
        let a = gradient(32, 32);
        let b = ImageTensor::from_fn(32, 32, |c, y, x| {
            (((x * 7 + y * 3 + c) % 13) as f32 / 12.0).clamp(0.0, 1.0)
        });
        let ssim = Ssim::new().score(&a, &b).unwrap();
        assert!(ssim < 0.9, "unrelated images should score well below 1, got {ssim}");
        assert!(ssim > -1.0);
    }

    #[test]
    fn test_symmetric() {
        let a = gradient(20, 20);
        let b = ImageTensor::from_fn(20, 20, |_, y, x| if (x + y) % 2 == 0 { 0.2 } else { 0.8 });
        let metric = Ssim::new();
        let ab = metric.score(&a, &b).unwrap();
        let ba = metric.score(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_noise_lowers_score_monotonically() {
        let reference = gradient(32, 32);
        let noisy = |amount: f32| {
            ImageTensor::from_fn(32, 32, |c, y, x| {
                let base = ((x + 2 * y + c) % 17) as f32 / 16.0;
                let n = if (x * 31 + y * 17 + c) % 2 == 0 { amount } else { -amount };
                (base + n).clamp(0.0, 1.0)
            })
        };
        let metric = Ssim::new();
        let mild = metric.score(&noisy(0.02), &reference).unwrap();
        let strong = metric.score(&noisy(0.2), &reference).unwrap();
        assert!(mild > strong, "mild={mild} strong={strong}");
        assert!(mild < 1.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = ImageTensor::filled(16, 16, 0.5);
        let b = ImageTensor::filled(8, 16, 0.5);
        assert!(matches!(
            Ssim::new().score(&a, &b),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
