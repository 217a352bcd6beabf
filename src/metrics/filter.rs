//! Separable Gaussian filtering shared by SSIM and the HVS metrics.

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, Zip};

/// How samples outside the image are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    /// Outside samples are zero (matches `conv2d` zero padding).
    Zero,
    /// Outside samples repeat the nearest edge sample.
    Replicate,
}

/// Normalized 1-D Gaussian kernel of `2 * radius + 1` taps.
#[must_use]
pub fn gaussian_kernel(sigma: f64, radius: usize) -> Vec<f32> {
    let weights: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let d = i as f64 - radius as f64;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Gaussian kernel truncated at three standard deviations.
#[must_use]
pub fn gaussian_kernel_3sigma(sigma: f64) -> Vec<f32> {
    gaussian_kernel(sigma, (3.0 * sigma).ceil() as usize)
}

/// Convolve rows, then columns, with the same odd-length kernel.
///
/// Output has the input's shape. Rows and columns are filtered in parallel on
/// the current rayon pool.
#[must_use]
pub fn blur(input: ArrayView2<'_, f32>, kernel: &[f32], border: Border) -> Array2<f32> {
    let mut horizontal = Array2::<f32>::zeros(input.raw_dim());
    Zip::from(horizontal.rows_mut())
        .and(input.rows())
        .par_for_each(|out, line| convolve_line(line, out, kernel, border));

    let mut output = Array2::<f32>::zeros(input.raw_dim());
    Zip::from(output.columns_mut())
        .and(horizontal.columns())
        .par_for_each(|out, line| convolve_line(line, out, kernel, border));

    output
}

fn convolve_line(
    line: ArrayView1<'_, f32>,
    mut out: ArrayViewMut1<'_, f32>,
    kernel: &[f32],
    border: Border,
) {
    let n = line.len() as isize;
    let radius = (kernel.len() / 2) as isize;
    for (i, slot) in out.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for (k, &weight) in kernel.iter().enumerate() {
            let pos = i as isize + k as isize - radius;
            let sample = if (0..n).contains(&pos) {
                line[pos as usize]
            } else {
                match border {
                    Border::Zero => 0.0,
                    Border::Replicate => line[pos.clamp(0, n - 1) as usize],
                }
            };
            acc += weight * sample;
        }
        *slot = acc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(1.5, 5);
        assert_eq!(kernel.len(), 11);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        for i in 0..5 {
            assert!((kernel[i] - kernel[10 - i]).abs() < 1e-9);
        }
        assert!(kernel[5] > kernel[4]);
    }

    #[test]
    fn test_replicate_preserves_constant() {
        let input = Array2::from_elem((6, 9), 0.25f32);
        let out = blur(input.view(), &gaussian_kernel_3sigma(2.0), Border::Replicate);
        for &v in &out {
            assert!((v - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_border_darkens_edges() {
        let input = Array2::from_elem((11, 11), 1.0f32);
        let out = blur(input.view(), &gaussian_kernel(1.5, 5), Border::Zero);
        assert!((out[[5, 5]] - 1.0).abs() < 1e-3);
        assert!(out[[0, 0]] < 0.5);
        assert!(out[[0, 5]] < out[[5, 5]]);
    }

    #[test]
    fn test_impulse_response_matches_kernel() {
        let mut input = Array2::<f32>::zeros((1, 7));
        input[[0, 3]] = 1.0;
        let kernel = [0.25f32, 0.5, 0.25];
        let out = blur(input.view(), &kernel, Border::Zero);
        // Vertical pass over a single row only keeps the centre tap.
        assert!((out[[0, 2]] - 0.125).abs() < 1e-6);
        assert!((out[[0, 3]] - 0.25).abs() < 1e-6);
        assert!((out[[0, 4]] - 0.125).abs() < 1e-6);
        assert_eq!(out[[0, 0]], 0.0);
    }
}
