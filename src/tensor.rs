//! Canonical image tensor shared by the loader and every metric.
//!
//! Images are held as `[1, 3, H, W]` f32 arrays with values in `[0, 1]`, the
//! layout rendering research code feeds to its metrics.

use image::DynamicImage;
use ndarray::{Array4, ArrayView2, ArrayView4, Axis};

use crate::error::{Error, Result};

/// Number of color channels kept from a decoded image.
pub const CHANNELS: usize = 3;

/// A decoded image as a `[1, 3, H, W]` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Array4<f32>,
}

impl ImageTensor {
    /// Convert a decoded image, keeping the first three channels.
    ///
    /// Alpha is discarded and grayscale is expanded to RGB. Integer samples are
    /// normalized by their maximum value; float samples are clamped to `[0, 1]`.
    #[must_use]
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb32f();
        let width = rgb.width() as usize;
        let height = rgb.height() as usize;

        let mut data = Array4::<f32>::zeros((1, CHANNELS, height, width));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for (c, &value) in pixel.0.iter().enumerate() {
                data[[0, c, y as usize, x as usize]] = value.clamp(0.0, 1.0);
            }
        }

        Self { data }
    }

    /// Wrap an existing array, validating the `[1, 3, H, W]` layout.
    pub fn from_array(data: Array4<f32>) -> Result<Self> {
        let shape = data.shape();
        if shape[0] != 1 || shape[1] != CHANNELS {
            return Err(Error::InvalidTensor(format!(
                "expected shape [1, 3, H, W], got {shape:?}"
            )));
        }
        if shape[2] == 0 || shape[3] == 0 {
            return Err(Error::InvalidTensor("image has no pixels".to_string()));
        }
        Ok(Self { data })
    }

    /// Build a tensor whose every channel of every pixel is `value`.
    #[must_use]
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            data: Array4::from_elem((1, CHANNELS, height, width), value),
        }
    }

    /// Build a tensor from a per-pixel function `f(channel, y, x)`.
    #[must_use]
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize, usize) -> f32) -> Self {
        Self {
            data: Array4::from_shape_fn((1, CHANNELS, height, width), |(_, c, y, x)| f(c, y, x)),
        }
    }

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.data.shape()[3]
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.data.shape()[2]
    }

    /// `(width, height)`.
    #[must_use]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    /// Tensor shape, always `[1, 3, H, W]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 4] {
        [1, CHANNELS, self.height(), self.width()]
    }

    /// Read-only view of the whole tensor.
    #[must_use]
    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// One color plane as an `[H, W]` view.
    #[must_use]
    pub fn plane(&self, channel: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), 0).index_axis_move(Axis(0), channel)
    }

    /// Fail with [`Error::DimensionMismatch`] unless `other` has the same size.
    pub fn ensure_same_size(&self, other: &Self) -> Result<()> {
        if self.dimensions() != other.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions(),
                actual: other.dimensions(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn test_alpha_is_dropped() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 10]));
        img.put_pixel(1, 0, Rgba([0, 255, 0, 255]));
        let tensor = ImageTensor::from_image(&DynamicImage::ImageRgba8(img));

        assert_eq!(tensor.shape(), [1, 3, 1, 2]);
        assert!((tensor.plane(0)[[0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor.plane(1)[[0, 1]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor.plane(2)[[0, 0]], 0.0);
    }

    #[test]
    fn test_grayscale_is_expanded() {
        let img = GrayImage::from_pixel(3, 2, Luma([51]));
        let tensor = ImageTensor::from_image(&DynamicImage::ImageLuma8(img));

        assert_eq!(tensor.dimensions(), (3, 2));
        for c in 0..CHANNELS {
            assert!((tensor.plane(c)[[1, 2]] - 0.2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_from_array_rejects_bad_layout() {
        let four_channels = Array4::<f32>::zeros((1, 4, 2, 2));
        assert!(matches!(
            ImageTensor::from_array(four_channels),
            Err(Error::InvalidTensor(_))
        ));

        let batch = Array4::<f32>::zeros((2, 3, 2, 2));
        assert!(ImageTensor::from_array(batch).is_err());

        let empty = Array4::<f32>::zeros((1, 3, 0, 2));
        assert!(ImageTensor::from_array(empty).is_err());
    }

    #[test]
    fn test_size_check() {
        let a = ImageTensor::filled(4, 4, 0.5);
        let b = ImageTensor::filled(4, 5, 0.5);
        assert!(a.ensure_same_size(&a.clone()).is_ok());
        assert!(matches!(
            a.ensure_same_size(&b),
            Err(Error::DimensionMismatch {
                expected: (4, 4),
                actual: (4, 5)
            })
        ));
    }
}
