//! Viewing condition modeling for the HVS metrics.
//!
//! This module provides the [`ViewingCondition`] type which models how a
//! rendered image is viewed: how many pixels span one degree of visual angle,
//! and where the viewer is looking.
//!
//! ## Key Concepts
//!
//! - **acuity_ppd**: pixels per degree of visual angle. Determined by the
//!   display's pixel density and viewing distance. Converts image frequencies
//!   (cycles per pixel) into retinal frequencies (cycles per degree).
//! - **gaze**: the fixation point in normalized image coordinates. The
//!   foveated metric measures eccentricity from here.

use serde::{Deserialize, Serialize};

/// Fixation point in normalized image coordinates (`0.0..=1.0` on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gaze {
    /// Horizontal position, 0 = left edge.
    pub x: f64,
    /// Vertical position, 0 = top edge.
    pub y: f64,
}

impl Gaze {
    /// Gaze at the image centre.
    pub const CENTER: Self = Self { x: 0.5, y: 0.5 };

    /// Gaze at an arbitrary normalized point.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Default for Gaze {
    fn default() -> Self {
        Self::CENTER
    }
}

impl std::str::FromStr for Gaze {
    type Err = String;

    /// Parse `"x,y"`, e.g. `"0.5,0.5"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("expected \"x,y\", got '{s}'"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid gaze coordinate '{v}': {e}"))
        };
        let gaze = Self::new(parse(x)?, parse(y)?);
        if !(0.0..=1.0).contains(&gaze.x) || !(0.0..=1.0).contains(&gaze.y) {
            return Err(format!("gaze coordinates must be within 0..=1, got '{s}'"));
        }
        Ok(gaze)
    }
}

/// Viewing condition for perceptual quality assessment.
///
/// # Example
///
/// ```
/// use render_eval::ViewingCondition;
///
/// let condition = ViewingCondition::desktop();
/// // A pixel-level checkerboard (0.5 cycles/pixel) seen at 40 PPD.
/// assert_eq!(condition.cycles_per_degree(0.5), 20.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewingCondition {
    /// Pixels per degree of visual angle.
    ///
    /// Typical values:
    /// - Desktop at arm's length: ~40 PPD
    /// - Laptop: ~60 PPD
    /// - Smartphone held close: ~90+ PPD
    pub acuity_ppd: f64,

    /// Where the viewer is looking.
    #[serde(default)]
    pub gaze: Gaze,
}

impl ViewingCondition {
    /// Create a new viewing condition with the given acuity PPD, gazing at the
    /// image centre.
    #[must_use]
    pub fn new(acuity_ppd: f64) -> Self {
        Self {
            acuity_ppd,
            gaze: Gaze::CENTER,
        }
    }

    /// Desktop viewing condition (acuity ~40 PPD).
    ///
    /// Represents viewing a standard desktop monitor at arm's length
    /// (approximately 24 inches / 60 cm).
    #[must_use]
    pub fn desktop() -> Self {
        Self::new(40.0)
    }

    /// Laptop viewing condition (acuity ~60 PPD).
    #[must_use]
    pub fn laptop() -> Self {
        Self::new(60.0)
    }

    /// Smartphone viewing condition (acuity ~90 PPD).
    #[must_use]
    pub fn smartphone() -> Self {
        Self::new(90.0)
    }

    /// Set the fixation point.
    #[must_use]
    pub fn with_gaze(mut self, gaze: Gaze) -> Self {
        self.gaze = gaze;
        self
    }

    /// Convert an image frequency in cycles/pixel to cycles/degree.
    #[must_use]
    pub fn cycles_per_degree(&self, cycles_per_pixel: f64) -> f64 {
        cycles_per_pixel * self.acuity_ppd
    }

    /// Gaze point in pixel coordinates for an image of the given size.
    #[must_use]
    pub fn gaze_pixel(&self, width: usize, height: usize) -> (f64, f64) {
        (self.gaze.x * width as f64, self.gaze.y * height as f64)
    }

    /// Eccentricity in degrees of pixel `(x, y)` relative to the gaze point.
    #[must_use]
    pub fn eccentricity(&self, x: usize, y: usize, width: usize, height: usize) -> f64 {
        let (gx, gy) = self.gaze_pixel(width, height);
        // Pixel centres sit at +0.5.
        let dx = x as f64 + 0.5 - gx;
        let dy = y as f64 + 0.5 - gy;
        dx.hypot(dy) / self.acuity_ppd
    }
}

impl Default for ViewingCondition {
    fn default() -> Self {
        Self::desktop()
    }
}
