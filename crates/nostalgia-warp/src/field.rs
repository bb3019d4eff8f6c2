//! Displacement fields for image warping.
//!
//! A [`DisplacementField`] stores, for every destination pixel, the offset of
//! the source pixel to sample from. Content therefore moves in the opposite
//! direction of the stored offset: a positive `dy` pulls the pixels below up
//! into place.

use serde::{Deserialize, Serialize};

/// Contributions are cut off beyond this many standard deviations.
const TRUNCATE_SIGMAS: f32 = 4.0;

/// Default lift as a fraction of mouth width.
const fn default_lift_factor() -> f32 {
    0.22
}

/// Default outward spread as a fraction of mouth width.
const fn default_spread_factor() -> f32 {
    0.04
}

/// Default Gaussian radius (standard deviation) in pixels.
const fn default_radius() -> f32 {
    18.0
}

/// Tunable constants for the geometric smile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmileWarpParams {
    /// Vertical lift at the mouth corners, as a fraction of mouth width.
    #[serde(default = "default_lift_factor")]
    pub lift_factor: f32,

    /// Horizontal outward spread at the corners, as a fraction of mouth width.
    #[serde(default = "default_spread_factor")]
    pub spread_factor: f32,

    /// Standard deviation of the corner contributions in pixels.
    #[serde(default = "default_radius")]
    pub radius: f32,
}

impl Default for SmileWarpParams {
    fn default() -> Self {
        Self {
            lift_factor: default_lift_factor(),
            spread_factor: default_spread_factor(),
            radius: default_radius(),
        }
    }
}

/// Per-pixel source offsets `(dx, dy)` for a `width x height` image.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementField {
    width: u32,
    height: u32,
    dx: Vec<f32>,
    dy: Vec<f32>,
}

impl DisplacementField {
    /// Creates an identity field (all offsets zero).
    #[must_use]
    pub fn zeros(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            dx: vec![0.0; len],
            dy: vec![0.0; len],
        }
    }

    /// Field width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Field height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| y as usize * self.width as usize + x as usize)
    }

    /// The raw source offset at a destination pixel.
    #[must_use]
    pub fn offset(&self, x: u32, y: u32) -> Option<(f32, f32)> {
        self.index(x, y).map(|i| (self.dx[i], self.dy[i]))
    }

    /// Length of the offset vector at a destination pixel.
    #[must_use]
    pub fn magnitude(&self, x: u32, y: u32) -> Option<f32> {
        self.offset(x, y).map(|(dx, dy)| dx.hypot(dy))
    }

    /// The source coordinate sampled for a destination pixel, clamped to the image.
    ///
    /// Always lies within `[0, width - 1] x [0, height - 1]`.
    #[must_use]
    pub fn source_coords(&self, x: u32, y: u32) -> (f32, f32) {
        let (dx, dy) = self.offset(x, y).unwrap_or((0.0, 0.0));
        let max_x = self.width.saturating_sub(1) as f32;
        let max_y = self.height.saturating_sub(1) as f32;
        (
            clamp_finite(x as f32 + dx, x as f32, max_x),
            clamp_finite(y as f32 + dy, y as f32, max_y),
        )
    }

    /// Adds a Gaussian-weighted offset centred on `center`.
    ///
    /// Every pixel within `4 * sigma` receives `offset * exp(-d² / 2σ²)`.
    /// Contributions accumulate, so several calls build a multi-point field.
    pub fn add_gaussian(&mut self, center: (f32, f32), offset: (f32, f32), sigma: f32) {
        if self.width == 0 || self.height == 0 || sigma <= 0.0 || !sigma.is_finite() {
            return;
        }

        let (cx, cy) = center;
        let reach = TRUNCATE_SIGMAS * sigma;
        let reach_sq = reach * reach;
        let denom = 2.0 * sigma * sigma;
        if !denom.is_normal() {
            return;
        }

        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let x_start = (cx - reach).floor().clamp(0.0, max_x) as u32;
        let x_end = (cx + reach).ceil().clamp(0.0, max_x) as u32;
        let y_start = (cy - reach).floor().clamp(0.0, max_y) as u32;
        let y_end = (cy + reach).ceil().clamp(0.0, max_y) as u32;

        for y in y_start..=y_end {
            let ddy = y as f32 - cy;
            let row = y as usize * self.width as usize;
            for x in x_start..=x_end {
                let ddx = x as f32 - cx;
                let dist_sq = ddx.mul_add(ddx, ddy * ddy);
                if dist_sq > reach_sq {
                    continue;
                }
                let weight = (-dist_sq / denom).exp();
                let i = row + x as usize;
                self.dx[i] += offset.0 * weight;
                self.dy[i] += offset.1 * weight;
            }
        }
    }
}

/// Clamps to `[0, max]`, mapping NaN to `identity`.
fn clamp_finite(value: f32, identity: f32, max: f32) -> f32 {
    if value.is_nan() {
        identity.clamp(0.0, max)
    } else {
        value.clamp(0.0, max)
    }
}
