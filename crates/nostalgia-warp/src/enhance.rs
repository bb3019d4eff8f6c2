//! Sharpness enhancement and the mirrored placeholder animation.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// 3x3 smoothing kernel; the weights sum to [`SMOOTH_SCALE`].
const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];
const SMOOTH_SCALE: f32 = 13.0;

/// Widest placeholder animation produced, in pixels.
pub const MAX_ANIMATION_WIDTH: u32 = 1200;

/// Maps an enhancement level in `[0, 100]` to a sharpness factor in `[1, 2]`.
///
/// Out-of-range levels are clamped.
#[must_use]
pub fn level_to_factor(level: f32) -> f32 {
    let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 100.0) };
    1.0 + level / 100.0
}

/// Applies the 3x3 smoothing kernel. Border pixels are copied unchanged.
#[must_use]
pub fn smooth(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return image.clone();
    }

    let mut out = image.clone();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = [0.0f32; 3];
            for (k, weight) in SMOOTH_KERNEL.iter().enumerate() {
                let sx = x + k as u32 % 3 - 1;
                let sy = y + k as u32 / 3 - 1;
                let px = image.get_pixel(sx, sy).0;
                for c in 0..3 {
                    acc[c] += weight * f32::from(px[c]);
                }
            }
            out.put_pixel(x, y, Rgb(acc.map(|v| (v / SMOOTH_SCALE).round().clamp(0.0, 255.0) as u8)));
        }
    }
    out
}

/// Sharpens by extrapolating away from a smoothed copy.
///
/// A factor of 1 returns the original, 0 the smoothed image, and values above
/// 1 sharpen: `out = smoothed + factor * (original - smoothed)`.
#[must_use]
pub fn sharpen(image: &RgbImage, factor: f32) -> RgbImage {
    if (factor - 1.0).abs() < f32::EPSILON {
        return image.clone();
    }

    let degenerate = smooth(image);
    let mut out = image.clone();
    for (dst, (orig, deg)) in out
        .pixels_mut()
        .zip(image.pixels().zip(degenerate.pixels()))
    {
        for c in 0..3 {
            let o = f32::from(orig[c]);
            let d = f32::from(deg[c]);
            dst[c] = factor.mul_add(o - d, d).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Places the image next to its horizontal mirror.
///
/// The result is downscaled proportionally if wider than `max_width`.
#[must_use]
pub fn mirror_side_by_side(image: &RgbImage, max_width: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mirrored = imageops::flip_horizontal(image);

    let mut canvas = RgbImage::new(width * 2, height);
    imageops::replace(&mut canvas, image, 0, 0);
    imageops::replace(&mut canvas, &mirrored, i64::from(width), 0);

    if max_width == 0 || canvas.width() <= max_width {
        return canvas;
    }

    let scaled_height = (u64::from(canvas.height()) * u64::from(max_width)
        / u64::from(canvas.width()))
    .max(1) as u32;
    imageops::resize(&canvas, max_width, scaled_height, FilterType::Triangle)
}
