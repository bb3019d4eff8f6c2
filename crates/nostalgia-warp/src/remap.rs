//! Bilinear resampling through a displacement field.

use image::{Rgb, RgbImage};

use crate::{DisplacementField, Result, WarpError};

/// Resamples `src` through `field` with bilinear interpolation.
///
/// Each destination pixel `(x, y)` takes the colour at
/// [`DisplacementField::source_coords`]; sampling near the border replicates
/// edge pixels and never reads outside the image.
///
/// # Errors
///
/// Returns [`WarpError::FieldSizeMismatch`] if the field and image differ in size.
pub fn remap_bilinear(src: &RgbImage, field: &DisplacementField) -> Result<RgbImage> {
    let (width, height) = src.dimensions();
    if field.width() != width || field.height() != height {
        return Err(WarpError::FieldSizeMismatch {
            field_width: field.width(),
            field_height: field.height(),
            image_width: width,
            image_height: height,
        });
    }

    Ok(RgbImage::from_fn(width, height, |x, y| {
        let (sx, sy) = field.source_coords(x, y);
        sample_bilinear(src, sx, sy)
    }))
}

/// Samples `src` at a fractional coordinate already clamped to the image.
fn sample_bilinear(src: &RgbImage, sx: f32, sy: f32) -> Rgb<u8> {
    let (width, height) = src.dimensions();
    let x0 = (sx.floor() as u32).min(width - 1);
    let y0 = (sy.floor() as u32).min(height - 1);
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;

    let p00 = src.get_pixel(x0, y0).0;
    let p10 = src.get_pixel(x1, y0).0;
    let p01 = src.get_pixel(x0, y1).0;
    let p11 = src.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let top = lerp(f32::from(p00[c]), f32::from(p10[c]), fx);
        let bottom = lerp(f32::from(p01[c]), f32::from(p11[c]), fx);
        *value = lerp(top, bottom, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    (b - a).mul_add(t, a)
}
