//! Landmark-driven geometric smile.
//!
//! The mouth corners are lifted and pushed outward, and the upper lip is
//! raised along a curve that is strongest near the corners and weakest at the
//! centre of the mouth.

use image::RgbImage;

use crate::landmarks::{LEFT_MOUTH_CORNER, RIGHT_MOUTH_CORNER, UPPER_LIP_KEY_POINTS};
use crate::{remap_bilinear, DisplacementField, LandmarkSet, Result, SmileWarpParams, WarpError};

/// Upper-lip contributions are narrower than the corners.
const LIP_RADIUS_SCALE: f32 = 0.7;

/// Upper-lip lift relative to the corner lift.
const LIP_LIFT_SCALE: f32 = 0.25;

/// Lift kept at the very centre of the mouth.
const CURVE_FLOOR: f32 = 0.25;

/// Builds the smile displacement field for an image of the given size.
///
/// # Errors
///
/// Returns [`WarpError::EmptyLandmarks`] for an empty set and
/// [`WarpError::LandmarkOutOfRange`] if a mouth index is missing.
pub fn smile_field(
    landmarks: &LandmarkSet,
    params: &SmileWarpParams,
    width: u32,
    height: u32,
) -> Result<DisplacementField> {
    if landmarks.is_empty() {
        return Err(WarpError::EmptyLandmarks);
    }

    let left = landmarks.point(LEFT_MOUTH_CORNER)?;
    let right = landmarks.point(RIGHT_MOUTH_CORNER)?;
    let lip = UPPER_LIP_KEY_POINTS
        .iter()
        .map(|&index| landmarks.point(index))
        .collect::<Result<Vec<_>>>()?;

    let mouth_width = left.distance(&right);
    let lift = mouth_width * params.lift_factor;
    let spread = mouth_width * params.spread_factor;
    let center_x = (left.x + right.x) as f32 / 2.0;
    let half_width = mouth_width / 2.0;

    let mut field = DisplacementField::zeros(width, height);

    for corner in [left, right] {
        let (x, y) = corner.as_point();
        // Sample from the inner side so the corner content moves outward.
        let outward = (x - center_x).signum();
        field.add_gaussian((x, y), (-outward * spread, lift), params.radius);
    }

    let lip_radius = params.radius * LIP_RADIUS_SCALE;
    for point in lip {
        let (x, y) = point.as_point();
        let curve = curve_factor(x, center_x, half_width);
        field.add_gaussian((x, y), (0.0, lift * LIP_LIFT_SCALE * curve), lip_radius);
    }

    Ok(field)
}

/// Scales lip lift from [`CURVE_FLOOR`] at the centre up to 1 at the corners.
fn curve_factor(x: f32, center_x: f32, half_width: f32) -> f32 {
    if half_width <= 0.0 {
        return 1.0;
    }
    let t = ((x - center_x).abs() / half_width).min(1.0);
    (1.0 - CURVE_FLOOR).mul_add(t, CURVE_FLOOR)
}

/// Applies the geometric smile to `image`.
///
/// Deterministic: the same image, landmarks and parameters always give the
/// same output.
///
/// # Errors
///
/// Fails only when the landmark set is empty or lacks a mouth index.
pub fn warp_smile(
    image: &RgbImage,
    landmarks: &LandmarkSet,
    params: &SmileWarpParams,
) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    let field = smile_field(landmarks, params, width, height)?;
    remap_bilinear(image, &field)
}
