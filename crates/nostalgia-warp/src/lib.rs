//! Nostalgia image processing
//!
//! Pure, synchronous image transforms used by the Nostalgia service:
//!
//! - [`LandmarkSet`] - face-mesh keypoints in pixel coordinates
//! - [`DisplacementField`] - per-pixel source offsets built from Gaussian contributions
//! - [`warp_smile`] - the landmark-driven geometric smile
//! - [`enhance`] - sharpness enhancement and the mirrored placeholder animation
//! - [`codec`] - decoding uploads and encoding results
//!
//! # Example
//!
//! ```rust
//! use image::RgbImage;
//! use nostalgia_warp::{warp_smile, Landmark, LandmarkSet, SmileWarpParams, MESH_POINTS};
//! use nostalgia_warp::landmarks::{LEFT_MOUTH_CORNER, RIGHT_MOUTH_CORNER};
//!
//! let image = RgbImage::new(64, 64);
//! let mut points = vec![Landmark::new(32, 32); MESH_POINTS];
//! points[LEFT_MOUTH_CORNER] = Landmark::new(22, 44);
//! points[RIGHT_MOUTH_CORNER] = Landmark::new(42, 44);
//! let landmarks = LandmarkSet::from_points(points).unwrap();
//!
//! let warped = warp_smile(&image, &landmarks, &SmileWarpParams::default()).unwrap();
//! assert_eq!(warped.dimensions(), (64, 64));
//! ```

pub mod codec;
pub mod enhance;
pub mod field;
pub mod landmarks;
mod remap;
mod smile;

pub use field::{DisplacementField, SmileWarpParams};
pub use landmarks::{Landmark, LandmarkSet, MESH_POINTS, MESH_POINTS_REFINED};
pub use remap::remap_bilinear;
pub use smile::{smile_field, warp_smile};

use thiserror::Error;

/// Errors that can occur while warping or encoding images.
#[derive(Debug, Error)]
pub enum WarpError {
    /// A landmark index is outside the detector's mesh.
    #[error("landmark index {index} is out of range for a {len}-point mesh")]
    LandmarkOutOfRange {
        /// The requested landmark index.
        index: usize,
        /// Number of landmarks in the set.
        len: usize,
    },

    /// The landmark set is empty (no face was detected).
    #[error("no landmarks to warp from")]
    EmptyLandmarks,

    /// The landmark set does not have the mesh cardinality.
    #[error("partial landmark set with {count} points (expected {MESH_POINTS} or {MESH_POINTS_REFINED})")]
    PartialLandmarks {
        /// Number of points supplied.
        count: usize,
    },

    /// The displacement field does not cover the image.
    #[error("displacement field is {field_width}x{field_height} but image is {image_width}x{image_height}")]
    FieldSizeMismatch {
        /// Field width in pixels.
        field_width: u32,
        /// Field height in pixels.
        field_height: u32,
        /// Image width in pixels.
        image_width: u32,
        /// Image height in pixels.
        image_height: u32,
    },

    /// Decoding or encoding failed.
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
}

/// Result type for warp operations.
pub type Result<T> = std::result::Result<T, WarpError>;
