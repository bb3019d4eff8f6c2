//! Face-mesh landmark sets.
//!
//! Landmarks follow the 468-point face-mesh topology (478 with refined
//! irises). Only a handful of mouth indices are read by the smile warp, but a
//! set is always either empty or complete: partial sets are rejected.

use crate::{Result, WarpError};

/// Number of points in the base face mesh.
pub const MESH_POINTS: usize = 468;

/// Number of points in the face mesh with refined iris landmarks.
pub const MESH_POINTS_REFINED: usize = 478;

/// Mouth corner on the image-left side of an upright face.
pub const LEFT_MOUTH_CORNER: usize = 61;

/// Mouth corner on the image-right side of an upright face.
pub const RIGHT_MOUTH_CORNER: usize = 291;

/// Upper-lip contour points, left to right, including the midline (0).
pub const UPPER_LIP_KEY_POINTS: [usize; 7] = [185, 40, 37, 0, 267, 270, 409];

/// A single landmark in pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Landmark {
    /// Horizontal pixel coordinate.
    pub x: i32,
    /// Vertical pixel coordinate.
    pub y: i32,
}

impl Landmark {
    /// Creates a landmark at the given pixel coordinates.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another landmark.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        let dx = (other.x - self.x) as f32;
        let dy = (other.y - self.y) as f32;
        dx.hypot(dy)
    }

    /// The landmark as floating point coordinates.
    #[must_use]
    pub fn as_point(&self) -> (f32, f32) {
        (self.x as f32, self.y as f32)
    }
}

/// An ordered, index-addressed set of face landmarks.
///
/// # Examples
///
/// ```
/// use nostalgia_warp::{Landmark, LandmarkSet, MESH_POINTS};
///
/// assert!(LandmarkSet::empty().is_empty());
///
/// let full = LandmarkSet::from_points(vec![Landmark::default(); MESH_POINTS]).unwrap();
/// assert_eq!(full.len(), MESH_POINTS);
///
/// assert!(LandmarkSet::from_points(vec![Landmark::default(); 5]).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    /// The empty set, meaning no face was detected.
    #[must_use]
    pub const fn empty() -> Self {
        Self { points: Vec::new() }
    }

    /// Builds a set from pixel coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`WarpError::PartialLandmarks`] unless the input is empty or has
    /// exactly [`MESH_POINTS`] or [`MESH_POINTS_REFINED`] points.
    pub fn from_points(points: Vec<Landmark>) -> Result<Self> {
        match points.len() {
            0 | MESH_POINTS | MESH_POINTS_REFINED => Ok(Self { points }),
            count => Err(WarpError::PartialLandmarks { count }),
        }
    }

    /// Builds a set from normalized `[0, 1]` coordinates, scaling to pixels.
    ///
    /// Coordinates are truncated toward zero after scaling.
    ///
    /// # Errors
    ///
    /// Returns [`WarpError::PartialLandmarks`] for a partial mesh.
    pub fn from_normalized(points: &[[f32; 2]], width: u32, height: u32) -> Result<Self> {
        let (w, h) = (width as f32, height as f32);
        let scaled = points
            .iter()
            .map(|[nx, ny]| Landmark::new((nx * w) as i32, (ny * h) as i32))
            .collect();
        Self::from_points(scaled)
    }

    /// Returns `true` if no face was detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of landmarks in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// All landmarks in mesh order.
    #[must_use]
    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    /// Looks up a landmark by mesh index.
    ///
    /// # Errors
    ///
    /// Returns [`WarpError::LandmarkOutOfRange`] if the index is not in the set.
    pub fn point(&self, index: usize) -> Result<Landmark> {
        self.points
            .get(index)
            .copied()
            .ok_or(WarpError::LandmarkOutOfRange {
                index,
                len: self.points.len(),
            })
    }
}
