//! Common types and traits for 3D geometry.
//!
//! The container frame used throughout the crate is:
//! - `x`: width
//! - `y`: height (vertical, the floor is `y = 0`)
//! - `z`: depth

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::geometry::overlap_1d;

/// Global numerical tolerance for floating-point comparisons.
///
/// Used for boundary, overlap and weight comparisons.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Tolerance for matching a resting face against a supporting top face.
pub const EPSILON_HEIGHT: f64 = 1e-3;

/// Represents a 3D vector or point in the container frame.
///
/// Used for positions, extents, and calculations in 3D space.
///
/// # Examples
/// ```
/// use load_planner::types::Vec3;
///
/// let position = Vec3::new(1.0, 2.0, 3.0);
/// let extents = Vec3::new(10.0, 20.0, 30.0);
/// let far_corner = position + extents;
/// assert_eq!(far_corner, Vec3::new(11.0, 22.0, 33.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Creates a new 3D vector.
    ///
    /// # Parameters
    /// * `x` - X component (width)
    /// * `y` - Y component (height)
    /// * `z` - Z component (depth)
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Creates a zero vector (origin).
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Converts to tuple format for API compatibility.
    #[inline]
    pub const fn as_tuple(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }

    /// Creates from tuple format.
    #[inline]
    pub const fn from_tuple(tuple: (f64, f64, f64)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }

    /// Calculates the volume (product of all components).
    #[inline]
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Calculates the footprint area (X × Z product), i.e. the face resting on the floor.
    #[inline]
    pub fn footprint_area(&self) -> f64 {
        self.x * self.z
    }

    /// Checks if the vector fits within another vector (component-wise <=).
    ///
    /// # Parameters
    /// * `container` - The outer vector (e.g., container extents)
    /// * `tolerance` - Numerical tolerance for the comparison
    #[inline]
    pub fn fits_within(&self, container: &Self, tolerance: f64) -> bool {
        self.x <= container.x + tolerance
            && self.y <= container.y + tolerance
            && self.z <= container.z + tolerance
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Trait for objects with 3D extents.
pub trait Dimensional {
    /// Returns the extents of the object.
    fn dimensions(&self) -> Vec3;

    /// Calculates the volume.
    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    /// Calculates the footprint area.
    fn footprint_area(&self) -> f64 {
        self.dimensions().footprint_area()
    }
}

/// Trait for objects with a position in 3D space.
pub trait Positioned {
    /// Returns the position (minimum corner).
    fn position(&self) -> Vec3;
}

/// Trait for objects with weight.
pub trait Weighted {
    /// Returns the weight in kg.
    fn weight(&self) -> f64;
}

/// Represents an Axis-Aligned Bounding Box (AABB).
///
/// Used for overlap tests, containment tests and support calculation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner (position)
    pub min: Vec3,
    /// Maximum corner (position + extents)
    pub max: Vec3,
}

impl BoundingBox {
    /// Creates a new bounding box.
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Creates a bounding box from position and extents.
    #[inline]
    pub fn from_position_and_dims(position: Vec3, dims: Vec3) -> Self {
        Self {
            min: position,
            max: position + dims,
        }
    }

    /// Checks if two bounding boxes overlap with positive volume.
    ///
    /// Separating axis test for AABBs. Boxes whose faces merely touch (or
    /// penetrate by less than `epsilon`) are treated as separated.
    #[inline]
    pub fn intersects(&self, other: &Self, epsilon: f64) -> bool {
        !(self.max.x <= other.min.x + epsilon
            || other.max.x <= self.min.x + epsilon
            || self.max.y <= other.min.y + epsilon
            || other.max.y <= self.min.y + epsilon
            || self.max.z <= other.min.z + epsilon
            || other.max.z <= self.min.z + epsilon)
    }

    /// Checks if `other` lies completely inside this box (within `epsilon`).
    #[inline]
    pub fn contains(&self, other: &Self, epsilon: f64) -> bool {
        other.min.x >= self.min.x - epsilon
            && other.min.y >= self.min.y - epsilon
            && other.min.z >= self.min.z - epsilon
            && other.max.x <= self.max.x + epsilon
            && other.max.y <= self.max.y + epsilon
            && other.max.z <= self.max.z + epsilon
    }

    /// Calculates the overlap area of the two footprints (XZ plane).
    #[inline]
    pub fn footprint_overlap(&self, other: &Self) -> f64 {
        let overlap_x = overlap_1d(self.min.x, self.max.x, other.min.x, other.max.x);
        let overlap_z = overlap_1d(self.min.z, self.max.z, other.min.z, other.max.z);
        overlap_x * overlap_z
    }

    /// Returns the top face height (Y maximum).
    #[inline]
    pub fn top_y(&self) -> f64 {
        self.max.y
    }

    /// Returns the center point.
    #[inline]
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// Returns the extents (width, height, depth).
    #[inline]
    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }

    /// Volume enclosed by the box.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    /// True when any extent is not larger than `epsilon`.
    #[inline]
    pub fn is_degenerate(&self, epsilon: f64) -> bool {
        let dims = self.dimensions();
        dims.x <= epsilon || dims.y <= epsilon || dims.z <= epsilon
    }
}

/// Validation helpers shared by the model types.
///
/// Every physical quantity must be a positive, finite number.
pub mod validation {
    /// Checks one quantity; `what` names it in the error message.
    pub fn validate_positive(value: f64, what: &str) -> Result<(), String> {
        if !value.is_finite() {
            return Err(format!("{} must be a finite number, got: {}", what, value));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", what, value));
        }
        Ok(())
    }

    pub fn validate_weight(value: f64) -> Result<(), String> {
        validate_positive(value, "Weight")
    }

    /// Checks (width, height, depth).
    pub fn validate_dimensions_3d(dims: (f64, f64, f64)) -> Result<(), String> {
        validate_positive(dims.0, "Width")?;
        validate_positive(dims.1, "Height")?;
        validate_positive(dims.2, "Depth")
    }
}

/// Center of mass calculation helper.
///
/// Accumulates weighted positions in the floor (XZ) plane.
#[derive(Clone, Debug, Default)]
pub struct CenterOfMassCalculator {
    weighted_x: f64,
    weighted_z: f64,
    total_weight: f64,
}

impl CenterOfMassCalculator {
    /// Creates a new calculator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a weighted point.
    pub fn add_point(&mut self, x: f64, z: f64, weight: f64) {
        self.weighted_x += x * weight;
        self.weighted_z += z * weight;
        self.total_weight += weight;
    }

    /// Calculates the center of mass.
    ///
    /// # Returns
    /// `Some((x, z))` for valid center of mass, `None` if no weight present
    pub fn compute(&self) -> Option<(f64, f64)> {
        if self.total_weight <= 0.0 {
            None
        } else {
            Some((
                self.weighted_x / self.total_weight,
                self.weighted_z / self.total_weight,
            ))
        }
    }

    /// Calculates the distance of the center of mass to a reference point.
    ///
    /// # Parameters
    /// * `reference` - The reference point (e.g., container floor center)
    pub fn distance_to(&self, reference: (f64, f64)) -> f64 {
        match self.compute() {
            Some((cx, cz)) => {
                let dx = cx - reference.0;
                let dz = cz - reference.1;
                (dx * dx + dz * dz).sqrt()
            }
            None => 0.0,
        }
    }
}
