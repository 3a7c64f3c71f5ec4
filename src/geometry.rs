//! Geometric helpers for orientations, overlap tests and containment.
//!
//! Items are rotated only in 90° steps, so every orientation is a permutation
//! of the item's (width, height, depth) onto the container's (x, y, z) axes.

use serde::{Deserialize, Serialize};

use crate::model::PlacedItem;
use crate::types::{BoundingBox, Vec3};

/// One of the six axis-aligned orientations of an item.
///
/// The discriminant is the orientation index reported in placement results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Orientation {
    /// (w, h, d)
    Whd = 0,
    /// (h, w, d)
    Hwd = 1,
    /// (h, d, w)
    Hdw = 2,
    /// (d, h, w)
    Dhw = 3,
    /// (d, w, h)
    Dwh = 4,
    /// (w, d, h)
    Wdh = 5,
}

impl Orientation {
    /// All orientations in trial order.
    pub const ALL: [Orientation; 6] = [
        Orientation::Whd,
        Orientation::Hwd,
        Orientation::Hdw,
        Orientation::Dhw,
        Orientation::Dwh,
        Orientation::Wdh,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Short code naming which item extent lands on x, y and z.
    pub fn code(self) -> &'static str {
        match self {
            Orientation::Whd => "WHD",
            Orientation::Hwd => "HWD",
            Orientation::Hdw => "HDW",
            Orientation::Dhw => "DHW",
            Orientation::Dwh => "DWH",
            Orientation::Wdh => "WDH",
        }
    }

    /// Maps an item's declared (width, height, depth) onto the container axes.
    ///
    /// # Example
    /// ```
    /// use load_planner::geometry::Orientation;
    /// use load_planner::types::Vec3;
    ///
    /// let extents = Vec3::new(1.0, 2.0, 3.0);
    /// assert_eq!(Orientation::Dwh.apply(extents), Vec3::new(3.0, 1.0, 2.0));
    /// ```
    pub fn apply(self, extents: Vec3) -> Vec3 {
        let Vec3 { x: w, y: h, z: d } = extents;
        match self {
            Orientation::Whd => Vec3::new(w, h, d),
            Orientation::Hwd => Vec3::new(h, w, d),
            Orientation::Hdw => Vec3::new(h, d, w),
            Orientation::Dhw => Vec3::new(d, h, w),
            Orientation::Dwh => Vec3::new(d, w, h),
            Orientation::Wdh => Vec3::new(w, d, h),
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.index(), self.code())
    }
}

/// Length of the overlap of two intervals, never negative.
///
/// # Example
/// ```
/// use load_planner::geometry::overlap_1d;
///
/// assert_eq!(overlap_1d(0.0, 5.0, 3.0, 8.0), 2.0);
/// assert_eq!(overlap_1d(0.0, 1.0, 2.0, 3.0), 0.0);
/// ```
pub fn overlap_1d(a1: f64, a2: f64, b1: f64, b2: f64) -> f64 {
    (a2.min(b2) - a1.max(b1)).max(0.0)
}

/// Checks whether two placed items occupy a common volume.
pub fn intersects(a: &PlacedItem, b: &PlacedItem, epsilon: f64) -> bool {
    a.bounding_box().intersects(&b.bounding_box(), epsilon)
}

/// Checks whether a box at `position` with `extents` lies inside `[0, bounds]` on all axes.
pub fn within_container(position: Vec3, extents: Vec3, bounds: Vec3, epsilon: f64) -> bool {
    let container = BoundingBox::from_position_and_dims(Vec3::zero(), bounds);
    container.contains(
        &BoundingBox::from_position_and_dims(position, extents),
        epsilon,
    )
}
