//! Free-space bookkeeping for a packing session.
//!
//! The unoccupied volume of the container is kept as a set of pairwise
//! disjoint cuboids. Placing an item subtracts its box from every free space
//! it cuts into (guillotine split), so that at any time
//! `free volume + placed volume == container volume`.

use std::cmp::Ordering;

use crate::types::{BoundingBox, Vec3};

/// An axis-aligned, currently unoccupied sub-volume of the container.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FreeSpace {
    pub origin: Vec3,
    pub extents: Vec3,
    /// Creation sequence, last tie-breaker of the anchor order.
    seq: u64,
}

impl FreeSpace {
    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(self.origin, self.extents)
    }

    pub fn volume(&self) -> f64 {
        self.extents.volume()
    }
}

/// The set of free spaces of one session.
#[derive(Clone, Debug)]
pub struct SpaceModel {
    spaces: Vec<FreeSpace>,
    next_seq: u64,
    epsilon: f64,
}

impl SpaceModel {
    /// Starts with a single free space spanning the whole container.
    pub fn new(container_extents: Vec3, epsilon: f64) -> Self {
        let mut model = Self {
            spaces: Vec::new(),
            next_seq: 0,
            epsilon,
        };
        model.push(BoundingBox::from_position_and_dims(
            Vec3::zero(),
            container_extents,
        ));
        model
    }

    pub fn spaces(&self) -> &[FreeSpace] {
        &self.spaces
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    pub fn free_volume(&self) -> f64 {
        self.spaces.iter().map(FreeSpace::volume).sum()
    }

    /// Anchor candidates: the minimum corner of every free space.
    ///
    /// Ordered by height (y), then depth (z), then width (x), then creation
    /// sequence. Coordinates closer than the tolerance compare equal.
    pub fn anchors(&self) -> Vec<Vec3> {
        let mut ordered: Vec<&FreeSpace> = self.spaces.iter().collect();
        ordered.sort_by(|a, b| self.anchor_order(a, b));
        ordered.into_iter().map(|space| space.origin).collect()
    }

    fn anchor_order(&self, a: &FreeSpace, b: &FreeSpace) -> Ordering {
        let key = |s: &FreeSpace| {
            (
                snap(s.origin.y, self.epsilon),
                snap(s.origin.z, self.epsilon),
                snap(s.origin.x, self.epsilon),
            )
        };
        key(a).cmp(&key(b)).then_with(|| a.seq.cmp(&b.seq))
    }

    /// Removes `occupied` from the free volume.
    ///
    /// Every free space cut by the box is replaced by its disjoint residual
    /// pieces. For a box anchored at a free space's origin these are at most
    /// three: beyond the far x face, above the far y face and behind the far
    /// z face. Zero-volume residuals are dropped.
    pub fn occupy(&mut self, occupied: &BoundingBox) {
        let epsilon = self.epsilon;
        let (cut, kept): (Vec<FreeSpace>, Vec<FreeSpace>) = self
            .spaces
            .drain(..)
            .partition(|space| space.bounding_box().intersects(occupied, epsilon));
        self.spaces = kept;

        for space in cut {
            for residual in subtract(&space.bounding_box(), occupied) {
                self.push(residual);
            }
        }
    }

    fn push(&mut self, bounds: BoundingBox) {
        if bounds.is_degenerate(self.epsilon) {
            return;
        }
        self.spaces.push(FreeSpace {
            origin: bounds.min,
            extents: bounds.dimensions(),
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }
}

/// Quantizes a coordinate to the tolerance grid so that sorting stays a total order.
fn snap(value: f64, epsilon: f64) -> i64 {
    (value / epsilon).round() as i64
}

/// Splits `space \ cut` into up to six disjoint boxes.
///
/// Slabs are taken along x first, then y inside the x-range of the cut, then z
/// inside the x/y-range of the cut, so no two pieces share volume.
fn subtract(space: &BoundingBox, cut: &BoundingBox) -> Vec<BoundingBox> {
    let lo = Vec3::new(
        cut.min.x.max(space.min.x),
        cut.min.y.max(space.min.y),
        cut.min.z.max(space.min.z),
    );
    let hi = Vec3::new(
        cut.max.x.min(space.max.x),
        cut.max.y.min(space.max.y),
        cut.max.z.min(space.max.z),
    );

    let mut pieces = Vec::with_capacity(6);
    // x slabs span the full y/z range of the space
    pieces.push(BoundingBox::new(
        space.min,
        Vec3::new(lo.x, space.max.y, space.max.z),
    ));
    pieces.push(BoundingBox::new(
        Vec3::new(hi.x, space.min.y, space.min.z),
        space.max,
    ));
    // y slabs
    pieces.push(BoundingBox::new(
        Vec3::new(lo.x, space.min.y, space.min.z),
        Vec3::new(hi.x, lo.y, space.max.z),
    ));
    pieces.push(BoundingBox::new(
        Vec3::new(lo.x, hi.y, space.min.z),
        Vec3::new(hi.x, space.max.y, space.max.z),
    ));
    // z slabs
    pieces.push(BoundingBox::new(
        Vec3::new(lo.x, lo.y, space.min.z),
        Vec3::new(hi.x, hi.y, lo.z),
    ));
    pieces.push(BoundingBox::new(
        Vec3::new(lo.x, lo.y, hi.z),
        Vec3::new(hi.x, hi.y, space.max.z),
    ));

    pieces.retain(|piece| {
        let d = piece.dimensions();
        d.x > 0.0 && d.y > 0.0 && d.z > 0.0
    });
    pieces
}
