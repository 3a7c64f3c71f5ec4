//! Admissibility checks for a single candidate placement.
//!
//! A candidate is an (instance, orientation, anchor) triple. It is admissible
//! when it passes, in this order:
//! 1. boundary: the oriented box lies inside the container
//! 2. overlap: it shares no volume with an already placed item
//! 3. weight: the running load plus the instance stays within capacity
//! 4. support: above the floor, enough of its footprint rests on top faces
//!
//! All checks are pure; the evaluator only borrows session state.

use crate::geometry::{Orientation, within_container};
use crate::model::{ContainerSpec, ItemInstance, PlacedItem};
use crate::optimizer::PackingConfig;
use crate::types::{BoundingBox, Vec3};

/// The first check a candidate failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    OutOfBounds,
    Overlap,
    OverWeight,
    InsufficientSupport,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::OutOfBounds => "out_of_bounds",
            Rejection::Overlap => "overlap",
            Rejection::OverWeight => "over_weight",
            Rejection::InsufficientSupport => "insufficient_support",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Read-only view over a session used to judge candidates.
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    container: &'a ContainerSpec,
    placed: &'a [PlacedItem],
    config: &'a PackingConfig,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        container: &'a ContainerSpec,
        placed: &'a [PlacedItem],
        config: &'a PackingConfig,
    ) -> Self {
        Self {
            container,
            placed,
            config,
        }
    }

    /// Runs all checks for one candidate.
    ///
    /// # Returns
    /// `Ok(support_ratio)` when admissible, otherwise the first failing check.
    pub fn check(
        &self,
        instance: &ItemInstance,
        orientation: Orientation,
        anchor: Vec3,
        running_weight: f64,
    ) -> Result<f64, Rejection> {
        let extents = orientation.apply(instance.extents);

        if !within_container(
            anchor,
            extents,
            self.container.extents(),
            self.config.general_epsilon,
        ) {
            return Err(Rejection::OutOfBounds);
        }

        let candidate = BoundingBox::from_position_and_dims(anchor, extents);
        if self.collides(&candidate) {
            return Err(Rejection::Overlap);
        }

        if !self.weight_allows(instance.weight, running_weight) {
            return Err(Rejection::OverWeight);
        }

        let support = self.support_ratio(&candidate);
        if support + self.config.general_epsilon < self.config.support_ratio {
            return Err(Rejection::InsufficientSupport);
        }

        Ok(support)
    }

    /// True when the oriented extents fit the empty container at all.
    pub fn fits_container(&self, extents: Vec3) -> bool {
        extents.fits_within(&self.container.extents(), self.config.general_epsilon)
    }

    pub fn collides(&self, candidate: &BoundingBox) -> bool {
        self.placed.iter().any(|p| {
            p.bounding_box()
                .intersects(candidate, self.config.general_epsilon)
        })
    }

    pub fn weight_allows(&self, weight: f64, running_weight: f64) -> bool {
        running_weight + weight <= self.container.max_weight + self.config.general_epsilon
    }

    /// Fraction of the candidate's footprint backed by the floor or by top faces below.
    ///
    /// Items on the floor are fully supported. Above the floor only placed
    /// items whose top face is level with the candidate's bottom face count.
    pub fn support_ratio(&self, candidate: &BoundingBox) -> f64 {
        if candidate.min.y <= self.config.height_epsilon {
            return 1.0;
        }

        let base_area = candidate.dimensions().footprint_area();
        if base_area <= self.config.general_epsilon {
            return 0.0;
        }

        let supported: f64 = self
            .placed
            .iter()
            .map(PlacedItem::bounding_box)
            .filter(|below| (below.top_y() - candidate.min.y).abs() <= self.config.height_epsilon)
            .map(|below| below.footprint_overlap(candidate))
            .sum();

        (supported / base_area).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemType;

    fn instance(dims: (f64, f64, f64), weight: f64) -> ItemInstance {
        ItemType::new("sample", dims, weight, 1)
            .unwrap()
            .instances(0)
            .next()
            .unwrap()
    }

    fn placed_at(dims: (f64, f64, f64), pos: (f64, f64, f64)) -> PlacedItem {
        PlacedItem::new(
            instance(dims, 1.0),
            Orientation::Whd,
            Vec3::from_tuple(pos),
            1.0,
        )
    }

    #[test]
    fn rejects_box_outside_container() {
        let container = ContainerSpec::new("c", (1.0, 1.0, 1.0), 100.0).unwrap();
        let config = PackingConfig::default();
        let eval = Evaluator::new(&container, &[], &config);

        let result = eval.check(&instance((2.0, 2.0, 2.0), 10.0), Orientation::Whd, Vec3::zero(), 0.0);
        assert_eq!(result, Err(Rejection::OutOfBounds));
        assert!(!eval.fits_container(Vec3::new(2.0, 2.0, 2.0)));
    }

    #[test]
    fn rejects_overlap_but_accepts_touching() {
        let container = ContainerSpec::new("c", (2.0, 2.0, 2.0), 100.0).unwrap();
        let config = PackingConfig::default();
        let placed = vec![placed_at((1.0, 1.0, 1.0), (0.0, 0.0, 0.0))];
        let eval = Evaluator::new(&container, &placed, &config);
        let cube = instance((1.0, 1.0, 1.0), 1.0);

        assert_eq!(
            eval.check(&cube, Orientation::Whd, Vec3::new(0.5, 0.0, 0.0), 1.0),
            Err(Rejection::Overlap)
        );
        assert_eq!(
            eval.check(&cube, Orientation::Whd, Vec3::new(1.0, 0.0, 0.0), 1.0),
            Ok(1.0)
        );
    }

    #[test]
    fn rejects_when_weight_budget_exceeded() {
        let container = ContainerSpec::new("c", (2.0, 2.0, 2.0), 10.0).unwrap();
        let config = PackingConfig::default();
        let placed = vec![placed_at((1.0, 1.0, 1.0), (0.0, 0.0, 0.0))];
        let eval = Evaluator::new(&container, &placed, &config);

        assert_eq!(
            eval.check(&instance((1.0, 1.0, 1.0), 6.0), Orientation::Whd, Vec3::new(1.0, 0.0, 0.0), 6.0),
            Err(Rejection::OverWeight)
        );
        // Filling the budget exactly is allowed.
        assert!(eval.weight_allows(4.0, 6.0));
    }

    #[test]
    fn rejects_poorly_supported_overhang() {
        let container = ContainerSpec::new("c", (2.0, 2.0, 2.0), 100.0).unwrap();
        let config = PackingConfig::default();
        let placed = vec![placed_at((1.0, 1.0, 1.0), (0.0, 0.0, 0.0))];
        let eval = Evaluator::new(&container, &placed, &config);

        // 2 x 2 footprint resting on a 1 x 1 top face: 25% support.
        let slab = instance((2.0, 1.0, 2.0), 1.0);
        assert_eq!(
            eval.check(&slab, Orientation::Whd, Vec3::new(0.0, 1.0, 0.0), 1.0),
            Err(Rejection::InsufficientSupport)
        );

        // Fully on top of the lower box.
        let cube = instance((1.0, 1.0, 1.0), 1.0);
        assert_eq!(
            eval.check(&cube, Orientation::Whd, Vec3::new(0.0, 1.0, 0.0), 1.0),
            Ok(1.0)
        );
    }

    #[test]
    fn support_ignores_faces_at_other_heights() {
        let container = ContainerSpec::new("c", (2.0, 3.0, 2.0), 100.0).unwrap();
        let config = PackingConfig::default();
        let placed = vec![placed_at((1.0, 1.0, 1.0), (0.0, 0.0, 0.0))];
        let eval = Evaluator::new(&container, &placed, &config);

        let floating = BoundingBox::from_position_and_dims(
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
        );
        assert_eq!(eval.support_ratio(&floating), 0.0);
    }

    #[test]
    fn configured_ratio_controls_acceptance() {
        let container = ContainerSpec::new("c", (2.0, 2.0, 2.0), 100.0).unwrap();
        let config = PackingConfig::builder().support_ratio(0.5).build();
        let placed = vec![placed_at((1.0, 1.0, 2.0), (0.0, 0.0, 0.0))];
        let eval = Evaluator::new(&container, &placed, &config);

        // Half of a 2 x 2 footprint is supported.
        let slab = instance((2.0, 1.0, 2.0), 1.0);
        let ratio = eval
            .check(&slab, Orientation::Whd, Vec3::new(0.0, 1.0, 0.0), 1.0)
            .expect("50% support satisfies a 0.5 threshold");
        assert!((ratio - 0.5).abs() < 1e-9);
    }
}
