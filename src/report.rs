//! Aggregation of a finished packing session.
//!
//! `PlacementResult` owns the final placed and rejected lists and derives
//! everything a caller reports from them: utilization, per-type rejection
//! counts, serializable placement entries with legend colors, stability
//! diagnostics and a plain-text report.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::model::{ContainerSpec, PlacedItem};
use crate::optimizer::RejectedItem;
use crate::types::{CenterOfMassCalculator, Dimensional, EPSILON_HEIGHT, Positioned, Weighted};

/// Legend colors, assigned to item types in declaration order.
pub const PALETTE: [&str; 18] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FECA57", "#DDA0DD", "#FF9FF3", "#54A0FF",
    "#5F27CD", "#00D2D3", "#FF9F43", "#10AC84", "#EE5A24", "#A55EEA", "#26DE81", "#778CA3",
    "#F8B500", "#FC427B",
];

/// Color shared by every instance of the type at `type_index`.
pub fn color_for(type_index: usize) -> &'static str {
    PALETTE[type_index % PALETTE.len()]
}

/// One placed instance, flattened for output.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct PlacementEntry {
    pub label: String,
    pub name: String,
    pub type_index: usize,
    /// Orientation index 0..=5.
    pub orientation: usize,
    #[schema(value_type = [f64; 3], example = json!([0.0, 0.0, 0.0]))]
    pub pos: (f64, f64, f64),
    /// Extents after orientation.
    #[schema(value_type = [f64; 3], example = json!([1.2, 1.0, 1.0]))]
    pub dims: (f64, f64, f64),
    pub weight: f64,
    pub support_ratio: f64,
    pub color: String,
}

/// Number of rejected instances of one item type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct RejectedCount {
    pub name: String,
    pub count: usize,
}

/// Stability and balance figures of a load.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct LoadDiagnostics {
    /// Items not standing on the floor.
    pub elevated_items: usize,
    /// Lowest support ratio among elevated items (1.0 when none).
    pub min_support_ratio: f64,
    /// Mean support ratio over elevated items (1.0 when none).
    pub mean_support_ratio: f64,
    /// Weighted center of the load in the floor plane, if anything was placed.
    #[schema(value_type = Option<[f64; 2]>)]
    pub center_of_mass: Option<(f64, f64)>,
    /// Distance of the center of mass from the floor center.
    pub center_of_mass_offset: f64,
    /// Offset relative to half the floor diagonal.
    pub imbalance_ratio: f64,
}

/// Final outcome of one packing session.
#[derive(Clone, Debug)]
pub struct PlacementResult {
    pub container: ContainerSpec,
    /// Placed items in commit order.
    pub placed: Vec<PlacedItem>,
    /// Rejected instances in attempt order.
    pub rejected: Vec<RejectedItem>,
    pub placed_volume: f64,
    pub placed_weight: f64,
    /// Items whose bottom is at or below this height count as on the floor.
    pub height_epsilon: f64,
}

impl PlacementResult {
    pub fn new(
        container: ContainerSpec,
        placed: Vec<PlacedItem>,
        rejected: Vec<RejectedItem>,
    ) -> Self {
        let placed_volume = placed.iter().map(Dimensional::volume).sum();
        let placed_weight = placed.iter().map(Weighted::weight).sum();
        Self {
            container,
            placed,
            rejected,
            placed_volume,
            placed_weight,
            height_epsilon: EPSILON_HEIGHT,
        }
    }

    /// Uses the floor tolerance of the session that produced the result.
    pub fn with_height_epsilon(mut self, epsilon: f64) -> Self {
        self.height_epsilon = epsilon;
        self
    }

    /// Fraction of the container volume occupied by placed items.
    pub fn volume_utilization(&self) -> f64 {
        self.placed_volume / self.container.volume()
    }

    pub fn volume_utilization_percent(&self) -> f64 {
        self.volume_utilization() * 100.0
    }

    /// Fraction of the weight capacity used by placed items.
    pub fn weight_utilization(&self) -> f64 {
        self.placed_weight / self.container.max_weight
    }

    pub fn weight_utilization_percent(&self) -> f64 {
        self.weight_utilization() * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Rejected instance counts per item type, in declaration order.
    pub fn rejected_summary(&self) -> Vec<RejectedCount> {
        let mut counts: BTreeMap<usize, RejectedCount> = BTreeMap::new();
        for item in &self.rejected {
            counts
                .entry(item.instance.type_index)
                .or_insert_with(|| RejectedCount {
                    name: item.instance.name.clone(),
                    count: 0,
                })
                .count += 1;
        }
        counts.into_values().collect()
    }

    pub fn entries(&self) -> Vec<PlacementEntry> {
        self.placed
            .iter()
            .map(|p| PlacementEntry {
                label: p.instance.label(),
                name: p.instance.name.clone(),
                type_index: p.instance.type_index,
                orientation: p.orientation.index(),
                pos: p.position.as_tuple(),
                dims: p.extents.as_tuple(),
                weight: p.instance.weight,
                support_ratio: p.support_ratio,
                color: color_for(p.instance.type_index).to_string(),
            })
            .collect()
    }

    /// Color legend: (type name, color) for every type that appears in the result.
    pub fn color_legend(&self) -> Vec<(String, &'static str)> {
        let mut legend: BTreeMap<usize, String> = BTreeMap::new();
        let placed = self.placed.iter().map(|p| &p.instance);
        let rejected = self.rejected.iter().map(|r| &r.instance);
        for instance in placed.chain(rejected) {
            legend
                .entry(instance.type_index)
                .or_insert_with(|| instance.name.clone());
        }
        legend
            .into_iter()
            .map(|(idx, name)| (name, color_for(idx)))
            .collect()
    }

    pub fn diagnostics(&self) -> LoadDiagnostics {
        let elevated: Vec<f64> = self
            .placed
            .iter()
            .filter(|p| p.position().y > self.height_epsilon)
            .map(|p| p.support_ratio)
            .collect();

        let (min_support_ratio, mean_support_ratio) = if elevated.is_empty() {
            (1.0, 1.0)
        } else {
            (
                elevated.iter().copied().fold(f64::INFINITY, f64::min),
                elevated.iter().sum::<f64>() / elevated.len() as f64,
            )
        };

        let mut com = CenterOfMassCalculator::new();
        for p in &self.placed {
            let center = p.center();
            com.add_point(center.x, center.z, p.weight());
        }
        let floor_center = self.container.floor_center();
        let offset = com.distance_to(floor_center);
        let half_diagonal = (floor_center.0.powi(2) + floor_center.1.powi(2)).sqrt();

        LoadDiagnostics {
            elevated_items: elevated.len(),
            min_support_ratio,
            mean_support_ratio,
            center_of_mass: com.compute(),
            center_of_mass_offset: offset,
            imbalance_ratio: if half_diagonal > 0.0 {
                offset / half_diagonal
            } else {
                0.0
            },
        }
    }

    /// Human-readable report of the session.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let c = &self.container;

        let _ = writeln!(out, "===== Packing result =====");
        let _ = writeln!(
            out,
            "Container {}: width={}, height={}, depth={}, max_weight={}",
            c.name, c.width, c.height, c.depth, c.max_weight
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "Fitted items: {}", self.placed.len());
        let _ = writeln!(out, "Unfitted items: {}", self.rejected.len());
        let _ = writeln!(out);
        let _ = writeln!(out, "Load efficiency: {:.1}%", self.volume_utilization_percent());
        let _ = writeln!(out, "Weight used: {:.1}%", self.weight_utilization_percent());

        let _ = writeln!(out, "\n===== Color legend =====");
        for (name, color) in self.color_legend() {
            let _ = writeln!(out, "  {}: {}", name, color);
        }

        let _ = writeln!(out, "\n===== Placed items =====");
        for p in &self.placed {
            let (x, y, z) = p.position.as_tuple();
            let (w, h, d) = p.extents.as_tuple();
            let _ = writeln!(
                out,
                "  {}: position = ({:.3}, {:.3}, {:.3}), extents = ({:.3}, {:.3}, {:.3}), orientation = {}",
                p.instance.label(),
                x,
                y,
                z,
                w,
                h,
                d,
                p.orientation
            );
        }

        let _ = writeln!(out, "\n===== Unfitted items =====");
        if self.rejected.is_empty() {
            let _ = writeln!(out, "  All items were loaded");
        } else {
            for entry in self.rejected_summary() {
                let _ = writeln!(out, "  {}: {}", entry.name, entry.count);
            }
            let _ = writeln!(out, "\nDetails:");
            for r in &self.rejected {
                let _ = writeln!(out, "  {}: {}", r.instance.label(), r.reason.code());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Orientation;
    use crate::model::{ItemInstance, ItemType};
    use crate::optimizer::UnplacedReason;
    use crate::types::Vec3;

    fn instances(name: &str, type_index: usize, count: u32) -> Vec<ItemInstance> {
        ItemType::new(name, (1.0, 1.0, 1.0), 10.0, count)
            .unwrap()
            .instances(type_index)
            .collect()
    }

    fn placed(instance: ItemInstance, pos: (f64, f64, f64), support: f64) -> PlacedItem {
        PlacedItem::new(instance, Orientation::Whd, Vec3::from_tuple(pos), support)
    }

    fn sample() -> PlacementResult {
        let container = ContainerSpec::new("c", (2.0, 2.0, 2.0), 100.0).unwrap();
        let mut a = instances("a", 0, 2).into_iter();
        let b = instances("b", 1, 3);
        let placed_items = vec![
            placed(a.next().unwrap(), (0.0, 0.0, 0.0), 1.0),
            placed(a.next().unwrap(), (0.0, 1.0, 0.0), 0.8),
        ];
        let rejected = b
            .into_iter()
            .map(|instance| RejectedItem {
                instance,
                reason: UnplacedReason::NoStablePosition,
            })
            .collect();
        PlacementResult::new(container, placed_items, rejected)
    }

    #[test]
    fn utilization_is_derived_from_placed_items() {
        let result = sample();
        assert!((result.volume_utilization() - 0.25).abs() < 1e-9);
        assert!((result.weight_utilization_percent() - 20.0).abs() < 1e-9);
        assert!(!result.is_complete());
    }

    #[test]
    fn rejected_summary_groups_by_type() {
        let result = sample();
        assert_eq!(
            result.rejected_summary(),
            vec![RejectedCount {
                name: "b".to_string(),
                count: 3
            }]
        );
    }

    #[test]
    fn entries_share_color_per_type() {
        let result = sample();
        let entries = result.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.color == PALETTE[0]));
        assert_eq!(entries[1].label, "a_1");
        assert_eq!(color_for(19), PALETTE[1]);
        assert_eq!(
            result.color_legend(),
            vec![("a".to_string(), PALETTE[0]), ("b".to_string(), PALETTE[1])]
        );
    }

    #[test]
    fn diagnostics_report_support_and_balance() {
        let diag = sample().diagnostics();
        assert_eq!(diag.elevated_items, 1);
        assert!((diag.min_support_ratio - 0.8).abs() < 1e-9);
        assert!((diag.mean_support_ratio - 0.8).abs() < 1e-9);

        // Both boxes are centered at (0.5, 0.5); the floor center is (1.0, 1.0).
        let (cx, cz) = diag.center_of_mass.unwrap();
        assert!((cx - 0.5).abs() < 1e-9 && (cz - 0.5).abs() < 1e-9);
        assert!((diag.center_of_mass_offset - 0.5_f64.sqrt()).abs() < 1e-9);
        assert!((diag.imbalance_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn items_within_floor_tolerance_are_not_elevated() {
        let container = ContainerSpec::new("c", (2.0, 2.0, 2.0), 100.0).unwrap();
        let mut a = instances("a", 0, 2).into_iter();
        let placed_items = vec![
            placed(a.next().unwrap(), (0.0, 5e-4, 0.0), 1.0),
            placed(a.next().unwrap(), (1.0, 0.0, 0.0), 1.0),
        ];
        let result = PlacementResult::new(container, placed_items, Vec::new());

        assert_eq!(result.diagnostics().elevated_items, 0);
        assert_eq!(
            result
                .clone()
                .with_height_epsilon(1e-4)
                .diagnostics()
                .elevated_items,
            1
        );
    }

    #[test]
    fn empty_result_has_neutral_diagnostics() {
        let container = ContainerSpec::default();
        let result = PlacementResult::new(container, Vec::new(), Vec::new());
        let diag = result.diagnostics();

        assert!(result.is_complete());
        assert_eq!(result.volume_utilization(), 0.0);
        assert_eq!(diag.center_of_mass, None);
        assert_eq!(diag.min_support_ratio, 1.0);
    }

    #[test]
    fn text_report_lists_counts_and_rejections() {
        let text = sample().render_text();
        assert!(text.contains("Fitted items: 2"));
        assert!(text.contains("Unfitted items: 3"));
        assert!(text.contains("Load efficiency: 25.0%"));
        assert!(text.contains("  b: 3"));
        assert!(text.contains("b_2: no_stable_position"));
    }
}
