//! Placement engine for loading one container.
//!
//! Implements a deterministic first-fit heuristic:
//! - items are expanded into instances and ordered by volume, then weight
//!   (largest and heaviest first), then declaration order
//! - each instance tries its orientations, and for each orientation the
//!   anchors of the free-space model in priority order
//! - the first admissible candidate is committed; otherwise the instance is
//!   rejected for good
//!
//! There is no backtracking: placed and rejected instances are terminal.

use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::evaluator::Evaluator;
use crate::geometry::{Orientation, within_container};
use crate::model::{ContainerSpec, ItemInstance, ItemType, PlacedItem, ValidationError};
use crate::report::PlacementResult;
use crate::space::SpaceModel;
use crate::types::{EPSILON_GENERAL, EPSILON_HEIGHT, Vec3};

/// Configuration for the packing algorithm.
///
/// Holds all tolerances and limits steering the placement behaviour.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PackingConfig {
    /// Minimum fraction of an elevated item's footprint that must rest on items below (0.0 to 1.0)
    pub support_ratio: f64,
    /// Tolerance for boundary, overlap and weight comparisons
    pub general_epsilon: f64,
    /// Tolerance for matching a bottom face against a top face
    pub height_epsilon: f64,
    /// Whether all six orientations are tried or only the declared one
    pub allow_item_rotation: bool,
    /// Scan the orientation x anchor candidates on the rayon pool
    pub parallel_search: bool,
    /// Wall-clock budget after which remaining instances are no longer attempted
    pub time_budget: Option<Duration>,
    /// Upper bound on the number of instances (sum of quantities) in one run
    pub max_instances: u64,
}

impl PackingConfig {
    pub const DEFAULT_SUPPORT_RATIO: f64 = 0.7;
    pub const DEFAULT_GENERAL_EPSILON: f64 = EPSILON_GENERAL;
    pub const DEFAULT_HEIGHT_EPSILON: f64 = EPSILON_HEIGHT;
    pub const DEFAULT_ALLOW_ITEM_ROTATION: bool = true;
    pub const DEFAULT_PARALLEL_SEARCH: bool = false;
    pub const DEFAULT_MAX_INSTANCES: u64 = 100_000;

    /// Creates a builder for a custom configuration.
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.support_ratio) {
            return Err(ValidationError::InvalidConfiguration(format!(
                "support ratio must be between 0 and 1, got: {}",
                self.support_ratio
            )));
        }
        for (name, value) in [
            ("general epsilon", self.general_epsilon),
            ("height epsilon", self.height_epsilon),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ValidationError::InvalidConfiguration(format!(
                    "{} must be positive, got: {}",
                    name, value
                )));
            }
        }
        if self.max_instances == 0 {
            return Err(ValidationError::InvalidConfiguration(
                "instance limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn orientations(&self) -> &'static [Orientation] {
        if self.allow_item_rotation {
            &Orientation::ALL
        } else {
            &[Orientation::Whd]
        }
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            support_ratio: Self::DEFAULT_SUPPORT_RATIO,
            general_epsilon: Self::DEFAULT_GENERAL_EPSILON,
            height_epsilon: Self::DEFAULT_HEIGHT_EPSILON,
            allow_item_rotation: Self::DEFAULT_ALLOW_ITEM_ROTATION,
            parallel_search: Self::DEFAULT_PARALLEL_SEARCH,
            time_budget: None,
            max_instances: Self::DEFAULT_MAX_INSTANCES,
        }
    }
}

/// Builder for PackingConfig.
#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    /// Sets the minimum support ratio.
    pub fn support_ratio(mut self, ratio: f64) -> Self {
        self.config.support_ratio = ratio;
        self
    }

    /// Sets the general tolerance.
    pub fn general_epsilon(mut self, epsilon: f64) -> Self {
        self.config.general_epsilon = epsilon;
        self
    }

    /// Sets the height tolerance.
    pub fn height_epsilon(mut self, epsilon: f64) -> Self {
        self.config.height_epsilon = epsilon;
        self
    }

    /// Enables or disables item rotation.
    pub fn allow_item_rotation(mut self, allow: bool) -> Self {
        self.config.allow_item_rotation = allow;
        self
    }

    /// Enables the parallel candidate scan.
    pub fn parallel_search(mut self, parallel: bool) -> Self {
        self.config.parallel_search = parallel;
        self
    }

    /// Sets the wall-clock budget of a run.
    pub fn time_budget(mut self, budget: Option<Duration>) -> Self {
        self.config.time_budget = budget;
        self
    }

    /// Sets the largest number of instances a run accepts.
    pub fn max_instances(mut self, limit: u64) -> Self {
        self.config.max_instances = limit;
        self
    }

    /// Builds the final configuration.
    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Errors that abort a packing run.
#[derive(Debug, Error)]
pub enum PackingError {
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),

    #[error("No items to pack")]
    NoItems,

    #[error("Too many instances: {requested} requested, at most {limit} allowed")]
    TooManyInstances { requested: u64, limit: u64 },

    /// A candidate that breaks the no-overlap, boundary or weight invariant
    /// reached the commit step.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// An instance that could not be placed.
#[derive(Clone, Debug, PartialEq)]
pub struct RejectedItem {
    pub instance: ItemInstance,
    pub reason: UnplacedReason,
}

/// Reasons why an instance could not be placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnplacedReason {
    TooHeavyForContainer,
    DimensionsExceedContainer,
    NoStablePosition,
    BudgetExhausted,
}

impl UnplacedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::TooHeavyForContainer => "too_heavy_for_container",
            UnplacedReason::DimensionsExceedContainer => "dimensions_exceed_container",
            UnplacedReason::NoStablePosition => "no_stable_position",
            UnplacedReason::BudgetExhausted => "budget_exhausted",
        }
    }
}

impl std::fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnplacedReason::TooHeavyForContainer => {
                write!(f, "Item would exceed the remaining weight capacity")
            }
            UnplacedReason::DimensionsExceedContainer => {
                write!(f, "Item exceeds the container in every allowed orientation")
            }
            UnplacedReason::NoStablePosition => {
                write!(f, "No free and stable position found inside the container")
            }
            UnplacedReason::BudgetExhausted => {
                write!(f, "Time budget elapsed before the item was attempted")
            }
        }
    }
}

/// Events emitted while packing, suitable for live visualization.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum PackEvent {
    /// A session was opened.
    SessionStarted {
        container: ContainerSpec,
        instances: usize,
    },
    /// An instance was committed.
    ItemPlaced {
        label: String,
        name: String,
        type_index: usize,
        orientation: usize,
        pos: (f64, f64, f64),
        dims: (f64, f64, f64),
        weight: f64,
        total_weight: f64,
    },
    /// An instance was rejected.
    ItemRejected {
        label: String,
        name: String,
        type_index: usize,
        weight: f64,
        dims: (f64, f64, f64),
        reason_code: String,
        reason_text: String,
    },
    /// All instances were attempted.
    Finished {
        placed: usize,
        rejected: usize,
        volume_utilization: f64,
    },
    /// The run stopped with an error; no `Finished` event follows.
    Aborted { reason: String },
}

impl PackEvent {
    fn placed(item: &PlacedItem, total_weight: f64) -> Self {
        PackEvent::ItemPlaced {
            label: item.instance.label(),
            name: item.instance.name.clone(),
            type_index: item.instance.type_index,
            orientation: item.orientation.index(),
            pos: item.position.as_tuple(),
            dims: item.extents.as_tuple(),
            weight: item.instance.weight,
            total_weight,
        }
    }

    fn rejected(item: &RejectedItem) -> Self {
        PackEvent::ItemRejected {
            label: item.instance.label(),
            name: item.instance.name.clone(),
            type_index: item.instance.type_index,
            weight: item.instance.weight,
            dims: item.instance.extents.as_tuple(),
            reason_code: item.reason.code().to_string(),
            reason_text: item.reason.to_string(),
        }
    }
}

/// Outcome of one placement attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attempt {
    Placed,
    Rejected(UnplacedReason),
}

/// The admissible candidate picked by the first-fit scan.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    orientation: Orientation,
    anchor: Vec3,
    support_ratio: f64,
}

/// State owned by one packing run.
///
/// The container is fixed for the session's lifetime; the free-space model,
/// the running weight and the append-only placed/rejected lists are mutated
/// only through [`PackingSession::attempt`] and [`PackingSession::reject`].
#[derive(Debug)]
pub struct PackingSession {
    container: ContainerSpec,
    config: PackingConfig,
    space: SpaceModel,
    placed: Vec<PlacedItem>,
    rejected: Vec<RejectedItem>,
    running_weight: f64,
}

impl PackingSession {
    pub fn new(container: ContainerSpec, config: PackingConfig) -> Result<Self, PackingError> {
        container.validate()?;
        config.validate()?;
        let space = SpaceModel::new(container.extents(), config.general_epsilon);
        Ok(Self {
            container,
            config,
            space,
            placed: Vec::new(),
            rejected: Vec::new(),
            running_weight: 0.0,
        })
    }

    pub fn container(&self) -> &ContainerSpec {
        &self.container
    }

    pub fn config(&self) -> &PackingConfig {
        &self.config
    }

    pub fn placed(&self) -> &[PlacedItem] {
        &self.placed
    }

    pub fn rejected(&self) -> &[RejectedItem] {
        &self.rejected
    }

    pub fn running_weight(&self) -> f64 {
        self.running_weight
    }

    pub fn space(&self) -> &SpaceModel {
        &self.space
    }

    /// Tries to place one instance and records the outcome.
    ///
    /// A rejection is a normal outcome; only an invariant breach is an error.
    pub fn attempt(&mut self, instance: ItemInstance) -> Result<Attempt, PackingError> {
        match self.find_first_fit(&instance) {
            Ok(candidate) => {
                self.commit(instance, candidate)?;
                Ok(Attempt::Placed)
            }
            Err(reason) => {
                self.reject(instance, reason);
                Ok(Attempt::Rejected(reason))
            }
        }
    }

    /// Records an instance as rejected without searching.
    pub fn reject(&mut self, instance: ItemInstance, reason: UnplacedReason) {
        debug!("rejected {}: {}", instance.label(), reason.code());
        self.rejected.push(RejectedItem { instance, reason });
    }

    /// Closes the session and aggregates the result.
    pub fn finish(self) -> PlacementResult {
        PlacementResult::new(self.container, self.placed, self.rejected)
            .with_height_epsilon(self.config.height_epsilon)
    }

    fn find_first_fit(&self, instance: &ItemInstance) -> Result<Candidate, UnplacedReason> {
        let eval = Evaluator::new(&self.container, &self.placed, &self.config);

        let orientations: Vec<Orientation> = self
            .config
            .orientations()
            .iter()
            .copied()
            .filter(|o| eval.fits_container(o.apply(instance.extents)))
            .collect();
        if orientations.is_empty() {
            return Err(UnplacedReason::DimensionsExceedContainer);
        }

        // The weight check does not depend on the candidate.
        if !eval.weight_allows(instance.weight, self.running_weight) {
            return Err(UnplacedReason::TooHeavyForContainer);
        }

        let anchors = self.space.anchors();
        let candidates: Vec<(Orientation, Vec3)> = orientations
            .iter()
            .flat_map(|&o| anchors.iter().map(move |&a| (o, a)))
            .collect();

        let running_weight = self.running_weight;
        let admit = |&(orientation, anchor): &(Orientation, Vec3)| {
            match eval.check(instance, orientation, anchor, running_weight) {
                Ok(support_ratio) => Some(Candidate {
                    orientation,
                    anchor,
                    support_ratio,
                }),
                Err(rejection) => {
                    trace!(
                        "{} orientation {} at {:?}: {}",
                        instance.label(),
                        orientation,
                        anchor.as_tuple(),
                        rejection
                    );
                    None
                }
            }
        };

        let found = if self.config.parallel_search {
            candidates.par_iter().find_map_first(admit)
        } else {
            candidates.iter().find_map(admit)
        };
        found.ok_or(UnplacedReason::NoStablePosition)
    }

    fn commit(&mut self, instance: ItemInstance, candidate: Candidate) -> Result<(), PackingError> {
        let item = PlacedItem::new(
            instance,
            candidate.orientation,
            candidate.anchor,
            candidate.support_ratio,
        );
        self.verify(&item)?;

        let bounds = item.bounding_box();
        self.space.occupy(&bounds);
        self.running_weight += item.instance.weight;
        debug!(
            "placed {} at {:?} orientation {} (support {:.2})",
            item.instance.label(),
            item.position.as_tuple(),
            item.orientation,
            item.support_ratio
        );
        self.placed.push(item);
        Ok(())
    }

    fn verify(&self, item: &PlacedItem) -> Result<(), PackingError> {
        let eps = self.config.general_epsilon;
        let breach = if !within_container(item.position, item.extents, self.container.extents(), eps)
        {
            Some(format!("{} leaves the container", item.instance.label()))
        } else if let Some(other) = self
            .placed
            .iter()
            .find(|p| p.bounding_box().intersects(&item.bounding_box(), eps))
        {
            Some(format!(
                "{} overlaps {}",
                item.instance.label(),
                other.instance.label()
            ))
        } else if self.running_weight + item.instance.weight > self.container.max_weight + eps {
            Some(format!(
                "{} exceeds the weight capacity",
                item.instance.label()
            ))
        } else {
            None
        };

        match breach {
            Some(msg) => {
                error!("refusing to commit: {}", msg);
                Err(PackingError::InvariantViolation(msg))
            }
            None => Ok(()),
        }
    }
}

/// Expands item types into instances in packing order.
///
/// Larger volume first, then heavier, then declaration order. Volumes within
/// `EPSILON_GENERAL` (relative to the larger one, at least absolute) count as
/// equal, so permuted dimensions of the same box tie.
pub fn ordered_instances(items: &[ItemType]) -> Vec<ItemInstance> {
    let mut instances: Vec<ItemInstance> = items
        .iter()
        .enumerate()
        .flat_map(|(idx, item)| item.instances(idx))
        .collect();

    instances.sort_by(|a, b| b.volume().total_cmp(&a.volume()));

    // Each run of equal volumes is measured against its first member, which
    // keeps the grouping a partition even when differences chain.
    let mut start = 0;
    while start < instances.len() {
        let lead = instances[start].volume();
        let end = instances[start..]
            .iter()
            .position(|i| !same_volume(lead, i.volume()))
            .map_or(instances.len(), |offset| start + offset);
        instances[start..end].sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then_with(|| a.type_index.cmp(&b.type_index))
                .then_with(|| a.copy_index.cmp(&b.copy_index))
        });
        start = end;
    }
    instances
}

/// Total number of instances the item types expand to.
pub fn instance_count(items: &[ItemType]) -> u64 {
    items.iter().map(|item| u64::from(item.quantity)).sum()
}

fn same_volume(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON_GENERAL * a.max(b).max(1.0)
}

/// Packs items into the container with the default configuration.
///
/// # Parameters
/// * `container` - The container to load
/// * `items` - Declared item types in declaration order
///
/// # Returns
/// `PlacementResult` with placed and rejected instances, or an error for invalid input
pub fn pack_items(
    container: ContainerSpec,
    items: &[ItemType],
) -> Result<PlacementResult, PackingError> {
    pack_items_with_config(container, items, PackingConfig::default())
}

/// Like `pack_items`, with a custom configuration.
pub fn pack_items_with_config(
    container: ContainerSpec,
    items: &[ItemType],
    config: PackingConfig,
) -> Result<PlacementResult, PackingError> {
    pack_items_with_progress(container, items, config, |_| {})
}

/// Packs items and reports every step through a callback (suitable for SSE).
///
/// Input is validated before anything is placed; an invalid container or
/// item aborts the run without a partial result.
pub fn pack_items_with_progress(
    container: ContainerSpec,
    items: &[ItemType],
    config: PackingConfig,
    mut on_event: impl FnMut(&PackEvent),
) -> Result<PlacementResult, PackingError> {
    if items.is_empty() {
        return Err(PackingError::NoItems);
    }
    for item in items {
        item.validate()?;
    }
    let requested = instance_count(items);
    if requested > config.max_instances {
        return Err(PackingError::TooManyInstances {
            requested,
            limit: config.max_instances,
        });
    }

    let mut session = PackingSession::new(container, config)?;
    let instances = ordered_instances(items);
    info!(
        "packing {} instances of {} item types into {}",
        instances.len(),
        items.len(),
        session.container()
    );
    on_event(&PackEvent::SessionStarted {
        container: session.container().clone(),
        instances: instances.len(),
    });

    let started = Instant::now();
    let mut out_of_time = false;

    for instance in instances {
        if !out_of_time
            && config
                .time_budget
                .is_some_and(|budget| started.elapsed() >= budget)
        {
            warn!("time budget elapsed, remaining instances are not attempted");
            out_of_time = true;
        }

        if out_of_time {
            session.reject(instance, UnplacedReason::BudgetExhausted);
            if let Some(rejected) = session.rejected().last() {
                on_event(&PackEvent::rejected(rejected));
            }
            continue;
        }

        match session.attempt(instance)? {
            Attempt::Placed => {
                if let Some(placed) = session.placed().last() {
                    on_event(&PackEvent::placed(placed, session.running_weight()));
                }
            }
            Attempt::Rejected(_) => {
                if let Some(rejected) = session.rejected().last() {
                    on_event(&PackEvent::rejected(rejected));
                }
            }
        }
    }

    let result = session.finish();
    info!(
        "packing finished: {} placed, {} rejected, {:.1}% volume, {:.1}% weight",
        result.placed.len(),
        result.rejected.len(),
        result.volume_utilization_percent(),
        result.weight_utilization_percent()
    );
    on_event(&PackEvent::Finished {
        placed: result.placed.len(),
        rejected: result.rejected.len(),
        volume_utilization: result.volume_utilization(),
    });
    Ok(result)
}
