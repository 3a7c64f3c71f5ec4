//! Data models for the load planner.
//!
//! This module defines the fundamental data structures of a packing session:
//! - `ContainerSpec`: The container with its extents and weight capacity
//! - `ItemType`: A declared cargo line with a quantity of identical copies
//! - `ItemInstance`: One physical copy, the unit the engine places
//! - `PlacedItem`: An instance with its committed orientation and position

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::geometry::Orientation;
use crate::types::{BoundingBox, Dimensional, Positioned, Vec3, Weighted, validation};

/// Validation error for container and item data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

fn validate_extents(dims: (f64, f64, f64), owner: &str) -> Result<(), ValidationError> {
    validation::validate_dimensions_3d(dims)
        .map_err(|msg| ValidationError::InvalidDimension(format!("{}: {}", owner, msg)))
}

fn validate_weight_value(value: f64, owner: &str) -> Result<(), ValidationError> {
    validation::validate_weight(value)
        .map_err(|msg| ValidationError::InvalidWeight(format!("{}: {}", owner, msg)))
}

fn default_container_name() -> String {
    ContainerSpec::DEFAULT_NAME.to_string()
}

/// The container all items are loaded into.
///
/// Immutable once a packing session starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "40ft",
    "width": 12.03,
    "height": 2.39,
    "depth": 2.35,
    "max_weight": 28000.0
}))]
pub struct ContainerSpec {
    #[serde(default = "default_container_name")]
    pub name: String,
    /// Extent along x in meters.
    pub width: f64,
    /// Extent along y (vertical) in meters.
    pub height: f64,
    /// Extent along z in meters.
    pub depth: f64,
    /// Weight capacity in kg.
    pub max_weight: f64,
}

impl ContainerSpec {
    pub const DEFAULT_NAME: &'static str = "Container";

    /// Creates a validated container.
    ///
    /// # Examples
    /// ```
    /// use load_planner::model::ContainerSpec;
    ///
    /// assert!(ContainerSpec::new("Box", (1.0, 1.0, 1.0), 100.0).is_ok());
    /// assert!(ContainerSpec::new("Box", (0.0, 1.0, 1.0), 100.0).is_err());
    /// ```
    pub fn new(
        name: impl Into<String>,
        dims: (f64, f64, f64),
        max_weight: f64,
    ) -> Result<Self, ValidationError> {
        let spec = Self {
            name: name.into(),
            width: dims.0,
            height: dims.1,
            depth: dims.2,
            max_weight,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Re-checks the invariants; used for values that arrive through deserialization.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_extents((self.width, self.height, self.depth), "Container")?;
        validate_weight_value(self.max_weight, "Container")?;
        Ok(())
    }

    #[inline]
    pub fn extents(&self) -> Vec3 {
        Vec3::new(self.width, self.height, self.depth)
    }

    pub fn volume(&self) -> f64 {
        self.extents().volume()
    }

    /// Center of the floor (x, z), the reference point for balance diagnostics.
    pub fn floor_center(&self) -> (f64, f64) {
        (self.width / 2.0, self.depth / 2.0)
    }
}

impl Default for ContainerSpec {
    /// A 40 ft dry container.
    fn default() -> Self {
        Self {
            name: "40ft".to_string(),
            width: 12.03,
            height: 2.39,
            depth: 2.35,
            max_weight: 28000.0,
        }
    }
}

impl Dimensional for ContainerSpec {
    fn dimensions(&self) -> Vec3 {
        self.extents()
    }
}

impl std::fmt::Display for ContainerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Container({}): {}x{}x{}m, max_weight={}kg",
            self.name, self.width, self.height, self.depth, self.max_weight
        )
    }
}

/// A declared cargo line: one description and a number of identical copies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "pallet",
    "width": 1.2,
    "height": 1.0,
    "depth": 1.0,
    "weight": 800.0,
    "quantity": 10
}))]
pub struct ItemType {
    pub name: String,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    /// Weight of a single copy in kg.
    pub weight: f64,
    pub quantity: u32,
}

impl ItemType {
    /// Creates a validated item type.
    pub fn new(
        name: impl Into<String>,
        dims: (f64, f64, f64),
        weight: f64,
        quantity: u32,
    ) -> Result<Self, ValidationError> {
        let item = Self {
            name: name.into(),
            width: dims.0,
            height: dims.1,
            depth: dims.2,
            weight,
            quantity,
        };
        item.validate()?;
        Ok(item)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::InvalidName(
                "Item name must not be empty".to_string(),
            ));
        }
        validate_extents((self.width, self.height, self.depth), &self.name)?;
        validate_weight_value(self.weight, &self.name)?;
        if self.quantity == 0 {
            return Err(ValidationError::InvalidQuantity(format!(
                "{}: quantity must be at least 1",
                self.name
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn extents(&self) -> Vec3 {
        Vec3::new(self.width, self.height, self.depth)
    }

    pub fn volume(&self) -> f64 {
        self.extents().volume()
    }

    /// Expands this type into `quantity` independent instances.
    ///
    /// `type_index` is the declaration position of the type and becomes the
    /// stable identity used for ordering, labeling and coloring.
    pub fn instances(&self, type_index: usize) -> impl Iterator<Item = ItemInstance> + '_ {
        (0..self.quantity as usize).map(move |copy_index| ItemInstance {
            type_index,
            copy_index,
            name: self.name.clone(),
            extents: self.extents(),
            weight: self.weight,
        })
    }
}

/// One physical copy of an [`ItemType`].
#[derive(Clone, Debug, PartialEq)]
pub struct ItemInstance {
    pub type_index: usize,
    pub copy_index: usize,
    pub name: String,
    /// Declared (width, height, depth), before orientation.
    pub extents: Vec3,
    pub weight: f64,
}

impl ItemInstance {
    /// Label in the form `<name>_<copy>`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.name, self.copy_index)
    }

    pub fn volume(&self) -> f64 {
        self.extents.volume()
    }
}

impl Dimensional for ItemInstance {
    fn dimensions(&self) -> Vec3 {
        self.extents
    }
}

impl Weighted for ItemInstance {
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// An instance committed to the container.
///
/// Placed items are never moved or removed once committed.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedItem {
    pub instance: ItemInstance,
    pub orientation: Orientation,
    /// Minimum corner in the container frame.
    pub position: Vec3,
    /// Extents along (x, y, z) after orientation.
    pub extents: Vec3,
    /// Fraction of the footprint resting on the floor or on items below.
    pub support_ratio: f64,
}

impl PlacedItem {
    pub fn new(
        instance: ItemInstance,
        orientation: Orientation,
        position: Vec3,
        support_ratio: f64,
    ) -> Self {
        let extents = orientation.apply(instance.extents);
        Self {
            instance,
            orientation,
            position,
            extents,
            support_ratio,
        }
    }

    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_position_and_dims(self.position, self.extents)
    }

    /// Height of the top face.
    pub fn top_y(&self) -> f64 {
        self.position.y + self.extents.y
    }

    pub fn center(&self) -> Vec3 {
        self.bounding_box().center()
    }
}

impl Positioned for PlacedItem {
    fn position(&self) -> Vec3 {
        self.position
    }
}

impl Dimensional for PlacedItem {
    fn dimensions(&self) -> Vec3 {
        self.extents
    }
}

impl Weighted for PlacedItem {
    fn weight(&self) -> f64 {
        self.instance.weight
    }
}
