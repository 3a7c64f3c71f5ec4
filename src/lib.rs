//! Single-container load planner.
//!
//! Places box-shaped cargo into one container with a deterministic
//! first-fit heuristic that respects container bounds, the weight capacity
//! and a minimum support ratio for stacked items.

pub mod api;
pub mod cli;
pub mod config;
pub mod evaluator;
pub mod geometry;
pub mod manifest;
pub mod model;
pub mod optimizer;
pub mod report;
pub mod space;
pub mod types;

pub use model::{ContainerSpec, ItemType, PlacedItem};
pub use optimizer::{
    PackingConfig, PackingError, UnplacedReason, pack_items, pack_items_with_config,
    pack_items_with_progress,
};
pub use report::PlacementResult;
