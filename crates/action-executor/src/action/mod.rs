//! Action data model
//!
//! - [`ActionItem`]: the immutable request received from the analysis engine
//! - [`TurboAction`]: the record of one execution and its lifecycle status
//! - [`ActionRegistry`]: per-UID bookkeeping used for status queries and idempotency

pub mod item;
pub mod registry;
pub mod turbo;

pub use item::{ActionItem, ActionItemType, CommodityBought, EntityRef, EntityType, ProviderInfo};
pub use registry::{ActionRecord, ActionRegistry, Claim};
pub use turbo::{
    ActionSpec, ControllerKind, ParentObjectRef, ScaleSpec, TargetObject, TurboAction,
    TurboActionContent, TurboActionStatus, TurboActionType,
};
