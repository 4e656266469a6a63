//! Signet ECS - Entity Component System on top of the phased signal engine
//!
//! Entities are ids plus a record of dynamic component values. Every entity
//! mutation is an action in the `entity` namespace, so systems observe and
//! veto them through hooks. The family index keeps per-pattern rosters up to
//! date incrementally from those hooks.

mod bitset;
mod builtin;
mod component;
mod config;
mod engine;
mod entity;
mod family;
mod snapshot;
mod system;
mod world;

pub use bitset::BitSet;
pub use builtin::{ADD, ENTITY, EXTERNAL, REMOVE};
pub use component::{ComponentDef, ComponentEntry, ComponentFactory, ComponentRegistry, Serializer};
pub use config::EngineConfig;
pub use engine::{Engine, FAMILY_SYSTEM};
pub use entity::{EntityAllocator, EntityRecord};
pub use family::{Family, FamilySystem};
pub use snapshot::{GlobalState, WorldSnapshot};
pub use system::{Hook, HookSystem, System};
pub use world::WorldState;
