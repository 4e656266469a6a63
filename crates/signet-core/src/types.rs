//! Core types shared by the signal engine and the ECS runtime

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Dynamic value carried through signals and stored as component data.
pub use serde_json::Value;

/// Object map used for component records and global state.
pub type Map = serde_json::Map<String, Value>;

/// Argument list passed through every dispatch.
pub type Args = Vec<Value>;

/// Opaque identifier for entities in the ECS.
///
/// Ids come from a monotonically increasing counter and are recycled after
/// the entity is deleted.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl EntityId {
    /// The raw slot index of this entity.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Read an entity id out of a dynamic value.
    pub fn from_value(value: &Value) -> Option<Self> {
        value
            .as_u64()
            .and_then(|raw| u32::try_from(raw).ok())
            .map(EntityId)
    }

    /// Convert into a dynamic value suitable for an argument list.
    pub fn to_value(self) -> Value {
        Value::from(self.0)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        id.to_value()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read the entity id at `pos` of an argument list.
pub fn entity_arg(args: &[Value], pos: usize) -> Result<EntityId> {
    args.get(pos)
        .and_then(EntityId::from_value)
        .ok_or_else(|| Error::InvalidArgument(format!("expected an entity id at position {pos}")))
}

/// Read the string at `pos` of an argument list.
pub fn str_arg(args: &[Value], pos: usize) -> Result<&str> {
    args.get(pos)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidArgument(format!("expected a string at position {pos}")))
}
