use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use signet_core::{EntityId, Error, Map, Result, Value};

/// How far past the counter a requested id may land. Every id skipped over
/// becomes free, so the gap is bounded.
pub const MAX_ID_GAP: u32 = 1 << 16;

/// An entity: its id plus the component values it currently carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    #[serde(flatten)]
    pub components: Map,
}

impl EntityRecord {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            components: Map::new(),
        }
    }

    pub fn has(&self, component: &str) -> bool {
        self.components.contains_key(component)
    }

    pub fn get(&self, component: &str) -> Option<&Value> {
        self.components.get(component)
    }

    pub fn get_mut(&mut self, component: &str) -> Option<&mut Value> {
        self.components.get_mut(component)
    }

    /// The record as one object value with the id under `"id"`.
    pub fn to_value(&self) -> Value {
        let mut object = self.components.clone();
        object.insert("id".to_owned(), self.id.to_value());
        Value::Object(object)
    }
}

/// Hands out entity ids from a monotonically increasing counter, recycling
/// ids of deleted entities through a free list.
#[derive(Debug, Clone, Default)]
pub struct EntityAllocator {
    next_id: u32,
    free: Vec<EntityId>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id, reusing a freed one if available.
    pub fn allocate(&mut self) -> Result<EntityId> {
        if let Some(id) = self.free.pop() {
            return Ok(id);
        }
        let id = EntityId(self.next_id);
        self.next_id = bump(id)?;
        Ok(id)
    }

    /// Claim a specific id, e.g. one preserved by a snapshot. Ids skipped
    /// over by the counter become free.
    pub fn claim(&mut self, id: EntityId) -> Result<()> {
        if id.0 < self.next_id {
            self.free.retain(|free| *free != id);
            return Ok(());
        }
        if id.0 - self.next_id > MAX_ID_GAP {
            return Err(Error::InvalidArgument(format!(
                "entity id {id} is more than {MAX_ID_GAP} ahead of the next id {}",
                self.next_id
            )));
        }
        let next_id = bump(id)?;
        self.free.extend((self.next_id..id.0).map(EntityId));
        self.next_id = next_id;
        Ok(())
    }

    /// Return an id to the free list.
    pub fn release(&mut self, id: EntityId) {
        self.free.push(id);
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn free_list(&self) -> &[EntityId] {
        &self.free
    }

    /// Overwrite the counter and free list, e.g. after loading a snapshot.
    /// Free ids must be distinct and below the counter.
    pub fn restore(&mut self, next_id: u32, free: Vec<EntityId>) -> Result<()> {
        let mut seen = HashSet::with_capacity(free.len());
        for id in &free {
            if id.0 >= next_id || !seen.insert(*id) {
                return Err(Error::InvalidArgument(format!(
                    "free id {id} is duplicated or not below the next id {next_id}"
                )));
            }
        }
        self.next_id = next_id;
        self.free = free;
        Ok(())
    }
}

fn bump(id: EntityId) -> Result<u32> {
    id.0
        .checked_add(1)
        .ok_or_else(|| Error::InvalidArgument("entity ids are exhausted".to_owned()))
}
