use signet_core::{EntityId, Error, Map, Result};

use crate::entity::{EntityAllocator, EntityRecord};

/// The entity store plus global state. Owned by the [`Engine`].
///
/// Invariant: slot `i` is either empty or holds the record whose id is `i`.
///
/// [`Engine`]: crate::Engine
#[derive(Debug, Default)]
pub struct WorldState {
    records: Vec<Option<EntityRecord>>,
    allocator: EntityAllocator,
    len: usize,
    pub(crate) global: Map,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Entity management ----

    /// Create an empty entity, either with a fresh id or with the requested
    /// one.
    pub fn spawn(&mut self, requested: Option<EntityId>) -> Result<EntityId> {
        let id = match requested {
            Some(id) => {
                if self.contains(id) {
                    return Err(Error::EntityExists(id));
                }
                self.allocator.claim(id)?;
                id
            }
            None => {
                let id = self.allocator.allocate()?;
                if self.contains(id) {
                    return Err(Error::EntityExists(id));
                }
                id
            }
        };
        let idx = id.index();
        if idx >= self.records.len() {
            self.records.resize(idx + 1, None);
        }
        self.records[idx] = Some(EntityRecord::new(id));
        self.len += 1;
        Ok(id)
    }

    /// Remove an entity, returning its record.
    pub fn despawn(&mut self, id: EntityId) -> Option<EntityRecord> {
        let record = self.records.get_mut(id.index())?.take()?;
        self.allocator.release(id);
        self.len -= 1;
        Some(record)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.records.get(id.index())?.as_ref()
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.records.get_mut(id.index())?.as_mut()
    }

    /// Live records in ascending id order.
    pub fn records(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.iter().flatten()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.records().map(|record| record.id).collect()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn allocator(&self) -> &EntityAllocator {
        &self.allocator
    }

    /// Restore the counter and free list. Fails if a live entity is free
    /// or not below the counter.
    pub(crate) fn restore_allocator(&mut self, next_id: u32, free: Vec<EntityId>) -> Result<()> {
        if let Some(id) = free.iter().copied().find(|id| self.contains(*id)) {
            return Err(Error::EntityExists(id));
        }
        if let Some(record) = self.records().find(|record| record.id.0 >= next_id) {
            return Err(Error::InvalidArgument(format!(
                "live entity {} is not below the next id {next_id}",
                record.id
            )));
        }
        self.allocator.restore(next_id, free)
    }

    // ---- Global state ----

    pub fn global(&self) -> &Map {
        &self.global
    }

    /// Drop every entity, the allocator state and global values.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_and_despawn() {
        let mut world = WorldState::new();
        let e = world.spawn(None).unwrap();
        assert!(world.contains(e));
        assert_eq!(world.len(), 1);
        let record = world.despawn(e).unwrap();
        assert_eq!(record.id, e);
        assert!(!world.contains(e));
        assert!(world.is_empty());
        assert!(world.despawn(e).is_none());
    }

    #[test]
    fn ids_are_recycled() {
        let mut world = WorldState::new();
        let e0 = world.spawn(None).unwrap();
        let e1 = world.spawn(None).unwrap();
        world.despawn(e0);
        assert_eq!(world.spawn(None).unwrap(), e0);
        assert_eq!(world.spawn(None).unwrap(), EntityId(e1.0 + 1));
    }

    #[test]
    fn requested_ids() {
        let mut world = WorldState::new();
        assert_eq!(world.spawn(Some(EntityId(5))).unwrap(), EntityId(5));
        assert!(matches!(
            world.spawn(Some(EntityId(5))),
            Err(Error::EntityExists(EntityId(5)))
        ));
        assert_eq!(world.ids(), vec![EntityId(5)]);
        let fresh = world.spawn(None).unwrap();
        assert!(fresh.0 < 5);
    }

    #[test]
    fn record_key_matches_id() {
        let mut world = WorldState::new();
        for _ in 0..4 {
            world.spawn(None).unwrap();
        }
        world.despawn(EntityId(1));
        for record in world.records() {
            assert_eq!(world.get(record.id).map(|r| r.id), Some(record.id));
        }
        assert_eq!(world.ids(), vec![EntityId(0), EntityId(2), EntityId(3)]);
    }

    #[test]
    fn far_requested_ids_allocate_nothing() {
        let mut world = WorldState::new();
        assert!(matches!(
            world.spawn(Some(EntityId(20_000_000))),
            Err(Error::InvalidArgument(_))
        ));
        assert!(world.is_empty());
        assert!(world.allocator().free_list().is_empty());
        assert_eq!(world.allocator().next_id(), 0);
    }

    #[test]
    fn a_free_list_naming_a_live_id_is_rejected() {
        let mut world = WorldState::new();
        let e0 = world.spawn(None).unwrap();
        let e1 = world.spawn(None).unwrap();
        assert!(matches!(
            world.restore_allocator(2, vec![e1]),
            Err(Error::EntityExists(id)) if id == e1
        ));
        assert!(matches!(
            world.restore_allocator(1, vec![]),
            Err(Error::InvalidArgument(_))
        ));

        // An allocator left pointing at live ids never overwrites them.
        world.allocator.restore(2, vec![e0]).unwrap();
        assert!(matches!(world.spawn(None), Err(Error::EntityExists(id)) if id == e0));
        assert_eq!(world.len(), 2);
        assert_eq!(world.spawn(None).unwrap(), EntityId(2));
    }
}
