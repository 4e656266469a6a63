//! Incremental family indexing.
//!
//! A family is a standing query for every entity whose signature (the set of
//! component indices it carries) is a superset of the family's pattern. The
//! index is kept up to date from post-phase hooks on the `entity` actions and
//! only re-tests the families that depend on a changed component, through a
//! reverse index from component bit to families. A snapshot load triggers a
//! full rebuild.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use signet_core::{entity_arg, str_arg, EntityId, Listener, Result, Signal, Value};
use tracing::{debug, trace};

use crate::bitset::BitSet;
use crate::engine::Engine;
use crate::system::{Hook, System};

/// An ordered roster with constant-time membership and removal. Slots of
/// departed members are tombstoned and compacted once they make up half
/// the roster.
#[derive(Debug, Default)]
struct Roster {
    slots: Vec<Option<EntityId>>,
    /// Entity index → slot, sparse like the entity store.
    positions: Vec<Option<usize>>,
    len: usize,
}

impl Roster {
    fn contains(&self, entity: EntityId) -> bool {
        matches!(self.positions.get(entity.index()), Some(Some(_)))
    }

    fn push(&mut self, entity: EntityId) {
        let idx = entity.index();
        if idx >= self.positions.len() {
            self.positions.resize(idx + 1, None);
        }
        if self.positions[idx].is_some() {
            return;
        }
        self.positions[idx] = Some(self.slots.len());
        self.slots.push(Some(entity));
        self.len += 1;
    }

    fn pull(&mut self, entity: EntityId) {
        let Some(slot) = self.positions.get_mut(entity.index()).and_then(Option::take) else {
            return;
        };
        self.slots[slot] = None;
        self.len -= 1;
        if self.len * 2 < self.slots.len() {
            self.compact();
        }
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        for (slot, entity) in self.slots.iter().flatten().enumerate() {
            self.positions[entity.index()] = Some(slot);
        }
    }

    fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots.iter().flatten().copied()
    }
}

/// Entities matching a component pattern, in the order they joined.
pub struct Family {
    id: usize,
    pattern: BitSet,
    components: Vec<String>,
    entities: RefCell<Roster>,
    on_add: Signal<Engine>,
    on_remove: Signal<Engine>,
}

impl Family {
    fn new(id: usize, pattern: BitSet, components: Vec<String>) -> Self {
        Self {
            id,
            pattern,
            components,
            entities: RefCell::new(Roster::default()),
            on_add: Signal::broadcast(),
            on_remove: Signal::broadcast(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pattern(&self) -> &BitSet {
        &self.pattern
    }

    /// Component names, in registration order.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn matches(&self, signature: &BitSet) -> bool {
        signature.is_superset_of(&self.pattern)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.borrow().contains(entity)
    }

    pub fn len(&self) -> usize {
        self.entities.borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of the roster.
    pub fn entities(&self) -> Vec<EntityId> {
        self.entities.borrow().iter().collect()
    }

    /// Visit every member. Iterates over a copy of the roster, so `f` may
    /// mutate the engine.
    pub fn for_each(&self, mut f: impl FnMut(EntityId) -> Result<()>) -> Result<()> {
        for entity in self.entities() {
            f(entity)?;
        }
        Ok(())
    }

    /// Fires with `[entity]` when an entity joins.
    pub fn on_add(&self) -> &Signal<Engine> {
        &self.on_add
    }

    /// Fires with `[entity]` when an entity leaves.
    pub fn on_remove(&self) -> &Signal<Engine> {
        &self.on_remove
    }

    fn push(&self, entity: EntityId) {
        self.entities.borrow_mut().push(entity);
    }

    fn pull(&self, entity: EntityId) {
        self.entities.borrow_mut().pull(entity);
    }
}

impl fmt::Debug for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Family")
            .field("id", &self.id)
            .field("components", &self.components)
            .field("entities", &self.entities())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Joined,
    Left,
}

/// Membership changes recorded while the index is borrowed, fired once it
/// is released so listeners can call back into the engine.
type Changes = Vec<(Rc<Family>, EntityId, Change)>;

/// What the index knows about one entity.
#[derive(Debug, Clone, Default)]
struct EntityBits {
    /// Component indices the entity carries.
    components: BitSet,
    /// Ids of the families the entity belongs to.
    families: BitSet,
}

#[derive(Default)]
struct FamilyIndex {
    families: Vec<Rc<Family>>,
    by_pattern: HashMap<BitSet, usize>,
    /// Component bit → ids of the families whose pattern contains it.
    dependents: Vec<Vec<usize>>,
    /// Families with an empty pattern; every entity belongs to them.
    universal: Vec<usize>,
    entities: Vec<Option<EntityBits>>,
}

impl FamilyIndex {
    /// The entity's bits, created on first sight. A new entity immediately
    /// joins every universal family.
    fn track(&mut self, entity: EntityId, changes: &mut Changes) -> &mut EntityBits {
        let idx = entity.index();
        if idx >= self.entities.len() {
            self.entities.resize(idx + 1, None);
        }
        if self.entities[idx].is_none() {
            let mut bits = EntityBits::default();
            for &family_id in &self.universal {
                let family = &self.families[family_id];
                bits.families.insert(family_id);
                family.push(entity);
                changes.push((Rc::clone(family), entity, Change::Joined));
            }
            self.entities[idx] = Some(bits);
        }
        self.entities[idx].get_or_insert_with(EntityBits::default)
    }

    fn set_component(&mut self, entity: EntityId, bit: usize, present: bool, changes: &mut Changes) {
        let bits = self.track(entity, changes);
        let flipped = if present {
            bits.components.insert(bit)
        } else {
            bits.components.remove(bit)
        };
        if !flipped {
            return;
        }
        let Some(dependents) = self.dependents.get(bit) else {
            return;
        };
        for &family_id in dependents {
            let family = &self.families[family_id];
            let Some(Some(bits)) = self.entities.get_mut(entity.index()) else {
                return;
            };
            let now = family.matches(&bits.components);
            let before = bits.families.contains(family_id);
            if now == before {
                continue;
            }
            if now {
                bits.families.insert(family_id);
                family.push(entity);
                changes.push((Rc::clone(family), entity, Change::Joined));
            } else {
                bits.families.remove(family_id);
                family.pull(entity);
                changes.push((Rc::clone(family), entity, Change::Left));
            }
        }
    }

    fn forget(&mut self, entity: EntityId, changes: &mut Changes) {
        let Some(bits) = self.entities.get_mut(entity.index()).and_then(Option::take) else {
            return;
        };
        for family_id in bits.families.ones() {
            let family = &self.families[family_id];
            family.pull(entity);
            changes.push((Rc::clone(family), entity, Change::Left));
        }
    }

    fn signature(&self, entity: EntityId) -> Option<&BitSet> {
        self.entities.get(entity.index())?.as_ref().map(|bits| &bits.components)
    }
}

/// The family index, attached to the engine as system `family`.
#[derive(Default)]
pub struct FamilySystem {
    index: RefCell<FamilyIndex>,
}

impl FamilySystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// The family for a set of component names. Two calls naming the same
    /// components, in any order, return the same family.
    ///
    /// A new family is seeded from every tracked entity; `on_add` fires for
    /// each of them.
    pub fn get(&self, engine: &Engine, names: &[&str]) -> Result<Rc<Family>> {
        let pattern = {
            let components = engine.components();
            names
                .iter()
                .map(|name| components.index_of(name))
                .collect::<Result<BitSet>>()?
        };

        let mut changes = Changes::new();
        let family = {
            let mut index = self.index.borrow_mut();
            if let Some(&id) = index.by_pattern.get(&pattern) {
                return Ok(Rc::clone(&index.families[id]));
            }

            let id = index.families.len();
            let components = {
                let registry = engine.components();
                pattern
                    .ones()
                    .filter_map(|bit| registry.name_of(bit).map(str::to_owned))
                    .collect()
            };
            let family = Rc::new(Family::new(id, pattern.clone(), components));
            index.families.push(Rc::clone(&family));
            index.by_pattern.insert(pattern.clone(), id);
            if pattern.is_empty() {
                index.universal.push(id);
            }
            for bit in pattern.ones() {
                if bit >= index.dependents.len() {
                    index.dependents.resize_with(bit + 1, Vec::new);
                }
                index.dependents[bit].push(id);
            }

            for (idx, slot) in index.entities.iter_mut().enumerate() {
                let Some(bits) = slot else { continue };
                if family.matches(&bits.components) {
                    let entity = EntityId(idx as u32);
                    bits.families.insert(id);
                    family.push(entity);
                    changes.push((Rc::clone(&family), entity, Change::Joined));
                }
            }
            debug!(family = id, components = ?family.components(), members = family.len(), "created family");
            family
        };

        fire(engine, changes)?;
        Ok(family)
    }

    /// Every family, in creation order.
    pub fn families(&self) -> Vec<Rc<Family>> {
        self.index.borrow().families.clone()
    }

    pub fn len(&self) -> usize {
        self.index.borrow().families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.borrow().families.is_empty()
    }

    /// The signature the index holds for an entity.
    pub fn signature(&self, entity: EntityId) -> Option<BitSet> {
        self.index.borrow().signature(entity).cloned()
    }

    fn on_create(&self, engine: &Engine, args: &[Value]) -> Result<()> {
        let Some(entity) = args.last().and_then(EntityId::from_value) else {
            return Ok(());
        };
        let mut changes = Changes::new();
        self.index.borrow_mut().track(entity, &mut changes);
        fire(engine, changes)
    }

    fn on_component(&self, engine: &Engine, args: &[Value], present: bool) -> Result<()> {
        let entity = entity_arg(args, 0)?;
        let bit = engine.components().index_of(str_arg(args, 1)?)?;
        let mut changes = Changes::new();
        self.index
            .borrow_mut()
            .set_component(entity, bit, present, &mut changes);
        fire(engine, changes)
    }

    fn on_delete(&self, engine: &Engine, args: &[Value]) -> Result<()> {
        let entity = entity_arg(args, 0)?;
        let mut changes = Changes::new();
        self.index.borrow_mut().forget(entity, &mut changes);
        fire(engine, changes)
    }

    /// Recompute every signature and membership from the entity store.
    ///
    /// Rosters keep the members that still match in their current order;
    /// entities that now match are appended in id order. Only actual
    /// membership changes are signalled.
    fn rebuild(&self, engine: &Engine) -> Result<()> {
        let signatures: Vec<(EntityId, BitSet)> = {
            let components = engine.components();
            let world = engine.world();
            world
                .records()
                .map(|record| {
                    let signature = record
                        .components
                        .keys()
                        .filter_map(|name| components.index_of(name).ok())
                        .collect();
                    (record.id, signature)
                })
                .collect()
        };

        let mut changes = Changes::new();
        {
            let mut index = self.index.borrow_mut();
            let mut entities: Vec<Option<EntityBits>> = Vec::new();
            for (entity, signature) in signatures {
                let idx = entity.index();
                if idx >= entities.len() {
                    entities.resize(idx + 1, None);
                }
                let families = index
                    .families
                    .iter()
                    .filter(|family| family.matches(&signature))
                    .map(|family| family.id)
                    .collect();
                entities[idx] = Some(EntityBits {
                    components: signature,
                    families,
                });
            }

            for family in &index.families {
                let member = |entity: EntityId| {
                    entities
                        .get(entity.index())
                        .and_then(Option::as_ref)
                        .is_some_and(|bits| bits.families.contains(family.id))
                };
                for entity in family.entities() {
                    if !member(entity) {
                        family.pull(entity);
                        changes.push((Rc::clone(family), entity, Change::Left));
                    }
                }
                for idx in 0..entities.len() {
                    let entity = EntityId(idx as u32);
                    if member(entity) && !family.contains(entity) {
                        family.push(entity);
                        changes.push((Rc::clone(family), entity, Change::Joined));
                    }
                }
            }
            index.entities = entities;
        }

        debug!(changes = changes.len(), "rebuilt family index");
        fire(engine, changes)
    }
}

impl fmt::Debug for FamilySystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.index.borrow().families.iter()).finish()
    }
}

fn fire(engine: &Engine, changes: Changes) -> Result<()> {
    for (family, entity, change) in changes {
        trace!(family = family.id, entity = %entity, ?change, "family membership changed");
        let signal = match change {
            Change::Joined => &family.on_add,
            Change::Left => &family.on_remove,
        };
        signal.dispatch(engine, vec![entity.into()])?;
    }
    Ok(())
}

impl System for FamilySystem {
    fn hooks(self: Rc<Self>) -> Vec<Hook> {
        let hook = |path: &str, f: fn(&FamilySystem, &Engine, &[Value]) -> Result<()>| {
            let system = Rc::clone(&self);
            Hook::new(
                path,
                Listener::observe(move |engine: &Engine, args: &[Value]| f(&system, engine, args)),
            )
        };
        vec![
            hook("entity.create:post", |system, engine, args| system.on_create(engine, args)),
            hook("entity.add.*:post", |system, engine, args| {
                system.on_component(engine, args, true)
            }),
            hook("entity.remove.*:post", |system, engine, args| {
                system.on_component(engine, args, false)
            }),
            hook("entity.delete:post", |system, engine, args| system.on_delete(engine, args)),
            hook("external.load:post", |system, engine, _| system.rebuild(engine)),
        ]
    }
}
