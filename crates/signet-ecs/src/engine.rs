//! The engine: owns the signal tree, the component registry, the entity
//! store and the registered systems.
//!
//! Every topology change (components, systems, hooks, snapshot loads) is
//! rejected while the engine is running. Entity mutations always go through
//! the `entity.*` actions so that hooks observe them.

use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use signet_core::{
    entity_arg, Actions, Args, Callable, EntityId, Error, HookPath, Listener, Map, ParentSignal, Result,
    SignalTree, Value,
};
use tracing::{debug, info, trace};

use crate::builtin::{self, ADD, ENTITY, EXTERNAL, REMOVE};
use crate::component::{self, ComponentDef, ComponentFactory, ComponentRegistry};
use crate::config::EngineConfig;
use crate::entity::EntityRecord;
use crate::family::{Family, FamilySystem};
use crate::snapshot::{GlobalState, WorldSnapshot};
use crate::system::System;
use crate::world::WorldState;

/// Name the family index is registered under.
pub const FAMILY_SYSTEM: &str = "family";

pub struct Engine {
    config: EngineConfig,
    running: Cell<bool>,
    tree: RefCell<SignalTree<Engine>>,
    components: RefCell<ComponentRegistry>,
    world: RefCell<WorldState>,
    systems: RefCell<BTreeMap<String, Rc<dyn System>>>,
    families: Option<Rc<FamilySystem>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let families = config.family_system.then(|| Rc::new(FamilySystem::new()));
        let engine = Self {
            config,
            running: Cell::new(false),
            tree: RefCell::new(SignalTree::new()),
            components: RefCell::new(ComponentRegistry::new()),
            world: RefCell::new(WorldState::new()),
            systems: RefCell::new(BTreeMap::new()),
            families: families.clone(),
        };

        if engine.config.builtins {
            let mut tree = engine.tree.borrow_mut();
            tree.install(&[EXTERNAL], &builtin::external_actions())?;
            tree.install(&[ENTITY], &builtin::entity_actions())?;
        }
        if let Some(families) = families {
            engine.add_system(FAMILY_SYSTEM, families)?;
        }

        debug!(
            builtins = engine.config.builtins,
            family_system = engine.config.family_system,
            "engine created"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    fn ensure_stopped(&self, what: &str) -> Result<()> {
        if self.running.get() {
            return Err(Error::InvalidTopologyMutation(what.to_owned()));
        }
        Ok(())
    }

    // ---- Components ----

    /// Register a component: its add/remove actions under `entity`, its own
    /// actions under its name and its global value.
    ///
    /// Every conflict is detected before anything is installed, so a failed
    /// registration leaves the engine unchanged.
    pub fn add_component(&self, name: &str, def: ComponentDef) -> Result<()> {
        self.ensure_stopped("add a component")?;
        component::check_name(name)?;
        if self.components.borrow().contains(name) {
            return Err(Error::StructuralConflict(name.to_owned()));
        }

        {
            let add = builtin::add_action(name, def.factory.clone());
            let remove = builtin::remove_action(name);
            let (add_at, remove_at, own) = ([ENTITY, ADD], [ENTITY, REMOVE], [name]);
            let mut installs: Vec<(&[&str], &Actions<Engine>)> = Vec::new();
            if self.config.builtins {
                installs.push((&add_at[..], &add));
                installs.push((&remove_at[..], &remove));
            }
            if !def.actions.is_empty() {
                installs.push((&own[..], &def.actions));
            }

            let mut tree = self.tree.borrow_mut();
            for (prefix, actions) in &installs {
                tree.check(prefix, actions)?;
            }
            for (prefix, actions) in installs {
                tree.install(prefix, actions)?;
            }
        }

        let index = self.components.borrow_mut().register(name, def)?;
        self.seed_global(name)?;
        debug!(component = name, index, "registered component");
        Ok(())
    }

    pub fn add_components<I, S>(&self, components: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, ComponentDef)>,
        S: AsRef<str>,
    {
        for (name, def) in components {
            self.add_component(name.as_ref(), def)?;
        }
        Ok(())
    }

    fn seed_global(&self, name: &str) -> Result<()> {
        let seed = {
            let components = self.components.borrow();
            components.get(name)?.global.as_ref().map(ComponentFactory::instantiate)
        };
        if let Some(value) = seed {
            self.world.borrow_mut().global.insert(name.to_owned(), value);
        }
        Ok(())
    }

    pub fn components(&self) -> Ref<'_, ComponentRegistry> {
        self.components.borrow()
    }

    // ---- Systems ----

    /// Register a system and attach it right away.
    pub fn add_system(&self, name: &str, system: Rc<dyn System>) -> Result<()> {
        self.ensure_stopped("add a system")?;
        self.register_system(name, Rc::clone(&system))?;
        self.attach_system(name, system)
    }

    /// Register every system first, then attach them in order, so systems
    /// can find each other from `attach`.
    pub fn add_systems<I, S>(&self, systems: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Rc<dyn System>)>,
        S: AsRef<str>,
    {
        self.ensure_stopped("add a system")?;
        let systems: Vec<(S, Rc<dyn System>)> = systems.into_iter().collect();
        for (name, system) in &systems {
            self.register_system(name.as_ref(), Rc::clone(system))?;
        }
        for (name, system) in systems {
            self.attach_system(name.as_ref(), system)?;
        }
        Ok(())
    }

    pub fn system(&self, name: &str) -> Option<Rc<dyn System>> {
        self.systems.borrow().get(name).cloned()
    }

    pub fn system_names(&self) -> Vec<String> {
        self.systems.borrow().keys().cloned().collect()
    }

    fn register_system(&self, name: &str, system: Rc<dyn System>) -> Result<()> {
        let mut systems = self.systems.borrow_mut();
        if systems.contains_key(name) {
            return Err(Error::StructuralConflict(name.to_owned()));
        }
        systems.insert(name.to_owned(), system);
        Ok(())
    }

    fn attach_system(&self, name: &str, system: Rc<dyn System>) -> Result<()> {
        system.attach(self)?;
        let hooks = system.hooks();
        let count = hooks.len();
        for hook in hooks {
            self.attach_hook(&hook.path, hook.listener)?;
        }
        debug!(system = name, hooks = count, "attached system");
        Ok(())
    }

    // ---- Signals and actions ----

    /// Attach a listener to the signal named by a hook path.
    pub fn attach_hook(&self, path: &str, listener: Listener<Engine>) -> Result<()> {
        self.ensure_stopped("attach a hook")?;
        let hook = HookPath::parse(path)?;
        let signal = self.tree.borrow().signal(&hook)?;
        signal.add(listener, hook.options(self.config.default_priority));
        trace!(%hook, "attached hook");
        Ok(())
    }

    /// Detach a listener previously attached at `path`.
    pub fn detach_hook(&self, path: &str, listener: &Listener<Engine>) -> Result<bool> {
        let hook = HookPath::parse(path)?;
        let signal = self.tree.borrow().signal(&hook)?;
        Ok(signal.remove(listener))
    }

    /// Resolve a hook path to its signal, for direct subscription.
    pub fn signal(&self, path: &str) -> Result<Rc<ParentSignal<Engine>>> {
        let hook = HookPath::parse(path)?;
        self.tree.borrow().signal(&hook)
    }

    /// Resolve a dotted action path once, for repeated calls.
    pub fn action(&self, path: &str) -> Result<Callable<Engine>> {
        self.tree.borrow().callable(path)
    }

    /// Call an action. `Ok(None)` means its pre phase vetoed the call.
    pub fn call(&self, path: &str, args: Args) -> Result<Option<Value>> {
        let action = self.action(path)?;
        action.call(self, args)
    }

    fn call_external(&self, name: &str, args: Args) -> Result<()> {
        let action = self.tree.borrow().lookup(&[EXTERNAL, name]);
        if let Some(action) = action {
            action.call(self, args)?;
        }
        Ok(())
    }

    // ---- Lifecycle ----

    pub fn start(&self) -> Result<()> {
        self.call_external("start", Vec::new())?;
        self.running.set(true);
        info!("engine started");
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.call_external("stop", Vec::new())?;
        self.running.set(false);
        info!("engine stopped");
        Ok(())
    }

    pub fn update(&self, delta: f64) -> Result<()> {
        self.call_external("update", vec![Value::from(delta)])
    }

    // ---- Entities ----

    /// Create an entity through `entity.create`. Returns `None` if vetoed.
    pub fn create(&self, data: Value) -> Result<Option<EntityId>> {
        let created = self.call("entity.create", vec![data])?;
        Ok(created.as_ref().and_then(EntityId::from_value))
    }

    /// Delete an entity through `entity.delete`.
    pub fn delete(&self, entity: EntityId) -> Result<Option<Value>> {
        self.call("entity.delete", vec![entity.into()])
    }

    /// Add a component through `entity.add.<component>`.
    pub fn add(&self, entity: EntityId, component: &str, data: Value) -> Result<Option<Value>> {
        let path = format!("{ENTITY}.{ADD}.{component}");
        self.call(&path, vec![entity.into(), data])
    }

    /// Remove a component through `entity.remove.<component>`.
    pub fn remove(&self, entity: EntityId, component: &str) -> Result<Option<Value>> {
        let path = format!("{ENTITY}.{REMOVE}.{component}");
        self.call(&path, vec![entity.into()])
    }

    pub fn entity(&self, id: EntityId) -> Option<EntityRecord> {
        self.world.borrow().get(id).cloned()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.world.borrow().contains(id)
    }

    /// Mutate an entity's record in place. Bypasses signals; `f` must not
    /// call back into the engine.
    pub fn with_entity_mut<R>(&self, id: EntityId, f: impl FnOnce(&mut EntityRecord) -> R) -> Result<R> {
        let mut world = self.world.borrow_mut();
        let record = world.get_mut(id).ok_or(Error::UnknownEntity(id))?;
        Ok(f(record))
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.world.borrow().ids()
    }

    pub fn entity_count(&self) -> usize {
        self.world.borrow().len()
    }

    /// Read access to the entity store. Do not hold the guard across calls
    /// into the engine.
    pub fn world(&self) -> Ref<'_, WorldState> {
        self.world.borrow()
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.world.borrow().global.get(name).cloned()
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.world.borrow_mut().global.insert(name.to_owned(), value);
    }

    // ---- Families ----

    pub fn families(&self) -> Option<&Rc<FamilySystem>> {
        self.families.as_ref()
    }

    /// The family of entities carrying every one of `components`.
    pub fn family(&self, components: &[&str]) -> Result<Rc<Family>> {
        let families = self
            .families
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("the family system is disabled".to_owned()))?;
        families.get(self, components)
    }

    // ---- Snapshots ----

    /// The world in persisted form, with component serializers applied.
    pub fn snapshot(&self) -> WorldSnapshot {
        let components = self.components.borrow();
        let world = self.world.borrow();
        let entities = world
            .records()
            .map(|record| {
                let mut persisted = EntityRecord::new(record.id);
                for (name, value) in &record.components {
                    let value = match components.get(name) {
                        Ok(entry) => entry.serialize(value),
                        Err(_) => value.clone(),
                    };
                    persisted.components.insert(name.clone(), value);
                }
                persisted
            })
            .collect();
        WorldSnapshot {
            global: GlobalState {
                next_id: world.allocator().next_id(),
                values: world.global.clone(),
            },
            entities,
            free: world.allocator().free_list().to_vec(),
        }
    }

    /// Replace the world with a snapshot.
    ///
    /// The snapshot is validated first; a rejected snapshot leaves the world
    /// untouched. Current entities are deleted through `entity.delete`, the
    /// id counter and free list are restored, every persisted entity is
    /// recreated through `entity.create` with its id preserved, then
    /// `external.load` fires.
    pub fn load_snapshot(&self, snapshot: WorldSnapshot) -> Result<()> {
        self.ensure_stopped("load a snapshot")?;
        snapshot.validate()?;
        for id in self.entity_ids() {
            self.delete(id)?;
        }
        {
            let mut world = self.world.borrow_mut();
            world.reset();
            world.restore_allocator(snapshot.global.next_id, snapshot.free)?;
        }

        let count = snapshot.entities.len();
        for record in snapshot.entities {
            let mut data = record.components;
            data.insert("id".to_owned(), record.id.into());
            self.call("entity.create", vec![Value::Object(data), Value::Bool(true)])?;
        }

        {
            let components = self.components.borrow();
            let mut world = self.world.borrow_mut();
            world.global = snapshot.global.values;
            for entry in components.entries() {
                if let (Some(global), false) = (&entry.global, world.global.contains_key(&entry.name)) {
                    world.global.insert(entry.name.clone(), global.instantiate());
                }
            }
        }

        info!(entities = count, "loaded snapshot");
        self.call_external("load", Vec::new())
    }

    // ---- Built-in action handlers ----

    /// `entity.create(data?, ignore_missing?)`
    pub(crate) fn create_entity(&self, args: Args) -> Result<Value> {
        let data = match args.first() {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(data)) => data.clone(),
            Some(other) => {
                return Err(Error::InvalidArgument(format!(
                    "entity data must be an object, got {other}"
                )))
            }
        };
        let ignore_missing = args
            .get(1)
            .and_then(Value::as_bool)
            .unwrap_or(self.config.ignore_missing_on_create);

        let mut requested = None;
        let mut adds: Vec<(Callable<Engine>, Value)> = Vec::with_capacity(data.len());
        {
            let tree = self.tree.borrow();
            for (key, value) in data {
                if key == "id" {
                    let id = EntityId::from_value(&value).ok_or_else(|| {
                        Error::InvalidArgument(format!("invalid entity id {value}"))
                    })?;
                    requested = Some(id);
                    continue;
                }
                match tree.lookup(&[ENTITY, ADD, key.as_str()]) {
                    Some(add) => adds.push((add, value)),
                    None if ignore_missing => trace!(component = %key, "skipping unknown component"),
                    None => return Err(Error::MissingComponentOnCreate(key)),
                }
            }
        }

        let id = self.world.borrow_mut().spawn(requested)?;
        trace!(entity = %id, "created entity");
        for (add, value) in adds {
            add.call(self, vec![id.into(), value])?;
        }
        Ok(id.into())
    }

    /// `entity.delete(entity)`, returns the deleted record.
    pub(crate) fn delete_entity(&self, args: Args) -> Result<Value> {
        let id = entity_arg(&args, 0)?;
        let record = self
            .world
            .borrow_mut()
            .despawn(id)
            .ok_or(Error::UnknownEntity(id))?;
        trace!(entity = %id, "deleted entity");
        Ok(record.to_value())
    }

    /// `entity.add.<component>(entity, data?)`, returns the new value.
    pub(crate) fn add_to_entity(
        &self,
        component: &str,
        factory: &ComponentFactory,
        args: Args,
    ) -> Result<Value> {
        let id = entity_arg(&args, 0)?;
        let data = args.get(1).cloned().unwrap_or(Value::Null);
        let mut world = self.world.borrow_mut();
        let record = world.get_mut(id).ok_or(Error::UnknownEntity(id))?;
        if record.has(component) {
            return Err(Error::DuplicateComponentOnEntity {
                entity: id,
                component: component.to_owned(),
            });
        }
        let value = factory.instantiate_with(data);
        record.components.insert(component.to_owned(), value.clone());
        Ok(value)
    }

    /// `entity.remove.<component>(entity)`, returns whether it was present.
    pub(crate) fn remove_from_entity(&self, component: &str, args: Args) -> Result<Value> {
        let id = entity_arg(&args, 0)?;
        let mut world = self.world.borrow_mut();
        let record = world.get_mut(id).ok_or(Error::UnknownEntity(id))?;
        Ok(Value::Bool(record.components.remove(component).is_some()))
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("running", &self.running.get())
            .field("components", &self.components.borrow().len())
            .field("entities", &self.world.borrow().len())
            .field("systems", &self.system_names())
            .finish()
    }
}
