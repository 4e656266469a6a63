//! The `external` and `entity` namespaces every engine starts with.
//!
//! `external.*` receives `[action, ...args]` for every host-driven event.
//! `entity.add.*` and `entity.remove.*` receive `[entity, component, data?,
//! result]`, and forward to `entity.*` with the action name prepended.

use signet_core::{Actions, Adapter, Value};

use crate::component::ComponentFactory;
use crate::engine::Engine;

pub const EXTERNAL: &str = "external";
pub const ENTITY: &str = "entity";
pub const ADD: &str = "add";
pub const REMOVE: &str = "remove";

pub(crate) fn external_actions() -> Actions<Engine> {
    ["update", "start", "stop", "load"]
        .into_iter()
        .fold(Actions::new(), |actions, name| {
            actions.adapted(name, Adapter::prepend(name), |_, _| Ok(Value::Null))
        })
}

pub(crate) fn entity_actions() -> Actions<Engine> {
    Actions::new()
        .adapted("create", Adapter::prepend("create"), |engine: &Engine, args| {
            engine.create_entity(args)
        })
        .adapted("delete", Adapter::prepend("delete"), |engine: &Engine, args| {
            engine.delete_entity(args)
        })
        .namespace(ADD, Actions::new().wildcard(Adapter::prepend(ADD)))
        .namespace(REMOVE, Actions::new().wildcard(Adapter::prepend(REMOVE)))
}

/// `entity.add.<name>(entity, data?)`
pub(crate) fn add_action(name: &str, factory: ComponentFactory) -> Actions<Engine> {
    let component = name.to_owned();
    Actions::new().adapted(name, Adapter::insert(1, name), move |engine: &Engine, args| {
        engine.add_to_entity(&component, &factory, args)
    })
}

/// `entity.remove.<name>(entity)`
pub(crate) fn remove_action(name: &str) -> Actions<Engine> {
    let component = name.to_owned();
    Actions::new().adapted(name, Adapter::insert(1, name), move |engine: &Engine, args| {
        engine.remove_from_entity(&component, args)
    })
}
