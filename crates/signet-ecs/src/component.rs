use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use signet_core::{Actions, Error, Map, Result, Value};

use crate::engine::Engine;

/// How fresh component values are produced. Chosen once at registration.
#[derive(Clone)]
pub enum ComponentFactory {
    /// Call a constructor for every instance.
    Constructor(Rc<dyn Fn() -> Value>),
    /// Shallow-clone an object template.
    Template(Map),
    /// Copy a primitive (or array) value.
    Primitive(Value),
}

impl ComponentFactory {
    /// Pick the factory kind matching a default value.
    pub fn from_default(default: Value) -> Self {
        match default {
            Value::Object(template) => ComponentFactory::Template(template),
            other => ComponentFactory::Primitive(other),
        }
    }

    pub fn constructor<F>(f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        ComponentFactory::Constructor(Rc::new(f))
    }

    pub fn instantiate(&self) -> Value {
        match self {
            ComponentFactory::Constructor(f) => f(),
            ComponentFactory::Template(template) => Value::Object(template.clone()),
            ComponentFactory::Primitive(value) => value.clone(),
        }
    }

    /// A fresh instance with `data` applied. Object data is merged key by key
    /// over an object instance; anything else (except null) replaces it.
    pub fn instantiate_with(&self, data: Value) -> Value {
        let mut instance = self.instantiate();
        match (&mut instance, data) {
            (_, Value::Null) => {}
            (Value::Object(fields), Value::Object(overrides)) => fields.extend(overrides),
            (_, data) => instance = data,
        }
        instance
    }
}

impl fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentFactory::Constructor(_) => f.write_str("Constructor"),
            ComponentFactory::Template(template) => f.debug_tuple("Template").field(template).finish(),
            ComponentFactory::Primitive(value) => f.debug_tuple("Primitive").field(value).finish(),
        }
    }
}

/// Turns a component value into its persisted form.
pub type Serializer = Rc<dyn Fn(&Value) -> Value>;

/// Everything a component brings to the engine.
pub struct ComponentDef {
    pub factory: ComponentFactory,
    /// Installed under the component's own namespace.
    pub actions: Actions<Engine>,
    pub serializer: Option<Serializer>,
    /// Seeds the component's slot in global state.
    pub global: Option<ComponentFactory>,
}

impl ComponentDef {
    pub fn new(default: Value) -> Self {
        Self::with_factory(ComponentFactory::from_default(default))
    }

    pub fn with_factory(factory: ComponentFactory) -> Self {
        Self {
            factory,
            actions: Actions::new(),
            serializer: None,
            global: None,
        }
    }

    pub fn actions(mut self, actions: Actions<Engine>) -> Self {
        self.actions = actions;
        self
    }

    pub fn serializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Value + 'static,
    {
        self.serializer = Some(Rc::new(f));
        self
    }

    pub fn global(mut self, initial: Value) -> Self {
        self.global = Some(ComponentFactory::from_default(initial));
        self
    }
}

/// A registered component.
#[derive(Clone)]
pub struct ComponentEntry {
    pub index: usize,
    pub name: String,
    pub factory: ComponentFactory,
    pub serializer: Option<Serializer>,
    pub global: Option<ComponentFactory>,
}

impl ComponentEntry {
    /// The value as it should be persisted.
    pub fn serialize(&self, value: &Value) -> Value {
        match &self.serializer {
            Some(serializer) => serializer(value),
            None => value.clone(),
        }
    }
}

/// Component name → dense index, assigned in registration order.
#[derive(Default)]
pub struct ComponentRegistry {
    entries: Vec<ComponentEntry>,
    by_name: HashMap<String, usize>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under the next free index. Its actions are not
    /// kept; they live in the signal tree.
    pub fn register(&mut self, name: &str, def: ComponentDef) -> Result<usize> {
        check_name(name)?;
        if self.by_name.contains_key(name) {
            return Err(Error::StructuralConflict(name.to_owned()));
        }
        let index = self.entries.len();
        self.entries.push(ComponentEntry {
            index,
            name: name.to_owned(),
            factory: def.factory,
            serializer: def.serializer,
            global: def.global,
        });
        self.by_name.insert(name.to_owned(), index);
        Ok(index)
    }

    pub fn get(&self, name: &str) -> Result<&ComponentEntry> {
        self.by_name
            .get(name)
            .map(|&index| &self.entries[index])
            .ok_or_else(|| Error::UnknownComponent(name.to_owned()))
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.get(name).map(|entry| entry.index)
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|entry| entry.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = &ComponentEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Component names become path segments and record keys, so they must be
/// non-empty, free of hook path syntax and distinct from the `id` key.
pub fn check_name(name: &str) -> Result<()> {
    let reserved = |c: char| matches!(c, '.' | ':' | '@' | '*' | '[' | ']');
    if name.is_empty() || name == "id" || name.contains(reserved) {
        return Err(Error::InvalidArgument(format!(
            "invalid component name {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dense_indices_in_registration_order() {
        let mut registry = ComponentRegistry::new();
        let a = registry
            .register("position", ComponentDef::new(json!({})))
            .unwrap();
        let b = registry
            .register("velocity", ComponentDef::new(json!({})))
            .unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(registry.index_of("velocity").unwrap(), 1);
        assert_eq!(registry.name_of(0), Some("position"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["position", "velocity"]);
    }

    #[test]
    fn reregistering_conflicts() {
        let mut registry = ComponentRegistry::new();
        registry
            .register("tag", ComponentDef::new(json!(true)))
            .unwrap();
        assert!(matches!(
            registry.register("tag", ComponentDef::new(json!(false))),
            Err(Error::StructuralConflict(_))
        ));
        assert!(matches!(registry.index_of("nope"), Err(Error::UnknownComponent(_))));
    }

    #[test]
    fn names_must_be_plain_segments() {
        let mut registry = ComponentRegistry::new();
        for name in ["", "id", "a.b", "a:post", "a@5", "*", "a[]"] {
            assert!(
                matches!(
                    registry.register(name, ComponentDef::new(json!(0))),
                    Err(Error::InvalidArgument(_))
                ),
                "{name:?} was accepted"
            );
        }
        assert!(registry.is_empty());
        registry.register("snake_case-ok", ComponentDef::new(json!(0))).unwrap();
    }

    #[test]
    fn factory_kinds() {
        assert!(matches!(
            ComponentFactory::from_default(json!({"x": 0})),
            ComponentFactory::Template(_)
        ));
        assert!(matches!(
            ComponentFactory::from_default(json!(3)),
            ComponentFactory::Primitive(_)
        ));
        let counter = std::cell::Cell::new(0);
        let counter = Rc::new(counter);
        let shared = counter.clone();
        let factory = ComponentFactory::constructor(move || {
            shared.set(shared.get() + 1);
            json!(shared.get())
        });
        assert_eq!(factory.instantiate(), json!(1));
        assert_eq!(factory.instantiate(), json!(2));
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn instantiate_with_merges_objects() {
        let factory = ComponentFactory::from_default(json!({"x": 0, "y": 0}));
        assert_eq!(factory.instantiate_with(json!({"y": 5})), json!({"x": 0, "y": 5}));
        assert_eq!(factory.instantiate_with(Value::Null), json!({"x": 0, "y": 0}));
        let primitive = ComponentFactory::from_default(json!(1));
        assert_eq!(primitive.instantiate_with(json!(9)), json!(9));
    }

    #[test]
    fn serializer_hook() {
        let entry = ComponentEntry {
            index: 0,
            name: "secret".to_owned(),
            factory: ComponentFactory::from_default(Value::Null),
            serializer: Some(Rc::new(|_: &Value| json!("<redacted>"))),
            global: None,
        };
        assert_eq!(entry.serialize(&json!("hunter2")), json!("<redacted>"));
    }
}
