//! Declarative action descriptions consumed by [`SignalTree::install`].
//!
//! [`SignalTree::install`]: crate::tree::SignalTree::install

use crate::error::Result;
use crate::signal::{Adapter, Handler};
use crate::types::{Args, Value};

/// One entry of an action description.
pub enum ActionDescriptor<C> {
    /// A plain function: called directly, no phases, not hookable.
    Thunk(Handler<C>),
    /// A handler wrapped in the pre/emit/post pipeline. `adapter` reformats
    /// the arguments when the emit and post phases forward to the level's
    /// wildcard. `raw` hands the handler its arguments as one array value.
    Wrapped {
        handler: Handler<C>,
        adapter: Option<Adapter>,
        raw: bool,
    },
    /// A deeper namespace level.
    Namespace(Actions<C>),
}

/// An ordered set of named action descriptors forming one namespace level.
pub struct Actions<C> {
    entries: Vec<(String, ActionDescriptor<C>)>,
    wildcard: Option<Adapter>,
}

impl<C> Actions<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            wildcard: None,
        }
    }

    /// Add an entry. A later entry with the same name is reported as a
    /// conflict when the description is installed.
    pub fn describe(mut self, name: impl Into<String>, descriptor: ActionDescriptor<C>) -> Self {
        self.entries.push((name.into(), descriptor));
        self
    }

    pub fn namespace(self, name: impl Into<String>, actions: Actions<C>) -> Self {
        self.describe(name, ActionDescriptor::Namespace(actions))
    }

    /// Make this level's wildcard forward into the enclosing level's
    /// wildcard, reformatting emit/post arguments with `adapter`.
    pub fn wildcard(mut self, adapter: Adapter) -> Self {
        self.wildcard = Some(adapter);
        self
    }

    pub fn wildcard_adapter(&self) -> Option<&Adapter> {
        self.wildcard.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ActionDescriptor<C>)> {
        self.entries.iter().map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.wildcard.is_none()
    }
}

impl<C: 'static> Actions<C> {
    pub fn thunk<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&C, Args) -> Result<Value> + 'static,
    {
        self.describe(name, ActionDescriptor::Thunk(Handler::new(f)))
    }

    pub fn action<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&C, Args) -> Result<Value> + 'static,
    {
        self.describe(
            name,
            ActionDescriptor::Wrapped {
                handler: Handler::new(f),
                adapter: None,
                raw: false,
            },
        )
    }

    pub fn adapted<F>(self, name: impl Into<String>, adapter: Adapter, f: F) -> Self
    where
        F: Fn(&C, Args) -> Result<Value> + 'static,
    {
        self.describe(
            name,
            ActionDescriptor::Wrapped {
                handler: Handler::new(f),
                adapter: Some(adapter),
                raw: false,
            },
        )
    }

    pub fn raw_action<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&C, Args) -> Result<Value> + 'static,
    {
        self.describe(
            name,
            ActionDescriptor::Wrapped {
                handler: Handler::new(f),
                adapter: None,
                raw: true,
            },
        )
    }
}

impl<C> Default for Actions<C> {
    fn default() -> Self {
        Self::new()
    }
}
