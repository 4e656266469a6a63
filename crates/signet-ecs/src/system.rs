use std::fmt;
use std::rc::Rc;

use signet_core::{Listener, Result, Value};

use crate::engine::Engine;

/// A system plugs behavior into the engine by attaching listeners to signal
/// paths. Systems are registered by name and attached once.
pub trait System {
    /// Called once when the system is attached, before its hooks.
    fn attach(&self, _engine: &Engine) -> Result<()> {
        Ok(())
    }

    /// Listeners to attach, keyed by hook path (`a.b:post@50`).
    fn hooks(self: Rc<Self>) -> Vec<Hook> {
        Vec::new()
    }
}

/// A listener bound to a hook path.
#[derive(Clone)]
pub struct Hook {
    pub path: String,
    pub listener: Listener<Engine>,
}

impl Hook {
    pub fn new(path: impl Into<String>, listener: Listener<Engine>) -> Self {
        Self {
            path: path.into(),
            listener,
        }
    }

    /// A hook whose listener only observes its arguments.
    pub fn observe<F>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Engine, &[Value]) -> Result<()> + 'static,
    {
        Self::new(path, Listener::observe(f))
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("path", &self.path)
            .field("listener", &self.listener)
            .finish()
    }
}

/// A system made only of hooks.
#[derive(Debug, Clone, Default)]
pub struct HookSystem {
    hooks: Vec<Hook>,
}

impl HookSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook(mut self, path: impl Into<String>, listener: Listener<Engine>) -> Self {
        self.hooks.push(Hook::new(path, listener));
        self
    }

    pub fn observe<F>(mut self, path: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Engine, &[Value]) -> Result<()> + 'static,
    {
        self.hooks.push(Hook::observe(path, f));
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl System for HookSystem {
    fn hooks(self: Rc<Self>) -> Vec<Hook> {
        self.hooks.clone()
    }
}
