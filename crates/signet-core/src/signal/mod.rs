//! Ordered multicast signals and the phased pipelines built on top of them.
//!
//! A [`Signal`] runs its listeners in ascending priority order (stable on
//! ties). In [`DispatchMode::Broadcast`] every listener sees the original
//! arguments; in [`DispatchMode::Chained`] each listener receives the previous
//! listener's return value and a `None` return halts the dispatch.
//!
//! Dispatch iterates over a snapshot of the slot list, so listeners may add or
//! remove listeners (or dispatch the same signal again) while it runs.
//! Tombstoned `once` slots are compacted after the pass.

mod action;
mod parent;
mod slot;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::types::Args;

pub use action::{ActionSignal, Handler, Phase, PhasedSignal};
pub use parent::{Adapted, Adapter, ParentSignal, Upstream};
pub use slot::{Listener, SlotOptions, DEFAULT_PRIORITY};

pub(crate) use slot::Slot;

/// How a signal threads arguments through its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Broadcast,
    Chained,
}

pub struct Signal<C> {
    mode: DispatchMode,
    slots: RefCell<Vec<Rc<Slot<C>>>>,
    dirty: Cell<bool>,
}

impl<C> Signal<C> {
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            mode,
            slots: RefCell::new(Vec::new()),
            dirty: Cell::new(false),
        }
    }

    pub fn broadcast() -> Self {
        Self::new(DispatchMode::Broadcast)
    }

    pub fn chained() -> Self {
        Self::new(DispatchMode::Chained)
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Register a listener.
    pub fn add(&self, listener: Listener<C>, options: SlotOptions) {
        self.slots
            .borrow_mut()
            .push(Rc::new(Slot::new(listener, options)));
        self.dirty.set(true);
    }

    /// Register a listener at the given priority.
    pub fn on(&self, listener: Listener<C>, priority: i32) {
        self.add(listener, SlotOptions::priority(priority));
    }

    /// Register a listener that removes itself after its first execution.
    pub fn once(&self, listener: Listener<C>, priority: i32) {
        self.add(listener, SlotOptions::priority(priority).once());
    }

    /// Deregister a listener by identity. Returns `false` if it was not
    /// registered. A removed listener never fires again, even later in a
    /// dispatch that is already in flight.
    pub fn remove(&self, listener: &Listener<C>) -> bool {
        let mut slots = self.slots.borrow_mut();
        let Some(pos) = slots
            .iter()
            .position(|slot| !slot.is_deleted() && slot.listener.ptr_eq(listener))
        else {
            return false;
        };
        slots.remove(pos).tombstone();
        true
    }

    /// Drop every listener.
    pub fn clear(&self) {
        for slot in self.slots.borrow_mut().drain(..) {
            slot.tombstone();
        }
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| !slot.is_deleted())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().iter().all(|slot| slot.is_deleted())
    }

    /// Run every listener in priority order.
    ///
    /// Broadcast signals return the original arguments. Chained signals
    /// return the last listener's result, or `None` as soon as a listener
    /// vetoes. An error aborts the pass and is returned after compaction.
    pub fn dispatch(&self, ctx: &C, args: Args) -> Result<Option<Args>> {
        let slots = self.sorted_snapshot();
        let outcome = match self.mode {
            DispatchMode::Broadcast => Self::run_broadcast(&slots, ctx, args),
            DispatchMode::Chained => Self::run_chained(&slots, ctx, args),
        };
        if slots.iter().any(|slot| slot.is_deleted()) {
            self.compact();
        }
        outcome
    }

    fn run_broadcast(slots: &[Rc<Slot<C>>], ctx: &C, args: Args) -> Result<Option<Args>> {
        for slot in slots {
            if slot.is_deleted() {
                continue;
            }
            slot.execute(ctx, args.clone())?;
        }
        Ok(Some(args))
    }

    fn run_chained(slots: &[Rc<Slot<C>>], ctx: &C, args: Args) -> Result<Option<Args>> {
        let mut current = args;
        for slot in slots {
            if slot.is_deleted() {
                continue;
            }
            match slot.execute(ctx, current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn sorted_snapshot(&self) -> Vec<Rc<Slot<C>>> {
        let mut slots = self.slots.borrow_mut();
        if self.dirty.replace(false) {
            // Stable: equal priorities keep registration order.
            slots.sort_by_key(|slot| slot.priority());
        }
        slots.clone()
    }

    fn compact(&self) {
        self.slots.borrow_mut().retain(|slot| !slot.is_deleted());
    }
}

impl<C> fmt::Debug for Signal<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("mode", &self.mode)
            .field("listeners", &self.len())
            .finish()
    }
}
