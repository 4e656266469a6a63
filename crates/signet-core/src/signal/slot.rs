use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::types::{Args, Value};

/// Priority given to listeners registered without an explicit one.
pub const DEFAULT_PRIORITY: i32 = 100;

type ListenerFn<C> = dyn Fn(&C, Args) -> Result<Option<Args>>;

/// A callable attached to a signal. Listeners are compared by identity, so
/// keep a clone around to remove it later.
pub struct Listener<C>(Rc<ListenerFn<C>>);

impl<C: 'static> Listener<C> {
    /// A listener that may transform its arguments.
    ///
    /// On a chained signal the returned list feeds the next listener and
    /// `None` halts the dispatch. On a broadcast signal the return is ignored.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&C, Args) -> Result<Option<Args>> + 'static,
    {
        Self(Rc::new(f))
    }

    /// A listener that only observes. It passes its arguments through
    /// unchanged when attached to a chained signal.
    pub fn observe<F>(f: F) -> Self
    where
        F: Fn(&C, &[Value]) -> Result<()> + 'static,
    {
        Self::new(move |ctx, args| {
            f(ctx, &args)?;
            Ok(Some(args))
        })
    }
}

impl<C> Listener<C> {
    /// Whether both handles refer to the same listener.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn call(&self, ctx: &C, args: Args) -> Result<Option<Args>> {
        (self.0)(ctx, args)
    }
}

impl<C> Clone for Listener<C> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<C> fmt::Debug for Listener<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Registration metadata for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotOptions {
    pub priority: i32,
    /// Invoke the listener with the argument list packed into one array value.
    pub raw: bool,
    /// Remove the listener after its first execution.
    pub once: bool,
}

impl SlotOptions {
    pub fn priority(priority: i32) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }
}

impl Default for SlotOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            raw: false,
            once: false,
        }
    }
}

/// One registered listener plus its metadata and tombstone flag.
pub(crate) struct Slot<C> {
    pub(crate) listener: Listener<C>,
    pub(crate) options: SlotOptions,
    deleted: Cell<bool>,
}

impl<C> Slot<C> {
    pub(crate) fn new(listener: Listener<C>, options: SlotOptions) -> Self {
        Self {
            listener,
            options,
            deleted: Cell::new(false),
        }
    }

    pub(crate) fn priority(&self) -> i32 {
        self.options.priority
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.get()
    }

    pub(crate) fn tombstone(&self) {
        self.deleted.set(true);
    }

    /// Run the listener. A `once` slot tombstones itself before running so a
    /// re-entrant dispatch cannot fire it a second time.
    pub(crate) fn execute(&self, ctx: &C, args: Args) -> Result<Option<Args>> {
        if self.options.once {
            self.tombstone();
        }
        if !self.options.raw {
            return self.listener.call(ctx, args);
        }
        let returned = self.listener.call(ctx, vec![Value::Array(args)])?;
        Ok(returned.map(unpack_raw))
    }
}

/// Undo the raw packing when a raw listener hands back a single array.
fn unpack_raw(args: Args) -> Args {
    match <[Value; 1]>::try_from(args) {
        Ok([Value::Array(inner)]) => inner,
        Ok([other]) => vec![other],
        Err(args) => args,
    }
}
