use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::signal::{DispatchMode, Listener, Signal, SlotOptions};
use crate::types::{Args, Value};

/// Something a [`ParentSignal`] forwards to after running its own listeners.
pub trait Upstream<C> {
    fn forward(&self, ctx: &C, args: Args) -> Result<Option<Args>>;

    /// Whether forwarding would reach no listener at all.
    fn is_empty(&self) -> bool;
}

/// Reformats an argument list before it is forwarded one namespace level up.
#[derive(Clone)]
pub struct Adapter(Rc<dyn Fn(Args) -> Args>);

impl Adapter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Args) -> Args + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn identity() -> Self {
        Self::new(|args| args)
    }

    /// Put `value` in front of the arguments, e.g. the action name.
    pub fn prepend(value: impl Into<Value>) -> Self {
        Self::insert(0, value)
    }

    /// Insert `value` at `pos` (clamped to the argument count).
    pub fn insert(pos: usize, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(move |mut args| {
            let at = pos.min(args.len());
            args.insert(at, value.clone());
            args
        })
    }

    pub fn apply(&self, args: Args) -> Args {
        (self.0)(args)
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Adapter")
    }
}

/// Forwards into a target signal through an [`Adapter`].
pub struct Adapted<C> {
    target: Rc<ParentSignal<C>>,
    adapter: Adapter,
}

impl<C> Adapted<C> {
    pub fn new(target: Rc<ParentSignal<C>>, adapter: Adapter) -> Self {
        Self { target, adapter }
    }
}

impl<C> Upstream<C> for Adapted<C> {
    fn forward(&self, ctx: &C, args: Args) -> Result<Option<Args>> {
        self.target.dispatch(ctx, self.adapter.apply(args))
    }

    fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// A signal that hands its arguments to an upstream once its own listeners
/// are done.
///
/// Chained: the (possibly transformed) result is forwarded and the upstream's
/// result is returned. Broadcast: the original arguments are forwarded and
/// the upstream's result is ignored. Local listeners always complete before
/// the upstream starts.
pub struct ParentSignal<C> {
    signal: Signal<C>,
    upstream: RefCell<Option<Rc<dyn Upstream<C>>>>,
}

impl<C> ParentSignal<C> {
    pub fn new(mode: DispatchMode, upstream: Option<Rc<dyn Upstream<C>>>) -> Self {
        Self {
            signal: Signal::new(mode),
            upstream: RefCell::new(upstream),
        }
    }

    pub fn detached(mode: DispatchMode) -> Self {
        Self::new(mode, None)
    }

    pub fn mode(&self) -> DispatchMode {
        self.signal.mode()
    }

    /// The local signal, without the upstream.
    pub fn local(&self) -> &Signal<C> {
        &self.signal
    }

    pub fn add(&self, listener: Listener<C>, options: SlotOptions) {
        self.signal.add(listener, options);
    }

    pub fn on(&self, listener: Listener<C>, priority: i32) {
        self.signal.on(listener, priority);
    }

    pub fn once(&self, listener: Listener<C>, priority: i32) {
        self.signal.once(listener, priority);
    }

    pub fn remove(&self, listener: &Listener<C>) -> bool {
        self.signal.remove(listener)
    }

    pub fn len(&self) -> usize {
        self.signal.len()
    }

    pub fn has_upstream(&self) -> bool {
        self.upstream.borrow().is_some()
    }

    /// Link an upstream after construction. Returns `false` if one is
    /// already set.
    pub fn set_upstream(&self, upstream: Rc<dyn Upstream<C>>) -> bool {
        let mut slot = self.upstream.borrow_mut();
        if slot.is_some() {
            return false;
        }
        *slot = Some(upstream);
        true
    }

    /// True when neither this signal nor anything upstream has listeners.
    pub fn is_empty(&self) -> bool {
        self.signal.is_empty() && self.live_upstream().is_none()
    }

    pub fn dispatch(&self, ctx: &C, args: Args) -> Result<Option<Args>> {
        let upstream = self.live_upstream();
        match self.signal.mode() {
            DispatchMode::Chained => {
                let Some(result) = self.signal.dispatch(ctx, args)? else {
                    return Ok(None);
                };
                match upstream {
                    Some(upstream) => upstream.forward(ctx, result),
                    None => Ok(Some(result)),
                }
            }
            DispatchMode::Broadcast => match upstream {
                Some(upstream) => {
                    self.signal.dispatch(ctx, args.clone())?;
                    upstream.forward(ctx, args.clone())?;
                    Ok(Some(args))
                }
                None => self.signal.dispatch(ctx, args),
            },
        }
    }

    fn live_upstream(&self) -> Option<Rc<dyn Upstream<C>>> {
        self.upstream
            .borrow()
            .as_ref()
            .filter(|upstream| !upstream.is_empty())
            .cloned()
    }
}

impl<C> Upstream<C> for ParentSignal<C> {
    fn forward(&self, ctx: &C, args: Args) -> Result<Option<Args>> {
        self.dispatch(ctx, args)
    }

    fn is_empty(&self) -> bool {
        ParentSignal::is_empty(self)
    }
}

impl<C> fmt::Debug for ParentSignal<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentSignal")
            .field("signal", &self.signal)
            .field("upstream", &self.has_upstream())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::DEFAULT_PRIORITY;
    use serde_json::json;

    type Log = Rc<RefCell<Vec<(String, Args)>>>;

    fn up(signal: &Rc<ParentSignal<()>>) -> Option<Rc<dyn Upstream<()>>> {
        Some(signal.clone())
    }

    fn record(log: &Log, tag: &str) -> Listener<()> {
        let log = log.clone();
        let tag = tag.to_owned();
        Listener::observe(move |_, args| {
            log.borrow_mut().push((tag.clone(), args.to_vec()));
            Ok(())
        })
    }

    #[test]
    fn broadcast_forwards_original_arguments_after_local() {
        let log = Log::default();
        let parent = Rc::new(ParentSignal::detached(DispatchMode::Broadcast));
        parent.on(record(&log, "parent"), DEFAULT_PRIORITY);
        let child = ParentSignal::new(DispatchMode::Broadcast, up(&parent));
        child.on(record(&log, "child"), 1_000);

        child.dispatch(&(), vec![json!(1)]).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                ("child".to_owned(), vec![json!(1)]),
                ("parent".to_owned(), vec![json!(1)]),
            ]
        );
    }

    #[test]
    fn chained_forwards_transformed_result() {
        let parent = Rc::new(ParentSignal::detached(DispatchMode::Chained));
        parent.on(
            Listener::new(|_: &(), args: Args| {
                Ok(Some(vec![json!(args[0].as_i64().unwrap() * 10)]))
            }),
            DEFAULT_PRIORITY,
        );
        let child = ParentSignal::new(DispatchMode::Chained, up(&parent));
        child.on(
            Listener::new(|_: &(), args: Args| {
                Ok(Some(vec![json!(args[0].as_i64().unwrap() + 1)]))
            }),
            DEFAULT_PRIORITY,
        );
        assert_eq!(
            child.dispatch(&(), vec![json!(1)]).unwrap(),
            Some(vec![json!(20)])
        );
    }

    #[test]
    fn chained_veto_is_not_forwarded() {
        let log = Log::default();
        let parent = Rc::new(ParentSignal::detached(DispatchMode::Chained));
        parent.on(record(&log, "parent"), DEFAULT_PRIORITY);
        let child = ParentSignal::new(DispatchMode::Chained, up(&parent));
        child.on(Listener::new(|_: &(), _| Ok(None)), DEFAULT_PRIORITY);
        assert_eq!(child.dispatch(&(), vec![]).unwrap(), None);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn adapter_reformats_before_forwarding() {
        let log = Log::default();
        let parent = Rc::new(ParentSignal::detached(DispatchMode::Broadcast));
        parent.on(record(&log, "parent"), DEFAULT_PRIORITY);
        let adapted: Rc<dyn Upstream<()>> =
            Rc::new(Adapted::new(parent.clone(), Adapter::insert(1, "position")));
        let child = ParentSignal::new(DispatchMode::Broadcast, Some(adapted));
        child.dispatch(&(), vec![json!(4), json!({"x": 1})]).unwrap();
        assert_eq!(
            log.borrow()[0].1,
            vec![json!(4), json!("position"), json!({"x": 1})]
        );
    }

    #[test]
    fn emptiness_includes_upstream() {
        let parent = Rc::new(ParentSignal::<()>::detached(DispatchMode::Broadcast));
        let child = ParentSignal::new(DispatchMode::Broadcast, up(&parent));
        assert!(child.is_empty());
        let listener = Listener::observe(|_: &(), _| Ok(()));
        parent.on(listener.clone(), DEFAULT_PRIORITY);
        assert!(!child.is_empty());
        parent.remove(&listener);
        assert!(child.is_empty());
    }

    #[test]
    fn upstream_is_set_once() {
        let parent = Rc::new(ParentSignal::<()>::detached(DispatchMode::Broadcast));
        let child = ParentSignal::<()>::detached(DispatchMode::Broadcast);
        assert!(child.set_upstream(parent.clone()));
        assert!(!child.set_upstream(parent));
    }
}
