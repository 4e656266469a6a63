use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use tracing::trace;

use crate::error::Result;
use crate::signal::{Adapted, Adapter, DispatchMode, ParentSignal, Upstream};
use crate::types::{Args, Value};

/// Which part of an action pipeline a hook attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// Chained; may transform or veto the arguments.
    Pre,
    /// Broadcast of the (transformed) arguments before the handler runs.
    #[default]
    Emit,
    /// Broadcast of the arguments plus the handler's result.
    Post,
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pre" => Ok(Phase::Pre),
            "emit" => Ok(Phase::Emit),
            "post" => Ok(Phase::Post),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Pre => "pre",
            Phase::Emit => "emit",
            Phase::Post => "post",
        })
    }
}

type HandlerFn<C> = dyn Fn(&C, Args) -> Result<Value>;

/// The callable bound to an action.
pub struct Handler<C>(Rc<HandlerFn<C>>);

impl<C: 'static> Handler<C> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&C, Args) -> Result<Value> + 'static,
    {
        Self(Rc::new(f))
    }
}

impl<C> Handler<C> {
    pub fn call(&self, ctx: &C, args: Args) -> Result<Value> {
        (self.0)(ctx, args)
    }
}

impl<C> Clone for Handler<C> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<C> fmt::Debug for Handler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// The pre/emit/post signal triple owned by every node of the signal tree.
pub struct PhasedSignal<C> {
    pub pre: Rc<ParentSignal<C>>,
    pub emit: Rc<ParentSignal<C>>,
    pub post: Rc<ParentSignal<C>>,
}

impl<C: 'static> PhasedSignal<C> {
    /// Phases with nothing upstream.
    pub fn detached() -> Self {
        Self {
            pre: Rc::new(ParentSignal::detached(DispatchMode::Chained)),
            emit: Rc::new(ParentSignal::detached(DispatchMode::Broadcast)),
            post: Rc::new(ParentSignal::detached(DispatchMode::Broadcast)),
        }
    }

    /// Phases forwarding into `parent`'s phases. The emit and post phases go
    /// through `adapter` when one is given; the pre phase is forwarded as is
    /// so the chained result keeps this level's argument shape.
    pub fn forwarding_to(parent: &PhasedSignal<C>, adapter: Option<&Adapter>) -> Self {
        let phases = Self::detached();
        phases.link_to(parent, adapter);
        phases
    }

    /// Link these phases into `parent`. Returns `false` if any phase is
    /// already linked, in which case nothing changes.
    pub fn link_to(&self, parent: &PhasedSignal<C>, adapter: Option<&Adapter>) -> bool {
        if self.is_linked() {
            return false;
        }
        self.pre.set_upstream(parent.pre.clone());
        self.emit.set_upstream(upstream(&parent.emit, adapter));
        self.post.set_upstream(upstream(&parent.post, adapter));
        true
    }
}

impl<C> PhasedSignal<C> {
    /// Whether any phase already forwards upstream.
    pub fn is_linked(&self) -> bool {
        self.pre.has_upstream() || self.emit.has_upstream() || self.post.has_upstream()
    }

    pub fn phase(&self, phase: Phase) -> &Rc<ParentSignal<C>> {
        match phase {
            Phase::Pre => &self.pre,
            Phase::Emit => &self.emit,
            Phase::Post => &self.post,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.emit.is_empty() && self.post.is_empty()
    }
}

impl<C> Clone for PhasedSignal<C> {
    fn clone(&self) -> Self {
        Self {
            pre: Rc::clone(&self.pre),
            emit: Rc::clone(&self.emit),
            post: Rc::clone(&self.post),
        }
    }
}

impl<C> fmt::Debug for PhasedSignal<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhasedSignal")
            .field("pre", &self.pre)
            .field("emit", &self.emit)
            .field("post", &self.post)
            .finish()
    }
}

fn upstream<C: 'static>(target: &Rc<ParentSignal<C>>, adapter: Option<&Adapter>) -> Rc<dyn Upstream<C>> {
    match adapter {
        Some(adapter) => Rc::new(Adapted::new(Rc::clone(target), adapter.clone())),
        None => Rc::clone(target) as Rc<dyn Upstream<C>>,
    }
}

/// An action: a handler wrapped in the pre → emit → handler → post pipeline.
pub struct ActionSignal<C> {
    name: String,
    phases: PhasedSignal<C>,
    handler: Handler<C>,
    raw: bool,
}

impl<C> ActionSignal<C> {
    pub fn new(name: impl Into<String>, handler: Handler<C>, raw: bool, phases: PhasedSignal<C>) -> Self {
        Self {
            name: name.into(),
            phases,
            handler,
            raw,
        }
    }

    /// Fully qualified action path.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phases(&self) -> &PhasedSignal<C> {
        &self.phases
    }

    pub fn pre(&self) -> &Rc<ParentSignal<C>> {
        &self.phases.pre
    }

    pub fn emit(&self) -> &Rc<ParentSignal<C>> {
        &self.phases.emit
    }

    pub fn post(&self) -> &Rc<ParentSignal<C>> {
        &self.phases.post
    }

    /// Run the pipeline.
    ///
    /// Returns `Ok(None)` when the pre phase vetoed; neither the broadcast,
    /// the handler nor the post phase run in that case.
    pub fn dispatch(&self, ctx: &C, args: Args) -> Result<Option<Value>> {
        let args = if self.phases.pre.is_empty() {
            args
        } else {
            match self.phases.pre.dispatch(ctx, args)? {
                Some(args) => args,
                None => {
                    trace!(action = %self.name, "vetoed in pre phase");
                    return Ok(None);
                }
            }
        };

        if !self.phases.emit.is_empty() {
            self.phases.emit.dispatch(ctx, args.clone())?;
        }

        let result = if self.raw {
            self.handler.call(ctx, vec![Value::Array(args.clone())])?
        } else {
            self.handler.call(ctx, args.clone())?
        };

        if !self.phases.post.is_empty() {
            let mut post_args = args;
            post_args.push(result.clone());
            self.phases.post.dispatch(ctx, post_args)?;
        }
        Ok(Some(result))
    }
}

impl<C> fmt::Debug for ActionSignal<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSignal")
            .field("name", &self.name)
            .field("raw", &self.raw)
            .field("phases", &self.phases)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::signal::{Listener, DEFAULT_PRIORITY};
    use serde_json::json;

    type Log = Rc<RefCell<Vec<String>>>;

    fn tracer(log: &Log, tag: &'static str) -> Listener<()> {
        let log = log.clone();
        Listener::observe(move |_, _| {
            log.borrow_mut().push(tag.to_owned());
            Ok(())
        })
    }

    fn summing_action(log: &Log) -> ActionSignal<()> {
        let log = log.clone();
        let handler = Handler::new(move |_: &(), args: Args| {
            log.borrow_mut().push("handler".to_owned());
            Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
        });
        ActionSignal::new("math.sum", handler, false, PhasedSignal::detached())
    }

    #[test]
    fn pipeline_order() {
        let log = Log::default();
        let action = summing_action(&log);
        action.post().on(tracer(&log, "post"), DEFAULT_PRIORITY);
        action.emit().on(tracer(&log, "emit"), DEFAULT_PRIORITY);
        action.pre().on(tracer(&log, "pre"), DEFAULT_PRIORITY);

        let result = action.dispatch(&(), vec![json!(1), json!(2)]).unwrap();
        assert_eq!(result, Some(json!(3)));
        assert_eq!(*log.borrow(), vec!["pre", "emit", "handler", "post"]);
    }

    #[test]
    fn pre_veto_cancels_everything() {
        let log = Log::default();
        let action = summing_action(&log);
        action.pre().on(Listener::new(|_: &(), _| Ok(None)), DEFAULT_PRIORITY);
        action.emit().on(tracer(&log, "emit"), DEFAULT_PRIORITY);
        action.post().on(tracer(&log, "post"), DEFAULT_PRIORITY);

        assert_eq!(action.dispatch(&(), vec![json!(1)]).unwrap(), None);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn pre_transforms_handler_arguments() {
        let log = Log::default();
        let action = summing_action(&log);
        action.pre().on(
            Listener::new(|_: &(), mut args: Args| {
                args.push(json!(10));
                Ok(Some(args))
            }),
            DEFAULT_PRIORITY,
        );
        assert_eq!(action.dispatch(&(), vec![json!(1)]).unwrap(), Some(json!(11)));
    }

    #[test]
    fn post_receives_appended_result() {
        let log = Log::default();
        let action = summing_action(&log);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        action.post().on(
            Listener::observe(move |_: &(), args| {
                sink.borrow_mut().extend_from_slice(args);
                Ok(())
            }),
            DEFAULT_PRIORITY,
        );
        action.dispatch(&(), vec![json!(2), json!(5)]).unwrap();
        assert_eq!(*seen.borrow(), vec![json!(2), json!(5), json!(7)]);
    }

    #[test]
    fn raw_handler_gets_argument_list() {
        let handler = Handler::new(|_: &(), args: Args| {
            assert_eq!(args.len(), 1);
            Ok(json!(args[0].as_array().map(Vec::len)))
        });
        let action = ActionSignal::new("raw", handler, true, PhasedSignal::detached());
        assert_eq!(
            action.dispatch(&(), vec![json!(1), json!(2), json!(3)]).unwrap(),
            Some(json!(3))
        );
    }

    #[test]
    fn local_post_completes_before_ancestor_post() {
        let log = Log::default();
        let parent = PhasedSignal::<()>::detached();
        parent.post.on(tracer(&log, "ancestor"), 0);
        let handler = Handler::new(|_: &(), _| Ok(Value::Null));
        let action = ActionSignal::new(
            "child",
            handler,
            false,
            PhasedSignal::forwarding_to(&parent, Some(&Adapter::prepend("child"))),
        );
        action.post().on(tracer(&log, "local-late"), 1_000);
        action.post().on(tracer(&log, "local-early"), 1);
        action.dispatch(&(), vec![]).unwrap();
        assert_eq!(*log.borrow(), vec!["local-early", "local-late", "ancestor"]);
    }

    #[test]
    fn reentrant_dispatch() {
        let depth = Rc::new(RefCell::new(Vec::new()));
        let record = depth.clone();
        let action: Rc<RefCell<Option<Rc<ActionSignal<()>>>>> = Rc::new(RefCell::new(None));
        let inner = action.clone();
        let handler = Handler::new(move |ctx: &(), args: Args| {
            let n = args[0].as_i64().unwrap_or(0);
            record.borrow_mut().push(n);
            if n > 0 {
                let me = inner.borrow().clone();
                if let Some(me) = me {
                    me.dispatch(ctx, vec![json!(n - 1)])?;
                }
            }
            Ok(json!(n))
        });
        let signal = Rc::new(ActionSignal::new("countdown", handler, false, PhasedSignal::detached()));
        *action.borrow_mut() = Some(signal.clone());
        signal.dispatch(&(), vec![json!(3)]).unwrap();
        assert_eq!(*depth.borrow(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn phase_parsing() {
        assert_eq!("pre".parse::<Phase>(), Ok(Phase::Pre));
        assert_eq!("post".parse::<Phase>(), Ok(Phase::Post));
        assert_eq!("emit".parse::<Phase>(), Ok(Phase::Emit));
        assert!("during".parse::<Phase>().is_err());
    }
}
