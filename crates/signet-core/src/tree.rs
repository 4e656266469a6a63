//! The namespace tree of actions and signals.
//!
//! Every namespace level owns a wildcard [`PhasedSignal`]. Actions at a level
//! forward their phases into that wildcard, and a level whose description
//! carries a `*` adapter forwards its wildcard into the enclosing level's
//! wildcard. Hook paths are resolved once, at attach time, to the concrete
//! signal they name.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::describe::{ActionDescriptor, Actions};
use crate::error::{Error, Result};
use crate::hook::HookPath;
use crate::signal::{ActionSignal, Handler, ParentSignal, PhasedSignal};
use crate::types::{Args, Value};

pub const WILDCARD: &str = "*";

pub enum SignalEntry<C> {
    Thunk(Handler<C>),
    Action(Rc<ActionSignal<C>>),
    Namespace(SignalNode<C>),
}

/// One namespace level.
pub struct SignalNode<C> {
    wildcard: PhasedSignal<C>,
    children: BTreeMap<String, SignalEntry<C>>,
}

impl<C: 'static> SignalNode<C> {
    fn new() -> Self {
        Self {
            wildcard: PhasedSignal::detached(),
            children: BTreeMap::new(),
        }
    }
}

impl<C> SignalNode<C> {
    /// The signal every action of this level (and of linked deeper levels)
    /// forwards into.
    pub fn wildcard(&self) -> &PhasedSignal<C> {
        &self.wildcard
    }

    pub fn get(&self, name: &str) -> Option<&SignalEntry<C>> {
        self.children.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }
}

/// A resolved, directly callable action.
pub enum Callable<C> {
    Thunk(Handler<C>),
    Action(Rc<ActionSignal<C>>),
}

impl<C> Callable<C> {
    /// Invoke the action. `Ok(None)` means the pre phase vetoed the call.
    pub fn call(&self, ctx: &C, args: Args) -> Result<Option<Value>> {
        match self {
            Callable::Thunk(handler) => handler.call(ctx, args).map(Some),
            Callable::Action(action) => action.dispatch(ctx, args),
        }
    }

    pub fn as_action(&self) -> Option<&Rc<ActionSignal<C>>> {
        match self {
            Callable::Action(action) => Some(action),
            Callable::Thunk(_) => None,
        }
    }
}

impl<C> Clone for Callable<C> {
    fn clone(&self) -> Self {
        match self {
            Callable::Thunk(handler) => Callable::Thunk(handler.clone()),
            Callable::Action(action) => Callable::Action(Rc::clone(action)),
        }
    }
}

impl<C> fmt::Debug for Callable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Thunk(_) => f.write_str("Callable::Thunk"),
            Callable::Action(action) => write!(f, "Callable::Action({})", action.name()),
        }
    }
}

pub struct SignalTree<C> {
    root: SignalNode<C>,
}

impl<C: 'static> SignalTree<C> {
    pub fn new() -> Self {
        Self {
            root: SignalNode::new(),
        }
    }

    /// Install a description at `prefix`, creating missing levels.
    ///
    /// Existing levels are extended. A name that already exists as an action
    /// or thunk, a namespace that collides with one, or a second `*` adapter
    /// for an already linked level is a [`Error::StructuralConflict`]. The
    /// whole description is checked first, so a failed install leaves the
    /// tree unchanged.
    pub fn install(&mut self, prefix: &[&str], actions: &Actions<C>) -> Result<()> {
        self.check(prefix, actions)?;
        let mut path: Vec<String> = Vec::with_capacity(prefix.len());
        let mut parent: Option<PhasedSignal<C>> = None;
        let mut node = &mut self.root;
        for segment in prefix {
            path.push((*segment).to_owned());
            parent = Some(node.wildcard.clone());
            node = namespace_entry(node, segment, &path)?;
        }
        install_level(node, parent.as_ref(), &mut path, actions)
    }
}

impl<C> SignalTree<C> {
    pub fn root(&self) -> &SignalNode<C> {
        &self.root
    }

    /// Report the first conflict installing `actions` at `prefix` would hit,
    /// without changing anything.
    pub fn check(&self, prefix: &[&str], actions: &Actions<C>) -> Result<()> {
        let mut path: Vec<String> = Vec::with_capacity(prefix.len());
        let mut node = Some(&self.root);
        for segment in prefix {
            path.push((*segment).to_owned());
            if *segment == WILDCARD {
                return Err(Error::StructuralConflict(path.join(".")));
            }
            node = match node.and_then(|node| node.children.get(*segment)) {
                None => None,
                Some(SignalEntry::Namespace(child)) => Some(child),
                Some(_) => return Err(Error::StructuralConflict(path.join("."))),
            };
        }
        check_level(node, !prefix.is_empty(), &mut path, actions)
    }

    /// Look up a callable action by its segments.
    pub fn lookup(&self, segments: &[&str]) -> Option<Callable<C>> {
        let (last, parents) = segments.split_last()?;
        let node = self.node_at(parents.iter().copied())?;
        match node.children.get(*last)? {
            SignalEntry::Thunk(handler) => Some(Callable::Thunk(handler.clone())),
            SignalEntry::Action(action) => Some(Callable::Action(Rc::clone(action))),
            SignalEntry::Namespace(_) => None,
        }
    }

    /// Look up a callable action by its dotted path.
    pub fn callable(&self, path: &str) -> Result<Callable<C>> {
        let segments: Vec<&str> = path.split('.').collect();
        self.lookup(&segments)
            .ok_or_else(|| Error::UnknownSignalPath(path.to_owned()))
    }

    /// Resolve the phases named by `segments`. An action resolves to its own
    /// phases, a namespace (or a trailing `*`) to the level's wildcard.
    pub fn phases(&self, segments: &[String]) -> Option<PhasedSignal<C>> {
        let (last, parents) = segments.split_last()?;
        let node = self.node_at(parents.iter().map(String::as_str))?;
        if last == WILDCARD {
            return Some(node.wildcard.clone());
        }
        match node.children.get(last)? {
            SignalEntry::Action(action) => Some(action.phases().clone()),
            SignalEntry::Namespace(child) => Some(child.wildcard.clone()),
            SignalEntry::Thunk(_) => None,
        }
    }

    /// Resolve a hook path to the signal it attaches to.
    pub fn signal(&self, hook: &HookPath) -> Result<Rc<ParentSignal<C>>> {
        self.phases(&hook.segments)
            .map(|phases| Rc::clone(phases.phase(hook.phase)))
            .ok_or_else(|| Error::UnknownSignalPath(hook.to_string()))
    }

    fn node_at<'a>(&self, segments: impl Iterator<Item = &'a str>) -> Option<&SignalNode<C>> {
        let mut node = &self.root;
        for segment in segments {
            match node.children.get(segment)? {
                SignalEntry::Namespace(child) => node = child,
                _ => return None,
            }
        }
        Some(node)
    }
}

impl<C: 'static> Default for SignalTree<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn namespace_entry<'a, C: 'static>(
    node: &'a mut SignalNode<C>,
    name: &str,
    path: &[String],
) -> Result<&'a mut SignalNode<C>> {
    let entry = node
        .children
        .entry(name.to_owned())
        .or_insert_with(|| SignalEntry::Namespace(SignalNode::new()));
    match entry {
        SignalEntry::Namespace(child) => Ok(child),
        _ => Err(Error::StructuralConflict(path.join("."))),
    }
}

/// `node` is `None` for a level that does not exist yet.
fn check_level<C>(
    node: Option<&SignalNode<C>>,
    has_parent: bool,
    path: &mut Vec<String>,
    actions: &Actions<C>,
) -> Result<()> {
    let relinked = node.is_some_and(|node| node.wildcard.is_linked());
    if actions.wildcard_adapter().is_some() && has_parent && relinked {
        path.push(WILDCARD.to_owned());
        return Err(Error::StructuralConflict(path.join(".")));
    }

    let mut seen = HashSet::new();
    for (name, descriptor) in actions.iter() {
        path.push(name.to_owned());
        let existing = node.and_then(|node| node.children.get(name));
        if name == WILDCARD || !seen.insert(name) {
            return Err(Error::StructuralConflict(path.join(".")));
        }
        match (descriptor, existing) {
            (ActionDescriptor::Namespace(inner), None) => check_level(None, true, path, inner)?,
            (ActionDescriptor::Namespace(inner), Some(SignalEntry::Namespace(child))) => {
                check_level(Some(child), true, path, inner)?
            }
            (_, None) => {}
            (_, Some(_)) => return Err(Error::StructuralConflict(path.join("."))),
        }
        path.pop();
    }
    Ok(())
}

fn install_level<C: 'static>(
    node: &mut SignalNode<C>,
    parent: Option<&PhasedSignal<C>>,
    path: &mut Vec<String>,
    actions: &Actions<C>,
) -> Result<()> {
    if let (Some(adapter), Some(parent)) = (actions.wildcard_adapter(), parent) {
        if !node.wildcard.link_to(parent, Some(adapter)) {
            path.push(WILDCARD.to_owned());
            return Err(Error::StructuralConflict(path.join(".")));
        }
    }

    for (name, descriptor) in actions.iter() {
        path.push(name.to_owned());
        let is_namespace = matches!(descriptor, ActionDescriptor::Namespace(_));
        if name == WILDCARD || (node.children.contains_key(name) && !is_namespace) {
            return Err(Error::StructuralConflict(path.join(".")));
        }
        match descriptor {
            ActionDescriptor::Thunk(handler) => {
                node.children
                    .insert(name.to_owned(), SignalEntry::Thunk(handler.clone()));
            }
            ActionDescriptor::Wrapped { handler, adapter, raw } => {
                let phases = PhasedSignal::forwarding_to(&node.wildcard, adapter.as_ref());
                let action = ActionSignal::new(path.join("."), handler.clone(), *raw, phases);
                node.children
                    .insert(name.to_owned(), SignalEntry::Action(Rc::new(action)));
            }
            ActionDescriptor::Namespace(inner) => {
                let level = node.wildcard.clone();
                let child = namespace_entry(node, name, path)?;
                install_level(child, Some(&level), path, inner)?;
            }
        }
        trace!(path = %path.join("."), "installed signal");
        path.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::signal::{Adapter, Listener, DEFAULT_PRIORITY};
    use serde_json::json;

    type Log = Rc<RefCell<Vec<Args>>>;

    fn sink(log: &Log) -> Listener<()> {
        let log = log.clone();
        Listener::observe(move |_, args| {
            log.borrow_mut().push(args.to_vec());
            Ok(())
        })
    }

    fn hook(tree: &SignalTree<()>, path: &str) -> Rc<ParentSignal<()>> {
        tree.signal(&HookPath::parse(path).unwrap()).unwrap()
    }

    fn external() -> Actions<()> {
        Actions::new()
            .adapted("update", Adapter::prepend("update"), |_, _| Ok(Value::Null))
            .adapted("start", Adapter::prepend("start"), |_, _| Ok(Value::Null))
            .thunk("now", |_, _| Ok(json!(42)))
    }

    #[test]
    fn install_and_call() {
        let mut tree = SignalTree::new();
        tree.install(&["external"], &external()).unwrap();
        let now = tree.callable("external.now").unwrap();
        assert_eq!(now.call(&(), vec![]).unwrap(), Some(json!(42)));
        assert!(tree.callable("external.update").unwrap().as_action().is_some());
        assert!(matches!(
            tree.callable("external.missing"),
            Err(Error::UnknownSignalPath(_))
        ));
    }

    #[test]
    fn actions_forward_into_level_wildcard_through_adapter() {
        let mut tree = SignalTree::new();
        tree.install(&["external"], &external()).unwrap();
        let log = Log::default();
        hook(&tree, "external.*:post").on(sink(&log), DEFAULT_PRIORITY);
        tree.callable("external.update")
            .unwrap()
            .call(&(), vec![json!(0.5)])
            .unwrap();
        assert_eq!(*log.borrow(), vec![vec![json!("update"), json!(0.5), Value::Null]]);
    }

    #[test]
    fn namespace_path_resolves_to_its_wildcard() {
        let mut tree = SignalTree::new();
        tree.install(&["external"], &external()).unwrap();
        let by_name = hook(&tree, "external:post");
        let by_star = hook(&tree, "external.*:post");
        assert!(Rc::ptr_eq(&by_name, &by_star));
    }

    #[test]
    fn nested_wildcards_propagate_with_adapters() {
        let mut tree = SignalTree::new();
        let entity = Actions::new()
            .action("create", |_, _| Ok(json!(0)))
            .namespace("add", Actions::new().wildcard(Adapter::prepend("add")));
        tree.install(&["entity"], &entity).unwrap();
        tree.install(
            &["entity", "add"],
            &Actions::new().adapted("position", Adapter::insert(1, "position"), |_, _| {
                Ok(json!({"x": 0}))
            }),
        )
        .unwrap();

        let level = Log::default();
        let top = Log::default();
        hook(&tree, "entity.add.*:post").on(sink(&level), DEFAULT_PRIORITY);
        hook(&tree, "entity.*:post").on(sink(&top), DEFAULT_PRIORITY);

        tree.callable("entity.add.position")
            .unwrap()
            .call(&(), vec![json!(7)])
            .unwrap();
        assert_eq!(
            *level.borrow(),
            vec![vec![json!(7), json!("position"), json!({"x": 0})]]
        );
        assert_eq!(
            *top.borrow(),
            vec![vec![json!("add"), json!(7), json!("position"), json!({"x": 0})]]
        );
    }

    #[test]
    fn unlinked_level_does_not_forward() {
        let mut tree = SignalTree::new();
        tree.install(&["plain"], &Actions::new().action("go", |_, _| Ok(Value::Null)))
            .unwrap();
        let log = Log::default();
        hook(&tree, "*:post").on(sink(&log), DEFAULT_PRIORITY);
        tree.callable("plain.go").unwrap().call(&(), vec![]).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn wildcard_pre_can_veto_every_action_of_a_level() {
        let mut tree = SignalTree::new();
        tree.install(&["external"], &external()).unwrap();
        let post = Log::default();
        hook(&tree, "external.*:pre").on(Listener::new(|_: &(), _| Ok(None)), DEFAULT_PRIORITY);
        hook(&tree, "external.update:post").on(sink(&post), DEFAULT_PRIORITY);
        let result = tree
            .callable("external.update")
            .unwrap()
            .call(&(), vec![json!(1)])
            .unwrap();
        assert_eq!(result, None);
        assert!(post.borrow().is_empty());
    }

    #[test]
    fn conflicts_are_rejected() {
        let mut tree = SignalTree::new();
        tree.install(&["external"], &external()).unwrap();
        let again = Actions::new().action("update", |_: &(), _| Ok(Value::Null));
        assert!(matches!(
            tree.install(&["external"], &again),
            Err(Error::StructuralConflict(path)) if path == "external.update"
        ));
        let clash = Actions::new().namespace("now", Actions::new());
        assert!(matches!(
            tree.install(&["external"], &clash),
            Err(Error::StructuralConflict(_))
        ));
        let relink = Actions::new().wildcard(Adapter::identity());
        tree.install(&["linked"], &relink).unwrap();
        assert!(matches!(
            tree.install(&["linked"], &relink),
            Err(Error::StructuralConflict(path)) if path == "linked.*"
        ));
    }

    #[test]
    fn failed_installs_change_nothing() {
        let mut tree = SignalTree::new();
        tree.install(&["external"], &external()).unwrap();

        let partly_new = Actions::new()
            .action("fresh", |_: &(), _| Ok(Value::Null))
            .action("update", |_: &(), _| Ok(Value::Null));
        assert!(matches!(
            tree.install(&["external"], &partly_new),
            Err(Error::StructuralConflict(path)) if path == "external.update"
        ));
        assert!(tree.lookup(&["external", "fresh"]).is_none());

        let go = || Actions::new().action("go", |_: &(), _| Ok(Value::Null));
        let nested = go().namespace("deep", go().action("go", |_: &(), _| Ok(Value::Null)));
        assert!(matches!(
            tree.install(&["fresh"], &nested),
            Err(Error::StructuralConflict(path)) if path == "fresh.deep.go"
        ));
        assert!(tree.root().get("fresh").is_none());

        assert!(matches!(
            tree.install(&["external", "now"], &Actions::new()),
            Err(Error::StructuralConflict(path)) if path == "external.now"
        ));
        assert_eq!(tree.root().names().collect::<Vec<_>>(), vec!["external"]);
        tree.install(&["fresh"], &go()).unwrap();
        assert!(tree.callable("fresh.go").is_ok());
    }

    #[test]
    fn unknown_and_thunk_paths_do_not_resolve() {
        let mut tree = SignalTree::new();
        tree.install(&["external"], &external()).unwrap();
        for path in ["external.now", "missing.update", "external.update.deeper"] {
            assert!(matches!(
                tree.signal(&HookPath::parse(path).unwrap()),
                Err(Error::UnknownSignalPath(_))
            ));
        }
    }
}
