//! Signet Core - Core types, errors and the phased signal engine
//!
//! This crate provides the foundations shared by the ECS runtime:
//! - Entity ids and the dynamic argument/value types carried by signals
//! - The error taxonomy
//! - Ordered multicast signals, parent forwarding and action pipelines
//! - Hook path parsing and the namespace tree that wires it all together
//!
//! Everything here is single-threaded: signals use `Rc`/`RefCell` and are
//! generic over the context type `C` handed to every listener.

pub mod describe;
pub mod error;
pub mod hook;
pub mod signal;
pub mod tree;
pub mod types;

pub use describe::{ActionDescriptor, Actions};
pub use error::{Error, Result};
pub use hook::HookPath;
pub use signal::{
    ActionSignal, Adapted, Adapter, DispatchMode, Handler, Listener, ParentSignal, Phase,
    PhasedSignal, Signal, SlotOptions, Upstream, DEFAULT_PRIORITY,
};
pub use tree::{Callable, SignalEntry, SignalNode, SignalTree, WILDCARD};
pub use types::{entity_arg, str_arg, Args, EntityId, Map, Value};
