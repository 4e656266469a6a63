//! Signet - An embeddable ECS runtime built on phased, hierarchical signals
//!
//! Re-exports the signal engine (`signet-core`) and the ECS runtime
//! (`signet-ecs`), plus logging setup for hosts that have none.

pub use signet_core::{
    entity_arg, str_arg, ActionDescriptor, ActionSignal, Actions, Adapted, Adapter, Args,
    Callable, DispatchMode, EntityId, Error, Handler, HookPath, Listener, Map, ParentSignal, Phase,
    PhasedSignal, Result, Signal, SignalTree, SlotOptions, Upstream, Value, DEFAULT_PRIORITY,
};
pub use signet_ecs::{
    BitSet, ComponentDef, ComponentFactory, ComponentRegistry, EngineConfig, Engine, EntityRecord,
    Family, FamilySystem, GlobalState, Hook, HookSystem, System, WorldSnapshot, WorldState,
};

use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a global fmt subscriber logging up to `level`.
pub fn init_tracing(level: Level) -> std::result::Result<(), SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}

/// Install a global fmt subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing_from_env() -> std::result::Result<(), SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}
