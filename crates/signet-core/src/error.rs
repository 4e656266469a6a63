use crate::types::EntityId;

/// Errors raised by the signal engine and the ECS runtime.
///
/// All of them are configuration or usage errors: they surface synchronously
/// to the caller of the dispatch that triggered them and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("'{0}' conflicts with an existing definition")]
    StructuralConflict(String),

    #[error("cannot {0} while the engine is running")]
    InvalidTopologyMutation(String),

    #[error("signal '{0}' not found")]
    UnknownSignalPath(String),

    #[error("invalid hook path '{path}': {reason}")]
    InvalidHookPath { path: String, reason: String },

    #[error("entity data references component '{0}' which has no add action")]
    MissingComponentOnCreate(String),

    #[error("entity {entity} already has component '{component}'")]
    DuplicateComponentOnEntity { entity: EntityId, component: String },

    #[error("component '{0}' is not defined")]
    UnknownComponent(String),

    #[error("entity {0} does not exist")]
    UnknownEntity(EntityId),

    #[error("entity {0} already exists")]
    EntityExists(EntityId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
