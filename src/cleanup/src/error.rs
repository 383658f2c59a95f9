use crate::model::EntityId;

/// Failures reported by the world graph or its mutation primitives.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum WorldError {
    #[error("Grid {0} is already closed")]
    Closed(EntityId),
    #[error("Mutation rejected for grid {0}: {1}")]
    Rejected(EntityId, String),
    #[error("World unavailable: {0}")]
    Unavailable(String),
}

/// A chat message could not be delivered.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Failed to deliver message: {0}")]
pub struct NotifyError(pub String);

#[derive(thiserror::Error, Debug)]
pub enum CleanupError {
    #[error("World error: {0}")]
    World(#[from] WorldError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error("Name generation failed: {0}")]
    NameGeneration(String),
}

pub type Result<T> = std::result::Result<T, CleanupError>;
