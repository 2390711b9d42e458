//! Typed failures of the bot engine.

use thiserror::Error;

use crate::entity::EntityId;

/// Errors raised by the engine itself.
///
/// Collaborator failures (repository, entity field application) travel as
/// `anyhow::Error` and are wrapped where the engine adds context.
#[derive(Debug, Error)]
pub enum BotError {
    /// A [`BotHost`](crate::manager::BotHost) only ever runs one manager.
    #[error("a bot manager has already been launched by this host")]
    AlreadyLaunched,

    /// The configuration failed validation.
    #[error("invalid bot configuration: {0}")]
    InvalidConfig(String),

    /// The repository no longer knows the entity.
    #[error("entity {0} not found in repository")]
    EntityNotFound(EntityId),

    /// A shared field document could not be decoded.
    #[error("field `{field}` holds malformed state")]
    MalformedFieldState {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    /// The repository rejected an update during commit.
    #[error("failed to persist entity {entity_id}")]
    Persist {
        entity_id: EntityId,
        #[source]
        source: anyhow::Error,
    },

    /// A thread panicked while holding an engine lock.
    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),
}
