//! Entity and repository traits: the interface to the domain being edited.

use serde_json::Value;

use crate::error::BotError;

/// Identifier of a domain entity.
pub type EntityId = i64;

/// A domain record bots can edit field by field.
///
/// The engine is domain-agnostic; all knowledge of concrete fields lives in
/// the `Entity` implementation and the [`FieldCatalog`](crate::fields::FieldCatalog).
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> EntityId;

    /// Short human-readable label used in logs.
    fn label(&self) -> String;

    /// Apply a committed field value.
    fn apply_field(&mut self, field: &str, value: &Value) -> anyhow::Result<()>;
}

/// Persistence of entities.
pub trait EntityRepository: Send + Sync + 'static {
    type Entity: Entity;

    /// All known ids. Empty until seed data has loaded.
    fn find_all_ids(&self) -> anyhow::Result<Vec<EntityId>>;

    fn get(&self, id: EntityId) -> anyhow::Result<Option<Self::Entity>>;

    /// Like [`get`](Self::get), but a missing entity is a [`BotError::EntityNotFound`].
    fn require(&self, id: EntityId) -> anyhow::Result<Self::Entity> {
        self.get(id)?
            .ok_or_else(|| BotError::EntityNotFound(id).into())
    }

    /// Persist `entity`. Errors propagate to the committing bot.
    fn update(&self, entity: &Self::Entity) -> anyhow::Result<()>;
}
