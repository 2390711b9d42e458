//! Persisting the values proposed in a topic back to the repository.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::binder::{self, FIELD_MAP};
use crate::entity::{Entity, EntityId, EntityRepository};
use crate::error::BotError;
use crate::fields::FieldCatalog;
use crate::topic::{TopicConnection, TopicId};

/// Map on [`TopicId::refresh`] holding the latest signal per entity.
pub const REFRESH_MAP: &str = "refresh";

/// Map on the entity topic announcing saves.
pub const SAVE_MAP: &str = "save";

/// Key of the single save slot in [`SAVE_MAP`].
pub const SAVE_KEY: &str = "save";

/// Tells listings that an entity changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshSignal {
    pub entity_id: EntityId,
    pub nonce: Uuid,
    pub committed_at: DateTime<Utc>,
}

/// Tells everyone editing an entity who saved it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveNotification {
    pub actor_name: String,
    pub actor_id: String,
    pub nonce: Uuid,
}

/// Fields written by one commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub entity_id: EntityId,
    pub applied_fields: Vec<String>,
}

/// Apply every proposed catalog value to `target`, persist it and notify.
///
/// Fields nobody has proposed a value for keep their current value. A
/// repository failure is returned as [`BotError::Persist`] before any
/// notification goes out.
pub fn commit<R: EntityRepository>(
    connection: &TopicConnection,
    target: &mut R::Entity,
    repository: &R,
    catalog: &FieldCatalog,
) -> anyhow::Result<CommitReport> {
    let entity_id = target.id();
    let fields = connection.map(FIELD_MAP);

    let mut applied_fields = Vec::new();
    for field in catalog.fields() {
        let Some(value) = binder::field_value(fields.as_ref(), &field.name)? else {
            continue;
        };
        target
            .apply_field(&field.name, &value)
            .with_context(|| format!("applying `{}` to entity {entity_id}", field.name))?;
        applied_fields.push(field.name.clone());
    }

    repository
        .update(target)
        .map_err(|source| BotError::Persist { entity_id, source })?;

    let signal = RefreshSignal {
        entity_id,
        nonce: Uuid::new_v4(),
        committed_at: Utc::now(),
    };
    connection
        .store()
        .map(&TopicId::refresh(), REFRESH_MAP)
        .put(&entity_id.to_string(), Some(serde_json::to_value(&signal)?));

    // Subscribers replay current values, so the slot must not keep the notice.
    let actor = connection.actor();
    let notification = SaveNotification {
        actor_name: actor.name.clone(),
        actor_id: actor.id.clone(),
        nonce: Uuid::new_v4(),
    };
    let save = connection.map(SAVE_MAP);
    save.put(SAVE_KEY, Some(serde_json::to_value(&notification)?));
    save.put(SAVE_KEY, None);

    debug!(
        entity_id = entity_id,
        entity = %target.label(),
        actor = %actor.id,
        fields = applied_fields.len(),
        "Committed entity"
    );
    Ok(CommitReport {
        entity_id,
        applied_fields,
    })
}
