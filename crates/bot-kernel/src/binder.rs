//! Per-field collaborative state: proposed value plus the editors holding the field.
//!
//! Each field is one JSON document under the field's name in the topic's
//! [`FIELD_MAP`]. An absent key means nobody has touched the field since the
//! last reset; commits leave such fields alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BotError;
use crate::identity::ActorIdentity;
use crate::topic::{update_map_value, SharedMap};

/// Map holding one [`FieldState`] per field name.
pub const FIELD_MAP: &str = "fields";

/// Someone currently focusing a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEditor {
    pub actor_id: String,
    pub actor_name: String,
    /// Chosen option for choice fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_index: Option<usize>,
}

/// Shared state of one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub editors: Vec<FieldEditor>,
}

impl FieldState {
    fn is_empty(&self) -> bool {
        self.value.is_none() && self.editors.is_empty()
    }
}

fn decode(field: &str, raw: Option<&Value>) -> Result<FieldState, BotError> {
    match raw {
        None => Ok(FieldState::default()),
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|source| {
            BotError::MalformedFieldState {
                field: field.to_string(),
                source,
            }
        }),
    }
}

fn encode(state: FieldState) -> anyhow::Result<Option<Value>> {
    if state.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_value(state)?))
}

fn update_field<F>(map: &dyn SharedMap, field: &str, change: F) -> anyhow::Result<()>
where
    F: Fn(&mut FieldState),
{
    update_map_value(map, field, |raw| {
        let mut state = decode(field, raw)?;
        change(&mut state);
        encode(state)
    })?;
    Ok(())
}

/// Current state of `field`, `None` if untouched.
pub fn field_state(map: &dyn SharedMap, field: &str) -> Result<Option<FieldState>, BotError> {
    match map.get(field) {
        None => Ok(None),
        Some(raw) => decode(field, Some(&raw)).map(Some),
    }
}

/// Last proposed value of `field`.
pub fn field_value(map: &dyn SharedMap, field: &str) -> Result<Option<Value>, BotError> {
    Ok(field_state(map, field)?.and_then(|state| state.value))
}

/// Number of editors currently holding `field`.
pub fn editor_count(map: &dyn SharedMap, field: &str) -> Result<usize, BotError> {
    Ok(field_state(map, field)?
        .map(|state| state.editors.len())
        .unwrap_or(0))
}

/// Take the field lock. Re-acquiring only updates the chosen index.
pub fn add_editor(
    map: &dyn SharedMap,
    field: &str,
    actor: &ActorIdentity,
    field_index: Option<usize>,
) -> anyhow::Result<()> {
    update_field(map, field, |state| {
        match state.editors.iter_mut().find(|e| e.actor_id == actor.id) {
            Some(editor) => editor.field_index = field_index,
            None => state.editors.push(FieldEditor {
                actor_id: actor.id.clone(),
                actor_name: actor.name.clone(),
                field_index,
            }),
        }
    })
}

/// Release the field lock held by `actor`.
pub fn remove_editor(map: &dyn SharedMap, field: &str, actor: &ActorIdentity) -> anyhow::Result<()> {
    update_field(map, field, |state| {
        state.editors.retain(|e| e.actor_id != actor.id);
    })
}

/// Propose a new value for `field`.
pub fn set_field_value(map: &dyn SharedMap, field: &str, value: &Value) -> anyhow::Result<()> {
    update_field(map, field, |state| {
        state.value = Some(value.clone());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::{InMemoryTopicStore, TopicId, TopicStore};
    use serde_json::json;

    fn fields_map() -> std::sync::Arc<dyn SharedMap> {
        InMemoryTopicStore::new().map(&TopicId::for_entity(1), FIELD_MAP)
    }

    #[test]
    fn test_lock_set_release() {
        let map = fields_map();
        let bot = ActorIdentity::new("bot-1", "Bot Jens");

        add_editor(map.as_ref(), "email", &bot, None).unwrap();
        assert_eq!(editor_count(map.as_ref(), "email").unwrap(), 1);

        set_field_value(map.as_ref(), "email", &json!("jens@example.com")).unwrap();
        remove_editor(map.as_ref(), "email", &bot).unwrap();

        assert_eq!(editor_count(map.as_ref(), "email").unwrap(), 0);
        assert_eq!(
            field_value(map.as_ref(), "email").unwrap(),
            Some(json!("jens@example.com"))
        );
    }

    #[test]
    fn test_reacquire_does_not_duplicate_editor() {
        let map = fields_map();
        let bot = ActorIdentity::new("bot-1", "Bot Jens");

        add_editor(map.as_ref(), "happiness", &bot, Some(1)).unwrap();
        add_editor(map.as_ref(), "happiness", &bot, Some(3)).unwrap();

        let state = field_state(map.as_ref(), "happiness").unwrap().unwrap();
        assert_eq!(state.editors.len(), 1);
        assert_eq!(state.editors[0].field_index, Some(3));
    }

    #[test]
    fn test_released_untouched_field_disappears() {
        let map = fields_map();
        let bot = ActorIdentity::new("bot-1", "Bot Jens");

        add_editor(map.as_ref(), "lastName", &bot, None).unwrap();
        remove_editor(map.as_ref(), "lastName", &bot).unwrap();

        assert_eq!(map.get("lastName"), None);
        assert_eq!(field_value(map.as_ref(), "lastName").unwrap(), None);
    }

    #[test]
    fn test_malformed_state_is_reported() {
        let map = fields_map();
        map.put("email", Some(json!({"editors": "nope"})));

        let err = editor_count(map.as_ref(), "email").unwrap_err();
        assert!(matches!(err, BotError::MalformedFieldState { .. }));
    }
}
