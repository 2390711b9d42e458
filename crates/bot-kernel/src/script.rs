//! Scripted edits of a single field.
//!
//! A script imitates one person editing one field: focus the field, type or
//! pick a value, leave the field. Steps run one per tick so other
//! participants see each stage.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::RngCore;
use serde_json::Value;
use tracing::trace;

use crate::binder::{self, FIELD_MAP};
use crate::fields::{FieldCatalog, FieldSpec};
use crate::identity::ActorIdentity;
use crate::topic::{SharedMap, TopicConnection};

/// A guarded value is only written while fewer editors hold the field.
pub const MAX_CONCURRENT_EDITORS: usize = 2;

/// One unit of scripted work.
#[derive(Debug, Clone, PartialEq)]
pub enum EditStep {
    AcquireLock {
        field: String,
        option_index: Option<usize>,
    },
    SetValue {
        field: String,
        value: Value,
        guarded: bool,
    },
    ReleaseLock {
        field: String,
    },
}

impl EditStep {
    pub fn field(&self) -> &str {
        match self {
            Self::AcquireLock { field, .. }
            | Self::SetValue { field, .. }
            | Self::ReleaseLock { field } => field,
        }
    }
}

/// What executing a step did to the shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEffect {
    LockAcquired,
    ValueSet,
    /// Too many editors held the field; the value was not written.
    ValueSkipped { editors: usize },
    LockReleased,
}

/// The remaining steps of one field edit, bound to a topic and an actor.
pub struct EditScript {
    field: String,
    actor: ActorIdentity,
    fields: Arc<dyn SharedMap>,
    steps: VecDeque<EditStep>,
    holding_lock: bool,
}

impl EditScript {
    fn new(field: &FieldSpec, actor: ActorIdentity, fields: Arc<dyn SharedMap>, steps: Vec<EditStep>) -> Self {
        Self {
            field: field.name.clone(),
            actor,
            fields,
            steps: steps.into(),
            holding_lock: false,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn steps(&self) -> impl Iterator<Item = &EditStep> {
        self.steps.iter()
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    pub fn is_finished(&self) -> bool {
        self.steps.is_empty()
    }

    /// Field whose lock this script currently holds.
    pub fn held_field(&self) -> Option<&str> {
        self.holding_lock.then_some(self.field.as_str())
    }

    /// Run the next step. A failed step stays queued.
    pub fn execute_next(&mut self) -> anyhow::Result<Option<StepEffect>> {
        let Some(step) = self.steps.front() else {
            return Ok(None);
        };
        let map = self.fields.as_ref();
        let effect = match step {
            EditStep::AcquireLock {
                field,
                option_index,
            } => {
                binder::add_editor(map, field, &self.actor, *option_index)?;
                StepEffect::LockAcquired
            }
            EditStep::SetValue {
                field,
                value,
                guarded,
            } => {
                let editors = if *guarded {
                    binder::editor_count(map, field)?
                } else {
                    0
                };
                if editors >= MAX_CONCURRENT_EDITORS {
                    StepEffect::ValueSkipped { editors }
                } else {
                    binder::set_field_value(map, field, value)?;
                    StepEffect::ValueSet
                }
            }
            EditStep::ReleaseLock { field } => {
                binder::remove_editor(map, field, &self.actor)?;
                StepEffect::LockReleased
            }
        };
        trace!(actor = %self.actor.id, field = %self.field, effect = ?effect, "Executed edit step");

        match effect {
            StepEffect::LockAcquired => self.holding_lock = true,
            StepEffect::LockReleased => self.holding_lock = false,
            _ => {}
        }
        self.steps.pop_front();
        Ok(Some(effect))
    }

    /// Drop the field lock if a step left it held.
    pub fn abandon(&mut self) -> anyhow::Result<()> {
        self.steps.clear();
        if self.holding_lock {
            binder::remove_editor(self.fields.as_ref(), &self.field, &self.actor)?;
            self.holding_lock = false;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EditScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditScript")
            .field("field", &self.field)
            .field("actor", &self.actor.id)
            .field("steps", &self.steps)
            .finish()
    }
}

/// Build a fresh script for one randomly chosen field of `catalog`.
///
/// Text fields always guard their value against contention; choice fields
/// only when `guard_choices` is set. Returns `None` for an empty catalog.
pub fn build_script(
    connection: &TopicConnection,
    catalog: &FieldCatalog,
    rng: &mut dyn RngCore,
    guard_choices: bool,
) -> Option<EditScript> {
    let field = catalog.choose(rng)?;
    let sampled = field.sample(rng);
    let name = field.name.clone();
    let guarded = !field.is_choice() || guard_choices;

    let steps = vec![
        EditStep::AcquireLock {
            field: name.clone(),
            option_index: sampled.option_index,
        },
        EditStep::SetValue {
            field: name.clone(),
            value: sampled.value,
            guarded,
        },
        EditStep::ReleaseLock { field: name },
    ];

    Some(EditScript::new(
        field,
        connection.actor().clone(),
        connection.map(FIELD_MAP),
        steps,
    ))
}
