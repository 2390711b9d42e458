//! Shared fixtures: a tiny entity, its repository and a two-field catalog.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use rand::RngCore;
use serde_json::{json, Value};

use bot_kernel::actors::{ActorContext, EditSettings};
use bot_kernel::{
    BotConfig, Entity, EntityId, EntityRepository, FieldCatalog, FieldSpec, InMemoryTopicStore,
    TopicStore,
};

pub const MOODS: [&str; 3] = ["Joyful", "Indifferent", "Dreadful"];

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: EntityId,
    pub title: String,
    pub mood: String,
    pub author: String,
}

impl Note {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            title: format!("note {id}"),
            mood: "Indifferent".to_string(),
            author: "nobody".to_string(),
        }
    }
}

impl Entity for Note {
    fn id(&self) -> EntityId {
        self.id
    }

    fn label(&self) -> String {
        self.title.clone()
    }

    fn apply_field(&mut self, field: &str, value: &Value) -> anyhow::Result<()> {
        let Some(text) = value.as_str() else {
            bail!("field `{field}` expects a string");
        };
        match field {
            "title" => self.title = text.to_string(),
            "mood" => self.mood = text.to_string(),
            other => bail!("unknown field `{other}`"),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct NoteRepository {
    notes: Mutex<BTreeMap<EntityId, Note>>,
    pub fail_updates: AtomicBool,
    failing_ids: Mutex<HashSet<EntityId>>,
    pub updates: AtomicUsize,
}

impl NoteRepository {
    pub fn with_notes(ids: impl IntoIterator<Item = EntityId>) -> Arc<Self> {
        let repository = Self::default();
        repository.insert_all(ids);
        Arc::new(repository)
    }

    pub fn insert_all(&self, ids: impl IntoIterator<Item = EntityId>) {
        let mut notes = self.notes.lock().unwrap();
        for id in ids {
            notes.insert(id, Note::new(id));
        }
    }

    pub fn remove(&self, id: EntityId) {
        self.notes.lock().unwrap().remove(&id);
    }

    /// Make updates of `id` fail; other notes still save.
    pub fn fail_updates_for(&self, id: EntityId) {
        self.failing_ids.lock().unwrap().insert(id);
    }

    pub fn note(&self, id: EntityId) -> Note {
        self.notes.lock().unwrap()[&id].clone()
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl EntityRepository for NoteRepository {
    type Entity = Note;

    fn find_all_ids(&self) -> anyhow::Result<Vec<EntityId>> {
        Ok(self.notes.lock().unwrap().keys().copied().collect())
    }

    fn get(&self, id: EntityId) -> anyhow::Result<Option<Note>> {
        Ok(self.notes.lock().unwrap().get(&id).cloned())
    }

    fn update(&self, entity: &Note) -> anyhow::Result<()> {
        if self.fail_updates.load(Ordering::SeqCst)
            || self.failing_ids.lock().unwrap().contains(&entity.id)
        {
            bail!("database unavailable");
        }
        self.notes.lock().unwrap().insert(entity.id, entity.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn catalog() -> FieldCatalog {
    FieldCatalog::default()
        .with_field(FieldSpec::text("title", |rng: &mut dyn RngCore| {
            json!(format!("draft {}", rng.next_u32() % 1000))
        }))
        .with_field(FieldSpec::choice("mood", MOODS))
}

pub fn store() -> Arc<dyn TopicStore> {
    Arc::new(InMemoryTopicStore::new())
}

/// Settings without pacing so every tick does work.
pub fn eager_settings() -> EditSettings {
    EditSettings {
        edit_delay: Duration::ZERO,
        ..EditSettings::default()
    }
}

pub fn seeded_config(seed: u64) -> BotConfig {
    let mut config = BotConfig::default();
    config.seed = Some(seed);
    config
}

pub fn context(
    store: Arc<dyn TopicStore>,
    repository: Arc<NoteRepository>,
) -> Arc<ActorContext<NoteRepository>> {
    let mut context = ActorContext::new(&seeded_config(11), store, repository, catalog());
    context.settings = eager_settings();
    Arc::new(context)
}
