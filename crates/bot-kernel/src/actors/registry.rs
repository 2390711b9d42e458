//! Live edit actors keyed by entity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::EditActor;
use crate::entity::{EntityId, EntityRepository};

/// At most one edit actor per entity.
pub struct EditActorRegistry<R: EntityRepository> {
    actors: DashMap<EntityId, Arc<EditActor<R>>>,
    created: AtomicUsize,
}

impl<R: EntityRepository> Default for EditActorRegistry<R> {
    fn default() -> Self {
        Self {
            actors: DashMap::new(),
            created: AtomicUsize::new(0),
        }
    }
}

impl<R: EntityRepository> EditActorRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing actor for `entity_id`, or the one `create` builds.
    ///
    /// `create` runs at most once per vacant entry, even when callers race.
    /// The flag is true when this call created the actor.
    pub fn get_or_create<F>(&self, entity_id: EntityId, create: F) -> (Arc<EditActor<R>>, bool)
    where
        F: FnOnce() -> Arc<EditActor<R>>,
    {
        let mut created = false;
        let actor = self
            .actors
            .entry(entity_id)
            .or_insert_with(|| {
                created = true;
                create()
            })
            .clone();
        if created {
            self.created.fetch_add(1, Ordering::Relaxed);
        }
        (actor, created)
    }

    pub fn get(&self, entity_id: EntityId) -> Option<Arc<EditActor<R>>> {
        self.actors.get(&entity_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, entity_id: EntityId) -> Option<Arc<EditActor<R>>> {
        self.actors.remove(&entity_id).map(|(_, actor)| actor)
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.actors.contains_key(&entity_id)
    }

    /// Number of live actors.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Total actors ever created through this registry.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Current actors, collected so callers can tick them without holding
    /// map shards.
    pub fn snapshot(&self) -> Vec<Arc<EditActor<R>>> {
        self.actors
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Remove and stop every actor.
    pub fn stop_all(&self) {
        let ids: Vec<EntityId> = self.actors.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some(actor) = self.remove(id) {
                actor.stop();
            }
        }
    }
}
