//! In-memory person storage.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::info;

use bot_kernel::{EntityId, EntityRepository};

use crate::generator::{GeneratorConfig, PersonGenerator};
use crate::person::Person;

/// Person repository backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryPersonRepository {
    people: DashMap<EntityId, Person>,
    updates: AtomicUsize,
}

impl InMemoryPersonRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill an empty repository with generated people. Returns how many were added.
    pub fn seed_if_empty(&self, config: GeneratorConfig) -> usize {
        if !self.people.is_empty() {
            info!(people = self.people.len(), "Using existing data");
            return 0;
        }
        info!(count = config.count, "Generating demo data");
        let people = PersonGenerator::new(config).generate();
        let count = people.len();
        for person in people {
            self.people.insert(person.id, person);
        }
        info!(count = count, "Generated demo data");
        count
    }

    pub fn insert(&self, person: Person) {
        self.people.insert(person.id, person);
    }

    pub fn person(&self, id: EntityId) -> Option<Person> {
        self.people.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    /// Successful updates since creation.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::Relaxed)
    }
}

impl EntityRepository for InMemoryPersonRepository {
    type Entity = Person;

    fn find_all_ids(&self) -> anyhow::Result<Vec<EntityId>> {
        let mut ids: Vec<EntityId> = self.people.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn get(&self, id: EntityId) -> anyhow::Result<Option<Person>> {
        Ok(self.person(id))
    }

    fn update(&self, person: &Person) -> anyhow::Result<()> {
        self.people.insert(person.id, person.clone());
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
