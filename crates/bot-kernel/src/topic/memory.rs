//! In-process [`TopicStore`] used by the demo and the test suites.
//!
//! Each map and list guards its contents with a mutex and notifies listeners
//! after releasing it, so listeners are free to write back into the store.
//! Notifications run on the writer's thread; concurrent writers may deliver
//! their notifications in either order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde_json::Value;
use tracing::trace;

use super::{
    lock, ListListener, MapChange, MapListener, Registration, SharedList, SharedMap, TopicId,
    TopicStore,
};
use crate::identity::ActorIdentity;

/// Listener registry shared by maps and lists.
struct Listeners<L> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, L)>>,
}

impl<L: Clone + Send + 'static> Listeners<L> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
        })
    }

    fn add(self: &Arc<Self>, listener: L) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).push((id, listener));

        let weak = Arc::downgrade(self);
        Registration::new(move || {
            if let Some(listeners) = weak.upgrade() {
                lock(&listeners.entries).retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    fn snapshot(&self) -> Vec<L> {
        lock(&self.entries)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }
}

/// Map implementation backing [`InMemoryTopicStore::map`].
pub struct MemoryMap {
    entries: Mutex<HashMap<String, Value>>,
    listeners: Arc<Listeners<MapListener>>,
}

impl MemoryMap {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            listeners: Listeners::new(),
        }
    }

    fn write_locked(
        entries: &mut HashMap<String, Value>,
        key: &str,
        value: Option<Value>,
    ) -> Option<Value> {
        match value {
            Some(value) => entries.insert(key.to_string(), value),
            None => entries.remove(key),
        }
    }

    fn notify(&self, change: MapChange) {
        if change.old == change.new {
            return;
        }
        for listener in self.listeners.snapshot() {
            listener(&change);
        }
    }
}

impl SharedMap for MemoryMap {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    fn put(&self, key: &str, value: Option<Value>) {
        let old = Self::write_locked(&mut lock(&self.entries), key, value.clone());
        self.notify(MapChange {
            key: key.to_string(),
            old,
            new: value,
        });
    }

    fn compare_and_set(&self, key: &str, expected: Option<&Value>, new: Option<Value>) -> bool {
        let old = {
            let mut entries = lock(&self.entries);
            if entries.get(key) != expected {
                return false;
            }
            Self::write_locked(&mut entries, key, new.clone())
        };
        self.notify(MapChange {
            key: key.to_string(),
            old,
            new,
        });
        true
    }

    fn subscribe(&self, listener: MapListener) -> Registration {
        let registration = self.listeners.add(Arc::clone(&listener));
        let current: Vec<(String, Value)> = lock(&self.entries)
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, value) in current {
            listener(&MapChange {
                key,
                old: None,
                new: Some(value),
            });
        }
        registration
    }
}

/// List implementation backing [`InMemoryTopicStore::list`].
pub struct MemoryList {
    items: Mutex<Vec<Value>>,
    listeners: Arc<Listeners<ListListener>>,
}

impl MemoryList {
    fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            listeners: Listeners::new(),
        }
    }

    fn notify(&self, items: &[Value]) {
        for listener in self.listeners.snapshot() {
            listener(items);
        }
    }
}

impl SharedList for MemoryList {
    fn items(&self) -> Vec<Value> {
        lock(&self.items).clone()
    }

    fn push(&self, item: Value) {
        let snapshot = {
            let mut items = lock(&self.items);
            items.push(item);
            items.clone()
        };
        self.notify(&snapshot);
    }

    fn compare_and_set(&self, expected: &[Value], new: Vec<Value>) -> bool {
        {
            let mut items = lock(&self.items);
            if items.as_slice() != expected {
                return false;
            }
            *items = new.clone();
        }
        self.notify(&new);
        true
    }

    fn subscribe(&self, listener: ListListener) -> Registration {
        let registration = self.listeners.add(Arc::clone(&listener));
        let current = self.items();
        if !current.is_empty() {
            listener(&current);
        }
        registration
    }
}

/// In-memory topic store.
#[derive(Default)]
pub struct InMemoryTopicStore {
    maps: DashMap<(TopicId, String), Arc<MemoryMap>>,
    lists: DashMap<(TopicId, String), Arc<MemoryList>>,
    connections: Arc<DashMap<TopicId, Vec<String>>>,
}

impl InMemoryTopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open connections to `topic`.
    pub fn connection_count(&self, topic: &TopicId) -> usize {
        self.connections
            .get(topic)
            .map(|actors| actors.len())
            .unwrap_or(0)
    }

    /// Ids of the actors currently connected to `topic`.
    pub fn connected_actors(&self, topic: &TopicId) -> Vec<String> {
        self.connections
            .get(topic)
            .map(|actors| actors.clone())
            .unwrap_or_default()
    }
}

impl TopicStore for InMemoryTopicStore {
    fn map(&self, topic: &TopicId, name: &str) -> Arc<dyn SharedMap> {
        let map = self
            .maps
            .entry((topic.clone(), name.to_string()))
            .or_insert_with(|| Arc::new(MemoryMap::new()))
            .clone();
        map
    }

    fn list(&self, topic: &TopicId, name: &str) -> Arc<dyn SharedList> {
        let list = self
            .lists
            .entry((topic.clone(), name.to_string()))
            .or_insert_with(|| Arc::new(MemoryList::new()))
            .clone();
        list
    }

    fn attach(&self, topic: &TopicId, actor: &ActorIdentity) -> Registration {
        self.connections
            .entry(topic.clone())
            .or_default()
            .push(actor.id.clone());
        trace!(topic = %topic, actor = %actor.id, "Connection attached");

        let connections = Arc::clone(&self.connections);
        let topic = topic.clone();
        let actor_id = actor.id.clone();
        Registration::new(move || {
            if let Some(mut actors) = connections.get_mut(&topic) {
                if let Some(position) = actors.iter().position(|id| *id == actor_id) {
                    actors.remove(position);
                }
            }
            trace!(topic = %topic, actor = %actor_id, "Connection detached");
        })
    }
}
