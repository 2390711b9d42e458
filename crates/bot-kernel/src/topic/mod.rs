//! Topic store contract: shared maps and lists scoped to a named topic.
//!
//! The engine never owns shared state. Everything other participants can see
//! (presence lists, per-field editing state, save and refresh notifications)
//! lives in a [`TopicStore`], and every mutation goes through a
//! compare-and-swap retry loop ([`update_map_value`], [`update_list`]).

pub mod memory;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::entity::EntityId;
use crate::identity::ActorIdentity;

pub use memory::InMemoryTopicStore;

/// Compare-and-swap attempts after which contention is logged.
pub const CAS_RETRY_WARN_THRESHOLD: u32 = 8;

/// Lock a mutex whose data stays consistent even if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Name of a shared topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicId(String);

impl TopicId {
    const ENTITY_PREFIX: &'static str = "entity/";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Topic of one entity's editing session.
    pub fn for_entity(id: EntityId) -> Self {
        Self(format!("{}{}", Self::ENTITY_PREFIX, id))
    }

    /// Well-known topic carrying refresh signals for entity listings.
    pub fn refresh() -> Self {
        Self("refresh-grid".to_string())
    }

    /// Inverse of [`TopicId::for_entity`].
    pub fn entity_id(&self) -> Option<EntityId> {
        self.0
            .strip_prefix(Self::ENTITY_PREFIX)
            .and_then(|rest| rest.parse().ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle that undoes a subscription, connection or join when removed.
///
/// Dropping a registration without calling [`Registration::remove`] leaves
/// the underlying resource in place.
#[must_use = "a registration does nothing unless removed"]
pub struct Registration {
    on_remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Registration {
    pub fn new(on_remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_remove: Some(Box::new(on_remove)),
        }
    }

    /// A registration with nothing to undo.
    pub fn noop() -> Self {
        Self { on_remove: None }
    }

    /// Run the cleanup. Idempotent by construction: it consumes `self`.
    pub fn remove(mut self) {
        if let Some(on_remove) = self.on_remove.take() {
            on_remove();
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("pending", &self.on_remove.is_some())
            .finish()
    }
}

/// A single key change delivered to map subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct MapChange {
    pub key: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

pub type MapListener = Arc<dyn Fn(&MapChange) + Send + Sync>;
pub type ListListener = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Replicated key/value map scoped to a topic.
pub trait SharedMap: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// Unconditional write; `None` clears the key.
    fn put(&self, key: &str, value: Option<Value>);

    /// Write `new` only if the key still holds `expected`.
    fn compare_and_set(&self, key: &str, expected: Option<&Value>, new: Option<Value>) -> bool;

    /// Subscribe to changes. The listener first receives every key currently
    /// holding a value, as if it had just been written.
    fn subscribe(&self, listener: MapListener) -> Registration;
}

/// Replicated list scoped to a topic.
pub trait SharedList: Send + Sync {
    fn items(&self) -> Vec<Value>;

    fn push(&self, item: Value);

    /// Replace the whole list only if it still equals `expected`.
    fn compare_and_set(&self, expected: &[Value], new: Vec<Value>) -> bool;

    /// Subscribe to changes. The listener first receives the current items
    /// when the list is non-empty.
    fn subscribe(&self, listener: ListListener) -> Registration;
}

/// Injected store of shared topics.
pub trait TopicStore: Send + Sync {
    /// Named map on a topic, created on first use.
    fn map(&self, topic: &TopicId, name: &str) -> Arc<dyn SharedMap>;

    /// Named list on a topic, created on first use.
    fn list(&self, topic: &TopicId, name: &str) -> Arc<dyn SharedList>;

    /// Record that `actor` holds a connection to `topic` until the returned
    /// registration is removed.
    fn attach(&self, topic: &TopicId, actor: &ActorIdentity) -> Registration;
}

/// An active connection of one actor to one topic.
#[derive(Clone)]
pub struct TopicConnection {
    topic: TopicId,
    actor: ActorIdentity,
    store: Arc<dyn TopicStore>,
    active: Arc<AtomicBool>,
}

impl TopicConnection {
    pub fn topic(&self) -> &TopicId {
        &self.topic
    }

    pub fn actor(&self) -> &ActorIdentity {
        &self.actor
    }

    pub fn store(&self) -> &Arc<dyn TopicStore> {
        &self.store
    }

    /// False once the connection registration has been removed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn map(&self, name: &str) -> Arc<dyn SharedMap> {
        self.store.map(&self.topic, name)
    }

    pub fn list(&self, name: &str) -> Arc<dyn SharedList> {
        self.store.list(&self.topic, name)
    }
}

impl fmt::Debug for TopicConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicConnection")
            .field("topic", &self.topic)
            .field("actor", &self.actor.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Open an always-active connection.
///
/// `on_activate` runs inline with the new connection and may return a
/// cleanup to run on deactivation. Removing the returned registration
/// deactivates the connection, runs that cleanup and detaches from the store.
pub fn connect_eager<F>(
    store: &Arc<dyn TopicStore>,
    topic: TopicId,
    actor: ActorIdentity,
    on_activate: F,
) -> Registration
where
    F: FnOnce(TopicConnection) -> Option<Registration>,
{
    let attachment = store.attach(&topic, &actor);
    let active = Arc::new(AtomicBool::new(true));
    let connection = TopicConnection {
        topic,
        actor,
        store: Arc::clone(store),
        active: Arc::clone(&active),
    };

    let on_deactivate = on_activate(connection);

    Registration::new(move || {
        if active.swap(false, Ordering::AcqRel) {
            if let Some(on_deactivate) = on_deactivate {
                on_deactivate.remove();
            }
            attachment.remove();
        }
    })
}

/// Read-modify-write one map key until the compare-and-swap wins.
///
/// `transform` must be pure: it may run several times. Returns the value
/// that was finally written.
pub fn update_map_value<F>(map: &dyn SharedMap, key: &str, transform: F) -> anyhow::Result<Option<Value>>
where
    F: Fn(Option<&Value>) -> anyhow::Result<Option<Value>>,
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let current = map.get(key);
        let next = transform(current.as_ref())?;
        if map.compare_and_set(key, current.as_ref(), next.clone()) {
            return Ok(next);
        }
        if attempts == CAS_RETRY_WARN_THRESHOLD {
            warn!(key = key, attempts = attempts, "Contended map update, still retrying");
        }
    }
}

/// Read-modify-write a whole list until the compare-and-swap wins.
pub fn update_list<F>(list: &dyn SharedList, transform: F) -> anyhow::Result<Vec<Value>>
where
    F: Fn(&[Value]) -> anyhow::Result<Vec<Value>>,
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let current = list.items();
        let next = transform(&current)?;
        if list.compare_and_set(&current, next.clone()) {
            return Ok(next);
        }
        if attempts == CAS_RETRY_WARN_THRESHOLD {
            warn!(attempts = attempts, "Contended list update, still retrying");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_entity_topic_round_trip() {
        let topic = TopicId::for_entity(42);
        assert_eq!(topic.as_str(), "entity/42");
        assert_eq!(topic.entity_id(), Some(42));
        assert_eq!(TopicId::refresh().entity_id(), None);
        assert_eq!(TopicId::new("entity/abc").entity_id(), None);
    }

    #[test]
    fn test_registration_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registration = Registration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registration.remove();
        Registration::noop().remove();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connect_eager_activates_inline_and_cleans_up() {
        let store: Arc<dyn TopicStore> = Arc::new(InMemoryTopicStore::new());
        let deactivated = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&deactivated);
        let mut seen = None;

        let registration = connect_eager(
            &store,
            TopicId::for_entity(1),
            ActorIdentity::new("u-1", "Ada"),
            |connection| {
                seen = Some(connection);
                Some(Registration::new(move || flag.store(true, Ordering::SeqCst)))
            },
        );

        let connection = seen.expect("activation runs inline");
        assert!(connection.is_active());
        registration.remove();
        assert!(!connection.is_active());
        assert!(deactivated.load(Ordering::SeqCst));
    }

    #[test]
    fn test_update_map_value_applies_transform() {
        let store = InMemoryTopicStore::new();
        let map = store.map(&TopicId::new("t"), "m");
        map.put("n", Some(json!(1)));

        let written = update_map_value(map.as_ref(), "n", |current| {
            let n = current.and_then(Value::as_i64).unwrap_or(0);
            Ok(Some(json!(n + 1)))
        })
        .unwrap();

        assert_eq!(written, Some(json!(2)));
        assert_eq!(map.get("n"), Some(json!(2)));
    }

    #[test]
    fn test_update_list_propagates_transform_error() {
        let store = InMemoryTopicStore::new();
        let list = store.list(&TopicId::new("t"), "l");
        let result = update_list(list.as_ref(), |_| anyhow::bail!("rejected"));
        assert!(result.is_err());
        assert!(list.items().is_empty());
    }
}
