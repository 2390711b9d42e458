//! The read side of the demo: what a person's browser would see.
//!
//! [`GridWatcher`] is the person list refreshing when someone saves,
//! [`SaveToastWatcher`] the "saved by" toast inside an open editor and
//! [`Visitor`] a real person opening and closing editors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bot_kernel::commit::{REFRESH_MAP, SAVE_KEY, SAVE_MAP};
use bot_kernel::topic::{connect_eager, MapChange};
use bot_kernel::{
    ActorIdentity, EntityId, PresenceManager, RefreshSignal, Registration, SaveNotification,
    TopicId, TopicStore,
};

/// Counts refresh signals for the person list.
pub struct GridWatcher {
    signals: Arc<AtomicUsize>,
    latest: Arc<DashMap<EntityId, RefreshSignal>>,
    registration: Option<Registration>,
}

impl GridWatcher {
    pub fn watch(store: &Arc<dyn TopicStore>) -> Self {
        let signals = Arc::new(AtomicUsize::new(0));
        let latest = Arc::new(DashMap::new());

        let counter = Arc::clone(&signals);
        let sink = Arc::clone(&latest);
        let registration = store
            .map(&TopicId::refresh(), REFRESH_MAP)
            .subscribe(Arc::new(move |change: &MapChange| {
                let Some(value) = &change.new else {
                    return;
                };
                match serde_json::from_value::<RefreshSignal>(value.clone()) {
                    Ok(signal) => {
                        counter.fetch_add(1, Ordering::Relaxed);
                        debug!(entity_id = signal.entity_id, "Grid refresh");
                        sink.insert(signal.entity_id, signal);
                    }
                    Err(e) => warn!(key = %change.key, error = %e, "Ignoring malformed refresh signal"),
                }
            }));

        Self {
            signals,
            latest,
            registration: Some(registration),
        }
    }

    /// Refresh signals received.
    pub fn refresh_count(&self) -> usize {
        self.signals.load(Ordering::Relaxed)
    }

    /// Distinct entities refreshed.
    pub fn refreshed_entities(&self) -> usize {
        self.latest.len()
    }

    pub fn last_refresh(&self, entity_id: EntityId) -> Option<RefreshSignal> {
        self.latest.get(&entity_id).map(|entry| entry.value().clone())
    }

    pub fn close(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.remove();
        }
    }
}

/// Shows who saved the entity an editor has open.
pub struct SaveToastWatcher {
    seen: Arc<Mutex<Vec<SaveNotification>>>,
    registration: Option<Registration>,
}

impl SaveToastWatcher {
    pub fn watch(store: &Arc<dyn TopicStore>, entity_id: EntityId, viewer: &str) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let viewer = viewer.to_string();
        let registration = store
            .map(&TopicId::for_entity(entity_id), SAVE_MAP)
            .subscribe(Arc::new(move |change: &MapChange| {
                if change.key != SAVE_KEY {
                    return;
                }
                let Some(value) = &change.new else {
                    return;
                };
                match serde_json::from_value::<SaveNotification>(value.clone()) {
                    Ok(notification) => {
                        info!(
                            entity_id = entity_id,
                            viewer = %viewer,
                            "{} saved the changes",
                            notification.actor_name
                        );
                        sink.lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(notification);
                    }
                    Err(e) => warn!(entity_id = entity_id, error = %e, "Ignoring malformed save notice"),
                }
            }));

        Self {
            seen,
            registration: Some(registration),
        }
    }

    /// Notifications shown so far.
    pub fn notifications(&self) -> Vec<SaveNotification> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn close(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.remove();
        }
    }
}

struct Session {
    entity_id: EntityId,
    connection: Registration,
    toasts: SaveToastWatcher,
}

/// A real person moving between person editors.
pub struct Visitor {
    identity: ActorIdentity,
    store: Arc<dyn TopicStore>,
    session: Option<Session>,
    toasts_seen: usize,
}

impl Visitor {
    pub fn new(number: usize, store: Arc<dyn TopicStore>) -> Self {
        Self::with_identity(
            ActorIdentity::new(format!("visitor-{}", Uuid::new_v4()), format!("Visitor {number}")),
            store,
        )
    }

    pub fn with_identity(identity: ActorIdentity, store: Arc<dyn TopicStore>) -> Self {
        Self {
            identity,
            store,
            session: None,
            toasts_seen: 0,
        }
    }

    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    /// Entity whose editor is open.
    pub fn current(&self) -> Option<EntityId> {
        self.session.as_ref().map(|session| session.entity_id)
    }

    /// Save notifications seen in editors this visitor has closed.
    pub fn toasts_seen(&self) -> usize {
        self.toasts_seen
            + self
                .session
                .as_ref()
                .map(|session| session.toasts.notifications().len())
                .unwrap_or(0)
    }

    /// Open the editor of `entity_id`, closing any other one first.
    pub fn open(&mut self, entity_id: EntityId) {
        if self.current() == Some(entity_id) {
            return;
        }
        self.close();

        let toasts = SaveToastWatcher::watch(&self.store, entity_id, &self.identity.name);
        let visitor = self.identity.id.clone();
        let connection = connect_eager(
            &self.store,
            TopicId::for_entity(entity_id),
            self.identity.clone(),
            |connection| {
                let presence = PresenceManager::new(&connection);
                if let Err(e) = presence.mark_present(true) {
                    warn!(visitor = %visitor, entity_id = entity_id, error = %e, "Failed to join editor");
                }
                Some(Registration::new(move || {
                    if let Err(e) = presence.close() {
                        warn!(visitor = %visitor, error = %e, "Failed to leave editor");
                    }
                }))
            },
        );
        debug!(visitor = %self.identity.id, entity_id = entity_id, "Visitor opened editor");

        self.session = Some(Session {
            entity_id,
            connection,
            toasts,
        });
    }

    /// Close the open editor, if any.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.connection.remove();
            self.toasts_seen += session.toasts.notifications().len();
            session.toasts.close();
            debug!(visitor = %self.identity.id, entity_id = session.entity_id, "Visitor closed editor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_kernel::avatars::{self, AVATAR_LIST};
    use bot_kernel::InMemoryTopicStore;
    use chrono::Utc;
    use serde_json::json;

    fn store() -> Arc<dyn TopicStore> {
        Arc::new(InMemoryTopicStore::new())
    }

    #[test]
    fn test_visitor_presence_follows_open_editor() {
        let store = store();
        let mut visitor = Visitor::new(1, Arc::clone(&store));
        let first = store.list(&TopicId::for_entity(1), AVATAR_LIST);
        let second = store.list(&TopicId::for_entity(2), AVATAR_LIST);

        visitor.open(1);
        assert_eq!(avatars::real_count(first.as_ref()), 1);

        visitor.open(2);
        assert_eq!(avatars::real_count(first.as_ref()), 0);
        assert_eq!(avatars::real_count(second.as_ref()), 1);
        assert_eq!(visitor.current(), Some(2));

        visitor.close();
        assert_eq!(avatars::real_count(second.as_ref()), 0);
        assert_eq!(visitor.current(), None);
    }

    #[test]
    fn test_grid_counts_refresh_signals() {
        let store = store();
        let mut grid = GridWatcher::watch(&store);
        let refresh = store.map(&TopicId::refresh(), REFRESH_MAP);

        for entity_id in [3, 3, 4] {
            let signal = RefreshSignal {
                entity_id,
                nonce: Uuid::new_v4(),
                committed_at: Utc::now(),
            };
            refresh.put(&entity_id.to_string(), Some(serde_json::to_value(signal).unwrap()));
        }
        refresh.put("junk", Some(json!("not a signal")));

        assert_eq!(grid.refresh_count(), 3);
        assert_eq!(grid.refreshed_entities(), 2);
        assert_eq!(grid.last_refresh(4).unwrap().entity_id, 4);
        grid.close();
    }

    #[test]
    fn test_toast_sees_save_but_not_clear() {
        let store = store();
        let visitor = ActorIdentity::new("u-1", "Ada");
        let mut visitor = Visitor::with_identity(visitor, Arc::clone(&store));
        visitor.open(8);

        let save = store.map(&TopicId::for_entity(8), SAVE_MAP);
        let notice = SaveNotification {
            actor_name: "Bot Leif".to_string(),
            actor_id: "bot-1".to_string(),
            nonce: Uuid::new_v4(),
        };
        save.put(SAVE_KEY, Some(serde_json::to_value(&notice).unwrap()));
        save.put(SAVE_KEY, None);

        assert_eq!(visitor.toasts_seen(), 1);
        visitor.close();
        assert_eq!(visitor.toasts_seen(), 1);
    }

    #[test]
    fn test_toast_survives_poisoned_lock() {
        let store = store();
        let watcher = SaveToastWatcher::watch(&store, 9, "Ada");
        let seen = Arc::clone(&watcher.seen);
        let _ = std::thread::spawn(move || {
            let _guard = seen.lock().unwrap();
            panic!("viewer crashed");
        })
        .join();
        assert!(watcher.seen.is_poisoned());

        let notice = SaveNotification {
            actor_name: "Bot Tan".to_string(),
            actor_id: "bot-2".to_string(),
            nonce: Uuid::new_v4(),
        };
        store
            .map(&TopicId::for_entity(9), SAVE_MAP)
            .put(SAVE_KEY, Some(serde_json::to_value(&notice).unwrap()));

        assert_eq!(watcher.notifications(), vec![notice]);
    }
}
