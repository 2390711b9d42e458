//! Presence actors: bots that show up in entity topics.
//!
//! A [`PresenceActor`] stays on one entity. It toggles its own presence when
//! told to and hands the entity to an [`EditActor`] for as long as at least
//! one real person is in the topic. A [`RoamingPresenceActor`] only shows up:
//! it hops between entities and never edits.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use super::{ActorContext, EditActor};
use crate::entity::{EntityId, EntityRepository};
use crate::identity::ActorIdentity;
use crate::presence::{JoinHandler, PresenceManager};
use crate::topic::{connect_eager, lock, Registration, TopicId, TopicStore};

/// Real (non-bot) actors currently in a topic.
///
/// Transition callbacks run while the set is locked, so a join and a leave
/// racing on different threads act in the order they were recorded.
#[derive(Default)]
struct RealActors {
    ids: Mutex<HashSet<String>>,
    any: AtomicBool,
}

impl RealActors {
    /// Record a join; `on_first` runs when the set stops being empty.
    fn join(&self, actor: &ActorIdentity, on_first: impl FnOnce()) {
        let mut ids = lock(&self.ids);
        if !ids.insert(actor.id.clone()) {
            return;
        }
        if !self.any.swap(true, Ordering::AcqRel) {
            on_first();
        }
    }

    /// Record a leave; `on_last` runs when the set becomes empty.
    fn leave(&self, actor: &ActorIdentity, on_last: impl FnOnce()) {
        let mut ids = lock(&self.ids);
        if !ids.remove(&actor.id) || !ids.is_empty() {
            return;
        }
        if self.any.swap(false, Ordering::AcqRel) {
            on_last();
        }
    }

    /// Run `action` only while no real actor is recorded.
    ///
    /// The set stays locked for the duration, so no join slips in between
    /// the check and the action.
    fn when_unwatched<T>(&self, action: impl FnOnce() -> T) -> Option<T> {
        let ids = lock(&self.ids);
        if !ids.is_empty() {
            return None;
        }
        let result = action();
        drop(ids);
        Some(result)
    }

    fn any(&self) -> bool {
        self.any.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        lock(&self.ids).len()
    }
}

/// Owner of a [`RealActors`] set with transition callbacks.
trait TracksRealActors: Send + Sync + 'static {
    fn real_actors(&self) -> &RealActors;

    fn on_first_real_actor(&self, joined: &ActorIdentity);

    fn on_last_real_actor(&self, left: &ActorIdentity);
}

/// Join handler feeding `owner`'s real actor set. Bots are ignored.
fn tracking_handler<T: TracksRealActors>(owner: &Arc<T>) -> JoinHandler {
    let weak = Arc::downgrade(owner);
    Arc::new(move |joined: &ActorIdentity| {
        if joined.is_synthetic() {
            return Registration::noop();
        }
        let Some(owner) = weak.upgrade() else {
            return Registration::noop();
        };
        owner
            .real_actors()
            .join(joined, || owner.on_first_real_actor(joined));

        let weak = Arc::downgrade(&owner);
        let joined = joined.clone();
        Registration::new(move || {
            if let Some(owner) = weak.upgrade() {
                owner
                    .real_actors()
                    .leave(&joined, || owner.on_last_real_actor(&joined));
            }
        })
    })
}

/// Bot bound to one entity.
pub struct PresenceActor<R: EntityRepository> {
    entity_id: EntityId,
    actor: ActorIdentity,
    context: Arc<ActorContext<R>>,
    real: RealActors,
    presence: Mutex<Option<Arc<PresenceManager>>>,
    registration: Mutex<Option<Registration>>,
    closed: AtomicBool,
}

impl<R: EntityRepository> PresenceActor<R> {
    /// Connect to the entity's topic and start watching for real actors.
    pub fn start(
        context: Arc<ActorContext<R>>,
        entity_id: EntityId,
        actor: ActorIdentity,
        initially_present: bool,
    ) -> Arc<Self> {
        let presence_actor = Arc::new(Self {
            entity_id,
            actor: actor.clone(),
            context,
            real: RealActors::default(),
            presence: Mutex::new(None),
            registration: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let store = Arc::clone(&presence_actor.context.store);
        let registration = connect_eager(&store, TopicId::for_entity(entity_id), actor, |connection| {
            let manager = Arc::new(PresenceManager::new(&connection));
            *lock(&presence_actor.presence) = Some(Arc::clone(&manager));
            if let Err(e) = manager.mark_present(initially_present) {
                warn!(entity_id = entity_id, error = %e, "Failed to set initial presence");
            }
            manager.set_join_handler(tracking_handler(&presence_actor));
            Some(Registration::new(move || {
                if let Err(e) = manager.close() {
                    warn!(entity_id = entity_id, error = %e, "Failed to close presence");
                }
            }))
        });
        *lock(&presence_actor.registration) = Some(registration);
        presence_actor
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn actor(&self) -> &ActorIdentity {
        &self.actor
    }

    pub fn has_real_actors(&self) -> bool {
        self.real.any()
    }

    pub fn real_actor_count(&self) -> usize {
        self.real.len()
    }

    pub fn is_present(&self) -> bool {
        self.manager().is_some_and(|manager| manager.is_present())
    }

    /// Show or hide this bot in the topic.
    pub fn set_present(&self, present: bool) -> anyhow::Result<()> {
        match self.manager() {
            Some(manager) => manager.mark_present(present),
            None => Ok(()),
        }
    }

    /// Show or hide this bot unless real actors are watching.
    ///
    /// Returns whether the toggle was applied.
    pub fn toggle_if_unwatched(&self, present: bool) -> anyhow::Result<bool> {
        let Some(manager) = self.manager() else {
            return Ok(false);
        };
        let outcome = self
            .real
            .when_unwatched(|| manager.mark_present_quietly(present));
        // Join handlers lock the real actor set, so they run after it is released.
        manager.deliver_pending();
        match outcome {
            Some(result) => result.map(|()| true),
            None => Ok(false),
        }
    }

    fn manager(&self) -> Option<Arc<PresenceManager>> {
        lock(&self.presence).clone()
    }

    /// Edit actor currently paired with this entity.
    pub fn edit_actor(&self) -> Option<Arc<EditActor<R>>> {
        self.context.registry.get(self.entity_id)
    }

    /// Leave the topic for good. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registration) = lock(&self.registration).take() {
            registration.remove();
        }
        lock(&self.presence).take();
        trace!(entity_id = self.entity_id, "Presence actor closed");
    }
}

impl<R: EntityRepository> TracksRealActors for PresenceActor<R> {
    fn real_actors(&self) -> &RealActors {
        &self.real
    }

    fn on_first_real_actor(&self, joined: &ActorIdentity) {
        debug!(entity_id = self.entity_id, actor = %joined.id, "Real actor arrived");
        if let Err(e) = self.set_present(true) {
            warn!(entity_id = self.entity_id, error = %e, "Failed to mark bot present");
        }

        let target = match self.context.repository.require(self.entity_id) {
            Ok(target) => target,
            Err(e) => {
                warn!(entity_id = self.entity_id, error = %e, "Failed to load entity for editing");
                return;
            }
        };
        let (_, created) = self.context.registry.get_or_create(self.entity_id, || {
            self.context.spawn_edit_actor(target, self.actor.clone())
        });
        if !created {
            trace!(entity_id = self.entity_id, "Edit actor already running");
        }
    }

    fn on_last_real_actor(&self, left: &ActorIdentity) {
        debug!(entity_id = self.entity_id, actor = %left.id, "Last real actor left");
        match self.context.registry.remove(self.entity_id) {
            Some(edit_actor) => edit_actor.stop(),
            None => debug!(entity_id = self.entity_id, "No edit actor to remove"),
        }
    }
}

struct RoamingTarget {
    entity_id: EntityId,
    registration: Registration,
}

/// Bot that wanders between entities without editing.
pub struct RoamingPresenceActor {
    actor: ActorIdentity,
    store: Arc<dyn TopicStore>,
    real: Arc<RoamingState>,
    target: Mutex<Option<RoamingTarget>>,
}

#[derive(Default)]
struct RoamingState {
    real: RealActors,
}

impl TracksRealActors for RoamingState {
    fn real_actors(&self) -> &RealActors {
        &self.real
    }

    fn on_first_real_actor(&self, joined: &ActorIdentity) {
        trace!(actor = %joined.id, "Roaming bot sees real actor");
    }

    fn on_last_real_actor(&self, left: &ActorIdentity) {
        trace!(actor = %left.id, "Roaming bot lost real actor");
    }
}

impl RoamingPresenceActor {
    pub fn new(actor: ActorIdentity, store: Arc<dyn TopicStore>) -> Self {
        Self {
            actor,
            store,
            real: Arc::new(RoamingState::default()),
            target: Mutex::new(None),
        }
    }

    pub fn actor(&self) -> &ActorIdentity {
        &self.actor
    }

    /// Entity whose topic the bot is in.
    pub fn target(&self) -> Option<EntityId> {
        lock(&self.target).as_ref().map(|target| target.entity_id)
    }

    /// Real actors seen in the current topic.
    pub fn real_actor_count(&self) -> usize {
        self.real.real.len()
    }

    pub fn has_real_actors(&self) -> bool {
        self.real.real.any()
    }

    /// Move to `entity_id`'s topic. Returns false when already there.
    pub fn retarget(&self, entity_id: EntityId) -> bool {
        let mut target = lock(&self.target);
        if target.as_ref().is_some_and(|current| current.entity_id == entity_id) {
            trace!(actor = %self.actor.id, entity_id = entity_id, "Roaming bot already there");
            return false;
        }
        if let Some(previous) = target.take() {
            previous.registration.remove();
        }

        let real = Arc::clone(&self.real);
        let actor_id = self.actor.id.clone();
        let registration = connect_eager(
            &self.store,
            TopicId::for_entity(entity_id),
            self.actor.clone(),
            |connection| {
                let manager = PresenceManager::new(&connection);
                if let Err(e) = manager.mark_present(true) {
                    warn!(actor = %actor_id, entity_id = entity_id, error = %e, "Failed to join topic");
                }
                manager.set_join_handler(tracking_handler(&real));
                Some(Registration::new(move || {
                    if let Err(e) = manager.close() {
                        warn!(actor = %actor_id, error = %e, "Failed to leave topic");
                    }
                }))
            },
        );

        debug!(actor = %self.actor.id, entity_id = entity_id, "Roaming bot moved");
        *target = Some(RoamingTarget {
            entity_id,
            registration,
        });
        true
    }

    /// Leave the current topic, if any.
    pub fn close(&self) {
        if let Some(previous) = lock(&self.target).take() {
            previous.registration.remove();
        }
    }
}
