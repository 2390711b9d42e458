//! Join/leave notifications on top of a topic's avatar list.
//!
//! A [`PresenceManager`] belongs to one actor on one topic. It can mark that
//! actor present or absent, and it turns changes of the avatar list into
//! join events. Each join handler returns the [`Registration`] to run when
//! the same actor leaves again.
//!
//! Handler calls are serialized per manager. A list change that arrives while
//! handlers are running (including one caused by a handler itself) is folded
//! into another reconciliation pass by the thread already dispatching.
//!
//! The presence flag and this actor's avatar entry change together under one
//! lock. Lock order is presence, then dispatch, and dispatch is only ever
//! try-locked while presence is held.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError, Weak};

use serde_json::Value;
use tracing::trace;

use crate::avatars::{self, AVATAR_LIST};
use crate::identity::ActorIdentity;
use crate::topic::{lock, Registration, SharedList, TopicConnection};

/// Called once per arriving actor; the returned registration runs on leave.
pub type JoinHandler = Arc<dyn Fn(&ActorIdentity) -> Registration + Send + Sync>;

struct Dispatch {
    handler: Option<JoinHandler>,
    joined: HashMap<String, Registration>,
    closed: bool,
}

struct PresenceInner {
    actor: ActorIdentity,
    list: Arc<dyn SharedList>,
    present: Mutex<bool>,
    dirty: AtomicBool,
    dispatch: Mutex<Dispatch>,
    subscription: Mutex<Option<Registration>>,
}

impl PresenceInner {
    /// Dispatch guard if no one is dispatching, including this thread.
    fn try_dispatch(&self) -> Option<MutexGuard<'_, Dispatch>> {
        match self.dispatch.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn refresh(&self) {
        self.dirty.store(true, Ordering::Release);
        loop {
            // The dispatching thread will see the dirty flag.
            let Some(mut dispatch) = self.try_dispatch() else {
                return;
            };
            while self.dirty.swap(false, Ordering::AcqRel) {
                self.reconcile(&mut dispatch);
            }
            drop(dispatch);
            if !self.dirty.load(Ordering::Acquire) {
                return;
            }
        }
    }

    fn reconcile(&self, dispatch: &mut Dispatch) {
        if dispatch.closed {
            return;
        }
        let Some(handler) = dispatch.handler.clone() else {
            return;
        };

        let mut seen = HashSet::new();
        let present: Vec<ActorIdentity> = avatars::present_actors(self.list.as_ref())
            .into_iter()
            .filter(|actor| seen.insert(actor.id.clone()))
            .collect();

        let departed: Vec<String> = dispatch
            .joined
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for id in departed {
            if let Some(leave) = dispatch.joined.remove(&id) {
                trace!(observer = %self.actor.id, actor = %id, "Actor left");
                leave.remove();
            }
        }

        for actor in present {
            if dispatch.joined.contains_key(&actor.id) {
                continue;
            }
            trace!(observer = %self.actor.id, actor = %actor.id, "Actor joined");
            let leave = handler(&actor);
            dispatch.joined.insert(actor.id, leave);
        }
    }
}

/// Presence of one actor in one topic, plus notifications about everyone else.
pub struct PresenceManager {
    inner: Arc<PresenceInner>,
}

impl PresenceManager {
    /// Manager for `connection`'s actor on `connection`'s topic.
    pub fn new(connection: &TopicConnection) -> Self {
        Self::for_list(connection.actor().clone(), connection.list(AVATAR_LIST))
    }

    pub fn for_list(actor: ActorIdentity, list: Arc<dyn SharedList>) -> Self {
        Self {
            inner: Arc::new(PresenceInner {
                actor,
                list,
                present: Mutex::new(false),
                dirty: AtomicBool::new(false),
                dispatch: Mutex::new(Dispatch {
                    handler: None,
                    joined: HashMap::new(),
                    closed: false,
                }),
                subscription: Mutex::new(None),
            }),
        }
    }

    pub fn actor(&self) -> &ActorIdentity {
        &self.inner.actor
    }

    pub fn is_present(&self) -> bool {
        *lock(&self.inner.present)
    }

    /// Add or remove this manager's actor from the avatar list.
    ///
    /// Repeating the current state does not touch the list.
    pub fn mark_present(&self, present: bool) -> anyhow::Result<()> {
        let result = self.mark_present_quietly(present);
        self.deliver_pending();
        result
    }

    /// [`mark_present`](Self::mark_present) without running join handlers.
    ///
    /// Handlers owed for the change run on the next
    /// [`deliver_pending`](Self::deliver_pending) or list change. Callers
    /// holding locks that handlers take use this, then deliver after
    /// unlocking.
    pub(crate) fn mark_present_quietly(&self, present: bool) -> anyhow::Result<()> {
        let mut current = lock(&self.inner.present);
        if *current == present {
            return Ok(());
        }
        // Holding dispatch keeps our own list listener from running handlers
        // inline. If someone is already dispatching, they pick the change up.
        let dispatch = self.inner.try_dispatch();
        let list = self.inner.list.as_ref();
        let result = if present {
            avatars::add_presence(list, &self.inner.actor)
        } else {
            avatars::remove_presence(list, &self.inner.actor)
        };
        drop(dispatch);
        if result.is_ok() {
            *current = present;
        }
        result
    }

    /// Run join handlers for list changes not yet reported.
    pub(crate) fn deliver_pending(&self) {
        if self.inner.dirty.load(Ordering::Acquire) {
            self.inner.refresh();
        }
    }

    /// Install the join handler and start listening.
    ///
    /// Everyone already present is reported immediately.
    pub fn set_join_handler(&self, handler: JoinHandler) {
        {
            let mut dispatch = lock(&self.inner.dispatch);
            if dispatch.closed {
                return;
            }
            dispatch.handler = Some(handler);
        }

        let mut subscription = lock(&self.inner.subscription);
        if subscription.is_none() {
            let weak: Weak<PresenceInner> = Arc::downgrade(&self.inner);
            *subscription = Some(self.inner.list.subscribe(Arc::new(move |_: &[Value]| {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh();
                }
            })));
        }
        drop(subscription);
        self.inner.refresh();
    }

    /// Stop listening, report every tracked actor as gone and mark absent.
    pub fn close(&self) -> anyhow::Result<()> {
        if let Some(subscription) = lock(&self.inner.subscription).take() {
            subscription.remove();
        }
        let leaves: Vec<Registration> = {
            let mut dispatch = lock(&self.inner.dispatch);
            dispatch.closed = true;
            dispatch.handler = None;
            dispatch.joined.drain().map(|(_, leave)| leave).collect()
        };
        for leave in leaves {
            leave.remove();
        }
        self.mark_present(false)
    }
}

impl std::fmt::Debug for PresenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceManager")
            .field("actor", &self.inner.actor.id)
            .field("present", &self.is_present())
            .finish()
    }
}
