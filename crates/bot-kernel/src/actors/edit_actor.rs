//! Edit actor: a bot editing one entity while real people watch.
//!
//! Each tick does at most one visible thing: build a script, run one of its
//! steps, or commit the edits made so far. Ticks closer together than the
//! configured edit delay are skipped so people can follow along.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace, warn};

use crate::commit::{commit, CommitReport};
use crate::config::BotConfig;
use crate::entity::{Entity, EntityId, EntityRepository};
use crate::error::BotError;
use crate::fields::FieldCatalog;
use crate::identity::ActorIdentity;
use crate::script::{build_script, EditScript, StepEffect};
use crate::topic::{connect_eager, lock, Registration, TopicConnection, TopicId, TopicStore};

/// Pacing and commit behavior of edit actors.
#[derive(Debug, Clone)]
pub struct EditSettings {
    /// Minimum time between two working ticks
    pub edit_delay: Duration,
    /// Smallest finished-script count that triggers a commit
    pub commit_threshold_min: u32,
    /// Largest finished-script count that triggers a commit
    pub commit_threshold_max: u32,
    /// Guard choice fields against contention like text fields
    pub guard_choices: bool,
}

impl EditSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            edit_delay: config.edit_delay(),
            commit_threshold_min: config.behavior.commit_threshold_min,
            commit_threshold_max: config.behavior.commit_threshold_max,
            guard_choices: config.behavior.enum_contention_guard,
        }
    }

    fn draw_threshold(&self, rng: &mut ChaCha8Rng) -> u32 {
        let max = self.commit_threshold_max.max(self.commit_threshold_min);
        rng.random_range(self.commit_threshold_min..=max)
    }
}

impl Default for EditSettings {
    fn default() -> Self {
        Self::from_config(&BotConfig::default())
    }
}

/// Why a tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Stopped,
    NotConnected,
    Throttled,
    NoFields,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    ScriptStarted {
        field: String,
    },
    StepExecuted {
        field: String,
        effect: StepEffect,
        finished: bool,
    },
    Committed(CommitReport),
}

struct EditProgress<E> {
    target: E,
    edits_since_commit: u32,
    commit_threshold: u32,
    last_action: Option<Instant>,
    script: Option<EditScript>,
    rng: ChaCha8Rng,
}

/// Bot editing one entity.
pub struct EditActor<R: EntityRepository> {
    entity_id: EntityId,
    actor: ActorIdentity,
    repository: Arc<R>,
    catalog: Arc<FieldCatalog>,
    settings: EditSettings,
    stopped: AtomicBool,
    connection: Mutex<Option<TopicConnection>>,
    registration: Mutex<Option<Registration>>,
    progress: Mutex<EditProgress<R::Entity>>,
}

impl<R: EntityRepository> EditActor<R> {
    /// Create the actor and connect it to the entity's topic.
    pub fn spawn(
        store: &Arc<dyn TopicStore>,
        target: R::Entity,
        actor: ActorIdentity,
        repository: Arc<R>,
        catalog: Arc<FieldCatalog>,
        settings: EditSettings,
        mut rng: ChaCha8Rng,
    ) -> Arc<Self> {
        let entity_id = target.id();
        let commit_threshold = settings.draw_threshold(&mut rng);
        let edit_actor = Arc::new(Self {
            entity_id,
            actor: actor.clone(),
            repository,
            catalog,
            settings,
            stopped: AtomicBool::new(false),
            connection: Mutex::new(None),
            registration: Mutex::new(None),
            progress: Mutex::new(EditProgress {
                target,
                edits_since_commit: 0,
                commit_threshold,
                last_action: None,
                script: None,
                rng,
            }),
        });

        let weak = Arc::downgrade(&edit_actor);
        let registration = connect_eager(store, TopicId::for_entity(entity_id), actor, |connection| {
            *lock(&edit_actor.connection) = Some(connection);
            Some(Registration::new(move || {
                if let Some(edit_actor) = weak.upgrade() {
                    lock(&edit_actor.connection).take();
                }
            }))
        });
        *lock(&edit_actor.registration) = Some(registration);

        debug!(
            entity_id = entity_id,
            actor = %edit_actor.actor.id,
            commit_threshold = commit_threshold,
            "Edit actor created"
        );
        edit_actor
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn actor(&self) -> &ActorIdentity {
        &self.actor
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.connection)
            .as_ref()
            .is_some_and(TopicConnection::is_active)
    }

    /// Scripts finished since the last successful commit.
    pub fn edits_since_commit(&self) -> u32 {
        lock(&self.progress).edits_since_commit
    }

    pub fn commit_threshold(&self) -> u32 {
        lock(&self.progress).commit_threshold
    }

    /// Field of the script in progress.
    pub fn current_field(&self) -> Option<String> {
        lock(&self.progress)
            .script
            .as_ref()
            .map(|script| script.field().to_string())
    }

    /// Copy of the entity as this actor last saw it.
    pub fn target(&self) -> R::Entity {
        lock(&self.progress).target.clone()
    }

    /// Perform at most one unit of work.
    ///
    /// Failed steps and commits leave the progress as it was, so the same
    /// work is retried on a later tick.
    pub fn tick(&self, now: Instant) -> anyhow::Result<TickOutcome> {
        if self.is_stopped() {
            return Ok(TickOutcome::Skipped(SkipReason::Stopped));
        }
        let connection = match lock(&self.connection).clone() {
            Some(connection) if connection.is_active() => connection,
            _ => return Ok(TickOutcome::Skipped(SkipReason::NotConnected)),
        };

        let mut guard = self
            .progress
            .lock()
            .map_err(|_| BotError::Poisoned("edit actor progress"))?;
        let progress = &mut *guard;
        if self.is_stopped() {
            return Ok(TickOutcome::Skipped(SkipReason::Stopped));
        }
        if let Some(last) = progress.last_action {
            if now.saturating_duration_since(last) < self.settings.edit_delay {
                return Ok(TickOutcome::Skipped(SkipReason::Throttled));
            }
        }

        if progress.edits_since_commit >= progress.commit_threshold {
            progress.last_action = Some(now);
            let report = self.commit_edits(&connection, progress)?;
            progress.edits_since_commit = 0;
            progress.commit_threshold = self.settings.draw_threshold(&mut progress.rng);
            progress.script = None;
            return Ok(TickOutcome::Committed(report));
        }

        if let Some(script) = progress.script.as_mut() {
            let field = script.field().to_string();
            let effect = script.execute_next()?;
            let finished = script.is_finished();
            progress.last_action = Some(now);
            if finished {
                progress.script = None;
                progress.edits_since_commit += 1;
            }
            return Ok(match effect {
                Some(effect) => TickOutcome::StepExecuted {
                    field,
                    effect,
                    finished,
                },
                None => TickOutcome::Skipped(SkipReason::NoFields),
            });
        }

        let Some(script) = build_script(
            &connection,
            &self.catalog,
            &mut progress.rng,
            self.settings.guard_choices,
        ) else {
            return Ok(TickOutcome::Skipped(SkipReason::NoFields));
        };
        let field = script.field().to_string();
        trace!(entity_id = self.entity_id, actor = %self.actor.id, field = %field, "Edit script started");
        progress.script = Some(script);
        progress.last_action = Some(now);
        Ok(TickOutcome::ScriptStarted { field })
    }

    fn commit_edits(
        &self,
        connection: &TopicConnection,
        progress: &mut EditProgress<R::Entity>,
    ) -> anyhow::Result<CommitReport> {
        // Start from the stored entity so untouched fields are not reverted.
        progress.target = self.repository.require(self.entity_id)?;
        commit(
            connection,
            &mut progress.target,
            self.repository.as_ref(),
            &self.catalog,
        )
    }

    /// Stop ticking, release any held field and disconnect. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let script = lock(&self.progress).script.take();
        if let Some(mut script) = script {
            if let Err(e) = script.abandon() {
                warn!(entity_id = self.entity_id, error = %e, "Failed to release field lock");
            }
        }
        if let Some(registration) = lock(&self.registration).take() {
            registration.remove();
        }
        debug!(entity_id = self.entity_id, actor = %self.actor.id, "Edit actor stopped");
    }
}

impl<R: EntityRepository> std::fmt::Debug for EditActor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditActor")
            .field("entity_id", &self.entity_id)
            .field("actor", &self.actor.id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
