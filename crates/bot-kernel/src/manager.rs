//! Bot manager: the single scheduler driving every bot.
//!
//! The manager waits until the repository has entities, puts one presence
//! actor on each of them and then runs a fixed cycle:
//!
//! 1. maybe move the next roaming bot (round robin) to a random entity,
//! 2. toggle the presence of a random entity's bot unless real people are there,
//! 3. sleep one tick interval,
//! 4. tick every live edit actor.
//!
//! A [`BotHost`] runs at most one manager.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::actors::{
    ActorContext, EditActor, EditActorRegistry, PresenceActor, RoamingPresenceActor, TickOutcome,
};
use crate::config::{BotConfig, IdentityPoolPolicy};
use crate::entity::{EntityId, EntityRepository};
use crate::error::BotError;
use crate::fields::FieldCatalog;
use crate::identity::{ActorIdentity, IdentityGenerator, EDIT_BOT_PREFIX, ROAMING_BOT_PREFIX};
use crate::topic::TopicStore;

/// Owner of the one-manager-per-host rule.
#[derive(Debug, Default)]
pub struct BotHost {
    launched: AtomicBool,
}

impl BotHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_launched(&self) -> bool {
        self.launched.load(Ordering::Acquire)
    }

    /// Validate `config` and start the manager loop on the current tokio runtime.
    ///
    /// Fails with [`BotError::AlreadyLaunched`] on every call after the first
    /// successful one.
    pub fn launch<R: EntityRepository>(
        &self,
        config: BotConfig,
        store: Arc<dyn TopicStore>,
        repository: Arc<R>,
        catalog: FieldCatalog,
    ) -> Result<BotManagerHandle<R>, BotError> {
        config.validate()?;
        if self.launched.swap(true, Ordering::AcqRel) {
            return Err(BotError::AlreadyLaunched);
        }

        let manager = BotManager::new(config, store, repository, catalog)?;
        let registry = Arc::clone(manager.registry());
        let token = CancellationToken::new();
        let task = tokio::spawn(manager.run(token.clone()));

        Ok(BotManagerHandle {
            token,
            task,
            registry,
        })
    }
}

/// Control over a launched manager.
pub struct BotManagerHandle<R: EntityRepository> {
    token: CancellationToken,
    task: JoinHandle<()>,
    registry: Arc<EditActorRegistry<R>>,
}

impl<R: EntityRepository> BotManagerHandle<R> {
    /// Edit actors alive right now.
    pub fn active_edit_actors(&self) -> usize {
        self.registry.len()
    }

    /// Edit actors created since launch.
    pub fn edit_actors_created(&self) -> usize {
        self.registry.created_count()
    }

    pub fn edit_actor(&self, entity_id: EntityId) -> Option<Arc<EditActor<R>>> {
        self.registry.get(entity_id)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for every bot to leave.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.token.cancel();
        self.task.await.context("bot manager task failed")?;
        Ok(())
    }
}

/// The scheduler state. Owned by the manager task.
///
/// Only [`BotHost::launch`] runs the loop. The cycle steps are public so
/// they can be driven by hand, one at a time.
pub struct BotManager<R: EntityRepository> {
    config: BotConfig,
    context: Arc<ActorContext<R>>,
    main_pool: Vec<ActorIdentity>,
    roaming: Vec<RoamingPresenceActor>,
    presence_actors: BTreeMap<EntityId, Arc<PresenceActor<R>>>,
    entity_ids: Vec<EntityId>,
    next_roaming: usize,
    rng: ChaCha8Rng,
}

impl<R: EntityRepository> BotManager<R> {
    pub fn new(
        config: BotConfig,
        store: Arc<dyn TopicStore>,
        repository: Arc<R>,
        catalog: FieldCatalog,
    ) -> Result<Self, BotError> {
        config.validate()?;

        let identities = IdentityGenerator::new();
        let pools = &config.pools;
        let main_pool = identities.generate_pool(
            EDIT_BOT_PREFIX,
            pools.main_size,
            pools.avatar_count,
            false,
        );
        let roaming_identities = match pools.identity_policy {
            IdentityPoolPolicy::Disjoint => identities.generate_pool(
                ROAMING_BOT_PREFIX,
                pools.roaming_size,
                pools.avatar_count,
                true,
            ),
            IdentityPoolPolicy::Shared => (0..pools.roaming_size)
                .map(|i| main_pool[i % main_pool.len()].clone())
                .collect(),
        };
        let roaming = roaming_identities
            .into_iter()
            .map(|identity| RoamingPresenceActor::new(identity, Arc::clone(&store)))
            .collect();

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let context = Arc::new(ActorContext::new(&config, store, repository, catalog));

        Ok(Self {
            config,
            context,
            main_pool,
            roaming,
            presence_actors: BTreeMap::new(),
            entity_ids: Vec::new(),
            next_roaming: 0,
            rng,
        })
    }

    pub fn registry(&self) -> &Arc<EditActorRegistry<R>> {
        &self.context.registry
    }

    pub fn is_initialized(&self) -> bool {
        !self.entity_ids.is_empty()
    }

    pub fn presence_actor(&self, entity_id: EntityId) -> Option<&Arc<PresenceActor<R>>> {
        self.presence_actors.get(&entity_id)
    }

    pub fn roaming_actors(&self) -> &[RoamingPresenceActor] {
        &self.roaming
    }

    /// Identity of the per-entity bot for `entity_id`.
    pub fn main_identity(&self, entity_id: EntityId) -> &ActorIdentity {
        let slot = entity_id.rem_euclid(self.main_pool.len() as i64) as usize;
        &self.main_pool[slot]
    }

    /// Put bots on every entity once the repository has any.
    ///
    /// Returns false while there is nothing to do yet. Calling it again after
    /// a successful initialization is a no-op.
    pub fn initialize_if_possible(&mut self) -> anyhow::Result<bool> {
        if self.is_initialized() {
            return Ok(true);
        }
        let ids = self
            .context
            .repository
            .find_all_ids()
            .context("listing entity ids")?;
        if ids.is_empty() {
            trace!("No entities yet, waiting");
            return Ok(false);
        }

        for &entity_id in &ids {
            let identity = self.main_identity(entity_id).clone();
            let present = self.rng.random_bool(0.5);
            let actor = PresenceActor::start(Arc::clone(&self.context), entity_id, identity, present);
            self.presence_actors.insert(entity_id, actor);
        }
        self.entity_ids = ids;

        for index in 0..self.roaming.len() {
            if let Some(entity_id) = self.roaming_target(index) {
                self.roaming[index].retarget(entity_id);
            }
        }

        info!(
            entities = self.entity_ids.len(),
            roaming = self.roaming.len(),
            "Bot manager initialized"
        );
        Ok(true)
    }

    /// Steps 1 and 2 of the cycle.
    pub fn run_cycle(&mut self) {
        if !self.is_initialized() {
            return;
        }

        if !self.roaming.is_empty() {
            let index = self.next_roaming % self.roaming.len();
            self.next_roaming = self.next_roaming.wrapping_add(1);
            if self.rng.random_bool(self.config.behavior.retarget_probability) {
                if let Some(entity_id) = self.roaming_target(index) {
                    self.roaming[index].retarget(entity_id);
                }
            }
        }

        let Some(&entity_id) = self.entity_ids.choose(&mut self.rng) else {
            return;
        };
        let present = self.rng.random_bool(0.5);
        if let Some(actor) = self.presence_actors.get(&entity_id) {
            match actor.toggle_if_unwatched(present) {
                Ok(true) => {}
                Ok(false) => trace!(entity_id = entity_id, "Real actors present, leaving bot alone"),
                Err(e) => warn!(entity_id = entity_id, error = %e, "Failed to toggle bot presence"),
            }
        }
    }

    /// Random entity for roaming bot `index`.
    ///
    /// Entities whose own bot has the same identity are skipped: two entries
    /// with one id in an avatar list cannot be told apart on removal.
    fn roaming_target(&mut self, index: usize) -> Option<EntityId> {
        let roaming_id = &self.roaming[index].actor().id;
        let candidates: Vec<EntityId> = self
            .entity_ids
            .iter()
            .copied()
            .filter(|&entity_id| &self.main_identity(entity_id).id != roaming_id)
            .collect();
        candidates.choose(&mut self.rng).copied()
    }

    /// Step 4 of the cycle. Returns how many actors did work.
    pub fn tick_all(&self, now: Instant) -> usize {
        let mut worked = 0;
        for edit_actor in self.context.registry.snapshot() {
            match edit_actor.tick(now) {
                Ok(TickOutcome::Skipped(reason)) => {
                    trace!(entity_id = edit_actor.entity_id(), reason = ?reason, "Tick skipped");
                }
                Ok(outcome) => {
                    worked += 1;
                    trace!(entity_id = edit_actor.entity_id(), outcome = ?outcome, "Tick");
                }
                Err(e) => {
                    warn!(
                        entity_id = edit_actor.entity_id(),
                        actor = %edit_actor.actor().id,
                        error = %e,
                        "Edit actor tick failed"
                    );
                }
            }
        }
        worked
    }

    /// Close every bot. Safe to call more than once.
    pub fn shutdown(&mut self) {
        for roaming in &self.roaming {
            roaming.close();
        }
        for (_, actor) in std::mem::take(&mut self.presence_actors) {
            actor.close();
        }
        self.context.registry.stop_all();
        debug!("Bot manager shut down");
    }

    /// Drive the manager until `token` is cancelled.
    pub(crate) async fn run(mut self, token: CancellationToken) {
        info!(
            tick_interval_ms = self.config.tick_interval_ms,
            main_pool = self.main_pool.len(),
            "Bot manager started"
        );

        loop {
            match self.initialize_if_possible() {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Failed to poll entities"),
            }
            tokio::select! {
                _ = token.cancelled() => {
                    self.shutdown();
                    return;
                }
                _ = tokio::time::sleep(self.config.startup_poll()) => {}
            }
        }

        loop {
            self.run_cycle();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.tick_interval()) => {}
            }
            self.tick_all(Instant::now());
        }

        self.shutdown();
        info!("Bot manager stopped");
    }
}
