//! Bots that act in entity topics.
//!
//! ```text
//! BotManager (one task)
//!   ├─ PresenceActor per entity ── real actor joins ──► EditActor (registry)
//!   │                           ◄─ last real actor leaves ── stop + remove
//!   ├─ RoamingPresenceActor ×N   (presence only, hops between entities)
//!   └─ tick ──► every EditActor: one step, one commit or nothing
//! ```
//!
//! Presence actors react to callbacks from the topic store, which may arrive
//! on any thread. Edit actors are only ticked by the manager task.

mod edit_actor;
mod presence_actor;
mod registry;

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::BotConfig;
use crate::entity::{Entity, EntityId, EntityRepository};
use crate::fields::FieldCatalog;
use crate::identity::ActorIdentity;
use crate::topic::TopicStore;

pub use edit_actor::{EditActor, EditSettings, SkipReason, TickOutcome};
pub use presence_actor::{PresenceActor, RoamingPresenceActor};
pub use registry::EditActorRegistry;

/// Everything a presence actor needs to spawn edit actors.
pub struct ActorContext<R: EntityRepository> {
    pub store: Arc<dyn TopicStore>,
    pub repository: Arc<R>,
    pub registry: Arc<EditActorRegistry<R>>,
    pub catalog: Arc<FieldCatalog>,
    pub settings: EditSettings,
    pub seed: Option<u64>,
}

impl<R: EntityRepository> ActorContext<R> {
    pub fn new(
        config: &BotConfig,
        store: Arc<dyn TopicStore>,
        repository: Arc<R>,
        catalog: FieldCatalog,
    ) -> Self {
        Self {
            store,
            repository,
            registry: Arc::new(EditActorRegistry::new()),
            catalog: Arc::new(catalog),
            settings: EditSettings::from_config(config),
            seed: config.seed,
        }
    }

    /// Random source for the edit actor of `entity_id`.
    fn edit_rng(&self, entity_id: EntityId) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed ^ entity_id as u64),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }

    fn spawn_edit_actor(&self, target: R::Entity, actor: ActorIdentity) -> Arc<EditActor<R>> {
        let rng = self.edit_rng(target.id());
        EditActor::spawn(
            &self.store,
            target,
            actor,
            Arc::clone(&self.repository),
            Arc::clone(&self.catalog),
            self.settings.clone(),
            rng,
        )
    }
}
