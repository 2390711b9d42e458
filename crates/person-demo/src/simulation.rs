//! Simulation runner for the person directory demo.
//!
//! Orchestrates one run:
//! 1. Seed the repository with generated people
//! 2. Launch the bot manager over a fresh topic store
//! 3. Let visitors wander between person editors for the configured time
//! 4. Shut everything down and collect what happened

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use bot_kernel::{BotConfig, BotHost, EntityId, EntityRepository, InMemoryTopicStore, TopicStore};

use crate::fields::person_fields;
use crate::generator::GeneratorConfig;
use crate::observer::{GridWatcher, Visitor};
use crate::repository::InMemoryPersonRepository;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Bot engine configuration
    pub bots: BotConfig,
    /// Demo data generation
    pub people: GeneratorConfig,
    /// Number of simulated real visitors
    pub visitors: usize,
    /// How long to let the bots work
    pub duration: Duration,
    /// Time between two visitor moves
    pub visitor_interval: Duration,
    /// Seed for visitor movement; entropy when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            bots: BotConfig::default(),
            people: GeneratorConfig::default(),
            visitors: 3,
            duration: Duration::from_secs(30),
            visitor_interval: Duration::from_secs(3),
            seed: None,
        }
    }
}

/// What happened during a run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub people: usize,
    pub visitors: usize,
    pub duration_ms: u64,
    pub edit_actors_created: usize,
    pub edit_actors_active_at_end: usize,
    pub repository_updates: usize,
    pub refresh_signals: usize,
    pub refreshed_people: usize,
    pub save_toasts_seen: usize,
}

/// Runs the demo end to end.
pub struct SimulationRunner {
    config: SimulationConfig,
    store: Arc<dyn TopicStore>,
    repository: Arc<InMemoryPersonRepository>,
}

impl SimulationRunner {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_repository(config, Arc::new(InMemoryPersonRepository::new()))
    }

    /// Run against an existing repository; it is only seeded when empty.
    pub fn with_repository(config: SimulationConfig, repository: Arc<InMemoryPersonRepository>) -> Self {
        Self {
            config,
            store: Arc::new(InMemoryTopicStore::new()),
            repository,
        }
    }

    pub fn store(&self) -> &Arc<dyn TopicStore> {
        &self.store
    }

    pub fn repository(&self) -> &Arc<InMemoryPersonRepository> {
        &self.repository
    }

    /// Run for the configured duration on the current tokio runtime.
    pub async fn run(&self) -> Result<SimulationSummary> {
        self.repository.seed_if_empty(self.config.people.clone());
        let ids = self.repository.find_all_ids()?;

        info!(
            people = ids.len(),
            visitors = self.config.visitors,
            duration_ms = self.config.duration.as_millis() as u64,
            "Starting simulation"
        );

        let mut grid = GridWatcher::watch(&self.store);
        let host = BotHost::new();
        let handle = host.launch(
            self.config.bots.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.repository),
            person_fields(),
        )?;

        let token = CancellationToken::new();
        let visitors = tokio::spawn(wander(
            (1..=self.config.visitors)
                .map(|n| Visitor::new(n, Arc::clone(&self.store)))
                .collect(),
            ids,
            self.config.visitor_interval,
            self.config.seed,
            token.clone(),
        ));

        tokio::time::sleep(self.config.duration).await;

        token.cancel();
        let save_toasts_seen = visitors.await?;
        let edit_actors_created = handle.edit_actors_created();
        let edit_actors_active_at_end = handle.active_edit_actors();
        handle.shutdown().await?;
        grid.close();

        let summary = SimulationSummary {
            people: self.repository.len(),
            visitors: self.config.visitors,
            duration_ms: self.config.duration.as_millis() as u64,
            edit_actors_created,
            edit_actors_active_at_end,
            repository_updates: self.repository.update_count(),
            refresh_signals: grid.refresh_count(),
            refreshed_people: grid.refreshed_entities(),
            save_toasts_seen,
        };
        info!(
            updates = summary.repository_updates,
            refreshes = summary.refresh_signals,
            "Simulation complete"
        );
        Ok(summary)
    }
}

/// Move visitors between editors until cancelled. Returns the save toasts they saw.
async fn wander(
    mut visitors: Vec<Visitor>,
    ids: Vec<EntityId>,
    interval: Duration,
    seed: Option<u64>,
    token: CancellationToken,
) -> usize {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    };

    while !visitors.is_empty() && !ids.is_empty() {
        let index = rng.random_range(0..visitors.len());
        let visitor = &mut visitors[index];
        if visitor.current().is_some() && rng.random_bool(0.5) {
            visitor.close();
        } else if let Some(&entity_id) = ids.choose(&mut rng) {
            visitor.open(entity_id);
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    token.cancelled().await;

    for visitor in &mut visitors {
        visitor.close();
    }
    debug!(visitors = visitors.len(), "Visitors left");
    visitors.iter().map(Visitor::toasts_seen).sum()
}
