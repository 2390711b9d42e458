//! Configuration types for the bot engine.

use std::time::Duration;

use serde::Deserialize;

use crate::error::BotError;

/// Top-level bot configuration.
///
/// This defines the scheduler cadence, the bot pools and the randomized
/// behavior. Loaded from JSON at runtime; every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Sleep between scheduler cycles (milliseconds)
    pub tick_interval_ms: u64,

    /// Sleep between repository polls while waiting for data (milliseconds)
    pub startup_poll_ms: u64,

    /// Minimum delay between two visible actions of one edit bot (milliseconds)
    pub edit_delay_ms: u64,

    /// Bot pool sizes and identity policy
    pub pools: PoolConfig,

    /// Randomized behavior
    pub behavior: BehaviorConfig,

    /// Seed for reproducible runs; entropy when absent
    pub seed: Option<u64>,
}

/// Whether roaming bots get their own identities or reuse the main pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPoolPolicy {
    /// Roaming bots use a separate `pr-bot-` namespace.
    Disjoint,
    /// Roaming bots borrow identities from the main pool.
    Shared,
}

/// Bot pool configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Identities shared by the per-entity presence bots (assigned by `id mod main_size`)
    pub main_size: usize,

    /// Number of roaming presence bots
    pub roaming_size: usize,

    /// Number of avatar images available
    pub avatar_count: usize,

    /// Identity sharing between the two pools
    pub identity_policy: IdentityPoolPolicy,
}

/// Randomized behavior configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Probability per cycle of moving the next roaming bot
    pub retarget_probability: f64,

    /// Smallest number of finished scripts before a commit
    pub commit_threshold_min: u32,

    /// Largest number of finished scripts before a commit
    pub commit_threshold_max: u32,

    /// Also skip setting enumerated fields when another editor holds them
    pub enum_contention_guard: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            startup_poll_ms: 1_000,
            edit_delay_ms: 2_000,
            pools: PoolConfig::default(),
            behavior: BehaviorConfig::default(),
            seed: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            main_size: 20,
            roaming_size: 5,
            avatar_count: 8,
            identity_policy: IdentityPoolPolicy::Disjoint,
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            retarget_probability: 0.2,
            commit_threshold_min: 2,
            commit_threshold_max: 5,
            enum_contention_guard: false,
        }
    }
}

impl BotConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), BotError> {
        if self.pools.main_size == 0 {
            return Err(BotError::InvalidConfig(
                "pools.main_size must be at least 1".to_string(),
            ));
        }
        if self.pools.avatar_count == 0 {
            return Err(BotError::InvalidConfig(
                "pools.avatar_count must be at least 1".to_string(),
            ));
        }
        let behavior = &self.behavior;
        if behavior.commit_threshold_min == 0
            || behavior.commit_threshold_min > behavior.commit_threshold_max
        {
            return Err(BotError::InvalidConfig(format!(
                "commit threshold range {}..={} is empty or starts at zero",
                behavior.commit_threshold_min, behavior.commit_threshold_max
            )));
        }
        if !(0.0..=1.0).contains(&behavior.retarget_probability) {
            return Err(BotError::InvalidConfig(format!(
                "retarget_probability {} is outside [0, 1]",
                behavior.retarget_probability
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn startup_poll(&self) -> Duration {
        Duration::from_millis(self.startup_poll_ms)
    }

    pub fn edit_delay(&self) -> Duration {
        Duration::from_millis(self.edit_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.edit_delay(), Duration::from_secs(2));
        assert_eq!(config.pools.identity_policy, IdentityPoolPolicy::Disjoint);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = BotConfig::from_json(
            r#"{"tick_interval_ms": 50, "pools": {"identity_policy": "shared"}, "seed": 7}"#,
        )
        .unwrap();

        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.startup_poll_ms, 1_000);
        assert_eq!(config.pools.main_size, 20);
        assert_eq!(config.pools.identity_policy, IdentityPoolPolicy::Shared);
        assert_eq!(config.behavior.commit_threshold_max, 5);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_rejects_inverted_threshold_range() {
        let result =
            BotConfig::from_json(r#"{"behavior": {"commit_threshold_min": 6}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_empty_main_pool() {
        let mut config = BotConfig::default();
        config.pools.main_size = 0;
        assert!(matches!(config.validate(), Err(BotError::InvalidConfig(_))));
    }
}
