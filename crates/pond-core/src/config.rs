//! Game configuration, loadable from YAML with every field defaulted.

use crate::{Catalog, CatalogError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Economy tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Coins charged per accepted catch attempt, success or not.
    pub attempt_cost: i64,
    /// Minimum seconds between two accepted attempts of one user.
    pub cooldown_secs: i64,
    /// Success probability without bait.
    pub base_success_rate: f64,
    /// Cap applied after adding the bait bonus.
    pub max_success_rate: f64,
    /// Balance granted when a ledger is first created.
    pub starting_coins: i64,
    /// Inclusive range of the daily bonus grant.
    pub daily_bonus_min: i64,
    pub daily_bonus_max: i64,
    /// Tier weights, tier 1 first.
    pub rarity_weights: [f64; 5],
    /// Admin switch for the whole auto-play feature.
    pub auto_play_enabled: bool,
    /// Seed for deterministic RNG; entropy when absent.
    pub rng_seed: Option<u64>,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            attempt_cost: 50,
            cooldown_secs: 300,
            base_success_rate: 0.70,
            max_success_rate: 0.95,
            starting_coins: 100,
            daily_bonus_min: 50,
            daily_bonus_max: 200,
            rarity_weights: [0.40, 0.30, 0.20, 0.08, 0.02],
            auto_play_enabled: true,
            rng_seed: None,
        }
    }
}

impl EconomyConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, rate) in [
            ("base_success_rate", self.base_success_rate),
            ("max_success_rate", self.max_success_rate),
        ] {
            if !rate.is_finite() {
                return Err(ValidationError::NonFinite);
            }
            if !(0.0..=1.0).contains(&rate) {
                return Err(ValidationError::RateOutOfRange(name));
            }
        }
        if self.base_success_rate > self.max_success_rate {
            return Err(ValidationError::InvertedRange("success_rate"));
        }
        if self.attempt_cost < 0 {
            return Err(ValidationError::NonPositive("attempt_cost"));
        }
        if self.cooldown_secs < 0 {
            return Err(ValidationError::NonPositive("cooldown_secs"));
        }
        if self.starting_coins < 0 {
            return Err(ValidationError::NonPositive("starting_coins"));
        }
        if self.daily_bonus_min < 0 {
            return Err(ValidationError::NonPositive("daily_bonus_min"));
        }
        if self.daily_bonus_min > self.daily_bonus_max {
            return Err(ValidationError::InvertedRange("daily_bonus"));
        }
        Ok(())
    }
}

/// Background auto-play loop tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between ticks.
    pub tick_secs: u64,
    /// Upper bound on one user's attempt within a tick, counted from the
    /// moment the attempt is admitted.
    pub user_timeout_secs: u64,
    /// Attempts admitted at once. Keep at or below the pool size so an
    /// admitted attempt never queues for a connection.
    pub max_in_flight: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            user_timeout_secs: 10,
            max_in_flight: 8,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tick_secs == 0 {
            return Err(ValidationError::NonPositive("tick_secs"));
        }
        if self.user_timeout_secs == 0 {
            return Err(ValidationError::NonPositive("user_timeout_secs"));
        }
        if self.max_in_flight == 0 {
            return Err(ValidationError::NonPositive("max_in_flight"));
        }
        Ok(())
    }

    pub fn tick(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tick_secs)
    }

    pub fn user_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.user_timeout_secs)
    }
}

/// Top-level configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub economy: EconomyConfig,
    pub scheduler: SchedulerConfig,
    pub database_url: String,
    /// Alternative catalog file; the embedded standard table when absent.
    pub catalog_path: Option<PathBuf>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            economy: EconomyConfig::default(),
            scheduler: SchedulerConfig::default(),
            database_url: "sqlite://./data/fishing.db".to_string(),
            catalog_path: None,
        }
    }
}

impl GameConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: GameConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.economy.validate()?;
        self.scheduler.validate()
    }

    /// Load the configured catalog.
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        let catalog = match &self.catalog_path {
            Some(path) => Catalog::load(path)?,
            None => Catalog::standard()?,
        };
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = GameConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.economy.attempt_cost, 50);
        assert_eq!(cfg.economy.cooldown_secs, 300);
        assert_eq!(cfg.scheduler.tick_secs, 60);
        let total: f64 = cfg.economy.rarity_weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg = GameConfig::from_yaml_str(
            "economy:\n  attempt_cost: 25\n  rng_seed: 7\nscheduler:\n  tick_secs: 5\n",
        )
        .unwrap();
        assert_eq!(cfg.economy.attempt_cost, 25);
        assert_eq!(cfg.economy.rng_seed, Some(7));
        assert_eq!(cfg.economy.cooldown_secs, 300);
        assert_eq!(cfg.scheduler.tick_secs, 5);
        assert_eq!(cfg.scheduler.user_timeout_secs, 10);
        assert_eq!(cfg.scheduler.max_in_flight, 8);
        assert!(cfg.catalog_path.is_none());
    }

    #[test]
    fn rejects_inverted_bonus_range() {
        let err = GameConfig::from_yaml_str(
            "economy:\n  daily_bonus_min: 300\n  daily_bonus_max: 200\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(ValidationError::InvertedRange("daily_bonus"))
        ));
    }

    #[test]
    fn rejects_zero_tick() {
        let err = GameConfig::from_yaml_str("scheduler:\n  tick_secs: 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(ValidationError::NonPositive("tick_secs"))
        ));
    }

    #[test]
    fn shipped_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/config.yaml");
        let cfg = GameConfig::load(path).unwrap();
        assert_eq!(cfg, GameConfig::default());
    }

    proptest! {
        #[test]
        fn success_rates_in_unit_interval_validate(base in 0.0f64..=1.0, extra in 0.0f64..=1.0) {
            let max = (base + extra).min(1.0);
            let cfg = EconomyConfig { base_success_rate: base, max_success_rate: max, ..EconomyConfig::default() };
            prop_assert!(cfg.validate().is_ok());
        }

        #[test]
        fn rates_above_one_are_rejected(rate in 1.0001f64..10.0) {
            let cfg = EconomyConfig { max_success_rate: rate, ..EconomyConfig::default() };
            prop_assert_eq!(cfg.validate(), Err(ValidationError::RateOutOfRange("max_success_rate")));
        }
    }
}
