//! Daemon configuration
//!
//! Policy values (rarity XP table, tier thresholds, accuracy ceiling, level
//! curve) live here rather than as inline constants so deployments can tune
//! them without touching the award path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::model::{Rarity, Tier};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Data directory holding the SQLite database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Reward-pipeline policy values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum allowed GPS radius-of-uncertainty in meters; fixes reported
    /// with worse accuracy are rejected before any distance check
    #[serde(default = "default_max_accuracy")]
    pub max_accuracy_m: f64,

    /// XP credited per reward, by rarity
    #[serde(default)]
    pub rarity_xp: RarityXpTable,

    /// Category completion percentage required per tier
    #[serde(default)]
    pub tier_thresholds: TierThresholds,

    /// XP per level step; level = 1 + total_xp / level_base_xp
    #[serde(default = "default_level_base_xp")]
    pub level_base_xp: i64,

    /// EP credited per recorded correct completion
    #[serde(default = "default_ep_per_completion")]
    pub ep_per_completion: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RarityXpTable {
    #[serde(default = "default_xp_common")]
    pub common: i64,
    #[serde(default = "default_xp_rare")]
    pub rare: i64,
    #[serde(default = "default_xp_epic")]
    pub epic: i64,
    #[serde(default = "default_xp_legendary")]
    pub legendary: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "default_bronze_pct")]
    pub bronze_pct: f64,
    #[serde(default = "default_silver_pct")]
    pub silver_pct: f64,
    #[serde(default = "default_gold_pct")]
    pub gold_pct: f64,
}

fn default_http_port() -> u16 {
    8084
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./waymark-data")
}
fn default_max_accuracy() -> f64 {
    150.0
}
fn default_level_base_xp() -> i64 {
    100
}
fn default_ep_per_completion() -> i64 {
    10
}
fn default_xp_common() -> i64 {
    25
}
fn default_xp_rare() -> i64 {
    50
}
fn default_xp_epic() -> i64 {
    100
}
fn default_xp_legendary() -> i64 {
    200
}
fn default_bronze_pct() -> f64 {
    33.0
}
fn default_silver_pct() -> f64 {
    66.0
}
fn default_gold_pct() -> f64 {
    100.0
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: default_max_accuracy(),
            rarity_xp: RarityXpTable::default(),
            tier_thresholds: TierThresholds::default(),
            level_base_xp: default_level_base_xp(),
            ep_per_completion: default_ep_per_completion(),
        }
    }
}

impl Default for RarityXpTable {
    fn default() -> Self {
        Self {
            common: default_xp_common(),
            rare: default_xp_rare(),
            epic: default_xp_epic(),
            legendary: default_xp_legendary(),
        }
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            bronze_pct: default_bronze_pct(),
            silver_pct: default_silver_pct(),
            gold_pct: default_gold_pct(),
        }
    }
}

impl RarityXpTable {
    pub fn xp_for(&self, rarity: Rarity) -> i64 {
        match rarity {
            Rarity::Common => self.common,
            Rarity::Rare => self.rare,
            Rarity::Epic => self.epic,
            Rarity::Legendary => self.legendary,
        }
    }
}

impl TierThresholds {
    pub fn threshold_for(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Bronze => self.bronze_pct,
            Tier::Silver => self.silver_pct,
            Tier::Gold => self.gold_pct,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("Failed to read config: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CoreError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("Failed to encode config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| CoreError::Config(format!("Failed to write config: {}", e)))
    }

    /// Validate policy invariants once at startup
    pub fn validate(&self) -> Result<(), CoreError> {
        let t = &self.policy.tier_thresholds;
        if !(t.bronze_pct < t.silver_pct && t.silver_pct < t.gold_pct) {
            return Err(CoreError::Config(format!(
                "Tier thresholds must be strictly increasing: bronze {} < silver {} < gold {}",
                t.bronze_pct, t.silver_pct, t.gold_pct
            )));
        }
        if t.gold_pct > 100.0 || t.bronze_pct <= 0.0 {
            return Err(CoreError::Config(
                "Tier thresholds must lie within (0, 100]".to_string(),
            ));
        }
        if self.policy.max_accuracy_m <= 0.0 {
            return Err(CoreError::Config(
                "max_accuracy_m must be positive".to_string(),
            ));
        }
        if self.policy.level_base_xp <= 0 {
            return Err(CoreError::Config(
                "level_base_xp must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.policy.rarity_xp.xp_for(Rarity::Legendary), 200);
        assert_eq!(
            config.policy.tier_thresholds.threshold_for(Tier::Gold),
            100.0
        );
    }

    #[test]
    fn test_non_monotonic_thresholds_rejected() {
        let mut config = Config::default();
        config.policy.tier_thresholds.silver_pct = 20.0;
        assert!(config.validate().is_err());
    }
}
