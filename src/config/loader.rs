//! Engine configuration: TOML settings plus a directory of strategy JSON
//! files, validated before anything is constructed from them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::payout::PayoutError;
use crate::domain::strategy::{StrategyConfigError, StrategyDefinition};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Duplicate strategy key {0:?} in {1}")]
    DuplicateStrategy(String, String),

    #[error(transparent)]
    Strategy(#[from] StrategyConfigError),

    #[error(transparent)]
    Payout(#[from] PayoutError),
}

/// Bankroll and exposure limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalConfig {
    pub bankroll: f64,

    /// Max fraction of the bankroll a single position may stake.
    #[serde(default = "default_per_hand_risk_pct")]
    pub per_hand_risk_pct: f64,

    /// Max fraction of the bankroll reserved across one table.
    #[serde(default = "default_per_table_risk_pct")]
    pub per_table_risk_pct: f64,

    /// Smallest stake the house accepts.
    #[serde(default = "default_min_unit")]
    pub min_unit: f64,

    /// Max distinct tables with open positions at once.
    #[serde(default = "default_max_concurrent_tables")]
    pub max_concurrent_tables: usize,
}

fn default_per_hand_risk_pct() -> f64 {
    0.05
}

fn default_per_table_risk_pct() -> f64 {
    0.20
}

fn default_min_unit() -> f64 {
    1.0
}

fn default_max_concurrent_tables() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Top-level engine settings, loaded from one TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub capital: CapitalConfig,

    /// Directory of strategy definition JSON files.
    pub strategy_dir: PathBuf,

    /// Optional JSON file overriding payout rates.
    #[serde(default)]
    pub payout_rates: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: EngineConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        info!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.capital;
        if c.bankroll <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "capital.bankroll must be positive, got {}",
                c.bankroll
            )));
        }
        for (name, pct) in [
            ("per_hand_risk_pct", c.per_hand_risk_pct),
            ("per_table_risk_pct", c.per_table_risk_pct),
        ] {
            if !(0.0..=1.0).contains(&pct) || pct == 0.0 {
                return Err(ConfigError::Validation(format!(
                    "capital.{} must be in (0, 1], got {}",
                    name, pct
                )));
            }
        }
        if c.min_unit <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "capital.min_unit must be positive, got {}",
                c.min_unit
            )));
        }
        if c.max_concurrent_tables == 0 {
            return Err(ConfigError::Validation(
                "capital.max_concurrent_tables must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Largest stake a single position may hold.
    pub fn per_hand_limit(&self) -> f64 {
        self.capital.bankroll * self.capital.per_hand_risk_pct
    }

    /// Largest combined reservation across one table.
    pub fn per_table_limit(&self) -> f64 {
        self.capital.bankroll * self.capital.per_table_risk_pct
    }
}

/// Load and validate every `*.json` strategy file in a directory, in
/// lexicographic order. Duplicate strategy keys are fatal.
pub fn load_strategies(dir: &Path) -> Result<Vec<StrategyDefinition>, ConfigError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|source| ConfigError::Read {
            path: dir.display().to_string(),
            source,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut seen: HashSet<String> = HashSet::new();
    let mut strategies = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut def: StrategyDefinition =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        // Pattern fields are derived, not serialized.
        def.entry.resolve();
        def.validate()?;
        if !seen.insert(def.strategy_key.clone()) {
            return Err(ConfigError::DuplicateStrategy(
                def.strategy_key,
                path.display().to_string(),
            ));
        }
        info!(strategy = %def.strategy_key, path = %path.display(), "Loaded strategy");
        strategies.push(def);
    }
    Ok(strategies)
}
