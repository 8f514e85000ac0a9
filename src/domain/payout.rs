//! Payout rules: side-dependent win multipliers.
//!
//! Defaults follow standard commission baccarat: banker pays 0.95, player
//! pays even money, tie pays 8 to 1. Rates can be overridden from a JSON
//! file at startup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::outcome::{BetDirection, Outcome};
use super::position::SettlementOutcome;

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("Failed to read payout rates from {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid payout rate file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Payout rate for {0} must be positive, got {1}")]
    NonPositiveRate(String, f64),
}

/// Win multipliers per bet side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutTable {
    pub banker: f64,
    pub player: f64,
    pub tie: f64,
}

impl Default for PayoutTable {
    fn default() -> Self {
        Self {
            banker: 0.95,
            player: 1.0,
            tie: 8.0,
        }
    }
}

impl PayoutTable {
    /// Load overrides from a JSON file. Absent fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, PayoutError> {
        let text = std::fs::read_to_string(path).map_err(|source| PayoutError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let table: PayoutTable =
            serde_json::from_str(&text).map_err(|source| PayoutError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), PayoutError> {
        for (name, rate) in [
            ("banker", self.banker),
            ("player", self.player),
            ("tie", self.tie),
        ] {
            if rate <= 0.0 {
                return Err(PayoutError::NonPositiveRate(name.to_string(), rate));
            }
        }
        Ok(())
    }

    pub fn rate(&self, direction: BetDirection) -> f64 {
        match direction {
            Outcome::Banker => self.banker,
            Outcome::Player => self.player,
            Outcome::Tie => self.tie,
        }
    }

    /// Realized pnl for a settled position. Wins pay stake times the side's
    /// rate, losses forfeit the stake, pushes and cancellations are flat.
    pub fn pnl(&self, amount: f64, outcome: SettlementOutcome, direction: BetDirection) -> f64 {
        match outcome {
            SettlementOutcome::Win => amount * self.rate(direction),
            SettlementOutcome::Loss => -amount,
            SettlementOutcome::Skipped | SettlementOutcome::Cancelled => 0.0,
        }
    }
}
