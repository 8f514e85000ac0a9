//! Per-line state: one (table, strategy) pairing.
//!
//! A line owns its progression cursor, realized pnl, streak counters and a
//! freeze flag mirrored from risk pauses. Streaks and pnl feed the entry
//! filter context.

use serde::{Deserialize, Serialize};

use super::filter::FilterContext;
use super::outcome::Outcome;
use super::position::SettlementOutcome;
use super::progression::LayerProgression;
use super::strategy::StakingConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct LineState {
    progression: LayerProgression,
    pnl: f64,
    win_streak: u32,
    loss_streak: u32,
    frozen: bool,
    frozen_until: Option<f64>,
}

/// Serialized view of a line for snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub layer_index: usize,
    pub pnl: f64,
    pub win_streak: u32,
    pub loss_streak: u32,
    pub frozen: bool,
}

impl LineState {
    pub fn new(entry_layer: usize) -> Self {
        Self {
            progression: LayerProgression::new(entry_layer),
            pnl: 0.0,
            win_streak: 0,
            loss_streak: 0,
            frozen: false,
            frozen_until: None,
        }
    }

    pub fn layer_index(&self) -> usize {
        self.progression.index()
    }

    pub fn pnl(&self) -> f64 {
        self.pnl
    }

    pub fn current_stake(&self, staking: &StakingConfig) -> i64 {
        self.progression.current_stake(staking)
    }

    /// Fold one settlement into the line. Pushes and cancellations leave the
    /// progression and streaks alone.
    pub fn apply_settlement(
        &mut self,
        outcome: SettlementOutcome,
        pnl: f64,
        staking: &StakingConfig,
    ) {
        self.pnl += pnl;
        match outcome {
            SettlementOutcome::Win => {
                self.win_streak += 1;
                self.loss_streak = 0;
            }
            SettlementOutcome::Loss => {
                self.loss_streak += 1;
                self.win_streak = 0;
            }
            SettlementOutcome::Skipped | SettlementOutcome::Cancelled => {}
        }
        self.progression.apply(outcome, staking);
    }

    pub fn filter_context(&self, last_winner: Option<Outcome>) -> FilterContext {
        FilterContext {
            last_winner,
            win_streak: self.win_streak,
            loss_streak: self.loss_streak,
            pnl: self.pnl,
        }
    }

    pub fn freeze(&mut self, until: Option<f64>) {
        self.frozen = true;
        self.frozen_until = until;
    }

    /// Frozen check with lazy expiry.
    pub fn is_frozen(&mut self, now: f64) -> bool {
        if !self.frozen {
            return false;
        }
        match self.frozen_until {
            Some(until) if now >= until => {
                self.frozen = false;
                self.frozen_until = None;
                false
            }
            _ => true,
        }
    }

    pub fn snapshot(&self) -> LineSnapshot {
        LineSnapshot {
            layer_index: self.progression.index(),
            pnl: self.pnl,
            win_streak: self.win_streak,
            loss_streak: self.loss_streak,
            frozen: self.frozen,
        }
    }

    pub fn restore(entry_layer: usize, snap: &LineSnapshot) -> Self {
        let mut progression = LayerProgression::new(entry_layer);
        progression.set_index(snap.layer_index);
        Self {
            progression,
            pnl: snap.pnl,
            win_streak: snap.win_streak,
            loss_streak: snap.loss_streak,
            frozen: snap.frozen,
            frozen_until: None,
        }
    }
}
