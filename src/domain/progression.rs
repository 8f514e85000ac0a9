//! Layer progression state for one line.
//!
//! The progression index walks the staking sequence. Where it starts, how it
//! advances and when it resets all come from the strategy's [`StakingConfig`];
//! this type only carries the live index.

use serde::{Deserialize, Serialize};

use super::position::SettlementOutcome;
use super::strategy::{AdvanceRule, StakingConfig};

/// Live progression cursor for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerProgression {
    entry_layer: usize,
    index: usize,
}

impl LayerProgression {
    /// Start at the strategy's configured first layer.
    pub fn new(entry_layer: usize) -> Self {
        Self {
            entry_layer,
            index: entry_layer,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Stake for the current layer. Indexes past the end of the sequence
    /// repeat the final stake. Negative stakes flip the bet direction; the
    /// caller reads the sign.
    pub fn current_stake(&self, staking: &StakingConfig) -> i64 {
        let i = self.index.min(staking.sequence.len() - 1);
        staking.sequence[i]
    }

    /// Move the cursor after a settlement. Skipped and Cancelled positions
    /// never touch the progression.
    pub fn apply(&mut self, outcome: SettlementOutcome, staking: &StakingConfig) {
        let won = match outcome {
            SettlementOutcome::Win => true,
            SettlementOutcome::Loss => false,
            SettlementOutcome::Skipped | SettlementOutcome::Cancelled => return,
        };

        let reset = (won && staking.reset_on_win) || (!won && staking.reset_on_loss);
        if reset {
            self.index = self.entry_layer;
            return;
        }

        let advance = match staking.advance_on {
            AdvanceRule::OnWin => won,
            AdvanceRule::OnLoss => !won,
        };
        if advance && self.index < staking.last_layer_index() {
            self.index += 1;
        }
    }

    pub fn reset(&mut self) {
        self.index = self.entry_layer;
    }

    /// Restore a snapshotted cursor position.
    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}
