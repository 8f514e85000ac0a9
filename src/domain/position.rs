//! Open position tracking and settlement.
//!
//! A [`PendingPosition`] is a placed bet waiting for its round to resolve.
//! The manager owns all open positions, classifies results against the
//! round's winner and keeps a bounded tail of settled records for reporting.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use thiserror::Error;

use super::ledger::ReservationId;
use super::outcome::{BetDirection, Outcome};
use super::payout::PayoutTable;

const SETTLED_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PositionError {
    #[error("Position already exists for table {table:?} round {round:?} strategy {strategy:?}")]
    AlreadyExists {
        table: String,
        round: String,
        strategy: String,
    },
}

/// How a position resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Win,
    Loss,
    /// Tie landed while the bet was on a side; stake is returned.
    Skipped,
    /// Round voided before resolution; stake is returned.
    Cancelled,
}

/// A placed bet awaiting resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPosition {
    pub table_id: String,
    pub strategy_key: String,
    pub round_id: String,
    pub direction: BetDirection,
    pub amount: f64,
    pub layer_index: usize,
    #[serde(skip, default = "unlinked_reservation")]
    pub reservation: ReservationId,
    pub created_ts: f64,
}

fn unlinked_reservation() -> ReservationId {
    // Snapshots re-link reservations on restore.
    ReservationId::dangling()
}

impl PendingPosition {
    pub fn key(&self) -> String {
        position_key(&self.table_id, &self.strategy_key, &self.round_id)
    }
}

// Reservation handles are process-local and stay out of equality, so
// snapshots compare identical across serialization and restore.
impl PartialEq for PendingPosition {
    fn eq(&self, other: &Self) -> bool {
        self.table_id == other.table_id
            && self.strategy_key == other.strategy_key
            && self.round_id == other.round_id
            && self.direction == other.direction
            && self.amount == other.amount
            && self.layer_index == other.layer_index
            && self.created_ts == other.created_ts
    }
}

pub fn position_key(table_id: &str, strategy_key: &str, round_id: &str) -> String {
    format!("{}\x1f{}\x1f{}", table_id, strategy_key, round_id)
}

/// One resolved position with its classification and realized pnl.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementResult {
    pub position: PendingPosition,
    pub outcome: SettlementOutcome,
    pub pnl: f64,
}

/// Classify a bet against a round result. A missing winner voids the bet;
/// a tie against a side bet is a push.
pub fn classify(direction: BetDirection, winner: Option<Outcome>) -> SettlementOutcome {
    match winner {
        None => SettlementOutcome::Cancelled,
        Some(Outcome::Tie) if direction != Outcome::Tie => SettlementOutcome::Skipped,
        Some(w) if w == direction => SettlementOutcome::Win,
        Some(_) => SettlementOutcome::Loss,
    }
}

/// Aggregate counters over settled positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionStats {
    pub wins: u64,
    pub losses: u64,
    pub skipped: u64,
    pub cancelled: u64,
    pub total_pnl: f64,
}

impl PositionStats {
    fn record(&mut self, outcome: SettlementOutcome, pnl: f64) {
        match outcome {
            SettlementOutcome::Win => self.wins += 1,
            SettlementOutcome::Loss => self.losses += 1,
            SettlementOutcome::Skipped => self.skipped += 1,
            SettlementOutcome::Cancelled => self.cancelled += 1,
        }
        self.total_pnl += pnl;
    }
}

/// Owner of all open positions.
#[derive(Debug, Clone, Default)]
pub struct PositionManager {
    open: HashMap<String, PendingPosition>,
    settled: VecDeque<SettlementResult>,
    stats: PositionStats,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a placed bet. One position per (table, round, strategy);
    /// a duplicate is a caller logic error.
    pub fn create(&mut self, position: PendingPosition) -> Result<(), PositionError> {
        let key = position.key();
        if self.open.contains_key(&key) {
            return Err(PositionError::AlreadyExists {
                table: position.table_id,
                round: position.round_id,
                strategy: position.strategy_key,
            });
        }
        self.open.insert(key, position);
        Ok(())
    }

    pub fn get(&self, table_id: &str, strategy_key: &str, round_id: &str) -> Option<&PendingPosition> {
        self.open.get(&position_key(table_id, strategy_key, round_id))
    }

    pub fn has(&self, table_id: &str, strategy_key: &str, round_id: &str) -> bool {
        self.open.contains_key(&position_key(table_id, strategy_key, round_id))
    }

    /// Any open position for this line, regardless of round.
    pub fn has_open_for_line(&self, table_id: &str, strategy_key: &str) -> bool {
        self.open
            .values()
            .any(|p| p.table_id == table_id && p.strategy_key == strategy_key)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &PendingPosition> {
        self.open.values()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Tables with at least one open position.
    pub fn open_table_count(&self) -> usize {
        let mut tables: Vec<&str> = self.open.values().map(|p| p.table_id.as_str()).collect();
        tables.sort_unstable();
        tables.dedup();
        tables.len()
    }

    /// Settle one position. Missing keys settle nothing; the round may have
    /// been observed without participation.
    pub fn settle(
        &mut self,
        table_id: &str,
        strategy_key: &str,
        round_id: &str,
        winner: Option<Outcome>,
        payouts: &PayoutTable,
    ) -> Option<SettlementResult> {
        let position = self
            .open
            .remove(&position_key(table_id, strategy_key, round_id))?;
        let outcome = classify(position.direction, winner);
        let pnl = payouts.pnl(position.amount, outcome, position.direction);
        let result = SettlementResult {
            position,
            outcome,
            pnl,
        };
        self.stats.record(outcome, pnl);
        self.settled.push_back(result.clone());
        while self.settled.len() > SETTLED_HISTORY_LIMIT {
            self.settled.pop_front();
        }
        Some(result)
    }

    /// Settle every open position riding on one round of one table.
    pub fn settle_all_for_round(
        &mut self,
        table_id: &str,
        round_id: &str,
        winner: Option<Outcome>,
        payouts: &PayoutTable,
    ) -> Vec<SettlementResult> {
        let keys: Vec<String> = self
            .open
            .values()
            .filter(|p| p.table_id == table_id && p.round_id == round_id)
            .map(|p| p.strategy_key.clone())
            .collect();
        keys.iter()
            .filter_map(|strategy| self.settle(table_id, strategy, round_id, winner, payouts))
            .collect()
    }

    /// Drop an open position without settling it.
    pub fn remove(
        &mut self,
        table_id: &str,
        strategy_key: &str,
        round_id: &str,
    ) -> Option<PendingPosition> {
        self.open.remove(&position_key(table_id, strategy_key, round_id))
    }

    pub fn stats(&self) -> PositionStats {
        self.stats
    }

    pub fn settled_tail(&self) -> impl Iterator<Item = &SettlementResult> {
        self.settled.iter()
    }
}
