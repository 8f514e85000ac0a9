//! Capital ledger: bankroll accounting with explicit reservations.
//!
//! Every open position holds a [`ReservationId`]. Funds move free -> reserved
//! on entry and reserved -> free (plus pnl) on settlement, so
//! `free + sum(reservations) == total` at all times.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient free funds: need {needed:.2}, have {free:.2}")]
    InsufficientFunds { needed: f64, free: f64 },

    #[error("Stake {amount:.2} is below the minimum unit {min_unit:.2}")]
    BelowMinUnit { amount: f64, min_unit: f64 },
}

/// Opaque handle to one reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(u64);

impl ReservationId {
    /// Placeholder for deserialized positions whose reservation is re-linked
    /// during restore.
    pub fn dangling() -> Self {
        ReservationId(u64::MAX)
    }
}

/// Bankroll with reservation tracking.
#[derive(Debug, Clone)]
pub struct CapitalLedger {
    total: f64,
    free: f64,
    min_unit: f64,
    next_id: u64,
    reservations: HashMap<ReservationId, f64>,
}

impl CapitalLedger {
    pub fn new(bankroll: f64, min_unit: f64) -> Self {
        Self {
            total: bankroll,
            free: bankroll,
            min_unit,
            next_id: 0,
            reservations: HashMap::new(),
        }
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn free(&self) -> f64 {
        self.free
    }

    pub fn reserved(&self) -> f64 {
        self.reservations.values().sum()
    }

    /// Set aside `amount` for a position about to open.
    pub fn reserve(&mut self, amount: f64) -> Result<ReservationId, LedgerError> {
        if amount < self.min_unit {
            return Err(LedgerError::BelowMinUnit {
                amount,
                min_unit: self.min_unit,
            });
        }
        if amount > self.free {
            return Err(LedgerError::InsufficientFunds {
                needed: amount,
                free: self.free,
            });
        }
        self.free -= amount;
        let id = ReservationId(self.next_id);
        self.next_id += 1;
        self.reservations.insert(id, amount);
        Ok(id)
    }

    /// Return a reservation to the free pool and apply the realized pnl.
    /// Unknown ids apply pnl only; the position's stake was never held here.
    pub fn release(&mut self, id: ReservationId, pnl: f64) {
        let reserved = self.reservations.remove(&id).unwrap_or(0.0);
        self.free += reserved + pnl;
        self.total += pnl;
    }

    /// Reset balances from a snapshot. Reservations must be re-adopted
    /// afterwards by the positions that own them.
    pub fn restore(&mut self, total: f64, free: f64) {
        self.total = total;
        self.free = free;
        self.reservations.clear();
    }

    /// Re-register a reservation during restore without touching `free`;
    /// the snapshot's `free` already excludes it.
    pub fn adopt_reservation(&mut self, amount: f64) -> ReservationId {
        let id = ReservationId(self.next_id);
        self.next_id += 1;
        self.reservations.insert(id, amount);
        id
    }
}
