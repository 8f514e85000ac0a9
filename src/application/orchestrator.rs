//! Line orchestrator: the engine's only external surface.
//!
//! Observations come in through `handle_result` and `update_table_phase`;
//! decisions go out as [`BetDecision`]s and everything else leaves through
//! the drained event queue. All state lives behind this type.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::domain::line::{LineSnapshot, LineState};
use crate::domain::signal::HistoryEntry;
use crate::domain::strategy::{RiskAction, RiskScope, StackPolicy, StrategyDefinition};
use crate::domain::{
    BetDirection, CapitalLedger, CrossTableMode, EngineEvent, EventLevel, EventQueue, Outcome,
    PayoutTable, PendingPosition, PositionManager, PositionStats, RiskCoordinator, RiskEvent,
    SettlementOutcome, SignalTracker, TablePhase,
};

use super::registry::{RegistryError, StrategyRegistry};

/// One bet the actuator should place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetDecision {
    pub table_id: String,
    pub round_id: String,
    pub strategy_key: String,
    pub direction: BetDirection,
    pub amount: f64,
    pub layer_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalSnapshot {
    pub bankroll_total: f64,
    pub bankroll_free: f64,
}

/// Everything needed to resume a session on an identically configured engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub capital: CapitalSnapshot,
    pub lines: BTreeMap<String, BTreeMap<String, LineSnapshot>>,
    pub positions: Vec<PendingPosition>,
    pub histories: BTreeMap<String, BTreeMap<String, Vec<HistoryEntry>>>,
}

/// Shared-progression lines live under this pseudo table key.
const SHARED_TABLE: &str = "*";

pub struct LineOrchestrator {
    config: EngineConfig,
    payouts: PayoutTable,
    registry: StrategyRegistry,
    trackers: HashMap<String, SignalTracker>,
    lines: HashMap<(String, String), LineState>,
    positions: PositionManager,
    ledger: CapitalLedger,
    risk: RiskCoordinator,
    phases: HashMap<String, TablePhase>,
    events: EventQueue,
}

impl LineOrchestrator {
    pub fn new(config: EngineConfig, payouts: PayoutTable) -> Self {
        let ledger = CapitalLedger::new(config.capital.bankroll, config.capital.min_unit);
        Self {
            config,
            payouts,
            registry: StrategyRegistry::new(),
            trackers: HashMap::new(),
            lines: HashMap::new(),
            positions: PositionManager::new(),
            ledger,
            risk: RiskCoordinator::new(),
            phases: HashMap::new(),
            events: EventQueue::new(),
        }
    }

    pub fn register_strategy(&mut self, def: StrategyDefinition) -> Result<(), RegistryError> {
        let key = def.strategy_key.clone();
        let tracker = SignalTracker::new(def.entry.clone());
        self.registry.register(def)?;
        self.trackers.insert(key, tracker);
        Ok(())
    }

    /// Attach a registered strategy to a table, creating its line on first
    /// attachment. Lines persist for the whole session.
    pub fn attach(&mut self, table_id: &str, strategy_key: &str) -> Result<(), RegistryError> {
        self.registry.attach(table_id, strategy_key)?;
        let def = self
            .registry
            .get(strategy_key)
            .ok_or_else(|| RegistryError::UnknownStrategy(strategy_key.to_string()))?;
        let entry_layer = def.entry.first_trigger_layer;
        let key = Self::line_key(table_id, def);
        self.lines
            .entry(key)
            .or_insert_with(|| LineState::new(entry_layer));
        Ok(())
    }

    pub fn detach(&mut self, table_id: &str, strategy_key: &str) -> Result<(), RegistryError> {
        self.registry.detach(table_id, strategy_key)
    }

    fn line_key(table_id: &str, def: &StrategyDefinition) -> (String, String) {
        let table = match def.cross_table.mode {
            CrossTableMode::Accumulate => SHARED_TABLE,
            CrossTableMode::Reset => table_id,
        };
        (table.to_string(), def.strategy_key.clone())
    }

    /// Feed one resolved round. Open positions on the round are settled;
    /// rounds the engine bet on are kept out of pattern history.
    pub fn handle_result(
        &mut self,
        table_id: &str,
        round_id: &str,
        winner: Option<Outcome>,
        ts: f64,
    ) {
        let results = self
            .positions
            .settle_all_for_round(table_id, round_id, winner, &self.payouts);
        let participated = !results.is_empty();

        for result in results {
            let strategy_key = result.position.strategy_key.clone();
            self.ledger.release(result.position.reservation, result.pnl);

            let def = match self.registry.get(&strategy_key) {
                Some(d) => d.clone(),
                None => continue,
            };
            let key = Self::line_key(table_id, &def);
            if let Some(line) = self.lines.get_mut(&key) {
                line.apply_settlement(result.outcome, result.pnl, &def.staking);
            }

            let level = match result.outcome {
                SettlementOutcome::Win => EventLevel::Success,
                SettlementOutcome::Loss => EventLevel::Info,
                SettlementOutcome::Skipped | SettlementOutcome::Cancelled => EventLevel::Info,
            };
            self.events.push(
                EngineEvent::new(
                    level,
                    format!("Settled {:?} for {:.2}", result.outcome, result.pnl),
                )
                .with("table", table_id)
                .with("round", round_id)
                .with("strategy", &strategy_key),
            );
            info!(
                table = table_id,
                round = round_id,
                strategy = %strategy_key,
                outcome = ?result.outcome,
                pnl = result.pnl,
                "Position settled"
            );

            match result.outcome {
                SettlementOutcome::Win | SettlementOutcome::Loss => {
                    let won = result.outcome == SettlementOutcome::Win;
                    let breach = self.risk.record(
                        table_id,
                        &strategy_key,
                        def.risk_group(),
                        result.pnl,
                        won,
                        &def.risk,
                        ts,
                    );
                    if let Some(event) = breach {
                        self.apply_risk_breach(table_id, &def, &event, ts);
                    }
                }
                SettlementOutcome::Skipped | SettlementOutcome::Cancelled => {}
            }
        }

        // A round the engine bet on must not retrigger its own setup.
        if !participated {
            if let Some(outcome) = winner {
                for tracker in self.trackers.values_mut() {
                    tracker.record(table_id, round_id, outcome, ts);
                }
                debug!(table = table_id, round = round_id, outcome = %outcome, "Observed round");
            }
        }

        self.phases.insert(table_id.to_string(), TablePhase::Idle);
    }

    fn apply_risk_breach(
        &mut self,
        table_id: &str,
        def: &StrategyDefinition,
        event: &RiskEvent,
        ts: f64,
    ) {
        self.events.push(
            EngineEvent::new(
                EventLevel::Risk,
                format!("Risk breach in {} ({:?})", event.scope_key, event.action),
            )
            .with("scope", &event.scope_key)
            .with("pnl", format!("{:.2}", event.pnl))
            .with("loss_streak", event.loss_streak),
        );

        if event.action != RiskAction::Pause {
            return;
        }
        let level = def
            .risk
            .levels
            .iter()
            .find(|l| l.scope == event.scope && l.action == RiskAction::Pause);
        let until = level.and_then(|l| l.cooldown_sec).map(|c| ts + c);

        // Mirror the pause onto the affected lines so snapshots carry it.
        let strategy_key = def.strategy_key.clone();
        let group = def.risk_group().to_string();
        let group_members: Vec<String> = self
            .registry
            .all()
            .filter(|d| d.risk_group() == group)
            .map(|d| d.strategy_key.clone())
            .collect();
        for ((line_table, line_strategy), line) in self.lines.iter_mut() {
            let affected = match event.scope {
                RiskScope::GlobalDay => true,
                RiskScope::Table => line_table == table_id,
                RiskScope::TableStrategy => {
                    line_table == table_id && *line_strategy == strategy_key
                }
                RiskScope::AllTablesStrategy => *line_strategy == strategy_key,
                RiskScope::MultiStrategy => group_members.contains(line_strategy),
            };
            if affected {
                line.freeze(until);
            }
        }
    }

    /// Drive one table's phase machine. A transition to Bettable evaluates
    /// every attached line; nothing else produces decisions.
    pub fn update_table_phase(
        &mut self,
        table_id: &str,
        round_id: &str,
        phase: TablePhase,
        ts: f64,
    ) -> Vec<BetDecision> {
        self.phases.insert(table_id.to_string(), phase);
        if phase != TablePhase::Bettable {
            return Vec::new();
        }

        let defs: Vec<StrategyDefinition> = self
            .registry
            .strategies_for_table(table_id)
            .into_iter()
            .cloned()
            .collect();

        let mut decisions = Vec::new();
        for def in defs {
            if let Some(decision) = self.evaluate_line(table_id, round_id, &def, ts) {
                decisions.push(decision);
            }
        }
        decisions
    }

    /// One line's entry evaluation. Every early return skips only this line.
    fn evaluate_line(
        &mut self,
        table_id: &str,
        round_id: &str,
        def: &StrategyDefinition,
        ts: f64,
    ) -> Option<BetDecision> {
        let strategy_key = &def.strategy_key;
        if self
            .risk
            .is_blocked(table_id, strategy_key, def.risk_group(), ts)
        {
            debug!(table = table_id, strategy = %strategy_key, "Line blocked by risk scope");
            return None;
        }

        let key = Self::line_key(table_id, def);
        let entry_layer = def.entry.first_trigger_layer;
        let line = self
            .lines
            .entry(key.clone())
            .or_insert_with(|| LineState::new(entry_layer));
        if line.is_frozen(ts) {
            debug!(table = table_id, strategy = %strategy_key, "Line frozen");
            return None;
        }
        let filter_ctx_line = line.filter_context(None);

        let tracker = self.trackers.get_mut(strategy_key)?;
        let last_winner = tracker.recent(table_id, 1).last().map(|e| e.outcome);
        if let Some(filter) = &def.entry.filter {
            let mut ctx = filter_ctx_line;
            ctx.last_winner = last_winner;
            if !filter.matches(&ctx) {
                return None;
            }
        }

        if !tracker.should_trigger(table_id, round_id, ts) {
            return None;
        }

        if self.positions.has_open_for_line(table_id, strategy_key)
            && def.staking.stack_policy == StackPolicy::None
        {
            self.events.push(
                EngineEvent::new(EventLevel::Conflict, "Signal fired on a busy line")
                    .with("table", table_id)
                    .with("strategy", strategy_key)
                    .with("round", round_id),
            );
            return None;
        }
        if self.positions.has(table_id, strategy_key, round_id) {
            return None;
        }

        let line = self.lines.get(&key)?;
        let raw = line.current_stake(&def.staking);
        let layer_index = line.layer_index();
        let direction = if raw < 0 {
            def.entry.base_direction().opposite()
        } else {
            def.entry.base_direction()
        };
        let mut amount = raw.unsigned_abs() as f64;
        if let Some(cap) = def.staking.per_hand_cap {
            amount = amount.min(cap);
        }

        // Caps follow the live bankroll, so exposure shrinks with it.
        let total = self.ledger.total();
        if amount > total * self.config.capital.per_hand_risk_pct {
            self.skip(table_id, strategy_key, round_id, "Stake exceeds per-hand limit");
            return None;
        }
        let table_exposure: f64 = self
            .positions
            .open_positions()
            .filter(|p| p.table_id == table_id)
            .map(|p| p.amount)
            .sum();
        if table_exposure + amount > total * self.config.capital.per_table_risk_pct {
            self.skip(table_id, strategy_key, round_id, "Stake exceeds per-table limit");
            return None;
        }
        let table_is_new = !self
            .positions
            .open_positions()
            .any(|p| p.table_id == table_id);
        if table_is_new && self.positions.open_table_count() >= self.config.capital.max_concurrent_tables
        {
            self.skip(table_id, strategy_key, round_id, "Concurrent table limit reached");
            return None;
        }

        let reservation = match self.ledger.reserve(amount) {
            Ok(id) => id,
            Err(err) => {
                self.skip(table_id, strategy_key, round_id, &err.to_string());
                return None;
            }
        };

        let position = PendingPosition {
            table_id: table_id.to_string(),
            strategy_key: strategy_key.clone(),
            round_id: round_id.to_string(),
            direction,
            amount,
            layer_index,
            reservation,
            created_ts: ts,
        };
        if let Err(err) = self.positions.create(position) {
            self.ledger.release(reservation, 0.0);
            self.events.push(
                EngineEvent::new(EventLevel::Error, err.to_string())
                    .with("table", table_id)
                    .with("strategy", strategy_key),
            );
            return None;
        }

        info!(
            table = table_id,
            round = round_id,
            strategy = %strategy_key,
            direction = %direction,
            amount,
            layer = layer_index,
            "Bet decision"
        );
        self.events.push(
            EngineEvent::new(EventLevel::Info, format!("Bet {:.2} on {}", amount, direction))
                .with("table", table_id)
                .with("strategy", strategy_key)
                .with("round", round_id)
                .with("layer", layer_index),
        );
        Some(BetDecision {
            table_id: table_id.to_string(),
            round_id: round_id.to_string(),
            strategy_key: strategy_key.clone(),
            direction,
            amount,
            layer_index,
        })
    }

    fn skip(&mut self, table_id: &str, strategy_key: &str, round_id: &str, reason: &str) {
        debug!(table = table_id, strategy = strategy_key, reason, "Line skipped");
        self.events.push(
            EngineEvent::new(EventLevel::Warning, reason)
                .with("table", table_id)
                .with("strategy", strategy_key)
                .with("round", round_id),
        );
    }

    /// Drain the bounded event queue. The only outward channel besides
    /// decisions.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let mut lines: BTreeMap<String, BTreeMap<String, LineSnapshot>> = BTreeMap::new();
        for ((table, strategy), line) in &self.lines {
            lines
                .entry(table.clone())
                .or_default()
                .insert(strategy.clone(), line.snapshot());
        }

        let mut positions: Vec<PendingPosition> =
            self.positions.open_positions().cloned().collect();
        positions.sort_by_key(|p| p.key());

        let mut histories: BTreeMap<String, BTreeMap<String, Vec<HistoryEntry>>> = BTreeMap::new();
        for (strategy, tracker) in &self.trackers {
            let tables: BTreeMap<String, Vec<HistoryEntry>> =
                tracker.histories().into_iter().collect();
            if !tables.is_empty() {
                histories.insert(strategy.clone(), tables);
            }
        }

        EngineSnapshot {
            capital: CapitalSnapshot {
                bankroll_total: self.ledger.total(),
                bankroll_free: self.ledger.free(),
            },
            lines,
            positions,
            histories,
        }
    }

    /// Rebuild session state from a snapshot. The engine must carry the same
    /// strategy registrations and attachments the snapshot was taken under.
    pub fn restore_state(&mut self, snapshot: &EngineSnapshot) {
        self.ledger
            .restore(snapshot.capital.bankroll_total, snapshot.capital.bankroll_free);

        self.lines.clear();
        for (table, strategies) in &snapshot.lines {
            for (strategy, snap) in strategies {
                let entry_layer = self
                    .registry
                    .get(strategy)
                    .map(|d| d.entry.first_trigger_layer)
                    .unwrap_or(0);
                self.lines.insert(
                    (table.clone(), strategy.clone()),
                    LineState::restore(entry_layer, snap),
                );
            }
        }

        self.positions = PositionManager::new();
        for position in &snapshot.positions {
            let mut position = position.clone();
            position.reservation = self.ledger.adopt_reservation(position.amount);
            if let Err(err) = self.positions.create(position) {
                self.events
                    .push(EngineEvent::new(EventLevel::Error, err.to_string()));
            }
        }

        for (strategy, tables) in &snapshot.histories {
            if let Some(tracker) = self.trackers.get_mut(strategy) {
                for (table, entries) in tables {
                    tracker.restore_history(table, entries.clone());
                }
            }
        }
        info!(
            lines = self.lines.len(),
            positions = self.positions.open_count(),
            "Restored engine state"
        );
    }

    pub fn bankroll_total(&self) -> f64 {
        self.ledger.total()
    }

    pub fn bankroll_free(&self) -> f64 {
        self.ledger.free()
    }

    pub fn halted(&self) -> bool {
        self.risk.halted()
    }

    pub fn stats(&self) -> PositionStats {
        self.positions.stats()
    }

    pub fn phase(&self, table_id: &str) -> Option<TablePhase> {
        self.phases.get(table_id).copied()
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }
}
