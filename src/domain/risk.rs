//! Multi-scope risk coordination.
//!
//! Every settlement is folded into one tracker per scope (global day, table,
//! table+strategy, strategy across tables, multi-strategy group). Breach
//! rules come from each strategy's risk config; a scope fires at most once
//! per breach and its action decides between pausing the scope, halting the
//! whole engine or just raising an event.

use std::collections::HashMap;

use tracing::warn;

use super::strategy::{RiskAction, RiskConfig, RiskLevelConfig, RiskScope};

/// One fired risk level.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskEvent {
    pub scope: RiskScope,
    pub scope_key: String,
    pub action: RiskAction,
    pub pnl: f64,
    pub loss_streak: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Freeze {
    Open,
    Until(f64),
    Indefinite,
}

#[derive(Debug, Clone)]
struct ScopeTracker {
    pnl: f64,
    loss_streak: u32,
    breached: bool,
    freeze: Freeze,
}

impl Default for ScopeTracker {
    fn default() -> Self {
        Self {
            pnl: 0.0,
            loss_streak: 0,
            breached: false,
            freeze: Freeze::Open,
        }
    }
}

fn scope_key(scope: RiskScope, table_id: &str, strategy_key: &str, group: &str) -> String {
    match scope {
        RiskScope::GlobalDay => "global_day".to_string(),
        RiskScope::Table => format!("table:{}", table_id),
        RiskScope::TableStrategy => format!("table_strategy:{}:{}", table_id, strategy_key),
        RiskScope::AllTablesStrategy => format!("all_tables_strategy:{}", strategy_key),
        RiskScope::MultiStrategy => format!("multi_strategy:{}", group),
    }
}

const ALL_SCOPES: [RiskScope; 5] = [
    RiskScope::GlobalDay,
    RiskScope::Table,
    RiskScope::TableStrategy,
    RiskScope::AllTablesStrategy,
    RiskScope::MultiStrategy,
];

/// Engine-wide risk state.
#[derive(Debug, Clone, Default)]
pub struct RiskCoordinator {
    trackers: HashMap<String, ScopeTracker>,
    halted: bool,
}

impl RiskCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a StopAll level has fired.
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Fold one settlement into every scope the line belongs to, then check
    /// the strategy's risk levels most-global first. At most one level fires
    /// per evaluation. Only pnl-moving results should be recorded; pushes and
    /// cancellations stay out.
    pub fn record(
        &mut self,
        table_id: &str,
        strategy_key: &str,
        group: &str,
        pnl: f64,
        won: bool,
        risk: &RiskConfig,
        now: f64,
    ) -> Option<RiskEvent> {
        for scope in ALL_SCOPES {
            let key = scope_key(scope, table_id, strategy_key, group);
            let tracker = self.trackers.entry(key).or_default();
            tracker.pnl += pnl;
            if won {
                tracker.loss_streak = 0;
            } else {
                tracker.loss_streak += 1;
            }
        }

        for level in risk.sorted_levels() {
            let key = scope_key(level.scope, table_id, strategy_key, group);
            let tracker = match self.trackers.get_mut(&key) {
                Some(t) => t,
                None => continue,
            };
            if tracker.breached || !breaches(level, tracker.pnl, tracker.loss_streak) {
                continue;
            }
            tracker.breached = true;
            let pnl = tracker.pnl;
            let loss_streak = tracker.loss_streak;
            warn!(
                scope_key = %key,
                pnl,
                loss_streak,
                action = ?level.action,
                "Risk level breached"
            );
            match level.action {
                RiskAction::Pause => {
                    tracker.freeze = match level.cooldown_sec {
                        Some(cooldown) => Freeze::Until(now + cooldown),
                        None => Freeze::Indefinite,
                    };
                }
                RiskAction::StopAll => self.halted = true,
                RiskAction::Notify => {}
            }
            return Some(RiskEvent {
                scope: level.scope,
                scope_key: key,
                action: level.action,
                pnl,
                loss_streak,
            });
        }
        None
    }

    /// Whether any scope covering this line is frozen. Expired freezes are
    /// lifted here rather than on a timer.
    pub fn is_blocked(&mut self, table_id: &str, strategy_key: &str, group: &str, now: f64) -> bool {
        if self.halted {
            return true;
        }
        for scope in ALL_SCOPES {
            let key = scope_key(scope, table_id, strategy_key, group);
            if let Some(tracker) = self.trackers.get_mut(&key) {
                match tracker.freeze {
                    Freeze::Open => {}
                    Freeze::Indefinite => return true,
                    Freeze::Until(until) => {
                        if now < until {
                            return true;
                        }
                        tracker.freeze = Freeze::Open;
                        tracker.breached = false;
                    }
                }
            }
        }
        false
    }

    /// Accumulated pnl for one scope, if any settlements touched it.
    pub fn scope_pnl(&self, scope: RiskScope, table_id: &str, strategy_key: &str, group: &str) -> Option<f64> {
        self.trackers
            .get(&scope_key(scope, table_id, strategy_key, group))
            .map(|t| t.pnl)
    }

    /// Clear the day-level tracker at a session boundary.
    pub fn reset_day(&mut self) {
        self.trackers.remove("global_day");
    }
}

fn breaches(level: &RiskLevelConfig, pnl: f64, loss_streak: u32) -> bool {
    if let Some(stop) = level.stop_loss {
        if pnl <= stop {
            return true;
        }
    }
    if let Some(target) = level.take_profit {
        if pnl >= target {
            return true;
        }
    }
    if let Some(max_losses) = level.max_drawdown_losses {
        if loss_streak >= max_losses {
            return true;
        }
    }
    false
}
