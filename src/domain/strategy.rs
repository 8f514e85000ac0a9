//! Strategy definitions: entry patterns, staking progressions and risk levels.
//!
//! A [`StrategyDefinition`] is the validated, strongly typed form of one
//! strategy JSON file. Parsing of the human-readable entry pattern
//! (`"BB then bet P"`) happens once here; the rest of the engine only sees
//! the resolved sequence and direction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::filter::{EntryFilter, FilterParseError};
use super::outcome::{BetDirection, Outcome};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyConfigError {
    #[error("Strategy {0}: entry pattern resolves to an empty sequence")]
    EmptyPattern(String),

    #[error("Strategy {0}: staking sequence is empty")]
    EmptySequence(String),

    #[error("Strategy {0}: first_trigger_layer {1} is out of range for a {2}-layer sequence")]
    FirstLayerOutOfRange(String, usize, usize),

    #[error("Strategy {0}: max_layers must be at least 1")]
    ZeroMaxLayers(String),

    #[error("Strategy {0}: valid_window_sec must be non-negative, got {1}")]
    NegativeWindow(String, f64),

    #[error("Strategy {0}: per_hand_cap must be positive, got {1}")]
    NonPositiveCap(String, f64),

    #[error("Strategy entry filter: {0}")]
    Filter(#[from] FilterParseError),
}

/// How repeated pattern matches against overlapping history are suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    #[default]
    None,
    Overlap,
    Strict,
}

/// Which settlement result moves the progression forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceRule {
    #[default]
    OnLoss,
    OnWin,
}

/// What to do when a signal fires while the line already has an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackPolicy {
    #[default]
    None,
    Merge,
    Parallel,
}

/// Whether progression state is shared or isolated across tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossTableMode {
    Accumulate,
    #[default]
    Reset,
}

/// Scope a risk level aggregates over. Lower priority value wins conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskScope {
    GlobalDay,
    Table,
    TableStrategy,
    AllTablesStrategy,
    MultiStrategy,
}

impl RiskScope {
    pub fn priority(&self) -> u8 {
        match self {
            RiskScope::GlobalDay => 1,
            RiskScope::Table => 2,
            RiskScope::TableStrategy => 3,
            RiskScope::AllTablesStrategy => 4,
            RiskScope::MultiStrategy => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAction {
    #[default]
    Pause,
    StopAll,
    Notify,
}

/// Entry side of a strategy: the pattern to watch for and how to dedup it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Human-readable pattern, e.g. `"BB then bet P"`.
    pub pattern: String,

    /// Max age of the oldest matched outcome, in seconds. 0 disables the check.
    #[serde(default)]
    pub valid_window_sec: f64,

    #[serde(default)]
    pub dedup: DedupMode,

    /// Progression index a fresh line starts at.
    #[serde(default)]
    pub first_trigger_layer: usize,

    #[serde(default)]
    pub filter: Option<EntryFilter>,

    #[serde(skip)]
    pub(crate) sequence: Vec<Outcome>,

    #[serde(skip, default = "default_direction")]
    pub(crate) base_direction: BetDirection,
}

fn default_direction() -> BetDirection {
    Outcome::Player
}

impl EntryConfig {
    pub fn new(
        pattern: &str,
        valid_window_sec: f64,
        dedup: DedupMode,
        first_trigger_layer: usize,
        filter: Option<EntryFilter>,
    ) -> Self {
        let (sequence, base_direction) = Self::parse_pattern(pattern);
        Self {
            pattern: pattern.to_string(),
            valid_window_sec,
            dedup,
            first_trigger_layer,
            filter,
            sequence,
            base_direction,
        }
    }

    /// Resolve `"BB then bet P"` into a watched sequence and a bet side.
    /// Letters before `then` form the sequence; the letter after `bet` is the
    /// direction, defaulting to Player when absent.
    fn parse_pattern(pattern: &str) -> (Vec<Outcome>, BetDirection) {
        let lower = pattern.to_ascii_lowercase();
        let (seq_part, dir_part) = match lower.find("then") {
            Some(pos) => (&pattern[..pos], Some(&pattern[pos + 4..])),
            None => (pattern, None),
        };

        let sequence: Vec<Outcome> = seq_part
            .chars()
            .filter_map(|c| Outcome::parse(&c.to_string()).ok())
            .collect();

        let base_direction = dir_part
            .and_then(|rest| {
                let rest_lower = rest.to_ascii_lowercase();
                let after_bet = match rest_lower.find("bet") {
                    Some(pos) => &rest[pos + 3..],
                    None => rest,
                };
                after_bet
                    .chars()
                    .find(|c| c.is_ascii_alphabetic())
                    .and_then(|c| Outcome::parse(&c.to_string()).ok())
            })
            .unwrap_or(Outcome::Player);

        (sequence, base_direction)
    }

    /// Re-derive the skipped fields after deserialization.
    pub(crate) fn resolve(&mut self) {
        let (sequence, base_direction) = Self::parse_pattern(&self.pattern);
        self.sequence = sequence;
        self.base_direction = base_direction;
    }

    pub fn sequence(&self) -> &[Outcome] {
        &self.sequence
    }

    pub fn base_direction(&self) -> BetDirection {
        self.base_direction
    }
}

/// Staking side of a strategy: the unit progression and its advance rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Stake per layer. Negative values bet the opposite side.
    pub sequence: Vec<i64>,

    #[serde(default)]
    pub advance_on: AdvanceRule,

    #[serde(default)]
    pub reset_on_win: bool,

    #[serde(default)]
    pub reset_on_loss: bool,

    /// Hard cap on how deep the progression can go. None means full sequence.
    #[serde(default)]
    pub max_layers: Option<usize>,

    /// Max stake for any single position, after progression lookup.
    #[serde(default)]
    pub per_hand_cap: Option<f64>,

    #[serde(default)]
    pub stack_policy: StackPolicy,
}

impl StakingConfig {
    /// Highest reachable progression index.
    pub fn last_layer_index(&self) -> usize {
        let depth = match self.max_layers {
            Some(max) => max.min(self.sequence.len()),
            None => self.sequence.len(),
        };
        depth.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CrossTableConfig {
    #[serde(default)]
    pub mode: CrossTableMode,
}

/// One breach rule at one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLevelConfig {
    pub scope: RiskScope,

    #[serde(default)]
    pub take_profit: Option<f64>,

    #[serde(default)]
    pub stop_loss: Option<f64>,

    #[serde(default)]
    pub max_drawdown_losses: Option<u32>,

    #[serde(default)]
    pub action: RiskAction,

    /// Pause duration in seconds. None pauses indefinitely.
    #[serde(default)]
    pub cooldown_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub levels: Vec<RiskLevelConfig>,
}

impl RiskConfig {
    /// Levels ordered by scope priority, most global first.
    pub fn sorted_levels(&self) -> Vec<&RiskLevelConfig> {
        let mut levels: Vec<&RiskLevelConfig> = self.levels.iter().collect();
        levels.sort_by_key(|l| l.scope.priority());
        levels
    }
}

/// Fully validated strategy, ready for registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub strategy_key: String,
    pub entry: EntryConfig,
    pub staking: StakingConfig,

    #[serde(default, rename = "cross_table_layer")]
    pub cross_table: CrossTableConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StrategyDefinition {
    pub fn validate(&self) -> Result<(), StrategyConfigError> {
        let key = &self.strategy_key;
        if self.entry.sequence.is_empty() {
            return Err(StrategyConfigError::EmptyPattern(key.clone()));
        }
        if self.staking.sequence.is_empty() {
            return Err(StrategyConfigError::EmptySequence(key.clone()));
        }
        let depth = self.staking.last_layer_index() + 1;
        if self.entry.first_trigger_layer >= depth {
            return Err(StrategyConfigError::FirstLayerOutOfRange(
                key.clone(),
                self.entry.first_trigger_layer,
                depth,
            ));
        }
        if self.staking.max_layers == Some(0) {
            return Err(StrategyConfigError::ZeroMaxLayers(key.clone()));
        }
        if self.entry.valid_window_sec < 0.0 {
            return Err(StrategyConfigError::NegativeWindow(
                key.clone(),
                self.entry.valid_window_sec,
            ));
        }
        if let Some(cap) = self.staking.per_hand_cap {
            if cap <= 0.0 {
                return Err(StrategyConfigError::NonPositiveCap(key.clone(), cap));
            }
        }
        Ok(())
    }

    /// Group key for multi-strategy risk aggregation. Strategies sharing a
    /// `risk_group` metadata entry pool their pnl; otherwise each strategy is
    /// its own group.
    pub fn risk_group(&self) -> &str {
        self.metadata
            .get("risk_group")
            .map(|s| s.as_str())
            .unwrap_or(&self.strategy_key)
    }
}
