//! Core domain types: outcomes, signals, progressions, capital, risk and
//! position lifecycle. Everything here is synchronous and side-effect free
//! apart from tracing.

pub mod events;
pub mod filter;
pub mod ledger;
pub mod line;
pub mod outcome;
pub mod payout;
pub mod position;
pub mod progression;
pub mod risk;
pub mod signal;
pub mod strategy;

pub use events::{EngineEvent, EventLevel, EventQueue};
pub use filter::{EntryFilter, FilterContext, FilterParseError};
pub use ledger::{CapitalLedger, LedgerError, ReservationId};
pub use line::{LineSnapshot, LineState};
pub use outcome::{BetDirection, Outcome, OutcomeParseError, TablePhase};
pub use payout::{PayoutError, PayoutTable};
pub use position::{
    PendingPosition, PositionError, PositionManager, PositionStats, SettlementOutcome,
    SettlementResult,
};
pub use progression::LayerProgression;
pub use risk::{RiskCoordinator, RiskEvent};
pub use signal::{HistoryEntry, SignalTracker};
pub use strategy::{
    AdvanceRule, CrossTableConfig, CrossTableMode, DedupMode, EntryConfig, RiskAction,
    RiskConfig, RiskLevelConfig, RiskScope, StackPolicy, StakingConfig, StrategyConfigError,
    StrategyDefinition,
};
