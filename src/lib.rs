//! autoline: a line strategy orchestration engine for pattern-based
//! baccarat betting automation.
//!
//! The engine is a pure decision core. An external detector feeds it round
//! results and table phases; it answers with bet decisions and a pollable
//! event stream. Screen capture, click actuation and UI all live outside.

pub mod application;
pub mod config;
pub mod domain;

pub use application::{BetDecision, EngineSnapshot, LineOrchestrator};
pub use config::EngineConfig;
pub use domain::{Outcome, PayoutTable, TablePhase};
