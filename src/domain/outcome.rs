//! Round outcomes, bet directions and table phases.
//!
//! These enums are parsed once at the engine boundary (config load or
//! observation ingestion) and stay strongly typed everywhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OutcomeParseError {
    #[error("Unrecognized outcome code: {0:?}")]
    UnknownCode(String),
}

/// Resolved winner of a round: Banker, Player or Tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Banker,
    Player,
    Tie,
}

impl Outcome {
    /// Parse from a detector code. Accepts single letters or full words,
    /// case-insensitive ("B", "banker", "Player", "t", ...).
    pub fn parse(code: &str) -> Result<Self, OutcomeParseError> {
        match code.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('B') => Ok(Outcome::Banker),
            Some('P') => Ok(Outcome::Player),
            Some('T') => Ok(Outcome::Tie),
            _ => Err(OutcomeParseError::UnknownCode(code.to_string())),
        }
    }

    /// One-letter wire code.
    pub fn code(&self) -> char {
        match self {
            Outcome::Banker => 'B',
            Outcome::Player => 'P',
            Outcome::Tie => 'T',
        }
    }

    /// The opposing side for reverse betting. Tie has no opposite.
    pub fn opposite(&self) -> Outcome {
        match self {
            Outcome::Banker => Outcome::Player,
            Outcome::Player => Outcome::Banker,
            Outcome::Tie => Outcome::Tie,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Side a bet is placed on. Same domain as [`Outcome`]; aliased for clarity
/// at decision boundaries.
pub type BetDirection = Outcome;

/// Per-table betting-window state machine: Idle -> Bettable -> Locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TablePhase {
    Idle,
    Bettable,
    Locked,
}

impl fmt::Display for TablePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TablePhase::Idle => "idle",
            TablePhase::Bettable => "bettable",
            TablePhase::Locked => "locked",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_letters() {
        assert_eq!(Outcome::parse("B").unwrap(), Outcome::Banker);
        assert_eq!(Outcome::parse("p").unwrap(), Outcome::Player);
        assert_eq!(Outcome::parse("T").unwrap(), Outcome::Tie);
    }

    #[test]
    fn test_parse_full_words() {
        assert_eq!(Outcome::parse("Banker").unwrap(), Outcome::Banker);
        assert_eq!(Outcome::parse("player").unwrap(), Outcome::Player);
        assert_eq!(Outcome::parse("  tie ").unwrap(), Outcome::Tie);
    }

    #[test]
    fn test_parse_unknown() {
        assert!(matches!(
            Outcome::parse("X"),
            Err(OutcomeParseError::UnknownCode(_))
        ));
        assert!(Outcome::parse("").is_err());
    }

    #[test]
    fn test_opposite() {
        assert_eq!(Outcome::Banker.opposite(), Outcome::Player);
        assert_eq!(Outcome::Player.opposite(), Outcome::Banker);
        assert_eq!(Outcome::Tie.opposite(), Outcome::Tie);
    }

    #[test]
    fn test_display_codes() {
        assert_eq!(Outcome::Banker.to_string(), "B");
        assert_eq!(TablePhase::Bettable.to_string(), "bettable");
    }
}
