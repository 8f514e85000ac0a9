//! Entry filter predicates.
//!
//! A small closed grammar over line context fields, parsed once at config
//! load and evaluated by an explicit interpreter. Grammar:
//!
//! ```text
//! expr   := clause ("or" clause)*
//! clause := cmp ("and" cmp)*          # "and" binds tighter than "or"
//! cmp    := field op value
//! field  := last_winner | win_streak | loss_streak | pnl
//! op     := == | != | < | <= | > | >=   (last_winner: == and != only)
//! value  := B | P | T | <number>
//! ```
//!
//! There is deliberately no general-purpose expression evaluation here.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::outcome::Outcome;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterParseError {
    #[error("Empty filter expression")]
    Empty,

    #[error("Unknown field {0:?} (expected last_winner, win_streak, loss_streak or pnl)")]
    UnknownField(String),

    #[error("Unknown operator {0:?}")]
    UnknownOperator(String),

    #[error("Operator {0:?} is not valid for last_winner (use == or !=)")]
    InvalidWinnerOperator(String),

    #[error("Invalid value {0:?} for field {1}")]
    InvalidValue(String, String),

    #[error("Dangling {0:?} at end of expression")]
    DanglingToken(String),
}

/// Live line context a filter is evaluated against.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterContext {
    pub last_winner: Option<Outcome>,
    pub win_streak: u32,
    pub loss_streak: u32,
    pub pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NumericField {
    WinStreak,
    LossStreak,
    Pnl,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn parse(token: &str) -> Result<Self, FilterParseError> {
        match token {
            "==" => Ok(CmpOp::Eq),
            "!=" => Ok(CmpOp::Ne),
            "<" => Ok(CmpOp::Lt),
            "<=" => Ok(CmpOp::Le),
            ">" => Ok(CmpOp::Gt),
            ">=" => Ok(CmpOp::Ge),
            other => Err(FilterParseError::UnknownOperator(other.to_string())),
        }
    }

    fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Numeric(NumericField, CmpOp, f64),
    Winner { negated: bool, value: Outcome },
}

impl Predicate {
    fn eval(&self, ctx: &FilterContext) -> bool {
        match self {
            Predicate::Numeric(field, op, rhs) => {
                let lhs = match field {
                    NumericField::WinStreak => ctx.win_streak as f64,
                    NumericField::LossStreak => ctx.loss_streak as f64,
                    NumericField::Pnl => ctx.pnl,
                };
                op.apply(lhs, *rhs)
            }
            // A line with no observed winner yet matches nothing positively.
            Predicate::Winner { negated, value } => match ctx.last_winner {
                Some(winner) => (winner == *value) != *negated,
                None => *negated,
            },
        }
    }
}

/// Parsed filter: OR of AND-clauses of comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryFilter {
    source: String,
    clauses: Vec<Vec<Predicate>>,
}

impl EntryFilter {
    pub fn parse(source: &str) -> Result<Self, FilterParseError> {
        let tokens: Vec<&str> = source.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(FilterParseError::Empty);
        }

        let mut clauses: Vec<Vec<Predicate>> = Vec::new();
        let mut current: Vec<Predicate> = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            if i + 3 > tokens.len() {
                return Err(FilterParseError::DanglingToken(tokens[i].to_string()));
            }
            current.push(Self::parse_cmp(tokens[i], tokens[i + 1], tokens[i + 2])?);
            i += 3;

            match tokens.get(i) {
                None => break,
                Some(&"and") => i += 1,
                Some(&"or") => {
                    clauses.push(std::mem::take(&mut current));
                    i += 1;
                }
                Some(other) => {
                    return Err(FilterParseError::DanglingToken(other.to_string()));
                }
            }
            // A trailing connective has nothing to bind to.
            if i >= tokens.len() {
                return Err(FilterParseError::DanglingToken(tokens[i - 1].to_string()));
            }
        }
        clauses.push(current);

        Ok(Self {
            source: source.to_string(),
            clauses,
        })
    }

    fn parse_cmp(field: &str, op: &str, value: &str) -> Result<Predicate, FilterParseError> {
        match field {
            "last_winner" => {
                let negated = match op {
                    "==" => false,
                    "!=" => true,
                    other => {
                        return Err(FilterParseError::InvalidWinnerOperator(other.to_string()))
                    }
                };
                let outcome = Outcome::parse(value).map_err(|_| {
                    FilterParseError::InvalidValue(value.to_string(), field.to_string())
                })?;
                Ok(Predicate::Winner {
                    negated,
                    value: outcome,
                })
            }
            "win_streak" | "loss_streak" | "pnl" => {
                let numeric_field = match field {
                    "win_streak" => NumericField::WinStreak,
                    "loss_streak" => NumericField::LossStreak,
                    _ => NumericField::Pnl,
                };
                let rhs: f64 = value.parse().map_err(|_| {
                    FilterParseError::InvalidValue(value.to_string(), field.to_string())
                })?;
                Ok(Predicate::Numeric(numeric_field, CmpOp::parse(op)?, rhs))
            }
            other => Err(FilterParseError::UnknownField(other.to_string())),
        }
    }

    /// Evaluate against the line's live context.
    pub fn matches(&self, ctx: &FilterContext) -> bool {
        self.clauses
            .iter()
            .any(|clause| clause.iter().all(|p| p.eval(ctx)))
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

// Filters round-trip through config files and snapshots as their source text.
impl Serialize for EntryFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for EntryFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        EntryFilter::parse(&source).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(last: Option<Outcome>, wins: u32, losses: u32, pnl: f64) -> FilterContext {
        FilterContext {
            last_winner: last,
            win_streak: wins,
            loss_streak: losses,
            pnl,
        }
    }

    #[test]
    fn test_single_numeric_comparison() {
        let f = EntryFilter::parse("loss_streak >= 2").unwrap();
        assert!(!f.matches(&ctx(None, 0, 1, 0.0)));
        assert!(f.matches(&ctx(None, 0, 2, 0.0)));
        assert!(f.matches(&ctx(None, 0, 5, 0.0)));
    }

    #[test]
    fn test_winner_comparison() {
        let f = EntryFilter::parse("last_winner == B").unwrap();
        assert!(f.matches(&ctx(Some(Outcome::Banker), 0, 0, 0.0)));
        assert!(!f.matches(&ctx(Some(Outcome::Player), 0, 0, 0.0)));
        assert!(!f.matches(&ctx(None, 0, 0, 0.0)));

        let f = EntryFilter::parse("last_winner != T").unwrap();
        assert!(f.matches(&ctx(Some(Outcome::Banker), 0, 0, 0.0)));
        assert!(!f.matches(&ctx(Some(Outcome::Tie), 0, 0, 0.0)));
        assert!(f.matches(&ctx(None, 0, 0, 0.0)));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        // pnl > 0 or (loss_streak >= 3 and last_winner == P)
        let f = EntryFilter::parse("pnl > 0 or loss_streak >= 3 and last_winner == P").unwrap();
        assert!(f.matches(&ctx(None, 0, 0, 10.0)));
        assert!(f.matches(&ctx(Some(Outcome::Player), 0, 3, -50.0)));
        assert!(!f.matches(&ctx(Some(Outcome::Banker), 0, 3, -50.0)));
        assert!(!f.matches(&ctx(Some(Outcome::Player), 0, 2, -50.0)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            EntryFilter::parse(""),
            Err(FilterParseError::Empty)
        ));
        assert!(matches!(
            EntryFilter::parse("streak > 1"),
            Err(FilterParseError::UnknownField(_))
        ));
        assert!(matches!(
            EntryFilter::parse("pnl ~ 1"),
            Err(FilterParseError::UnknownOperator(_))
        ));
        assert!(matches!(
            EntryFilter::parse("last_winner > B"),
            Err(FilterParseError::InvalidWinnerOperator(_))
        ));
        assert!(matches!(
            EntryFilter::parse("pnl > abc"),
            Err(FilterParseError::InvalidValue(..))
        ));
        assert!(matches!(
            EntryFilter::parse("pnl > 1 and"),
            Err(FilterParseError::DanglingToken(_))
        ));
        assert!(matches!(
            EntryFilter::parse("pnl > 1 xor pnl < 2"),
            Err(FilterParseError::DanglingToken(_))
        ));
    }

    #[test]
    fn test_serde_roundtrip() {
        let f = EntryFilter::parse("pnl >= -100 and win_streak < 4").unwrap();
        let json = serde_json::to_string(&f).unwrap();
        assert_eq!(json, "\"pnl >= -100 and win_streak < 4\"");
        let back: EntryFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
    }
}
