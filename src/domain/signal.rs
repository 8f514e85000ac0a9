//! Pattern signal detection over per-table outcome history.
//!
//! Each strategy owns one [`SignalTracker`]. Outcomes are recorded per table;
//! `should_trigger` slides the strategy's watched sequence over the tail of
//! that table's history and applies validity-window and dedup checks.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::strategy::{DedupMode, EntryConfig};
use super::outcome::Outcome;

/// Outcomes retained per table. Patterns are short; the tail is enough.
pub const HISTORY_LIMIT: usize = 20;

const STRICT_MAX_KEYS: usize = 1000;
const STRICT_EVICT_BATCH: usize = 100;

/// One observed round in a table's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub round_id: String,
    pub outcome: Outcome,
    pub ts: f64,
}

/// Sliding-window pattern matcher with per-table state.
#[derive(Debug, Clone)]
pub struct SignalTracker {
    entry: EntryConfig,
    history: HashMap<String, VecDeque<HistoryEntry>>,
    /// Overlap dedup: timestamp of the last element of the most recently
    /// triggered window, per table.
    overlap_end: HashMap<String, f64>,
    /// Strict dedup: round keys already consumed by a trigger.
    strict_keys: HashSet<String>,
    strict_order: VecDeque<String>,
}

fn strict_key(table_id: &str, round_id: &str) -> String {
    format!("{}\x1f{}", table_id, round_id)
}

impl SignalTracker {
    pub fn new(entry: EntryConfig) -> Self {
        Self {
            entry,
            history: HashMap::new(),
            overlap_end: HashMap::new(),
            strict_keys: HashSet::new(),
            strict_order: VecDeque::new(),
        }
    }

    pub fn entry_config(&self) -> &EntryConfig {
        &self.entry
    }

    /// Append one observed round to a table's history, trimming the tail.
    pub fn record(&mut self, table_id: &str, round_id: &str, outcome: Outcome, ts: f64) {
        let deque = self.history.entry(table_id.to_string()).or_default();
        deque.push_back(HistoryEntry {
            round_id: round_id.to_string(),
            outcome,
            ts,
        });
        while deque.len() > HISTORY_LIMIT {
            deque.pop_front();
        }
    }

    /// Check whether the watched pattern currently matches the tail of the
    /// table's history. `now` drives the validity window; `round_id` is the
    /// round a trigger would bet into. A positive answer consumes dedup state.
    pub fn should_trigger(&mut self, table_id: &str, round_id: &str, now: f64) -> bool {
        let pattern = self.entry.sequence().to_vec();
        let window: Vec<HistoryEntry> = {
            let deque = match self.history.get(table_id) {
                Some(d) => d,
                None => return false,
            };
            if deque.len() < pattern.len() {
                return false;
            }
            deque
                .iter()
                .skip(deque.len() - pattern.len())
                .cloned()
                .collect()
        };

        for (entry, wanted) in window.iter().zip(pattern.iter()) {
            if entry.outcome != *wanted {
                return false;
            }
        }

        // Oldest matched outcome must still be fresh.
        if self.entry.valid_window_sec > 0.0 {
            let oldest = window[0].ts;
            if now - oldest > self.entry.valid_window_sec {
                return false;
            }
        }

        match self.entry.dedup {
            DedupMode::None => true,
            DedupMode::Overlap => self.overlap_dedup(table_id, &window),
            DedupMode::Strict => self.strict_dedup(table_id, round_id, &window),
        }
    }

    /// Allow a retrigger only when the window has consumed at least one
    /// outcome newer than the previous trigger's window. Sharing the boundary
    /// element is fine; reusing the same tail is not.
    fn overlap_dedup(&mut self, table_id: &str, window: &[HistoryEntry]) -> bool {
        let first = window[0].ts;
        let last = window[window.len() - 1].ts;
        if let Some(&end) = self.overlap_end.get(table_id) {
            if last <= end || first < end {
                return false;
            }
        }
        self.overlap_end.insert(table_id.to_string(), last);
        true
    }

    /// Block if the betting round or any consumed window round was already
    /// part of an earlier trigger; otherwise key them all.
    fn strict_dedup(&mut self, table_id: &str, round_id: &str, window: &[HistoryEntry]) -> bool {
        if self.strict_keys.contains(&strict_key(table_id, round_id)) {
            return false;
        }
        for entry in window {
            if self.strict_keys.contains(&strict_key(table_id, &entry.round_id)) {
                return false;
            }
        }
        self.insert_strict_key(strict_key(table_id, round_id));
        for entry in window {
            self.insert_strict_key(strict_key(table_id, &entry.round_id));
        }
        true
    }

    fn insert_strict_key(&mut self, key: String) {
        if self.strict_keys.insert(key.clone()) {
            self.strict_order.push_back(key);
            if self.strict_order.len() > STRICT_MAX_KEYS {
                for _ in 0..STRICT_EVICT_BATCH {
                    if let Some(old) = self.strict_order.pop_front() {
                        self.strict_keys.remove(&old);
                    }
                }
            }
        }
    }

    /// Most recent `n` outcomes for a table, oldest first.
    pub fn recent(&self, table_id: &str, n: usize) -> Vec<HistoryEntry> {
        match self.history.get(table_id) {
            Some(deque) => {
                let skip = deque.len().saturating_sub(n);
                deque.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Full histories, for snapshots.
    pub fn histories(&self) -> HashMap<String, Vec<HistoryEntry>> {
        self.history
            .iter()
            .map(|(table, deque)| (table.clone(), deque.iter().cloned().collect()))
            .collect()
    }

    /// Replace one table's history wholesale, for snapshot restore.
    pub fn restore_history(&mut self, table_id: &str, entries: Vec<HistoryEntry>) {
        let mut deque: VecDeque<HistoryEntry> = entries.into();
        while deque.len() > HISTORY_LIMIT {
            deque.pop_front();
        }
        self.history.insert(table_id.to_string(), deque);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::DedupMode;

    fn tracker(pattern: &str, window_sec: f64, dedup: DedupMode) -> SignalTracker {
        SignalTracker::new(EntryConfig::new(pattern, window_sec, dedup, 0, None))
    }

    fn feed(t: &mut SignalTracker, table: &str, rounds: &[(&str, Outcome, f64)]) {
        for (rid, outcome, ts) in rounds {
            t.record(table, rid, *outcome, *ts);
        }
    }

    #[test]
    fn test_exact_tail_match_triggers() {
        let mut t = tracker("BB then bet P", 0.0, DedupMode::None);
        feed(
            &mut t,
            "t1",
            &[
                ("r1", Outcome::Player, 1.0),
                ("r2", Outcome::Banker, 2.0),
                ("r3", Outcome::Banker, 3.0),
            ],
        );
        assert!(t.should_trigger("t1", "r4", 4.0));
    }

    #[test]
    fn test_interrupted_pattern_does_not_trigger() {
        let mut t = tracker("BB then bet P", 0.0, DedupMode::None);
        feed(
            &mut t,
            "t1",
            &[
                ("r1", Outcome::Banker, 1.0),
                ("r2", Outcome::Banker, 2.0),
                ("r3", Outcome::Player, 3.0),
            ],
        );
        assert!(!t.should_trigger("t1", "r4", 4.0));
    }

    #[test]
    fn test_short_history_does_not_trigger() {
        let mut t = tracker("BBB", 0.0, DedupMode::None);
        feed(&mut t, "t1", &[("r1", Outcome::Banker, 1.0)]);
        assert!(!t.should_trigger("t1", "r2", 2.0));
    }

    #[test]
    fn test_tables_are_isolated() {
        let mut t = tracker("BB", 0.0, DedupMode::None);
        feed(
            &mut t,
            "t1",
            &[("r1", Outcome::Banker, 1.0), ("r2", Outcome::Banker, 2.0)],
        );
        assert!(t.should_trigger("t1", "r3", 3.0));
        assert!(!t.should_trigger("t2", "r3", 3.0));
    }

    #[test]
    fn test_validity_window_rejects_stale_match() {
        let mut t = tracker("BB", 10.0, DedupMode::None);
        feed(
            &mut t,
            "t1",
            &[("r1", Outcome::Banker, 0.0), ("r2", Outcome::Banker, 5.0)],
        );
        assert!(t.should_trigger("t1", "r3", 9.0));
        assert!(!t.should_trigger("t1", "r3", 11.0));
    }

    #[test]
    fn test_no_dedup_retriggers_on_same_window() {
        let mut t = tracker("BB", 0.0, DedupMode::None);
        feed(
            &mut t,
            "t1",
            &[("r1", Outcome::Banker, 1.0), ("r2", Outcome::Banker, 2.0)],
        );
        assert!(t.should_trigger("t1", "r3", 3.0));
        assert!(t.should_trigger("t1", "r3", 3.0));
    }

    #[test]
    fn test_overlap_dedup_blocks_same_window() {
        let mut t = tracker("BB", 0.0, DedupMode::Overlap);
        feed(
            &mut t,
            "t1",
            &[("r1", Outcome::Banker, 1.0), ("r2", Outcome::Banker, 2.0)],
        );
        assert!(t.should_trigger("t1", "r3", 3.0));
        assert!(!t.should_trigger("t1", "r3", 3.0));
    }

    #[test]
    fn test_overlap_dedup_requires_fresh_outcome() {
        let mut t = tracker("BB", 0.0, DedupMode::Overlap);
        feed(
            &mut t,
            "t1",
            &[("r1", Outcome::Banker, 1.0), ("r2", Outcome::Banker, 2.0)],
        );
        assert!(t.should_trigger("t1", "r3", 3.0));

        // Window [r2, r3] shares the boundary r2 but consumes fresh r3.
        t.record("t1", "r3", Outcome::Banker, 3.0);
        assert!(t.should_trigger("t1", "r4", 4.0));

        // Fully re-contained window: nothing new, no trigger.
        assert!(!t.should_trigger("t1", "r4", 4.0));
    }

    #[test]
    fn test_strict_dedup_blocks_window_reuse() {
        let mut t = tracker("BB", 0.0, DedupMode::Strict);
        feed(
            &mut t,
            "t1",
            &[("r1", Outcome::Banker, 1.0), ("r2", Outcome::Banker, 2.0)],
        );
        assert!(t.should_trigger("t1", "r3", 3.0));

        // r3 was keyed as the betting round; [r2, r3] reuses r2 and r3.
        t.record("t1", "r3", Outcome::Banker, 3.0);
        assert!(!t.should_trigger("t1", "r4", 4.0));

        // A fully fresh window triggers again.
        t.record("t1", "r4", Outcome::Banker, 4.0);
        t.record("t1", "r5", Outcome::Banker, 5.0);
        assert!(t.should_trigger("t1", "r6", 6.0));
    }

    #[test]
    fn test_strict_keys_are_bounded() {
        let mut t = tracker("B", 0.0, DedupMode::Strict);
        for i in 0..2000 {
            let rid = format!("r{}", i);
            t.record("t1", &rid, Outcome::Banker, i as f64);
            t.should_trigger("t1", &format!("r{}", i + 1), i as f64 + 0.5);
        }
        assert!(t.strict_keys.len() <= STRICT_MAX_KEYS);
        assert_eq!(t.strict_keys.len(), t.strict_order.len());
    }

    #[test]
    fn test_history_is_trimmed() {
        let mut t = tracker("B", 0.0, DedupMode::None);
        for i in 0..50 {
            t.record("t1", &format!("r{}", i), Outcome::Player, i as f64);
        }
        let recent = t.recent("t1", 100);
        assert_eq!(recent.len(), HISTORY_LIMIT);
        assert_eq!(recent[0].round_id, "r30");
    }

    #[test]
    fn test_restore_history_roundtrip() {
        let mut t = tracker("BB", 0.0, DedupMode::None);
        feed(
            &mut t,
            "t1",
            &[("r1", Outcome::Banker, 1.0), ("r2", Outcome::Banker, 2.0)],
        );
        let snap = t.histories();

        let mut fresh = tracker("BB", 0.0, DedupMode::None);
        for (table, entries) in snap {
            fresh.restore_history(&table, entries);
        }
        assert!(fresh.should_trigger("t1", "r3", 3.0));
    }
}
