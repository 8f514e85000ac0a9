//! End-to-end engine scenarios: configuration loaded from disk, rounds fed
//! through the public observation interface, decisions and events checked.

use std::collections::HashMap;
use std::path::PathBuf;

use approx::assert_relative_eq;

use autoline::application::LineOrchestrator;
use autoline::config::{load_strategies, CapitalConfig, EngineConfig, LoggingConfig};
use autoline::domain::strategy::{
    AdvanceRule, CrossTableConfig, DedupMode, EntryConfig, RiskAction, RiskConfig,
    RiskLevelConfig, RiskScope, StackPolicy, StakingConfig, StrategyDefinition,
};
use autoline::domain::{EventLevel, Outcome, PayoutTable, TablePhase};

fn engine_config(bankroll: f64) -> EngineConfig {
    EngineConfig {
        capital: CapitalConfig {
            bankroll,
            per_hand_risk_pct: 0.5,
            per_table_risk_pct: 0.8,
            min_unit: 1.0,
            max_concurrent_tables: 8,
        },
        strategy_dir: PathBuf::from("/dev/null"),
        payout_rates: None,
        logging: LoggingConfig::default(),
    }
}

fn strategy(key: &str, pattern: &str, dedup: DedupMode, stakes: Vec<i64>) -> StrategyDefinition {
    StrategyDefinition {
        strategy_key: key.to_string(),
        entry: EntryConfig::new(pattern, 0.0, dedup, 0, None),
        staking: StakingConfig {
            sequence: stakes,
            advance_on: AdvanceRule::OnLoss,
            reset_on_win: true,
            reset_on_loss: false,
            max_layers: None,
            per_hand_cap: None,
            stack_policy: StackPolicy::None,
        },
        cross_table: CrossTableConfig::default(),
        risk: RiskConfig::default(),
        metadata: HashMap::new(),
    }
}

fn engine(def: StrategyDefinition, table: &str) -> LineOrchestrator {
    let mut e = LineOrchestrator::new(engine_config(100_000.0), PayoutTable::default());
    let key = def.strategy_key.clone();
    e.register_strategy(def).unwrap();
    e.attach(table, &key).unwrap();
    e
}

fn observe(e: &mut LineOrchestrator, table: &str, rounds: &[(&str, Outcome)], start: f64) {
    for (i, (rid, outcome)) in rounds.iter().enumerate() {
        e.handle_result(table, rid, Some(*outcome), start + i as f64);
    }
}

fn bet(e: &mut LineOrchestrator, table: &str, round: &str, ts: f64) -> usize {
    e.update_table_phase(table, round, TablePhase::Bettable, ts).len()
}

#[test]
fn full_pipeline_from_config_files() {
    let dir = tempfile::tempdir().unwrap();
    let strategy_dir = dir.path().join("strategies");
    std::fs::create_dir(&strategy_dir).unwrap();
    std::fs::write(
        strategy_dir.join("martingale_bb.json"),
        r#"{
            "strategy_key": "martingale_bb",
            "entry": {"pattern": "BB then bet P", "dedup": "overlap"},
            "staking": {
                "sequence": [100, 200, 400, 800],
                "advance_on": "on_loss",
                "reset_on_win": true
            },
            "risk": {"levels": [
                {"scope": "table_strategy", "stop_loss": -1500.0, "action": "pause"}
            ]}
        }"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("payouts.json"),
        r#"{"banker": 0.95, "player": 1.0, "tie": 8.0}"#,
    )
    .unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
strategy_dir = "{}"
payout_rates = "{}"

[capital]
bankroll = 10000.0
per_hand_risk_pct = 0.10
per_table_risk_pct = 0.50
min_unit = 10.0
"#,
            strategy_dir.display(),
            dir.path().join("payouts.json").display()
        ),
    )
    .unwrap();

    let config = EngineConfig::load(&config_path).unwrap();
    let payouts = PayoutTable::from_file(&config.payout_rates.clone().unwrap()).unwrap();
    let strategies = load_strategies(&config.strategy_dir).unwrap();
    assert_eq!(strategies.len(), 1);

    let mut e = LineOrchestrator::new(config, payouts);
    for def in strategies {
        let key = def.strategy_key.clone();
        e.register_strategy(def).unwrap();
        e.attach("t1", &key).unwrap();
    }

    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);
    let decisions = e.update_table_phase("t1", "r3", TablePhase::Bettable, 3.0);
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].strategy_key, "martingale_bb");
    assert_eq!(decisions[0].direction, Outcome::Player);
    assert_relative_eq!(decisions[0].amount, 100.0);

    e.handle_result("t1", "r3", Some(Outcome::Player), 3.5);
    assert_relative_eq!(e.bankroll_total(), 10_100.0);
    assert_relative_eq!(e.bankroll_free(), 10_100.0);
}

#[test]
fn overlap_dedup_end_to_end() {
    let mut e = engine(strategy("bb", "BB then bet P", DedupMode::Overlap, vec![10]), "t1");
    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);

    // First bettable window triggers, the second sees no fresh outcome.
    assert_eq!(bet(&mut e, "t1", "r3", 3.0), 1);
    e.handle_result("t1", "r3", Some(Outcome::Tie), 3.2);
    assert_eq!(bet(&mut e, "t1", "r4", 3.5), 0);

    // A third Banker slides the window forward one element: triggers again.
    observe(&mut e, "t1", &[("r4", Outcome::Banker)], 4.0);
    assert_eq!(bet(&mut e, "t1", "r5", 5.0), 1);
}

#[test]
fn strict_dedup_blocks_overlapping_window() {
    let mut e = engine(strategy("pp", "PP then bet B", DedupMode::Strict, vec![10]), "t1");
    observe(&mut e, "t1", &[("r1", Outcome::Player), ("r2", Outcome::Player)], 1.0);
    assert_eq!(bet(&mut e, "t1", "r3", 3.0), 1);
    e.handle_result("t1", "r3", Some(Outcome::Tie), 3.2);

    // r3 resolved while we held a position, so feed a fresh Player round;
    // the new window still reuses r2 and may not trigger.
    observe(&mut e, "t1", &[("r4", Outcome::Player)], 4.0);
    assert_eq!(bet(&mut e, "t1", "r5", 5.0), 0);

    // A fully fresh pair triggers.
    observe(&mut e, "t1", &[("r5", Outcome::Player), ("r6", Outcome::Player)], 5.0);
    assert_eq!(bet(&mut e, "t1", "r7", 7.0), 1);
}

#[test]
fn tie_bet_pays_eight_to_one() {
    let mut e = engine(strategy("tt", "T then bet T", DedupMode::None, vec![50]), "t1");
    observe(&mut e, "t1", &[("r1", Outcome::Tie)], 1.0);
    let decisions = e.update_table_phase("t1", "r2", TablePhase::Bettable, 2.0);
    assert_eq!(decisions[0].direction, Outcome::Tie);
    e.handle_result("t1", "r2", Some(Outcome::Tie), 2.5);
    assert_relative_eq!(e.bankroll_total(), 100_400.0);
}

#[test]
fn tie_push_leaves_progression_in_place() {
    let mut e = engine(
        strategy("bb", "BB then bet P", DedupMode::None, vec![100, 200]),
        "t1",
    );
    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);
    assert_eq!(bet(&mut e, "t1", "r3", 3.0), 1);
    // Tie against a Player bet: push, stake returned, layer unchanged.
    e.handle_result("t1", "r3", Some(Outcome::Tie), 3.5);
    assert_relative_eq!(e.bankroll_total(), 100_000.0);
    assert_relative_eq!(e.bankroll_free(), 100_000.0);

    let decisions = e.update_table_phase("t1", "r4", TablePhase::Bettable, 4.0);
    assert_relative_eq!(decisions[0].amount, 100.0);
    assert_eq!(decisions[0].layer_index, 0);
}

#[test]
fn cancelled_round_returns_stake() {
    let mut e = engine(strategy("bb", "BB then bet P", DedupMode::None, vec![100]), "t1");
    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);
    assert_eq!(bet(&mut e, "t1", "r3", 3.0), 1);
    assert_relative_eq!(e.bankroll_free(), 99_900.0);

    // No winner reported: round voided.
    e.handle_result("t1", "r3", None, 3.5);
    assert_relative_eq!(e.bankroll_free(), 100_000.0);
    assert_eq!(e.stats().cancelled, 1);
}

#[test]
fn risk_freeze_after_single_loss() {
    let mut def = strategy("bb", "BB then bet P", DedupMode::None, vec![100, 200]);
    def.risk = RiskConfig {
        levels: vec![RiskLevelConfig {
            scope: RiskScope::TableStrategy,
            take_profit: None,
            stop_loss: None,
            max_drawdown_losses: Some(1),
            action: RiskAction::Pause,
            cooldown_sec: Some(600.0),
        }],
    };
    let mut e = engine(def, "t1");

    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);
    assert_eq!(bet(&mut e, "t1", "r3", 3.0), 1);
    e.handle_result("t1", "r3", Some(Outcome::Banker), 4.0);

    let events = e.drain_events();
    assert!(events.iter().any(|ev| ev.level == EventLevel::Risk));

    // Pattern still matches, but the line is frozen for the cooldown.
    assert_eq!(bet(&mut e, "t1", "r4", 5.0), 0);
    assert_eq!(bet(&mut e, "t1", "r5", 300.0), 0);

    // Cooldown elapsed: the line re-arms.
    assert_eq!(bet(&mut e, "t1", "r6", 700.0), 1);
}

#[test]
fn stop_all_halts_every_table() {
    let mut def = strategy("bb", "BB then bet P", DedupMode::None, vec![100]);
    def.risk = RiskConfig {
        levels: vec![RiskLevelConfig {
            scope: RiskScope::GlobalDay,
            take_profit: None,
            stop_loss: Some(-100.0),
            max_drawdown_losses: None,
            action: RiskAction::StopAll,
            cooldown_sec: None,
        }],
    };
    let mut e = LineOrchestrator::new(engine_config(100_000.0), PayoutTable::default());
    e.register_strategy(def).unwrap();
    e.attach("t1", "bb").unwrap();
    e.attach("t2", "bb").unwrap();

    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);
    observe(&mut e, "t2", &[("q1", Outcome::Banker), ("q2", Outcome::Banker)], 1.0);

    assert_eq!(bet(&mut e, "t1", "r3", 3.0), 1);
    e.handle_result("t1", "r3", Some(Outcome::Banker), 4.0);
    assert!(e.halted());

    // Both tables refuse to bet after the halt.
    assert_eq!(bet(&mut e, "t2", "q3", 5.0), 0);
    assert_eq!(bet(&mut e, "t1", "r4", 5.0), 0);
}

#[test]
fn entry_filter_gates_signal() {
    let mut def = strategy("bb", "BB then bet P", DedupMode::None, vec![100]);
    def.entry = EntryConfig::new(
        "BB then bet P",
        0.0,
        DedupMode::None,
        0,
        Some(autoline::domain::EntryFilter::parse("win_streak < 2").unwrap()),
    );
    let mut e = engine(def, "t1");

    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);
    assert_eq!(bet(&mut e, "t1", "r3", 3.0), 1);
    e.handle_result("t1", "r3", Some(Outcome::Player), 3.5);

    // History is still [B, B]; one win so far, the filter still passes.
    assert_eq!(bet(&mut e, "t1", "r4", 4.0), 1);
    e.handle_result("t1", "r4", Some(Outcome::Player), 4.5);

    // Two consecutive wins: the filter now holds the line back.
    assert_eq!(bet(&mut e, "t1", "r5", 5.0), 0);
}

#[test]
fn snapshot_roundtrip_with_open_position() {
    let def = strategy("bb", "BB then bet P", DedupMode::Overlap, vec![100, 200]);
    let mut e = engine(def.clone(), "t1");
    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);
    assert_eq!(bet(&mut e, "t1", "r3", 3.0), 1);

    let snap = e.snapshot();
    assert_relative_eq!(snap.capital.bankroll_free, 99_900.0);
    assert_eq!(snap.positions.len(), 1);

    let mut fresh = engine(def, "t1");
    fresh.restore_state(&snap);
    assert_eq!(fresh.snapshot(), snap);

    // The restored position settles normally against the restored ledger.
    fresh.handle_result("t1", "r3", Some(Outcome::Player), 4.0);
    assert_relative_eq!(fresh.bankroll_total(), 100_100.0);
    assert_relative_eq!(fresh.bankroll_free(), 100_100.0);
}

#[test]
fn snapshot_serializes_to_json() {
    let mut e = engine(strategy("bb", "BB then bet P", DedupMode::None, vec![100]), "t1");
    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);
    bet(&mut e, "t1", "r3", 3.0);

    let snap = e.snapshot();
    let json = serde_json::to_string(&snap).unwrap();
    let back: autoline::EngineSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snap);
}

#[test]
fn concurrent_table_limit_blocks_new_table() {
    let mut config = engine_config(100_000.0);
    config.capital.max_concurrent_tables = 1;
    let mut e = LineOrchestrator::new(config, PayoutTable::default());
    e.register_strategy(strategy("bb", "BB then bet P", DedupMode::None, vec![100]))
        .unwrap();
    e.attach("t1", "bb").unwrap();
    e.attach("t2", "bb").unwrap();

    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);
    observe(&mut e, "t2", &[("q1", Outcome::Banker), ("q2", Outcome::Banker)], 1.0);

    assert_eq!(bet(&mut e, "t1", "r3", 3.0), 1);
    // One table is already busy; a second table may not open.
    assert_eq!(bet(&mut e, "t2", "q3", 4.0), 0);

    // The limit frees up once the first table settles.
    e.handle_result("t1", "r3", Some(Outcome::Player), 5.0);
    assert_eq!(bet(&mut e, "t2", "q3", 6.0), 1);
}

#[test]
fn insufficient_funds_skips_line_but_not_siblings() {
    let mut config = engine_config(150.0);
    config.capital.per_hand_risk_pct = 1.0;
    config.capital.per_table_risk_pct = 1.0;
    let mut e = LineOrchestrator::new(config, PayoutTable::default());
    e.register_strategy(strategy("a", "BB then bet P", DedupMode::None, vec![100]))
        .unwrap();
    e.register_strategy(strategy("b", "BB then bet B", DedupMode::None, vec![100]))
        .unwrap();
    e.register_strategy(strategy("c", "BB then bet P", DedupMode::None, vec![50]))
        .unwrap();
    e.attach("t1", "a").unwrap();
    e.attach("t2", "b").unwrap();
    e.attach("t2", "c").unwrap();

    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);
    observe(&mut e, "t2", &[("q1", Outcome::Banker), ("q2", Outcome::Banker)], 1.0);

    // a ties up 100 of the 150 bankroll on t1.
    assert_eq!(bet(&mut e, "t1", "r3", 3.0), 1);

    // On t2 the caps pass for b, but only 50 is free: the ledger refuses,
    // and c is still evaluated afterwards.
    let decisions = e.update_table_phase("t2", "q3", TablePhase::Bettable, 4.0);
    let keys: Vec<&str> = decisions.iter().map(|d| d.strategy_key.as_str()).collect();
    assert_eq!(keys, vec!["c"]);
    assert_relative_eq!(e.bankroll_free(), 0.0);
    let events = e.drain_events();
    assert!(events
        .iter()
        .any(|ev| ev.level == EventLevel::Warning && ev.metadata["strategy"] == "b"));
}

#[test]
fn per_table_cap_skips_second_line() {
    let mut e = LineOrchestrator::new(
        EngineConfig {
            capital: CapitalConfig {
                bankroll: 1_000.0,
                per_hand_risk_pct: 0.2,
                per_table_risk_pct: 0.25,
                min_unit: 1.0,
                max_concurrent_tables: 8,
            },
            strategy_dir: PathBuf::from("/dev/null"),
            payout_rates: None,
            logging: LoggingConfig::default(),
        },
        PayoutTable::default(),
    );
    e.register_strategy(strategy("a", "BB then bet P", DedupMode::None, vec![150]))
        .unwrap();
    e.register_strategy(strategy("b", "BB then bet B", DedupMode::None, vec![150]))
        .unwrap();
    e.attach("t1", "a").unwrap();
    e.attach("t1", "b").unwrap();

    observe(&mut e, "t1", &[("r1", Outcome::Banker), ("r2", Outcome::Banker)], 1.0);
    // Table cap is 250: the first line reserves 150, the second would breach.
    let decisions = e.update_table_phase("t1", "r3", TablePhase::Bettable, 3.0);
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].strategy_key, "a");
    let events = e.drain_events();
    assert!(events
        .iter()
        .any(|ev| ev.level == EventLevel::Warning && ev.metadata["strategy"] == "b"));
}
