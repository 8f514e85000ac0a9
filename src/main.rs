//! autoline - line strategy orchestration engine
//!
//! Validates configuration and runs offline simulations. The live detector
//! and actuator integrate against the library crate directly.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{fmt, EnvFilter};

use autoline::application::LineOrchestrator;
use autoline::config::{load_strategies, EngineConfig};
use autoline::domain::{EventLevel, Outcome, PayoutTable, TablePhase};

#[derive(Parser)]
#[command(name = "autoline", about = "Line strategy orchestration engine", version)]
struct CliApp {
    /// Engine configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output (info level)
    #[arg(short, long)]
    verbose: bool,

    /// Debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate configuration and all strategy definitions
    Check,
    /// Drive the engine with randomly generated rounds
    Simulate(SimulateCmd),
}

#[derive(Parser)]
struct SimulateCmd {
    /// Number of rounds per table
    #[arg(short, long, default_value_t = 200)]
    rounds: u32,

    /// Number of tables
    #[arg(short, long, default_value_t = 2)]
    tables: u32,

    /// RNG seed for reproducible runs
    #[arg(short, long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let app = CliApp::parse();
    let config = EngineConfig::load(&app.config).context("Failed to load configuration")?;
    init_logging(app.verbose, app.debug, &config.logging.level);

    match app.command {
        Command::Check => check_command(config),
        Command::Simulate(cmd) => simulate_command(config, &cmd),
    }
}

fn init_logging(verbose: bool, debug: bool, config_level: &str) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config_level.to_string()))
    };
    fmt().with_env_filter(filter).init();
}

fn check_command(config: EngineConfig) -> Result<()> {
    let payouts = load_payouts(&config)?;
    let strategies =
        load_strategies(&config.strategy_dir).context("Failed to load strategy definitions")?;

    println!("Configuration OK");
    println!(
        "  bankroll: {:.2} (per-hand {:.2}, per-table {:.2}, min unit {:.2})",
        config.capital.bankroll,
        config.per_hand_limit(),
        config.per_table_limit(),
        config.capital.min_unit
    );
    println!(
        "  payouts: banker {:.2} / player {:.2} / tie {:.2}",
        payouts.banker, payouts.player, payouts.tie
    );
    println!("  strategies: {}", strategies.len());
    for s in &strategies {
        println!(
            "    {}: pattern {:?}, {} layers, dedup {:?}",
            s.strategy_key,
            s.entry.pattern,
            s.staking.sequence.len(),
            s.entry.dedup
        );
    }
    Ok(())
}

fn simulate_command(config: EngineConfig, cmd: &SimulateCmd) -> Result<()> {
    let payouts = load_payouts(&config)?;
    let strategies =
        load_strategies(&config.strategy_dir).context("Failed to load strategy definitions")?;

    let mut engine = LineOrchestrator::new(config, payouts);
    let table_ids: Vec<String> = (1..=cmd.tables).map(|i| format!("table-{}", i)).collect();
    for def in strategies {
        let key = def.strategy_key.clone();
        engine.register_strategy(def)?;
        for table in &table_ids {
            engine.attach(table, &key)?;
        }
    }

    let mut rng: StdRng = match cmd.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut decisions = 0u64;
    let mut ts = 0.0_f64;
    for round in 0..cmd.rounds {
        for table in &table_ids {
            let round_id = format!("{}-r{}", table, round);
            ts += 1.0;
            decisions += engine
                .update_table_phase(table, &round_id, TablePhase::Bettable, ts)
                .len() as u64;
            ts += 1.0;
            engine.update_table_phase(table, &round_id, TablePhase::Locked, ts);
            ts += 1.0;
            engine.handle_result(table, &round_id, Some(draw_outcome(&mut rng)), ts);
        }
        for event in engine.drain_events() {
            match event.level {
                EventLevel::Risk | EventLevel::Conflict => {
                    println!("[{:?}] {}", event.level, event.message)
                }
                _ => tracing::debug!(level = ?event.level, "{}", event.message),
            }
        }
        if engine.halted() {
            println!("Engine halted by risk stop at round {}", round);
            break;
        }
    }

    let stats = engine.stats();
    println!(
        "Simulated {} rounds on {} tables: {} decisions, {}W/{}L/{}S/{}C, pnl {:+.2}",
        cmd.rounds,
        cmd.tables,
        decisions,
        stats.wins,
        stats.losses,
        stats.skipped,
        stats.cancelled,
        stats.total_pnl
    );
    println!(
        "Bankroll: {:.2} total, {:.2} free",
        engine.bankroll_total(),
        engine.bankroll_free()
    );
    Ok(())
}

fn load_payouts(config: &EngineConfig) -> Result<PayoutTable> {
    match &config.payout_rates {
        Some(path) => PayoutTable::from_file(path).context("Failed to load payout rates"),
        None => Ok(PayoutTable::default()),
    }
}

// No-commission table odds: banker is slightly more likely, ties are rare.
fn draw_outcome(rng: &mut StdRng) -> Outcome {
    let roll: f64 = rng.gen();
    if roll < 0.458 {
        Outcome::Banker
    } else if roll < 0.904 {
        Outcome::Player
    } else {
        Outcome::Tie
    }
}
