//! ledger-runner: headless request layer for the reward ledger.
//!
//! Reads one JSON command per line on stdin and writes one JSON response
//! per line on stdout, while the price scheduler runs in the background.
//!
//! Usage:
//!   ledger-runner --data-dir ./data --db ledger.db
//!   echo '{"type":"portfolio","userId":1}' | ledger-runner --db :memory:

use anyhow::Result;
use clap::Parser;
use reward_ledger_core::{
    clock::LocalClock,
    config::LedgerConfig,
    error::LedgerError,
    ingest::{RewardIngestor, RewardRequest},
    pricing::PriceSimulator,
    scheduler::spawn_price_scheduler,
    store::LedgerStore,
    types::{normalize_symbol, UserId},
    valuation::ValuationEngine,
};
use serde_json::json;
use std::io::{self, BufRead, Write};

const DEMO_USER_ID: UserId = 1;

#[derive(Parser, Debug)]
#[command(name = "ledger-runner", about = "Stock-reward ledger over line-delimited JSON")]
struct Args {
    /// Directory holding ledger.json.
    #[arg(long, default_value = "./data")]
    data_dir: String,

    /// SQLite path; overrides the config file. `:memory:` for a throwaway db.
    #[arg(long, env = "LEDGER_DB")]
    db: Option<String>,

    /// Do not start the price scheduler.
    #[arg(long)]
    no_scheduler: bool,
}

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum IpcCommand {
    Reward(RewardRequest),
    TodayStocks { user_id: UserId },
    HistoricalValuation { user_id: UserId },
    Stats { user_id: UserId },
    Portfolio { user_id: UserId },
    PriceHistory { symbol: String },
    Health,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = LedgerConfig::load(&args.data_dir)?;
    if let Some(db) = args.db {
        config.db_path = db;
    }
    let clock = LocalClock::new(config.tz()?);

    // For :memory: use SQLite shared-memory URI so every handle (ingestion,
    // valuation, scheduler) sees the same in-memory database.
    let db_effective = if config.db_path == ":memory:" {
        format!("file:ledger_{}?mode=memory&cache=shared", std::process::id())
    } else {
        config.db_path.clone()
    };
    let store = LedgerStore::open(&db_effective)?;
    store.migrate()?;
    store.ensure_user(DEMO_USER_ID, "Demo User", clock.now())?;
    log::info!("ledger-runner: db={db_effective} tz={}", config.timezone);

    let scheduler = if args.no_scheduler {
        None
    } else {
        let simulator = PriceSimulator::new(config.simulator.clone(), clock);
        Some(spawn_price_scheduler(
            store.reopen()?,
            simulator,
            config.simulator.warmup_delay(),
            config.simulator.tick_interval(),
        ))
    };

    let ingestor = RewardIngestor::new(store.reopen()?, &config, clock);
    let valuation = ValuationEngine::new(store.reopen()?, clock, config.fallback_price);
    tokio::task::spawn_blocking(move || run_ipc_loop(ingestor, valuation)).await??;

    if let Some(handle) = scheduler {
        handle.shutdown().await;
    }
    drop(store);
    Ok(())
}

fn run_ipc_loop(mut ingestor: RewardIngestor, valuation: ValuationEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = json!({ "ok": false, "error": { "kind": "validation", "message": e.to_string() } });
                writeln!(stdout, "{err_json}")?;
                stdout.flush()?;
                continue;
            }
        };

        let response = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Health => Ok(json!({ "ok": true })),
            IpcCommand::Reward(req) => ingestor.ingest(&req).and_then(to_json),
            IpcCommand::TodayStocks { user_id } => valuation.today_positions(user_id).and_then(to_json),
            IpcCommand::HistoricalValuation { user_id } => {
                valuation.historical_daily_valuation(user_id).and_then(to_json)
            }
            IpcCommand::Stats { user_id } => valuation.stats(user_id).and_then(to_json),
            IpcCommand::Portfolio { user_id } => valuation.portfolio(user_id).and_then(to_json),
            IpcCommand::PriceHistory { symbol } => valuation
                .store()
                .price_history(&normalize_symbol(&symbol))
                .and_then(to_json),
        };

        let line = match response {
            Ok(data) => json!({ "ok": true, "data": data }),
            Err(e) => error_json(&e),
        };
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: T) -> Result<serde_json::Value, LedgerError> {
    Ok(serde_json::to_value(value)?)
}

fn error_json(err: &LedgerError) -> serde_json::Value {
    let mut body = json!({ "kind": err.kind().as_str(), "message": err.to_string() });
    if let LedgerError::Conflict { existing_id: Some(id), .. } = err {
        body["existingId"] = json!(id);
    }
    json!({ "ok": false, "error": body })
}
