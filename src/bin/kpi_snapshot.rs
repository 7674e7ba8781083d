//! KPI Snapshot Binary - one windowed run over a token list
//!
//! Resolves the trailing window to a block range, aggregates buy/sell activity
//! per token, quotes prices, flags spikes against the previous snapshot and
//! prints the report as JSON on stdout. Logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin kpi_snapshot -- --tokens tokens.json --backend sqlite
//! ```
//!
//! ## Flags
//!
//! - `--tokens <path>` - token list file (overrides TOKENS_PATH)
//! - `--backend json|sqlite` - snapshot backend (overrides SNAPSHOT_BACKEND)
//! - `--from-block-mode timestamp|lookback` - overrides FROM_BLOCK_MODE
//!
//! ## Environment Variables
//!
//! - RPC_URL - JSON-RPC endpoint (required)
//! - NETWORK - testnet | mainnet (default: testnet)
//! - CURVE_ADDRESS, CURVE_BUY_TOPIC, CURVE_SELL_TOPIC - trade event source (required)
//! - LENS_ADDRESS, LENS_QUOTE_SELECTOR - quote contract (required)
//! - WINDOW_SECS (300), SPIKE_PCT (10), MAX_CONCURRENCY (8), ...
//! - RUST_LOG - Logging level (optional, default: info)
//!
//! ## Exit Codes
//!
//! 0 success, 2 configuration, 3 token list, 4 chain unreachable, 5 persistence

use curveflow::aggregator_core::PriceSnapshotStore;
use curveflow::chain::JsonRpcClient;
use curveflow::pipeline::{load_token_file, CliOverrides, EngineSettings, KpiEngine, RunConfig, RunError};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("❌ {}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), RunError> {
    let args: Vec<String> = env::args().collect();
    let overrides = CliOverrides::parse(&args)?;
    let config = RunConfig::from_env(&overrides)?;

    log::info!("🚀 Starting KPI snapshot");
    log::info!("   ├─ Network: {}", config.network.as_str());
    log::info!("   ├─ RPC: {}", config.rpc.url);
    log::info!("   ├─ Window: {}s ({} mode)", config.window_secs, config.from_block_mode.as_str());
    log::info!("   ├─ Spike threshold: {}%", config.spike_threshold_pct);
    log::info!(
        "   └─ Snapshot: {} ({})",
        config.snapshot_path.display(),
        config.snapshot_backend.as_str()
    );

    let tokens = load_token_file(&config.tokens_path)?;

    let client = Arc::new(JsonRpcClient::new(config.rpc.clone())?);
    let store = Arc::new(PriceSnapshotStore::open(
        config.snapshot_backend,
        config.snapshot_path.clone(),
    )?);

    let engine = KpiEngine::new(
        client.clone(),
        client.clone(),
        client,
        store,
        EngineSettings::from(&config),
    );

    let report = engine.run(&tokens).await?;

    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| RunError::Persistence(e.into()))?;
    println!("{}", json);

    Ok(())
}
