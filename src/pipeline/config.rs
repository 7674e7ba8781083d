//! Run configuration from environment variables
//!
//! Everything is resolved before the first network call; a missing or
//! malformed setting is a `ConfigError` and the run never starts.

use crate::aggregator_core::resolver::DEFAULT_INITIAL_STEP;
use crate::aggregator_core::SnapshotBackend;
use crate::chain::{CurveContracts, RetryPolicy, RpcSettings};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Largest decimal scale representable in a `u128` base-unit amount
pub const MAX_DECIMALS: u32 = 38;

const RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Highest return word index a quote contract is expected to use
pub const MAX_QUOTE_RESULT_WORD: usize = 15;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Testnet,
    Mainnet,
}

impl Network {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "testnet" => Some(Network::Testnet),
            "mainnet" => Some(Network::Mainnet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    pub fn default_snapshot_path(&self, backend: SnapshotBackend) -> PathBuf {
        match backend {
            SnapshotBackend::Json => PathBuf::from(format!("kpis-cache-{}.json", self.as_str())),
            SnapshotBackend::Sqlite => PathBuf::from(format!("data/kpis-{}.db", self.as_str())),
        }
    }
}

/// How the start of the block range is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromBlockMode {
    /// Binary search for the last block at or before `now - window`
    Timestamp,
    /// Fixed number of blocks behind the latest block
    Lookback(u64),
}

impl FromBlockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FromBlockMode::Timestamp => "timestamp",
            FromBlockMode::Lookback(_) => "lookback",
        }
    }

    fn parse(s: &str, lookback_blocks: u64) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "timestamp" => Some(FromBlockMode::Timestamp),
            "lookback" => Some(FromBlockMode::Lookback(lookback_blocks)),
            _ => None,
        }
    }
}

/// Command-line overrides for a subset of the environment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub tokens_path: Option<PathBuf>,
    pub backend: Option<SnapshotBackend>,
    pub from_block_mode: Option<String>,
}

impl CliOverrides {
    /// Parse `--tokens <path>`, `--backend json|sqlite`, `--from-block-mode timestamp|lookback`
    pub fn parse(args: &[String]) -> Result<Self, ConfigError> {
        let mut overrides = CliOverrides::default();

        if let Some(path) = flag_value(args, "--tokens")? {
            overrides.tokens_path = Some(PathBuf::from(path));
        }

        if let Some(backend) = flag_value(args, "--backend")? {
            overrides.backend = Some(SnapshotBackend::from_str(backend).ok_or_else(|| {
                ConfigError::InvalidValue(format!("--backend must be json or sqlite, got '{}'", backend))
            })?);
        }

        if let Some(mode) = flag_value(args, "--from-block-mode")? {
            overrides.from_block_mode = Some(mode.to_string());
        }

        Ok(overrides)
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>, ConfigError> {
    match args.iter().position(|x| x == flag) {
        Some(idx) => args
            .get(idx + 1)
            .map(|s| Some(s.as_str()))
            .ok_or_else(|| ConfigError::InvalidValue(format!("{} requires a value", flag))),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub network: Network,
    pub tokens_path: PathBuf,
    pub snapshot_backend: SnapshotBackend,
    pub snapshot_path: PathBuf,
    pub window_secs: u64,
    pub spike_threshold_pct: f64,
    pub base_decimals: u32,
    pub token_decimals: u32,
    pub from_block_mode: FromBlockMode,
    pub search_initial_step: u64,
    pub max_concurrency: usize,
    /// Applies to block lookups only
    pub retry: RetryPolicy,
    pub rpc: RpcSettings,
}

impl RunConfig {
    pub fn from_env(overrides: &CliOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), overrides)
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F, overrides: &CliOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()));

        let url = require("RPC_URL")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "RPC_URL must start with http:// or https://".to_string(),
            ));
        }

        let network_str = get("NETWORK").unwrap_or_else(|| "testnet".to_string());
        let network = Network::from_str(&network_str).ok_or_else(|| {
            ConfigError::InvalidValue(format!("NETWORK must be testnet or mainnet, got '{}'", network_str))
        })?;

        let snapshot_backend = match overrides.backend {
            Some(backend) => backend,
            None => {
                let s = get("SNAPSHOT_BACKEND").unwrap_or_else(|| "json".to_string());
                SnapshotBackend::from_str(&s).ok_or_else(|| {
                    ConfigError::InvalidValue(format!("SNAPSHOT_BACKEND must be json or sqlite, got '{}'", s))
                })?
            }
        };

        let snapshot_path = get("SNAPSHOT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| network.default_snapshot_path(snapshot_backend));

        let tokens_path = match &overrides.tokens_path {
            Some(path) => path.clone(),
            None => PathBuf::from(get("TOKENS_PATH").unwrap_or_else(|| "tokens.json".to_string())),
        };

        let window_secs: u64 = parse_or(&get, "WINDOW_SECS", 300)?;
        if window_secs == 0 {
            return Err(ConfigError::InvalidValue("WINDOW_SECS must be > 0".to_string()));
        }

        let spike_threshold_pct: f64 = parse_or(&get, "SPIKE_PCT", 10.0)?;
        if !spike_threshold_pct.is_finite() || spike_threshold_pct < 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "SPIKE_PCT must be a finite number >= 0, got {}",
                spike_threshold_pct
            )));
        }

        let base_decimals = parse_decimals(&get, "BASE_DECIMALS")?;
        let token_decimals = parse_decimals(&get, "TOKEN_DECIMALS")?;

        let lookback_blocks: u64 = parse_or(&get, "LOOKBACK_BLOCKS", 200)?;
        let mode_str = overrides
            .from_block_mode
            .clone()
            .or_else(|| get("FROM_BLOCK_MODE"))
            .unwrap_or_else(|| "timestamp".to_string());
        let from_block_mode = FromBlockMode::parse(&mode_str, lookback_blocks).ok_or_else(|| {
            ConfigError::InvalidValue(format!(
                "FROM_BLOCK_MODE must be timestamp or lookback, got '{}'",
                mode_str
            ))
        })?;

        let search_initial_step: u64 = parse_or(&get, "SEARCH_INITIAL_STEP", DEFAULT_INITIAL_STEP)?;
        if search_initial_step == 0 {
            return Err(ConfigError::InvalidValue("SEARCH_INITIAL_STEP must be > 0".to_string()));
        }

        let max_concurrency = parse_or::<usize, _>(&get, "MAX_CONCURRENCY", 8)?.max(1);

        let retry = RetryPolicy {
            initial_delay_ms: parse_or(&get, "RPC_RETRY_INITIAL_MS", 250)?,
            max_delay_ms: RETRY_MAX_DELAY_MS,
            max_retries: parse_or(&get, "RPC_MAX_RETRIES", 3)?,
        };

        let token_topic_index: usize = parse_or(&get, "TOKEN_TOPIC_INDEX", 2)?;
        if !(1..=3).contains(&token_topic_index) {
            return Err(ConfigError::InvalidValue(format!(
                "TOKEN_TOPIC_INDEX must be 1..=3, got {}",
                token_topic_index
            )));
        }

        let quote_result_word: usize = parse_or(&get, "QUOTE_RESULT_WORD", 1)?;
        if quote_result_word > MAX_QUOTE_RESULT_WORD {
            return Err(ConfigError::InvalidValue(format!(
                "QUOTE_RESULT_WORD must be 0..={}, got {}",
                MAX_QUOTE_RESULT_WORD, quote_result_word
            )));
        }

        let event_data_fields: Vec<String> = get("EVENT_DATA_FIELDS")
            .unwrap_or_else(|| "amountIn,amountOut".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let contracts = CurveContracts {
            curve_address: require("CURVE_ADDRESS")?,
            buy_topic: require("CURVE_BUY_TOPIC")?,
            sell_topic: require("CURVE_SELL_TOPIC")?,
            token_topic_index,
            event_data_fields,
            lens_address: require("LENS_ADDRESS")?,
            quote_selector: require("LENS_QUOTE_SELECTOR")?,
            quote_result_word,
        };

        let rpc = RpcSettings {
            url,
            timeout_ms: parse_or(&get, "RPC_TIMEOUT_MS", 10_000)?,
            contracts,
        };

        Ok(Self {
            network,
            tokens_path,
            snapshot_backend,
            snapshot_path,
            window_secs,
            spike_threshold_pct,
            base_decimals,
            token_decimals,
            from_block_mode,
            search_initial_step,
            max_concurrency,
            retry,
            rpc,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(format!("{}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_decimals<G>(get: &G, key: &str) -> Result<u32, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let decimals: u32 = parse_or(get, key, 18)?;
    if decimals > MAX_DECIMALS {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be <= {}, got {}",
            key, MAX_DECIMALS, decimals
        )));
    }
    Ok(decimals)
}
