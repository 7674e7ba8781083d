//! # KPI Run Pipeline
//!
//! Everything around the core aggregation that turns it into one run:
//!
//! - `config` - `RunConfig` from environment variables and CLI flags
//! - `tokens` - token list file parsing
//! - `engine` - `KpiEngine`, the orchestrator of a single run
//! - `report` - `RunReport` wire types written to stdout
//! - `error` - `RunError` and process exit codes

pub mod config;
pub mod engine;
pub mod error;
pub mod report;
pub mod tokens;

pub use config::{CliOverrides, ConfigError, FromBlockMode, Network, RunConfig};
pub use engine::{EngineSettings, KpiEngine};
pub use error::RunError;
pub use report::{GlobalKpis, RunReport, TokenKpi};
pub use tokens::{load_token_file, parse_token_list, TokenListError};
