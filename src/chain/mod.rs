//! Chain collaborators
//!
//! The aggregator never talks to a node directly. It consumes three narrow
//! capabilities, each behind an `async_trait` so the engine can be driven by
//! the JSON-RPC client in production and by in-memory mocks in tests:
//!
//! ```text
//! BlockSource  → latest block number, block timestamp
//! EventSource  → buy/sell trade events for tokens in a block range
//! QuoteSource  → hypothetical buy quote (token units for a base amount)
//! ```

pub mod backoff;
pub mod rpc;

use crate::aggregator_core::normalizer::{RawEvent, TradeKind};
use async_trait::async_trait;

pub use backoff::{retry_remote, ExponentialBackoff, MaxRetriesExceeded, RetryPolicy};
pub use rpc::{CurveContracts, JsonRpcClient, RpcSettings};

#[derive(Debug, Clone, PartialEq)]
pub enum ChainError {
    /// Endpoint unreachable, timed out, or answered with a non-2xx status
    Unavailable(String),
    /// JSON-RPC `error` member
    Rpc { code: i64, message: String },
    /// Response did not have the expected shape
    Decode(String),
    MissingBlock(u64),
    InvalidRange { from: u64, to: u64 },
}

impl ChainError {
    /// Only transport-level failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Unavailable(_))
    }
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::Unavailable(msg) => write!(f, "Remote unavailable: {}", msg),
            ChainError::Rpc { code, message } => write!(f, "RPC error {}: {}", code, message),
            ChainError::Decode(msg) => write!(f, "Decode error: {}", msg),
            ChainError::MissingBlock(n) => write!(f, "Block {} not found", n),
            ChainError::InvalidRange { from, to } => {
                write!(f, "Invalid block range: {} > {}", from, to)
            }
        }
    }
}

impl std::error::Error for ChainError {}

#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn latest_block_number(&self) -> Result<u64, ChainError>;

    /// Block timestamp in epoch seconds
    async fn block_timestamp(&self, block_number: u64) -> Result<i64, ChainError>;
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Raw trade event records for `tokens` within `[from_block, to_block]`.
    ///
    /// Must be read-only and safe to replay for a fixed range.
    async fn query_trade_events(
        &self,
        tokens: &[String],
        from_block: u64,
        to_block: u64,
        kinds: &[TradeKind],
    ) -> Result<Vec<RawEvent>, ChainError>;
}

#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Token base units received for `base_amount` base-currency units in a hypothetical buy
    async fn quote_buy(&self, token: &str, base_amount: u128) -> Result<u128, ChainError>;
}
