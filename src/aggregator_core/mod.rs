//! Aggregator Core - Windowed Trade KPI Engine
//!
//! Pure and near-pure building blocks for one KPI run over a trailing window.
//!
//! # Architecture
//!
//! ```text
//! BlockSource → BlockTimeResolver (window → [fromBlock, toBlock])
//!     ↓
//! EventSource → EventFetcher (Buy/Sell RawEvents per token)
//!     ↓
//! TokenMetrics::aggregate (counts, base-unit volume)
//!     ↓
//! QuoteSource → price_from_quote → SpikeDetector (vs previous snapshot)
//!     ↓
//! PriceSnapshotStore → JSON file or SQLite backend
//! ```

pub mod detector;
pub mod fetcher;
pub mod json_store;
pub mod normalizer;
pub mod resolver;
pub mod snapshot_backend;
pub mod sqlite_store;
pub mod store;
pub mod window;

pub use detector::{price_from_quote, PriceState, SpikeDetector};
pub use fetcher::EventFetcher;
pub use json_store::JsonSnapshotStore;
pub use normalizer::{RawEvent, TradeKind};
pub use resolver::BlockTimeResolver;
pub use snapshot_backend::{PriceEntry, PriceSnapshot, SnapshotError, SnapshotStore};
pub use sqlite_store::SqliteSnapshotStore;
pub use store::{PriceSnapshotStore, SnapshotBackend};
pub use window::{format_units, BlockRange, TokenMetrics};
