//! KPI Engine - Orchestration of one windowed run
//!
//! ## Architecture
//!
//! ```text
//! latest block (retried)
//!     ↓
//! BlockRange (timestamp binary search or fixed lookback)
//!     ↓
//! previous PriceSnapshot (load once, best-effort)
//!     ↓
//! per-token tasks, bounded by a semaphore:
//!     EventFetcher → TokenMetrics::aggregate
//!     QuoteSource  → price_from_quote
//!     ↓
//! reduce in input token order (totals, most active, spikes)
//!     ↓
//! PriceSnapshot save (once; failure logged, report still returned)
//! ```
//!
//! The snapshot read happens before any token task starts and the write after
//! every task has been joined. Tasks share nothing mutable; each returns its
//! own outcome and the reduction is a plain fold over the joined results.

use super::config::{FromBlockMode, RunConfig};
use super::error::RunError;
use super::report::{GlobalKpis, RunReport, TokenKpi};
use crate::aggregator_core::window::one_unit;
use crate::aggregator_core::{
    format_units, price_from_quote, BlockRange, BlockTimeResolver, EventFetcher, PriceEntry,
    PriceSnapshot, SnapshotStore, SpikeDetector, TokenMetrics,
};
use crate::chain::{retry_remote, BlockSource, ChainError, EventSource, QuoteSource, RetryPolicy};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub window_secs: u64,
    pub spike_threshold_pct: f64,
    pub base_decimals: u32,
    pub token_decimals: u32,
    pub from_block_mode: FromBlockMode,
    pub search_initial_step: u64,
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            window_secs: 300,
            spike_threshold_pct: 10.0,
            base_decimals: 18,
            token_decimals: 18,
            from_block_mode: FromBlockMode::Timestamp,
            search_initial_step: 500,
            max_concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&RunConfig> for EngineSettings {
    fn from(config: &RunConfig) -> Self {
        Self {
            window_secs: config.window_secs,
            spike_threshold_pct: config.spike_threshold_pct,
            base_decimals: config.base_decimals,
            token_decimals: config.token_decimals,
            from_block_mode: config.from_block_mode,
            search_initial_step: config.search_initial_step,
            max_concurrency: config.max_concurrency,
            retry: config.retry,
        }
    }
}

/// What one token task produced. Either half may have failed independently.
struct TokenOutcome {
    metrics: Result<TokenMetrics, ChainError>,
    price: Result<Option<f64>, ChainError>,
}

pub struct KpiEngine {
    blocks: Arc<dyn BlockSource>,
    fetcher: EventFetcher,
    quotes: Arc<dyn QuoteSource>,
    store: Arc<dyn SnapshotStore>,
    settings: EngineSettings,
    detector: SpikeDetector,

    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl KpiEngine {
    pub fn new(
        blocks: Arc<dyn BlockSource>,
        events: Arc<dyn EventSource>,
        quotes: Arc<dyn QuoteSource>,
        store: Arc<dyn SnapshotStore>,
        settings: EngineSettings,
    ) -> Self {
        Self::new_with_timestamp_fn(
            blocks,
            events,
            quotes,
            store,
            settings,
            Box::new(|| Utc::now().timestamp()),
        )
    }

    pub fn new_with_timestamp_fn(
        blocks: Arc<dyn BlockSource>,
        events: Arc<dyn EventSource>,
        quotes: Arc<dyn QuoteSource>,
        store: Arc<dyn SnapshotStore>,
        settings: EngineSettings,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        let detector = SpikeDetector::new(settings.spike_threshold_pct);
        Self {
            blocks,
            fetcher: EventFetcher::new(events),
            quotes,
            store,
            settings,
            detector,
            now_fn,
        }
    }

    /// Execute one run over `tokens` (already normalized, input order preserved).
    ///
    /// Fails only when the block range cannot be established. Per-token
    /// failures are recorded on the token's report entry.
    pub async fn run(&self, tokens: &[String]) -> Result<RunReport, RunError> {
        let now = (self.now_fn)();
        let generated_at = DateTime::<Utc>::from_timestamp(now, 0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        let blocks = self.blocks.clone();
        let latest = retry_remote(self.settings.retry, "eth_blockNumber", || blocks.latest_block_number()).await?;
        let range = self.resolve_range(now, latest).await?;

        log::info!(
            "🔎 Window {}s → blocks {}..={} ({} blocks, {} mode), {} tokens",
            self.settings.window_secs,
            range.from_block,
            range.to_block,
            range.block_count(),
            self.settings.from_block_mode.as_str(),
            tokens.len()
        );

        let previous = self.store.load().await;

        let outcomes = self.process_tokens(tokens, range).await;
        let (kpis, per_token, prices) = self.reduce(tokens, outcomes, &previous, now);

        log::info!(
            "📊 {} trades, volume {:.6}, most active {}, {} spike(s)",
            kpis.total_trades,
            kpis.total_volume,
            kpis.most_active_token.as_deref().unwrap_or("-"),
            kpis.spike_token_count
        );

        let snapshot = PriceSnapshot {
            updated_at: Some(generated_at.clone()),
            window_sec: self.settings.window_secs,
            from_block: range.from_block,
            to_block: range.to_block,
            spike_threshold_pct: self.settings.spike_threshold_pct,
            prices,
        };
        match self.store.save(&snapshot).await {
            Ok(()) => log::info!(
                "💾 Saved {} prices ({} backend)",
                snapshot.prices.len(),
                self.store.backend_type()
            ),
            Err(e) => log::error!(
                "❌ Failed to save price snapshot ({} backend): {}",
                self.store.backend_type(),
                e
            ),
        }

        Ok(RunReport {
            window_sec: self.settings.window_secs,
            from_block_mode: self.settings.from_block_mode.as_str().to_string(),
            from_block: range.from_block,
            to_block: range.to_block,
            generated_at,
            spike_threshold_pct: self.settings.spike_threshold_pct,
            kpis,
            per_token,
        })
    }

    async fn resolve_range(&self, now: i64, latest: u64) -> Result<BlockRange, ChainError> {
        match self.settings.from_block_mode {
            FromBlockMode::Lookback(blocks) => Ok(BlockRange::lookback(latest, blocks)),
            FromBlockMode::Timestamp => {
                let cutoff = now.saturating_sub(i64::try_from(self.settings.window_secs).unwrap_or(i64::MAX));
                let mut resolver = BlockTimeResolver::with_settings(
                    self.blocks.clone(),
                    self.settings.search_initial_step,
                    self.settings.retry,
                );
                let from_block = resolver.resolve_block_at_or_before(cutoff, latest).await?;
                BlockRange::new(from_block, latest)
            }
        }
    }

    /// Run every token's fetch + quote concurrently (bounded), returning
    /// outcomes in input order whatever the completion order.
    async fn process_tokens(&self, tokens: &[String], range: BlockRange) -> Vec<TokenOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let base_amount = one_unit(self.settings.base_decimals);
        let token_decimals = self.settings.token_decimals;

        let mut handles = Vec::with_capacity(tokens.len());
        for token in tokens {
            let semaphore = semaphore.clone();
            let fetcher = self.fetcher.clone();
            let quotes = self.quotes.clone();
            let token = token.clone();

            handles.push(tokio::spawn(async move {
                // The semaphore is never closed, so acquire cannot fail
                let _permit = semaphore.acquire_owned().await.ok();

                let (metrics, price) = tokio::join!(
                    async {
                        let events = fetcher.fetch_token_trades(&token, range).await?;
                        Ok::<_, ChainError>(TokenMetrics::aggregate(&events))
                    },
                    async {
                        let tokens_out = quotes.quote_buy(&token, base_amount).await?;
                        Ok::<_, ChainError>(price_from_quote(tokens_out, token_decimals))
                    }
                );
                TokenOutcome { metrics, price }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (token, handle) in tokens.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let err = ChainError::Unavailable(format!("token task aborted: {}", e));
                    log::error!("❌ Task for {} did not complete: {}", token, e);
                    TokenOutcome {
                        metrics: Err(err.clone()),
                        price: Err(err),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    fn reduce(
        &self,
        tokens: &[String],
        outcomes: Vec<TokenOutcome>,
        previous: &PriceSnapshot,
        now: i64,
    ) -> (GlobalKpis, Vec<TokenKpi>, BTreeMap<String, PriceEntry>) {
        let base_decimals = self.settings.base_decimals;

        let mut total_trades: u64 = 0;
        let mut total_volume_units: u128 = 0;
        let mut most_active: Option<(&str, u64)> = None;
        let mut spike_token_count: u64 = 0;
        let mut per_token = Vec::with_capacity(tokens.len());
        let mut prices = BTreeMap::new();

        for (token, outcome) in tokens.iter().zip(outcomes) {
            let mut errors = Vec::new();

            let metrics = match outcome.metrics {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    log::warn!("⚠️  Event fetch failed for {}: {}", token, e);
                    errors.push(format!("events: {}", e));
                    None
                }
            };
            let price = match outcome.price {
                Ok(price) => price,
                Err(e) => {
                    log::warn!("⚠️  Quote failed for {}: {}", token, e);
                    errors.push(format!("quote: {}", e));
                    None
                }
            };

            if let Some(m) = &metrics {
                let trades = m.trade_count();
                total_trades += trades;
                total_volume_units = total_volume_units.saturating_add(m.volume_base_units);
                // Strict comparison keeps the first-seen token on ties
                if most_active.map_or(true, |(_, best)| trades > best) {
                    most_active = Some((token.as_str(), trades));
                }
            }

            let state = self.detector.classify(price, previous.previous_price(token));
            if state.is_spike() {
                spike_token_count += 1;
                log::info!("🚀 Price spike on {}: {:+.2}%", token, state.delta_pct().unwrap_or(0.0));
            }

            prices.insert(
                token.clone(),
                PriceEntry {
                    price_per_token: price,
                    ts: now,
                },
            );

            per_token.push(TokenKpi {
                token: token.clone(),
                buy_count: metrics.map(|m| m.buy_count),
                sell_count: metrics.map(|m| m.sell_count),
                trade_count: metrics.map(|m| m.trade_count()),
                volume: metrics.map(|m| format_units(m.volume_base_units, base_decimals)),
                price_per_token: price,
                delta_pct: state.delta_pct(),
                spike: state.is_spike(),
                error: if errors.is_empty() { None } else { Some(errors.join("; ")) },
            });
        }

        let kpis = GlobalKpis {
            total_trades,
            total_volume: format_units(total_volume_units, base_decimals),
            most_active_token: most_active.map(|(token, _)| token.to_string()),
            most_active_trade_count: most_active.map(|(_, count)| count),
            spike_token_count,
        };

        (kpis, per_token, prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator_core::normalizer::{RawEvent, TradeKind};
    use crate::aggregator_core::SnapshotError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const ONE: u128 = 1_000_000_000_000_000_000;

    /// One block per second starting at t=1000
    struct LinearChain {
        latest: u64,
        latest_calls: AtomicUsize,
        fail_first_latest: usize,
    }

    #[async_trait]
    impl BlockSource for LinearChain {
        async fn latest_block_number(&self) -> Result<u64, ChainError> {
            let call = self.latest_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first_latest {
                return Err(ChainError::Unavailable("connection reset".to_string()));
            }
            Ok(self.latest)
        }

        async fn block_timestamp(&self, block_number: u64) -> Result<i64, ChainError> {
            Ok(1000 + block_number as i64)
        }
    }

    struct MapEvents(HashMap<String, Vec<RawEvent>>);

    #[async_trait]
    impl EventSource for MapEvents {
        async fn query_trade_events(
            &self,
            tokens: &[String],
            _from_block: u64,
            _to_block: u64,
            _kinds: &[TradeKind],
        ) -> Result<Vec<RawEvent>, ChainError> {
            let mut out = Vec::new();
            for token in tokens {
                if token == "0xDEAD" {
                    return Err(ChainError::Rpc { code: -32005, message: "query timeout".to_string() });
                }
                out.extend(self.0.get(token).cloned().unwrap_or_default());
            }
            Ok(out)
        }
    }

    struct FixedQuotes(HashMap<String, u128>);

    #[async_trait]
    impl QuoteSource for FixedQuotes {
        async fn quote_buy(&self, token: &str, _base_amount: u128) -> Result<u128, ChainError> {
            self.0
                .get(token)
                .copied()
                .ok_or_else(|| ChainError::Rpc { code: 3, message: "execution reverted".to_string() })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        snapshot: Mutex<Option<PriceSnapshot>>,
        fail_save: bool,
    }

    #[async_trait]
    impl SnapshotStore for MemoryStore {
        async fn try_load(&self) -> Result<Option<PriceSnapshot>, SnapshotError> {
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn save(&self, snapshot: &PriceSnapshot) -> Result<(), SnapshotError> {
            if self.fail_save {
                return Err(SnapshotError::Database("disk I/O error".to_string()));
            }
            *self.snapshot.lock().unwrap() = Some(snapshot.clone());
            Ok(())
        }

        fn backend_type(&self) -> &'static str {
            "memory"
        }
    }

    fn buy(token: &str, amount: u128) -> RawEvent {
        RawEvent::new()
            .with("eventType", "Buy")
            .with("token", token)
            .with("amountIn", amount.to_string())
    }

    fn sell(token: &str, amount: u128) -> RawEvent {
        RawEvent::new()
            .with("eventType", "Sell")
            .with("token", token)
            .with("amountOut", amount.to_string())
    }

    fn create_test_engine(
        events: HashMap<String, Vec<RawEvent>>,
        quotes: HashMap<String, u128>,
        store: Arc<MemoryStore>,
        settings: EngineSettings,
    ) -> KpiEngine {
        let chain = Arc::new(LinearChain {
            latest: 1000,
            latest_calls: AtomicUsize::new(0),
            fail_first_latest: 0,
        });
        KpiEngine::new_with_timestamp_fn(
            chain,
            Arc::new(MapEvents(events)),
            Arc::new(FixedQuotes(quotes)),
            store,
            settings,
            Box::new(|| 2000),
        )
    }

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_timestamp_mode_range() {
        let engine = create_test_engine(HashMap::new(), HashMap::new(), Arc::new(MemoryStore::default()), EngineSettings::default());

        let report = engine.run(&tokens(&["0xAA"])).await.unwrap();

        // now=2000, window=300 → cutoff 1700 → block 700
        assert_eq!(report.from_block, 700);
        assert_eq!(report.to_block, 1000);
        assert_eq!(report.from_block_mode, "timestamp");
        assert_eq!(report.generated_at, "1970-01-01T00:33:20.000Z");
    }

    #[tokio::test]
    async fn test_lookback_mode_range() {
        let settings = EngineSettings {
            from_block_mode: FromBlockMode::Lookback(200),
            ..EngineSettings::default()
        };
        let engine = create_test_engine(HashMap::new(), HashMap::new(), Arc::new(MemoryStore::default()), settings);

        let report = engine.run(&tokens(&["0xAA"])).await.unwrap();
        assert_eq!((report.from_block, report.to_block), (800, 1000));
        assert_eq!(report.from_block_mode, "lookback");
    }

    #[tokio::test]
    async fn test_aggregates_and_most_active_tie_break() {
        let events = HashMap::from([
            ("0xAA".to_string(), vec![buy("0xAA", ONE), sell("0xAA", ONE / 2)]),
            ("0xBB".to_string(), vec![buy("0xBB", ONE), buy("0xBB", ONE)]),
        ]);
        let engine = create_test_engine(events, HashMap::new(), Arc::new(MemoryStore::default()), EngineSettings::default());

        let report = engine.run(&tokens(&["0xAA", "0xBB"])).await.unwrap();

        assert_eq!(report.kpis.total_trades, 4);
        assert_eq!(report.kpis.total_volume, 3.5);
        assert_eq!(report.kpis.most_active_token.as_deref(), Some("0xAA"));
        assert_eq!(report.kpis.most_active_trade_count, Some(2));
        assert_eq!(report.token("0xBB").unwrap().volume, Some(2.0));
    }

    #[tokio::test]
    async fn test_empty_token_list() {
        let store = Arc::new(MemoryStore::default());
        let engine = create_test_engine(HashMap::new(), HashMap::new(), store.clone(), EngineSettings::default());

        let report = engine.run(&[]).await.unwrap();

        assert!(report.per_token.is_empty());
        assert_eq!(report.kpis.total_trades, 0);
        assert_eq!(report.kpis.most_active_token, None);
        assert_eq!(report.kpis.most_active_trade_count, None);
        assert!(store.snapshot.lock().unwrap().as_ref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated() {
        let events = HashMap::from([("0xAA".to_string(), vec![buy("0xAA", ONE)])]);
        let quotes = HashMap::from([("0xAA".to_string(), 250 * ONE), ("0xDEAD".to_string(), 100 * ONE)]);
        let engine = create_test_engine(events, quotes, Arc::new(MemoryStore::default()), EngineSettings::default());

        let report = engine.run(&tokens(&["0xDEAD", "0xAA"])).await.unwrap();

        let dead = report.token("0xDEAD").unwrap();
        assert_eq!(dead.trade_count, None);
        assert_eq!(dead.volume, None);
        assert_eq!(dead.price_per_token, Some(0.01));
        assert!(dead.error.as_deref().unwrap().starts_with("events: "));

        assert_eq!(report.kpis.total_trades, 1);
        assert_eq!(report.kpis.most_active_token.as_deref(), Some("0xAA"));
    }

    #[tokio::test]
    async fn test_quote_failure_and_zero_quote_give_null_price() {
        let quotes = HashMap::from([("0xBB".to_string(), 0)]);
        let store = Arc::new(MemoryStore::default());
        *store.snapshot.lock().unwrap() = Some(PriceSnapshot {
            prices: BTreeMap::from([
                ("0xAA".to_string(), PriceEntry { price_per_token: Some(1.0), ts: 1 }),
                ("0xBB".to_string(), PriceEntry { price_per_token: Some(1.0), ts: 1 }),
            ]),
            ..PriceSnapshot::default()
        });
        let engine = create_test_engine(HashMap::new(), quotes, store.clone(), EngineSettings::default());

        let report = engine.run(&tokens(&["0xAA", "0xBB"])).await.unwrap();

        for token in ["0xAA", "0xBB"] {
            let kpi = report.token(token).unwrap();
            assert_eq!(kpi.price_per_token, None);
            assert_eq!(kpi.delta_pct, None);
            assert!(!kpi.spike);
            assert_eq!(kpi.trade_count, Some(0));
        }
        assert!(report.token("0xAA").unwrap().error.as_deref().unwrap().starts_with("quote: "));
        assert_eq!(report.token("0xBB").unwrap().error, None);
        assert_eq!(report.kpis.spike_token_count, 0);

        let saved = store.snapshot.lock().unwrap().clone().unwrap();
        assert_eq!(saved.prices.len(), 2);
        assert_eq!(saved.previous_price("0xAA"), None);
        assert_eq!(saved.prices["0xAA"].ts, 2000);
    }

    #[tokio::test]
    async fn test_spike_boundary_is_inclusive() {
        let store = Arc::new(MemoryStore::default());
        *store.snapshot.lock().unwrap() = Some(PriceSnapshot {
            prices: BTreeMap::from([
                ("0xAA".to_string(), PriceEntry { price_per_token: Some(0.01), ts: 1 }),
                ("0xBB".to_string(), PriceEntry { price_per_token: Some(0.01), ts: 1 }),
            ]),
            ..PriceSnapshot::default()
        });
        // 0xAA: 80 tokens per base → 0.0125 (+25%); 0xBB: unchanged at 0.01
        let quotes = HashMap::from([("0xAA".to_string(), 80 * ONE), ("0xBB".to_string(), 100 * ONE)]);
        let engine = create_test_engine(HashMap::new(), quotes, store, EngineSettings::default());

        let report = engine.run(&tokens(&["0xAA", "0xBB"])).await.unwrap();

        let aa = report.token("0xAA").unwrap();
        assert!(aa.spike);
        assert!((aa.delta_pct.unwrap() - 25.0).abs() < 1e-9);
        assert_eq!(report.token("0xBB").unwrap().delta_pct, Some(0.0));
        assert_eq!(report.kpis.spike_token_count, 1);
    }

    #[tokio::test]
    async fn test_snapshot_drops_stale_tokens() {
        let store = Arc::new(MemoryStore::default());
        *store.snapshot.lock().unwrap() = Some(PriceSnapshot {
            prices: BTreeMap::from([("0xOLD".to_string(), PriceEntry { price_per_token: Some(3.0), ts: 1 })]),
            ..PriceSnapshot::default()
        });
        let quotes = HashMap::from([("0xAA".to_string(), 100 * ONE)]);
        let engine = create_test_engine(HashMap::new(), quotes, store.clone(), EngineSettings::default());

        engine.run(&tokens(&["0xAA"])).await.unwrap();

        let saved = store.snapshot.lock().unwrap().clone().unwrap();
        assert_eq!(saved.prices.keys().collect::<Vec<_>>(), vec!["0xAA"]);
        assert_eq!(saved.from_block, 700);
        assert_eq!(saved.to_block, 1000);
        assert_eq!(saved.window_sec, 300);
        assert_eq!(saved.updated_at.as_deref(), Some("1970-01-01T00:33:20.000Z"));
    }

    #[tokio::test]
    async fn test_save_failure_still_returns_report() {
        let store = Arc::new(MemoryStore { fail_save: true, ..MemoryStore::default() });
        let engine = create_test_engine(HashMap::new(), HashMap::new(), store, EngineSettings::default());

        let report = engine.run(&tokens(&["0xAA"])).await.unwrap();
        assert_eq!(report.per_token.len(), 1);
    }

    #[tokio::test]
    async fn test_latest_block_is_retried() {
        let chain = Arc::new(LinearChain {
            latest: 1000,
            latest_calls: AtomicUsize::new(0),
            fail_first_latest: 2,
        });
        let settings = EngineSettings {
            retry: RetryPolicy { initial_delay_ms: 1, max_delay_ms: 2, max_retries: 3 },
            ..EngineSettings::default()
        };
        let engine = KpiEngine::new_with_timestamp_fn(
            chain.clone(),
            Arc::new(MapEvents(HashMap::new())),
            Arc::new(FixedQuotes(HashMap::new())),
            Arc::new(MemoryStore::default()),
            settings,
            Box::new(|| 2000),
        );

        let report = engine.run(&tokens(&["0xAA"])).await.unwrap();
        assert_eq!(report.to_block, 1000);
        assert_eq!(chain.latest_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unreachable_chain_fails_run() {
        let chain = Arc::new(LinearChain {
            latest: 1000,
            latest_calls: AtomicUsize::new(0),
            fail_first_latest: usize::MAX,
        });
        let settings = EngineSettings {
            retry: RetryPolicy::none(),
            ..EngineSettings::default()
        };
        let store = Arc::new(MemoryStore::default());
        let engine = KpiEngine::new_with_timestamp_fn(
            chain,
            Arc::new(MapEvents(HashMap::new())),
            Arc::new(FixedQuotes(HashMap::new())),
            store.clone(),
            settings,
            Box::new(|| 2000),
        );

        let err = engine.run(&tokens(&["0xAA"])).await.unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(store.snapshot.lock().unwrap().is_none());
    }
}
