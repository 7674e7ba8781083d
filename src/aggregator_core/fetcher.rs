//! Trade event retrieval for a block range

use super::normalizer::{RawEvent, TradeKind};
use super::window::BlockRange;
use crate::chain::{ChainError, EventSource};
use std::sync::Arc;

/// Stateless, read-only view over an [`EventSource`].
///
/// Filters what the source returns down to the requested kinds and tokens, so
/// a loose source (e.g. one that ignores the token filter) cannot leak foreign
/// events into a token's aggregate.
#[derive(Clone)]
pub struct EventFetcher {
    source: Arc<dyn EventSource>,
}

impl EventFetcher {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self { source }
    }

    pub async fn fetch_events(
        &self,
        tokens: &[String],
        range: BlockRange,
        kinds: &[TradeKind],
    ) -> Result<Vec<RawEvent>, ChainError> {
        if tokens.is_empty() || kinds.is_empty() {
            return Ok(Vec::new());
        }

        let raw = self
            .source
            .query_trade_events(tokens, range.from_block, range.to_block, kinds)
            .await?;
        let total = raw.len();

        let events: Vec<RawEvent> = raw
            .into_iter()
            .filter(|event| event.kind().is_some_and(|kind| kinds.contains(&kind)))
            .filter(|event| match event.token() {
                Some(token) => tokens.iter().any(|t| t.eq_ignore_ascii_case(token)),
                None => true,
            })
            .collect();

        if events.len() < total {
            log::debug!(
                "Dropped {} of {} events outside requested kinds/tokens (blocks {}..={})",
                total - events.len(),
                total,
                range.from_block,
                range.to_block
            );
        }

        Ok(events)
    }

    /// Buy and sell events for a single token
    pub async fn fetch_token_trades(&self, token: &str, range: BlockRange) -> Result<Vec<RawEvent>, ChainError> {
        self.fetch_events(&[token.to_string()], range, &TradeKind::all()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StaticEvents {
        events: Vec<RawEvent>,
        calls: Mutex<Vec<(Vec<String>, u64, u64)>>,
    }

    #[async_trait]
    impl EventSource for StaticEvents {
        async fn query_trade_events(
            &self,
            tokens: &[String],
            from_block: u64,
            to_block: u64,
            _kinds: &[TradeKind],
        ) -> Result<Vec<RawEvent>, ChainError> {
            self.calls.lock().unwrap().push((tokens.to_vec(), from_block, to_block));
            Ok(self.events.clone())
        }
    }

    struct FailingEvents;

    #[async_trait]
    impl EventSource for FailingEvents {
        async fn query_trade_events(
            &self,
            _tokens: &[String],
            _from_block: u64,
            _to_block: u64,
            _kinds: &[TradeKind],
        ) -> Result<Vec<RawEvent>, ChainError> {
            Err(ChainError::Unavailable("HTTP 502".to_string()))
        }
    }

    fn range() -> BlockRange {
        BlockRange::new(100, 300).unwrap()
    }

    #[tokio::test]
    async fn test_filters_kinds_and_foreign_tokens() {
        let source = Arc::new(StaticEvents {
            events: vec![
                RawEvent::new().with("eventType", "Buy").with("token", "0xaa"),
                RawEvent::new().with("eventType", "Sell").with("token", "0xAA"),
                RawEvent::new().with("eventType", "Buy").with("token", "0xBB"),
                RawEvent::new().with("eventType", "Create").with("token", "0xAA"),
                RawEvent::new().with("eventType", "Sell"),
            ],
            calls: Mutex::new(Vec::new()),
        });
        let fetcher = EventFetcher::new(source.clone());

        let events = fetcher
            .fetch_events(&["0xAA".to_string()], range(), &[TradeKind::Buy, TradeKind::Sell])
            .await
            .unwrap();
        assert_eq!(events.len(), 3);

        let buys_only = fetcher
            .fetch_events(&["0xAA".to_string()], range(), &[TradeKind::Buy])
            .await
            .unwrap();
        assert_eq!(buys_only.len(), 1);

        let calls = source.calls.lock().unwrap();
        assert_eq!(calls[0], (vec!["0xAA".to_string()], 100, 300));
    }

    #[tokio::test]
    async fn test_replay_is_identical() {
        let source = Arc::new(StaticEvents {
            events: vec![RawEvent::new().with("eventType", "Buy").with("amountIn", "5")],
            calls: Mutex::new(Vec::new()),
        });
        let fetcher = EventFetcher::new(source);

        let first = fetcher.fetch_token_trades("0xAA", range()).await.unwrap();
        let second = fetcher.fetch_token_trades("0xAA", range()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_source_failure_is_surfaced() {
        let fetcher = EventFetcher::new(Arc::new(FailingEvents));
        let result = fetcher.fetch_token_trades("0xAA", range()).await;
        assert_eq!(result, Err(ChainError::Unavailable("HTTP 502".to_string())));
    }

    #[tokio::test]
    async fn test_empty_request_skips_source() {
        let fetcher = EventFetcher::new(Arc::new(FailingEvents));
        let events = fetcher.fetch_events(&[], range(), &TradeKind::all()).await.unwrap();
        assert!(events.is_empty());
    }
}
