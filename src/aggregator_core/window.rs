//! Block-range window and per-token trade aggregation

use super::normalizer::{RawEvent, TradeKind};
use crate::chain::ChainError;
use serde::{Deserialize, Serialize};

/// Inclusive block range `[from_block, to_block]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from_block: u64,
    pub to_block: u64,
}

impl BlockRange {
    pub fn new(from_block: u64, to_block: u64) -> Result<Self, ChainError> {
        if from_block > to_block {
            return Err(ChainError::InvalidRange {
                from: from_block,
                to: to_block,
            });
        }
        Ok(Self { from_block, to_block })
    }

    /// Fixed block-count lookback ending at `latest`
    pub fn lookback(latest: u64, blocks: u64) -> Self {
        Self {
            from_block: latest.saturating_sub(blocks),
            to_block: latest,
        }
    }

    pub fn block_count(&self) -> u64 {
        (self.to_block - self.from_block).saturating_add(1)
    }
}

/// Trade counts and base-currency volume for one token over one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenMetrics {
    pub buy_count: u64,
    pub sell_count: u64,
    /// Volume in integer base units (wei-like); never converted until report time
    pub volume_base_units: u128,
}

impl TokenMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate one token's events. Pure: same events, same result.
    pub fn aggregate<'a>(events: impl IntoIterator<Item = &'a RawEvent>) -> Self {
        let mut metrics = Self::new();
        for event in events {
            metrics.add_event(event);
        }
        metrics
    }

    pub fn add_event(&mut self, event: &RawEvent) {
        let Some(kind) = event.kind() else {
            log::debug!("Skipping unclassified event: {:?}", event.fields());
            return;
        };

        match kind {
            TradeKind::Buy => self.buy_count += 1,
            TradeKind::Sell => self.sell_count += 1,
        }

        let amount = event.pick_amount(kind.amount_fields());
        self.volume_base_units = self.volume_base_units.saturating_add(amount);
    }

    pub fn trade_count(&self) -> u64 {
        self.buy_count + self.sell_count
    }
}

/// Convert integer base units to a display decimal using a fixed-point scale.
///
/// Output only; the result must not feed further arithmetic.
pub fn format_units(value: u128, decimals: u32) -> f64 {
    let Some(scale) = 10_u128.checked_pow(decimals) else {
        return 0.0;
    };
    let whole = value / scale;
    let fraction = value % scale;
    whole as f64 + fraction as f64 / scale as f64
}

/// One whole unit at `decimals` scale (`10^decimals`), saturating at `u128::MAX`
pub fn one_unit(decimals: u32) -> u128 {
    10_u128.checked_pow(decimals).unwrap_or(u128::MAX)
}
