//! Price approximation and spike detection against the previous snapshot

use super::window::format_units;

pub const DEFAULT_SPIKE_THRESHOLD_PCT: f64 = 10.0;

/// Price in base currency per token, from a buy quote of one whole base unit.
///
/// `None` when the quote received nothing: the price is undefined, not infinite.
pub fn price_from_quote(tokens_out: u128, token_decimals: u32) -> Option<f64> {
    let tokens_per_base = format_units(tokens_out, token_decimals);
    if tokens_per_base > 0.0 {
        Some(1.0 / tokens_per_base)
    } else {
        None
    }
}

/// Per-run price classification of a token.
///
/// Only the numeric snapshot persists; `SpikeDetected` is recomputed every run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceState {
    NoPriorData,
    HasPriorData { delta_pct: Option<f64> },
    SpikeDetected { delta_pct: f64 },
}

impl PriceState {
    pub fn delta_pct(&self) -> Option<f64> {
        match self {
            PriceState::NoPriorData => None,
            PriceState::HasPriorData { delta_pct } => *delta_pct,
            PriceState::SpikeDetected { delta_pct } => Some(*delta_pct),
        }
    }

    pub fn is_spike(&self) -> bool {
        matches!(self, PriceState::SpikeDetected { .. })
    }
}

pub struct SpikeDetector {
    threshold_pct: f64,
}

impl SpikeDetector {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SPIKE_THRESHOLD_PCT)
    }

    /// Relative change in percent; defined only for a current price and a
    /// finite, strictly positive previous price.
    pub fn delta_pct(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
        let previous = previous.filter(|p| p.is_finite() && *p > 0.0)?;
        let current = current.filter(|c| c.is_finite())?;
        Some((current - previous) / previous * 100.0)
    }

    /// Spike when `|delta| >= threshold` (boundary inclusive)
    pub fn is_spike(&self, delta_pct: Option<f64>) -> bool {
        delta_pct.is_some_and(|d| d.abs() >= self.threshold_pct)
    }

    pub fn classify(&self, current: Option<f64>, previous: Option<f64>) -> PriceState {
        if !previous.is_some_and(|p| p.is_finite() && p > 0.0) {
            return PriceState::NoPriorData;
        }

        match Self::delta_pct(current, previous) {
            Some(delta_pct) if self.is_spike(Some(delta_pct)) => PriceState::SpikeDetected { delta_pct },
            delta_pct => PriceState::HasPriorData { delta_pct },
        }
    }
}
