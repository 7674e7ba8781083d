//! Run report wire types
//!
//! Serialized as one JSON document on stdout. Block numbers are decimal
//! strings; `*5m` names are kept for compatibility with existing consumers
//! regardless of the configured window length.

use crate::aggregator_core::snapshot_backend::as_decimal_string;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub window_sec: u64,
    pub from_block_mode: String,
    #[serde(serialize_with = "as_decimal_string")]
    pub from_block: u64,
    #[serde(serialize_with = "as_decimal_string")]
    pub to_block: u64,
    /// RFC 3339, UTC
    pub generated_at: String,
    pub spike_threshold_pct: f64,
    pub kpis: GlobalKpis,
    pub per_token: Vec<TokenKpi>,
}

impl RunReport {
    pub fn token(&self, address: &str) -> Option<&TokenKpi> {
        self.per_token.iter().find(|t| t.token == address)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalKpis {
    #[serde(rename = "totalTrades5m")]
    pub total_trades: u64,
    #[serde(rename = "totalVolumeMon5m")]
    pub total_volume: f64,
    /// `None` when no token produced trade metrics
    #[serde(rename = "mostActiveToken5m")]
    pub most_active_token: Option<String>,
    #[serde(rename = "mostActiveTradeCount5m")]
    pub most_active_trade_count: Option<u64>,
    #[serde(rename = "spikeTokenCount5m")]
    pub spike_token_count: u64,
}

/// Per-token result. A token whose fetch or quote failed keeps its slot:
/// the failed half is null and the failure is described in `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenKpi {
    pub token: String,
    #[serde(rename = "buyCount5m")]
    pub buy_count: Option<u64>,
    #[serde(rename = "sellCount5m")]
    pub sell_count: Option<u64>,
    #[serde(rename = "tradeCount5m")]
    pub trade_count: Option<u64>,
    #[serde(rename = "volumeMon5m")]
    pub volume: Option<f64>,
    #[serde(rename = "priceMonPerToken")]
    pub price_per_token: Option<f64>,
    #[serde(rename = "deltaPct")]
    pub delta_pct: Option<f64>,
    pub spike: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_layout() {
        let report = RunReport {
            window_sec: 300,
            from_block_mode: "timestamp".to_string(),
            from_block: 100,
            to_block: 300,
            generated_at: "2025-01-01T00:00:00.000Z".to_string(),
            spike_threshold_pct: 10.0,
            kpis: GlobalKpis {
                total_trades: 2,
                total_volume: 1.5,
                most_active_token: Some("0xAA".to_string()),
                most_active_trade_count: Some(2),
                spike_token_count: 0,
            },
            per_token: vec![
                TokenKpi {
                    token: "0xAA".to_string(),
                    buy_count: Some(1),
                    sell_count: Some(1),
                    trade_count: Some(2),
                    volume: Some(1.5),
                    price_per_token: None,
                    delta_pct: None,
                    spike: false,
                    error: None,
                },
                TokenKpi {
                    token: "0xBB".to_string(),
                    buy_count: None,
                    sell_count: None,
                    trade_count: None,
                    volume: None,
                    price_per_token: None,
                    delta_pct: None,
                    spike: false,
                    error: Some("Remote unavailable: timeout".to_string()),
                },
            ],
        };

        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["windowSec"], json!(300));
        assert_eq!(value["fromBlockMode"], json!("timestamp"));
        assert_eq!(value["fromBlock"], json!("100"));
        assert_eq!(value["toBlock"], json!("300"));
        assert_eq!(value["spikeThresholdPct"], json!(10.0));
        assert_eq!(
            value["kpis"],
            json!({
                "totalTrades5m": 2,
                "totalVolumeMon5m": 1.5,
                "mostActiveToken5m": "0xAA",
                "mostActiveTradeCount5m": 2,
                "spikeTokenCount5m": 0
            })
        );
        assert_eq!(
            value["perToken"][0],
            json!({
                "token": "0xAA",
                "buyCount5m": 1,
                "sellCount5m": 1,
                "tradeCount5m": 2,
                "volumeMon5m": 1.5,
                "priceMonPerToken": null,
                "deltaPct": null,
                "spike": false
            })
        );
        assert_eq!(value["perToken"][1]["error"], json!("Remote unavailable: timeout"));
        assert!(value["perToken"][1]["tradeCount5m"].is_null());

        assert_eq!(report.token("0xBB").map(|t| t.spike), Some(false));
        assert!(report.token("0xCC").is_none());
    }
}
