//! EVM JSON-RPC client
//!
//! Implements the three chain capabilities over plain HTTP JSON-RPC 2.0:
//!
//! - `eth_blockNumber` / `eth_getBlockByNumber` for [`BlockSource`]
//! - `eth_getLogs` on the curve contract for [`EventSource`]
//! - `eth_call` on the lens contract for [`QuoteSource`]
//!
//! Logs are decoded into loose [`RawEvent`] records: `eventType` from topic0,
//! `token` from the configured indexed topic, and one field per 32-byte data
//! word named by `event_data_fields`.

use super::{BlockSource, ChainError, EventSource, QuoteSource};
use crate::aggregator_core::normalizer::{RawEvent, TradeKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const WORD_BYTES: usize = 32;

/// Contract addresses and ABI layout of the bonding-curve venue
#[derive(Debug, Clone, PartialEq)]
pub struct CurveContracts {
    pub curve_address: String,
    pub buy_topic: String,
    pub sell_topic: String,
    /// Indexed topic carrying the token address (>= 1)
    pub token_topic_index: usize,
    /// Names for consecutive data words of a trade log
    pub event_data_fields: Vec<String>,
    pub lens_address: String,
    /// 4-byte selector of `quote(address token, uint256 amountIn, bool isBuy)`
    pub quote_selector: String,
    /// Return word holding the received amount
    pub quote_result_word: usize,
}

impl CurveContracts {
    fn topic_for(&self, kind: TradeKind) -> &str {
        match kind {
            TradeKind::Buy => &self.buy_topic,
            TradeKind::Sell => &self.sell_topic,
        }
    }

    fn kind_for_topic(&self, topic: &str) -> Option<TradeKind> {
        if topic.eq_ignore_ascii_case(&self.buy_topic) {
            Some(TradeKind::Buy)
        } else if topic.eq_ignore_ascii_case(&self.sell_topic) {
            Some(TradeKind::Sell)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcSettings {
    pub url: String,
    pub timeout_ms: u64,
    pub contracts: CurveContracts,
}

pub struct JsonRpcClient {
    http: reqwest::Client,
    settings: RpcSettings,
    request_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(settings: RpcSettings) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| ChainError::Unavailable(format!("failed building HTTP client: {}", e)))?;

        Ok(Self {
            http,
            settings,
            request_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.settings.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(format!("{}: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChainError::Unavailable(format!("{} HTTP {}: {}", method, status, text)));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{} response: {}", method, e)))?;

        parse_envelope(envelope)
    }
}

#[async_trait]
impl BlockSource for JsonRpcClient {
    async fn latest_block_number(&self) -> Result<u64, ChainError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&result)
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<i64, ChainError> {
        let block = self
            .call("eth_getBlockByNumber", json!([to_quantity(block_number), false]))
            .await?;
        if block.is_null() {
            return Err(ChainError::MissingBlock(block_number));
        }

        let ts = parse_quantity(&block["timestamp"])?;
        i64::try_from(ts).map_err(|_| ChainError::Decode(format!("timestamp out of range: {}", ts)))
    }
}

#[async_trait]
impl EventSource for JsonRpcClient {
    async fn query_trade_events(
        &self,
        tokens: &[String],
        from_block: u64,
        to_block: u64,
        kinds: &[TradeKind],
    ) -> Result<Vec<RawEvent>, ChainError> {
        let contracts = &self.settings.contracts;
        let filter = build_log_filter(contracts, tokens, from_block, to_block, kinds)?;

        let logs = self.call("eth_getLogs", json!([filter])).await?;
        let logs = logs
            .as_array()
            .ok_or_else(|| ChainError::Decode("eth_getLogs result is not an array".to_string()))?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            if let Some(event) = decode_log(log, contracts)? {
                events.push(event);
            }
        }

        log::debug!(
            "eth_getLogs {}..={} for {} token(s): {} logs, {} trade events",
            from_block,
            to_block,
            tokens.len(),
            logs.len(),
            events.len()
        );
        Ok(events)
    }
}

#[async_trait]
impl QuoteSource for JsonRpcClient {
    async fn quote_buy(&self, token: &str, base_amount: u128) -> Result<u128, ChainError> {
        let contracts = &self.settings.contracts;
        let data = encode_quote_call(&contracts.quote_selector, token, base_amount)?;

        let result = self
            .call(
                "eth_call",
                json!([{ "to": contracts.lens_address, "data": data }, "latest"]),
            )
            .await?;
        let result = result
            .as_str()
            .ok_or_else(|| ChainError::Decode("eth_call result is not a string".to_string()))?;

        decode_quote_result(result, contracts.quote_result_word)
    }
}

/// Unwrap a JSON-RPC 2.0 response envelope
pub fn parse_envelope(envelope: Value) -> Result<Value, ChainError> {
    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        return Err(ChainError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    match envelope {
        Value::Object(mut map) => map
            .remove("result")
            .ok_or_else(|| ChainError::Decode("response has neither result nor error".to_string())),
        _ => Err(ChainError::Decode("response is not an object".to_string())),
    }
}

/// `0x`-prefixed hex quantity
pub fn parse_quantity(value: &Value) -> Result<u64, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected hex quantity, got {}", value)))?;
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Decode(format!("quantity without 0x prefix: {}", s)))?;
    u64::from_str_radix(digits, 16).map_err(|e| ChainError::Decode(format!("bad quantity {}: {}", s, e)))
}

pub fn to_quantity(n: u64) -> String {
    format!("{:#x}", n)
}

/// 20-byte address left-padded to a 32-byte topic / ABI word, lowercase hex
pub fn address_word(address: &str) -> Result<String, ChainError> {
    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);
    if digits.len() != 40 || hex::decode(digits).is_err() {
        return Err(ChainError::Decode(format!("not a 20-byte address: {}", address)));
    }
    Ok(format!("{:0>64}", digits.to_lowercase()))
}

pub fn build_log_filter(
    contracts: &CurveContracts,
    tokens: &[String],
    from_block: u64,
    to_block: u64,
    kinds: &[TradeKind],
) -> Result<Value, ChainError> {
    let kind_topics: Vec<Value> = kinds
        .iter()
        .map(|kind| Value::String(contracts.topic_for(*kind).to_string()))
        .collect();

    let token_topics = tokens
        .iter()
        .map(|token| address_word(token).map(|word| Value::String(format!("0x{}", word))))
        .collect::<Result<Vec<Value>, ChainError>>()?;

    let index = contracts.token_topic_index.max(1);
    let mut topics = vec![Value::Null; index + 1];
    topics[0] = Value::Array(kind_topics);
    topics[index] = Value::Array(token_topics);

    Ok(json!({
        "fromBlock": to_quantity(from_block),
        "toBlock": to_quantity(to_block),
        "address": contracts.curve_address,
        "topics": topics,
    }))
}

/// Decode one log into a trade record; `Ok(None)` for logs of other events
pub fn decode_log(log: &Value, contracts: &CurveContracts) -> Result<Option<RawEvent>, ChainError> {
    let topics: Vec<&str> = log
        .get("topics")
        .and_then(Value::as_array)
        .map(|topics| topics.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(kind) = topics.first().and_then(|t| contracts.kind_for_topic(t)) else {
        return Ok(None);
    };

    let token_topic = topics.get(contracts.token_topic_index).ok_or_else(|| {
        ChainError::Decode(format!(
            "{} log has no topic {}",
            kind.as_str(),
            contracts.token_topic_index
        ))
    })?;
    let topic_bytes = decode_hex(token_topic)?;
    if topic_bytes.len() != WORD_BYTES {
        return Err(ChainError::Decode(format!(
            "{} log token topic is {} bytes, expected {}",
            kind.as_str(),
            topic_bytes.len(),
            WORD_BYTES
        )));
    }
    let token = format!("0x{}", hex::encode(&topic_bytes[WORD_BYTES - 20..]));

    let data = decode_hex(log.get("data").and_then(Value::as_str).unwrap_or("0x"))?;

    let mut event = RawEvent::new()
        .with("eventType", kind.as_str())
        .with("token", token);
    for (name, word) in contracts.event_data_fields.iter().zip(data.chunks_exact(WORD_BYTES)) {
        event.insert(name, word_to_value(word));
    }
    if let Some(block) = log.get("blockNumber").filter(|b| !b.is_null()) {
        event.insert("blockNumber", parse_quantity(block)?);
    }
    if let Some(hash) = log.get("transactionHash").and_then(Value::as_str) {
        event.insert("transactionHash", hash);
    }

    Ok(Some(event))
}

/// Calldata for `quote(token, amount, true)`
pub fn encode_quote_call(selector: &str, token: &str, amount: u128) -> Result<String, ChainError> {
    let selector_digits = selector.strip_prefix("0x").unwrap_or(selector);
    if selector_digits.len() != 8 || hex::decode(selector_digits).is_err() {
        return Err(ChainError::Decode(format!("not a 4-byte selector: {}", selector)));
    }

    Ok(format!(
        "0x{}{}{:064x}{:064x}",
        selector_digits.to_lowercase(),
        address_word(token)?,
        amount,
        1u8
    ))
}

/// Read word `index` of ABI-encoded return data as an unsigned amount
pub fn decode_quote_result(data: &str, index: usize) -> Result<u128, ChainError> {
    let bytes = decode_hex(data)?;
    let missing = || ChainError::Decode(format!("quote result has no word {} ({} bytes)", index, bytes.len()));
    let start = index.checked_mul(WORD_BYTES).ok_or_else(missing)?;
    let end = start.checked_add(WORD_BYTES).ok_or_else(missing)?;
    let word = bytes.get(start..end).ok_or_else(missing)?;

    word_to_u128(word).ok_or_else(|| ChainError::Decode("quote amount exceeds u128".to_string()))
}

fn decode_hex(data: &str) -> Result<Vec<u8>, ChainError> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(digits).map_err(|e| ChainError::Decode(format!("bad hex data: {}", e)))
}

fn word_to_u128(word: &[u8]) -> Option<u128> {
    let (high, low) = word.split_at(WORD_BYTES - 16);
    if high.iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(low);
    Some(u128::from_be_bytes(buf))
}

/// Decimal string when the word fits `u128`, raw hex otherwise
fn word_to_value(word: &[u8]) -> Value {
    match word_to_u128(word) {
        Some(n) => Value::String(n.to_string()),
        None => Value::String(format!("0x{}", hex::encode(word))),
    }
}
