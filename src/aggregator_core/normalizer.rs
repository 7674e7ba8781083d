//! Raw trade event records and alias-based field lookup
//!
//! Event sources disagree on field names, so every semantic field is resolved
//! through an ordered alias list: the first present, non-null key wins.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys that may carry the event kind tag
pub const KIND_FIELDS: &[&str] = &["eventType", "type", "name", "event"];

/// Keys that may carry the base-currency amount paid in a buy
pub const BUY_AMOUNT_FIELDS: &[&str] = &["amountIn", "monIn", "value", "nativeIn", "ethIn"];

/// Keys that may carry the base-currency amount received in a sell
pub const SELL_AMOUNT_FIELDS: &[&str] = &["amountOut", "monOut", "value", "nativeOut", "ethOut"];

/// Keys that may carry the token address
pub const TOKEN_FIELDS: &[&str] = &["token", "tokenAddress", "address"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeKind {
    Buy,
    Sell,
}

impl TradeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeKind::Buy => "Buy",
            TradeKind::Sell => "Sell",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Buy" => Some(TradeKind::Buy),
            "Sell" => Some(TradeKind::Sell),
            _ => None,
        }
    }

    pub fn all() -> [TradeKind; 2] {
        [TradeKind::Buy, TradeKind::Sell]
    }

    /// Alias list for the volume-bearing amount of this kind
    pub fn amount_fields(&self) -> &'static [&'static str] {
        match self {
            TradeKind::Buy => BUY_AMOUNT_FIELDS,
            TradeKind::Sell => SELL_AMOUNT_FIELDS,
        }
    }
}

/// A trade event as delivered by an event source: an untyped key-value record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent(Map<String, Value>);

impl RawEvent {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// First present, non-null value among `aliases`
    pub fn first_field(&self, aliases: &[&str]) -> Option<&Value> {
        aliases
            .iter()
            .filter_map(|key| self.0.get(*key))
            .find(|value| !value.is_null())
    }

    /// Kind tag from the first non-null kind alias; `None` for anything but Buy/Sell
    pub fn kind(&self) -> Option<TradeKind> {
        self.first_field(KIND_FIELDS)
            .and_then(Value::as_str)
            .and_then(TradeKind::from_tag)
    }

    pub fn token(&self) -> Option<&str> {
        self.first_field(TOKEN_FIELDS).and_then(Value::as_str)
    }

    /// First alias whose value parses as a base-unit integer; 0 when none does
    pub fn pick_amount(&self, aliases: &[&str]) -> u128 {
        aliases
            .iter()
            .filter_map(|key| self.0.get(*key))
            .filter(|value| !value.is_null())
            .find_map(parse_base_units)
            .unwrap_or(0)
    }

    /// Volume-bearing amount for this event's kind (0 for unclassified events)
    pub fn volume_amount(&self) -> u128 {
        match self.kind() {
            Some(kind) => self.pick_amount(kind.amount_fields()),
            None => 0,
        }
    }
}

/// Integer base units from a JSON number, a decimal string, or a `0x` hex string.
///
/// Fractional numbers are floored. Negative, non-finite, fractional strings and
/// values beyond `u128` do not parse.
pub fn parse_base_units(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Some(u as u128);
            }
            let f = n.as_f64()?;
            if f.is_finite() && f >= 0.0 && f < u128::MAX as f64 {
                Some(f.floor() as u128)
            } else {
                None
            }
        }
        Value::String(s) => parse_integer_str(s.trim()),
        _ => None,
    }
}

fn parse_integer_str(s: &str) -> Option<u128> {
    if let Some(hex_digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex_digits.is_empty() {
            return None;
        }
        return u128::from_str_radix(hex_digits, 16).ok();
    }
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u128>().ok()
}
