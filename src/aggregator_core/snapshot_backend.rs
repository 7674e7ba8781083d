//! Price snapshot store trait
//!
//! Defines the persisted previous-run state and the interface backends
//! implement to read and replace it.

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug)]
pub enum SnapshotError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Database(String),
    /// Readable, but not a snapshot
    Corrupt(String),
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        SnapshotError::Io(err)
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::Serialization(err)
    }
}

impl From<rusqlite::Error> for SnapshotError {
    fn from(err: rusqlite::Error) -> Self {
        SnapshotError::Database(err.to_string())
    }
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "IO error: {}", e),
            SnapshotError::Serialization(e) => write!(f, "Serialization error: {}", e),
            SnapshotError::Database(e) => write!(f, "Database error: {}", e),
            SnapshotError::Corrupt(e) => write!(f, "Corrupt snapshot: {}", e),
        }
    }
}

impl std::error::Error for SnapshotError {}

/// Last known price of one token
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceEntry {
    #[serde(rename = "priceMonPerToken")]
    pub price_per_token: Option<f64>,
    /// Observation time, epoch seconds
    pub ts: i64,
}

/// Previous-run state: run metadata plus one price entry per token
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub updated_at: Option<String>,
    pub window_sec: u64,
    #[serde(serialize_with = "as_decimal_string")]
    pub from_block: u64,
    #[serde(serialize_with = "as_decimal_string")]
    pub to_block: u64,
    pub spike_threshold_pct: f64,
    pub prices: BTreeMap<String, PriceEntry>,
}

impl PriceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Previous price for `token`, if one was recorded
    pub fn previous_price(&self, token: &str) -> Option<f64> {
        self.prices.get(token).and_then(|entry| entry.price_per_token)
    }

    /// Build a snapshot from parsed JSON, tolerating damaged entries.
    ///
    /// The root must be an object. A missing or malformed `prices` member
    /// yields no entries; an entry whose price is not a number keeps a null
    /// price, so that token simply has no prior data next run.
    pub fn from_value(value: &Value) -> Result<Self, SnapshotError> {
        let root = value
            .as_object()
            .ok_or_else(|| SnapshotError::Corrupt("root is not an object".to_string()))?;

        let mut prices = BTreeMap::new();
        if let Some(entries) = root.get("prices").and_then(Value::as_object) {
            for (token, entry) in entries {
                let price_per_token = entry
                    .get("priceMonPerToken")
                    .and_then(Value::as_f64)
                    .filter(|p| p.is_finite());
                let ts = entry.get("ts").and_then(Value::as_i64).unwrap_or(0);
                prices.insert(token.clone(), PriceEntry { price_per_token, ts });
            }
        }

        Ok(Self {
            updated_at: root.get("updatedAt").and_then(Value::as_str).map(str::to_string),
            window_sec: root.get("windowSec").and_then(Value::as_u64).unwrap_or(0),
            from_block: root.get("fromBlock").and_then(loose_u64).unwrap_or(0),
            to_block: root.get("toBlock").and_then(loose_u64).unwrap_or(0),
            spike_threshold_pct: root.get("spikeThresholdPct").and_then(Value::as_f64).unwrap_or(0.0),
            prices,
        })
    }
}

fn loose_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Block numbers go over the wire as decimal strings
pub fn as_decimal_string<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Backend trait for the previous-run price snapshot
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the persisted snapshot; `Ok(None)` when nothing was ever saved
    async fn try_load(&self) -> Result<Option<PriceSnapshot>, SnapshotError>;

    /// Replace the whole persisted snapshot. A concurrent or later `load`
    /// sees either the old or the new snapshot, never a mix.
    async fn save(&self, snapshot: &PriceSnapshot) -> Result<(), SnapshotError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;

    /// Best-effort read: missing or unreadable state is an empty snapshot
    async fn load(&self) -> PriceSnapshot {
        match self.try_load().await {
            Ok(Some(snapshot)) => {
                log::info!(
                    "📂 Loaded {} previous prices ({} backend)",
                    snapshot.prices.len(),
                    self.backend_type()
                );
                snapshot
            }
            Ok(None) => {
                log::info!("No existing snapshot ({} backend), starting fresh", self.backend_type());
                PriceSnapshot::default()
            }
            Err(e) => {
                log::warn!("⚠️  Ignoring unreadable snapshot ({} backend): {}", self.backend_type(), e);
                PriceSnapshot::default()
            }
        }
    }
}
