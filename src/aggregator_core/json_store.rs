//! JSON file snapshot store
//!
//! Writes go to a temporary file in the target directory which is then renamed
//! over the snapshot, so a reader never observes a half-written file.

use super::snapshot_backend::{PriceSnapshot, SnapshotError, SnapshotStore};
use async_trait::async_trait;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        log::info!("📝 Price snapshot file: {}", path.display());
        Self { path }
    }

    fn read(&self) -> Result<Option<PriceSnapshot>, SnapshotError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value: serde_json::Value = serde_json::from_str(&json)?;
        PriceSnapshot::from_value(&value).map(Some)
    }

    fn write(&self, snapshot: &PriceSnapshot) -> Result<(), SnapshotError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(snapshot)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| SnapshotError::Io(e.error))?;

        log::debug!("Saved {} prices to {}", snapshot.prices.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn try_load(&self) -> Result<Option<PriceSnapshot>, SnapshotError> {
        self.read()
    }

    async fn save(&self, snapshot: &PriceSnapshot) -> Result<(), SnapshotError> {
        self.write(snapshot)
    }

    fn backend_type(&self) -> &'static str {
        "JSON"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator_core::snapshot_backend::PriceEntry;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn create_test_snapshot() -> PriceSnapshot {
        let mut prices = BTreeMap::new();
        prices.insert("0xAA".to_string(), PriceEntry { price_per_token: Some(0.0025), ts: 1700000000 });
        prices.insert("0xBB".to_string(), PriceEntry { price_per_token: None, ts: 1700000000 });
        PriceSnapshot {
            updated_at: Some("2025-01-01T00:00:00Z".to_string()),
            window_sec: 300,
            from_block: 100,
            to_block: 300,
            spike_threshold_pct: 10.0,
            prices,
        }
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("cache.json"));
        let snapshot = create_test_snapshot();

        store.save(&snapshot).await.unwrap();
        let loaded = store.load().await;

        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("absent.json"));

        assert!(matches!(store.try_load().await, Ok(None)));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{\"prices\": {\"0xAA\": ").unwrap();
        let store = JsonSnapshotStore::new(&path);

        assert!(store.try_load().await.is_err());
        assert_eq!(store.load().await, PriceSnapshot::default());
    }

    #[tokio::test]
    async fn test_save_replaces_whole_mapping() {
        let dir = tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("cache.json"));

        store.save(&create_test_snapshot()).await.unwrap();

        let mut next = create_test_snapshot();
        next.prices.remove("0xAA");
        store.save(&next).await.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.prices.len(), 1);
        assert!(!loaded.prices.contains_key("0xAA"));
    }

    #[tokio::test]
    async fn test_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let store = JsonSnapshotStore::new(&path);

        store.save(&create_test_snapshot()).await.unwrap();
        assert!(path.exists());

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "temporary file left behind");
    }
}
