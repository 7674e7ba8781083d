//! Unified snapshot store
//!
//! Routes to either the JSON file or the SQLite backend based on configuration.

use super::json_store::JsonSnapshotStore;
use super::snapshot_backend::{PriceSnapshot, SnapshotError, SnapshotStore};
use super::sqlite_store::SqliteSnapshotStore;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotBackend {
    Json,
    Sqlite,
}

impl SnapshotBackend {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(SnapshotBackend::Json),
            "sqlite" => Some(SnapshotBackend::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotBackend::Json => "json",
            SnapshotBackend::Sqlite => "sqlite",
        }
    }
}

pub enum PriceSnapshotStore {
    Json(JsonSnapshotStore),
    Sqlite(SqliteSnapshotStore),
}

impl PriceSnapshotStore {
    pub fn open(backend: SnapshotBackend, path: PathBuf) -> Result<Self, SnapshotError> {
        match backend {
            SnapshotBackend::Json => Ok(PriceSnapshotStore::Json(JsonSnapshotStore::new(path))),
            SnapshotBackend::Sqlite => {
                let store = SqliteSnapshotStore::new(path)?;
                Ok(PriceSnapshotStore::Sqlite(store))
            }
        }
    }
}

#[async_trait]
impl SnapshotStore for PriceSnapshotStore {
    async fn try_load(&self) -> Result<Option<PriceSnapshot>, SnapshotError> {
        match self {
            PriceSnapshotStore::Json(s) => s.try_load().await,
            PriceSnapshotStore::Sqlite(s) => s.try_load().await,
        }
    }

    async fn save(&self, snapshot: &PriceSnapshot) -> Result<(), SnapshotError> {
        match self {
            PriceSnapshotStore::Json(s) => s.save(snapshot).await,
            PriceSnapshotStore::Sqlite(s) => s.save(snapshot).await,
        }
    }

    fn backend_type(&self) -> &'static str {
        match self {
            PriceSnapshotStore::Json(s) => s.backend_type(),
            PriceSnapshotStore::Sqlite(s) => s.backend_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_backend_parsing() {
        assert_eq!(SnapshotBackend::from_str("json"), Some(SnapshotBackend::Json));
        assert_eq!(SnapshotBackend::from_str("SQLite"), Some(SnapshotBackend::Sqlite));
        assert_eq!(SnapshotBackend::from_str("jsonl"), None);
    }

    #[tokio::test]
    async fn test_open_routes_to_backend() {
        let dir = tempdir().unwrap();

        let json = PriceSnapshotStore::open(SnapshotBackend::Json, dir.path().join("c.json")).unwrap();
        assert_eq!(json.backend_type(), "JSON");

        let sqlite = PriceSnapshotStore::open(SnapshotBackend::Sqlite, dir.path().join("c.db")).unwrap();
        assert_eq!(sqlite.backend_type(), "SQLite");
        assert!(sqlite.load().await.is_empty());
    }
}
