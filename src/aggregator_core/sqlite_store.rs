//! SQLite snapshot store
//!
//! Same contract as the JSON file store; the replace happens inside one
//! transaction so a reader sees either the previous or the new snapshot.

use super::snapshot_backend::{PriceEntry, PriceSnapshot, SnapshotError, SnapshotStore};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS price_snapshot (
    token           TEXT PRIMARY KEY,
    price_per_token REAL,
    observed_at     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshot_meta (
    id                  INTEGER PRIMARY KEY CHECK (id = 1),
    updated_at          TEXT,
    window_sec          INTEGER NOT NULL,
    from_block          INTEGER NOT NULL,
    to_block            INTEGER NOT NULL,
    spike_threshold_pct REAL NOT NULL
);
"#;

pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;

        log::info!("✅ SQLite snapshot store initialized: {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SnapshotError> {
        self.conn
            .lock()
            .map_err(|_| SnapshotError::Database("connection mutex poisoned".to_string()))
    }

    fn read(&self) -> Result<Option<PriceSnapshot>, SnapshotError> {
        let conn = self.lock()?;

        let meta = conn
            .query_row(
                "SELECT updated_at, window_sec, from_block, to_block, spike_threshold_pct
                 FROM snapshot_meta WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, f64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((updated_at, window_sec, from_block, to_block, spike_threshold_pct)) = meta else {
            return Ok(None);
        };

        let mut stmt = conn.prepare("SELECT token, price_per_token, observed_at FROM price_snapshot")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut prices = BTreeMap::new();
        for row in rows {
            let (token, price_per_token, ts) = row?;
            prices.insert(token, PriceEntry { price_per_token, ts });
        }

        Ok(Some(PriceSnapshot {
            updated_at,
            window_sec: window_sec.max(0) as u64,
            from_block: from_block.max(0) as u64,
            to_block: to_block.max(0) as u64,
            spike_threshold_pct,
            prices,
        }))
    }

    fn write(&self, snapshot: &PriceSnapshot) -> Result<(), SnapshotError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM price_snapshot", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO price_snapshot (token, price_per_token, observed_at) VALUES (?1, ?2, ?3)",
            )?;
            for (token, entry) in &snapshot.prices {
                insert.execute(params![token, entry.price_per_token, entry.ts])?;
            }
        }

        tx.execute(
            r#"
            INSERT INTO snapshot_meta (id, updated_at, window_sec, from_block, to_block, spike_threshold_pct)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                updated_at = excluded.updated_at,
                window_sec = excluded.window_sec,
                from_block = excluded.from_block,
                to_block = excluded.to_block,
                spike_threshold_pct = excluded.spike_threshold_pct
            "#,
            params![
                snapshot.updated_at,
                snapshot.window_sec as i64,
                snapshot.from_block as i64,
                snapshot.to_block as i64,
                snapshot.spike_threshold_pct,
            ],
        )?;

        tx.commit()?;

        log::debug!("✅ Saved {} prices to SQLite snapshot", snapshot.prices.len());
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn try_load(&self) -> Result<Option<PriceSnapshot>, SnapshotError> {
        self.read()
    }

    async fn save(&self, snapshot: &PriceSnapshot) -> Result<(), SnapshotError> {
        self.write(snapshot)
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
