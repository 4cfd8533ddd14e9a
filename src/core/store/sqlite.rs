//! SQLite-backed place store

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{PlaceStore, StoreError};
use crate::core::field::Record;
use crate::core::identity::PlaceId;

/// Current schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Local place store. Each record is a JSON document keyed by its id.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store file
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS places (
                    id TEXT PRIMARY KEY,
                    fields TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                "#,
            )?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("store connection poisoned".to_string()))
    }

    fn load(conn: &Connection, id: &PlaceId) -> Result<Option<Record>, StoreError> {
        let json: Option<String> = conn
            .query_row(
                "SELECT fields FROM places WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
            .transpose()
    }
}

/// Drop `Null` entries; the store keeps absent and null the same way
fn compact(record: &Record) -> Record {
    record
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (*k, v.clone()))
        .collect()
}

#[async_trait]
impl PlaceStore for SqliteStore {
    async fn get(&self, id: &PlaceId) -> Result<Option<Record>, StoreError> {
        let conn = self.conn()?;
        Self::load(&conn, id)
    }

    async fn list(&self) -> Result<Vec<(PlaceId, Record)>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, fields FROM places ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, json) = row?;
            let id = PlaceId::parse(&id)
                .map_err(|e| StoreError::Rejected(format!("stored id '{}': {}", id, e)))?;
            out.push((id, serde_json::from_str(&json)?));
        }
        Ok(out)
    }

    async fn create(&self, record: &Record) -> Result<PlaceId, StoreError> {
        let id = PlaceId::new();
        let now = Utc::now().to_rfc3339();
        let json = serde_json::to_string(&compact(record))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO places (id, fields, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![id.to_string(), json, now],
        )?;
        debug!(%id, "created place");
        Ok(id)
    }

    async fn update(&self, id: &PlaceId, patch: &Record) -> Result<Record, StoreError> {
        let conn = self.conn()?;
        let mut record = Self::load(&conn, id)?.ok_or(StoreError::NotFound(*id))?;

        for (field, value) in patch {
            if value.is_null() {
                record.remove(field);
            } else {
                record.insert(*field, value.clone());
            }
        }

        conn.execute(
            "UPDATE places SET fields = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                serde_json::to_string(&record)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        debug!(%id, fields = patch.len(), "updated place");
        Ok(record)
    }

    async fn delete(&self, id: &PlaceId) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let affected = conn.execute("DELETE FROM places WHERE id = ?1", params![id.to_string()])?;
        if affected == 0 {
            return Err(StoreError::NotFound(*id));
        }
        debug!(%id, "deleted place");
        Ok(())
    }
}
