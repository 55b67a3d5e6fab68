//! SQLite-backed key-value medium.
//!
//! One `kv_store` row per storage key, holding the serialized conversation.
//! The connection lives behind a `Mutex` since rusqlite `Connection` is not
//! `Sync`; every medium operation holds the lock for one statement.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use parley_core::error::{ParleyError, Result};

use crate::medium::KeyValueStore;
use crate::migrations;

/// Key-value medium over the `kv_store` table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the conversation database at `path`.
    ///
    /// Missing parent directories are created. The file is put in WAL mode
    /// and migrated to the current `kv_store` schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| {
            ParleyError::Storage(format!("cannot open {}: {}", path.display(), e))
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| ParleyError::Storage(format!("cannot configure {}: {}", path.display(), e)))?;

        let store = Self::migrated(conn)?;
        info!(path = %path.display(), "Conversation database ready");
        Ok(store)
    }

    /// A store that lives only as long as this value.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ParleyError::Storage(format!("cannot open in-memory store: {}", e)))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ParleyError::Storage(format!("conversation database lock poisoned: {}", e)))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn()?
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| ParleyError::PersistenceRead(format!("Failed to read '{}': {}", key, e)))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value, Utc::now().timestamp()],
            )
            .map_err(|e| {
                ParleyError::PersistenceWrite(format!("Failed to write '{}': {}", key, e))
            })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM kv_store WHERE key = ?1", rusqlite::params![key])
            .map_err(|e| {
                ParleyError::PersistenceWrite(format!("Failed to remove '{}': {}", key, e))
            })?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}
