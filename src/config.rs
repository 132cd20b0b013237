//! SQLite-based application configuration store

use rusqlite::{Connection, params};
use std::sync::Mutex;
use crate::traits::LibraryError;

/// User override for the watched drop directory
pub const KEY_DROP_DIRECTORY: &str = "drop_directory";
/// Person the imported media belongs to
pub const KEY_IMPORT_PARENT: &str = "import.parent_id";
pub const KEY_DELETE_AFTER_IMPORT: &str = "import.delete_after_import";
pub const KEY_BACKLOG_CAPACITY: &str = "dispatch.backlog_capacity";

pub struct AppConfig {
    conn: Mutex<Connection>,
}

impl AppConfig {
    /// Create config table in an existing database connection
    pub fn init_table(conn: &Connection) -> Result<(), LibraryError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS app_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );"
        ).map_err(|e| LibraryError::DatabaseError(e.to_string()))
    }

    /// Open standalone in-memory config (for testing)
    pub fn open_in_memory() -> Result<Self, LibraryError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;
        Self::init_table(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Wrap an existing connection (config table must already be initialized)
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT value FROM app_config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );
        let ret = match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LibraryError::DatabaseError(e.to_string())),
        };
        tracing::debug!(key = %key, found = ret.as_ref().ok().and_then(|v| v.as_ref()).is_some(), "Config get");
        ret
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), LibraryError> {
        tracing::debug!(key = %key, "Config set");
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO app_config (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, now],
        ).map_err(|e| LibraryError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<(), LibraryError> {
        tracing::debug!(key = %key, "Config delete");
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM app_config WHERE key = ?1",
            params![key],
        ).map_err(|e| LibraryError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, LibraryError> {
        Ok(self.get(key)?.map(|v| v == "true").unwrap_or(false))
    }

    /// Like `get_bool`, but a missing key yields `default`
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, LibraryError> {
        Ok(self.get(key)?.map(|v| v == "true").unwrap_or(default))
    }

    /// Missing or unparseable values yield `default`
    pub fn get_usize_or(&self, key: &str, default: usize) -> Result<usize, LibraryError> {
        Ok(self.get(key)?.and_then(|v| v.trim().parse().ok()).unwrap_or(default))
    }
}
