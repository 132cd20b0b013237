//! SQLite-based media library with WAL for crash safety

use std::path::Path;
use std::sync::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use crate::traits::{LibraryError, MediaItem, MediaKind, MediaLibrary, Visibility};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS media_items (
        internal_id TEXT PRIMARY KEY,
        parent_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        original_name TEXT NOT NULL,
        kind TEXT NOT NULL,
        visibility TEXT NOT NULL DEFAULT 'public',
        text_extra TEXT,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_media_parent
        ON media_items (parent_id, created_at);";

pub struct SqliteMediaLibrary {
    conn: Mutex<Connection>,
}

impl SqliteMediaLibrary {
    /// Open or create a library database
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        let conn = Connection::open(path)
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;"
        ).map_err(|e| LibraryError::DatabaseError(e.to_string()))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, LibraryError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<MediaItem> {
    let kind: String = row.get(4)?;
    let visibility: String = row.get(5)?;
    Ok(MediaItem {
        internal_id: row.get(0)?,
        parent_id: row.get(1)?,
        file_name: row.get(2)?,
        original_name: row.get(3)?,
        kind: MediaKind::parse(&kind),
        visibility: if visibility == "private" { Visibility::Private } else { Visibility::Public },
        text_extra: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const SELECT_COLUMNS: &str =
    "SELECT internal_id, parent_id, file_name, original_name, kind, visibility, text_extra, created_at FROM media_items";

impl MediaLibrary for SqliteMediaLibrary {
    fn add_media(&self, item: &MediaItem) -> Result<(), LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO media_items (internal_id, parent_id, file_name, original_name, kind, visibility, text_extra, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                item.internal_id,
                item.parent_id,
                item.file_name,
                item.original_name,
                item.kind.as_str(),
                item.visibility.as_str(),
                item.text_extra,
                item.created_at,
            ],
        ).map_err(|e| LibraryError::DatabaseError(e.to_string()))?;

        tracing::debug!(id = %item.internal_id, kind = item.kind.as_str(), "Added media item");
        Ok(())
    }

    fn get(&self, internal_id: &str) -> Result<Option<MediaItem>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE internal_id = ?1"),
            params![internal_id],
            row_to_item,
        )
        .optional()
        .map_err(|e| LibraryError::DatabaseError(e.to_string()))
    }

    fn list_for_parent(&self, parent_id: &str) -> Result<Vec<MediaItem>, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE parent_id = ?1 ORDER BY created_at ASC, rowid ASC"))
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;
        let items = stmt
            .query_map(params![parent_id], row_to_item)
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;
        Ok(items)
    }

    fn count(&self) -> Result<usize, LibraryError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM media_items", [], |row| row.get(0))
            .map_err(|e| LibraryError::DatabaseError(e.to_string()))?;
        Ok(count as usize)
    }
}
