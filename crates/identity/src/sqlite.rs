//! SQLite-backed entry store.
//!
//! Uniqueness of `(owner, idx)` is enforced by the schema, so concurrent
//! writers through separate connections still cannot fork a card.

use cardchain_core::StorageConfig;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{KeycardError, KeycardResult};
use crate::store::{EntryStore, StoredEntry};

pub struct SqliteEntryStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteEntryStore {
    /// Opens or creates the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> KeycardResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening keycard store");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn from_config(config: &StorageConfig) -> KeycardResult<Self> {
        Self::open(&config.database_path)
    }

    pub fn open_in_memory() -> KeycardResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(conn: &Connection) -> KeycardResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS keycard_entries (
                owner TEXT NOT NULL,
                idx INTEGER NOT NULL,
                entry BLOB NOT NULL,
                hash TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                UNIQUE(owner, idx)
            );
            "#,
        )?;
        Ok(())
    }
}

impl EntryStore for SqliteEntryStore {
    fn insert(&mut self, owner: &str, index: u32, bytes: &[u8], hash: &str) -> KeycardResult<()> {
        self.conn
            .execute(
                "INSERT INTO keycard_entries (owner, idx, entry, hash) VALUES (?1, ?2, ?3, ?4)",
                params![owner, index, bytes, hash],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref err, _)
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    KeycardError::DuplicateEntry {
                        owner: owner.to_string(),
                        index,
                    }
                }
                e => KeycardError::Database(e),
            })?;

        debug!(owner, index, "Entry stored");
        Ok(())
    }

    fn get(&self, owner: &str, index: u32) -> KeycardResult<StoredEntry> {
        self.conn
            .query_row(
                "SELECT idx, entry, hash FROM keycard_entries WHERE owner = ?1 AND idx = ?2",
                params![owner, index],
                |row| {
                    Ok(StoredEntry {
                        index: row.get(0)?,
                        bytes: row.get(1)?,
                        hash: row.get(2)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => KeycardError::EntryNotFound {
                    owner: owner.to_string(),
                    index,
                },
                e => KeycardError::Database(e),
            })
    }

    fn latest_index(&self, owner: &str) -> KeycardResult<Option<u32>> {
        let latest = self
            .conn
            .query_row(
                "SELECT idx FROM keycard_entries WHERE owner = ?1 ORDER BY idx DESC LIMIT 1",
                params![owner],
                |row| row.get(0),
            )
            .optional()?;
        Ok(latest)
    }

    fn entries(&self, owner: &str) -> KeycardResult<Vec<StoredEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT idx, entry, hash FROM keycard_entries WHERE owner = ?1 ORDER BY idx ASC",
        )?;
        let rows = stmt.query_map(params![owner], |row| {
            Ok(StoredEntry {
                index: row.get(0)?,
                bytes: row.get(1)?,
                hash: row.get(2)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> PathBuf {
        std::env::temp_dir().join(format!("cardchain_store_{}.db", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = SqliteEntryStore::open_in_memory().unwrap();
        store.insert("example.com", 1, b"entry one", "BLAKE2B-256:AAAA").unwrap();

        let entry = store.get("example.com", 1).unwrap();
        assert_eq!(entry.index, 1);
        assert_eq!(entry.bytes, b"entry one");
        assert_eq!(entry.hash, "BLAKE2B-256:AAAA");

        assert!(matches!(
            store.get("example.com", 9),
            Err(KeycardError::EntryNotFound { index: 9, .. })
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut store = SqliteEntryStore::open_in_memory().unwrap();
        store.insert("example.com", 1, b"a", "h").unwrap();
        assert!(matches!(
            store.insert("example.com", 1, b"b", "h"),
            Err(KeycardError::DuplicateEntry { index: 1, .. })
        ));
        store.insert("other.com", 1, b"c", "h").unwrap();
    }

    #[test]
    fn test_latest_index_and_order() {
        let mut store = SqliteEntryStore::open_in_memory().unwrap();
        assert_eq!(store.latest_index("example.com").unwrap(), None);

        store.insert("example.com", 2, b"two", "h2").unwrap();
        store.insert("example.com", 1, b"one", "h1").unwrap();
        assert_eq!(store.latest_index("example.com").unwrap(), Some(2));

        let entries = store.entries("example.com").unwrap();
        let indexes: Vec<u32> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indexes, vec![1, 2]);
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let path = temp_db();
        {
            let mut store = SqliteEntryStore::open(&path).unwrap();
            assert_eq!(store.path(), Some(path.as_path()));
            store.insert("example.com", 1, b"persisted", "h").unwrap();
        }

        let store = SqliteEntryStore::open(&path).unwrap();
        assert_eq!(store.get("example.com", 1).unwrap().bytes, b"persisted");

        drop(store);
        std::fs::remove_file(&path).ok();
        std::fs::remove_file(path.with_extension("db-wal")).ok();
        std::fs::remove_file(path.with_extension("db-shm")).ok();
    }
}
