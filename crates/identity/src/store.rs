//! Persistence for keycard entries.
//!
//! Stores keep raw entry bytes and their hash text keyed by `(owner, index)`.
//! They are append-only: a second insert for the same key is rejected and
//! nothing is ever updated in place.

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{KeycardError, KeycardResult};

/// One stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub index: u32,
    pub bytes: Vec<u8>,
    pub hash: String,
}

pub trait EntryStore {
    /// Fails with `DuplicateEntry` if `(owner, index)` is already stored.
    fn insert(&mut self, owner: &str, index: u32, bytes: &[u8], hash: &str) -> KeycardResult<()>;

    /// Fails with `EntryNotFound` if nothing is stored at `(owner, index)`.
    fn get(&self, owner: &str, index: u32) -> KeycardResult<StoredEntry>;

    fn latest_index(&self, owner: &str) -> KeycardResult<Option<u32>>;

    /// All entries for `owner`, oldest first.
    fn entries(&self, owner: &str) -> KeycardResult<Vec<StoredEntry>>;
}

/// In-process store, mainly for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: BTreeMap<(String, u32), StoredEntry>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryStore for MemoryEntryStore {
    fn insert(&mut self, owner: &str, index: u32, bytes: &[u8], hash: &str) -> KeycardResult<()> {
        let key = (owner.to_string(), index);
        if self.entries.contains_key(&key) {
            return Err(KeycardError::DuplicateEntry {
                owner: owner.to_string(),
                index,
            });
        }
        self.entries.insert(
            key,
            StoredEntry {
                index,
                bytes: bytes.to_vec(),
                hash: hash.to_string(),
            },
        );
        debug!(owner, index, "Entry stored");
        Ok(())
    }

    fn get(&self, owner: &str, index: u32) -> KeycardResult<StoredEntry> {
        self.entries
            .get(&(owner.to_string(), index))
            .cloned()
            .ok_or_else(|| KeycardError::EntryNotFound {
                owner: owner.to_string(),
                index,
            })
    }

    fn latest_index(&self, owner: &str) -> KeycardResult<Option<u32>> {
        Ok(self
            .entries
            .keys()
            .filter(|(o, _)| o == owner)
            .map(|(_, index)| *index)
            .max())
    }

    fn entries(&self, owner: &str) -> KeycardResult<Vec<StoredEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|((o, _), _)| o == owner)
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut store = MemoryEntryStore::new();
        store.insert("example.com", 1, b"Type:Organization\r\n", "BLAKE2B-256:AAAA").unwrap();

        let entry = store.get("example.com", 1).unwrap();
        assert_eq!(entry.bytes, b"Type:Organization\r\n");
        assert_eq!(entry.hash, "BLAKE2B-256:AAAA");
        assert!(matches!(
            store.get("example.com", 2),
            Err(KeycardError::EntryNotFound { index: 2, .. })
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut store = MemoryEntryStore::new();
        store.insert("example.com", 1, b"a", "h1").unwrap();
        assert!(matches!(
            store.insert("example.com", 1, b"b", "h2"),
            Err(KeycardError::DuplicateEntry { .. })
        ));
        assert_eq!(store.get("example.com", 1).unwrap().bytes, b"a");
    }

    #[test]
    fn test_owners_are_separate() {
        let mut store = MemoryEntryStore::new();
        store.insert("a.example", 1, b"a1", "h").unwrap();
        store.insert("a.example", 2, b"a2", "h").unwrap();
        store.insert("b.example", 1, b"b1", "h").unwrap();

        assert_eq!(store.latest_index("a.example").unwrap(), Some(2));
        assert_eq!(store.latest_index("b.example").unwrap(), Some(1));
        assert_eq!(store.latest_index("c.example").unwrap(), None);

        let entries = store.entries("a.example").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 1);
        assert_eq!(entries[1].index, 2);
    }
}
