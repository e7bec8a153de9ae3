//! Ordered key-value store over the balanced tree
//!
//! Maps signed 32-bit keys to opaque 4-byte payloads and supports
//! extraction of either end of the key ordering.

use crate::error::{RbVaultError, Result};
use crate::tree::RbTree;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of an entry payload in bytes.
pub const PAYLOAD_LEN: usize = 4;

/// Opaque fixed-size payload, usually four ASCII characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload([u8; PAYLOAD_LEN]);

impl Payload {
    pub const fn new(bytes: [u8; PAYLOAD_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a payload from a script token: longer tokens are truncated,
    /// shorter ones zero-padded.
    pub fn from_token(token: &str) -> Self {
        let mut bytes = [0u8; PAYLOAD_LEN];
        for (slot, byte) in bytes.iter_mut().zip(token.bytes()) {
            *slot = byte;
        }
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    pub fn is_zeroed(&self) -> bool {
        self.0 == [0; PAYLOAD_LEN]
    }
}

impl From<[u8; PAYLOAD_LEN]> for Payload {
    fn from(bytes: [u8; PAYLOAD_LEN]) -> Self {
        Self(bytes)
    }
}

/// Renders the bytes up to the first NUL.
impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(PAYLOAD_LEN);
        f.write_str(&String::from_utf8_lossy(&self.0[..end]))
    }
}

/// A single key/payload pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: i32,
    pub payload: Payload,
}

impl Entry {
    pub fn new(key: i32, payload: Payload) -> Self {
        Self { key, payload }
    }
}

/// Which end of the key ordering a read removes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMode {
    #[default]
    Max,
    Min,
}

impl TryFrom<i64> for ExtractionMode {
    type Error = RbVaultError;

    fn try_from(flag: i64) -> Result<Self> {
        match flag {
            0 => Ok(ExtractionMode::Max),
            1 => Ok(ExtractionMode::Min),
            other => Err(RbVaultError::InvalidMode(other)),
        }
    }
}

impl From<ExtractionMode> for i64 {
    fn from(mode: ExtractionMode) -> Self {
        match mode {
            ExtractionMode::Max => 0,
            ExtractionMode::Min => 1,
        }
    }
}

/// Balanced ordered map from key to payload
#[derive(Debug, Default)]
pub struct OrderedStore {
    tree: RbTree<i32, Payload>,
}

impl OrderedStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self { tree: RbTree::new() }
    }

    /// Insert `payload` under `key`, overwriting the payload of an existing key in place
    pub fn upsert(&mut self, key: i32, payload: Payload) {
        self.tree.insert(key, payload);
    }

    /// Delete `key`; absent keys are a no-op
    pub fn remove(&mut self, key: i32) -> Option<Entry> {
        self.tree.remove(&key).map(|payload| Entry::new(key, payload))
    }

    /// Unlink and return the largest or smallest entry
    pub fn pop_extreme(&mut self, mode: ExtractionMode) -> Result<Entry> {
        let popped = match mode {
            ExtractionMode::Max => self.tree.pop_last(),
            ExtractionMode::Min => self.tree.pop_first(),
        };
        popped
            .map(|(key, payload)| Entry::new(key, payload))
            .ok_or(RbVaultError::Empty)
    }

    /// Look up `key` without removing it
    pub fn search(&self, key: i32) -> Option<Entry> {
        self.tree.get(&key).map(|payload| Entry::new(key, *payload))
    }

    /// Peek at the entry the given mode would extract next
    pub fn peek_extreme(&self, mode: ExtractionMode) -> Option<Entry> {
        let found = match mode {
            ExtractionMode::Max => self.tree.last(),
            ExtractionMode::Min => self.tree.first(),
        };
        found.map(|(key, payload)| Entry::new(*key, *payload))
    }

    /// Get number of stored entries
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Entries in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = Entry> + '_ {
        self.tree.iter().map(|(key, payload)| Entry::new(*key, *payload))
    }

    /// Release every entry
    pub fn clear(&mut self) {
        self.tree.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(keys: &[i32]) -> OrderedStore {
        let mut store = OrderedStore::new();
        for key in keys {
            store.upsert(*key, Payload::from_token("abcd"));
        }
        store
    }

    #[test]
    fn test_upsert_then_search() {
        let mut store = store_with(&[4, -9, 17, 0]);
        store.upsert(12, Payload::from_token("wxyz"));
        assert_eq!(store.search(12), Some(Entry::new(12, Payload::from_token("wxyz"))));
        assert_eq!(store.search(13), None);
    }

    #[test]
    fn test_upsert_replaces_payload() {
        let mut store = OrderedStore::new();
        store.upsert(7, Payload::from_token("p1"));
        store.upsert(7, Payload::from_token("p2"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.search(7).map(|e| e.payload), Some(Payload::from_token("p2")));
    }

    #[test]
    fn test_pop_extreme_max_order() {
        let mut store = store_with(&[1, 5, 3]);
        assert_eq!(store.pop_extreme(ExtractionMode::Max).unwrap().key, 5);
        assert_eq!(store.pop_extreme(ExtractionMode::Max).unwrap().key, 3);
        assert_eq!(store.pop_extreme(ExtractionMode::Max).unwrap().key, 1);
        assert!(matches!(store.pop_extreme(ExtractionMode::Max), Err(RbVaultError::Empty)));
    }

    #[test]
    fn test_pop_extreme_min_first() {
        let mut store = store_with(&[1, 5, 3]);
        assert_eq!(store.peek_extreme(ExtractionMode::Min).map(|e| e.key), Some(1));
        assert_eq!(store.pop_extreme(ExtractionMode::Min).unwrap().key, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut store = store_with(&[10, 20, 30]);
        let before: Vec<Entry> = store.iter().collect();
        assert_eq!(store.remove(25), None);
        let after: Vec<Entry> = store.iter().collect();
        assert_eq!(before, after);
        assert_eq!(store.len(), 3);

        assert!(store.remove(20).is_some());
        assert_eq!(store.iter().map(|e| e.key).collect::<Vec<_>>(), vec![10, 30]);
    }

    #[test]
    fn test_payload_from_token() {
        assert_eq!(Payload::from_token("abcdef").as_bytes(), b"abcd");
        assert_eq!(Payload::from_token("ab").as_bytes(), &[b'a', b'b', 0, 0]);
        assert!(Payload::from_token("").is_zeroed());
        assert_eq!(Payload::from_token("ab").to_string(), "ab");
        assert_eq!(Payload::from_token("wxyz").to_string(), "wxyz");
    }

    #[test]
    fn test_extraction_mode_flags() {
        assert_eq!(ExtractionMode::try_from(0).unwrap(), ExtractionMode::Max);
        assert_eq!(ExtractionMode::try_from(1).unwrap(), ExtractionMode::Min);
        assert!(matches!(ExtractionMode::try_from(2), Err(RbVaultError::InvalidMode(2))));
        assert!(matches!(ExtractionMode::try_from(-1), Err(RbVaultError::InvalidMode(-1))));
        assert_eq!(ExtractionMode::default(), ExtractionMode::Max);
    }
}
