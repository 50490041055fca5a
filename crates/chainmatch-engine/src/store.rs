//! Key-value state store boundary.
//!
//! The host ledger provides durable storage; the engine only needs
//! key-addressed get/put/delete plus a prefix scan. Records are JSON
//! encoded under typed key prefixes:
//!
//! | prefix | record |
//! |---|---|
//! | `account:` | `Account` (with balances) |
//! | `asset:` | `Asset` |
//! | `order:` | `Order` |
//! | `book:` | `BookSnapshot` |
//! | `trade:` | `Trade`, keyed by zero-padded log index |
//! | `event:` | `EngineEvent`, keyed by zero-padded log index |
//! | `meta:` | cursor, supply counters, config fingerprint |

use std::collections::BTreeMap;

use chainmatch_types::{ChainmatchError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub const ACCOUNT_PREFIX: &str = "account:";
pub const ASSET_PREFIX: &str = "asset:";
pub const ORDER_PREFIX: &str = "order:";
pub const BOOK_PREFIX: &str = "book:";
pub const TRADE_PREFIX: &str = "trade:";
pub const EVENT_PREFIX: &str = "event:";
pub const META_CURSOR: &str = "meta:cursor";
pub const META_SUPPLY: &str = "meta:supply";
pub const META_CONFIG: &str = "meta:config_fingerprint";

/// Every prefix a snapshot owns.
pub const SNAPSHOT_PREFIXES: [&str; 7] = [
    ACCOUNT_PREFIX,
    ASSET_PREFIX,
    ORDER_PREFIX,
    BOOK_PREFIX,
    TRADE_PREFIX,
    EVENT_PREFIX,
    "meta:",
];

pub trait StateStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<()>;
    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

/// In-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Store `value` as JSON under `key`.
pub fn put_json<T: Serialize>(store: &mut dyn StateStore, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.put(key, bytes)
}

/// Load a JSON record, `None` if the key is absent.
pub fn get_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    store
        .get(key)?
        .map(|bytes| decode(key, &bytes))
        .transpose()
}

/// Load every JSON record under `prefix`, in key order.
pub fn scan_json<T: DeserializeOwned>(store: &dyn StateStore, prefix: &str) -> Result<Vec<T>> {
    store
        .scan_prefix(prefix)?
        .into_iter()
        .map(|(key, bytes)| decode(&key, &bytes))
        .collect()
}

/// Zero-padded log index key, so key order equals log order.
#[must_use]
pub fn log_key(prefix: &str, index: usize) -> String {
    format!("{prefix}{index:020}")
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ChainmatchError::Store(format!("corrupt record at {key}: {e}")))
}
