//! redb-backed key-value store.
//!
//! Documents are serialized to JSON strings inside a single redb table.
//! Every write is its own transaction; the documents are small and written
//! once per sign-in run, so transaction overhead is irrelevant.

use std::path::Path;

use async_trait::async_trait;
use redb::{Database, TableDefinition};
use serde_json::Value;

use super::{KeyValueStore, StoreError};

const TABLE: TableDefinition<&str, &str> = TableDefinition::new("nodeseek_sign_kv");

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl KeyValueStore for RedbStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let table = match txn.open_table(TABLE) {
            Ok(table) => table,
            // First read before any write: the table does not exist yet.
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StoreError::Backend(e.to_string())),
        };
        let entry = table
            .get(key)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        match entry {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(&value)?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        {
            let mut table = txn
                .open_table(TABLE)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            table
                .insert(key, serialized.as_str())
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
