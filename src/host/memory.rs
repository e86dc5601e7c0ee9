//! In-memory key-value store, primarily for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use super::{KeyValueStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let guard = self
            .data
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut guard = self
            .data
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        guard.insert(key.to_string(), value);
        Ok(())
    }
}
