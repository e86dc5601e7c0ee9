//! Interfaces to the host environment.
//!
//! The sign-in core does not own scheduling, persistence, or messaging; it
//! talks to whatever the embedding process provides through these traits.
//! A redb-backed key-value store ships as the default persistence backend
//! and an in-memory store backs the tests.

pub mod memory;
pub mod redb_store;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Small-document key-value persistence provided by the host.
///
/// Values are JSON-like; callers store history lists, cached records and
/// diagnostics snippets. Implementations should be durable across runs.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Best-effort user messaging. Callers log and swallow errors; a missed
/// notification must never abort a sign-in run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, title: &str, text: &str) -> Result<(), NotifyError>;
}

/// One-shot job scheduling provided by the host scheduler.
///
/// The core only ever keeps a single named retry outstanding; replacing it
/// goes through `cancel` first.
pub trait HostScheduler: Send + Sync {
    fn schedule_once(&self, id: &str, delay: Duration);
    fn cancel(&self, id: &str);
}

/// Storage keys used by the sign-in core.
pub mod keys {
    pub const SIGN_HISTORY: &str = "sign_history";
    pub const LAST_SIGN_DATE: &str = "last_sign_date";
    pub const LAST_USER_INFO: &str = "last_user_info";
    pub const LAST_ATTENDANCE_RECORD: &str = "last_attendance_record";
    pub const LAST_SIGN_RESPONSE: &str = "last_sign_response";
    pub const LAST_ATTENDANCE_RESPONSE: &str = "last_attendance_response";
    pub const LAST_SIGNIN_STATS: &str = "last_signin_stats";
}
