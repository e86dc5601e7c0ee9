//! Append-only sign-in history with retention pruning.
//!
//! The ledger is a JSON list in the host key-value store, rewritten as a
//! whole on every append. Retention is a whole-day difference from "now";
//! entries with unparseable timestamps are repaired (stamped with the
//! current time) and kept rather than silently dropped. All persistence
//! failures degrade to empty defaults; the ledger never aborts a sign-in
//! run.

use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::host::{KeyValueStore, keys};
use crate::outcome::{DATE_FORMAT, SignAttempt};

pub struct HistoryLedger {
    store: Arc<dyn KeyValueStore>,
    retention_days: i64,
}

impl HistoryLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, retention_days: i64) -> Self {
        Self {
            store,
            retention_days: retention_days.max(1),
        }
    }

    /// Current entries, newest last. A missing or corrupt document reads as
    /// empty.
    pub async fn entries(&self) -> Vec<SignAttempt> {
        match self.store.get(keys::SIGN_HISTORY).await {
            Ok(Some(Value::Null)) | Ok(None) => Vec::new(),
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|err| {
                log::error!("sign history is corrupt, starting fresh: {err}");
                Vec::new()
            }),
            Err(err) => {
                log::error!("failed to read sign history: {err}");
                Vec::new()
            }
        }
    }

    /// Append one entry, prune expired ones, and write the list back as a
    /// single replacement.
    pub async fn append(&self, mut entry: SignAttempt) {
        if entry.date.trim().is_empty() {
            entry.date = Local::now().format(DATE_FORMAT).to_string();
        }

        let mut history = self.entries().await;
        history.push(entry);

        let now = Local::now().naive_local();
        let before = history.len();
        let mut retained = Vec::with_capacity(history.len());
        for mut record in history {
            match NaiveDateTime::parse_from_str(&record.date, DATE_FORMAT) {
                Ok(when) => {
                    if (now - when).num_days() < self.retention_days {
                        retained.push(record);
                    }
                }
                Err(_) => {
                    // Repair rather than drop: a mangled timestamp is not a
                    // reason to lose the outcome itself.
                    log::warn!("repairing history entry with bad timestamp {:?}", record.date);
                    record.date = Local::now().format(DATE_FORMAT).to_string();
                    retained.push(record);
                }
            }
        }
        if retained.len() != before {
            log::info!("history pruned: {} -> {} entries", before, retained.len());
        }

        match serde_json::to_value(&retained) {
            Ok(value) => {
                if let Err(err) = self.store.set(keys::SIGN_HISTORY, value).await {
                    log::error!("failed to persist sign history: {err}");
                }
            }
            Err(err) => log::error!("failed to serialize sign history: {err}"),
        }
    }

    /// Persist the timestamp of the latest successful sign-in.
    pub async fn record_last_sign(&self) {
        let now = Local::now().format(DATE_FORMAT).to_string();
        if let Err(err) = self.store.set(keys::LAST_SIGN_DATE, Value::String(now)).await {
            log::error!("failed to persist last sign date: {err}");
        }
    }

    /// Whether a Success-family entry (or the persisted last-sign
    /// timestamp) falls on `today`.
    pub async fn is_already_signed_today(&self, today: NaiveDate) -> bool {
        let signed_in_history = self.entries().await.iter().any(|entry| {
            entry.status.is_success_family()
                && NaiveDateTime::parse_from_str(&entry.date, DATE_FORMAT)
                    .map(|when| when.date() == today)
                    .unwrap_or(false)
        });
        if signed_in_history {
            return true;
        }

        match self.store.get(keys::LAST_SIGN_DATE).await {
            Ok(Some(Value::String(raw))) => {
                NaiveDateTime::parse_from_str(&raw, DATE_FORMAT)
                    .map(|when| when.date() == today)
                    .unwrap_or(false)
            }
            Ok(_) => false,
            Err(err) => {
                log::error!("failed to read last sign date: {err}");
                false
            }
        }
    }

    /// Wipe the history and every cached document derived from it.
    pub async fn clear(&self) {
        for key in [
            keys::SIGN_HISTORY,
            keys::LAST_SIGN_DATE,
            keys::LAST_USER_INFO,
            keys::LAST_ATTENDANCE_RECORD,
        ] {
            if let Err(err) = self.store.set(key, Value::Null).await {
                log::error!("failed to clear {key}: {err}");
            }
        }
        log::info!("sign history cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryStore;
    use crate::outcome::SignStatus;
    use chrono::Duration;

    fn attempt_at(status: SignStatus, when: NaiveDateTime) -> SignAttempt {
        let mut attempt = SignAttempt::new(status, "test");
        attempt.date = when.format(DATE_FORMAT).to_string();
        attempt
    }

    #[tokio::test]
    async fn append_prunes_expired_entries() {
        let store = Arc::new(MemoryStore::new());
        let ledger = HistoryLedger::new(store.clone(), 30);
        let now = Local::now().naive_local();

        ledger
            .append(attempt_at(SignStatus::Success, now - Duration::days(45)))
            .await;
        ledger
            .append(attempt_at(SignStatus::Success, now - Duration::days(10)))
            .await;
        ledger.append(attempt_at(SignStatus::Failed, now)).await;

        let entries = ledger.entries().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| {
            let when = NaiveDateTime::parse_from_str(&e.date, DATE_FORMAT).unwrap();
            (now - when).num_days() < 30
        }));
    }

    #[tokio::test]
    async fn bad_timestamps_are_repaired_not_dropped() {
        let store = Arc::new(MemoryStore::new());
        let ledger = HistoryLedger::new(store.clone(), 30);

        let mut broken = SignAttempt::new(SignStatus::Success, "old entry");
        broken.date = "definitely not a date".into();
        ledger.append(broken).await;

        let entries = ledger.entries().await;
        assert_eq!(entries.len(), 1);
        assert!(NaiveDateTime::parse_from_str(&entries[0].date, DATE_FORMAT).is_ok());
    }

    #[tokio::test]
    async fn empty_date_gets_stamped() {
        let store = Arc::new(MemoryStore::new());
        let ledger = HistoryLedger::new(store, 30);
        let mut attempt = SignAttempt::new(SignStatus::Failed, "x");
        attempt.date = String::new();
        ledger.append(attempt).await;
        let entries = ledger.entries().await;
        assert!(!entries[0].date.is_empty());
    }

    #[tokio::test]
    async fn already_signed_today_via_history() {
        let store = Arc::new(MemoryStore::new());
        let ledger = HistoryLedger::new(store, 30);
        let today = Local::now().date_naive();

        assert!(!ledger.is_already_signed_today(today).await);

        ledger
            .append(SignAttempt::new(SignStatus::Failed, "blocked"))
            .await;
        assert!(!ledger.is_already_signed_today(today).await);

        ledger
            .append(SignAttempt::new(SignStatus::AlreadySigned, "dup"))
            .await;
        assert!(ledger.is_already_signed_today(today).await);
    }

    #[tokio::test]
    async fn already_signed_today_via_last_sign_date() {
        let store = Arc::new(MemoryStore::new());
        let ledger = HistoryLedger::new(store, 30);
        let today = Local::now().date_naive();

        ledger.record_last_sign().await;
        assert!(ledger.is_already_signed_today(today).await);
    }

    #[tokio::test]
    async fn clear_wipes_everything() {
        let store = Arc::new(MemoryStore::new());
        let ledger = HistoryLedger::new(store.clone(), 30);
        ledger
            .append(SignAttempt::new(SignStatus::Success, "ok"))
            .await;
        ledger.record_last_sign().await;

        ledger.clear().await;
        assert!(ledger.entries().await.is_empty());
        assert!(!ledger.is_already_signed_today(Local::now().date_naive()).await);
    }
}
