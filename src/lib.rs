//! # nodeseek-sign
//!
//! Automated daily sign-in for the NodeSeek forum.
//!
//! The crate centers on [`SignService`]: it walks a browser-impersonating
//! transport fallback chain to reach the attendance API, classifies the
//! response, cross-checks failures against the attendance board, keeps a
//! pruned local history, schedules randomized retries through the host,
//! and aggregates reward statistics from the credit ledger.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nodeseek_sign::{SignConfig, SignService};
//! use nodeseek_sign::host::{HostScheduler, MemoryStore, Notifier, NotifyError};
//!
//! struct NoopNotifier;
//!
//! #[async_trait::async_trait]
//! impl Notifier for NoopNotifier {
//!     async fn send(&self, _title: &str, _text: &str) -> Result<(), NotifyError> {
//!         Ok(())
//!     }
//! }
//!
//! struct NoopScheduler;
//!
//! impl HostScheduler for NoopScheduler {
//!     fn schedule_once(&self, _id: &str, _delay: std::time::Duration) {}
//!     fn cancel(&self, _id: &str) {}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SignConfig {
//!         cookie: "session=...".into(),
//!         ..SignConfig::default()
//!     };
//!     let service = SignService::from_config(
//!         config,
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(NoopNotifier),
//!         Arc::new(NoopScheduler),
//!     );
//!     let attempt = service.sign().await;
//!     println!("{}: {}", attempt.status, attempt.message);
//! }
//! ```

mod signer;

pub mod api;
pub mod config;
pub mod host;
pub mod modules;
pub mod outcome;
pub mod transport;

pub use crate::config::SignConfig;
pub use crate::signer::SignService;

pub use crate::host::{HostScheduler, KeyValueStore, Notifier};
pub use crate::modules::{HistoryLedger, RetryDecision, RetryScheduler, SigninStats};
pub use crate::outcome::{AttendanceRecord, SignAttempt, SignStatus};
pub use crate::transport::{AdapterChain, TransportError, TransportRequest, TransportResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
