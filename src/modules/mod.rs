//! Supporting services around the sign-in core.
//!
//! History, retry, statistics, and request pacing each live in their own
//! submodule and are wired together by the signer.

pub mod history;
pub mod retry;
pub mod stats;
pub mod timing;

pub use history::HistoryLedger;
pub use retry::{RetryDecision, RetryScheduler};
pub use stats::{CreditSource, RewardRecord, SigninStats};
