//! Sign-in outcome types and the logic that produces them.
//!
//! The classifier turns one raw HTTP response into a definite verdict; the
//! reconciler cross-checks a failed verdict against the attendance record.

pub mod classifier;
pub mod reconciler;

use chrono::Local;
use serde::{Deserialize, Serialize};

pub use classifier::{Classification, Classified, classify};
pub use reconciler::{Reconciliation, reconcile};

/// Timestamp format used in persisted history entries.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Final status of one sign-in invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignStatus {
    Success,
    AlreadySigned,
    Failed,
    Error,
}

impl SignStatus {
    /// Success and AlreadySigned both count as "signed today".
    pub fn is_success_family(self) -> bool {
        matches!(self, SignStatus::Success | SignStatus::AlreadySigned)
    }
}

impl std::fmt::Display for SignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SignStatus::Success => "success",
            SignStatus::AlreadySigned => "already signed",
            SignStatus::Failed => "failed",
            SignStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// One appended ledger entry; immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignAttempt {
    pub date: String,
    pub status: SignStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_signers: Option<i64>,
}

impl SignAttempt {
    pub fn new(status: SignStatus, message: impl Into<String>) -> Self {
        Self {
            date: Local::now().format(DATE_FORMAT).to_string(),
            status,
            message: message.into(),
            gain: None,
            rank: None,
            total_signers: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(SignStatus::Error, message)
    }
}

/// Today's attendance record as reported by the board endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub gain: Option<i64>,
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub total_signers: Option<i64>,
}
