//! Cross-checking failed verdicts against the attendance record.
//!
//! A blocked sign-in POST does not mean the sign-in failed: the server may
//! have credited the reward and only the response got eaten by the defence
//! layer. When the primary verdict is a failure, the reconciler inspects the
//! most recent attendance record and upgrades the outcome if the record says
//! today's sign-in already happened. It only ever upgrades.

use chrono::{DateTime, Local, NaiveDate, Utc};

use super::AttendanceRecord;

/// Maximum clock distance for the last-resort time-window upgrade.
const TIME_WINDOW_HOURS: f64 = 0.5;

/// Result of reconciling a failed verdict with the attendance record.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Record is dated today: the sign-in definitely happened.
    ConfirmedToday,
    /// Record is within the fuzzy clock-skew window of "now"; treated as a
    /// success only because no other signal fired.
    TimeWindow { hours: f64 },
    /// Record does not support an upgrade; the failure stands.
    Unchanged,
}

impl Reconciliation {
    pub fn is_upgrade(&self) -> bool {
        !matches!(self, Reconciliation::Unchanged)
    }
}

/// Evaluate the reconciliation rules in order against the attendance record.
///
/// `today` is the process-local calendar date; `now_utc` drives the fuzzy
/// window. Callers apply the result only to Failed verdicts; Success is
/// never revisited.
pub fn reconcile(
    record: Option<&AttendanceRecord>,
    today: NaiveDate,
    now_utc: DateTime<Utc>,
) -> Reconciliation {
    let Some(record) = record else {
        log::info!("reconcile: no attendance record available");
        return Reconciliation::Unchanged;
    };
    let Some(created_at) = record.created_at.as_deref() else {
        log::info!("reconcile: attendance record has no timestamp");
        return Reconciliation::Unchanged;
    };
    let Some(record_time) = parse_server_timestamp(created_at) else {
        log::warn!("reconcile: unparseable record timestamp {created_at:?}");
        return Reconciliation::Unchanged;
    };

    if record_time.with_timezone(&Local).date_naive() == today {
        log::info!("reconcile: attendance record confirms a sign-in today");
        return Reconciliation::ConfirmedToday;
    }

    let hours = (now_utc - record_time.with_timezone(&Utc))
        .num_seconds()
        .abs() as f64
        / 3600.0;
    log::info!("reconcile: record/now distance {hours:.2}h");
    if hours < TIME_WINDOW_HOURS {
        return Reconciliation::TimeWindow { hours };
    }

    Reconciliation::Unchanged
}

/// Server timestamps arrive as RFC 3339, usually with a trailing `Z`.
fn parse_server_timestamp(raw: &str) -> Option<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).ok()
}
