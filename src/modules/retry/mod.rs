//! Retry scheduling after a failed sign-in.
//!
//! A small state machine: Idle until a final failure, Scheduled while one
//! (and only one) one-shot retry is registered with the host scheduler.
//! Scheduling a new retry always cancels the previous handle first, so at
//! most one retry task ever exists. The attempt counter lives in process
//! memory; it resets on any success and on process restart.

use std::ops::RangeInclusive;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use crate::host::HostScheduler;

/// Backoff window for a retry, minutes.
const RETRY_DELAY_MINUTES: RangeInclusive<u64> = 5..=15;

/// Outcome of asking the scheduler to handle a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// A retry was registered with the host.
    Scheduled {
        task_id: String,
        delay: Duration,
        attempt: u32,
        max_attempts: u32,
    },
    /// Retries are disabled (`max_attempts == 0`).
    Disabled,
    /// The attempt budget for the day is spent.
    Exhausted { max_attempts: u32 },
}

/// Per-day retry state. `Idle` when `pending` is `None`, `Scheduled`
/// otherwise.
#[derive(Debug)]
pub struct RetryScheduler {
    attempts_used: u32,
    max_attempts: u32,
    pending: Option<String>,
}

impl RetryScheduler {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts_used: 0,
            max_attempts,
            pending: None,
        }
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    /// Handle a final failure: schedule a randomized retry if budget
    /// remains, replacing any outstanding one.
    pub fn on_failure(&mut self, host: &dyn HostScheduler) -> RetryDecision {
        let delay_minutes = rand::thread_rng().gen_range(RETRY_DELAY_MINUTES);
        self.on_failure_with_delay(host, Duration::from_secs(delay_minutes * 60))
    }

    /// Deterministic-delay variant; `on_failure` supplies the jitter.
    pub fn on_failure_with_delay(
        &mut self,
        host: &dyn HostScheduler,
        delay: Duration,
    ) -> RetryDecision {
        if self.max_attempts == 0 {
            log::info!("retry disabled (max_attempts=0)");
            return RetryDecision::Disabled;
        }
        if self.attempts_used >= self.max_attempts {
            log::warn!("retry budget spent ({} attempts), giving up", self.max_attempts);
            return RetryDecision::Exhausted {
                max_attempts: self.max_attempts,
            };
        }

        if let Some(old) = self.pending.take() {
            log::info!("replacing pending retry task {old}");
            host.cancel(&old);
        }

        self.attempts_used += 1;
        let task_id = format!(
            "nodeseek-retry-{}-{}",
            self.attempts_used,
            Utc::now().timestamp_millis()
        );
        host.schedule_once(&task_id, delay);
        self.pending = Some(task_id.clone());
        log::info!(
            "retry {}/{} scheduled in {}s",
            self.attempts_used,
            self.max_attempts,
            delay.as_secs()
        );

        RetryDecision::Scheduled {
            task_id,
            delay,
            attempt: self.attempts_used,
            max_attempts: self.max_attempts,
        }
    }

    /// A success resets the attempt budget. Any pending retry is left to
    /// fire: the duplicate run classifies as already-signed and is harmless.
    pub fn on_success(&mut self) {
        self.attempts_used = 0;
        self.pending = None;
    }

    /// Cancel the outstanding retry, if any; used on service shutdown.
    pub fn cancel_pending(&mut self, host: &dyn HostScheduler) {
        if let Some(id) = self.pending.take() {
            host.cancel(&id);
        }
    }
}
