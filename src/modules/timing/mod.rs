//! Human-like request pacing.
//!
//! One uniformly random delay before the sign-in call; a bot that fires at
//! the exact cron second every day is trivially detectable.

use std::time::Duration;

use rand::Rng;

/// Uniform random delay in `[min_secs, max_secs]`. A degenerate range
/// (min of zero, or inverted bounds) disables the delay with a warning.
pub fn human_delay(min_secs: u64, max_secs: u64) -> Duration {
    if min_secs == 0 || max_secs < min_secs {
        if max_secs < min_secs {
            log::warn!("delay bounds invalid (min={min_secs}, max={max_secs}), skipping wait");
        }
        return Duration::ZERO;
    }
    let secs = rand::thread_rng().gen_range(min_secs as f64..=max_secs as f64);
    Duration::from_secs_f64(secs)
}
