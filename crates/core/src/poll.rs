//! Poll policy for asynchronous provider jobs.
//!
//! The 3D-model provider is submit-then-poll: the worker submits a job, then
//! queries status on a fixed interval until the provider reports a terminal
//! state or the attempt budget runs out. The policy is a plain value so the
//! timeout/backoff behaviour can be tested independently of any worker.

use std::time::Duration;

/// Default seconds between provider status polls.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default maximum number of polls before the job is treated as timed out
/// (60 polls at 10s each, roughly ten minutes).
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Progress reported while the provider has not yet started or finished.
const PROGRESS_FLOOR: i16 = 10;

/// Progress is never reported above this value until completion.
const PROGRESS_CEILING: i16 = 90;

/// Bounded polling strategy: how often to poll, how many times, and how a
/// poll attempt maps to a client-facing progress percentage.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Progress percentage for a 1-based poll attempt.
    ///
    /// Maps the attempt budget onto 10..=90: the first poll reports 10, and
    /// values increase monotonically without ever reaching 100; completion
    /// is only signalled by the terminal event.
    pub fn progress_for_attempt(&self, attempt: u32) -> i16 {
        if self.max_attempts == 0 {
            return PROGRESS_FLOOR;
        }
        let span = (PROGRESS_CEILING - PROGRESS_FLOOR) as u64;
        let step = (attempt.saturating_sub(1) as u64 * span) / self.max_attempts as u64;
        (PROGRESS_FLOOR as u64 + step).min(PROGRESS_CEILING as u64) as i16
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_reports_floor() {
        let policy = PollPolicy::default();
        assert_eq!(policy.progress_for_attempt(1), 10);
    }

    #[test]
    fn progress_is_monotone_and_bounded() {
        let policy = PollPolicy::default();
        let mut last = 0;
        for attempt in 1..=policy.max_attempts {
            let p = policy.progress_for_attempt(attempt);
            assert!(p >= last, "attempt {attempt} regressed: {p} < {last}");
            assert!((10..=90).contains(&p));
            last = p;
        }
    }

    #[test]
    fn attempts_past_budget_stay_at_ceiling() {
        let policy = PollPolicy::new(Duration::from_secs(1), 4);
        assert_eq!(policy.progress_for_attempt(1000), 90);
    }
}
