//! Exponential retry backoff for queued jobs.

use std::time::Duration;

/// Exponent cap so the shift below cannot overflow; delays this large are
/// already far past any sane attempt ceiling.
const MAX_EXPONENT: u32 = 20;

/// Delay before redelivering a job after its `attempt`-th failure (1-based).
///
/// Fixed base delay, doubling per attempt: `base * 2^(attempt - 1)`.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
    base.saturating_mul(1u32 << exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let base = Duration::from_secs(5);
        assert_eq!(retry_delay(base, 1), Duration::from_secs(5));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(10));
        assert_eq!(retry_delay(base, 3), Duration::from_secs(20));
        assert_eq!(retry_delay(base, 4), Duration::from_secs(40));
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let d = retry_delay(Duration::from_secs(1), u32::MAX);
        assert_eq!(d, Duration::from_secs(1 << MAX_EXPONENT));
    }
}
