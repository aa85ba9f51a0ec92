//! Failure settlement shared by the queue workers.
//!
//! A failed attempt either schedules a retry (attempts remain) or ends the
//! job and its request (budget spent). The decision is pure so the
//! RETRYING-versus-FAILED split is testable without a database.

use std::time::Duration;

use meshgen_core::backoff::retry_delay;
use meshgen_core::types::Timestamp;
use meshgen_queue::JobDelivery;

/// What a failed attempt does to the job row.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FailureAction {
    /// Attempts remain: the job moves to RETRYING and the queue redelivers
    /// at `next_retry_at`.
    Retry { next_retry_at: Timestamp },
    /// Budget spent: the job and its request move to FAILED.
    Fail,
}

pub(crate) fn failure_action(
    delivery: &JobDelivery,
    backoff_base: Duration,
    now: Timestamp,
) -> FailureAction {
    if delivery.has_attempts_left() {
        let delay = retry_delay(backoff_base, delivery.attempt);
        let next_retry_at =
            now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        FailureAction::Retry { next_retry_at }
    } else {
        FailureAction::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshgen_queue::JobPayload;

    fn first_delivery(max_attempts: u32) -> JobDelivery {
        JobDelivery::first(
            JobPayload {
                job_id: 1,
                entity_id: 2,
                request_id: 3,
                user_id: 4,
            },
            max_attempts,
        )
    }

    #[test]
    fn a_job_fails_after_max_minus_one_retries() {
        let now = chrono::Utc::now();
        let mut delivery = first_delivery(3);
        let mut retries = 0;
        loop {
            match failure_action(&delivery, Duration::from_secs(5), now) {
                FailureAction::Retry { .. } => {
                    retries += 1;
                    delivery = delivery.next_attempt();
                }
                FailureAction::Fail => break,
            }
        }
        // mark_retrying bumps retry_count once per Retry, so the count at
        // FAILED is the attempt budget minus the terminal attempt.
        assert_eq!(retries, 2);
        assert_eq!(delivery.attempt, 3);
    }

    #[test]
    fn retry_delay_doubles_per_attempt() {
        let now = chrono::Utc::now();
        let base = Duration::from_secs(5);

        let first = first_delivery(4);
        assert_eq!(
            failure_action(&first, base, now),
            FailureAction::Retry {
                next_retry_at: now + chrono::Duration::seconds(5)
            }
        );

        let second = first.next_attempt();
        assert_eq!(
            failure_action(&second, base, now),
            FailureAction::Retry {
                next_retry_at: now + chrono::Duration::seconds(10)
            }
        );

        let third = second.next_attempt();
        assert_eq!(
            failure_action(&third, base, now),
            FailureAction::Retry {
                next_retry_at: now + chrono::Duration::seconds(20)
            }
        );
    }

    #[test]
    fn single_attempt_budget_fails_immediately() {
        let delivery = first_delivery(1);
        assert_eq!(
            failure_action(&delivery, Duration::from_secs(5), chrono::Utc::now()),
            FailureAction::Fail
        );
    }
}
