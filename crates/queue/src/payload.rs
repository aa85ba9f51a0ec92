//! Queue message shapes.

use meshgen_core::types::DbId;
use serde::{Deserialize, Serialize};

/// What a producer enqueues: just enough to locate the work in the
/// database. Everything else (prompt, provider state, URLs) is loaded by
/// the handler so that retried deliveries always see current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Row id in `generation_jobs`.
    pub job_id: DbId,
    /// The image or model row this job produces.
    pub entity_id: DbId,
    /// The generation request the job belongs to.
    pub request_id: DbId,
    pub user_id: DbId,
}

/// A payload plus its delivery bookkeeping. The attempt counter lives in
/// the message, not the database: broker-level redelivery and job-level
/// retry state are tracked independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDelivery {
    pub payload: JobPayload,
    /// 1-based attempt number for this delivery.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl JobDelivery {
    pub fn first(payload: JobPayload, max_attempts: u32) -> Self {
        Self {
            payload,
            attempt: 1,
            max_attempts,
        }
    }

    /// Whether another delivery may be scheduled after a failure.
    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// The delivery to schedule after a failed attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            attempt: self.attempt + 1,
            max_attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> JobPayload {
        JobPayload {
            job_id: 7,
            entity_id: 3,
            request_id: 11,
            user_id: 1,
        }
    }

    #[test]
    fn attempts_exhaust_at_max() {
        let mut delivery = JobDelivery::first(payload(), 3);
        assert_eq!(delivery.attempt, 1);
        assert!(delivery.has_attempts_left());

        delivery = delivery.next_attempt();
        assert_eq!(delivery.attempt, 2);
        assert!(delivery.has_attempts_left());

        delivery = delivery.next_attempt();
        assert_eq!(delivery.attempt, 3);
        assert!(!delivery.has_attempts_left());
    }

    #[test]
    fn single_attempt_queue_never_retries() {
        let delivery = JobDelivery::first(payload(), 1);
        assert!(!delivery.has_attempts_left());
    }

    #[test]
    fn delivery_survives_the_broker_round_trip() {
        let delivery = JobDelivery::first(payload(), 3).next_attempt();
        let raw = serde_json::to_string(&delivery).unwrap();
        let back: JobDelivery = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.payload, delivery.payload);
        assert_eq!(back.attempt, 2);
        assert_eq!(back.max_attempts, 3);
    }
}
