//! Bounded polling of an asynchronous model provider.
//!
//! Factored out of the model worker so the scenarios (long wait then done,
//! explicit failure, budget exhaustion) are testable against a scripted
//! provider with no database.

use std::future::Future;

use meshgen_core::poll::PollPolicy;
use meshgen_providers::{ModelProvider, ModelTaskState, ModelTaskStatus, ProviderError};

/// Terminal result of a poll loop.
#[derive(Debug)]
pub enum PollOutcome {
    /// Provider reported DONE; carries the final status with result files.
    Done(ModelTaskStatus),
    /// Provider reported FAIL.
    Failed {
        message: String,
        code: Option<i32>,
    },
    /// The attempt budget ran out before a terminal state.
    BudgetExhausted,
}

/// Poll until the task terminates or the attempt budget is spent.
///
/// `on_progress` runs once per non-terminal poll with the 1-based attempt
/// number and its mapped progress value; the terminal poll emits no
/// progress. A status-query error aborts the loop and counts as a failed
/// job attempt at the caller.
pub async fn poll_model_task<F, Fut>(
    provider: &dyn ModelProvider,
    policy: &PollPolicy,
    provider_job_id: &str,
    mut on_progress: F,
) -> Result<PollOutcome, ProviderError>
where
    F: FnMut(u32, i16) -> Fut,
    Fut: Future<Output = ()>,
{
    for attempt in 1..=policy.max_attempts {
        let status = provider.query_status(provider_job_id).await?;
        match status.status {
            ModelTaskState::Done => return Ok(PollOutcome::Done(status)),
            ModelTaskState::Fail => {
                return Ok(PollOutcome::Failed {
                    message: status
                        .error_message
                        .unwrap_or_else(|| "provider reported failure".to_string()),
                    code: status.error_code,
                })
            }
            ModelTaskState::Wait | ModelTaskState::Run => {
                on_progress(attempt, policy.progress_for_attempt(attempt)).await;
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }
    Ok(PollOutcome::BudgetExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use meshgen_providers::ModelResultFile;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct ScriptedProvider {
        responses: Mutex<VecDeque<ModelTaskStatus>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ModelTaskStatus>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        async fn submit(&self, _image_url: &str) -> Result<String, ProviderError> {
            Ok("job-1".to_string())
        }

        async fn query_status(&self, _id: &str) -> Result<ModelTaskStatus, ProviderError> {
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("script ran out of responses"))
        }
    }

    fn waiting() -> ModelTaskStatus {
        ModelTaskStatus {
            status: ModelTaskState::Wait,
            result_files: Vec::new(),
            error_message: None,
            error_code: None,
        }
    }

    fn policy(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(Duration::ZERO, max_attempts)
    }

    #[tokio::test]
    async fn long_wait_then_done_reports_progress_per_poll() {
        let mut script: Vec<ModelTaskStatus> = (0..59).map(|_| waiting()).collect();
        script.push(ModelTaskStatus {
            status: ModelTaskState::Done,
            result_files: vec![ModelResultFile {
                url: "https://x/model.zip".to_string(),
                file_type: "OBJ".to_string(),
                preview_image_url: None,
            }],
            error_message: None,
            error_code: None,
        });
        let provider = ScriptedProvider::new(script);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let outcome = poll_model_task(&provider, &policy(60), "job-1", |attempt, progress| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push((attempt, progress));
            }
        })
        .await
        .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 59);
        assert_eq!(seen[0], (1, 10));
        for window in seen.windows(2) {
            assert!(window[1].1 >= window[0].1, "progress must be monotone");
        }
        assert!(seen.iter().all(|(_, p)| (10..=90).contains(p)));
        assert_matches!(outcome, PollOutcome::Done(status) => {
            assert_eq!(status.result_files[0].url, "https://x/model.zip");
        });
    }

    #[tokio::test]
    async fn provider_failure_surfaces_message_and_code() {
        let provider = ScriptedProvider::new(vec![ModelTaskStatus {
            status: ModelTaskState::Fail,
            result_files: Vec::new(),
            error_message: Some("quota exceeded".to_string()),
            error_code: Some(429),
        }]);

        let outcome = poll_model_task(&provider, &policy(60), "job-1", |_, _| async {})
            .await
            .unwrap();

        assert_matches!(outcome, PollOutcome::Failed { message, code } => {
            assert!(message.contains("quota exceeded"));
            assert_eq!(code, Some(429));
        });
    }

    #[tokio::test]
    async fn budget_exhaustion_after_max_attempts() {
        let provider = ScriptedProvider::new((0..5).map(|_| waiting()).collect());
        let polls = Arc::new(Mutex::new(0u32));

        let outcome = poll_model_task(&provider, &policy(5), "job-1", |_, _| {
            let polls = polls.clone();
            async move {
                *polls.lock().unwrap() += 1;
            }
        })
        .await
        .unwrap();

        assert_matches!(outcome, PollOutcome::BudgetExhausted);
        assert_eq!(*polls.lock().unwrap(), 5);
    }
}
