//! Deep-Research Execution Driver
//!
//! Drives one research interaction end to end: create a reference store,
//! attach the project documents (blocking until indexed), start the agent
//! under the global rate limiter, then poll until it completes or the
//! timeout elapses. The reference store is deleted on every exit path;
//! cleanup failures are logged and never override the research outcome.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ai::provider::{ResearchProvider, ResearchRateLimiter, ResearchStatus};
use crate::types::{ForgeError, Result};

/// Documents to ground a research interaction in.
pub struct ResearchInput<'a> {
    pub target_spec: &'a str,
    pub technical_assets: &'a str,
}

/// Timing knobs for one research interaction.
#[derive(Debug, Clone, Copy)]
pub struct ResearchTiming {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

/// Run a research interaction to completion and return the report text.
///
/// Blocks for up to `timing.timeout`; the poll loop checks elapsed time
/// before each sleep so the error names the configured ceiling.
pub async fn run_research(
    provider: &dyn ResearchProvider,
    rate_limiter: &ResearchRateLimiter,
    label: &str,
    prompt: &str,
    input: &ResearchInput<'_>,
    timing: ResearchTiming,
) -> Result<String> {
    let store_id = provider.create_reference_store(label).await?;
    debug!(store = %store_id, "Created reference store");

    let result = drive(provider, rate_limiter, &store_id, prompt, input, timing).await;

    // Cleanup must not mask the research outcome
    if let Err(e) = provider.delete_reference_store(&store_id).await {
        warn!(store = %store_id, "Failed to delete reference store: {}", e);
    }

    result
}

async fn drive(
    provider: &dyn ResearchProvider,
    rate_limiter: &ResearchRateLimiter,
    store_id: &str,
    prompt: &str,
    input: &ResearchInput<'_>,
    timing: ResearchTiming,
) -> Result<String> {
    provider
        .attach_document(store_id, input.target_spec, "target-spec")
        .await?;
    provider
        .attach_document(store_id, input.technical_assets, "technical-assets")
        .await?;

    rate_limiter.acquire().await;
    let interaction_id = provider.start_research(prompt, store_id).await?;
    info!(interaction = %interaction_id, "Research started");

    poll_to_completion(provider, &interaction_id, timing).await
}

/// Poll an already-started interaction until it resolves.
///
/// Split out so the fan-out strategy can resume polling a persisted
/// handle without repeating the attach/start phase.
pub async fn poll_to_completion(
    provider: &dyn ResearchProvider,
    interaction_id: &str,
    timing: ResearchTiming,
) -> Result<String> {
    let started = tokio::time::Instant::now();

    loop {
        match provider.poll_research(interaction_id).await? {
            ResearchStatus::Completed(report) => {
                info!(interaction = %interaction_id, "Research completed");
                return Ok(report);
            }
            ResearchStatus::Failed(reason) => {
                return Err(ForgeError::ResearchFailed(reason));
            }
            ResearchStatus::InProgress => {
                if started.elapsed() >= timing.timeout {
                    return Err(ForgeError::timeout(
                        format!("research interaction {}", interaction_id),
                        timing.timeout,
                    ));
                }
                debug!(interaction = %interaction_id, "Research in progress");
                tokio::time::sleep(timing.poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted provider recording the call order and store cleanup.
    struct ScriptedProvider {
        calls: Mutex<Vec<String>>,
        poll_results: Mutex<Vec<ResearchStatus>>,
        fail_delete: bool,
    }

    impl ScriptedProvider {
        fn new(poll_results: Vec<ResearchStatus>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                poll_results: Mutex::new(poll_results),
                fail_delete: false,
            }
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl ResearchProvider for ScriptedProvider {
        async fn create_reference_store(&self, _label: &str) -> Result<String> {
            self.record("create");
            Ok("fileStores/test".to_string())
        }

        async fn attach_document(
            &self,
            _store_id: &str,
            _content: &str,
            label: &str,
        ) -> Result<()> {
            self.record(format!("attach:{}", label));
            Ok(())
        }

        async fn start_research(&self, _prompt: &str, _store_id: &str) -> Result<String> {
            self.record("start");
            Ok("interactions/test".to_string())
        }

        async fn poll_research(&self, _interaction_id: &str) -> Result<ResearchStatus> {
            self.record("poll");
            let mut results = self.poll_results.lock().unwrap();
            if results.is_empty() {
                Ok(ResearchStatus::InProgress)
            } else {
                Ok(results.remove(0))
            }
        }

        async fn delete_reference_store(&self, _store_id: &str) -> Result<()> {
            self.record("delete");
            if self.fail_delete {
                Err(ForgeError::ProviderApi("delete failed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn timing() -> ResearchTiming {
        ResearchTiming {
            poll_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(1800),
        }
    }

    fn input() -> ResearchInput<'static> {
        ResearchInput {
            target_spec: "spec text",
            technical_assets: "assets text",
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_lifecycle_order() {
        let provider = ScriptedProvider::new(vec![
            ResearchStatus::InProgress,
            ResearchStatus::Completed("report".to_string()),
        ]);
        let limiter = ResearchRateLimiter::new(Duration::from_secs(10));

        let report = run_research(&provider, &limiter, "run-1", "prompt", &input(), timing())
            .await
            .unwrap();
        assert_eq!(report, "report");

        let calls = provider.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "create",
                "attach:target-spec",
                "attach:technical-assets",
                "start",
                "poll",
                "poll",
                "delete"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_interaction_is_research_failed() {
        let provider =
            ScriptedProvider::new(vec![ResearchStatus::Failed("quota exhausted".to_string())]);
        let limiter = ResearchRateLimiter::new(Duration::from_secs(10));

        let err = run_research(&provider, &limiter, "run-1", "prompt", &input(), timing())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ResearchFailed(_)));

        // Store still deleted after failure
        let calls = provider.calls.lock().unwrap().clone();
        assert_eq!(calls.last().unwrap(), "delete");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_budget() {
        // Never completes; paused clock advances through each poll sleep
        let provider = ScriptedProvider::new(vec![]);
        let limiter = ResearchRateLimiter::new(Duration::from_secs(10));

        let err = run_research(&provider, &limiter, "run-1", "prompt", &input(), timing())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_failure_does_not_mask_report() {
        let mut provider =
            ScriptedProvider::new(vec![ResearchStatus::Completed("report".to_string())]);
        provider.fail_delete = true;
        let limiter = ResearchRateLimiter::new(Duration::from_secs(10));

        let report = run_research(&provider, &limiter, "run-1", "prompt", &input(), timing())
            .await
            .unwrap();
        assert_eq!(report, "report");
    }
}
