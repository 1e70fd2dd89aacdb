//! Research Execution Strategies
//!
//! Step 2 runs in one of two shapes, selected by configuration:
//!
//! - `SharedResearchStrategy`: one research interaction covers all
//!   requested hypotheses and its report is the step output.
//! - `FanOutResearchStrategy`: one interaction per hypothesis, driven
//!   through a bounded worker pool whose state lives in persisted
//!   per-item rows so the pool survives process restarts. The per-item
//!   reports are merged into a single step output.
//!
//! Either way the sequencer sees one opaque report string; validation
//! and the later steps are shared.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::ai::provider::{ResearchProvider, ResearchRateLimiter, ResearchStatus};
use crate::ai::research::{ResearchInput, ResearchTiming, run_research};
use crate::storage::Database;
use crate::types::{ForgeError, Result, Run};

/// Everything a strategy needs to produce the step-2 report.
pub struct ResearchContext<'a> {
    pub db: &'a Database,
    pub provider: &'a dyn ResearchProvider,
    pub rate_limiter: &'a ResearchRateLimiter,
    pub run: &'a Run,
    pub prompt: &'a str,
    pub input: ResearchInput<'a>,
    pub timing: ResearchTiming,
}

/// Produces the raw research report for step 2.
#[async_trait]
pub trait ResearchStrategy: Send + Sync {
    async fn execute(&self, ctx: &ResearchContext<'_>) -> Result<String>;
}

// =============================================================================
// Shared Strategy
// =============================================================================

/// One research interaction for the whole batch.
pub struct SharedResearchStrategy;

#[async_trait]
impl ResearchStrategy for SharedResearchStrategy {
    async fn execute(&self, ctx: &ResearchContext<'_>) -> Result<String> {
        run_research(
            ctx.provider,
            ctx.rate_limiter,
            &format!("{}-loop{}", ctx.run.id, ctx.run.current_loop),
            ctx.prompt,
            &ctx.input,
            ctx.timing,
        )
        .await
    }
}

// =============================================================================
// Fan-Out Strategy
// =============================================================================

/// Per-hypothesis research through a bounded, restart-safe worker pool.
///
/// Pool state is the persisted task row, not in-memory futures: an item
/// is `pending` until claimed, `polling` while its interaction is open,
/// `completed` once its report is stored. A `polling` row with neither
/// handle nor output is a crash artifact and gets restarted. The
/// concurrency cap is enforced against the persisted open-handle count,
/// so it holds across restarts too.
pub struct FanOutResearchStrategy {
    max_concurrent: usize,
}

impl FanOutResearchStrategy {
    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    /// Start one item: claim it, stand up its reference store, begin the
    /// interaction, persist the handle. Returns the store id so the
    /// caller can clean it up after completion.
    async fn start_item(
        &self,
        ctx: &ResearchContext<'_>,
        item_index: usize,
        total: usize,
    ) -> Result<String> {
        let run = ctx.run;
        ctx.db
            .claim_research_task(&run.id, run.current_loop, item_index)?;

        let label = format!("{}-loop{}-item{}", run.id, run.current_loop, item_index);
        let store_id = ctx.provider.create_reference_store(&label).await?;
        ctx.provider
            .attach_document(&store_id, ctx.input.target_spec, "target-spec")
            .await?;
        ctx.provider
            .attach_document(&store_id, ctx.input.technical_assets, "technical-assets")
            .await?;

        let prompt = format!(
            "{}\n\nFor this interaction, research only candidate {} of {}. \
             Propose exactly one hypothesis.",
            ctx.prompt,
            item_index + 1,
            total
        );

        ctx.rate_limiter.acquire().await;
        let interaction_id = ctx.provider.start_research(&prompt, &store_id).await?;
        ctx.db
            .set_research_task_handle(&run.id, run.current_loop, item_index, &interaction_id)?;
        info!(item = item_index, interaction = %interaction_id, "Fan-out research started");

        Ok(store_id)
    }
}

#[async_trait]
impl ResearchStrategy for FanOutResearchStrategy {
    async fn execute(&self, ctx: &ResearchContext<'_>) -> Result<String> {
        let run = ctx.run;
        let total = run.hypothesis_count;
        ctx.db
            .ensure_research_tasks(&run.id, run.current_loop, total)?;

        // Store ids are process-local; after a restart the stores of
        // previously-open items leak, which the provider contract accepts
        let mut stores: Vec<Option<String>> = vec![None; total];
        // The poll ceiling is per interaction. Items already open at
        // entry (a resumed invocation) start their clock here.
        let mut started_at: Vec<Option<tokio::time::Instant>> = vec![None; total];

        loop {
            let tasks = ctx.db.list_research_tasks(&run.id, run.current_loop)?;

            if tasks.iter().all(|t| t.output.is_some()) {
                let merged = tasks
                    .iter()
                    .enumerate()
                    .map(|(i, t)| {
                        format!(
                            "## Candidate {}\n\n{}",
                            i + 1,
                            t.output.as_deref().unwrap_or("")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n");
                return Ok(merged);
            }

            // Start-phase: fill the window up to the cap
            let mut open = tasks.iter().filter(|t| t.is_open()).count();
            for task in tasks.iter().filter(|t| t.is_startable()) {
                if open >= self.max_concurrent {
                    break;
                }
                if task.is_stuck() {
                    warn!(item = task.item_index, "Restarting stuck research item");
                }
                let store_id = self.start_item(ctx, task.item_index, total).await?;
                stores[task.item_index] = Some(store_id);
                started_at[task.item_index] = Some(tokio::time::Instant::now());
                open += 1;
            }

            // Poll-phase: check every open handle once
            let tasks = ctx.db.list_research_tasks(&run.id, run.current_loop)?;
            for task in tasks.iter().filter(|t| t.is_open()) {
                let started =
                    *started_at[task.item_index].get_or_insert_with(tokio::time::Instant::now);
                if started.elapsed() >= ctx.timing.timeout {
                    return Err(ForgeError::timeout(
                        format!(
                            "fan-out research item {} for run {}",
                            task.item_index, run.id
                        ),
                        ctx.timing.timeout,
                    ));
                }
                let interaction_id = task.interaction_id.as_deref().unwrap_or_default();
                match ctx.provider.poll_research(interaction_id).await? {
                    ResearchStatus::Completed(report) => {
                        ctx.db.complete_research_task(
                            &run.id,
                            run.current_loop,
                            task.item_index,
                            &report,
                        )?;
                        if let Some(store_id) = stores[task.item_index].take()
                            && let Err(e) = ctx.provider.delete_reference_store(&store_id).await
                        {
                            warn!(store = %store_id, "Failed to delete reference store: {}", e);
                        }
                        info!(item = task.item_index, "Fan-out research item completed");
                    }
                    ResearchStatus::Failed(reason) => {
                        return Err(ForgeError::ResearchFailed(format!(
                            "item {}: {}",
                            task.item_index, reason
                        )));
                    }
                    ResearchStatus::InProgress => {
                        debug!(item = task.item_index, "Fan-out research item in progress");
                    }
                }
            }

            tokio::time::sleep(ctx.timing.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewRun;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Provider whose interactions complete after a fixed number of
    /// polls, recording the peak number of simultaneously-open handles.
    struct PoolProbeProvider {
        polls_to_complete: usize,
        poll_counts: Mutex<std::collections::HashMap<String, usize>>,
        open: AtomicUsize,
        peak_open: AtomicUsize,
        next_interaction: AtomicUsize,
    }

    impl PoolProbeProvider {
        fn new(polls_to_complete: usize) -> Self {
            Self {
                polls_to_complete,
                poll_counts: Mutex::new(Default::default()),
                open: AtomicUsize::new(0),
                peak_open: AtomicUsize::new(0),
                next_interaction: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ResearchProvider for PoolProbeProvider {
        async fn create_reference_store(&self, label: &str) -> Result<String> {
            Ok(format!("fileStores/{}", label))
        }

        async fn attach_document(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        async fn start_research(&self, _prompt: &str, _store_id: &str) -> Result<String> {
            let n = self.next_interaction.fetch_add(1, Ordering::SeqCst);
            let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_open.fetch_max(open, Ordering::SeqCst);
            Ok(format!("interactions/{}", n))
        }

        async fn poll_research(&self, interaction_id: &str) -> Result<ResearchStatus> {
            let mut counts = self.poll_counts.lock().unwrap();
            let count = counts.entry(interaction_id.to_string()).or_insert(0);
            *count += 1;
            if *count >= self.polls_to_complete {
                self.open.fetch_sub(1, Ordering::SeqCst);
                Ok(ResearchStatus::Completed(format!(
                    "report for {}",
                    interaction_id
                )))
            } else {
                Ok(ResearchStatus::InProgress)
            }
        }

        async fn delete_reference_store(&self, _store_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn make_run(db: &Database, hypothesis_count: usize) -> Run {
        let project = crate::types::Project::new("p".to_string(), None);
        db.insert_project(&project).unwrap();
        let run = NewRun {
            project_id: project.id.clone(),
            target_spec_id: "spec-1".into(),
            technical_assets_id: "assets-1".into(),
            hypothesis_count,
            loop_count: 1,
            job_name: None,
            existing_filter: None,
        }
        .into_run();
        db.insert_run(&run).unwrap();
        run
    }

    fn timing() -> ResearchTiming {
        ResearchTiming {
            poll_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(1800),
        }
    }

    fn input() -> ResearchInput<'static> {
        ResearchInput {
            target_spec: "spec",
            technical_assets: "assets",
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_completes_all_items() {
        let db = Database::open_in_memory().unwrap();
        let run = make_run(&db, 7);
        let provider = PoolProbeProvider::new(2);
        let limiter = ResearchRateLimiter::new(Duration::from_secs(10));

        let ctx = ResearchContext {
            db: &db,
            provider: &provider,
            rate_limiter: &limiter,
            run: &run,
            prompt: "research prompt",
            input: input(),
            timing: timing(),
        };
        let report = FanOutResearchStrategy::new(5).execute(&ctx).await.unwrap();

        for i in 1..=7 {
            assert!(report.contains(&format!("## Candidate {}", i)));
        }
        let tasks = db.list_research_tasks(&run.id, 1).unwrap();
        assert!(tasks.iter().all(|t| t.output.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap_never_exceeded() {
        let db = Database::open_in_memory().unwrap();
        let run = make_run(&db, 9);
        let provider = PoolProbeProvider::new(3);
        let limiter = ResearchRateLimiter::new(Duration::from_secs(1));

        let ctx = ResearchContext {
            db: &db,
            provider: &provider,
            rate_limiter: &limiter,
            run: &run,
            prompt: "research prompt",
            input: input(),
            timing: timing(),
        };
        FanOutResearchStrategy::new(5).execute(&ctx).await.unwrap();

        assert!(provider.peak_open.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_waves_get_their_own_poll_ceiling() {
        let db = Database::open_in_memory().unwrap();
        let run = make_run(&db, 3);
        // Each item needs ~1500s of polling; three sequential waves far
        // exceed the 1800s ceiling in total, but no single item does
        let provider = PoolProbeProvider::new(100);
        let limiter = ResearchRateLimiter::new(Duration::from_secs(1));

        let ctx = ResearchContext {
            db: &db,
            provider: &provider,
            rate_limiter: &limiter,
            run: &run,
            prompt: "research prompt",
            input: input(),
            timing: timing(),
        };
        let report = FanOutResearchStrategy::new(1).execute(&ctx).await.unwrap();

        for i in 1..=3 {
            assert!(report.contains(&format!("## Candidate {}", i)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_exceeding_poll_ceiling_times_out() {
        let db = Database::open_in_memory().unwrap();
        let run = make_run(&db, 1);
        // Never completes within the ceiling
        let provider = PoolProbeProvider::new(1000);
        let limiter = ResearchRateLimiter::new(Duration::from_secs(1));

        let ctx = ResearchContext {
            db: &db,
            provider: &provider,
            rate_limiter: &limiter,
            run: &run,
            prompt: "research prompt",
            input: input(),
            timing: timing(),
        };
        let err = FanOutResearchStrategy::new(5)
            .execute(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_item_is_restarted() {
        let db = Database::open_in_memory().unwrap();
        let run = make_run(&db, 2);
        db.ensure_research_tasks(&run.id, 1, 2).unwrap();
        // Simulate a crash between claim and handle persistence
        db.claim_research_task(&run.id, 1, 0).unwrap();
        let tasks = db.list_research_tasks(&run.id, 1).unwrap();
        assert!(tasks[0].is_stuck());

        let provider = PoolProbeProvider::new(1);
        let limiter = ResearchRateLimiter::new(Duration::from_secs(1));
        let ctx = ResearchContext {
            db: &db,
            provider: &provider,
            rate_limiter: &limiter,
            run: &run,
            prompt: "research prompt",
            input: input(),
            timing: timing(),
        };
        FanOutResearchStrategy::new(5).execute(&ctx).await.unwrap();

        let tasks = db.list_research_tasks(&run.id, 1).unwrap();
        assert!(tasks.iter().all(|t| t.output.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_failure_fails_the_step() {
        struct FailingProvider;

        #[async_trait]
        impl ResearchProvider for FailingProvider {
            async fn create_reference_store(&self, _: &str) -> Result<String> {
                Ok("fileStores/x".to_string())
            }
            async fn attach_document(&self, _: &str, _: &str, _: &str) -> Result<()> {
                Ok(())
            }
            async fn start_research(&self, _: &str, _: &str) -> Result<String> {
                Ok("interactions/x".to_string())
            }
            async fn poll_research(&self, _: &str) -> Result<ResearchStatus> {
                Ok(ResearchStatus::Failed("quota".to_string()))
            }
            async fn delete_reference_store(&self, _: &str) -> Result<()> {
                Ok(())
            }
        }

        let db = Database::open_in_memory().unwrap();
        let run = make_run(&db, 1);
        let limiter = ResearchRateLimiter::new(Duration::from_secs(1));
        let ctx = ResearchContext {
            db: &db,
            provider: &FailingProvider,
            rate_limiter: &limiter,
            run: &run,
            prompt: "research prompt",
            input: input(),
            timing: timing(),
        };
        let err = FanOutResearchStrategy::new(5)
            .execute(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ResearchFailed(_)));
    }
}
