//! Step Sequencer
//!
//! Drives one run through its step/loop state machine. Every decision is
//! recomputed from the persisted run row, so an invocation can pick up a
//! run wherever the previous one left it: the sequencer is the stateless
//! executor, the row is the state.
//!
//! Control signals are consulted only at checkpoints, after a finished
//! step's output has been committed and the cursor advanced. A pause or
//! stop therefore never loses completed work, and a paused run resumes
//! at the exact next step. Stop wins over pause and terminates the run
//! with an error status carrying a cancellation message.
//!
//! Each invocation also carries a wall-clock budget; when it runs out
//! the sequencer returns with the run still `running`, and the caller
//! re-invokes to continue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{info, warn};

use crate::ai::provider::{
    CompletionRequest, ModelTier, ResearchRateLimiter, SharedGenerativeProvider,
    SharedResearchProvider,
};
use crate::ai::research::{ResearchInput, ResearchTiming};
use crate::ai::validation::{HypothesisExtractor, ValidationAction};
use crate::config::{PipelineSettings, ResearchStrategyKind};
use crate::pipeline::control::{CANCELLATION_MESSAGE, ControlRegistry};
use crate::pipeline::prompts::{self, PromptContext};
use crate::pipeline::strategy::{
    FanOutResearchStrategy, ResearchContext, ResearchStrategy, SharedResearchStrategy,
};
use crate::pipeline::table::{parse_delimited_table, rows_to_hypotheses};
use crate::storage::SharedDatabase;
use crate::types::{
    ForgeError, Hypothesis, PipelineStep, Resource, Result, Run, RunStatus,
};

/// Why a sequencer invocation returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerOutcome {
    /// All loops finished; the run is `completed`.
    Completed,
    /// A pause request was honored at a step boundary; the run is `paused`.
    Paused,
    /// A stop request was honored; the run is `error` with a
    /// cancellation message.
    Stopped,
    /// The invocation budget ran out mid-run; the run is still `running`
    /// and the caller should invoke again.
    BudgetExhausted,
}

/// Stateless executor for the run state machine.
pub struct StepSequencer {
    db: SharedDatabase,
    generative: SharedGenerativeProvider,
    research: SharedResearchProvider,
    rate_limiter: Arc<ResearchRateLimiter>,
    control: Arc<ControlRegistry>,
    strategy: Arc<dyn ResearchStrategy>,
    extractor: HypothesisExtractor,
    settings: PipelineSettings,
}

impl StepSequencer {
    pub fn new(
        db: SharedDatabase,
        generative: SharedGenerativeProvider,
        research: SharedResearchProvider,
        control: Arc<ControlRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        let strategy: Arc<dyn ResearchStrategy> = match settings.research_strategy {
            ResearchStrategyKind::Shared => Arc::new(SharedResearchStrategy),
            ResearchStrategyKind::FanOut => {
                Arc::new(FanOutResearchStrategy::new(settings.max_concurrent_research))
            }
        };
        Self {
            db,
            generative,
            research,
            rate_limiter: Arc::new(ResearchRateLimiter::new(Duration::from_secs(
                settings.min_research_spacing_secs,
            ))),
            control: control.clone(),
            strategy,
            extractor: HypothesisExtractor::new(settings.validation_max_retries),
            settings,
        }
    }

    /// Drive a run until it completes, a control signal is honored, or
    /// the invocation budget runs out. Errors propagate to the caller,
    /// which owns persisting the terminal error state.
    pub async fn drive(&self, run_id: &str) -> Result<SequencerOutcome> {
        let run = self.db.require_run(run_id)?;
        if run.status == RunStatus::Completed {
            // Re-invocation after completion is a no-op
            return Ok(SequencerOutcome::Completed);
        }
        self.db.mark_run_running(
            run_id,
            &[RunStatus::Pending, RunStatus::Paused, RunStatus::Running],
        )?;

        let deadline = Instant::now() + Duration::from_secs(self.settings.invocation_budget_secs);

        loop {
            let run = self.db.require_run(run_id)?;
            match run.status {
                RunStatus::Running => {}
                RunStatus::Completed => {
                    self.control.clear(run_id);
                    return Ok(SequencerOutcome::Completed);
                }
                other => {
                    return Err(ForgeError::InvalidRunState {
                        run_id: run_id.to_string(),
                        status: other.to_string(),
                        expected: "running",
                    });
                }
            }

            info!(
                run_id,
                step = run.current_step.as_u8(),
                run_loop = run.current_loop,
                "Executing step"
            );
            self.record_progress(&run)?;
            self.execute_step(&run).await?;

            // Checkpoint: the step above is committed, honor signals now
            let current = self.db.require_run(run_id)?;
            if current.status == RunStatus::Completed {
                self.control.clear(run_id);
                return Ok(SequencerOutcome::Completed);
            }
            if self.control.is_stop_requested(run_id) {
                self.control.clear(run_id);
                self.db.mark_run_errored(run_id, CANCELLATION_MESSAGE)?;
                info!(run_id, "Run stopped at step boundary");
                return Ok(SequencerOutcome::Stopped);
            }
            if self.control.is_pause_requested(run_id) {
                self.control.clear(run_id);
                self.db.mark_run_paused(run_id)?;
                info!(
                    run_id,
                    next_step = current.current_step.as_u8(),
                    "Run paused at step boundary"
                );
                return Ok(SequencerOutcome::Paused);
            }
            if Instant::now() >= deadline {
                warn!(run_id, "Invocation budget exhausted, yielding");
                return Ok(SequencerOutcome::BudgetExhausted);
            }
        }
    }

    async fn execute_step(&self, run: &Run) -> Result<()> {
        let (target_spec, technical_assets) = self.load_documents(run)?;

        match run.current_step {
            PipelineStep::Research => {
                self.execute_research(run, &target_spec, &technical_assets)
                    .await
            }
            PipelineStep::ScientificEvaluation | PipelineStep::StrategicAudit => {
                self.execute_completion_step(run, &target_spec, &technical_assets)
                    .await
            }
            PipelineStep::Integration => {
                self.execute_integration(run, &target_spec, &technical_assets)
                    .await
            }
        }
    }

    /// Step 2: run the research strategy once, then gate on the extracted
    /// hypothesis count. A short count triggers one regeneration
    /// completion asking only for the missing hypotheses; its candidates
    /// are merged with the ones already held and the merged set is gated
    /// again.
    async fn execute_research(
        &self,
        run: &Run,
        target_spec: &Resource,
        technical_assets: &Resource,
    ) -> Result<()> {
        let existing = self.existing_hypotheses_text(run)?;
        let template = prompts::resolve_template(&self.db, PipelineStep::Research)?;
        let ctx = PromptContext::for_run(run, &target_spec.content, &technical_assets.content, &existing);
        let prompt = prompts::render(&template, &ctx);

        let timing = ResearchTiming {
            poll_interval: Duration::from_secs(self.settings.poll_interval_secs),
            timeout: Duration::from_secs(self.settings.research_timeout_secs),
        };

        let research_ctx = ResearchContext {
            db: &self.db,
            provider: self.research.as_ref(),
            rate_limiter: &self.rate_limiter,
            run,
            prompt: &prompt,
            input: ResearchInput {
                target_spec: &target_spec.content,
                technical_assets: &technical_assets.content,
            },
            timing,
        };
        let mut report = self.strategy.execute(&research_ctx).await?;

        let candidates = self
            .extractor
            .extract(self.generative.as_ref(), &report, run.hypothesis_count)
            .await?;
        let mut outcome = self.extractor.gate(candidates, run.hypothesis_count, 0);
        self.db.set_run_validation(&run.id, &outcome.metadata)?;

        let mut attempt = 0;
        while outcome.action == ValidationAction::Retry {
            attempt += 1;
            let missing = run.hypothesis_count - outcome.candidates.len();
            let held: Vec<String> = outcome
                .candidates
                .iter()
                .map(|c| c.title.clone())
                .collect();
            info!(run_id = %run.id, missing, "Regenerating missing hypotheses");

            // Search-augmented completion stands in for the research pass
            let supplement = self
                .generative
                .complete(
                    &CompletionRequest::new(
                        prompts::regeneration_prompt(missing, &held, &ctx),
                        ModelTier::Pro,
                    )
                    .with_search(),
                )
                .await?;
            let extra = self
                .extractor
                .extract(self.generative.as_ref(), &supplement, missing)
                .await?;

            report = format!("{report}\n\n## Regenerated candidates\n\n{supplement}");
            let mut merged = std::mem::take(&mut outcome.candidates);
            merged.extend(extra);
            outcome = self.extractor.gate(merged, run.hypothesis_count, attempt);
            self.db.set_run_validation(&run.id, &outcome.metadata)?;
        }

        if !outcome.metadata.is_valid {
            return Err(ForgeError::InsufficientCount {
                expected: run.hypothesis_count,
                actual: outcome.metadata.count,
            });
        }
        self.db
            .commit_step_output(&run.id, PipelineStep::Research, run.current_loop, &report)
    }

    /// Steps 3 and 4: one pro-tier completion over the prior output.
    async fn execute_completion_step(
        &self,
        run: &Run,
        target_spec: &Resource,
        technical_assets: &Resource,
    ) -> Result<()> {
        let template = prompts::resolve_template(&self.db, run.current_step)?;
        let ctx = PromptContext::for_run(run, &target_spec.content, &technical_assets.content, "");
        let prompt = prompts::render(&template, &ctx);

        let output = self
            .generative
            .complete(&CompletionRequest::new(prompt, ModelTier::Pro))
            .await?;

        self.db
            .commit_step_output(&run.id, run.current_step, run.current_loop, &output)
    }

    /// Step 5: integrate into the tabular output, materialize the loop's
    /// hypotheses, and advance to the next loop or complete the run.
    async fn execute_integration(
        &self,
        run: &Run,
        target_spec: &Resource,
        technical_assets: &Resource,
    ) -> Result<()> {
        let template = prompts::resolve_template(&self.db, PipelineStep::Integration)?;
        let ctx = PromptContext::for_run(run, &target_spec.content, &technical_assets.content, "");
        let prompt = prompts::render(&template, &ctx);

        let output = self
            .generative
            .complete(&CompletionRequest::new(prompt, ModelTier::Pro))
            .await?;

        let table = parse_delimited_table(&output);
        if table.rows.is_empty() {
            return Err(ForgeError::pipeline(
                PipelineStep::Integration.as_u8(),
                "integration output contained no table rows",
            ));
        }

        let integrated_list = json!(
            table
                .rows
                .iter()
                .map(|row| {
                    table
                        .headers
                        .iter()
                        .zip(row)
                        .map(|(h, c)| (h.clone(), serde_json::Value::String(c.clone())))
                        .collect::<serde_json::Map<_, _>>()
                })
                .collect::<Vec<_>>()
        );

        let inserted: Vec<Hypothesis> =
            self.db
                .finish_loop(run, &output, &integrated_list, |start_number| {
                    rows_to_hypotheses(&table, run, start_number)
                })?;
        info!(
            run_id = %run.id,
            count = inserted.len(),
            run_loop = run.current_loop,
            "Loop materialized"
        );
        Ok(())
    }

    fn load_documents(&self, run: &Run) -> Result<(Resource, Resource)> {
        let target_spec = self
            .db
            .get_resource(&run.target_spec_id)?
            .ok_or_else(|| ForgeError::not_found("Resource", &run.target_spec_id))?;
        let technical_assets = self
            .db
            .get_resource(&run.technical_assets_id)?
            .ok_or_else(|| ForgeError::not_found("Resource", &run.technical_assets_id))?;
        Ok((target_spec, technical_assets))
    }

    /// Titles of hypotheses the research prompt must not repeat,
    /// optionally scoped by the run's resource filter.
    fn existing_hypotheses_text(&self, run: &Run) -> Result<String> {
        let hypotheses = self.db.list_hypotheses(&run.project_id)?;
        let lines: Vec<String> = hypotheses
            .iter()
            .filter(|h| match &run.existing_filter {
                Some(filter) => {
                    filter.contains(&h.target_spec_id) || filter.contains(&h.technical_assets_id)
                }
                None => true,
            })
            .map(|h| {
                format!(
                    "{}. {}",
                    h.number,
                    h.title.as_deref().unwrap_or("(untitled)")
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }

    fn record_progress(&self, run: &Run) -> Result<()> {
        self.db.set_run_progress(
            &run.id,
            &json!({
                "phase": format!("step{}", run.current_step.as_u8()),
                "loop": run.current_loop,
                "updated_at": chrono::Utc::now().to_rfc3339(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{GenerativeProvider, ResearchProvider, ResearchStatus};
    use crate::storage::Database;
    use crate::types::{NewRun, Project, Resource, ResourceKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Research provider whose interaction completes on the first poll.
    struct InstantResearch {
        starts: AtomicUsize,
    }

    impl InstantResearch {
        fn new() -> Self {
            Self {
                starts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ResearchProvider for InstantResearch {
        async fn create_reference_store(&self, _: &str) -> Result<String> {
            Ok("fileStores/test".to_string())
        }
        async fn attach_document(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn start_research(&self, _: &str, _: &str) -> Result<String> {
            let n = self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(format!("interactions/{}", n))
        }
        async fn poll_research(&self, id: &str) -> Result<ResearchStatus> {
            Ok(ResearchStatus::Completed(format!("research report {}", id)))
        }
        async fn delete_reference_store(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Generative mock dispatching on the built-in prompt shapes.
    ///
    /// Successive extraction prompts get well-formed candidates per
    /// `extract_counts` (the last entry repeats), integration prompts get
    /// a full table, everything else gets a canned evaluation. Optionally
    /// raises a control signal while serving the scientific-evaluation
    /// prompt, modelling a signal arriving mid-step.
    struct ScriptedGenerative {
        extract_counts: Vec<usize>,
        extract_calls: AtomicUsize,
        search_requests: AtomicUsize,
        table_rows: usize,
        integration_calls: AtomicUsize,
        signal_on_step3: Option<(Arc<ControlRegistry>, String, bool)>,
    }

    impl ScriptedGenerative {
        fn new(extract_count: usize) -> Self {
            Self::with_extract_counts(vec![extract_count], extract_count)
        }

        fn with_extract_counts(extract_counts: Vec<usize>, table_rows: usize) -> Self {
            Self {
                extract_counts,
                extract_calls: AtomicUsize::new(0),
                search_requests: AtomicUsize::new(0),
                table_rows,
                integration_calls: AtomicUsize::new(0),
                signal_on_step3: None,
            }
        }

        fn table(&self, rows: usize) -> String {
            let call = self.integration_calls.fetch_add(1, Ordering::SeqCst);
            let mut out = String::from(
                "title\tindustry\tfield\tsummary\tcustomer problem\t\
                 scientific score\tstrategic level\tcatch-up score\ttotal score",
            );
            for i in 0..rows {
                out.push_str(&format!(
                    "\nL{call}-H{i}\tEnergy\tStorage\tSummary\tProblem\t4\tcore\t3\t7"
                ));
            }
            out
        }
    }

    #[async_trait]
    impl GenerativeProvider for ScriptedGenerative {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            if request.use_search {
                self.search_requests.fetch_add(1, Ordering::SeqCst);
            }
            let prompt = &request.prompt;
            if prompt.starts_with("Extract the") {
                let call = self.extract_calls.fetch_add(1, Ordering::SeqCst);
                let count = self.extract_counts[call.min(self.extract_counts.len() - 1)];
                let items: Vec<String> = (0..count)
                    .map(|i| {
                        format!(
                            r#"{{"title": "E{call}-H{i}", "trade_off": "t", "mechanism": "m", "competitive_moat": "c"}}"#
                        )
                    })
                    .collect();
                return Ok(format!("[{}]", items.join(",")));
            }
            if prompt.contains("tab-separated") {
                return Ok(self.table(self.table_rows));
            }
            if prompt.contains("scientific reviewer")
                && let Some((control, run_id, stop)) = &self.signal_on_step3
            {
                if *stop {
                    control.request_stop(run_id);
                } else {
                    control.request_pause(run_id);
                }
            }
            Ok(format!("evaluated: {}", prompt.len()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Fixture {
        db: SharedDatabase,
        control: Arc<ControlRegistry>,
        run: Run,
    }

    fn fixture(hypothesis_count: usize, loop_count: usize) -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let project = Project::new("battery-tech", None);
        db.insert_project(&project).unwrap();
        let spec = Resource::new(
            project.id.clone(),
            ResourceKind::TargetSpec,
            "spec",
            "target spec text",
        );
        let assets = Resource::new(
            project.id.clone(),
            ResourceKind::TechnicalAssets,
            "assets",
            "technical assets text",
        );
        db.insert_resource(&spec).unwrap();
        db.insert_resource(&assets).unwrap();

        let run = NewRun {
            project_id: project.id.clone(),
            target_spec_id: spec.id.clone(),
            technical_assets_id: assets.id.clone(),
            hypothesis_count,
            loop_count,
            job_name: Some("scenario".into()),
            existing_filter: None,
        }
        .into_run();
        db.insert_run(&run).unwrap();

        Fixture {
            db,
            control: Arc::new(ControlRegistry::new()),
            run,
        }
    }

    fn sequencer(fx: &Fixture, generative: ScriptedGenerative) -> StepSequencer {
        StepSequencer::new(
            fx.db.clone(),
            Arc::new(generative),
            Arc::new(InstantResearch::new()),
            fx.control.clone(),
            PipelineSettings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_loops_yield_contiguous_hypotheses_and_completion() {
        let fx = fixture(5, 2);
        let seq = sequencer(&fx, ScriptedGenerative::new(5));

        let outcome = seq.drive(&fx.run.id).await.unwrap();
        assert_eq!(outcome, SequencerOutcome::Completed);

        let run = fx.db.require_run(&fx.run.id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.completed_at.is_some());
        assert_eq!(run.current_loop, 2);

        let hypotheses = fx.db.list_hypotheses(&fx.run.project_id).unwrap();
        assert_eq!(hypotheses.len(), 10);
        let numbers: Vec<i64> = hypotheses.iter().map(|h| h.number).collect();
        assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
        // Loop 2 rows came after loop 1 rows
        assert!(hypotheses[0].title.as_deref().unwrap().starts_with("L0-"));
        assert!(hypotheses[9].title.as_deref().unwrap().starts_with("L1-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_step3_holds_at_step4() {
        let fx = fixture(3, 1);
        let mut generative = ScriptedGenerative::new(3);
        generative.signal_on_step3 = Some((fx.control.clone(), fx.run.id.clone(), false));
        let seq = sequencer(&fx, generative);

        let outcome = seq.drive(&fx.run.id).await.unwrap();
        assert_eq!(outcome, SequencerOutcome::Paused);

        let run = fx.db.require_run(&fx.run.id).unwrap();
        assert_eq!(run.status, RunStatus::Paused);
        // Step 3 committed before the signal was honored
        assert_eq!(run.current_step, PipelineStep::StrategicAudit);
        assert!(run.step3_output.is_some());
        assert!(run.step4_output.is_none());
        assert!(!fx.control.is_pause_requested(&fx.run.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_continues_from_step4_to_completion() {
        let fx = fixture(3, 1);
        let mut generative = ScriptedGenerative::new(3);
        generative.signal_on_step3 = Some((fx.control.clone(), fx.run.id.clone(), false));
        let seq = sequencer(&fx, generative);
        assert_eq!(seq.drive(&fx.run.id).await.unwrap(), SequencerOutcome::Paused);

        // Second invocation resumes the paused run from the cursor
        let fresh = sequencer(&fx, ScriptedGenerative::new(3));
        let outcome = fresh.drive(&fx.run.id).await.unwrap();
        assert_eq!(outcome, SequencerOutcome::Completed);

        let run = fx.db.require_run(&fx.run.id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(fx.db.list_hypotheses(&fx.run.project_id).unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_terminates_with_cancellation_error() {
        let fx = fixture(3, 1);
        let mut generative = ScriptedGenerative::new(3);
        generative.signal_on_step3 = Some((fx.control.clone(), fx.run.id.clone(), true));
        let seq = sequencer(&fx, generative);

        let outcome = seq.drive(&fx.run.id).await.unwrap();
        assert_eq!(outcome, SequencerOutcome::Stopped);

        let run = fx.db.require_run(&fx.run.id).unwrap();
        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(run.error_message.as_deref(), Some(CANCELLATION_MESSAGE));
        // The in-flight step still committed before the stop
        assert!(run.step3_output.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_research_pass_merges_regenerated_candidates() {
        let fx = fixture(5, 1);
        // First extraction finds 3 of 5; the regeneration supplies 2 more
        let generative = Arc::new(ScriptedGenerative::with_extract_counts(vec![3, 2], 5));
        let research = Arc::new(InstantResearch::new());
        let seq = StepSequencer::new(
            fx.db.clone(),
            generative.clone(),
            research.clone(),
            fx.control.clone(),
            PipelineSettings::default(),
        );

        let outcome = seq.drive(&fx.run.id).await.unwrap();
        assert_eq!(outcome, SequencerOutcome::Completed);

        let run = fx.db.require_run(&fx.run.id).unwrap();
        let validation = run.validation.unwrap();
        assert!(validation.retried);
        assert!(validation.is_valid);
        // Merged set: 3 held + 2 regenerated
        assert_eq!(validation.count, 5);
        // The committed report carries both passes
        assert!(run.step2_output.unwrap().contains("Regenerated candidates"));
        assert_eq!(fx.db.list_hypotheses(&fx.run.project_id).unwrap().len(), 5);
        // One full extraction, one over the regenerated supplement
        assert_eq!(generative.extract_calls.load(Ordering::SeqCst), 2);
        // The regeneration completion is the only search-augmented call
        assert_eq!(generative.search_requests.load(Ordering::SeqCst), 1);
        // The research interaction itself ran once; regeneration is a
        // plain completion
        assert_eq!(research.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merged_set_still_short_fails_citing_counts() {
        let fx = fixture(5, 1);
        // 3 held plus 1 regenerated never reaches the requested 5
        let seq = sequencer(
            &fx,
            ScriptedGenerative::with_extract_counts(vec![3, 1], 5),
        );

        let err = seq.drive(&fx.run.id).await.unwrap_err();
        match err {
            ForgeError::InsufficientCount { expected, actual } => {
                assert_eq!(expected, 5);
                assert_eq!(actual, 4);
            }
            other => panic!("unexpected error: {}", other),
        }

        let run = fx.db.require_run(&fx.run.id).unwrap();
        let validation = run.validation.unwrap();
        assert!(validation.retried);
        assert_eq!(validation.count, 4);
        // Step 2 never committed
        assert!(run.step2_output.is_none());
        assert_eq!(run.current_step, PipelineStep::Research);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driving_a_completed_run_is_a_no_op() {
        let fx = fixture(2, 1);
        let seq = sequencer(&fx, ScriptedGenerative::new(2));
        assert_eq!(
            seq.drive(&fx.run.id).await.unwrap(),
            SequencerOutcome::Completed
        );

        let before = fx.db.list_hypotheses(&fx.run.project_id).unwrap();
        assert_eq!(
            seq.drive(&fx.run.id).await.unwrap(),
            SequencerOutcome::Completed
        );
        let after = fx.db.list_hypotheses(&fx.run.project_id).unwrap();
        assert_eq!(before.len(), after.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_numbering_continues_across_runs_after_deletion() {
        let fx = fixture(2, 1);
        let seq = sequencer(&fx, ScriptedGenerative::new(2));
        seq.drive(&fx.run.id).await.unwrap();

        // Delete the first hypothesis, then run a second batch
        let existing = fx.db.list_hypotheses(&fx.run.project_id).unwrap();
        fx.db.delete_hypothesis(&existing[0].id).unwrap();

        let run2 = NewRun {
            project_id: fx.run.project_id.clone(),
            target_spec_id: fx.run.target_spec_id.clone(),
            technical_assets_id: fx.run.technical_assets_id.clone(),
            hypothesis_count: 2,
            loop_count: 1,
            job_name: None,
            existing_filter: None,
        }
        .into_run();
        fx.db.insert_run(&run2).unwrap();
        seq.drive(&run2.id).await.unwrap();

        let numbers: Vec<i64> = fx
            .db
            .list_hypotheses(&fx.run.project_id)
            .unwrap()
            .iter()
            .map(|h| h.number)
            .collect();
        // Number 1 was deleted and is never reused
        assert_eq!(numbers, vec![2, 3, 4]);
    }
}
