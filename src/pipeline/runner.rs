//! Run Lifecycle Manager
//!
//! Owns run creation, the control operations (pause/resume/stop), crash
//! recovery, and the outer error boundary around sequencer invocations.
//! Every error escaping the sequencer is persisted onto the run row so a
//! polling reader always sees why a run died.

use std::sync::Arc;

use tracing::{error, info};

use crate::pipeline::control::{CANCELLATION_MESSAGE, ControlRegistry};
use crate::pipeline::sequencer::{SequencerOutcome, StepSequencer};
use crate::storage::SharedDatabase;
use crate::types::{ForgeError, NewRun, ResourceKind, Result, Run, RunStatus};

/// Message recorded on runs found in-flight at startup.
pub const INTERRUPTED_MESSAGE: &str = "Interrupted by process restart";

pub struct RunLifecycle {
    db: SharedDatabase,
    sequencer: Arc<StepSequencer>,
    control: Arc<ControlRegistry>,
}

impl RunLifecycle {
    pub fn new(
        db: SharedDatabase,
        sequencer: Arc<StepSequencer>,
        control: Arc<ControlRegistry>,
    ) -> Self {
        Self {
            db,
            sequencer,
            control,
        }
    }

    /// Validate inputs and create a pending run. Execution is a separate
    /// call so callers can create-then-poll or create-then-drive.
    pub fn create_run(&self, new_run: NewRun) -> Result<Run> {
        if new_run.hypothesis_count == 0 {
            return Err(ForgeError::Validation(
                "hypothesis_count must be at least 1".to_string(),
            ));
        }
        self.db
            .get_project(&new_run.project_id)?
            .ok_or_else(|| ForgeError::not_found("Project", &new_run.project_id))?;
        self.require_resource_kind(&new_run.target_spec_id, ResourceKind::TargetSpec)?;
        self.require_resource_kind(&new_run.technical_assets_id, ResourceKind::TechnicalAssets)?;

        let run = new_run.into_run();
        self.db.insert_run(&run)?;
        info!(run_id = %run.id, loops = run.loop_count, "Run created");
        Ok(run)
    }

    /// Drive a run to a resting state, re-invoking the sequencer across
    /// budget exhaustions. Any error is persisted as the run's terminal
    /// error state before propagating.
    pub async fn execute(&self, run_id: &str) -> Result<SequencerOutcome> {
        loop {
            match self.sequencer.drive(run_id).await {
                Ok(SequencerOutcome::BudgetExhausted) => {
                    info!(run_id, "Re-invoking sequencer after budget exhaustion");
                }
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    error!(run_id, "Run failed: {}", e);
                    self.control.clear(run_id);
                    self.db.mark_run_errored(run_id, &e.to_string())?;
                    return Err(e);
                }
            }
        }
    }

    /// Request a pause; honored at the run's next step boundary.
    pub fn pause_run(&self, run_id: &str) -> Result<()> {
        let run = self.db.require_run(run_id)?;
        if run.status != RunStatus::Running {
            return Err(ForgeError::InvalidRunState {
                run_id: run_id.to_string(),
                status: run.status.to_string(),
                expected: "running",
            });
        }
        self.control.request_pause(run_id);
        Ok(())
    }

    /// Resume a paused run and drive it.
    pub async fn resume_run(&self, run_id: &str) -> Result<SequencerOutcome> {
        let run = self.db.require_run(run_id)?;
        if run.status != RunStatus::Paused {
            return Err(ForgeError::InvalidRunState {
                run_id: run_id.to_string(),
                status: run.status.to_string(),
                expected: "paused",
            });
        }
        self.control.request_resume(run_id);
        self.execute(run_id).await
    }

    /// Stop a run. A running run is signalled and terminates at its next
    /// step boundary; a paused run has no invocation in flight to observe
    /// the signal, so its status is updated synchronously here.
    pub fn stop_run(&self, run_id: &str) -> Result<()> {
        let run = self.db.require_run(run_id)?;
        match run.status {
            RunStatus::Running => {
                self.control.request_stop(run_id);
                Ok(())
            }
            RunStatus::Paused => {
                self.control.clear(run_id);
                self.db.mark_run_errored(run_id, CANCELLATION_MESSAGE)?;
                info!(run_id, "Paused run stopped synchronously");
                Ok(())
            }
            other => Err(ForgeError::InvalidRunState {
                run_id: run_id.to_string(),
                status: other.to_string(),
                expected: "running or paused",
            }),
        }
    }

    /// Startup recovery: any run still marked running or paused was
    /// orphaned by a crash and is reclassified as interrupted.
    pub fn recover_interrupted_runs(&self) -> Result<Vec<String>> {
        let ids = self.db.reclassify_stale_runs(INTERRUPTED_MESSAGE)?;
        for id in &ids {
            info!(run_id = %id, "Reclassified orphaned run as interrupted");
        }
        Ok(ids)
    }

    fn require_resource_kind(&self, id: &str, expected: ResourceKind) -> Result<()> {
        let resource = self
            .db
            .get_resource(id)?
            .ok_or_else(|| ForgeError::not_found("Resource", id))?;
        if resource.kind != expected {
            return Err(ForgeError::Validation(format!(
                "Resource {} is a {}, expected {}",
                id,
                resource.kind.as_str(),
                expected.as_str()
            )));
        }
        Ok(())
    }
}
