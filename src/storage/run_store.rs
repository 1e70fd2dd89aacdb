//! Run Persistence
//!
//! Run CRUD plus the cursor-advancement primitives the sequencer relies
//! on. Cursor updates are conditional on the expected (step, loop) pair so
//! that two overlapping invocations of the same run cannot silently
//! double-execute a step; a lost race surfaces as a Storage error.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use serde_json::Value;

use super::database::{Database, parse_timestamp, parse_timestamp_opt};
use crate::types::{ForgeError, PipelineStep, Result, Run, RunStatus, ValidationMetadata};

// =============================================================================
// Research Fan-Out Task
// =============================================================================

/// Persisted micro-state of one per-hypothesis research item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchTaskState {
    Pending,
    Polling,
    Completed,
}

impl ResearchTaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Polling => "polling",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "polling" => Some(Self::Polling),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One per-hypothesis research item of the fan-out strategy
#[derive(Debug, Clone)]
pub struct ResearchTask {
    pub run_id: String,
    pub run_loop: usize,
    pub item_index: usize,
    pub state: ResearchTaskState,
    pub interaction_id: Option<String>,
    pub output: Option<String>,
}

impl ResearchTask {
    /// A crash artifact: marked in-progress but holding neither a research
    /// handle nor an output. Restarted by the next start-phase.
    pub fn is_stuck(&self) -> bool {
        self.state == ResearchTaskState::Polling
            && self.interaction_id.is_none()
            && self.output.is_none()
    }

    /// Startable by the start-phase: never started, or stuck.
    pub fn is_startable(&self) -> bool {
        self.state == ResearchTaskState::Pending || self.is_stuck()
    }

    /// Holds an open research handle the poll-phase must check.
    pub fn is_open(&self) -> bool {
        self.state == ResearchTaskState::Polling && self.interaction_id.is_some()
    }
}

// =============================================================================
// Run CRUD
// =============================================================================

impl Database {
    pub fn insert_run(&self, run: &Run) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO runs (
                id, project_id, target_spec_id, technical_assets_id,
                hypothesis_count, loop_count, job_name, existing_filter,
                status, current_step, current_loop,
                step2_output, step3_output, step4_output, step5_output,
                integrated_list, validation, progress_info, error_message,
                created_at, completed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                       ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
            params![
                run.id,
                run.project_id,
                run.target_spec_id,
                run.technical_assets_id,
                run.hypothesis_count as i64,
                run.loop_count as i64,
                run.job_name,
                run.existing_filter
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                run.status.as_str(),
                run.current_step.as_u8(),
                run.current_loop as i64,
                run.step2_output,
                run.step3_output,
                run.step4_output,
                run.step5_output,
                run.integrated_list
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                run.validation
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                run.progress_info
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                run.error_message,
                run.created_at.to_rfc3339(),
                run.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_run(&self, id: &str) -> Result<Option<Run>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_RUN),
            [id],
            Self::map_run,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Fetch a run, erroring when it does not exist.
    pub fn require_run(&self, id: &str) -> Result<Run> {
        self.get_run(id)?
            .ok_or_else(|| ForgeError::not_found("Run", id))
    }

    pub fn list_runs(&self, project_id: &str) -> Result<Vec<Run>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("{} WHERE project_id = ?1 ORDER BY created_at", SELECT_RUN))?;
        let rows = stmt.query_map([project_id], Self::map_run)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // =========================================================================
    // Status Transitions
    // =========================================================================

    /// Transition a run to `running` from one of the allowed prior states.
    /// Returns the refreshed run.
    pub fn mark_run_running(&self, id: &str, allowed_from: &[RunStatus]) -> Result<Run> {
        let run = self.require_run(id)?;
        if !allowed_from.contains(&run.status) {
            return Err(ForgeError::InvalidRunState {
                run_id: id.to_string(),
                status: run.status.to_string(),
                expected: "pending or paused",
            });
        }
        let conn = self.conn()?;
        conn.execute(
            "UPDATE runs SET status = ?2 WHERE id = ?1",
            params![id, RunStatus::Running.as_str()],
        )?;
        drop(conn);
        self.require_run(id)
    }

    /// Transition a run to `paused` at a step boundary.
    pub fn mark_run_paused(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE runs SET status = ?2 WHERE id = ?1",
            params![id, RunStatus::Paused.as_str()],
        )?;
        Ok(())
    }

    /// Transition a run to a terminal error state with a message. A run
    /// already in a terminal state is left untouched.
    pub fn mark_run_errored(&self, id: &str, message: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE runs SET status = ?2, error_message = ?3
             WHERE id = ?1
               AND status NOT IN ('completed', 'error', 'interrupted', 'cancelled')",
            params![id, RunStatus::Error.as_str(), message],
        )?;
        Ok(())
    }

    /// Update the free-form progress telemetry readers poll.
    pub fn set_run_progress(&self, id: &str, progress: &Value) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE runs SET progress_info = ?2 WHERE id = ?1",
            params![id, serde_json::to_string(progress)?],
        )?;
        Ok(())
    }

    /// Persist the validation outcome of the research step.
    pub fn set_run_validation(&self, id: &str, validation: &ValidationMetadata) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE runs SET validation = ?2 WHERE id = ?1",
            params![id, serde_json::to_string(validation)?],
        )?;
        Ok(())
    }

    /// Reclassify runs left `running`/`paused` by a dead process as
    /// `interrupted`. Returns the affected run ids. These rows can only
    /// exist at startup because a prior process was killed mid-execution.
    pub fn reclassify_stale_runs(&self, message: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id FROM runs WHERE status IN ('running', 'paused')")?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        for id in &ids {
            conn.execute(
                "UPDATE runs SET status = ?2, error_message = ?3 WHERE id = ?1",
                params![id, RunStatus::Interrupted.as_str(), message],
            )?;
        }
        Ok(ids)
    }

    // =========================================================================
    // Cursor Advancement
    // =========================================================================

    /// Persist a step's output and advance the cursor to the next step of
    /// the same loop, in one conditional update.
    ///
    /// The WHERE clause asserts the expected (step, loop, running) state;
    /// zero affected rows means another invocation advanced the run first.
    /// Used for steps 2-4; the integration step commits via `finish_loop`.
    pub fn commit_step_output(
        &self,
        run_id: &str,
        step: PipelineStep,
        current_loop: usize,
        output: &str,
    ) -> Result<()> {
        let next = step.next().ok_or_else(|| {
            ForgeError::pipeline(step.as_u8(), "integration step commits via finish_loop")
        })?;
        let column = output_column(step);
        let conn = self.conn()?;
        let changed = conn.execute(
            &format!(
                "UPDATE runs SET {column} = ?2, current_step = ?3
                 WHERE id = ?1 AND current_step = ?4 AND current_loop = ?5 AND status = 'running'"
            ),
            params![
                run_id,
                output,
                next.as_u8(),
                step.as_u8(),
                current_loop as i64
            ],
        )?;
        if changed == 0 {
            return Err(ForgeError::Storage(format!(
                "Concurrent cursor advancement detected for run {} at step {}",
                run_id,
                step.as_u8()
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Research Fan-Out Tasks
    // =========================================================================

    /// Create the per-item rows for a loop's fan-out, if absent.
    pub fn ensure_research_tasks(&self, run_id: &str, run_loop: usize, count: usize) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        for idx in 0..count {
            conn.execute(
                "INSERT OR IGNORE INTO research_tasks
                    (run_id, run_loop, item_index, state, updated_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4)",
                params![run_id, run_loop as i64, idx as i64, now],
            )?;
        }
        Ok(())
    }

    pub fn list_research_tasks(&self, run_id: &str, run_loop: usize) -> Result<Vec<ResearchTask>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, run_loop, item_index, state, interaction_id, output
             FROM research_tasks WHERE run_id = ?1 AND run_loop = ?2
             ORDER BY item_index",
        )?;
        let rows = stmt.query_map(params![run_id, run_loop as i64], |row| {
            let state_str: String = row.get(3)?;
            let state = ResearchTaskState::parse(&state_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    format!("unknown task state: {}", state_str).into(),
                )
            })?;
            Ok(ResearchTask {
                run_id: row.get(0)?,
                run_loop: row.get::<_, i64>(1)? as usize,
                item_index: row.get::<_, i64>(2)? as usize,
                state,
                interaction_id: row.get(4)?,
                output: row.get(5)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Mark an item in-progress before its research handle exists. A crash
    /// between this and `set_research_task_handle` leaves the item stuck,
    /// which the next start-phase detects and restarts.
    pub fn claim_research_task(&self, run_id: &str, run_loop: usize, idx: usize) -> Result<()> {
        self.update_task(
            run_id,
            run_loop,
            idx,
            "state = 'polling', interaction_id = NULL, output = NULL",
            &[],
        )
    }

    pub fn set_research_task_handle(
        &self,
        run_id: &str,
        run_loop: usize,
        idx: usize,
        interaction_id: &str,
    ) -> Result<()> {
        self.update_task(
            run_id,
            run_loop,
            idx,
            "interaction_id = ?4",
            &[&interaction_id],
        )
    }

    pub fn complete_research_task(
        &self,
        run_id: &str,
        run_loop: usize,
        idx: usize,
        output: &str,
    ) -> Result<()> {
        self.update_task(
            run_id,
            run_loop,
            idx,
            "state = 'completed', output = ?4",
            &[&output],
        )
    }

    fn update_task(
        &self,
        run_id: &str,
        run_loop: usize,
        idx: usize,
        set_clause: &str,
        extra: &[&dyn rusqlite::ToSql],
    ) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let run_loop = run_loop as i64;
        let idx = idx as i64;
        let mut sql_params: Vec<&dyn rusqlite::ToSql> = vec![&run_id, &run_loop, &idx];
        sql_params.extend_from_slice(extra);
        sql_params.push(&now);
        let n = sql_params.len();
        let changed = conn.execute(
            &format!(
                "UPDATE research_tasks SET {set_clause}, updated_at = ?{n}
                 WHERE run_id = ?1 AND run_loop = ?2 AND item_index = ?3"
            ),
            sql_params.as_slice(),
        )?;
        if changed == 0 {
            return Err(ForgeError::Storage(format!(
                "Research task {}/{}/{} not found",
                run_id, run_loop, idx
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Row Mapping
    // =========================================================================

    pub(crate) fn map_run(row: &rusqlite::Row<'_>) -> std::result::Result<Run, rusqlite::Error> {
        let status_str: String = row.get(8)?;
        let status = RunStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                8,
                rusqlite::types::Type::Text,
                format!("unknown run status: {}", status_str).into(),
            )
        })?;
        let step_num: u8 = row.get(9)?;
        let current_step = PipelineStep::from_u8(step_num).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                9,
                rusqlite::types::Type::Integer,
                format!("invalid step number: {}", step_num).into(),
            )
        })?;

        Ok(Run {
            id: row.get(0)?,
            project_id: row.get(1)?,
            target_spec_id: row.get(2)?,
            technical_assets_id: row.get(3)?,
            hypothesis_count: row.get::<_, i64>(4)? as usize,
            loop_count: row.get::<_, i64>(5)? as usize,
            job_name: row.get(6)?,
            existing_filter: parse_json_opt(row, 7)?,
            status,
            current_step,
            current_loop: row.get::<_, i64>(10)? as usize,
            step2_output: row.get(11)?,
            step3_output: row.get(12)?,
            step4_output: row.get(13)?,
            step5_output: row.get(14)?,
            integrated_list: parse_json_opt(row, 15)?,
            validation: parse_json_opt(row, 16)?,
            progress_info: parse_json_opt(row, 17)?,
            error_message: row.get(18)?,
            created_at: parse_timestamp(row, 19)?,
            completed_at: parse_timestamp_opt(row, 20)?,
        })
    }
}

pub(crate) const SELECT_RUN: &str = "SELECT
    id, project_id, target_spec_id, technical_assets_id,
    hypothesis_count, loop_count, job_name, existing_filter,
    status, current_step, current_loop,
    step2_output, step3_output, step4_output, step5_output,
    integrated_list, validation, progress_info, error_message,
    created_at, completed_at
 FROM runs";

/// Column holding the given step's output text.
pub(crate) fn output_column(step: PipelineStep) -> &'static str {
    match step {
        PipelineStep::Research => "step2_output",
        PipelineStep::ScientificEvaluation => "step3_output",
        PipelineStep::StrategicAudit => "step4_output",
        PipelineStep::Integration => "step5_output",
    }
}

fn parse_json_opt<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> std::result::Result<Option<T>, rusqlite::Error> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}
