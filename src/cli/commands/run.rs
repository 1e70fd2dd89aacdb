//! Run Commands
//!
//! `start` and `resume` drive the pipeline in the foreground; Ctrl-C is
//! mapped to a stop request so cancellation is observed at the next step
//! boundary instead of killing the process mid-step.

use console::style;
use tracing::warn;

use crate::cli::util::{build_lifecycle, open_database, short_id};
use crate::config::Config;
use crate::pipeline::{ControlRegistry, SequencerOutcome};
use crate::types::{NewRun, Result, Run};

pub struct StartArgs {
    pub project_id: String,
    pub target_spec_id: String,
    pub technical_assets_id: String,
    pub hypothesis_count: usize,
    pub loop_count: usize,
    pub job_name: Option<String>,
    pub existing_filter: Option<Vec<String>>,
}

pub async fn start(config: &Config, args: StartArgs) -> Result<()> {
    let db = open_database(config)?;
    let (lifecycle, control) = build_lifecycle(config, db)?;

    let run = lifecycle.create_run(NewRun {
        project_id: args.project_id,
        target_spec_id: args.target_spec_id,
        technical_assets_id: args.technical_assets_id,
        hypothesis_count: args.hypothesis_count,
        loop_count: args.loop_count,
        job_name: args.job_name,
        existing_filter: args.existing_filter,
    })?;
    println!(
        "{} run {} ({} hypotheses x {} loops)",
        style("Started").green().bold(),
        run.id,
        run.hypothesis_count,
        run.loop_count
    );

    stop_on_ctrl_c(control.clone(), run.id.clone());
    let outcome = lifecycle.execute(&run.id).await?;
    report_outcome(&run.id, outcome);
    Ok(())
}

pub async fn resume(config: &Config, run_id: &str) -> Result<()> {
    let db = open_database(config)?;
    let (lifecycle, control) = build_lifecycle(config, db)?;

    stop_on_ctrl_c(control.clone(), run_id.to_string());
    let outcome = lifecycle.resume_run(run_id).await?;
    report_outcome(run_id, outcome);
    Ok(())
}

pub fn status(config: &Config, run_id: &str) -> Result<()> {
    let db = open_database(config)?;
    let run = db.require_run(run_id)?;
    print_run_detail(&run);
    Ok(())
}

pub fn list(config: &Config, project_id: &str) -> Result<()> {
    let db = open_database(config)?;
    let runs = db.list_runs(project_id)?;
    if runs.is_empty() {
        println!("No runs.");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {:11}  step {} loop {}/{}  {}",
            short_id(&run.id),
            run.status.as_str(),
            run.current_step.as_u8(),
            run.current_loop,
            run.loop_count,
            run.job_name.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn stop_on_ctrl_c(control: std::sync::Arc<ControlRegistry>, run_id: String) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} stopping at the next step boundary (Ctrl-C again to kill)",
                style("Interrupt:").yellow().bold()
            );
            control.request_stop(&run_id);
        } else {
            warn!("Failed to install Ctrl-C handler");
        }
    });
}

fn report_outcome(run_id: &str, outcome: SequencerOutcome) {
    match outcome {
        SequencerOutcome::Completed => {
            println!("{} run {}", style("Completed").green().bold(), run_id);
        }
        SequencerOutcome::Paused => {
            println!(
                "{} run {} (resume with `hypoforge run resume {}`)",
                style("Paused").yellow().bold(),
                run_id,
                run_id
            );
        }
        SequencerOutcome::Stopped => {
            println!("{} run {}", style("Stopped").red().bold(), run_id);
        }
        SequencerOutcome::BudgetExhausted => {
            // The lifecycle re-invokes internally; reaching here means it
            // chose to yield anyway
            println!("{} run {}", style("Yielded").yellow().bold(), run_id);
        }
    }
}

fn print_run_detail(run: &Run) {
    println!("Run {}", run.id);
    println!("══════════════════════════════════════");
    println!("Status:  {}", run.status.as_str());
    println!(
        "Cursor:  step {} ({}), loop {}/{}",
        run.current_step.as_u8(),
        run.current_step.name(),
        run.current_loop,
        run.loop_count
    );
    if let Some(job) = &run.job_name {
        println!("Job:     {}", job);
    }
    if let Some(validation) = &run.validation {
        println!(
            "Validation: {} found, valid={}, retried={}",
            validation.count, validation.is_valid, validation.retried
        );
        for error in &validation.errors {
            println!("  - {}", error);
        }
    }
    if let Some(progress) = &run.progress_info {
        println!("Progress: {}", progress);
    }
    if let Some(error) = &run.error_message {
        println!("{} {}", style("Error:").red().bold(), error);
    }
    if let Some(completed_at) = &run.completed_at {
        println!("Completed at: {}", completed_at.to_rfc3339());
    }
}
