//! Prompt Version Commands

use std::path::Path;

use console::style;

use crate::cli::util::open_database;
use crate::config::Config;
use crate::pipeline::prompts;
use crate::types::{ForgeError, PipelineStep, Result};

fn parse_step(step: u8) -> Result<PipelineStep> {
    PipelineStep::from_u8(step).ok_or_else(|| {
        ForgeError::Validation(format!("Unknown step {}. Valid steps: 2-5", step))
    })
}

/// Register a new (inactive) prompt version for a step from a file.
pub fn add(config: &Config, step: u8, file: &Path) -> Result<()> {
    let step = parse_step(step)?;
    let content = std::fs::read_to_string(file)?;
    let db = open_database(config)?;
    let version = db.add_prompt_version(step, &content)?;
    println!(
        "{} version {} for step {} ({})",
        style("Added").green().bold(),
        version.version,
        step.as_u8(),
        version.id
    );
    println!("Activate with `hypoforge prompt activate {}`", version.id);
    Ok(())
}

/// Make a version the single active override for its step.
pub fn activate(config: &Config, id: &str) -> Result<()> {
    let db = open_database(config)?;
    db.activate_prompt_version(id)?;
    println!("{} prompt version {}", style("Activated").green().bold(), id);
    Ok(())
}

pub fn list(config: &Config, step: u8) -> Result<()> {
    let step = parse_step(step)?;
    let db = open_database(config)?;
    let versions = db.list_prompt_versions(step)?;
    if versions.is_empty() {
        println!(
            "No overrides for step {}; the built-in template is in effect:",
            step.as_u8()
        );
        println!("\n{}", prompts::builtin_template(step));
        return Ok(());
    }
    for version in versions {
        let marker = if version.is_active { "*" } else { " " };
        println!(
            "{} v{:<3} {}  ({} chars)",
            marker,
            version.version,
            version.id,
            version.content.len()
        );
    }
    Ok(())
}
