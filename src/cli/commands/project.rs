//! Project Commands

use console::style;

use crate::cli::util::{open_database, short_id};
use crate::config::Config;
use crate::types::{Project, Result};

pub fn create(config: &Config, name: &str, description: Option<String>) -> Result<()> {
    let db = open_database(config)?;
    let project = Project::new(name, description);
    db.insert_project(&project)?;
    println!(
        "{} project {} ({})",
        style("Created").green().bold(),
        project.name,
        project.id
    );
    Ok(())
}

pub fn list(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let projects = db.list_projects()?;
    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    for project in projects {
        println!(
            "{}  {}  {}",
            short_id(&project.id),
            style(&project.name).bold(),
            project.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub fn delete(config: &Config, id: &str) -> Result<()> {
    let db = open_database(config)?;
    db.soft_delete_project(id)?;
    println!("{} project {}", style("Deleted").red().bold(), id);
    Ok(())
}
