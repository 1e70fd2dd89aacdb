//! Resource Commands

use std::path::Path;

use console::style;

use crate::cli::util::{open_database, short_id};
use crate::config::Config;
use crate::types::{ForgeError, Resource, ResourceKind, Result};

/// Add a resource document from a file.
pub fn add(
    config: &Config,
    project_id: &str,
    kind: &str,
    name: &str,
    file: &Path,
) -> Result<()> {
    let kind = ResourceKind::parse(kind).ok_or_else(|| {
        ForgeError::Validation(format!(
            "Unknown resource kind '{}'. Valid values: target_spec, technical_assets",
            kind
        ))
    })?;
    let content = std::fs::read_to_string(file)?;

    let db = open_database(config)?;
    db.get_project(project_id)?
        .ok_or_else(|| ForgeError::not_found("Project", project_id))?;

    let resource = Resource::new(project_id, kind, name, content);
    db.insert_resource(&resource)?;
    println!(
        "{} {} resource {} ({})",
        style("Added").green().bold(),
        kind.as_str(),
        resource.name,
        resource.id
    );
    Ok(())
}

pub fn list(config: &Config, project_id: &str) -> Result<()> {
    let db = open_database(config)?;
    let resources = db.list_resources(project_id)?;
    if resources.is_empty() {
        println!("No resources.");
        return Ok(());
    }
    for resource in resources {
        println!(
            "{}  {:17}  {}  ({} chars)",
            short_id(&resource.id),
            resource.kind.as_str(),
            style(&resource.name).bold(),
            resource.content.len()
        );
    }
    Ok(())
}
