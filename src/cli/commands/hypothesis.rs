//! Hypothesis Commands

use console::style;

use crate::cli::util::{open_database, short_id};
use crate::config::Config;
use crate::types::Result;

pub fn list(config: &Config, project_id: &str) -> Result<()> {
    let db = open_database(config)?;
    let hypotheses = db.list_hypotheses(project_id)?;
    if hypotheses.is_empty() {
        println!("No hypotheses.");
        return Ok(());
    }
    println!("{:>4}  {:8}  {:40}  {}", "#", "id", "title", "total");
    for h in hypotheses {
        println!(
            "{:>4}  {:8}  {:40}  {}",
            h.number,
            short_id(&h.id),
            h.title.as_deref().unwrap_or("(untitled)"),
            h.total_score.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Delete one hypothesis. Siblings keep their numbers; the freed number
/// is never reused.
pub fn delete(config: &Config, id: &str) -> Result<()> {
    let db = open_database(config)?;
    db.delete_hypothesis(id)?;
    println!("{} hypothesis {}", style("Deleted").red().bold(), id);
    Ok(())
}
