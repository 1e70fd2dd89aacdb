//! Recover Command
//!
//! Startup recovery sweep: runs left `running` or `paused` by a crashed
//! process are reclassified as `interrupted` so readers stop treating
//! them as in flight. Works straight against storage so it needs no
//! provider credentials.

use console::style;

use crate::cli::util::open_database;
use crate::config::Config;
use crate::pipeline::INTERRUPTED_MESSAGE;
use crate::types::Result;

pub fn run(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let recovered = db.reclassify_stale_runs(INTERRUPTED_MESSAGE)?;
    if recovered.is_empty() {
        println!("No orphaned runs.");
    } else {
        for id in &recovered {
            println!("{} run {}", style("Interrupted").yellow().bold(), id);
        }
        println!("{} run(s) reclassified.", recovered.len());
    }
    Ok(())
}
