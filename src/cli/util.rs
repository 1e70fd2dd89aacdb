//! CLI Utilities
//!
//! Shared wiring for the command handlers.

use std::sync::Arc;

use crate::ai::GeminiProvider;
use crate::config::Config;
use crate::pipeline::{ControlRegistry, RunLifecycle, StepSequencer};
use crate::storage::{Database, SharedDatabase};
use crate::types::Result;

/// Open (or create) the configured database.
pub fn open_database(config: &Config) -> Result<SharedDatabase> {
    Ok(Arc::new(Database::open(&config.database.path)?))
}

/// Assemble the full pipeline stack for commands that drive runs.
pub fn build_lifecycle(
    config: &Config,
    db: SharedDatabase,
) -> Result<(RunLifecycle, Arc<ControlRegistry>)> {
    let provider = Arc::new(GeminiProvider::new(&config.provider)?);
    let control = Arc::new(ControlRegistry::new());
    let sequencer = Arc::new(StepSequencer::new(
        db.clone(),
        provider.clone(),
        provider,
        control.clone(),
        config.pipeline.clone(),
    ));
    Ok((RunLifecycle::new(db, sequencer, control.clone()), control))
}

/// Shorten an id for table display.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
