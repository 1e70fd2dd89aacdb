pub mod database;
pub mod hypothesis_store;
pub mod run_store;

pub use database::{Database, PoolConfig, SharedDatabase};
pub use run_store::{ResearchTask, ResearchTaskState};
