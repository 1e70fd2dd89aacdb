//! Configuration Management
//!
//! Figment-based layered configuration: built-in defaults, global and
//! project TOML files, and `HYPOFORGE_*` environment variables.

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    Config, DatabaseSettings, PipelineSettings, ProviderSettings, ResearchStrategyKind,
};
