//! HypoForge - Resumable AI-Driven Business Hypothesis Pipeline
//!
//! A multi-step, long-running orchestration engine that turns a target
//! specification and a technical-assets document into a growing set of
//! scored business hypotheses through a generative-AI research pipeline.
//!
//! ## Core Features
//!
//! - **Resumable State Machine**: every decision recomputed from the
//!   persisted run row; invocations can die and resume anywhere
//! - **Checkpointed Control**: pause/resume/stop honored at step
//!   boundaries, never losing committed work
//! - **Validated Extraction**: structural count gate with one automatic
//!   regeneration before hard failure
//! - **Research Strategies**: one shared deep-research call, or a
//!   restart-safe bounded fan-out per hypothesis
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use hypoforge::{ConfigLoader, ControlRegistry, Database, GeminiProvider,
//!                 RunLifecycle, StepSequencer};
//!
//! let config = ConfigLoader::load()?;
//! let db = Arc::new(Database::open(&config.database.path)?);
//! let provider = Arc::new(GeminiProvider::new(&config.provider)?);
//! let control = Arc::new(ControlRegistry::new());
//! let sequencer = Arc::new(StepSequencer::new(
//!     db.clone(), provider.clone(), provider, control.clone(),
//!     config.pipeline.clone(),
//! ));
//! let lifecycle = RunLifecycle::new(db, sequencer, control);
//! let run = lifecycle.create_run(new_run)?;
//! lifecycle.execute(&run.id).await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: provider abstraction, deep-research driver, validation
//! - [`pipeline`]: sequencer, strategies, control signals, output tables
//! - [`storage`]: SQLite persistence with connection pooling
//! - [`config`]: layered figment configuration
//! - [`types`]: domain entities and the unified error type

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod pipeline;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader, PipelineSettings, ResearchStrategyKind};

// Error Types
pub use types::error::{ErrorCategory, ForgeError, ProviderError, Result, ResultExt};

// Domain Types
pub use types::{
    CandidateHypothesis, Hypothesis, NewRun, PipelineStep, Project, PromptVersion, Resource,
    ResourceKind, Run, RunStatus, ValidationMetadata,
};

// Storage
pub use storage::database::PoolConfig;
pub use storage::{Database, SharedDatabase};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{
    ControlRegistry, RunLifecycle, SequencerOutcome, StepSequencer, parse_delimited_table,
};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    CompletionRequest,
    GeminiProvider,
    GenerativeProvider,
    HypothesisExtractor,
    ModelTier,
    ResearchProvider,
    ResearchRateLimiter,
    ResearchStatus,
    SharedGenerativeProvider,
    SharedResearchProvider,
};
