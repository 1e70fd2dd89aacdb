//! Pipeline Orchestration
//!
//! The run state machine and everything that drives it.
//!
//! ## Modules
//!
//! - `control`: per-run pause/stop signal registry
//! - `prompts`: step templates and PromptVersion resolution
//! - `sequencer`: the step/loop state machine executor
//! - `strategy`: shared vs fan-out research execution
//! - `table`: tabular output parsing and hypothesis materialization
//! - `runner`: run lifecycle, control operations, crash recovery

pub mod control;
pub mod prompts;
pub mod runner;
pub mod sequencer;
pub mod strategy;
pub mod table;

pub use control::{CANCELLATION_MESSAGE, ControlRegistry};
pub use runner::{INTERRUPTED_MESSAGE, RunLifecycle};
pub use sequencer::{SequencerOutcome, StepSequencer};
pub use strategy::{
    FanOutResearchStrategy, ResearchContext, ResearchStrategy, SharedResearchStrategy,
};
pub use table::{Table, parse_delimited_table, rows_to_hypotheses, rows_to_text};
