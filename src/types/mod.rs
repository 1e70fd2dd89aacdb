pub mod error;
pub mod hypothesis;
pub mod project;
pub mod run;

pub use error::{ErrorCategory, ForgeError, ProviderError, Result, ResultExt};
pub use hypothesis::{CandidateHypothesis, Hypothesis, PromptVersion};
pub use project::{Project, Resource, ResourceKind};
pub use run::{NewRun, PipelineStep, Run, RunStatus, ValidationMetadata};
