//! Generative-AI Integration Layer
//!
//! Provider abstraction, the deep-research driver, and report validation.
//!
//! ## Modules
//!
//! - `provider`: capability traits and the Gemini implementation
//! - `research`: end-to-end research interaction driver
//! - `validation`: extraction and count enforcement

pub mod provider;
pub mod research;
pub mod validation;

pub use provider::{
    CompletionRequest, GeminiProvider, GenerativeProvider, ModelTier, ResearchProvider,
    ResearchRateLimiter, ResearchStatus, SharedGenerativeProvider, SharedResearchProvider,
};
pub use research::{ResearchInput, ResearchTiming, poll_to_completion, run_research};
pub use validation::{HypothesisExtractor, ValidationAction, ValidationOutcome};
