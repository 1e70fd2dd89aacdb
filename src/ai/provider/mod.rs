//! Generative-AI Provider Abstraction
//!
//! Two capability traits back the pipeline:
//!
//! - `GenerativeProvider`: synchronous prompt completion with a model tier
//!   and optional web-search augmentation
//! - `ResearchProvider`: the long-running research-agent lifecycle,
//!   decomposed into discrete, independently retryable calls (create store →
//!   attach → start → poll → cleanup) because its latency exceeds typical
//!   request timeouts in the caller - the sequencer turns this into a
//!   resumable poll loop
//!
//! ## Modules
//!
//! - `gemini`: reqwest HTTP implementation of both traits
//! - `rate_limit`: global minimum spacing between research starts

mod gemini;
mod rate_limit;

pub use gemini::GeminiProvider;
pub use rate_limit::ResearchRateLimiter;

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ProviderError};

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::Result;

// =============================================================================
// Model Tier
// =============================================================================

/// Model quality tier for completion calls
///
/// Pro for high-stakes synthesis/scoring steps, Flash for extraction and
/// lighter steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Pro,
    Flash,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pro => "pro",
            Self::Flash => "flash",
        }
    }
}

// =============================================================================
// Completion Request
// =============================================================================

/// A synchronous prompt-completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub tier: ModelTier,
    /// Augment generation with the provider's web-search tool
    pub use_search: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, tier: ModelTier) -> Self {
        Self {
            prompt: prompt.into(),
            tier,
            use_search: false,
        }
    }

    pub fn with_search(mut self) -> Self {
        self.use_search = true;
        self
    }
}

// =============================================================================
// Provider Traits
// =============================================================================

/// Synchronous text-generation capability
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Generate text for a prompt at the requested tier.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Terminal or in-flight state of a research interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResearchStatus {
    InProgress,
    Completed(String),
    Failed(String),
}

/// Long-running research capability with file-attachment search
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Create an ephemeral store for attaching reference documents.
    async fn create_reference_store(&self, label: &str) -> Result<String>;

    /// Upload text and block until the provider reports it indexed.
    async fn attach_document(&self, store_id: &str, content: &str, label: &str) -> Result<()>;

    /// Begin a background research run referencing the attached documents.
    /// Returns an opaque interaction handle.
    async fn start_research(&self, prompt: &str, store_id: &str) -> Result<String>;

    /// Check an interaction's state without blocking.
    async fn poll_research(&self, interaction_id: &str) -> Result<ResearchStatus>;

    /// Best-effort cleanup. Callers log failures and never propagate them:
    /// a reference-store leak is acceptable, a pipeline failure is not.
    async fn delete_reference_store(&self, store_id: &str) -> Result<()>;
}

/// Shared provider handles for concurrent access across pipeline stages.
pub type SharedGenerativeProvider = Arc<dyn GenerativeProvider>;
pub type SharedResearchProvider = Arc<dyn ResearchProvider>;
