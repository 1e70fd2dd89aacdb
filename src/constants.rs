//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Research interaction constants
pub mod research {
    /// Interval between research-handle polls (seconds)
    pub const POLL_INTERVAL_SECS: u64 = 15;

    /// Hard ceiling on a research interaction before it is treated as a
    /// timeout failure (30 minutes)
    pub const TIMEOUT_SECS: u64 = 1800;

    /// Interval between document-indexing polls during attachment (seconds)
    pub const ATTACH_POLL_INTERVAL_SECS: u64 = 2;

    /// Ceiling on waiting for a document attachment to be indexed (seconds)
    pub const ATTACH_TIMEOUT_SECS: u64 = 300;

    /// Minimum spacing between research starts, for provider quotas (seconds)
    pub const MIN_START_SPACING_SECS: u64 = 10;
}

/// Pipeline constants
pub mod pipeline {
    /// Bounded window for per-hypothesis research fan-out
    pub const MAX_CONCURRENT_RESEARCH: usize = 5;

    /// Automatic regeneration attempts when the extracted count falls
    /// short of the requested count
    pub const VALIDATION_MAX_RETRIES: usize = 1;

    /// Default wall-clock budget for one sequencer invocation (seconds).
    /// After the budget elapses the invocation returns and asks to be
    /// re-invoked instead of continuing in place.
    pub const INVOCATION_BUDGET_SECS: u64 = 3600;

    /// Default hypotheses requested per loop
    pub const DEFAULT_HYPOTHESIS_COUNT: usize = 5;

    /// Default loop iterations per run
    pub const DEFAULT_LOOP_COUNT: usize = 1;
}

/// Provider constants
pub mod provider {
    /// Default request timeout for synchronous completions (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Default maximum output tokens for completions
    pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 8192;

    /// Maximum transient-retry attempts per HTTP call
    pub const MAX_RETRIES: usize = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;
}
