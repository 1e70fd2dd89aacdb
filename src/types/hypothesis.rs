//! Hypothesis and PromptVersion Entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::run::PipelineStep;

// =============================================================================
// Hypothesis
// =============================================================================

/// One structured business-hypothesis record extracted from a completed
/// loop's integration-step tabular output.
///
/// `number` is globally unique within a project and monotonically
/// increasing across all runs; it is never reused after deletions.
/// `full_data` retains every column of the source row for forward
/// compatibility with schema changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub project_id: String,
    pub run_id: String,
    /// Denormalized from the run for filtering
    pub target_spec_id: String,
    pub technical_assets_id: String,
    /// Project-wide monotonic sequence number
    pub number: i64,
    pub title: Option<String>,
    pub industry: Option<String>,
    pub field: Option<String>,
    pub summary: Option<String>,
    pub customer_problem: Option<String>,
    pub scientific_score: Option<String>,
    pub strategic_level: Option<String>,
    pub catch_up_score: Option<String>,
    pub total_score: Option<String>,
    /// Every column present in the source tabular row
    pub full_data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// A candidate hypothesis as extracted from the free-text research report
/// by the validation engine, before scoring and integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateHypothesis {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub trade_off: String,
    #[serde(default)]
    pub mechanism: String,
    #[serde(default)]
    pub competitive_moat: String,
}

impl CandidateHypothesis {
    /// Names of required fields that are empty, in declaration order
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.trade_off.trim().is_empty() {
            missing.push("trade_off");
        }
        if self.mechanism.trim().is_empty() {
            missing.push("mechanism");
        }
        if self.competitive_moat.trim().is_empty() {
            missing.push("competitive_moat");
        }
        missing
    }
}

// =============================================================================
// Prompt Version
// =============================================================================

/// A version-controlled override of one of the four fixed step prompts.
///
/// At most one version is active per step at a time; activating one
/// deactivates all siblings for that step inside a single transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: String,
    pub step: PipelineStep,
    /// Auto-incremented per step
    pub version: i64,
    pub content: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
