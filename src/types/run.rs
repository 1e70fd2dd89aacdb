//! Run Entity and Pipeline Cursor Types
//!
//! A Run is one (possibly multi-loop) execution of the pipeline against a
//! chosen pair of resources. It is the central stateful entity: the
//! persisted row is the single source of truth for "what happens next",
//! so every field the sequencer needs to resume after a process restart
//! lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Run Status
// =============================================================================

/// Top-level run lifecycle state
///
/// Transitions only move forward except `Paused ⇄ Running`. `Completed`,
/// `Error`, and `Cancelled` are terminal. `Interrupted` marks a run found
/// running/paused at startup after an uncontrolled restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Error,
    Interrupted,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Interrupted => "interrupted",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            "interrupted" => Some(Self::Interrupted),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Error | Self::Interrupted | Self::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Pipeline Step
// =============================================================================

/// One of the four fixed pipeline phases within a loop
///
/// Steps are numbered 2-5 to match the domain's step numbering:
/// - 2: Research - long-running deep-research interaction
/// - 3: ScientificEvaluation - scoring of mechanism plausibility
/// - 4: StrategicAudit - competitive/strategic assessment
/// - 5: Integration - synthesis into the tabular hypothesis list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStep {
    Research = 2,
    ScientificEvaluation = 3,
    StrategicAudit = 4,
    Integration = 5,
}

impl PipelineStep {
    pub const FIRST: Self = Self::Research;
    pub const LAST: Self = Self::Integration;

    /// Total number of steps in a loop
    pub const COUNT: usize = 4;

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(step: u8) -> Option<Self> {
        match step {
            2 => Some(Self::Research),
            3 => Some(Self::ScientificEvaluation),
            4 => Some(Self::StrategicAudit),
            5 => Some(Self::Integration),
            _ => None,
        }
    }

    /// The step that follows this one within a loop, if any
    pub fn next(&self) -> Option<Self> {
        Self::from_u8(self.as_u8() + 1)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Research => "Research",
            Self::ScientificEvaluation => "Scientific Evaluation",
            Self::StrategicAudit => "Strategic Audit",
            Self::Integration => "Integration",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}

// =============================================================================
// Validation Metadata
// =============================================================================

/// Outcome of the extraction/validation pass, persisted on the run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationMetadata {
    /// Number of hypotheses accepted
    pub count: usize,
    /// Whether all accepted items passed the completeness checks
    pub is_valid: bool,
    /// Advisory validation errors (empty required fields, truncation notes)
    pub errors: Vec<String>,
    /// Whether the automatic regeneration retry was used
    pub retried: bool,
}

// =============================================================================
// Run
// =============================================================================

/// One execution of the pipeline against a chosen pair of resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    // Identity
    pub id: String,
    pub project_id: String,
    pub target_spec_id: String,
    pub technical_assets_id: String,

    // Configuration
    /// Desired hypotheses per loop
    pub hypothesis_count: usize,
    /// Total loop iterations requested
    pub loop_count: usize,
    pub job_name: Option<String>,
    /// Optional resource-id filter scoping the deduplication context
    pub existing_filter: Option<Vec<String>>,

    // Progress cursor
    pub status: RunStatus,
    pub current_step: PipelineStep,
    /// 1-based loop counter
    pub current_loop: usize,

    // Intermediate outputs, one per step; cleared between loops except step 5
    pub step2_output: Option<String>,
    pub step3_output: Option<String>,
    pub step4_output: Option<String>,
    pub step5_output: Option<String>,

    // Structured result
    /// Parsed rows of the final step's tabular output
    pub integrated_list: Option<Value>,
    pub validation: Option<ValidationMetadata>,

    // Diagnostics
    /// Free-form phase/timing telemetry for polling readers
    pub progress_info: Option<Value>,
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Whether the current loop is the last one requested
    pub fn is_final_loop(&self) -> bool {
        self.current_loop >= self.loop_count
    }
}

/// Parameters for creating a new run
#[derive(Debug, Clone)]
pub struct NewRun {
    pub project_id: String,
    pub target_spec_id: String,
    pub technical_assets_id: String,
    pub hypothesis_count: usize,
    pub loop_count: usize,
    pub job_name: Option<String>,
    pub existing_filter: Option<Vec<String>>,
}

impl NewRun {
    /// Materialize into a pending Run positioned at loop 1, step 2
    pub fn into_run(self) -> Run {
        Run {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: self.project_id,
            target_spec_id: self.target_spec_id,
            technical_assets_id: self.technical_assets_id,
            hypothesis_count: self.hypothesis_count,
            loop_count: self.loop_count.max(1),
            job_name: self.job_name,
            existing_filter: self.existing_filter,
            status: RunStatus::Pending,
            current_step: PipelineStep::FIRST,
            current_loop: 1,
            step2_output: None,
            step3_output: None,
            step4_output: None,
            step5_output: None,
            integrated_list: None,
            validation: None,
            progress_info: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
