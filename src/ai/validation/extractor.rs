//! Research Report Validation
//!
//! Turns a free-text research report into structured candidate
//! hypotheses via a cheap extraction completion, then applies the count
//! gate: fewer candidates than requested triggers a single regeneration,
//! more are truncated to the first n, an exact match passes. Empty
//! required fields are recorded as advisory errors and never block
//! progression.

use serde_json::Value;
use tracing::{info, warn};

use crate::ai::provider::{CompletionRequest, GenerativeProvider, ModelTier};
use crate::ai::validation::json_extract::extract_candidate_array;
use crate::types::{CandidateHypothesis, Result, ValidationMetadata};

/// What the sequencer should do with the validated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationAction {
    /// Count satisfied (possibly after truncation) - proceed to step 3
    Continue,
    /// Count short and retry budget remains - regenerate the report
    Retry,
}

/// Result of validating one research report.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub candidates: Vec<CandidateHypothesis>,
    pub metadata: ValidationMetadata,
    pub action: ValidationAction,
}

/// Extracts structured candidates from research reports.
pub struct HypothesisExtractor {
    max_retries: usize,
}

impl HypothesisExtractor {
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }

    /// Extract structured candidates from a report via the flash tier.
    pub async fn extract(
        &self,
        provider: &dyn GenerativeProvider,
        report: &str,
        expected: usize,
    ) -> Result<Vec<CandidateHypothesis>> {
        let response = provider
            .complete(&CompletionRequest::new(
                extraction_prompt(report, expected),
                ModelTier::Flash,
            ))
            .await?;

        let items = extract_candidate_array(&response)?;
        Ok(items.into_iter().map(parse_candidate).collect())
    }

    /// Apply the count gate to a candidate set, which may already merge a
    /// first pass with a regeneration.
    ///
    /// `attempt` is zero-based; once it reaches the retry budget a short
    /// count stops being retryable and the caller fails the run with
    /// `InsufficientCount`.
    pub fn gate(
        &self,
        mut candidates: Vec<CandidateHypothesis>,
        expected: usize,
        attempt: usize,
    ) -> ValidationOutcome {
        let found = candidates.len();

        let mut errors = Vec::new();
        let action = if found < expected {
            if attempt < self.max_retries {
                warn!(found, expected, "Too few hypotheses, will regenerate");
                errors.push(format!(
                    "Expected {} hypotheses, found {}; regenerating",
                    expected, found
                ));
                ValidationAction::Retry
            } else {
                errors.push(format!(
                    "Expected {} hypotheses, found {} after retry",
                    expected, found
                ));
                ValidationAction::Continue
            }
        } else {
            if found > expected {
                info!(found, expected, "Truncating surplus hypotheses");
                errors.push(format!(
                    "Found {} hypotheses, truncated to first {}",
                    found, expected
                ));
                candidates.truncate(expected);
            }
            ValidationAction::Continue
        };

        // Field-level gaps are advisory: recorded, never blocking
        for (i, candidate) in candidates.iter().enumerate() {
            let missing = candidate.missing_fields();
            if !missing.is_empty() {
                errors.push(format!(
                    "Hypothesis {} missing fields: {}",
                    i + 1,
                    missing.join(", ")
                ));
            }
        }

        let metadata = ValidationMetadata {
            count: found,
            is_valid: found >= expected,
            errors,
            retried: attempt > 0,
        };

        ValidationOutcome {
            candidates,
            metadata,
            action,
        }
    }
}

fn parse_candidate(item: Value) -> CandidateHypothesis {
    serde_json::from_value(item).unwrap_or_else(|_| CandidateHypothesis {
        title: String::new(),
        trade_off: String::new(),
        mechanism: String::new(),
        competitive_moat: String::new(),
    })
}

fn extraction_prompt(report: &str, expected: usize) -> String {
    format!(
        "Extract the {expected} business hypotheses from the research report below.\n\
         Respond with ONLY a JSON array. Each element must have exactly these \
         string fields: \"title\", \"trade_off\", \"mechanism\", \"competitive_moat\". \
         Use an empty string for anything the report does not state.\n\n\
         REPORT:\n{report}"
    )
}
