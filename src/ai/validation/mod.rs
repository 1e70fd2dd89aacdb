//! Validation and Extraction Engine
//!
//! Converts free-text research reports into structured candidates and
//! enforces the requested hypothesis count.
//!
//! ## Modules
//!
//! - `json_extract`: tolerant JSON extraction from model responses
//! - `extractor`: candidate extraction and the count gate

pub mod extractor;
pub mod json_extract;

pub use extractor::{HypothesisExtractor, ValidationAction, ValidationOutcome};
pub use json_extract::{extract_candidate_array, extract_json_from_response};
