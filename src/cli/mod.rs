//! Command-Line Interface
//!
//! Thin control surface over the pipeline: each subcommand maps to one
//! lifecycle or storage operation.

pub mod commands;
pub mod util;
