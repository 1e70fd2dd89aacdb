//! Control-Signal Registry
//!
//! In-memory pause/stop flags keyed by run id. Signals are observed by
//! the sequencer only at step boundaries, after the finished step's
//! output has been committed, so a signal never loses completed work.
//!
//! The registry is process-local by design: flags do not survive a
//! restart. Crash recovery reclassifies in-flight runs instead.

use dashmap::DashSet;
use tracing::info;

/// Error message recorded on a run terminated by a stop request.
pub const CANCELLATION_MESSAGE: &str = "Cancelled by user stop request";

/// Lock-free pause/stop signal flags, shared across the runner and all
/// in-flight sequencer tasks.
#[derive(Debug, Default)]
pub struct ControlRegistry {
    pause_requested: DashSet<String>,
    stop_requested: DashSet<String>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask a run to pause at its next step boundary.
    pub fn request_pause(&self, run_id: &str) {
        info!(run_id, "Pause requested");
        self.pause_requested.insert(run_id.to_string());
    }

    /// Withdraw a pending pause request.
    pub fn request_resume(&self, run_id: &str) {
        self.pause_requested.remove(run_id);
    }

    /// Ask a run to stop at its next step boundary. Takes precedence
    /// over a pending pause.
    pub fn request_stop(&self, run_id: &str) {
        info!(run_id, "Stop requested");
        self.stop_requested.insert(run_id.to_string());
    }

    pub fn is_pause_requested(&self, run_id: &str) -> bool {
        self.pause_requested.contains(run_id)
    }

    pub fn is_stop_requested(&self, run_id: &str) -> bool {
        self.stop_requested.contains(run_id)
    }

    /// Drop both flags once the sequencer has acted on them.
    pub fn clear(&self, run_id: &str) {
        self.pause_requested.remove(run_id);
        self.stop_requested.remove(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals_are_independent_per_run() {
        let registry = ControlRegistry::new();
        registry.request_pause("run-a");
        registry.request_stop("run-b");

        assert!(registry.is_pause_requested("run-a"));
        assert!(!registry.is_stop_requested("run-a"));
        assert!(registry.is_stop_requested("run-b"));
        assert!(!registry.is_pause_requested("run-b"));
    }

    #[test]
    fn test_resume_withdraws_pause() {
        let registry = ControlRegistry::new();
        registry.request_pause("run-a");
        registry.request_resume("run-a");
        assert!(!registry.is_pause_requested("run-a"));
    }

    #[test]
    fn test_clear_drops_both_flags() {
        let registry = ControlRegistry::new();
        registry.request_pause("run-a");
        registry.request_stop("run-a");
        registry.clear("run-a");
        assert!(!registry.is_pause_requested("run-a"));
        assert!(!registry.is_stop_requested("run-a"));
    }

    #[test]
    fn test_fresh_registry_has_no_signals() {
        // Signals are process-local: a restart starts from this state
        // regardless of what was requested before the crash
        let registry = ControlRegistry::new();
        assert!(!registry.is_pause_requested("run-a"));
        assert!(!registry.is_stop_requested("run-a"));
    }
}
