//! Research Start Rate Limiting
//!
//! The provider enforces quotas on the deep-research agent; a global
//! minimum spacing between `start_research` calls keeps the pipeline
//! inside them. Shared process-wide so concurrent runs contend on the
//! same window.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Enforces a minimum interval between research starts.
pub struct ResearchRateLimiter {
    min_spacing: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl ResearchRateLimiter {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_start: Mutex::new(None),
        }
    }

    /// Wait until the spacing window allows another research start.
    /// The reservation is taken before returning, so concurrent callers
    /// serialize on the window rather than all passing at once.
    pub async fn acquire(&self) {
        let mut last = self.last_start.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_spacing {
                let wait = self.min_spacing - elapsed;
                debug!("Rate limiting research start: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let limiter = ResearchRateLimiter::new(Duration::from_secs(10));
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_acquire_waits_out_the_window() {
        let limiter = ResearchRateLimiter::new(Duration::from_secs(10));
        limiter.acquire().await;

        let before = Instant::now();
        limiter.acquire().await;
        // Paused clock auto-advances through the sleep
        assert!(before.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_already_elapsed() {
        let limiter = ResearchRateLimiter::new(Duration::from_secs(10));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(11)).await;

        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
