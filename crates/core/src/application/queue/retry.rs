// Retry policy for failed jobs
use super::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF};
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue the job at the tail after this delay
    Retry(Duration),
    /// Retries exhausted, drop the job
    Drop,
}

/// Bounded retry with a fixed backoff
///
/// A job that has failed `attempts` times is retried while `attempts <= max_retries`,
/// so it executes at most `max_retries + 1` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Decide what happens to a job after its `attempts`-th failure
    pub fn should_retry(&self, job_name: &str, attempts: u32) -> RetryDecision {
        if attempts > self.max_retries {
            warn!(
                job = %job_name,
                attempts = %attempts,
                max_retries = %self.max_retries,
                "Max retry attempts reached"
            );
            return RetryDecision::Drop;
        }

        info!(
            job = %job_name,
            attempt = %attempts,
            max_retries = %self.max_retries,
            delay_ms = %self.backoff.as_millis(),
            "Scheduling retry"
        );
        RetryDecision::Retry(self.backoff)
    }
}
