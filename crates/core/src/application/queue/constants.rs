// Job queue constants (no magic values)
use std::time::Duration;

/// Retries after the first failed attempt (a job runs at most `1 + 1` times)
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Fixed delay before a failed job is re-enqueued (1.5s)
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(1500);

/// Upper bound for draining the queue on shutdown (5s)
pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
