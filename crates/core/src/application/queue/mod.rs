// Job Queue - in-memory, single-flight background work

pub mod constants;
mod panic_guard;
mod retry;

pub use panic_guard::{panic_message, HandlerAbort};
pub use retry::{RetryDecision, RetryPolicy};

use crate::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Opaque structured job data
pub type JobPayload = serde_json::Value;

/// Unit of background work
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, payload: &JobPayload) -> Result<()>;
}

/// Adapter turning an async closure into a [`JobHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobPayload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn run(&self, payload: &JobPayload) -> Result<()> {
        (self.0)(payload.clone()).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(JobPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Queued job
pub struct Job {
    pub name: String,
    pub payload: JobPayload,
    handler: Arc<dyn JobHandler>,
    /// Failed executions so far; only the retry path increments it
    pub attempts: u32,
}

impl Job {
    pub fn new(name: impl Into<String>, payload: JobPayload, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            name: name.into(),
            payload,
            handler,
            attempts: 0,
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("payload", &self.payload)
            .field("attempts", &self.attempts)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: constants::DEFAULT_MAX_RETRIES,
            backoff: constants::DEFAULT_RETRY_BACKOFF,
        }
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    running: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    retry_policy: RetryPolicy,
    /// Retries sleeping out their backoff
    scheduled_retries: AtomicUsize,
    idle: Notify,
}

/// Job queue handle
///
/// Cloning is cheap and every clone feeds the same pending list. At most one
/// handler executes at a time; failed jobs go back to the tail after the backoff.
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                retry_policy: RetryPolicy::new(config.max_retries, config.backoff),
                scheduled_retries: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Schedule a job; never blocks, never reports the outcome
    pub fn enqueue(&self, job: Job) {
        debug!(job = %job.name, attempts = job.attempts, "Job enqueued");
        let start_dispatch = {
            let mut state = self.inner.lock_state();
            state.pending.push_back(job);
            !std::mem::replace(&mut state.running, true)
        };

        if start_dispatch {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.dispatch().await });
        }
    }

    /// Jobs waiting to run (excluding the running one and sleeping retries)
    pub fn pending_len(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    /// Nothing pending, nothing running, no retry waiting out its backoff
    pub fn is_idle(&self) -> bool {
        self.inner.is_idle()
    }

    /// Resolve once the queue is idle
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Wait for the queue to drain, giving up after `timeout`
    ///
    /// Returns `true` if the queue became idle in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.wait_idle()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    pending = self.pending_len(),
                    timeout_ms = %timeout.as_millis(),
                    "Job queue not drained before timeout"
                );
                false
            }
        }
    }
}

impl QueueInner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_idle(&self) -> bool {
        let state = self.lock_state();
        state.pending.is_empty()
            && !state.running
            && self.scheduled_retries.load(Ordering::SeqCst) == 0
    }

    /// Run pending jobs one by one until the list is empty
    async fn dispatch(self: Arc<Self>) {
        loop {
            let job = {
                let mut state = self.lock_state();
                match state.pending.pop_front() {
                    Some(job) => job,
                    None => {
                        state.running = false;
                        break;
                    }
                }
            };

            self.execute(job).await;

            // Start the next job on a fresh poll instead of chaining synchronously
            tokio::task::yield_now().await;
        }

        self.idle.notify_waiters();
    }

    async fn execute(self: &Arc<Self>, mut job: Job) {
        info!(job = %job.name, attempt = job.attempts + 1, "Running job");

        // Handler runs on its own task so a panic cannot take the dispatcher down
        let handler = Arc::clone(&job.handler);
        let payload = job.payload.clone();
        let outcome = tokio::spawn(async move { handler.run(&payload).await }).await;

        let failure = match outcome {
            Ok(Ok(())) => {
                debug!(job = %job.name, "Job completed");
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(join_err) => HandlerAbort::from(join_err).to_string(),
        };

        job.attempts += 1;
        warn!(job = %job.name, attempts = job.attempts, error = %failure, "Job failed");

        match self.retry_policy.should_retry(&job.name, job.attempts) {
            RetryDecision::Retry(delay) => self.schedule_retry(job, delay),
            RetryDecision::Drop => {
                error!(
                    job = %job.name,
                    attempts = job.attempts,
                    error = %failure,
                    "Job dropped after exhausting retries"
                );
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, job: Job, delay: Duration) {
        self.scheduled_retries.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let queue = JobQueue {
                inner: Arc::clone(&inner),
            };
            queue.enqueue(job);
            inner.scheduled_retries.fetch_sub(1, Ordering::SeqCst);
            inner.idle.notify_waiters();
        });
    }
}
