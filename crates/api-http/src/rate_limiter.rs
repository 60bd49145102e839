//! Upload Rate Limiting (Token Bucket)
//!
//! One bucket per owner. Each bucket packs its token count and last refill
//! time into a single `AtomicU64` so `check` never takes a lock.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default burst size per owner
pub const DEFAULT_BURST: u32 = 20;

/// Default refill rate per owner (tokens per second)
pub const DEFAULT_REFILL_PER_SEC: u32 = 5;

/// How often idle, full buckets are dropped
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Token bucket with lock-free consume
///
/// The refill timestamp is the low 32 bits of the caller's millisecond clock and
/// is compared with wrapping arithmetic, so it stays correct across the
/// roughly 49.7 day wrap as long as a bucket is touched (or swept) in between.
pub struct TokenBucket {
    // Upper 32 bits: tokens; lower 32 bits: last refill (ms, wrapping)
    packed: AtomicU64,
    max_tokens: u32,
    refill_per_sec: u32,
}

impl TokenBucket {
    pub fn new(max_tokens: u32, refill_per_sec: u32) -> Self {
        Self::starting_at(max_tokens, refill_per_sec, 0)
    }

    /// Full bucket whose refill clock starts at `now_ms`
    pub fn starting_at(max_tokens: u32, refill_per_sec: u32, now_ms: u64) -> Self {
        Self {
            packed: AtomicU64::new(((max_tokens as u64) << 32) | (now_ms as u32) as u64),
            max_tokens,
            refill_per_sec,
        }
    }

    /// Tokens available at `now_ms`, and the refill stamp to store with them
    fn refilled(&self, packed: u64, now_ms: u64) -> (u32, u32) {
        let tokens = (packed >> 32) as u32;
        let last_refill_ms = packed as u32;
        let now = now_ms as u32;

        let delta_ms = now.wrapping_sub(last_refill_ms);
        let added = (delta_ms as u64 * self.refill_per_sec as u64) / 1000;

        // Partial tokens keep accruing until a whole one is earned
        let refill_ms = if added > 0 { now } else { last_refill_ms };
        let available = (tokens as u64 + added).min(self.max_tokens as u64) as u32;
        (available, refill_ms)
    }

    /// Consume one token at `now_ms` (caller's clock); false when empty
    pub fn check_at(&self, now_ms: u64) -> bool {
        loop {
            let packed = self.packed.load(Ordering::Acquire);
            let (available, refill_ms) = self.refilled(packed, now_ms);
            if available == 0 {
                return false;
            }

            let next = (((available - 1) as u64) << 32) | refill_ms as u64;
            if self
                .packed
                .compare_exchange(packed, next, Ordering::Release, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Tokens left at the last update
    pub fn remaining(&self) -> u32 {
        (self.packed.load(Ordering::Acquire) >> 32) as u32
    }

    /// Refilled to the brim by `now_ms`
    fn is_full_at(&self, now_ms: u64) -> bool {
        let (available, _) = self.refilled(self.packed.load(Ordering::Acquire), now_ms);
        available >= self.max_tokens
    }
}

/// Per-owner upload limiter
///
/// Buckets of owners that went quiet long enough to refill completely are
/// evicted on a sweep every `SWEEP_INTERVAL`; a new bucket starts full, so
/// eviction never changes a decision.
pub struct OwnerRateLimiter {
    buckets: DashMap<String, TokenBucket>,
    burst: u32,
    refill_per_sec: u32,
    origin: Instant,
    last_sweep_ms: AtomicU64,
}

impl OwnerRateLimiter {
    pub fn new(burst: u32, refill_per_sec: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            burst,
            refill_per_sec,
            origin: Instant::now(),
            last_sweep_ms: AtomicU64::new(0),
        }
    }

    pub fn check(&self, owner_id: &str) -> bool {
        self.check_at(owner_id, self.origin.elapsed().as_millis() as u64)
    }

    fn check_at(&self, owner_id: &str, now_ms: u64) -> bool {
        self.maybe_sweep(now_ms);
        if let Some(bucket) = self.buckets.get(owner_id) {
            return bucket.check_at(now_ms);
        }
        self.buckets
            .entry(owner_id.to_string())
            .or_insert_with(|| TokenBucket::starting_at(self.burst, self.refill_per_sec, now_ms))
            .check_at(now_ms)
    }

    fn maybe_sweep(&self, now_ms: u64) {
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) < SWEEP_INTERVAL.as_millis() as u64 {
            return;
        }
        // One caller per interval does the sweep
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.sweep_at(now_ms);
        }
    }

    /// Drop every bucket that has refilled completely
    fn sweep_at(&self, now_ms: u64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_full_at(now_ms));
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.buckets.len(), "Evicted idle rate limit buckets");
        }
        evicted
    }

    pub fn tracked_owners(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for OwnerRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BURST, DEFAULT_REFILL_PER_SEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_bucket_allows_burst_then_denies() {
        let bucket = TokenBucket::new(10, 1);
        for _ in 0..10 {
            assert!(bucket.check_at(0));
        }
        assert!(!bucket.check_at(0));
        assert_eq!(bucket.remaining(), 0);
    }

    #[test]
    fn test_bucket_refills() {
        let bucket = TokenBucket::new(5, 10);
        for _ in 0..5 {
            assert!(bucket.check_at(0));
        }
        assert!(!bucket.check_at(50));

        // 10/s: one token after 100ms, three after 300ms
        assert!(bucket.check_at(300));
        assert_eq!(bucket.remaining(), 2);
    }

    #[test]
    fn test_bucket_refills_across_millisecond_wrap() {
        let before_wrap = u32::MAX as u64 - 100;
        let bucket = TokenBucket::starting_at(5, 10, before_wrap);
        for _ in 0..5 {
            assert!(bucket.check_at(before_wrap));
        }
        assert!(!bucket.check_at(before_wrap));

        // 1.1s later the low 32 bits have wrapped past zero
        let after_wrap = u32::MAX as u64 + 1_000;
        assert!(bucket.check_at(after_wrap));
        assert_eq!(bucket.remaining(), 4);
    }

    #[tokio::test]
    async fn test_bucket_concurrent_never_exceeds_burst() {
        let bucket = Arc::new(TokenBucket::new(100, 1));

        let mut handles = vec![];
        for _ in 0..10 {
            let bucket = Arc::clone(&bucket);
            handles.push(tokio::spawn(async move {
                (0..20).filter(|_| bucket.check_at(0)).count()
            }));
        }

        let mut total_allowed = 0;
        for handle in handles {
            total_allowed += handle.await.unwrap();
        }
        assert_eq!(total_allowed, 100);
    }

    #[test]
    fn test_owners_have_separate_buckets() {
        let limiter = OwnerRateLimiter::new(2, 1);
        assert!(limiter.check("alice"));
        assert!(limiter.check("alice"));
        assert!(!limiter.check("alice"));

        assert!(limiter.check("bob"));
        assert_eq!(limiter.tracked_owners(), 2);
    }

    #[test]
    fn test_sweep_evicts_only_refilled_buckets() {
        let limiter = OwnerRateLimiter::new(2, 1);
        assert!(limiter.check_at("alice", 0));
        assert!(limiter.check_at("alice", 0));
        assert!(limiter.check_at("bob", 0));

        // bob is full again after 1s, alice needs 2s
        assert_eq!(limiter.sweep_at(1_000), 1);
        assert_eq!(limiter.tracked_owners(), 1);
        assert!(!limiter.check_at("alice", 500));

        assert_eq!(limiter.sweep_at(10_000), 1);
        assert_eq!(limiter.tracked_owners(), 0);
    }

    #[test]
    fn test_sweep_runs_once_per_interval() {
        let limiter = OwnerRateLimiter::new(2, 1);
        assert!(limiter.check_at("alice", 0));
        assert_eq!(limiter.tracked_owners(), 1);

        let interval = SWEEP_INTERVAL.as_millis() as u64;
        // alice is swept before bob's bucket is created
        assert!(limiter.check_at("bob", interval));
        assert_eq!(limiter.tracked_owners(), 1);

        assert!(limiter.check_at("carol", interval + 1));
        assert_eq!(limiter.tracked_owners(), 2);
    }
}
