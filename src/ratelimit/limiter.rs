//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::key::ClientKey;
use super::store::{ShardedStore, WindowStore};
use super::window::{Decision, Quota, Timestamp, WindowRecord};
use crate::error::Result;

/// A fixed-window rate limiter for a single quota.
///
/// Each limiter owns its own store, so separate routes or tenants get
/// separate limiters with independent counters. The limiter is thread-safe
/// and can be shared across tasks behind an `Arc`.
pub struct RateLimiter {
    /// Admissions allowed per window
    quota: Quota,
    /// Per-key window records
    store: Box<dyn WindowStore>,
    /// Time source for `check_now`
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter backed by a sharded store and the system clock.
    ///
    /// Fails if `window_ms` is zero.
    pub fn new(max_requests: u64, window_ms: u64) -> Result<Self> {
        Ok(Self::with_store(
            Quota::new(max_requests, window_ms)?,
            Box::new(ShardedStore::new()),
            Arc::new(SystemClock),
        ))
    }

    /// Create a limiter from its parts.
    pub fn with_store(quota: Quota, store: Box<dyn WindowStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            quota,
            store,
            clock,
        }
    }

    /// Count one request from `key` at `now` and decide whether to admit it.
    pub fn check(&self, key: &ClientKey, now: Timestamp) -> Decision {
        trace!(key = %key, now = %now, "Checking rate limit");

        let decision = self.store.hit(key, now, &self.quota);

        if let Decision::Rejected { retry_after_ms, .. } = decision {
            debug!(
                key = %key,
                limit = self.quota.max_requests(),
                retry_after_ms = retry_after_ms,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Validate a raw key and check it.
    ///
    /// An empty key is an error rather than a shared anonymous bucket.
    pub fn check_str(&self, key: &str, now: Timestamp) -> Result<Decision> {
        let key = ClientKey::new(key)?;
        Ok(self.check(&key, now))
    }

    /// Check `key` against the limiter's own clock.
    pub fn check_now(&self, key: &ClientKey) -> Decision {
        self.check(key, self.clock.now())
    }

    /// Remove records whose window started at least `max_age` before `now`.
    ///
    /// `max_age` is never shorter than the window, so a live window is never
    /// evicted and a sweep cannot change any decision. Returns the number of
    /// records removed.
    pub fn cleanup(&self, now: Timestamp, max_age: Duration) -> usize {
        let max_age_ms = u64::try_from(max_age.as_millis())
            .unwrap_or(u64::MAX)
            .max(self.quota.window_ms());

        let Some(cutoff) = now.as_millis().checked_sub(max_age_ms) else {
            return 0;
        };

        let removed = self.store.evict_started_before(Timestamp(cutoff));
        if removed > 0 {
            debug!(
                removed = removed,
                remaining = self.store.len(),
                "Evicted expired rate limit windows"
            );
        }
        removed
    }

    /// Remove every record whose window has elapsed at `now`.
    pub fn sweep(&self, now: Timestamp) -> usize {
        self.cleanup(now, Duration::from_millis(self.quota.window_ms()))
    }

    /// The quota this limiter enforces.
    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Current record for `key`, if one exists.
    pub fn snapshot(&self, key: &ClientKey) -> Option<WindowRecord> {
        self.store.get(key)
    }

    /// Get the number of tracked keys.
    pub fn counter_count(&self) -> usize {
        self.store.len()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("quota", &self.quota)
            .field("counters", &self.store.len())
            .finish()
    }
}
