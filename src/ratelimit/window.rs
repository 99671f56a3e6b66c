//! Fixed-window counting.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnstileError};

/// A clock reading in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Milliseconds elapsed since `earlier`, or zero if `earlier` is in the future.
    pub fn millis_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// The raw millisecond value.
    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A validated quota: at most `max_requests` admissions per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quota {
    max_requests: u64,
    window_ms: u64,
}

impl Quota {
    /// Create a quota. A zero-length window is a configuration error.
    pub fn new(max_requests: u64, window_ms: u64) -> Result<Self> {
        if window_ms == 0 {
            return Err(TurnstileError::Config(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window_ms,
        })
    }

    /// Maximum admissions per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum Decision {
    /// The request may proceed.
    Admitted { limit: u64, remaining: u64 },
    /// The quota for the current window is spent.
    Rejected { limit: u64, retry_after_ms: u64 },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }

    /// The quota this decision was made against.
    pub fn limit(&self) -> u64 {
        match *self {
            Decision::Admitted { limit, .. } | Decision::Rejected { limit, .. } => limit,
        }
    }

    /// Requests left in the current window (zero once rejected).
    pub fn remaining(&self) -> u64 {
        match *self {
            Decision::Admitted { remaining, .. } => remaining,
            Decision::Rejected { .. } => 0,
        }
    }

    /// Time until the window rolls over, for rejected decisions.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match *self {
            Decision::Admitted { .. } => None,
            Decision::Rejected { retry_after_ms, .. } => Some(retry_after_ms),
        }
    }
}

/// Per-key counting state for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowRecord {
    /// Requests observed in the current window
    pub count: u64,
    /// When the current window started
    pub window_start: Timestamp,
}

impl WindowRecord {
    /// A fresh record whose window starts at `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Whether the window that started at `window_start` has fully elapsed.
    pub fn is_expired(&self, now: Timestamp, window_ms: u64) -> bool {
        now.millis_since(self.window_start) >= window_ms
    }

    /// Count one request at `now` and decide whether to admit it.
    ///
    /// Rolls the window first if it has elapsed. `window_start` never moves
    /// backwards; a clock reading earlier than it counts as zero elapsed time.
    pub fn hit(&mut self, now: Timestamp, quota: &Quota) -> Decision {
        if self.is_expired(now, quota.window_ms) {
            self.window_start = now;
            self.count = 0;
        }

        self.count = self.count.saturating_add(1);

        if self.count > quota.max_requests {
            let elapsed = now.millis_since(self.window_start);
            Decision::Rejected {
                limit: quota.max_requests,
                retry_after_ms: quota.window_ms - elapsed,
            }
        } else {
            Decision::Admitted {
                limit: quota.max_requests,
                remaining: quota.max_requests - self.count,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(max: u64, window: u64) -> Quota {
        Quota::new(max, window).unwrap()
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(matches!(Quota::new(10, 0), Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_hit_within_limit() {
        let q = quota(10, 1000);
        let mut record = WindowRecord::new(Timestamp(0));

        let decision = record.hit(Timestamp(0), &q);
        assert_eq!(decision, Decision::Admitted { limit: 10, remaining: 9 });
        assert_eq!(record.count, 1);
    }

    #[test]
    fn test_hit_exceeds_limit() {
        let q = quota(2, 1000);
        let mut record = WindowRecord::new(Timestamp(0));

        assert!(record.hit(Timestamp(0), &q).is_admitted());
        assert!(record.hit(Timestamp(10), &q).is_admitted());

        let decision = record.hit(Timestamp(250), &q);
        assert_eq!(
            decision,
            Decision::Rejected { limit: 2, retry_after_ms: 750 }
        );
        assert_eq!(decision.remaining(), 0);
    }

    #[test]
    fn test_window_rolls_over_at_boundary() {
        let q = quota(1, 1000);
        let mut record = WindowRecord::new(Timestamp(0));

        assert!(record.hit(Timestamp(0), &q).is_admitted());
        assert!(!record.hit(Timestamp(999), &q).is_admitted());
        assert!(record.hit(Timestamp(1000), &q).is_admitted());
        assert_eq!(record.window_start, Timestamp(1000));
        assert_eq!(record.count, 1);
    }

    #[test]
    fn test_clock_going_backwards_keeps_window() {
        let q = quota(5, 1000);
        let mut record = WindowRecord::new(Timestamp(500));
        record.hit(Timestamp(500), &q);

        let decision = record.hit(Timestamp(100), &q);
        assert!(decision.is_admitted());
        assert_eq!(record.window_start, Timestamp(500));
        assert_eq!(record.count, 2);
    }

    #[test]
    fn test_zero_quota_rejects_first_hit() {
        let q = quota(0, 1000);
        let mut record = WindowRecord::new(Timestamp(0));

        assert_eq!(
            record.hit(Timestamp(0), &q),
            Decision::Rejected { limit: 0, retry_after_ms: 1000 }
        );
    }

    #[test]
    fn test_decision_serializes_with_tag() {
        let json = serde_json::to_value(Decision::Rejected { limit: 3, retry_after_ms: 40 }).unwrap();
        assert_eq!(json["decision"], "rejected");
        assert_eq!(json["retry_after_ms"], 40);
    }
}
