//! Fixed-window rate limiting for chat questions.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request fits in the current window.
    Allowed {
        /// Questions left in the window after this one.
        remaining: u32,
    },
    /// The window budget is spent.
    Limited {
        /// Time until the window resets.
        retry_after: Duration,
    },
}

struct Window {
    started_at: Instant,
    count: u32,
}

/// Counts questions per caller inside fixed windows. The first request of a
/// window starts it; once `allowance` requests were counted, further requests
/// are rejected until the window lapses.
pub struct RateLimiter {
    window: Duration,
    buckets: DashMap<String, Window>,
}

impl RateLimiter {
    /// Limiter with the given window length.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buckets: DashMap::new(),
        }
    }

    /// Count one request for `key` against `allowance`.
    pub fn check(&self, key: &str, allowance: u32) -> RateDecision {
        self.check_at(key, allowance, Instant::now())
    }

    /// Drop windows that already lapsed so idle callers do not accumulate.
    pub fn prune(&self) {
        let now = Instant::now();
        self.buckets
            .retain(|_, window| now.duration_since(window.started_at) < self.window);
    }

    fn check_at(&self, key: &str, allowance: u32, now: Instant) -> RateDecision {
        let mut entry = self.buckets.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        let window = entry.value_mut();

        if now.duration_since(window.started_at) >= self.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count < allowance {
            window.count += 1;
            RateDecision::Allowed {
                remaining: allowance - window.count,
            }
        } else {
            let elapsed = now.duration_since(window.started_at);
            RateDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn allows_up_to_the_allowance_then_limits() {
        let limiter = RateLimiter::new(WINDOW);
        let start = Instant::now();

        for used in 1..=3u32 {
            let decision = limiter.check_at("caller", 3, start);
            assert_eq!(decision, RateDecision::Allowed { remaining: 3 - used });
        }

        assert!(matches!(
            limiter.check_at("caller", 3, start),
            RateDecision::Limited { .. }
        ));
    }

    #[test]
    fn a_lapsed_window_restores_the_allowance() {
        let limiter = RateLimiter::new(WINDOW);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.check_at("caller", 3, start);
        }
        assert!(matches!(
            limiter.check_at("caller", 3, start),
            RateDecision::Limited { .. }
        ));

        let after_reset = start + WINDOW;
        assert_eq!(
            limiter.check_at("caller", 3, after_reset),
            RateDecision::Allowed { remaining: 2 }
        );
    }

    #[test]
    fn retry_after_reports_the_time_left_in_the_window() {
        let limiter = RateLimiter::new(WINDOW);
        let start = Instant::now();

        limiter.check_at("caller", 1, start);
        let decision = limiter.check_at("caller", 1, start + Duration::from_secs(20));

        match decision {
            RateDecision::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(40));
            }
            other => panic!("expected a limited decision, got {other:?}"),
        }
    }

    #[test]
    fn callers_have_independent_budgets() {
        let limiter = RateLimiter::new(WINDOW);
        let start = Instant::now();

        limiter.check_at("first", 1, start);
        assert!(matches!(
            limiter.check_at("first", 1, start),
            RateDecision::Limited { .. }
        ));
        assert!(matches!(
            limiter.check_at("second", 1, start),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn prune_drops_only_lapsed_windows() {
        let limiter = RateLimiter::new(Duration::from_millis(0));
        limiter.check("stale", 5);
        limiter.prune();
        assert!(limiter.buckets.is_empty());

        let keeper = RateLimiter::new(WINDOW);
        keeper.check("active", 5);
        keeper.prune();
        assert_eq!(keeper.buckets.len(), 1);
    }
}
