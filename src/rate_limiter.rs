//! # Rate Limiting
//!
//! Per-user sliding window applied to command invocations before they reach
//! a handler. Uses DashMap so concurrent dispatches never contend on a
//! single lock.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.0: Drop users whose window has emptied, once per window
//! - 1.1.0: Reject instead of sleeping; expose retry delay
//! - 1.0.0: Initial release with per-user sliding window rate limiting

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    requests: DashMap<String, Vec<Instant>>,
    max_requests: usize,
    time_window: Duration,
    last_prune: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, time_window: Duration) -> Self {
        RateLimiter {
            requests: DashMap::new(),
            max_requests,
            time_window,
            last_prune: Mutex::new(Instant::now()),
        }
    }

    /// Record a request for `user_id`. Returns false when the user is over
    /// the limit; rejected requests do not count towards the window.
    pub fn check(&self, user_id: &str) -> bool {
        let now = Instant::now();
        // must run before taking an entry guard below
        self.prune_if_due(now);

        let mut entry = self.requests.entry(user_id.to_string()).or_default();

        entry.retain(|&time| now.duration_since(time) < self.time_window);

        if entry.len() >= self.max_requests {
            false
        } else {
            entry.push(now);
            true
        }
    }

    /// Forget users with no request inside the current window
    pub fn prune(&self) {
        let now = Instant::now();
        self.requests.retain(|_, times| {
            times.retain(|&time| now.duration_since(time) < self.time_window);
            !times.is_empty()
        });
    }

    /// Number of users currently tracked
    pub fn tracked_users(&self) -> usize {
        self.requests.len()
    }

    fn prune_if_due(&self, now: Instant) {
        {
            let mut last = match self.last_prune.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if now.duration_since(*last) < self.time_window {
                return;
            }
            *last = now;
        }
        self.prune();
    }

    /// How long until `user_id` may make another request
    pub fn retry_after(&self, user_id: &str) -> Option<Duration> {
        let entry = self.requests.get(user_id)?;
        if entry.len() < self.max_requests {
            return None;
        }
        let oldest = entry.first()?;
        self.time_window.checked_sub(oldest.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rate_limiter_allows_under_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));

        assert!(limiter.check("user1"));
        assert!(limiter.check("user1"));
        assert!(limiter.check("user1"));
    }

    #[test]
    fn test_rate_limiter_blocks_over_limit() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));

        assert!(limiter.check("user1"));
        assert!(limiter.check("user1"));
        assert!(!limiter.check("user1"));
        assert!(limiter.retry_after("user1").is_some());
    }

    #[tokio::test]
    async fn test_rate_limiter_resets_after_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100));

        assert!(limiter.check("user1"));
        assert!(!limiter.check("user1"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limiter.check("user1"));
    }

    #[tokio::test]
    async fn test_idle_users_are_forgotten() {
        let limiter = RateLimiter::new(5, Duration::from_millis(100));

        for i in 0..20 {
            assert!(limiter.check(&format!("user{}", i)));
        }
        assert_eq!(limiter.tracked_users(), 20);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limiter.check("fresh"));
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[test]
    fn test_prune_keeps_active_users() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        assert!(limiter.check("user1"));
        limiter.prune();
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[test]
    fn test_rate_limiter_per_user() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));

        assert!(limiter.check("user1"));
        assert!(limiter.check("user2"));
        assert!(!limiter.check("user1"));
        assert!(!limiter.check("user2"));
        assert!(limiter.retry_after("user3").is_none());
    }
}
